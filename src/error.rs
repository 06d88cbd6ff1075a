//! Error types for contract loading and request validation.

use crate::config::SoapVersion;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Failures while loading a contract's WSDL or XSD documents.
///
/// These are contract-configuration defects except for
/// [`ContractError::ContractNotFound`], which the registry raises when the
/// caller names a contract that does not exist.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractError {
    #[error("Contract not found: {0}")]
    ContractNotFound(String),

    #[error("No WSDL file found in {}", .0.display())]
    WsdlNotFound(PathBuf),

    #[error("WSDL {} could not be parsed: {reason}", .path.display())]
    WsdlParse { path: PathBuf, reason: String },

    #[error("No XSD files found under {}", .0.display())]
    NoSchemaFound(PathBuf),

    #[error("XSD {} could not be parsed: {reason}", .path.display())]
    SchemaParse { path: PathBuf, reason: String },

    #[error("Schema set could not be compiled: {0}")]
    SchemaCompile(String),
}

impl ContractError {
    /// The outcome kind this error maps to.
    pub fn kind(&self) -> InvalidationKind {
        match self {
            Self::ContractNotFound(_) => InvalidationKind::ContractNotFound,
            Self::WsdlNotFound(_) => InvalidationKind::WsdlNotFound,
            Self::WsdlParse { .. } => InvalidationKind::WsdlParseError,
            Self::NoSchemaFound(_) => InvalidationKind::NoSchemaFound,
            Self::SchemaParse { .. } => InvalidationKind::SchemaParseError,
            Self::SchemaCompile(_) => InvalidationKind::SchemaCompileError,
        }
    }

    /// The file the error is about, if it names one.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::WsdlNotFound(p) | Self::NoSchemaFound(p) => Some(p),
            Self::WsdlParse { path, .. } | Self::SchemaParse { path, .. } => Some(path),
            Self::ContractNotFound(_) | Self::SchemaCompile(_) => None,
        }
    }
}

/// Who is at fault for a rejected validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefectCategory {
    /// The request payload is wrong
    Client,
    /// The stored contract is missing or broken
    Contract,
}

/// Kinds of validation rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvalidationKind {
    /// Contract directory does not exist
    ContractNotFound,
    /// Contract directory holds no WSDL
    WsdlNotFound,
    /// WSDL is malformed or its bindings cannot be resolved
    WsdlParseError,
    /// Contract directory holds no XSD
    NoSchemaFound,
    /// An XSD file is malformed
    SchemaParseError,
    /// The aggregated schema set does not compile
    SchemaCompileError,
    /// Payload is not well-formed XML
    MalformedXml,
    /// Envelope uses a SOAP version the configuration does not allow
    UnsupportedVersion,
    /// Envelope has no Body or Body has no request element
    MissingBody,
    /// Body carries several request elements under the strict policy
    AmbiguousBody,
    /// Payload exceeds the configured size limit
    PayloadTooLarge,
    /// Request element names no operation of the contract
    UnknownOperation,
    /// SOAPAction value disagrees with the body operation
    SoapActionMismatch,
    /// Request element does not conform to the schema set
    SchemaViolation,
}

impl InvalidationKind {
    /// Get the string code for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContractNotFound => "CONTRACT_NOT_FOUND",
            Self::WsdlNotFound => "WSDL_NOT_FOUND",
            Self::WsdlParseError => "WSDL_PARSE_ERROR",
            Self::NoSchemaFound => "NO_SCHEMA_FOUND",
            Self::SchemaParseError => "SCHEMA_PARSE_ERROR",
            Self::SchemaCompileError => "SCHEMA_COMPILE_ERROR",
            Self::MalformedXml => "MALFORMED_XML",
            Self::UnsupportedVersion => "UNSUPPORTED_VERSION",
            Self::MissingBody => "MISSING_BODY",
            Self::AmbiguousBody => "AMBIGUOUS_BODY",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::UnknownOperation => "UNKNOWN_OPERATION",
            Self::SoapActionMismatch => "SOAP_ACTION_MISMATCH",
            Self::SchemaViolation => "SCHEMA_VIOLATION",
        }
    }

    /// Whether the fault lies with the request or with the stored contract.
    pub fn category(&self) -> DefectCategory {
        match self {
            Self::WsdlNotFound
            | Self::WsdlParseError
            | Self::NoSchemaFound
            | Self::SchemaParseError
            | Self::SchemaCompileError => DefectCategory::Contract,
            Self::ContractNotFound
            | Self::MalformedXml
            | Self::UnsupportedVersion
            | Self::MissingBody
            | Self::AmbiguousBody
            | Self::PayloadTooLarge
            | Self::UnknownOperation
            | Self::SoapActionMismatch
            | Self::SchemaViolation => DefectCategory::Client,
        }
    }

    pub fn is_contract_defect(&self) -> bool {
        self.category() == DefectCategory::Contract
    }
}

impl fmt::Display for InvalidationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structural finding from schema validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Slash path from the request element, e.g. `/GetCustomer/CustomerId`
    pub path: String,
    /// Expected-vs-actual description
    pub message: String,
}

impl Diagnostic {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// A rejected validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invalidation {
    /// Rejection kind
    pub kind: InvalidationKind,
    /// Human-readable message
    pub message: String,
    /// File, byte offset or element path hint (if available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Structural findings for schema violations
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub diagnostics: Vec<Diagnostic>,
}

impl Invalidation {
    /// Create a new invalidation.
    pub fn new(kind: InvalidationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
            diagnostics: Vec::new(),
        }
    }

    /// Create an invalidation with location.
    pub fn with_location(
        kind: InvalidationKind,
        message: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            location: Some(location.into()),
            ..Self::new(kind, message)
        }
    }

    /// Create a schema violation from structural findings.
    pub fn schema_violation(diagnostics: Vec<Diagnostic>) -> Self {
        let message = match diagnostics.as_slice() {
            [] => "request element does not conform to the schema".to_string(),
            [only] => only.to_string(),
            [first, rest @ ..] => format!("{} (and {} more)", first, rest.len()),
        };
        Self {
            location: diagnostics.first().map(|d| d.path.clone()),
            diagnostics,
            ..Self::new(InvalidationKind::SchemaViolation, message)
        }
    }

    pub fn category(&self) -> DefectCategory {
        self.kind.category()
    }
}

impl fmt::Display for Invalidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for Invalidation {}

impl From<ContractError> for Invalidation {
    fn from(err: ContractError) -> Self {
        let kind = err.kind();
        match err.path() {
            Some(path) => Self::with_location(kind, err.to_string(), path.display().to_string()),
            None => Self::new(kind, err.to_string()),
        }
    }
}

/// Generate a SOAP Fault response for a rejected validation.
///
/// Client defects produce `Client`/`Sender` fault codes, contract defects
/// produce `Server`/`Receiver`.
pub fn soap_fault_response(invalidation: &Invalidation, soap_version: Option<SoapVersion>) -> String {
    match soap_version.unwrap_or(SoapVersion::Soap11) {
        SoapVersion::Soap11 => soap_11_fault(invalidation),
        SoapVersion::Soap12 => soap_12_fault(invalidation),
    }
}

fn fault_detail(invalidation: &Invalidation) -> String {
    let mut lines = vec![format!(
        "          <zentinel:invalidation code=\"{}\">{}</zentinel:invalidation>",
        invalidation.kind.as_str(),
        xml_escape(&invalidation.message)
    )];
    lines.extend(invalidation.diagnostics.iter().map(|d| {
        format!(
            "          <zentinel:diagnostic path=\"{}\">{}</zentinel:diagnostic>",
            xml_escape(&d.path),
            xml_escape(&d.message)
        )
    }));
    lines.join("\n")
}

fn soap_11_fault(invalidation: &Invalidation) -> String {
    let fault_code = match invalidation.category() {
        DefectCategory::Client => "soap:Client",
        DefectCategory::Contract => "soap:Server",
    };

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body>
    <soap:Fault>
      <faultcode>{}</faultcode>
      <faultstring>{}</faultstring>
      <detail>
        <zentinel:validation xmlns:zentinel="urn:zentinel:soap:contract">
{}
        </zentinel:validation>
      </detail>
    </soap:Fault>
  </soap:Body>
</soap:Envelope>"#,
        fault_code,
        xml_escape(&invalidation.to_string()),
        fault_detail(invalidation)
    )
}

fn soap_12_fault(invalidation: &Invalidation) -> String {
    let fault_code = match invalidation.category() {
        DefectCategory::Client => "soap:Sender",
        DefectCategory::Contract => "soap:Receiver",
    };

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
  <soap:Body>
    <soap:Fault>
      <soap:Code>
        <soap:Value>{}</soap:Value>
      </soap:Code>
      <soap:Reason>
        <soap:Text xml:lang="en">{}</soap:Text>
      </soap:Reason>
      <soap:Detail>
        <zentinel:validation xmlns:zentinel="urn:zentinel:soap:contract">
{}
        </zentinel:validation>
      </soap:Detail>
    </soap:Fault>
  </soap:Body>
</soap:Envelope>"#,
        fault_code,
        xml_escape(&invalidation.to_string()),
        fault_detail(invalidation)
    )
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
