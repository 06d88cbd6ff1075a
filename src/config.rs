//! Configuration types for the contract validator.

use crate::parser::DEFAULT_MAX_DEPTH;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for the contract validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Config version
    pub version: String,

    /// General settings
    pub settings: SettingsConfig,

    /// Envelope extraction configuration
    pub envelope: EnvelopeConfig,

    /// Operation resolution configuration
    pub operations: OperationsConfig,

    /// Compiled contract cache configuration
    pub cache: CacheConfig,

    /// Schema registry location
    pub registry: RegistryConfig,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            settings: SettingsConfig::default(),
            envelope: EnvelopeConfig::default(),
            operations: OperationsConfig::default(),
            cache: CacheConfig::default(),
            registry: RegistryConfig::default(),
        }
    }
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// Maximum SOAP payload size to process (bytes)
    pub max_payload_size: usize,

    /// Maximum element nesting depth of a SOAP payload
    pub max_depth: usize,

    /// Maximum structural diagnostics reported per validation
    pub max_diagnostics: usize,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            max_payload_size: 1_048_576, // 1MB
            max_depth: DEFAULT_MAX_DEPTH,
            max_diagnostics: 25,
        }
    }
}

/// SOAP envelope extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    /// Allowed SOAP versions
    pub allowed_versions: Vec<SoapVersion>,

    /// How to treat a Body with more than one element child
    pub body_children: BodyChildPolicy,

    /// Reject payloads carrying a DOCTYPE declaration
    pub block_doctype: bool,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            allowed_versions: vec![SoapVersion::Soap11, SoapVersion::Soap12],
            body_children: BodyChildPolicy::First,
            block_doctype: true,
        }
    }
}

/// SOAP versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SoapVersion {
    /// SOAP 1.1 (namespace: http://schemas.xmlsoap.org/soap/envelope/)
    #[serde(rename = "1.1")]
    Soap11,
    /// SOAP 1.2 (namespace: http://www.w3.org/2003/05/soap-envelope)
    #[serde(rename = "1.2")]
    Soap12,
}

/// Handling of extra element children in the SOAP Body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BodyChildPolicy {
    /// Validate the first element child, log and ignore the rest
    #[default]
    First,
    /// Reject bodies with more than one element child
    Strict,
}

/// Operation resolution configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OperationsConfig {
    /// Check a supplied SOAPAction against the operation's declared action
    pub validate_soap_action: bool,
}

/// Compiled contract cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Reuse compiled catalogs and schemas until the contract files change
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Schema registry location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Root directory holding `department/service/version` contract folders
    pub root: PathBuf,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("schema_registry"),
        }
    }
}
