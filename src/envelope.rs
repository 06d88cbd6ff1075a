//! SOAP envelope extraction.
//!
//! Turns a raw payload into the single request element the contract is
//! checked against.

use crate::config::{BodyChildPolicy, EnvelopeConfig, SoapVersion};
use crate::error::{Invalidation, InvalidationKind};
use crate::parser::{ParseOptions, XmlDocument, XmlElement, XmlErrorKind, XmlNode};
use tracing::warn;

/// SOAP namespace URIs.
pub const SOAP_11_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SOAP_12_NS: &str = "http://www.w3.org/2003/05/soap-envelope";

/// The request element taken from a SOAP Body.
#[derive(Debug, Clone)]
pub struct RequestElement {
    /// Local name of the element, used as the operation name
    pub operation_name: String,
    /// Namespace of the element
    pub namespace: Option<String>,
    /// Detected SOAP version
    pub soap_version: SoapVersion,
    /// The element itself, detached from the envelope
    pub element: XmlElement,
    /// Element children of Body after the first, which were not selected
    pub ignored_siblings: usize,
}

impl SoapVersion {
    /// Envelope namespace for this version.
    pub fn namespace(&self) -> &'static str {
        match self {
            SoapVersion::Soap11 => SOAP_11_NS,
            SoapVersion::Soap12 => SOAP_12_NS,
        }
    }

    /// Version whose envelope namespace is `namespace`.
    pub fn from_namespace(namespace: &str) -> Option<Self> {
        match namespace {
            SOAP_11_NS => Some(SoapVersion::Soap11),
            SOAP_12_NS => Some(SoapVersion::Soap12),
            _ => None,
        }
    }
}

/// Parse a SOAP payload and extract its request element.
///
/// Payloads nested deeper than `max_depth` elements are reported as too
/// large rather than malformed.
pub fn extract_request(
    soap_xml: &str,
    config: &EnvelopeConfig,
    max_depth: usize,
) -> Result<RequestElement, Invalidation> {
    let options = ParseOptions {
        block_doctype: config.block_doctype,
        max_depth,
    };
    let document = XmlDocument::parse(soap_xml, &options).map_err(|e| match e.kind {
        XmlErrorKind::TooDeep => Invalidation::with_location(
            InvalidationKind::PayloadTooLarge,
            format!("SOAP payload {}", e.message),
            format!("byte {}", e.position),
        ),
        XmlErrorKind::Malformed => Invalidation::with_location(
            InvalidationKind::MalformedXml,
            format!("Invalid XML: {}", e.message),
            format!("byte {}", e.position),
        ),
    })?;
    let root = document.root;

    let soap_version = root
        .namespace()
        .and_then(SoapVersion::from_namespace)
        .filter(|_| root.local_name() == "Envelope")
        .ok_or_else(|| {
            Invalidation::new(
                InvalidationKind::MissingBody,
                format!(
                    "Document root <{}> is not a SOAP Envelope, so it has no SOAP Body",
                    root.display_name()
                ),
            )
        })?;

    if !config.allowed_versions.contains(&soap_version) {
        return Err(Invalidation::new(
            InvalidationKind::UnsupportedVersion,
            format!(
                "SOAP version {:?} not allowed, allowed versions: {:?}",
                soap_version, config.allowed_versions
            ),
        ));
    }

    let body = root
        .children
        .into_iter()
        .find_map(|node| match node {
            XmlNode::Element(e) if e.is(soap_version.namespace(), "Body") => Some(e),
            _ => None,
        })
        .ok_or_else(|| Invalidation::new(InvalidationKind::MissingBody, "SOAP Body is missing"))?;

    let mut requests = body.children.into_iter().filter_map(|node| match node {
        XmlNode::Element(e) => Some(e),
        XmlNode::Text(_) => None,
    });

    let element = requests.next().ok_or_else(|| {
        Invalidation::new(InvalidationKind::MissingBody, "SOAP Body has no request element")
    })?;
    let ignored_siblings = requests.count();

    if ignored_siblings > 0 {
        match config.body_children {
            BodyChildPolicy::Strict => {
                return Err(Invalidation::new(
                    InvalidationKind::AmbiguousBody,
                    format!(
                        "SOAP Body contains {} request elements, exactly one is allowed",
                        ignored_siblings + 1
                    ),
                ));
            }
            BodyChildPolicy::First => {
                warn!(
                    operation = element.local_name(),
                    ignored = ignored_siblings,
                    "SOAP Body has extra elements, validating the first only"
                );
            }
        }
    }

    Ok(RequestElement {
        operation_name: element.local_name().to_string(),
        namespace: element.namespace().map(String::from),
        soap_version,
        element,
        ignored_siblings,
    })
}

/// Extract SOAPAction from HTTP header value (removes quotes).
pub fn parse_soap_action(header_value: &str) -> String {
    header_value.trim().trim_matches('"').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::DEFAULT_MAX_DEPTH;

    const SOAP_11_SAMPLE: &str = r#"<?xml version="1.0"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Header>
    <m:Trans xmlns:m="http://example.org/trans">234</m:Trans>
  </soap:Header>
  <soap:Body>
    <m:GetPrice xmlns:m="http://example.org/stock">
      <m:Item>Apples</m:Item>
    </m:GetPrice>
  </soap:Body>
</soap:Envelope>"#;

    const SOAP_12_SAMPLE: &str = r#"<?xml version="1.0"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
  <soap:Body>
    <m:GetUser xmlns:m="http://example.org/users">
      <m:UserId>123</m:UserId>
    </m:GetUser>
  </soap:Body>
</soap:Envelope>"#;

    fn extract(xml: &str) -> Result<RequestElement, Invalidation> {
        extract_request(xml, &EnvelopeConfig::default(), DEFAULT_MAX_DEPTH)
    }

    fn nested_request(depth: usize) -> String {
        format!(
            r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><Op>{}{}</Op></soap:Body></soap:Envelope>"#,
            "<n>".repeat(depth),
            "</n>".repeat(depth)
        )
    }

    #[test]
    fn test_extract_soap_11() {
        let request = extract(SOAP_11_SAMPLE).unwrap();
        assert_eq!(request.soap_version, SoapVersion::Soap11);
        assert_eq!(request.operation_name, "GetPrice");
        assert_eq!(request.namespace.as_deref(), Some("http://example.org/stock"));
        assert_eq!(request.element.elements().count(), 1);
    }

    #[test]
    fn test_extract_soap_12() {
        let request = extract(SOAP_12_SAMPLE).unwrap();
        assert_eq!(request.soap_version, SoapVersion::Soap12);
        assert_eq!(request.operation_name, "GetUser");
    }

    #[test]
    fn test_malformed_xml() {
        let err = extract("<soap:Envelope xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\">").unwrap_err();
        assert_eq!(err.kind, InvalidationKind::MalformedXml);
        assert!(err.location.is_some());
    }

    #[test]
    fn test_empty_body() {
        let xml = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body/></soap:Envelope>"#;
        assert_eq!(extract(xml).unwrap_err().kind, InvalidationKind::MissingBody);
    }

    #[test]
    fn test_body_with_only_text() {
        let xml = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body>  hello </soap:Body></soap:Envelope>"#;
        assert_eq!(extract(xml).unwrap_err().kind, InvalidationKind::MissingBody);
    }

    #[test]
    fn test_missing_body() {
        let xml = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Header/></soap:Envelope>"#;
        assert_eq!(extract(xml).unwrap_err().kind, InvalidationKind::MissingBody);
    }

    #[test]
    fn test_body_in_wrong_namespace_is_missing() {
        let xml = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><Body><GetUser/></Body></soap:Envelope>"#;
        assert_eq!(extract(xml).unwrap_err().kind, InvalidationKind::MissingBody);
    }

    #[test]
    fn test_non_envelope_root() {
        let xml = r#"<GetUser><UserId>1</UserId></GetUser>"#;
        assert_eq!(extract(xml).unwrap_err().kind, InvalidationKind::MissingBody);
    }

    #[test]
    fn test_multiple_children_first_policy() {
        let xml = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><A/><B/></soap:Body></soap:Envelope>"#;
        let request = extract(xml).unwrap();
        assert_eq!(request.operation_name, "A");
        assert_eq!(request.ignored_siblings, 1);
    }

    #[test]
    fn test_multiple_children_strict_policy() {
        let xml = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><A/><B/></soap:Body></soap:Envelope>"#;
        let config = EnvelopeConfig {
            body_children: BodyChildPolicy::Strict,
            ..Default::default()
        };
        let err = extract_request(xml, &config, DEFAULT_MAX_DEPTH).unwrap_err();
        assert_eq!(err.kind, InvalidationKind::AmbiguousBody);
    }

    #[test]
    fn test_deep_nesting_is_too_large() {
        let err = extract(&nested_request(300)).unwrap_err();
        assert_eq!(err.kind, InvalidationKind::PayloadTooLarge);
        assert!(err.message.contains("256"));
        assert!(err.location.is_some());

        let request = extract_request(&nested_request(300), &EnvelopeConfig::default(), 512).unwrap();
        assert_eq!(request.operation_name, "Op");
    }

    #[test]
    fn test_version_not_allowed() {
        let config = EnvelopeConfig {
            allowed_versions: vec![SoapVersion::Soap11],
            ..Default::default()
        };
        let err = extract_request(SOAP_12_SAMPLE, &config, DEFAULT_MAX_DEPTH).unwrap_err();
        assert_eq!(err.kind, InvalidationKind::UnsupportedVersion);
    }

    #[test]
    fn test_xxe_payload_rejected() {
        let xxe_payload = r#"<?xml version="1.0"?>
<!DOCTYPE foo [<!ENTITY xxe SYSTEM "file:///etc/passwd">]>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body><GetUser>&xxe;</GetUser></soap:Body>
</soap:Envelope>"#;
        let err = extract(xxe_payload).unwrap_err();
        assert_eq!(err.kind, InvalidationKind::MalformedXml);
        assert!(err.message.contains("DOCTYPE"));
    }

    #[test]
    fn test_parse_soap_action() {
        assert_eq!(parse_soap_action("\"GetUser\""), "GetUser");
        assert_eq!(parse_soap_action("GetUser"), "GetUser");
        assert_eq!(parse_soap_action("  \"GetUser\"  "), "GetUser");
    }
}
