//! Namespace-aware XML tree parsing.
//!
//! Uses quick-xml which is safe against XXE by default (doesn't expand entities).
//! Every document the crate touches (SOAP payloads, WSDL and XSD files) goes
//! through [`XmlDocument::parse`], which resolves element and attribute
//! prefixes against the in-scope `xmlns` declarations and keeps the scope on
//! each element so QName-valued attributes (`type="tns:Customer"`) can be
//! resolved later.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// The namespace permanently bound to the `xml` prefix.
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// XML Schema instance namespace (`xsi:type`, `xsi:nil`).
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Default for the deepest element nesting accepted in a document.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// What went wrong while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlErrorKind {
    /// Not well-formed or not namespace-well-formed
    Malformed,
    /// Well-formed so far but nested deeper than allowed
    TooDeep,
}

/// XML parsing failure with the byte offset it was detected at.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (at byte {position})")]
pub struct XmlError {
    pub kind: XmlErrorKind,
    /// Parser diagnostic
    pub message: String,
    /// Byte offset into the input
    pub position: u64,
}

impl XmlError {
    fn new(message: impl Into<String>, position: u64) -> Self {
        Self {
            kind: XmlErrorKind::Malformed,
            message: message.into(),
            position,
        }
    }

    fn too_deep(max_depth: usize, position: u64) -> Self {
        Self {
            kind: XmlErrorKind::TooDeep,
            message: format!("element nesting exceeds {} levels", max_depth),
            position,
        }
    }
}

/// Options controlling how untrusted input is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Reject documents carrying a DOCTYPE declaration
    pub block_doctype: bool,
    /// Deepest element nesting accepted
    pub max_depth: usize,
}

impl ParseOptions {
    /// Options for client payloads.
    pub fn hardened() -> Self {
        Self {
            block_doctype: true,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Options for operator-supplied contract documents.
    pub fn trusted() -> Self {
        Self {
            block_doctype: false,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::hardened()
    }
}

/// Namespace-qualified name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QName {
    /// Namespace URI, `None` for names in no namespace
    pub namespace: Option<String>,
    /// Local part
    pub local_name: String,
}

impl QName {
    /// Create a qualified name.
    pub fn new(namespace: Option<&str>, local_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.filter(|ns| !ns.is_empty()).map(String::from),
            local_name: local_name.into(),
        }
    }

    /// Namespace URI as a string slice.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{}}}{}", ns, self.local_name),
            None => f.write_str(&self.local_name),
        }
    }
}

/// Split a lexical QName into its optional prefix and local part.
pub fn split_qname(raw: &str) -> (Option<&str>, &str) {
    match raw.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, raw),
    }
}

/// The `xmlns` bindings visible at an element.
///
/// Scopes are shared between an element and its descendants until a
/// descendant declares new bindings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceScope {
    bindings: Vec<(Option<String>, String)>,
}

impl NamespaceScope {
    fn extend(parent: &Arc<Self>, declarations: Vec<(Option<String>, String)>) -> Arc<Self> {
        let mut bindings = parent.bindings.clone();
        bindings.extend(declarations);
        Arc::new(Self { bindings })
    }

    /// Resolve a prefix (`None` for the default namespace).
    ///
    /// An empty URI (`xmlns=""`) undeclares the default namespace and
    /// resolves to `None`.
    pub fn resolve(&self, prefix: Option<&str>) -> Option<&str> {
        if prefix == Some("xml") {
            return Some(XML_NS);
        }
        self.bindings
            .iter()
            .rev()
            .find(|(p, _)| p.as_deref() == prefix)
            .map(|(_, uri)| uri.as_str())
            .filter(|uri| !uri.is_empty())
    }

    /// Whether the prefix is bound at all.
    pub fn is_bound(&self, prefix: &str) -> bool {
        prefix == "xml" || self.bindings.iter().any(|(p, _)| p.as_deref() == Some(prefix))
    }
}

/// A parsed attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    /// Resolved attribute name (unprefixed attributes are in no namespace)
    pub name: QName,
    /// Attribute value with entities expanded
    pub value: String,
}

/// A child node of an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

/// A parsed element with its namespace scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    /// Resolved element name
    pub name: QName,
    /// Prefix used in the source, if any
    pub prefix: Option<String>,
    /// Attributes other than namespace declarations
    pub attributes: Vec<XmlAttribute>,
    /// Element and text children in document order
    pub children: Vec<XmlNode>,
    /// Byte offset of the start tag
    pub position: u64,
    scope: Arc<NamespaceScope>,
}

impl XmlElement {
    /// Build an element programmatically.
    pub fn new(name: QName, scope: Arc<NamespaceScope>) -> Self {
        Self {
            name,
            prefix: None,
            attributes: Vec::new(),
            children: Vec::new(),
            position: 0,
            scope,
        }
    }

    pub fn local_name(&self) -> &str {
        &self.name.local_name
    }

    pub fn namespace(&self) -> Option<&str> {
        self.name.namespace()
    }

    /// Whether this element has the given namespace and local name.
    pub fn is(&self, namespace: &str, local_name: &str) -> bool {
        self.namespace() == Some(namespace) && self.local_name() == local_name
    }

    /// Element children in document order.
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    /// Element children with the given namespace and local name.
    pub fn elements_named<'a>(
        &'a self,
        namespace: &'a str,
        local_name: &'a str,
    ) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.elements().filter(move |e| e.is(namespace, local_name))
    }

    /// Concatenated direct text content.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                XmlNode::Text(t) => Some(t.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect()
    }

    /// Whether any direct text child contains non-whitespace characters.
    pub fn has_text(&self) -> bool {
        self.children.iter().any(|node| match node {
            XmlNode::Text(t) => !t.trim().is_empty(),
            XmlNode::Element(_) => false,
        })
    }

    /// Value of an unqualified attribute.
    pub fn attribute(&self, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.namespace.is_none() && a.name.local_name == local_name)
            .map(|a| a.value.as_str())
    }

    /// Value of a namespace-qualified attribute.
    pub fn attribute_ns(&self, namespace: &str, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.namespace() == Some(namespace) && a.name.local_name == local_name)
            .map(|a| a.value.as_str())
    }

    /// Namespace bindings in scope at this element.
    pub fn scope(&self) -> &Arc<NamespaceScope> {
        &self.scope
    }

    /// Resolve a QName-valued attribute or text against this element's scope.
    ///
    /// Unprefixed values take the default namespace, as XML Schema requires.
    pub fn resolve_qname(&self, raw: &str) -> Result<QName, String> {
        let raw = raw.trim();
        let (prefix, local) = split_qname(raw);
        if local.is_empty() || local.contains(':') {
            return Err(format!("'{}' is not a valid QName", raw));
        }
        match prefix {
            Some(p) if !self.scope.is_bound(p) => {
                Err(format!("namespace prefix '{}' in '{}' is not declared", p, raw))
            }
            _ => Ok(QName::new(self.scope.resolve(prefix), local)),
        }
    }

    /// Name as written in the source, for diagnostics.
    pub fn display_name(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{}:{}", p, self.name.local_name),
            None => self.name.local_name.clone(),
        }
    }
}

/// A parsed XML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    pub root: XmlElement,
}

impl XmlDocument {
    /// Parse a document from text.
    pub fn parse(xml: &str, options: &ParseOptions) -> Result<Self, XmlError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(false);

        let base_scope = Arc::new(NamespaceScope::default());
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            let position = reader.buffer_position();
            match reader.read_event() {
                Ok(Event::Start(ref e)) => {
                    if stack.len() >= options.max_depth {
                        return Err(XmlError::too_deep(options.max_depth, position));
                    }
                    let parent = stack.last().map(|p| &p.scope).unwrap_or(&base_scope);
                    let element = open_element(e, parent, position)?;
                    stack.push(element);
                }
                Ok(Event::Empty(ref e)) => {
                    let parent = stack.last().map(|p| &p.scope).unwrap_or(&base_scope);
                    let element = open_element(e, parent, position)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::End(_)) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| XmlError::new("unmatched end tag", position))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::Text(e)) => {
                    let text = e
                        .unescape()
                        .map_err(|err| XmlError::new(format!("invalid text: {}", err), position))?;
                    push_text(&mut stack, &text, position)?;
                }
                Ok(Event::CData(e)) => {
                    let bytes = e.into_inner();
                    let text = std::str::from_utf8(&bytes)
                        .map_err(|err| XmlError::new(format!("invalid UTF-8 in CDATA: {}", err), position))?;
                    push_text(&mut stack, text, position)?;
                }
                Ok(Event::DocType(_)) if options.block_doctype => {
                    return Err(XmlError::new("DOCTYPE declarations are not allowed", position));
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(XmlError::new(format!("XML parse error: {}", e), reader.buffer_position()));
                }
            }
        }

        if let Some(open) = stack.last() {
            return Err(XmlError::new(
                format!("unexpected end of document: <{}> is not closed", open.display_name()),
                reader.buffer_position(),
            ));
        }

        root.map(|root| Self { root })
            .ok_or_else(|| XmlError::new("document has no root element", reader.buffer_position()))
    }
}

fn open_element(
    e: &BytesStart<'_>,
    parent: &Arc<NamespaceScope>,
    position: u64,
) -> Result<XmlElement, XmlError> {
    let mut declarations = Vec::new();
    let mut raw_attributes = Vec::new();

    for attr in e.attributes() {
        let attr = attr.map_err(|err| XmlError::new(format!("invalid attribute: {}", err), position))?;
        let key = utf8(attr.key.as_ref(), position)?.to_string();
        let value = attr
            .unescape_value()
            .map_err(|err| XmlError::new(format!("invalid value for attribute '{}': {}", key, err), position))?
            .into_owned();

        if key == "xmlns" {
            declarations.push((None, value));
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            if value.is_empty() {
                return Err(XmlError::new(
                    format!("namespace prefix '{}' cannot be bound to an empty URI", prefix),
                    position,
                ));
            }
            declarations.push((Some(prefix.to_string()), value));
        } else {
            raw_attributes.push((key, value));
        }
    }

    let scope = if declarations.is_empty() {
        Arc::clone(parent)
    } else {
        NamespaceScope::extend(parent, declarations)
    };

    let qname = e.name();
    let raw_name = utf8(qname.as_ref(), position)?;
    let (prefix, local) = split_qname(raw_name);
    if let Some(p) = prefix {
        if !scope.is_bound(p) {
            return Err(XmlError::new(
                format!("namespace prefix '{}' on element <{}> is not declared", p, raw_name),
                position,
            ));
        }
    }
    let name = QName::new(scope.resolve(prefix), local);

    let mut attributes = Vec::with_capacity(raw_attributes.len());
    for (key, value) in raw_attributes {
        let (attr_prefix, attr_local) = split_qname(&key);
        let namespace = match attr_prefix {
            Some(p) if !scope.is_bound(p) => {
                return Err(XmlError::new(
                    format!("namespace prefix '{}' on attribute '{}' is not declared", p, key),
                    position,
                ));
            }
            Some(p) => scope.resolve(Some(p)),
            None => None,
        };
        attributes.push(XmlAttribute {
            name: QName::new(namespace, attr_local),
            value,
        });
    }

    Ok(XmlElement {
        name,
        prefix: prefix.map(String::from),
        attributes,
        children: Vec::new(),
        position,
        scope,
    })
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(XmlNode::Element(element));
            Ok(())
        }
        None if root.is_some() => Err(XmlError::new(
            format!("unexpected second root element <{}>", element.display_name()),
            element.position,
        )),
        None => {
            *root = Some(element);
            Ok(())
        }
    }
}

fn push_text(stack: &mut [XmlElement], text: &str, position: u64) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => {
            if let Some(XmlNode::Text(existing)) = parent.children.last_mut() {
                existing.push_str(text);
            } else {
                parent.children.push(XmlNode::Text(text.to_string()));
            }
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(XmlError::new("text content outside the root element", position)),
    }
}

fn utf8(bytes: &[u8], position: u64) -> Result<&str, XmlError> {
    std::str::from_utf8(bytes).map_err(|err| XmlError::new(format!("invalid UTF-8 in name: {}", err), position))
}
