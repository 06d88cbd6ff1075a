//! WSDL operation catalog.
//!
//! Walks every service, port and binding of a WSDL 1.1 contract (following
//! local `wsdl:import` references) and records the operations the bindings
//! declare.

use crate::error::ContractError;
use crate::parser::{ParseOptions, QName, XmlDocument, XmlElement};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// WSDL 1.1 namespace URIs.
pub const WSDL_NS: &str = "http://schemas.xmlsoap.org/wsdl/";
pub const WSDL_SOAP11_NS: &str = "http://schemas.xmlsoap.org/wsdl/soap/";
pub const WSDL_SOAP12_NS: &str = "http://schemas.xmlsoap.org/wsdl/soap12/";

/// An operation declared by at least one binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationInfo {
    /// Operation name
    pub name: String,
    /// `soapAction` declared on the SOAP binding operation, if any
    pub soap_action: Option<String>,
    /// Bindings declaring this operation
    pub bindings: BTreeSet<QName>,
}

impl OperationInfo {
    /// Check a SOAPAction value against this operation.
    ///
    /// An empty action carries no intent and is accepted. Without a declared
    /// action the value must name the operation, optionally after a `/` or `#`.
    pub fn accepts_action(&self, action: &str) -> bool {
        if action.is_empty() {
            return true;
        }
        match &self.soap_action {
            Some(declared) => declared == action,
            None => {
                let tail = action.rsplit('/').next().unwrap_or(action);
                let tail = tail.rsplit('#').next().unwrap_or(tail);
                tail == self.name
            }
        }
    }
}

/// The set of operations a contract's WSDL declares.
#[derive(Debug, Clone, Default)]
pub struct OperationCatalog {
    operations: BTreeMap<String, OperationInfo>,
    services: BTreeSet<String>,
}

impl OperationCatalog {
    /// Load the catalog from a WSDL file.
    pub fn load(wsdl_path: &Path) -> Result<Self, ContractError> {
        if !wsdl_path.is_file() {
            return Err(ContractError::WsdlNotFound(wsdl_path.to_path_buf()));
        }

        let mut documents = Vec::new();
        let mut seen = HashSet::new();
        load_definitions(wsdl_path, &mut documents, &mut seen)?;

        let catalog = Self::from_documents(&documents)?;
        debug!(
            wsdl = %wsdl_path.display(),
            documents = documents.len(),
            operations = catalog.len(),
            "Operation catalog built"
        );
        Ok(catalog)
    }

    /// Build the catalog from WSDL text, resolving imports relative to `source`.
    pub fn parse(wsdl: &str, source: &Path) -> Result<Self, ContractError> {
        let root = parse_definitions(wsdl, source)?;
        let mut documents = Vec::new();
        let mut seen = HashSet::new();
        load_imports(&root, source, &mut documents, &mut seen)?;
        documents.push(WsdlDocument {
            path: source.to_path_buf(),
            root,
        });
        Self::from_documents(&documents)
    }

    fn from_documents(documents: &[WsdlDocument]) -> Result<Self, ContractError> {
        let mut bindings: HashMap<QName, &XmlElement> = HashMap::new();
        for doc in documents {
            let tns = doc.root.attribute("targetNamespace");
            for binding in doc.root.elements_named(WSDL_NS, "binding") {
                let name = binding
                    .attribute("name")
                    .ok_or_else(|| doc.error("wsdl:binding without a name"))?;
                bindings.insert(QName::new(tns, name), binding);
            }
        }

        let mut catalog = Self::default();
        for doc in documents {
            for service in doc.root.elements_named(WSDL_NS, "service") {
                let service_name = service.attribute("name").unwrap_or_default();
                catalog.services.insert(service_name.to_string());

                for port in service.elements_named(WSDL_NS, "port") {
                    let port_name = port.attribute("name").unwrap_or_default();
                    let binding_ref = port.attribute("binding").ok_or_else(|| {
                        doc.error(format!(
                            "port '{}' of service '{}' has no binding",
                            port_name, service_name
                        ))
                    })?;
                    let binding_name = port.resolve_qname(binding_ref).map_err(|e| doc.error(e))?;
                    let binding = bindings.get(&binding_name).ok_or_else(|| {
                        doc.error(format!(
                            "port '{}' of service '{}' references undefined binding {}",
                            port_name, service_name, binding_name
                        ))
                    })?;

                    for operation in binding.elements_named(WSDL_NS, "operation") {
                        let name = operation
                            .attribute("name")
                            .ok_or_else(|| doc.error(format!("operation without a name in binding {}", binding_name)))?;
                        catalog.insert(name, soap_action(operation), &binding_name);
                    }
                }
            }
        }

        Ok(catalog)
    }

    fn insert(&mut self, name: &str, soap_action: Option<String>, binding: &QName) {
        let entry = self
            .operations
            .entry(name.to_string())
            .or_insert_with(|| OperationInfo {
                name: name.to_string(),
                soap_action: None,
                bindings: BTreeSet::new(),
            });
        if entry.soap_action.is_none() {
            entry.soap_action = soap_action;
        }
        entry.bindings.insert(binding.clone());
    }

    /// Whether an operation with this name is declared.
    pub fn contains(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&OperationInfo> {
        self.operations.get(name)
    }

    /// Operation names in lexical order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.operations.keys().map(String::as_str)
    }

    /// Service names in lexical order.
    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.services.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

struct WsdlDocument {
    path: PathBuf,
    root: XmlElement,
}

impl WsdlDocument {
    fn error(&self, reason: impl Into<String>) -> ContractError {
        ContractError::WsdlParse {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }
}

fn soap_action(operation: &XmlElement) -> Option<String> {
    operation
        .elements()
        .find(|e| e.is(WSDL_SOAP11_NS, "operation") || e.is(WSDL_SOAP12_NS, "operation"))
        .and_then(|e| e.attribute("soapAction"))
        .filter(|action| !action.is_empty())
        .map(String::from)
}

fn parse_definitions(wsdl: &str, path: &Path) -> Result<XmlElement, ContractError> {
    let document = XmlDocument::parse(wsdl, &ParseOptions::trusted()).map_err(|e| ContractError::WsdlParse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    if !document.root.is(WSDL_NS, "definitions") {
        return Err(ContractError::WsdlParse {
            path: path.to_path_buf(),
            reason: format!("root element <{}> is not wsdl:definitions", document.root.display_name()),
        });
    }
    Ok(document.root)
}

fn load_definitions(
    path: &Path,
    documents: &mut Vec<WsdlDocument>,
    seen: &mut HashSet<PathBuf>,
) -> Result<(), ContractError> {
    let canonical = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    if !seen.insert(canonical) {
        return Ok(());
    }

    let content = fs::read_to_string(path).map_err(|e| ContractError::WsdlParse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let root = parse_definitions(&content, path)?;
    load_imports(&root, path, documents, seen)?;
    documents.push(WsdlDocument {
        path: path.to_path_buf(),
        root,
    });
    Ok(())
}

fn load_imports(
    root: &XmlElement,
    path: &Path,
    documents: &mut Vec<WsdlDocument>,
    seen: &mut HashSet<PathBuf>,
) -> Result<(), ContractError> {
    for import in root.elements_named(WSDL_NS, "import") {
        let Some(location) = import.attribute("location") else {
            continue;
        };
        if location.starts_with("http://") || location.starts_with("https://") {
            return Err(ContractError::WsdlParse {
                path: path.to_path_buf(),
                reason: format!("remote import '{}' cannot be resolved", location),
            });
        }

        let target = path.parent().unwrap_or_else(|| Path::new(".")).join(location);
        if !target.is_file() {
            return Err(ContractError::WsdlParse {
                path: path.to_path_buf(),
                reason: format!("imported document '{}' not found", location),
            });
        }
        load_definitions(&target, documents, seen)?;
    }
    Ok(())
}
