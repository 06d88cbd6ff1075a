//! Contract storage layout.
//!
//! Contracts live at `<root>/<department>/<service>/<version>/`, each
//! directory holding one WSDL document and the XSD files it relies on.

use crate::error::ContractError;
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Identity of a stored contract.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContractId {
    pub department: String,
    pub service: String,
    pub version: String,
}

impl ContractId {
    pub fn new(department: impl Into<String>, service: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            department: department.into(),
            service: service.into(),
            version: version.into(),
        }
    }

    /// Relative directory of this contract, rejecting segments that would
    /// escape the registry root.
    pub fn relative_dir(&self) -> Result<PathBuf, ContractError> {
        let mut dir = PathBuf::new();
        for (label, segment) in [
            ("department", &self.department),
            ("service", &self.service),
            ("version", &self.version),
        ] {
            let invalid = segment.is_empty()
                || segment == "."
                || segment == ".."
                || segment.contains(['/', '\\', '\0']);
            if invalid {
                return Err(ContractError::ContractNotFound(format!(
                    "invalid {} '{}' in contract {}",
                    label, segment, self
                )));
            }
            dir.push(segment);
        }
        Ok(dir)
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.department, self.service, self.version)
    }
}

/// A resolved contract directory and its WSDL document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractLocation {
    pub dir: PathBuf,
    pub wsdl: PathBuf,
}

impl ContractLocation {
    /// Resolve the WSDL document of a contract directory.
    ///
    /// Only files directly in `dir` are considered. With several WSDL files
    /// the first in lexical order wins.
    pub fn from_dir(dir: &Path) -> Result<Self, ContractError> {
        if !dir.is_dir() {
            return Err(ContractError::ContractNotFound(format!(
                "contract directory {} does not exist",
                dir.display()
            )));
        }

        let pattern = format!("{}/*.wsdl", Pattern::escape(&dir.to_string_lossy()));
        let mut wsdls: Vec<PathBuf> = glob::glob(&pattern)
            .map_err(|e| ContractError::WsdlParse {
                path: dir.to_path_buf(),
                reason: format!("invalid search pattern: {}", e),
            })?
            .filter_map(Result::ok)
            .filter(|path| path.is_file())
            .collect();
        wsdls.sort();

        let wsdl = match wsdls.len() {
            0 => return Err(ContractError::WsdlNotFound(dir.to_path_buf())),
            1 => wsdls.remove(0),
            count => {
                warn!(
                    dir = %dir.display(),
                    count = count,
                    using = %wsdls[0].display(),
                    "Contract directory has several WSDL files, using the first"
                );
                wsdls.remove(0)
            }
        };

        Ok(Self {
            dir: dir.to_path_buf(),
            wsdl,
        })
    }
}

/// Root of the contract store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaRegistry {
    root: PathBuf,
}

impl SchemaRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory a contract is stored in, whether or not it exists.
    pub fn contract_dir(&self, id: &ContractId) -> Result<PathBuf, ContractError> {
        Ok(self.root.join(id.relative_dir()?))
    }

    /// Resolve a stored contract.
    pub fn locate(&self, id: &ContractId) -> Result<ContractLocation, ContractError> {
        let dir = self.contract_dir(id)?;
        ContractLocation::from_dir(&dir).map_err(|e| match e {
            ContractError::ContractNotFound(_) => {
                ContractError::ContractNotFound(format!("no contract stored for {}", id))
            }
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_relative_dir() {
        let id = ContractId::new("billing", "invoices", "v2");
        assert_eq!(id.relative_dir().unwrap(), PathBuf::from("billing/invoices/v2"));
        assert_eq!(id.to_string(), "billing/invoices/v2");
    }

    #[test]
    fn test_rejects_path_traversal() {
        for id in [
            ContractId::new("..", "invoices", "v2"),
            ContractId::new("billing", "a/b", "v2"),
            ContractId::new("billing", "invoices", ""),
            ContractId::new("billing", "invoices", "..\\x"),
        ] {
            assert!(matches!(id.relative_dir(), Err(ContractError::ContractNotFound(_))), "{}", id);
        }
    }

    #[test]
    fn test_locate() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("billing/invoices/v2");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("invoices.wsdl"), "<definitions/>").unwrap();

        let registry = SchemaRegistry::new(root.path());
        let location = registry.locate(&ContractId::new("billing", "invoices", "v2")).unwrap();
        assert_eq!(location.dir, dir);
        assert_eq!(location.wsdl, dir.join("invoices.wsdl"));
    }

    #[test]
    fn test_locate_missing_contract() {
        let root = TempDir::new().unwrap();
        let registry = SchemaRegistry::new(root.path());
        let err = registry.locate(&ContractId::new("billing", "invoices", "v9")).unwrap_err();
        assert!(matches!(err, ContractError::ContractNotFound(_)));
        assert!(err.to_string().contains("billing/invoices/v9"));
    }

    #[test]
    fn test_directory_without_wsdl() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested/deep.wsdl"), "<definitions/>").unwrap();
        fs::write(dir.path().join("types.xsd"), "<schema/>").unwrap();
        assert!(matches!(
            ContractLocation::from_dir(dir.path()),
            Err(ContractError::WsdlNotFound(_))
        ));
    }

    #[test]
    fn test_first_wsdl_in_lexical_order() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.wsdl"), "<definitions/>").unwrap();
        fs::write(dir.path().join("a.wsdl"), "<definitions/>").unwrap();
        let location = ContractLocation::from_dir(dir.path()).unwrap();
        assert_eq!(location.wsdl, dir.path().join("a.wsdl"));
    }
}
