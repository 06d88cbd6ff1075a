//! SOAP Contract Validator for Zentinel
//!
//! Validates inbound SOAP requests against a service contract made of a WSDL
//! document and the XSD schemas stored next to it. Nothing about a service is
//! known ahead of time: operations are discovered from the WSDL bindings and
//! structural rules from the aggregated schema set.
//!
//! # Features
//!
//! - SOAP 1.1 / 1.2 envelope extraction with XXE prevention
//! - Operation catalog from WSDL services, ports and bindings
//! - Aggregation of every XSD under a contract directory into one schema
//! - Native XML Schema validation with path-qualified diagnostics
//! - Per-contract caching that follows changes to the contract files
//! - SOAP Fault rendering for rejected requests
//!
//! # Example
//!
//! ```ignore
//! use zentinel_soap_contract::{ContractValidator, ValidatorConfig};
//!
//! let validator = ContractValidator::new(ValidatorConfig::default());
//! let outcome = validator.validate(Path::new("schema_registry/crm/customers/v1"), &soap_xml);
//! if let Some(invalidation) = outcome.invalidation() {
//!     eprintln!("{}", invalidation);
//! }
//! ```

pub mod cache;
pub mod config;
pub mod envelope;
pub mod error;
pub mod parser;
pub mod registry;
pub mod schema;
pub mod validator;
pub mod wsdl;

pub use config::{SoapVersion, ValidatorConfig};
pub use error::{soap_fault_response, ContractError, Diagnostic, Invalidation, InvalidationKind};
pub use registry::{ContractId, ContractLocation, SchemaRegistry};
pub use schema::{CompiledSchema, SchemaSet};
pub use validator::{validate, ContractValidator, ValidationOutcome, ValidationRequest};
pub use wsdl::OperationCatalog;
