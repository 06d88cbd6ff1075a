//! Contract validation logic.
//!
//! A request runs through a fixed pipeline: size guard, envelope extraction,
//! contract resolution, operation lookup, optional SOAPAction check, and
//! structural validation against the compiled schema. The first failing step
//! decides the outcome.

use crate::cache::{ArtifactCache, CacheStats};
use crate::config::{CacheConfig, SoapVersion, ValidatorConfig};
use crate::envelope::{extract_request, parse_soap_action, RequestElement};
use crate::error::{ContractError, DefectCategory, Invalidation, InvalidationKind};
use crate::registry::{ContractId, ContractLocation, SchemaRegistry};
use crate::schema::{CompiledSchema, SchemaSet};
use crate::wsdl::OperationCatalog;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of validating one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ValidationOutcome {
    /// The request conforms to the contract
    Valid {
        operation: String,
        soap_version: SoapVersion,
    },
    /// The request or the contract was rejected
    Invalid(Invalidation),
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid { .. })
    }

    pub fn invalidation(&self) -> Option<&Invalidation> {
        match self {
            ValidationOutcome::Valid { .. } => None,
            ValidationOutcome::Invalid(invalidation) => Some(invalidation),
        }
    }

    /// Kind of the rejection, if any.
    pub fn kind(&self) -> Option<InvalidationKind> {
        self.invalidation().map(|i| i.kind)
    }

    /// Operation name of a valid request.
    pub fn operation(&self) -> Option<&str> {
        match self {
            ValidationOutcome::Valid { operation, .. } => Some(operation),
            ValidationOutcome::Invalid(_) => None,
        }
    }
}

impl From<Result<(String, SoapVersion), Invalidation>> for ValidationOutcome {
    fn from(result: Result<(String, SoapVersion), Invalidation>) -> Self {
        match result {
            Ok((operation, soap_version)) => ValidationOutcome::Valid {
                operation,
                soap_version,
            },
            Err(invalidation) => ValidationOutcome::Invalid(invalidation),
        }
    }
}

/// A request to validate.
#[derive(Debug, Clone, Copy)]
pub struct ValidationRequest<'a> {
    /// Directory of the contract to validate against
    pub contract_dir: &'a Path,
    /// Raw SOAP payload
    pub soap_xml: &'a str,
    /// SOAPAction header value, if the transport carried one
    pub soap_action: Option<&'a str>,
}

impl<'a> ValidationRequest<'a> {
    pub fn new(contract_dir: &'a Path, soap_xml: &'a str) -> Self {
        Self {
            contract_dir,
            soap_xml,
            soap_action: None,
        }
    }

    pub fn with_soap_action(mut self, soap_action: &'a str) -> Self {
        self.soap_action = Some(soap_action);
        self
    }
}

/// Cache counters of both artifact caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ValidatorStats {
    pub catalogs: CacheStats,
    pub schemas: CacheStats,
}

/// Validates SOAP requests against stored contracts.
///
/// Operation catalogs and compiled schemas are cached per contract directory
/// and rebuilt when the contract files change. The validator is `Sync` and is
/// meant to be shared across worker threads.
pub struct ContractValidator {
    config: ValidatorConfig,
    registry: SchemaRegistry,
    catalogs: ArtifactCache<OperationCatalog>,
    schemas: ArtifactCache<CompiledSchema>,
}

impl ContractValidator {
    /// Create a new validator with configuration.
    pub fn new(config: ValidatorConfig) -> Self {
        let registry = SchemaRegistry::new(&config.registry.root);
        let catalogs = ArtifactCache::new("catalog", config.cache.enabled);
        let schemas = ArtifactCache::new("schema", config.cache.enabled);
        Self {
            config,
            registry,
            catalogs,
            schemas,
        }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Validate a payload against the contract stored in `contract_dir`.
    pub fn validate(&self, contract_dir: &Path, soap_xml: &str) -> ValidationOutcome {
        self.validate_request(&ValidationRequest::new(contract_dir, soap_xml))
    }

    /// Validate a payload against a contract addressed by identity.
    pub fn validate_contract(&self, id: &ContractId, soap_xml: &str, soap_action: Option<&str>) -> ValidationOutcome {
        let dir = match self.registry.contract_dir(id) {
            Ok(dir) => dir,
            Err(err) => return self.reject(Invalidation::from(err), None),
        };
        let request = ValidationRequest {
            contract_dir: &dir,
            soap_xml,
            soap_action,
        };
        match self.run(&request) {
            Ok(valid) => ValidationOutcome::from(Ok(valid)),
            Err(invalidation) if invalidation.kind == InvalidationKind::ContractNotFound => {
                let invalidation = Invalidation::from(ContractError::ContractNotFound(format!(
                    "no contract stored for {}",
                    id
                )));
                self.reject(invalidation, Some(&dir))
            }
            Err(invalidation) => self.reject(invalidation, Some(&dir)),
        }
    }

    /// Validate a request.
    pub fn validate_request(&self, request: &ValidationRequest<'_>) -> ValidationOutcome {
        match self.run(request) {
            Ok(valid) => ValidationOutcome::from(Ok(valid)),
            Err(invalidation) => self.reject(invalidation, Some(request.contract_dir)),
        }
    }

    fn reject(&self, invalidation: Invalidation, contract_dir: Option<&Path>) -> ValidationOutcome {
        let contract = contract_dir.map(|d| d.display().to_string()).unwrap_or_default();
        match invalidation.category() {
            DefectCategory::Contract => warn!(
                contract = %contract,
                code = invalidation.kind.as_str(),
                message = %invalidation.message,
                "Contract defect"
            ),
            DefectCategory::Client => debug!(
                contract = %contract,
                code = invalidation.kind.as_str(),
                message = %invalidation.message,
                "Request rejected"
            ),
        }
        ValidationOutcome::Invalid(invalidation)
    }

    fn run(&self, request: &ValidationRequest<'_>) -> Result<(String, SoapVersion), Invalidation> {
        let max_size = self.config.settings.max_payload_size;
        if request.soap_xml.len() > max_size {
            return Err(Invalidation::new(
                InvalidationKind::PayloadTooLarge,
                format!(
                    "SOAP payload is {} bytes, maximum is {}",
                    request.soap_xml.len(),
                    max_size
                ),
            ));
        }

        let extracted = extract_request(request.soap_xml, &self.config.envelope, self.config.settings.max_depth)?;
        debug!(
            operation = %extracted.operation_name,
            soap_version = ?extracted.soap_version,
            "Extracted request element"
        );

        let location = ContractLocation::from_dir(request.contract_dir)?;
        let catalog = self.catalog(&location)?;
        resolve_operation(&extracted, &catalog, request.soap_action, &self.config)?;

        let schema = self.schema(&location.dir)?;
        check_structure(&extracted, &schema, &self.config)?;

        debug!(operation = %extracted.operation_name, contract = %location.dir.display(), "Request is valid");
        Ok((extracted.operation_name, extracted.soap_version))
    }

    /// Operation catalog of a contract, cached.
    pub fn catalog(&self, location: &ContractLocation) -> Result<Arc<OperationCatalog>, ContractError> {
        self.catalogs.get_or_load(&location.dir, || {
            let catalog = OperationCatalog::load(&location.wsdl)?;
            info!(
                contract = %location.dir.display(),
                operations = catalog.len(),
                "Operation catalog loaded"
            );
            Ok(catalog)
        })
    }

    /// Compiled schema of a contract, cached.
    pub fn schema(&self, contract_dir: &Path) -> Result<Arc<CompiledSchema>, ContractError> {
        self.schemas.get_or_load(contract_dir, || {
            let set = SchemaSet::load(contract_dir)?;
            let compiled = set.compile()?;
            info!(
                contract = %contract_dir.display(),
                documents = set.documents().len(),
                elements = compiled.element_names().len(),
                "Schema set compiled"
            );
            Ok(compiled)
        })
    }

    /// Drop cached artifacts of a contract, e.g. after its files were replaced.
    pub fn invalidate(&self, contract_dir: &Path) {
        let catalog = self.catalogs.invalidate(contract_dir);
        let schema = self.schemas.invalidate(contract_dir);
        if catalog || schema {
            debug!(contract = %contract_dir.display(), "Contract artifacts invalidated");
        }
    }

    pub fn clear_cache(&self) {
        self.catalogs.clear();
        self.schemas.clear();
    }

    pub fn stats(&self) -> ValidatorStats {
        ValidatorStats {
            catalogs: self.catalogs.stats(),
            schemas: self.schemas.stats(),
        }
    }
}

/// Check the request's operation against the catalog.
pub fn resolve_operation(
    request: &RequestElement,
    catalog: &OperationCatalog,
    soap_action: Option<&str>,
    config: &ValidatorConfig,
) -> Result<(), Invalidation> {
    let operation = catalog.get(&request.operation_name).ok_or_else(|| {
        let known: Vec<&str> = catalog.names().collect();
        Invalidation::with_location(
            InvalidationKind::UnknownOperation,
            format!(
                "Operation '{}' is not declared by the contract (declared: {})",
                request.operation_name,
                if known.is_empty() {
                    "none".to_string()
                } else {
                    known.join(", ")
                }
            ),
            format!("/{}", request.operation_name),
        )
    })?;

    if config.operations.validate_soap_action {
        if let Some(header) = soap_action {
            let action = parse_soap_action(header);
            if !operation.accepts_action(&action) {
                warn!(
                    soap_action = %action,
                    body_operation = %operation.name,
                    "SOAPAction mismatch with body operation"
                );
                return Err(Invalidation::new(
                    InvalidationKind::SoapActionMismatch,
                    format!(
                        "SOAPAction '{}' does not match body operation '{}'",
                        action, operation.name
                    ),
                ));
            }
        }
    }
    Ok(())
}

/// Validate the request element against a compiled schema.
pub fn check_structure(
    request: &RequestElement,
    schema: &CompiledSchema,
    config: &ValidatorConfig,
) -> Result<(), Invalidation> {
    schema
        .validate_element(&request.element, config.settings.max_diagnostics)
        .map_err(Invalidation::schema_violation)
}

/// Validate a payload against the contract in `contract_dir` with default
/// settings and no caching.
pub fn validate(contract_dir: &Path, soap_xml: &str) -> ValidationOutcome {
    let config = ValidatorConfig {
        cache: CacheConfig { enabled: false },
        ..Default::default()
    };
    ContractValidator::new(config).validate(contract_dir, soap_xml)
}
