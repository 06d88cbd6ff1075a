//! Zentinel SOAP contract validator binary.
//!
//! Run with: `zentinel-soap-validate --contract schema_registry/crm/customers/v1 request.xml`
//!
//! Each request file is validated on the blocking worker pool; the exit code
//! is 0 when every request is valid, 1 when a request was rejected and 2 when
//! the contract itself is defective.

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use zentinel_soap_contract::{
    soap_fault_response, ContractId, ContractValidator, ValidationOutcome, ValidationRequest, ValidatorConfig,
};

/// SOAP contract validator for Zentinel proxy.
///
/// Validates SOAP request files against a WSDL + XSD contract, either from a
/// contract directory or from the schema registry by department, service and
/// version.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Contract directory holding the WSDL and XSD files
    #[arg(long, conflicts_with_all = ["department", "service", "service_version"])]
    contract: Option<PathBuf>,

    /// Department of a registry contract
    #[arg(long)]
    department: Option<String>,

    /// Service of a registry contract
    #[arg(long)]
    service: Option<String>,

    /// Version of a registry contract
    #[arg(long)]
    service_version: Option<String>,

    /// Schema registry root (overrides the configuration)
    #[arg(long)]
    registry: Option<PathBuf>,

    /// SOAPAction header value sent with the requests
    #[arg(long)]
    soap_action: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// SOAP request files to validate
    #[arg(required = true)]
    requests: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// One line per request, diagnostics indented below
    Text,
    /// One JSON object per request
    Json,
    /// SOAP Fault document for each rejected request
    Fault,
}

enum Target {
    Dir(PathBuf),
    Registry(ContractId),
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging
    let log_level = args.log_level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")?;

    info!("Starting Zentinel SOAP contract validator v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config: ValidatorConfig = if args.config.exists() {
        info!("Config file: {}", args.config.display());
        let content = tokio::fs::read_to_string(&args.config)
            .await
            .context("Failed to read config file")?;
        serde_yaml::from_str(&content).context("Failed to parse config file")?
    } else {
        info!("Config file not found, using defaults");
        ValidatorConfig::default()
    };
    if let Some(root) = &args.registry {
        config.registry.root = root.clone();
    }

    info!(
        max_payload_size = config.settings.max_payload_size,
        max_depth = config.settings.max_depth,
        body_children = ?config.envelope.body_children,
        validate_soap_action = config.operations.validate_soap_action,
        cache = config.cache.enabled,
        "Configuration loaded"
    );

    let target = match (&args.contract, &args.department, &args.service, &args.service_version) {
        (Some(dir), _, _, _) => Target::Dir(dir.clone()),
        (None, Some(department), Some(service), Some(version)) => {
            Target::Registry(ContractId::new(department, service, version))
        }
        _ => bail!("Specify --contract DIR or all of --department, --service and --service-version"),
    };

    let validator = Arc::new(ContractValidator::new(config));
    let target = Arc::new(target);

    tokio::select! {
        result = run(validator, target, args.requests, args.soap_action, args.format) => result,
        _ = shutdown_signal() => {
            warn!("Shutdown signal received, stopping");
            Ok(ExitCode::from(130))
        }
    }
}

async fn run(
    validator: Arc<ContractValidator>,
    target: Arc<Target>,
    requests: Vec<PathBuf>,
    soap_action: Option<String>,
    format: OutputFormat,
) -> Result<ExitCode> {
    let mut handles = Vec::with_capacity(requests.len());
    for path in requests {
        let validator = Arc::clone(&validator);
        let target = Arc::clone(&target);
        let soap_action = soap_action.clone();
        handles.push(tokio::spawn(async move {
            let soap_xml = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read request file {}", path.display()))?;
            let outcome = tokio::task::spawn_blocking(move || match target.as_ref() {
                Target::Dir(dir) => {
                    let request = ValidationRequest::new(dir, &soap_xml);
                    let request = match soap_action.as_deref() {
                        Some(action) => request.with_soap_action(action),
                        None => request,
                    };
                    validator.validate_request(&request)
                }
                Target::Registry(id) => validator.validate_contract(id, &soap_xml, soap_action.as_deref()),
            })
            .await
            .context("Validation task failed")?;
            anyhow::Ok((path, outcome))
        }));
    }

    let total = handles.len();
    let mut rejected = 0usize;
    let mut exit = ExitCode::SUCCESS;
    let mut worst = 0u8;
    for handle in handles {
        let (path, outcome) = handle.await.context("Request task panicked")??;
        report(&path, &outcome, format)?;

        let severity = match outcome.invalidation() {
            None => 0,
            Some(invalidation) if invalidation.kind.is_contract_defect() => 2,
            Some(_) => 1,
        };
        if severity > 0 {
            rejected += 1;
        }
        if severity > worst {
            worst = severity;
            exit = ExitCode::from(severity);
        }
    }

    let stats = validator.stats();
    info!(
        requests = total,
        rejected = rejected,
        catalog_hits = stats.catalogs.hits,
        schema_hits = stats.schemas.hits,
        "Validation finished"
    );
    Ok(exit)
}

fn report(path: &std::path::Path, outcome: &ValidationOutcome, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => match outcome {
            ValidationOutcome::Valid {
                operation,
                soap_version,
            } => println!("{}: VALID {} ({:?})", path.display(), operation, soap_version),
            ValidationOutcome::Invalid(invalidation) => {
                println!("{}: INVALID {}", path.display(), invalidation);
                for diagnostic in &invalidation.diagnostics {
                    println!("    {}", diagnostic);
                }
            }
        },
        OutputFormat::Json => {
            let line = json!({ "file": path.display().to_string(), "outcome": outcome });
            println!("{}", serde_json::to_string(&line).context("Failed to serialize outcome")?);
        }
        OutputFormat::Fault => match outcome {
            ValidationOutcome::Valid { operation, .. } => {
                info!(file = %path.display(), operation = %operation, "Request is valid");
            }
            ValidationOutcome::Invalid(invalidation) => {
                println!("{}", soap_fault_response(invalidation, None));
            }
        },
    }
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
