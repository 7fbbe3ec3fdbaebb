//! OcpAppSim CLI
//!
//! Deploys, modifies, inspects and removes application simulator workloads
//! on an OpenShift cluster.

mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ocp_appsim::domain::settings::validate_namespace;
use ocp_appsim::{
    BackendConfig, BackendFactory, Error, InventoryScope, KubeBackendConfig, Orchestrator,
    OrchestratorConfig, RawSettings, ResourceBackendRef, Result, SessionContext, Settings,
};
use output::{InventoryRow, OutputFormat};

// =============================================================================
// CLI Arguments
// =============================================================================

/// OcpAppSim - application simulator workloads for OpenShift
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// API server URL; the ambient kubeconfig is used when unset
    #[arg(long, env = "OCPAPPSIM_ENDPOINT", global = true)]
    endpoint: Option<String>,

    /// User name, also recorded as namespace owner
    #[arg(long, env = "OCPAPPSIM_USER", global = true)]
    user: Option<String>,

    /// Password for the user
    #[arg(long, env = "OCPAPPSIM_PASSWORD", global = true, hide_env_values = true)]
    password: Option<String>,

    /// Bearer token, preferred over user and password
    #[arg(long, env = "OCPAPPSIM_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    /// Address of the cluster ingress, used to fetch simulator logs
    #[arg(long, env = "OCPAPPSIM_INGRESS", global = true)]
    ingress: Option<String>,

    /// Skip TLS verification of the API server
    #[arg(long, env = "OCPAPPSIM_INSECURE", global = true)]
    insecure: bool,

    /// Default simulator image
    #[arg(long, env = "OCPAPPSIM_IMAGE", global = true)]
    image: Option<String>,

    /// Docker config JSON file used for the registry pull secret
    #[arg(long, env = "OCPAPPSIM_PULL_SECRET_FILE", global = true)]
    pull_secret_file: Option<PathBuf>,

    /// Resource backend (kube, memory)
    #[arg(long, env = "OCPAPPSIM_BACKEND", default_value = "kube", global = true)]
    backend: String,

    /// Output format for listings
    #[arg(long, value_enum, default_value = "table", global = true)]
    output: OutputFormat,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Deploy a new simulation from a settings file
    #[command(alias = "create")]
    Deploy {
        /// YAML settings file
        settings: PathBuf,
        /// Namespace, unless named in the settings file
        #[arg(short, long)]
        namespace: Option<String>,
    },
    /// Change the simulator action and the number of deployments
    Modify {
        settings: PathBuf,
        #[arg(short, long)]
        namespace: Option<String>,
        /// Simulator action (create, stop, verify)
        #[arg(short, long)]
        action: String,
        /// Modify a namespace owned by another user
        #[arg(long)]
        force: bool,
    },
    /// Remove a simulation and its namespace
    Remove {
        namespace: String,
        /// Remove a namespace owned by another user
        #[arg(long)]
        force: bool,
    },
    /// List simulations
    List {
        /// Include simulations of all users
        #[arg(long)]
        all: bool,
    },
    /// List the pods of a simulation, or print the log of one deployment
    Get {
        namespace: String,
        /// Deployment index whose simulator log is printed
        #[arg(long)]
        unit: Option<u32>,
    },
    /// Recreate the registry pull secret
    UpdateSecret {
        /// Renew in the simulations of all users
        #[arg(long)]
        all: bool,
    },
    /// List the storage classes of the cluster
    StorageClasses,
    /// Verify the cluster connection
    Check,
}

impl Args {
    fn user_name(&self) -> Result<String> {
        self.user
            .clone()
            .ok_or_else(|| Error::Configuration("A user name is required (--user)".into()))
    }

    fn scope(&self, all: bool) -> Result<InventoryScope> {
        Ok(if all {
            InventoryScope::All
        } else {
            InventoryScope::OwnedBy(self.user_name()?)
        })
    }

    fn orchestrator_config(&self) -> Result<OrchestratorConfig> {
        let mut config = OrchestratorConfig::default();
        if let Some(image) = &self.image {
            config.default_container_image = image.clone();
        }
        if let Some(path) = &self.pull_secret_file {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str::<serde_json::Value>(&content)?;
            config.pull_secret_config = content;
        }
        Ok(config)
    }

    fn backend_config(&self) -> BackendConfig {
        BackendConfig {
            kube: KubeBackendConfig {
                endpoint: self.endpoint.clone(),
                user: self.user.clone(),
                password: self.password.clone(),
                token: self.token.clone(),
                accept_invalid_certs: self.insecure,
            },
        }
    }

    fn load_settings(
        &self,
        config: &OrchestratorConfig,
        path: &PathBuf,
        namespace: Option<String>,
        action: Option<String>,
        force: bool,
    ) -> Result<Settings> {
        let raw = RawSettings::from_file(path)?;
        Settings::from_raw(
            raw,
            SessionContext {
                namespace,
                user_name: self.user_name()?,
                default_container_image: config.default_container_image.clone(),
                action,
                force,
            },
        )
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    if let Err(e) = run(args).await {
        output::print_error(&e.to_string());
        if let Error::StorageClassNotFound { available, .. } = &e {
            output::print_info(&format!("Available storage classes: {}", available.join(", ")));
        }
        if e.is_rejection() {
            output::print_info("No changes were made to the cluster");
        } else if e.is_transient() {
            output::print_info("The cluster may be partially updated; re-run to recover");
        }
        std::process::exit(e.exit_code());
    }
}

async fn run(args: Args) -> Result<()> {
    let config = args.orchestrator_config()?;
    let orchestrator = Orchestrator::new(config.clone());

    // settings are validated before any cluster session is opened
    let settings = match &args.command {
        Command::Deploy {
            settings,
            namespace,
        } => Some(args.load_settings(&config, settings, namespace.clone(), None, false)?),
        Command::Modify {
            settings,
            namespace,
            action,
            force,
        } => Some(args.load_settings(
            &config,
            settings,
            namespace.clone(),
            Some(action.clone()),
            *force,
        )?),
        Command::Remove { namespace, .. } | Command::Get { namespace, .. } => {
            validate_namespace(namespace)?;
            None
        }
        _ => None,
    };

    debug!("Using {} backend", args.backend);
    let backend: ResourceBackendRef =
        BackendFactory::create(&args.backend, args.backend_config()).await?;
    let backend = backend.as_ref();

    match &args.command {
        Command::Deploy { .. } => {
            let settings = settings.ok_or_else(|| Error::Internal("settings not loaded".into()))?;
            let report = orchestrator.create(backend, &settings).await?;
            output::print_success(&format!(
                "Deployment in namespace {} created ({} deployments, {} objects)",
                report.namespace, report.units, report.steps
            ));
        }
        Command::Modify { .. } => {
            let settings = settings.ok_or_else(|| Error::Internal("settings not loaded".into()))?;
            let report = orchestrator.modify(backend, &settings).await?;
            for warning in &report.warnings {
                output::print_warning(&warning.to_string());
            }
            output::print_success(&format!(
                "Deployment in namespace {} set to {}, {}",
                report.namespace,
                report.action.as_str(),
                report.rescale
            ));
        }
        Command::Remove { namespace, force } => {
            let report = orchestrator
                .remove(backend, namespace, &args.user_name()?, *force)
                .await?;
            for warning in &report.warnings {
                output::print_warning(&warning.to_string());
            }
            output::print_success(&format!("Deployment in namespace {} removed", report.namespace));
        }
        Command::List { all } => {
            let rows = orchestrator.inventory(backend, &args.scope(*all)?).await?;
            let count = rows.len();
            output::print_output(rows.iter().map(InventoryRow::from).collect(), args.output)?;
            if args.output == OutputFormat::Table {
                output::print_success(&format!("Found {} deployments", count));
            }
        }
        Command::Get { namespace, unit } => {
            let user = args.user_name()?;
            match unit {
                None => output::print_list(&orchestrator.pods(backend, namespace, &user).await?),
                Some(unit) => {
                    let host = orchestrator.route_host(backend, namespace, &user, *unit).await?;
                    let ingress = args.ingress.as_deref().ok_or_else(|| {
                        Error::Configuration("An ingress address is required (--ingress)".into())
                    })?;
                    print!("{}", fetch_log(&orchestrator.log_url(ingress), &host).await?);
                }
            }
        }
        Command::UpdateSecret { all } => {
            let report = orchestrator
                .renew_pull_secret(backend, &args.scope(*all)?)
                .await?;
            for namespace in &report.failed {
                output::print_warning(&format!("Pull secret not renewed in {}", namespace));
            }
            output::print_success(&format!(
                "Pull secret renewed in {} namespace(s)",
                report.renewed.len()
            ));
        }
        Command::StorageClasses => {
            output::print_list(&orchestrator.storage_classes(backend).await?);
        }
        Command::Check => {
            let classes = orchestrator.storage_classes(backend).await?;
            output::print_success(&format!(
                "Connected to the cluster ({} storage classes visible)",
                classes.len()
            ));
        }
    }

    info!("Done");
    Ok(())
}

/// Fetch the simulator log through the ingress, addressing the unit by host name
async fn fetch_log(url: &str, host: &str) -> Result<String> {
    debug!("GET {} (Host: {})", url, host);
    let body = reqwest::Client::new()
        .get(url)
        .header(reqwest::header::HOST, host)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    Ok(body)
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "kube=info", "tower=warn", "rustls=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    // stdout is reserved for tables and listings
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
