//! Command-line surface
//!
//! # Usage
//!
//! ```bash
//! # Deploy three proxy endpoints and probe their egress IPs
//! flareprox create --count 3
//!
//! # Show deployed endpoints
//! flareprox list
//!
//! # Remove every flareprox-* worker
//! flareprox cleanup --yes
//!
//! # Try the routing rules locally
//! flareprox serve --port 8787
//! ```

use std::sync::Arc;

use anyhow::bail;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::cloudflare::{
    ClientSettings, CloudflareClient, HttpTransport, ReqwestTransport, ScriptFormat,
    TransportConfig,
};
use crate::config::Config;
use crate::models::{is_managed_name, Endpoint, ProbedEndpoint};
use crate::probe::{IpProber, RetryPolicy};
use crate::proxy::{WorkerEmulator, WorkerHandler};
use crate::services::FlareProx;

#[derive(Parser, Debug)]
#[command(name = "flareprox")]
#[command(author, version, about = "Ephemeral Cloudflare Workers proxy endpoints")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Deploy new proxy endpoints
    Create {
        /// Number of endpoints to create
        #[arg(short, long, default_value_t = 1)]
        count: usize,

        /// Skip egress IP probing
        #[arg(long)]
        no_probe: bool,
    },
    /// List deployed endpoints
    List {
        /// Skip egress IP probing
        #[arg(long)]
        no_probe: bool,
    },
    /// Delete endpoints by name
    Delete {
        /// Endpoint names (flareprox-xxxxxxxx)
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Delete every deployed endpoint
    Cleanup {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
    /// Print the worker script
    Script {
        /// Print the legacy (service-worker) script
        #[arg(long)]
        legacy: bool,
    },
    /// Run the worker locally
    Serve {
        /// Emulate the legacy script (forwards every request header)
        #[arg(long)]
        legacy: bool,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },
}

/// Execute a parsed command
pub async fn run(cli: Cli, config: Config, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
    match cli.command {
        Command::Create { count, no_probe } => create(&config, count, no_probe).await,
        Command::List { no_probe } => list(&config, no_probe).await,
        Command::Delete { names } => delete(&config, &names).await,
        Command::Cleanup { yes } => cleanup(&config, yes).await,
        Command::Script { legacy } => {
            print!("{}", script_format(legacy).script());
            Ok(())
        }
        Command::Serve { legacy, host, port } => {
            serve(&config, script_format(legacy), host, port, shutdown).await
        }
    }
}

fn script_format(legacy: bool) -> ScriptFormat {
    if legacy {
        ScriptFormat::Legacy
    } else {
        ScriptFormat::Module
    }
}

fn transport(config: &Config) -> anyhow::Result<Arc<ReqwestTransport>> {
    let transport_config = TransportConfig {
        connect_timeout: config.cloudflare.connect_timeout(),
        request_timeout: config.cloudflare.request_timeout(),
        egress_proxy: config.cloudflare.egress_proxy.clone(),
        ..TransportConfig::default()
    };
    let transport = ReqwestTransport::new(&transport_config)?;
    Ok(Arc::new(transport))
}

fn orchestrator(config: &Config, transport: Arc<dyn HttpTransport>) -> anyhow::Result<FlareProx> {
    let credentials = config.credentials()?;
    credentials.validate_format()?;

    let settings = ClientSettings {
        api_base: config.cloudflare.api_base.clone(),
        compatibility_date: config.cloudflare.compatibility_date.clone(),
        upload_timeout: config.cloudflare.upload_timeout(),
    };
    let client = CloudflareClient::new(transport, credentials, settings);
    Ok(FlareProx::new(Arc::new(client)))
}

fn prober(config: &Config, transport: Arc<dyn HttpTransport>) -> IpProber {
    IpProber::new(
        transport,
        config.probe.target.clone(),
        RetryPolicy::new(config.probe.max_attempts, config.probe.base_delay()),
    )
}

async fn print_endpoints(
    config: &Config,
    transport: Arc<dyn HttpTransport>,
    endpoints: &[Endpoint],
    no_probe: bool,
) {
    if no_probe {
        for endpoint in endpoints {
            println!("{}", endpoint);
        }
        return;
    }

    let probed: Vec<ProbedEndpoint> = prober(config, transport)
        .probe_all(endpoints, config.probe.workers)
        .await;
    for row in &probed {
        println!("{}", row);
    }
}

async fn create(config: &Config, count: usize, no_probe: bool) -> anyhow::Result<()> {
    let transport = transport(config)?;
    let flareprox = orchestrator(config, transport.clone())?;

    let result = flareprox.create_proxies(count).await?;
    print_endpoints(config, transport, &result.created, no_probe).await;
    println!("Created: {}, Failed: {}", result.created.len(), result.failed);

    if result.created.is_empty() && result.failed > 0 {
        bail!("no endpoints were created");
    }
    Ok(())
}

async fn list(config: &Config, no_probe: bool) -> anyhow::Result<()> {
    let transport = transport(config)?;
    let flareprox = orchestrator(config, transport.clone())?;

    let endpoints = flareprox.list_endpoints().await?;
    if endpoints.is_empty() {
        println!("No endpoints deployed");
        return Ok(());
    }
    print_endpoints(config, transport, &endpoints, no_probe).await;
    Ok(())
}

async fn delete(config: &Config, names: &[String]) -> anyhow::Result<()> {
    let transport = transport(config)?;
    let flareprox = orchestrator(config, transport)?;

    let requested = delete_named(&flareprox, names).await?;
    println!("Requested deletion of {} endpoint(s)", requested);
    Ok(())
}

/// Delete managed names directly; the live listing only feeds warnings
async fn delete_named(flareprox: &FlareProx, names: &[String]) -> anyhow::Result<usize> {
    let (targets, rejected) = partition_names(names);
    for name in &rejected {
        warn!("Skipping {}: not a flareprox endpoint name", name);
    }
    if targets.is_empty() {
        return Ok(0);
    }

    match flareprox.list_endpoints().await {
        Ok(deployed) => {
            for name in &targets {
                if !deployed.iter().any(|e| e.name() == name.as_str()) {
                    warn!("{} is not in the current listing; deleting anyway", name);
                }
            }
        }
        Err(e) => warn!("Could not check deployed endpoints: {}", e),
    }

    flareprox.delete_by_name(&targets).await?;
    Ok(targets.len())
}

/// Split `names` into unique managed names and names that can never be ours
fn partition_names(names: &[String]) -> (Vec<String>, Vec<String>) {
    let mut targets: Vec<String> = Vec::new();
    let mut rejected = Vec::new();
    for name in names {
        if !is_managed_name(name) {
            rejected.push(name.clone());
        } else if !targets.contains(name) {
            targets.push(name.clone());
        }
    }
    (targets, rejected)
}

fn confirm_cleanup(yes: bool) -> anyhow::Result<()> {
    if !yes {
        bail!("cleanup deletes every flareprox-* worker on the account; re-run with --yes to confirm");
    }
    Ok(())
}

async fn cleanup(config: &Config, yes: bool) -> anyhow::Result<()> {
    confirm_cleanup(yes)?;

    let transport = transport(config)?;
    let flareprox = orchestrator(config, transport)?;

    let summary = flareprox.cleanup_all().await?;
    println!("Deleted {}/{}", summary.deleted, summary.total);
    Ok(())
}

async fn serve(
    config: &Config,
    format: ScriptFormat,
    host: Option<String>,
    port: Option<u16>,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let transport = transport(config)?;
    let addr = match (host, port) {
        (None, None) => config.serve_addr(),
        (host, port) => format!(
            "{}:{}",
            host.unwrap_or_else(|| config.serve.host.clone()),
            port.unwrap_or(config.serve.port)
        ),
    };

    info!("Emulating the {} worker", format);
    let handler = WorkerHandler::new(transport.client().clone(), format);
    WorkerEmulator::new(addr, handler).run(shutdown).await?;
    Ok(())
}
