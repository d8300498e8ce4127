//! devmodeld - serves device models over a socket
//!
//! ```bash
//! devmodeld --config devmodel.toml --model mixer.json --model router.toml --port 6254
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use devmodel_core::config::ConfigBuilder;
use devmodel_core::logging;
use devmodel_devices::{DeviceModelSpec, SharedDeviceRegistry};
use devmodel_server::{Server, Service};

#[derive(Parser)]
#[command(name = "devmodeld")]
#[command(about = "Serve device models over a socket", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, env = "DEVMODEL_CONFIG")]
    config: Option<PathBuf>,

    /// Device model file (.json or .toml); may be repeated
    #[arg(long = "model")]
    models: Vec<PathBuf>,

    /// Port to listen on, overriding the configuration
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder = ConfigBuilder::new().with_environment_prefix("DEVMODEL");
    if let Some(path) = &cli.config {
        builder = builder.with_config_file(path);
    }
    let mut config = builder.build().context("failed to load configuration")?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    logging::init_from_config(&config.logging)?;
    devmodel_devices::init()?;
    devmodel_server::init()?;
    info!(
        "{} ({}) starting",
        config.general.app_name, config.general.environment
    );

    if config.security.tls_enabled() {
        warn!(
            "secure_comms is \"tls\" (cert {}, key {}); terminate TLS in front of devmodeld",
            config.security.tls_cert, config.security.tls_key
        );
    }
    info!(
        "Authorization {}; static root {}",
        if config.security.authorization_enabled { "enabled" } else { "disabled" },
        config.server.static_root
    );

    let registry = SharedDeviceRegistry::new();
    let files = config
        .model
        .files
        .iter()
        .map(PathBuf::from)
        .chain(cli.models.iter().cloned());
    for path in files {
        let spec = DeviceModelSpec::load(&path)
            .with_context(|| format!("failed to load device model {}", path.display()))?;
        let device = spec
            .into_device(&config.model)
            .with_context(|| format!("failed to build device model {}", path.display()))?;
        registry.registry().register(device)?;
    }
    if registry.registry().is_empty()? {
        warn!("No device models loaded");
    }

    let service = Service::new(registry, config.security.authorization_enabled);
    let server = Server::bind(&config.server, service).await?;
    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}
