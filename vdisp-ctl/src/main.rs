//! vdisp-ctl entry point.
//!
//! ```text
//! vdisp-ctl info                      Print the display geometry
//! vdisp-ctl set-mode Stimulus2DBlit   Switch mode and wait for it
//! vdisp-ctl --config <path> ...       Use custom config TOML
//! vdisp-ctl --gen-config              Dump default config and exit
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vdisp_core::{DisplayServerProxy, RemoteTransport};
use vdisp_ctl::commands::{self, Command};
use vdisp_ctl::config::CtlConfig;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "vdisp-ctl", about = "Virtual-display server control")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "vdisp-ctl.toml")]
    config: PathBuf,

    /// Server address (overrides config). Example: 192.168.1.20:7340
    #[arg(short, long)]
    server: Option<String>,

    /// Server name (overrides config).
    #[arg(short, long)]
    name: Option<String>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = CtlConfig::default_toml()?;
        println!("{text}");
        return Ok(());
    }

    let mut config = CtlConfig::load(&cli.config);
    if let Some(addr) = cli.server {
        config.network.server_address = addr;
    }
    if let Some(name) = cli.name {
        config.server.name = name;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let Some(command) = cli.command else {
        eprintln!("no command given; see --help");
        std::process::exit(2);
    };

    info!("vdisp-ctl v{}", env!("CARGO_PKG_VERSION"));
    info!("connecting to {}", config.network.server_address);

    let transport =
        RemoteTransport::connect(config.network.server_address.as_str(), config.call_timeout()).await?;
    let proxy = DisplayServerProxy::connect(
        Arc::new(transport),
        &config.server.name,
        &config.client_options(),
    )
    .await?;

    match commands::run(&proxy, command).await {
        Ok(text) => {
            println!("{text}");
            Ok(())
        }
        Err(e) => {
            error!("{e}");
            Err(e.into())
        }
    }
}
