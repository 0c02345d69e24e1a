//! vdisp-sim entry point.
//!
//! ```text
//! vdisp-sim                       Serve with defaults
//! vdisp-sim --listen <addr>       Override the listen address
//! vdisp-sim --config <path>       Load a custom config TOML
//! vdisp-sim --gen-config          Write default config to stdout
//! ```

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vdisp_sim::config::SimConfig;
use vdisp_sim::service::SimService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "vdisp-sim", about = "Simulated virtual-display server")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "vdisp-sim.toml")]
    config: PathBuf,

    /// Listen address (overrides config). Example: 0.0.0.0:7340
    #[arg(short, long)]
    listen: Option<String>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = SimConfig::default_toml()?;
        println!("{text}");
        return Ok(());
    }

    let mut config = SimConfig::load(&cli.config);
    if let Some(addr) = cli.listen {
        config.network.listen_address = addr;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("vdisp-sim v{}", env!("CARGO_PKG_VERSION"));
    info!("framebuffer: {}x{}", config.display.width, config.display.height);
    info!("virtual displays: {}", config.display.virtual_displays.len());
    info!("modes: {}", config.server.modes.join(", "));

    let service = SimService::new(config);
    let stop = service.stop_handle();

    // Ctrl-C handler.
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.store(false, Ordering::SeqCst);
    });

    service.run().await?;

    Ok(())
}
