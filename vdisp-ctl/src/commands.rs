//! Subcommands and their execution against a connected server.
//!
//! Every command returns the text to print so `main` stays a thin
//! shell around argument parsing and connection setup.

use std::path::PathBuf;

use clap::Subcommand;
use tracing::{info, warn};

use vdisp_core::image::mask_image;
use vdisp_core::{
    DisplayError, DisplayServerProxy, InfoStatus, Result, WaitOutcome, publish_stimulus_mode,
};

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Print the display geometry as JSON.
    Info {
        /// Re-fetch instead of using the cached copy.
        #[arg(long)]
        refresh: bool,
    },
    /// Print the server's current mode.
    Mode,
    /// Switch the server to a mode and wait for its confirmation.
    SetMode {
        /// Mode name (`display2d` is accepted as a legacy alias).
        mode: String,
    },
    /// Return the server to standby.
    Standby,
    /// Publish a mode on the global `/stimulus_mode` topic.
    Announce { mode: String },
    /// Render a mask to a PGM file.
    Mask {
        /// Restrict to one virtual display; defaults to all of them.
        #[arg(long)]
        vdisp: Option<String>,
        /// Output file.
        #[arg(long)]
        out: PathBuf,
    },
    /// Blit an image file; its extension names the format.
    Show {
        path: PathBuf,
        /// Delete the file afterwards.
        #[arg(long)]
        unlink: bool,
    },
    /// Fill the framebuffer with a gray level.
    Fill {
        color: u8,
        /// Only fill pixels inside the virtual displays.
        #[arg(long)]
        masked: bool,
        /// Samples per pixel (1 or 3).
        #[arg(long, default_value_t = 3)]
        channels: usize,
    },
    /// Store a geometry record (JSON object with a `model` field).
    SetGeometry { path: PathBuf },
    /// Upload a pixel-to-geometry blob.
    SetP2g { path: PathBuf },
}

/// Run one command. Returns what should be printed on success.
pub async fn run(proxy: &DisplayServerProxy, command: Command) -> Result<String> {
    match command {
        Command::Info { refresh } => {
            let info = match proxy.display_info_status(refresh).await {
                InfoStatus::Fresh(info) => info,
                InfoStatus::Stale(info, reason) => {
                    warn!("showing cached geometry, refresh failed: {reason}");
                    info
                }
                InfoStatus::Unknown(reason) => return Err(DisplayError::InfoUnavailable(reason)),
            };
            Ok(serde_json::to_string_pretty(&info)?)
        }
        Command::Mode => Ok(describe(proxy.get_mode().await?)),
        Command::SetMode { mode } => Ok(describe(proxy.set_mode(&mode).await?)),
        Command::Standby => Ok(describe(proxy.enter_standby_mode().await?)),
        Command::Announce { mode } => {
            publish_stimulus_mode(proxy.transport().as_ref(), &mode).await?;
            Ok(format!("announced {mode}"))
        }
        Command::Mask { vdisp, out } => {
            let mask = match &vdisp {
                Some(name) => proxy.get_virtual_display_mask(name).await,
                None => proxy.get_display_mask().await,
            };
            if mask.none() {
                warn!("mask is empty");
            }
            let (_, bytes) = mask_image(&mask).to_netpbm()?;
            tokio::fs::write(&out, bytes).await?;
            Ok(format!(
                "wrote {}x{} mask ({} pixels set) to {}",
                mask.width(),
                mask.height(),
                mask.count(),
                out.display()
            ))
        }
        Command::Show { path, unlink } => {
            proxy.show_image(&path, unlink).await?;
            Ok(format!("sent {}", path.display()))
        }
        Command::Fill {
            color,
            masked,
            channels,
        } => {
            let mask = if masked {
                Some(proxy.get_display_mask().await)
            } else {
                None
            };
            let image = proxy.new_image(color, mask.as_ref(), Some(channels)).await?;
            info!("filling {}x{} with {color}", image.width(), image.height());
            proxy.show_pixels(&image).await?;
            Ok(format!("filled {}x{}", image.width(), image.height()))
        }
        Command::SetGeometry { path } => {
            let text = tokio::fs::read_to_string(&path).await?;
            let geometry: serde_json::Value = serde_json::from_str(&text)?;
            proxy.set_geometry(&geometry).await?;
            Ok(format!("stored geometry under {}", proxy.fullname("geom")))
        }
        Command::SetP2g { path } => {
            proxy.set_p2g_blob(&path).await?;
            Ok(format!("stored {} under {}", path.display(), proxy.fullname("p2g")))
        }
    }
}

fn describe(outcome: WaitOutcome) -> String {
    match outcome {
        WaitOutcome::Observed(mode) => mode,
        WaitOutcome::NotAwaited => "(not awaited)".into(),
        WaitOutcome::TimedOut { last_seen: Some(mode) } => {
            format!("timed out; last broadcast was {mode}")
        }
        WaitOutcome::TimedOut { last_seen: None } => "timed out; nothing broadcast".into(),
    }
}

// ── Tests ────────────────────────────────────────────────────────
