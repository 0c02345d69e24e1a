//! # vdisp-core
//!
//! Control-plane client for display servers that drive one physical
//! framebuffer split into polygonal *virtual displays*.
//!
//! This crate contains:
//! - **Geometry**: `DisplayInfo`, `VirtualDisplay`, `Point`
//! - **Info cache**: `DisplayInfoCache` with pluggable `InfoSource` providers
//! - **Modes**: `ModeController`, request/acknowledge plus broadcast confirmation
//! - **Masks**: per-virtual-display `Mask` rasterization and union
//! - **Images**: masked framebuffer images and blitting
//! - **Client**: `DisplayServerProxy`, one handle per server
//! - **Transport**: the `Transport` trait, an in-process loopback and a TCP substrate
//! - **Server**: `DisplayServer`, a simulated server for tests and tooling
//! - **Error**: `DisplayError`, a `thiserror`-based error hierarchy

pub mod client;
pub mod error;
pub mod image;
pub mod info;
pub mod mask;
pub mod mode;
pub mod net;
pub mod server;
pub mod transport;
pub mod types;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use client::{ClientOptions, DisplayServerProxy};
pub use error::{DisplayError, Result};
pub use image::{Image, new_image};
pub use info::{DisplayInfoCache, InfoSource, InfoStatus, ParamStoreSource, ServiceSource};
pub use mask::{Mask, fill_polygon};
pub use mode::{
    BLIT_2D_MODE, LEGACY_BLIT_2D_MODE, ModeController, QUIT_MODE, STANDBY_BROADCAST_MODE,
    STANDBY_MODE, WaitOutcome, publish_stimulus_mode,
};
pub use net::{RemoteTransport, serve, serve_until_quit};
pub use server::{DisplayServer, ServerOptions};
pub use transport::{LoopbackTransport, ParamValue, Request, Response, Subscription, Transport};
pub use types::{DisplayInfo, Point, VirtualDisplay};
