//! TCP substrate.
//!
//! | Module   | Purpose                                        |
//! |----------|------------------------------------------------|
//! | `wire`   | Frame types exchanged by client and server     |
//! | `codec`  | Length-prefixed bincode framing                |
//! | `client` | [`RemoteTransport`], the client-side transport |
//! | `server` | Accept loop serving a `DisplayServer`          |

pub mod client;
pub mod codec;
pub mod server;
pub mod wire;

pub use client::{DEFAULT_CALL_TIMEOUT, RemoteTransport};
pub use codec::{ClientCodec, MAX_FRAME_SIZE, ServerCodec, WireCodec};
pub use server::{serve, serve_until_quit};
pub use wire::{ClientFrame, Reply, ServerFrame};
