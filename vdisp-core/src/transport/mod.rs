//! Messaging substrate between the client and a display server.
//!
//! The client only needs four primitives from the substrate:
//!
//! | Primitive            | Used for                                      |
//! |----------------------|-----------------------------------------------|
//! | `call`               | named request/response endpoints              |
//! | `get_param`/`set_param` | shared parameter store                     |
//! | `subscribe`/`publish`| latched string-valued broadcast topics        |
//! | `has_endpoint`       | waiting for a server to come up               |
//!
//! Two implementations ship with the crate: [`LoopbackTransport`]
//! (in-process, talks to a [`DisplayServer`](crate::server::DisplayServer)
//! directly) and [`RemoteTransport`](crate::net::RemoteTransport) (TCP).

pub mod loopback;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;

pub use loopback::LoopbackTransport;

// ── Endpoint names ───────────────────────────────────────────────

pub const SET_MODE_ENDPOINT: &str = "set_display_server_mode";
pub const RETURN_TO_STANDBY_ENDPOINT: &str = "return_to_standby";
pub const GET_DISPLAY_INFO_ENDPOINT: &str = "get_display_info";
pub const BLIT_ENDPOINT: &str = "blit_compressed_image";

/// Per-server broadcast topic carrying the current mode.
pub const STIMULUS_MODE_TOPIC: &str = "stimulus_mode";

/// Namespace-global topic written by [`publish_stimulus_mode`](crate::mode::publish_stimulus_mode).
pub const GLOBAL_STIMULUS_MODE_TOPIC: &str = "/stimulus_mode";

// ── Request / Response ───────────────────────────────────────────

/// A request sent to one of the server's endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    SetDisplayServerMode { mode: String },
    ReturnToStandby,
    GetDisplayInfo,
    BlitCompressedImage { format: String, data: Vec<u8> },
}

impl Request {
    /// Endpoint name (relative to the server) this request targets.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Request::SetDisplayServerMode { .. } => SET_MODE_ENDPOINT,
            Request::ReturnToStandby => RETURN_TO_STANDBY_ENDPOINT,
            Request::GetDisplayInfo => GET_DISPLAY_INFO_ENDPOINT,
            Request::BlitCompressedImage { .. } => BLIT_ENDPOINT,
        }
    }
}

/// A successful reply from an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    Ack,
    DisplayInfo { info_json: String },
}

/// A value held in the parameter store.
///
/// JSON values travel as text so the binary wire codec never has to
/// deserialize self-describing data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamValue {
    Json(String),
    Binary(Vec<u8>),
}

impl ParamValue {
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        Ok(ParamValue::Json(serde_json::to_string(value)?))
    }
}

// ── Subscription ─────────────────────────────────────────────────

type ReleaseFn = Box<dyn FnOnce() + Send + Sync>;

/// One live subscription to a broadcast topic.
///
/// Messages arrive in publish order, starting with the topic's retained
/// value if one exists. Dropping the subscription unsubscribes.
pub struct Subscription {
    topic: String,
    rx: mpsc::UnboundedReceiver<String>,
    release: Option<ReleaseFn>,
}

impl Subscription {
    pub fn new(topic: impl Into<String>, rx: mpsc::UnboundedReceiver<String>) -> Self {
        Self {
            topic: topic.into(),
            rx,
            release: None,
        }
    }

    /// Run `f` when the subscription is dropped.
    pub fn on_release<F>(mut self, f: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        self.release = Some(Box::new(f));
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next message, or `None` once the publisher side is gone.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

// ── Transport ────────────────────────────────────────────────────

/// Opaque messaging substrate.
///
/// All names passed in are fully resolved (`/<server>/<endpoint>`).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Call a request/response endpoint and wait for its reply.
    async fn call(&self, endpoint: &str, request: Request) -> Result<Response>;

    /// Whether an endpoint is currently being served.
    async fn has_endpoint(&self, endpoint: &str) -> Result<bool>;

    /// One-shot parameter read. `Ok(None)` when the key is unset.
    async fn get_param(&self, key: &str) -> Result<Option<ParamValue>>;

    async fn set_param(&self, key: &str, value: ParamValue) -> Result<()>;

    /// Subscribe to a latched topic.
    async fn subscribe(&self, topic: &str) -> Result<Subscription>;

    /// Publish a value that is retained for late subscribers.
    async fn publish(&self, topic: &str, data: &str) -> Result<()>;
}

// ── Name resolution ──────────────────────────────────────────────

/// Default logical name of the display server.
pub const DEFAULT_SERVER_NAME: &str = "display_server";

/// Resolve a logical name against a namespace.
///
/// Absolute names (leading `/`) are returned unchanged. An empty name
/// resolves [`DEFAULT_SERVER_NAME`].
pub fn resolve_name(namespace: &str, name: &str) -> String {
    let name = if name.is_empty() { DEFAULT_SERVER_NAME } else { name };
    if name.starts_with('/') {
        return name.trim_end_matches('/').to_string();
    }
    let ns = namespace.trim_end_matches('/');
    format!("{ns}/{name}")
}

// ── Tests ────────────────────────────────────────────────────────
