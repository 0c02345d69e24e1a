//! Display info fetching and caching.
//!
//! The server's geometry comes from one of two providers, picked once
//! when the client is built:
//!
//! - [`ParamStoreSource`] reads the pre-published `<server>/display`
//!   parameter;
//! - [`ServiceSource`] asks the live server via `get_display_info`.
//!
//! [`DisplayInfoCache`] memoizes the result. A failed fetch never
//! raises: the previous value is kept and the outcome is reported as an
//! [`InfoStatus`] so callers can pick lenient or strict handling.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{DisplayError, Result};
use crate::transport::{ParamValue, Request, Response, Transport};
use crate::types::DisplayInfo;

// ── InfoSource ───────────────────────────────────────────────────

/// A provider of the server's declared geometry.
#[async_trait]
pub trait InfoSource: Send + Sync {
    async fn fetch(&self) -> Result<DisplayInfo>;

    /// Short label used in log lines.
    fn describe(&self) -> String;
}

/// Reads `<server>/display` from the shared parameter store.
pub struct ParamStoreSource {
    transport: Arc<dyn Transport>,
    key: String,
}

impl ParamStoreSource {
    pub fn new(transport: Arc<dyn Transport>, key: impl Into<String>) -> Self {
        Self {
            transport,
            key: key.into(),
        }
    }
}

#[async_trait]
impl InfoSource for ParamStoreSource {
    async fn fetch(&self) -> Result<DisplayInfo> {
        match self.transport.get_param(&self.key).await? {
            Some(ParamValue::Json(text)) => Ok(DisplayInfo::from_json(&text)?),
            Some(ParamValue::Binary(_)) => Err(DisplayError::ParamType(self.key.clone())),
            None => Err(DisplayError::MissingParam(self.key.clone())),
        }
    }

    fn describe(&self) -> String {
        format!("param {}", self.key)
    }
}

/// Calls the server's `get_display_info` endpoint.
pub struct ServiceSource {
    transport: Arc<dyn Transport>,
    endpoint: String,
}

impl ServiceSource {
    pub fn new(transport: Arc<dyn Transport>, endpoint: impl Into<String>) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl InfoSource for ServiceSource {
    async fn fetch(&self) -> Result<DisplayInfo> {
        match self
            .transport
            .call(&self.endpoint, Request::GetDisplayInfo)
            .await?
        {
            Response::DisplayInfo { info_json } => Ok(DisplayInfo::from_json(&info_json)?),
            Response::Ack => Err(DisplayError::UnexpectedResponse(self.endpoint.clone())),
        }
    }

    fn describe(&self) -> String {
        format!("service {}", self.endpoint)
    }
}

// ── InfoStatus ───────────────────────────────────────────────────

/// Outcome of a cache lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfoStatus {
    /// The most recent fetch succeeded.
    Fresh(DisplayInfo),
    /// The most recent refresh failed; this is the last good value.
    Stale(DisplayInfo, String),
    /// Nothing has ever been fetched successfully.
    Unknown(String),
}

impl InfoStatus {
    pub fn is_fresh(&self) -> bool {
        matches!(self, InfoStatus::Fresh(_))
    }

    /// Lenient view: unknown geometry becomes an empty 0×0 display.
    pub fn info_or_default(self) -> DisplayInfo {
        match self {
            InfoStatus::Fresh(info) | InfoStatus::Stale(info, _) => info,
            InfoStatus::Unknown(_) => DisplayInfo::default(),
        }
    }

    /// Any known value, stale or not.
    pub fn into_result(self) -> Result<DisplayInfo> {
        match self {
            InfoStatus::Fresh(info) | InfoStatus::Stale(info, _) => Ok(info),
            InfoStatus::Unknown(reason) => Err(DisplayError::InfoUnavailable(reason)),
        }
    }

    /// Strict view: only a value whose latest fetch succeeded.
    pub fn require_fresh(self) -> Result<DisplayInfo> {
        match self {
            InfoStatus::Fresh(info) => Ok(info),
            InfoStatus::Stale(_, reason) | InfoStatus::Unknown(reason) => {
                Err(DisplayError::InfoUnavailable(reason))
            }
        }
    }
}

// ── DisplayInfoCache ─────────────────────────────────────────────

#[derive(Default)]
struct CacheState {
    info: Option<DisplayInfo>,
    failure: Option<String>,
}

impl CacheState {
    fn status(&self) -> InfoStatus {
        match (&self.info, &self.failure) {
            (Some(info), None) => InfoStatus::Fresh(info.clone()),
            (Some(info), Some(reason)) => InfoStatus::Stale(info.clone(), reason.clone()),
            (None, Some(reason)) => InfoStatus::Unknown(reason.clone()),
            (None, None) => InfoStatus::Unknown("not fetched".into()),
        }
    }
}

/// Single-writer cache of the server's [`DisplayInfo`].
pub struct DisplayInfoCache {
    source: Box<dyn InfoSource>,
    state: Mutex<CacheState>,
}

impl DisplayInfoCache {
    pub fn new(source: Box<dyn InfoSource>) -> Self {
        Self {
            source,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Cached geometry, fetched first when empty or `force_refresh`.
    pub async fn get(&self, force_refresh: bool) -> InfoStatus {
        let mut state = self.state.lock().await;
        if force_refresh || state.info.is_none() {
            match self.source.fetch().await {
                Ok(info) => {
                    debug!(
                        "fetched display info from {}: {}x{}, {} virtual displays",
                        self.source.describe(),
                        info.width,
                        info.height,
                        info.virtual_displays.len()
                    );
                    state.info = Some(info);
                    state.failure = None;
                }
                Err(e) => {
                    warn!("display info fetch from {} failed: {e}", self.source.describe());
                    state.failure = Some(e.to_string());
                }
            }
        }
        state.status()
    }

    /// Drop the cached value; the next `get` fetches again.
    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        state.info = None;
        state.failure = None;
    }

    /// Cached value without fetching.
    pub async fn peek(&self) -> Option<DisplayInfo> {
        self.state.lock().await.info.clone()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::server::{DisplayServer, ServerOptions};
    use crate::transport::LoopbackTransport;

    /// Replays a fixed list of outcomes, then keeps failing.
    struct ScriptedSource {
        outcomes: std::sync::Mutex<Vec<Result<DisplayInfo>>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(mut outcomes: Vec<Result<DisplayInfo>>) -> Self {
            outcomes.reverse();
            Self {
                outcomes: std::sync::Mutex::new(outcomes),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl InfoSource for ScriptedSource {
        async fn fetch(&self) -> Result<DisplayInfo> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err("exhausted".into()))
        }

        fn describe(&self) -> String {
            "script".into()
        }
    }

    fn info(width: u32) -> DisplayInfo {
        DisplayInfo::new(width, 10, Vec::new())
    }

    #[tokio::test]
    async fn first_failure_is_unknown() {
        let cache = DisplayInfoCache::new(Box::new(ScriptedSource::new(vec![Err("down".into())])));
        let status = cache.get(false).await;
        assert!(matches!(&status, InfoStatus::Unknown(r) if r.contains("down")));
        assert_eq!(status.info_or_default(), DisplayInfo::default());
    }

    #[tokio::test]
    async fn cached_value_is_reused() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(info(5))]));
        struct Shared(Arc<ScriptedSource>);
        #[async_trait]
        impl InfoSource for Shared {
            async fn fetch(&self) -> Result<DisplayInfo> {
                self.0.fetch().await
            }
            fn describe(&self) -> String {
                self.0.describe()
            }
        }

        let cache = DisplayInfoCache::new(Box::new(Shared(source.clone())));
        assert_eq!(cache.get(false).await, InfoStatus::Fresh(info(5)));
        assert_eq!(cache.get(false).await, InfoStatus::Fresh(info(5)));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_value() {
        let cache = DisplayInfoCache::new(Box::new(ScriptedSource::new(vec![
            Ok(info(5)),
            Err("hiccup".into()),
            Ok(info(7)),
        ])));
        assert!(cache.get(false).await.is_fresh());

        let stale = cache.get(true).await;
        assert!(matches!(&stale, InfoStatus::Stale(i, r) if i.width == 5 && r.contains("hiccup")));
        assert!(stale.clone().require_fresh().is_err());
        assert_eq!(stale.into_result().unwrap().width, 5);

        assert_eq!(cache.get(true).await, InfoStatus::Fresh(info(7)));
    }

    #[tokio::test]
    async fn invalidate_forces_fetch() {
        let cache = DisplayInfoCache::new(Box::new(ScriptedSource::new(vec![Ok(info(1)), Ok(info(2))])));
        cache.get(false).await;
        cache.invalidate().await;
        assert!(cache.peek().await.is_none());
        assert_eq!(cache.get(false).await, InfoStatus::Fresh(info(2)));
    }

    #[tokio::test]
    async fn both_providers_read_the_same_geometry() {
        let server = Arc::new(DisplayServer::new(ServerOptions {
            info: info(42),
            ..Default::default()
        }));
        let transport: Arc<dyn Transport> = Arc::new(LoopbackTransport::new(server));

        let param = ParamStoreSource::new(transport.clone(), "/display_server/display");
        let service = ServiceSource::new(transport.clone(), "/display_server/get_display_info");
        assert_eq!(param.fetch().await.unwrap().width, 42);
        assert_eq!(service.fetch().await.unwrap().width, 42);

        let missing = ParamStoreSource::new(transport, "/nobody/display");
        assert!(matches!(missing.fetch().await, Err(DisplayError::MissingParam(_))));
    }
}
