//! Mode synchronization with the display server.
//!
//! # Protocol
//!
//! ```text
//! Client ──[set_display_server_mode(M)]────► Server
//! Client ◄─────────────────────────[ack]──── Server
//! Client ──subscribe <server>/stimulus_mode─► (latched)
//! Client ◄──── "..." , "..." , "M" ───────── Server     wait for M
//! Client ──unsubscribe──────────────────────►
//! ```
//!
//! The ack only says the server accepted the request. Other listeners
//! may not have seen the change yet, so callers are released only once
//! the broadcast channel reports the requested mode.
//!
//! Standby uses two different names: the client compares against
//! [`STANDBY_MODE`] but the server broadcasts [`STANDBY_BROADCAST_MODE`]
//! after `return_to_standby`. They are not synonyms.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{DisplayError, Result};
use crate::transport::{
    GLOBAL_STIMULUS_MODE_TOPIC, RETURN_TO_STANDBY_ENDPOINT, Request, Response, SET_MODE_ENDPOINT,
    STIMULUS_MODE_TOPIC, Transport,
};

// ── Mode names ───────────────────────────────────────────────────

/// Standby token compared against by [`ModeController::enter_standby`].
pub const STANDBY_MODE: &str = "standby";

/// Standby identifier broadcast by the server after `return_to_standby`.
pub const STANDBY_BROADCAST_MODE: &str = "StimulusStandby";

pub const BLIT_2D_MODE: &str = "Stimulus2DBlit";

/// Deprecated alias of [`BLIT_2D_MODE`].
pub const LEGACY_BLIT_2D_MODE: &str = "display2d";

/// Terminal request; the server never confirms it on the broadcast channel.
pub const QUIT_MODE: &str = "quit";

/// Apply the legacy name translation.
pub fn translate_mode(requested: &str) -> &str {
    if requested == LEGACY_BLIT_2D_MODE {
        warn!("translating deprecated mode name '{LEGACY_BLIT_2D_MODE}' -> '{BLIT_2D_MODE}'");
        BLIT_2D_MODE
    } else {
        requested
    }
}

// ── WaitOutcome ──────────────────────────────────────────────────

/// Result of waiting on the broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A satisfying broadcast was observed.
    Observed(String),
    /// No wait was needed (e.g. after `quit`).
    NotAwaited,
    /// The configured timeout elapsed first.
    TimedOut { last_seen: Option<String> },
}

impl WaitOutcome {
    pub fn is_confirmed(&self) -> bool {
        !matches!(self, WaitOutcome::TimedOut { .. })
    }

    pub fn mode(&self) -> Option<&str> {
        match self {
            WaitOutcome::Observed(mode) => Some(mode),
            WaitOutcome::TimedOut { last_seen } => last_seen.as_deref(),
            WaitOutcome::NotAwaited => None,
        }
    }
}

// ── ModeController ───────────────────────────────────────────────

/// Issues mode requests and waits for their broadcast confirmation.
pub struct ModeController {
    transport: Arc<dyn Transport>,
    server_name: String,
    wait_timeout: Option<Duration>,
}

impl ModeController {
    /// `wait_timeout = None` waits forever, so a server that never
    /// broadcasts blocks the caller indefinitely.
    pub fn new(
        transport: Arc<dyn Transport>,
        server_name: impl Into<String>,
        wait_timeout: Option<Duration>,
    ) -> Self {
        Self {
            transport,
            server_name: server_name.into(),
            wait_timeout,
        }
    }

    fn fullname(&self, name: &str) -> String {
        format!("{}/{}", self.server_name, name)
    }

    async fn call_expect_ack(&self, endpoint: &str, request: Request) -> Result<()> {
        let endpoint = self.fullname(endpoint);
        match self.transport.call(&endpoint, request).await? {
            Response::Ack => Ok(()),
            _ => Err(DisplayError::UnexpectedResponse(endpoint)),
        }
    }

    /// Put the server into `requested` and wait until it is broadcast.
    pub async fn set_mode(&self, requested: &str) -> Result<WaitOutcome> {
        let mode = translate_mode(requested);
        info!("requesting mode {mode}");
        self.call_expect_ack(
            SET_MODE_ENDPOINT,
            Request::SetDisplayServerMode {
                mode: mode.to_string(),
            },
        )
        .await?;

        if mode == QUIT_MODE {
            return Ok(WaitOutcome::NotAwaited);
        }
        self.wait_for_mode(Some(mode)).await
    }

    /// The next broadcast mode (the latched value, if any).
    pub async fn get_mode(&self) -> Result<WaitOutcome> {
        self.wait_for_mode(None).await
    }

    pub async fn enter_2d_blit_mode(&self) -> Result<WaitOutcome> {
        self.set_mode(BLIT_2D_MODE).await
    }

    /// Return to standby unless the server already reports [`STANDBY_MODE`].
    pub async fn enter_standby(&self) -> Result<WaitOutcome> {
        let current = self.get_mode().await?;
        if let WaitOutcome::Observed(mode) = &current {
            if mode == STANDBY_MODE {
                debug!("already in standby");
                return Ok(current);
            }
        }

        info!("returning server to standby (current: {:?})", current.mode());
        self.call_expect_ack(RETURN_TO_STANDBY_ENDPOINT, Request::ReturnToStandby)
            .await?;
        self.wait_for_mode(Some(STANDBY_BROADCAST_MODE)).await
    }

    /// Wait for a broadcast equal to `expected`, or any broadcast when
    /// `expected` is `None`.
    ///
    /// Each call owns its subscription; it is released on return.
    pub async fn wait_for_mode(&self, expected: Option<&str>) -> Result<WaitOutcome> {
        let mut sub = self
            .transport
            .subscribe(&self.fullname(STIMULUS_MODE_TOPIC))
            .await?;
        let deadline = self.wait_timeout.map(|d| Instant::now() + d);
        let mut last_seen = None;

        loop {
            let next = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, sub.recv()).await {
                    Ok(msg) => msg,
                    Err(_) => {
                        warn!("no broadcast of {:?} on {} before timeout", expected, sub.topic());
                        return Ok(WaitOutcome::TimedOut { last_seen });
                    }
                },
                None => sub.recv().await,
            };

            let Some(mode) = next else {
                return Err(DisplayError::ChannelClosed);
            };
            debug!("{}: {mode}", sub.topic());
            if expected.is_none_or(|m| m == mode) {
                return Ok(WaitOutcome::Observed(mode));
            }
            last_seen = Some(mode);
        }
    }
}

/// Publish a latched value on the namespace-global stimulus mode topic.
pub async fn publish_stimulus_mode(transport: &dyn Transport, mode: &str) -> Result<()> {
    transport.publish(GLOBAL_STIMULUS_MODE_TOPIC, mode).await
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::server::{DisplayServer, ServerOptions};
    use crate::transport::{LoopbackTransport, ParamValue, Subscription};

    /// Loopback transport that records every request it forwards.
    struct Recording {
        inner: LoopbackTransport,
        calls: Mutex<Vec<(String, Request)>>,
    }

    impl Recording {
        fn calls_to(&self, endpoint: &str) -> Vec<Request> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(ep, _)| ep.ends_with(endpoint))
                .map(|(_, r)| r.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Transport for Recording {
        async fn call(&self, endpoint: &str, request: Request) -> Result<Response> {
            self.calls
                .lock()
                .unwrap()
                .push((endpoint.to_string(), request.clone()));
            self.inner.call(endpoint, request).await
        }
        async fn has_endpoint(&self, endpoint: &str) -> Result<bool> {
            self.inner.has_endpoint(endpoint).await
        }
        async fn get_param(&self, key: &str) -> Result<Option<ParamValue>> {
            self.inner.get_param(key).await
        }
        async fn set_param(&self, key: &str, value: ParamValue) -> Result<()> {
            self.inner.set_param(key, value).await
        }
        async fn subscribe(&self, topic: &str) -> Result<Subscription> {
            self.inner.subscribe(topic).await
        }
        async fn publish(&self, topic: &str, data: &str) -> Result<()> {
            self.inner.publish(topic, data).await
        }
    }

    fn setup(modes: &[&str], initial: &str) -> (Arc<DisplayServer>, Arc<Recording>, ModeController) {
        let server = Arc::new(DisplayServer::new(ServerOptions {
            modes: modes.iter().map(|m| m.to_string()).collect(),
            initial_mode: initial.into(),
            ..Default::default()
        }));
        let recording = Arc::new(Recording {
            inner: LoopbackTransport::new(server.clone()),
            calls: Mutex::new(Vec::new()),
        });
        let controller = ModeController::new(
            recording.clone(),
            "/display_server",
            Some(Duration::from_millis(200)),
        );
        (server, recording, controller)
    }

    #[test]
    fn legacy_name_is_translated() {
        assert_eq!(translate_mode("display2d"), BLIT_2D_MODE);
        assert_eq!(translate_mode("other"), "other");
    }

    #[tokio::test]
    async fn legacy_mode_is_sent_and_awaited_as_replacement() {
        let (server, rec, ctl) = setup(&[STANDBY_BROADCAST_MODE, BLIT_2D_MODE], STANDBY_BROADCAST_MODE);

        let outcome = ctl.set_mode(LEGACY_BLIT_2D_MODE).await.unwrap();
        assert_eq!(outcome, WaitOutcome::Observed(BLIT_2D_MODE.into()));
        assert_eq!(
            rec.calls_to(SET_MODE_ENDPOINT),
            vec![Request::SetDisplayServerMode {
                mode: BLIT_2D_MODE.into()
            }]
        );
        assert_eq!(server.mode(), BLIT_2D_MODE);
    }

    #[tokio::test]
    async fn quit_returns_without_waiting() {
        let (server, _rec, ctl) = setup(&[STANDBY_BROADCAST_MODE], STANDBY_BROADCAST_MODE);
        assert_eq!(ctl.set_mode(QUIT_MODE).await.unwrap(), WaitOutcome::NotAwaited);
        assert!(server.quit_requested());
    }

    #[tokio::test]
    async fn rejected_request_propagates() {
        let (_server, _rec, ctl) = setup(&[STANDBY_BROADCAST_MODE], STANDBY_BROADCAST_MODE);
        let err = ctl.set_mode("nonexistent").await.unwrap_err();
        assert!(matches!(err, DisplayError::Rejected { .. }));
    }

    #[tokio::test]
    async fn get_mode_returns_latched_value() {
        let (_server, _rec, ctl) = setup(&[BLIT_2D_MODE], BLIT_2D_MODE);
        assert_eq!(ctl.get_mode().await.unwrap(), WaitOutcome::Observed(BLIT_2D_MODE.into()));
    }

    #[tokio::test]
    async fn standby_skipped_when_already_standby() {
        let (_server, rec, ctl) = setup(&[STANDBY_MODE], STANDBY_MODE);
        let outcome = ctl.enter_standby().await.unwrap();
        assert_eq!(outcome, WaitOutcome::Observed(STANDBY_MODE.into()));
        assert!(rec.calls_to(RETURN_TO_STANDBY_ENDPOINT).is_empty());
    }

    #[tokio::test]
    async fn standby_requested_once_otherwise() {
        let (server, rec, ctl) = setup(&[BLIT_2D_MODE], BLIT_2D_MODE);
        let outcome = ctl.enter_standby().await.unwrap();
        assert_eq!(outcome, WaitOutcome::Observed(STANDBY_BROADCAST_MODE.into()));
        assert_eq!(rec.calls_to(RETURN_TO_STANDBY_ENDPOINT).len(), 1);
        assert_eq!(server.mode(), STANDBY_BROADCAST_MODE);
    }

    #[tokio::test]
    async fn wait_times_out_with_last_seen() {
        let (_server, _rec, ctl) = setup(&[BLIT_2D_MODE], BLIT_2D_MODE);
        let outcome = ctl.wait_for_mode(Some("NeverBroadcast")).await.unwrap();
        assert_eq!(
            outcome,
            WaitOutcome::TimedOut {
                last_seen: Some(BLIT_2D_MODE.into())
            }
        );
        assert!(!outcome.is_confirmed());
    }

    #[tokio::test]
    async fn wait_releases_its_subscription() {
        let (server, _rec, ctl) = setup(&[BLIT_2D_MODE], BLIT_2D_MODE);
        ctl.get_mode().await.unwrap();
        assert_eq!(
            server.broker().subscriber_count("/display_server/stimulus_mode"),
            0
        );
    }

    #[tokio::test]
    async fn publish_goes_to_global_topic() {
        let (server, rec, _ctl) = setup(&[BLIT_2D_MODE], BLIT_2D_MODE);
        publish_stimulus_mode(rec.as_ref(), "Stimulus3D").await.unwrap();
        assert_eq!(
            server.broker().latched(GLOBAL_STIMULUS_MODE_TOPIC).as_deref(),
            Some("Stimulus3D")
        );
    }
}
