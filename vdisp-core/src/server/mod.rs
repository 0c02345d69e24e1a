//! Simulated display server.
//!
//! Models the protocol-visible state of a display server: the current
//! mode and its latched broadcast, the declared geometry, the shared
//! parameter store and the last blitted image. Nothing is rendered.
//!
//! The same [`DisplayServer`] backs both the in-process
//! [`LoopbackTransport`](crate::transport::LoopbackTransport) and the
//! TCP [`serve`](crate::net::serve) loop.

pub mod broker;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::mode::{BLIT_2D_MODE, QUIT_MODE, STANDBY_BROADCAST_MODE};
use crate::transport::{ParamValue, Request, Response, STIMULUS_MODE_TOPIC};
use crate::types::DisplayInfo;

pub use broker::Broker;

// ── ServerOptions ────────────────────────────────────────────────

/// Construction parameters for a [`DisplayServer`].
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Fully resolved server name, e.g. `/display_server`.
    pub name: String,
    /// Declared framebuffer geometry.
    pub info: DisplayInfo,
    /// Modes accepted by `set_display_server_mode`.
    pub modes: Vec<String>,
    /// Mode broadcast at startup.
    pub initial_mode: String,
    /// When `false`, `get_display_info` rejects every request.
    pub serve_display_info: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            name: format!("/{}", crate::transport::DEFAULT_SERVER_NAME),
            info: DisplayInfo::default(),
            modes: vec![STANDBY_BROADCAST_MODE.into(), BLIT_2D_MODE.into()],
            initial_mode: STANDBY_BROADCAST_MODE.into(),
            serve_display_info: true,
        }
    }
}

/// Metadata of the most recent `blit_compressed_image` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlitRecord {
    pub format: String,
    pub data: Vec<u8>,
}

#[derive(Default)]
struct ServerState {
    mode: String,
    last_blit: Option<BlitRecord>,
    served: HashMap<&'static str, u64>,
}

// ── DisplayServer ────────────────────────────────────────────────

/// Protocol state of one display server.
pub struct DisplayServer {
    name: String,
    modes: Vec<String>,
    info: Mutex<DisplayInfo>,
    serve_display_info: AtomicBool,
    state: Mutex<ServerState>,
    params: Mutex<HashMap<String, ParamValue>>,
    broker: Broker,
    quit_tx: watch::Sender<bool>,
}

impl DisplayServer {
    pub fn new(options: ServerOptions) -> Self {
        let (quit_tx, _) = watch::channel(false);
        let server = Self {
            name: options.name,
            modes: options.modes,
            info: Mutex::new(DisplayInfo::default()),
            serve_display_info: AtomicBool::new(options.serve_display_info),
            state: Mutex::new(ServerState::default()),
            params: Mutex::new(HashMap::new()),
            broker: Broker::new(),
            quit_tx,
        };
        server.set_display_info(options.info);
        server.broadcast_mode(&options.initial_mode);
        server
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn params(&self) -> MutexGuard<'_, HashMap<String, ParamValue>> {
        self.params.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn fullname(&self, name: &str) -> String {
        format!("{}/{}", self.name, name)
    }

    /// Replace the declared geometry and its `<name>/display` parameter.
    pub fn set_display_info(&self, info: DisplayInfo) {
        match info.to_json() {
            Ok(json) => {
                self.params()
                    .insert(self.fullname("display"), ParamValue::Json(json));
            }
            Err(e) => warn!("cannot encode display info: {e}"),
        }
        *self.info.lock().unwrap_or_else(|e| e.into_inner()) = info;
    }

    pub fn set_serve_display_info(&self, enabled: bool) {
        self.serve_display_info.store(enabled, Ordering::SeqCst);
    }

    /// Currently active mode.
    pub fn mode(&self) -> String {
        self.state().mode.clone()
    }

    pub fn last_blit(&self) -> Option<BlitRecord> {
        self.state().last_blit.clone()
    }

    /// How many successful requests an endpoint has served.
    pub fn served(&self, endpoint: &str) -> u64 {
        self.state().served.get(endpoint).copied().unwrap_or(0)
    }

    /// Receiver that flips to `true` once `quit` has been requested.
    pub fn quit_receiver(&self) -> watch::Receiver<bool> {
        self.quit_tx.subscribe()
    }

    pub fn quit_requested(&self) -> bool {
        *self.quit_tx.borrow()
    }

    fn broadcast_mode(&self, mode: &str) {
        self.state().mode = mode.to_string();
        self.broker.publish(&self.fullname(STIMULUS_MODE_TOPIC), mode);
    }

    /// Whether `endpoint` (fully resolved) is served here.
    pub fn has_endpoint(&self, endpoint: &str) -> bool {
        self.local_endpoint(endpoint).is_some()
    }

    fn local_endpoint<'a>(&self, endpoint: &'a str) -> Option<&'a str> {
        let local = endpoint.strip_prefix(self.name.as_str())?.strip_prefix('/')?;
        [
            crate::transport::SET_MODE_ENDPOINT,
            crate::transport::RETURN_TO_STANDBY_ENDPOINT,
            crate::transport::GET_DISPLAY_INFO_ENDPOINT,
            crate::transport::BLIT_ENDPOINT,
        ]
        .contains(&local)
        .then_some(local)
    }

    /// Serve one request. `Err` carries the rejection reason.
    pub fn handle(&self, endpoint: &str, request: Request) -> Result<Response, String> {
        match self.local_endpoint(endpoint) {
            Some(local) if local == request.endpoint() => {}
            Some(local) => {
                return Err(format!(
                    "endpoint {local} cannot serve {}",
                    request.endpoint()
                ));
            }
            None => return Err(format!("no such endpoint: {endpoint}")),
        }

        let kind = request.endpoint();
        let response = match request {
            Request::SetDisplayServerMode { mode } => self.set_mode(mode)?,
            Request::ReturnToStandby => {
                info!("returning to standby");
                self.broadcast_mode(STANDBY_BROADCAST_MODE);
                Response::Ack
            }
            Request::GetDisplayInfo => {
                if !self.serve_display_info.load(Ordering::SeqCst) {
                    return Err("display info unavailable".into());
                }
                let info = self.info.lock().unwrap_or_else(|e| e.into_inner());
                let info_json = info.to_json().map_err(|e| e.to_string())?;
                Response::DisplayInfo { info_json }
            }
            Request::BlitCompressedImage { format, data } => {
                debug!("blit {} bytes as {format}", data.len());
                self.state().last_blit = Some(BlitRecord { format, data });
                Response::Ack
            }
        };

        *self.state().served.entry(kind).or_insert(0) += 1;
        Ok(response)
    }

    fn set_mode(&self, mode: String) -> Result<Response, String> {
        if mode == QUIT_MODE {
            info!("quit requested");
            self.quit_tx.send_replace(true);
            return Ok(Response::Ack);
        }
        if !self.modes.iter().any(|m| *m == mode) {
            return Err(format!("unknown mode '{mode}'"));
        }
        info!("entering mode {mode}");
        self.broadcast_mode(&mode);
        Ok(Response::Ack)
    }

    // ── Parameter store ──────────────────────────────────────────

    pub fn get_param(&self, key: &str) -> Option<ParamValue> {
        self.params().get(key).cloned()
    }

    pub fn set_param(&self, key: &str, value: ParamValue) {
        self.params().insert(key.to_string(), value);
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Point, VirtualDisplay};

    fn server() -> DisplayServer {
        DisplayServer::new(ServerOptions {
            info: DisplayInfo::new(
                8,
                8,
                vec![VirtualDisplay::new("v", vec![Point::new(0, 0), Point::new(7, 7)])],
            ),
            ..Default::default()
        })
    }

    #[test]
    fn initial_mode_is_broadcast() {
        let srv = server();
        assert_eq!(srv.mode(), STANDBY_BROADCAST_MODE);
        assert_eq!(
            srv.broker().latched("/display_server/stimulus_mode").as_deref(),
            Some(STANDBY_BROADCAST_MODE)
        );
    }

    #[test]
    fn display_param_is_seeded() {
        let srv = server();
        let Some(ParamValue::Json(json)) = srv.get_param("/display_server/display") else {
            panic!("display param missing");
        };
        assert_eq!(DisplayInfo::from_json(&json).unwrap().width, 8);
    }

    #[test]
    fn set_mode_broadcasts_known_modes_only() {
        let srv = server();
        let ep = "/display_server/set_display_server_mode";

        let ok = srv.handle(ep, Request::SetDisplayServerMode { mode: BLIT_2D_MODE.into() });
        assert_eq!(ok, Ok(Response::Ack));
        assert_eq!(srv.mode(), BLIT_2D_MODE);

        let err = srv.handle(ep, Request::SetDisplayServerMode { mode: "bogus".into() });
        assert!(err.unwrap_err().contains("bogus"));
        assert_eq!(srv.mode(), BLIT_2D_MODE);
        assert_eq!(srv.served(crate::transport::SET_MODE_ENDPOINT), 1);
    }

    #[test]
    fn quit_sets_flag_without_broadcast() {
        let srv = server();
        let ep = "/display_server/set_display_server_mode";
        srv.handle(ep, Request::SetDisplayServerMode { mode: QUIT_MODE.into() })
            .unwrap();
        assert!(srv.quit_requested());
        assert_eq!(srv.mode(), STANDBY_BROADCAST_MODE);
    }

    #[test]
    fn rejects_foreign_and_mismatched_endpoints() {
        let srv = server();
        assert!(srv.handle("/other/get_display_info", Request::GetDisplayInfo).is_err());
        assert!(srv.handle("/display_server/return_to_standby", Request::GetDisplayInfo).is_err());
        assert!(srv.has_endpoint("/display_server/blit_compressed_image"));
        assert!(!srv.has_endpoint("/display_server/nope"));
    }

    #[test]
    fn display_info_can_be_disabled() {
        let srv = server();
        let ep = "/display_server/get_display_info";
        assert!(matches!(
            srv.handle(ep, Request::GetDisplayInfo),
            Ok(Response::DisplayInfo { .. })
        ));
        srv.set_serve_display_info(false);
        assert!(srv.handle(ep, Request::GetDisplayInfo).is_err());
    }

    #[test]
    fn blit_is_recorded() {
        let srv = server();
        srv.handle(
            "/display_server/blit_compressed_image",
            Request::BlitCompressedImage {
                format: ".png".into(),
                data: vec![1, 2, 3],
            },
        )
        .unwrap();
        let blit = srv.last_blit().unwrap();
        assert_eq!(blit.format, ".png");
        assert_eq!(blit.data, vec![1, 2, 3]);
    }
}
