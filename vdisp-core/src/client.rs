//! Client handle for one display server.
//!
//! [`DisplayServerProxy`] ties together the info cache, the mode
//! controller, the mask engine and image delivery for a single server
//! identified by its resolved name. Handles never share cached state.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{DisplayError, Result};
use crate::image::{self, Image};
use crate::info::{DisplayInfoCache, InfoSource, InfoStatus, ParamStoreSource, ServiceSource};
use crate::mask::{self, Mask};
use crate::mode::{ModeController, WaitOutcome};
use crate::transport::{
    BLIT_ENDPOINT, GET_DISPLAY_INFO_ENDPOINT, ParamValue, Request, Response, SET_MODE_ENDPOINT,
    Transport, resolve_name,
};
use crate::types::{DisplayInfo, Point};

// ── ClientOptions ────────────────────────────────────────────────

/// Construction options for [`DisplayServerProxy`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Read geometry from the parameter store instead of the live server.
    pub prefer_param_store: bool,
    /// Block in [`DisplayServerProxy::connect`] until the server is up,
    /// then prime the info cache.
    pub wait_for_server: bool,
    /// Polling period while waiting for the server.
    pub poll_interval: Duration,
    /// Broadcast wait limit. `None` waits forever.
    pub wait_timeout: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            prefer_param_store: false,
            wait_for_server: false,
            poll_interval: Duration::from_millis(100),
            wait_timeout: None,
        }
    }
}

// ── DisplayServerProxy ───────────────────────────────────────────

pub struct DisplayServerProxy {
    name: String,
    transport: Arc<dyn Transport>,
    cache: DisplayInfoCache,
    modes: ModeController,
}

impl DisplayServerProxy {
    /// Build a handle for `name` (resolved against `/`; empty means
    /// `display_server`). Nothing is sent to the server.
    pub fn new(transport: Arc<dyn Transport>, name: &str, options: &ClientOptions) -> Self {
        let name = resolve_name("/", name);
        info!("trying display server: {name}");

        let source: Box<dyn InfoSource> = if options.prefer_param_store {
            warn!("display properties will be read from the parameter store, not the server");
            Box::new(ParamStoreSource::new(
                Arc::clone(&transport),
                format!("{name}/display"),
            ))
        } else {
            Box::new(ServiceSource::new(
                Arc::clone(&transport),
                format!("{name}/{GET_DISPLAY_INFO_ENDPOINT}"),
            ))
        };

        Self {
            modes: ModeController::new(Arc::clone(&transport), name.clone(), options.wait_timeout),
            cache: DisplayInfoCache::new(source),
            transport,
            name,
        }
    }

    /// Build a handle and, if requested, wait for the server and prime
    /// the info cache.
    pub async fn connect(
        transport: Arc<dyn Transport>,
        name: &str,
        options: &ClientOptions,
    ) -> Result<Self> {
        let proxy = Self::new(transport, name, options);
        if options.wait_for_server {
            proxy.wait_for_server(options.poll_interval).await?;
            proxy.display_info_status(true).await;
        }
        Ok(proxy)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `<server>/<name>`.
    pub fn fullname(&self, name: &str) -> String {
        format!("{}/{}", self.name, name)
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn modes(&self) -> &ModeController {
        &self.modes
    }

    /// Poll until the server's mode endpoint is served.
    pub async fn wait_for_server(&self, poll_interval: Duration) -> Result<()> {
        let endpoint = self.fullname(SET_MODE_ENDPOINT);
        info!("waiting for display server: {}", self.name);
        let mut ticker = tokio::time::interval(poll_interval);
        loop {
            ticker.tick().await;
            if self.transport.has_endpoint(&endpoint).await? {
                debug!("{endpoint} is available");
                return Ok(());
            }
        }
    }

    // ── Display info ─────────────────────────────────────────────

    /// Cached geometry with its freshness.
    pub async fn display_info_status(&self, force_refresh: bool) -> InfoStatus {
        self.cache.get(force_refresh).await
    }

    /// Cached geometry; 0×0 with no virtual displays when unknown.
    pub async fn get_display_info(&self, force_refresh: bool) -> DisplayInfo {
        self.cache.get(force_refresh).await.info_or_default()
    }

    pub async fn invalidate_display_info(&self) {
        self.cache.invalidate().await;
    }

    pub async fn width(&self) -> u32 {
        self.get_display_info(false).await.width
    }

    pub async fn height(&self) -> u32 {
        self.get_display_info(false).await.height
    }

    pub async fn find_viewport_index(&self, name: &str) -> Option<usize> {
        self.get_display_info(false).await.find_viewport_index(name)
    }

    // ── Modes ────────────────────────────────────────────────────

    pub async fn set_mode(&self, mode: &str) -> Result<WaitOutcome> {
        self.modes.set_mode(mode).await
    }

    pub async fn get_mode(&self) -> Result<WaitOutcome> {
        self.modes.get_mode().await
    }

    pub async fn enter_standby_mode(&self) -> Result<WaitOutcome> {
        self.modes.enter_standby().await
    }

    pub async fn enter_2d_blit_mode(&self) -> Result<WaitOutcome> {
        self.modes.enter_2d_blit_mode().await
    }

    // ── Masks ────────────────────────────────────────────────────

    /// Viewport of `vdisp_name`, or `[]` if any vertex is out of bounds.
    pub async fn get_virtual_display_points(&self, vdisp_name: &str) -> Vec<Point> {
        let info = self.get_display_info(false).await;
        mask::virtual_display_points(&info, vdisp_name)
    }

    pub async fn get_virtual_display_mask(&self, vdisp_name: &str) -> Mask {
        let info = self.get_display_info(false).await;
        mask::virtual_display_mask(&info, vdisp_name)
    }

    /// Logical OR of every virtual display's mask.
    pub async fn get_display_mask(&self) -> Mask {
        let info = self.get_display_info(false).await;
        mask::display_mask(&info)
    }

    // ── Images ───────────────────────────────────────────────────

    /// Framebuffer-sized image filled with `color`, optionally masked.
    pub async fn new_image<T: Copy + Default>(
        &self,
        color: T,
        mask: Option<&Mask>,
        channels: Option<usize>,
    ) -> Result<Image<T>> {
        let info = self.get_display_info(false).await;
        image::new_image(info.width, info.height, color, mask, channels)
    }

    /// Send already-encoded image bytes to the server.
    pub async fn blit(&self, format: &str, data: Vec<u8>) -> Result<()> {
        let endpoint = self.fullname(BLIT_ENDPOINT);
        let request = Request::BlitCompressedImage {
            format: format.to_string(),
            data,
        };
        match self.transport.call(&endpoint, request).await? {
            Response::Ack => Ok(()),
            _ => Err(DisplayError::UnexpectedResponse(endpoint)),
        }
    }

    /// Encode and display a grayscale or RGB image.
    pub async fn show_pixels(&self, image: &Image<u8>) -> Result<()> {
        let (format, data) = image.to_netpbm()?;
        self.blit(format, data).await
    }

    /// Display an image file; its extension is the format tag.
    ///
    /// With `unlink`, the file is removed even if reading it failed.
    pub async fn show_image(&self, path: &Path, unlink: bool) -> Result<()> {
        let format = path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let data = tokio::fs::read(path).await;
        if unlink {
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!("cannot remove {}: {e}", path.display());
            }
        }
        self.blit(&format, data?).await
    }

    // ── Geometry parameters ──────────────────────────────────────

    /// The geometry record stored under `<server>/geom`.
    pub async fn geometry(&self) -> Result<serde_json::Value> {
        let key = self.fullname("geom");
        match self.transport.get_param(&key).await? {
            Some(ParamValue::Json(text)) => Ok(serde_json::from_str(&text)?),
            Some(ParamValue::Binary(_)) => Err(DisplayError::ParamType(key)),
            None => Err(DisplayError::MissingParam(key)),
        }
    }

    /// Store a geometry record; it must carry a `model` field.
    pub async fn set_geometry(&self, geometry: &serde_json::Value) -> Result<()> {
        if geometry.get("model").is_none() {
            return Err(DisplayError::InvalidGeometry("missing 'model' field"));
        }
        let key = self.fullname("geom");
        self.transport
            .set_param(&key, ParamValue::from_json(geometry)?)
            .await
    }

    /// Upload a pixel-to-geometry blob file to `<server>/p2g`.
    pub async fn set_p2g_blob(&self, path: &Path) -> Result<()> {
        let data = tokio::fs::read(path).await?;
        let key = self.fullname("p2g");
        info!("uploading {} ({} bytes) to {key}", path.display(), data.len());
        self.transport.set_param(&key, ParamValue::Binary(data)).await
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    use crate::mode::{BLIT_2D_MODE, STANDBY_BROADCAST_MODE};
    use crate::server::{DisplayServer, ServerOptions};
    use crate::transport::LoopbackTransport;
    use crate::types::VirtualDisplay;

    fn rect(x0: i32, y0: i32, x1: i32, y1: i32) -> Vec<Point> {
        vec![
            Point::new(x0, y0),
            Point::new(x1, y0),
            Point::new(x1, y1),
            Point::new(x0, y1),
        ]
    }

    fn setup(info: DisplayInfo, options: ClientOptions) -> (Arc<DisplayServer>, DisplayServerProxy) {
        let server = Arc::new(DisplayServer::new(ServerOptions {
            info,
            ..Default::default()
        }));
        let transport: Arc<dyn Transport> = Arc::new(LoopbackTransport::new(server.clone()));
        let proxy = DisplayServerProxy::new(transport, "display_server", &options);
        (server, proxy)
    }

    fn options() -> ClientOptions {
        ClientOptions {
            wait_timeout: Some(Duration::from_millis(200)),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn full_frame_scenario() {
        let info = DisplayInfo::new(100, 50, vec![VirtualDisplay::new("A", rect(0, 0, 99, 49))]);
        let (_server, proxy) = setup(info, options());

        assert_eq!(proxy.width().await, 100);
        assert_eq!(proxy.height().await, 50);
        let a = proxy.get_virtual_display_mask("A").await;
        assert!(a.all());
        assert_eq!(proxy.get_display_mask().await, a);
    }

    #[tokio::test]
    async fn forced_refresh_is_reflected_in_masks() {
        let info = DisplayInfo::new(10, 10, vec![VirtualDisplay::new("A", rect(0, 0, 4, 4))]);
        let (server, proxy) = setup(info, options());
        assert_eq!(proxy.get_display_mask().await.count(), 25);

        server.set_display_info(DisplayInfo::new(
            10,
            10,
            vec![VirtualDisplay::new("A", rect(0, 0, 9, 9))],
        ));
        assert_eq!(proxy.get_display_mask().await.count(), 25);

        proxy.get_display_info(true).await;
        assert_eq!(proxy.get_display_mask().await.count(), 100);
    }

    #[tokio::test]
    async fn invalidate_drops_cached_geometry() {
        let info = DisplayInfo::new(10, 10, vec![VirtualDisplay::new("A", rect(0, 0, 4, 4))]);
        let (server, proxy) = setup(info, options());
        assert_eq!(proxy.width().await, 10);
        assert_eq!(proxy.width().await, 10);
        assert_eq!(server.served(GET_DISPLAY_INFO_ENDPOINT), 1);

        server.set_display_info(DisplayInfo::new(20, 10, Vec::new()));
        proxy.invalidate_display_info().await;
        assert_eq!(proxy.width().await, 20);
        assert_eq!(server.served(GET_DISPLAY_INFO_ENDPOINT), 2);

        // With nothing cached a failing server leaves the geometry unknown.
        server.set_serve_display_info(false);
        proxy.invalidate_display_info().await;
        assert!(matches!(
            proxy.display_info_status(false).await,
            InfoStatus::Unknown(_)
        ));
        assert_eq!(proxy.width().await, 0);
    }

    #[tokio::test]
    async fn failed_fetch_reads_as_unknown_geometry() {
        let info = DisplayInfo::new(10, 10, vec![VirtualDisplay::new("A", rect(0, 0, 4, 4))]);
        let (server, proxy) = setup(info, options());
        server.set_serve_display_info(false);

        assert!(matches!(proxy.display_info_status(false).await, InfoStatus::Unknown(_)));
        assert_eq!(proxy.width().await, 0);
        assert!(proxy.get_virtual_display_points("A").await.is_empty());
        assert_eq!(proxy.find_viewport_index("A").await, None);
    }

    #[tokio::test]
    async fn param_store_source_is_used_when_preferred() {
        let info = DisplayInfo::new(10, 10, vec![VirtualDisplay::new("A", rect(0, 0, 4, 4))]);
        let (server, proxy) = setup(
            info,
            ClientOptions {
                prefer_param_store: true,
                ..options()
            },
        );
        // Service endpoint down; the parameter still answers.
        server.set_serve_display_info(false);
        assert!(proxy.display_info_status(false).await.is_fresh());
        assert_eq!(proxy.find_viewport_index("A").await, Some(0));
    }

    #[tokio::test]
    async fn connect_waits_and_primes_cache() {
        let server = Arc::new(DisplayServer::new(ServerOptions {
            info: DisplayInfo::new(3, 3, Vec::new()),
            ..Default::default()
        }));
        let transport: Arc<dyn Transport> = Arc::new(LoopbackTransport::new(server.clone()));
        let proxy = DisplayServerProxy::connect(
            transport,
            "",
            &ClientOptions {
                wait_for_server: true,
                ..options()
            },
        )
        .await
        .unwrap();
        assert_eq!(proxy.name(), "/display_server");
        server.set_serve_display_info(false);
        assert!(proxy.display_info_status(false).await.is_fresh());
    }

    #[tokio::test]
    async fn mode_round_trip() {
        let (server, proxy) = setup(DisplayInfo::default(), options());
        assert_eq!(
            proxy.enter_2d_blit_mode().await.unwrap(),
            WaitOutcome::Observed(BLIT_2D_MODE.into())
        );
        assert_eq!(
            proxy.enter_standby_mode().await.unwrap(),
            WaitOutcome::Observed(STANDBY_BROADCAST_MODE.into())
        );
        assert_eq!(server.mode(), STANDBY_BROADCAST_MODE);
    }

    #[tokio::test]
    async fn show_pixels_blits_masked_image() {
        let info = DisplayInfo::new(4, 2, vec![VirtualDisplay::new("L", rect(0, 0, 1, 1))]);
        let (server, proxy) = setup(info, options());

        let mask = proxy.get_display_mask().await;
        let img = proxy.new_image(255u8, Some(&mask), Some(1)).await.unwrap();
        proxy.show_pixels(&img).await.unwrap();

        let blit = server.last_blit().unwrap();
        assert_eq!(blit.format, ".pgm");
        assert!(blit.data.ends_with(&[255, 255, 0, 0, 255, 255, 0, 0]));
    }

    #[tokio::test]
    async fn show_image_uses_extension_and_unlinks() {
        let (server, proxy) = setup(DisplayInfo::default(), options());
        let path = std::env::temp_dir().join(format!("vdisp-show-{}.png", std::process::id()));
        std::fs::write(&path, b"not really a png").unwrap();

        proxy.show_image(&path, true).await.unwrap();
        assert!(!path.exists());
        let blit = server.last_blit().unwrap();
        assert_eq!(blit.format, ".png");
        assert_eq!(blit.data, b"not really a png".to_vec());
    }

    #[tokio::test]
    async fn geometry_requires_model() {
        let (server, proxy) = setup(DisplayInfo::default(), options());
        let bad = serde_json::json!({"radius": 1.0});
        assert!(matches!(
            proxy.set_geometry(&bad).await,
            Err(DisplayError::InvalidGeometry(_))
        ));
        assert!(matches!(proxy.geometry().await, Err(DisplayError::MissingParam(_))));

        let good = serde_json::json!({"model": "sphere", "radius": 1.0});
        proxy.set_geometry(&good).await.unwrap();
        assert_eq!(proxy.geometry().await.unwrap(), good);
        assert!(server.get_param("/display_server/geom").is_some());
    }

    #[tokio::test]
    async fn p2g_blob_is_stored_as_binary() {
        let (server, proxy) = setup(DisplayInfo::default(), options());
        let path = std::env::temp_dir().join(format!("vdisp-p2g-{}.exr", std::process::id()));
        std::fs::write(&path, [1u8, 2, 3]).unwrap();

        proxy.set_p2g_blob(&path).await.unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(
            server.get_param("/display_server/p2g"),
            Some(ParamValue::Binary(vec![1, 2, 3]))
        );
    }
}
