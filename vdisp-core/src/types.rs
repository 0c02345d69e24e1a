//! Display geometry as declared by the server.
//!
//! These types mirror the JSON document returned by the
//! `get_display_info` endpoint and stored under `<server>/display`:
//!
//! ```text
//! {
//!   "width": 1024, "height": 768,
//!   "virtualDisplays": [
//!     { "id": "north", "viewport": [[0,0],[511,0],[511,383],[0,383]] }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};

// ── Point ────────────────────────────────────────────────────────

/// A viewport vertex in framebuffer pixel coordinates.
///
/// Serialized as a two-element `[x, y]` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(i32, i32)", into = "(i32, i32)")]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Whether the point addresses a pixel of a `width × height`
    /// framebuffer.
    pub fn in_bounds(&self, width: u32, height: u32) -> bool {
        self.x >= 0 && self.y >= 0 && (self.x as u32) < width && (self.y as u32) < height
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

impl From<Point> for (i32, i32) {
    fn from(p: Point) -> Self {
        (p.x, p.y)
    }
}

// ── VirtualDisplay ───────────────────────────────────────────────

/// A named, polygon-bounded region of the shared framebuffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualDisplay {
    pub id: String,
    #[serde(default)]
    pub viewport: Vec<Point>,
}

impl VirtualDisplay {
    pub fn new(id: impl Into<String>, viewport: Vec<Point>) -> Self {
        Self {
            id: id.into(),
            viewport,
        }
    }

    /// `true` when every vertex lies inside the framebuffer.
    pub fn is_valid_for(&self, width: u32, height: u32) -> bool {
        self.viewport.iter().all(|p| p.in_bounds(width, height))
    }
}

// ── DisplayInfo ──────────────────────────────────────────────────

/// Framebuffer size and the virtual displays carved out of it.
///
/// The `Default` value (0×0, no displays) stands for "geometry unknown".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayInfo {
    pub width: u32,
    pub height: u32,
    #[serde(rename = "virtualDisplays")]
    pub virtual_displays: Vec<VirtualDisplay>,
}

impl DisplayInfo {
    pub fn new(width: u32, height: u32, virtual_displays: Vec<VirtualDisplay>) -> Self {
        Self {
            width,
            height,
            virtual_displays,
        }
    }

    /// Parse the JSON document published by the server.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Zero-sized framebuffer, i.e. nothing has been fetched.
    pub fn is_unknown(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Index of the first virtual display with the given id.
    ///
    /// Duplicate ids are allowed; the earliest one wins.
    pub fn find_viewport_index(&self, id: &str) -> Option<usize> {
        self.virtual_displays.iter().position(|vd| vd.id == id)
    }

    pub fn virtual_display(&self, id: &str) -> Option<&VirtualDisplay> {
        self.find_viewport_index(id)
            .map(|idx| &self.virtual_displays[idx])
    }
}

// ── Tests ────────────────────────────────────────────────────────
