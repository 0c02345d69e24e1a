//! Virtual-display masks.
//!
//! A [`Mask`] is a framebuffer-shaped boolean grid. Masks are always
//! derived from a [`DisplayInfo`] on demand and never cached here, so a
//! forced info refresh is reflected immediately.
//!
//! Viewport validation is all-or-nothing: a single vertex outside the
//! framebuffer disqualifies the whole virtual display, which then
//! contributes an all-false mask.

use std::ops::BitOrAssign;

use crate::types::{DisplayInfo, Point};

// ── Mask ─────────────────────────────────────────────────────────

/// Row-major `height × width` boolean grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    data: Vec<bool>,
}

impl Mask {
    /// All-false mask.
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, false)
    }

    pub fn filled(width: u32, height: u32, value: bool) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn same_shape(&self, other: &Mask) -> bool {
        self.width == other.width && self.height == other.height
    }

    /// Pixel value; out-of-range coordinates read as `false`.
    pub fn get(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        self.data[y as usize * self.width as usize + x as usize]
    }

    /// Set a pixel; out-of-range coordinates are clipped.
    pub fn set(&mut self, x: i64, y: i64, value: bool) {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return;
        }
        self.data[y as usize * self.width as usize + x as usize] = value;
    }

    fn fill_span(&mut self, y: i64, x0: i64, x1: i64, value: bool) {
        if y < 0 || y >= self.height as i64 {
            return;
        }
        let start = x0.max(0);
        let end = x1.min(self.width as i64 - 1);
        if start > end {
            return;
        }
        let row = y as usize * self.width as usize;
        self.data[row + start as usize..=row + end as usize].fill(value);
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.data
    }

    /// Number of `true` pixels.
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }

    pub fn all(&self) -> bool {
        self.data.iter().all(|&v| v)
    }

    pub fn none(&self) -> bool {
        !self.data.iter().any(|&v| v)
    }
}

impl BitOrAssign<&Mask> for Mask {
    /// Pixelwise OR over the overlapping region of both masks.
    fn bitor_assign(&mut self, rhs: &Mask) {
        if self.same_shape(rhs) {
            for (dst, &src) in self.data.iter_mut().zip(&rhs.data) {
                *dst |= src;
            }
            return;
        }
        for y in 0..self.height.min(rhs.height) {
            for x in 0..self.width.min(rhs.width) {
                if rhs.get(x, y) {
                    self.set(x as i64, y as i64, true);
                }
            }
        }
    }
}

// ── Rasterization ────────────────────────────────────────────────

/// Fill a polygon into `mask`.
///
/// Pixels whose centres fall inside the polygon (even-odd rule, sampled
/// on integer coordinates) and pixels on its edges are written, so
/// vertices given as pixel coordinates are covered inclusively. Pixels
/// outside the mask are clipped. An empty point list writes nothing.
pub fn fill_polygon(points: &[Point], mask: &mut Mask, value: bool) {
    if points.is_empty() || mask.width == 0 || mask.height == 0 {
        return;
    }

    let n = points.len();
    let ymin = points.iter().map(|p| p.y as i64).min().unwrap_or(0).max(0);
    let ymax = points
        .iter()
        .map(|p| p.y as i64)
        .max()
        .unwrap_or(0)
        .min(mask.height as i64 - 1);

    let mut crossings: Vec<f64> = Vec::with_capacity(n);
    for y in ymin..=ymax {
        crossings.clear();
        for i in 0..n {
            let (lo, hi) = ordered_by_y(points[i], points[(i + 1) % n]);
            // Half-open in y so shared vertices are counted once.
            if lo.1 == hi.1 || y < lo.1 || y >= hi.1 {
                continue;
            }
            let t = (y - lo.1) as f64 / (hi.1 - lo.1) as f64;
            crossings.push(lo.0 as f64 + t * (hi.0 - lo.0) as f64);
        }
        crossings.sort_by(f64::total_cmp);
        for pair in crossings.chunks_exact(2) {
            mask.fill_span(y, pair[0].ceil() as i64, pair[1].floor() as i64, value);
        }
    }

    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        let segment = ((a.x as i64, a.y as i64), (b.x as i64, b.y as i64));
        if let Some((a, b)) = clip_segment(segment, mask.width, mask.height) {
            draw_line(a, b, mask, value);
        }
    }
}

fn ordered_by_y(a: Point, b: Point) -> Segment {
    let (a, b) = ((a.x as i64, a.y as i64), (b.x as i64, b.y as i64));
    if a.1 <= b.1 { (a, b) } else { (b, a) }
}

type Segment = ((i64, i64), (i64, i64));

/// Liang-Barsky clip of a segment to the pixel grid. Segments already
/// inside are returned unchanged.
fn clip_segment(segment: Segment, width: u32, height: u32) -> Option<Segment> {
    let (xmax, ymax) = (width as i64 - 1, height as i64 - 1);
    let inside = |(x, y): (i64, i64)| (0..=xmax).contains(&x) && (0..=ymax).contains(&y);
    let ((x0, y0), (x1, y1)) = segment;
    if inside((x0, y0)) && inside((x1, y1)) {
        return Some(segment);
    }

    let (dx, dy) = ((x1 - x0) as f64, (y1 - y0) as f64);
    let (mut t0, mut t1) = (0.0f64, 1.0f64);
    let edges = [
        (-dx, x0 as f64),
        (dx, (xmax - x0) as f64),
        (-dy, y0 as f64),
        (dy, (ymax - y0) as f64),
    ];
    for (p, q) in edges {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            t0 = t0.max(r);
        } else {
            t1 = t1.min(r);
        }
        if t0 > t1 {
            return None;
        }
    }

    let at = |t: f64| {
        let x = (x0 as f64 + t * dx).round() as i64;
        let y = (y0 as f64 + t * dy).round() as i64;
        (x.clamp(0, xmax), y.clamp(0, ymax))
    };
    Some((at(t0), at(t1)))
}

/// Bresenham line between two grid points, endpoints included.
fn draw_line(a: (i64, i64), b: (i64, i64), mask: &mut Mask, value: bool) {
    let ((mut x, mut y), (x1, y1)) = (a, b);
    let dx = (x1 - x).abs();
    let dy = -(y1 - y).abs();
    let sx = if x < x1 { 1 } else { -1 };
    let sy = if y < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        mask.set(x, y, value);
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

// ── Mask engine ──────────────────────────────────────────────────

/// Viewport of the named virtual display, or `[]` if the name is
/// unknown or any vertex lies outside the framebuffer.
pub fn virtual_display_points(info: &DisplayInfo, name: &str) -> Vec<Point> {
    match info.virtual_display(name) {
        Some(vd) if vd.is_valid_for(info.width, info.height) => vd.viewport.clone(),
        _ => Vec::new(),
    }
}

/// Mask covering one virtual display.
pub fn virtual_display_mask(info: &DisplayInfo, name: &str) -> Mask {
    let points = virtual_display_points(info, name);
    let mut mask = Mask::new(info.width, info.height);
    fill_polygon(&points, &mut mask, true);
    mask
}

/// Union of every virtual display's mask, in declaration order.
pub fn display_mask(info: &DisplayInfo) -> Mask {
    let mut mask = Mask::new(info.width, info.height);
    for vd in &info.virtual_displays {
        mask |= &virtual_display_mask(info, &vd.id);
    }
    mask
}

// ── Tests ────────────────────────────────────────────────────────
