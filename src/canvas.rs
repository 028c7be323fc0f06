use eframe::egui;
use egui::{ColorImage, Pos2, pos2};
use image::{Rgba, RgbaImage, imageops};
use rayon::prelude::*;

use crate::components::history::{DEFAULT_HISTORY_CAPACITY, HistoryStack};
use crate::components::layers::{LayerManager, RESIZE_HANDLE_SIZE};
use crate::components::path::PathEditor;

pub const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
pub const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Border color drawn around the image being dragged or resized.
const SELECTION_BORDER: Rgba<u8> = Rgba([59, 130, 246, 255]);

// ============================================================================
// DRAWING CANVAS
// ============================================================================

/// The editable sketch: a white-based stroke bitmap, placed images stacked
/// above it, the in-progress pen path, and the undo history.
///
/// `strokes` is the persistent paint layer.  Placed images stay live (movable,
/// resizable) until a history snapshot flattens everything; undo therefore
/// restores a flattened bitmap and drops the live objects.
pub struct CanvasState {
    strokes: RgbaImage,
    pub layers: LayerManager,
    pub path: PathEditor,
    pub history: HistoryStack,
    /// Anchor of the shape drag in progress, if any.
    pub shape_start: Option<Pos2>,
    /// Previous pointer position of the freehand stroke in progress.
    pub last_pos: Option<Pos2>,
}

impl CanvasState {
    pub fn new(width: u32, height: u32, history_capacity: usize) -> Self {
        Self {
            strokes: RgbaImage::from_pixel(width.max(1), height.max(1), WHITE),
            layers: LayerManager::new(),
            path: PathEditor::new(),
            history: HistoryStack::with_capacity(history_capacity.max(1)),
            shape_start: None,
            last_pos: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.strokes.width()
    }

    pub fn height(&self) -> u32 {
        self.strokes.height()
    }

    pub fn strokes(&self) -> &RgbaImage {
        &self.strokes
    }

    pub fn strokes_mut(&mut self) -> &mut RgbaImage {
        &mut self.strokes
    }

    /// Switch to a new canvas size.  Everything is discarded: strokes blank
    /// to white, placed images and the pen path are dropped, and the history
    /// is cleared because its snapshots no longer match the buffer.
    pub fn resize(&mut self, width: u32, height: u32) {
        if (width, height) == (self.width(), self.height()) {
            return;
        }
        self.strokes = RgbaImage::from_pixel(width.max(1), height.max(1), WHITE);
        self.layers.clear();
        self.path.clear();
        self.history.clear();
        self.shape_start = None;
        self.last_pos = None;
        crate::log_info!("canvas: resized to {}x{}", width, height);
    }

    /// Blank the canvas: strokes to white, images and path dropped.  The
    /// history is kept so the clear itself is undoable once snapshotted.
    pub fn clear(&mut self) {
        for px in self.strokes.pixels_mut() {
            *px = WHITE;
        }
        self.layers.clear();
        self.path.clear();
        self.shape_start = None;
        self.last_pos = None;
    }

    /// Flattened bitmap: strokes with every placed image composited on top
    /// in stacking order.  This is what gets snapshotted and uploaded.
    pub fn flatten(&self) -> RgbaImage {
        let mut out = self.strokes.clone();
        for img in self.layers.iter() {
            let w = (img.width.round() as u32).max(1);
            let h = (img.height.round() as u32).max(1);
            let scaled = if img.image.dimensions() == (w, h) {
                img.image.clone()
            } else {
                imageops::resize(&img.image, w, h, imageops::FilterType::Triangle)
            };
            imageops::overlay(&mut out, &scaled, img.x.round() as i64, img.y.round() as i64);
        }
        out
    }

    /// Flattened bitmap plus editing overlays: the selection border and
    /// resize grip on the active image, and the pen guides.  This is the
    /// frame presented on screen; overlays never reach history or uploads.
    pub fn composite(&self) -> RgbaImage {
        let mut out = self.flatten();
        if let Some(id) = self.layers.active()
            && let Some(img) = self.layers.get(id)
        {
            stroke_rect(
                &mut out,
                pos2(img.x, img.y),
                pos2(img.x + img.width, img.y + img.height),
                1.5,
                SELECTION_BORDER,
            );
            // Corner grips; only the bottom-right one resizes.
            let half = RESIZE_HANDLE_SIZE / 2.0;
            for corner in [
                pos2(img.x, img.y),
                pos2(img.x + img.width, img.y),
                pos2(img.x, img.y + img.height),
                pos2(img.x + img.width, img.y + img.height),
            ] {
                fill_rect(
                    &mut out,
                    pos2(corner.x - half, corner.y - half),
                    pos2(corner.x + half, corner.y + half),
                    SELECTION_BORDER,
                );
            }
        }
        self.path.draw_guides(&mut out);
        out
    }

    /// Commit the pen path onto the stroke layer.  Returns true when a
    /// stroke was drawn.
    pub fn finalize_path(&mut self) -> bool {
        self.path.finalize(&mut self.strokes)
    }

    /// Push the current flattened state onto the undo history.
    pub fn snapshot(&mut self) {
        let flat = self.flatten();
        self.history.push(&flat);
    }

    /// Step back one history entry.  The restored state is flattened, so
    /// live images and the pen path are dropped.
    pub fn undo(&mut self) {
        self.history.undo(&mut self.strokes);
        self.layers.clear();
        self.path.clear();
        self.shape_start = None;
        self.last_pos = None;
    }

    /// True when the canvas holds anything beyond blank white: a non-white
    /// stroke pixel or at least one placed image.
    pub fn has_drawing(&self) -> bool {
        if !self.layers.is_empty() {
            return true;
        }
        self.strokes
            .as_raw()
            .par_chunks_exact(4)
            .any(|px| px[0] != 255 || px[1] != 255 || px[2] != 255)
    }
}

// ============================================================================
// GENERATED OUTPUT
// ============================================================================

/// The right-hand panel buffer holding the most recent generated render,
/// letterboxed on black at the selected output dimensions.
pub struct OutputState {
    buffer: RgbaImage,
}

impl OutputState {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buffer: RgbaImage::from_pixel(width.max(1), height.max(1), WHITE),
        }
    }

    pub fn buffer(&self) -> &RgbaImage {
        &self.buffer
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if (width, height) != (self.width(), self.height()) {
            self.buffer = RgbaImage::from_pixel(width.max(1), height.max(1), WHITE);
        }
    }

    /// Blank the output back to white (placeholder / failed generation).
    pub fn clear_white(&mut self) {
        for px in self.buffer.pixels_mut() {
            *px = WHITE;
        }
    }

    /// Place a generated image in the buffer: aspect-preserving fit,
    /// centered, letterboxed on black.
    pub fn set_image_letterboxed(&mut self, image: &RgbaImage) {
        for px in self.buffer.pixels_mut() {
            *px = BLACK;
        }
        let (x, y, w, h) = fit_rect(
            image.width(),
            image.height(),
            self.buffer.width(),
            self.buffer.height(),
        );
        let scaled = if image.dimensions() == (w, h) {
            image.clone()
        } else {
            imageops::resize(image, w, h, imageops::FilterType::Triangle)
        };
        imageops::overlay(&mut self.buffer, &scaled, x as i64, y as i64);
    }
}

/// Largest rectangle of `src` aspect ratio that fits in `dst`, centered.
/// Returns (x, y, width, height) in destination pixels.
pub fn fit_rect(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> (u32, u32, u32, u32) {
    if src_w == 0 || src_h == 0 || dst_w == 0 || dst_h == 0 {
        return (0, 0, 0, 0);
    }
    let scale = (dst_w as f32 / src_w as f32).min(dst_h as f32 / src_h as f32);
    let w = ((src_w as f32 * scale).round() as u32).clamp(1, dst_w);
    let h = ((src_h as f32 * scale).round() as u32).clamp(1, dst_h);
    ((dst_w - w) / 2, (dst_h - h) / 2, w, h)
}

// ============================================================================
// RASTER PRIMITIVES
// ============================================================================

/// Convert an RGBA buffer to an egui texture image.
pub fn to_color_image(buffer: &RgbaImage) -> ColorImage {
    ColorImage::from_rgba_unmultiplied(
        [buffer.width() as usize, buffer.height() as usize],
        buffer.as_raw(),
    )
}

/// Source-over blend of `color` onto the pixel at (x, y), skipping
/// out-of-bounds coordinates.
fn blend_pixel(buffer: &mut RgbaImage, x: i32, y: i32, color: Rgba<u8>) {
    if x < 0 || y < 0 || x >= buffer.width() as i32 || y >= buffer.height() as i32 {
        return;
    }
    let (x, y) = (x as u32, y as u32);
    let a = color[3] as u32;
    if a == 0 {
        return;
    }
    if a == 255 {
        buffer.put_pixel(x, y, color);
        return;
    }
    let dst = buffer.get_pixel(x, y);
    let inv = 255 - a;
    let blend = |s: u8, d: u8| ((s as u32 * a + d as u32 * inv) / 255) as u8;
    buffer.put_pixel(
        x,
        y,
        Rgba([
            blend(color[0], dst[0]),
            blend(color[1], dst[1]),
            blend(color[2], dst[2]),
            255,
        ]),
    );
}

/// Filled disc of the given radius, alpha-blended.
pub fn draw_disc(buffer: &mut RgbaImage, center: Pos2, radius: f32, color: Rgba<u8>) {
    let r = radius.max(0.5);
    let r_sq = r * r;
    let x0 = (center.x - r).floor() as i32;
    let x1 = (center.x + r).ceil() as i32;
    let y0 = (center.y - r).floor() as i32;
    let y1 = (center.y + r).ceil() as i32;
    for y in y0..=y1 {
        for x in x0..=x1 {
            let dx = x as f32 + 0.5 - center.x;
            let dy = y as f32 + 0.5 - center.y;
            if dx * dx + dy * dy <= r_sq {
                blend_pixel(buffer, x, y, color);
            }
        }
    }
}

/// One-pixel ring at the given radius.
pub fn draw_ring(buffer: &mut RgbaImage, center: Pos2, radius: f32, color: Rgba<u8>) {
    let r = radius.max(0.5);
    let outer = r + 0.75;
    let inner = (r - 0.75).max(0.0);
    let (outer_sq, inner_sq) = (outer * outer, inner * inner);
    let x0 = (center.x - outer).floor() as i32;
    let x1 = (center.x + outer).ceil() as i32;
    let y0 = (center.y - outer).floor() as i32;
    let y1 = (center.y + outer).ceil() as i32;
    for y in y0..=y1 {
        for x in x0..=x1 {
            let dx = x as f32 + 0.5 - center.x;
            let dy = y as f32 + 0.5 - center.y;
            let d_sq = dx * dx + dy * dy;
            if d_sq <= outer_sq && d_sq >= inner_sq {
                blend_pixel(buffer, x, y, color);
            }
        }
    }
}

/// Stroke a straight line by stamping discs along it (round caps and joins
/// for free).  `width` is the stroke diameter.
pub fn stroke_line(buffer: &mut RgbaImage, a: Pos2, b: Pos2, width: f32, color: Rgba<u8>) {
    let radius = (width / 2.0).max(0.5);
    let delta = b - a;
    let length = delta.length();
    if length < f32::EPSILON {
        draw_disc(buffer, a, radius, color);
        return;
    }
    // Step at half the radius so consecutive stamps overlap seamlessly.
    let steps = (length / (radius * 0.5)).ceil().max(1.0) as u32;
    for step in 0..=steps {
        let t = step as f32 / steps as f32;
        draw_disc(buffer, a + delta * t, radius, color);
    }
}

/// Axis-aligned filled rectangle between two corners (any order).
pub fn fill_rect(buffer: &mut RgbaImage, a: Pos2, b: Pos2, color: Rgba<u8>) {
    let x0 = a.x.min(b.x).floor() as i32;
    let x1 = a.x.max(b.x).ceil() as i32;
    let y0 = a.y.min(b.y).floor() as i32;
    let y1 = a.y.max(b.y).ceil() as i32;
    for y in y0..y1 {
        for x in x0..x1 {
            blend_pixel(buffer, x, y, color);
        }
    }
}

/// Axis-aligned rectangle outline between two corners (any order).
pub fn stroke_rect(buffer: &mut RgbaImage, a: Pos2, b: Pos2, width: f32, color: Rgba<u8>) {
    let min = pos2(a.x.min(b.x), a.y.min(b.y));
    let max = pos2(a.x.max(b.x), a.y.max(b.y));
    stroke_line(buffer, min, pos2(max.x, min.y), width, color);
    stroke_line(buffer, pos2(max.x, min.y), max, width, color);
    stroke_line(buffer, max, pos2(min.x, max.y), width, color);
    stroke_line(buffer, pos2(min.x, max.y), min, width, color);
}

/// Filled axis-aligned ellipse inscribed in the rectangle spanned by the
/// two corners.
pub fn fill_ellipse(buffer: &mut RgbaImage, a: Pos2, b: Pos2, color: Rgba<u8>) {
    let cx = (a.x + b.x) / 2.0;
    let cy = (a.y + b.y) / 2.0;
    let rx = ((a.x - b.x).abs() / 2.0).max(0.5);
    let ry = ((a.y - b.y).abs() / 2.0).max(0.5);
    let x0 = (cx - rx).floor() as i32;
    let x1 = (cx + rx).ceil() as i32;
    let y0 = (cy - ry).floor() as i32;
    let y1 = (cy + ry).ceil() as i32;
    for y in y0..=y1 {
        for x in x0..=x1 {
            let dx = (x as f32 + 0.5 - cx) / rx;
            let dy = (y as f32 + 0.5 - cy) / ry;
            if dx * dx + dy * dy <= 1.0 {
                blend_pixel(buffer, x, y, color);
            }
        }
    }
}

/// Filled five-pointed star inscribed in the rectangle spanned by the two
/// corners.  Even-odd scanline fill over the 10-vertex outline.
pub fn fill_star(buffer: &mut RgbaImage, a: Pos2, b: Pos2, color: Rgba<u8>) {
    let cx = (a.x + b.x) / 2.0;
    let cy = (a.y + b.y) / 2.0;
    let rx = ((a.x - b.x).abs() / 2.0).max(0.5);
    let ry = ((a.y - b.y).abs() / 2.0).max(0.5);

    let mut verts = [Pos2::ZERO; 10];
    for (i, v) in verts.iter_mut().enumerate() {
        // Outer vertices at even indices, inner at 40% radius between them.
        let angle = -std::f32::consts::FRAC_PI_2 + i as f32 * std::f32::consts::PI / 5.0;
        let scale = if i % 2 == 0 { 1.0 } else { 0.4 };
        *v = pos2(cx + rx * scale * angle.cos(), cy + ry * scale * angle.sin());
    }
    fill_polygon(buffer, &verts, color);
}

/// Even-odd scanline polygon fill.
fn fill_polygon(buffer: &mut RgbaImage, verts: &[Pos2], color: Rgba<u8>) {
    let y0 = verts.iter().map(|v| v.y).fold(f32::INFINITY, f32::min).floor() as i32;
    let y1 = verts.iter().map(|v| v.y).fold(f32::NEG_INFINITY, f32::max).ceil() as i32;
    let n = verts.len();
    let mut crossings: Vec<f32> = Vec::with_capacity(n);

    for y in y0..=y1 {
        let scan = y as f32 + 0.5;
        crossings.clear();
        for i in 0..n {
            let p = verts[i];
            let q = verts[(i + 1) % n];
            if (p.y <= scan && q.y > scan) || (q.y <= scan && p.y > scan) {
                let t = (scan - p.y) / (q.y - p.y);
                crossings.push(p.x + t * (q.x - p.x));
            }
        }
        crossings.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        for pair in crossings.chunks_exact(2) {
            let x0 = pair[0].round() as i32;
            let x1 = pair[1].round() as i32;
            for x in x0..x1 {
                blend_pixel(buffer, x, y, color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn white_canvas(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, WHITE)
    }

    #[test]
    fn blank_canvas_has_no_drawing() {
        let canvas = CanvasState::new(64, 64, DEFAULT_HISTORY_CAPACITY);
        assert!(!canvas.has_drawing());
    }

    #[test]
    fn stroke_and_placed_image_count_as_drawing() {
        let mut canvas = CanvasState::new(64, 64, DEFAULT_HISTORY_CAPACITY);
        stroke_line(canvas.strokes_mut(), pos2(10.0, 10.0), pos2(30.0, 10.0), 4.0, BLACK);
        assert!(canvas.has_drawing());

        let mut canvas = CanvasState::new(64, 64, DEFAULT_HISTORY_CAPACITY);
        canvas
            .layers
            .add(RgbaImage::from_pixel(4, 4, BLACK), 0.0, 0.0, 20.0, 20.0);
        assert!(canvas.has_drawing());
    }

    #[test]
    fn flatten_composites_images_over_strokes() {
        let mut canvas = CanvasState::new(64, 64, DEFAULT_HISTORY_CAPACITY);
        let red = RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255]));
        canvas.layers.add(red, 8.0, 8.0, 4.0, 4.0);

        let flat = canvas.flatten();
        assert_eq!(flat.get_pixel(9, 9).0, [255, 0, 0, 255]);
        assert_eq!(flat.get_pixel(0, 0).0, [255, 255, 255, 255]);
        // The live stroke layer is untouched by compositing.
        assert_eq!(canvas.strokes().get_pixel(9, 9).0, [255, 255, 255, 255]);
    }

    #[test]
    fn undo_drops_live_objects_and_restores_flattened_state() {
        let mut canvas = CanvasState::new(32, 32, DEFAULT_HISTORY_CAPACITY);
        stroke_line(canvas.strokes_mut(), pos2(4.0, 4.0), pos2(28.0, 4.0), 4.0, BLACK);
        canvas.snapshot();
        canvas
            .layers
            .add(RgbaImage::from_pixel(4, 4, BLACK), 10.0, 10.0, 20.0, 20.0);
        canvas.snapshot();

        canvas.undo();
        assert!(canvas.layers.is_empty());
        // Back to the stroke-only snapshot.
        assert_eq!(canvas.strokes().get_pixel(16, 4).0, [0, 0, 0, 255]);
        assert_eq!(canvas.strokes().get_pixel(16, 16).0, [255, 255, 255, 255]);
    }

    #[test]
    fn resize_clears_history() {
        let mut canvas = CanvasState::new(32, 32, DEFAULT_HISTORY_CAPACITY);
        canvas.snapshot();
        assert_eq!(canvas.history.len(), 1);
        canvas.resize(64, 48);
        assert!(canvas.history.is_empty());
        assert_eq!((canvas.width(), canvas.height()), (64, 48));
    }

    #[test]
    fn fit_rect_letterboxes_both_orientations() {
        // Wide image in a square: pillar-box top/bottom.
        assert_eq!(fit_rect(200, 100, 100, 100), (0, 25, 100, 50));
        // Tall image in a square: pillar-box left/right.
        assert_eq!(fit_rect(100, 200, 100, 100), (25, 0, 50, 100));
        // Exact fit.
        assert_eq!(fit_rect(50, 50, 100, 100), (0, 0, 100, 100));
        assert_eq!(fit_rect(0, 10, 100, 100), (0, 0, 0, 0));
    }

    #[test]
    fn letterbox_fills_margins_with_black() {
        let mut output = OutputState::new(100, 100);
        let wide = RgbaImage::from_pixel(200, 100, Rgba([0, 255, 0, 255]));
        output.set_image_letterboxed(&wide);

        // Center of the fitted image.
        assert_eq!(output.buffer().get_pixel(50, 50).0, [0, 255, 0, 255]);
        // Letterbox bands above and below.
        assert_eq!(output.buffer().get_pixel(50, 10).0, [0, 0, 0, 255]);
        assert_eq!(output.buffer().get_pixel(50, 90).0, [0, 0, 0, 255]);
    }

    #[test]
    fn disc_and_line_land_where_expected() {
        let mut buf = white_canvas(64, 64);
        draw_disc(&mut buf, pos2(32.0, 32.0), 5.0, BLACK);
        assert_eq!(buf.get_pixel(32, 32).0, [0, 0, 0, 255]);
        assert_eq!(buf.get_pixel(32, 20).0, [255, 255, 255, 255]);

        let mut buf = white_canvas(64, 64);
        stroke_line(&mut buf, pos2(8.0, 32.0), pos2(56.0, 32.0), 4.0, BLACK);
        for x in [8u32, 32, 56] {
            assert_eq!(buf.get_pixel(x, 32).0, [0, 0, 0, 255]);
        }
        assert_eq!(buf.get_pixel(32, 10).0, [255, 255, 255, 255]);
    }

    #[test]
    fn ellipse_fill_respects_extents() {
        let mut buf = white_canvas(64, 64);
        fill_ellipse(&mut buf, pos2(12.0, 22.0), pos2(52.0, 42.0), BLACK);
        // Center inside.
        assert_eq!(buf.get_pixel(32, 32).0, [0, 0, 0, 255]);
        // Rectangle corner outside the inscribed ellipse.
        assert_eq!(buf.get_pixel(13, 23).0, [255, 255, 255, 255]);
    }

    #[test]
    fn star_fill_covers_center_and_top_spike() {
        let mut buf = white_canvas(100, 100);
        fill_star(&mut buf, pos2(10.0, 10.0), pos2(90.0, 90.0), BLACK);
        assert_eq!(buf.get_pixel(50, 50).0, [0, 0, 0, 255]);
        // Just below the top spike tip.
        assert_eq!(buf.get_pixel(50, 14).0, [0, 0, 0, 255]);
        // Between the top and upper-right spikes: outside the star.
        assert_eq!(buf.get_pixel(75, 15).0, [255, 255, 255, 255]);
    }

    #[test]
    fn alpha_blending_mixes_with_background() {
        let mut buf = white_canvas(8, 8);
        // 50% black over white lands mid-grey.
        blend_pixel(&mut buf, 4, 4, Rgba([0, 0, 0, 128]));
        let px = buf.get_pixel(4, 4).0;
        assert!(px[0] > 100 && px[0] < 155, "got {:?}", px);
        // Out-of-bounds writes are ignored.
        blend_pixel(&mut buf, -1, 99, BLACK);
    }
}
