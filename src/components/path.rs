use eframe::egui;
use egui::{Pos2, Vec2, pos2, vec2};
use image::{Rgba, RgbaImage};

use crate::canvas::{draw_disc, draw_ring, stroke_line};

/// Hit radius for anchor bodies, in canvas pixels.
pub const ANCHOR_HIT_RADIUS: f32 = 10.0;
/// Hit radius for control handles (slightly tighter than anchors).
pub const HANDLE_HIT_RADIUS: f32 = 8.0;
/// Maximum distance from a segment at which a click still inserts a point.
pub const SEGMENT_INSERT_THRESHOLD: f32 = 20.0;
/// Auto-generated handle length as a fraction of the inter-anchor distance.
const AUTO_HANDLE_SCALE: f32 = 0.3;
/// Handle scale for points inserted mid-segment (toward each neighbour).
const INSERT_HANDLE_SCALE: f32 = 0.25;
/// Stroke width used when the finished path is rasterized.
const PATH_STROKE_WIDTH: f32 = 4.0;
/// Flattening steps per cubic bezier segment.
const BEZIER_STEPS: usize = 24;

/// A user-placed vertex of the working path.  Handles are offsets relative
/// to the anchor position, not absolute coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnchorPoint {
    pub pos: Pos2,
    pub handle_in: Option<Vec2>,
    pub handle_out: Option<Vec2>,
}

impl AnchorPoint {
    pub fn bare(x: f32, y: f32) -> Self {
        Self {
            pos: pos2(x, y),
            handle_in: None,
            handle_out: None,
        }
    }

    /// Absolute position of a handle, if present.
    pub fn handle_abs(&self, which: HandleKind) -> Option<Pos2> {
        match which {
            HandleKind::In => self.handle_in.map(|h| self.pos + h),
            HandleKind::Out => self.handle_out.map(|h| self.pos + h),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandleKind {
    In,
    Out,
}

impl HandleKind {
    pub fn opposite(self) -> Self {
        match self {
            HandleKind::In => HandleKind::Out,
            HandleKind::Out => HandleKind::In,
        }
    }
}

/// Result of hit-testing the working path.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PathHit {
    Handle(usize, HandleKind),
    Anchor(usize),
}

/// Editable bezier path: an ordered list of anchors with optional handles.
/// Rendered as cubic segments where both endpoints carry the facing handles,
/// straight lines otherwise.
#[derive(Default)]
pub struct PathEditor {
    points: Vec<AnchorPoint>,
}

impl PathEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn points(&self) -> &[AnchorPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Append an anchor at (x, y).  The first point of a path carries no
    /// handles; every subsequent point gets an in-handle pointing back along
    /// the direction from the previous anchor, scaled to 30% of the
    /// inter-point distance.  The previous anchor's out-handle is back-filled
    /// with the same vector when absent, keeping the join smooth.
    pub fn add_point(&mut self, x: f32, y: f32) {
        if self.points.is_empty() {
            self.points.push(AnchorPoint::bare(x, y));
            return;
        }

        let prev = *self.points.last().unwrap();
        let delta = pos2(x, y) - prev.pos;
        let distance = delta.length();
        let mut point = AnchorPoint::bare(x, y);

        if distance > 0.0 {
            let dir = delta / distance;
            let handle = -dir * (distance * AUTO_HANDLE_SCALE);
            point.handle_in = Some(handle);

            let last = self.points.last_mut().unwrap();
            if last.handle_out.is_none() {
                last.handle_out = Some(handle);
            }
        }

        self.points.push(point);
    }

    /// Find the anchor or handle under (x, y).  Per point the check order is
    /// in-handle, out-handle, then the anchor body; the first match wins.
    pub fn hit_test(&self, x: f32, y: f32) -> Option<PathHit> {
        let at = pos2(x, y);
        for (i, point) in self.points.iter().enumerate() {
            for which in [HandleKind::In, HandleKind::Out] {
                if let Some(abs) = point.handle_abs(which)
                    && (abs - at).length_sq() <= HANDLE_HIT_RADIUS * HANDLE_HIT_RADIUS
                {
                    return Some(PathHit::Handle(i, which));
                }
            }
            if (point.pos - at).length_sq() <= ANCHOR_HIT_RADIUS * ANCHOR_HIT_RADIUS {
                return Some(PathHit::Anchor(i));
            }
        }
        None
    }

    /// Move a handle by (dx, dy).  With `symmetric` set, the opposite handle
    /// (when it exists) is forced to the negated vector afterwards.
    pub fn drag_handle(&mut self, index: usize, which: HandleKind, dx: f32, dy: f32, symmetric: bool) {
        let Some(point) = self.points.get_mut(index) else {
            crate::log_warn!("drag_handle: anchor index {} out of bounds", index);
            return;
        };
        let slot = match which {
            HandleKind::In => &mut point.handle_in,
            HandleKind::Out => &mut point.handle_out,
        };
        let Some(handle) = slot.as_mut() else {
            return;
        };
        *handle += vec2(dx, dy);
        let moved = *handle;

        if symmetric {
            let other = match which.opposite() {
                HandleKind::In => &mut point.handle_in,
                HandleKind::Out => &mut point.handle_out,
            };
            if let Some(h) = other.as_mut() {
                *h = -moved;
            }
        }
    }

    /// Translate an anchor; its handles are relative offsets and ride along
    /// unchanged.
    pub fn drag_anchor(&mut self, index: usize, dx: f32, dy: f32) {
        let Some(point) = self.points.get_mut(index) else {
            crate::log_warn!("drag_anchor: anchor index {} out of bounds", index);
            return;
        };
        point.pos += vec2(dx, dy);
    }

    /// Project (x, y) onto every consecutive anchor pair (clamped parametric
    /// projection).  If the closest projection lies within the insert
    /// threshold, split that segment with a new anchor whose handles point
    /// 25% of the way toward each neighbour.  Returns the index of the
    /// inserted anchor.
    pub fn insert_on_segment(&mut self, x: f32, y: f32) -> Option<usize> {
        if self.points.len() < 2 {
            return None;
        }

        let at = pos2(x, y);
        let mut closest = f32::INFINITY;
        let mut insert_index = None;

        for i in 0..self.points.len() - 1 {
            let p1 = self.points[i].pos;
            let p2 = self.points[i + 1].pos;
            let seg = p2 - p1;
            let len_sq = seg.length_sq();
            if len_sq == 0.0 {
                continue;
            }
            let t = ((at - p1).dot(seg) / len_sq).clamp(0.0, 1.0);
            let projected = p1 + seg * t;
            let distance = (at - projected).length();
            if distance < closest && distance < SEGMENT_INSERT_THRESHOLD {
                closest = distance;
                insert_index = Some(i + 1);
            }
        }

        let index = insert_index?;
        let prev = self.points[index - 1].pos;
        let next = self.points[index].pos;
        let point = AnchorPoint {
            pos: at,
            handle_in: Some((prev - at) * INSERT_HANDLE_SCALE),
            handle_out: Some((next - at) * INSERT_HANDLE_SCALE),
        };
        self.points.insert(index, point);
        Some(index)
    }

    /// Flatten the path to a polyline: cubic bezier segments are sampled
    /// where both endpoints carry the facing handles, straight lines
    /// otherwise.
    pub fn flatten(&self) -> Vec<Pos2> {
        let mut out = Vec::new();
        let Some(first) = self.points.first() else {
            return out;
        };
        out.push(first.pos);

        for pair in self.points.windows(2) {
            let (current, next) = (pair[0], pair[1]);
            match (current.handle_out, next.handle_in) {
                (Some(h_out), Some(h_in)) => {
                    let c1 = current.pos + h_out;
                    let c2 = next.pos + h_in;
                    for step in 1..=BEZIER_STEPS {
                        let t = step as f32 / BEZIER_STEPS as f32;
                        out.push(cubic_point(current.pos, c1, c2, next.pos, t));
                    }
                }
                _ => out.push(next.pos),
            }
        }
        out
    }

    /// Rasterize the path onto `buffer` as a 4 px black stroke, then clear
    /// the working point list.  A path of fewer than 2 points is a logged
    /// no-op: the buffer is untouched and the points are kept.
    pub fn finalize(&mut self, buffer: &mut RgbaImage) -> bool {
        if self.points.len() < 2 {
            crate::log_warn!(
                "finalize: need at least 2 anchor points, have {}",
                self.points.len()
            );
            return false;
        }

        let polyline = self.flatten();
        let color = Rgba([0, 0, 0, 255]);
        for pair in polyline.windows(2) {
            stroke_line(buffer, pair[0], pair[1], PATH_STROKE_WIDTH, color);
        }

        self.points.clear();
        true
    }

    /// Draw the editing overlay: a faint preview of the path, guide lines
    /// from each anchor to its handles, anchor rings and handle dots.
    pub fn draw_guides(&self, buffer: &mut RgbaImage) {
        if self.points.is_empty() {
            return;
        }

        let preview = Rgba([136, 136, 136, 255]);
        let guide = Rgba([100, 100, 255, 160]);
        let handle_dot = Rgba([100, 100, 255, 220]);
        let anchor_fill = Rgba([255, 255, 255, 230]);
        let anchor_ring = Rgba([0, 0, 0, 210]);

        let polyline = self.flatten();
        for pair in polyline.windows(2) {
            stroke_line(buffer, pair[0], pair[1], 1.5, preview);
        }

        for point in &self.points {
            for which in [HandleKind::In, HandleKind::Out] {
                if let Some(abs) = point.handle_abs(which) {
                    stroke_line(buffer, point.pos, abs, 1.0, guide);
                    draw_disc(buffer, abs, 4.0, handle_dot);
                }
            }
        }

        for point in &self.points {
            draw_disc(buffer, point.pos, 5.0, anchor_fill);
            draw_ring(buffer, point.pos, 5.0, anchor_ring);
        }
    }
}

/// Evaluate a cubic bezier at parameter t.
fn cubic_point(p0: Pos2, c1: Pos2, c2: Pos2, p1: Pos2, t: f32) -> Pos2 {
    let u = 1.0 - t;
    let w0 = u * u * u;
    let w1 = 3.0 * u * u * t;
    let w2 = 3.0 * u * t * t;
    let w3 = t * t * t;
    pos2(
        w0 * p0.x + w1 * c1.x + w2 * c2.x + w3 * p1.x,
        w0 * p0.y + w1 * c1.y + w2 * c2.y + w3 * p1.y,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn white_buffer(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255]))
    }

    #[test]
    fn first_point_has_no_handles() {
        let mut path = PathEditor::new();
        path.add_point(10.0, 10.0);
        assert_eq!(path.len(), 1);
        assert!(path.points()[0].handle_in.is_none());
        assert!(path.points()[0].handle_out.is_none());
    }

    #[test]
    fn auto_handles_are_antiparallel_at_30_percent() {
        let mut path = PathEditor::new();
        path.add_point(50.0, 50.0);
        path.add_point(150.0, 50.0);

        let prev = path.points()[0];
        let new = path.points()[1];
        let handle_out = prev.handle_out.expect("previous anchor gets an out-handle");
        let handle_in = new.handle_in.expect("new anchor gets an in-handle");

        // 30% of the 100 px gap, pointing back toward the previous anchor.
        assert!((handle_in.length() - 30.0).abs() < 1e-4);
        assert!((handle_out.length() - 30.0).abs() < 1e-4);
        assert!((handle_in.x + 30.0).abs() < 1e-4);
        assert!(handle_in.y.abs() < 1e-4);
        // Out-handle of the previous anchor matches the in-handle vector, so
        // the directions out of each anchor are antiparallel.
        assert_eq!(handle_out, handle_in);
    }

    #[test]
    fn add_point_keeps_existing_out_handle() {
        let mut path = PathEditor::new();
        path.add_point(0.0, 0.0);
        path.add_point(100.0, 0.0);
        // Give point 1 an explicit out-handle, then verify a third point does
        // not overwrite it.
        let forced = vec2(5.0, 7.0);
        path.points_mut_for_test(|pts| pts[1].handle_out = Some(forced));
        path.add_point(200.0, 0.0);
        assert_eq!(path.points()[1].handle_out, Some(forced));
        // The new point still receives its own in-handle.
        assert!(path.points()[2].handle_in.is_some());
    }

    #[test]
    fn symmetric_drag_negates_opposite_handle() {
        let mut path = PathEditor::new();
        path.add_point(0.0, 0.0);
        path.add_point(100.0, 0.0);
        // Mid-segment insertion gives a point with both handles.
        let idx = path.insert_on_segment(50.0, 3.0).expect("within threshold");

        path.drag_handle(idx, HandleKind::In, 4.0, -9.0, true);
        let point = path.points()[idx];
        let h_in = point.handle_in.unwrap();
        let h_out = point.handle_out.unwrap();
        assert_eq!(h_out, -h_in);

        // And the invariant holds again after a second drag.
        path.drag_handle(idx, HandleKind::Out, -2.5, 6.0, true);
        let point = path.points()[idx];
        assert_eq!(point.handle_out.unwrap(), -point.handle_in.unwrap());
    }

    #[test]
    fn asymmetric_drag_leaves_opposite_handle_alone() {
        let mut path = PathEditor::new();
        path.add_point(0.0, 0.0);
        path.add_point(100.0, 0.0);
        let idx = path.insert_on_segment(50.0, 0.0).unwrap();
        let before = path.points()[idx].handle_out;
        path.drag_handle(idx, HandleKind::In, 3.0, 3.0, false);
        assert_eq!(path.points()[idx].handle_out, before);
    }

    #[test]
    fn drag_anchor_moves_point_and_keeps_handle_offsets() {
        let mut path = PathEditor::new();
        path.add_point(0.0, 0.0);
        path.add_point(100.0, 0.0);
        let h_in = path.points()[1].handle_in;
        path.drag_anchor(1, 10.0, -5.0);
        assert_eq!(path.points()[1].pos, pos2(110.0, -5.0));
        assert_eq!(path.points()[1].handle_in, h_in);
    }

    #[test]
    fn hit_test_prefers_handles_over_anchor_body() {
        let mut path = PathEditor::new();
        path.add_point(0.0, 0.0);
        path.add_point(20.0, 0.0);
        // Anchor 1 sits at (20, 0) with an in-handle at (14, 0); a click at
        // (15, 0) is within range of both and must resolve to the handle.
        assert_eq!(
            path.hit_test(15.0, 0.0),
            Some(PathHit::Handle(1, HandleKind::In))
        );
        // Far side of the anchor is out of handle range but within the body.
        assert_eq!(path.hit_test(28.0, 0.0), Some(PathHit::Anchor(1)));
        assert_eq!(path.hit_test(500.0, 500.0), None);
    }

    #[test]
    fn insert_on_segment_respects_threshold() {
        let mut path = PathEditor::new();
        path.add_point(0.0, 0.0);
        path.add_point(100.0, 0.0);
        assert!(path.insert_on_segment(50.0, 30.0).is_none());
        assert_eq!(path.len(), 2);

        let idx = path.insert_on_segment(50.0, 10.0).unwrap();
        assert_eq!(idx, 1);
        assert_eq!(path.len(), 3);
        let point = path.points()[1];
        // Handles interpolate 25% toward each neighbour.
        assert_eq!(point.handle_in.unwrap(), (pos2(0.0, 0.0) - point.pos) * 0.25);
        assert_eq!(
            point.handle_out.unwrap(),
            (pos2(100.0, 0.0) - point.pos) * 0.25
        );
    }

    #[test]
    fn finalize_requires_two_points() {
        let mut path = PathEditor::new();
        path.add_point(50.0, 50.0);
        let mut buffer = white_buffer(200, 100);
        let before = buffer.clone();

        assert!(!path.finalize(&mut buffer));
        // Buffer untouched, point list retained.
        assert_eq!(buffer, before);
        assert_eq!(path.len(), 1);
    }

    #[test]
    fn finalize_rasterizes_straight_segment_and_clears() {
        let mut path = PathEditor::new();
        path.add_point(50.0, 50.0);
        path.add_point(150.0, 50.0);
        let mut buffer = white_buffer(200, 100);

        assert!(path.finalize(&mut buffer));
        assert!(path.is_empty());

        // The horizontal run between the two anchors is painted black.  The
        // auto-handles are collinear with the segment, so the curve stays on
        // y = 50.
        for x in [55u32, 100, 145] {
            assert_eq!(buffer.get_pixel(x, 50).0, [0, 0, 0, 255], "x = {}", x);
        }
        // Away from the stroke the buffer stays white.
        assert_eq!(buffer.get_pixel(100, 80).0, [255, 255, 255, 255]);
    }

    #[test]
    fn flatten_straight_when_handles_missing() {
        let mut path = PathEditor::new();
        path.add_point(0.0, 0.0);
        path.points_mut_for_test(|pts| pts.push(AnchorPoint::bare(10.0, 10.0)));
        let line = path.flatten();
        assert_eq!(line, vec![pos2(0.0, 0.0), pos2(10.0, 10.0)]);
    }
}

#[cfg(test)]
impl PathEditor {
    fn points_mut_for_test(&mut self, f: impl FnOnce(&mut Vec<AnchorPoint>)) {
        f(&mut self.points);
    }
}
