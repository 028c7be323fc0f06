use eframe::egui;
use egui::Pos2;
use image::Rgba;

use crate::canvas::{self, CanvasState};
use crate::components::layers::LayerHit;
use crate::components::path::PathHit;

/// Pencil strokes render at four times the base width.
pub const PENCIL_WIDTH_FACTOR: f32 = 4.0;
/// Line strokes render at twice the base width.
pub const LINE_WIDTH_FACTOR: f32 = 2.0;
/// The eraser is a fixed-width white stroke.
pub const ERASER_WIDTH: f32 = 60.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShapeKind {
    Rectangle,
    Circle,
    Line,
    Star,
}

impl ShapeKind {
    pub fn label(&self) -> &'static str {
        match self {
            ShapeKind::Rectangle => "Rectangle",
            ShapeKind::Circle => "Circle",
            ShapeKind::Line => "Line",
            ShapeKind::Star => "Star",
        }
    }

    pub fn all() -> &'static [ShapeKind] {
        &[
            ShapeKind::Rectangle,
            ShapeKind::Circle,
            ShapeKind::Line,
            ShapeKind::Star,
        ]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum Tool {
    #[default]
    Pencil,
    Eraser,
    Pen,
    Shape(ShapeKind),
    Selection,
}

impl Tool {
    pub fn label(&self) -> &'static str {
        match self {
            Tool::Pencil => "Pencil",
            Tool::Eraser => "Eraser",
            Tool::Pen => "Pen",
            Tool::Shape(kind) => kind.label(),
            Tool::Selection => "Select",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ToolProperties {
    pub tool: Tool,
    pub color: Rgba<u8>,
    /// Base stroke width; pencil and line scale it up.
    pub width: f32,
    /// Pen handle drags mirror the opposite handle while this is set.
    pub symmetric_handles: bool,
}

impl Default for ToolProperties {
    fn default() -> Self {
        Self {
            tool: Tool::Pencil,
            color: Rgba([0, 0, 0, 255]),
            width: 2.0,
            symmetric_handles: true,
        }
    }
}

/// What the app should do after a pointer event was dispatched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ToolResponse {
    /// The canvas changed visually.
    pub repaint: bool,
    /// A completed edit was snapshotted; auto-generation may fire.
    pub edit_finished: bool,
}

impl ToolResponse {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn repaint() -> Self {
        Self {
            repaint: true,
            edit_finished: false,
        }
    }

    pub fn finished() -> Self {
        Self {
            repaint: true,
            edit_finished: true,
        }
    }
}

/// Routes pointer events and tracks transient drag state (which pen element
/// is grabbed, the previous pointer position).  Placed images capture the
/// pointer before any tool runs: a press that hits an image body or resize
/// handle starts an image interaction no matter which tool is active, and
/// only a miss falls through to the tool dispatch.  All coordinates are in
/// canvas pixels; the app maps from screen space first.
#[derive(Default)]
pub struct ToolController {
    pen_drag: Option<PathHit>,
    pen_last: Option<Pos2>,
}

impl ToolController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dragging_path(&self) -> bool {
        self.pen_drag.is_some()
    }

    pub fn pointer_down(
        &mut self,
        canvas: &mut CanvasState,
        props: &ToolProperties,
        pos: Pos2,
        double_click: bool,
    ) -> ToolResponse {
        // Placed images capture the pointer ahead of the tool dispatch.
        if let Some(hit) = canvas.layers.hit_test(pos.x, pos.y) {
            canvas.layers.begin(hit, pos.x, pos.y);
            let (LayerHit::Body(id) | LayerHit::ResizeHandle(id)) = hit;
            crate::log_info!("tools: grabbed image {}", id);
            return ToolResponse::repaint();
        }
        match props.tool {
            Tool::Pencil | Tool::Eraser => {
                let (width, color) = stroke_params(props);
                canvas::draw_disc(canvas.strokes_mut(), pos, width / 2.0, color);
                canvas.last_pos = Some(pos);
                ToolResponse::repaint()
            }
            Tool::Pen => self.pen_down(canvas, pos, double_click),
            Tool::Shape(_) => {
                canvas.shape_start = Some(pos);
                ToolResponse::none()
            }
            Tool::Selection => ToolResponse::none(),
        }
    }

    pub fn pointer_moved(
        &mut self,
        canvas: &mut CanvasState,
        props: &ToolProperties,
        pos: Pos2,
    ) -> ToolResponse {
        if canvas.layers.is_interacting() {
            return if canvas.layers.pointer_moved(pos.x, pos.y) {
                ToolResponse::repaint()
            } else {
                ToolResponse::none()
            };
        }
        match props.tool {
            Tool::Pencil | Tool::Eraser => {
                let Some(last) = canvas.last_pos else {
                    return ToolResponse::none();
                };
                let (width, color) = stroke_params(props);
                canvas::stroke_line(canvas.strokes_mut(), last, pos, width, color);
                canvas.last_pos = Some(pos);
                ToolResponse::repaint()
            }
            Tool::Pen => {
                let (Some(hit), Some(last)) = (self.pen_drag, self.pen_last) else {
                    return ToolResponse::none();
                };
                let delta = pos - last;
                match hit {
                    PathHit::Anchor(index) => canvas.path.drag_anchor(index, delta.x, delta.y),
                    PathHit::Handle(index, which) => canvas.path.drag_handle(
                        index,
                        which,
                        delta.x,
                        delta.y,
                        props.symmetric_handles,
                    ),
                }
                self.pen_last = Some(pos);
                ToolResponse::repaint()
            }
            // Previewed live; nothing committed until release.
            Tool::Shape(_) => ToolResponse::repaint(),
            Tool::Selection => ToolResponse::none(),
        }
    }

    pub fn pointer_up(
        &mut self,
        canvas: &mut CanvasState,
        props: &ToolProperties,
        pos: Pos2,
    ) -> ToolResponse {
        // An image interaction ends with its own snapshot; the tool never
        // saw the press, so it has nothing to commit.
        if canvas.layers.release() {
            canvas.snapshot();
            return ToolResponse::finished();
        }
        match props.tool {
            Tool::Pencil | Tool::Eraser => {
                if canvas.last_pos.take().is_none() {
                    return ToolResponse::none();
                }
                canvas.snapshot();
                ToolResponse::finished()
            }
            Tool::Pen => {
                self.pen_drag = None;
                self.pen_last = None;
                ToolResponse::none()
            }
            Tool::Shape(kind) => {
                let Some(start) = canvas.shape_start.take() else {
                    return ToolResponse::none();
                };
                rasterize_shape(canvas.strokes_mut(), kind, start, pos, props);
                canvas.snapshot();
                ToolResponse::finished()
            }
            Tool::Selection => ToolResponse::none(),
        }
    }

    fn pen_down(&mut self, canvas: &mut CanvasState, pos: Pos2, double_click: bool) -> ToolResponse {
        if let Some(hit) = canvas.path.hit_test(pos.x, pos.y) {
            self.pen_drag = Some(hit);
            self.pen_last = Some(pos);
            return ToolResponse::repaint();
        }
        if double_click {
            if let Some(index) = canvas.path.insert_on_segment(pos.x, pos.y) {
                // Grab the fresh anchor so the same gesture can drag it.
                self.pen_drag = Some(PathHit::Anchor(index));
                self.pen_last = Some(pos);
                return ToolResponse::repaint();
            }
            return ToolResponse::none();
        }
        canvas.path.add_point(pos.x, pos.y);
        ToolResponse::repaint()
    }
}

/// Effective width and color of the freehand stroke for the active tool.
fn stroke_params(props: &ToolProperties) -> (f32, Rgba<u8>) {
    match props.tool {
        Tool::Eraser => (ERASER_WIDTH, canvas::WHITE),
        _ => (props.width * PENCIL_WIDTH_FACTOR, props.color),
    }
}

/// Commit a dragged shape onto the stroke layer.
fn rasterize_shape(
    buffer: &mut image::RgbaImage,
    kind: ShapeKind,
    start: Pos2,
    end: Pos2,
    props: &ToolProperties,
) {
    match kind {
        ShapeKind::Rectangle => canvas::fill_rect(buffer, start, end, props.color),
        ShapeKind::Circle => canvas::fill_ellipse(buffer, start, end, props.color),
        ShapeKind::Line => canvas::stroke_line(
            buffer,
            start,
            end,
            props.width * LINE_WIDTH_FACTOR,
            props.color,
        ),
        ShapeKind::Star => canvas::fill_star(buffer, start, end, props.color),
    }
}

/// Draw the in-progress shape onto a display frame.  Called per frame while
/// a shape drag is active; the stroke layer itself is untouched.
pub fn draw_shape_preview(
    frame: &mut image::RgbaImage,
    kind: ShapeKind,
    start: Pos2,
    current: Pos2,
    props: &ToolProperties,
) {
    rasterize_shape(frame, kind, start, current, props);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::history::DEFAULT_HISTORY_CAPACITY;
    use egui::pos2;
    use image::RgbaImage;

    fn canvas() -> CanvasState {
        CanvasState::new(128, 128, DEFAULT_HISTORY_CAPACITY)
    }

    #[test]
    fn pencil_stroke_draws_and_snapshots_once() {
        let mut canvas = canvas();
        let mut ctl = ToolController::new();
        let props = ToolProperties::default();

        ctl.pointer_down(&mut canvas, &props, pos2(20.0, 20.0), false);
        ctl.pointer_moved(&mut canvas, &props, pos2(60.0, 20.0));
        let resp = ctl.pointer_up(&mut canvas, &props, pos2(60.0, 20.0));

        assert!(resp.edit_finished);
        assert_eq!(canvas.strokes().get_pixel(40, 20).0, [0, 0, 0, 255]);
        assert_eq!(canvas.history.len(), 1);

        // A stray release without a press does nothing.
        let resp = ctl.pointer_up(&mut canvas, &props, pos2(60.0, 20.0));
        assert_eq!(resp, ToolResponse::none());
        assert_eq!(canvas.history.len(), 1);
    }

    #[test]
    fn eraser_paints_fixed_width_white() {
        let mut canvas = canvas();
        let mut ctl = ToolController::new();
        let pencil = ToolProperties::default();

        ctl.pointer_down(&mut canvas, &pencil, pos2(10.0, 64.0), false);
        ctl.pointer_moved(&mut canvas, &pencil, pos2(120.0, 64.0));
        ctl.pointer_up(&mut canvas, &pencil, pos2(120.0, 64.0));
        assert!(canvas.has_drawing());

        let eraser = ToolProperties {
            tool: Tool::Eraser,
            ..Default::default()
        };
        ctl.pointer_down(&mut canvas, &eraser, pos2(10.0, 64.0), false);
        ctl.pointer_moved(&mut canvas, &eraser, pos2(120.0, 64.0));
        ctl.pointer_up(&mut canvas, &eraser, pos2(120.0, 64.0));
        // The 60 px eraser swath covers the 8 px pencil line entirely.
        assert!(!canvas.has_drawing());
    }

    #[test]
    fn pen_click_adds_point_and_drag_moves_anchor() {
        let mut canvas = canvas();
        let mut ctl = ToolController::new();
        let props = ToolProperties {
            tool: Tool::Pen,
            ..Default::default()
        };

        ctl.pointer_down(&mut canvas, &props, pos2(30.0, 30.0), false);
        ctl.pointer_up(&mut canvas, &props, pos2(30.0, 30.0));
        assert_eq!(canvas.path.len(), 1);

        // Press on the existing anchor and drag it.
        ctl.pointer_down(&mut canvas, &props, pos2(32.0, 30.0), false);
        assert!(ctl.is_dragging_path());
        ctl.pointer_moved(&mut canvas, &props, pos2(52.0, 40.0));
        ctl.pointer_up(&mut canvas, &props, pos2(52.0, 40.0));
        assert!(!ctl.is_dragging_path());

        let moved = canvas.path.points()[0].pos;
        assert_eq!((moved.x, moved.y), (50.0, 40.0));
        // Anchor edits never enter history by themselves.
        assert!(canvas.history.is_empty());
    }

    #[test]
    fn pen_double_click_inserts_on_segment() {
        let mut canvas = canvas();
        let mut ctl = ToolController::new();
        let props = ToolProperties {
            tool: Tool::Pen,
            ..Default::default()
        };

        ctl.pointer_down(&mut canvas, &props, pos2(20.0, 60.0), false);
        ctl.pointer_up(&mut canvas, &props, pos2(20.0, 60.0));
        ctl.pointer_down(&mut canvas, &props, pos2(100.0, 60.0), false);
        ctl.pointer_up(&mut canvas, &props, pos2(100.0, 60.0));
        assert_eq!(canvas.path.len(), 2);

        // Double-click near the midpoint splits the segment.
        ctl.pointer_down(&mut canvas, &props, pos2(60.0, 63.0), true);
        ctl.pointer_up(&mut canvas, &props, pos2(60.0, 63.0));
        assert_eq!(canvas.path.len(), 3);

        // Double-click far from any segment is ignored.
        ctl.pointer_down(&mut canvas, &props, pos2(60.0, 120.0), true);
        assert_eq!(canvas.path.len(), 3);
    }

    #[test]
    fn shape_commits_on_release_only() {
        let mut canvas = canvas();
        let mut ctl = ToolController::new();
        let props = ToolProperties {
            tool: Tool::Shape(ShapeKind::Rectangle),
            color: Rgba([255, 0, 0, 255]),
            ..Default::default()
        };

        ctl.pointer_down(&mut canvas, &props, pos2(20.0, 20.0), false);
        ctl.pointer_moved(&mut canvas, &props, pos2(80.0, 80.0));
        // Nothing committed mid-drag.
        assert_eq!(canvas.strokes().get_pixel(50, 50).0, [255, 255, 255, 255]);

        let resp = ctl.pointer_up(&mut canvas, &props, pos2(80.0, 80.0));
        assert!(resp.edit_finished);
        assert_eq!(canvas.strokes().get_pixel(50, 50).0, [255, 0, 0, 255]);
        assert_eq!(canvas.history.len(), 1);
    }

    #[test]
    fn selection_drag_moves_image_and_snapshots_on_release() {
        let mut canvas = canvas();
        let mut ctl = ToolController::new();
        let props = ToolProperties {
            tool: Tool::Selection,
            ..Default::default()
        };
        let id = canvas
            .layers
            .add(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 255, 255])), 10.0, 10.0, 30.0, 30.0);

        ctl.pointer_down(&mut canvas, &props, pos2(20.0, 20.0), false);
        ctl.pointer_moved(&mut canvas, &props, pos2(70.0, 70.0));
        let resp = ctl.pointer_up(&mut canvas, &props, pos2(70.0, 70.0));

        assert!(resp.edit_finished);
        let img = canvas.layers.get(id).unwrap();
        assert_eq!((img.x, img.y), (60.0, 60.0));
        assert_eq!(canvas.history.len(), 1);

        // Clicking empty space does not start an interaction.
        let resp = ctl.pointer_down(&mut canvas, &props, pos2(120.0, 5.0), false);
        assert_eq!(resp, ToolResponse::none());
        assert!(!canvas.layers.is_interacting());
    }

    #[test]
    fn placed_image_captures_pointer_regardless_of_tool() {
        let mut canvas = canvas();
        let mut ctl = ToolController::new();
        let pencil = ToolProperties::default();
        let id = canvas
            .layers
            .add(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 255, 255])), 10.0, 10.0, 50.0, 50.0);

        // Pencil press inside the image drags it instead of painting.
        let resp = ctl.pointer_down(&mut canvas, &pencil, pos2(30.0, 30.0), false);
        assert!(resp.repaint);
        assert!(canvas.layers.is_interacting());
        assert_eq!(canvas.strokes().get_pixel(30, 30).0, [255, 255, 255, 255]);

        ctl.pointer_moved(&mut canvas, &pencil, pos2(80.0, 60.0));
        let resp = ctl.pointer_up(&mut canvas, &pencil, pos2(80.0, 60.0));
        assert!(resp.edit_finished);
        let img = canvas.layers.get(id).unwrap();
        assert_eq!((img.x, img.y), (60.0, 40.0));
        assert_eq!(canvas.history.len(), 1);

        // A press that misses the image falls through to the pencil.
        ctl.pointer_down(&mut canvas, &pencil, pos2(110.0, 110.0), false);
        assert!(!canvas.layers.is_interacting());
        assert_eq!(canvas.strokes().get_pixel(110, 110).0, [0, 0, 0, 255]);
    }
}
