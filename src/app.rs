use std::time::Instant;

use eframe::egui;
use egui::{Color32, Pos2, Rect, Sense, TextureHandle, TextureOptions, pos2, vec2};
use image::RgbaImage;

use crate::assets::{AppSettings, DIMENSION_PRESETS, Dimension, dimension_by_id};
use crate::canvas::{self, CanvasState, OutputState};
use crate::components::styles::StyleStore;
use crate::components::tools::{
    self, ShapeKind, Tool, ToolController, ToolProperties, ToolResponse,
};
use crate::io;
use crate::ops::generate::{GenerateError, GenerationClient, RequestThrottle};
use crate::ops::worker::{GenerationWorker, JobKind};

/// Outputs kept in the session gallery before the oldest is dropped.
const GENERATION_HISTORY_LIMIT: usize = 12;

/// One finished render kept in the session gallery, together with the
/// sketch and dimension it was generated from so both canvases can be
/// restored.
struct GenerationRecord {
    style_name: String,
    dimension_id: String,
    taken_at: String,
    sketch_png: Vec<u8>,
    output_png: Vec<u8>,
}

pub struct SketchFEApp {
    settings: AppSettings,
    styles: StyleStore,

    canvas: CanvasState,
    output: OutputState,
    dimension: Dimension,

    props: ToolProperties,
    controller: ToolController,

    client: Option<GenerationClient>,
    worker: GenerationWorker,
    throttle: RequestThrottle,

    canvas_texture: Option<TextureHandle>,
    output_texture: Option<TextureHandle>,
    canvas_dirty: bool,
    output_dirty: bool,

    /// PNG bytes of the most recent render, used by refine / save / send-back.
    last_render: Option<Vec<u8>>,
    gallery: Vec<GenerationRecord>,

    error_message: Option<String>,
    show_api_key_modal: bool,
    api_key_input: String,
    retry_after_key: bool,

    show_style_modal: bool,
    new_style_name: String,
    new_style_prompt: String,

    refine_prompt: String,
}

impl SketchFEApp {
    pub fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        Self::from_settings(AppSettings::load())
    }

    fn from_settings(settings: AppSettings) -> Self {
        let mut styles = StyleStore::new();
        styles.load_custom(crate::assets::load_custom_styles());
        styles.subscribe(|event| {
            crate::log_info!("styles: {:?}", event);
        });
        styles.select(&settings.style_key);

        let dimension = dimension_by_id(&settings.dimension_id);
        let mut canvas = CanvasState::new(dimension.width, dimension.height, settings.max_undo_steps);
        // Seed the history so the first undo lands back on blank white.
        canvas.snapshot();
        let output = OutputState::new(dimension.width, dimension.height);

        let client = match GenerationClient::new(&settings.api_base_url) {
            Ok(client) => Some(client),
            Err(e) => {
                crate::log_err!("app: could not build HTTP client: {}", e);
                None
            }
        };

        Self {
            api_key_input: settings.api_key_override.clone(),
            settings,
            styles,
            canvas,
            output,
            dimension,
            props: ToolProperties::default(),
            controller: ToolController::new(),
            client,
            worker: GenerationWorker::new(),
            throttle: RequestThrottle::new(),
            canvas_texture: None,
            output_texture: None,
            canvas_dirty: true,
            output_dirty: true,
            last_render: None,
            gallery: Vec::new(),
            error_message: None,
            show_api_key_modal: false,
            retry_after_key: false,
            show_style_modal: false,
            new_style_name: String::new(),
            new_style_prompt: String::new(),
            refine_prompt: String::new(),
        }
    }

    // ------------------------------------------------------------------
    // Generation
    // ------------------------------------------------------------------

    fn request_generation(&mut self, bypass_throttle: bool) {
        if !self.canvas.has_drawing() {
            crate::log_info!("app: generation skipped, canvas is blank");
            return;
        }
        if bypass_throttle {
            self.throttle.arm_bypass();
        }
        if !self.throttle.admit(Instant::now()) {
            crate::log_info!("app: generation throttled");
            return;
        }
        let Some(client) = &self.client else {
            self.error_message = Some("HTTP client unavailable".to_string());
            return;
        };
        let drawing_data = match io::compress_for_upload(&self.canvas.flatten()) {
            Ok(data) => data,
            Err(e) => {
                self.error_message = Some(e);
                return;
            }
        };
        let prompt = self.styles.prompt_for(self.styles.selected_key());
        if self.settings.debug_mode {
            crate::log_info!("app: generate prompt: {}", prompt);
        }
        self.worker.submit(
            client,
            self.settings.api_key(),
            JobKind::Generate {
                prompt,
                drawing_data,
            },
        );
    }

    fn request_refine(&mut self) {
        let Some(png) = &self.last_render else {
            return;
        };
        let Some(client) = &self.client else {
            return;
        };
        let image = match io::decode_png(png) {
            Ok(image) => image,
            Err(e) => {
                self.error_message = Some(e);
                return;
            }
        };
        let image_data = match io::compress_for_upload(&image) {
            Ok(data) => data,
            Err(e) => {
                self.error_message = Some(e);
                return;
            }
        };
        let prompt = if self.refine_prompt.trim().is_empty() {
            self.styles.prompt_for(self.styles.selected_key())
        } else {
            self.refine_prompt.trim().to_string()
        };
        self.worker.submit(
            client,
            self.settings.api_key(),
            JobKind::Refine { prompt, image_data },
        );
    }

    /// Import a photo: upload it for doodle conversion.  The converted
    /// line drawing lands on the canvas via the completion handler.
    fn import_image(&mut self, image: RgbaImage) {
        let Some(client) = &self.client else {
            self.error_message = Some("HTTP client unavailable".to_string());
            return;
        };
        let image_data = match io::compress_for_upload(&image) {
            Ok(data) => data,
            Err(e) => {
                self.error_message = Some(e);
                return;
            }
        };
        self.worker.submit(
            client,
            self.settings.api_key(),
            JobKind::DoodleConvert { image_data },
        );
    }

    /// Feed the latest render back in as editable source material.
    fn send_back_to_canvas(&mut self) {
        let Some(png) = self.last_render.clone() else {
            return;
        };
        match io::decode_png(&png) {
            Ok(image) => self.import_image(image),
            Err(e) => self.error_message = Some(e),
        }
    }

    /// Place a converted doodle on the canvas: blank to white, fit the
    /// drawing centered, snapshot, then kick off a generation immediately.
    fn apply_doodle(&mut self, doodle: &RgbaImage) {
        self.canvas.clear();
        let (x, y, w, h) = canvas::fit_rect(
            doodle.width(),
            doodle.height(),
            self.canvas.width(),
            self.canvas.height(),
        );
        if w > 0 && h > 0 {
            let scaled = image::imageops::resize(
                doodle,
                w,
                h,
                image::imageops::FilterType::Triangle,
            );
            image::imageops::overlay(self.canvas.strokes_mut(), &scaled, x as i64, y as i64);
        }
        self.canvas.snapshot();
        self.canvas_dirty = true;
        self.request_generation(true);
    }

    fn handle_completion(&mut self, kind: JobKind, result: Result<Vec<u8>, GenerateError>) {
        match result {
            Ok(bytes) => match kind {
                JobKind::Generate { .. } | JobKind::Refine { .. } => {
                    match io::decode_image_bytes(&bytes) {
                        Ok(image) => {
                            self.output.set_image_letterboxed(&image);
                            self.output_dirty = true;
                            self.error_message = None;
                            match (io::encode_png(&image), io::encode_png(&self.canvas.flatten()))
                            {
                                (Ok(png), Ok(sketch_png)) => {
                                    self.gallery.push(GenerationRecord {
                                        style_name: self.styles.selected_name().to_string(),
                                        dimension_id: self.dimension.id.to_string(),
                                        taken_at: io::compact_timestamp(),
                                        sketch_png,
                                        output_png: png.clone(),
                                    });
                                    if self.gallery.len() > GENERATION_HISTORY_LIMIT {
                                        self.gallery.remove(0);
                                    }
                                    self.last_render = Some(png);
                                }
                                (Err(e), _) | (_, Err(e)) => {
                                    crate::log_err!("app: could not archive render: {}", e);
                                }
                            }
                        }
                        Err(e) => {
                            self.error_message = Some(e);
                            self.reset_output();
                        }
                    }
                }
                JobKind::DoodleConvert { .. } => match io::decode_image_bytes(&bytes) {
                    Ok(doodle) => self.apply_doodle(&doodle),
                    Err(e) => self.error_message = Some(e),
                },
            },
            Err(err) => {
                crate::log_err!("app: {} job failed: {}", kind.label(), err);
                if err.needs_api_key() {
                    self.show_api_key_modal = true;
                    self.retry_after_key = true;
                } else {
                    self.error_message = Some(err.to_string());
                    self.reset_output();
                }
            }
        }
    }

    /// Blank the output after a failed generation.  The stored render goes
    /// with it; refine and save must never act on an image that is no
    /// longer shown.
    fn reset_output(&mut self) {
        self.output.clear_white();
        self.output_dirty = true;
        self.last_render = None;
    }

    // ------------------------------------------------------------------
    // Persistence helpers
    // ------------------------------------------------------------------

    fn persist_settings(&self) {
        self.settings.save();
    }

    fn persist_styles(&self) {
        crate::assets::save_custom_styles(&self.styles.custom_styles());
    }

    fn set_dimension(&mut self, dimension: Dimension) {
        if dimension == self.dimension {
            return;
        }
        self.worker.cancel_pending();
        self.dimension = dimension;
        self.canvas.resize(dimension.width, dimension.height);
        self.canvas.snapshot();
        self.output.resize(dimension.width, dimension.height);
        self.reset_output();
        self.canvas_dirty = true;
        self.settings.dimension_id = dimension.id.to_string();
        self.persist_settings();
    }

    // ------------------------------------------------------------------
    // UI sections
    // ------------------------------------------------------------------

    fn show_toolbar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal_wrapped(|ui| {
            for tool in [Tool::Pencil, Tool::Eraser, Tool::Pen, Tool::Selection] {
                if ui
                    .selectable_label(self.props.tool == tool, tool.label())
                    .clicked()
                {
                    self.props.tool = tool;
                }
            }
            let shape_active = matches!(self.props.tool, Tool::Shape(_));
            ui.menu_button(if shape_active { self.props.tool.label() } else { "Shapes" }, |ui| {
                for kind in ShapeKind::all() {
                    if ui.button(kind.label()).clicked() {
                        self.props.tool = Tool::Shape(*kind);
                        ui.close_menu();
                    }
                }
            });

            ui.separator();
            ui.label("Width");
            ui.add(egui::Slider::new(&mut self.props.width, 0.5..=10.0));
            let mut rgb = [
                self.props.color[0] as f32 / 255.0,
                self.props.color[1] as f32 / 255.0,
                self.props.color[2] as f32 / 255.0,
            ];
            if ui.color_edit_button_rgb(&mut rgb).changed() {
                self.props.color = image::Rgba([
                    (rgb[0] * 255.0) as u8,
                    (rgb[1] * 255.0) as u8,
                    (rgb[2] * 255.0) as u8,
                    255,
                ]);
            }

            ui.separator();
            if ui.button("Undo").clicked() {
                self.canvas.undo();
                self.canvas_dirty = true;
            }
            if ui.button("Clear").clicked() {
                self.worker.cancel_pending();
                self.canvas.clear();
                self.canvas.snapshot();
                self.canvas_dirty = true;
            }
            if ui.button("Import…").clicked()
                && let Some(path) = io::pick_image_dialog()
            {
                match io::load_image(&path) {
                    Ok(image) => self.import_image(image),
                    Err(e) => self.error_message = Some(e),
                }
            }
        });

        ui.horizontal_wrapped(|ui| {
            ui.label("Style");
            let selected = self.styles.selected_name().to_string();
            let mut pick: Option<String> = None;
            egui::ComboBox::from_id_source("style_combo")
                .selected_text(selected)
                .show_ui(ui, |ui| {
                    let keys: Vec<String> = self.styles.keys().map(str::to_string).collect();
                    for key in keys {
                        let name = self
                            .styles
                            .get(&key)
                            .map(|s| s.name.clone())
                            .unwrap_or_else(|| key.clone());
                        if ui
                            .selectable_label(self.styles.selected_key() == key, name)
                            .clicked()
                        {
                            pick = Some(key);
                        }
                    }
                });
            if let Some(key) = pick {
                self.styles.select(&key);
                self.settings.style_key = key;
                self.persist_settings();
                // A style switch re-renders the existing drawing right away.
                if self.settings.auto_generate {
                    self.request_generation(true);
                }
            }
            if ui.button("New style…").clicked() {
                self.show_style_modal = true;
            }
            let removable = self
                .styles
                .get(self.styles.selected_key())
                .is_some_and(|s| s.is_custom);
            if removable && ui.button("Remove style").clicked() {
                let key = self.styles.selected_key().to_string();
                if let Err(e) = self.styles.remove(&key) {
                    self.error_message = Some(e);
                } else {
                    self.settings.style_key = self.styles.selected_key().to_string();
                    self.persist_settings();
                    self.persist_styles();
                }
            }

            ui.separator();
            ui.label("Size");
            let mut pick_dim: Option<Dimension> = None;
            egui::ComboBox::from_id_source("dimension_combo")
                .selected_text(self.dimension.label)
                .show_ui(ui, |ui| {
                    for dim in DIMENSION_PRESETS {
                        if ui
                            .selectable_label(self.dimension == *dim, dim.label)
                            .clicked()
                        {
                            pick_dim = Some(*dim);
                        }
                    }
                });
            if let Some(dim) = pick_dim {
                self.set_dimension(dim);
            }

            ui.separator();
            if ui.checkbox(&mut self.settings.auto_generate, "Auto-render").changed() {
                self.persist_settings();
            }
            if ui
                .add_enabled(!self.worker.is_busy(), egui::Button::new("Render"))
                .clicked()
            {
                self.request_generation(false);
            }
            if self.worker.is_busy() {
                ui.spinner();
                if ui.button("Cancel").clicked() {
                    self.worker.cancel_pending();
                }
            }
        });
    }

    fn show_output_controls(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let has_render = self.last_render.is_some();
            ui.add_enabled_ui(has_render, |ui| {
                ui.text_edit_singleline(&mut self.refine_prompt);
                if ui.button("Refine").clicked() {
                    self.request_refine();
                }
                if ui.button("Use as sketch").clicked() {
                    self.send_back_to_canvas();
                }
                if ui.button("Save…").clicked()
                    && let Some(png) = &self.last_render
                {
                    let name = io::default_output_name(self.styles.selected_name());
                    match io::decode_png(png) {
                        Ok(image) => match io::save_png_dialog(&image, &name) {
                            Ok(Some(path)) => {
                                crate::log_info!("app: saved render to {}", path.display());
                            }
                            Ok(None) => {}
                            Err(e) => self.error_message = Some(e),
                        },
                        Err(e) => self.error_message = Some(e),
                    }
                }
            });
        });
    }

    fn show_gallery(&mut self, ui: &mut egui::Ui) {
        if self.gallery.is_empty() {
            return;
        }
        ui.separator();
        ui.label("Session renders");
        let mut restore: Option<usize> = None;
        egui::ScrollArea::horizontal().show(ui, |ui| {
            ui.horizontal(|ui| {
                for (index, record) in self.gallery.iter().enumerate().rev() {
                    let label = format!("{} #{}", record.style_name, index + 1);
                    if ui
                        .button(label)
                        .on_hover_text(&record.taken_at)
                        .clicked()
                    {
                        restore = Some(index);
                    }
                }
            });
        });
        if let Some(index) = restore {
            self.restore_record(index);
        }
    }

    /// Bring a gallery entry back: its dimension, the sketch it was
    /// generated from, and the rendered output.
    fn restore_record(&mut self, index: usize) {
        let Some(record) = self.gallery.get(index) else {
            return;
        };
        let dimension = dimension_by_id(&record.dimension_id);
        let sketch_png = record.sketch_png.clone();
        let output_png = record.output_png.clone();

        self.set_dimension(dimension);
        match io::decode_png(&sketch_png) {
            Ok(sketch) => {
                self.canvas.clear();
                if sketch.dimensions() == (self.canvas.width(), self.canvas.height()) {
                    *self.canvas.strokes_mut() = sketch;
                } else {
                    image::imageops::overlay(self.canvas.strokes_mut(), &sketch, 0, 0);
                }
                self.canvas.snapshot();
                self.canvas_dirty = true;
            }
            Err(e) => self.error_message = Some(e),
        }
        match io::decode_png(&output_png) {
            Ok(image) => {
                self.output.set_image_letterboxed(&image);
                self.output_dirty = true;
                self.last_render = Some(output_png);
            }
            Err(e) => self.error_message = Some(e),
        }
    }

    fn error_modal(&mut self, ctx: &egui::Context) {
        let Some(message) = self.error_message.clone() else {
            return;
        };
        egui::Window::new("Generation failed")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, vec2(0.0, 0.0))
            .show(ctx, |ui| {
                ui.label(message);
                if self.settings.debug_mode
                    && let Some(path) = crate::logger::log_path()
                {
                    ui.label(format!("Details: {}", path.display()));
                }
                if ui.button("Dismiss").clicked() {
                    self.error_message = None;
                }
            });
    }

    fn api_key_modal(&mut self, ctx: &egui::Context) {
        if !self.show_api_key_modal {
            return;
        }
        egui::Window::new("API key required")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, vec2(0.0, 0.0))
            .show(ctx, |ui| {
                ui.label("The shared quota is exhausted. Enter your own API key to continue.");
                ui.text_edit_singleline(&mut self.api_key_input);
                ui.horizontal(|ui| {
                    if ui.button("Save").clicked() {
                        self.settings.api_key_override = self.api_key_input.trim().to_string();
                        self.persist_settings();
                        self.show_api_key_modal = false;
                        if std::mem::take(&mut self.retry_after_key) {
                            self.request_generation(true);
                        }
                    }
                    if ui.button("Cancel").clicked() {
                        self.show_api_key_modal = false;
                        self.retry_after_key = false;
                    }
                });
            });
    }

    fn style_modal(&mut self, ctx: &egui::Context) {
        if !self.show_style_modal {
            return;
        }
        egui::Window::new("New style")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, vec2(0.0, 0.0))
            .show(ctx, |ui| {
                ui.label("Name");
                ui.text_edit_singleline(&mut self.new_style_name);
                ui.label("Prompt (blank for a default prompt)");
                ui.text_edit_multiline(&mut self.new_style_prompt);
                ui.horizontal(|ui| {
                    if ui.button("Add").clicked() {
                        match self
                            .styles
                            .insert_custom(&self.new_style_name, &self.new_style_prompt)
                        {
                            Ok(key) => {
                                self.styles.select(&key);
                                self.settings.style_key = key;
                                self.persist_settings();
                                self.persist_styles();
                                self.new_style_name.clear();
                                self.new_style_prompt.clear();
                                self.show_style_modal = false;
                            }
                            Err(e) => self.error_message = Some(e),
                        }
                    }
                    if ui.button("Cancel").clicked() {
                        self.show_style_modal = false;
                    }
                });
            });
    }

    // ------------------------------------------------------------------
    // Canvas panels
    // ------------------------------------------------------------------

    /// Fit the canvas into the available rect, returning the display rect
    /// and the screen-to-canvas scale factor.
    fn display_rect(avail: Rect, canvas_w: u32, canvas_h: u32) -> (Rect, f32) {
        let scale = (avail.width() / canvas_w as f32)
            .min(avail.height() / canvas_h as f32)
            .max(f32::EPSILON);
        let size = vec2(canvas_w as f32 * scale, canvas_h as f32 * scale);
        let min = avail.min + (avail.size() - size) / 2.0;
        (Rect::from_min_size(min, size), scale)
    }

    fn to_canvas(pos: Pos2, rect: Rect, scale: f32) -> Pos2 {
        pos2((pos.x - rect.min.x) / scale, (pos.y - rect.min.y) / scale)
    }

    fn show_drawing_canvas(&mut self, ui: &mut egui::Ui, avail: Rect) {
        let (rect, scale) = Self::display_rect(avail, self.canvas.width(), self.canvas.height());
        let response = ui.allocate_rect(rect, Sense::click_and_drag());

        let pointer = response
            .interact_pointer_pos()
            .map(|pos| Self::to_canvas(pos, rect, scale));

        let mut resp = ToolResponse::none();
        if let Some(pos) = pointer {
            if response.double_clicked() {
                resp = self
                    .controller
                    .pointer_down(&mut self.canvas, &self.props, pos, true);
            } else if response.drag_started() {
                resp = self
                    .controller
                    .pointer_down(&mut self.canvas, &self.props, pos, false);
            } else if response.dragged() {
                resp = self
                    .controller
                    .pointer_moved(&mut self.canvas, &self.props, pos);
            }
            if response.drag_released() {
                let up = self
                    .controller
                    .pointer_up(&mut self.canvas, &self.props, pos);
                resp.repaint |= up.repaint;
                resp.edit_finished |= up.edit_finished;
            }
        }
        if resp.repaint {
            self.canvas_dirty = true;
        }
        if resp.edit_finished && self.settings.auto_generate {
            self.request_generation(false);
        }

        // Shape preview rides on top of the committed frame.
        let shape_drag = match (self.props.tool, self.canvas.shape_start, pointer) {
            (Tool::Shape(kind), Some(start), Some(current)) => Some((kind, start, current)),
            _ => None,
        };
        if shape_drag.is_some() {
            self.canvas_dirty = true;
        }

        if self.canvas_dirty {
            let mut frame = self.canvas.composite();
            if let Some((kind, start, current)) = shape_drag {
                tools::draw_shape_preview(&mut frame, kind, start, current, &self.props);
            }
            let color_image = canvas::to_color_image(&frame);
            match &mut self.canvas_texture {
                Some(texture) => texture.set(color_image, TextureOptions::LINEAR),
                None => {
                    self.canvas_texture =
                        Some(ui.ctx()
                            .load_texture("canvas", color_image, TextureOptions::LINEAR))
                }
            }
            self.canvas_dirty = false;
        }

        if let Some(texture) = &self.canvas_texture {
            ui.painter().image(
                texture.id(),
                rect,
                Rect::from_min_max(pos2(0.0, 0.0), pos2(1.0, 1.0)),
                Color32::WHITE,
            );
        }
    }

    fn show_output_canvas(&mut self, ui: &mut egui::Ui, avail: Rect) {
        let (rect, _) = Self::display_rect(avail, self.output.width(), self.output.height());
        if self.output_dirty {
            let color_image = canvas::to_color_image(self.output.buffer());
            match &mut self.output_texture {
                Some(texture) => texture.set(color_image, TextureOptions::LINEAR),
                None => {
                    self.output_texture =
                        Some(ui.ctx()
                            .load_texture("output", color_image, TextureOptions::LINEAR))
                }
            }
            self.output_dirty = false;
        }
        if let Some(texture) = &self.output_texture {
            ui.painter().image(
                texture.id(),
                rect,
                Rect::from_min_max(pos2(0.0, 0.0), pos2(1.0, 1.0)),
                Color32::WHITE,
            );
        }
        if self.worker.is_busy() {
            ui.put(rect, egui::Spinner::new().size(32.0));
        }
    }

    // ------------------------------------------------------------------
    // Input handling
    // ------------------------------------------------------------------

    fn handle_keys(&mut self, ctx: &egui::Context) {
        let wants_keyboard = ctx.wants_keyboard_input();
        ctx.input(|i| {
            // Holding Shift breaks handle symmetry while dragging.
            self.props.symmetric_handles = !i.modifiers.shift;
        });
        if wants_keyboard {
            return;
        }

        let (delete, enter, escape, undo) = ctx.input(|i| {
            (
                i.key_pressed(egui::Key::Delete) || i.key_pressed(egui::Key::Backspace),
                i.key_pressed(egui::Key::Enter),
                i.key_pressed(egui::Key::Escape),
                i.modifiers.command && i.key_pressed(egui::Key::Z),
            )
        });

        if delete && self.canvas.layers.delete_active() {
            self.canvas.snapshot();
            self.canvas_dirty = true;
            if self.settings.auto_generate {
                self.request_generation(false);
            }
        }
        if enter && self.props.tool == Tool::Pen {
            if self.canvas.finalize_path() {
                self.canvas.snapshot();
                self.canvas_dirty = true;
                if self.settings.auto_generate {
                    self.request_generation(false);
                }
            }
        }
        if escape && !self.canvas.path.is_empty() {
            self.canvas.path.clear();
            self.canvas_dirty = true;
        }
        if undo {
            self.canvas.undo();
            self.canvas_dirty = true;
        }
    }

    fn handle_dropped_files(&mut self, ctx: &egui::Context) {
        let dropped: Vec<egui::DroppedFile> = ctx.input(|i| i.raw.dropped_files.clone());
        for file in dropped {
            let loaded = match (&file.path, &file.bytes) {
                (Some(path), _) => {
                    if !io::is_image_path(path) {
                        crate::log_warn!("app: ignoring dropped non-image {}", path.display());
                        continue;
                    }
                    io::load_image(path)
                }
                // Path-less drops (web) arrive as raw bytes.
                (None, Some(bytes)) => io::decode_image_bytes(bytes),
                (None, None) => continue,
            };
            match loaded {
                Ok(image) => {
                    self.import_image(image);
                    break;
                }
                Err(e) => self.error_message = Some(e),
            }
        }
    }
}

impl eframe::App for SketchFEApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if let Some(completion) = self.worker.poll() {
            self.handle_completion(completion.kind, completion.result);
        }
        if self.worker.is_busy() {
            // Keep polling while a render is in flight.
            ctx.request_repaint_after(std::time::Duration::from_millis(100));
        }

        self.handle_keys(ctx);
        self.handle_dropped_files(ctx);

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            self.show_toolbar(ui);
        });

        egui::TopBottomPanel::bottom("gallery").show(ctx, |ui| {
            self.show_output_controls(ui);
            self.show_gallery(ui);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            let avail = ui.available_rect_before_wrap();
            let gap = 8.0;
            let half = (avail.width() - gap) / 2.0;
            let left = Rect::from_min_size(avail.min, vec2(half, avail.height()));
            let right = Rect::from_min_size(
                pos2(avail.min.x + half + gap, avail.min.y),
                vec2(half, avail.height()),
            );
            self.show_drawing_canvas(ui, left);
            self.show_output_canvas(ui, right);
        });

        self.api_key_modal(ctx);
        self.style_modal(ctx);
        self.error_modal(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn test_app() -> SketchFEApp {
        SketchFEApp::from_settings(AppSettings::default())
    }

    fn generate_kind() -> JobKind {
        JobKind::Generate {
            prompt: "p".to_string(),
            drawing_data: "d".to_string(),
        }
    }

    #[test]
    fn failed_generation_blanks_output_and_drops_stored_render() {
        let mut app = test_app();
        let shown = RgbaImage::from_pixel(8, 8, Rgba([0, 200, 0, 255]));
        app.output.set_image_letterboxed(&shown);
        app.last_render = Some(vec![1, 2, 3]);

        app.handle_completion(generate_kind(), Err(GenerateError::Api("boom".to_string())));

        assert_eq!(app.error_message.as_deref(), Some("Generation failed: boom"));
        assert!(app.last_render.is_none());
        // Letterbox black is gone; the output reverted to blank white.
        assert_eq!(app.output.buffer().get_pixel(0, 0).0, [255, 255, 255, 255]);
    }

    #[test]
    fn undecodable_payload_counts_as_failure() {
        let mut app = test_app();
        app.last_render = Some(vec![7]);

        app.handle_completion(generate_kind(), Ok(vec![0, 1, 2, 3]));

        assert!(app.error_message.is_some());
        assert!(app.last_render.is_none());
        assert!(app.gallery.is_empty());
    }

    #[test]
    fn quota_failure_opens_key_modal_and_keeps_render() {
        let mut app = test_app();
        app.last_render = Some(vec![9]);

        app.handle_completion(
            generate_kind(),
            Err(GenerateError::Quota("quota exceeded".to_string())),
        );

        assert!(app.show_api_key_modal);
        assert!(app.retry_after_key);
        // The key dialog replaces the error path; the render stays usable.
        assert!(app.error_message.is_none());
        assert!(app.last_render.is_some());
    }

    #[test]
    fn successful_generation_archives_and_stores_render() {
        let mut app = test_app();
        let rendered = RgbaImage::from_pixel(8, 8, Rgba([0, 200, 0, 255]));
        let png = io::encode_png(&rendered).unwrap();

        app.handle_completion(generate_kind(), Ok(png));

        assert!(app.error_message.is_none());
        assert!(app.last_render.is_some());
        assert_eq!(app.gallery.len(), 1);
        assert_eq!(app.gallery[0].style_name, "Chrome");
    }
}
