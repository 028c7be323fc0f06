use eframe::egui;
use egui::{Pos2, Vec2, pos2, vec2};
use image::RgbaImage;
use uuid::Uuid;

/// Side length of the corner resize handles, in canvas pixels.
pub const RESIZE_HANDLE_SIZE: f32 = 8.0;
/// Extra slop around the resize handle so it stays grabbable at any zoom.
const RESIZE_HANDLE_SLOP: f32 = 5.0;
/// Minimum width/height an image can be resized down to.
pub const MIN_IMAGE_EXTENT: f32 = 20.0;

/// A raster image placed on the canvas as an independently movable and
/// resizable rectangle.  Owned exclusively by the [`LayerManager`].
pub struct PlacedImage {
    pub id: Uuid,
    pub image: RgbaImage,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PlacedImage {
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }

    /// Bottom-right corner — the only resize grip.
    fn resize_corner(&self) -> Pos2 {
        pos2(self.x + self.width, self.y + self.height)
    }

    fn near_resize_corner(&self, x: f32, y: f32) -> bool {
        let corner = self.resize_corner();
        let reach = RESIZE_HANDLE_SIZE / 2.0 + RESIZE_HANDLE_SLOP;
        x >= corner.x - reach && x <= corner.x + reach && y >= corner.y - reach && y <= corner.y + reach
    }
}

/// What part of a placed image a pointer-down landed on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerHit {
    ResizeHandle(Uuid),
    Body(Uuid),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Interaction {
    Drag(Uuid),
    Resize(Uuid),
}

/// Tracks images placed on the canvas, their stacking (insertion) order,
/// and the current drag/resize interaction.
#[derive(Default)]
pub struct LayerManager {
    images: Vec<PlacedImage>,
    interaction: Option<Interaction>,
    /// Pointer offset captured at interaction start: from the image origin
    /// for drags, from the bottom-right corner for resizes.
    grab_offset: Vec2,
}

impl LayerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Images in insertion order (bottom-most first).
    pub fn iter(&self) -> impl Iterator<Item = &PlacedImage> {
        self.images.iter()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<&PlacedImage> {
        self.images.iter().find(|img| img.id == id)
    }

    fn get_mut(&mut self, id: Uuid) -> Option<&mut PlacedImage> {
        self.images.iter_mut().find(|img| img.id == id)
    }

    /// Place a new image on top of the stack and return its id.
    pub fn add(&mut self, image: RgbaImage, x: f32, y: f32, width: f32, height: f32) -> Uuid {
        let id = Uuid::new_v4();
        self.images.push(PlacedImage {
            id,
            image,
            x,
            y,
            width: width.max(MIN_IMAGE_EXTENT),
            height: height.max(MIN_IMAGE_EXTENT),
        });
        id
    }

    /// Hit-test against all images, topmost first.  Resize handles take
    /// precedence over bodies: the handle pass scans every image before the
    /// body pass starts.
    pub fn hit_test(&self, x: f32, y: f32) -> Option<LayerHit> {
        for img in self.images.iter().rev() {
            if img.near_resize_corner(x, y) {
                return Some(LayerHit::ResizeHandle(img.id));
            }
        }
        for img in self.images.iter().rev() {
            if img.contains(x, y) {
                return Some(LayerHit::Body(img.id));
            }
        }
        None
    }

    /// Begin a drag or resize at the pointer position, recording the grab
    /// offset the follow-up moves are measured against.
    pub fn begin(&mut self, hit: LayerHit, x: f32, y: f32) {
        match hit {
            LayerHit::Body(id) => {
                if let Some(img) = self.get(id) {
                    self.grab_offset = vec2(x - img.x, y - img.y);
                    self.interaction = Some(Interaction::Drag(id));
                }
            }
            LayerHit::ResizeHandle(id) => {
                if let Some(img) = self.get(id) {
                    let corner = pos2(img.x + img.width, img.y + img.height);
                    self.grab_offset = vec2(x - corner.x, y - corner.y);
                    self.interaction = Some(Interaction::Resize(id));
                }
            }
        }
    }

    /// Apply a pointer move to the active interaction.  Returns true when an
    /// image changed (the caller recomposites).  Resizes floor at
    /// [`MIN_IMAGE_EXTENT`] per axis; aspect ratio is not preserved.
    pub fn pointer_moved(&mut self, x: f32, y: f32) -> bool {
        let offset = self.grab_offset;
        match self.interaction {
            Some(Interaction::Drag(id)) => {
                if let Some(img) = self.get_mut(id) {
                    img.x = x - offset.x;
                    img.y = y - offset.y;
                    return true;
                }
                false
            }
            Some(Interaction::Resize(id)) => {
                if let Some(img) = self.get_mut(id) {
                    img.width = (x - img.x - offset.x).max(MIN_IMAGE_EXTENT);
                    img.height = (y - img.y - offset.y).max(MIN_IMAGE_EXTENT);
                    return true;
                }
                false
            }
            None => false,
        }
    }

    /// End the active interaction.  Returns true when one was in progress —
    /// the caller takes the history snapshot then, not per move.
    pub fn release(&mut self) -> bool {
        self.interaction.take().is_some()
    }

    /// Id of the image currently being dragged or resized.
    pub fn active(&self) -> Option<Uuid> {
        match self.interaction {
            Some(Interaction::Drag(id)) | Some(Interaction::Resize(id)) => Some(id),
            None => None,
        }
    }

    pub fn is_interacting(&self) -> bool {
        self.interaction.is_some()
    }

    /// Delete the active (selected/dragging) image.  Only that image is
    /// deletable via keyboard shortcut; with no active image this is a no-op.
    pub fn delete_active(&mut self) -> bool {
        let Some(id) = self.active() else {
            return false;
        };
        self.interaction = None;
        let before = self.images.len();
        self.images.retain(|img| img.id != id);
        before != self.images.len()
    }

    /// Drop every image and any interaction state.
    pub fn clear(&mut self) {
        self.images.clear();
        self.interaction = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_image() -> RgbaImage {
        RgbaImage::from_pixel(4, 4, image::Rgba([10, 20, 30, 255]))
    }

    fn manager_with_one(x: f32, y: f32, w: f32, h: f32) -> (LayerManager, Uuid) {
        let mut mgr = LayerManager::new();
        let id = mgr.add(dummy_image(), x, y, w, h);
        (mgr, id)
    }

    #[test]
    fn resize_handle_beats_body() {
        let (mut mgr, bottom) = manager_with_one(0.0, 0.0, 100.0, 100.0);
        // A second image whose body covers the first image's corner.
        let top = mgr.add(dummy_image(), 90.0, 90.0, 100.0, 100.0);

        // The bottom image's resize corner (100, 100) lies inside the top
        // image's body — the handle still wins.
        assert_eq!(mgr.hit_test(100.0, 100.0), Some(LayerHit::ResizeHandle(bottom)));
        // Plain body hit resolves topmost-first.
        assert_eq!(mgr.hit_test(120.0, 120.0), Some(LayerHit::Body(top)));
        assert_eq!(mgr.hit_test(500.0, 500.0), None);
    }

    #[test]
    fn drag_repositions_by_grab_offset() {
        let (mut mgr, id) = manager_with_one(10.0, 10.0, 50.0, 40.0);
        mgr.begin(LayerHit::Body(id), 15.0, 20.0);
        assert!(mgr.pointer_moved(115.0, 120.0));

        let img = mgr.get(id).unwrap();
        // Pointer moved +100/+100; the image follows exactly.
        assert_eq!((img.x, img.y), (110.0, 110.0));
        assert!(mgr.release());
        assert!(!mgr.release());
    }

    #[test]
    fn resize_floors_at_minimum_extent() {
        let (mut mgr, id) = manager_with_one(10.0, 10.0, 100.0, 100.0);
        mgr.begin(LayerHit::ResizeHandle(id), 110.0, 110.0);

        // Dragging the corner past the image origin can't shrink below the
        // 20-unit floor on either axis.
        assert!(mgr.pointer_moved(-500.0, -500.0));
        let img = mgr.get(id).unwrap();
        assert_eq!((img.width, img.height), (MIN_IMAGE_EXTENT, MIN_IMAGE_EXTENT));

        // Free resize: axes move independently, no aspect lock.
        assert!(mgr.pointer_moved(210.0, 60.0));
        let img = mgr.get(id).unwrap();
        assert_eq!((img.width, img.height), (200.0, 50.0));
    }

    #[test]
    fn delete_only_applies_to_active_image() {
        let (mut mgr, id) = manager_with_one(0.0, 0.0, 50.0, 50.0);
        // Nothing active: delete is a no-op.
        assert!(!mgr.delete_active());
        assert_eq!(mgr.len(), 1);

        mgr.begin(LayerHit::Body(id), 10.0, 10.0);
        assert!(mgr.delete_active());
        assert!(mgr.is_empty());
        assert!(!mgr.is_interacting());
    }

    #[test]
    fn clear_drops_images_and_interaction() {
        let (mut mgr, id) = manager_with_one(0.0, 0.0, 50.0, 50.0);
        mgr.begin(LayerHit::Body(id), 1.0, 1.0);
        mgr.clear();
        assert!(mgr.is_empty());
        assert!(!mgr.is_interacting());
        assert_eq!(mgr.active(), None);
    }
}
