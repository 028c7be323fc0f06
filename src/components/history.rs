use std::collections::VecDeque;

use image::{Rgba, RgbaImage};

use crate::io::{decode_png, encode_png};

/// Default number of undo snapshots kept before the oldest is evicted.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Linear undo stack of full-buffer snapshots.
///
/// Entries are opaque PNG-encoded bitmaps, pushed before each destructive
/// edit.  The stack is append-only while drawing; `undo` pops the newest
/// entry and restores the one below it, never mutating older entries.
/// There is no redo.  The stack is a bounded ring: pushing at capacity
/// silently evicts the oldest snapshot.
pub struct HistoryStack {
    entries: VecDeque<Vec<u8>>,
    capacity: usize,
}

impl Default for HistoryStack {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl HistoryStack {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Serialize the buffer and append it.  At capacity the oldest snapshot
    /// is evicted first.
    pub fn push(&mut self, buffer: &RgbaImage) {
        let encoded = match encode_png(buffer) {
            Ok(bytes) => bytes,
            Err(e) => {
                crate::log_err!("history: failed to encode snapshot: {}", e);
                return;
            }
        };
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(encoded);
    }

    /// Remove the newest snapshot and restore the one below it into
    /// `buffer`.  When nothing remains the buffer blanks to white.
    /// Undo on an empty stack also blanks to white.
    pub fn undo(&mut self, buffer: &mut RgbaImage) {
        self.entries.pop_back();
        match self.entries.back() {
            Some(bytes) => match decode_png(bytes) {
                Ok(snapshot) => restore_into(buffer, &snapshot),
                Err(e) => {
                    crate::log_err!("history: failed to decode snapshot: {}", e);
                    blank(buffer);
                }
            },
            None => blank(buffer),
        }
    }
}

fn blank(buffer: &mut RgbaImage) {
    for px in buffer.pixels_mut() {
        *px = WHITE;
    }
}

/// Write a decoded snapshot over the live buffer.  Snapshots are taken at
/// buffer resolution; a dimension change clears history, so a size mismatch
/// only happens on a corrupt entry and falls back to copying the overlap.
fn restore_into(buffer: &mut RgbaImage, snapshot: &RgbaImage) {
    if buffer.dimensions() == snapshot.dimensions() {
        buffer.copy_from_slice(snapshot.as_raw());
        return;
    }
    blank(buffer);
    let w = buffer.width().min(snapshot.width());
    let h = buffer.height().min(snapshot.height());
    for y in 0..h {
        for x in 0..w {
            buffer.put_pixel(x, y, *snapshot.get_pixel(x, y));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(level: u8) -> RgbaImage {
        RgbaImage::from_pixel(8, 8, Rgba([level, level, level, 255]))
    }

    #[test]
    fn undo_restores_previous_snapshot() {
        let mut history = HistoryStack::default();
        for level in [10u8, 20, 30] {
            history.push(&solid(level));
        }
        assert_eq!(history.len(), 3);

        let mut buffer = solid(99);
        history.undo(&mut buffer);
        // Three pushes, one undo: state 2 of 3 comes back.
        assert_eq!(buffer.get_pixel(0, 0).0, [20, 20, 20, 255]);
        assert_eq!(history.len(), 2);

        history.undo(&mut buffer);
        assert_eq!(buffer.get_pixel(0, 0).0, [10, 10, 10, 255]);
    }

    #[test]
    fn undo_past_bottom_blanks_to_white() {
        let mut history = HistoryStack::default();
        history.push(&solid(10));

        let mut buffer = solid(10);
        history.undo(&mut buffer);
        assert_eq!(buffer.get_pixel(3, 3).0, [255, 255, 255, 255]);
        assert!(history.is_empty());

        // Undo with nothing stacked still leaves a white buffer.
        let mut buffer = solid(10);
        history.undo(&mut buffer);
        assert_eq!(buffer.get_pixel(3, 3).0, [255, 255, 255, 255]);
    }

    #[test]
    fn capacity_evicts_oldest() {
        let mut history = HistoryStack::with_capacity(2);
        history.push(&solid(10));
        history.push(&solid(20));
        history.push(&solid(30));
        assert_eq!(history.len(), 2);

        let mut buffer = solid(99);
        history.undo(&mut buffer);
        // Snapshot 10 was evicted; 20 is the restored state.
        assert_eq!(buffer.get_pixel(0, 0).0, [20, 20, 20, 255]);
        history.undo(&mut buffer);
        // Past the bottom of the bounded ring: white.
        assert_eq!(buffer.get_pixel(0, 0).0, [255, 255, 255, 255]);
    }
}
