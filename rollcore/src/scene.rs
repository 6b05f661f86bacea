//! Scene — positioned rectangles for a note timeline, plus the
//! key→rectangle index and the only two color-mutation entry points.
//!
//! A scene is rebuilt wholesale whenever a file is loaded or a base color
//! changes (loading is rare next to playback events, so no incremental
//! diffing), and mutated in place — fill color only — while playback runs.
//! Exactly one thread may hold a `&mut Scene`; in `rollview` that is the
//! egui thread.

use std::collections::HashMap;

use egui::{Color32, Pos2, Rect, Vec2};

use crate::note::{Note, NoteKey};

// ---------------------------------------------------------------
// Layout constants
// ---------------------------------------------------------------

/// Height of one pitch row, and of every note rectangle.
pub const NOTE_HEIGHT: f32 = 10.0;
/// Horizontal pixels per tick.
pub const TIME_SCALE: f32 = 0.1;
/// Blank margin left of tick 0.
pub const LEFT_PADDING: f32 = 50.0;
/// Blank margin after the last note.
pub const RIGHT_PADDING: f32 = 100.0;
/// Full pitch range is always laid out, whether or not it is used.
pub const TOTAL_HEIGHT: f32 = 128.0 * NOTE_HEIGHT;

/// One note's on-screen rectangle. Geometry is fixed at build time;
/// only `fill` changes afterwards.
#[derive(Clone, Debug)]
pub struct NoteRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub fill: Color32,
}

impl NoteRect {
    fn from_note(note: &Note, fill: Color32) -> Self {
        let width = (note.duration as f32 * TIME_SCALE).max(1.0);
        Self {
            x: note.start as f32 * TIME_SCALE + LEFT_PADDING,
            y: (127 - note.pitch.min(127)) as f32 * NOTE_HEIGHT,
            width,
            height: NOTE_HEIGHT,
            fill,
        }
    }

    /// The rectangle in egui terms, offset by the view's scroll origin.
    pub fn rect_at(&self, origin: Pos2) -> Rect {
        Rect::from_min_size(
            Pos2::new(origin.x + self.x, origin.y + self.y),
            Vec2::new(self.width, self.height),
        )
    }
}

/// The render state: every rectangle, the identity index, the background
/// color, and the canvas extent the view should allocate.
#[derive(Debug, Default)]
pub struct Scene {
    rects: Vec<NoteRect>,
    index: HashMap<NoteKey, usize>,
    pub background: Color32,
    pub width: f32,
    pub height: f32,
}

impl Scene {
    /// Build a scene from scratch. Replaces any previous scene entirely —
    /// the caller overwrites its old value with the returned one.
    ///
    /// Rectangles are placed from absolute time and pitch, so input order
    /// has no effect on the result. A duplicate `(pitch, start)` key keeps
    /// the first note and skips the rest (warned, never fatal). An empty
    /// timeline yields an empty scene with zero extent.
    pub fn build(notes: &[Note], background: Color32, normal_note: Color32) -> Self {
        let mut scene = Scene {
            rects: Vec::with_capacity(notes.len()),
            index: HashMap::with_capacity(notes.len()),
            background,
            width: 0.0,
            height: 0.0,
        };

        if notes.is_empty() {
            log::debug!("scene build: no notes to lay out");
            return scene;
        }

        let mut max_end: u64 = 0;
        for note in notes {
            let key = note.key();
            if scene.index.contains_key(&key) {
                log::warn!(
                    "duplicate note key (pitch={}, start={}): keeping the first, \
                     skipping duration={}",
                    key.pitch,
                    key.start,
                    note.duration
                );
                continue;
            }
            scene.index.insert(key, scene.rects.len());
            scene.rects.push(NoteRect::from_note(note, normal_note));
            max_end = max_end.max(note.end());
        }

        scene.width = max_end as f32 * TIME_SCALE + LEFT_PADDING + RIGHT_PADDING;
        scene.height = TOTAL_HEIGHT;
        scene
    }

    /// Change one note's fill color in place.
    ///
    /// An unknown key is a no-op: playback can report notes the last build
    /// never indexed (stale session, or a key lost to a build-time
    /// collision). Diagnostic only, never an error.
    pub fn set_note_color(&mut self, key: NoteKey, color: Color32) {
        match self.index.get(&key) {
            Some(&i) => self.rects[i].fill = color,
            None => log::debug!(
                "no rectangle for note (pitch={}, start={})",
                key.pitch,
                key.start
            ),
        }
    }

    /// Return every rectangle to `color` — the rest state after playback
    /// stops or completes.
    pub fn reset_all_note_colors(&mut self, color: Color32) {
        for rect in &mut self.rects {
            rect.fill = color;
        }
    }

    /// Canvas extent the view should allocate for scrolling.
    pub fn extent(&self) -> Vec2 {
        Vec2::new(self.width, self.height)
    }

    pub fn rects(&self) -> &[NoteRect] {
        &self.rects
    }

    pub fn note_count(&self) -> usize {
        self.rects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    #[cfg(test)]
    fn fill_of(&self, key: NoteKey) -> Option<Color32> {
        self.index.get(&key).map(|&i| self.rects[i].fill)
    }
}
