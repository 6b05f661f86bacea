//! Note model — one musical event, immutable once extracted.

use serde::{Deserialize, Serialize};

/// One note from the loaded MIDI timeline.
///
/// Times are in integer MIDI ticks; the tick→seconds conversion lives with
/// the playback engine, and the tick→pixels conversion with the scene.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// MIDI note number (0-127, middle C = 60)
    pub pitch: u8,
    /// Start time in ticks
    pub start: u64,
    /// Duration in ticks
    pub duration: u64,
    /// Velocity (0-127) — carried through for the synth, unused by layout
    pub velocity: u8,
}

impl Note {
    pub fn new(pitch: u8, start: u64, duration: u64, velocity: u8) -> Self {
        Self { pitch, start, duration, velocity }
    }

    /// Identity used to locate this note's rectangle in a scene.
    pub fn key(&self) -> NoteKey {
        NoteKey { pitch: self.pitch, start: self.start }
    }

    /// Tick at which the note ends.
    pub fn end(&self) -> u64 {
        self.start + self.duration
    }
}

/// Identity tuple for the note→rectangle index.
///
/// Assumed unique within one timeline but not enforced: two notes sharing
/// pitch and start collide, and the scene keeps the first one (see
/// [`crate::scene::Scene::build`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NoteKey {
    pub pitch: u8,
    pub start: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_ignores_duration_and_velocity() {
        let a = Note::new(60, 480, 240, 100);
        let b = Note::new(60, 480, 960, 1);
        assert_eq!(a.key(), b.key());

        let c = Note::new(61, 480, 240, 100);
        assert_ne!(a.key(), c.key());
    }

    #[test]
    fn test_end_tick() {
        assert_eq!(Note::new(60, 480, 240, 100).end(), 720);
        assert_eq!(Note::new(60, 0, 0, 100).end(), 0);
    }
}
