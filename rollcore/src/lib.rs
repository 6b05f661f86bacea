//! rollcore — piano-roll render state and playback synchronization
//!
//! The pieces, leaves first:
//!
//! - [`note`] — the immutable note value and its identity key.
//! - [`color`] — pure color resolution (presets + hex codes) with
//!   per-role fallbacks.
//! - [`scene`] — builds a positioned rectangle per note, keeps the
//!   key→rectangle index, and owns the only two mutation entry points.
//! - [`playback`] — the bridge that serializes engine-thread note events
//!   onto the thread that owns the scene.
//! - [`engine`] — the concrete rodio-backed playback engine.
//! - [`midi`] — MIDI file loading into a [`midi::Timeline`].
//!
//! Exactly one thread (the UI thread in `rollview`) may touch a
//! [`scene::Scene`]; everything the engine thread reports travels through
//! [`playback::PlaybackBridge::drain`] before it reaches the scene.

pub mod color;
pub mod engine;
pub mod error;
pub mod midi;
pub mod note;
pub mod playback;
pub mod scene;

pub use color::{ColorMode, ColorRole, ColorSettings};
pub use error::{LoadError, PlaybackError};
pub use note::{Note, NoteKey};
pub use playback::{PlaybackBridge, PlaybackState};
pub use scene::Scene;
