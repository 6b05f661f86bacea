//! Error types. Nothing here is fatal: the worst outcomes are "playback
//! unavailable" and "file did not load", both reported to the view.

use thiserror::Error;

/// Why a play request was rejected or a session failed to start.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("playback is already active")]
    NotIdle,
    #[error("no timeline is loaded")]
    NoTimeline,
    #[error("no audio output device is available")]
    NoOutputDevice,
    /// The engine failed synchronously while starting. The underlying
    /// cause is carried as text only; callers get one generic condition.
    #[error("playback start failed: {0}")]
    StartFailed(String),
}

/// Why a MIDI file could not become a timeline.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("could not read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse MIDI data: {0}")]
    Midi(#[from] midly::Error),
}
