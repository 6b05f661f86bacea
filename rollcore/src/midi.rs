//! MIDI file loading — bytes in, an ordered note timeline out.
//!
//! Note on/off pairs are matched per (channel, key); a NoteOn with
//! velocity 0 counts as a NoteOff, per the MIDI convention. Times stay in
//! integer ticks; the initial tempo and the tick resolution travel with
//! the timeline so the engine can convert to wall-clock time.

use std::path::Path;
use std::time::Duration;

use std::collections::HashMap;

use crate::error::LoadError;
use crate::note::Note;

/// Microseconds per beat at the 120 BPM default.
const DEFAULT_TEMPO_US: u32 = 500_000;
/// Tick resolution assumed when the file uses SMPTE timing.
const DEFAULT_TICKS_PER_BEAT: u16 = 480;

/// A loaded MIDI file, reduced to what rendering and playback need.
#[derive(Clone, Debug, Default)]
pub struct Timeline {
    /// Notes in file order (track by track, ascending time within a track).
    pub notes: Vec<Note>,
    /// Ticks per quarter note.
    pub ticks_per_beat: u16,
    /// Initial tempo in microseconds per quarter note.
    pub tempo_us_per_beat: u32,
}

impl Timeline {
    /// Read and parse a MIDI file.
    pub fn load(path: &Path) -> Result<Timeline, LoadError> {
        let data = std::fs::read(path)?;
        let timeline = Self::parse(&data)?;
        log::info!(
            "loaded {:?}: {} notes, {} ticks/beat",
            path.file_name().unwrap_or_default(),
            timeline.notes.len(),
            timeline.ticks_per_beat
        );
        Ok(timeline)
    }

    /// Parse MIDI bytes into a timeline.
    pub fn parse(data: &[u8]) -> Result<Timeline, LoadError> {
        let smf = midly::Smf::parse(data)?;

        let ticks_per_beat = match smf.header.timing {
            midly::Timing::Metrical(tpb) => tpb.as_int(),
            _ => DEFAULT_TICKS_PER_BEAT,
        };

        let mut timeline = Timeline {
            notes: Vec::new(),
            ticks_per_beat,
            tempo_us_per_beat: DEFAULT_TEMPO_US,
        };

        for track in &smf.tracks {
            let mut time: u64 = 0;
            // (channel, key) → (start tick, velocity) for sounding notes
            let mut pending: HashMap<(u8, u8), (u64, u8)> = HashMap::new();

            for event in track {
                time += u64::from(event.delta.as_int());

                match event.kind {
                    midly::TrackEventKind::Midi { channel, message } => {
                        let ch = channel.as_int();
                        match message {
                            midly::MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                                pending.insert((ch, key.as_int()), (time, vel.as_int()));
                            }
                            // NoteOn with velocity 0 is a NoteOff
                            midly::MidiMessage::NoteOn { key, .. }
                            | midly::MidiMessage::NoteOff { key, .. } => {
                                if let Some((start, velocity)) =
                                    pending.remove(&(ch, key.as_int()))
                                {
                                    timeline.notes.push(Note {
                                        pitch: key.as_int(),
                                        start,
                                        duration: time.saturating_sub(start),
                                        velocity,
                                    });
                                }
                            }
                            _ => {}
                        }
                    }
                    midly::TrackEventKind::Meta(midly::MetaMessage::Tempo(us)) => {
                        if time == 0 {
                            timeline.tempo_us_per_beat = us.as_int();
                        }
                        // Mid-file tempo changes are rare in the files this
                        // tool targets and are ignored for scheduling.
                    }
                    _ => {}
                }
            }
        }

        Ok(timeline)
    }

    /// Convert a tick span to wall-clock time at the timeline's tempo.
    pub fn ticks_to_duration(&self, ticks: u64) -> Duration {
        let us = ticks as u128 * self.tempo_us_per_beat as u128
            / self.ticks_per_beat.max(1) as u128;
        Duration::from_micros(us as u64)
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use midly::num::{u15, u24, u28, u4, u7};
    use midly::{
        Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind,
    };

    /// Build a single-track SMF from (delta, kind) pairs.
    fn smf_bytes(events: Vec<(u32, TrackEventKind<'static>)>) -> Vec<u8> {
        let mut track: Vec<TrackEvent> = events
            .into_iter()
            .map(|(delta, kind)| TrackEvent { delta: u28::new(delta), kind })
            .collect();
        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });
        let smf = Smf {
            header: Header {
                format: Format::SingleTrack,
                timing: Timing::Metrical(u15::new(480)),
            },
            tracks: vec![track],
        };
        let mut buffer = Vec::new();
        smf.write(&mut buffer).unwrap();
        buffer
    }

    fn note_on(key: u8, vel: u8) -> TrackEventKind<'static> {
        TrackEventKind::Midi {
            channel: u4::new(0),
            message: MidiMessage::NoteOn { key: u7::new(key), vel: u7::new(vel) },
        }
    }

    fn note_off(key: u8) -> TrackEventKind<'static> {
        TrackEventKind::Midi {
            channel: u4::new(0),
            message: MidiMessage::NoteOff { key: u7::new(key), vel: u7::new(0) },
        }
    }

    #[test]
    fn test_parse_pairs_on_and_off() {
        let data = smf_bytes(vec![
            (0, note_on(60, 100)),
            (480, note_off(60)),
            (0, note_on(64, 80)),
            (240, note_off(64)),
        ]);
        let timeline = Timeline::parse(&data).unwrap();

        assert_eq!(timeline.ticks_per_beat, 480);
        assert_eq!(timeline.notes.len(), 2);
        assert_eq!(timeline.notes[0], Note::new(60, 0, 480, 100));
        assert_eq!(timeline.notes[1], Note::new(64, 480, 240, 80));
    }

    #[test]
    fn test_velocity_zero_note_on_ends_note() {
        let data = smf_bytes(vec![(0, note_on(60, 100)), (120, note_on(60, 0))]);
        let timeline = Timeline::parse(&data).unwrap();
        assert_eq!(timeline.notes, vec![Note::new(60, 0, 120, 100)]);
    }

    #[test]
    fn test_unterminated_note_is_dropped() {
        let data = smf_bytes(vec![(0, note_on(60, 100))]);
        let timeline = Timeline::parse(&data).unwrap();
        assert!(timeline.is_empty());
    }

    #[test]
    fn test_initial_tempo_and_default() {
        let data = smf_bytes(vec![
            (0, TrackEventKind::Meta(MetaMessage::Tempo(u24::new(600_000)))),
            (0, note_on(60, 100)),
            (480, note_off(60)),
        ]);
        let timeline = Timeline::parse(&data).unwrap();
        assert_eq!(timeline.tempo_us_per_beat, 600_000);

        let plain = Timeline::parse(&smf_bytes(vec![])).unwrap();
        assert_eq!(plain.tempo_us_per_beat, DEFAULT_TEMPO_US);
    }

    #[test]
    fn test_ticks_to_duration() {
        let timeline = Timeline {
            notes: Vec::new(),
            ticks_per_beat: 480,
            tempo_us_per_beat: 500_000,
        };
        // One beat at 120 BPM is half a second
        assert_eq!(timeline.ticks_to_duration(480), Duration::from_millis(500));
        assert_eq!(timeline.ticks_to_duration(0), Duration::ZERO);
    }

    #[test]
    fn test_garbage_bytes_error() {
        assert!(matches!(
            Timeline::parse(b"not a midi file"),
            Err(LoadError::Midi(_))
        ));
    }
}
