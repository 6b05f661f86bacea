//! Synth playback engine — rodio output plus a scheduler thread.
//!
//! The scheduler walks the timeline's note on/off events in tick order,
//! sleeping between batches, and reports each batch through the bridge's
//! [`EventSender`]. Audio is a plain sine voice per note with a short
//! attack/release envelope and a soft limiter. The session owns the
//! thread: dropping it raises the stop flag and joins, so a superseded
//! session is fully torn down before a new one starts.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rodio::{OutputStream, OutputStreamHandle, Sink, Source};

use crate::error::PlaybackError;
use crate::midi::Timeline;
use crate::note::Note;
use crate::playback::{EventSender, PlaybackEngine};

/// How often the scheduler checks the stop flag while waiting.
const STOP_POLL: Duration = Duration::from_millis(20);
/// Cap on a single sine voice, so held notes cannot ring forever.
const MAX_VOICE: Duration = Duration::from_secs(8);
/// Conservative master volume.
const MASTER_VOLUME: f32 = 0.3;

/// Convert a MIDI note number to frequency (A4 = 440 Hz).
fn midi_to_freq(pitch: u8) -> f32 {
    440.0 * 2.0_f32.powf((pitch as f32 - 69.0) / 12.0)
}

// ---------------------------------------------------------------
// Sine voice
// ---------------------------------------------------------------

/// One note's worth of enveloped sine wave.
struct SineVoice {
    freq: f32,
    gain: f32,
    sample_rate: u32,
    total_samples: usize,
    position: usize,
}

/// Samples ramped in and out over this many frames to avoid clicks.
const ENVELOPE_SAMPLES: usize = 500;

impl SineVoice {
    fn new(freq: f32, gain: f32, duration: Duration) -> Self {
        let sample_rate = 44_100;
        let total_samples =
            (duration.as_secs_f64() * sample_rate as f64) as usize;
        Self { freq, gain, sample_rate, total_samples, position: 0 }
    }

    fn envelope(&self) -> f32 {
        let remaining = self.total_samples - self.position;
        if self.position < ENVELOPE_SAMPLES {
            self.position as f32 / ENVELOPE_SAMPLES as f32
        } else if remaining < ENVELOPE_SAMPLES {
            remaining as f32 / ENVELOPE_SAMPLES as f32
        } else {
            1.0
        }
    }
}

impl Iterator for SineVoice {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.position >= self.total_samples {
            return None;
        }
        let t = self.position as f32 / self.sample_rate as f32;
        let raw = (t * self.freq * std::f32::consts::TAU).sin();
        let sample = raw * self.gain * self.envelope();
        self.position += 1;
        // Soft limiter to protect speakers
        Some(sample.tanh())
    }
}

impl Source for SineVoice {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(Duration::from_micros(
            self.total_samples as u64 * 1_000_000 / self.sample_rate as u64,
        ))
    }
}

// ---------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------

/// Everything that happens at one tick: notes ending, then notes
/// beginning (finished is always reported before started, so a retrigger
/// at the same tick ends up highlighted).
#[derive(Debug, Default)]
struct Batch {
    at: Duration,
    finished: Vec<Note>,
    started: Vec<Note>,
}

/// The whole session precomputed: batches in ascending time, with the
/// wall-clock voice length for each started note.
#[derive(Debug)]
struct Schedule {
    batches: Vec<Batch>,
    voice_lengths: Vec<Vec<Duration>>,
}

impl Schedule {
    fn build(timeline: &Timeline) -> Self {
        let mut by_tick: BTreeMap<u64, (Vec<Note>, Vec<Note>)> = BTreeMap::new();
        for note in &timeline.notes {
            by_tick.entry(note.start).or_default().1.push(note.clone());
            by_tick.entry(note.end()).or_default().0.push(note.clone());
        }

        let mut batches = Vec::with_capacity(by_tick.len());
        let mut voice_lengths = Vec::with_capacity(by_tick.len());
        for (tick, (finished, started)) in by_tick {
            let lengths = started
                .iter()
                .map(|n| timeline.ticks_to_duration(n.duration).min(MAX_VOICE))
                .collect();
            batches.push(Batch {
                at: timeline.ticks_to_duration(tick),
                finished,
                started,
            });
            voice_lengths.push(lengths);
        }

        Self { batches, voice_lengths }
    }
}

// ---------------------------------------------------------------
// Engine
// ---------------------------------------------------------------

/// The concrete playback engine: one audio output handle, one scheduler
/// thread per session.
pub struct SynthEngine {
    // The stream must stay alive for the handle to produce sound; it is
    // never touched after construction.
    _stream: Option<OutputStream>,
    handle: Option<OutputStreamHandle>,
}

impl SynthEngine {
    /// Acquire the default audio output. A machine without one yields an
    /// engine that rejects every start with `NoOutputDevice`.
    pub fn new() -> Self {
        let (stream, handle) = OutputStream::try_default().ok().unzip();
        if handle.is_none() {
            log::warn!("no audio output device available; playback disabled");
        }
        Self { _stream: stream, handle }
    }

    pub fn has_output(&self) -> bool {
        self.handle.is_some()
    }
}

impl Default for SynthEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackEngine for SynthEngine {
    type Session = EngineSession;

    fn start(
        &mut self,
        timeline: &Timeline,
        events: EventSender,
    ) -> Result<EngineSession, PlaybackError> {
        let handle = self.handle.clone().ok_or(PlaybackError::NoOutputDevice)?;

        let schedule = Schedule::build(timeline);
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        let join = thread::Builder::new()
            .name("playback-scheduler".into())
            .spawn(move || run_schedule(schedule, handle, events, thread_stop))
            .map_err(|e| PlaybackError::StartFailed(e.to_string()))?;

        Ok(EngineSession { stop, join: Some(join) })
    }
}

/// One running scheduler thread. Dropping the session stops and joins it.
pub struct EngineSession {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(join) = self.join.take() {
            // The thread sleeps in STOP_POLL slices, so this returns fast
            let _ = join.join();
        }
    }
}

fn run_schedule(
    schedule: Schedule,
    handle: OutputStreamHandle,
    events: EventSender,
    stop: Arc<AtomicBool>,
) {
    let started_at = Instant::now();

    for (batch, lengths) in schedule.batches.iter().zip(&schedule.voice_lengths) {
        // Wait for the batch's time, checking the stop flag as we go
        loop {
            if stop.load(Ordering::Relaxed) {
                return;
            }
            let elapsed = started_at.elapsed();
            if elapsed >= batch.at {
                break;
            }
            thread::sleep((batch.at - elapsed).min(STOP_POLL));
        }

        if !batch.finished.is_empty() {
            events.notes_finished(&batch.finished);
        }
        if !batch.started.is_empty() {
            events.notes_started(&batch.started);
            for (note, length) in batch.started.iter().zip(lengths) {
                play_voice(&handle, note, *length);
            }
        }
    }

    events.completed();
}

/// Fire-and-forget one sine voice on the output.
fn play_voice(handle: &OutputStreamHandle, note: &Note, length: Duration) {
    let gain = note.velocity as f32 / 127.0;
    let voice = SineVoice::new(midi_to_freq(note.pitch), gain, length);
    match Sink::try_new(handle) {
        Ok(sink) => {
            sink.set_volume(MASTER_VOLUME);
            sink.append(voice);
            sink.detach();
        }
        Err(err) => log::debug!("could not open sink for note: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeline(notes: Vec<Note>) -> Timeline {
        Timeline { notes, ticks_per_beat: 480, tempo_us_per_beat: 500_000 }
    }

    #[test]
    fn test_midi_to_freq_reference_points() {
        assert!((midi_to_freq(69) - 440.0).abs() < 0.001); // A4
        assert!((midi_to_freq(57) - 220.0).abs() < 0.001); // A3
        assert!((midi_to_freq(81) - 880.0).abs() < 0.001); // A5
    }

    #[test]
    fn test_schedule_batches_in_time_order() {
        let schedule = Schedule::build(&timeline(vec![
            Note::new(64, 480, 480, 100),
            Note::new(60, 0, 480, 100),
        ]));
        // Ticks 0, 480, 960 → three batches regardless of input order
        assert_eq!(schedule.batches.len(), 3);
        let times: Vec<_> = schedule.batches.iter().map(|b| b.at).collect();
        let mut sorted = times.clone();
        sorted.sort();
        assert_eq!(times, sorted);
    }

    #[test]
    fn test_schedule_separates_offs_from_ons_at_same_tick() {
        // First note ends exactly where the second begins
        let schedule = Schedule::build(&timeline(vec![
            Note::new(60, 0, 480, 100),
            Note::new(60, 480, 480, 100),
        ]));
        let middle = &schedule.batches[1];
        assert_eq!(middle.at, Duration::from_millis(500));
        assert_eq!(middle.finished.len(), 1);
        assert_eq!(middle.started.len(), 1);
        assert_eq!(middle.finished[0].start, 0);
        assert_eq!(middle.started[0].start, 480);
    }

    #[test]
    fn test_voice_lengths_follow_tempo_and_cap() {
        let schedule = Schedule::build(&timeline(vec![
            Note::new(60, 0, 480, 100),
            Note::new(62, 0, 480_000, 100), // hours at this tempo
        ]));
        let lengths = &schedule.voice_lengths[0];
        assert_eq!(lengths[0], Duration::from_millis(500));
        assert_eq!(lengths[1], MAX_VOICE);
    }

    #[test]
    fn test_sine_voice_sample_count_and_range() {
        let mut voice = SineVoice::new(440.0, 1.0, Duration::from_millis(100));
        let expected = voice.total_samples;
        let mut count = 0;
        let mut peak: f32 = 0.0;
        while let Some(sample) = voice.next() {
            count += 1;
            peak = peak.max(sample.abs());
        }
        assert_eq!(count, expected);
        assert!(peak <= 1.0);
        assert!(peak > 0.1); // actually produced signal
    }

    #[test]
    fn test_sine_voice_starts_and_ends_quiet() {
        let samples: Vec<f32> =
            SineVoice::new(440.0, 1.0, Duration::from_millis(100)).collect();
        assert_eq!(samples[0], 0.0); // attack starts from silence
        assert!(samples[samples.len() - 1].abs() < 0.01);
    }
}
