//! Playback bridge — serializes engine-thread note events onto the
//! thread that owns the scene.
//!
//! The engine runs on its own thread and reports note starts, note ends,
//! and completion whenever it likes. Nothing it reports touches the scene
//! directly: every notification is tagged with its session id and queued
//! on an mpsc channel, and the visual-owner thread applies the queue in
//! enqueue order via [`PlaybackBridge::drain`]. Events from a superseded
//! session are discarded, so a stop followed by an immediate restart can
//! never let a stale "started" re-highlight a note.

use std::sync::mpsc::{channel, Receiver, Sender};

use crate::color::ColorSettings;
use crate::error::PlaybackError;
use crate::midi::Timeline;
use crate::note::Note;
use crate::scene::Scene;

/// Identifies one run of the engine, from start to stop or completion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionId(u64);

/// Where the bridge currently is. `Starting`, `Stopping`, and `Completed`
/// are transient: they only exist inside `play`, `stop`, and `drain`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    /// No active playback.
    Idle,
    /// A play request was accepted; the engine is being attached.
    Starting,
    /// The engine holds a session and is delivering note events.
    Running,
    /// The user asked to stop; the session is being torn down.
    Stopping,
    /// The engine reported natural completion.
    Completed,
}

#[derive(Debug)]
enum BridgeEventKind {
    NotesStarted(Vec<Note>),
    NotesFinished(Vec<Note>),
    Completed,
}

#[derive(Debug)]
struct BridgeEvent {
    session: SessionId,
    kind: BridgeEventKind,
}

/// The engine's half of the channel, pre-tagged with its session id.
///
/// Safe to call from any thread; sends after the bridge has been dropped
/// are silently discarded.
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<BridgeEvent>,
    session: SessionId,
}

impl EventSender {
    pub fn notes_started(&self, notes: &[Note]) {
        self.send(BridgeEventKind::NotesStarted(notes.to_vec()));
    }

    pub fn notes_finished(&self, notes: &[Note]) {
        self.send(BridgeEventKind::NotesFinished(notes.to_vec()));
    }

    pub fn completed(&self) {
        self.send(BridgeEventKind::Completed);
    }

    fn send(&self, kind: BridgeEventKind) {
        // The receiver only disappears when the bridge itself is dropped.
        let _ = self.tx.send(BridgeEvent { session: self.session, kind });
    }
}

/// The engine boundary. `start` must fail synchronously or not at all;
/// dropping the returned session releases every resource the session
/// acquired (thread, device handle) before the drop returns.
pub trait PlaybackEngine {
    type Session;

    fn start(
        &mut self,
        timeline: &Timeline,
        events: EventSender,
    ) -> Result<Self::Session, PlaybackError>;
}

/// Owns the engine, the session state machine, and the event queue.
///
/// `play` and `stop` are driven by the view; `drain` must be called from
/// the visual-owner thread, which in `rollview` means once per frame.
pub struct PlaybackBridge<E: PlaybackEngine> {
    engine: E,
    state: PlaybackState,
    session: Option<(SessionId, E::Session)>,
    tx: Sender<BridgeEvent>,
    rx: Receiver<BridgeEvent>,
    next_session: u64,
}

impl<E: PlaybackEngine> PlaybackBridge<E> {
    pub fn new(engine: E) -> Self {
        let (tx, rx) = channel();
        Self {
            engine,
            state: PlaybackState::Idle,
            session: None,
            tx,
            rx,
            next_session: 0,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Running
    }

    /// Start a playback session for `timeline`.
    ///
    /// Rejected synchronously — with no state change beyond returning to
    /// `Idle` — when playback is already active, when the timeline is
    /// empty, or when the engine cannot start. Any previous session is
    /// fully released before the new one is acquired.
    pub fn play(&mut self, timeline: &Timeline) -> Result<(), PlaybackError> {
        if self.state != PlaybackState::Idle {
            return Err(PlaybackError::NotIdle);
        }
        if timeline.is_empty() {
            return Err(PlaybackError::NoTimeline);
        }

        self.state = PlaybackState::Starting;
        // Tear down any leftover session before acquiring a new one
        self.session = None;

        let id = SessionId(self.next_session);
        self.next_session += 1;
        let events = EventSender { tx: self.tx.clone(), session: id };

        match self.engine.start(timeline, events) {
            Ok(session) => {
                self.session = Some((id, session));
                self.state = PlaybackState::Running;
                log::info!("playback session {:?} started", id);
                Ok(())
            }
            Err(err) => {
                // Whatever the engine partially acquired was released when
                // start returned; nothing of the session survives.
                self.state = PlaybackState::Idle;
                log::warn!("playback start failed: {err}");
                Err(err)
            }
        }
    }

    /// Stop the active session.
    ///
    /// Colors are reset immediately rather than waiting for the engine's
    /// own finished notifications; anything the dying session still has
    /// queued is discarded by the next `drain`.
    pub fn stop(&mut self, scene: &mut Scene, settings: &ColorSettings) {
        if self.state != PlaybackState::Running {
            return;
        }
        self.state = PlaybackState::Stopping;
        // Dropping the session invalidates its id; late events no longer match
        self.session = None;
        scene.reset_all_note_colors(settings.normal_note);
        self.state = PlaybackState::Idle;
        log::info!("playback stopped");
    }

    /// Apply queued engine events to the scene, strictly in enqueue order.
    ///
    /// Returns `true` when the session completed naturally during this
    /// drain, so the view can re-enable its play control.
    pub fn drain(&mut self, scene: &mut Scene, settings: &ColorSettings) -> bool {
        let mut completed = false;

        while let Ok(event) = self.rx.try_recv() {
            let current = self.session.as_ref().map(|(id, _)| *id);
            if current != Some(event.session) {
                log::debug!("discarding event from superseded session {:?}", event.session);
                continue;
            }

            match event.kind {
                BridgeEventKind::NotesStarted(notes) => {
                    for note in &notes {
                        scene.set_note_color(note.key(), settings.playing_note);
                    }
                }
                BridgeEventKind::NotesFinished(notes) => {
                    for note in &notes {
                        scene.set_note_color(note.key(), settings.normal_note);
                    }
                }
                BridgeEventKind::Completed => {
                    self.state = PlaybackState::Completed;
                    self.session = None;
                    scene.reset_all_note_colors(settings.normal_note);
                    self.state = PlaybackState::Idle;
                    completed = true;
                    log::info!("playback completed");
                }
            }
        }

        completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Engine double: hands its `EventSender` back to the test and counts
    /// session drops.
    struct FakeEngine {
        fail_start: bool,
        senders: Rc<RefCell<Vec<EventSender>>>,
        released: Rc<RefCell<u32>>,
    }

    struct FakeSession {
        released: Rc<RefCell<u32>>,
    }

    impl Drop for FakeSession {
        fn drop(&mut self) {
            *self.released.borrow_mut() += 1;
        }
    }

    impl PlaybackEngine for FakeEngine {
        type Session = FakeSession;

        fn start(
            &mut self,
            _timeline: &Timeline,
            events: EventSender,
        ) -> Result<FakeSession, PlaybackError> {
            if self.fail_start {
                return Err(PlaybackError::StartFailed("device busy".into()));
            }
            self.senders.borrow_mut().push(events);
            Ok(FakeSession { released: Rc::clone(&self.released) })
        }
    }

    struct Fixture {
        bridge: PlaybackBridge<FakeEngine>,
        senders: Rc<RefCell<Vec<EventSender>>>,
        released: Rc<RefCell<u32>>,
        timeline: Timeline,
        scene: Scene,
        settings: ColorSettings,
    }

    fn fixture() -> Fixture {
        let senders = Rc::new(RefCell::new(Vec::new()));
        let released = Rc::new(RefCell::new(0));
        let bridge = PlaybackBridge::new(FakeEngine {
            fail_start: false,
            senders: Rc::clone(&senders),
            released: Rc::clone(&released),
        });
        let timeline = Timeline {
            notes: vec![
                Note::new(60, 0, 480, 100),
                Note::new(64, 480, 480, 100),
            ],
            ticks_per_beat: 480,
            tempo_us_per_beat: 500_000,
        };
        let settings = ColorSettings::default();
        let scene = Scene::build(&timeline.notes, settings.background, settings.normal_note);
        Fixture { bridge, senders, released, timeline, scene, settings }
    }

    fn fill(scene: &Scene, nth: usize) -> egui::Color32 {
        scene.rects()[nth].fill
    }

    #[test]
    fn test_play_requires_notes() {
        let mut f = fixture();
        let empty = Timeline::default();
        assert!(matches!(f.bridge.play(&empty), Err(PlaybackError::NoTimeline)));
        assert_eq!(f.bridge.state(), PlaybackState::Idle);
    }

    #[test]
    fn test_play_rejected_while_running() {
        let mut f = fixture();
        f.bridge.play(&f.timeline).unwrap();
        assert!(matches!(f.bridge.play(&f.timeline), Err(PlaybackError::NotIdle)));
        assert_eq!(f.bridge.state(), PlaybackState::Running);
    }

    #[test]
    fn test_start_failure_returns_to_idle() {
        let f = fixture();
        let mut bridge = PlaybackBridge::new(FakeEngine {
            fail_start: true,
            senders: Rc::clone(&f.senders),
            released: Rc::clone(&f.released),
        });

        assert!(matches!(
            bridge.play(&f.timeline),
            Err(PlaybackError::StartFailed(_))
        ));
        assert_eq!(bridge.state(), PlaybackState::Idle);
        assert!(f.senders.borrow().is_empty());
    }

    #[test]
    fn test_started_and_finished_recolor_notes() {
        let mut f = fixture();
        f.bridge.play(&f.timeline).unwrap();
        let sender = f.senders.borrow()[0].clone();

        sender.notes_started(&f.timeline.notes[0..1]);
        f.bridge.drain(&mut f.scene, &f.settings);
        assert_eq!(fill(&f.scene, 0), f.settings.playing_note);
        assert_eq!(fill(&f.scene, 1), f.settings.normal_note);

        sender.notes_finished(&f.timeline.notes[0..1]);
        f.bridge.drain(&mut f.scene, &f.settings);
        assert_eq!(fill(&f.scene, 0), f.settings.normal_note);
    }

    #[test]
    fn test_events_applied_in_enqueue_order() {
        let mut f = fixture();
        f.bridge.play(&f.timeline).unwrap();
        let sender = f.senders.borrow()[0].clone();

        // finished queued before a later started must not win
        sender.notes_finished(&f.timeline.notes[0..1]);
        sender.notes_started(&f.timeline.notes[0..1]);
        f.bridge.drain(&mut f.scene, &f.settings);
        assert_eq!(fill(&f.scene, 0), f.settings.playing_note);
    }

    #[test]
    fn test_completion_resets_scene_and_state() {
        let mut f = fixture();
        f.bridge.play(&f.timeline).unwrap();
        let sender = f.senders.borrow()[0].clone();

        sender.notes_started(&f.timeline.notes);
        sender.completed();
        let completed = f.bridge.drain(&mut f.scene, &f.settings);

        assert!(completed);
        assert_eq!(f.bridge.state(), PlaybackState::Idle);
        assert_eq!(*f.released.borrow(), 1);
        for rect in f.scene.rects() {
            assert_eq!(rect.fill, f.settings.normal_note);
        }
    }

    #[test]
    fn test_stop_resets_colors_and_releases_session() {
        let mut f = fixture();
        f.bridge.play(&f.timeline).unwrap();
        let sender = f.senders.borrow()[0].clone();
        sender.notes_started(&f.timeline.notes[0..1]);
        f.bridge.drain(&mut f.scene, &f.settings);

        f.bridge.stop(&mut f.scene, &f.settings);
        assert_eq!(f.bridge.state(), PlaybackState::Idle);
        assert_eq!(*f.released.borrow(), 1);
        assert_eq!(fill(&f.scene, 0), f.settings.normal_note);
    }

    #[test]
    fn test_stale_session_events_are_discarded() {
        let mut f = fixture();

        f.bridge.play(&f.timeline).unwrap();
        let first = f.senders.borrow()[0].clone();
        f.bridge.stop(&mut f.scene, &f.settings);

        // Restart immediately; the old engine thread is still flushing
        f.bridge.play(&f.timeline).unwrap();
        let second = f.senders.borrow()[1].clone();

        first.notes_started(&f.timeline.notes[0..1]); // late, superseded
        second.notes_started(&f.timeline.notes[1..2]);
        f.bridge.drain(&mut f.scene, &f.settings);

        assert_eq!(fill(&f.scene, 0), f.settings.normal_note);
        assert_eq!(fill(&f.scene, 1), f.settings.playing_note);
    }

    #[test]
    fn test_stale_completion_does_not_end_new_session() {
        let mut f = fixture();

        f.bridge.play(&f.timeline).unwrap();
        let first = f.senders.borrow()[0].clone();
        f.bridge.stop(&mut f.scene, &f.settings);
        f.bridge.play(&f.timeline).unwrap();

        first.completed();
        let completed = f.bridge.drain(&mut f.scene, &f.settings);
        assert!(!completed);
        assert_eq!(f.bridge.state(), PlaybackState::Running);
    }

    #[test]
    fn test_event_for_unrendered_note_is_harmless() {
        let mut f = fixture();
        f.bridge.play(&f.timeline).unwrap();
        let sender = f.senders.borrow()[0].clone();

        // A note the last build never indexed
        sender.notes_started(&[Note::new(61, 7, 10, 100)]);
        f.bridge.drain(&mut f.scene, &f.settings);
        assert_eq!(fill(&f.scene, 0), f.settings.normal_note);
        assert_eq!(fill(&f.scene, 1), f.settings.normal_note);
    }
}
