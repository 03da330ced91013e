//! Narration controller state machine.
//!
//! A dedicated worker thread owns the `Idle / Generating / Playing` state and
//! consumes [`ControllerCommand`]s from a single channel, so every transition
//! is applied in the order its triggering event was observed. Generation and
//! playback run on session threads that report back through the same channel;
//! completion and error are ordinary commands, not ad hoc callbacks.
//!
//! At most one audio stream is active at any time: the controller owns the
//! single sink slot and stops it synchronously before starting a new stream.

use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use crossbeam_channel::{Receiver, Sender, unbounded};

use narration_types::{NarrationEndReason, NarrationStatus};

use crate::cache::{NarrationClip, PlaybackCache};
use crate::decode::{self, DecodeTarget};
use crate::error::NarrationError;
use crate::status::NarrationStatusState;

/// Commands accepted by the controller thread.
///
/// `Narrate`/`Stop`/`Quit` come from the hosting layer; the rest are emitted
/// by generation and playback session threads and carry the session counter
/// they were started under, so results from abandoned work are recognized.
#[derive(Debug)]
pub enum ControllerCommand {
    Narrate {
        id: String,
        text: String,
    },
    Stop,
    Quit,
    GenerationDone {
        session: u64,
        id: String,
        clip: Arc<NarrationClip>,
    },
    GenerationFailed {
        session: u64,
        id: String,
        error: String,
    },
    PlaybackFinished {
        session: u64,
    },
    PlaybackFailed {
        session: u64,
        error: String,
    },
}

/// External speech synthesis collaborator.
///
/// Returns compressed audio bytes for `text`. The call may block for an
/// unbounded time and cannot be cancelled once issued; the controller only
/// abandons interest in the result.
pub trait SpeechGenerator: Send + Sync {
    fn generate(&self, text: &str) -> Result<Vec<u8>>;
}

/// The single audio output stream slot.
///
/// `stop` must be synchronous (cancel + join) so that a new stream never
/// overlaps the previous one.
pub trait NarrationSink: Send {
    fn play(
        &mut self,
        clip: Arc<NarrationClip>,
        session: u64,
        played_frames: Arc<AtomicU64>,
        events: Sender<ControllerCommand>,
    ) -> Result<()>;

    fn stop(&mut self);
}

/// A generation request handed to a [`GenerationBackend`].
pub struct GenerationJob {
    pub session: u64,
    pub id: String,
    pub text: String,
    pub reply: Sender<ControllerCommand>,
}

/// Launches generation work; the production impl spawns a session thread.
pub trait GenerationBackend: Send {
    fn launch(&mut self, job: GenerationJob);
}

enum Phase {
    Idle,
    Generating { id: String },
    Playing { id: String },
}

/// State machine body, driven by [`ControllerCore::handle`].
///
/// Kept separate from the thread wrapper so transitions are testable with
/// mock sink/backend implementations and hand-fed commands.
pub struct ControllerCore {
    phase: Phase,
    session: u64,
    cache: Arc<PlaybackCache>,
    status: Arc<Mutex<NarrationStatusState>>,
    sink: Box<dyn NarrationSink>,
    generation: Box<dyn GenerationBackend>,
    events: Sender<ControllerCommand>,
}

impl ControllerCore {
    pub fn new(
        cache: Arc<PlaybackCache>,
        status: Arc<Mutex<NarrationStatusState>>,
        sink: Box<dyn NarrationSink>,
        generation: Box<dyn GenerationBackend>,
        events: Sender<ControllerCommand>,
    ) -> Self {
        Self {
            phase: Phase::Idle,
            session: 0,
            cache,
            status,
            sink,
            generation,
            events,
        }
    }

    /// Apply one command; returns `false` when the loop should exit.
    pub fn handle(&mut self, cmd: ControllerCommand) -> bool {
        match cmd {
            ControllerCommand::Narrate { id, text } => self.on_narrate(id, text),
            ControllerCommand::Stop => {
                if !matches!(self.phase, Phase::Idle) {
                    tracing::info!("narration stopped");
                    self.stop_active(NarrationEndReason::Stopped);
                }
            }
            ControllerCommand::Quit => {
                self.sink.stop();
                self.phase = Phase::Idle;
                return false;
            }
            ControllerCommand::GenerationDone { session, id, clip } => {
                // Always keep the finished clip: late results from abandoned
                // sessions are still valid material for the next request.
                let winner = self.cache.put(&id, clip);
                if self.is_current_generation(session, &id) {
                    tracing::info!(id = %id, bytes = winner.wav.len(), "generation finished");
                    self.start_playback(id, winner);
                } else {
                    tracing::debug!(id = %id, session, "stale generation result cached");
                }
            }
            ControllerCommand::GenerationFailed { session, id, error } => {
                if self.is_current_generation(session, &id) {
                    tracing::warn!(id = %id, error = %error, "generation failed");
                    self.phase = Phase::Idle;
                    if let Ok(mut s) = self.status.lock() {
                        s.on_idle(NarrationEndReason::Failed, Some(error));
                    }
                } else {
                    tracing::debug!(id = %id, session, "stale generation failure dropped");
                }
            }
            ControllerCommand::PlaybackFinished { session } => {
                if session == self.session && matches!(self.phase, Phase::Playing { .. }) {
                    tracing::info!("narration completed");
                    self.sink.stop();
                    self.phase = Phase::Idle;
                    if let Ok(mut s) = self.status.lock() {
                        s.on_idle(NarrationEndReason::Completed, None);
                    }
                }
            }
            ControllerCommand::PlaybackFailed { session, error } => {
                if session == self.session && matches!(self.phase, Phase::Playing { .. }) {
                    tracing::warn!(error = %error, "narration playback failed");
                    self.sink.stop();
                    self.phase = Phase::Idle;
                    if let Ok(mut s) = self.status.lock() {
                        s.on_idle(NarrationEndReason::Failed, Some(error));
                    }
                }
            }
        }
        true
    }

    fn on_narrate(&mut self, id: String, text: String) {
        match &self.phase {
            // Re-requesting the playing id toggles it off.
            Phase::Playing { id: current } if *current == id => {
                tracing::info!(id = %id, "narration toggled off");
                self.stop_active(NarrationEndReason::Stopped);
                return;
            }
            // A duplicate request for the id already being generated is a
            // no-op; the in-flight call will complete either way.
            Phase::Generating { id: current } if *current == id => {
                tracing::debug!(id = %id, "generation already in flight");
                return;
            }
            Phase::Idle => {}
            _ => self.stop_active(NarrationEndReason::Superseded),
        }

        match self.cache.get(&id) {
            Some(clip) => {
                tracing::info!(id = %id, "cached clip found");
                self.start_playback(id, clip);
            }
            None => {
                self.session += 1;
                let session = self.session;
                tracing::info!(id = %id, session, "generation launched");
                if let Ok(mut s) = self.status.lock() {
                    s.on_generating(&id);
                }
                self.generation.launch(GenerationJob {
                    session,
                    id: id.clone(),
                    text,
                    reply: self.events.clone(),
                });
                self.phase = Phase::Generating { id };
            }
        }
    }

    /// Stop the sink and invalidate in-flight session results.
    fn stop_active(&mut self, reason: NarrationEndReason) {
        self.sink.stop();
        self.session += 1;
        self.phase = Phase::Idle;
        if let Ok(mut s) = self.status.lock() {
            s.on_idle(reason, None);
        }
    }

    fn start_playback(&mut self, id: String, clip: Arc<NarrationClip>) {
        self.session += 1;
        let session = self.session;
        let played_frames = Arc::new(AtomicU64::new(0));
        match self
            .sink
            .play(clip.clone(), session, played_frames.clone(), self.events.clone())
        {
            Ok(()) => {
                if let Ok(mut s) = self.status.lock() {
                    s.on_playing(&id, &clip, played_frames);
                }
                self.phase = Phase::Playing { id };
            }
            Err(e) => {
                tracing::warn!(id = %id, "playback start failed: {e:#}");
                self.phase = Phase::Idle;
                if let Ok(mut s) = self.status.lock() {
                    s.on_idle(NarrationEndReason::Failed, Some(format!("{e:#}")));
                }
            }
        }
    }

    fn is_current_generation(&self, session: u64, id: &str) -> bool {
        session == self.session
            && matches!(&self.phase, Phase::Generating { id: current } if current == id)
    }
}

/// Handle for sending commands to a spawned controller thread.
#[derive(Clone)]
pub struct NarrationController {
    cmd_tx: Sender<ControllerCommand>,
    status: Arc<Mutex<NarrationStatusState>>,
    cache: Arc<PlaybackCache>,
}

impl NarrationController {
    /// Request narration of `text` under `id` (toggle/supersede semantics).
    pub fn narrate(&self, id: &str, text: &str) {
        let _ = self.cmd_tx.send(ControllerCommand::Narrate {
            id: id.to_string(),
            text: text.to_string(),
        });
    }

    /// Stop whatever is generating or playing.
    pub fn stop(&self) {
        let _ = self.cmd_tx.send(ControllerCommand::Stop);
    }

    /// Tear down the controller thread, releasing the active stream.
    pub fn quit(&self) {
        let _ = self.cmd_tx.send(ControllerCommand::Quit);
    }

    /// Current status snapshot for API responses.
    pub fn status(&self) -> NarrationStatus {
        let cached_clips = self.cache.len();
        self.status
            .lock()
            .map(|s| s.snapshot(cached_clips))
            .unwrap_or_default()
    }

    /// Fetch a generated clip by narration id.
    pub fn clip(&self, id: &str) -> Option<Arc<NarrationClip>> {
        self.cache.get(id)
    }
}

/// Spawn the controller worker thread.
pub fn spawn_controller(
    generation: Box<dyn GenerationBackend>,
    sink: Box<dyn NarrationSink>,
    cache: Arc<PlaybackCache>,
    status: Arc<Mutex<NarrationStatusState>>,
) -> NarrationController {
    let (cmd_tx, cmd_rx) = unbounded();
    let events = cmd_tx.clone();
    let thread_cache = cache.clone();
    let thread_status = status.clone();
    std::thread::spawn(move || {
        let core = ControllerCore::new(thread_cache, thread_status, sink, generation, events);
        controller_thread_main(core, cmd_rx);
    });
    NarrationController {
        cmd_tx,
        status,
        cache,
    }
}

/// Main loop for the controller thread.
fn controller_thread_main(mut core: ControllerCore, cmd_rx: Receiver<ControllerCommand>) {
    while let Ok(cmd) = cmd_rx.recv() {
        if !core.handle(cmd) {
            break;
        }
    }
}

/// Production [`GenerationBackend`]: one session thread per request running
/// generate → decode → encode, reporting back over the command channel.
pub struct ThreadedGenerator {
    speech: Arc<dyn SpeechGenerator>,
    target: DecodeTarget,
    payload_hint: Option<String>,
    chunk_frames: usize,
}

impl ThreadedGenerator {
    pub fn new(
        speech: Arc<dyn SpeechGenerator>,
        target: DecodeTarget,
        payload_hint: Option<String>,
        chunk_frames: usize,
    ) -> Self {
        Self {
            speech,
            target,
            payload_hint,
            chunk_frames,
        }
    }
}

impl GenerationBackend for ThreadedGenerator {
    fn launch(&mut self, job: GenerationJob) {
        let speech = self.speech.clone();
        let target = self.target;
        let hint = self.payload_hint.clone();
        let chunk_frames = self.chunk_frames;
        std::thread::spawn(move || {
            let GenerationJob {
                session,
                id,
                text,
                reply,
            } = job;
            match generate_clip(speech.as_ref(), &text, hint.as_deref(), target, chunk_frames) {
                Ok(clip) => {
                    let _ = reply.send(ControllerCommand::GenerationDone {
                        session,
                        id,
                        clip: Arc::new(clip),
                    });
                }
                Err(e) => {
                    let _ = reply.send(ControllerCommand::GenerationFailed {
                        session,
                        id,
                        error: e.to_string(),
                    });
                }
            }
        });
    }
}

/// Run one generation end to end: speech call, decode, WAV artifact.
fn generate_clip(
    speech: &dyn SpeechGenerator,
    text: &str,
    payload_hint: Option<&str>,
    target: DecodeTarget,
    chunk_frames: usize,
) -> Result<NarrationClip, NarrationError> {
    let bytes = speech
        .generate(text)
        .map_err(|e| NarrationError::GenerationFailed(format!("{e:#}")))?;
    if bytes.is_empty() {
        return Err(NarrationError::GenerationFailed(
            "speech api returned no audio".to_string(),
        ));
    }
    let buffer = decode::decode_clip_bytes(bytes, payload_hint, target, chunk_frames)?;
    NarrationClip::from_buffer(&buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::AudioBuffer;
    use narration_types::NarrationPhase;

    #[derive(Debug, PartialEq)]
    enum SinkCall {
        Play(u64),
        Stop,
    }

    struct RecordingSink {
        calls: Arc<Mutex<Vec<SinkCall>>>,
        fail_play: bool,
    }

    impl NarrationSink for RecordingSink {
        fn play(
            &mut self,
            _clip: Arc<NarrationClip>,
            session: u64,
            _played_frames: Arc<AtomicU64>,
            _events: Sender<ControllerCommand>,
        ) -> Result<()> {
            self.calls.lock().unwrap().push(SinkCall::Play(session));
            if self.fail_play {
                anyhow::bail!("no output device");
            }
            Ok(())
        }

        fn stop(&mut self) {
            self.calls.lock().unwrap().push(SinkCall::Stop);
        }
    }

    struct RecordingBackend {
        jobs: Arc<Mutex<Vec<(u64, String, String)>>>,
    }

    impl GenerationBackend for RecordingBackend {
        fn launch(&mut self, job: GenerationJob) {
            self.jobs
                .lock()
                .unwrap()
                .push((job.session, job.id, job.text));
        }
    }

    struct Harness {
        core: ControllerCore,
        calls: Arc<Mutex<Vec<SinkCall>>>,
        jobs: Arc<Mutex<Vec<(u64, String, String)>>>,
        status: Arc<Mutex<NarrationStatusState>>,
        cache: Arc<PlaybackCache>,
        // keeps the event channel open for sends from the core
        _events_rx: Receiver<ControllerCommand>,
    }

    fn harness(fail_play: bool) -> Harness {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let jobs = Arc::new(Mutex::new(Vec::new()));
        let status = NarrationStatusState::shared();
        let cache = Arc::new(PlaybackCache::new());
        let (events, events_rx) = unbounded();
        let core = ControllerCore::new(
            cache.clone(),
            status.clone(),
            Box::new(RecordingSink {
                calls: calls.clone(),
                fail_play,
            }),
            Box::new(RecordingBackend { jobs: jobs.clone() }),
            events,
        );
        Harness {
            core,
            calls,
            jobs,
            status,
            cache,
            _events_rx: events_rx,
        }
    }

    fn clip() -> Arc<NarrationClip> {
        let buffer = AudioBuffer::new(24_000, vec![vec![0.0, 0.5, -0.5, 1.0]]).unwrap();
        Arc::new(NarrationClip::from_buffer(&buffer).unwrap())
    }

    fn narrate(h: &mut Harness, id: &str) {
        h.core.handle(ControllerCommand::Narrate {
            id: id.to_string(),
            text: format!("text for {id}"),
        });
    }

    fn last_job_session(h: &Harness) -> u64 {
        h.jobs.lock().unwrap().last().expect("a job").0
    }

    fn last_play_session(h: &Harness) -> u64 {
        h.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|c| match c {
                SinkCall::Play(session) => Some(*session),
                SinkCall::Stop => None,
            })
            .expect("a play call")
    }

    fn phase(h: &Harness) -> NarrationPhase {
        h.status.lock().unwrap().snapshot(0).phase
    }

    #[test]
    fn cache_miss_launches_generation() {
        let mut h = harness(false);
        narrate(&mut h, "a1");

        assert_eq!(phase(&h), NarrationPhase::Generating);
        let jobs = h.jobs.lock().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].1, "a1");
        assert_eq!(jobs[0].2, "text for a1");
        assert!(h.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn generation_success_caches_and_plays() {
        let mut h = harness(false);
        narrate(&mut h, "a1");
        let session = last_job_session(&h);

        h.core.handle(ControllerCommand::GenerationDone {
            session,
            id: "a1".to_string(),
            clip: clip(),
        });

        assert_eq!(phase(&h), NarrationPhase::Playing);
        assert!(h.cache.get("a1").is_some());
        assert!(matches!(
            h.calls.lock().unwrap().last(),
            Some(SinkCall::Play(_))
        ));
    }

    #[test]
    fn toggle_then_cache_hit_skips_generation() {
        let mut h = harness(false);

        // request(A) with cache miss -> Generating(A)
        narrate(&mut h, "a1");
        let session = last_job_session(&h);

        // generation succeeds -> Playing(A), cache contains A
        h.core.handle(ControllerCommand::GenerationDone {
            session,
            id: "a1".to_string(),
            clip: clip(),
        });
        assert_eq!(phase(&h), NarrationPhase::Playing);

        // request(A) while Playing(A) -> Idle (stop)
        narrate(&mut h, "a1");
        assert_eq!(phase(&h), NarrationPhase::Idle);
        let snap = h.status.lock().unwrap().snapshot(0);
        assert_eq!(snap.end_reason, Some(NarrationEndReason::Stopped));

        // request(A) again -> cache hit, Playing immediately, no new job
        narrate(&mut h, "a1");
        assert_eq!(phase(&h), NarrationPhase::Playing);
        assert_eq!(h.jobs.lock().unwrap().len(), 1);
    }

    #[test]
    fn generation_failure_returns_to_idle_with_message() {
        let mut h = harness(false);
        narrate(&mut h, "a1");
        let session = last_job_session(&h);

        h.core.handle(ControllerCommand::GenerationFailed {
            session,
            id: "a1".to_string(),
            error: "speech api error: quota".to_string(),
        });

        let snap = h.status.lock().unwrap().snapshot(0);
        assert_eq!(snap.phase, NarrationPhase::Idle);
        assert_eq!(snap.last_error.as_deref(), Some("speech api error: quota"));
        assert_eq!(snap.end_reason, Some(NarrationEndReason::Failed));
        // a new request can be issued immediately
        narrate(&mut h, "a1");
        assert_eq!(phase(&h), NarrationPhase::Generating);
    }

    #[test]
    fn new_id_supersedes_active_playback() {
        let mut h = harness(false);
        h.cache.put("a1", clip());
        narrate(&mut h, "a1");
        assert_eq!(phase(&h), NarrationPhase::Playing);

        narrate(&mut h, "b2");

        assert_eq!(phase(&h), NarrationPhase::Generating);
        let snap = h.status.lock().unwrap().snapshot(0);
        assert_eq!(snap.narration_id.as_deref(), Some("b2"));
        // the previous stream was stopped before anything new started
        let calls = h.calls.lock().unwrap();
        assert_eq!(
            calls.last(),
            Some(&SinkCall::Stop),
            "no new play yet while b2 generates"
        );
    }

    #[test]
    fn stale_generation_result_is_cached_but_not_played() {
        let mut h = harness(false);
        narrate(&mut h, "a1");
        let stale_session = last_job_session(&h);

        h.core.handle(ControllerCommand::Stop);
        assert_eq!(phase(&h), NarrationPhase::Idle);

        h.core.handle(ControllerCommand::GenerationDone {
            session: stale_session,
            id: "a1".to_string(),
            clip: clip(),
        });

        assert_eq!(phase(&h), NarrationPhase::Idle);
        assert!(h.cache.get("a1").is_some());
        assert!(h.calls.lock().unwrap().iter().all(|c| *c != SinkCall::Play(stale_session)));
    }

    #[test]
    fn stale_playback_events_are_dropped() {
        let mut h = harness(false);
        h.cache.put("a1", clip());
        narrate(&mut h, "a1");
        let stale_session = last_play_session(&h);

        narrate(&mut h, "b2"); // supersede; a1's session is now stale
        h.core.handle(ControllerCommand::PlaybackFinished {
            session: stale_session,
        });

        assert_eq!(phase(&h), NarrationPhase::Generating);
    }

    #[test]
    fn natural_completion_returns_to_idle() {
        let mut h = harness(false);
        h.cache.put("a1", clip());
        narrate(&mut h, "a1");
        let session = last_play_session(&h);

        h.core.handle(ControllerCommand::PlaybackFinished { session });

        let snap = h.status.lock().unwrap().snapshot(0);
        assert_eq!(snap.phase, NarrationPhase::Idle);
        assert_eq!(snap.end_reason, Some(NarrationEndReason::Completed));
        assert_eq!(snap.last_error, None);
    }

    #[test]
    fn playback_fault_surfaces_error() {
        let mut h = harness(false);
        h.cache.put("a1", clip());
        narrate(&mut h, "a1");
        let session = last_play_session(&h);

        h.core.handle(ControllerCommand::PlaybackFailed {
            session,
            error: "device disconnected".to_string(),
        });

        let snap = h.status.lock().unwrap().snapshot(0);
        assert_eq!(snap.phase, NarrationPhase::Idle);
        assert_eq!(snap.last_error.as_deref(), Some("device disconnected"));
        assert_eq!(snap.end_reason, Some(NarrationEndReason::Failed));
    }

    #[test]
    fn failed_play_call_lands_in_idle() {
        let mut h = harness(true);
        h.cache.put("a1", clip());
        narrate(&mut h, "a1");

        let snap = h.status.lock().unwrap().snapshot(0);
        assert_eq!(snap.phase, NarrationPhase::Idle);
        assert!(snap.last_error.unwrap().contains("no output device"));
    }

    #[test]
    fn duplicate_request_while_generating_is_ignored() {
        let mut h = harness(false);
        narrate(&mut h, "a1");
        narrate(&mut h, "a1");

        assert_eq!(h.jobs.lock().unwrap().len(), 1);
        assert_eq!(phase(&h), NarrationPhase::Generating);
    }

    #[test]
    fn stop_when_idle_is_a_no_op() {
        let mut h = harness(false);
        h.core.handle(ControllerCommand::Stop);

        let snap = h.status.lock().unwrap().snapshot(0);
        assert_eq!(snap.phase, NarrationPhase::Idle);
        assert_eq!(snap.end_reason, None);
        assert!(h.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn quit_stops_sink_and_ends_loop() {
        let mut h = harness(false);
        h.cache.put("a1", clip());
        narrate(&mut h, "a1");

        let keep_running = h.core.handle(ControllerCommand::Quit);

        assert!(!keep_running);
        assert_eq!(h.calls.lock().unwrap().last(), Some(&SinkCall::Stop));
    }

    #[test]
    fn request_sequences_never_overlap_streams() {
        let mut h = harness(false);
        h.cache.put("a1", clip());
        h.cache.put("b2", clip());
        h.cache.put("c3", clip());

        for id in ["a1", "b2", "b2", "c3", "a1", "c3", "c3"] {
            narrate(&mut h, id);
        }

        // between any two Play calls there is at least one Stop
        let calls = h.calls.lock().unwrap();
        let mut open_stream = false;
        for call in calls.iter() {
            match call {
                SinkCall::Play(_) => {
                    assert!(!open_stream, "second stream started before stop: {calls:?}");
                    open_stream = true;
                }
                SinkCall::Stop => open_stream = false,
            }
        }
    }
}
