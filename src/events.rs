//! Session state and the outbound event stream.
//!
//! The orchestrator is the only producer of [`CommandEvent`]s. Presentation
//! layers, loggers and tests subscribe through [`EventBus::subscribe`] and
//! receive every event in emission order.

use std::sync::{Mutex, MutexGuard};
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// What the assistant is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Awake and waiting.
    Idle,
    /// The listening loop is waiting on the speech-input collaborator.
    Listening,
    /// Inside the serialized command-handling section.
    Processing,
    /// A speech job is playing.
    Speaking,
    /// Asleep: everything except a wake phrase is discarded.
    Sleeping,
}

impl SessionState {
    /// Short label used in logs and status lines.
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Processing => "processing",
            Self::Speaking => "speaking",
            Self::Sleeping => "sleeping",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Snapshot {
    state: SessionState,
    awake: bool,
}

/// Session state plus the awake flag, shared by the orchestrator and its
/// background tasks.
///
/// Both fields live under one lock so readers never see a sleeping session
/// that is still marked awake.
#[derive(Debug)]
pub struct SessionCell {
    inner: Mutex<Snapshot>,
}

impl Default for SessionCell {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Snapshot {
                state: SessionState::Idle,
                awake: true,
            }),
        }
    }
}

impl SessionCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn is_awake(&self) -> bool {
        self.lock().awake
    }

    /// Unconditionally move to `next`.
    pub fn set(&self, next: SessionState) {
        let mut snap = self.lock();
        log_transition(snap.state, next);
        snap.state = next;
    }

    /// Move to `next` only if the current state is one of `from`.
    ///
    /// Returns whether the transition happened.
    pub fn transition(&self, from: &[SessionState], next: SessionState) -> bool {
        let mut snap = self.lock();
        if !from.contains(&snap.state) {
            return false;
        }
        log_transition(snap.state, next);
        snap.state = next;
        true
    }

    /// Clear the awake flag and enter `Sleeping`. Returns `false` if already asleep.
    pub fn sleep(&self) -> bool {
        let mut snap = self.lock();
        if !snap.awake {
            return false;
        }
        log_transition(snap.state, SessionState::Sleeping);
        snap.awake = false;
        snap.state = SessionState::Sleeping;
        true
    }

    /// Set the awake flag and return to `Idle`. Returns `false` if already awake.
    pub fn wake(&self) -> bool {
        let mut snap = self.lock();
        if snap.awake {
            return false;
        }
        log_transition(snap.state, SessionState::Idle);
        snap.awake = true;
        snap.state = SessionState::Idle;
        true
    }

    /// Session over: not awake, state reset to `Idle`.
    pub fn close(&self) {
        let mut snap = self.lock();
        log_transition(snap.state, SessionState::Idle);
        snap.awake = false;
        snap.state = SessionState::Idle;
    }

    fn lock(&self) -> MutexGuard<'_, Snapshot> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn log_transition(from: SessionState, to: SessionState) {
    if from != to {
        info!("session: {} -> {}", from.label(), to.label());
    }
}

/// Where an utterance came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSource {
    /// Recognized speech from the listening loop. Subject to debounce.
    Voice,
    /// Typed text. Never debounced.
    Text,
}

/// One input event.
#[derive(Debug, Clone)]
pub struct Utterance {
    /// Raw text as received.
    pub text: String,
    /// Input path.
    pub source: InputSource,
    /// Arrival time.
    pub received_at: Instant,
}

impl Utterance {
    /// Create an utterance stamped with the current time.
    pub fn new(text: impl Into<String>, source: InputSource) -> Self {
        Self {
            text: text.into(),
            source,
            received_at: Instant::now(),
        }
    }
}

/// Events emitted by the orchestrator for UI and observability.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandEvent {
    /// Human-readable status line ("Listening...", "Processing...").
    StatusUpdate(String),
    /// Assistant reply text.
    ChatResponse(String),
    /// Recognized voice input, echoed for display.
    VoiceInputEcho(String),
    /// A command failed.
    Error(String),
    /// The user asked to quit. The running flag is already cleared.
    ExitRequested,
    /// The user asked the presentation layer to go to its home view.
    GoHomeRequested,
    /// Microphone or synthetic level in `[0, 1]`.
    VolumeSample(f32),
}

impl CommandEvent {
    /// Convenience constructor for status updates.
    pub fn status(text: impl Into<String>) -> Self {
        Self::StatusUpdate(text.into())
    }
}

/// Broadcast fan-out for [`CommandEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CommandEvent>,
}

impl EventBus {
    /// Create a bus that buffers `capacity` events per listener.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Register a listener. It receives events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<CommandEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to every listener. Emitting with no listeners is not an error.
    pub fn emit(&self, event: CommandEvent) {
        if !matches!(event, CommandEvent::VolumeSample(_)) {
            debug!("event: {event:?}");
        }
        let _ = self.tx.send(event);
    }
}
