//! Session controller.
//!
//! [`Orchestrator::process_input`] is the single entry point for voice and
//! text input. Every call runs inside one async mutex, so two commands never
//! interleave their steps; a second caller waits its turn instead of being
//! dropped. Within a turn the checks run in a fixed order:
//!
//! 1. duplicate voice input is dropped (debounce)
//! 2. while asleep, voice input other than a wake phrase is dropped; typed
//!    text may still go home or exit
//! 3. home, exit, sleep and wake directives
//! 4. interruption (stop speech, optionally continue with the remainder)
//! 5. classification and dispatch to a handler
//!
//! Handler work runs on its own task with a timeout, so a panicking or hung
//! collaborator becomes an [`CommandEvent::Error`] instead of taking the
//! controller down. Every turn ends with the session in `Idle` or `Sleeping`.

use crate::backend::{Backends, SpeechInput};
use crate::config::AssistantConfig;
use crate::debounce::DebounceGuard;
use crate::dispatch::{CommandDispatcher, DispatchOutcome};
use crate::error::{AssistantError, Result};
use crate::events::{CommandEvent, EventBus, InputSource, SessionCell, SessionState, Utterance};
use crate::listener::ListeningLoop;
use crate::phrases::{Directive, PhraseTable};
use crate::speech::SpeechController;
use crate::supervisor::TaskSupervisor;
use crate::volume::{VolumeFeed, VolumeSampler};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const GOODBYE: &str = "Goodbye! Closing the application...";
const AWAKE_ACK: &str = "Hello! I'm awake and ready to help you.";
const FAILURE_REPLY: &str = "Sorry, I couldn't complete that request.";

/// Resets `Processing` or `Listening` to `Idle` however a turn ends,
/// including when the caller drops the `process_input` future midway.
/// `Listening` is set by the listening loop while a typed turn runs.
struct TurnGuard<'a> {
    session: &'a SessionCell,
    settled: &'a Notify,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.session.transition(
            &[SessionState::Processing, SessionState::Listening],
            SessionState::Idle,
        );
        self.settled.notify_one();
    }
}

/// What the remainder of a turn should do after directive handling.
enum Next {
    Done,
    Command(String),
}

/// Central state machine owning the session, speech and background tasks.
pub struct Orchestrator {
    config: AssistantConfig,
    phrases: PhraseTable,
    debounce: DebounceGuard,
    dispatcher: CommandDispatcher,
    speech: Arc<SpeechController>,
    events: EventBus,
    session: Arc<SessionCell>,
    /// Serializes `process_input`.
    turn: Mutex<()>,
    /// Signalled at the end of every turn so the speech monitor can re-check state.
    settled: Arc<Notify>,
    running: CancellationToken,
    started: AtomicBool,
    tasks: TaskSupervisor,
}

impl Orchestrator {
    /// Build an orchestrator. Nothing runs in the background until [`start`](Self::start).
    pub fn new(config: AssistantConfig, backends: Backends) -> Arc<Self> {
        let speech = Arc::new(SpeechController::new(
            Arc::clone(&backends.speech),
            config.speech.grace_period(),
            config.speech.scratch_dir.clone(),
        ));
        let phrases = PhraseTable::new(&config.phrases, &config.assistant.wake_word);
        let debounce = DebounceGuard::new(Duration::from_millis(config.debounce.window_ms));
        let events = EventBus::new(config.runtime.event_capacity);

        info!(
            "{} orchestrator created (wake word {:?})",
            config.assistant.name, config.assistant.wake_word
        );
        Arc::new(Self {
            phrases,
            debounce,
            dispatcher: CommandDispatcher::new(backends),
            speech,
            events,
            session: Arc::new(SessionCell::new()),
            turn: Mutex::new(()),
            settled: Arc::new(Notify::new()),
            running: CancellationToken::new(),
            started: AtomicBool::new(false),
            tasks: TaskSupervisor::new(),
            config,
        })
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<CommandEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn is_awake(&self) -> bool {
        self.session.is_awake()
    }

    /// Whether the session still accepts input. Cleared by exit and shutdown; never set again.
    pub fn is_running(&self) -> bool {
        !self.running.is_cancelled()
    }

    /// Token cancelled when the session stops running.
    pub fn running_token(&self) -> CancellationToken {
        self.running.clone()
    }

    pub fn speech(&self) -> &Arc<SpeechController> {
        &self.speech
    }

    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }

    pub(crate) fn session(&self) -> &Arc<SessionCell> {
        &self.session
    }

    /// Handle one utterance. Safe to call concurrently; calls are serialized.
    ///
    /// Never fails: collaborator errors surface as [`CommandEvent::Error`].
    pub async fn process_input(&self, text: &str, source: InputSource) {
        if !self.is_running() {
            debug!("not running, dropping input: {text}");
            return;
        }
        // Stamped before the lock: debounce compares arrival times.
        let utterance = Utterance::new(text.trim(), source);
        let _turn = self.turn.lock().await;
        if !self.is_running() {
            debug!("stopped while waiting, dropping input: {text}");
            return;
        }
        let _guard = TurnGuard {
            session: &self.session,
            settled: &self.settled,
        };

        if utterance.text.is_empty() {
            return;
        }
        if !self.debounce.accept(&utterance) {
            return;
        }

        let directive = self.phrases.evaluate(&utterance.text);
        if !self.admits(&directive, source) {
            return;
        }
        if source == InputSource::Voice {
            self.events
                .emit(CommandEvent::VoiceInputEcho(utterance.text.clone()));
        }
        info!("input ({source:?}): {}", utterance.text);

        let command = match directive {
            Some(directive) => match self.apply_directive(directive).await {
                Next::Done => return,
                Next::Command(rest) => rest,
            },
            None => utterance.text,
        };
        self.run_command(&command).await;
    }

    /// Sleep/wake gate. Rejected input produces no events at all.
    fn admits(&self, directive: &Option<Directive>, source: InputSource) -> bool {
        let awake = self.session.is_awake();
        let admitted = match directive {
            Some(Directive::Wake) => !awake,
            Some(Directive::Sleep) => awake,
            _ if awake => true,
            Some(Directive::GoHome | Directive::Exit) => source == InputSource::Text,
            _ => false,
        };
        if !admitted {
            debug!("ignoring {directive:?} (awake: {awake}, source: {source:?})");
        }
        admitted
    }

    async fn apply_directive(&self, directive: Directive) -> Next {
        match directive {
            Directive::GoHome => {
                info!("go home requested");
                self.events.emit(CommandEvent::GoHomeRequested);
                Next::Done
            }
            Directive::Exit => {
                self.exit_sequence();
                Next::Done
            }
            Directive::Sleep => {
                if self.session.sleep() {
                    let ack = format!(
                        "Going to sleep. Say 'wake up {}' to wake me up.",
                        self.config.assistant.wake_word
                    );
                    self.acknowledge(&ack, "Sleeping...").await;
                }
                Next::Done
            }
            Directive::Wake => {
                if self.session.wake() {
                    self.acknowledge(AWAKE_ACK, "Awake and ready...").await;
                }
                Next::Done
            }
            Directive::Interrupt { remainder } => {
                info!("interrupted by user");
                self.speech.stop();
                self.events.emit(CommandEvent::status("Stopped by user"));
                self.session.set(SessionState::Idle);
                match remainder {
                    Some(rest) => Next::Command(rest),
                    None => Next::Done,
                }
            }
        }
    }

    async fn acknowledge(&self, reply: &str, status: &str) {
        self.events.emit(CommandEvent::ChatResponse(reply.to_owned()));
        self.events.emit(CommandEvent::status(status));
        self.speech.speak(reply).await;
    }

    fn exit_sequence(&self) {
        info!("exit requested");
        self.events.emit(CommandEvent::ChatResponse(GOODBYE.to_owned()));
        self.events.emit(CommandEvent::status("Closing..."));
        self.running.cancel();
        self.speech.stop();
        self.session.close();
        self.events.emit(CommandEvent::ExitRequested);
    }

    /// Classify and dispatch one command on a separate task, bounded by the handler timeout.
    async fn run_command(&self, text: &str) {
        self.session.set(SessionState::Processing);
        self.events.emit(CommandEvent::status("Processing..."));

        let dispatcher = self.dispatcher.clone();
        let events = self.events.clone();
        let owned = text.to_owned();
        let mut task = tokio::spawn(async move {
            let category = dispatcher.classify(&owned).await;
            dispatcher.dispatch(&owned, category, &events).await
        });

        let limit = self.config.runtime.handler_timeout();
        let outcome = match tokio::time::timeout(limit, &mut task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                DispatchOutcome::Failed(AssistantError::Handler(format!("handler crashed: {e}")))
            }
            Err(_) => {
                task.abort();
                DispatchOutcome::Failed(AssistantError::Handler(format!(
                    "handler timed out after {limit:?}"
                )))
            }
        };

        match outcome {
            DispatchOutcome::Exit => self.exit_sequence(),
            _ if !self.is_running() => {
                debug!("stopped during command, discarding result");
            }
            DispatchOutcome::Reply(reply) => {
                self.events.emit(CommandEvent::ChatResponse(reply.clone()));
                self.speech.speak(&reply).await;
                self.settle();
            }
            DispatchOutcome::Failed(e) => {
                error!("command failed: {e}");
                self.events.emit(CommandEvent::Error(e.to_string()));
                self.speech.speak(FAILURE_REPLY).await;
                self.settle();
            }
        }
    }

    fn settle(&self) {
        self.session.set(SessionState::Idle);
        self.events.emit(CommandEvent::status("Available..."));
    }

    /// Start the background tasks: the speech-state monitor, the listening
    /// loop (when `input` is given and listening is enabled) and the volume
    /// sampler (unless the feed is disabled).
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Shutdown`] once the session has stopped, or
    /// [`AssistantError::Config`] when called twice.
    pub fn start(
        self: &Arc<Self>,
        input: Option<Arc<dyn SpeechInput>>,
        volume: VolumeFeed,
    ) -> Result<()> {
        if !self.is_running() {
            return Err(AssistantError::Shutdown);
        }
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(AssistantError::Config("orchestrator already started".into()));
        }

        self.tasks.spawn("speech-monitor", speech_monitor(Arc::clone(self)));

        match input {
            Some(input) if self.config.listening.enabled => {
                let listener = ListeningLoop::new(Arc::clone(self), input);
                self.tasks.spawn("listener", listener.run());
            }
            Some(_) => info!("listening disabled by configuration"),
            None => debug!("no speech input, text only"),
        }

        if self.config.volume.enabled && !matches!(volume, VolumeFeed::Disabled) {
            let sampler = VolumeSampler::new(
                &self.config.volume,
                volume,
                Arc::clone(&self.session),
                self.events.clone(),
            );
            self.tasks.spawn("volume", sampler.run(self.running.clone()));
        }
        info!("orchestrator started with {} background task(s)", self.tasks.len());
        Ok(())
    }

    /// Stop everything: clear the running flag, stop speech, and join the
    /// background tasks with a bounded timeout.
    pub async fn shutdown(&self) {
        info!("shutting down");
        self.running.cancel();
        let timeout = self.config.runtime.shutdown_timeout();
        self.speech.shutdown(timeout).await;
        let aborted = self.tasks.join_all(timeout).await;
        if !aborted.is_empty() {
            warn!("aborted stuck task(s) at shutdown: {aborted:?}");
        }
        info!("shutdown complete");
    }
}

/// Mirror the speech controller's speaking flag into the session state.
///
/// Wakes on every flag change and after every turn, since a turn may end
/// while speech it started is still playing.
async fn speech_monitor(orchestrator: Arc<Orchestrator>) {
    let mut speaking = orchestrator.speech.subscribe();
    let session = Arc::clone(&orchestrator.session);
    let settled = Arc::clone(&orchestrator.settled);
    let running = orchestrator.running.clone();
    let events = orchestrator.events.clone();
    drop(orchestrator);

    loop {
        tokio::select! {
            () = running.cancelled() => break,
            changed = speaking.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            () = settled.notified() => {}
        }

        let is_speaking = *speaking.borrow_and_update();
        if is_speaking {
            if session.transition(&[SessionState::Idle, SessionState::Listening], SessionState::Speaking) {
                events.emit(CommandEvent::status("Speaking..."));
            }
        } else if session.transition(&[SessionState::Speaking], SessionState::Idle) {
            events.emit(CommandEvent::status("Available..."));
        }
    }
    debug!("speech monitor stopped");
}
