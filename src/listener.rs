//! Background listening loop.
//!
//! Repeatedly asks the speech-input collaborator for one utterance and hands
//! it to the orchestrator as voice input. `listen_once` may block for as
//! long as nobody speaks, so it is raced against the running token and the
//! loop exits as soon as the session stops.

use crate::backend::SpeechInput;
use crate::config::ListeningConfig;
use crate::error::AssistantError;
use crate::events::{CommandEvent, InputSource, SessionState};
use crate::orchestrator::Orchestrator;
use crate::text;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Drives the speech-input collaborator until the session stops running.
pub struct ListeningLoop {
    orchestrator: Arc<Orchestrator>,
    input: Arc<dyn SpeechInput>,
    config: ListeningConfig,
}

impl ListeningLoop {
    pub fn new(orchestrator: Arc<Orchestrator>, input: Arc<dyn SpeechInput>) -> Self {
        let config = orchestrator.config().listening.clone();
        Self {
            orchestrator,
            input,
            config,
        }
    }

    /// Run until the running token is cancelled.
    pub async fn run(self) {
        let running = self.orchestrator.running_token();
        let poll = Duration::from_millis(self.config.poll_interval_ms);
        let backoff = Duration::from_millis(self.config.retry_backoff_ms);
        let mut failures: u32 = 0;
        info!("listening loop started");

        while !running.is_cancelled() {
            self.announce();

            let heard = tokio::select! {
                () = running.cancelled() => break,
                heard = self.input.listen_once() => heard,
            };

            let pause = match heard {
                Ok(Some(utterance)) => {
                    failures = 0;
                    self.forward(&utterance).await;
                    poll
                }
                Ok(None) => {
                    failures = 0;
                    poll
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let err = AssistantError::Input(e.to_string());
                    if failures == 1 {
                        warn!("{err}, retrying in {backoff:?}");
                    } else {
                        debug!("{err} ({failures} in a row)");
                    }
                    backoff
                }
            };

            tokio::select! {
                () = running.cancelled() => break,
                () = tokio::time::sleep(pause) => {}
            }
        }
        info!("listening loop stopped");
    }

    /// Emit the per-iteration status and mark the session as listening.
    fn announce(&self) {
        let events = self.orchestrator.events();
        if self.orchestrator.is_awake() {
            self.orchestrator
                .session()
                .transition(&[SessionState::Idle], SessionState::Listening);
            events.emit(CommandEvent::status("Listening..."));
        } else {
            events.emit(CommandEvent::status("Sleeping..."));
        }
    }

    async fn forward(&self, utterance: &str) {
        let utterance = utterance.trim();
        if utterance.is_empty() || !self.orchestrator.is_running() {
            return;
        }
        let text = if self.config.polish_transcripts {
            text::polish_transcript(utterance)
        } else {
            utterance.to_owned()
        };
        debug!("heard: {text}");
        // Leave Listening so the turn starts from a settled state.
        self.orchestrator
            .session()
            .transition(&[SessionState::Listening], SessionState::Idle);
        self.orchestrator
            .process_input(&text, InputSource::Voice)
            .await;
    }
}
