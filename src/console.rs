//! Console collaborators for the `jarvis` binary.
//!
//! Lines typed on stdin stand in for recognized speech, "playback" prints
//! the reply word by word, and the handlers are keyword-driven stand-ins
//! for the real chat, search, automation and image backends. Enough to
//! drive the orchestrator end to end from a terminal.

use crate::backend::{
    AutomationHandler, Backends, ChatHandler, ImageGenerator, IntentClassifier, SearchHandler,
    SpeechInput, SpeechOutput,
};
use crate::speech::SpeechJob;
use crate::text;
use async_trait::async_trait;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Reads one utterance per stdin line.
///
/// End of input cancels [`closed`](Self::closed) and then blocks forever,
/// so the listening loop simply waits until the session is shut down.
pub struct StdinSpeechInput {
    lines: Mutex<Lines<BufReader<Stdin>>>,
    closed: CancellationToken,
}

impl StdinSpeechInput {
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
            closed: CancellationToken::new(),
        }
    }

    /// Cancelled once stdin reaches end of input.
    pub fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }
}

impl Default for StdinSpeechInput {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechInput for StdinSpeechInput {
    async fn listen_once(&self) -> anyhow::Result<Option<String>> {
        if self.closed.is_cancelled() {
            std::future::pending::<()>().await;
        }
        let mut lines = self.lines.lock().await;
        match lines.next_line().await? {
            Some(line) => Ok(Some(line)),
            None => {
                info!("stdin closed");
                self.closed.cancel();
                Ok(None)
            }
        }
    }
}

/// Prints spoken text one word at a time.
pub struct ConsoleSpeechOutput {
    word_delay: Duration,
}

impl ConsoleSpeechOutput {
    pub fn new(word_delay: Duration) -> Self {
        Self { word_delay }
    }
}

impl Default for ConsoleSpeechOutput {
    fn default() -> Self {
        Self::new(Duration::from_millis(120))
    }
}

#[async_trait]
impl SpeechOutput for ConsoleSpeechOutput {
    async fn synthesize_and_play(&self, job: &SpeechJob) -> anyhow::Result<()> {
        let mut out = std::io::stdout();
        write!(out, "  (speaking)")?;
        for word in job.text().split_whitespace() {
            if job.is_cancelled() {
                writeln!(out, " [interrupted]")?;
                out.flush()?;
                return Ok(());
            }
            write!(out, " {word}")?;
            out.flush()?;
            tokio::select! {
                () = job.cancellation_token().cancelled() => {}
                () = tokio::time::sleep(self.word_delay) => {}
            }
        }
        if job.is_cancelled() {
            writeln!(out, " [interrupted]")?;
        } else {
            writeln!(out)?;
        }
        out.flush()?;
        Ok(())
    }
}

/// Keyword classifier producing the same label vocabulary as the real one.
pub struct KeywordClassifier;

impl KeywordClassifier {
    /// Label for `text`.
    pub fn label(text: &str) -> &'static str {
        const EXIT: &[&str] = &["bye", "goodbye", "exit", "quit"];
        const REALTIME: &[&str] = &["news", "weather", "latest", "today", "who is", "search"];
        const AUTOMATION: &[&str] = &["open", "close", "play", "mute", "unmute", "volume"];
        const IMAGE: &[&str] = &["image", "picture", "photo"];

        if text::contains_any(text, EXIT) {
            "exit"
        } else if text::contains_any(text, IMAGE) {
            "generate image"
        } else if text::contains_any(text, AUTOMATION) {
            "automation"
        } else if text::contains_any(text, REALTIME) {
            "realtime"
        } else {
            "general"
        }
    }
}

#[async_trait]
impl IntentClassifier for KeywordClassifier {
    async fn classify(&self, text: &str) -> anyhow::Result<String> {
        Ok(Self::label(text).to_owned())
    }
}

/// Canned handlers that log what a real backend would have done.
pub struct DemoHandlers;

#[async_trait]
impl ChatHandler for DemoHandlers {
    async fn chat(&self, text: &str) -> anyhow::Result<String> {
        let folded = text::fold(text);
        let reply = if text::contains_any(&folded, &["hello", "hi", "hey"]) {
            "Hello! How can I help you today?".to_owned()
        } else if text::contains_phrase(&folded, "how are you") {
            "I'm running smoothly, thanks for asking.".to_owned()
        } else {
            format!("You said: {text}")
        };
        Ok(reply)
    }
}

#[async_trait]
impl SearchHandler for DemoHandlers {
    async fn search(&self, text: &str) -> anyhow::Result<String> {
        Ok(format!("I would search the web for \"{text}\", but I'm offline."))
    }
}

#[async_trait]
impl AutomationHandler for DemoHandlers {
    async fn automate(&self, command: &str) -> anyhow::Result<bool> {
        info!("automation: {command}");
        Ok(!command.ends_with("unknown"))
    }
}

#[async_trait]
impl ImageGenerator for DemoHandlers {
    async fn generate_image(&self, prompt: &str) -> anyhow::Result<()> {
        debug!("image generation requested: {prompt}");
        Ok(())
    }
}

/// Backends wired to the console collaborators.
pub fn demo_backends(word_delay: Duration) -> Backends {
    let handlers = Arc::new(DemoHandlers);
    Backends {
        classifier: Arc::new(KeywordClassifier),
        chat: handlers.clone(),
        search: handlers.clone(),
        automation: handlers.clone(),
        images: handlers,
        speech: Arc::new(ConsoleSpeechOutput::new(word_delay)),
    }
}
