//! Contracts for the external collaborators the orchestrator drives.
//!
//! Recognition, synthesis, intent classification and the content backends
//! all live outside this crate. The core only knows these call/response
//! shapes. Every method may fail; failures are contained by the caller.

use crate::speech::SpeechJob;
use async_trait::async_trait;
use std::sync::Arc;

/// Turns captured audio into text.
#[async_trait]
pub trait SpeechInput: Send + Sync {
    /// Wait for one recognized utterance.
    ///
    /// May block for as long as nobody speaks. `Ok(None)` or an empty string
    /// means nothing was recognized. Errors are treated as transient.
    async fn listen_once(&self) -> anyhow::Result<Option<String>>;
}

/// Turns text into audio and plays it.
#[async_trait]
pub trait SpeechOutput: Send + Sync {
    /// Synthesize and play `job.text()`.
    ///
    /// Implementations should check [`SpeechJob::is_cancelled`] between
    /// synthesis and playback and while playing. Temporary audio should be
    /// written to [`SpeechJob::scratch_path`], which the controller deletes
    /// once the job ends.
    async fn synthesize_and_play(&self, job: &SpeechJob) -> anyhow::Result<()>;
}

/// The external "decision maker".
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    /// Return an opaque category label for the utterance.
    async fn classify(&self, text: &str) -> anyhow::Result<String>;
}

/// General conversation.
#[async_trait]
pub trait ChatHandler: Send + Sync {
    /// Produce a conversational reply.
    async fn chat(&self, text: &str) -> anyhow::Result<String>;
}

/// Real-time web search summarization.
#[async_trait]
pub trait SearchHandler: Send + Sync {
    /// Search and summarize.
    async fn search(&self, text: &str) -> anyhow::Result<String>;
}

/// Desktop and browser automation.
#[async_trait]
pub trait AutomationHandler: Send + Sync {
    /// Execute a canonical command such as `open notepad`.
    ///
    /// Returns `false` when the command could not be carried out.
    async fn automate(&self, command: &str) -> anyhow::Result<bool>;
}

/// Image generation.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Generate an image for the prompt.
    async fn generate_image(&self, prompt: &str) -> anyhow::Result<()>;
}

/// Microphone level source for the volume sampler.
pub trait VolumeSource: Send + Sync {
    /// Current level in `[0, 1]`.
    fn sample_level(&self) -> anyhow::Result<f32>;
}

/// Everything the orchestrator needs to execute commands and speak.
#[derive(Clone)]
pub struct Backends {
    pub classifier: Arc<dyn IntentClassifier>,
    pub chat: Arc<dyn ChatHandler>,
    pub search: Arc<dyn SearchHandler>,
    pub automation: Arc<dyn AutomationHandler>,
    pub images: Arc<dyn ImageGenerator>,
    pub speech: Arc<dyn SpeechOutput>,
}
