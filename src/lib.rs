//! Jarvis: orchestration core for a voice and text assistant.
//!
//! Speech recognition, synthesis, intent classification and the content
//! backends are external collaborators behind the traits in [`backend`].
//! This crate decides when they run relative to each other:
//!
//! - **Orchestrator**: serialized command handling, sleep/wake, exit and
//!   interruption, event emission ([`orchestrator`])
//! - **Speech output**: single-flight playback with cooperative
//!   cancellation ([`speech`])
//! - **Listening loop**: continuous capture forwarded as voice input
//!   ([`listener`]), filtered by the [`debounce`] guard
//! - **Dispatch**: classifier labels refined into one handler call, with
//!   canonical automation commands ([`dispatch`])
//! - **Volume sampler**: level samples for visualizers ([`volume`])
//!
//! Everything observable leaves through [`CommandEvent`]s on the
//! orchestrator's event bus.

pub mod backend;
pub mod config;
pub mod console;
pub mod debounce;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod listener;
pub mod orchestrator;
pub mod phrases;
pub mod speech;
pub mod supervisor;
pub mod text;
pub mod volume;

pub use backend::Backends;
pub use config::AssistantConfig;
pub use dispatch::{Category, CommandDispatcher, DispatchOutcome};
pub use error::{AssistantError, Result};
pub use events::{CommandEvent, EventBus, InputSource, SessionState, Utterance};
pub use orchestrator::Orchestrator;
pub use speech::{SpeechController, SpeechJob, SpeechOutcome};
pub use volume::VolumeFeed;
