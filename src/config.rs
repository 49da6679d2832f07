//! Configuration types for the assistant.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration for the assistant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Assistant identity (display name and wake word).
    pub assistant: IdentityConfig,
    /// Speech output settings.
    pub speech: SpeechConfig,
    /// Listening loop settings.
    pub listening: ListeningConfig,
    /// Duplicate voice utterance suppression.
    pub debounce: DebounceConfig,
    /// Volume sampler settings.
    pub volume: VolumeConfig,
    /// Keyword tables for home/exit/sleep/wake/interrupt handling.
    pub phrases: PhraseConfig,
    /// Timeouts and channel sizes for the orchestrator.
    pub runtime: RuntimeConfig,
}

/// Assistant identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Display name used in acknowledgements.
    pub name: String,
    /// Bare wake word (case-insensitive). Saying it alone interrupts speech.
    pub wake_word: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            name: "Jarvis".to_owned(),
            wake_word: "jarvis".to_owned(),
        }
    }
}

/// Speech output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Voice identifier handed to the synthesis collaborator.
    pub voice: String,
    /// Input/output language tag.
    pub language: String,
    /// How long a new `speak` waits for the previous job to stop (ms).
    pub grace_period_ms: u64,
    /// Directory for per-job scratch audio files.
    pub scratch_dir: PathBuf,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            voice: "en-CA-LiamNeural".to_owned(),
            language: "en".to_owned(),
            grace_period_ms: 500,
            scratch_dir: std::env::temp_dir().join("jarvis-speech"),
        }
    }
}

impl SpeechConfig {
    /// Grace period as a [`Duration`].
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

/// Listening loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListeningConfig {
    /// Whether the listening loop is started at all.
    pub enabled: bool,
    /// Pause between successful iterations (ms).
    pub poll_interval_ms: u64,
    /// Pause after a failed `listen_once` call (ms).
    pub retry_backoff_ms: u64,
    /// Capitalise recognized text and add terminal punctuation.
    pub polish_transcripts: bool,
}

impl Default for ListeningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 100,
            retry_backoff_ms: 1000,
            polish_transcripts: true,
        }
    }
}

/// Duplicate voice utterance suppression.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceConfig {
    /// Window in which an identical voice utterance is dropped (ms).
    pub window_ms: u64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self { window_ms: 2000 }
    }
}

/// Volume sampler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeConfig {
    /// Whether the sampler runs.
    pub enabled: bool,
    /// Polling interval (ms). 50 ms gives 20 samples per second.
    pub poll_interval_ms: u64,
    /// Weight of the newest microphone sample in the smoothed level (0.0–1.0).
    ///
    /// 1.0 disables smoothing.
    pub smoothing: f32,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 50,
            smoothing: 0.3,
        }
    }
}

/// Keyword tables for the session-level directives.
///
/// Matching is case-insensitive and ignores punctuation. `home`, `exit` and
/// `interrupt` phrases must match the whole utterance; `sleep` and `wake`
/// phrases match anywhere on word boundaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhraseConfig {
    /// Navigate the presentation layer home.
    pub home: Vec<String>,
    /// Quit the assistant.
    pub exit: Vec<String>,
    /// Put the assistant to sleep.
    pub sleep: Vec<String>,
    /// Wake the assistant.
    pub wake: Vec<String>,
    /// Stop speech output. The bare wake word is always included.
    pub interrupt: Vec<String>,
    /// Longest utterance (in words) that still counts as a wake-word interruption
    /// when it starts with the wake word.
    pub max_wake_prefix_words: usize,
}

impl Default for PhraseConfig {
    fn default() -> Self {
        fn owned(list: &[&str]) -> Vec<String> {
            list.iter().map(|s| (*s).to_owned()).collect()
        }
        Self {
            home: owned(&["go home", "home"]),
            exit: owned(&["bye", "goodbye", "exit", "quit", "close"]),
            // "slip" and "flip" are frequent recognizer errors for "sleep".
            sleep: owned(&[
                "sleep jarvis",
                "jarvis sleep",
                "go to sleep",
                "sleep",
                "slip jarvis",
                "jarvis slip",
                "slip",
                "flip jarvis",
                "jarvis flip",
                "flip",
                "sleep please",
                "slip please",
                "flip please",
            ]),
            wake: owned(&[
                "wake up jarvis",
                "jarvis wake up",
                "wake up",
                "wake",
                "wake jarvis",
                "jarvis wake",
                "wake up please",
                "wake please",
                "get up jarvis",
                "jarvis get up",
                "get up",
                "rise jarvis",
                "jarvis rise",
                "rise",
            ]),
            interrupt: owned(&["stop", "halt", "pause", "shut up", "assistant"]),
            max_wake_prefix_words: 3,
        }
    }
}

/// Orchestrator runtime limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Upper bound for one classify + dispatch round (seconds).
    pub handler_timeout_secs: u64,
    /// How long shutdown waits for each background task (ms).
    pub shutdown_timeout_ms: u64,
    /// Buffered events per listener before slow listeners start lagging.
    pub event_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            handler_timeout_secs: 60,
            shutdown_timeout_ms: 1000,
            event_capacity: 256,
        }
    }
}

impl RuntimeConfig {
    /// Handler timeout as a [`Duration`].
    pub fn handler_timeout(&self) -> Duration {
        Duration::from_secs(self.handler_timeout_secs)
    }

    /// Shutdown join timeout as a [`Duration`].
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl AssistantConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::AssistantError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Serialize the configuration as pretty TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> crate::error::Result<String> {
        toml::to_string_pretty(self).map_err(|e| crate::error::AssistantError::Config(e.to_string()))
    }

    /// Returns the default config file path: `~/.config/jarvis/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("jarvis").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("jarvis")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/jarvis-config/config.toml")
        }
    }
}
