//! Periodic volume sampling for presentation layers.
//!
//! The sampler publishes a [`CommandEvent::VolumeSample`] every tick. With a
//! real [`VolumeSource`] the level is smoothed; without one a synthetic level
//! is derived from the session state so a visualizer still has something to
//! draw. It never touches command execution.

use crate::backend::VolumeSource;
use crate::config::VolumeConfig;
use crate::error::AssistantError;
use crate::events::{CommandEvent, EventBus, SessionCell, SessionState};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Where the sampler gets its levels.
#[derive(Clone, Default)]
pub enum VolumeFeed {
    /// No sampler runs.
    #[default]
    Disabled,
    /// Levels derived from the session state.
    Synthetic,
    /// Levels polled from a microphone-level source.
    Source(Arc<dyn VolumeSource>),
}

/// Level in `[0, 1]` from raw audio samples: `min(1, rms * 10)`.
pub fn level_from_samples(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    let rms = (sum_sq / samples.len() as f32).sqrt();
    (rms * 10.0).min(1.0)
}

/// Exponential moving average over microphone levels.
#[derive(Debug, Clone)]
pub struct SmoothedLevel {
    weight: f32,
    current: f32,
}

impl SmoothedLevel {
    /// `weight` is the share of the newest sample, clamped to `(0, 1]`.
    pub fn new(weight: f32) -> Self {
        let weight = if weight.is_finite() { weight.clamp(0.01, 1.0) } else { 1.0 };
        Self {
            weight,
            current: 0.0,
        }
    }

    /// Fold in one sample and return the new level.
    pub fn update(&mut self, sample: f32) -> f32 {
        let sample = if sample.is_finite() { sample.clamp(0.0, 1.0) } else { 0.0 };
        self.current = self.current * (1.0 - self.weight) + sample * self.weight;
        self.current
    }

    pub fn current(&self) -> f32 {
        self.current
    }
}

/// Synthetic level for a session state; `jitter` is in `[0, 1)`.
pub fn synthetic_level(state: SessionState, jitter: f64) -> f32 {
    let (base, spread) = match state {
        SessionState::Sleeping => (0.02, 0.05),
        SessionState::Listening => (0.3, 0.4),
        SessionState::Speaking => (0.5, 0.4),
        SessionState::Idle | SessionState::Processing => (0.05, 0.1),
    };
    (base + spread * jitter).clamp(0.0, 1.0) as f32
}

/// Background volume publisher.
pub struct VolumeSampler {
    feed: VolumeFeed,
    interval: Duration,
    smoothing: f32,
    session: Arc<SessionCell>,
    events: EventBus,
}

impl VolumeSampler {
    pub fn new(
        config: &VolumeConfig,
        feed: VolumeFeed,
        session: Arc<SessionCell>,
        events: EventBus,
    ) -> Self {
        Self {
            feed,
            interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            smoothing: config.smoothing,
            session,
            events,
        }
    }

    /// Publish samples until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        if matches!(self.feed, VolumeFeed::Disabled) {
            return;
        }
        let mut smoothed = SmoothedLevel::new(self.smoothing);
        let mut tick = tokio::time::interval(self.interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut source_failing = false;

        debug!("volume sampler started ({:?})", self.interval);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = tick.tick() => {}
            }

            let level = match &self.feed {
                VolumeFeed::Disabled => break,
                VolumeFeed::Synthetic => {
                    synthetic_level(self.session.state(), rand::random::<f64>())
                }
                VolumeFeed::Source(source) => match source.sample_level() {
                    Ok(sample) => {
                        source_failing = false;
                        smoothed.update(sample)
                    }
                    Err(e) => {
                        // Log once per failure streak.
                        if !source_failing {
                            warn!("{}", AssistantError::Input(format!("volume source: {e}")));
                            source_failing = true;
                        }
                        smoothed.update(0.0)
                    }
                },
            };
            self.events.emit(CommandEvent::VolumeSample(level));
        }
        debug!("volume sampler stopped");
    }
}
