//! Single-flight speech output.
//!
//! [`SpeechController`] owns at most one live [`SpeechJob`]. Starting a new
//! job cancels the previous one and waits a bounded grace period for it to
//! wind down, so two responses never play over each other. Each job runs on
//! its own tokio task; `speak` returns as soon as the job is spawned.
//!
//! Cancellation is cooperative. The job checks its token before playback,
//! races playback against it, and checks it again at completion.

mod scratch;

pub use scratch::ScratchAudio;

use crate::backend::SpeechOutput;
use crate::error::AssistantError;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One speak operation.
#[derive(Debug, Clone)]
pub struct SpeechJob {
    id: u64,
    text: String,
    cancel: CancellationToken,
    scratch_path: PathBuf,
}

impl SpeechJob {
    /// Monotonic job identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Text to speak.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether the job has been superseded or stopped.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token for collaborators that prefer to `select!` on cancellation.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Scratch location for synthesized audio. Deleted when the job ends.
    pub fn scratch_path(&self) -> &Path {
        &self.scratch_path
    }
}

/// How a speech job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechOutcome {
    /// Played to the end.
    Completed,
    /// Cancelled while synthesizing or playing.
    Interrupted,
    /// Cancelled before playback began.
    Skipped,
    /// The synthesis collaborator failed.
    Failed(String),
}

struct LiveJob {
    id: u64,
    cancel: CancellationToken,
    handle: JoinHandle<SpeechOutcome>,
}

/// Speaking flag shared between the controller and its job tasks.
struct SpeakingState {
    speaking: AtomicBool,
    /// Id of the job allowed to clear the flag.
    owner: Mutex<u64>,
    tx: watch::Sender<bool>,
}

impl SpeakingState {
    fn begin(&self, id: u64) {
        let mut owner = self.owner.lock().unwrap_or_else(|e| e.into_inner());
        *owner = id;
        self.speaking.store(true, Ordering::Release);
        self.tx.send_replace(true);
    }

    fn finish(&self, id: u64) {
        let owner = self.owner.lock().unwrap_or_else(|e| e.into_inner());
        if *owner == id {
            self.speaking.store(false, Ordering::Release);
            self.tx.send_replace(false);
        }
    }
}

/// Clears the speaking flag however the job task exits, including abort.
struct FinishGuard {
    state: Arc<SpeakingState>,
    id: u64,
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.state.finish(self.id);
    }
}

/// Owns the live speech job.
pub struct SpeechController {
    output: Arc<dyn SpeechOutput>,
    grace_period: Duration,
    scratch_dir: PathBuf,
    next_id: AtomicU64,
    state: Arc<SpeakingState>,
    live: Mutex<Option<LiveJob>>,
    /// Serializes job switches so two concurrent `speak` calls cannot both start.
    switch: tokio::sync::Mutex<()>,
    closed: AtomicBool,
}

impl SpeechController {
    /// Create a controller around a synthesis collaborator.
    pub fn new(output: Arc<dyn SpeechOutput>, grace_period: Duration, scratch_dir: PathBuf) -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            output,
            grace_period,
            scratch_dir,
            next_id: AtomicU64::new(0),
            state: Arc::new(SpeakingState {
                speaking: AtomicBool::new(false),
                owner: Mutex::new(0),
                tx,
            }),
            live: Mutex::new(None),
            switch: tokio::sync::Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    /// Start speaking `text`, replacing whatever is playing.
    ///
    /// Waits at most the grace period for the previous job to stop, then
    /// aborts it. Blank text is ignored. After [`shutdown`](Self::shutdown)
    /// this does nothing.
    pub async fn speak(&self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            debug!("ignoring empty speech request");
            return;
        }

        let _switch = self.switch.lock().await;
        if self.closed.load(Ordering::Acquire) {
            debug!("speech controller closed, dropping: {text}");
            return;
        }

        let previous = self.lock_live().take();
        if let Some(previous) = previous {
            self.retire(previous).await;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = CancellationToken::new();
        let job = SpeechJob {
            id,
            text: text.to_owned(),
            cancel: cancel.clone(),
            scratch_path: self
                .scratch_dir
                .join(format!("speech_{}.audio", uuid::Uuid::new_v4())),
        };

        self.state.begin(id);
        let preview: String = text.chars().take(50).collect();
        info!("speech job {id} started: {preview}");
        let handle = tokio::spawn(run_job(
            Arc::clone(&self.output),
            Arc::clone(&self.state),
            job,
        ));
        *self.lock_live() = Some(LiveJob { id, cancel, handle });
    }

    /// Cancel the live job. Idempotent; a no-op when nothing is speaking.
    pub fn stop(&self) {
        if let Some(live) = self.lock_live().as_ref() {
            if !live.cancel.is_cancelled() && !live.handle.is_finished() {
                info!("stopping speech job {}", live.id);
            }
            live.cancel.cancel();
        }
    }

    /// Whether a job currently holds the speaking flag.
    pub fn is_speaking(&self) -> bool {
        self.state.speaking.load(Ordering::Acquire)
    }

    /// Watch the speaking flag.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.tx.subscribe()
    }

    /// Wait until nothing is speaking. Returns `false` on timeout.
    pub async fn wait_until_silent(&self, timeout: Duration) -> bool {
        let mut rx = self.subscribe();
        matches!(
            tokio::time::timeout(timeout, rx.wait_for(|speaking| !*speaking)).await,
            Ok(Ok(_))
        )
    }

    /// Stop the live job, refuse further requests and wait for the job task.
    pub async fn shutdown(&self, timeout: Duration) {
        let _switch = self.switch.lock().await;
        self.closed.store(true, Ordering::Release);
        let live = self.lock_live().take();
        if let Some(live) = live {
            live.cancel.cancel();
            let mut handle = live.handle;
            if tokio::time::timeout(timeout, &mut handle).await.is_err() {
                warn!("speech job {} still running after shutdown, aborting", live.id);
                handle.abort();
            }
        }
    }

    /// Cancel a superseded job and give it the grace period to finish.
    async fn retire(&self, previous: LiveJob) {
        previous.cancel.cancel();
        let mut handle = previous.handle;
        if handle.is_finished() {
            return;
        }
        match tokio::time::timeout(self.grace_period, &mut handle).await {
            Ok(Ok(outcome)) => debug!("speech job {} ended: {outcome:?}", previous.id),
            Ok(Err(e)) => warn!("speech job {} panicked: {e}", previous.id),
            Err(_) => {
                warn!(
                    "speech job {} ignored cancellation for {:?}, aborting",
                    previous.id, self.grace_period
                );
                handle.abort();
            }
        }
    }

    fn lock_live(&self) -> MutexGuard<'_, Option<LiveJob>> {
        self.live.lock().unwrap_or_else(|e| e.into_inner())
    }
}

async fn run_job(
    output: Arc<dyn SpeechOutput>,
    state: Arc<SpeakingState>,
    job: SpeechJob,
) -> SpeechOutcome {
    let _finish = FinishGuard {
        state,
        id: job.id,
    };
    let _scratch = ScratchAudio::prepare(job.scratch_path.clone());

    if job.is_cancelled() {
        debug!("speech job {} cancelled before playback", job.id);
        return SpeechOutcome::Skipped;
    }

    let cancel = job.cancel.clone();
    let outcome = tokio::select! {
        () = cancel.cancelled() => SpeechOutcome::Interrupted,
        result = output.synthesize_and_play(&job) => match result {
            Ok(()) if job.is_cancelled() => SpeechOutcome::Interrupted,
            Ok(()) => SpeechOutcome::Completed,
            Err(e) => {
                let err = AssistantError::Speech(e.to_string());
                warn!("speech job {} failed: {err}", job.id);
                SpeechOutcome::Failed(err.to_string())
            }
        },
    };
    debug!("speech job {} ended: {outcome:?}", job.id);
    outcome
}
