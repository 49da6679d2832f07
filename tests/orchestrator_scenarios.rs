//! End-to-end scenarios for the session controller.
//!
//! Every collaborator is a mock; the tests drive `process_input` directly or
//! through the listening loop and assert on the emitted event stream.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use async_trait::async_trait;
use jarvis::backend::{
    AutomationHandler, Backends, ChatHandler, ImageGenerator, IntentClassifier, SearchHandler,
    SpeechInput, SpeechOutput,
};
use jarvis::listener::ListeningLoop;
use jarvis::{
    AssistantConfig, CommandEvent, InputSource, Orchestrator, SessionState, SpeechJob, VolumeFeed,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Mocks
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Recorder {
    automation: Mutex<Vec<String>>,
    chat_log: Mutex<Vec<String>>,
    spoken: Mutex<Vec<String>>,
    chat_delay: Option<Duration>,
}

impl Recorder {
    fn automation(&self) -> Vec<String> {
        self.automation.lock().unwrap().clone()
    }
    fn chat_log(&self) -> Vec<String> {
        self.chat_log.lock().unwrap().clone()
    }
}

#[async_trait]
impl IntentClassifier for Recorder {
    async fn classify(&self, text: &str) -> anyhow::Result<String> {
        if text.to_lowercase().contains("open") {
            Ok("open".into())
        } else {
            Ok("general".into())
        }
    }
}

#[async_trait]
impl ChatHandler for Recorder {
    async fn chat(&self, text: &str) -> anyhow::Result<String> {
        if text.contains("explode") {
            anyhow::bail!("backend exploded");
        }
        self.chat_log.lock().unwrap().push(format!("start:{text}"));
        if let Some(delay) = self.chat_delay {
            tokio::time::sleep(delay).await;
        }
        self.chat_log.lock().unwrap().push(format!("end:{text}"));
        Ok(format!("answer to {text}"))
    }
}

#[async_trait]
impl SearchHandler for Recorder {
    async fn search(&self, text: &str) -> anyhow::Result<String> {
        Ok(format!("results for {text}"))
    }
}

#[async_trait]
impl AutomationHandler for Recorder {
    async fn automate(&self, command: &str) -> anyhow::Result<bool> {
        self.automation.lock().unwrap().push(command.to_owned());
        Ok(true)
    }
}

#[async_trait]
impl ImageGenerator for Recorder {
    async fn generate_image(&self, _prompt: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl SpeechOutput for Recorder {
    async fn synthesize_and_play(&self, job: &SpeechJob) -> anyhow::Result<()> {
        self.spoken.lock().unwrap().push(job.text().to_owned());
        tokio::select! {
            () = job.cancellation_token().cancelled() => {}
            () = tokio::time::sleep(Duration::from_millis(20)) => {}
        }
        Ok(())
    }
}

/// Replays scripted `listen_once` results, then blocks forever.
struct ScriptedInput {
    script: Mutex<VecDeque<anyhow::Result<Option<String>>>>,
    calls: Mutex<usize>,
}

impl ScriptedInput {
    fn new(script: Vec<anyhow::Result<Option<String>>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(0),
        }
    }
    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl SpeechInput for ScriptedInput {
    async fn listen_once(&self) -> anyhow::Result<Option<String>> {
        *self.calls.lock().unwrap() += 1;
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn test_config() -> AssistantConfig {
    let mut config = AssistantConfig::default();
    config.speech.scratch_dir = std::env::temp_dir().join("jarvis-scenario-tests");
    config.speech.grace_period_ms = 100;
    config.runtime.handler_timeout_secs = 5;
    config.runtime.shutdown_timeout_ms = 500;
    config
}

fn build(recorder: &Arc<Recorder>, config: AssistantConfig) -> Arc<Orchestrator> {
    Orchestrator::new(
        config,
        Backends {
            classifier: recorder.clone(),
            chat: recorder.clone(),
            search: recorder.clone(),
            automation: recorder.clone(),
            images: recorder.clone(),
            speech: recorder.clone(),
        },
    )
}

fn drain(rx: &mut broadcast::Receiver<CommandEvent>) -> Vec<CommandEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

fn chat_responses(events: &[CommandEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, CommandEvent::ChatResponse(_)))
        .count()
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// ---------------------------------------------------------------------------
// Dispatch scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn open_notepad_reaches_automation() {
    let recorder = Arc::new(Recorder::default());
    let o = build(&recorder, test_config());
    let mut rx = o.subscribe();

    o.process_input("open notepad", InputSource::Text).await;

    assert_eq!(recorder.automation(), vec!["open notepad"]);
    let events = drain(&mut rx);
    assert!(events.contains(&CommandEvent::status("Automating...")));
    assert!(events.contains(&CommandEvent::ChatResponse(
        "Automation task completed: open notepad".into()
    )));
    assert_eq!(events.last(), Some(&CommandEvent::status("Available...")));
}

#[tokio::test]
async fn close_youtube_with_fillers_is_canonical() {
    let recorder = Arc::new(Recorder::default());
    let o = build(&recorder, test_config());

    o.process_input("close youtube", InputSource::Text).await;
    o.process_input("can you close youtube please", InputSource::Text).await;

    assert_eq!(recorder.automation(), vec!["close youtube", "close youtube"]);
}

// ---------------------------------------------------------------------------
// Sleep / wake / exit
// ---------------------------------------------------------------------------

#[tokio::test]
async fn asleep_session_only_acknowledges_sleep_and_wake() {
    let recorder = Arc::new(Recorder::default());
    let o = build(&recorder, test_config());
    let mut rx = o.subscribe();

    o.process_input("sleep jarvis", InputSource::Text).await;
    assert_eq!(o.session_state(), SessionState::Sleeping);
    o.process_input("open notepad", InputSource::Text).await;
    o.process_input("wake up jarvis", InputSource::Text).await;

    let events = drain(&mut rx);
    assert_eq!(chat_responses(&events), 2);
    assert!(recorder.automation().is_empty());
    assert!(o.is_awake());
    assert_eq!(o.session_state(), SessionState::Idle);
}

#[tokio::test]
async fn asleep_input_is_silent_and_changes_nothing() {
    let recorder = Arc::new(Recorder::default());
    let o = build(&recorder, test_config());
    o.process_input("go to sleep", InputSource::Text).await;
    let mut rx = o.subscribe();

    for input in ["what time is it", "stop", "jarvis", "open notepad"] {
        o.process_input(input, InputSource::Voice).await;
        o.process_input(input, InputSource::Text).await;
    }
    o.process_input("sleep", InputSource::Text).await;

    assert!(drain(&mut rx).is_empty());
    assert_eq!(o.session_state(), SessionState::Sleeping);
    assert!(!o.is_awake());
}

#[tokio::test]
async fn wake_phrase_while_awake_is_silent() {
    let recorder = Arc::new(Recorder::default());
    let o = build(&recorder, test_config());
    let mut rx = o.subscribe();
    o.process_input("wake up", InputSource::Text).await;
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn bye_runs_exit_sequence_exactly() {
    let recorder = Arc::new(Recorder::default());
    let o = build(&recorder, test_config());
    let mut rx = o.subscribe();

    o.process_input("Bye", InputSource::Text).await;

    let events = drain(&mut rx);
    assert_eq!(events.len(), 3, "{events:?}");
    assert!(matches!(events[0], CommandEvent::ChatResponse(_)));
    assert_eq!(events[1], CommandEvent::status("Closing..."));
    assert_eq!(events[2], CommandEvent::ExitRequested);
    assert!(!o.is_running());

    o.process_input("open notepad", InputSource::Text).await;
    assert!(drain(&mut rx).is_empty());
    assert!(recorder.automation().is_empty());
}

#[tokio::test]
async fn spoken_bye_ends_the_listening_loop() {
    let recorder = Arc::new(Recorder::default());
    let o = build(&recorder, test_config());
    let mut rx = o.subscribe();

    let input = Arc::new(ScriptedInput::new(vec![Ok(Some("bye".into()))]));
    let listener = tokio::spawn(ListeningLoop::new(Arc::clone(&o), input.clone()).run());

    tokio::time::timeout(Duration::from_secs(1), listener)
        .await
        .expect("listening loop kept running after exit")
        .unwrap();
    assert!(!o.is_running());
    assert_eq!(input.calls(), 1);

    let events = drain(&mut rx);
    assert!(events.contains(&CommandEvent::VoiceInputEcho("Bye.".into())));
    assert_eq!(events.last(), Some(&CommandEvent::ExitRequested));
}

#[tokio::test]
async fn go_home_emits_only_home_request() {
    let recorder = Arc::new(Recorder::default());
    let o = build(&recorder, test_config());
    let mut rx = o.subscribe();
    o.process_input("  Go Home ", InputSource::Text).await;
    assert_eq!(drain(&mut rx), vec![CommandEvent::GoHomeRequested]);
}

#[tokio::test]
async fn wake_word_then_stop_only_interrupts() {
    let recorder = Arc::new(Recorder::default());
    let o = build(&recorder, test_config());
    let mut rx = o.subscribe();

    for phrase in ["Jarvis, stop", "jarvis pause"] {
        o.process_input(phrase, InputSource::Text).await;
        assert_eq!(
            drain(&mut rx),
            vec![CommandEvent::status("Stopped by user")],
            "{phrase}"
        );
    }

    o.process_input("Jarvis, stop", InputSource::Voice).await;
    assert_eq!(
        drain(&mut rx),
        vec![
            CommandEvent::VoiceInputEcho("Jarvis, stop".into()),
            CommandEvent::status("Stopped by user"),
        ]
    );
    assert!(recorder.automation().is_empty());
    assert!(recorder.chat_log().is_empty());
    assert_eq!(o.session_state(), SessionState::Idle);
}

// ---------------------------------------------------------------------------
// Failure containment
// ---------------------------------------------------------------------------

#[tokio::test]
async fn handler_failure_emits_one_error_and_recovers() {
    let recorder = Arc::new(Recorder::default());
    let o = build(&recorder, test_config());
    let mut rx = o.subscribe();

    o.process_input("please explode", InputSource::Text).await;
    let events = drain(&mut rx);
    let errors = events
        .iter()
        .filter(|e| matches!(e, CommandEvent::Error(_)))
        .count();
    assert_eq!(errors, 1, "{events:?}");
    assert_eq!(chat_responses(&events), 0);
    assert_eq!(o.session_state(), SessionState::Idle);

    let next = tokio::time::timeout(
        Duration::from_secs(1),
        o.process_input("how are you", InputSource::Text),
    )
    .await;
    assert!(next.is_ok(), "controller stuck after failure");
    assert!(drain(&mut rx).contains(&CommandEvent::ChatResponse("answer to how are you".into())));
}

#[tokio::test]
async fn state_is_settled_after_every_call() {
    let recorder = Arc::new(Recorder::default());
    let o = build(&recorder, test_config());
    let inputs = [
        ("hello", InputSource::Voice),
        ("open notepad", InputSource::Text),
        ("please explode", InputSource::Text),
        ("sleep jarvis", InputSource::Voice),
        ("tell me a joke", InputSource::Text),
        ("wake up jarvis", InputSource::Voice),
        ("stop", InputSource::Text),
        ("jarvis what time", InputSource::Voice),
        ("hello", InputSource::Voice),
    ];
    for (text, source) in inputs {
        o.process_input(text, source).await;
        let state = o.session_state();
        assert!(
            matches!(state, SessionState::Idle | SessionState::Sleeping),
            "state {state:?} after {text:?}"
        );
    }
}

// ---------------------------------------------------------------------------
// Debounce
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_voice_input_is_silent_within_window() {
    let recorder = Arc::new(Recorder::default());
    let mut config = test_config();
    config.debounce.window_ms = 150;
    let o = build(&recorder, config);
    let mut rx = o.subscribe();

    o.process_input("tell me a joke", InputSource::Voice).await;
    assert!(!drain(&mut rx).is_empty());

    o.process_input("Tell me a joke", InputSource::Voice).await;
    assert!(drain(&mut rx).is_empty());

    tokio::time::sleep(Duration::from_millis(200)).await;
    o.process_input("tell me a joke", InputSource::Voice).await;
    let events = drain(&mut rx);
    assert_eq!(events[0], CommandEvent::VoiceInputEcho("tell me a joke".into()));
    assert_eq!(chat_responses(&events), 1);
}

#[tokio::test]
async fn queued_duplicate_is_debounced_by_arrival_time() {
    let recorder = Arc::new(Recorder {
        chat_delay: Some(Duration::from_millis(200)),
        ..Default::default()
    });
    let mut config = test_config();
    config.debounce.window_ms = 100;
    let o = build(&recorder, config);

    let first = {
        let o = Arc::clone(&o);
        tokio::spawn(async move { o.process_input("tell me a joke", InputSource::Voice).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    // Arrives inside the window but only gets the turn after the first
    // reply, well past it.
    let second = {
        let o = Arc::clone(&o);
        tokio::spawn(async move { o.process_input("tell me a joke", InputSource::Voice).await })
    };
    first.await.unwrap();
    second.await.unwrap();

    assert_eq!(
        recorder.chat_log(),
        vec!["start:tell me a joke", "end:tell me a joke"]
    );
}

#[tokio::test]
async fn typed_duplicates_are_never_debounced() {
    let recorder = Arc::new(Recorder::default());
    let o = build(&recorder, test_config());
    o.process_input("open notepad", InputSource::Text).await;
    o.process_input("open notepad", InputSource::Text).await;
    assert_eq!(recorder.automation().len(), 2);
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_voice_and_text_do_not_interleave() {
    let recorder = Arc::new(Recorder {
        chat_delay: Some(Duration::from_millis(40)),
        ..Default::default()
    });
    let o = build(&recorder, test_config());

    let voice = {
        let o = Arc::clone(&o);
        tokio::spawn(async move { o.process_input("first question", InputSource::Voice).await })
    };
    let text = {
        let o = Arc::clone(&o);
        tokio::spawn(async move { o.process_input("second question", InputSource::Text).await })
    };
    voice.await.unwrap();
    text.await.unwrap();

    let log = recorder.chat_log();
    assert_eq!(log.len(), 4, "{log:?}");
    for pair in log.chunks(2) {
        let started = pair[0].strip_prefix("start:").unwrap();
        assert_eq!(pair[1], format!("end:{started}"), "interleaved: {log:?}");
    }
}

// ---------------------------------------------------------------------------
// Listening loop
// ---------------------------------------------------------------------------

#[tokio::test]
async fn listening_loop_forwards_polished_voice_and_survives_errors() {
    let recorder = Arc::new(Recorder::default());
    let mut config = test_config();
    config.listening.poll_interval_ms = 5;
    config.listening.retry_backoff_ms = 10;
    let o = build(&recorder, config);
    let mut rx = o.subscribe();

    let input = Arc::new(ScriptedInput::new(vec![
        Ok(None),
        Ok(Some("open notepad".into())),
        Err(anyhow::anyhow!("microphone unplugged")),
        Ok(Some("open notepad".into())),
    ]));
    o.start(Some(input.clone()), VolumeFeed::Disabled).unwrap();

    wait_until(|| input.calls() >= 5).await;
    assert_eq!(recorder.automation(), vec!["open notepad"]);

    let events = drain(&mut rx);
    assert!(events.contains(&CommandEvent::status("Listening...")));
    assert!(events.contains(&CommandEvent::VoiceInputEcho("Open notepad.".into())));
    assert!(!events.iter().any(|e| matches!(e, CommandEvent::Error(_))));

    o.shutdown().await;
    assert!(!o.is_running());
}

#[tokio::test]
async fn listening_loop_exits_on_cancel_while_listen_blocks() {
    let recorder = Arc::new(Recorder::default());
    let o = build(&recorder, test_config());

    let input = Arc::new(ScriptedInput::new(vec![]));
    let listener = tokio::spawn(ListeningLoop::new(Arc::clone(&o), input.clone()).run());
    wait_until(|| input.calls() == 1).await;

    o.running_token().cancel();
    tokio::time::timeout(Duration::from_millis(200), listener)
        .await
        .expect("listening loop ignored cancellation")
        .unwrap();
}

#[tokio::test]
async fn typed_directive_settles_state_while_listening() {
    for phrase in ["go home", "wake up", "stop"] {
        let recorder = Arc::new(Recorder::default());
        let o = build(&recorder, test_config());
        let input = Arc::new(ScriptedInput::new(vec![]));
        o.start(Some(input.clone()), VolumeFeed::Disabled).unwrap();
        wait_until(|| o.session_state() == SessionState::Listening).await;

        o.process_input(phrase, InputSource::Text).await;
        assert_eq!(o.session_state(), SessionState::Idle, "after {phrase:?}");

        o.shutdown().await;
    }
}

#[tokio::test]
async fn listening_loop_reports_sleep_and_honours_wake() {
    let recorder = Arc::new(Recorder::default());
    let mut config = test_config();
    config.listening.poll_interval_ms = 5;
    let o = build(&recorder, config);
    o.process_input("go to sleep", InputSource::Text).await;
    let mut rx = o.subscribe();

    let input = Arc::new(ScriptedInput::new(vec![
        Ok(Some("open notepad".into())),
        Ok(Some("wake up jarvis".into())),
    ]));
    o.start(Some(input.clone()), VolumeFeed::Disabled).unwrap();

    wait_until(|| o.is_awake()).await;
    wait_until(|| input.calls() >= 3).await;
    assert!(recorder.automation().is_empty());

    let events = drain(&mut rx);
    assert!(events.contains(&CommandEvent::status("Sleeping...")));
    assert!(events.contains(&CommandEvent::status("Awake and ready...")));
    assert!(!events.contains(&CommandEvent::VoiceInputEcho("Open notepad.".into())));

    o.shutdown().await;
}

#[tokio::test]
async fn synthetic_volume_samples_flow_until_shutdown() {
    let recorder = Arc::new(Recorder::default());
    let mut config = test_config();
    config.volume.poll_interval_ms = 5;
    let o = build(&recorder, config);
    let mut rx = o.subscribe();
    o.start(None, VolumeFeed::Synthetic).unwrap();

    let sample = tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            if let CommandEvent::VolumeSample(level) = rx.recv().await.unwrap() {
                break level;
            }
        }
    })
    .await
    .unwrap();
    assert!((0.0..=1.0).contains(&sample));

    o.shutdown().await;
}
