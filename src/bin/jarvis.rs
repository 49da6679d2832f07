//! CLI binary for jarvis.

use clap::{Parser, Subcommand};
use jarvis::console::{StdinSpeechInput, demo_backends};
use jarvis::{AssistantConfig, CommandEvent, InputSource, Orchestrator, VolumeFeed};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Jarvis: voice and text assistant orchestration core.
#[derive(Parser)]
#[command(name = "jarvis", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Start an interactive session on the terminal.
    Run {
        /// Treat stdin lines as recognized speech (debounced, polished)
        /// instead of typed text.
        #[arg(long)]
        voice: bool,

        /// Delay between spoken words in milliseconds.
        #[arg(long, default_value_t = 120)]
        word_delay_ms: u64,
    },

    /// Print the effective configuration as TOML.
    PrintConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they never interleave with console speech.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("jarvis=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => AssistantConfig::from_file(path)?,
        None => {
            let default_path = AssistantConfig::default_config_path();
            if default_path.is_file() {
                AssistantConfig::from_file(&default_path)?
            } else {
                AssistantConfig::default()
            }
        }
    };

    match cli.command.unwrap_or(Command::Run {
        voice: false,
        word_delay_ms: 120,
    }) {
        Command::Run {
            voice,
            word_delay_ms,
        } => run(config, voice, Duration::from_millis(word_delay_ms)).await,
        Command::PrintConfig => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

async fn run(config: AssistantConfig, voice: bool, word_delay: Duration) -> anyhow::Result<()> {
    println!("Jarvis v{}", env!("CARGO_PKG_VERSION"));
    let wake_word = config.assistant.wake_word.clone();

    let orchestrator = Orchestrator::new(config, demo_backends(word_delay));
    let printer = tokio::spawn(print_events(orchestrator.subscribe()));
    let running = orchestrator.running_token();

    // Handle Ctrl+C
    let ctrl_c = running.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, shutting down...");
            ctrl_c.cancel();
        }
    });

    println!(
        "\nType a command. Say \"sleep {wake_word}\" / \"wake up {wake_word}\", \"stop\" to interrupt, \"bye\" to quit.\n"
    );

    if voice {
        let input = Arc::new(StdinSpeechInput::new());
        let closed = input.closed();
        orchestrator.start(Some(input), VolumeFeed::Disabled)?;
        tokio::select! {
            () = running.cancelled() => {}
            () = closed.cancelled() => info!("end of input"),
        }
    } else {
        orchestrator.start(None, VolumeFeed::Disabled)?;
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = tokio::select! {
                () = running.cancelled() => break,
                line = lines.next_line() => line?,
            };
            let Some(line) = line else {
                info!("end of input");
                break;
            };
            orchestrator.process_input(&line, InputSource::Text).await;
        }
    }

    // Let the last reply finish before tearing down.
    if orchestrator.is_running() {
        orchestrator
            .speech()
            .wait_until_silent(Duration::from_secs(10))
            .await;
    }
    orchestrator.shutdown().await;
    printer.abort();
    Ok(())
}

async fn print_events(mut rx: broadcast::Receiver<CommandEvent>) {
    loop {
        match rx.recv().await {
            Ok(CommandEvent::ChatResponse(text)) => println!("Jarvis: {text}"),
            Ok(CommandEvent::StatusUpdate(status)) => println!("  [{status}]"),
            Ok(CommandEvent::VoiceInputEcho(text)) => println!("You: {text}"),
            Ok(CommandEvent::Error(message)) => eprintln!("error: {message}"),
            Ok(CommandEvent::GoHomeRequested) => println!("  [home]"),
            Ok(CommandEvent::ExitRequested) => println!("  [exit]"),
            Ok(CommandEvent::VolumeSample(_)) => {}
            Err(broadcast::error::RecvError::Lagged(n)) => info!("event printer lagged by {n}"),
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
