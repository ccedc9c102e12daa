//! Text console for zefira.
//!
//! Each stdin line is fed to the conversation as final recognized text.
//! Lines starting with `~` are fed as non-final text, to exercise the
//! turn-taking timers by hand.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::AsyncBufReadExt;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::LinesStream;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use zefira::llm::EchoBackend;
use zefira::speech::ChannelSpeechSource;
use zefira::toolkit::chat_manager::ChatManager;
use zefira::{
    ConversationCoordinator, DialogConfig, QueryEngine, RecognitionUpdate, SpeechSink,
    ToolkitStates,
};

/// Zefira: spoken-dialogue orchestration, driven from the terminal.
#[derive(Parser)]
#[command(name = "zefira-console", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Extra instruction line for the model (repeatable).
    #[arg(short, long)]
    instruction: Vec<String>,

    /// Silence after final text before querying, in milliseconds.
    #[arg(long)]
    final_silence_ms: Option<u64>,

    /// Idle time before the conversation ends, in milliseconds.
    #[arg(long)]
    idle_timeout_ms: Option<u64>,

    /// Do not load or save toolkit state.
    #[arg(long)]
    no_state: bool,

    /// Dump every request and reply as JSON under the data directory.
    #[arg(long)]
    debug_dump: bool,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Start a text conversation.
    Chat,

    /// Print the effective configuration as TOML.
    ShowConfig,

    /// Write the default configuration to the config path.
    InitConfig,
}

/// Prints assistant speech and notices to stdout.
struct ConsoleSink;

impl SpeechSink for ConsoleSink {
    fn speak(&self, text: &str, is_system_notice: bool) {
        if is_system_notice {
            println!("[{text}]");
        } else {
            println!("zefira> {text}");
        }
    }

    fn progress_tick(&self) {
        print!(".");
        let _ = std::io::stdout().flush();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("zefira=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Some(Command::ShowConfig) => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Some(Command::InitConfig) => {
            let path = cli
                .config
                .clone()
                .unwrap_or_else(DialogConfig::default_config_path);
            DialogConfig::default().save_to_file(&path)?;
            println!("Wrote {}", path.display());
            Ok(())
        }
        Some(Command::Chat) | None => run_chat(config, !cli.no_state).await,
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<DialogConfig> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(DialogConfig::default_config_path);
    let mut config = if path.exists() {
        DialogConfig::from_file(&path)
            .with_context(|| format!("loading config from {}", path.display()))?
    } else if cli.config.is_some() {
        anyhow::bail!("config file {} does not exist", path.display());
    } else {
        DialogConfig::default()
    };

    config.chat.instructions.extend(cli.instruction.iter().cloned());
    if let Some(ms) = cli.final_silence_ms {
        config.recognition.final_silence_ms = ms;
    }
    if let Some(ms) = cli.idle_timeout_ms {
        config.recognition.idle_timeout_ms = ms;
    }
    if cli.debug_dump {
        config.chat.debug_dump = true;
    }
    config.validate()?;
    Ok(config)
}

async fn run_chat(config: DialogConfig, persist: bool) -> anyhow::Result<()> {
    println!("Zefira v{}", env!("CARGO_PKG_VERSION"));

    let state_path = zefira::zefira_dirs::toolkit_state_file();
    let restored = if persist {
        load_toolkit_state(&state_path)
    } else {
        ToolkitStates::new()
    };

    let mut engine = QueryEngine::new(
        Arc::new(config),
        Arc::new(EchoBackend::default()),
        Arc::new(ConsoleSink),
    )
    .with_restored_state(restored);
    engine.add_toolkit(Box::new(ChatManager::new()))?;

    let (source, updates) = ChannelSpeechSource::new(16);
    let mut coordinator = ConversationCoordinator::new(engine, Box::new(source));
    let stop = coordinator.stop_handle();

    tokio::spawn(async move {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let mut lines = LinesStream::new(stdin.lines());
        while let Some(line) = lines.next().await {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!(error = %e, "failed to read stdin");
                    break;
                }
            };
            let update = match line.strip_prefix('~') {
                Some(partial) => RecognitionUpdate::partial(partial),
                None => RecognitionUpdate::final_text(line),
            };
            if updates.send(update).await.is_err() {
                break;
            }
        }
    });

    let stop_on_signal = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, shutting down...");
            stop_on_signal.cancel();
        }
    });

    println!("\nReady! Type to talk, prefix a line with ~ for partial text. Ctrl+C to quit.\n");

    coordinator.run().await?;

    if persist {
        let states = coordinator.engine_mut().serialize_toolkits().await?;
        save_toolkit_state(&state_path, &states)?;
    }
    Ok(())
}

fn load_toolkit_state(path: &Path) -> ToolkitStates {
    let Ok(content) = std::fs::read_to_string(path) else {
        return ToolkitStates::new();
    };
    serde_json::from_str(&content).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "ignoring unreadable toolkit state");
        ToolkitStates::new()
    })
}

fn save_toolkit_state(path: &Path, states: &ToolkitStates) -> anyhow::Result<()> {
    if states.is_empty() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(states)?)
        .with_context(|| format!("writing toolkit state to {}", path.display()))?;
    Ok(())
}
