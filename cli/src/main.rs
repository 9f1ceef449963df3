//! MiniCoder CLI - binary entry point.
//!
//! Wires configuration, the OpenAI client, the file tools and a terminal
//! sink into one [`Orchestrator`], then hands it to the line loop.
//!
//! ```text
//! main() -> MinicoderConfig::load() -> Orchestrator::new(..) -> repl::run()
//!                                                                  |
//!                                             "/add" | "exit" | user turn
//! ```

mod repl;
mod terminal;

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    path::PathBuf,
    sync::Mutex,
};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use minicoder_engine::config::OPENAI_API_KEY_ENV;
use minicoder_engine::context::ConversationStore;
use minicoder_engine::providers::{ApiConfig, openai::OpenAiClient};
use minicoder_engine::tools::{FileMutator, ToolDispatcher};
use minicoder_engine::{MinicoderConfig, Orchestrator};

use crate::terminal::TerminalSink;

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // The terminal belongs to the conversation; without a log file, no logs.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_log_file() -> (Option<(PathBuf, std::fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new().create(true).append(true).open(&candidate) {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // ~/.minicoder/logs/minicoder.log
    if let Some(config_path) = MinicoderConfig::path()
        && let Some(config_dir) = config_path.parent()
    {
        candidates.push(config_dir.join("logs").join("minicoder.log"));
    }

    candidates
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = MinicoderConfig::load()?.unwrap_or_default();
    let api_key = config.api_key().with_context(|| {
        format!("no OpenAI API key found; set {OPENAI_API_KEY_ENV} or [api_keys] openai in ~/.minicoder/config.toml")
    })?;

    let mut api_config = ApiConfig::new(api_key, config.model());
    if let Some(base_url) = config.base_url() {
        api_config = api_config.with_endpoint(&base_url)?;
    }
    tracing::info!(
        model = %api_config.model(),
        endpoint = api_config.endpoint(),
        "Starting session"
    );

    let working_dir = std::env::current_dir().context("cannot determine working directory")?;
    let files = FileMutator::new(&working_dir)
        .with_context(|| format!("cannot open working directory {}", working_dir.display()))?;
    let store = ConversationStore::with_instructions(config.system_prompt(), config.trim_policy());

    let mut orchestrator = Orchestrator::new(
        OpenAiClient::new(api_config),
        store,
        ToolDispatcher::with_builtins(files),
        TerminalSink::new(std::io::stdout()),
    )
    .with_limits(config.output_limits());

    repl::run(&mut orchestrator).await?;
    tracing::info!(messages = orchestrator.store().len(), "Session finished");
    Ok(())
}
