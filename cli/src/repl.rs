//! Line loop: reads user input and routes it.

use anyhow::Result;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

use minicoder_engine::providers::ModelBackend;
use minicoder_engine::{Orchestrator, OutputSink, TurnError};

use crate::terminal;

const PROMPT: &str = "You> ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Input<'a> {
    Blank,
    Exit,
    Add(&'a str),
    /// `/add` without a path.
    AddUsage,
    Turn(&'a str),
}

pub(crate) fn classify(line: &str) -> Input<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Input::Blank;
    }
    if trimmed.eq_ignore_ascii_case("exit") || trimmed.eq_ignore_ascii_case("quit") {
        return Input::Exit;
    }
    if let Some(command) = trimmed.get(..4)
        && command.eq_ignore_ascii_case("/add")
    {
        let rest = &trimmed[4..];
        if rest.is_empty() {
            return Input::AddUsage;
        }
        if rest.starts_with(char::is_whitespace) {
            return Input::Add(rest.trim());
        }
    }
    Input::Turn(trimmed)
}

fn prompt() -> Result<()> {
    let mut stdout = std::io::stdout();
    write!(stdout, "{PROMPT}")?;
    stdout.flush()?;
    Ok(())
}

/// Serve turns until `exit`, end of input, or Ctrl-C at the prompt.
///
/// Ctrl-C during a turn abandons only that turn.
pub(crate) async fn run<B, S>(orchestrator: &mut Orchestrator<B, S>) -> Result<()>
where
    B: ModelBackend,
    S: OutputSink,
{
    println!("MiniCoder - /add <path> to include files, exit or quit to leave.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        prompt()?;
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                println!("\nExiting.");
                break;
            }
        };
        let Some(line) = line else {
            println!();
            break;
        };

        match classify(&line) {
            Input::Blank => {}
            Input::Exit => {
                println!("Goodbye!");
                break;
            }
            Input::AddUsage => println!("Usage: /add <path>"),
            Input::Add(raw) => {
                let result = orchestrator.add_context(raw);
                println!("{}", terminal::describe_added(raw, &result));
            }
            Input::Turn(text) => {
                match orchestrator
                    .run_turn_until(text, tokio::signal::ctrl_c())
                    .await
                {
                    Ok(summary) => {
                        tracing::debug!(?summary, "Turn complete");
                    }
                    Err(TurnError::Cancelled) => println!("\nTurn cancelled."),
                    Err(e) => {
                        tracing::error!(error = %e, "Turn failed");
                        println!("\nError: {e}");
                    }
                }
            }
        }
    }
    Ok(())
}
