//! Interactive tutoring loop and the one-shot `save` command.
//!
//! Each line the student types becomes one turn with a fresh UUIDv7 message
//! id. A failed turn keeps its id so `/retry` resubmits it idempotently.
//! Ctrl+C cancels the turn in flight and is ignored with a hint at the
//! prompt; Ctrl+D or `/quit` ends the session, which runs a final
//! summarization pass.

use std::time::Duration;

use anyhow::Result;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio_util::sync::CancellationToken;

use booktutor_core::agent::{StudentInput, TurnOutcome};
use booktutor_core::session::SessionOverview;
use booktutor_types::error::TutorError;
use booktutor_types::session::SessionKey;
use booktutor_types::summary::{SummaryStatus, SummaryTrigger};

use crate::state::{AppState, Engine};

/// In-chat slash commands.
#[derive(Debug, PartialEq)]
pub enum ChatCommand {
    Help,
    Save,
    Progress,
    Retry,
    Quit,
    Unknown(String),
}

/// Parse a slash command; `None` for ordinary messages.
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }
    let cmd = trimmed
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_lowercase();
    Some(match cmd.as_str() {
        "/help" | "/h" | "/?" => ChatCommand::Help,
        "/save" => ChatCommand::Save,
        "/progress" | "/p" => ChatCommand::Progress,
        "/retry" => ChatCommand::Retry,
        "/quit" | "/exit" | "/q" => ChatCommand::Quit,
        other => ChatCommand::Unknown(other.to_string()),
    })
}

/// What the prompt produced.
#[derive(Debug, PartialEq)]
enum InputEvent {
    Line(String),
    Interrupted,
    Eof,
}

/// Read one line, or report Ctrl+C pressed while waiting for it.
async fn read_input<R>(lines: &mut Lines<R>) -> std::io::Result<InputEvent>
where
    R: AsyncBufRead + Unpin,
{
    tokio::select! {
        line = lines.next_line() => Ok(line?.map_or(InputEvent::Eof, InputEvent::Line)),
        signal = tokio::signal::ctrl_c() => signal.map(|()| InputEvent::Interrupted),
    }
}

fn print_help() {
    println!();
    println!("  {}", style("Available commands:").bold());
    println!();
    println!("  {}      Show this help message", style("/help").cyan());
    println!("  {}      Save progress, plan and notes now", style("/save").cyan());
    println!("  {}  Show where you are in the book", style("/progress").cyan());
    println!("  {}     Resend the last message that failed", style("/retry").cyan());
    println!("  {}      End the session", style("/quit").cyan());
    println!();
}

fn spinner(message: &'static str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("  {spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

fn print_banner(overview: &SessionOverview) {
    println!();
    println!(
        "  {} {}",
        style("📖").bold(),
        style(&overview.book_title).cyan().bold()
    );
    println!(
        "  {}",
        style(format!(
            "{} · {} · {} tokens",
            overview.student_name, overview.ai_model, overview.token_budget
        ))
        .dim()
    );
    if let Some(chapter) = &overview.current_chapter {
        println!("  {}", style(format!("Current chapter: {chapter}")).dim());
    }
    if overview.window_messages > 0 {
        println!(
            "  {}",
            style(format!("Resuming with {} earlier messages.", overview.window_messages)).dim()
        );
    }
    println!("  {}", style("Type /help for commands, Ctrl+D to finish.").dim());
    println!();
}

fn print_summary_status(status: &SummaryStatus) {
    match status {
        SummaryStatus::Completed(report) => println!(
            "  {} Saved {} messages ({} updated, {} unchanged)",
            style("✓").green().bold(),
            report.messages,
            report.applied.len(),
            report.skipped.len()
        ),
        SummaryStatus::Coalesced => println!(
            "  {} A save is already running",
            style("i").blue().bold()
        ),
        SummaryStatus::NothingToSummarize => println!(
            "  {} Nothing new to save",
            style("i").blue().bold()
        ),
    }
}

fn print_turn_error(err: &TutorError) {
    match err {
        TutorError::Cancelled => {
            println!("\n  {}", style("Cancelled. Nothing was saved for that message.").dim());
        }
        TutorError::Llm(_) => {
            eprintln!("\n  {} {err}", style("!").red().bold());
            eprintln!("  {}", style("Type /retry to resend, or a new message.").dim());
        }
        other => {
            eprintln!("\n  {} {other}", style("!").red().bold());
        }
    }
}

/// Run one turn; Ctrl+C while it runs cancels it.
async fn send_turn(engine: &Engine, key: SessionKey, input: StudentInput) -> Result<TurnOutcome, TutorError> {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let spinner = spinner("thinking...");
    let result = engine.send(key, input, &cancel).await;
    spinner.finish_and_clear();
    watcher.abort();
    result
}

/// Start an interactive session.
pub async fn run_chat(state: &AppState, key: SessionKey) -> Result<()> {
    let engine = state.engine()?;
    let overview = engine.open(key).await?;
    let janitor = engine.spawn_janitor();
    print_banner(&overview);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut failed: Option<StudentInput> = None;

    loop {
        print!("  {} ", style("You >").green().bold());
        let _ = std::io::Write::flush(&mut std::io::stdout());

        let line = match read_input(&mut lines).await? {
            InputEvent::Line(line) => line,
            InputEvent::Interrupted => {
                println!("\n  {}", style("Press Ctrl+D to exit, or keep chatting.").dim());
                continue;
            }
            InputEvent::Eof => {
                println!();
                break;
            }
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }

        let input = match parse_command(text) {
            Some(ChatCommand::Help) => {
                print_help();
                continue;
            }
            Some(ChatCommand::Quit) => break,
            Some(ChatCommand::Save) => {
                let spinner = spinner("saving...");
                let result = engine.summarize(key, SummaryTrigger::Explicit).await;
                spinner.finish_and_clear();
                match result {
                    Ok(status) => print_summary_status(&status),
                    Err(e) => eprintln!("  {} Save failed: {e}", style("!").red().bold()),
                }
                continue;
            }
            Some(ChatCommand::Progress) => {
                super::progress::show_progress(state, key, false).await?;
                continue;
            }
            Some(ChatCommand::Retry) => match failed.take() {
                Some(input) => input,
                None => {
                    println!("  {}", style("Nothing to retry.").dim());
                    continue;
                }
            },
            Some(ChatCommand::Unknown(name)) => {
                println!(
                    "  {} Unknown command: {}. Type /help for available commands.",
                    style("?").yellow().bold(),
                    style(name).dim()
                );
                continue;
            }
            None => StudentInput::with_id(text, uuid::Uuid::now_v7().to_string()),
        };

        match send_turn(&engine, key, input.clone()).await {
            Ok(outcome) => {
                println!();
                println!("  {} {}", style("Tutor >").cyan().bold(), outcome.reply.trim());
                if let Some(warning) = outcome.budget_warning {
                    println!(
                        "  {}",
                        style(format!(
                            "(context needed {} of {} tokens; older messages are being summarized)",
                            warning.required_tokens, warning.budget
                        ))
                        .dim()
                    );
                }
                println!();
            }
            Err(e) => {
                print_turn_error(&e);
                if matches!(e, TutorError::Llm(_) | TutorError::Cancelled) {
                    failed = Some(input);
                }
            }
        }
    }

    let spinner = spinner("saving progress...");
    engine.shutdown().await;
    spinner.finish_and_clear();
    let _ = janitor.await;
    println!("  {}", style("Session ended.").dim());
    Ok(())
}

/// Summarize a session without chatting.
pub async fn save(state: &AppState, key: SessionKey, json: bool) -> Result<()> {
    let engine = state.engine()?;
    let spinner = (!json).then(|| spinner("saving..."));
    let result = engine.summarize(key, SummaryTrigger::Explicit).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    let status = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print_summary_status(&status);
    }
    Ok(())
}
