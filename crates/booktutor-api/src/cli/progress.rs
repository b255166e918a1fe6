//! Progress report for one enrollment: chapter statuses, plan and notes.

use anyhow::{Context, Result};
use comfy_table::{Cell, Color};
use console::style;

use booktutor_core::repository::{LibraryRepository, ProgressRepository, SessionRepository};
use booktutor_types::progress::ChapterStatus;
use booktutor_types::session::SessionKey;

use crate::state::AppState;

use super::{table, truncate};

fn status_cell(status: Option<ChapterStatus>) -> Cell {
    match status {
        Some(ChapterStatus::Completed) => Cell::new("completed").fg(Color::Green),
        Some(ChapterStatus::InProgress) => Cell::new("in progress").fg(Color::Yellow),
        Some(ChapterStatus::NotStarted) | None => Cell::new("not started").fg(Color::DarkGrey),
    }
}

pub async fn show_progress(state: &AppState, key: SessionKey, json: bool) -> Result<()> {
    let session = state
        .store
        .get_session(key)
        .await?
        .with_context(|| format!("No enrollment for {key}"))?;
    let chapters = state.store.list_chapters(key.book_id).await?;
    let progress = state.store.list_chapter_progress(key).await?;
    let plan = state.store.get_study_plan(key).await?;

    if json {
        let out = serde_json::json!({
            "session": session,
            "chapters": progress,
            "plan": plan,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let completed = progress
        .iter()
        .filter(|p| p.status == ChapterStatus::Completed)
        .count();

    println!();
    println!(
        "  {} of {} chapters completed",
        style(completed).bold(),
        chapters.len()
    );
    if let Some(current) = &session.current_chapter {
        println!("  {}  {}", style("Current chapter:").bold(), style(current).cyan());
    }
    println!();

    let mut table = table();
    table.set_header(vec![
        Cell::new("Chapter").fg(Color::White),
        Cell::new("Name").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Objectives").fg(Color::White),
    ]);
    for chapter in &chapters {
        let row = progress
            .iter()
            .find(|p| p.chapter_number == chapter.chapter_number);
        table.add_row(vec![
            Cell::new(chapter.chapter_number.as_str()),
            Cell::new(&chapter.name).fg(Color::Cyan),
            status_cell(row.map(|p| p.status)),
            Cell::new(truncate(row.map_or("", |p| p.objectives.as_str()), 60)),
        ]);
    }
    println!("{table}");

    if let Some(plan) = plan {
        if !plan.progress_summary.is_empty() {
            println!();
            println!("  {}", style("Overall progress").bold());
            println!("  {}", plan.progress_summary);
        }
        if !plan.plan.is_empty() {
            println!();
            println!("  {}", style("Study plan").bold());
            for line in plan.plan.lines() {
                println!("  {line}");
            }
        }
    }
    if !session.notes.is_empty() {
        println!();
        println!("  {}", style("Tutor notes").bold());
        println!("  {}", style(&session.notes).dim());
    }
    println!();
    Ok(())
}
