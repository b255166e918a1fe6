//! Student and enrollment CLI commands.

use anyhow::{Context, Result};
use comfy_table::{Cell, Color};
use console::style;
use dialoguer::{Confirm, Input};

use booktutor_core::repository::{LibraryRepository, SessionRepository, StudentRepository};
use booktutor_types::session::SessionKey;

use crate::state::AppState;

use super::table;

pub async fn create_student(
    state: &AppState,
    name: Option<String>,
    email: Option<String>,
    json: bool,
) -> Result<()> {
    let name = match name {
        Some(n) => n,
        None => Input::<String>::new()
            .with_prompt("Student name")
            .interact_text()?,
    };
    if name.trim().is_empty() {
        anyhow::bail!("student name must not be empty");
    }

    let student = state
        .store
        .create_student(name.trim(), email.as_deref())
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&student)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Student '{}' created",
        style("✓").green().bold(),
        style(&student.name).cyan()
    );
    println!("  {}  {}", style("ID:").bold(), student.id);
    println!();
    Ok(())
}

pub async fn list_students(state: &AppState, json: bool) -> Result<()> {
    let students = state.store.list_students().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&students)?);
        return Ok(());
    }

    if students.is_empty() {
        println!();
        println!(
            "  {} No students yet. Create one with: {}",
            style("i").blue().bold(),
            style("btutor student create").yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = table();
    table.set_header(vec![
        Cell::new("ID").fg(Color::White),
        Cell::new("Name").fg(Color::White),
        Cell::new("Email").fg(Color::White),
        Cell::new("Books").fg(Color::White),
    ]);
    for student in &students {
        let sessions = state.store.list_sessions(student.id).await?;
        table.add_row(vec![
            Cell::new(student.id).fg(Color::DarkGrey),
            Cell::new(&student.name).fg(Color::Cyan),
            Cell::new(student.email.as_deref().unwrap_or("-")),
            Cell::new(sessions.len()),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

pub async fn delete_student(state: &AppState, id: i64, force: bool, json: bool) -> Result<()> {
    let student = state
        .store
        .get_student(id)
        .await?
        .with_context(|| format!("Student {id} not found"))?;

    if !force && !json {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Delete '{}' with all their sessions and progress?",
                student.name
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("  Cancelled.");
            return Ok(());
        }
    }

    state.store.delete_student(id).await?;

    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!(
            "  {} Deleted '{}'",
            style("✓").green().bold(),
            style(&student.name).cyan()
        );
    }
    Ok(())
}

/// Create the session row; re-enrolling is a no-op.
pub async fn enroll(state: &AppState, key: SessionKey, json: bool) -> Result<()> {
    let book = state
        .store
        .get_book(key.book_id)
        .await?
        .with_context(|| format!("Book {} not found", key.book_id))?;
    let student = state
        .store
        .get_student(key.student_id)
        .await?
        .with_context(|| format!("Student {} not found", key.student_id))?;

    let session = state.store.enroll(key).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&session)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {} is enrolled in '{}'",
        style("✓").green().bold(),
        style(&student.name).cyan(),
        style(&book.title).cyan()
    );
    println!(
        "  Start learning with: {}",
        style(format!("btutor chat --book {} --student {}", key.book_id, key.student_id)).yellow()
    );
    println!();
    Ok(())
}

pub async fn unenroll(state: &AppState, key: SessionKey, force: bool, json: bool) -> Result<()> {
    state
        .store
        .get_session(key)
        .await?
        .with_context(|| format!("No enrollment for {key}"))?;

    if !force && !json {
        let confirmed = Confirm::new()
            .with_prompt("Remove this enrollment with its conversation and progress?")
            .default(false)
            .interact()?;
        if !confirmed {
            println!("  Cancelled.");
            return Ok(());
        }
    }

    state.store.unenroll(key).await?;

    if json {
        println!("{}", serde_json::json!({ "unenrolled": key }));
    } else {
        println!("  {} Enrollment removed", style("✓").green().bold());
    }
    Ok(())
}
