//! Library CLI commands: list, show, import, delete.
//!
//! Books arrive already summarized. `import` reads a TOML manifest:
//!
//! ```toml
//! title = "Rust in Depth"
//! author = "A. Writer"
//! summary = "Systems programming with Rust."
//!
//! [[chapter]]
//! chapter_number = "1."
//! name = "Basics"
//! summary = "Variables, types and control flow."
//! key_points = ["let bindings", "shadowing"]
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::{Cell, Color};
use console::style;
use dialoguer::Confirm;

use booktutor_core::repository::LibraryRepository;
use booktutor_types::book::BookImport;

use crate::state::AppState;

use super::{table, truncate};

/// Parse a book manifest, resolving an empty `path` to the manifest itself.
pub fn parse_manifest(content: &str, manifest_path: &Path) -> Result<BookImport> {
    let mut import: BookImport = toml::from_str(content).context("invalid book manifest")?;
    if import.title.trim().is_empty() {
        anyhow::bail!("book manifest has an empty title");
    }
    if import.chapters.is_empty() {
        anyhow::bail!("book manifest has no [[chapter]] entries");
    }
    if import.path.is_empty() {
        import.path = manifest_path.display().to_string();
    }
    Ok(import)
}

pub async fn import_book(state: &AppState, manifest: &Path, json: bool) -> Result<()> {
    let content = tokio::fs::read_to_string(manifest)
        .await
        .with_context(|| format!("failed to read {}", manifest.display()))?;
    let import = parse_manifest(&content, manifest)?;
    let chapters = import.chapters.len();

    let book = state.store.import_book(&import).await?;
    tracing::info!(book_id = book.id, chapters, "Book imported");

    if json {
        println!("{}", serde_json::to_string_pretty(&book)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Imported '{}' by {} ({} chapters)",
        style("✓").green().bold(),
        style(&book.title).cyan(),
        book.author,
        chapters
    );
    println!("  {}  {}", style("ID:").bold(), book.id);
    println!();
    Ok(())
}

pub async fn list_books(state: &AppState, json: bool) -> Result<()> {
    let books = state.store.list_books().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&books)?);
        return Ok(());
    }

    if books.is_empty() {
        println!();
        println!(
            "  {} No books yet. Import one with: {}",
            style("i").blue().bold(),
            style("btutor book import <manifest.toml>").yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = table();
    table.set_header(vec![
        Cell::new("ID").fg(Color::White),
        Cell::new("Title").fg(Color::White),
        Cell::new("Author").fg(Color::White),
        Cell::new("Imported").fg(Color::White),
    ]);
    for book in &books {
        table.add_row(vec![
            Cell::new(book.id).fg(Color::DarkGrey),
            Cell::new(truncate(&book.title, 48)).fg(Color::Cyan),
            Cell::new(&book.author),
            Cell::new(book.created_at.format("%Y-%m-%d").to_string()).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

pub async fn show_book(state: &AppState, id: i64, json: bool) -> Result<()> {
    let book = state
        .store
        .get_book(id)
        .await?
        .with_context(|| format!("Book {id} not found"))?;
    let chapters = state.store.list_chapters(id).await?;

    if json {
        let out = serde_json::json!({ "book": book, "chapters": chapters });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("  {}", style(&book.title).cyan().bold());
    println!("  {}", style(format!("by {}", book.author)).dim());
    if let Some(summary) = &book.summary {
        println!();
        println!("  {summary}");
    }
    println!();

    let mut table = table();
    table.set_header(vec![
        Cell::new("Chapter").fg(Color::White),
        Cell::new("Name").fg(Color::White),
        Cell::new("Key points").fg(Color::White),
    ]);
    for chapter in &chapters {
        let number = chapter.chapter_number.to_string();
        let number_cell = if chapter.chapter_number.is_appendix() {
            Cell::new(number).fg(Color::DarkGrey)
        } else {
            Cell::new(number)
        };
        table.add_row(vec![
            number_cell,
            Cell::new(&chapter.name).fg(Color::Cyan),
            Cell::new(chapter.key_points.len()),
        ]);
    }
    println!("{table}");
    println!();
    Ok(())
}

pub async fn delete_book(state: &AppState, id: i64, force: bool, json: bool) -> Result<()> {
    let book = state
        .store
        .get_book(id)
        .await?
        .with_context(|| format!("Book {id} not found"))?;

    if !force && !json {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Delete '{}' with all its sessions and progress?",
                book.title
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("  Cancelled.");
            return Ok(());
        }
    }

    state.store.delete_book(id).await?;

    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!(
            "  {} Deleted '{}'",
            style("✓").green().bold(),
            style(&book.title).cyan()
        );
    }
    Ok(())
}
