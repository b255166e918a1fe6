//! CLI command definitions for the `btutor` binary.
//!
//! Uses clap derive macros. Resources are addressed by numeric id; a tutoring
//! session is the pair `--book <id> --student <id>`.

pub mod book;
pub mod chat;
pub mod progress;
pub mod settings;
pub mod student;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use comfy_table::{ContentArrangement, Table, presets};

use booktutor_types::session::SessionKey;

/// Learn a book with an AI tutor that remembers where you left off.
#[derive(Parser)]
#[command(name = "btutor", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed logs (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Write logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export spans to stdout via OpenTelemetry.
    #[arg(long, global = true, env = "BOOKTUTOR_OTEL")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Selects one tutoring session.
#[derive(Args, Debug, Clone, Copy)]
pub struct SessionArgs {
    /// Book id.
    #[arg(long)]
    pub book: i64,

    /// Student id.
    #[arg(long)]
    pub student: i64,
}

impl SessionArgs {
    pub fn key(self) -> SessionKey {
        SessionKey::new(self.book, self.student)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive tutoring session.
    Chat {
        #[command(flatten)]
        session: SessionArgs,
    },

    /// Distill the session's recent conversation into progress, plan and notes.
    Save {
        #[command(flatten)]
        session: SessionArgs,
    },

    /// Manage the book library.
    Book {
        #[command(subcommand)]
        action: BookCommand,
    },

    /// Manage students.
    Student {
        #[command(subcommand)]
        action: StudentCommand,
    },

    /// Enroll a student in a book.
    Enroll {
        #[command(flatten)]
        session: SessionArgs,
    },

    /// Remove an enrollment with its history and progress.
    Unenroll {
        #[command(flatten)]
        session: SessionArgs,

        /// Skip confirmation prompt.
        #[arg(long)]
        force: bool,
    },

    /// Show a student's progress through a book.
    Progress {
        #[command(flatten)]
        session: SessionArgs,
    },

    /// Show or change tutoring settings.
    Settings {
        #[command(subcommand)]
        action: SettingsCommand,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum BookCommand {
    /// List imported books.
    #[command(alias = "ls")]
    List,

    /// Show a book with its table of contents.
    Show {
        /// Book id.
        id: i64,
    },

    /// Import a pre-summarized book from a TOML manifest.
    Import {
        /// Path to the manifest.
        manifest: PathBuf,
    },

    /// Delete a book and every session on it.
    #[command(alias = "rm")]
    Delete {
        /// Book id.
        id: i64,

        /// Skip confirmation prompt.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
pub enum StudentCommand {
    /// Register a student.
    Create {
        /// Display name; prompted for when omitted.
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        email: Option<String>,
    },

    /// List students.
    #[command(alias = "ls")]
    List,

    /// Delete a student and all their sessions.
    #[command(alias = "rm")]
    Delete {
        /// Student id.
        id: i64,

        /// Skip confirmation prompt.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
pub enum SettingsCommand {
    /// Print the current settings.
    Show,

    /// Change one or more settings.
    Set {
        /// Model name sent to the provider.
        #[arg(long)]
        model: Option<String>,

        /// Token budget for the conversation window.
        #[arg(long)]
        budget: Option<u32>,

        /// Auto-save interval in seconds; 0 disables auto-save.
        #[arg(long)]
        auto_save: Option<u64>,
    },
}

/// Table preset shared by every listing.
pub(crate) fn table() -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Cut `text` to at most `max` characters, marking the cut.
pub(crate) fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}
