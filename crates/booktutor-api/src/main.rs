//! booktutor CLI entry point.
//!
//! Binary name: `btutor`
//!
//! Parses arguments, sets up tracing, opens the store and dispatches to the
//! command handlers.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;

use booktutor_observe::{TracingOptions, init_tracing, shutdown_tracing};

use cli::{BookCommand, Cli, Commands, SettingsCommand, StudentCommand};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,booktutor_core=debug,booktutor_infra=debug",
        _ => "trace",
    };
    init_tracing(&TracingOptions {
        filter: filter.to_string(),
        json: cli.log_json,
        otel: cli.otel,
    })
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "btutor", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init().await?;
    let json = cli.json;

    match cli.command {
        Commands::Chat { session } => cli::chat::run_chat(&state, session.key()).await?,
        Commands::Save { session } => cli::chat::save(&state, session.key(), json).await?,

        Commands::Book { action } => match action {
            BookCommand::List => cli::book::list_books(&state, json).await?,
            BookCommand::Show { id } => cli::book::show_book(&state, id, json).await?,
            BookCommand::Import { manifest } => {
                cli::book::import_book(&state, &manifest, json).await?
            }
            BookCommand::Delete { id, force } => {
                cli::book::delete_book(&state, id, force, json).await?
            }
        },

        Commands::Student { action } => match action {
            StudentCommand::Create { name, email } => {
                cli::student::create_student(&state, name, email, json).await?
            }
            StudentCommand::List => cli::student::list_students(&state, json).await?,
            StudentCommand::Delete { id, force } => {
                cli::student::delete_student(&state, id, force, json).await?
            }
        },

        Commands::Enroll { session } => cli::student::enroll(&state, session.key(), json).await?,
        Commands::Unenroll { session, force } => {
            cli::student::unenroll(&state, session.key(), force, json).await?
        }

        Commands::Progress { session } => {
            cli::progress::show_progress(&state, session.key(), json).await?
        }

        Commands::Settings { action } => match action {
            SettingsCommand::Show => cli::settings::show_settings(&state, json).await?,
            SettingsCommand::Set {
                model,
                budget,
                auto_save,
            } => cli::settings::set_settings(&state, model, budget, auto_save, json).await?,
        },

        Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(())
}
