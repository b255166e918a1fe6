//! Tutoring settings: model, token budget, auto-save interval.

use anyhow::Result;
use console::style;

use booktutor_core::repository::SettingsRepository;
use booktutor_types::settings::AgentSettings;

use crate::state::AppState;

fn print_settings(settings: &AgentSettings) {
    let auto_save = match settings.auto_save_secs {
        Some(secs) => format!("every {secs}s"),
        None => "off".to_string(),
    };
    println!();
    println!("  {}      {}", style("Model:").bold(), style(&settings.ai_model).cyan());
    println!("  {}     {} tokens", style("Budget:").bold(), settings.token_budget);
    println!("  {}  {}", style("Auto-save:").bold(), auto_save);
    println!();
}

pub async fn show_settings(state: &AppState, json: bool) -> Result<()> {
    let settings = state.store.get_settings().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&settings)?);
    } else {
        print_settings(&settings);
    }
    Ok(())
}

/// Apply the given changes on top of `settings`. `auto_save = 0` turns it off.
fn apply(
    mut settings: AgentSettings,
    model: Option<String>,
    budget: Option<u32>,
    auto_save: Option<u64>,
) -> Result<AgentSettings> {
    if let Some(model) = model {
        settings.ai_model = model.trim().to_string();
    }
    if let Some(budget) = budget {
        settings.token_budget = budget;
    }
    if let Some(secs) = auto_save {
        settings.auto_save_secs = (secs > 0).then_some(secs);
    }
    settings.validate().map_err(anyhow::Error::msg)?;
    Ok(settings)
}

pub async fn set_settings(
    state: &AppState,
    model: Option<String>,
    budget: Option<u32>,
    auto_save: Option<u64>,
    json: bool,
) -> Result<()> {
    if model.is_none() && budget.is_none() && auto_save.is_none() {
        anyhow::bail!("nothing to change; pass --model, --budget or --auto-save");
    }

    let current = state.store.get_settings().await?;
    let updated = apply(current, model, budget, auto_save)?;
    state.store.update_settings(&updated).await?;
    tracing::info!(
        ai_model = %updated.ai_model,
        token_budget = updated.token_budget,
        "Settings updated"
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&updated)?);
    } else {
        println!("  {} Settings saved", style("✓").green().bold());
        print_settings(&updated);
    }
    Ok(())
}
