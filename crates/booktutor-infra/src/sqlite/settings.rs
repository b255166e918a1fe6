//! SQLite settings repository: the singleton `agent_setting` row.

use booktutor_core::repository::SettingsRepository;
use booktutor_types::error::RepositoryError;
use booktutor_types::settings::AgentSettings;
use sqlx::Row;

use super::store::{SqliteStore, db_error, row_error};

impl SettingsRepository for SqliteStore {
    async fn get_settings(&self) -> Result<AgentSettings, RepositoryError> {
        let row = sqlx::query("SELECT ai_model, token_budget, auto_save_secs FROM agent_setting WHERE id = 1")
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(db_error)?;

        let Some(row) = row else {
            tracing::warn!("agent_setting row missing, using defaults");
            return Ok(AgentSettings::default());
        };

        let token_budget: i64 = row.try_get("token_budget").map_err(row_error)?;
        let auto_save_secs: Option<i64> = row.try_get("auto_save_secs").map_err(row_error)?;
        Ok(AgentSettings {
            ai_model: row.try_get("ai_model").map_err(row_error)?,
            token_budget: u32::try_from(token_budget)
                .map_err(|_| RepositoryError::Query(format!("invalid token_budget: {token_budget}")))?,
            auto_save_secs: auto_save_secs.and_then(|s| u64::try_from(s).ok()),
        })
    }

    async fn update_settings(&self, settings: &AgentSettings) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO agent_setting (id, ai_model, token_budget, auto_save_secs)
               VALUES (1, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                   ai_model = excluded.ai_model,
                   token_budget = excluded.token_budget,
                   auto_save_secs = excluded.auto_save_secs"#,
        )
        .bind(&settings.ai_model)
        .bind(i64::from(settings.token_budget))
        .bind(settings.auto_save_secs.map(|s| s as i64))
        .execute(&self.pool.writer)
        .await
        .map_err(db_error)?;

        tracing::info!(
            ai_model = %settings.ai_model,
            token_budget = settings.token_budget,
            auto_save_secs = ?settings.auto_save_secs,
            "Updated agent settings"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::store::test_support::test_store;

    #[tokio::test]
    async fn test_default_settings_are_seeded() {
        let store = test_store().await;
        let settings = store.get_settings().await.unwrap();
        assert_eq!(settings.ai_model, "gpt-4o-mini");
        assert_eq!(settings.token_budget, 32_000);
        assert_eq!(settings.auto_save_secs, Some(600));
    }

    #[tokio::test]
    async fn test_update_settings_roundtrip() {
        let store = test_store().await;
        let settings = AgentSettings {
            ai_model: "gpt-4o".to_string(),
            token_budget: 8_000,
            auto_save_secs: None,
        };
        store.update_settings(&settings).await.unwrap();

        let loaded = store.get_settings().await.unwrap();
        assert_eq!(loaded.ai_model, "gpt-4o");
        assert_eq!(loaded.token_budget, 8_000);
        assert_eq!(loaded.auto_save_secs, None);
    }
}
