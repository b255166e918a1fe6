//! SettingsRepository trait definition.

use booktutor_types::error::RepositoryError;
use booktutor_types::settings::AgentSettings;

/// The singleton engine settings row.
pub trait SettingsRepository: Send + Sync {
    fn get_settings(
        &self,
    ) -> impl std::future::Future<Output = Result<AgentSettings, RepositoryError>> + Send;

    fn update_settings(
        &self,
        settings: &AgentSettings,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
