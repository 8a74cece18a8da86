use std::sync::Arc;

use concierge_agent::runtime::{AgentRuntime, BuildError};
use concierge_core::config::{AppConfig, ConfigError, LoadOptions};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub agent_runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("agent runtime could not be built: {0}")]
    Runtime(#[from] BuildError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        llm_provider = ?config.llm.provider,
        llm_model = %config.llm.model,
        "starting application bootstrap"
    );

    let agent_runtime = Arc::new(AgentRuntime::from_config(&config)?);
    info!(
        event_name = "system.bootstrap.runtime_ready",
        correlation_id = "bootstrap",
        step_ceiling = agent_runtime.step_ceiling(),
        trusted_retailers = agent_runtime.trust().len(),
        "agent runtime initialized"
    );

    Ok(Application { config, agent_runtime })
}

#[cfg(test)]
mod tests {
    use concierge_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    fn overrides(search_api_key: Option<&str>) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                llm_api_key: Some("sk-test".to_string()),
                search_api_key: search_api_key.map(str::to_string),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_search_key() {
        std::env::remove_var("CONCIERGE_SEARCH_API_KEY");
        std::env::remove_var("SEARCHAPI_KEY");

        let result = bootstrap(overrides(None)).await;

        assert!(result.is_err());
        let message = result.err().map(|error| error.to_string()).unwrap_or_default();
        assert!(message.contains("search.api_key"));
    }

    #[tokio::test]
    async fn bootstrap_builds_runtime_with_valid_overrides() {
        let app = bootstrap(overrides(Some("search-test")))
            .await
            .expect("bootstrap should succeed with valid overrides");

        assert_eq!(app.agent_runtime.step_ceiling(), app.config.agent.step_ceiling);
        assert!(!app.agent_runtime.trust().is_empty());
    }
}
