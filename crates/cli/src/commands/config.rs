use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use concierge_core::config::{AppConfig, LoadOptions, DEFAULT_CONFIG_FILE, NESTED_CONFIG_FILE};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    render(&config, config_file_doc.as_ref(), config_file_path.as_deref())
}

pub fn render(config: &AppConfig, file_doc: Option<&Value>, file_path: Option<&Path>) -> String {
    let llm_api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact_secret(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());
    let fx_rates = config
        .agent
        .fx_rates
        .iter()
        .map(|(currency, rate)| format!("{currency}={rate}"))
        .collect::<Vec<_>>()
        .join(",");

    let fields = [
        field("llm.provider", format!("{:?}", config.llm.provider), &["CONCIERGE_LLM_PROVIDER"]),
        field("llm.model", config.llm.model.clone(), &["CONCIERGE_LLM_MODEL"]),
        field(
            "llm.base_url",
            config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            &["CONCIERGE_LLM_BASE_URL"],
        ),
        field("llm.api_key", llm_api_key, &["CONCIERGE_LLM_API_KEY", "OPENAI_API_KEY"]),
        field("llm.timeout_secs", config.llm.timeout_secs.to_string(), &["CONCIERGE_LLM_TIMEOUT_SECS"]),
        field("llm.max_retries", config.llm.max_retries.to_string(), &["CONCIERGE_LLM_MAX_RETRIES"]),
        field(
            "search.api_key",
            redact_secret(config.search.api_key.expose_secret()),
            &["CONCIERGE_SEARCH_API_KEY", "SEARCHAPI_KEY"],
        ),
        field("search.base_url", config.search.base_url.clone(), &["CONCIERGE_SEARCH_BASE_URL"]),
        field("search.gl", config.search.gl.clone(), &["CONCIERGE_SEARCH_GL"]),
        field("search.hl", config.search.hl.clone(), &["CONCIERGE_SEARCH_HL"]),
        field("search.location", config.search.location.clone(), &["CONCIERGE_SEARCH_LOCATION"]),
        field(
            "agent.step_ceiling",
            config.agent.step_ceiling.to_string(),
            &["CONCIERGE_AGENT_STEP_CEILING"],
        ),
        field(
            "agent.search_limit",
            config.agent.search_limit.to_string(),
            &["CONCIERGE_AGENT_SEARCH_LIMIT"],
        ),
        field("agent.top_k", config.agent.top_k.to_string(), &["CONCIERGE_AGENT_TOP_K"]),
        field(
            "agent.home_currency",
            config.agent.home_currency.clone(),
            &["CONCIERGE_AGENT_HOME_CURRENCY"],
        ),
        field(
            "agent.trusted_retailers",
            config.agent.trusted_retailers.join(","),
            &["CONCIERGE_AGENT_TRUSTED_RETAILERS"],
        ),
        field("agent.fx_rates", fx_rates, &[]),
        field(
            "server.bind_address",
            config.server.bind_address.clone(),
            &["CONCIERGE_SERVER_BIND_ADDRESS"],
        ),
        field("server.port", config.server.port.to_string(), &["CONCIERGE_SERVER_PORT"]),
        field(
            "logging.level",
            config.logging.level.clone(),
            &["CONCIERGE_LOGGING_LEVEL", "CONCIERGE_LOG_LEVEL"],
        ),
        field(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["CONCIERGE_LOGGING_FORMAT", "CONCIERGE_LOG_FORMAT"],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(fields.into_iter().map(|field| {
        render_line(field.key, &field.value, field_source(field.key, field.env_keys, file_doc, file_path))
    }));
    lines.join("\n")
}

struct Field {
    key: &'static str,
    value: String,
    /// Env vars that can set this key, in precedence order.
    env_keys: &'static [&'static str],
}

fn field(key: &'static str, value: String, env_keys: &'static [&'static str]) -> Field {
    Field { key, value, env_keys }
}

fn detect_config_path() -> Option<PathBuf> {
    [DEFAULT_CONFIG_FILE, NESTED_CONFIG_FILE].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
