use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retailers::DEFAULT_TRUSTED_RETAILERS;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub agent: AgentConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct SearchConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub gl: String,
    pub hl: String,
    pub google_domain: String,
    pub location: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub step_ceiling: u32,
    pub search_limit: usize,
    pub detail_fetch_limit: usize,
    pub rank_pool: usize,
    pub top_k: usize,
    pub home_currency: String,
    pub trusted_retailers: Vec<String>,
    pub fx_rates: BTreeMap<String, f64>,
    pub fetch_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub search_api_key: Option<String>,
    pub search_base_url: Option<String>,
    pub step_ceiling: Option<u32>,
    pub top_k: Option<usize>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

pub const DEFAULT_CONFIG_FILE: &str = "concierge.toml";
pub const NESTED_CONFIG_FILE: &str = "config/concierge.toml";

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                provider: LlmProvider::OpenAi,
                api_key: None,
                base_url: None,
                model: "gpt-4o-mini".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            search: SearchConfig {
                api_key: String::new().into(),
                base_url: "https://www.searchapi.io/api/v1/search".to_string(),
                gl: "sa".to_string(),
                hl: "ar".to_string(),
                google_domain: "google.com.sa".to_string(),
                location: "Riyadh, Saudi Arabia".to_string(),
                timeout_secs: 30,
            },
            agent: AgentConfig::default(),
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            step_ceiling: 5,
            search_limit: 40,
            detail_fetch_limit: 3,
            rank_pool: 20,
            top_k: 1,
            home_currency: "SAR".to_string(),
            trusted_retailers: DEFAULT_TRUSTED_RETAILERS
                .iter()
                .map(|name| (*name).to_string())
                .collect(),
            fx_rates: BTreeMap::from([
                ("USD".to_string(), 3.75),
                ("EUR".to_string(), 4.1),
                ("AED".to_string(), 1.02),
            ]),
            fetch_timeout_secs: 20,
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(search) = patch.search {
            if let Some(search_api_key_value) = search.api_key {
                self.search.api_key = secret_value(search_api_key_value);
            }
            if let Some(base_url) = search.base_url {
                self.search.base_url = base_url;
            }
            if let Some(gl) = search.gl {
                self.search.gl = gl;
            }
            if let Some(hl) = search.hl {
                self.search.hl = hl;
            }
            if let Some(google_domain) = search.google_domain {
                self.search.google_domain = google_domain;
            }
            if let Some(location) = search.location {
                self.search.location = location;
            }
            if let Some(timeout_secs) = search.timeout_secs {
                self.search.timeout_secs = timeout_secs;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(step_ceiling) = agent.step_ceiling {
                self.agent.step_ceiling = step_ceiling;
            }
            if let Some(search_limit) = agent.search_limit {
                self.agent.search_limit = search_limit;
            }
            if let Some(detail_fetch_limit) = agent.detail_fetch_limit {
                self.agent.detail_fetch_limit = detail_fetch_limit;
            }
            if let Some(rank_pool) = agent.rank_pool {
                self.agent.rank_pool = rank_pool;
            }
            if let Some(top_k) = agent.top_k {
                self.agent.top_k = top_k;
            }
            if let Some(home_currency) = agent.home_currency {
                self.agent.home_currency = home_currency.trim().to_ascii_uppercase();
            }
            if let Some(trusted_retailers) = agent.trusted_retailers {
                self.agent.trusted_retailers = trusted_retailers;
            }
            if let Some(fx_rates) = agent.fx_rates {
                self.agent.fx_rates = fx_rates
                    .into_iter()
                    .map(|(code, rate)| (code.trim().to_ascii_uppercase(), rate))
                    .collect();
            }
            if let Some(fetch_timeout_secs) = agent.fetch_timeout_secs {
                self.agent.fetch_timeout_secs = fetch_timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("CONCIERGE_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        // OPENAI_API_KEY and SEARCHAPI_KEY are the providers' conventional names.
        let llm_api_key = read_env("CONCIERGE_LLM_API_KEY").or_else(|| read_env("OPENAI_API_KEY"));
        if let Some(value) = llm_api_key {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("CONCIERGE_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("CONCIERGE_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("CONCIERGE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("CONCIERGE_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("CONCIERGE_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("CONCIERGE_LLM_MAX_RETRIES", &value)?;
        }

        let search_api_key =
            read_env("CONCIERGE_SEARCH_API_KEY").or_else(|| read_env("SEARCHAPI_KEY"));
        if let Some(value) = search_api_key {
            self.search.api_key = secret_value(value);
        }
        if let Some(value) = read_env("CONCIERGE_SEARCH_BASE_URL") {
            self.search.base_url = value;
        }
        if let Some(value) = read_env("CONCIERGE_SEARCH_GL") {
            self.search.gl = value;
        }
        if let Some(value) = read_env("CONCIERGE_SEARCH_HL") {
            self.search.hl = value;
        }
        if let Some(value) = read_env("CONCIERGE_SEARCH_LOCATION") {
            self.search.location = value;
        }
        if let Some(value) = read_env("CONCIERGE_SEARCH_TIMEOUT_SECS") {
            self.search.timeout_secs = parse_u64("CONCIERGE_SEARCH_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CONCIERGE_AGENT_STEP_CEILING") {
            self.agent.step_ceiling = parse_u32("CONCIERGE_AGENT_STEP_CEILING", &value)?;
        }
        if let Some(value) = read_env("CONCIERGE_AGENT_SEARCH_LIMIT") {
            self.agent.search_limit = parse_usize("CONCIERGE_AGENT_SEARCH_LIMIT", &value)?;
        }
        if let Some(value) = read_env("CONCIERGE_AGENT_TOP_K") {
            self.agent.top_k = parse_usize("CONCIERGE_AGENT_TOP_K", &value)?;
        }
        if let Some(value) = read_env("CONCIERGE_AGENT_HOME_CURRENCY") {
            self.agent.home_currency = value.trim().to_ascii_uppercase();
        }
        if let Some(value) = read_env("CONCIERGE_AGENT_TRUSTED_RETAILERS") {
            self.agent.trusted_retailers = value
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(value) = read_env("CONCIERGE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("CONCIERGE_SERVER_PORT") {
            self.server.port = parse_u16("CONCIERGE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("CONCIERGE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("CONCIERGE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("CONCIERGE_LOGGING_LEVEL").or_else(|| read_env("CONCIERGE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CONCIERGE_LOGGING_FORMAT").or_else(|| read_env("CONCIERGE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = Some(llm_base_url);
        }
        if let Some(search_api_key) = overrides.search_api_key {
            self.search.api_key = secret_value(search_api_key);
        }
        if let Some(search_base_url) = overrides.search_base_url {
            self.search.base_url = search_base_url;
        }
        if let Some(step_ceiling) = overrides.step_ceiling {
            self.agent.step_ceiling = step_ceiling;
        }
        if let Some(top_k) = overrides.top_k {
            self.agent.top_k = top_k;
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_search(&self.search)?;
        validate_agent(&self.agent)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from(NESTED_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_search(search: &SearchConfig) -> Result<(), ConfigError> {
    if search.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "search.api_key is required. Get it from https://www.searchapi.io > Dashboard > API Key"
                .to_string(),
        ));
    }

    if !is_http_url(&search.base_url) {
        return Err(ConfigError::Validation(
            "search.base_url must start with http:// or https://".to_string(),
        ));
    }

    if search.timeout_secs == 0 || search.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "search.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.step_ceiling == 0 || agent.step_ceiling > 12 {
        return Err(ConfigError::Validation(
            "agent.step_ceiling must be in range 1..=12".to_string(),
        ));
    }

    if agent.search_limit == 0 || agent.search_limit > 100 {
        return Err(ConfigError::Validation(
            "agent.search_limit must be in range 1..=100".to_string(),
        ));
    }

    if agent.detail_fetch_limit > 10 {
        return Err(ConfigError::Validation(
            "agent.detail_fetch_limit must be at most 10".to_string(),
        ));
    }

    if agent.top_k == 0 {
        return Err(ConfigError::Validation("agent.top_k must be greater than zero".to_string()));
    }

    if agent.rank_pool < agent.top_k {
        return Err(ConfigError::Validation(
            "agent.rank_pool must be greater than or equal to agent.top_k".to_string(),
        ));
    }

    let currency_ok = agent.home_currency.len() == 3
        && agent.home_currency.chars().all(|character| character.is_ascii_uppercase());
    if !currency_ok {
        return Err(ConfigError::Validation(
            "agent.home_currency must be a three-letter ISO code such as `SAR`".to_string(),
        ));
    }

    if let Some((code, _)) =
        agent.fx_rates.iter().find(|(_, rate)| !rate.is_finite() || **rate <= 0.0)
    {
        return Err(ConfigError::Validation(format!(
            "agent.fx_rates.{code} must be a positive number"
        )));
    }

    if agent.fetch_timeout_secs == 0 || agent.fetch_timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "agent.fetch_timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    search: Option<SearchPatch>,
    agent: Option<AgentPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    gl: Option<String>,
    hl: Option<String>,
    google_domain: Option<String>,
    location: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    step_ceiling: Option<u32>,
    search_limit: Option<usize>,
    detail_fetch_limit: Option<usize>,
    rank_pool: Option<usize>,
    top_k: Option<usize>,
    home_currency: Option<String>,
    trusted_retailers: Option<Vec<String>>,
    fx_rates: Option<BTreeMap<String, f64>>,
    fetch_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
