pub mod ask;
pub mod chat;
pub mod config;
pub mod doctor;

use concierge_agent::{AgentRuntime, LoopState};
use concierge_core::config::{AppConfig, LoadOptions};
use concierge_core::{ApplicationError, ShoppingResult};
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Machine-readable view of a finished loop run.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub query: String,
    pub steps: u32,
    pub errors: Vec<String>,
    pub needs_clarification: bool,
    pub result: ShoppingResult,
}

impl From<&LoopState> for RunSummary {
    fn from(state: &LoopState) -> Self {
        Self {
            query: state.request.query.clone(),
            steps: state.step_count,
            errors: state.errors.clone(),
            needs_clarification: state.needs_clarification,
            result: state.result(),
        }
    }
}

/// Loads config and wires the live runtime, mapping failures to the
/// command's exit codes (2 config, 4 runtime wiring).
pub(crate) fn live_runtime(command: &str) -> Result<AgentRuntime, CommandResult> {
    let config = AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            2,
        )
    })?;
    init_stderr_logging(&config);

    AgentRuntime::from_config(&config).map_err(|error| {
        let message = ApplicationError::from(error).to_string();
        CommandResult::failure(command, "runtime_build", message, 4)
    })
}

pub(crate) fn async_runtime(command: &str) -> Result<tokio::runtime::Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            3,
        )
    })
}

// stdout carries command output, so loop logs go to stderr.
fn init_stderr_logging(config: &AppConfig) {
    use tracing::Level;

    let level = config.logging.level.parse::<Level>().unwrap_or(Level::WARN);
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_max_level(level)
        .compact()
        .try_init();
}
