use concierge_agent::AgentRuntime;
use concierge_core::config::{AppConfig, LlmProvider, LoadOptions};
use secrecy::ExposeSecret;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_search_credentials(&config));
            checks.push(check_llm_credentials(&config));
            checks.push(check_runtime_wiring(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["search_credentials", "llm_credentials", "runtime_wiring"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_search_credentials(config: &AppConfig) -> DoctorCheck {
    let configured = !config.search.api_key.expose_secret().trim().is_empty();
    DoctorCheck {
        name: "search_credentials",
        status: if configured { CheckStatus::Pass } else { CheckStatus::Fail },
        details: if configured {
            format!("search api key present for `{}`", config.search.base_url)
        } else {
            "search api key missing".to_string()
        },
    }
}

fn check_llm_credentials(config: &AppConfig) -> DoctorCheck {
    let has_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| !key.expose_secret().trim().is_empty())
        .unwrap_or(false);
    let ready = match config.llm.provider {
        LlmProvider::Ollama => config.llm.base_url.is_some(),
        LlmProvider::OpenAi | LlmProvider::Anthropic => has_key,
    };

    DoctorCheck {
        name: "llm_credentials",
        status: if ready { CheckStatus::Pass } else { CheckStatus::Fail },
        details: format!("{:?} model `{}`", config.llm.provider, config.llm.model),
    }
}

fn check_runtime_wiring(config: &AppConfig) -> DoctorCheck {
    match AgentRuntime::from_config(config) {
        Ok(runtime) => DoctorCheck {
            name: "runtime_wiring",
            status: CheckStatus::Pass,
            details: format!(
                "step ceiling {}, {} trusted retailers",
                runtime.step_ceiling(),
                runtime.trust().len()
            ),
        },
        Err(error) => DoctorCheck {
            name: "runtime_wiring",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
