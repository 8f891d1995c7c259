use mailquote_agent::HttpLlmClient;
use mailquote_core::config::{AppConfig, LlmProvider, LoadOptions};
use mailquote_db::connect_with_settings;
use mailquote_erp::{ServiceLayerClient, CATALOG_SYSTEM, REGISTRY_SYSTEM};
use serde::Serialize;

use crate::commands::CommandResult;

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

const CHECK_NAMES: [&str; 4] =
    ["llm_readiness", "database_connectivity", "registry_session", "catalog_session"];

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };
    CommandResult { exit_code, output }
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
            checks.push(check_llm(&config));
            checks.extend(check_backends(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.extend(CHECK_NAMES.iter().map(|&name| DoctorCheck {
                name,
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            }));
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

fn check_llm(config: &AppConfig) -> DoctorCheck {
    let needs_key = matches!(config.llm.provider, LlmProvider::OpenAi | LlmProvider::Anthropic);
    if needs_key && config.llm.api_key.is_none() {
        return DoctorCheck {
            name: "llm_readiness",
            status: CheckStatus::Fail,
            details: format!("{:?} requires llm.api_key", config.llm.provider),
        };
    }
    match HttpLlmClient::from_config(&config.llm) {
        Ok(client) => DoctorCheck {
            name: "llm_readiness",
            status: CheckStatus::Pass,
            details: format!("{:?} client ready for model `{}`", config.llm.provider, client.model()),
        },
        Err(error) => {
            DoctorCheck { name: "llm_readiness", status: CheckStatus::Fail, details: error.to_string() }
        }
    }
}

fn check_backends(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            let details = format!("failed to initialize async runtime: {error}");
            return CHECK_NAMES[1..]
                .iter()
                .map(|&name| DoctorCheck { name, status: CheckStatus::Fail, details: details.clone() })
                .collect();
        }
    };

    runtime.block_on(async {
        vec![
            check_database(config).await,
            check_session("registry_session", REGISTRY_SYSTEM, config).await,
            check_session("catalog_session", CATALOG_SYSTEM, config).await,
        ]
    })
}

async fn check_database(config: &AppConfig) -> DoctorCheck {
    let result = async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;

        pool.close().await;
        Ok::<(), String>(())
    }
    .await;

    match result {
        Ok(()) => DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`", config.database.url),
        },
        Err(error) => {
            DoctorCheck { name: "database_connectivity", status: CheckStatus::Fail, details: error }
        }
    }
}

async fn check_session(name: &'static str, system: &str, config: &AppConfig) -> DoctorCheck {
    let service = if system == REGISTRY_SYSTEM { &config.registry } else { &config.catalog.service };
    let result = match ServiceLayerClient::new(system, service) {
        Ok(client) => client.ping().await,
        Err(error) => Err(error),
    };

    match result {
        Ok(()) => DoctorCheck {
            name,
            status: CheckStatus::Pass,
            details: format!("logged in to `{}` as `{}`", service.base_url, service.username),
        },
        Err(error) => DoctorCheck { name, status: CheckStatus::Fail, details: error.to_string() },
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
