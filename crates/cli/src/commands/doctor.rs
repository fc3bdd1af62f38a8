use bondline_core::config::{AppConfig, LoadOptions};
use bondline_core::domain::capability::names;
use serde::Serialize;

use super::CommandResult;

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

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string(&report).unwrap_or_else(|error| {
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
            checks.push(check_capability_wiring(&config));
            checks.push(check_model_endpoint(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["capability_wiring", "model_endpoint"] {
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

fn check_capability_wiring(config: &AppConfig) -> DoctorCheck {
    let unwired: Vec<&str> = names::ALL
        .iter()
        .copied()
        .filter(|name| !config.capabilities.contains_key(*name))
        .collect();

    if unwired.is_empty() {
        DoctorCheck {
            name: "capability_wiring",
            status: CheckStatus::Pass,
            details: format!("all {} capabilities have endpoints", names::ALL.len()),
        }
    } else {
        DoctorCheck {
            name: "capability_wiring",
            status: CheckStatus::Fail,
            details: format!("no endpoint configured for: {}", unwired.join(", ")),
        }
    }
}

fn check_model_endpoint(config: &AppConfig) -> DoctorCheck {
    match config.llm.base_url.as_deref() {
        Some(url) => DoctorCheck {
            name: "model_endpoint",
            status: CheckStatus::Pass,
            details: format!("model `{}` served from `{url}`", config.llm.model),
        },
        None => DoctorCheck {
            name: "model_endpoint",
            status: CheckStatus::Fail,
            details: "llm.base_url is not set".to_string(),
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
