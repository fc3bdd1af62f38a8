use std::env;
use std::sync::{Mutex, OnceLock};

use bondline_cli::commands::{classify, config, doctor, preview};
use bondline_core::config::capability_env_key;
use bondline_core::domain::action::ActionRequest;
use bondline_core::domain::capability::names;
use bondline_core::fingerprint;
use serde_json::Value;

#[test]
fn classify_reports_fast_path_with_matched_keywords() {
    let result = classify::run("Please SUGGEST follow-up prompts as a JSON array");
    assert_eq!(result.exit_code, 0);

    let payload = parse_payload(&result.output);
    assert_eq!(payload["command"], "classify");
    assert_eq!(payload["status"], "ok");
    assert_eq!(payload["data"]["path"], "fast_path");
    let matched = payload["data"]["matched_keywords"].as_array().expect("keyword list");
    assert!(matched.iter().any(|keyword| keyword == "suggest"));
    assert!(matched.iter().any(|keyword| keyword == "json array"));
}

#[test]
fn classify_routes_ordinary_requests_to_orchestration() {
    let result = classify::run("Send the quarterly update to jane@example.com");

    let payload = parse_payload(&result.output);
    assert_eq!(payload["data"]["path"], "orchestrated");
    assert_eq!(payload["data"]["matched_keywords"], Value::Array(vec![]));
}

#[test]
fn preview_returns_content_fingerprint_without_sending() {
    with_env(&[], || {
        let result = preview::run("jane@example.com", "Rate update", "New coupon is 4.1%.");
        assert_eq!(result.exit_code, 0, "expected preview success");

        let payload = parse_payload(&result.output);
        let expected =
            fingerprint(&ActionRequest::new("jane@example.com", "Rate update", "New coupon is 4.1%."));
        assert_eq!(payload["command"], "preview");
        assert_eq!(payload["data"]["preview_id"], expected.as_str());
        assert_eq!(payload["data"]["recipient"], "jane@example.com");
    });
}

#[test]
fn preview_rejects_malformed_recipient_as_validation() {
    with_env(&[], || {
        let result = preview::run("not-an-address", "Hello", "Body");
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "validation");
        assert!(payload["message"].as_str().is_some_and(|message| message.starts_with("recipient")));
    });
}

#[test]
fn preview_reports_config_failure() {
    with_env(&[("BONDLINE_GATEWAY_MAX_ATTEMPTS", "lots")], || {
        let result = preview::run("jane@example.com", "Hello", "Body");
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn doctor_fails_when_capabilities_are_unwired() {
    with_env(&[("BONDLINE_LLM_BASE_URL", "http://model.internal/turns")], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 1);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "fail");
        let wiring = check(&payload, "capability_wiring");
        assert_eq!(wiring["status"], "fail");
        assert!(wiring["details"].as_str().is_some_and(|details| details.contains(names::WRITE_FILE)));
        assert_eq!(check(&payload, "model_endpoint")["status"], "pass");
    });
}

#[test]
fn doctor_passes_when_everything_is_wired() {
    let endpoint_vars: Vec<(String, String)> = names::ALL
        .iter()
        .map(|name| (capability_env_key(name), format!("http://records.internal/{name}")))
        .collect();
    let mut vars: Vec<(&str, &str)> =
        endpoint_vars.iter().map(|(key, value)| (key.as_str(), value.as_str())).collect();
    vars.push(("BONDLINE_LLM_BASE_URL", "http://model.internal/turns"));

    with_env(&vars, || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 0, "expected every readiness check to pass");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "pass");
    });
}

#[test]
fn doctor_skips_downstream_checks_when_config_is_invalid() {
    with_env(&[("BONDLINE_GATEWAY_CONNECT_TIMEOUT_MS", "60000")], || {
        let result = doctor::run(false);
        assert_eq!(result.exit_code, 1);
        assert!(result.output.contains("- [fail] config_validation"));
        assert!(result.output.contains("- [skip] capability_wiring"));
        assert!(result.output.contains("- [skip] model_endpoint"));
    });
}

#[test]
fn config_attributes_env_sources_and_redacts_secrets() {
    let list_key = capability_env_key(names::LIST_CUSTOMERS);
    with_env(
        &[
            ("BONDLINE_LLM_API_KEY", "sk-very-secret"),
            (list_key.as_str(), "http://records.internal/list"),
        ],
        || {
            let output = config::run();
            assert!(output.contains("- llm.api_key = sk-*** (source: env (BONDLINE_LLM_API_KEY))"));
            assert!(!output.contains("very-secret"));
            assert!(output.contains(&format!(
                "- capabilities.list_customers = http://records.internal/list (source: env ({list_key}))"
            )));
            assert!(output.contains("- capabilities.write_file = <unwired> (source: default)"));
        },
    );
}

fn check<'a>(payload: &'a Value, name: &str) -> &'a Value {
    payload["checks"]
        .as_array()
        .and_then(|checks| checks.iter().find(|check| check["name"] == name))
        .expect("check should be present")
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let mut keys: Vec<String> = [
        "BONDLINE_GATEWAY_CONNECT_TIMEOUT_MS",
        "BONDLINE_GATEWAY_READ_TIMEOUT_MS",
        "BONDLINE_GATEWAY_MAX_ATTEMPTS",
        "BONDLINE_APPROVAL_MAX_SUBJECT_CHARS",
        "BONDLINE_APPROVAL_MAX_BODY_CHARS",
        "BONDLINE_APPROVAL_ARTIFACT_PREFIX",
        "BONDLINE_LLM_BASE_URL",
        "BONDLINE_LLM_API_KEY",
        "BONDLINE_LLM_MODEL",
        "BONDLINE_LLM_TIMEOUT_SECS",
        "BONDLINE_LLM_MAX_TURNS",
        "BONDLINE_SERVER_BIND_ADDRESS",
        "BONDLINE_SERVER_PORT",
        "BONDLINE_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "BONDLINE_LOGGING_LEVEL",
        "BONDLINE_LOGGING_FORMAT",
        "BONDLINE_LOG_LEVEL",
        "BONDLINE_LOG_FORMAT",
    ]
    .iter()
    .map(|key| (*key).to_string())
    .collect();
    keys.extend(names::ALL.iter().map(|name| capability_env_key(name)));

    let previous_values: Vec<(String, Option<String>)> =
        keys.iter().map(|key| (key.clone(), env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(&key, value);
        } else {
            env::remove_var(&key);
        }
    }
}
