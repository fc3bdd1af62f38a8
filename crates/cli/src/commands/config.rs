use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use bondline_core::config::{
    capability_env_key, AppConfig, LoadOptions, DEFAULT_CONFIG_FILE, NESTED_CONFIG_FILE,
};
use bondline_core::domain::capability::names;
use secrecy::ExposeSecret;
use toml::Value;

struct Sources {
    doc: Option<Value>,
    path: Option<PathBuf>,
}

impl Sources {
    fn detect() -> Self {
        let path = detect_config_path();
        let doc = load_config_file_doc(path.as_deref());
        Self { doc, path }
    }

    fn line(&self, key_path: &str, value: &str, env_key: &str) -> String {
        render_line(key_path, value, self.source_of(key_path, Some(env_key)))
    }

    fn source_of(&self, key_path: &str, env_key: Option<&str>) -> String {
        if let Some(env_key) = env_key {
            if env::var_os(env_key).is_some() {
                return format!("env ({env_key})");
            }
        }

        if let Some(doc) = &self.doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .path
                    .as_ref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };
    let sources = Sources::detect();

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    let gateway = &config.gateway;
    lines.push(sources.line(
        "gateway.connect_timeout_ms",
        &gateway.connect_timeout_ms.to_string(),
        "BONDLINE_GATEWAY_CONNECT_TIMEOUT_MS",
    ));
    lines.push(sources.line(
        "gateway.read_timeout_ms",
        &gateway.read_timeout_ms.to_string(),
        "BONDLINE_GATEWAY_READ_TIMEOUT_MS",
    ));
    lines.push(sources.line(
        "gateway.max_attempts",
        &gateway.max_attempts.to_string(),
        "BONDLINE_GATEWAY_MAX_ATTEMPTS",
    ));

    for name in names::ALL {
        let key_path = format!("capabilities.{name}");
        let value = config.capabilities.get(*name).map(String::as_str).unwrap_or("<unwired>");
        lines.push(sources.line(&key_path, value, &capability_env_key(name)));
    }

    lines.push(sources.line(
        "approval.max_subject_chars",
        &config.approval.max_subject_chars.to_string(),
        "BONDLINE_APPROVAL_MAX_SUBJECT_CHARS",
    ));
    lines.push(sources.line(
        "approval.max_body_chars",
        &config.approval.max_body_chars.to_string(),
        "BONDLINE_APPROVAL_MAX_BODY_CHARS",
    ));
    lines.push(sources.line(
        "approval.artifact_prefix",
        &config.approval.artifact_prefix,
        "BONDLINE_APPROVAL_ARTIFACT_PREFIX",
    ));

    lines.push(sources.line(
        "llm.base_url",
        config.llm.base_url.as_deref().unwrap_or("<unset>"),
        "BONDLINE_LLM_BASE_URL",
    ));
    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact_secret(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());
    lines.push(sources.line("llm.api_key", &api_key, "BONDLINE_LLM_API_KEY"));
    lines.push(sources.line("llm.model", &config.llm.model, "BONDLINE_LLM_MODEL"));
    lines.push(sources.line(
        "llm.max_turns",
        &config.llm.max_turns.to_string(),
        "BONDLINE_LLM_MAX_TURNS",
    ));

    lines.push(sources.line(
        "server.bind_address",
        &config.server.bind_address,
        "BONDLINE_SERVER_BIND_ADDRESS",
    ));
    lines.push(sources.line("server.port", &config.server.port.to_string(), "BONDLINE_SERVER_PORT"));

    lines.push(sources.line("logging.level", &config.logging.level, "BONDLINE_LOGGING_LEVEL"));
    lines.push(sources.line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        "BONDLINE_LOGGING_FORMAT",
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    [DEFAULT_CONFIG_FILE, NESTED_CONFIG_FILE].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
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
