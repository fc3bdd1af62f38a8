use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::approvals::{DEFAULT_ARTIFACT_PREFIX, DEFAULT_MAX_BODY_CHARS, DEFAULT_MAX_SUBJECT_CHARS};
use crate::domain::capability::names;

pub const DEFAULT_CONFIG_FILE: &str = "bondline.toml";
pub const NESTED_CONFIG_FILE: &str = "config/bondline.toml";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub capabilities: BTreeMap<String, String>,
    pub approval: ApprovalConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

#[derive(Clone, Debug)]
pub struct ApprovalConfig {
    pub max_subject_chars: usize,
    pub max_body_chars: usize,
    pub artifact_prefix: String,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub base_url: Option<String>,
    pub api_key: Option<SecretString>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_turns: u32,
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
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub llm_base_url: Option<String>,
    pub llm_model: Option<String>,
    pub server_port: Option<u16>,
    pub capability_endpoints: BTreeMap<String, String>,
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

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig {
                connect_timeout_ms: 5_000,
                read_timeout_ms: 10_000,
                max_attempts: 3,
                base_backoff_ms: 100,
                max_backoff_ms: 2_000,
            },
            capabilities: BTreeMap::new(),
            approval: ApprovalConfig {
                max_subject_chars: DEFAULT_MAX_SUBJECT_CHARS,
                max_body_chars: DEFAULT_MAX_BODY_CHARS,
                artifact_prefix: DEFAULT_ARTIFACT_PREFIX.to_string(),
            },
            llm: LlmConfig {
                base_url: None,
                api_key: None,
                model: "claude-haiku".to_string(),
                timeout_secs: 60,
                max_turns: 8,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
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

/// Env var that overrides the endpoint of one capability,
/// e.g. `BONDLINE_CAPABILITY_GET_CUSTOMER_URL`.
pub fn capability_env_key(capability: &str) -> String {
    format!("BONDLINE_CAPABILITY_{}_URL", capability.to_ascii_uppercase())
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
        if let Some(gateway) = patch.gateway {
            if let Some(connect_timeout_ms) = gateway.connect_timeout_ms {
                self.gateway.connect_timeout_ms = connect_timeout_ms;
            }
            if let Some(read_timeout_ms) = gateway.read_timeout_ms {
                self.gateway.read_timeout_ms = read_timeout_ms;
            }
            if let Some(max_attempts) = gateway.max_attempts {
                self.gateway.max_attempts = max_attempts;
            }
            if let Some(base_backoff_ms) = gateway.base_backoff_ms {
                self.gateway.base_backoff_ms = base_backoff_ms;
            }
            if let Some(max_backoff_ms) = gateway.max_backoff_ms {
                self.gateway.max_backoff_ms = max_backoff_ms;
            }
        }

        if let Some(capabilities) = patch.capabilities {
            self.capabilities.extend(capabilities);
        }

        if let Some(approval) = patch.approval {
            if let Some(max_subject_chars) = approval.max_subject_chars {
                self.approval.max_subject_chars = max_subject_chars;
            }
            if let Some(max_body_chars) = approval.max_body_chars {
                self.approval.max_body_chars = max_body_chars;
            }
            if let Some(artifact_prefix) = approval.artifact_prefix {
                self.approval.artifact_prefix = artifact_prefix;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(api_key.into());
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_turns) = llm.max_turns {
                self.llm.max_turns = max_turns;
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
        if let Some(value) = read_env("BONDLINE_GATEWAY_CONNECT_TIMEOUT_MS") {
            self.gateway.connect_timeout_ms =
                parse_u64("BONDLINE_GATEWAY_CONNECT_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = read_env("BONDLINE_GATEWAY_READ_TIMEOUT_MS") {
            self.gateway.read_timeout_ms = parse_u64("BONDLINE_GATEWAY_READ_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = read_env("BONDLINE_GATEWAY_MAX_ATTEMPTS") {
            self.gateway.max_attempts = parse_u32("BONDLINE_GATEWAY_MAX_ATTEMPTS", &value)?;
        }

        for capability in names::ALL {
            if let Some(value) = read_env(&capability_env_key(capability)) {
                self.capabilities.insert((*capability).to_string(), value);
            }
        }

        if let Some(value) = read_env("BONDLINE_APPROVAL_MAX_SUBJECT_CHARS") {
            self.approval.max_subject_chars =
                parse_usize("BONDLINE_APPROVAL_MAX_SUBJECT_CHARS", &value)?;
        }
        if let Some(value) = read_env("BONDLINE_APPROVAL_MAX_BODY_CHARS") {
            self.approval.max_body_chars = parse_usize("BONDLINE_APPROVAL_MAX_BODY_CHARS", &value)?;
        }
        if let Some(value) = read_env("BONDLINE_APPROVAL_ARTIFACT_PREFIX") {
            self.approval.artifact_prefix = value;
        }

        if let Some(value) = read_env("BONDLINE_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("BONDLINE_LLM_API_KEY") {
            self.llm.api_key = Some(value.into());
        }
        if let Some(value) = read_env("BONDLINE_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("BONDLINE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("BONDLINE_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("BONDLINE_LLM_MAX_TURNS") {
            self.llm.max_turns = parse_u32("BONDLINE_LLM_MAX_TURNS", &value)?;
        }

        if let Some(value) = read_env("BONDLINE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("BONDLINE_SERVER_PORT") {
            self.server.port = parse_u16("BONDLINE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("BONDLINE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("BONDLINE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("BONDLINE_LOGGING_LEVEL").or_else(|| read_env("BONDLINE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("BONDLINE_LOGGING_FORMAT").or_else(|| read_env("BONDLINE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = Some(llm_base_url);
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(server_port) = overrides.server_port {
            self.server.port = server_port;
        }
        self.capabilities.extend(overrides.capability_endpoints);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_gateway(&self.gateway)?;
        validate_capabilities(&self.capabilities)?;
        validate_approval(&self.approval)?;
        validate_llm(&self.llm)?;
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

fn validate_gateway(gateway: &GatewayConfig) -> Result<(), ConfigError> {
    if gateway.connect_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "gateway.connect_timeout_ms must be greater than zero".to_string(),
        ));
    }
    if gateway.connect_timeout_ms >= gateway.read_timeout_ms {
        return Err(ConfigError::Validation(format!(
            "gateway.connect_timeout_ms ({}) must be lower than gateway.read_timeout_ms ({})",
            gateway.connect_timeout_ms, gateway.read_timeout_ms
        )));
    }
    if gateway.max_attempts == 0 || gateway.max_attempts > 10 {
        return Err(ConfigError::Validation(
            "gateway.max_attempts must be in range 1..=10".to_string(),
        ));
    }
    if gateway.base_backoff_ms > gateway.max_backoff_ms {
        return Err(ConfigError::Validation(
            "gateway.base_backoff_ms must not exceed gateway.max_backoff_ms".to_string(),
        ));
    }
    Ok(())
}

fn validate_capabilities(capabilities: &BTreeMap<String, String>) -> Result<(), ConfigError> {
    for (name, endpoint) in capabilities {
        if !names::ALL.contains(&name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "capabilities.{name} is not a known capability (expected one of {})",
                names::ALL.join("|")
            )));
        }
        let endpoint = endpoint.trim();
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "capabilities.{name} must start with http:// or https://"
            )));
        }
    }
    Ok(())
}

fn validate_approval(approval: &ApprovalConfig) -> Result<(), ConfigError> {
    if approval.max_subject_chars == 0 || approval.max_body_chars == 0 {
        return Err(ConfigError::Validation(
            "approval.max_subject_chars and approval.max_body_chars must be greater than zero"
                .to_string(),
        ));
    }
    if approval.artifact_prefix.trim_matches('/').trim().is_empty() {
        return Err(ConfigError::Validation(
            "approval.artifact_prefix must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }
    if llm.max_turns == 0 {
        return Err(ConfigError::Validation("llm.max_turns must be greater than zero".to_string()));
    }
    if let Some(base_url) = &llm.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }
    let blank_key = llm.api_key.as_ref().is_some_and(|key| key.expose_secret().trim().is_empty());
    if blank_key {
        return Err(ConfigError::Validation("llm.api_key must not be blank when set".to_string()));
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
    gateway: Option<GatewayPatch>,
    capabilities: Option<BTreeMap<String, String>>,
    approval: Option<ApprovalPatch>,
    llm: Option<LlmPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct GatewayPatch {
    connect_timeout_ms: Option<u64>,
    read_timeout_ms: Option<u64>,
    max_attempts: Option<u32>,
    base_backoff_ms: Option<u64>,
    max_backoff_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ApprovalPatch {
    max_subject_chars: Option<usize>,
    max_body_chars: Option<usize>,
    artifact_prefix: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    base_url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_turns: Option<u32>,
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

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{capability_env_key, AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_validate_with_tighter_connect_timeout() -> Result<(), String> {
        let config = AppConfig::default();
        config.validate().map_err(|err| err.to_string())?;
        ensure(
            config.gateway.connect_timeout_ms < config.gateway.read_timeout_ms,
            "connect timeout should be tighter than read timeout",
        )?;
        ensure(config.gateway.max_attempts == 3, "default attempt cap should be 3")?;
        ensure(config.approval.max_subject_chars == 200, "subject bound should default to 200")?;
        ensure(config.approval.max_body_chars == 10_000, "body bound should default to 10000")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_RECORDS_HOST", "records.internal");
        env::set_var("TEST_LLM_KEY", "sk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("bondline.toml");
            fs::write(
                &path,
                r#"
[capabilities]
get_customer = "https://${TEST_RECORDS_HOST}/get-customer"

[llm]
api_key = "${TEST_LLM_KEY}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.capabilities.get("get_customer").map(String::as_str)
                    == Some("https://records.internal/get-customer"),
                "capability endpoint should be interpolated from environment",
            )?;
            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret().to_string())
                    == Some("sk-from-env".to_string()),
                "api key should be interpolated from environment",
            )
        })();

        clear_vars(&["TEST_RECORDS_HOST", "TEST_LLM_KEY"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let list_key = capability_env_key("list_customers");
        env::set_var(&list_key, "http://from-env/list-customers");
        env::set_var("BONDLINE_LOG_LEVEL", "warn");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("bondline.toml");
            fs::write(
                &path,
                r#"
[capabilities]
list_customers = "http://from-file/list-customers"
get_customer = "http://from-file/get-customer"

[logging]
level = "error"
format = "json"
"#,
            )
            .map_err(|err| err.to_string())?;

            let mut capability_endpoints = BTreeMap::new();
            capability_endpoints
                .insert("get_customer".to_string(), "http://from-override/get-customer".to_string());

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    log_level: Some("debug".to_string()),
                    capability_endpoints,
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.capabilities["list_customers"] == "http://from-env/list-customers",
                "env endpoint should win over file",
            )?;
            ensure(
                config.capabilities["get_customer"] == "http://from-override/get-customer",
                "override endpoint should win over file",
            )?;
            ensure(config.logging.level == "debug", "override log level should win over env")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "file log format should win over default",
            )
        })();

        clear_vars(&[&list_key, "BONDLINE_LOG_LEVEL"]);
        result
    }

    #[test]
    fn unknown_capability_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let mut capability_endpoints = BTreeMap::new();
        capability_endpoints.insert("send_fax".to_string(), "http://fax".to_string());

        let error = match AppConfig::load(LoadOptions {
            overrides: ConfigOverrides { capability_endpoints, ..ConfigOverrides::default() },
            ..LoadOptions::default()
        }) {
            Ok(_) => return Err("expected validation failure but config load succeeded".to_string()),
            Err(error) => error,
        };
        ensure(
            matches!(error, ConfigError::Validation(ref message) if message.contains("capabilities.send_fax")),
            "validation failure should name the offending capability",
        )
    }

    #[test]
    fn connect_timeout_must_be_tighter_than_read_timeout() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("BONDLINE_GATEWAY_CONNECT_TIMEOUT_MS", "10000");
        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("expected timeout validation failure".to_string()),
            Err(ConfigError::Validation(message)) => ensure(
                message.contains("gateway.connect_timeout_ms"),
                "validation failure should mention gateway.connect_timeout_ms",
            ),
            Err(other) => Err(format!("unexpected error: {other}")),
        };
        clear_vars(&["BONDLINE_GATEWAY_CONNECT_TIMEOUT_MS"]);
        result
    }

    #[test]
    fn invalid_numeric_env_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("BONDLINE_GATEWAY_MAX_ATTEMPTS", "many");
        let result = ensure(
            matches!(
                AppConfig::load(LoadOptions::default()),
                Err(ConfigError::InvalidEnvOverride { ref key, .. }) if key == "BONDLINE_GATEWAY_MAX_ATTEMPTS"
            ),
            "non-numeric attempt cap should be rejected",
        );
        clear_vars(&["BONDLINE_GATEWAY_MAX_ATTEMPTS"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("BONDLINE_LLM_API_KEY", "sk-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )
        })();

        clear_vars(&["BONDLINE_LLM_API_KEY"]);
        result
    }
}
