//! Configuration management

use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::forwarder::DEFAULT_PROXY_URL;
use crate::node::{NodeSettings, Role};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Relay configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub listen_addr: SocketAddr,
    pub role: Role,
    pub private_key_path: Option<PathBuf>,
    pub password: String,
    /// `None` means the role's default limit.
    pub max_payload_bytes: Option<usize>,
    /// Empty string disables the proxy.
    pub proxy_url: String,
    pub display_name: Option<String>,
    pub annotate_responses: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8084)),
            role: Role::Guard,
            private_key_path: None,
            password: String::new(),
            max_payload_bytes: None,
            proxy_url: DEFAULT_PROXY_URL.to_string(),
            display_name: None,
            annotate_responses: false,
        }
    }
}

impl std::fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayConfig")
            .field("listen_addr", &self.listen_addr)
            .field("role", &self.role)
            .field("private_key_path", &self.private_key_path)
            .field("password", &"[REDACTED]")
            .field("max_payload_bytes", &self.effective_max_payload())
            .field("proxy_url", &self.proxy_url)
            .field("display_name", &self.display_name.as_ref().map(|_| "[SET]"))
            .field("annotate_responses", &self.annotate_responses)
            .finish()
    }
}

impl RelayConfig {
    /// Load configuration from environment variables, command line, and TOML file
    pub fn load() -> Result<Self, ConfigError> {
        let args: Vec<String> = std::env::args().collect();
        Self::load_from(&args, |key| std::env::var(key).ok())
    }

    /// Same as [`RelayConfig::load`] with the argument list and environment
    /// supplied by the caller.
    pub fn load_from<F>(args: &[String], env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Start with defaults
        let mut config = Self::default();

        config.load_from_env(&env)?;

        // Load from command line arguments
        let mut config_path = env("OC_RELAY_CONFIG");
        if let Some(path) = config.load_from_args(args)? {
            config_path = Some(path);
        }

        // Load from TOML config file (if specified)
        if let Some(path) = config_path {
            config.load_from_toml(&path)?;
        }

        config.validate()?;

        Ok(config)
    }

    fn load_from_env<F>(&mut self, env: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = env("OC_RELAY_LISTEN_ADDR") {
            self.listen_addr = addr
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("Invalid listen_addr: {}", e)))?;
        }

        if let Some(role) = env("OC_RELAY_ROLE") {
            self.role = role.parse().map_err(ConfigError::Invalid)?;
        }

        if let Some(path) = env("OC_RELAY_KEY_PATH") {
            self.private_key_path = Some(PathBuf::from(path));
        }

        if let Some(password) = env("OC_RELAY_PASSWORD") {
            self.password = password;
        }

        if let Some(max) = env("OC_RELAY_MAX_PAYLOAD") {
            self.max_payload_bytes = Some(parse_size(&max)?);
        }

        if let Some(proxy) = env("OC_RELAY_PROXY") {
            self.proxy_url = proxy;
        }

        if let Some(name) = env("OC_RELAY_DISPLAY_NAME") {
            self.display_name = Some(name);
        }

        if let Some(annotate) = env("OC_RELAY_ANNOTATE") {
            self.annotate_responses = matches!(annotate.as_str(), "1" | "true" | "yes");
        }

        Ok(())
    }

    /// Load from command line arguments. Returns the `--config` path, if any.
    fn load_from_args(&mut self, args: &[String]) -> Result<Option<String>, ConfigError> {
        fn value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str, ConfigError> {
            args.get(i + 1)
                .map(String::as_str)
                .ok_or_else(|| ConfigError::Invalid(format!("{} requires a value", flag)))
        }

        let mut config_path = None;
        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--listen-addr" | "-l" => {
                    self.listen_addr = value(args, i, "--listen-addr")?
                        .parse()
                        .map_err(|e| ConfigError::Invalid(format!("Invalid listen_addr: {}", e)))?;
                    i += 2;
                }
                "--role" => {
                    self.role = value(args, i, "--role")?
                        .parse()
                        .map_err(ConfigError::Invalid)?;
                    i += 2;
                }
                "--key" | "-s" => {
                    self.private_key_path = Some(PathBuf::from(value(args, i, "--key")?));
                    i += 2;
                }
                "--password" | "-p" => {
                    self.password = value(args, i, "--password")?.to_string();
                    i += 2;
                }
                "--max-payload" => {
                    self.max_payload_bytes = Some(parse_size(value(args, i, "--max-payload")?)?);
                    i += 2;
                }
                "--proxy" => {
                    self.proxy_url = value(args, i, "--proxy")?.to_string();
                    i += 2;
                }
                "--display-name" => {
                    self.display_name = Some(value(args, i, "--display-name")?.to_string());
                    i += 2;
                }
                "--annotate" => {
                    self.annotate_responses = true;
                    i += 1;
                }
                "--config" | "-f" => {
                    config_path = Some(value(args, i, "--config")?.to_string());
                    i += 2;
                }
                _ => {
                    i += 1;
                }
            }
        }
        Ok(config_path)
    }

    /// Load from TOML config file
    fn load_from_toml(&mut self, path: &str) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path)?;
        self.apply_toml(&content)
    }

    fn apply_toml(&mut self, content: &str) -> Result<(), ConfigError> {
        let toml_config: toml::Value = toml::from_str(content)?;

        if let Some(addr) = toml_config.get("listen_addr").and_then(|v| v.as_str()) {
            self.listen_addr = addr
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("Invalid listen_addr in TOML: {}", e)))?;
        }

        if let Some(role) = toml_config.get("role").and_then(|v| v.as_str()) {
            self.role = role.parse().map_err(ConfigError::Invalid)?;
        }

        if let Some(path) = toml_config.get("private_key_path").and_then(|v| v.as_str()) {
            self.private_key_path = Some(PathBuf::from(path));
        }

        if let Some(password) = toml_config.get("password").and_then(|v| v.as_str()) {
            self.password = password.to_string();
        }

        if let Some(max) = toml_config.get("max_payload_bytes").and_then(|v| v.as_integer()) {
            self.max_payload_bytes = Some(usize::try_from(max).map_err(|_| {
                ConfigError::Invalid(format!("Invalid max_payload_bytes in TOML: {}", max))
            })?);
        }

        if let Some(proxy) = toml_config.get("proxy_url").and_then(|v| v.as_str()) {
            self.proxy_url = proxy.to_string();
        }

        if let Some(name) = toml_config.get("display_name").and_then(|v| v.as_str()) {
            self.display_name = Some(name.to_string());
        }

        if let Some(annotate) = toml_config.get("annotate_responses").and_then(|v| v.as_bool()) {
            self.annotate_responses = annotate;
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.password.is_empty() {
            return Err(ConfigError::Invalid("password must be set".to_string()));
        }

        if self.effective_max_payload() == 0 {
            return Err(ConfigError::Invalid("max_payload_bytes must be > 0".to_string()));
        }

        if self.role == Role::Guard {
            match &self.private_key_path {
                None => {
                    return Err(ConfigError::Invalid(
                        "guard role requires a private key file".to_string(),
                    ))
                }
                Some(path) if !path.exists() => {
                    return Err(ConfigError::Invalid(format!(
                        "Key file not found: {:?}",
                        path
                    )))
                }
                Some(_) => {}
            }
        }

        Ok(())
    }

    pub fn effective_max_payload(&self) -> usize {
        self.max_payload_bytes
            .unwrap_or_else(|| self.role.default_max_payload())
    }

    pub fn proxy(&self) -> Option<&str> {
        Some(self.proxy_url.as_str()).filter(|p| !p.is_empty())
    }

    pub fn node_settings(&self) -> NodeSettings {
        NodeSettings {
            password: self.password.clone(),
            max_payload_bytes: self.effective_max_payload(),
            annotate_responses: self.annotate_responses,
        }
    }
}

pub(crate) fn parse_size(s: &str) -> Result<usize, ConfigError> {
    s.trim()
        .parse()
        .map_err(|e| ConfigError::Invalid(format!("Invalid max_payload_bytes: {}", e)))
}
