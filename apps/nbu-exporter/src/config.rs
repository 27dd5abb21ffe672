//! Exporter configuration file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use nbu_client::ProtocolVersion;
use nbu_observe::{LoggerConfig, LoggerFormat};
use nbu_prometheus::CollectorOptions;
use serde::Deserialize;
use thiserror::Error;

/// Environment variable that replaces `nbuserver.api_key`.
pub const API_KEY_ENV: &str = "NBU_API_KEY";

pub const MAX_SCRAPE_TIMEOUT: Duration = Duration::from_secs(60 * 60);
pub const MAX_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(60 * 60);
pub const MAX_JOBS_WINDOW: Duration = Duration::from_secs(366 * 24 * 60 * 60);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn check_duration(field: &'static str, value: Duration, max: Duration) -> Result<(), ConfigError> {
    if value.is_zero() {
        return Err(invalid(field, "must be positive"));
    }
    if value > max {
        return Err(invalid(
            field,
            format!(
                "{} exceeds the maximum of {}",
                humantime_serde::re::humantime::format_duration(value),
                humantime_serde::re::humantime::format_duration(max)
            ),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub nbuserver: NbuServerConfig,
}

/// Exporter HTTP listener and process settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub uri: String,
    #[serde(with = "humantime_serde")]
    pub scrape_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    pub log_format: LoggerFormat,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 2112,
            uri: "/metrics".to_string(),
            scrape_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(10),
            log_format: LoggerFormat::Text,
            log_level: "info".to_string(),
        }
    }
}

/// NetBackup primary server connection.
#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NbuServerConfig {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub uri: String,
    pub api_key: String,
    /// Empty means negotiate on first scrape.
    pub api_version: String,
    pub insecure_skip_verify: bool,
    #[serde(with = "humantime_serde")]
    pub jobs_window: Duration,
    pub page_limit: u32,
    pub max_pages: u32,
    pub trace_requests: bool,
}

impl Default for NbuServerConfig {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            host: String::new(),
            port: 1556,
            uri: "/netbackup".to_string(),
            api_key: String::new(),
            api_version: String::new(),
            insecure_skip_verify: false,
            jobs_window: Duration::from_secs(300),
            page_limit: 100,
            max_pages: 50,
            trace_requests: false,
        }
    }
}

impl std::fmt::Debug for NbuServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NbuServerConfig")
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("uri", &self.uri)
            .field("api_key", &"<redacted>")
            .field("api_version", &self.api_version)
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .field("jobs_window", &self.jobs_window)
            .field("page_limit", &self.page_limit)
            .field("max_pages", &self.max_pages)
            .field("trace_requests", &self.trace_requests)
            .finish()
    }
}

impl Config {
    /// Reads `path` and applies the `NBU_API_KEY` override.
    ///
    /// The result is not validated; call [`Config::validate`] after CLI overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn parse(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(API_KEY_ENV).filter(|k| !k.trim().is_empty()) {
            self.nbuserver.api_key = key;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let server = &self.server;
        if server.host.trim().is_empty() {
            return Err(invalid("server.host", "must not be empty"));
        }
        if server.port == 0 {
            return Err(invalid("server.port", "must be non-zero"));
        }
        if !server.uri.starts_with('/') {
            return Err(invalid("server.uri", "must start with '/'"));
        }
        check_duration("server.scrape_timeout", server.scrape_timeout, MAX_SCRAPE_TIMEOUT)?;
        check_duration(
            "server.shutdown_timeout",
            server.shutdown_timeout,
            MAX_SHUTDOWN_TIMEOUT,
        )?;
        if server.log_level.trim().is_empty() {
            return Err(invalid("server.log_level", "must not be empty"));
        }

        let nbu = &self.nbuserver;
        if !matches!(nbu.scheme.as_str(), "http" | "https") {
            return Err(invalid(
                "nbuserver.scheme",
                format!("expected http or https, got {:?}", nbu.scheme),
            ));
        }
        if nbu.host.trim().is_empty() {
            return Err(invalid("nbuserver.host", "must not be empty"));
        }
        if nbu.port == 0 {
            return Err(invalid("nbuserver.port", "must be non-zero"));
        }
        if !nbu.uri.starts_with('/') {
            return Err(invalid("nbuserver.uri", "must start with '/'"));
        }
        if nbu.api_key.trim().is_empty() {
            return Err(invalid(
                "nbuserver.api_key",
                format!("must be set in the config file or via {API_KEY_ENV}"),
            ));
        }
        self.api_version()?;
        check_duration("nbuserver.jobs_window", nbu.jobs_window, MAX_JOBS_WINDOW)?;
        if nbu.page_limit == 0 {
            return Err(invalid("nbuserver.page_limit", "must be positive"));
        }
        if nbu.max_pages == 0 {
            return Err(invalid("nbuserver.max_pages", "must be positive"));
        }
        Ok(())
    }

    /// Configured API version, `None` when it should be negotiated.
    pub fn api_version(&self) -> Result<Option<ProtocolVersion>, ConfigError> {
        let raw = self.nbuserver.api_version.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse()
            .map(Some)
            .map_err(|e| invalid("nbuserver.api_version", format!("{e}")))
    }

    pub fn base_url(&self) -> String {
        let nbu = &self.nbuserver;
        format!(
            "{}://{}:{}{}",
            nbu.scheme,
            nbu.host,
            nbu.port,
            nbu.uri.trim_end_matches('/')
        )
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn collector_options(&self) -> Result<CollectorOptions, ConfigError> {
        Ok(CollectorOptions {
            version: self.api_version()?,
            jobs_window: self.nbuserver.jobs_window,
            page_limit: self.nbuserver.page_limit,
            max_pages: self.nbuserver.max_pages,
            ..CollectorOptions::default()
        })
    }

    pub fn logger_config(&self) -> LoggerConfig {
        LoggerConfig::new(self.server.log_format, self.server.log_level.trim())
    }
}
