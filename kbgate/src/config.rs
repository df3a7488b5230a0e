//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `KBGATE_CONFIG`
//! environment variable. A missing file is not an error: every field has a default.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `KBGATE_` override YAML values
//! 3. **API_ENDPOINT** - Special case: overrides `backend.url` if set
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `KBGATE_STAGING__MODE=disk` sets the `staging.mode` field.
//!
//! ## The backend endpoint
//!
//! `backend.url` is deliberately optional. A gateway started without it still serves health
//! checks and docs; upload requests fail with a configuration error until it is set.
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # Where uploads are forwarded
//! API_ENDPOINT="http://rag-tools:5000/process_rag"
//!
//! # Or, equivalently
//! KBGATE_BACKEND__URL="http://rag-tools:5000/process_rag"
//!
//! # Stage uploads on disk instead of in memory
//! KBGATE_STAGING__MODE=disk
//! KBGATE_STAGING__DIR=/var/tmp/kbgate
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "KBGATE_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Document-processing backend that uploads are relayed to
    pub backend: BackendConfig,
    /// Where uploads are held between receiving and forwarding
    pub staging: StagingConfig,
    /// Maximum accepted size of an upload request body, in bytes
    pub max_upload_size: usize,
    pub cors: CorsConfig,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendConfig {
    /// Full URL the multipart upload is POSTed to
    pub url: Option<Url>,
}

/// Staging configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StagingConfig {
    pub mode: StagingMode,
    /// Directory for `disk` staging (default: the system temp directory)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StagingMode {
    /// Buffer uploads in memory
    #[default]
    Memory,
    /// Write uploads to per-request temporary files
    Disk,
}

/// CORS (Cross-Origin Resource Sharing) configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests
    pub allowed_origins: Vec<CorsOrigin>,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

/// CORS origin specification.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://app.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            backend: BackendConfig::default(),
            staging: StagingConfig::default(),
            max_upload_size: 100 * 1024 * 1024,
            cors: CorsConfig::default(),
            enable_otel_export: false,
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;

        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_upload_size == 0 {
            return Err(Error::Config {
                message: "max_upload_size must be greater than 0".to_string(),
            });
        }

        if self.staging.mode == StagingMode::Disk
            && let Some(dir) = &self.staging.dir
            && !dir.is_dir()
        {
            return Err(Error::Config {
                message: format!("staging.dir {} is not an existing directory", dir.display()),
            });
        }

        if self.backend.url.is_none() {
            tracing::warn!("No backend endpoint configured (set backend.url or API_ENDPOINT); uploads will be rejected");
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values (KBGATE_CONFIG is the CLI's)
            .merge(Env::prefixed("KBGATE_").ignore(&["config"]).split("__"))
            // The endpoint variable the web front end has always used
            .merge(Env::raw().only(&["API_ENDPOINT"]).map(|_| "backend.url".into()))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
