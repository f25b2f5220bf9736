//! Service configuration.
//!
//! Every option can be given on the command line or through the environment
//! (a `.env` file is loaded first by `main`).

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};

use crate::api::server::ApiServerConfig;
use crate::progress::{DEFAULT_POLL_INTERVAL, clamp_poll_interval};
use crate::{Error, Result};

/// Command line of the `asset-processor` binary.
#[derive(Parser, Debug, Clone)]
#[command(name = "asset-processor", version)]
#[command(about = "Converts uploaded 3D assets one job at a time and reports progress over HTTP")]
pub struct Cli {
    /// Root of the upload tree (`<base>/<type>/<id>/`)
    #[arg(long, env = "UPLOAD_BASE_PATH", default_value = "/app/uploads")]
    pub upload_base_path: PathBuf,

    /// Address the HTTP server binds to
    #[arg(long, env = "API_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Port the HTTP server listens on
    #[arg(long, env = "API_PORT", default_value_t = 7999)]
    pub port: u16,

    /// Enable permissive CORS headers
    #[arg(long, env = "ENABLE_CORS", default_value_t = true, action = ArgAction::Set)]
    pub enable_cors: bool,

    /// Log-tail poll interval in milliseconds (clamped to 100-500)
    #[arg(long, env = "PROGRESS_POLL_INTERVAL_MS", default_value_t = 250)]
    pub progress_poll_interval_ms: u64,

    /// Schwarzwald executable
    #[arg(long, env = "SCHWARZWALD_PATH", default_value = "Schwarzwald")]
    pub schwarzwald_path: String,

    /// Cache size passed to Schwarzwald
    #[arg(long, env = "SCHWARZWALD_CACHE_SIZE", default_value = "256MB")]
    pub schwarzwald_cache_size: String,

    /// splat-transform executable
    #[arg(long, env = "SPLAT_TRANSFORM_PATH", default_value = "splat-transform")]
    pub splat_transform_path: String,

    /// Rotation (x,y,z degrees) applied to splats
    #[arg(long, env = "SPLAT_ROTATION", default_value = "0,0,180")]
    pub splat_rotation: String,

    /// Run external tools under `stdbuf -oL` so their logs flush per line
    #[arg(long, env = "LINE_BUFFER_TOOLS", default_value_t = true, action = ArgAction::Set)]
    pub line_buffer_tools: bool,

    /// Start the oldest queued job as soon as the running one settles
    #[arg(long, env = "AUTO_ADVANCE", default_value_t = false, action = ArgAction::Set)]
    pub auto_advance: bool,

    /// Token required by the restart endpoint; the endpoint is disabled when unset
    #[arg(long, env = "ADMIN_TOKEN", hide_env_values = true)]
    pub admin_token: Option<String>,

    /// Directory for daily-rotated service logs; console only when unset
    #[arg(long, env = "LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

impl Cli {
    /// Check values clap cannot validate on its own.
    pub fn validate(&self) -> Result<()> {
        if self.upload_base_path.as_os_str().is_empty() {
            return Err(Error::config("UPLOAD_BASE_PATH must not be empty"));
        }
        if self.schwarzwald_path.trim().is_empty() || self.splat_transform_path.trim().is_empty() {
            return Err(Error::config("Tool paths must not be empty"));
        }
        if self.schwarzwald_cache_size.trim().is_empty() {
            return Err(Error::config("SCHWARZWALD_CACHE_SIZE must not be empty"));
        }
        parse_rotation(&self.splat_rotation)?;
        if self
            .admin_token
            .as_deref()
            .is_some_and(|token| token.trim().is_empty())
        {
            return Err(Error::config("ADMIN_TOKEN must not be blank when set"));
        }
        Ok(())
    }

    pub fn service_config(&self) -> ServiceConfig {
        let poll_interval = Duration::from_millis(self.progress_poll_interval_ms);
        ServiceConfig {
            base_path: self.upload_base_path.clone(),
            poll_interval: clamp_poll_interval(poll_interval),
            auto_advance: self.auto_advance,
            tools: ToolConfig {
                schwarzwald_path: self.schwarzwald_path.clone(),
                schwarzwald_cache_size: self.schwarzwald_cache_size.clone(),
                splat_transform_path: self.splat_transform_path.clone(),
                splat_rotation: self.splat_rotation.clone(),
                line_buffered: self.line_buffer_tools,
            },
        }
    }

    pub fn api_config(&self) -> ApiServerConfig {
        ApiServerConfig {
            bind_address: self.bind_address.clone(),
            port: self.port,
            enable_cors: self.enable_cors,
        }
    }
}

/// Parse an `x,y,z` rotation in degrees.
pub fn parse_rotation(value: &str) -> Result<[f64; 3]> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    let invalid = || Error::config(format!("Invalid rotation '{value}', expected x,y,z"));
    let [x, y, z] = parts.as_slice() else {
        return Err(invalid());
    };
    Ok([
        x.parse().map_err(|_| invalid())?,
        y.parse().map_err(|_| invalid())?,
        z.parse().map_err(|_| invalid())?,
    ])
}

/// External tool invocation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolConfig {
    pub schwarzwald_path: String,
    pub schwarzwald_cache_size: String,
    pub splat_transform_path: String,
    pub splat_rotation: String,
    pub line_buffered: bool,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            schwarzwald_path: "Schwarzwald".to_string(),
            schwarzwald_cache_size: "256MB".to_string(),
            splat_transform_path: "splat-transform".to_string(),
            splat_rotation: "0,0,180".to_string(),
            line_buffered: true,
        }
    }
}

/// Settings shared by the registry and the conversion handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub base_path: PathBuf,
    pub poll_interval: Duration,
    pub auto_advance: bool,
    pub tools: ToolConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("/app/uploads"),
            poll_interval: DEFAULT_POLL_INTERVAL,
            auto_advance: false,
            tools: ToolConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_arguments_override_defaults() {
        let cli = Cli::try_parse_from([
            "asset-processor",
            "--upload-base-path",
            "/data/uploads",
            "--port",
            "8080",
            "--progress-poll-interval-ms",
            "20",
            "--line-buffer-tools",
            "false",
            "--auto-advance",
            "true",
            "--admin-token",
            "secret",
        ])
        .unwrap();
        cli.validate().unwrap();

        let service = cli.service_config();
        assert_eq!(service.base_path, PathBuf::from("/data/uploads"));
        assert_eq!(service.poll_interval, Duration::from_millis(100));
        assert!(service.auto_advance);
        assert!(!service.tools.line_buffered);

        let api = cli.api_config();
        assert_eq!(api.port, 8080);
        assert_eq!(cli.admin_token.as_deref(), Some("secret"));
    }

    #[test]
    fn rotation_must_have_three_components() {
        assert_eq!(parse_rotation("0,0,180").unwrap(), [0.0, 0.0, 180.0]);
        assert_eq!(parse_rotation(" 90 , -45.5, 0").unwrap(), [90.0, -45.5, 0.0]);
        assert!(parse_rotation("0,180").is_err());
        assert!(parse_rotation("a,b,c").is_err());
    }

    #[test]
    fn blank_admin_token_is_rejected() {
        let cli = Cli::try_parse_from(["asset-processor", "--admin-token", " "]).unwrap();
        assert!(matches!(cli.validate(), Err(Error::Configuration(_))));
    }
}
