//! Telemetry configuration from environment variables.

use std::env;

/// Dependencies that log far too much at `info` and below.
const QUIET_DIRECTIVES: &[&str] = &["hyper=warn", "h2=warn", "reqwest=warn", "tower_http=warn"];

/// Logging configuration for a gateway process.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to every log line
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error) or a full directive list
    pub log_level: String,

    /// Whether to enable console output
    pub console_output: bool,

    /// Whether to emit JSON formatted logs
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "chain-gateway".to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `GW_SERVICE_NAME`: Service name (default: chain-gateway)
    /// - `GW_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `GW_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `GW_JSON_LOGS`: Enable JSON logs (default: false in dev, true in containers)
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();

        Self {
            service_name: env::var("GW_SERVICE_NAME")
                .unwrap_or_else(|_| "chain-gateway".to_string()),

            log_level: env::var("GW_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            console_output: env::var("GW_CONSOLE_OUTPUT")
                .map(|v| parse_flag(&v, true))
                .unwrap_or(true),

            json_logs: env::var("GW_JSON_LOGS")
                .map(|v| parse_flag(&v, false))
                .unwrap_or(is_container),
        }
    }

    /// Filter directives: the configured level followed by the quiet list.
    ///
    /// A directive the operator sets explicitly for a quiet crate wins, since
    /// it is not overridden here.
    pub fn filter_directives(&self) -> String {
        let mut directives = vec![self.log_level.clone()];
        for quiet in QUIET_DIRECTIVES {
            let target = quiet.split('=').next().unwrap_or_default();
            if !self.log_level.contains(&format!("{target}=")) {
                directives.push((*quiet).to_string());
            }
        }
        directives.join(",")
    }
}

fn parse_flag(value: &str, default: bool) -> bool {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}
