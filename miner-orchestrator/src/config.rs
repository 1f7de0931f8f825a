//! Configuration: a TOML file overlaid with `MINER_ORCH_*` environment
//! variables, falling back to built-in defaults when no file is present.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::model::WorkerDefinition;

/// Masks secrets out of a config's `Display` so it is safe to log whole.
pub trait SafeDisplay {
    fn to_safe_string(&self) -> String;

    fn to_safe_string_indented(&self) -> String {
        self.to_safe_string()
            .lines()
            .map(|line| format!("  {line}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub telemetry: TelemetryConfig,
    pub scheduling: SchedulingConfig,
    pub logging: LoggingConfig,
    pub log_dir: PathBuf,
    #[serde(default)]
    pub miners: Vec<WorkerDefinition>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            telemetry: TelemetryConfig::default(),
            scheduling: SchedulingConfig::default(),
            logging: LoggingConfig::default(),
            log_dir: PathBuf::from("logs"),
            miners: Vec::new(),
        }
    }
}

impl SafeDisplay for AppConfig {
    fn to_safe_string(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "api:");
        let _ = writeln!(out, "{}", self.api.to_safe_string_indented());
        let _ = writeln!(out, "telemetry:");
        let _ = writeln!(out, "{}", self.telemetry.to_safe_string_indented());
        let _ = writeln!(out, "scheduling:");
        let _ = writeln!(out, "{}", self.scheduling.to_safe_string_indented());
        let _ = writeln!(out, "logging:");
        let _ = writeln!(out, "{}", self.logging.to_safe_string_indented());
        let _ = writeln!(out, "log_dir: {}", self.log_dir.display());
        let _ = writeln!(out, "miners: {} configured", self.miners.len());
        out
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    pub bind_address: String,
    pub port: u16,
    /// Shared-secret value every request must present in `X-API-Key`.
    pub api_key: String,
    pub rate_limit_capacity: u32,
    pub rate_limit_refill_per_sec: f64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8090,
            api_key: "change-me".to_string(),
            rate_limit_capacity: 120,
            rate_limit_refill_per_sec: 2.0,
        }
    }
}

impl SafeDisplay for ApiConfig {
    fn to_safe_string(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "bind_address: {}", self.bind_address);
        let _ = writeln!(out, "port: {}", self.port);
        let _ = writeln!(out, "api_key: ****");
        let _ = writeln!(out, "rate_limit_capacity: {}", self.rate_limit_capacity);
        let _ = writeln!(
            out,
            "rate_limit_refill_per_sec: {}",
            self.rate_limit_refill_per_sec
        );
        out
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TelemetryConfig {
    pub enable_system_metrics: bool,
    pub metrics_interval_sec: u64,
    pub retain_hours: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enable_system_metrics: true,
            metrics_interval_sec: 10,
            retain_hours: 24,
        }
    }
}

impl SafeDisplay for TelemetryConfig {
    fn to_safe_string(&self) -> String {
        format!(
            "enable_system_metrics: {}\nmetrics_interval_sec: {}\nretain_hours: {}",
            self.enable_system_metrics, self.metrics_interval_sec, self.retain_hours
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SchedulingConfig {
    pub autoswitch: bool,
    pub autoswitch_interval_sec: u64,
    pub cpu_limit_percent: u32,
    pub control_loop_interval_sec: u64,
    pub log_rotate_interval_sec: u64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            autoswitch: false,
            autoswitch_interval_sec: 600,
            cpu_limit_percent: 100,
            control_loop_interval_sec: 5,
            log_rotate_interval_sec: 60,
        }
    }
}

impl SafeDisplay for SchedulingConfig {
    fn to_safe_string(&self) -> String {
        format!(
            "autoswitch: {}\nautoswitch_interval_sec: {}\ncpu_limit_percent: {}\ncontrol_loop_interval_sec: {}\nlog_rotate_interval_sec: {}",
            self.autoswitch,
            self.autoswitch_interval_sec,
            self.cpu_limit_percent,
            self.control_loop_interval_sec,
            self.log_rotate_interval_sec
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
    pub rotate_mb: u64,
    pub rotate_keep: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
            rotate_mb: 50,
            rotate_keep: 5,
        }
    }
}

impl SafeDisplay for LoggingConfig {
    fn to_safe_string(&self) -> String {
        format!(
            "level: {}\njson: {}\nrotate_mb: {}\nrotate_keep: {}",
            self.level, self.json, self.rotate_mb, self.rotate_keep
        )
    }
}

/// Loads a TOML file overlaid with `MINER_ORCH_*` env vars, falling back to
/// `AppConfig::default()` for anything neither source sets.
pub struct ConfigLoader {
    path: PathBuf,
}

impl ConfigLoader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self) -> Result<AppConfig, figment::Error> {
        Figment::from(figment::providers::Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(&self.path))
            .merge(Env::prefixed("MINER_ORCH_").split("__"))
            .extract()
    }
}

pub fn make_config_loader() -> ConfigLoader {
    ConfigLoader::new("config/miner-orchestrator.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_is_loadable_without_a_file_present() {
        let loader = ConfigLoader::new("config/does-not-exist.toml");
        let config = loader.load().expect("config should load from defaults alone");
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn redacted_display_never_prints_the_api_key() {
        let config = AppConfig::default();
        assert!(!config.to_safe_string().contains("change-me"));
    }
}
