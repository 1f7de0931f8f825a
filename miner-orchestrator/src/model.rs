//! Data model: worker definitions, runtime state, and metrics.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// `threads` is either an explicit count or the sentinel `"auto"`.
///
/// `#[serde(untagged)]` can't tell the string `"auto"` apart from a numeric
/// string, so this carries a hand-rolled `Deserialize` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Threads {
    Auto,
    Count(u32),
}

impl Threads {
    pub fn as_count(&self) -> Option<u32> {
        match self {
            Threads::Auto => None,
            Threads::Count(n) => Some(*n),
        }
    }
}

impl<'de> Deserialize<'de> for Threads {
    fn deserialize<D>(deserializer: D) -> Result<Threads, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct ThreadsVisitor;

        impl<'de> serde::de::Visitor<'de> for ThreadsVisitor {
            type Value = Threads;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an integer thread count or the string \"auto\"")
            }

            fn visit_str<E>(self, v: &str) -> Result<Threads, E>
            where
                E: serde::de::Error,
            {
                if v.eq_ignore_ascii_case("auto") {
                    Ok(Threads::Auto)
                } else {
                    v.parse::<u32>()
                        .map(Threads::Count)
                        .map_err(|_| E::custom(format!("invalid threads value: {v}")))
                }
            }

            fn visit_u64<E>(self, v: u64) -> Result<Threads, E>
            where
                E: serde::de::Error,
            {
                Ok(Threads::Count(v as u32))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Threads, E>
            where
                E: serde::de::Error,
            {
                Ok(Threads::Count(v as u32))
            }
        }

        deserializer.deserialize_any(ThreadsVisitor)
    }
}

impl fmt::Display for Threads {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Threads::Auto => write!(f, "auto"),
            Threads::Count(n) => write!(f, "{n}"),
        }
    }
}

/// Immutable (from the supervisor's view) description of one worker,
/// replaced wholesale on reconfiguration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerDefinition {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub executable: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub algo: Option<String>,
    #[serde(default)]
    pub pool_url: Option<String>,
    #[serde(default)]
    pub wallet: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub threads: Option<Threads>,
    #[serde(default)]
    pub donate_level: Option<u32>,
    #[serde(default)]
    pub nice: Option<i32>,
    #[serde(default)]
    pub cpu_affinity: Vec<usize>,
    #[serde(default)]
    pub extra_args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_true() -> bool {
    true
}

/// Mutable runtime status of a worker, owned by the supervisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRuntime {
    pub id: String,
    pub pid: Option<u32>,
    pub status: WorkerStatus,
    pub uptime_sec: f64,
    pub restarts: u64,
    pub quarantined: bool,
    pub last_error: Option<String>,
}

impl WorkerRuntime {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pid: None,
            status: WorkerStatus::Stopped,
            uptime_sec: 0.0,
            restarts: 0,
            quarantined: false,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Stopped,
    Running,
    Exited(i32),
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerStatus::Stopped => write!(f, "stopped"),
            WorkerStatus::Running => write!(f, "running"),
            WorkerStatus::Exited(code) => write!(f, "exited:{code}"),
        }
    }
}

impl WorkerStatus {
    pub fn is_exited(&self) -> bool {
        matches!(self, WorkerStatus::Exited(_))
    }
}

/// Metrics extracted from a worker's stdout/stderr, updated by its adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerMetrics {
    pub id: String,
    pub hashrate_hs: Option<f64>,
    pub accepted: Option<u64>,
    pub rejected: Option<u64>,
    pub uptime_sec: Option<f64>,
    pub temperature_c: Option<f64>,
    pub power_w: Option<f64>,
}

impl WorkerMetrics {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

/// Host-level system metrics snapshot (ambient telemetry, not part of the
/// per-worker model).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub cpu_percent: f32,
    pub cpu_count: usize,
    pub load_1: f64,
    pub load_5: f64,
    pub load_15: f64,
    pub mem_total_mb: f64,
    pub mem_used_mb: f64,
    pub mem_percent: f32,
    pub temps_c: HashMap<String, f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
