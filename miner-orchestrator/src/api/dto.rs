//! OpenAPI-facing response shapes, kept separate from the internal model
//! (`crate::model`) so internal representations (e.g. the `Threads`
//! tagged-union) can change without touching the wire schema.

use chrono::{DateTime, Utc};
use poem_openapi::Object;

use crate::events::{Event, EventLevel};
use crate::model::{HealthResponse, SystemMetrics, WorkerDefinition, WorkerMetrics, WorkerRuntime};

#[derive(Object, Debug, Clone)]
pub struct HealthResponseDto {
    pub status: String,
    pub version: String,
}

impl From<HealthResponse> for HealthResponseDto {
    fn from(h: HealthResponse) -> Self {
        Self {
            status: h.status,
            version: h.version,
        }
    }
}

#[derive(Object, Debug, Clone)]
pub struct WorkerDefinitionDto {
    pub id: String,
    #[oai(rename = "type")]
    pub kind: String,
    pub executable: String,
    pub enabled: bool,
    pub algo: Option<String>,
    pub pool_url: Option<String>,
    pub threads: Option<String>,
    pub donate_level: Option<u32>,
    pub nice: Option<i32>,
    pub cpu_affinity: Vec<i32>,
    pub extra_args: Vec<String>,
}

impl From<&WorkerDefinition> for WorkerDefinitionDto {
    fn from(def: &WorkerDefinition) -> Self {
        Self {
            id: def.id.clone(),
            kind: def.kind.clone(),
            executable: def.executable.clone(),
            enabled: def.enabled,
            algo: def.algo.clone(),
            pool_url: def.pool_url.clone(),
            threads: def.threads.as_ref().map(|t| t.to_string()),
            donate_level: def.donate_level,
            nice: def.nice,
            cpu_affinity: def.cpu_affinity.iter().map(|&c| c as i32).collect(),
            extra_args: def.extra_args.clone(),
        }
    }
}

#[derive(Object, Debug, Clone)]
pub struct WorkerRuntimeDto {
    pub id: String,
    pub pid: Option<i32>,
    pub status: String,
    pub uptime_sec: f64,
    pub restarts: i32,
    pub quarantined: bool,
    pub last_error: Option<String>,
}

impl From<&WorkerRuntime> for WorkerRuntimeDto {
    fn from(rt: &WorkerRuntime) -> Self {
        Self {
            id: rt.id.clone(),
            pid: rt.pid.map(|p| p as i32),
            status: rt.status.to_string(),
            uptime_sec: rt.uptime_sec,
            restarts: rt.restarts as i32,
            quarantined: rt.quarantined,
            last_error: rt.last_error.clone(),
        }
    }
}

#[derive(Object, Debug, Clone)]
pub struct WorkerMetricsDto {
    pub id: String,
    pub hashrate_hs: Option<f64>,
    pub accepted: Option<i64>,
    pub rejected: Option<i64>,
    pub uptime_sec: Option<f64>,
    pub temperature_c: Option<f64>,
    pub power_w: Option<f64>,
}

impl From<&WorkerMetrics> for WorkerMetricsDto {
    fn from(m: &WorkerMetrics) -> Self {
        Self {
            id: m.id.clone(),
            hashrate_hs: m.hashrate_hs,
            accepted: m.accepted.map(|v| v as i64),
            rejected: m.rejected.map(|v| v as i64),
            uptime_sec: m.uptime_sec,
            temperature_c: m.temperature_c,
            power_w: m.power_w,
        }
    }
}

#[derive(Object, Debug, Clone)]
pub struct WorkerDetailDto {
    pub definition: WorkerDefinitionDto,
    pub runtime: WorkerRuntimeDto,
    pub metrics: WorkerMetricsDto,
}

#[derive(Object, Debug, Clone, Default)]
pub struct SystemMetricsDto {
    pub cpu_percent: f32,
    pub cpu_count: i32,
    pub load_1: f64,
    pub load_5: f64,
    pub load_15: f64,
    pub mem_total_mb: f64,
    pub mem_used_mb: f64,
    pub mem_percent: f32,
    pub temps_c: std::collections::HashMap<String, f32>,
}

impl From<&SystemMetrics> for SystemMetricsDto {
    fn from(m: &SystemMetrics) -> Self {
        Self {
            cpu_percent: m.cpu_percent,
            cpu_count: m.cpu_count as i32,
            load_1: m.load_1,
            load_5: m.load_5,
            load_15: m.load_15,
            mem_total_mb: m.mem_total_mb,
            mem_used_mb: m.mem_used_mb,
            temps_c: m.temps_c.clone(),
            mem_percent: m.mem_percent,
        }
    }
}

#[derive(Object, Debug, Clone)]
pub struct EventDto {
    pub timestamp: f64,
    /// `timestamp` rendered as RFC 3339, for clients that would rather not
    /// do the epoch-seconds conversion themselves.
    pub occurred_at: String,
    pub level: String,
    pub message: String,
}

impl From<&Event> for EventDto {
    fn from(e: &Event) -> Self {
        let occurred_at = DateTime::<Utc>::from_timestamp(
            e.timestamp.trunc() as i64,
            (e.timestamp.fract() * 1e9) as u32,
        )
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default();

        Self {
            timestamp: e.timestamp,
            occurred_at,
            level: match e.level {
                EventLevel::Debug => "debug",
                EventLevel::Info => "info",
                EventLevel::Warning => "warning",
                EventLevel::Error => "error",
            }
            .to_string(),
            message: e.message.clone(),
        }
    }
}
