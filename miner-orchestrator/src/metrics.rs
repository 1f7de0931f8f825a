//! Host-level system metrics collector: samples CPU, memory, load average,
//! and component temperatures on a fixed interval and publishes the latest
//! snapshot behind a lock.

use std::sync::Arc;
use std::time::Duration;

use sysinfo::System;
use tokio::sync::RwLock;

use crate::model::SystemMetrics;

pub struct SystemMetricsCollector {
    interval: Duration,
    latest: Arc<RwLock<Option<SystemMetrics>>>,
}

impl SystemMetricsCollector {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            latest: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn latest(&self) -> Option<SystemMetrics> {
        self.latest.read().await.clone()
    }

    /// Spawns the background sampling task; returns its handle so callers
    /// can abort it on shutdown.
    pub fn spawn(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval = self.interval;
        let latest = Arc::clone(&self.latest);
        tokio::spawn(async move {
            let mut system = System::new_all();
            loop {
                system.refresh_cpu_usage();
                system.refresh_memory();

                let cpu_percent = system.global_cpu_usage();
                let cpu_count = system.cpus().len();
                let load = System::load_average();
                let mem_total_mb = system.total_memory() as f64 / (1024.0 * 1024.0);
                let mem_used_mb = system.used_memory() as f64 / (1024.0 * 1024.0);
                let mem_percent = if mem_total_mb > 0.0 {
                    (mem_used_mb / mem_total_mb * 100.0) as f32
                } else {
                    0.0
                };

                let temps_c = read_component_temps();

                let snapshot = SystemMetrics {
                    cpu_percent,
                    cpu_count,
                    load_1: load.one,
                    load_5: load.five,
                    load_15: load.fifteen,
                    mem_total_mb,
                    mem_used_mb,
                    mem_percent,
                    temps_c,
                };
                *latest.write().await = Some(snapshot);

                tokio::time::sleep(interval).await;
            }
        })
    }
}

fn read_component_temps() -> std::collections::HashMap<String, f32> {
    let components = sysinfo::Components::new_with_refreshed_list();
    let mut temps = std::collections::HashMap::new();
    for component in components.iter() {
        if let Some(t) = component.temperature() {
            temps.entry(component.label().to_string()).or_insert(t);
        }
    }
    temps
}
