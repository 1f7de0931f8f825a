//! Top-level service aggregate tying config, supervisor, events, and the
//! system metrics collector together, built by an async constructor.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::auth::RateLimiter;
use crate::clock::{Clock, SystemClock, ThreadJitter};
use crate::config::{AppConfig, ConfigLoader, SchedulingConfig};
use crate::error::SupervisorError;
use crate::events::EventLog;
use crate::logrotate;
use crate::metrics::SystemMetricsCollector;
use crate::supervisor::Supervisor;

struct Inner {
    config_loader: ConfigLoader,
    config: RwLock<AppConfig>,
    scheduling: Arc<RwLock<SchedulingConfig>>,
    supervisor: Arc<Supervisor>,
    events: Arc<EventLog>,
    system_metrics: Arc<SystemMetricsCollector>,
    rate_limiter: Arc<RateLimiter>,
    clock: Arc<dyn Clock>,
}

/// Cloneable handle to the running service; cheap to clone (an `Arc`
/// underneath), so each `poem-openapi` API struct holds its own copy.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub async fn bootstrap(config_loader: ConfigLoader) -> anyhow::Result<Self> {
        let config = config_loader.load()?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let events = Arc::new(EventLog::new(Arc::clone(&clock)));
        let scheduling = Arc::new(RwLock::new(config.scheduling.clone()));

        let supervisor = Arc::new(Supervisor::new(
            config.log_dir.clone(),
            Arc::clone(&clock),
            Arc::new(ThreadJitter),
            Arc::clone(&events),
            Arc::clone(&scheduling),
        ));

        let system_metrics = Arc::new(SystemMetricsCollector::new(Duration::from_secs(
            config.telemetry.metrics_interval_sec.max(1),
        )));

        let rate_limiter = Arc::new(RateLimiter::new(
            config.api.rate_limit_capacity,
            config.api.rate_limit_refill_per_sec,
            Arc::clone(&clock),
        ));

        let orchestrator = Self {
            inner: Arc::new(Inner {
                config_loader,
                config: RwLock::new(config.clone()),
                scheduling,
                supervisor,
                events,
                system_metrics,
                rate_limiter,
                clock,
            }),
        };

        for def in config.miners {
            let id = def.id.clone();
            let enabled = def.enabled;
            if let Err(e) = orchestrator.inner.supervisor.register(def).await {
                warn!(worker_id = %id, error = %e, "skipping unsupported miner definition at startup");
                continue;
            }
            if enabled {
                if let Err(e) = orchestrator.inner.supervisor.start(&id).await {
                    warn!(worker_id = %id, error = %e, "initial start failed");
                }
            }
        }

        Ok(orchestrator)
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.inner.supervisor
    }

    pub fn events(&self) -> &Arc<EventLog> {
        &self.inner.events
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.inner.rate_limiter
    }

    pub fn system_metrics(&self) -> &Arc<SystemMetricsCollector> {
        &self.inner.system_metrics
    }

    pub async fn config(&self) -> AppConfig {
        self.inner.config.read().await.clone()
    }

    pub async fn check_api_key(&self, provided: &str) -> bool {
        let config = self.inner.config.read().await;
        !config.api.api_key.is_empty() && provided == config.api.api_key
    }

    /// Re-reads the config source and reconciles the supervisor against
    /// its (possibly changed) `miners` list, per `POST /api/config/reload`.
    pub async fn reload_config(&self) -> Result<(), SupervisorError> {
        let fresh = self
            .inner
            .config_loader
            .load()
            .map_err(|e| SupervisorError::ParseFailure(e.to_string()))?;

        *self.inner.scheduling.write().await = fresh.scheduling.clone();
        *self.inner.config.write().await = fresh.clone();

        self.inner.supervisor.synchronize(fresh.miners).await;
        info!("configuration reloaded");
        self.inner.events.info("configuration reloaded");
        Ok(())
    }

    pub fn log_dir(&self) -> PathBuf {
        self.inner.supervisor.log_dir().to_path_buf()
    }

    /// Runs forever: the supervisor tick (status refresh, watchdog,
    /// autoswitch) and log rotation, each on its own configured cadence.
    pub async fn run_control_loop(&self) {
        if self.config().await.telemetry.enable_system_metrics {
            self.inner.system_metrics.spawn();
        }

        let mut tick = tokio::time::interval(Duration::from_secs(
            self.config().await.scheduling.control_loop_interval_sec.max(1),
        ));
        let mut last_rotate = self.inner.clock.now();
        let rotate_every = Duration::from_secs(
            self.config().await.scheduling.log_rotate_interval_sec.max(1),
        );

        loop {
            tick.tick().await;
            self.inner.supervisor.update_statuses().await;
            self.inner.supervisor.watchdog().await;

            if self.inner.clock.now().duration_since(last_rotate) >= rotate_every {
                let config = self.config().await;
                logrotate::rotate_logs(
                    &config.log_dir,
                    config.logging.rotate_mb,
                    config.logging.rotate_keep,
                )
                .await;
                last_rotate = self.inner.clock.now();
            }
        }
    }
}
