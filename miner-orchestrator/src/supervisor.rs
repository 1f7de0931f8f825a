//! The supervisor: owns every worker's definition, runtime status, and
//! backoff/crash-loop state, and drives reconciliation + autoswitch.
//!
//! A single `tokio::sync::Mutex` guards the shared maps; no supervisor
//! method calls back into another locked method while holding the guard
//! (the async worker operations that can block — spawning, SIGTERM/wait —
//! always run with the guard released), so a plain non-reentrant mutex is
//! sufficient here.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::adapters;
use crate::backoff::BackoffState;
use crate::clock::{Clock, Jitter};
use crate::config::SchedulingConfig;
use crate::error::SupervisorError;
use crate::events::EventLog;
use crate::model::{WorkerDefinition, WorkerMetrics, WorkerRuntime, WorkerStatus};
use crate::worker_instance::WorkerInstance;

const CRASH_LOOP_WINDOW_SEC: f64 = 600.0;
const CRASH_LOOP_THRESHOLD: usize = 5;
const CRASH_LOOP_HISTORY_LEN: usize = 10;
const MIN_AUTOSWITCH_INTERVAL_SEC: u64 = 30;
const RESTART_SETTLE: Duration = Duration::from_millis(200);

struct State {
    /// Stable insertion order, used by autoswitch round-robin.
    order: Vec<String>,
    runtime: HashMap<String, WorkerRuntime>,
    instances: HashMap<String, Arc<WorkerInstance>>,
    backoff: HashMap<String, BackoffState>,
    restart_history: HashMap<String, Vec<f64>>,
    autoswitch_idx: usize,
    last_switch_time: f64,
}

impl State {
    fn new() -> Self {
        Self {
            order: Vec::new(),
            runtime: HashMap::new(),
            instances: HashMap::new(),
            backoff: HashMap::new(),
            restart_history: HashMap::new(),
            autoswitch_idx: 0,
            last_switch_time: 0.0,
        }
    }
}

pub struct Supervisor {
    log_dir: PathBuf,
    clock: Arc<dyn Clock>,
    jitter: Arc<dyn Jitter>,
    events: Arc<EventLog>,
    scheduling: Arc<tokio::sync::RwLock<SchedulingConfig>>,
    state: Mutex<State>,
}

impl Supervisor {
    pub fn new(
        log_dir: PathBuf,
        clock: Arc<dyn Clock>,
        jitter: Arc<dyn Jitter>,
        events: Arc<EventLog>,
        scheduling: Arc<tokio::sync::RwLock<SchedulingConfig>>,
    ) -> Self {
        Self {
            log_dir,
            clock,
            jitter,
            events,
            scheduling,
            state: Mutex::new(State::new()),
        }
    }

    pub fn log_dir(&self) -> &std::path::Path {
        &self.log_dir
    }

    pub async fn register(&self, definition: WorkerDefinition) -> Result<(), SupervisorError> {
        let adapter = adapters::for_type(&definition.kind)?;
        let id = definition.id.clone();
        let kind = definition.kind.clone();
        let instance = Arc::new(WorkerInstance::new(
            definition,
            adapter,
            Arc::clone(&self.clock),
            self.log_dir.clone(),
        ));

        let mut state = self.state.lock().await;
        if !state.instances.contains_key(&id) {
            state.order.push(id.clone());
        }
        state.instances.insert(id.clone(), instance);
        state.runtime.insert(id.clone(), WorkerRuntime::new(id.clone()));
        state.backoff.insert(id.clone(), BackoffState::new());
        state.restart_history.insert(id.clone(), Vec::new());
        drop(state);

        self.events.emit(
            crate::events::EventLevel::Info,
            "worker registered",
            Some(json!({ "worker_id": id, "type": kind })),
        );
        Ok(())
    }

    async fn instance(&self, id: &str) -> Result<Arc<WorkerInstance>, SupervisorError> {
        let state = self.state.lock().await;
        state
            .instances
            .get(id)
            .cloned()
            .ok_or_else(|| SupervisorError::NotFound(id.to_string()))
    }

    pub async fn start(&self, id: &str) -> Result<(), SupervisorError> {
        let instance = self.instance(id).await?;
        if let Err(e) = instance.start().await {
            let mut state = self.state.lock().await;
            if let Some(rt) = state.runtime.get_mut(id) {
                rt.last_error = Some(e.to_string());
            }
            drop(state);

            error!(worker_id = id, error = %e, "worker failed to start");
            self.events.emit(
                crate::events::EventLevel::Error,
                "worker failed to start",
                Some(json!({ "worker_id": id, "error": e.to_string() })),
            );
            return Err(e);
        }

        let pid = instance.pid().await;
        let mut state = self.state.lock().await;
        if let Some(rt) = state.runtime.get_mut(id) {
            rt.status = WorkerStatus::Running;
            rt.pid = pid;
            rt.uptime_sec = 0.0;
            rt.last_error = None;
        }
        drop(state);

        info!(worker_id = id, ?pid, "worker started");
        self.events.emit(
            crate::events::EventLevel::Info,
            "worker started",
            Some(json!({ "worker_id": id, "pid": pid })),
        );
        Ok(())
    }

    /// Operator-initiated start: also resets the worker's backoff counter,
    /// since a fresh start is a deliberate reset of the crash-loop clock.
    pub async fn start_operator(&self, id: &str) -> Result<(), SupervisorError> {
        self.start(id).await?;
        let mut state = self.state.lock().await;
        if let Some(b) = state.backoff.get_mut(id) {
            b.reset();
        }
        Ok(())
    }

    pub async fn stop(&self, id: &str) -> Result<(), SupervisorError> {
        let instance = self.instance(id).await?;
        instance.stop().await?;

        let mut state = self.state.lock().await;
        if let Some(rt) = state.runtime.get_mut(id) {
            rt.status = WorkerStatus::Stopped;
            rt.pid = None;
            rt.uptime_sec = 0.0;
        }
        drop(state);

        info!(worker_id = id, "worker stopped");
        self.events.emit(
            crate::events::EventLevel::Info,
            "worker stopped",
            Some(json!({ "worker_id": id })),
        );
        Ok(())
    }

    pub async fn restart(&self, id: &str) -> Result<(), SupervisorError> {
        self.stop(id).await?;
        tokio::time::sleep(RESTART_SETTLE).await;
        self.start_operator(id).await
    }

    pub async fn start_all(&self) {
        let ids = self.state.lock().await.order.clone();
        for id in ids {
            if let Err(e) = self.start(&id).await {
                error!(worker_id = %id, error = %e, "failed to start worker");
            }
        }
    }

    pub async fn stop_all(&self) {
        let ids = self.state.lock().await.order.clone();
        for id in ids {
            if let Err(e) = self.stop(&id).await {
                error!(worker_id = %id, error = %e, "failed to stop worker");
            }
        }
    }

    pub async fn list(&self) -> Vec<(WorkerDefinition, WorkerRuntime)> {
        let state = self.state.lock().await;
        state
            .order
            .iter()
            .filter_map(|id| {
                let instance = state.instances.get(id)?;
                let rt = state.runtime.get(id)?;
                Some((instance.definition.clone(), rt.clone()))
            })
            .collect()
    }

    pub async fn get(&self, id: &str) -> Result<(WorkerDefinition, WorkerRuntime), SupervisorError> {
        let state = self.state.lock().await;
        let instance = state
            .instances
            .get(id)
            .ok_or_else(|| SupervisorError::NotFound(id.to_string()))?;
        let rt = state
            .runtime
            .get(id)
            .ok_or_else(|| SupervisorError::NotFound(id.to_string()))?;
        Ok((instance.definition.clone(), rt.clone()))
    }

    pub async fn get_metrics(&self) -> Vec<WorkerMetrics> {
        let ids_and_instances: Vec<_> = {
            let state = self.state.lock().await;
            state
                .order
                .iter()
                .filter_map(|id| state.instances.get(id).cloned())
                .collect()
        };
        let mut out = Vec::with_capacity(ids_and_instances.len());
        for instance in ids_and_instances {
            out.push(instance.metrics().await);
        }
        out
    }

    /// Polls every worker's child process, updates runtime rows, and feeds
    /// the crash-loop detector on fresh exits. Run periodically from the
    /// control loop.
    pub async fn update_statuses(&self) {
        let ids_and_instances: Vec<(String, Arc<WorkerInstance>)> = {
            let state = self.state.lock().await;
            state
                .order
                .iter()
                .filter_map(|id| state.instances.get(id).map(|i| (id.clone(), Arc::clone(i))))
                .collect()
        };

        for (id, instance) in ids_and_instances {
            let exit_code = instance.poll_exit().await;
            let uptime = instance.uptime_sec().await;
            let pid = instance.pid().await;

            let mut state = self.state.lock().await;
            let Some(rt) = state.runtime.get_mut(&id) else {
                continue;
            };
            let was_running = matches!(rt.status, WorkerStatus::Running);
            rt.pid = pid;
            rt.uptime_sec = uptime;
            if let Some(code) = exit_code {
                rt.status = WorkerStatus::Exited(code);
            } else if pid.is_some() {
                rt.status = WorkerStatus::Running;
            }

            if was_running && rt.status.is_exited() {
                rt.restarts += 1;
                self.events.emit(
                    crate::events::EventLevel::Warning,
                    "worker exited",
                    Some(json!({ "worker_id": id, "status": rt.status.to_string() })),
                );

                let now = self.clock.unix_time();
                let hist = state.restart_history.entry(id.clone()).or_default();
                hist.push(now);
                if hist.len() > CRASH_LOOP_HISTORY_LEN {
                    let excess = hist.len() - CRASH_LOOP_HISTORY_LEN;
                    hist.drain(0..excess);
                }
                let recent = hist.iter().filter(|t| now - **t <= CRASH_LOOP_WINDOW_SEC).count();
                if recent >= CRASH_LOOP_THRESHOLD {
                    if let Some(rt) = state.runtime.get_mut(&id) {
                        if !rt.quarantined {
                            rt.quarantined = true;
                            self.events.emit(
                                crate::events::EventLevel::Error,
                                "worker quarantined due to crash loop",
                                Some(json!({ "worker_id": id })),
                            );
                        }
                    }
                }
            }
        }
    }

    /// Schedules backoff-delayed restarts for exited, non-quarantined
    /// workers, then runs the autoswitch check. Run periodically alongside
    /// `update_statuses`.
    pub async fn watchdog(self: &Arc<Self>) {
        let to_restart: Vec<(String, Duration)> = {
            let mut state = self.state.lock().await;
            let mut scheduled = Vec::new();
            for id in state.order.clone() {
                let exited_unquarantined = state
                    .runtime
                    .get(&id)
                    .map(|rt| rt.status.is_exited() && !rt.quarantined)
                    .unwrap_or(false);
                if exited_unquarantined {
                    let delay = state
                        .backoff
                        .get_mut(&id)
                        .map(|b| b.next_delay(self.jitter.as_ref()))
                        .unwrap_or(Duration::from_secs(2));
                    scheduled.push((id, delay));
                }
            }
            scheduled
        };

        for (id, delay) in to_restart {
            warn!(worker_id = %id, delay_sec = delay.as_secs_f64(), "scheduling backoff restart");
            let this = Arc::clone(self);
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Err(e) = this.start(&id).await {
                    error!(worker_id = %id, error = %e, "backoff restart failed");
                }
            });
        }

        self.autoswitch_if_needed().await;
    }

    async fn autoswitch_if_needed(&self) {
        let scheduling = self.scheduling.read().await.clone();
        if !scheduling.autoswitch {
            return;
        }
        let interval = scheduling.autoswitch_interval_sec.max(MIN_AUTOSWITCH_INTERVAL_SEC) as f64;

        let mut state = self.state.lock().await;
        let now = self.clock.unix_time();
        if now - state.last_switch_time < interval {
            return;
        }

        let enabled_ids: Vec<String> = state
            .order
            .iter()
            .filter(|id| {
                state
                    .instances
                    .get(*id)
                    .map(|i| i.definition.enabled)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        if enabled_ids.len() <= 1 {
            state.last_switch_time = now;
            return;
        }

        state.autoswitch_idx = (state.autoswitch_idx + 1) % enabled_ids.len();
        let target_id = enabled_ids[state.autoswitch_idx].clone();
        state.last_switch_time = now;
        drop(state);

        for id in &enabled_ids {
            if id == &target_id {
                if let Err(e) = self.start(id).await {
                    error!(worker_id = %id, error = %e, "autoswitch failed to start target");
                }
            } else if let Err(e) = self.stop(id).await {
                error!(worker_id = %id, error = %e, "autoswitch failed to stop worker");
            }
        }

        info!(target = %target_id, "autoswitch activated");
        self.events.emit(
            crate::events::EventLevel::Info,
            "autoswitch activated",
            Some(json!({ "target": target_id })),
        );
    }

    /// Reconciles to a desired worker set: removes workers no longer
    /// present, registers and (if enabled) starts new ones, and for
    /// existing workers whose definition changed, swaps in the new
    /// definition and restarts only if it was running.
    pub async fn synchronize(&self, desired: Vec<WorkerDefinition>) {
        let desired_ids: std::collections::HashSet<String> =
            desired.iter().map(|d| d.id.clone()).collect();

        let current_ids: Vec<String> = self.state.lock().await.order.clone();
        for id in &current_ids {
            if !desired_ids.contains(id) {
                let _ = self.stop(id).await;
                let mut state = self.state.lock().await;
                state.order.retain(|x| x != id);
                state.instances.remove(id);
                state.runtime.remove(id);
                state.backoff.remove(id);
                state.restart_history.remove(id);
                drop(state);
                self.events.emit(
                    crate::events::EventLevel::Info,
                    "worker removed",
                    Some(json!({ "worker_id": id })),
                );
            }
        }

        for def in desired {
            let existing_def = {
                let state = self.state.lock().await;
                state.instances.get(&def.id).map(|i| i.definition.clone())
            };

            match existing_def {
                None => {
                    let enabled = def.enabled;
                    let id = def.id.clone();
                    if let Err(e) = self.register(def).await {
                        error!(worker_id = %id, error = %e, "failed to register worker during sync");
                        continue;
                    }
                    if enabled {
                        let _ = self.start(&id).await;
                    }
                }
                Some(old_def) => {
                    if old_def != def {
                        let was_running = {
                            let state = self.state.lock().await;
                            matches!(
                                state.runtime.get(&def.id).map(|rt| rt.status),
                                Some(WorkerStatus::Running)
                            )
                        };

                        let id = def.id.clone();
                        let adapter = match adapters::for_type(&def.kind) {
                            Ok(a) => a,
                            Err(e) => {
                                error!(worker_id = %id, error = %e, "failed to rebuild adapter during sync");
                                continue;
                            }
                        };
                        let new_instance = Arc::new(WorkerInstance::new(
                            def,
                            adapter,
                            Arc::clone(&self.clock),
                            self.log_dir.clone(),
                        ));
                        let mut state = self.state.lock().await;
                        state.instances.insert(id.clone(), new_instance);
                        drop(state);

                        if was_running {
                            let _ = self.restart(&id).await;
                        }
                    }
                }
            }
        }
    }
}
