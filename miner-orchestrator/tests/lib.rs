//! Integration tests exercising the supervisor against real (short-lived,
//! script-backed) child processes, since the worker lifecycle is built
//! directly on `tokio::process`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use miner_orchestrator::clock::{Clock, VirtualClock, ZeroJitter};
use miner_orchestrator::config::SchedulingConfig;
use miner_orchestrator::events::EventLog;
use miner_orchestrator::model::WorkerDefinition;
use miner_orchestrator::supervisor::Supervisor;
use tokio::sync::RwLock;

fn write_script(dir: &Path, name: &str, body: &str) -> String {
    let path: PathBuf = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    path.to_string_lossy().into_owned()
}

fn definition(id: &str, executable: String) -> WorkerDefinition {
    WorkerDefinition {
        id: id.to_string(),
        kind: "xmrig".to_string(),
        executable,
        enabled: true,
        algo: None,
        pool_url: None,
        wallet: None,
        password: None,
        threads: None,
        donate_level: None,
        nice: None,
        cpu_affinity: Vec::new(),
        extra_args: Vec::new(),
        env: Default::default(),
    }
}

fn supervisor_with_clock(log_dir: PathBuf, clock: Arc<dyn Clock>) -> Arc<Supervisor> {
    let events = Arc::new(EventLog::new(Arc::clone(&clock)));
    let scheduling = Arc::new(RwLock::new(SchedulingConfig::default()));
    Arc::new(Supervisor::new(
        log_dir,
        clock,
        Arc::new(ZeroJitter),
        events,
        scheduling,
    ))
}

#[tokio::test]
async fn start_reports_running_with_a_pid_and_stop_clears_it() {
    let tmp = tempfile::tempdir().unwrap();
    let exe = write_script(tmp.path(), "long.sh", "sleep 100");
    let supervisor = supervisor_with_clock(tmp.path().to_path_buf(), Arc::new(VirtualClock::new()));

    supervisor.register(definition("w1", exe)).await.unwrap();
    supervisor.start("w1").await.unwrap();

    let (_, runtime) = supervisor.get("w1").await.unwrap();
    assert!(runtime.pid.is_some());

    supervisor.stop("w1").await.unwrap();
    let (_, runtime) = supervisor.get("w1").await.unwrap();
    assert_eq!(runtime.pid, None);
}

#[tokio::test]
async fn starting_an_already_running_worker_does_not_spawn_a_second_child() {
    let tmp = tempfile::tempdir().unwrap();
    let exe = write_script(tmp.path(), "long.sh", "sleep 100");
    let supervisor = supervisor_with_clock(tmp.path().to_path_buf(), Arc::new(VirtualClock::new()));

    supervisor.register(definition("w1", exe)).await.unwrap();
    supervisor.start("w1").await.unwrap();
    let (_, first) = supervisor.get("w1").await.unwrap();

    supervisor.start("w1").await.unwrap();
    let (_, second) = supervisor.get("w1").await.unwrap();

    assert_eq!(first.pid, second.pid);
    supervisor.stop("w1").await.unwrap();
}

#[tokio::test]
async fn stop_kills_a_worker_that_ignores_sigterm_within_the_grace_period() {
    let tmp = tempfile::tempdir().unwrap();
    let exe = write_script(tmp.path(), "stubborn.sh", "trap '' TERM\nsleep 100");
    let supervisor = supervisor_with_clock(tmp.path().to_path_buf(), Arc::new(VirtualClock::new()));

    supervisor.register(definition("w1", exe)).await.unwrap();
    supervisor.start("w1").await.unwrap();

    let started = Instant::now();
    supervisor.stop("w1").await.unwrap();
    assert!(
        started.elapsed() < Duration::from_millis(3500),
        "stop took too long: {:?}",
        started.elapsed()
    );

    let (_, runtime) = supervisor.get("w1").await.unwrap();
    assert_eq!(runtime.pid, None);
}

#[tokio::test]
async fn failed_start_records_last_error_and_an_error_event() {
    let tmp = tempfile::tempdir().unwrap();
    let missing_exe = tmp.path().join("does-not-exist").to_string_lossy().into_owned();
    let supervisor = supervisor_with_clock(tmp.path().to_path_buf(), Arc::new(VirtualClock::new()));

    supervisor.register(definition("w1", missing_exe)).await.unwrap();
    let result = supervisor.start("w1").await;
    assert!(result.is_err());

    let (_, rt) = supervisor.get("w1").await.unwrap();
    assert!(rt.last_error.is_some(), "a failed start should record a reason");
    assert_eq!(rt.pid, None);
}

#[tokio::test]
async fn five_crashes_inside_the_trailing_window_quarantine_the_worker() {
    let tmp = tempfile::tempdir().unwrap();
    let exe = write_script(tmp.path(), "crashy.sh", "exit 7");
    let clock = Arc::new(VirtualClock::new());
    let supervisor = supervisor_with_clock(tmp.path().to_path_buf(), clock.clone());

    supervisor.register(definition("w1", exe)).await.unwrap();

    for i in 0..5 {
        supervisor.start("w1").await.unwrap();

        // Give the child a moment to actually exit before polling.
        for _ in 0..50 {
            supervisor.update_statuses().await;
            let (_, rt) = supervisor.get("w1").await.unwrap();
            if rt.status.is_exited() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let (_, rt) = supervisor.get("w1").await.unwrap();
        assert!(rt.status.is_exited(), "child should have exited by now");

        if i < 4 {
            assert!(!rt.quarantined, "should not be quarantined before the 5th crash");
            clock.advance(Duration::from_secs(100));
        }
    }

    let (_, rt) = supervisor.get("w1").await.unwrap();
    assert!(rt.quarantined, "5 crashes within 600s should quarantine the worker");
}

#[tokio::test]
async fn autoswitch_rotates_through_enabled_workers_in_order() {
    let tmp = tempfile::tempdir().unwrap();
    let exe_a = write_script(tmp.path(), "a.sh", "sleep 100");
    let exe_b = write_script(tmp.path(), "b.sh", "sleep 100");
    let exe_c = write_script(tmp.path(), "c.sh", "sleep 100");

    let virtual_clock = Arc::new(VirtualClock::new());
    let clock: Arc<dyn Clock> = virtual_clock.clone();
    let events = Arc::new(EventLog::new(Arc::clone(&clock)));
    let scheduling = Arc::new(RwLock::new(SchedulingConfig {
        autoswitch: true,
        autoswitch_interval_sec: 30,
        ..SchedulingConfig::default()
    }));
    let supervisor = Arc::new(Supervisor::new(
        tmp.path().to_path_buf(),
        Arc::clone(&clock),
        Arc::new(ZeroJitter),
        events,
        scheduling,
    ));

    supervisor.register(definition("a", exe_a)).await.unwrap();
    supervisor.register(definition("b", exe_b)).await.unwrap();
    supervisor.register(definition("c", exe_c)).await.unwrap();

    let mut running_sequence = Vec::new();
    for _ in 0..4 {
        virtual_clock.advance(Duration::from_secs(31));
        supervisor.watchdog().await;
        let rows = supervisor.list().await;
        let running: Vec<String> = rows
            .iter()
            .filter(|(_, rt)| rt.status == miner_orchestrator::model::WorkerStatus::Running)
            .map(|(def, _)| def.id.clone())
            .collect();
        assert_eq!(running.len(), 1, "exactly one worker should be active at a time");
        running_sequence.push(running[0].clone());
    }

    // Rotates through all three ids and returns to the first after a full cycle.
    assert_eq!(running_sequence[0], running_sequence[3]);
    assert_eq!(
        running_sequence.iter().collect::<std::collections::HashSet<_>>().len(),
        3
    );

    supervisor.stop_all().await;
}

#[tokio::test]
async fn restart_resets_share_counters_from_the_previous_process_epoch() {
    let tmp = tempfile::tempdir().unwrap();
    let exe = write_script(
        tmp.path(),
        "shares.sh",
        "echo 'accepted: 7/10 (70%)'\nsleep 100",
    );
    let supervisor = supervisor_with_clock(tmp.path().to_path_buf(), Arc::new(VirtualClock::new()));

    supervisor.register(definition("w1", exe)).await.unwrap();
    supervisor.start("w1").await.unwrap();

    for _ in 0..50 {
        let metrics = supervisor.get_metrics().await;
        if metrics.iter().any(|m| m.id == "w1" && m.accepted == Some(7)) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let metrics = supervisor.get_metrics().await;
    let w1 = metrics.iter().find(|m| m.id == "w1").unwrap();
    assert_eq!(w1.accepted, Some(7));
    assert_eq!(w1.rejected, Some(3));

    supervisor.restart("w1").await.unwrap();

    let metrics = supervisor.get_metrics().await;
    let w1 = metrics.iter().find(|m| m.id == "w1").unwrap();
    assert_eq!(w1.accepted, None, "a fresh start should reset share counters");
    assert_eq!(w1.rejected, None);

    supervisor.stop("w1").await.unwrap();
}

#[tokio::test]
async fn synchronize_adds_removes_and_restarts_changed_workers() {
    let tmp = tempfile::tempdir().unwrap();
    let exe_keep = write_script(tmp.path(), "keep.sh", "sleep 100");
    let exe_gone = write_script(tmp.path(), "gone.sh", "sleep 100");
    let exe_new = write_script(tmp.path(), "new.sh", "sleep 100");

    let supervisor = supervisor_with_clock(tmp.path().to_path_buf(), Arc::new(VirtualClock::new()));

    supervisor
        .register(definition("keep", exe_keep.clone()))
        .await
        .unwrap();
    supervisor
        .register(definition("gone", exe_gone))
        .await
        .unwrap();
    supervisor.start("keep").await.unwrap();
    supervisor.start("gone").await.unwrap();

    let mut changed = definition("keep", exe_keep);
    changed.nice = Some(5);
    let desired = vec![changed, definition("new", exe_new)];

    supervisor.synchronize(desired).await;

    let rows: std::collections::HashMap<_, _> = supervisor
        .list()
        .await
        .into_iter()
        .map(|(def, rt)| (def.id.clone(), (def, rt)))
        .collect();

    assert!(!rows.contains_key("gone"), "removed worker should be gone");
    assert!(rows.contains_key("new"), "new worker should be registered");
    let (keep_def, keep_rt) = rows.get("keep").unwrap();
    assert_eq!(keep_def.nice, Some(5));
    assert_eq!(
        keep_rt.status,
        miner_orchestrator::model::WorkerStatus::Running,
        "changed worker that was running should be restarted, ending up running again"
    );

    supervisor.stop_all().await;
}
