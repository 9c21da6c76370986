//! Process supervisor integration tests
//!
//! These spawn real shell processes, so they are Unix-only.

#![cfg(unix)]

use std::path::PathBuf;
use std::time::Duration;

use pushdeploy::deploy::config::DeployConfig;
use pushdeploy::process::controller;
use pushdeploy::process::supervisor::ProcessSupervisor;

fn test_supervisor() -> ProcessSupervisor {
    ProcessSupervisor::with_timeouts(
        Duration::from_millis(300),
        Duration::from_millis(500),
        Duration::from_millis(500),
    )
}

fn config(run_command: &str, max_restarts: u32, restart_delay: u64) -> DeployConfig {
    DeployConfig {
        run_command: run_command.to_string(),
        build_command: "true".to_string(),
        max_restarts,
        restart_delay,
        ..Default::default()
    }
}

fn workdir() -> PathBuf {
    std::env::temp_dir()
}

#[tokio::test]
async fn test_start_and_stop() {
    let supervisor = test_supervisor();

    supervisor
        .start_process(config("sleep 30", 0, 0), &workdir())
        .await
        .unwrap();

    assert!(supervisor.is_running().await);
    let pid = supervisor.current_pid().await;
    assert!(pid > 0);
    assert!(controller::is_alive(pid));

    supervisor.stop_current().await.unwrap();
    assert!(!supervisor.is_running().await);
    assert_eq!(supervisor.current_pid().await, 0);
    assert!(!controller::is_alive(pid));
}

#[tokio::test]
async fn test_stop_is_noop_when_nothing_runs() {
    let supervisor = test_supervisor();
    supervisor.stop_current().await.unwrap();
    assert!(!supervisor.is_running().await);
}

#[tokio::test]
async fn test_start_supersedes_previous_process() {
    let supervisor = test_supervisor();

    supervisor
        .start_process(config("sleep 30", 0, 0), &workdir())
        .await
        .unwrap();
    let old_pid = supervisor.current_pid().await;

    supervisor
        .start_process(config("sleep 30", 0, 0), &workdir())
        .await
        .unwrap();
    let new_pid = supervisor.current_pid().await;

    // Exactly one process is current, and the previous one is dead
    assert!(supervisor.is_running().await);
    assert_ne!(old_pid, new_pid);
    assert!(!controller::is_alive(old_pid));
    assert!(controller::is_alive(new_pid));

    supervisor.stop_current().await.unwrap();
}

#[tokio::test]
async fn test_restart_budget_is_exhausted() {
    let supervisor = test_supervisor();

    supervisor
        .start_process(config("exit 1", 2, 0), &workdir())
        .await
        .unwrap();

    // Each generation exits immediately; the monitor burns the whole budget
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert!(!supervisor.is_running().await);
    let status = supervisor.status().await;
    assert!(!status.running);
    assert_eq!(status.restarts_attempted, 2);
}

#[tokio::test]
async fn test_zero_budget_never_restarts() {
    let supervisor = test_supervisor();

    supervisor
        .start_process(config("exit 7", 0, 0), &workdir())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(!supervisor.is_running().await);
    let status = supervisor.status().await;
    assert_eq!(status.restarts_attempted, 0);
}

#[tokio::test]
async fn test_status_echoes_config() {
    let supervisor = test_supervisor();

    let mut cfg = config("sleep 30", 3, 5);
    cfg.environment = "staging".to_string();
    cfg.port = 3000;
    supervisor.start_process(cfg, &workdir()).await.unwrap();

    let status = supervisor.status().await;
    assert!(status.running);
    assert!(status.pid > 0);
    assert_eq!(status.restart_count, 0);
    let echoed = status.config.expect("running status carries its config");
    assert_eq!(echoed.run_command, "sleep 30");
    assert_eq!(echoed.environment, "staging");
    assert_eq!(echoed.port, 3000);

    supervisor.stop_current().await.unwrap();
}

#[tokio::test]
async fn test_monitor_restart_yields_to_inflight_start() {
    let supervisor = test_supervisor();

    // A crashing generation whose monitor is now waiting out its delay
    supervisor
        .start_process(config("exit 1", 5, 2), &workdir())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    // Occupy the slot with a process that shrugs off SIGTERM so the next
    // start spends its full escalation windows inside the operation lock
    supervisor
        .start_process(
            config("trap '' TERM; while :; do sleep 1; done", 0, 0),
            &workdir(),
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(1300)).await;

    // The crash monitor's delay expires while this start is still
    // terminating the stubborn process; it must abandon its restart rather
    // than install a second process behind the lock holder's back
    supervisor
        .start_process(config("sleep 30", 0, 0), &workdir())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let status = supervisor.status().await;
    assert!(status.running);
    assert_eq!(status.restarts_attempted, 0);
    let current = status.config.expect("running status carries its config");
    assert_eq!(current.run_command, "sleep 30");
    assert!(controller::is_alive(status.pid));

    supervisor.stop_current().await.unwrap();
}

#[tokio::test]
async fn test_stop_does_not_trigger_restart_policy() {
    let supervisor = test_supervisor();

    supervisor
        .start_process(config("sleep 30", 3, 0), &workdir())
        .await
        .unwrap();
    let pid = supervisor.current_pid().await;

    supervisor.stop_current().await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(!supervisor.is_running().await);
    assert!(!controller::is_alive(pid));
    assert_eq!(supervisor.status().await.restarts_attempted, 0);
}

#[tokio::test]
async fn test_group_termination_reaches_shell_children() {
    let supervisor = test_supervisor();

    // The shell forks a child; both live in the spawned process group
    supervisor
        .start_process(config("sleep 30 & sleep 40", 0, 0), &workdir())
        .await
        .unwrap();
    let pid = supervisor.current_pid().await;
    assert!(controller::is_alive(pid));

    supervisor.stop_current().await.unwrap();
    assert!(!controller::is_alive(pid));
}
