// tests/simple_driver_processes.rs
#![cfg(unix)]

mod common;
use crate::common::builders::{FormationBuilder, ReleaseBuilder};
use crate::common::{init_tracing, with_timeout};

use std::sync::Arc;
use std::time::Duration;

use dynosup::driver::{DynoDriver, SimpleDynoDriver};
use dynosup::engine::{aggregate_exit_code, Command, Processes, EXEC_FAILURE_CODE};

fn driver() -> Arc<dyn DynoDriver> {
    Arc::new(SimpleDynoDriver::new(Duration::from_secs(2)))
}

fn sh(script: &str) -> Command {
    Command::Run {
        args: vec!["sh".into(), "-c".into(), script.into()],
    }
}

async fn run_to_code(mut procs: Processes, command: Command, concurrency: Option<usize>) -> i32 {
    procs.start(&command, concurrency).await.unwrap();
    let exits = with_timeout(procs.take_statuses().unwrap()).await;
    aggregate_exit_code(&exits)
}

#[tokio::test]
async fn run_reports_the_real_exit_code() {
    init_tracing();
    let procs = ReleaseBuilder::new("shop", 1).processes(driver());

    assert_eq!(run_to_code(procs, sh("exit 3"), None).await, 3);
}

#[tokio::test]
async fn run_sees_release_config_and_dyno_name() {
    init_tracing();
    let procs = ReleaseBuilder::new("shop", 1)
        .env("CODE", "7")
        .processes(driver());

    let command = sh(r#"case "$DYNO" in run.1|run.2) exit "$CODE" ;; *) exit 99 ;; esac"#);
    assert_eq!(run_to_code(procs, command, Some(2)).await, 7);
}

#[tokio::test]
async fn missing_program_counts_as_could_not_execute() {
    init_tracing();
    let procs = ReleaseBuilder::new("shop", 1).processes(driver());
    let command = Command::Run {
        args: vec!["/nonexistent/dynosup-test-binary".into()],
    };

    assert_eq!(run_to_code(procs, command, None).await, EXEC_FAILURE_CODE);
}

#[tokio::test]
async fn stop_terminates_long_lived_units() {
    init_tracing();
    let mut procs = ReleaseBuilder::new("shop", 1)
        .formation(FormationBuilder::new("web").quantity(2).args(&["sleep", "30"]).build())
        .processes(driver());

    procs.start(&Command::Start, None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(procs.executors().iter().all(|h| !h.is_complete()));

    with_timeout(procs.stop()).await;
    assert!(procs.executors().iter().all(|h| h.is_complete()));
}
