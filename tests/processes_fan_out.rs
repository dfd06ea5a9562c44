// tests/processes_fan_out.rs

mod common;
use crate::common::builders::{FormationBuilder, ReleaseBuilder};
use crate::common::fake_driver::{DriverEvent, FakeDriver};
use crate::common::{init_tracing, with_timeout};

use std::sync::Arc;

use dynosup::driver::DynoDriver;
use dynosup::engine::{aggregate_exit_code, Command, Processes};
use dynosup::errors::SupervisorError;
use dynosup::types::ExitStatus;

fn web_and_worker(fake: &FakeDriver) -> Processes {
    let driver: Arc<dyn DynoDriver> = Arc::new(fake.clone());
    ReleaseBuilder::new("shop", 4)
        .formation(FormationBuilder::new("web").quantity(2).build())
        .formation(FormationBuilder::new("worker").quantity(1).build())
        .processes(driver)
}

fn run_topology(fake: &FakeDriver) -> Processes {
    let driver: Arc<dyn DynoDriver> = Arc::new(fake.clone());
    ReleaseBuilder::new("shop", 4)
        .formation(FormationBuilder::new("web").quantity(5).build())
        .processes(driver)
}

fn names(procs: &Processes) -> Vec<String> {
    procs.executors().iter().map(|h| h.name().to_string()).collect()
}

#[tokio::test]
async fn start_realises_declared_quantities() {
    init_tracing();
    let fake = FakeDriver::new();
    let mut procs = web_and_worker(&fake);

    procs.start(&Command::Start, None).await.unwrap();
    assert_eq!(names(&procs), vec!["web.1", "web.2", "worker.1"]);
    assert!(!procs.is_one_shot());
    assert!(procs.take_statuses().is_none());

    fake.wait_until(|ev| ev.iter().filter(|e| matches!(e, DriverEvent::Start(_))).count() == 3)
        .await;
    assert_eq!(fake.events()[0], DriverEvent::Build("shop-4".into()));

    with_timeout(procs.stop()).await;
    assert!(procs.executors().iter().all(|h| h.is_complete()));

    let mut stops = fake.stops();
    stops.sort();
    assert_eq!(
        stops,
        vec!["shop-4/web.1", "shop-4/web.2", "shop-4/worker.1"]
    );
}

#[tokio::test]
async fn concurrency_override_applies_to_every_formation() {
    init_tracing();
    let fake = FakeDriver::new();
    let mut procs = web_and_worker(&fake);

    procs.start(&Command::Start, Some(3)).await.unwrap();
    assert_eq!(
        names(&procs),
        vec!["web.1", "web.2", "web.3", "worker.1", "worker.2", "worker.3"]
    );

    with_timeout(procs.stop()).await;
}

#[tokio::test]
async fn zero_override_realises_nothing() {
    init_tracing();
    let fake = FakeDriver::new();
    let mut procs = web_and_worker(&fake);

    procs.start(&Command::Start, Some(0)).await.unwrap();
    assert!(procs.executors().is_empty());

    with_timeout(procs.stop()).await;
    assert!(fake.starts().is_empty());
    assert_eq!(fake.events(), vec![DriverEvent::Build("shop-4".into())]);
}

#[tokio::test]
async fn build_failure_aborts_before_any_executor_exists() {
    init_tracing();
    let fake = FakeDriver::new().fail_build("slug missing");
    let mut procs = web_and_worker(&fake);

    let err = procs.start(&Command::Start, None).await.unwrap_err();
    match err {
        SupervisorError::BuildFailed { release, reason } => {
            assert_eq!(release, "shop-4");
            assert_eq!(reason, "slug missing");
        }
        other => panic!("expected BuildFailed, got {other:?}"),
    }

    assert!(procs.executors().is_empty());
    assert!(fake.starts().is_empty());
}

#[tokio::test]
async fn stopping_twice_is_a_no_op() {
    init_tracing();
    let fake = FakeDriver::new();
    let mut procs = web_and_worker(&fake);

    procs.start(&Command::Start, None).await.unwrap();
    fake.wait_until(|ev| ev.iter().filter(|e| matches!(e, DriverEvent::Start(_))).count() == 3)
        .await;

    with_timeout(procs.stop()).await;
    let after_first = fake.events();

    with_timeout(procs.stop()).await;
    assert_eq!(fake.events(), after_first);
}

#[tokio::test]
async fn run_collects_every_slot_status_in_order() {
    init_tracing();
    let fake = FakeDriver::new()
        .exit_with("run.1", 0)
        .exit_with("run.2", 3)
        .exit_with("run.3", 0);
    let mut procs = run_topology(&fake);
    let command = Command::Run {
        args: vec!["rake".into(), "db:migrate".into()],
    };

    procs.start(&command, Some(3)).await.unwrap();
    assert!(procs.is_one_shot());
    assert_eq!(names(&procs), vec!["run.1", "run.2", "run.3"]);

    let statuses = procs.take_statuses().expect("one-shot statuses");
    assert!(procs.take_statuses().is_none(), "statuses are taken once");

    let exits = with_timeout(statuses).await;
    let got: Vec<(&str, &ExitStatus)> = exits.iter().map(|e| (e.name.as_str(), &e.status)).collect();
    assert_eq!(
        got,
        vec![
            ("run.1", &ExitStatus::Exited(0)),
            ("run.2", &ExitStatus::Exited(3)),
            ("run.3", &ExitStatus::Exited(0)),
        ]
    );
    assert_eq!(aggregate_exit_code(&exits), 3);

    // Formations are ignored for a one-shot run.
    assert!(fake.starts().iter().all(|k| k.starts_with("shop-4/run.")));
}

#[tokio::test]
async fn run_defaults_to_a_single_slot() {
    init_tracing();
    let fake = FakeDriver::new().exit_with("run.1", 0);
    let mut procs = run_topology(&fake);

    procs
        .start(&Command::Run { args: vec!["true".into()] }, None)
        .await
        .unwrap();
    assert_eq!(names(&procs), vec!["run.1"]);

    let exits = with_timeout(procs.take_statuses().unwrap()).await;
    assert_eq!(aggregate_exit_code(&exits), 0);
}

#[tokio::test]
async fn run_with_zero_slots_resolves_to_no_statuses() {
    init_tracing();
    let fake = FakeDriver::new();
    let mut procs = run_topology(&fake);

    procs
        .start(&Command::Run { args: vec!["true".into()] }, Some(0))
        .await
        .unwrap();
    assert!(procs.executors().is_empty());

    let exits = with_timeout(procs.take_statuses().expect("one-shot statuses")).await;
    assert!(exits.is_empty());
    assert_eq!(aggregate_exit_code(&exits), 0);
    assert!(procs.take_statuses().is_none());
}
