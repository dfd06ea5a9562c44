// src/lib.rs

pub mod cli;
pub mod config;
pub mod driver;
pub mod engine;
pub mod errors;
pub mod executor;
pub mod logging;
pub mod os_signals;
pub mod poll;
pub mod types;

use std::path::PathBuf;

use tracing::{debug, error, info};

use crate::cli::CliArgs;
use crate::config::validate::ensure_app_matches;
use crate::config::{load_and_validate, DriverConfig, CONTROL_FILE_NAME};
use crate::engine::{effective_concurrency, Command, Supervisor};
use crate::errors::{Result, SupervisorError};
use crate::poll::{DirPoller, Poller};

/// High-level entry point used by `main.rs`. Returns the process exit code.
///
/// This wires together:
/// - driver selection (validated before anything is built)
/// - the control directory poller
/// - the termination signal listener
/// - the reconciliation loop
pub async fn run(args: CliArgs) -> Result<i32> {
    let command = args.command.to_command();
    let control_dir = args.control_dir.clone().map(PathBuf::from).ok_or_else(|| {
        SupervisorError::ConfigError("need --control-dir or CONTROL_DIR".to_string())
    })?;

    if args.dry_run {
        print_dry_run(&control_dir, args.app.as_deref(), &command, args.concurrency())?;
        return Ok(0);
    }

    let driver_config = DriverConfig::from_env(args.dynodriver)?;
    info!(?driver_config, "dyno driver selected");
    let driver = driver::from_config(&driver_config);

    let poller: Box<dyn Poller> = Box::new(DirPoller::new(control_dir, args.app.clone(), driver));
    let topologies = poller.poll()?;

    let shutdown = async {
        match os_signals::wait_for_shutdown_signal().await {
            Ok(name) => name.to_string(),
            Err(e) => {
                error!(error = %e, "failed to listen for termination signals");
                std::future::pending::<String>().await
            }
        }
    };

    Supervisor::new(command, args.concurrency(), topologies, shutdown)
        .run()
        .await
}

/// Print the topology the control file would realise, without building or
/// starting anything.
fn print_dry_run(
    control_dir: &std::path::Path,
    app: Option<&str>,
    command: &Command,
    concurrency: Option<usize>,
) -> Result<()> {
    let file = load_and_validate(control_dir.join(CONTROL_FILE_NAME))?;
    ensure_app_matches(&file, app)?;
    let release = file.release();

    println!("dynosup dry-run");
    println!("  release = {}", release.name());
    if let Some(slug) = release.slug_url() {
        println!("  slug_url = {slug}");
    }
    let mut keys: Vec<&String> = release.config().keys().collect();
    keys.sort();
    println!("  config = {:?}", keys);
    println!();

    match command {
        Command::Start => {
            let forms = file.formations();
            println!("formations ({}):", forms.len());
            for form in forms.iter() {
                println!(
                    "  - {} x{}",
                    form.process_type(),
                    effective_concurrency(concurrency, form.quantity())
                );
                println!("      args: {:?}", form.args());
            }
        }
        Command::Run { args } => {
            println!("run x{}", effective_concurrency(concurrency, 1));
            println!("      args: {:?}", args);
        }
    }

    debug!("dry-run complete (nothing started)");
    Ok(())
}
