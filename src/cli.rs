// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::DriverKind;
use crate::engine::Command;

/// Command-line arguments for `dynosup`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dynosup",
    version,
    about = "Supervise the dynos of one release on this host.",
    long_about = None
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: CliCommand,

    /// App name; control files for other apps are rejected.
    #[arg(short = 'a', long, global = true, value_name = "NAME")]
    pub app: Option<String>,

    /// Replica count for every process type, overriding declared quantities.
    /// A negative value keeps the declared quantities.
    #[arg(
        short = 'c',
        long,
        global = true,
        value_name = "N",
        allow_negative_numbers = true
    )]
    pub concurrency: Option<i64>,

    /// Dyno driver: how dynos are built, started and stopped.
    #[arg(
        short = 'd',
        long,
        global = true,
        value_enum,
        default_value = "simple",
        value_name = "DRIVER"
    )]
    pub dynodriver: DriverKind,

    /// Directory holding `release.toml`.
    #[arg(long, global = true, env = "CONTROL_DIR", value_name = "DIR")]
    pub control_dir: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DYNOSUP_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Load and validate the release, print the topology, don't run anything.
    #[arg(long, global = true)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum CliCommand {
    /// Keep every declared process type running.
    Start,
    /// Run a program to completion and exit with its status.
    Run {
        /// Program and arguments.
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

impl CliArgs {
    /// Concurrency override; absent or negative means "use declared quantity".
    pub fn concurrency(&self) -> Option<usize> {
        self.concurrency.and_then(|c| usize::try_from(c).ok())
    }
}

impl CliCommand {
    pub fn to_command(&self) -> Command {
        match self {
            CliCommand::Start => Command::Start,
            CliCommand::Run { args } => Command::Run { args: args.clone() },
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Parse the process arguments. Usage errors exit with status 1; `--help`
/// and `--version` exit with 0.
pub fn parse() -> CliArgs {
    match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_start_with_overrides() {
        let args = CliArgs::try_parse_from([
            "dynosup", "-a", "shop", "-c", "3", "-d", "docker", "--control-dir", "/ctl", "start",
        ])
        .unwrap();
        assert_eq!(args.command.to_command(), Command::Start);
        assert_eq!(args.app.as_deref(), Some("shop"));
        assert_eq!(args.concurrency(), Some(3));
        assert_eq!(args.dynodriver, DriverKind::Docker);
        assert_eq!(args.control_dir.as_deref(), Some("/ctl"));
    }

    #[test]
    fn run_keeps_program_flags() {
        let args =
            CliArgs::try_parse_from(["dynosup", "--control-dir", "/ctl", "run", "ls", "-la"]).unwrap();
        assert_eq!(
            args.command.to_command(),
            Command::Run {
                args: vec!["ls".to_string(), "-la".to_string()]
            }
        );
        assert_eq!(args.dynodriver, DriverKind::Simple);
        assert_eq!(args.concurrency(), None);
    }

    #[test]
    fn negative_concurrency_keeps_declared_quantities() {
        let args =
            CliArgs::try_parse_from(["dynosup", "-c", "-1", "--control-dir", "/ctl", "start"]).unwrap();
        assert_eq!(args.concurrency, Some(-1));
        assert_eq!(args.concurrency(), None);

        let args = CliArgs::try_parse_from(["dynosup", "-c", "0", "start"]).unwrap();
        assert_eq!(args.concurrency(), Some(0));
    }

    #[test]
    fn run_needs_a_program() {
        assert!(CliArgs::try_parse_from(["dynosup", "run"]).is_err());
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert!(CliArgs::try_parse_from(["dynosup", "restart"]).is_err());
    }
}
