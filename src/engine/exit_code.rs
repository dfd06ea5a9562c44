// src/engine/exit_code.rs

//! Process exit code for a finished one-shot topology.

use tracing::{info, warn};

use crate::types::ExitStatus;

/// Floor contributed by a unit that could not be executed.
pub const EXEC_FAILURE_CODE: i32 = 255;

/// Exit code after a termination signal or a fatal startup error.
pub const FATAL_EXIT_CODE: i32 = 1;

/// Terminal status of one named dyno.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynoExit {
    pub name: String,
    pub status: ExitStatus,
}

/// Fold every one-shot status into one exit code, starting from 0:
/// a failed unit raises it to at least 255, a unit that ran raises it to its
/// own code if larger.
pub fn aggregate_exit_code(exits: &[DynoExit]) -> i32 {
    let mut code = 0;

    for exit in exits {
        match &exit.status {
            ExitStatus::Failed(err) => {
                warn!(dyno = %exit.name, error = %err, "could not execute");
                code = code.max(EXEC_FAILURE_CODE);
            }
            ExitStatus::Exited(c) => {
                info!(dyno = %exit.name, code = c, "exits with code");
                code = code.max(*c);
            }
        }
    }

    code
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exited(name: &str, code: i32) -> DynoExit {
        DynoExit {
            name: name.to_string(),
            status: ExitStatus::Exited(code),
        }
    }

    fn failed(name: &str) -> DynoExit {
        DynoExit {
            name: name.to_string(),
            status: ExitStatus::failed("exec failed"),
        }
    }

    #[test]
    fn empty_is_zero() {
        assert_eq!(aggregate_exit_code(&[]), 0);
    }

    #[test]
    fn highest_real_code_wins() {
        assert_eq!(aggregate_exit_code(&[exited("run.1", 0), exited("run.2", 3)]), 3);
        assert_eq!(aggregate_exit_code(&[exited("run.1", 7), exited("run.2", 200)]), 200);
    }

    #[test]
    fn failure_floors_at_255() {
        assert_eq!(aggregate_exit_code(&[failed("run.1"), exited("run.2", 0)]), 255);
        assert_eq!(aggregate_exit_code(&[exited("run.1", 0), failed("run.2")]), 255);
    }

    #[test]
    fn failure_does_not_lower_a_higher_code() {
        // Codes above 255 can come from drivers that do not truncate.
        assert_eq!(aggregate_exit_code(&[exited("run.1", 300), failed("run.2")]), 300);
    }

    #[test]
    fn negative_codes_do_not_lower_the_aggregate() {
        assert_eq!(aggregate_exit_code(&[exited("run.1", -1)]), 0);
    }
}
