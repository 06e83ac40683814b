//! Exit codes for the CLI

use baton_core::BatonError;
use baton_tasks::{GraphError, SchedulerError};

/// Success
pub const SUCCESS: i32 = 0;

/// General error
pub const ERROR: i32 = 1;

/// Configuration or task graph error, raised before anything runs
pub const CONFIG_ERROR: i32 = 2;

/// User cancelled
pub const CANCELLED: i32 = 130;

/// Exit code for an error that ended the command
pub fn for_error(err: &anyhow::Error) -> i32 {
    let is_config = err.chain().any(|cause| {
        cause.is::<BatonError>()
            || cause.is::<GraphError>()
            || matches!(cause.downcast_ref::<SchedulerError>(), Some(SchedulerError::Graph(_)))
    });
    if is_config {
        CONFIG_ERROR
    } else {
        ERROR
    }
}
