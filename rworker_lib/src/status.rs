use std::time::SystemTime;

use rworker_data::Status;

use crate::error::ProcessError;

/// exit code recorded for a process that ended without one, e.g. killed by a signal
pub const NO_EXIT_CODE: i32 = -1;

/// Raw snapshot of a process as captured so far.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessStatus {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub started_at: Option<SystemTime>,
    pub stopped_at: Option<SystemTime>,
    /// only meaningful once `stopped_at` is set
    pub exit_code: i32,
    /// set when a stop request killed the process before it exited on its own
    pub terminated_by_request: bool,
    pub error: Option<ProcessError>,
}

impl ProcessStatus {
    pub fn is_finished(&self) -> bool {
        self.stopped_at.is_some()
    }
}

/// Maps a raw snapshot to a job status and its exit code.
///
/// A recorded process error fails the derivation. A job is only terminal once
/// both timestamps are set; a stop timestamp without a start timestamp still
/// counts as running. Terminal jobs always carry an exit code, stopped jobs
/// report `NO_EXIT_CODE`.
pub fn derive_status(status: &ProcessStatus) -> Result<(Status, Option<i32>), ProcessError> {
    if let Some(err) = &status.error {
        return Err(err.clone());
    }
    match (status.started_at, status.stopped_at) {
        (Some(_), Some(_)) if status.terminated_by_request => {
            Ok((Status::Stopped, Some(status.exit_code)))
        }
        (Some(_), Some(_)) => Ok((Status::Done, Some(status.exit_code))),
        _ => Ok((Status::Running, None)),
    }
}
