use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type JobId = Uuid;

/// body of a job submission, arguments may be omitted
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub command: String,
    #[serde(default)]
    pub arguments: Vec<String>,
}

impl JobRequest {
    pub fn new(command: &str, args: &[&str]) -> Self {
        Self {
            command: command.to_string(),
            arguments: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCreated {
    pub id: JobId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Running,
    Done,
    Stopped,
}

/// Status report of a single job.
///
/// `exit_code` is only present once the job reached a terminal status.
/// A stopped job reports `-1`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub id: JobId,
    pub command: String,
    pub arguments: Vec<String>,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

/// captured output, lines joined by a single newline
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobLog {
    pub stdout: String,
    pub stderr: String,
}

impl JobLog {
    pub fn from_lines(stdout_lines: &[String], stderr_lines: &[String]) -> Self {
        Self {
            stdout: stdout_lines.join("\n"),
            stderr: stderr_lines.join("\n"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub err: String,
}

impl ErrorBody {
    pub fn new(err: impl ToString) -> Self {
        Self {
            err: err.to_string(),
        }
    }
}
