use std::io;

use rworker_data::JobId;
use thiserror::Error;

use crate::identity::Identity;

#[derive(Error, Debug)]
pub enum JobDirectoryError {
    #[error("Identity not found: {0}")]
    IdentityNotFound(Identity),
    #[error("Job not found: {0}")]
    JobNotFound(JobId),
    #[error("could not start process: {0}")]
    Spawn(#[from] io::Error),
    #[error(transparent)]
    Process(#[from] ProcessError),
}

impl JobDirectoryError {
    /// both lookup failures look the same from the outside
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            JobDirectoryError::IdentityNotFound(_) | JobDirectoryError::JobNotFound(_)
        )
    }
}

/// failure recorded by a process after it was spawned
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("process error: {msg}")]
pub struct ProcessError {
    pub msg: String,
}

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum AuthenticationError {
    #[error("request missing client certificate")]
    MissingCertificate,
    #[error("bad client certificate: {0}")]
    InvalidCertificate(String),
    #[error("client certificate missing subject common name")]
    MissingCommonName,
    #[error("client certificate common name is not a valid identity: {0}")]
    MalformedCommonName(String),
}

pub type Result<T> = std::result::Result<T, JobDirectoryError>;
