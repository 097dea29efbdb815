use std::path::PathBuf;

use rocket::{
    http::Status,
    response::{self, status, Responder},
    serde::json::Json,
    Request,
};
use rworker_data::ErrorBody;
use rworker_lib::{AuthenticationError, JobDirectoryError};
use thiserror::Error;

/// Everything a request can fail with, sent back as `{"err": ...}`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Directory(#[from] JobDirectoryError),
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    #[error("malformed job id: {0}")]
    MalformedJobId(String),
}

impl ApiError {
    /// only lookups that found nothing are the client's fault
    pub fn status(&self) -> Status {
        match self {
            ApiError::Directory(err) if err.is_not_found() => Status::NotFound,
            _ => Status::InternalServerError,
        }
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        status::Custom(self.status(), Json(ErrorBody::new(&self))).respond_to(request)
    }
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("could not read {path:?}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not load client certificates: {0}")]
    ClientCertificates(String),
    #[error("server failed: {0}")]
    Launch(String),
}
