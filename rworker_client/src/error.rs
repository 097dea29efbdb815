use std::{io, path::PathBuf};

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("could not read {path:?}: {source}")]
    ReadFile { path: PathBuf, source: io::Error },
    #[error("invalid TLS material: {0}")]
    Tls(reqwest::Error),
    #[error("error executing request: {0}")]
    Request(#[from] reqwest::Error),
    #[error("server responded with {status}: {msg}")]
    Server { status: StatusCode, msg: String },
}
