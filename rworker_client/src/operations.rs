use reqwest::blocking::{Client, Response};
use rworker_data::{ErrorBody, JobCreated, JobId, JobLog, JobRequest, JobStatus};
use serde::de::DeserializeOwned;

use crate::error::ClientError;

/// Talks to a single server, every call maps to one request.
pub struct JobClient {
    http_client: Client,
    base_url: String,
}

impl JobClient {
    pub fn new(http_client: Client, address: &str) -> Self {
        Self {
            http_client,
            base_url: base_url(address),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    pub fn add(&self, command: &str, arguments: &[String]) -> Result<JobId, ClientError> {
        let job_request = JobRequest {
            command: command.to_string(),
            arguments: arguments.to_vec(),
        };
        let response = self
            .http_client
            .post(self.url("job"))
            .json(&job_request)
            .send()?;
        let created: JobCreated = parse_response(response)?;
        Ok(created.id)
    }

    pub fn status(&self, job_id: JobId) -> Result<JobStatus, ClientError> {
        let response = self
            .http_client
            .get(self.url(&format!("job/{}", job_id)))
            .send()?;
        parse_response(response)
    }

    pub fn log(&self, job_id: JobId) -> Result<JobLog, ClientError> {
        let response = self
            .http_client
            .get(self.url(&format!("log/{}", job_id)))
            .send()?;
        parse_response(response)
    }

    pub fn stop(&self, job_id: JobId) -> Result<(), ClientError> {
        let response = self
            .http_client
            .delete(self.url(&format!("stop/{}", job_id)))
            .send()?;
        check_status(response).map(|_| ())
    }

    pub fn list(&self) -> Result<Vec<JobStatus>, ClientError> {
        let response = self.http_client.get(self.url("jobs")).send()?;
        parse_response(response)
    }
}

fn base_url(address: &str) -> String {
    if address.starts_with("https://") {
        address.trim_end_matches('/').to_string()
    } else {
        format!("https://{}", address.trim_end_matches('/'))
    }
}

fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    // not every failure carries the error envelope
    let text = response.text()?;
    let msg = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => body.err,
        Err(_) => text,
    };
    Err(ClientError::Server { status, msg })
}

fn parse_response<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    Ok(check_status(response)?.json()?)
}

pub fn format_status(status: &JobStatus) -> String {
    let mut line = format!(
        "{}: {} {:?} {:?}",
        status.id, status.command, status.arguments, status.status
    );
    if let Some(exit_code) = status.exit_code {
        line.push_str(&format!(" (exit code {})", exit_code));
    }
    line
}

pub fn format_log(log: &JobLog) -> String {
    format!("___STDOUT___\n{}\n___STDERR___\n{}", log.stdout, log.stderr)
}
