use rocket::{
    http::Status,
    serde::json::{self, Json},
    Build, Config, Request, Rocket, State,
};
use rworker_data::{ErrorBody, JobCreated, JobId, JobLog, JobRequest, JobStatus};
use rworker_lib::{AuthenticationError, JobDirectory};
use structopt::StructOpt;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::{
    auth::Caller,
    config::ServerOpt,
    error::{ApiError, ServerError},
};

#[macro_use]
extern crate rocket;

mod auth;
mod config;
mod error;

/// logs the operation for the caller, or the rejection of an unauthenticated one
fn authenticate(
    caller: Result<Caller, AuthenticationError>,
    op: &'static str,
) -> Result<Caller, ApiError> {
    match caller {
        Ok(caller) => {
            info!(identity = %caller.identity, op, "handling request");
            Ok(caller)
        }
        Err(err) => {
            warn!(op, "rejecting request: {}", err);
            Err(err.into())
        }
    }
}

fn logged<T>(caller: &Caller, op: &'static str, result: Result<T, ApiError>) -> Result<T, ApiError> {
    if let Err(err) = &result {
        error!(identity = %caller.identity, op, "returning an error: {}", err);
    }
    result
}

fn parse_job_id(id: &str) -> Result<JobId, ApiError> {
    Uuid::parse_str(id).map_err(|_| ApiError::MalformedJobId(id.to_string()))
}

#[post("/job", data = "<job_request>")]
fn add_job(
    caller: Result<Caller, AuthenticationError>,
    directory: &State<JobDirectory>,
    job_request: Result<Json<JobRequest>, json::Error<'_>>,
) -> Result<Json<JobCreated>, ApiError> {
    let caller = authenticate(caller, "add_job")?;
    let result = job_request
        .map_err(|err| ApiError::MalformedRequest(err.to_string()))
        .and_then(|job_request| {
            let JobRequest { command, arguments } = job_request.into_inner();
            Ok(directory.add_job(caller.identity, &command, &arguments)?)
        })
        .map(|id| Json(JobCreated { id }));
    logged(&caller, "add_job", result)
}

#[get("/job/<id>")]
fn job_status(
    caller: Result<Caller, AuthenticationError>,
    directory: &State<JobDirectory>,
    id: &str,
) -> Result<Json<JobStatus>, ApiError> {
    let caller = authenticate(caller, "job_status")?;
    let result = parse_job_id(id)
        .and_then(|job_id| Ok(directory.compute_status(caller.identity, job_id)?))
        .map(Json);
    logged(&caller, "job_status", result)
}

#[get("/log/<id>")]
fn job_log(
    caller: Result<Caller, AuthenticationError>,
    directory: &State<JobDirectory>,
    id: &str,
) -> Result<Json<JobLog>, ApiError> {
    let caller = authenticate(caller, "job_log")?;
    let result = parse_job_id(id)
        .and_then(|job_id| Ok(directory.compute_log(caller.identity, job_id)?))
        .map(Json);
    logged(&caller, "job_log", result)
}

#[delete("/stop/<id>")]
async fn stop_job(
    caller: Result<Caller, AuthenticationError>,
    directory: &State<JobDirectory>,
    id: &str,
) -> Result<(), ApiError> {
    let caller = authenticate(caller, "stop_job")?;
    let result = match parse_job_id(id) {
        Ok(job_id) => directory
            .stop_job(caller.identity, job_id)
            .await
            .map_err(ApiError::from),
        Err(err) => Err(err),
    };
    logged(&caller, "stop_job", result)
}

#[get("/jobs")]
fn list_jobs(
    caller: Result<Caller, AuthenticationError>,
    directory: &State<JobDirectory>,
) -> Result<Json<Vec<JobStatus>>, ApiError> {
    let caller = authenticate(caller, "list_jobs")?;
    let result = directory
        .list_jobs(caller.identity)
        .map(Json)
        .map_err(ApiError::from);
    logged(&caller, "list_jobs", result)
}

/// unmatched routes and framework failures get the same error envelope
#[catch(default)]
fn default_catcher(status: Status, request: &Request<'_>) -> Json<ErrorBody> {
    warn!("{} {} failed with {}", request.method(), request.uri(), status);
    Json(ErrorBody::new(status.reason().unwrap_or("unknown error")))
}

fn rocket(config: Config) -> Rocket<Build> {
    rocket::custom(config)
        .manage(JobDirectory::new())
        .mount(
            "/",
            routes![add_job, job_status, job_log, stop_job, list_jobs],
        )
        .register("/", catchers![default_catcher])
}

#[rocket::main]
async fn main() -> Result<(), ServerError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let opt = ServerOpt::from_args();
    let config = opt.rocket_config().await?;
    info!("Starting server on {}", opt.address);
    rocket(config)
        .launch()
        .await
        .map_err(|err| ServerError::Launch(err.to_string()))?;
    Ok(())
}
