use std::{
    fs,
    path::{Path, PathBuf},
    process,
};

use reqwest::{blocking::Client, tls};
use rworker_data::JobId;
use structopt::{clap::AppSettings, StructOpt};

use crate::{
    error::ClientError,
    operations::{format_log, format_status, JobClient},
};

mod error;
mod operations;

/// Run and manage jobs on a remote worker
#[derive(StructOpt, Debug)]
#[structopt(name = "rworker-client")]
struct Opt {
    /// server address, e.g. localhost:8443
    #[structopt(long, default_value = "localhost:8443")]
    address: String,

    /// PEM certificate identifying this client
    #[structopt(long, parse(from_os_str), default_value = "certs/client/cert.pem")]
    client_cert: PathBuf,

    /// PEM private key of the client certificate
    #[structopt(long, parse(from_os_str), default_value = "certs/client/key.pem")]
    client_key: PathBuf,

    /// PEM certificate used to verify the server
    #[structopt(long, parse(from_os_str), default_value = "certs/server/cert.pem")]
    server_cert: PathBuf,

    #[structopt(subcommand)]
    operation: Operation,
}

#[derive(Debug, StructOpt, PartialEq)]
enum Operation {
    /// start a job
    #[structopt(
        visible_alias = "a",
        settings = &[AppSettings::TrailingVarArg, AppSettings::AllowLeadingHyphen]
    )]
    Add {
        #[structopt(name = "COMMAND")]
        command: String,
        #[structopt(name = "ARGS")]
        arguments: Vec<String>,
    },
    /// show the status of a job
    #[structopt(visible_alias = "sta")]
    Status {
        #[structopt(name = "JOB_ID")]
        job_id: JobId,
    },
    /// show the output of a job
    #[structopt(visible_alias = "l")]
    Log {
        #[structopt(name = "JOB_ID")]
        job_id: JobId,
    },
    /// stop a running job
    #[structopt(visible_alias = "sto")]
    Stop {
        #[structopt(name = "JOB_ID")]
        job_id: JobId,
    },
    /// list all jobs
    #[structopt(visible_alias = "ls")]
    List,
}

fn read(path: &Path) -> Result<Vec<u8>, ClientError> {
    fs::read(path).map_err(|source| ClientError::ReadFile {
        path: path.to_path_buf(),
        source,
    })
}

fn http_client(opt: &Opt) -> Result<Client, ClientError> {
    let server_cert = reqwest::Certificate::from_pem(&read(&opt.server_cert)?)
        .map_err(ClientError::Tls)?;
    let mut identity = read(&opt.client_key)?;
    identity.push(b'\n');
    identity.extend_from_slice(&read(&opt.client_cert)?);
    let identity = reqwest::Identity::from_pem(&identity).map_err(ClientError::Tls)?;

    Client::builder()
        .add_root_certificate(server_cert)
        .tls_built_in_root_certs(false)
        .identity(identity)
        .use_rustls_tls()
        .min_tls_version(tls::Version::TLS_1_3)
        .build()
        .map_err(ClientError::Tls)
}

fn run(opt: Opt) -> Result<String, ClientError> {
    let job_client = JobClient::new(http_client(&opt)?, &opt.address);
    match opt.operation {
        Operation::Add { command, arguments } => Ok(job_client.add(&command, &arguments)?.to_string()),
        Operation::Status { job_id } => Ok(format_status(&job_client.status(job_id)?)),
        Operation::Log { job_id } => Ok(format_log(&job_client.log(job_id)?)),
        Operation::Stop { job_id } => {
            job_client.stop(job_id)?;
            Ok(format!("stopped {}", job_id))
        }
        Operation::List => {
            let lines: Vec<String> = job_client.list()?.iter().map(format_status).collect();
            Ok(lines.join("\n"))
        }
    }
}

fn main() {
    let opt = Opt::from_args();
    match run(opt) {
        Ok(output) => println!("{}", output),
        Err(err) => {
            eprintln!("{}", err);
            process::exit(1);
        }
    }
}
