use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

pub use rworker_data::{JobId, JobLog, JobStatus};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    error::{JobDirectoryError, Result},
    identity::Identity,
    process::Process,
    status::derive_status,
};

struct Entry {
    /// insertion order, used for listing
    seq: u64,
    process: Arc<Process>,
}

type IdentityJobs = HashMap<JobId, Entry>;

#[derive(Default)]
struct Registry {
    next_seq: u64,
    jobs: HashMap<Identity, IdentityJobs>,
}

/// Registry of every job of every identity.
///
/// One lock guards the shape of the map and is only held while reading or
/// inserting an entry; calls into a `Process` happen after it is released.
/// Jobs are never evicted.
#[derive(Default)]
pub struct JobDirectory {
    registry: RwLock<Registry>,
}

impl JobDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// spawns the command and registers it under the identity
    /// the job id is only visible to other operations once this returns
    #[instrument(skip(self))]
    pub fn add_job(&self, identity: Identity, command: &str, arguments: &[String]) -> Result<JobId> {
        info!("try to spawn process");
        let process = Process::start(command, arguments).map_err(|err| {
            error!("process could not be spawned, error: {}", err);
            JobDirectoryError::Spawn(err)
        })?;
        let job_id = Uuid::new_v4();
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        let seq = registry.next_seq;
        registry.next_seq += 1;
        registry.jobs.entry(identity).or_default().insert(
            job_id,
            Entry {
                seq,
                process: Arc::new(process),
            },
        );
        drop(registry);
        info!("added job {}", job_id);
        Ok(job_id)
    }

    #[instrument(skip(self))]
    pub fn compute_status(&self, identity: Identity, job_id: JobId) -> Result<JobStatus> {
        info!("try to get status");
        let process = self.retrieve_job(identity, job_id)?;
        job_status(job_id, &process)
    }

    #[instrument(skip(self))]
    pub fn compute_log(&self, identity: Identity, job_id: JobId) -> Result<JobLog> {
        info!("try to get log");
        let process = self.retrieve_job(identity, job_id)?;
        let status = process.status();
        Ok(JobLog::from_lines(&status.stdout, &status.stderr))
    }

    /// Stops the job and returns once its process has been reaped.
    ///
    /// Stopping twice, concurrently or after the job finished on its own all
    /// succeed; a finished job keeps its status.
    #[instrument(skip(self))]
    pub async fn stop_job(&self, identity: Identity, job_id: JobId) -> Result<()> {
        info!("try to stop job");
        let process = self.retrieve_job(identity, job_id)?;
        process.stop().await;
        info!("stopped job");
        Ok(())
    }

    /// statuses of all jobs of the identity, in the order they were added
    #[instrument(skip(self))]
    pub fn list_jobs(&self, identity: Identity) -> Result<Vec<JobStatus>> {
        info!("get a list of jobs");
        let mut processes: Vec<(u64, JobId, Arc<Process>)> = {
            let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
            let identity_jobs = registry
                .jobs
                .get(&identity)
                .ok_or(JobDirectoryError::IdentityNotFound(identity))?;
            identity_jobs
                .iter()
                .map(|(job_id, entry)| (entry.seq, *job_id, Arc::clone(&entry.process)))
                .collect()
        };
        processes.sort_by_key(|(seq, _, _)| *seq);
        Ok(processes
            .iter()
            .filter_map(|(_, job_id, process)| match job_status(*job_id, process) {
                Ok(status) => Some(status),
                Err(err) => {
                    warn!("leaving job {} out of the list: {}", job_id, err);
                    None
                }
            })
            .collect())
    }

    /// looks up the job under the read lock and hands out its process
    fn retrieve_job(&self, identity: Identity, job_id: JobId) -> Result<Arc<Process>> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        let identity_jobs = registry
            .jobs
            .get(&identity)
            .ok_or(JobDirectoryError::IdentityNotFound(identity))?;
        identity_jobs
            .get(&job_id)
            .map(|entry| Arc::clone(&entry.process))
            .ok_or(JobDirectoryError::JobNotFound(job_id))
    }
}

fn job_status(job_id: JobId, process: &Process) -> Result<JobStatus> {
    let (status, exit_code) = derive_status(&process.status())?;
    Ok(JobStatus {
        id: job_id,
        command: process.command().to_string(),
        arguments: process.arguments().to_vec(),
        status,
        exit_code,
    })
}

#[cfg(test)]
mod test {
    use std::{collections::HashSet, fs, sync::Arc, time::Duration};

    use rworker_data::Status;
    use tokio::time::sleep;
    use uuid::Uuid;

    use super::{JobDirectory, JobId, JobStatus};
    use crate::{
        error::JobDirectoryError,
        identity::Identity,
        status::NO_EXIT_CODE,
        test_util::{setup, RUNTIME},
    };

    fn identity() -> Identity {
        Identity::new(Uuid::new_v4())
    }

    fn args(args: &[&str]) -> Vec<String> {
        args.iter().map(|arg| arg.to_string()).collect()
    }

    async fn wait_until_finished(
        directory: &JobDirectory,
        identity: Identity,
        job_id: JobId,
    ) -> JobStatus {
        for _ in 0..500 {
            let status = directory.compute_status(identity, job_id).unwrap();
            if status.status != Status::Running {
                return status;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} did not finish in time", job_id);
    }

    // testing status and log of ls on a folder with two subfolders
    #[test]
    fn test_status_and_log_ls() {
        setup();
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("folder0")).unwrap();
        fs::create_dir(dir.path().join("folder1")).unwrap();
        let path = dir.path().to_string_lossy().to_string();

        let directory = JobDirectory::new();
        let uid = identity();
        RUNTIME.block_on(async {
            let id = directory.add_job(uid, "ls", &[path.clone()]).unwrap();
            let status = wait_until_finished(&directory, uid, id).await;
            assert_eq!(id, status.id);
            assert_eq!("ls", status.command);
            assert_eq!(vec![path], status.arguments);
            assert_eq!(Status::Done, status.status);
            assert_eq!(Some(0), status.exit_code);

            let log = directory.compute_log(uid, id).unwrap();
            assert_eq!("folder0\nfolder1", log.stdout);
            assert_eq!("", log.stderr);
        });
    }

    // testing that a job is visible right after it was added
    #[test]
    fn test_status_right_after_add() {
        setup();
        let directory = JobDirectory::new();
        let uid = identity();
        RUNTIME.block_on(async {
            let id = directory.add_job(uid, "sleep", &args(&["5"])).unwrap();
            let status = directory.compute_status(uid, id).unwrap();
            assert_eq!(Status::Running, status.status);
            assert_eq!(None, status.exit_code);
            directory.stop_job(uid, id).await.unwrap();
        });
    }

    // testing that stopping twice is idempotent
    #[test]
    fn test_stop_twice() {
        setup();
        let directory = JobDirectory::new();
        let uid = identity();
        RUNTIME.block_on(async {
            let id = directory.add_job(uid, "sleep", &args(&["5"])).unwrap();
            directory.stop_job(uid, id).await.unwrap();
            directory.stop_job(uid, id).await.unwrap();
            let status = directory.compute_status(uid, id).unwrap();
            assert_eq!(Status::Stopped, status.status);
            assert_eq!(Some(NO_EXIT_CODE), status.exit_code);
        });
    }

    // testing that stopping a finished job keeps it done
    #[test]
    fn test_stop_done_job() {
        setup();
        let directory = JobDirectory::new();
        let uid = identity();
        RUNTIME.block_on(async {
            let id = directory
                .add_job(uid, "sh", &args(&["-c", "exit 4"]))
                .unwrap();
            wait_until_finished(&directory, uid, id).await;
            directory.stop_job(uid, id).await.unwrap();
            let status = directory.compute_status(uid, id).unwrap();
            assert_eq!(Status::Done, status.status);
            assert_eq!(Some(4), status.exit_code);
        });
    }

    // testing log of a job that is still running
    #[test]
    fn test_log_while_running() {
        setup();
        let directory = JobDirectory::new();
        let uid = identity();
        RUNTIME.block_on(async {
            let id = directory
                .add_job(uid, "sh", &args(&["-c", "echo hi; echo oops >&2; sleep 5"]))
                .unwrap();
            let mut log = directory.compute_log(uid, id).unwrap();
            for _ in 0..500 {
                if !log.stdout.is_empty() && !log.stderr.is_empty() {
                    break;
                }
                sleep(Duration::from_millis(10)).await;
                log = directory.compute_log(uid, id).unwrap();
            }
            assert_eq!("hi", log.stdout);
            assert_eq!("oops", log.stderr);
            assert_eq!(
                Status::Running,
                directory.compute_status(uid, id).unwrap().status
            );
            directory.stop_job(uid, id).await.unwrap();
        });
    }

    // testing lookups for unknown identities and foreign jobs
    #[test]
    fn test_identity_isolation() {
        setup();
        let directory = JobDirectory::new();
        let alice = identity();
        let bob = identity();
        RUNTIME.block_on(async {
            let id = directory.add_job(alice, "true", &[]).unwrap();

            match directory.compute_status(bob, id) {
                Err(JobDirectoryError::IdentityNotFound(uid)) => assert_eq!(bob, uid),
                other => panic!("expected identity not found, got: {:?}", other),
            }
            assert!(directory.compute_log(bob, id).unwrap_err().is_not_found());
            assert!(directory.stop_job(bob, id).await.unwrap_err().is_not_found());
            assert!(directory.list_jobs(bob).unwrap_err().is_not_found());

            directory.add_job(bob, "true", &[]).unwrap();
            match directory.compute_status(bob, id) {
                Err(JobDirectoryError::JobNotFound(jid)) => assert_eq!(id, jid),
                other => panic!("expected job not found, got: {:?}", other),
            }
            assert!(directory.compute_log(bob, id).unwrap_err().is_not_found());
            assert!(directory.stop_job(bob, id).await.unwrap_err().is_not_found());

            match directory.compute_status(alice, Uuid::new_v4()) {
                Err(JobDirectoryError::JobNotFound(_)) => {}
                other => panic!("expected job not found, got: {:?}", other),
            }
        });
    }

    // testing invalid command
    #[test]
    fn test_invalid_command() {
        setup();
        let directory = JobDirectory::new();
        let uid = identity();
        RUNTIME.block_on(async {
            match directory.add_job(uid, "abcdfg", &[]) {
                Err(JobDirectoryError::Spawn(_)) => {}
                other => panic!("expected spawn error, got: {:?}", other),
            }
            // nothing was registered
            assert!(directory.list_jobs(uid).unwrap_err().is_not_found());
        });
    }

    // testing listing of jobs
    #[test]
    fn test_list_jobs() {
        setup();
        let directory = JobDirectory::new();
        let uid = identity();
        RUNTIME.block_on(async {
            let first = directory.add_job(uid, "echo", &args(&["hi"])).unwrap();
            let second = directory.add_job(uid, "sleep", &args(&["5"])).unwrap();
            directory.add_job(identity(), "true", &[]).unwrap();

            let listed = directory.list_jobs(uid).unwrap();
            assert_eq!(2, listed.len());
            assert_eq!(first, listed[0].id);
            assert_eq!("echo", listed[0].command);
            assert_eq!(second, listed[1].id);
            assert_eq!(vec!["5".to_string()], listed[1].arguments);
            directory.stop_job(uid, second).await.unwrap();
        });
    }

    // testing that listing follows the order jobs were added in
    #[test]
    fn test_list_jobs_in_insertion_order() {
        setup();
        let directory = JobDirectory::new();
        let uid = identity();
        RUNTIME.block_on(async {
            let added: Vec<JobId> = (0..20)
                .map(|_| directory.add_job(uid, "true", &[]).unwrap())
                .collect();
            let listed: Vec<JobId> = directory
                .list_jobs(uid)
                .unwrap()
                .iter()
                .map(|status| status.id)
                .collect();
            assert_eq!(added, listed);
        });
    }

    // testing concurrent adds, queries and stops
    #[test]
    fn test_concurrent_access() {
        setup();
        let directory = Arc::new(JobDirectory::new());
        let identities = [identity(), identity()];
        RUNTIME.block_on(async {
            let mut handles = Vec::new();
            for i in 0..20 {
                let directory = Arc::clone(&directory);
                let uid = identities[i % 2];
                handles.push(tokio::spawn(async move {
                    directory.add_job(uid, "sleep", &args(&["5"])).unwrap()
                }));
            }
            let mut ids = HashSet::new();
            for handle in handles {
                ids.insert(handle.await.unwrap());
            }
            assert_eq!(20, ids.len());

            let uid = identities[0];
            let id = directory.list_jobs(uid).unwrap()[0].id;
            let mut handles = Vec::new();
            for i in 0..12 {
                let directory = Arc::clone(&directory);
                handles.push(tokio::spawn(async move {
                    match i % 3 {
                        0 => directory.stop_job(uid, id).await.unwrap(),
                        1 => {
                            directory.compute_status(uid, id).unwrap();
                        }
                        _ => {
                            directory.compute_log(uid, id).unwrap();
                        }
                    }
                }));
            }
            for handle in handles {
                handle.await.unwrap();
            }
            let status = directory.compute_status(uid, id).unwrap();
            assert_eq!(Status::Stopped, status.status);
            assert_eq!(Some(NO_EXIT_CODE), status.exit_code);

            for uid in identities.iter() {
                for status in directory.list_jobs(*uid).unwrap() {
                    directory.stop_job(*uid, status.id).await.unwrap();
                }
            }
        });
    }
}
