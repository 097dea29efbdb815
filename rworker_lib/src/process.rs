use std::{
    io,
    process::Stdio,
    sync::{Arc, Mutex, PoisonError},
    time::SystemTime,
};

use tokio::{
    process::Command,
    sync::{oneshot, watch},
};
use tracing::info;

use crate::{
    status::ProcessStatus,
    util::{lock, manage_process},
};

/// Handle to one spawned OS process.
///
/// Output and exit information are captured by a background task; the handle
/// only reads snapshots of it, so every method may be called concurrently.
/// Dropping the handle kills the process group if it is still running.
pub struct Process {
    command: String,
    arguments: Vec<String>,
    status: Arc<Mutex<ProcessStatus>>,
    kill_tx: Mutex<Option<oneshot::Sender<()>>>,
    finished_rx: watch::Receiver<bool>,
}

impl Process {
    /// spawns the process in its own process group with piped stdout/stderr
    /// must be called from within a tokio runtime
    pub fn start(command: &str, arguments: &[String]) -> io::Result<Self> {
        let process = Command::new(command)
            .args(arguments)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()?;
        info!("process spawned, pid: {:?}", process.id());

        let status = Arc::new(Mutex::new(ProcessStatus {
            started_at: Some(SystemTime::now()),
            ..Default::default()
        }));
        let (kill_tx, kill_rx) = oneshot::channel();
        let (finished_tx, finished_rx) = watch::channel(false);
        tokio::spawn(manage_process(
            process,
            Arc::clone(&status),
            kill_rx,
            finished_tx,
        ));

        Ok(Self {
            command: command.to_string(),
            arguments: arguments.to_vec(),
            status,
            kill_tx: Mutex::new(Some(kill_tx)),
            finished_rx,
        })
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// snapshot of everything captured so far, never waits on the process
    pub fn status(&self) -> ProcessStatus {
        lock(&self.status).clone()
    }

    /// Kills the process group and waits until the process has been reaped.
    ///
    /// Only the first call sends the kill signal. Later and concurrent calls
    /// just wait, and a process that already exited is left as it is.
    pub async fn stop(&self) {
        let kill_tx = self
            .kill_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(kill_tx) = kill_tx {
            if kill_tx.send(()).is_err() {
                info!("kill signal channel receiver dropped, process already exited");
            }
        }
        self.wait().await;
    }

    /// waits until the process exited and all its output was captured
    pub async fn wait(&self) {
        let mut finished_rx = self.finished_rx.clone();
        // the sender only goes away after marking the process finished
        let _ = finished_rx.wait_for(|finished| *finished).await;
    }
}
