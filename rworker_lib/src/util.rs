use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, SystemTime},
};

use nix::{
    errno::Errno,
    sys::signal::{killpg, Signal},
    unistd::Pid,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Child,
    sync::{oneshot, watch},
    task::JoinHandle,
    time,
};
use tracing::{error, info, warn};

use crate::{
    error::ProcessError,
    status::{ProcessStatus, NO_EXIT_CODE},
};

/// how long output may keep flowing once the process group was killed
const DRAIN_AFTER_KILL: Duration = Duration::from_millis(500);

#[derive(Clone, Copy, Debug)]
enum Output {
    Stdout,
    Stderr,
}

/// locks the shared status, a panicked holder can't leave it half-updated
pub(crate) fn lock(status: &Mutex<ProcessStatus>) -> MutexGuard<'_, ProcessStatus> {
    status.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) async fn manage_process(
    mut process: Child,
    status: Arc<Mutex<ProcessStatus>>,
    mut kill_signal: oneshot::Receiver<()>,
    finished: watch::Sender<bool>,
) {
    // the child leads its own process group, so the pid doubles as the group id
    let pid = process.id();
    let stdout_handle = process
        .stdout
        .take()
        .map(|stdout| tokio::spawn(capture_lines(stdout, Arc::clone(&status), Output::Stdout)));
    let stderr_handle = process
        .stderr
        .take()
        .map(|stderr| tokio::spawn(capture_lines(stderr, Arc::clone(&status), Output::Stderr)));
    let mut readers = [stdout_handle, stderr_handle];

    // wait for either process to finish or receival of kill signal
    // a dropped handle counts as a kill signal
    let mut killed = false;
    let exit_result = tokio::select! {
        exit_result = process.wait() => exit_result,
        _ = &mut kill_signal => {
            killed = true;
            if !kill_process_group(pid) {
                if let Err(kill_error) = process.start_kill() {
                    warn!("unexpected error when killing process, pid: {:?}, err: {}", pid, kill_error);
                }
            }
            process.wait().await
        }
    };

    // descendants may still hold the pipes after the leader exited
    let mut drained = false;
    if !killed {
        let drain = join_readers(pid, &mut readers);
        tokio::pin!(drain);
        tokio::select! {
            _ = &mut drain => drained = true,
            _ = &mut kill_signal => {
                kill_process_group(pid);
            }
        }
    }
    if !drained {
        drain_after_kill(pid, &mut readers).await;
    }

    let mut status = lock(&status);
    match exit_result {
        Ok(exit_status) => {
            info!("process {:?} exited: {}", pid, exit_status);
            status.exit_code = exit_status.code().unwrap_or(NO_EXIT_CODE);
            status.terminated_by_request = killed && exit_status.code().is_none();
        }
        Err(io_error) => {
            error!("unexpected io error when waiting for process {:?}: {}", pid, io_error);
            status.error = Some(ProcessError {
                msg: format!("unexpected io error when waiting for process: {}", io_error),
            });
        }
    }
    status.stopped_at = Some(SystemTime::now());
    drop(status);
    finished.send_replace(true);
}

/// sends SIGKILL to the whole process group, returns false if that was not possible
fn kill_process_group(pid: Option<u32>) -> bool {
    let pid = match pid {
        Some(pid) => pid,
        None => return false,
    };
    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => true,
        Err(errno) => {
            warn!("could not kill process group {}: {}", pid, errno);
            false
        }
    }
}

/// descendants that left the process group survive the kill and may keep the
/// pipes open, their output is given up on after `DRAIN_AFTER_KILL`
async fn drain_after_kill(pid: Option<u32>, readers: &mut [Option<JoinHandle<()>>]) {
    if time::timeout(DRAIN_AFTER_KILL, join_readers(pid, readers))
        .await
        .is_err()
    {
        warn!("output of process {:?} still open after kill, abandoning it", pid);
        for handle in readers.iter().flatten() {
            handle.abort();
        }
    }
}

/// joined readers are cleared, so an interrupted join can be resumed
async fn join_readers(pid: Option<u32>, readers: &mut [Option<JoinHandle<()>>]) {
    for reader in readers.iter_mut() {
        let result = match reader {
            Some(handle) => handle.await,
            None => continue,
        };
        *reader = None;
        if let Err(join_error) = result {
            warn!("unexpected error when joining output reader, pid: {:?}, err: {}", pid, join_error);
        }
    }
}

/// reads the stream line by line into the shared status until EOF
async fn capture_lines<A: AsyncRead + Unpin>(
    stream: A,
    status: Arc<Mutex<ProcessStatus>>,
    output: Output,
) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                    if buf.last() == Some(&b'\r') {
                        buf.pop();
                    }
                }
                let line = String::from_utf8_lossy(&buf).into_owned();
                let mut status = lock(&status);
                match output {
                    Output::Stdout => status.stdout.push(line),
                    Output::Stderr => status.stderr.push(line),
                }
            }
            Err(io_error) => {
                warn!("unexpected io error when reading from {:?}: {}", output, io_error);
                break;
            }
        }
    }
}
