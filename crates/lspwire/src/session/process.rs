//! Child process management for spawned language servers.

use std::io::{self, BufRead, BufReader};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use lspwire_config::LaunchSpec;
use tracing::{debug, warn};

use super::SESSION_TARGET;
use crate::errors::SessionError;

/// Log target for lines the server writes to its stderr.
pub(crate) const PEER_STDERR_TARGET: &str = "lspwire::peer_stderr";

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// A freshly spawned server with its pipes detached from the handle.
pub(crate) struct SpawnedServer {
    pub(crate) child: Child,
    pub(crate) stdin: ChildStdin,
    pub(crate) stdout: ChildStdout,
    pub(crate) stderr: Option<ChildStderr>,
}

/// How the child left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ExitOutcome {
    pub(crate) status: Option<ExitStatus>,
    pub(crate) forced: bool,
}

fn missing_pipe(name: &str) -> SessionError {
    SessionError::SpawnFailed {
        message: format!("failed to capture {name}"),
        source: Arc::new(io::Error::other(format!("no {name}"))),
    }
}

/// Spawns the server described by `launch` with all three stdio streams piped.
pub(crate) fn spawn(launch: &LaunchSpec) -> Result<SpawnedServer, SessionError> {
    debug!(
        target: SESSION_TARGET,
        command = %launch.command.display(),
        args = ?launch.args,
        "spawning language server process"
    );

    let mut command = Command::new(&launch.command);
    command
        .args(&launch.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    if let Some(dir) = &launch.working_dir {
        command.current_dir(dir);
    }

    let mut child = command.spawn().map_err(|error| {
        if error.kind() == io::ErrorKind::NotFound {
            SessionError::BinaryNotFound {
                command: launch.display_command(),
                source: Arc::new(error),
            }
        } else {
            SessionError::SpawnFailed {
                message: format!("failed to start {}", launch.command.display()),
                source: Arc::new(error),
            }
        }
    })?;

    let pipes = child
        .stdin
        .take()
        .ok_or_else(|| missing_pipe("stdin"))
        .and_then(|stdin| {
            child
                .stdout
                .take()
                .map(|stdout| (stdin, stdout))
                .ok_or_else(|| missing_pipe("stdout"))
        });
    let (stdin, stdout) = match pipes {
        Ok(pipes) => pipes,
        Err(error) => {
            kill_and_reap(&mut child);
            return Err(error);
        }
    };
    let stderr = child.stderr.take();

    debug!(
        target: SESSION_TARGET,
        pid = child.id(),
        "language server process spawned"
    );

    Ok(SpawnedServer {
        child,
        stdin,
        stdout,
        stderr,
    })
}

/// Forwards every stderr line to the log until the pipe closes.
pub(crate) fn drain_stderr(
    stderr: ChildStderr,
    server: String,
) -> Result<JoinHandle<()>, SessionError> {
    thread::Builder::new()
        .name(String::from("lspwire-stderr"))
        .spawn(move || {
            for line in BufReader::new(stderr).lines() {
                match line {
                    Ok(line) => debug!(target: PEER_STDERR_TARGET, server = %server, "{line}"),
                    Err(error) => {
                        debug!(target: PEER_STDERR_TARGET, server = %server, error = %error, "stopped reading stderr");
                        break;
                    }
                }
            }
        })
        .map_err(|source| SessionError::SpawnFailed {
            message: String::from("failed to start stderr reader"),
            source: Arc::new(source),
        })
}

/// Instant `timeout` from now, saturating far in the future for timeouts
/// that do not fit in an [`Instant`].
pub(crate) fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Polls the child until it exits or `deadline` passes, then kills it.
pub(crate) fn wait_for_exit(child: &mut Child, deadline: Instant) -> ExitOutcome {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!(target: SESSION_TARGET, ?status, "language server exited");
                return ExitOutcome {
                    status: Some(status),
                    forced: false,
                };
            }
            Ok(None) if Instant::now() < deadline => thread::sleep(POLL_INTERVAL),
            Ok(None) => {
                warn!(
                    target: SESSION_TARGET,
                    pid = child.id(),
                    "language server did not exit before the deadline, killing it"
                );
                return ExitOutcome {
                    status: kill_and_reap(child),
                    forced: true,
                };
            }
            Err(error) => {
                warn!(
                    target: SESSION_TARGET,
                    error = %error,
                    "failed to check process status, killing it"
                );
                return ExitOutcome {
                    status: kill_and_reap(child),
                    forced: true,
                };
            }
        }
    }
}

/// Kills the child and collects its status.
pub(crate) fn kill_and_reap(child: &mut Child) -> Option<ExitStatus> {
    if let Err(error) = child.kill() {
        // Already exited processes report an error here; reaping still works.
        debug!(target: SESSION_TARGET, error = %error, "kill failed");
    }
    match child.wait() {
        Ok(status) => Some(status),
        Err(error) => {
            warn!(target: SESSION_TARGET, error = %error, "failed to reap language server");
            None
        }
    }
}

/// Waits for a helper thread until `deadline`, detaching it if it is still
/// running.
pub(crate) fn join_until<T>(handle: JoinHandle<T>, deadline: Instant, name: &str) -> Option<T> {
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!(target: SESSION_TARGET, thread = name, "detaching thread still running at deadline");
            return None;
        }
        thread::sleep(Duration::from_millis(10));
    }
    match handle.join() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(target: SESSION_TARGET, thread = name, "thread panicked");
            None
        }
    }
}
