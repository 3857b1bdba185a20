//! OS process helpers.
//!
//! Thin wrappers around `tokio::process` implementing the terminate → wait →
//! kill escalation. Spawned processes carry `kill_on_drop` so a crashed
//! supervisor cannot leak them.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use crate::manifest::EntryPoint;
use crate::types::{Error, Result};

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Exited within the grace period after the termination signal.
    Graceful,
    /// Had to be killed after the grace period elapsed (or escalation fired).
    Forced,
}

/// Spawn an entry point. `envs` are extra environment variables (e.g. the
/// conf directory handed to the component).
pub fn spawn(entry: &EntryPoint, envs: &[(String, String)]) -> Result<Child> {
    let mut cmd = Command::new(&entry.program);
    cmd.args(&entry.args)
        .stdin(Stdio::null())
        .kill_on_drop(true);
    for (key, value) in envs {
        cmd.env(key, value);
    }
    cmd.spawn().map_err(|e| {
        Error::launch_failure(format!("cannot spawn {}: {}", entry.program, e))
    })
}

/// Deliver the graceful-termination signal.
///
/// On unix this is SIGTERM; elsewhere there is no graceful phase and the
/// process is killed outright (same caveat the platform imposes on any
/// supervisor).
#[cfg(unix)]
pub fn send_term(child: &mut Child) -> Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return Ok(()); // already reaped
    };
    match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
        Err(e) => Err(Error::Io(std::io::Error::other(e))),
    }
}

#[cfg(not(unix))]
pub fn send_term(child: &mut Child) -> Result<()> {
    child.start_kill()?;
    Ok(())
}

/// Kill immediately and reap.
pub async fn kill_now(child: &mut Child) -> Result<ExitStatus> {
    if child.try_wait()?.is_none() {
        child.start_kill()?;
    }
    Ok(child.wait().await?)
}

/// Graceful stop: termination signal, bounded wait, then forced kill.
///
/// Cancelling `escalate` while waiting skips the rest of the grace period
/// and kills immediately.
pub async fn terminate(
    child: &mut Child,
    grace: Duration,
    escalate: &CancellationToken,
) -> Result<ExitOutcome> {
    if child.try_wait()?.is_some() {
        return Ok(ExitOutcome::Graceful); // already exited
    }
    send_term(child)?;

    if escalate.is_cancelled() {
        kill_now(child).await?;
        return Ok(ExitOutcome::Forced);
    }

    tokio::select! {
        waited = tokio::time::timeout(grace, child.wait()) => match waited {
            Ok(status) => {
                status?;
                Ok(ExitOutcome::Graceful)
            }
            Err(_elapsed) => {
                kill_now(child).await?;
                Ok(ExitOutcome::Forced)
            }
        },
        _ = escalate.cancelled() => {
            kill_now(child).await?;
            Ok(ExitOutcome::Forced)
        }
    }
}
