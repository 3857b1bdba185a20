//! Administrator command loop.
//!
//! One task owns the [`Administrator`] and processes commands serially, which
//! gives the pool its ordering guarantee: lifecycle commands on a given
//! component never run concurrently, and a stop submitted right after a start
//! is applied once the start has completed - queued, never dropped.
//!
//! The loop also owns signal-driven shutdown: the first SIGINT/SIGTERM stops
//! the whole pool gracefully, a second one during shutdown escalates to
//! immediate forced termination.

use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::admin::Administrator;
use crate::runtime::{ComponentState, ComponentStatus};
use crate::types::{ComponentName, Error, Result};

/// Commands external callers may submit. They never mutate pool state
/// directly.
#[derive(Debug)]
pub enum AdminCommand {
    Configure {
        name: ComponentName,
        reply: oneshot::Sender<Result<()>>,
    },
    Build {
        name: ComponentName,
        reply: oneshot::Sender<Result<PathBuf>>,
    },
    Start {
        name: ComponentName,
        reply: oneshot::Sender<Result<()>>,
    },
    Stop {
        name: ComponentName,
        reply: oneshot::Sender<Result<()>>,
    },
    StartAll {
        reply: oneshot::Sender<Vec<ComponentName>>,
    },
    StopAll {
        reply: oneshot::Sender<Vec<ComponentName>>,
    },
    Status {
        name: ComponentName,
        reply: oneshot::Sender<Result<ComponentStatus>>,
    },
    StatusAll {
        reply: oneshot::Sender<BTreeMap<ComponentName, ComponentState>>,
    },
    /// Stop everything and end the loop.
    Shutdown,
}

/// Cloneable handle submitting commands to the administrator task.
#[derive(Debug, Clone)]
pub struct AdminHandle {
    tx: mpsc::Sender<AdminCommand>,
}

impl AdminHandle {
    async fn send(&self, cmd: AdminCommand) -> Result<()> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| Error::internal("administrator loop is gone"))
    }

    pub async fn configure(&self, name: ComponentName) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(AdminCommand::Configure { name, reply }).await?;
        self.recv(rx).await?
    }

    pub async fn build(&self, name: ComponentName) -> Result<PathBuf> {
        let (reply, rx) = oneshot::channel();
        self.send(AdminCommand::Build { name, reply }).await?;
        self.recv(rx).await?
    }

    pub async fn start(&self, name: ComponentName) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(AdminCommand::Start { name, reply }).await?;
        self.recv(rx).await?
    }

    pub async fn stop(&self, name: ComponentName) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(AdminCommand::Stop { name, reply }).await?;
        self.recv(rx).await?
    }

    pub async fn start_all(&self) -> Result<Vec<ComponentName>> {
        let (reply, rx) = oneshot::channel();
        self.send(AdminCommand::StartAll { reply }).await?;
        self.recv(rx).await
    }

    pub async fn stop_all(&self) -> Result<Vec<ComponentName>> {
        let (reply, rx) = oneshot::channel();
        self.send(AdminCommand::StopAll { reply }).await?;
        self.recv(rx).await
    }

    pub async fn status(&self, name: ComponentName) -> Result<ComponentStatus> {
        let (reply, rx) = oneshot::channel();
        self.send(AdminCommand::Status { name, reply }).await?;
        self.recv(rx).await?
    }

    pub async fn status_all(&self) -> Result<BTreeMap<ComponentName, ComponentState>> {
        let (reply, rx) = oneshot::channel();
        self.send(AdminCommand::StatusAll { reply }).await?;
        self.recv(rx).await
    }

    /// Stop the whole pool and end the administrator task.
    pub async fn shutdown(&self) -> Result<()> {
        self.send(AdminCommand::Shutdown).await
    }

    async fn recv<T>(&self, rx: oneshot::Receiver<T>) -> Result<T> {
        rx.await
            .map_err(|_| Error::internal("administrator loop is gone"))
    }
}

/// Spawn the administrator task. Returns the command handle, a cancellation
/// token ending the loop without stopping components, and the join handle
/// yielding the administrator back.
pub fn spawn_admin(
    admin: Administrator,
) -> (
    AdminHandle,
    CancellationToken,
    tokio::task::JoinHandle<Administrator>,
) {
    let capacity = admin.config().command_channel_capacity;
    let (tx, rx) = mpsc::channel(capacity);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run_loop(admin, rx, cancel.clone()));
    (AdminHandle { tx }, cancel, task)
}

/// The single-threaded control loop: issues lifecycle commands, polls/reaps
/// process state and routes lifecycle signals.
pub async fn run_loop(
    mut admin: Administrator,
    mut rx: mpsc::Receiver<AdminCommand>,
    cancel: CancellationToken,
) -> Administrator {
    let mut reap = tokio::time::interval(admin.config().reap_interval);
    reap.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    #[cfg(unix)]
    let mut signals = SignalStreams::install();

    loop {
        #[cfg(unix)]
        let signalled = signals.recv();
        #[cfg(not(unix))]
        let signalled = std::future::pending::<()>();

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("administrator loop cancelled");
                break;
            }
            _ = reap.tick() => {
                admin.poll().await;
            }
            maybe = rx.recv() => match maybe {
                None | Some(AdminCommand::Shutdown) => {
                    tracing::info!("administrator shutting down");
                    admin.stop_all().await;
                    break;
                }
                Some(cmd) => handle_command(&mut admin, cmd).await,
            },
            _ = signalled => {
                tracing::info!("termination signal received, stopping all components");
                let escalate = CancellationToken::new();
                let guard = spawn_escalation_guard(escalate.clone());
                admin.stop_all_with(&escalate).await;
                if escalate.is_cancelled() {
                    admin.kill_all().await;
                }
                guard.abort();
                break;
            }
        }
    }
    admin
}

async fn handle_command(admin: &mut Administrator, cmd: AdminCommand) {
    match cmd {
        AdminCommand::Configure { name, reply } => {
            let _ = reply.send(admin.configure(&name));
        }
        AdminCommand::Build { name, reply } => {
            let _ = reply.send(admin.build(&name));
        }
        AdminCommand::Start { name, reply } => {
            let _ = reply.send(admin.start(&name).await);
        }
        AdminCommand::Stop { name, reply } => {
            let _ = reply.send(admin.stop(&name).await);
        }
        AdminCommand::StartAll { reply } => {
            let _ = reply.send(admin.start_all().await);
        }
        AdminCommand::StopAll { reply } => {
            let _ = reply.send(admin.stop_all().await);
        }
        AdminCommand::Status { name, reply } => {
            let _ = reply.send(admin.status(&name));
        }
        AdminCommand::StatusAll { reply } => {
            let _ = reply.send(admin.status_all());
        }
        AdminCommand::Shutdown => unreachable!("handled in run_loop"),
    }
}

/// Watches for a second termination signal while shutdown is in progress and
/// cancels the escalation token, turning remaining graceful stops into
/// immediate kills.
#[cfg(unix)]
fn spawn_escalation_guard(escalate: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let Ok(mut streams) = SignalStreams::try_install() else {
            return;
        };
        streams.recv().await;
        tracing::warn!("second termination signal, escalating to forced kill");
        escalate.cancel();
    })
}

#[cfg(not(unix))]
fn spawn_escalation_guard(_escalate: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async {})
}

#[cfg(unix)]
struct SignalStreams {
    sigint: Option<tokio::signal::unix::Signal>,
    sigterm: Option<tokio::signal::unix::Signal>,
}

#[cfg(unix)]
impl SignalStreams {
    fn install() -> Self {
        match Self::try_install() {
            Ok(streams) => streams,
            Err(err) => {
                tracing::warn!(error = %err, "signal handlers unavailable");
                Self {
                    sigint: None,
                    sigterm: None,
                }
            }
        }
    }

    fn try_install() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            sigint: Some(signal(SignalKind::interrupt())?),
            sigterm: Some(signal(SignalKind::terminate())?),
        })
    }

    async fn recv(&mut self) {
        match (&mut self.sigint, &mut self.sigterm) {
            (Some(sigint), Some(sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => {}
                    _ = sigterm.recv() => {}
                }
            }
            _ => std::future::pending().await,
        }
    }
}
