//! Component runtimes.
//!
//! A [`ComponentRuntime`] wraps exactly one long-running main process per
//! component, plus any strongly-owned child processes. Children live and die
//! with the main process: they are terminated before the main handle is
//! released, in either direction (commanded stop, or the main process exiting
//! on its own).
//!
//! State transitions:
//! ```text
//! UNINITIALIZED → CONFIGURED → RUNNING → STOPPING → STOPPED
//!                      ↓           ↓         ↓
//!                   ERRORED     ERRORED   ERRORED
//! ```

pub mod process;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Child;
use tokio_util::sync::CancellationToken;

use crate::conf::ConfObject;
use crate::manifest::EntryPoint;
use crate::types::{ComponentName, Error, Result, ServiceName};

/// Component lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentState {
    Uninitialized,
    Configured,
    Running,
    Stopping,
    Stopped,
    Errored,
}

impl ComponentState {
    /// Check if this is a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, ComponentState::Stopped | ComponentState::Errored)
    }

    /// Check if the component owns a live main process.
    pub fn is_active(self) -> bool {
        matches!(self, ComponentState::Running | ComponentState::Stopping)
    }

    /// Check if transition is valid.
    pub fn can_transition_to(self, to: ComponentState) -> bool {
        match (self, to) {
            (ComponentState::Uninitialized, ComponentState::Configured) => true,
            (ComponentState::Configured, ComponentState::Running) => true,
            (ComponentState::Configured, ComponentState::Errored) => true,
            (ComponentState::Running, ComponentState::Stopping) => true,
            // Main process exited on its own
            (ComponentState::Running, ComponentState::Stopped) => true,
            (ComponentState::Running, ComponentState::Errored) => true,
            (ComponentState::Stopping, ComponentState::Stopped) => true,
            (ComponentState::Stopping, ComponentState::Errored) => true,
            _ => false,
        }
    }
}

/// Who owns signal handling for this component's main process.
///
/// Chosen at construction time: a standalone runtime is the entry point of
/// its own OS process and traps termination signals itself; a supervised
/// runtime was started inside another process's supervisory context and must
/// never install handlers that could shadow the caller's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalMode {
    Standalone,
    Supervised,
}

/// Point-in-time view of a runtime, used for health aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentStatus {
    pub component: ComponentName,
    pub service: ServiceName,
    pub state: ComponentState,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    pub created_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<DateTime<Utc>>,

    pub children: usize,
}

/// Wraps one component's main process and its strongly-owned children.
#[derive(Debug)]
pub struct ComponentRuntime {
    component: ComponentName,
    service: ServiceName,
    entry: EntryPoint,
    signal_mode: SignalMode,
    stop_grace_period: Duration,

    state: ComponentState,
    confs: Vec<ConfObject>,
    conf_dir: Option<PathBuf>,

    main: Option<Child>,
    children: Vec<Child>,

    /// Stop requested before the runtime reached `Running`; applied as soon
    /// as it does (never silently dropped).
    stop_requested: bool,

    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    stopped_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl ComponentRuntime {
    pub fn new(
        component: ComponentName,
        service: ServiceName,
        entry: EntryPoint,
        signal_mode: SignalMode,
        stop_grace_period: Duration,
    ) -> Self {
        Self {
            component,
            service,
            entry,
            signal_mode,
            stop_grace_period,
            state: ComponentState::Uninitialized,
            confs: Vec::new(),
            conf_dir: None,
            main: None,
            children: Vec::new(),
            stop_requested: false,
            created_at: Utc::now(),
            started_at: None,
            stopped_at: None,
            last_error: None,
        }
    }

    pub fn component(&self) -> &ComponentName {
        &self.component
    }

    pub fn service(&self) -> &ServiceName {
        &self.service
    }

    pub fn state(&self) -> ComponentState {
        self.state
    }

    pub fn signal_mode(&self) -> SignalMode {
        self.signal_mode
    }

    /// Consume the runtime and take ownership of signal handling, e.g. after
    /// detaching it from an administrator to run as its own process entry
    /// point.
    pub fn into_standalone(mut self) -> Self {
        self.signal_mode = SignalMode::Standalone;
        self
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn children_count(&self) -> usize {
        self.children.len()
    }

    pub fn status(&self) -> ComponentStatus {
        ComponentStatus {
            component: self.component.clone(),
            service: self.service.clone(),
            state: self.state,
            last_error: self.last_error.clone(),
            created_at: self.created_at,
            started_at: self.started_at,
            stopped_at: self.stopped_at,
            children: self.children.len(),
        }
    }

    /// Attach a configuration object. Attachment order is precedence order:
    /// later objects win on key conflicts in [`ComponentRuntime::effective_conf`].
    pub fn attach_conf(&mut self, conf: ConfObject) {
        self.confs.push(conf);
    }

    pub fn confs(&self) -> &[ConfObject] {
        &self.confs
    }

    pub fn confs_mut(&mut self) -> &mut [ConfObject] {
        &mut self.confs
    }

    /// Directory the component's conf files live in, once configured.
    pub fn conf_dir(&self) -> Option<&PathBuf> {
        self.conf_dir.as_ref()
    }

    pub fn set_conf_dir(&mut self, dir: PathBuf) {
        self.conf_dir = Some(dir);
    }

    /// Merged view over all attached configurations, later attachments
    /// overriding earlier ones on key conflicts.
    pub fn effective_conf(&mut self) -> serde_json::Map<String, serde_json::Value> {
        let mut merged = serde_json::Map::new();
        for conf in &mut self.confs {
            for (k, v) in conf.dump(false) {
                merged.insert(k, v);
            }
        }
        merged
    }

    fn transition(&mut self, to: ComponentState) -> Result<()> {
        if !self.state.can_transition_to(to) {
            return Err(Error::state_transition(format!(
                "component {}: cannot transition {:?} -> {:?}",
                self.component, self.state, to
            )));
        }
        tracing::debug!(component = %self.component, from = ?self.state, to = ?to, "state transition");
        self.state = to;
        Ok(())
    }

    /// Record a configuration failure: reported, state stays `Uninitialized`.
    pub fn record_configure_failure(&mut self, err: &Error) {
        tracing::warn!(component = %self.component, error = %err, "configure failed");
        self.last_error = Some(err.to_string());
    }

    /// Configuration attached and loaded successfully.
    pub fn mark_configured(&mut self) -> Result<()> {
        self.transition(ComponentState::Configured)?;
        self.last_error = None;
        Ok(())
    }

    /// Launch the main process. Blocks only until spawn confirmation.
    ///
    /// On spawn failure the component is marked `Errored` with the failure
    /// recorded; a stop queued during the attempt is honored either way.
    pub async fn start(&mut self) -> Result<()> {
        if self.state != ComponentState::Configured {
            return Err(Error::state_transition(format!(
                "component {}: cannot start from {:?}",
                self.component, self.state
            )));
        }

        let mut envs = Vec::new();
        if let Some(dir) = &self.conf_dir {
            envs.push((
                "STEWARD_CONF_DIR".to_string(),
                dir.display().to_string(),
            ));
        }

        match process::spawn(&self.entry, &envs) {
            Ok(child) => {
                self.main = Some(child);
                self.transition(ComponentState::Running)?;
                self.started_at = Some(Utc::now());
                tracing::info!(component = %self.component, program = %self.entry.program, "component running");
                if self.stop_requested {
                    self.stop_requested = false;
                    self.stop().await?;
                }
                Ok(())
            }
            Err(err) => {
                self.transition(ComponentState::Errored)?;
                self.last_error = Some(err.to_string());
                self.stop_requested = false;
                tracing::warn!(component = %self.component, error = %err, "launch failed");
                Err(err)
            }
        }
    }

    /// Spawn a strongly-owned child process. Only valid while `Running`.
    pub fn spawn_child(&mut self, entry: &EntryPoint) -> Result<()> {
        if self.state != ComponentState::Running {
            return Err(Error::state_transition(format!(
                "component {}: cannot spawn child from {:?}",
                self.component, self.state
            )));
        }
        let child = process::spawn(entry, &[])?;
        self.children.push(child);
        Ok(())
    }

    /// Request a stop. If the runtime is not `Running` yet, the request is
    /// queued and applied once it is (or discarded when it reaches a
    /// terminal state instead). Idempotent on stopped components.
    pub async fn request_stop(&mut self) -> Result<()> {
        match self.state {
            ComponentState::Running => self.stop().await,
            ComponentState::Uninitialized | ComponentState::Configured => {
                self.stop_requested = true;
                Ok(())
            }
            ComponentState::Stopping | ComponentState::Stopped | ComponentState::Errored => Ok(()),
        }
    }

    /// Graceful stop: children first, then the main process (signal, bounded
    /// wait, forced kill).
    pub async fn stop(&mut self) -> Result<()> {
        self.stop_with(&CancellationToken::new()).await
    }

    /// Graceful stop with an escalation token: cancelling it skips any
    /// remaining grace period and kills immediately.
    pub async fn stop_with(&mut self, escalate: &CancellationToken) -> Result<()> {
        self.transition(ComponentState::Stopping)?;
        tracing::info!(component = %self.component, "stopping");

        let outcome = self.release_processes(escalate).await;
        match outcome {
            Ok(()) => {
                self.transition(ComponentState::Stopped)?;
                self.stopped_at = Some(Utc::now());
                tracing::info!(component = %self.component, "stopped");
                Ok(())
            }
            Err(err) => {
                self.state = ComponentState::Errored;
                self.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Terminate children, then the main process. Children are always
    /// cleaned up before the main handle is released.
    async fn release_processes(&mut self, escalate: &CancellationToken) -> Result<()> {
        for mut child in self.children.drain(..) {
            process::terminate(&mut child, self.stop_grace_period, escalate).await?;
        }
        if let Some(mut main) = self.main.take() {
            let outcome =
                process::terminate(&mut main, self.stop_grace_period, escalate).await?;
            if outcome == process::ExitOutcome::Forced {
                tracing::warn!(component = %self.component, "main process killed after grace period");
            }
        }
        Ok(())
    }

    /// Kill everything immediately, no grace. Used for second-signal
    /// escalation.
    pub async fn force_kill(&mut self) -> Result<()> {
        for mut child in self.children.drain(..) {
            process::kill_now(&mut child).await?;
        }
        if let Some(mut main) = self.main.take() {
            process::kill_now(&mut main).await?;
        }
        if self.state.is_active() {
            self.state = ComponentState::Stopped;
            self.stopped_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Observe process state without blocking.
    ///
    /// Reaps children that died on their own (logged, no state change; the
    /// policy for reacting is component-specific and lives elsewhere). If the
    /// main process exited by itself, kills remaining children and
    /// transitions to `Stopped`. Returns true when that transition happened.
    pub async fn poll_exit(&mut self) -> Result<bool> {
        if self.state != ComponentState::Running {
            return Ok(false);
        }

        // reap self-exited children
        let mut live = Vec::with_capacity(self.children.len());
        for mut child in self.children.drain(..) {
            match child.try_wait()? {
                Some(status) => {
                    tracing::warn!(component = %self.component, %status, "child process exited unexpectedly");
                }
                None => live.push(child),
            }
        }
        self.children = live;

        let exited = match self.main.as_mut() {
            Some(main) => main.try_wait()?,
            None => None,
        };
        if let Some(status) = exited {
            tracing::info!(component = %self.component, %status, "main process exited on its own");
            // children die with the main process
            for mut child in self.children.drain(..) {
                process::kill_now(&mut child).await?;
            }
            self.main = None;
            self.transition(ComponentState::Stopped)?;
            self.stopped_at = Some(Utc::now());
            return Ok(true);
        }
        Ok(false)
    }

    /// Run a standalone component until its main process exits or a
    /// termination signal arrives.
    ///
    /// Only valid in [`SignalMode::Standalone`]: the runtime is the entry
    /// point of its own OS process and owns signal handling. First
    /// SIGINT/SIGTERM drives the graceful stop; a second one during shutdown
    /// escalates to immediate forced termination.
    #[cfg(unix)]
    pub async fn run_standalone(&mut self) -> Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        if self.signal_mode != SignalMode::Standalone {
            return Err(Error::state_transition(format!(
                "component {}: supervised runtime does not own signal handling",
                self.component
            )));
        }

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        if self.state == ComponentState::Configured {
            self.start().await?;
        }

        loop {
            if self.state != ComponentState::Running {
                return Ok(());
            }
            let escalate = CancellationToken::new();
            tokio::select! {
                _ = sigint.recv() => {}
                _ = sigterm.recv() => {}
                exited = async {
                    loop {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        if let Some(main) = self.main.as_mut() {
                            if main.try_wait()?.is_some() {
                                return Ok::<bool, Error>(true);
                            }
                        } else {
                            return Ok(false);
                        }
                    }
                } => {
                    exited?;
                    self.poll_exit().await?;
                    return Ok(());
                }
            }

            // first signal: graceful stop; watch for a second one to escalate
            let watcher = escalate.clone();
            let escalation_guard = tokio::spawn(async move {
                let mut sigint = match signal(SignalKind::interrupt()) {
                    Ok(s) => s,
                    Err(_) => return,
                };
                let mut sigterm = match signal(SignalKind::terminate()) {
                    Ok(s) => s,
                    Err(_) => return,
                };
                tokio::select! {
                    _ = sigint.recv() => watcher.cancel(),
                    _ = sigterm.recv() => watcher.cancel(),
                }
            });
            let result = self.stop_with(&escalate).await;
            escalation_guard.abort();
            return result;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sleeper_runtime(grace: Duration) -> ComponentRuntime {
        ComponentRuntime::new(
            ComponentName::must("web"),
            ServiceName::must("hive"),
            EntryPoint::new("/bin/sleep", &["30"]),
            SignalMode::Supervised,
            grace,
        )
    }

    #[test]
    fn test_state_validation() {
        use ComponentState::*;
        assert!(Uninitialized.can_transition_to(Configured));
        assert!(Configured.can_transition_to(Running));
        assert!(Configured.can_transition_to(Errored));
        assert!(Running.can_transition_to(Stopping));
        assert!(Running.can_transition_to(Stopped));
        assert!(Stopping.can_transition_to(Stopped));
        assert!(Stopping.can_transition_to(Errored));

        assert!(!Uninitialized.can_transition_to(Running));
        assert!(!Stopped.can_transition_to(Running));
        assert!(!Errored.can_transition_to(Running));
        assert!(Stopped.is_terminal());
        assert!(Errored.is_terminal());
    }

    #[tokio::test]
    async fn test_start_stop_reaches_stopped_no_children() {
        let mut rt = sleeper_runtime(Duration::from_secs(5));
        rt.mark_configured().unwrap();
        rt.start().await.unwrap();
        assert_eq!(rt.state(), ComponentState::Running);

        rt.stop().await.unwrap();
        assert_eq!(rt.state(), ComponentState::Stopped);
        assert_eq!(rt.children_count(), 0);
    }

    #[tokio::test]
    async fn test_launch_failure_marks_errored() {
        let mut rt = ComponentRuntime::new(
            ComponentName::must("bad"),
            ServiceName::must("hive"),
            EntryPoint::new("/not/a/real/binary", &[]),
            SignalMode::Supervised,
            Duration::from_secs(1),
        );
        rt.mark_configured().unwrap();
        let err = rt.start().await.unwrap_err();
        assert!(matches!(err, Error::LaunchFailure(_)));
        assert_eq!(rt.state(), ComponentState::Errored);
        assert!(rt.last_error().is_some());
    }

    #[tokio::test]
    async fn test_children_killed_on_stop() {
        let mut rt = sleeper_runtime(Duration::from_secs(5));
        rt.mark_configured().unwrap();
        rt.start().await.unwrap();
        rt.spawn_child(&EntryPoint::new("/bin/sleep", &["30"])).unwrap();
        rt.spawn_child(&EntryPoint::new("/bin/sleep", &["30"])).unwrap();
        assert_eq!(rt.children_count(), 2);

        rt.stop().await.unwrap();
        assert_eq!(rt.state(), ComponentState::Stopped);
        assert_eq!(rt.children_count(), 0);
    }

    #[tokio::test]
    async fn test_queued_stop_applied_after_start() {
        let mut rt = sleeper_runtime(Duration::from_secs(5));
        rt.mark_configured().unwrap();

        // stop before start: queued, not dropped
        rt.request_stop().await.unwrap();
        assert_eq!(rt.state(), ComponentState::Configured);

        rt.start().await.unwrap();
        assert_eq!(rt.state(), ComponentState::Stopped);
    }

    #[tokio::test]
    async fn test_poll_exit_observes_self_exit_and_kills_children() {
        let mut rt = ComponentRuntime::new(
            ComponentName::must("short"),
            ServiceName::must("hive"),
            EntryPoint::new("/bin/sleep", &["0.1"]),
            SignalMode::Supervised,
            Duration::from_secs(1),
        );
        rt.mark_configured().unwrap();
        rt.start().await.unwrap();
        rt.spawn_child(&EntryPoint::new("/bin/sleep", &["30"])).unwrap();

        tokio::time::sleep(Duration::from_millis(400)).await;
        let transitioned = rt.poll_exit().await.unwrap();
        assert!(transitioned);
        assert_eq!(rt.state(), ComponentState::Stopped);
        assert_eq!(rt.children_count(), 0);
    }

    #[tokio::test]
    async fn test_stop_idempotent_and_spawn_child_guard() {
        let mut rt = sleeper_runtime(Duration::from_secs(5));
        rt.mark_configured().unwrap();
        rt.start().await.unwrap();
        rt.stop().await.unwrap();

        // stopping a stopped component is fine
        rt.request_stop().await.unwrap();
        assert_eq!(rt.state(), ComponentState::Stopped);

        // but children cannot be spawned anymore
        assert!(matches!(
            rt.spawn_child(&EntryPoint::new("/bin/sleep", &["1"])),
            Err(Error::StateTransition(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_standalone_rejected_when_supervised() {
        let mut rt = sleeper_runtime(Duration::from_secs(1));
        rt.mark_configured().unwrap();
        let err = rt.run_standalone().await.unwrap_err();
        assert!(matches!(err, Error::StateTransition(_)));
    }

    #[tokio::test]
    async fn test_effective_conf_component_wins() {
        use crate::conf::{ConfValue, OwnerKind, ValueKind};

        let mut rt = sleeper_runtime(Duration::from_secs(1));

        let mut service_conf = ConfObject::new(OwnerKind::Service, "hive");
        service_conf.declare("threads", ValueKind::Int, Some(ConfValue::Int(4))).unwrap();
        service_conf.declare("host", ValueKind::Str, None).unwrap();
        service_conf.set("host", ConfValue::from("svc-host")).unwrap();

        let mut component_conf = ConfObject::new(OwnerKind::Component, "web");
        component_conf.declare("host", ValueKind::Str, None).unwrap();
        component_conf.set("host", ConfValue::from("comp-host")).unwrap();

        rt.attach_conf(service_conf);
        rt.attach_conf(component_conf);

        let merged = rt.effective_conf();
        assert_eq!(merged.get("host"), Some(&serde_json::Value::from("comp-host")));
        assert_eq!(merged.get("threads"), Some(&serde_json::Value::from(4)));
    }
}
