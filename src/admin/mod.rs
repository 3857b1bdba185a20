//! Administrator - component-pool lifecycle management.
//!
//! The administrator owns every [`ComponentRuntime`] in its pool, across
//! possibly many services. It sequences configuration attachment, lifecycle
//! transitions and shutdown propagation; it never interprets component
//! business logic. All mutation goes through `&mut self` - external callers
//! submit commands via [`commands::AdminHandle`] instead of touching pool
//! state directly.

pub mod commands;

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::conf::{ConfObject, StandardLayout};
use crate::manifest::{ComponentDescriptor, Manifest, ServiceDecl};
use crate::runtime::{ComponentRuntime, ComponentState, ComponentStatus, SignalMode};
use crate::settings::{propagate, Settings, SettingsLoader, SettingsProvider};
use crate::types::{AdminConfig, ComponentName, Error, Result, ServiceName};

/// Manages a pool of component runtimes spanning multiple services.
#[derive(Debug)]
pub struct Administrator {
    config: AdminConfig,
    loader: SettingsLoader,
    settings: Option<Settings>,
    services: HashMap<ServiceName, ServiceDecl>,
    descriptors: HashMap<ComponentName, ComponentDescriptor>,
    pool: HashMap<ComponentName, ComponentRuntime>,
    registration_order: Vec<ComponentName>,
    started_order: Vec<ComponentName>,
}

impl Administrator {
    pub fn new(config: AdminConfig) -> Self {
        Self {
            config,
            loader: SettingsLoader::new(),
            settings: None,
            services: HashMap::new(),
            descriptors: HashMap::new(),
            pool: HashMap::new(),
            registration_order: Vec::new(),
            started_order: Vec::new(),
        }
    }

    /// Build an administrator with every descriptor of a manifest registered.
    pub fn from_manifest(config: AdminConfig, manifest: Manifest) -> Result<Self> {
        manifest.validate()?;
        let mut admin = Self::new(config);
        for service in manifest.services {
            admin.declare_service(service);
        }
        for descriptor in manifest.components {
            admin.register(descriptor)?;
        }
        Ok(admin)
    }

    pub fn config(&self) -> &AdminConfig {
        &self.config
    }

    /// Load the installation settings bundle. Reads the source exactly once
    /// per administrator lifetime; settings errors are fatal for startup and
    /// no component can be configured without them.
    pub async fn awaken(&mut self, provider: &dyn SettingsProvider) -> Result<()> {
        let settings = self.loader.load(provider).await?.clone();
        self.settings = Some(settings);
        Ok(())
    }

    pub fn settings(&self) -> Option<&Settings> {
        self.settings.as_ref()
    }

    /// Declare a service's shared configuration keys.
    pub fn declare_service(&mut self, decl: ServiceDecl) {
        self.services.insert(decl.name.clone(), decl);
    }

    /// Create and track a runtime for the descriptor, in `Uninitialized`.
    ///
    /// Component names are globally unique within the pool, even across
    /// services; a duplicate fails with `NameCollision` and leaves the pool
    /// unchanged.
    pub fn register(&mut self, descriptor: ComponentDescriptor) -> Result<()> {
        let name = descriptor.component.clone();
        if self.pool.contains_key(&name) {
            return Err(Error::name_collision(format!(
                "component {} already registered",
                name
            )));
        }
        let runtime = ComponentRuntime::new(
            name.clone(),
            descriptor.service.clone(),
            descriptor.entry.clone(),
            SignalMode::Supervised,
            self.config.stop_grace_period,
        );
        self.descriptors.insert(name.clone(), descriptor);
        self.pool.insert(name.clone(), runtime);
        self.registration_order.push(name.clone());
        tracing::info!(component = %name, "component registered");
        Ok(())
    }

    /// Attach and load the component's configuration objects, driving
    /// `Uninitialized -> Configured`.
    ///
    /// Service-level and component-level configuration are both applied;
    /// component-level values take precedence on key conflicts. A failure is
    /// recorded on the component and the state stays `Uninitialized`.
    pub fn configure(&mut self, name: &ComponentName) -> Result<()> {
        let settings = self
            .settings
            .clone()
            .ok_or_else(|| Error::settings_unavailable("settings must be loaded before configure"))?;
        let descriptor = self
            .descriptors
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("component {}", name)))?;
        let service_decl = self.services.get(&descriptor.service).cloned();
        let runtime = self
            .pool
            .get_mut(name)
            .ok_or_else(|| Error::not_found(format!("component {}", name)))?;

        if runtime.state() != ComponentState::Uninitialized {
            return Err(Error::state_transition(format!(
                "component {}: cannot configure from {:?}",
                name,
                runtime.state()
            )));
        }

        match Self::configure_runtime(&settings, service_decl.as_ref(), &descriptor, runtime) {
            Ok(()) => runtime.mark_configured(),
            Err(err) => {
                runtime.record_configure_failure(&err);
                Err(err)
            }
        }
    }

    fn configure_runtime(
        settings: &Settings,
        service_decl: Option<&ServiceDecl>,
        descriptor: &ComponentDescriptor,
        runtime: &mut ComponentRuntime,
    ) -> Result<()> {
        let layout = StandardLayout::new(&settings.app_data_dir);
        let conf_dir = layout.conf_dir(&descriptor.service, &descriptor.component);
        runtime.set_conf_dir(conf_dir.clone());

        if descriptor.neutral {
            // importable with no configuration at all
            return Ok(());
        }

        // service-level first, component-level last: attachment order is
        // precedence order
        let mut confs: Vec<ConfObject> = Vec::new();
        if let Some(decl) = service_decl {
            if !decl.conf_keys.is_empty() {
                confs.push(decl.service_conf()?);
            }
        }
        if !descriptor.conf_keys.is_empty() {
            confs.push(descriptor.component_conf()?);
        }

        for conf in &mut confs {
            layout.standard_configure(conf, &descriptor.service, &descriptor.component);
            let file = conf_dir.join(conf.file_name());
            if file.is_file() {
                conf.load_file(&file)?;
            }
            propagate(settings, &mut [conf])?;
        }

        for conf in confs {
            runtime.attach_conf(conf);
        }
        Ok(())
    }

    /// Materialize the install tree for one configured component and write
    /// its conf files plus its descriptor. Returns the conf directory.
    pub fn build(&mut self, name: &ComponentName) -> Result<PathBuf> {
        let settings = self
            .settings
            .clone()
            .ok_or_else(|| Error::settings_unavailable("settings must be loaded before build"))?;
        let descriptor = self
            .descriptors
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("component {}", name)))?;
        let runtime = self
            .pool
            .get_mut(name)
            .ok_or_else(|| Error::not_found(format!("component {}", name)))?;

        let layout = StandardLayout::new(&settings.app_data_dir);
        let mut refs: Vec<&mut ConfObject> = runtime.confs_mut().iter_mut().collect();
        let conf_dir = layout.build(&mut refs, &descriptor.service, &descriptor.component)?;

        let info = serde_json::to_string_pretty(&descriptor)?;
        std::fs::write(conf_dir.join("component.json"), info)?;
        Ok(conf_dir)
    }

    /// Drive `Configured -> Running` for one component.
    pub async fn start(&mut self, name: &ComponentName) -> Result<()> {
        let runtime = self
            .pool
            .get_mut(name)
            .ok_or_else(|| Error::not_found(format!("component {}", name)))?;
        runtime.start().await?;
        if runtime.state() == ComponentState::Running && !self.started_order.contains(name) {
            self.started_order.push(name.clone());
        }
        Ok(())
    }

    /// Request a stop for one component. A stop requested while the
    /// component has not reached `Running` is queued by the runtime, never
    /// dropped.
    pub async fn stop(&mut self, name: &ComponentName) -> Result<()> {
        let runtime = self
            .pool
            .get_mut(name)
            .ok_or_else(|| Error::not_found(format!("component {}", name)))?;
        runtime.request_stop().await?;
        self.started_order.retain(|n| n != name);
        Ok(())
    }

    /// Start every configured component, in registration order. A
    /// `LaunchFailure` is recorded against its component and surfaced via
    /// `status`; it does not abort the rest. Returns the successfully
    /// started components in start order.
    pub async fn start_all(&mut self) -> Vec<ComponentName> {
        let mut started = Vec::new();
        for name in self.registration_order.clone() {
            let state = match self.pool.get(&name) {
                Some(rt) => rt.state(),
                None => continue,
            };
            if state != ComponentState::Configured {
                continue;
            }
            match self.start(&name).await {
                Ok(()) => started.push(name),
                Err(err) => {
                    tracing::warn!(component = %name, error = %err, "start_all: component failed to start");
                }
            }
        }
        started
    }

    /// Stop every started component, last started first. Returns the
    /// components stopped, in stop order.
    pub async fn stop_all(&mut self) -> Vec<ComponentName> {
        self.stop_all_with(&CancellationToken::new()).await
    }

    /// `stop_all` with an escalation token: cancelling it makes remaining
    /// terminations immediate.
    pub async fn stop_all_with(&mut self, escalate: &CancellationToken) -> Vec<ComponentName> {
        let mut stopped = Vec::new();
        for name in self.started_order.clone().into_iter().rev() {
            let Some(runtime) = self.pool.get_mut(&name) else {
                continue;
            };
            if runtime.state() != ComponentState::Running {
                continue;
            }
            match runtime.stop_with(escalate).await {
                Ok(()) => stopped.push(name),
                Err(err) => {
                    tracing::warn!(component = %name, error = %err, "stop_all: component failed to stop");
                }
            }
        }
        self.started_order.clear();
        stopped
    }

    /// Kill every owned process immediately. Second-signal escalation path.
    pub async fn kill_all(&mut self) {
        for runtime in self.pool.values_mut() {
            if let Err(err) = runtime.force_kill().await {
                tracing::warn!(component = %runtime.component(), error = %err, "force kill failed");
            }
        }
        self.started_order.clear();
    }

    /// Mutable access to a component's attached configuration objects, for
    /// explicit configure calls between `configure` and `build`.
    pub fn confs_mut(&mut self, name: &ComponentName) -> Result<&mut [ConfObject]> {
        self.pool
            .get_mut(name)
            .map(ComponentRuntime::confs_mut)
            .ok_or_else(|| Error::not_found(format!("component {}", name)))
    }

    /// Merged configuration view of one component (component-level values
    /// override service-level ones).
    pub fn effective_conf(
        &mut self,
        name: &ComponentName,
    ) -> Result<serde_json::Map<String, serde_json::Value>> {
        self.pool
            .get_mut(name)
            .map(ComponentRuntime::effective_conf)
            .ok_or_else(|| Error::not_found(format!("component {}", name)))
    }

    /// Current state of one component.
    pub fn status(&self, name: &ComponentName) -> Result<ComponentStatus> {
        self.pool
            .get(name)
            .map(ComponentRuntime::status)
            .ok_or_else(|| Error::not_found(format!("component {}", name)))
    }

    /// Health aggregation: component name -> state for the whole pool.
    pub fn status_all(&self) -> BTreeMap<ComponentName, ComponentState> {
        self.pool
            .iter()
            .map(|(name, rt)| (name.clone(), rt.state()))
            .collect()
    }

    /// Poll every runtime for self-exited processes and reap them.
    pub async fn poll(&mut self) {
        let mut exited = Vec::new();
        for (name, runtime) in &mut self.pool {
            match runtime.poll_exit().await {
                Ok(true) => exited.push(name.clone()),
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(component = %name, error = %err, "poll failed");
                }
            }
        }
        for name in exited {
            self.started_order.retain(|n| n != &name);
        }
    }

    /// Number of components in the pool.
    pub fn count(&self) -> usize {
        self.pool.len()
    }

    /// Remove a runtime from the pool and hand it to the caller, e.g. to run
    /// it standalone. The component must not be active.
    pub fn release(&mut self, name: &ComponentName) -> Result<ComponentRuntime> {
        let active = self
            .pool
            .get(name)
            .map(|rt| rt.state().is_active())
            .unwrap_or(false);
        if active {
            return Err(Error::state_transition(format!(
                "component {}: cannot release while active",
                name
            )));
        }
        self.registration_order.retain(|n| n != name);
        self.started_order.retain(|n| n != name);
        self.descriptors.remove(name);
        self.pool
            .remove(name)
            .ok_or_else(|| Error::not_found(format!("component {}", name)))
    }
}
