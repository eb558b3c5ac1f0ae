//! The actor system: registry, guardian supervision and the [`Runtime`]
//! implementation handed to every actor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use stagehand_core::{
    default_directive, spawn_actor, ActorEnv, ActorId, ActorRef, Behavior, Cancellable, Directive,
    Failure, Incoming, MessageFactory, Props, Runtime, ScheduledDelivery, ScheduledPayload,
    SpawnError, Spawn, TypeKey, Typed,
};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::actor_loop::ActorLoop;
use crate::bus::EventBus;
use crate::config::RuntimeConfig;
use crate::mailbox::{ActorMailbox, SystemMessage, SystemSender};
use crate::supervisor::{log_failure, RestartStats};

const SHUTDOWN_POLL: Duration = Duration::from_millis(10);

struct ActorEntry {
    actor: ActorRef,
    system: SystemSender,
    parent: Option<ActorId>,
    children: HashMap<String, ActorId>,
    watchers: Vec<ActorRef>,
    task: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Registry {
    actors: HashMap<ActorId, ActorEntry>,
    top_level: HashMap<String, ActorId>,
}

impl Registry {
    fn siblings(&self, parent: Option<ActorId>) -> Option<&HashMap<String, ActorId>> {
        match parent {
            Some(id) => self.actors.get(&id).map(|entry| &entry.children),
            None => Some(&self.top_level),
        }
    }
}

pub(crate) struct SystemInner {
    weak: Weak<SystemInner>,
    handle: Handle,
    config: RuntimeConfig,
    registry: Mutex<Registry>,
    bus: EventBus,
    stopping: AtomicBool,
    guardian_restarts: Mutex<HashMap<ActorId, RestartStats>>,
}

impl SystemInner {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn system_sender(&self, id: ActorId) -> Option<SystemSender> {
        self.registry()
            .actors
            .get(&id)
            .map(|entry| entry.system.clone())
    }

    fn signal(&self, target: &ActorRef, message: SystemMessage) {
        match self.system_sender(target.id()) {
            Some(system) => {
                let _ = system.send(message);
            }
            None => debug!(target = %target, "Actor not running"),
        }
    }

    /// System channels of the live children of `id`.
    pub(crate) fn children_of(&self, id: ActorId) -> Vec<(ActorId, SystemSender)> {
        let registry = self.registry();
        let Some(entry) = registry.actors.get(&id) else {
            return Vec::new();
        };
        entry
            .children
            .values()
            .filter_map(|child| {
                registry
                    .actors
                    .get(child)
                    .map(|c| (*child, c.system.clone()))
            })
            .collect()
    }

    /// Removes a stopped actor and returns its watchers.
    pub(crate) fn unregister(&self, actor: &ActorRef) -> Vec<ActorRef> {
        let id = actor.id();
        let watchers = {
            let mut registry = self.registry();
            let Some(entry) = registry.actors.remove(&id) else {
                return Vec::new();
            };
            let name = actor.name();
            let siblings = match entry.parent {
                Some(parent) => registry.actors.get_mut(&parent).map(|p| &mut p.children),
                None => Some(&mut registry.top_level),
            };
            if let Some(siblings) = siblings {
                if siblings.get(name) == Some(&id) {
                    siblings.remove(name);
                }
            }
            entry.watchers
        };
        self.guardian_restarts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        self.bus.unsubscribe_all(actor);
        watchers
    }

    /// Directive for a failed top-level actor.
    pub(crate) fn guardian_directive(&self, actor: &ActorRef, failure: &Failure) -> Directive {
        let policy = &self.config.guardian_policy;
        let mut directive = match default_directive(failure) {
            Directive::Escalate => Directive::Stop,
            other => other,
        };
        if directive == Directive::Restart {
            let allowed = self
                .guardian_restarts
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(actor.id())
                .or_default()
                .request_restart(policy.max_retries, policy.window, Instant::now());
            if !allowed {
                warn!(actor = %actor, "Restart limit reached, stopping");
                directive = Directive::Stop;
            }
        }
        if policy.logging_enabled {
            log_failure(actor, failure, directive);
        }
        directive
    }

    pub(crate) fn shutdown_grace(&self) -> Duration {
        self.config.shutdown_grace
    }

    fn actor_count(&self) -> usize {
        self.registry().actors.len()
    }
}

impl Runtime for SystemInner {
    fn spawn(&self, spawn: Spawn) -> Result<ActorRef, SpawnError> {
        if self.stopping.load(Ordering::Acquire) {
            return Err(SpawnError::SystemStopped);
        }
        if spawn.name.is_empty() || spawn.name.contains('/') {
            return Err(SpawnError::InvalidName { name: spawn.name });
        }
        let Some(system) = self.weak.upgrade() else {
            return Err(SpawnError::SystemStopped);
        };

        let mut registry = self.registry();
        let parent_id = spawn.parent.as_ref().map(ActorRef::id);

        let siblings = registry
            .siblings(parent_id)
            .ok_or(SpawnError::SystemStopped)?;
        if siblings.contains_key(&spawn.name) {
            return Err(SpawnError::NameTaken { name: spawn.name });
        }

        let parent_system = match parent_id {
            Some(id) => registry.actors.get(&id).map(|entry| entry.system.clone()),
            None => None,
        };

        let id = ActorId::new();
        let path: Arc<str> = match &spawn.parent {
            Some(parent) => format!("{}/{}", parent.path(), spawn.name),
            None => format!("/user/{}", spawn.name),
        }
        .into();

        let (system_tx, system_rx) = mpsc::unbounded_channel();
        let (user_tx, user_rx) = mpsc::channel(self.config.mailbox_capacity.max(1));
        let mailbox = ActorMailbox::new(path.clone(), system_tx.clone(), user_tx);
        let actor = ActorRef::new(id, path, Arc::new(mailbox));

        if let Some(initial) = spawn.initial {
            // The channel is fresh, so the initial message is first in line.
            let _ = actor.deliver(Incoming::Message(initial));
        }

        let env = ActorEnv::new(system.clone(), actor.clone());
        let actor_loop = ActorLoop::new(spawn.cell, env, system, parent_system, system_rx, user_rx);
        let actor_type = actor_loop.actor_type();

        match parent_id {
            Some(parent) => {
                if let Some(entry) = registry.actors.get_mut(&parent) {
                    entry.children.insert(spawn.name.clone(), id);
                }
            }
            None => {
                registry.top_level.insert(spawn.name.clone(), id);
            }
        }
        let task = self.handle.spawn(actor_loop.run());
        registry.actors.insert(
            id,
            ActorEntry {
                actor: actor.clone(),
                system: system_tx,
                parent: parent_id,
                children: HashMap::new(),
                watchers: Vec::new(),
                task: Some(task),
            },
        );

        debug!(actor = %actor, actor_type, "Spawned actor");
        Ok(actor)
    }

    fn publish(&self, message: MessageFactory) {
        self.bus.publish(&message);
    }

    fn subscribe(&self, subscriber: &ActorRef, key: TypeKey) {
        self.bus.subscribe(subscriber, key);
    }

    fn watch(&self, watcher: &ActorRef, target: &ActorRef) {
        let mut registry = self.registry();
        match registry.actors.get_mut(&target.id()) {
            Some(entry) => {
                if !entry.watchers.contains(watcher) {
                    entry.watchers.push(watcher.clone());
                }
            }
            None => {
                drop(registry);
                let _ = watcher.deliver(Incoming::Terminated(target.clone()));
            }
        }
    }

    fn stop(&self, target: &ActorRef) {
        self.signal(target, SystemMessage::Stop);
    }

    fn kill(&self, target: &ActorRef) {
        self.signal(target, SystemMessage::Kill);
    }

    fn schedule(&self, delivery: ScheduledDelivery) -> Cancellable {
        crate::timer::arm(&self.handle, delivery)
    }

    fn default_request_timeout(&self) -> Duration {
        self.config.request_timeout
    }
}

/// Hosts actors on the current tokio runtime.
#[derive(Clone)]
pub struct ActorSystem {
    inner: Arc<SystemInner>,
}

impl ActorSystem {
    /// Creates a system bound to the tokio runtime of the caller.
    pub fn new(config: RuntimeConfig) -> Result<Self, SpawnError> {
        let handle = Handle::try_current().map_err(|_| SpawnError::NoRuntime)?;
        let inner = Arc::new_cyclic(|weak| SystemInner {
            weak: weak.clone(),
            handle,
            config,
            registry: Mutex::new(Registry::default()),
            bus: EventBus::new(),
            stopping: AtomicBool::new(false),
            guardian_restarts: Mutex::new(HashMap::new()),
        });
        info!(
            mailbox_capacity = inner.config.mailbox_capacity,
            request_timeout_ms = inner.config.request_timeout.as_millis() as u64,
            "Actor system started"
        );
        Ok(Self { inner })
    }

    /// Spawns a top-level actor.
    pub fn spawn<A: Behavior>(&self, name: &str, props: Props<A>) -> Result<ActorRef, SpawnError> {
        spawn_actor(self.inner.as_ref(), None, name, props)
    }

    /// The runtime actors of this system talk to.
    pub fn runtime(&self) -> Arc<dyn Runtime> {
        self.inner.clone()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn publish<M: Typed + Clone + Sync>(&self, message: M) {
        self.inner.publish(MessageFactory::of(message));
    }

    pub fn subscribe<M: Typed>(&self, subscriber: &ActorRef) {
        self.inner.subscribe(subscriber, TypeKey::of::<M>());
    }

    /// Delivers a termination notice to `watcher` once `target` stops.
    pub fn watch(&self, watcher: &ActorRef, target: &ActorRef) {
        self.inner.watch(watcher, target);
    }

    pub fn stop(&self, target: &ActorRef) {
        self.inner.stop(target);
    }

    pub fn kill(&self, target: &ActorRef) {
        self.inner.kill(target);
    }

    /// Sends `message` to `target` once after `delay`.
    pub fn schedule_once<M: Typed + Clone + Sync>(
        &self,
        target: &ActorRef,
        message: M,
        delay: Duration,
    ) -> Cancellable {
        self.inner.schedule(ScheduledDelivery {
            target: target.clone(),
            payload: ScheduledPayload::Direct(MessageFactory::of(message)),
            sender: None,
            delay,
            period: None,
        })
    }

    /// Sends `message` to `target` after `delay`, then every `period`.
    pub fn schedule_periodic<M: Typed + Clone + Sync>(
        &self,
        target: &ActorRef,
        message: M,
        delay: Duration,
        period: Duration,
    ) -> Cancellable {
        self.inner.schedule(ScheduledDelivery {
            target: target.clone(),
            payload: ScheduledPayload::Direct(MessageFactory::of(message)),
            sender: None,
            delay,
            period: Some(period),
        })
    }

    /// Finds a live actor by path, e.g. `/user/parent/child`.
    pub fn lookup(&self, path: &str) -> Option<ActorRef> {
        self.inner
            .registry()
            .actors
            .values()
            .find(|entry| entry.actor.path() == path)
            .map(|entry| entry.actor.clone())
    }

    /// Live actors, including children.
    pub fn actor_count(&self) -> usize {
        self.inner.actor_count()
    }

    pub fn is_stopping(&self) -> bool {
        self.inner.stopping.load(Ordering::Acquire)
    }

    /// Stops every actor, children before parents.
    ///
    /// Actors still running after the configured grace period are aborted.
    pub async fn shutdown(&self) {
        if self.inner.stopping.swap(true, Ordering::AcqRel) {
            return;
        }

        let top_level: Vec<SystemSender> = {
            let registry = self.inner.registry();
            registry
                .top_level
                .values()
                .filter_map(|id| registry.actors.get(id).map(|e| e.system.clone()))
                .collect()
        };
        info!(count = top_level.len(), "Stopping all actors");
        for system in top_level {
            let _ = system.send(SystemMessage::Stop);
        }

        // Wait for all to finish with timeout
        let deadline = Instant::now() + self.inner.config.shutdown_grace;
        while Instant::now() < deadline {
            if self.inner.actor_count() == 0 {
                break;
            }
            sleep(SHUTDOWN_POLL).await;
        }

        // Force abort any remaining
        let remaining: Vec<ActorEntry> = {
            let mut registry = self.inner.registry();
            registry.top_level.clear();
            registry.actors.drain().map(|(_, entry)| entry).collect()
        };
        for entry in remaining {
            warn!(actor = %entry.actor, "Force aborting actor");
            if let Some(task) = entry.task {
                task.abort();
            }
        }
        info!("Actor system stopped");
    }
}

impl std::fmt::Debug for ActorSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorSystem")
            .field("actors", &self.actor_count())
            .field("stopping", &self.is_stopping())
            .finish()
    }
}
