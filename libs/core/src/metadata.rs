//! Process-wide cache of per-type actor metadata.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use tracing::debug;

use crate::behavior::{Behavior, ClassBuilder};
use crate::dispatch::HandlerTable;
use crate::error::ConfigError;
use crate::lifecycle::LifecycleHooks;
use crate::supervision::{ExceptionTable, SupervisionPolicy};

type CacheEntry = Arc<dyn Any + Send + Sync>;

static CACHE: LazyLock<RwLock<HashMap<TypeId, CacheEntry>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Everything the control plane knows about one actor type.
///
/// Built once per type and shared by every instance.
pub struct ActorClassMetadata<A> {
    actor_type: &'static str,
    handlers: HandlerTable<A>,
    exceptions: ExceptionTable<A>,
    policy: SupervisionPolicy,
    hooks: LifecycleHooks<A>,
}

impl<A> ActorClassMetadata<A> {
    pub fn actor_type(&self) -> &'static str {
        self.actor_type
    }

    pub fn handlers(&self) -> &HandlerTable<A> {
        &self.handlers
    }

    pub fn exceptions(&self) -> &ExceptionTable<A> {
        &self.exceptions
    }

    pub fn policy(&self) -> &SupervisionPolicy {
        &self.policy
    }

    pub fn hooks(&self) -> &LifecycleHooks<A> {
        &self.hooks
    }
}

impl<A> fmt::Debug for ActorClassMetadata<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorClassMetadata")
            .field("actor_type", &self.actor_type)
            .field("handlers", &self.handlers)
            .field("exceptions", &self.exceptions)
            .field("policy", &self.policy)
            .field("hooks", &self.hooks)
            .finish()
    }
}

/// Returns the metadata for `A`, building it on first use.
///
/// Concurrent first calls may each build a candidate; the first one published
/// wins and the others are dropped, so every caller observes the same table.
/// Build errors are returned and not cached.
pub fn metadata_for<A: Behavior>() -> Result<Arc<ActorClassMetadata<A>>, ConfigError> {
    let id = TypeId::of::<A>();

    let cached = CACHE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&id)
        .cloned();
    if let Some(entry) = cached {
        return Ok(downcast(entry));
    }

    let built: CacheEntry = Arc::new(build::<A>()?);

    let entry = CACHE
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .entry(id)
        .or_insert_with(|| {
            debug!(actor_type = type_name::<A>(), "Published actor metadata");
            built
        })
        .clone();

    Ok(downcast(entry))
}

fn build<A: Behavior>() -> Result<ActorClassMetadata<A>, ConfigError> {
    let mut class = ClassBuilder::new();
    A::declare(&mut class);
    let declared = class.build()?;

    Ok(ActorClassMetadata {
        actor_type: type_name::<A>(),
        handlers: declared.handlers,
        exceptions: declared.exceptions,
        policy: declared.policy,
        hooks: declared.hooks,
    })
}

fn downcast<A: Behavior>(entry: CacheEntry) -> Arc<ActorClassMetadata<A>> {
    match entry.downcast::<ActorClassMetadata<A>>() {
        Ok(metadata) => metadata,
        // Entries are keyed by the TypeId of `A`, so the stored value is always
        // the metadata of `A`.
        Err(_) => unreachable!("metadata cache entry has the wrong type"),
    }
}
