//! The boundary the runtime drives an actor through.
//!
//! A runtime owns one [`Cell`] per actor and calls it one item at a time. The
//! cell holds the current instance, its request correlator, and the shared
//! metadata of its type. Panics inside user code are caught here and turned
//! into failures.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::actor_ref::ActorRef;
use crate::behavior::Behavior;
use crate::context::{ActorEnv, Context};
use crate::correlator::Correlator;
use crate::dispatch::Dispatch;
use crate::error::SpawnError;
use crate::failure::Failure;
use crate::message::{BoxedMessage, Envelope, Incoming, Terminated, TimeoutNotice};
use crate::metadata::{metadata_for, ActorClassMetadata};
use crate::runtime::{Runtime, Spawn};
use crate::supervision::{decide, default_directive, Directive, SupervisionPolicy};
use crate::typing::{TypeKey, Typed};

/// Runtime-facing view of one actor.
pub trait Cell: Send + 'static {
    /// Name of the actor type, for logs.
    fn actor_type(&self) -> &'static str;

    /// Creates the instance and runs the pre-start hook.
    ///
    /// Errors are initialization failures.
    fn on_start(&mut self, env: &ActorEnv) -> Result<(), Failure>;

    /// Processes one item.
    fn on_message(&mut self, env: &ActorEnv, incoming: Incoming) -> Result<(), Failure>;

    /// Decides what to do with a failed child of this actor.
    fn on_failure(&self, failure: &Failure) -> Directive;

    /// How this actor supervises its children.
    fn policy(&self) -> &SupervisionPolicy;

    /// Replaces the instance after `failure`, running the restart hooks.
    fn on_restart(&mut self, env: &ActorEnv, failure: &Failure) -> Result<(), Failure>;

    /// Drops the instance after running the post-stop hook.
    fn on_stop(&mut self, env: &ActorEnv);
}

type Factory<A> = Arc<dyn Fn() -> A + Send + Sync>;
type Preparer<A> = Arc<dyn Fn(&mut A) + Send + Sync>;

/// How to create instances of an actor.
pub struct Props<A> {
    factory: Factory<A>,
    preparer: Option<Preparer<A>>,
    subscribe_to_bus: bool,
    initial: Option<BoxedMessage>,
}

impl<A: Behavior> Props<A> {
    /// Instances are created by `factory`, on start and on every restart.
    pub fn new(factory: impl Fn() -> A + Send + Sync + 'static) -> Self {
        Self {
            factory: Arc::new(factory),
            preparer: None,
            subscribe_to_bus: false,
            initial: None,
        }
    }

    /// Runs on every fresh instance before any hook.
    pub fn prepare(mut self, preparer: impl Fn(&mut A) + Send + Sync + 'static) -> Self {
        self.preparer = Some(Arc::new(preparer));
        self
    }

    /// Subscribes the actor to every handled message type when it starts.
    pub fn subscribe_to_bus(mut self) -> Self {
        self.subscribe_to_bus = true;
        self
    }

    /// Delivered to the actor right after it starts.
    pub fn initial<M: Typed>(mut self, message: M) -> Self {
        self.initial = Some(Box::new(message));
        self
    }

    fn create(&self) -> A {
        let mut instance = (self.factory)();
        if let Some(prepare) = &self.preparer {
            prepare(&mut instance);
        }
        instance
    }
}

impl<A: Behavior + Default> Default for Props<A> {
    fn default() -> Self {
        Self::new(A::default)
    }
}

impl<A> fmt::Debug for Props<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Props")
            .field("prepared", &self.preparer.is_some())
            .field("subscribe_to_bus", &self.subscribe_to_bus)
            .field("initial", &self.initial)
            .finish()
    }
}

/// Spawns an actor of type `A` on `runtime`.
///
/// The type's metadata is resolved first, so a misdeclared type fails here
/// rather than when the actor starts.
pub fn spawn_actor<A: Behavior>(
    runtime: &dyn Runtime,
    parent: Option<&ActorRef>,
    name: &str,
    mut props: Props<A>,
) -> Result<ActorRef, SpawnError> {
    let initial = props.initial.take().map(|message| Envelope {
        message,
        sender: None,
    });
    let cell = ActorCell::new(props)?;
    runtime.spawn(Spawn {
        parent: parent.cloned(),
        name: name.to_string(),
        cell: Box::new(cell),
        initial,
    })
}

/// [`Cell`] implementation for a [`Behavior`].
pub struct ActorCell<A: Behavior> {
    props: Props<A>,
    metadata: Arc<ActorClassMetadata<A>>,
    instance: Option<A>,
    correlator: Correlator,
}

impl<A: Behavior> ActorCell<A> {
    pub fn new(props: Props<A>) -> Result<Self, SpawnError> {
        Ok(Self {
            props,
            metadata: metadata_for::<A>()?,
            instance: None,
            correlator: Correlator::new(),
        })
    }

    /// The running instance, if started.
    pub fn instance(&self) -> Option<&A> {
        self.instance.as_ref()
    }

    fn deliver(&mut self, env: &ActorEnv, envelope: Envelope) -> Result<(), Failure> {
        let key = envelope.message.type_key();

        if let Some(notice) = envelope.message.downcast_ref::<TimeoutNotice>() {
            if !self.correlator.accept_timeout(notice) {
                debug!(actor = %env.myself, response = ?notice.response, "Discarding stale timeout");
                return Ok(());
            }
        } else {
            self.correlator.resolve(&key);
        }

        if key == TypeKey::of::<Terminated>() && !self.metadata.handlers().handles(&key) {
            let actor = envelope
                .message
                .downcast_ref::<Terminated>()
                .map(|t| t.actor.path().to_string())
                .unwrap_or_default();
            return Err(Failure::death_pact(actor));
        }

        let Some(instance) = self.instance.as_mut() else {
            warn!(actor = %env.myself, message = %key, "No instance, dropping message");
            return Ok(());
        };

        let metadata = &self.metadata;
        let mut ctx = Context::new(env, envelope.sender, &mut self.correlator, metadata);
        let message = envelope.message;

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            match metadata.handlers().dispatch(instance, message, &mut ctx)? {
                Dispatch::Handled(_) => {}
                Dispatch::Unhandled(message) => instance.unhandled(message, &mut ctx),
            }
            Ok::<(), Failure>(())
        }));

        outcome.unwrap_or_else(|panic| Err(Failure::from_panic(panic)))
    }
}

impl<A: Behavior> Cell for ActorCell<A> {
    fn actor_type(&self) -> &'static str {
        self.metadata.actor_type()
    }

    fn on_start(&mut self, env: &ActorEnv) -> Result<(), Failure> {
        let props = &self.props;
        let metadata = &self.metadata;
        let correlator = &mut self.correlator;

        let started = catch_unwind(AssertUnwindSafe(|| {
            let mut instance = props.create();
            let mut ctx = Context::new(env, None, correlator, metadata);
            metadata.hooks().run_pre_start(&mut instance, &mut ctx)?;
            Ok::<A, Failure>(instance)
        }))
        .unwrap_or_else(|panic| Err(Failure::from_panic(panic)))
        .map_err(Failure::into_initialization)?;

        self.instance = Some(started);

        if self.props.subscribe_to_bus {
            for key in self.metadata.handlers().keys() {
                env.runtime.subscribe(&env.myself, key);
            }
        }
        debug!(actor = %env.myself, actor_type = self.actor_type(), "Actor started");
        Ok(())
    }

    fn on_message(&mut self, env: &ActorEnv, incoming: Incoming) -> Result<(), Failure> {
        match incoming {
            Incoming::Message(envelope) => self.deliver(env, envelope),
            Incoming::Publish(factory) => {
                env.runtime.publish(factory);
                Ok(())
            }
            Incoming::Terminated(actor) => self.deliver(
                env,
                Envelope {
                    message: Box::new(Terminated { actor }),
                    sender: None,
                },
            ),
        }
    }

    fn on_failure(&self, failure: &Failure) -> Directive {
        match &self.instance {
            Some(instance) => {
                let exceptions = self.metadata.exceptions();
                catch_unwind(AssertUnwindSafe(|| decide(instance, exceptions, failure)))
                    .unwrap_or_else(|_| {
                        warn!(actor_type = self.actor_type(), "Exception handler panicked");
                        Directive::Escalate
                    })
            }
            None => default_directive(failure),
        }
    }

    fn policy(&self) -> &SupervisionPolicy {
        self.metadata.policy()
    }

    fn on_restart(&mut self, env: &ActorEnv, failure: &Failure) -> Result<(), Failure> {
        self.correlator.cancel_all();

        let props = &self.props;
        let metadata = &self.metadata;
        let correlator = &mut self.correlator;
        let previous = self.instance.take();

        let restarted = catch_unwind(AssertUnwindSafe(|| {
            if let Some(mut old) = previous {
                let mut ctx = Context::new(env, None, &mut *correlator, metadata);
                if let Err(e) = metadata.hooks().run_pre_restart(&mut old, failure, &mut ctx) {
                    warn!(actor = %env.myself, error = %e, "Pre-restart hook failed");
                }
            }
            let mut fresh = props.create();
            let mut ctx = Context::new(env, None, &mut *correlator, metadata);
            metadata.hooks().run_post_restart(&mut fresh, failure, &mut ctx)?;
            Ok::<A, Failure>(fresh)
        }))
        .unwrap_or_else(|panic| Err(Failure::from_panic(panic)))
        .map_err(Failure::into_initialization)?;

        self.instance = Some(restarted);
        debug!(actor = %env.myself, cause = %failure, "Actor restarted");
        Ok(())
    }

    fn on_stop(&mut self, env: &ActorEnv) {
        self.correlator.cancel_all();

        let Some(mut instance) = self.instance.take() else {
            return;
        };
        let metadata = &self.metadata;
        let correlator = &mut self.correlator;

        let stopped = catch_unwind(AssertUnwindSafe(|| {
            let mut ctx = Context::new(env, None, correlator, metadata);
            metadata.hooks().run_post_stop(&mut instance, &mut ctx)
        }))
        .unwrap_or_else(|panic| Err(Failure::from_panic(panic)));

        if let Err(e) = stopped {
            warn!(actor = %env.myself, error = %e, "Post-stop hook failed");
        }
    }
}
