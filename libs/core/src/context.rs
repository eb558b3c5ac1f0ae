//! What a handler can do while processing a message.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::actor_ref::ActorRef;
use crate::behavior::Behavior;
use crate::cell::{spawn_actor, Props};
use crate::correlator::Correlator;
use crate::error::{ConfigError, SendError, SpawnError};
use crate::failure::Failure;
use crate::message::{Envelope, MessageFactory, RequestInfo, TimeoutNotice};
use crate::metadata::ActorClassMetadata;
use crate::runtime::Runtime;
use crate::scheduler::{self, Cancellable, ScheduleBuilder};
use crate::typing::{TypeKey, Typed};

/// The runtime an actor lives in and its own address.
#[derive(Clone)]
pub struct ActorEnv {
    pub runtime: Arc<dyn Runtime>,
    pub myself: ActorRef,
}

impl ActorEnv {
    pub fn new(runtime: Arc<dyn Runtime>, myself: ActorRef) -> Self {
        Self { runtime, myself }
    }
}

impl std::fmt::Debug for ActorEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorEnv").field("myself", &self.myself).finish()
    }
}

/// Per-message view of the actor's environment.
pub struct Context<'a, A> {
    env: &'a ActorEnv,
    sender: Option<ActorRef>,
    correlator: &'a mut Correlator,
    metadata: &'a ActorClassMetadata<A>,
}

impl<'a, A: 'static> Context<'a, A> {
    pub(crate) fn new(
        env: &'a ActorEnv,
        sender: Option<ActorRef>,
        correlator: &'a mut Correlator,
        metadata: &'a ActorClassMetadata<A>,
    ) -> Self {
        Self {
            env,
            sender,
            correlator,
            metadata,
        }
    }

    pub fn myself(&self) -> &ActorRef {
        &self.env.myself
    }

    /// Sender of the current message, if any.
    pub fn sender(&self) -> Option<&ActorRef> {
        self.sender.as_ref()
    }

    pub fn env(&self) -> &ActorEnv {
        self.env
    }

    /// Returns true if this actor declares a handler accepting `M`.
    pub fn handles<M: Typed>(&self) -> bool {
        self.metadata.handlers().handles(&TypeKey::of::<M>())
    }

    /// Returns true if a request awaiting `R` is in flight.
    pub fn is_awaiting<R: Typed>(&self) -> bool {
        self.correlator.is_pending(&TypeKey::of::<R>())
    }

    /// Starts a send of `message`.
    pub fn msg<M: Typed>(&mut self, message: M) -> SendBuilder<'_, 'a, A, M> {
        SendBuilder {
            ctx: self,
            message,
            target: None,
            sender: None,
            timeout: None,
        }
    }

    /// Delivers `message` to every subscriber of its type.
    pub fn publish<M: Typed + Clone + Sync>(&self, message: M) {
        self.env.runtime.publish(MessageFactory::of(message));
    }

    /// Starts a scheduled send of `message`.
    pub fn schedule<M: Typed + Clone + Sync>(&self, message: M) -> ScheduleBuilder<'a, M> {
        ScheduleBuilder::new(self.env, message)
    }

    /// One delivery after `delay`; to the bus when `target` is `None`.
    pub fn schedule_once<M: Typed + Clone + Sync>(
        &self,
        target: Option<&ActorRef>,
        message: M,
        delay: Duration,
    ) -> Cancellable {
        let from = Some(self.env.myself.clone());
        scheduler::schedule_once(self.env, target, message, delay, from)
    }

    /// Deliveries after `delay` and then every `period`.
    pub fn schedule_periodic<M: Typed + Clone + Sync>(
        &self,
        target: Option<&ActorRef>,
        message: M,
        delay: Duration,
        period: Duration,
    ) -> Cancellable {
        let from = Some(self.env.myself.clone());
        scheduler::schedule_periodic(self.env, target, message, delay, period, from)
    }

    /// Spawns a child supervised by this actor.
    pub fn spawn<B: Behavior>(&self, name: &str, props: Props<B>) -> Result<ActorRef, SpawnError> {
        spawn_actor(self.env.runtime.as_ref(), Some(&self.env.myself), name, props)
    }

    /// Receives a [`Terminated`](crate::Terminated) message once `target` stops.
    pub fn watch(&self, target: &ActorRef) {
        self.env.runtime.watch(&self.env.myself, target);
    }

    pub fn stop(&self, target: &ActorRef) {
        self.env.runtime.stop(target);
    }

    pub fn stop_self(&self) {
        self.env.runtime.stop(&self.env.myself);
    }

    /// Fails `target` with a killed failure, which stops it.
    pub fn kill(&self, target: &ActorRef) {
        self.env.runtime.kill(target);
    }

    /// Subscribes this actor to published `M` messages.
    pub fn subscribe<M: Typed>(&self) {
        self.env
            .runtime
            .subscribe(&self.env.myself, TypeKey::of::<M>());
    }

    fn deliver(&self, target: &ActorRef, envelope: Envelope) {
        if let Err(e) = self.env.runtime.send(target, envelope) {
            log_dead_letter(&self.env.myself, target, &e);
        }
    }
}

fn log_dead_letter(from: &ActorRef, target: &ActorRef, error: &SendError) {
    warn!(actor = %from, target = %target, error = %error, "Dead letter");
}

/// Fluent send started by [`Context::msg`].
#[must_use = "a send does nothing until it is completed"]
pub struct SendBuilder<'c, 'a, A, M> {
    ctx: &'c mut Context<'a, A>,
    message: M,
    target: Option<ActorRef>,
    sender: Option<Option<ActorRef>>,
    timeout: Option<Duration>,
}

impl<'c, 'a, A: 'static, M: Typed> SendBuilder<'c, 'a, A, M> {
    pub fn to(mut self, target: &ActorRef) -> Self {
        self.target = Some(target.clone());
        self
    }

    /// Targets the sender of the current message.
    pub fn reply_to_sender(mut self) -> Self {
        self.target = self.ctx.sender.clone();
        self
    }

    /// Sender seen by the recipient. Defaults to this actor.
    pub fn from(mut self, sender: Option<&ActorRef>) -> Self {
        self.sender = Some(sender.cloned());
        self
    }

    /// Timeout for [`request`](Self::request).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sends without expecting a reply.
    ///
    /// Undeliverable messages are logged as dead letters.
    pub fn fire_and_forget(self) -> Result<(), Failure> {
        if self.timeout.is_some() {
            return Err(ConfigError::TimeoutWithoutRequest.into());
        }
        let target = self.target.ok_or(ConfigError::MissingTarget)?;
        let sender = self
            .sender
            .unwrap_or_else(|| Some(self.ctx.env.myself.clone()));
        self.ctx.deliver(&target, Envelope::new(self.message, sender));
        Ok(())
    }

    /// Sends and awaits a reply of type `R`.
    ///
    /// A [`TimeoutNotice`] carrying `info` is delivered to this actor if no
    /// message of concrete type `R` arrives within the timeout. This actor must
    /// handle both `R` and timeout notices.
    pub fn request<R: Typed>(self, info: impl Into<RequestInfo>) -> Result<(), Failure> {
        let response = TypeKey::of::<R>();
        let handlers = self.ctx.metadata.handlers();
        if !handlers.handles(&response) {
            return Err(ConfigError::MissingResponseHandler { response }.into());
        }
        if !handlers.handles(&TypeKey::of::<TimeoutNotice>()) {
            return Err(ConfigError::MissingTimeoutHandler.into());
        }
        let target = self.target.ok_or(ConfigError::MissingTarget)?;

        let env = self.ctx.env;
        let timeout = self
            .timeout
            .unwrap_or_else(|| env.runtime.default_request_timeout());
        let sender = self
            .sender
            .unwrap_or_else(|| Some(env.myself.clone()));

        self.ctx.deliver(&target, Envelope::new(self.message, sender));
        self.ctx.correlator.register(response, info.into(), |notice| {
            scheduler::schedule_once(env, Some(&env.myself), notice, timeout, None)
        });
        Ok(())
    }
}

impl<'c, 'a, A: 'static, M: Typed + Clone + Sync> SendBuilder<'c, 'a, A, M> {
    /// Delivers to every subscriber of the message type.
    pub fn publish(self) -> Result<(), Failure> {
        if self.sender.is_some() {
            return Err(ConfigError::PublishWithSender.into());
        }
        if self.target.is_some() {
            return Err(ConfigError::PublishWithTarget.into());
        }
        if self.timeout.is_some() {
            return Err(ConfigError::TimeoutWithoutRequest.into());
        }
        self.ctx.publish(self.message);
        Ok(())
    }
}
