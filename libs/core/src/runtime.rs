//! The interface the core drives a runtime through.

use std::time::Duration;

use crate::actor_ref::ActorRef;
use crate::cell::Cell;
use crate::correlator::DEFAULT_REQUEST_TIMEOUT;
use crate::error::{SendError, SpawnError};
use crate::message::{Envelope, Incoming, MessageFactory};
use crate::scheduler::Cancellable;
use crate::typing::TypeKey;

/// Request to host a new actor.
pub struct Spawn {
    /// Supervising actor; `None` for top-level actors.
    pub parent: Option<ActorRef>,
    pub name: String,
    pub cell: Box<dyn Cell>,
    /// Delivered right after the actor started.
    pub initial: Option<Envelope>,
}

/// What a scheduled delivery carries.
#[derive(Debug, Clone)]
pub enum ScheduledPayload {
    /// Delivered to the target as an ordinary message.
    Direct(MessageFactory),
    /// Delivered to the target wrapped for redelivery onto the bus.
    Publish(MessageFactory),
}

impl ScheduledPayload {
    /// The incoming item to enqueue for one firing.
    pub fn incoming(&self, sender: Option<&ActorRef>) -> Incoming {
        match self {
            ScheduledPayload::Direct(factory) => Incoming::Message(Envelope {
                message: factory.make(),
                sender: sender.cloned(),
            }),
            ScheduledPayload::Publish(factory) => Incoming::Publish(factory.clone()),
        }
    }
}

/// One-shot or periodic delivery.
#[derive(Debug, Clone)]
pub struct ScheduledDelivery {
    pub target: ActorRef,
    pub payload: ScheduledPayload,
    pub sender: Option<ActorRef>,
    pub delay: Duration,
    /// `None` for one-shot deliveries.
    pub period: Option<Duration>,
}

/// Services a runtime provides to actors.
///
/// Implementations must be usable from inside a handler: no method may block
/// waiting on another actor.
pub trait Runtime: Send + Sync + 'static {
    /// Hosts a new actor and starts it.
    fn spawn(&self, spawn: Spawn) -> Result<ActorRef, SpawnError>;

    /// Enqueues an envelope for `target`.
    fn send(&self, target: &ActorRef, envelope: Envelope) -> Result<(), SendError> {
        target.deliver(Incoming::Message(envelope))
    }

    /// Delivers one copy of the message to every matching subscriber.
    fn publish(&self, message: MessageFactory);

    /// Subscribes `subscriber` to published messages of `key` and its subtypes.
    fn subscribe(&self, subscriber: &ActorRef, key: TypeKey);

    /// Delivers a termination notice to `watcher` once `target` stops.
    fn watch(&self, watcher: &ActorRef, target: &ActorRef);

    /// Stops `target` after its current message.
    fn stop(&self, target: &ActorRef);

    /// Fails `target` with a killed failure.
    fn kill(&self, target: &ActorRef);

    /// Arms a delivery and returns its cancellation handle.
    fn schedule(&self, delivery: ScheduledDelivery) -> Cancellable;

    /// Timeout applied to requests that set none.
    fn default_request_timeout(&self) -> Duration {
        DEFAULT_REQUEST_TIMEOUT
    }
}
