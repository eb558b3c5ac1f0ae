//! Publish/subscribe bus.

use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

use stagehand_core::{ActorId, ActorRef, Envelope, Incoming, MessageFactory, TypeKey};
use tracing::{debug, trace};

#[derive(Debug)]
struct Subscription {
    key: TypeKey,
    subscriber: ActorRef,
}

/// Subtype-aware subscriptions.
///
/// A subscriber to `Animal` receives published `Dog`s. Each published message
/// reaches a subscriber at most once, however many of its subscriptions match.
#[derive(Debug, Default)]
pub struct EventBus {
    subscriptions: RwLock<Vec<Subscription>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the subscription already existed.
    pub fn subscribe(&self, subscriber: &ActorRef, key: TypeKey) -> bool {
        let mut subscriptions = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if subscriptions
            .iter()
            .any(|s| s.key == key && &s.subscriber == subscriber)
        {
            return false;
        }
        debug!(actor = %subscriber, message = %key, "Subscribed");
        subscriptions.push(Subscription {
            key,
            subscriber: subscriber.clone(),
        });
        true
    }

    pub fn unsubscribe(&self, subscriber: &ActorRef, key: TypeKey) {
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|s| !(s.key == key && &s.subscriber == subscriber));
    }

    pub fn unsubscribe_all(&self, subscriber: &ActorRef) {
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|s| &s.subscriber != subscriber);
    }

    /// Delivers a fresh copy of the message to every matching subscriber.
    ///
    /// Returns the number of successful deliveries.
    pub fn publish(&self, message: &MessageFactory) -> usize {
        let key = message.key();
        let targets: Vec<ActorRef> = {
            let subscriptions = self
                .subscriptions
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            let mut seen: HashSet<ActorId> = HashSet::new();
            subscriptions
                .iter()
                .filter(|s| key.is_subtype_of(&s.key))
                .filter(|s| seen.insert(s.subscriber.id()))
                .map(|s| s.subscriber.clone())
                .collect()
        };

        let mut delivered = 0;
        for target in targets {
            match target.deliver(Incoming::Message(Envelope {
                message: message.make(),
                sender: None,
            })) {
                Ok(()) => delivered += 1,
                Err(e) => debug!(target = %target, message = %key, error = %e, "Dropped published message"),
            }
        }
        trace!(message = %key, delivered, "Published");
        delivered
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
