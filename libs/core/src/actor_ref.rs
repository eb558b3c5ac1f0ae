//! Addressable handles to actors.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::SendError;
use crate::id::ActorId;
use crate::message::Incoming;
use crate::typing::Typed;

/// Delivery side of an actor's mailbox, implemented by the runtime.
pub trait Mailbox: Send + Sync + 'static {
    /// Enqueues without blocking.
    fn deliver(&self, incoming: Incoming) -> Result<(), SendError>;

    /// Returns true once the actor can no longer receive.
    fn is_closed(&self) -> bool;
}

/// Handle for sending messages to an actor.
///
/// Cheap to clone. Equality and hashing use the actor id.
#[derive(Clone)]
pub struct ActorRef {
    id: ActorId,
    path: Arc<str>,
    mailbox: Arc<dyn Mailbox>,
}

impl ActorRef {
    pub fn new(id: ActorId, path: impl Into<Arc<str>>, mailbox: Arc<dyn Mailbox>) -> Self {
        Self {
            id,
            path: path.into(),
            mailbox,
        }
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    /// Slash-separated path from the root, e.g. `/user/pinger`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last path segment.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }

    /// Sends `message` with an optional sender.
    pub fn tell<M: Typed>(&self, message: M, sender: Option<&ActorRef>) -> Result<(), SendError> {
        self.deliver(Incoming::message(message, sender.cloned()))
    }

    pub fn deliver(&self, incoming: Incoming) -> Result<(), SendError> {
        self.mailbox.deliver(incoming)
    }

    pub fn is_closed(&self) -> bool {
        self.mailbox.is_closed()
    }
}

impl PartialEq for ActorRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ActorRef {}

impl Hash for ActorRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorRef({}#{})", self.path, self.id)
    }
}

impl fmt::Display for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}
