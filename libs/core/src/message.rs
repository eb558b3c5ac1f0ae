//! Message envelopes and the reserved message shapes the dispatcher intercepts.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::actor_ref::ActorRef;
use crate::typing::{ErasedMessage, TypeKey, Typed};

/// A type-erased message.
pub type BoxedMessage = Box<dyn ErasedMessage>;

/// A message with its optional sender.
#[derive(Debug)]
pub struct Envelope {
    pub message: BoxedMessage,
    pub sender: Option<ActorRef>,
}

impl Envelope {
    pub fn new<M: Typed>(message: M, sender: Option<ActorRef>) -> Self {
        Self {
            message: Box::new(message),
            sender,
        }
    }
}

/// Produces fresh copies of a message.
///
/// Used wherever one message is delivered more than once: bus fan-out and
/// periodic schedules.
#[derive(Clone)]
pub struct MessageFactory {
    key: TypeKey,
    make: Arc<dyn Fn() -> BoxedMessage + Send + Sync>,
}

impl MessageFactory {
    pub fn of<M>(message: M) -> Self
    where
        M: Typed + Clone + Sync,
    {
        Self {
            key: TypeKey::of::<M>(),
            make: Arc::new(move || Box::new(message.clone())),
        }
    }

    /// Concrete type of the produced messages.
    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn make(&self) -> BoxedMessage {
        (self.make)()
    }
}

impl fmt::Debug for MessageFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MessageFactory").field(&self.key).finish()
    }
}

/// What a runtime hands to an actor's cell.
#[derive(Debug)]
pub enum Incoming {
    /// An ordinary message.
    Message(Envelope),
    /// An untargeted message to be redelivered onto the bus.
    Publish(MessageFactory),
    /// A watched actor terminated.
    Terminated(ActorRef),
}

impl Incoming {
    pub fn message<M: Typed>(message: M, sender: Option<ActorRef>) -> Self {
        Incoming::Message(Envelope::new(message, sender))
    }
}

/// Notification that a watched actor has stopped.
#[derive(Debug, Clone)]
pub struct Terminated {
    pub actor: ActorRef,
}

crate::typed!(Terminated);

/// Caller-supplied context attached to a request and returned on timeout.
#[derive(Clone, Default)]
pub struct RequestInfo(Option<Arc<dyn Any + Send + Sync>>);

impl RequestInfo {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Some(Arc::new(value)))
    }

    /// No context.
    pub fn none() -> Self {
        Self(None)
    }

    pub fn get<T: Any>(&self) -> Option<&T> {
        self.0.as_deref().and_then(|v| v.downcast_ref::<T>())
    }

    /// The context as text, when it was given as a string.
    pub fn label(&self) -> Option<&str> {
        self.get::<String>().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}

impl From<&str> for RequestInfo {
    fn from(value: &str) -> Self {
        Self::new(value.to_string())
    }
}

impl From<String> for RequestInfo {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<()> for RequestInfo {
    fn from(_: ()) -> Self {
        Self::none()
    }
}

impl fmt::Debug for RequestInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.0, self.label()) {
            (None, _) => f.write_str("RequestInfo(none)"),
            (Some(_), Some(label)) => write!(f, "RequestInfo({label:?})"),
            (Some(_), None) => f.write_str("RequestInfo(..)"),
        }
    }
}

/// Sent to an actor when a request timed out.
///
/// `response` names the awaited response type. Notices from a
/// [`Timeouter`](crate::Timeouter) carry `None`.
#[derive(Debug, Clone)]
pub struct TimeoutNotice {
    pub info: RequestInfo,
    pub response: Option<TypeKey>,
    pub(crate) generation: u64,
}

impl TimeoutNotice {
    /// A notice not tied to any request.
    pub fn standalone(info: RequestInfo) -> Self {
        Self {
            info,
            response: None,
            generation: 0,
        }
    }
}

crate::typed!(TimeoutNotice);
