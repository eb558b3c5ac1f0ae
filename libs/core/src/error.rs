//! Error types for actor declaration, spawning, and delivery.

use thiserror::Error;

use crate::lifecycle::LifecycleEvent;
use crate::typing::TypeKey;

/// Misconfiguration of an actor type or misuse of a builder.
///
/// Declaration problems surface from spawn as [`SpawnError::Config`]; builder
/// misuse inside a handler is returned as a failure through `?`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A handler was declared without a message parameter.
    #[error("handler '{handler}' declares no message parameter")]
    MissingParameter { handler: String },

    /// A handler was declared with more than one message parameter.
    #[error("handler '{handler}' declares {count} message parameters, expected one")]
    TooManyParameters { handler: String, count: usize },

    /// Two handlers were declared for the same message type.
    #[error("duplicate handler for message type {message}")]
    DuplicateHandler { message: TypeKey },

    /// Two exception handlers were declared for the same error type.
    #[error("duplicate exception handler for error type {error}")]
    DuplicateExceptionHandler { error: TypeKey },

    /// More than one supervision policy was declared.
    #[error("supervision policy declared more than once")]
    DuplicatePolicy,

    /// More than one hook was declared for a lifecycle event.
    #[error("more than one {event} hook declared")]
    DuplicateHook { event: LifecycleEvent },

    /// A request was made for a response type with no handler.
    #[error("no handler declared for response type {response}")]
    MissingResponseHandler { response: TypeKey },

    /// A request was made by an actor that does not handle timeout notices.
    #[error("no handler declared for timeout notices")]
    MissingTimeoutHandler,

    /// A timeout was set on a send that expects no reply.
    #[error("timeout set on a fire-and-forget send; use request instead")]
    TimeoutWithoutRequest,

    /// A send was issued without a target.
    #[error("send has no target")]
    MissingTarget,

    /// A publish carried an explicit sender.
    #[error("publish cannot carry an explicit sender")]
    PublishWithSender,

    /// A publish carried an explicit target.
    #[error("publish cannot carry a target")]
    PublishWithTarget,
}

crate::typed!(ConfigError);

/// A message could not be delivered.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The target's mailbox is at capacity.
    #[error("mailbox full for actor {actor}")]
    MailboxFull { actor: String },

    /// The target has stopped.
    #[error("actor {actor} stopped")]
    ActorStopped { actor: String },
}

crate::typed!(SendError);

/// An actor could not be spawned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SpawnError {
    /// The actor type is misconfigured.
    #[error("invalid actor declaration: {0}")]
    Config(#[from] ConfigError),

    /// A sibling with the same name is alive.
    #[error("actor name '{name}' already taken")]
    NameTaken { name: String },

    /// Names must be non-empty and must not contain `/`.
    #[error("invalid actor name '{name}'")]
    InvalidName { name: String },

    /// No runtime is available to host the actor.
    #[error("no runtime available")]
    NoRuntime,

    /// The system is shutting down.
    #[error("actor system stopped")]
    SystemStopped,
}

crate::typed!(SpawnError);

impl SpawnError {
    /// Returns true if the actor type itself is misconfigured.
    pub fn is_config(&self) -> bool {
        matches!(self, SpawnError::Config(_))
    }
}
