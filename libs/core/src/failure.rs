//! Handler failures.
//!
//! A [`Failure`] is what a handler, hook, or the runtime reports when an actor
//! cannot continue normally. It carries the concrete error type so exception
//! handlers can be matched by specificity, plus a category that decides whether
//! handlers are consulted at all.

use std::any::Any;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::typing::{TypeKey, Typed};

/// How a failure is treated by the decision engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCategory {
    /// Construction or start-up of the actor failed.
    Initialization,
    /// The actor was killed on request.
    Killed,
    /// A watched actor terminated and the watcher does not handle it.
    DeathPact,
    /// An ordinary handler error.
    Recoverable,
    /// A panic or other error the actor cannot recover from itself.
    Severe,
}

impl FailureCategory {
    /// Categories the runtime always answers with `Stop`.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FailureCategory::Initialization | FailureCategory::Killed | FailureCategory::DeathPact
        )
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureCategory::Initialization => "initialization",
            FailureCategory::Killed => "killed",
            FailureCategory::DeathPact => "death pact",
            FailureCategory::Recoverable => "recoverable",
            FailureCategory::Severe => "severe",
        };
        f.write_str(s)
    }
}

/// A failed handler, hook, or actor.
#[derive(Clone)]
pub struct Failure {
    category: FailureCategory,
    key: TypeKey,
    error: Arc<dyn Error + Send + Sync>,
}

impl Failure {
    /// Wraps `error` with an explicit category.
    pub fn new<E>(category: FailureCategory, error: E) -> Self
    where
        E: Typed + Error + Sync,
    {
        Self {
            category,
            key: TypeKey::of::<E>(),
            error: Arc::new(error),
        }
    }

    /// Recoverable failure with a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::from(FailureMessage(message.into()))
    }

    /// Severe failure with a plain message.
    pub fn severe(message: impl Into<String>) -> Self {
        Self::new(FailureCategory::Severe, FailureMessage(message.into()))
    }

    /// Severe failure from a caught panic payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::new(FailureCategory::Severe, PanicFailure { message })
    }

    /// Failure reported for an actor killed on request.
    pub fn killed() -> Self {
        Self::new(FailureCategory::Killed, ActorKilled)
    }

    /// Failure reported when a watched actor terminated unhandled.
    pub fn death_pact(actor: impl Into<String>) -> Self {
        Self::new(
            FailureCategory::DeathPact,
            DeathPact {
                actor: actor.into(),
            },
        )
    }

    /// Same error, recategorised as an initialization failure.
    pub fn into_initialization(self) -> Self {
        self.with_category(FailureCategory::Initialization)
    }

    /// Same error with another category.
    pub fn with_category(mut self, category: FailureCategory) -> Self {
        self.category = category;
        self
    }

    pub fn category(&self) -> FailureCategory {
        self.category
    }

    /// Concrete type of the wrapped error.
    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn error(&self) -> &(dyn Error + Send + Sync + 'static) {
        self.error.as_ref()
    }

    /// Returns true if the wrapped error is `E` or a declared subtype of it.
    pub fn is<E: Typed>(&self) -> bool {
        self.key.is_subtype_of(&TypeKey::of::<E>())
    }

    /// Borrows the wrapped error if its concrete type is `E`.
    pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
        self.error.downcast_ref::<E>()
    }
}

impl<E> From<E> for Failure
where
    E: Typed + Error + Sync,
{
    fn from(error: E) -> Self {
        Self::new(FailureCategory::Recoverable, error)
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Failure")
            .field("category", &self.category)
            .field("type", &self.key)
            .field("error", &self.error.to_string())
            .finish()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failure: {}", self.category, self.error)
    }
}

// =============================================================================
// Built-in error types
// =============================================================================

/// Error carrying only a message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct FailureMessage(pub String);

/// A handler panicked.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("handler panicked: {message}")]
pub struct PanicFailure {
    pub message: String,
}

/// The actor was killed.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("actor killed")]
pub struct ActorKilled;

/// A watched actor terminated and no handler accepted the notification.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("watched actor {actor} terminated")]
pub struct DeathPact {
    pub actor: String,
}

crate::typed!(FailureMessage, PanicFailure, ActorKilled, DeathPact);
