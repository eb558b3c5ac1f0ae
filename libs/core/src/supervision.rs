//! Supervision policies and the failure decision engine.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::failure::{Failure, FailureCategory};
use crate::specificity::order_most_specific_first;
use crate::typing::TypeKey;

/// Restart window that never expires in practice.
pub const FOREVER: Duration = Duration::from_secs(291 * 365 * 24 * 60 * 60);

/// What the supervisor does with a failed child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Directive {
    /// Keep the instance and continue with the next message.
    Resume,
    /// Replace the instance, keeping the mailbox.
    Restart,
    /// Stop the child permanently.
    Stop,
    /// Stop the child and fail the supervisor with the same failure.
    Escalate,
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Directive::Resume => "resume",
            Directive::Restart => "restart",
            Directive::Stop => "stop",
            Directive::Escalate => "escalate",
        };
        f.write_str(s)
    }
}

/// Which children a directive applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Only the failed child.
    #[default]
    OneForOne,
    /// The failed child and all of its siblings.
    AllForOne,
}

/// How an actor supervises its children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisionPolicy {
    pub kind: StrategyKind,
    /// Restarts allowed per child within `window`; `None` means unbounded.
    pub max_retries: Option<u32>,
    pub window: Duration,
    pub logging_enabled: bool,
}

impl Default for SupervisionPolicy {
    fn default() -> Self {
        Self {
            kind: StrategyKind::OneForOne,
            max_retries: None,
            window: FOREVER,
            logging_enabled: true,
        }
    }
}

impl SupervisionPolicy {
    pub fn builder() -> SupervisionPolicyBuilder {
        SupervisionPolicyBuilder::default()
    }
}

/// Builder for [`SupervisionPolicy`].
#[derive(Debug, Clone, Default)]
pub struct SupervisionPolicyBuilder {
    policy: SupervisionPolicy,
}

impl SupervisionPolicyBuilder {
    pub fn one_for_one(mut self) -> Self {
        self.policy.kind = StrategyKind::OneForOne;
        self
    }

    pub fn all_for_one(mut self) -> Self {
        self.policy.kind = StrategyKind::AllForOne;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.policy.max_retries = Some(max_retries);
        self
    }

    pub fn unbounded_retries(mut self) -> Self {
        self.policy.max_retries = None;
        self
    }

    pub fn window(mut self, window: Duration) -> Self {
        self.policy.window = window;
        self
    }

    pub fn logging(mut self, enabled: bool) -> Self {
        self.policy.logging_enabled = enabled;
        self
    }

    pub fn build(self) -> SupervisionPolicy {
        self.policy
    }
}

// =============================================================================
// Exception table
// =============================================================================

pub(crate) type ExceptionFn<A> = Box<dyn Fn(&A, &Failure) -> Directive + Send + Sync>;

pub(crate) struct ExceptionEntry<A> {
    pub(crate) key: TypeKey,
    pub(crate) handler: ExceptionFn<A>,
}

/// Declared exception handlers, most specific error type first.
pub struct ExceptionTable<A> {
    entries: Vec<ExceptionEntry<A>>,
}

impl<A> ExceptionTable<A> {
    pub(crate) fn from_declared(entries: Vec<ExceptionEntry<A>>) -> Self {
        Self {
            entries: order_most_specific_first(entries, |e| e.key),
        }
    }

    /// Declared error types in matching order.
    pub fn keys(&self) -> impl Iterator<Item = TypeKey> + '_ {
        self.entries.iter().map(|e| e.key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Runs the first handler whose error type covers the failure.
    pub fn resolve(&self, actor: &A, failure: &Failure) -> Option<Directive> {
        let key = failure.key();
        self.entries
            .iter()
            .find(|e| key.is_subtype_of(&e.key))
            .map(|e| (e.handler)(actor, failure))
    }
}

impl<A> fmt::Debug for ExceptionTable<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.iter().map(|e| e.key)).finish()
    }
}

// =============================================================================
// Decision engine
// =============================================================================

/// Directive for a failure when no exception handler is consulted.
pub fn default_directive(failure: &Failure) -> Directive {
    match failure.category() {
        c if c.is_fatal() => Directive::Stop,
        FailureCategory::Severe => Directive::Escalate,
        _ => Directive::Restart,
    }
}

/// Maps a child's failure to a directive using the supervisor's handlers.
pub fn decide<A>(actor: &A, exceptions: &ExceptionTable<A>, failure: &Failure) -> Directive {
    match failure.category() {
        FailureCategory::Recoverable => exceptions
            .resolve(actor, failure)
            .unwrap_or(Directive::Restart),
        _ => default_directive(failure),
    }
}
