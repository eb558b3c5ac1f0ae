//! # stagehand-core
//!
//! Control logic for typed, registration-driven actors layered over a generic
//! actor runtime.
//!
//! ## Responsibilities
//!
//! - **Dispatch**: each actor type declares its handlers once; the declarations
//!   are ordered most-specific-first and routed against a message's concrete type.
//! - **Supervision**: declared exception handlers and a supervision policy decide
//!   what happens when a child's handler fails.
//! - **Request/reply**: outgoing requests are correlated with the expected reply
//!   type and a timeout notice.
//! - **Scheduling**: cancellable one-shot and periodic sends, including untargeted
//!   sends that fan out through the publish/subscribe bus.
//!
//! ## Runtime boundary
//!
//! This crate never spawns tasks or owns timers. A runtime implements [`Runtime`]
//! (core → runtime) and drives each actor through the [`Cell`] trait
//! (runtime → core). `stagehand-runtime` provides a tokio implementation.
//!
//! ## Declaring an actor
//!
//! ```ignore
//! use stagehand_core::{typed, Behavior, ClassBuilder, Context, Failure};
//!
//! #[derive(Debug, Clone)]
//! struct Ping;
//! typed!(Ping);
//!
//! #[derive(Default)]
//! struct Ponger;
//!
//! impl Behavior for Ponger {
//!     fn declare(class: &mut ClassBuilder<Self>) {
//!         class.handle::<Ping, _>(|_, ping, ctx| ctx.msg(ping).reply_to_sender().fire_and_forget());
//!     }
//! }
//! ```

mod actor_ref;
mod behavior;
mod cell;
mod context;
mod correlator;
mod dispatch;
mod error;
mod failure;
mod id;
mod lifecycle;
mod macros;
mod message;
mod metadata;
mod runtime;
mod scheduler;
mod specificity;
mod supervision;
mod typing;

#[cfg(test)]
mod testkit;

pub use actor_ref::{ActorRef, Mailbox};
pub use behavior::{Behavior, ClassBuilder};
pub use cell::{spawn_actor, ActorCell, Cell, Props};
pub use context::{ActorEnv, Context, SendBuilder};
pub use correlator::{Correlator, Timeouter, DEFAULT_REQUEST_TIMEOUT, DEFAULT_TIMEOUTER_WAIT};
pub use dispatch::{Dispatch, HandlerTable};
pub use error::{ConfigError, SendError, SpawnError};
pub use failure::{ActorKilled, DeathPact, Failure, FailureCategory, FailureMessage, PanicFailure};
pub use id::ActorId;
pub use lifecycle::{LifecycleEvent, LifecycleHooks};
pub use message::{BoxedMessage, Envelope, Incoming, MessageFactory, RequestInfo, Terminated, TimeoutNotice};
pub use metadata::{metadata_for, ActorClassMetadata};
pub use runtime::{Runtime, ScheduledDelivery, ScheduledPayload, Spawn};
pub use scheduler::{schedule_once, schedule_periodic, Cancellable, ScheduleBuilder};
pub use specificity::{compare, order_most_specific_first};
pub use supervision::{
    decide, default_directive, Directive, ExceptionTable, StrategyKind, SupervisionPolicy,
    SupervisionPolicyBuilder, FOREVER,
};
pub use typing::{AnyBox, ErasedMessage, Supertype, TypeKey, Typed};
