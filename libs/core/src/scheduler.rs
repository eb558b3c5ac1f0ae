//! Cancellable scheduled sends.
//!
//! Timers belong to the runtime; this module decides what a delivery carries and
//! owns the cancellation state shared between the actor and the timer.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::actor_ref::ActorRef;
use crate::context::ActorEnv;
use crate::message::MessageFactory;
use crate::runtime::{ScheduledDelivery, ScheduledPayload};
use crate::typing::Typed;

const PENDING: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

type CancelHook = Box<dyn FnOnce() + Send>;

/// Handle to a scheduled delivery.
///
/// `Pending` moves to `Fired` (one-shot delivered) or `Cancelled`, whichever
/// happens first. Periodic deliveries stay `Pending` until cancelled or
/// until their target stops, which also ends in `Fired`.
#[derive(Clone)]
pub struct Cancellable {
    inner: Arc<CancellableInner>,
}

struct CancellableInner {
    state: AtomicU8,
    on_cancel: Mutex<Option<CancelHook>>,
}

impl Cancellable {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancellableInner {
                state: AtomicU8::new(PENDING),
                on_cancel: Mutex::new(None),
            }),
        }
    }

    /// Runs `hook` when the handle is cancelled.
    ///
    /// Runs immediately if already cancelled. Replaces any previous hook.
    pub fn set_cancel_hook(&self, hook: impl FnOnce() + Send + 'static) {
        let mut slot = self
            .inner
            .on_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.is_cancelled() {
            drop(slot);
            hook();
            return;
        }
        *slot = Some(Box::new(hook));
    }

    /// Stops all future deliveries.
    ///
    /// Returns false if the delivery already fired or was cancelled before.
    pub fn cancel(&self) -> bool {
        let cancelled = self
            .inner
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if cancelled {
            let hook = self
                .inner
                .on_cancel
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(hook) = hook {
                hook();
            }
        }
        cancelled
    }

    /// Claims the single firing of a one-shot delivery.
    ///
    /// Returns false if it was cancelled first.
    pub fn try_fire_once(&self) -> bool {
        self.inner
            .state
            .compare_exchange(PENDING, FIRED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Marks a periodic delivery that ended on its own.
    ///
    /// Returns false if it was cancelled first.
    pub fn finish(&self) -> bool {
        self.try_fire_once()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == CANCELLED
    }

    pub fn is_fired(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == FIRED
    }

    /// Neither fired nor cancelled.
    pub fn is_live(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == PENDING
    }
}

impl Default for Cancellable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Cancellable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.inner.state.load(Ordering::Acquire) {
            PENDING => "pending",
            FIRED => "fired",
            _ => "cancelled",
        };
        f.debug_tuple("Cancellable").field(&state).finish()
    }
}

// =============================================================================
// Scheduling entry points
// =============================================================================

/// Schedules a single delivery after `delay`.
///
/// Without a target the message goes to the bus: it is delivered to the
/// scheduling actor wrapped for redelivery, so it fans out from there.
pub fn schedule_once<M>(
    env: &ActorEnv,
    target: Option<&ActorRef>,
    message: M,
    delay: Duration,
    from: Option<ActorRef>,
) -> Cancellable
where
    M: Typed + Clone + Sync,
{
    arm(env, target, MessageFactory::of(message), delay, None, from)
}

/// Schedules repeated deliveries, the first after `delay` and then every `period`.
pub fn schedule_periodic<M>(
    env: &ActorEnv,
    target: Option<&ActorRef>,
    message: M,
    delay: Duration,
    period: Duration,
    from: Option<ActorRef>,
) -> Cancellable
where
    M: Typed + Clone + Sync,
{
    arm(env, target, MessageFactory::of(message), delay, Some(period), from)
}

fn arm(
    env: &ActorEnv,
    target: Option<&ActorRef>,
    factory: MessageFactory,
    delay: Duration,
    period: Option<Duration>,
    from: Option<ActorRef>,
) -> Cancellable {
    let (target, payload) = match target {
        Some(target) => (target.clone(), ScheduledPayload::Direct(factory)),
        None => (env.myself.clone(), ScheduledPayload::Publish(factory)),
    };
    env.runtime.schedule(ScheduledDelivery {
        target,
        payload,
        sender: from,
        delay,
        period,
    })
}

/// Fluent form of [`schedule_once`] and [`schedule_periodic`].
#[must_use = "a schedule does nothing until `go` is called"]
pub struct ScheduleBuilder<'e, M> {
    env: &'e ActorEnv,
    message: M,
    target: Option<ActorRef>,
    sender: Option<ActorRef>,
    delay: Duration,
    period: Option<Duration>,
}

impl<'e, M> ScheduleBuilder<'e, M>
where
    M: Typed + Clone + Sync,
{
    pub(crate) fn new(env: &'e ActorEnv, message: M) -> Self {
        Self {
            env,
            message,
            target: None,
            sender: Some(env.myself.clone()),
            delay: Duration::ZERO,
            period: None,
        }
    }

    pub fn to(mut self, target: &ActorRef) -> Self {
        self.target = Some(target.clone());
        self
    }

    pub fn to_self(mut self) -> Self {
        self.target = Some(self.env.myself.clone());
        self
    }

    /// Sender seen by the recipient. Defaults to the scheduling actor.
    pub fn from(mut self, sender: Option<&ActorRef>) -> Self {
        self.sender = sender.cloned();
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Makes the delivery repeat every `period`.
    pub fn period(mut self, period: Duration) -> Self {
        self.period = Some(period);
        self
    }

    pub fn go(self) -> Cancellable {
        arm(
            self.env,
            self.target.as_ref(),
            MessageFactory::of(self.message),
            self.delay,
            self.period,
            self.sender,
        )
    }
}
