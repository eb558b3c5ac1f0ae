//! Request/reply correlation.
//!
//! Each actor instance owns one [`Correlator`]. A request registers the awaited
//! response type and arms a timeout notice to self. Whichever arrives first wins:
//! a response cancels the timer before its handler runs, and a notice that was
//! superseded or already resolved is discarded on arrival.

use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;

use crate::context::Context;
use crate::error::ConfigError;
use crate::failure::Failure;
use crate::message::{RequestInfo, TimeoutNotice};
use crate::scheduler::Cancellable;
use crate::typing::TypeKey;

/// Timeout applied to requests that set none.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Default wait of a [`Timeouter`].
pub const DEFAULT_TIMEOUTER_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug)]
struct PendingRequest {
    handle: Cancellable,
    generation: u64,
    info: RequestInfo,
}

/// In-flight requests of one actor instance, keyed by response type.
#[derive(Debug, Default)]
pub struct Correlator {
    pending: HashMap<TypeKey, PendingRequest>,
    next_generation: u64,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a request awaiting `response`.
    ///
    /// `arm` schedules the given notice and returns its handle. A pending
    /// request for the same response type is cancelled and superseded.
    pub fn register<F>(&mut self, response: TypeKey, info: RequestInfo, arm: F)
    where
        F: FnOnce(TimeoutNotice) -> Cancellable,
    {
        self.next_generation += 1;
        let generation = self.next_generation;

        if let Some(previous) = self.pending.remove(&response) {
            previous.handle.cancel();
            debug!(
                response = %response,
                superseded = ?previous.info,
                "Superseded pending request"
            );
        }

        let handle = arm(TimeoutNotice {
            info: info.clone(),
            response: Some(response),
            generation,
        });
        self.pending.insert(
            response,
            PendingRequest {
                handle,
                generation,
                info,
            },
        );
    }

    /// Settles the request awaiting a message of concrete type `arrived`.
    ///
    /// Returns true if a request was pending; its timer is cancelled.
    pub fn resolve(&mut self, arrived: &TypeKey) -> bool {
        match self.pending.remove(arrived) {
            Some(pending) => {
                pending.handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Accepts a timeout notice if it is still the live one for its request.
    ///
    /// Notices not tied to a request are always accepted.
    pub fn accept_timeout(&mut self, notice: &TimeoutNotice) -> bool {
        let Some(response) = notice.response else {
            return true;
        };
        match self.pending.get(&response) {
            Some(pending) if pending.generation == notice.generation => {
                self.pending.remove(&response);
                true
            }
            _ => false,
        }
    }

    /// Cancels every pending timer.
    pub fn cancel_all(&mut self) {
        for (_, pending) in self.pending.drain() {
            pending.handle.cancel();
        }
    }

    pub fn is_pending(&self, response: &TypeKey) -> bool {
        self.pending.contains_key(response)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// A single restartable timeout.
///
/// Starting it again cancels the previous wait. On expiry the owning actor
/// receives a [`TimeoutNotice`] whose `response` is `None`.
#[derive(Debug)]
pub struct Timeouter {
    wait: Duration,
    info: RequestInfo,
    handle: Option<Cancellable>,
}

impl Default for Timeouter {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUTER_WAIT)
    }
}

impl Timeouter {
    pub fn new(wait: Duration) -> Self {
        Self {
            wait,
            info: RequestInfo::none(),
            handle: None,
        }
    }

    /// Info carried by the notices.
    pub fn with_info(mut self, info: impl Into<RequestInfo>) -> Self {
        self.info = info.into();
        self
    }

    pub fn wait(&self) -> Duration {
        self.wait
    }

    /// Starts or restarts the wait.
    pub fn start<A: 'static>(&mut self, ctx: &mut Context<'_, A>) -> Result<(), Failure> {
        if !ctx.handles::<TimeoutNotice>() {
            return Err(ConfigError::MissingTimeoutHandler.into());
        }
        self.cancel();
        let myself = ctx.myself().clone();
        self.handle = Some(ctx.schedule_once(
            Some(&myself),
            TimeoutNotice::standalone(self.info.clone()),
            self.wait,
        ));
        Ok(())
    }

    /// Cancels the running wait. Returns false if nothing was pending.
    pub fn cancel(&mut self) -> bool {
        self.handle.take().is_some_and(|h| h.cancel())
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(Cancellable::is_live)
    }
}
