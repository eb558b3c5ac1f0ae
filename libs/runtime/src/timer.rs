//! Tokio timers behind [`Cancellable`] handles.

use std::time::Duration;

use stagehand_core::{Cancellable, ScheduledDelivery, SendError};
use tokio::runtime::Handle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, warn};

const MIN_PERIOD: Duration = Duration::from_millis(1);
const FIRST_RETRY: Duration = Duration::from_millis(5);
const MAX_RETRY: Duration = Duration::from_millis(100);

/// Arms `delivery` on `handle`. Cancelling the handle aborts the timer task.
pub(crate) fn arm(handle: &Handle, delivery: ScheduledDelivery) -> Cancellable {
    let cancellable = Cancellable::new();
    let token = cancellable.clone();

    let task = handle.spawn(async move {
        sleep(delivery.delay).await;

        let Some(period) = delivery.period else {
            if token.try_fire_once() {
                fire_once(&delivery).await;
            }
            return;
        };

        let period = if period.is_zero() {
            warn!(target = %delivery.target, "Zero period, using {:?}", MIN_PERIOD);
            MIN_PERIOD
        } else {
            period
        };

        let mut ticker = interval_at(Instant::now(), period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if token.is_cancelled() {
                break;
            }
            match fire(&delivery) {
                Fired::Delivered => {}
                Fired::Full => {
                    warn!(target = %delivery.target, "Mailbox full, dropping scheduled message");
                }
                Fired::Stopped => {
                    token.finish();
                    break;
                }
            }
        }
    });

    let abort = task.abort_handle();
    cancellable.set_cancel_hook(move || abort.abort());
    cancellable
}

enum Fired {
    Delivered,
    Full,
    Stopped,
}

fn fire(delivery: &ScheduledDelivery) -> Fired {
    let incoming = delivery.payload.incoming(delivery.sender.as_ref());
    match delivery.target.deliver(incoming) {
        Ok(()) => Fired::Delivered,
        Err(SendError::MailboxFull { .. }) => Fired::Full,
        Err(e) => {
            debug!(target = %delivery.target, error = %e, "Scheduled target stopped");
            Fired::Stopped
        }
    }
}

/// A one-shot delivery may carry a request timeout, so it waits for room
/// instead of being dropped.
async fn fire_once(delivery: &ScheduledDelivery) {
    let mut backoff = FIRST_RETRY;
    let mut warned = false;
    while let Fired::Full = fire(delivery) {
        if !warned {
            warn!(target = %delivery.target, "Mailbox full, retrying scheduled message");
            warned = true;
        }
        sleep(backoff).await;
        backoff = (backoff * 2).min(MAX_RETRY);
    }
}
