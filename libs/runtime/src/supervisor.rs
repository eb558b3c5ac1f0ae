//! Restart accounting and failure logging.

use std::time::Duration;

use stagehand_core::{ActorRef, Directive, Failure, FailureCategory};
use tokio::time::Instant;
use tracing::{error, warn};

/// Restart timestamps of one child within the policy window.
#[derive(Debug, Clone, Default)]
pub struct RestartStats {
    timestamps: Vec<Instant>,
}

impl RestartStats {
    /// Records a restart at `now` if the budget allows it.
    ///
    /// Returns false when `max_retries` restarts already happened within
    /// `window`. `None` means unbounded and records nothing.
    pub fn request_restart(&mut self, max_retries: Option<u32>, window: Duration, now: Instant) -> bool {
        let Some(max) = max_retries else {
            self.timestamps.clear();
            return true;
        };

        // Prune old timestamps outside the window
        self.timestamps
            .retain(|t| now.saturating_duration_since(*t) < window);

        if self.timestamps.len() >= max as usize {
            return false;
        }
        self.timestamps.push(now);
        true
    }

    /// Restarts counted within the current window.
    pub fn count(&self) -> usize {
        self.timestamps.len()
    }
}

/// Logs a supervised failure and the directive chosen for it.
pub(crate) fn log_failure(child: &ActorRef, failure: &Failure, directive: Directive) {
    match failure.category() {
        FailureCategory::Severe | FailureCategory::Initialization => error!(
            actor = %child,
            category = %failure.category(),
            error = %failure.error(),
            directive = %directive,
            "Actor failed"
        ),
        _ => warn!(
            actor = %child,
            category = %failure.category(),
            error = %failure.error(),
            directive = %directive,
            "Actor failed"
        ),
    }
}
