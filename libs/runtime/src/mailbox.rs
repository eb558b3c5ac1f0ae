//! Per-actor mailboxes.

use std::sync::Arc;

use stagehand_core::{ActorId, ActorRef, Directive, Failure, Incoming, Mailbox, SendError};
use tokio::sync::{mpsc, oneshot};

/// Control messages, processed ahead of user messages.
#[derive(Debug)]
pub(crate) enum SystemMessage {
    /// A child failed and waits for `reply`.
    ChildFailed {
        child: ActorRef,
        failure: Failure,
        reply: oneshot::Sender<Directive>,
    },
    /// Restart because a sibling failed under an all-for-one policy.
    Restart(Failure),
    Stop,
    Kill,
    /// A watched actor stopped.
    Terminated(ActorRef),
    /// A child finished stopping.
    ChildStopped(ActorId),
}

pub(crate) type SystemSender = mpsc::UnboundedSender<SystemMessage>;
pub(crate) type SystemReceiver = mpsc::UnboundedReceiver<SystemMessage>;

/// Delivery side of an actor's two channels.
pub(crate) struct ActorMailbox {
    path: Arc<str>,
    system: SystemSender,
    user: mpsc::Sender<Incoming>,
}

impl ActorMailbox {
    pub(crate) fn new(path: Arc<str>, system: SystemSender, user: mpsc::Sender<Incoming>) -> Self {
        Self { path, system, user }
    }
}

impl Mailbox for ActorMailbox {
    fn deliver(&self, incoming: Incoming) -> Result<(), SendError> {
        let stopped = || SendError::ActorStopped {
            actor: self.path.to_string(),
        };

        if let Incoming::Terminated(actor) = incoming {
            if self.user.is_closed() {
                return Err(stopped());
            }
            return self
                .system
                .send(SystemMessage::Terminated(actor))
                .map_err(|_| stopped());
        }

        self.user.try_send(incoming).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::MailboxFull {
                actor: self.path.to_string(),
            },
            mpsc::error::TrySendError::Closed(_) => stopped(),
        })
    }

    fn is_closed(&self) -> bool {
        self.user.is_closed()
    }
}
