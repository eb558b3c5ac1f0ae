//! Test helpers for stagehand actors.
//!
//! [`TestProbe`] is an [`ActorRef`] backed by a channel the test reads from,
//! so tests can stand in for any actor: send from it, watch with it, subscribe
//! it to the bus, and assert on what arrives.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use stagehand_core::{
    ActorId, ActorRef, BoxedMessage, Incoming, Mailbox, SendError, Terminated, TypeKey, Typed,
};
use tokio::sync::mpsc;
use tokio::time::{timeout, timeout_at, Instant};
use tracing_subscriber::EnvFilter;

/// Installs a subscriber that writes through the test harness.
///
/// Respects `RUST_LOG`; safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// A message received by a probe.
#[derive(Debug)]
pub struct Received {
    pub message: BoxedMessage,
    pub sender: Option<ActorRef>,
    /// When it reached the probe's mailbox.
    pub at: Instant,
}

impl Received {
    pub fn key(&self) -> TypeKey {
        self.message.type_key()
    }

    pub fn is<M: Typed>(&self) -> bool {
        self.message.is::<M>()
    }

    pub fn downcast_ref<M: Typed>(&self) -> Option<&M> {
        self.message.downcast_ref::<M>()
    }

    pub fn downcast<M: Typed>(self) -> Option<M> {
        self.message.downcast::<M>().ok()
    }
}

struct ProbeMailbox {
    path: String,
    tx: mpsc::UnboundedSender<Received>,
    closed: AtomicBool,
}

impl Mailbox for ProbeMailbox {
    fn deliver(&self, incoming: Incoming) -> Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::ActorStopped {
                actor: self.path.clone(),
            });
        }
        let (message, sender): (BoxedMessage, _) = match incoming {
            Incoming::Message(envelope) => (envelope.message, envelope.sender),
            Incoming::Publish(factory) => (factory.make(), None),
            Incoming::Terminated(actor) => (Box::new(Terminated { actor }), None),
        };
        self.tx
            .send(Received {
                message,
                sender,
                at: Instant::now(),
            })
            .map_err(|_| SendError::ActorStopped {
                actor: self.path.clone(),
            })
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.tx.is_closed()
    }
}

/// A stand-in actor that records what it receives.
pub struct TestProbe {
    actor: ActorRef,
    mailbox: Arc<ProbeMailbox>,
    rx: mpsc::UnboundedReceiver<Received>,
}

impl TestProbe {
    /// Creates a probe at `/probe/{name}`.
    pub fn new(name: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let path = format!("/probe/{name}");
        let mailbox = Arc::new(ProbeMailbox {
            path: path.clone(),
            tx,
            closed: AtomicBool::new(false),
        });
        let actor = ActorRef::new(ActorId::new(), path, mailbox.clone());
        Self { actor, mailbox, rx }
    }

    pub fn actor_ref(&self) -> &ActorRef {
        &self.actor
    }

    /// Makes further deliveries fail as if the actor had stopped.
    pub fn close(&self) {
        self.mailbox.closed.store(true, Ordering::Release);
    }

    /// Sends `message` with this probe as the sender.
    pub fn send<M: Typed>(&self, target: &ActorRef, message: M) -> Result<(), SendError> {
        target.tell(message, Some(&self.actor))
    }

    pub fn try_receive(&mut self) -> Option<Received> {
        self.rx.try_recv().ok()
    }

    /// Takes the next queued message if it is an `M`.
    pub fn try_expect_msg<M: Typed>(&mut self) -> Option<M> {
        self.try_receive().and_then(Received::downcast)
    }

    /// Waits up to `within` for the next message.
    pub async fn receive(&mut self, within: Duration) -> Option<Received> {
        timeout(within, self.rx.recv()).await.ok().flatten()
    }

    /// Waits for the next message and asserts it is an `M`.
    ///
    /// # Panics
    ///
    /// If nothing arrives within `within` or the message has another type.
    pub async fn expect_msg<M: Typed>(&mut self, within: Duration) -> M {
        self.expect_msg_with_sender::<M>(within).await.0
    }

    /// Like [`expect_msg`](Self::expect_msg), also returning the sender.
    pub async fn expect_msg_with_sender<M: Typed>(
        &mut self,
        within: Duration,
    ) -> (M, Option<ActorRef>) {
        let path = self.actor.path().to_string();
        let Some(received) = self.receive(within).await else {
            panic!(
                "{path}: expected {} within {within:?}, got nothing",
                std::any::type_name::<M>()
            );
        };
        let key = received.key();
        let sender = received.sender.clone();
        match received.downcast::<M>() {
            Some(message) => (message, sender),
            None => panic!(
                "{path}: expected {}, got {key}",
                std::any::type_name::<M>()
            ),
        }
    }

    /// Waits for `n` messages, all within `within`.
    ///
    /// # Panics
    ///
    /// If fewer than `n` arrive in time.
    pub async fn receive_n(&mut self, n: usize, within: Duration) -> Vec<Received> {
        let deadline = Instant::now() + within;
        let mut received = Vec::with_capacity(n);
        while received.len() < n {
            match timeout_at(deadline, self.rx.recv()).await {
                Ok(Some(message)) => received.push(message),
                _ => panic!(
                    "{}: expected {n} messages within {within:?}, got {}",
                    self.actor.path(),
                    received.len()
                ),
            }
        }
        received
    }

    /// Asserts that nothing arrives for `within`.
    ///
    /// # Panics
    ///
    /// If a message arrives.
    pub async fn expect_no_msg(&mut self, within: Duration) {
        if let Some(received) = self.receive(within).await {
            panic!(
                "{}: expected no message, got {}",
                self.actor.path(),
                received.key()
            );
        }
    }

    /// Waits for a termination notice and returns the stopped actor.
    ///
    /// # Panics
    ///
    /// If the next message is not a termination notice.
    pub async fn expect_terminated(&mut self, within: Duration) -> ActorRef {
        self.expect_msg::<Terminated>(within).await.actor
    }
}

impl std::fmt::Debug for TestProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TestProbe").field(&self.actor).finish()
    }
}
