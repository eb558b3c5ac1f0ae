//! The task that runs one actor.
//!
//! System messages are always drained before user messages. A failure
//! suspends the actor until its parent (or the guardian, for top-level actors)
//! answers with a directive.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use stagehand_core::{
    ActorEnv, ActorId, ActorRef, Cell, Directive, Failure, Incoming, StrategyKind,
};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::mailbox::{SystemMessage, SystemReceiver, SystemSender};
use crate::supervisor::{log_failure, RestartStats};
use crate::system::SystemInner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

enum Next {
    System(SystemMessage),
    User(Option<Incoming>),
}

pub(crate) struct ActorLoop {
    cell: Box<dyn Cell>,
    env: ActorEnv,
    system: Arc<SystemInner>,
    parent: Option<SystemSender>,
    system_rx: SystemReceiver,
    user_rx: mpsc::Receiver<Incoming>,
    restarts: HashMap<ActorId, RestartStats>,
    deferred: VecDeque<SystemMessage>,
    messages_processed: u64,
}

impl ActorLoop {
    pub(crate) fn new(
        cell: Box<dyn Cell>,
        env: ActorEnv,
        system: Arc<SystemInner>,
        parent: Option<SystemSender>,
        system_rx: SystemReceiver,
        user_rx: mpsc::Receiver<Incoming>,
    ) -> Self {
        Self {
            cell,
            env,
            system,
            parent,
            system_rx,
            user_rx,
            restarts: HashMap::new(),
            deferred: VecDeque::new(),
            messages_processed: 0,
        }
    }

    pub(crate) fn actor_type(&self) -> &'static str {
        self.cell.actor_type()
    }

    pub(crate) async fn run(mut self) {
        let mut flow = match self.cell.on_start(&self.env) {
            Ok(()) => Flow::Continue,
            Err(failure) => {
                debug!(actor = %self.env.myself, error = %failure, "Actor failed to start");
                self.fail(failure).await
            }
        };

        while flow == Flow::Continue {
            if let Some(message) = self.deferred.pop_front() {
                flow = self.handle_system(message).await;
                continue;
            }

            let next = tokio::select! {
                biased;

                // System messages first
                Some(message) = self.system_rx.recv() => Next::System(message),

                incoming = self.user_rx.recv() => Next::User(incoming),
            };

            flow = match next {
                Next::System(message) => self.handle_system(message).await,
                Next::User(Some(incoming)) => self.handle_incoming(incoming).await,
                Next::User(None) => {
                    debug!(actor = %self.env.myself, "Mailbox closed");
                    Flow::Stop
                }
            };
        }

        self.finish().await;
    }

    async fn handle_incoming(&mut self, incoming: Incoming) -> Flow {
        self.messages_processed += 1;
        match self.cell.on_message(&self.env, incoming) {
            Ok(()) => Flow::Continue,
            Err(failure) => {
                debug!(actor = %self.env.myself, error = %failure, "Handler failed");
                self.fail(failure).await
            }
        }
    }

    async fn handle_system(&mut self, message: SystemMessage) -> Flow {
        match message {
            SystemMessage::ChildFailed {
                child,
                failure,
                reply,
            } => self.supervise(child, failure, reply).await,
            SystemMessage::Restart(failure) => match self.restart_instance(&failure).await {
                Ok(()) => Flow::Continue,
                Err(next) => self.fail(next).await,
            },
            SystemMessage::Stop => Flow::Stop,
            SystemMessage::Kill => self.fail(Failure::killed()).await,
            SystemMessage::Terminated(actor) => {
                self.handle_incoming(Incoming::Terminated(actor)).await
            }
            SystemMessage::ChildStopped(id) => {
                self.restarts.remove(&id);
                Flow::Continue
            }
        }
    }

    /// Suspends until the supervisor decides, then applies the directive.
    async fn fail(&mut self, failure: Failure) -> Flow {
        let mut failure = failure;
        loop {
            match self.request_directive(&failure).await {
                Directive::Resume => return Flow::Continue,
                Directive::Restart => match self.restart_instance(&failure).await {
                    Ok(()) => return Flow::Continue,
                    Err(next) => failure = next,
                },
                Directive::Stop | Directive::Escalate => return Flow::Stop,
            }
        }
    }

    async fn request_directive(&mut self, failure: &Failure) -> Directive {
        let Some(parent) = &self.parent else {
            return self.system.guardian_directive(&self.env.myself, failure);
        };

        let (reply, directive) = oneshot::channel();
        let report = SystemMessage::ChildFailed {
            child: self.env.myself.clone(),
            failure: failure.clone(),
            reply,
        };
        if parent.send(report).is_err() {
            return Directive::Stop;
        }
        // A supervisor that stops without answering stops us too.
        directive.await.unwrap_or(Directive::Stop)
    }

    async fn restart_instance(&mut self, failure: &Failure) -> Result<(), Failure> {
        self.stop_children().await;
        self.cell.on_restart(&self.env, failure)
    }

    /// Answers a failed child.
    async fn supervise(
        &mut self,
        child: ActorRef,
        failure: Failure,
        reply: oneshot::Sender<Directive>,
    ) -> Flow {
        let policy = self.cell.policy().clone();
        let mut directive = self.cell.on_failure(&failure);

        if directive == Directive::Restart {
            let allowed = self.restarts.entry(child.id()).or_default().request_restart(
                policy.max_retries,
                policy.window,
                Instant::now(),
            );
            if !allowed {
                warn!(actor = %self.env.myself, child = %child, "Restart limit reached, stopping child");
                directive = Directive::Stop;
            }
        }

        if policy.logging_enabled {
            log_failure(&child, &failure, directive);
        }

        if directive == Directive::Escalate {
            let _ = reply.send(Directive::Stop);
            return self.fail(failure).await;
        }
        let _ = reply.send(directive);

        if policy.kind == StrategyKind::AllForOne
            && matches!(directive, Directive::Restart | Directive::Stop)
        {
            for (id, sibling) in self.system.children_of(self.env.myself.id()) {
                if id == child.id() {
                    continue;
                }
                let message = match directive {
                    Directive::Restart => SystemMessage::Restart(failure.clone()),
                    _ => SystemMessage::Stop,
                };
                let _ = sibling.send(message);
            }
        }
        Flow::Continue
    }

    /// Stops every child and waits for them, up to the shutdown grace.
    async fn stop_children(&mut self) {
        let children = self.system.children_of(self.env.myself.id());
        if children.is_empty() {
            return;
        }

        let mut remaining: HashSet<ActorId> = children.iter().map(|(id, _)| *id).collect();
        for (_, child) in &children {
            let _ = child.send(SystemMessage::Stop);
        }

        let deadline = Instant::now() + self.system.shutdown_grace();
        while !remaining.is_empty() {
            let next = match timeout_at(deadline, self.system_rx.recv()).await {
                Ok(next) => next,
                Err(_) => {
                    warn!(
                        actor = %self.env.myself,
                        remaining = remaining.len(),
                        "Children did not stop in time"
                    );
                    break;
                }
            };
            match next {
                Some(SystemMessage::ChildStopped(id)) => {
                    remaining.remove(&id);
                    self.restarts.remove(&id);
                }
                Some(SystemMessage::ChildFailed { reply, .. }) => {
                    let _ = reply.send(Directive::Stop);
                }
                Some(other) => self.deferred.push_back(other),
                None => break,
            }
        }
    }

    async fn finish(&mut self) {
        self.stop_children().await;
        self.cell.on_stop(&self.env);

        self.user_rx.close();
        let mut dropped = 0usize;
        while self.user_rx.try_recv().is_ok() {
            dropped += 1;
        }

        let myself = self.env.myself.clone();
        for watcher in self.system.unregister(&myself) {
            let _ = watcher.deliver(Incoming::Terminated(myself.clone()));
        }
        if let Some(parent) = &self.parent {
            let _ = parent.send(SystemMessage::ChildStopped(myself.id()));
        }

        info!(
            actor = %myself,
            actor_type = self.cell.actor_type(),
            messages_processed = self.messages_processed,
            dropped,
            "Actor stopped"
        );
    }
}
