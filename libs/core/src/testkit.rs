//! Fixtures shared by the unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::actor_ref::{ActorRef, Mailbox};
use crate::behavior::{Behavior, ClassBuilder};
use crate::context::{ActorEnv, Context};
use crate::error::{SendError, SpawnError};
use crate::failure::Failure;
use crate::id::ActorId;
use crate::message::{BoxedMessage, Incoming, MessageFactory, Terminated, TimeoutNotice};
use crate::runtime::{Runtime, ScheduledDelivery, ScheduledPayload, Spawn};
use crate::scheduler::Cancellable;
use crate::supervision::Directive;
use crate::typed;
use crate::typing::TypeKey;

// =============================================================================
// Message hierarchy
// =============================================================================

#[derive(Debug, Clone)]
pub struct Animal {
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Dog {
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Puppy {
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Cat {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rock;

typed!(Animal, Rock);
typed!(Dog: Animal);
typed!(Puppy: Dog);
typed!(Cat: Animal);

impl From<Dog> for Animal {
    fn from(dog: Dog) -> Self {
        Animal { name: dog.name }
    }
}

impl From<Puppy> for Dog {
    fn from(puppy: Puppy) -> Self {
        Dog { name: puppy.name }
    }
}

impl From<Cat> for Animal {
    fn from(cat: Cat) -> Self {
        Animal { name: cat.name }
    }
}

// =============================================================================
// Error hierarchy
// =============================================================================

#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("timed out")]
    Timeout,
}

#[derive(Debug, Error, Clone)]
#[error("not found: {0}")]
pub struct NotFound(pub String);

#[derive(Debug, Error, Clone)]
#[error("timed out")]
pub struct Timeout;

typed!(StoreError);
typed!(NotFound: StoreError);
typed!(Timeout: StoreError);

impl From<NotFound> for StoreError {
    fn from(e: NotFound) -> Self {
        StoreError::NotFound(e.0)
    }
}

impl From<Timeout> for StoreError {
    fn from(_: Timeout) -> Self {
        StoreError::Timeout
    }
}

// =============================================================================
// Behaviors
// =============================================================================

/// Handles `Animal` and `Dog`, declared supertype first.
#[derive(Debug, Default)]
pub struct Zoo {
    pub seen: Vec<String>,
    pub unhandled: usize,
}

impl Behavior for Zoo {
    fn declare(class: &mut ClassBuilder<Self>) {
        class
            .handle(|zoo: &mut Zoo, animal: Animal, _| {
                zoo.seen.push(format!("animal:{}", animal.name));
                Ok(())
            })
            .handle(|zoo: &mut Zoo, dog: Dog, _| {
                zoo.seen.push(format!("dog:{}", dog.name));
                Ok(())
            });
    }

    fn unhandled(&mut self, _message: BoxedMessage, _ctx: &mut Context<'_, Self>) {
        self.unhandled += 1;
    }
}

/// Exception handlers of increasing breadth.
#[derive(Debug, Default)]
pub struct Strict;

impl Behavior for Strict {
    fn declare(class: &mut ClassBuilder<Self>) {
        class
            .on_any_error(|_, _| Directive::Escalate)
            .on_error::<StoreError, _>(|_, _| Directive::Restart)
            .on_error::<NotFound, _>(|_, _| Directive::Resume);
    }
}

/// An exception handler that panics on `NotFound`.
#[derive(Debug, Default)]
pub struct Brittle;

impl Behavior for Brittle {
    fn declare(class: &mut ClassBuilder<Self>) {
        class
            .on_any_error(|_, _| Directive::Resume)
            .on_error::<NotFound, _>(|_, failure| panic!("cannot decide {failure}"));
    }
}

/// Declares the same handler twice.
#[derive(Debug, Default)]
pub struct Broken;

impl Behavior for Broken {
    fn declare(class: &mut ClassBuilder<Self>) {
        class
            .handle(|_, _: Rock, _| Ok(()))
            .handle(|_, _: Rock, _| Ok(()));
    }
}

#[derive(Debug, Default)]
pub struct Panicky;

impl Behavior for Panicky {
    fn declare(class: &mut ClassBuilder<Self>) {
        class.handle(|_, _: Rock, _| -> Result<(), Failure> { panic!("kaboom") });
    }
}

#[derive(Debug, Clone)]
pub struct Ask(pub ActorRef);

#[derive(Debug, Clone)]
pub struct Question;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer(pub u32);

typed!(Ask, Question, Answer);

/// Requests answers and records what comes back.
#[derive(Debug, Default)]
pub struct Asker {
    pub answers: Vec<u32>,
    pub timeouts: Vec<Option<String>>,
    pub terminated: Vec<ActorRef>,
}

impl Behavior for Asker {
    fn declare(class: &mut ClassBuilder<Self>) {
        class
            .handle(|_, ask: Ask, ctx| {
                ctx.msg(Question)
                    .to(&ask.0)
                    .timeout(std::time::Duration::from_secs(1))
                    .request::<Answer>("ask")
            })
            .handle(|_, _: Question, ctx| ctx.msg(Answer(42)).reply_to_sender().fire_and_forget())
            .handle(|asker: &mut Asker, answer: Answer, _| {
                asker.answers.push(answer.0);
                Ok(())
            })
            .handle(|asker: &mut Asker, notice: TimeoutNotice, _| {
                asker.timeouts.push(notice.info.label().map(String::from));
                Ok(())
            })
            .handle(|asker: &mut Asker, terminated: Terminated, _| {
                asker.terminated.push(terminated.actor);
                Ok(())
            });
    }
}

/// Shared record of lifecycle hook calls.
#[derive(Debug, Clone, Default)]
pub struct HookLog {
    entries: Arc<Mutex<Vec<String>>>,
    instances: Arc<AtomicUsize>,
    fail_pre_start: Arc<AtomicBool>,
}

impl HookLog {
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    pub fn fail_pre_start(&self) {
        self.fail_pre_start.store(true, Ordering::SeqCst);
    }

    fn push(&self, entry: String) {
        self.entries.lock().unwrap().push(entry);
    }
}

#[derive(Debug)]
pub struct Hooked {
    id: usize,
    log: HookLog,
}

impl Hooked {
    pub fn new(log: HookLog) -> Self {
        let id = log.instances.fetch_add(1, Ordering::SeqCst) + 1;
        Self { id, log }
    }
}

impl Behavior for Hooked {
    fn declare(class: &mut ClassBuilder<Self>) {
        class
            .handle(|_, _: Rock, _| Ok(()))
            .pre_start(|h: &mut Hooked, _| {
                if h.log.fail_pre_start.load(Ordering::SeqCst) {
                    return Err(Failure::msg("refusing to start"));
                }
                h.log.push(format!("pre_start:{}", h.id));
                Ok(())
            })
            .pre_restart(|h: &mut Hooked, failure, _| {
                h.log.push(format!("pre_restart:{}:{}", h.id, failure.error()));
                Ok(())
            })
            .post_restart(|h: &mut Hooked, failure, _| {
                h.log.push(format!("post_restart:{}:{}", h.id, failure.error()));
                Ok(())
            })
            .post_stop(|h: &mut Hooked, _| {
                h.log.push(format!("post_stop:{}", h.id));
                Ok(())
            });
    }
}

// =============================================================================
// Recording runtime
// =============================================================================

/// Mailbox that keeps everything delivered to it.
#[derive(Default)]
pub struct RecordingMailbox {
    received: Mutex<Vec<Incoming>>,
    closed: AtomicBool,
}

impl RecordingMailbox {
    pub fn take(&self) -> Vec<Incoming> {
        std::mem::take(&mut *self.received.lock().unwrap())
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl Mailbox for RecordingMailbox {
    fn deliver(&self, incoming: Incoming) -> Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::ActorStopped {
                actor: "recording".to_string(),
            });
        }
        self.received.lock().unwrap().push(incoming);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub fn recording_ref(path: &str) -> (ActorRef, Arc<RecordingMailbox>) {
    let mailbox = Arc::new(RecordingMailbox::default());
    let actor = ActorRef::new(ActorId::new(), path, mailbox.clone());
    (actor, mailbox)
}

/// Runtime that records every request instead of acting on it.
#[derive(Default)]
pub struct RecordingRuntime {
    spawned: Mutex<Vec<(String, Option<ActorRef>, bool)>>,
    published: Mutex<Vec<TypeKey>>,
    subscriptions: Mutex<Vec<(ActorRef, TypeKey)>>,
    scheduled: Mutex<Vec<(ScheduledDelivery, Cancellable)>>,
}

impl RecordingRuntime {
    /// (name, parent, has initial message) per spawn.
    pub fn spawned(&self) -> Vec<(String, Option<ActorRef>, bool)> {
        self.spawned.lock().unwrap().clone()
    }

    pub fn published(&self) -> Vec<TypeKey> {
        self.published.lock().unwrap().clone()
    }

    pub fn subscriptions(&self) -> Vec<(ActorRef, TypeKey)> {
        self.subscriptions.lock().unwrap().clone()
    }

    pub fn scheduled(&self) -> Vec<(ScheduledDelivery, Cancellable)> {
        self.scheduled.lock().unwrap().clone()
    }

    /// The timeout notice carried by the `index`-th scheduled delivery.
    pub fn scheduled_notice(&self, index: usize) -> TimeoutNotice {
        let scheduled = self.scheduled();
        match &scheduled[index].0.payload {
            ScheduledPayload::Direct(factory) => factory.make().downcast::<TimeoutNotice>().unwrap(),
            other => panic!("not a direct delivery: {other:?}"),
        }
    }
}

impl Runtime for RecordingRuntime {
    fn spawn(&self, spawn: Spawn) -> Result<ActorRef, SpawnError> {
        let (actor, _) = recording_ref(&format!("/user/{}", spawn.name));
        self.spawned
            .lock()
            .unwrap()
            .push((spawn.name, spawn.parent, spawn.initial.is_some()));
        Ok(actor)
    }

    fn publish(&self, message: MessageFactory) {
        self.published.lock().unwrap().push(message.key());
    }

    fn subscribe(&self, subscriber: &ActorRef, key: TypeKey) {
        self.subscriptions
            .lock()
            .unwrap()
            .push((subscriber.clone(), key));
    }

    fn watch(&self, _watcher: &ActorRef, _target: &ActorRef) {}

    fn stop(&self, _target: &ActorRef) {}

    fn kill(&self, _target: &ActorRef) {}

    fn schedule(&self, delivery: ScheduledDelivery) -> Cancellable {
        let handle = Cancellable::new();
        self.scheduled
            .lock()
            .unwrap()
            .push((delivery, handle.clone()));
        handle
    }
}

pub fn recording_env(path: &str) -> (Arc<RecordingRuntime>, ActorEnv) {
    let runtime = Arc::new(RecordingRuntime::default());
    let (myself, _) = recording_ref(path);
    let env = ActorEnv::new(runtime.clone(), myself);
    (runtime, env)
}
