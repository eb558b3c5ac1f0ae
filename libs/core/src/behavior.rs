//! Declaring an actor type.
//!
//! An actor type implements [`Behavior`] and registers everything the control
//! plane needs to know about it in [`Behavior::declare`]: message handlers,
//! exception handlers, a supervision policy, and lifecycle hooks. Declaration
//! runs once per type; the result is cached and shared by every instance.

use std::collections::HashSet;

use tracing::warn;

use crate::context::Context;
use crate::dispatch::{HandlerEntry, HandlerFn, HandlerTable};
use crate::error::ConfigError;
use crate::failure::Failure;
use crate::lifecycle::LifecycleHooks;
use crate::message::BoxedMessage;
use crate::supervision::{Directive, ExceptionEntry, ExceptionTable, SupervisionPolicy};
use crate::typing::{AnyBox, TypeKey, Typed};

/// A user-defined actor.
pub trait Behavior: Sized + Send + 'static {
    /// Registers handlers, policy, and hooks for this type.
    fn declare(class: &mut ClassBuilder<Self>);

    /// Called for messages no handler accepts. Logs and drops by default.
    fn unhandled(&mut self, message: BoxedMessage, ctx: &mut Context<'_, Self>) {
        warn!(
            actor = %ctx.myself(),
            message = %message.type_key(),
            "Unhandled message"
        );
    }
}

/// Collects one actor type's declarations.
pub struct ClassBuilder<A> {
    handlers: Vec<HandlerEntry<A>>,
    exceptions: Vec<ExceptionEntry<A>>,
    policy: Option<SupervisionPolicy>,
    hooks: LifecycleHooks<A>,
    errors: Vec<ConfigError>,
}

impl<A: 'static> ClassBuilder<A> {
    pub(crate) fn new() -> Self {
        Self {
            handlers: Vec::new(),
            exceptions: Vec::new(),
            policy: None,
            hooks: LifecycleHooks::default(),
            errors: Vec::new(),
        }
    }

    /// Handles messages of type `M` and its declared subtypes.
    pub fn handle<M, F>(&mut self, handler: F) -> &mut Self
    where
        M: Typed,
        F: Fn(&mut A, M, &mut Context<'_, A>) -> Result<(), Failure> + Send + Sync + 'static,
    {
        let key = TypeKey::of::<M>();
        let invoke: HandlerFn<A> = Box::new(move |actor, body: AnyBox, ctx| {
            let message = body.downcast::<M>().map_err(|_| {
                Failure::severe(format!("handler for {key} received another type"))
            })?;
            handler(actor, *message, ctx)
        });
        self.handlers.push(HandlerEntry {
            key,
            name: key.name().to_string(),
            invoke,
        });
        self
    }

    /// Handles messages with a pre-erased handler.
    ///
    /// `params` lists the handler's declared message parameters; exactly one is
    /// required. The handler receives the message upcast to that type.
    pub fn handle_erased<F>(&mut self, name: &str, params: &[TypeKey], handler: F) -> &mut Self
    where
        F: Fn(&mut A, AnyBox, &mut Context<'_, A>) -> Result<(), Failure> + Send + Sync + 'static,
    {
        match params {
            [] => self.errors.push(ConfigError::MissingParameter {
                handler: name.to_string(),
            }),
            [key] => self.handlers.push(HandlerEntry {
                key: *key,
                name: name.to_string(),
                invoke: Box::new(handler),
            }),
            _ => self.errors.push(ConfigError::TooManyParameters {
                handler: name.to_string(),
                count: params.len(),
            }),
        }
        self
    }

    /// Decides failures of children whose error is `E` or a subtype.
    pub fn on_error<E, F>(&mut self, handler: F) -> &mut Self
    where
        E: Typed,
        F: Fn(&A, &Failure) -> Directive + Send + Sync + 'static,
    {
        self.exceptions.push(ExceptionEntry {
            key: TypeKey::of::<E>(),
            handler: Box::new(handler),
        });
        self
    }

    /// Decides failures of children that no narrower handler matches.
    pub fn on_any_error<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&A, &Failure) -> Directive + Send + Sync + 'static,
    {
        self.exceptions.push(ExceptionEntry {
            key: TypeKey::catch_all(),
            handler: Box::new(handler),
        });
        self
    }

    /// Sets how this actor supervises its children.
    pub fn supervision(&mut self, policy: SupervisionPolicy) -> &mut Self {
        if self.policy.is_some() {
            self.errors.push(ConfigError::DuplicatePolicy);
        } else {
            self.policy = Some(policy);
        }
        self
    }

    /// Runs after the instance is created, before the first message.
    pub fn pre_start<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&mut A, &mut Context<'_, A>) -> Result<(), Failure> + Send + Sync + 'static,
    {
        let result = self.hooks.set_pre_start(Box::new(hook));
        self.record(result)
    }

    /// Runs on the failed instance before it is replaced.
    pub fn pre_restart<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&mut A, &Failure, &mut Context<'_, A>) -> Result<(), Failure>
            + Send
            + Sync
            + 'static,
    {
        let result = self.hooks.set_pre_restart(Box::new(hook));
        self.record(result)
    }

    /// Runs on the fresh instance after a restart.
    pub fn post_restart<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&mut A, &Failure, &mut Context<'_, A>) -> Result<(), Failure>
            + Send
            + Sync
            + 'static,
    {
        let result = self.hooks.set_post_restart(Box::new(hook));
        self.record(result)
    }

    /// Runs once the actor has stopped processing messages.
    pub fn post_stop<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&mut A, &mut Context<'_, A>) -> Result<(), Failure> + Send + Sync + 'static,
    {
        let result = self.hooks.set_post_stop(Box::new(hook));
        self.record(result)
    }

    fn record(&mut self, result: Result<(), ConfigError>) -> &mut Self {
        if let Err(e) = result {
            self.errors.push(e);
        }
        self
    }

    /// Validates and orders the declarations.
    pub(crate) fn build(self) -> Result<Declared<A>, ConfigError> {
        if let Some(error) = self.errors.into_iter().next() {
            return Err(error);
        }

        let mut seen = HashSet::new();
        for entry in &self.handlers {
            if !seen.insert(entry.key) {
                return Err(ConfigError::DuplicateHandler { message: entry.key });
            }
        }

        let mut seen = HashSet::new();
        for entry in &self.exceptions {
            if !seen.insert(entry.key) {
                return Err(ConfigError::DuplicateExceptionHandler { error: entry.key });
            }
        }

        Ok(Declared {
            handlers: HandlerTable::from_declared(self.handlers),
            exceptions: ExceptionTable::from_declared(self.exceptions),
            policy: self.policy.unwrap_or_default(),
            hooks: self.hooks,
        })
    }
}

/// Validated declarations of one actor type.
pub(crate) struct Declared<A> {
    pub(crate) handlers: HandlerTable<A>,
    pub(crate) exceptions: ExceptionTable<A>,
    pub(crate) policy: SupervisionPolicy,
    pub(crate) hooks: LifecycleHooks<A>,
}
