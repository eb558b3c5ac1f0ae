//! Lifecycle hooks.

use std::fmt;

use crate::context::Context;
use crate::error::ConfigError;
use crate::failure::Failure;

/// A lifecycle transition an actor may hook into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    PreStart,
    PreRestart,
    PostRestart,
    PostStop,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleEvent::PreStart => "pre-start",
            LifecycleEvent::PreRestart => "pre-restart",
            LifecycleEvent::PostRestart => "post-restart",
            LifecycleEvent::PostStop => "post-stop",
        };
        f.write_str(s)
    }
}

pub(crate) type HookFn<A> =
    Box<dyn Fn(&mut A, &mut Context<'_, A>) -> Result<(), Failure> + Send + Sync>;

pub(crate) type RestartHookFn<A> =
    Box<dyn Fn(&mut A, &Failure, &mut Context<'_, A>) -> Result<(), Failure> + Send + Sync>;

/// At most one hook per [`LifecycleEvent`].
pub struct LifecycleHooks<A> {
    pub(crate) pre_start: Option<HookFn<A>>,
    pub(crate) pre_restart: Option<RestartHookFn<A>>,
    pub(crate) post_restart: Option<RestartHookFn<A>>,
    pub(crate) post_stop: Option<HookFn<A>>,
}

impl<A> Default for LifecycleHooks<A> {
    fn default() -> Self {
        Self {
            pre_start: None,
            pre_restart: None,
            post_restart: None,
            post_stop: None,
        }
    }
}

impl<A> LifecycleHooks<A> {
    pub(crate) fn set_pre_start(&mut self, hook: HookFn<A>) -> Result<(), ConfigError> {
        place(&mut self.pre_start, hook, LifecycleEvent::PreStart)
    }

    pub(crate) fn set_pre_restart(&mut self, hook: RestartHookFn<A>) -> Result<(), ConfigError> {
        place(&mut self.pre_restart, hook, LifecycleEvent::PreRestart)
    }

    pub(crate) fn set_post_restart(&mut self, hook: RestartHookFn<A>) -> Result<(), ConfigError> {
        place(&mut self.post_restart, hook, LifecycleEvent::PostRestart)
    }

    pub(crate) fn set_post_stop(&mut self, hook: HookFn<A>) -> Result<(), ConfigError> {
        place(&mut self.post_stop, hook, LifecycleEvent::PostStop)
    }

    /// Returns true if a hook is declared for `event`.
    pub fn has(&self, event: LifecycleEvent) -> bool {
        match event {
            LifecycleEvent::PreStart => self.pre_start.is_some(),
            LifecycleEvent::PreRestart => self.pre_restart.is_some(),
            LifecycleEvent::PostRestart => self.post_restart.is_some(),
            LifecycleEvent::PostStop => self.post_stop.is_some(),
        }
    }

    pub(crate) fn run_pre_start(&self, actor: &mut A, ctx: &mut Context<'_, A>) -> Result<(), Failure> {
        match &self.pre_start {
            Some(hook) => hook(actor, ctx),
            None => Ok(()),
        }
    }

    pub(crate) fn run_pre_restart(
        &self,
        actor: &mut A,
        failure: &Failure,
        ctx: &mut Context<'_, A>,
    ) -> Result<(), Failure> {
        match &self.pre_restart {
            Some(hook) => hook(actor, failure, ctx),
            None => Ok(()),
        }
    }

    pub(crate) fn run_post_restart(
        &self,
        actor: &mut A,
        failure: &Failure,
        ctx: &mut Context<'_, A>,
    ) -> Result<(), Failure> {
        match &self.post_restart {
            Some(hook) => hook(actor, failure, ctx),
            None => Ok(()),
        }
    }

    pub(crate) fn run_post_stop(&self, actor: &mut A, ctx: &mut Context<'_, A>) -> Result<(), Failure> {
        match &self.post_stop {
            Some(hook) => hook(actor, ctx),
            None => Ok(()),
        }
    }
}

fn place<H>(slot: &mut Option<H>, hook: H, event: LifecycleEvent) -> Result<(), ConfigError> {
    if slot.is_some() {
        return Err(ConfigError::DuplicateHook { event });
    }
    *slot = Some(hook);
    Ok(())
}

impl<A> fmt::Debug for LifecycleHooks<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleHooks")
            .field("pre_start", &self.pre_start.is_some())
            .field("pre_restart", &self.pre_restart.is_some())
            .field("post_restart", &self.post_restart.is_some())
            .field("post_stop", &self.post_stop.is_some())
            .finish()
    }
}
