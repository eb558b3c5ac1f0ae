//! Demo actors and the scenarios that drive them.

use std::time::Duration;

use anyhow::{Context as _, Result};
use stagehand_core::{
    typed, ActorRef, Behavior, ClassBuilder, Context, Directive, Failure, Props, RequestInfo,
    SupervisionPolicy, Terminated, TimeoutNotice,
};
use stagehand_runtime::ActorSystem;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{info, warn};

// =============================================================================
// Ping-pong
// =============================================================================

#[derive(Debug, Clone)]
pub struct Serve;

#[derive(Debug, Clone)]
pub struct Ping(pub u32);

#[derive(Debug, Clone)]
pub struct Pong(pub u32);

typed!(Serve, Ping, Pong);

/// Answers pings, ignoring every `drop_every`-th one.
pub struct Ponger {
    drop_every: u32,
}

impl Ponger {
    pub fn new(drop_every: u32) -> Self {
        Self { drop_every }
    }
}

impl Behavior for Ponger {
    fn declare(class: &mut ClassBuilder<Self>) {
        class.handle(|ponger: &mut Ponger, ping: Ping, ctx| {
            if ponger.drop_every > 0 && ping.0 % ponger.drop_every == 0 {
                info!(round = ping.0, "Ignoring ping");
                return Ok(());
            }
            ctx.msg(Pong(ping.0)).reply_to_sender().fire_and_forget()
        });
    }
}

/// Outcome of a ping-pong run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub answered: u32,
    pub timed_out: u32,
}

/// Sends `rounds` pings one after another, each as a request with a timeout.
pub struct Pinger {
    ponger: ActorRef,
    rounds: u32,
    wait: Duration,
    round: u32,
    tally: Tally,
    done: watch::Sender<Option<Tally>>,
}

impl Pinger {
    pub fn new(
        ponger: ActorRef,
        rounds: u32,
        wait: Duration,
        done: watch::Sender<Option<Tally>>,
    ) -> Self {
        Self {
            ponger,
            rounds,
            wait,
            round: 0,
            tally: Tally::default(),
            done,
        }
    }

    fn next(&mut self, ctx: &mut Context<'_, Self>) -> Result<(), Failure> {
        if self.round == self.rounds {
            info!(
                answered = self.tally.answered,
                timed_out = self.tally.timed_out,
                "Ping-pong finished"
            );
            self.done.send_replace(Some(self.tally));
            ctx.stop_self();
            return Ok(());
        }
        self.round += 1;
        ctx.msg(Ping(self.round))
            .to(&self.ponger)
            .timeout(self.wait)
            .request::<Pong>(RequestInfo::new(self.round))
    }
}

impl Behavior for Pinger {
    fn declare(class: &mut ClassBuilder<Self>) {
        class
            .handle(|pinger: &mut Pinger, _: Serve, ctx| pinger.next(ctx))
            .handle(|pinger: &mut Pinger, pong: Pong, ctx| {
                info!(round = pong.0, "Pong");
                pinger.tally.answered += 1;
                pinger.next(ctx)
            })
            .handle(|pinger: &mut Pinger, notice: TimeoutNotice, ctx| {
                warn!(round = ?notice.info.get::<u32>(), "No pong in time");
                pinger.tally.timed_out += 1;
                pinger.next(ctx)
            });
    }
}

pub async fn ping_pong(
    system: &ActorSystem,
    rounds: u32,
    drop_every: u32,
    wait: Duration,
) -> Result<Tally> {
    let (done_tx, mut done_rx) = watch::channel(None);

    let ponger = system.spawn("ponger", Props::new(move || Ponger::new(drop_every)))?;
    system.spawn(
        "pinger",
        Props::new(move || Pinger::new(ponger.clone(), rounds, wait, done_tx.clone())).initial(Serve),
    )?;

    let budget = wait * (rounds + 1);
    let tally = timeout(budget, done_rx.wait_for(Option::is_some))
        .await
        .context("ping-pong did not finish in time")??
        .unwrap_or_default();
    Ok(tally)
}

// =============================================================================
// Supervised worker
// =============================================================================

#[derive(Debug, Clone)]
pub struct Job(pub u32);

#[derive(Debug, Clone)]
pub struct Finish;

typed!(Job, Finish);

#[derive(Debug, Error, Clone)]
#[error("job {0} failed")]
pub struct JobFailed(pub u32);

typed!(JobFailed);

/// Fails every job whose number is divisible by three. Stops on [`Finish`].
#[derive(Debug, Default)]
pub struct Worker {
    handled: u32,
}

impl Behavior for Worker {
    fn declare(class: &mut ClassBuilder<Self>) {
        class
            .handle(|worker: &mut Worker, job: Job, _| {
                if job.0 % 3 == 0 {
                    return Err(JobFailed(job.0).into());
                }
                worker.handled += 1;
                info!(job = job.0, handled = worker.handled, "Job done");
                Ok(())
            })
            .handle(|_, _: Finish, ctx| {
                ctx.stop_self();
                Ok(())
            })
            .post_restart(|_, failure, _| {
                warn!(cause = %failure, "Worker restarted");
                Ok(())
            });
    }
}

/// Owns one worker, forwards jobs to it and restarts it on failed jobs.
pub struct Foreman {
    worker: Option<ActorRef>,
    done: watch::Sender<bool>,
}

impl Foreman {
    pub const MAX_RESTARTS: u32 = 3;

    pub fn new(done: watch::Sender<bool>) -> Self {
        Self { worker: None, done }
    }
}

impl Behavior for Foreman {
    fn declare(class: &mut ClassBuilder<Self>) {
        class
            .supervision(
                SupervisionPolicy::builder()
                    .one_for_one()
                    .max_retries(Self::MAX_RESTARTS)
                    .window(Duration::from_secs(60))
                    .build(),
            )
            .on_error::<JobFailed, _>(|_, _| Directive::Restart)
            .on_any_error(|_, _| Directive::Stop)
            .pre_start(|foreman: &mut Foreman, ctx| {
                let worker = ctx.spawn("worker", Props::<Worker>::default())?;
                ctx.watch(&worker);
                foreman.worker = Some(worker);
                Ok(())
            })
            .handle(|foreman: &mut Foreman, job: Job, ctx| match &foreman.worker {
                Some(worker) => ctx.msg(job).to(worker).fire_and_forget(),
                None => Ok(()),
            })
            .handle(|foreman: &mut Foreman, finish: Finish, ctx| match &foreman.worker {
                Some(worker) => ctx.msg(finish).to(worker).fire_and_forget(),
                None => Ok(()),
            })
            .handle(|foreman: &mut Foreman, terminated: Terminated, _| {
                info!(worker = %terminated.actor, "Worker terminated");
                foreman.worker = None;
                foreman.done.send_replace(true);
                Ok(())
            });
    }
}

pub async fn crash(system: &ActorSystem, jobs: u32) -> Result<()> {
    let (done_tx, mut done_rx) = watch::channel(false);
    let foreman = system.spawn("foreman", Props::new(move || Foreman::new(done_tx.clone())))?;

    for job in 1..=jobs {
        foreman.tell(Job(job), None)?;
    }
    foreman.tell(Finish, None)?;

    timeout(Duration::from_secs(10), done_rx.wait_for(|done| *done))
        .await
        .context("worker did not stop in time")??;
    Ok(())
}
