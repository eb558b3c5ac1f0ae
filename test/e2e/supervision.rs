//! Failure handling across a parent and its children.

mod common;

use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{next_report, report, reports, system, WAIT};
use stagehand_core::{
    typed, ActorRef, Behavior, ClassBuilder, Context, Directive, Failure, Props,
    SupervisionPolicy,
};
use stagehand_runtime::ActorSystem;
use stagehand_testing::TestProbe;
use thiserror::Error;

#[derive(Debug, Clone)]
enum Work {
    Job(u32),
    Glitch,
    Odd,
    Fatal,
    Vague,
    Panic,
}

typed!(Work);

#[derive(Debug, Clone, Error)]
#[error("glitch")]
struct Glitch;

#[derive(Debug, Clone, Error)]
#[error("odd")]
struct Odd;

#[derive(Debug, Clone, Error)]
#[error("fatal")]
struct Fatal;

typed!(Glitch, Odd, Fatal);

/// Reports its lifecycle, tagged with its name and instance generation.
struct Worker {
    name: &'static str,
    generation: usize,
    report: ActorRef,
}

impl Worker {
    fn say(&self, what: impl std::fmt::Display) {
        report(&self.report, format!("{} {what}", self.name));
    }
}

impl Behavior for Worker {
    fn declare(class: &mut ClassBuilder<Self>) {
        class
            .handle(|worker: &mut Worker, work: Work, _| match work {
                Work::Job(n) => {
                    worker.say(format!("ok:{}:{n}", worker.generation));
                    Ok(())
                }
                Work::Glitch => Err(Glitch.into()),
                Work::Odd => Err(Odd.into()),
                Work::Fatal => Err(Fatal.into()),
                Work::Vague => Err(Failure::msg("vague")),
                Work::Panic => panic!("worker gave up"),
            })
            .pre_start(|worker: &mut Worker, _| {
                worker.say(format!("start:{}", worker.generation));
                Ok(())
            })
            .post_restart(|worker: &mut Worker, failure, _| {
                worker.say(format!("restart:{}:{}", worker.generation, failure.error()));
                Ok(())
            })
            .post_stop(|worker: &mut Worker, _| {
                worker.say(format!("stop:{}", worker.generation));
                Ok(())
            });
    }
}

fn worker(name: &'static str, report: &ActorRef) -> Props<Worker> {
    let generations = Arc::new(AtomicUsize::new(0));
    let report = report.clone();
    Props::new(move || Worker {
        name,
        generation: generations.fetch_add(1, Ordering::SeqCst) + 1,
        report: report.clone(),
    })
}

trait Strategy: Send + 'static {
    fn policy() -> SupervisionPolicy;
}

/// Restarts failed children without limit.
struct Patient;

/// Restarts a child at most twice.
struct Strict;

/// Restarts or stops all children together.
struct Team;

impl Strategy for Patient {
    fn policy() -> SupervisionPolicy {
        SupervisionPolicy::default()
    }
}

impl Strategy for Strict {
    fn policy() -> SupervisionPolicy {
        SupervisionPolicy::builder()
            .max_retries(2)
            .window(Duration::from_secs(60))
            .build()
    }
}

impl Strategy for Team {
    fn policy() -> SupervisionPolicy {
        SupervisionPolicy::builder().all_for_one().build()
    }
}

/// Owns workers; its exception handlers map error types to directives.
struct Boss<S> {
    names: &'static [&'static str],
    report: ActorRef,
    _strategy: PhantomData<S>,
}

impl<S: Strategy> Boss<S> {
    fn spawn_workers(&self, ctx: &Context<'_, Self>) -> Result<(), Failure> {
        for &name in self.names {
            ctx.spawn(name, worker(name, &self.report))?;
        }
        Ok(())
    }
}

impl<S: Strategy> Behavior for Boss<S> {
    fn declare(class: &mut ClassBuilder<Self>) {
        class
            .supervision(S::policy())
            .on_error::<Glitch, _>(|_, _| Directive::Restart)
            .on_error::<Odd, _>(|_, _| Directive::Resume)
            .on_error::<Fatal, _>(|_, _| Directive::Stop)
            .on_any_error(|_, _| Directive::Escalate)
            .pre_start(|boss: &mut Boss<S>, ctx| boss.spawn_workers(ctx))
            .post_restart(|boss: &mut Boss<S>, _, ctx| {
                report(&boss.report, "boss restart");
                boss.spawn_workers(ctx)
            })
            .post_stop(|boss: &mut Boss<S>, _| {
                report(&boss.report, "boss stop");
                Ok(())
            });
    }
}

/// Spawns `/user/boss` and waits for its workers to start.
async fn start_boss<S: Strategy>(
    system: &ActorSystem,
    probe: &mut TestProbe,
    names: &'static [&'static str],
) -> ActorRef {
    let report = probe.actor_ref().clone();
    let boss = system
        .spawn(
            "boss",
            Props::new(move || Boss::<S> {
                names,
                report: report.clone(),
                _strategy: PhantomData,
            }),
        )
        .unwrap();

    let mut started = reports(probe, names.len()).await;
    started.sort();
    let expected: Vec<String> = names.iter().map(|n| format!("{n} start:1")).collect();
    assert_eq!(started, expected);
    boss
}

fn child(system: &ActorSystem, name: &str) -> ActorRef {
    system
        .lookup(&format!("/user/boss/{name}"))
        .unwrap_or_else(|| panic!("no child {name}"))
}

#[tokio::test]
async fn test_restart_keeps_queued_messages() {
    let system = system();
    let mut probe = TestProbe::new("reports");
    start_boss::<Patient>(&system, &mut probe, &["w1"]).await;
    let w1 = child(&system, "w1");

    w1.tell(Work::Glitch, None).unwrap();
    w1.tell(Work::Job(5), None).unwrap();

    assert_eq!(next_report(&mut probe).await, "w1 restart:2:glitch");
    assert_eq!(next_report(&mut probe).await, "w1 ok:2:5");
    assert_eq!(child(&system, "w1"), w1);
    system.shutdown().await;
}

#[tokio::test]
async fn test_resume_keeps_the_instance() {
    let system = system();
    let mut probe = TestProbe::new("reports");
    start_boss::<Patient>(&system, &mut probe, &["w1"]).await;
    let w1 = child(&system, "w1");

    w1.tell(Work::Odd, None).unwrap();
    w1.tell(Work::Job(1), None).unwrap();

    assert_eq!(next_report(&mut probe).await, "w1 ok:1:1");
    system.shutdown().await;
}

#[tokio::test]
async fn test_stop_directive_terminates_child() {
    let system = system();
    let mut probe = TestProbe::new("reports");
    let mut watcher = TestProbe::new("watcher");
    start_boss::<Patient>(&system, &mut probe, &["w1"]).await;
    let w1 = child(&system, "w1");
    system.watch(watcher.actor_ref(), &w1);

    w1.tell(Work::Fatal, None).unwrap();

    assert_eq!(next_report(&mut probe).await, "w1 stop:1");
    assert_eq!(watcher.expect_terminated(WAIT).await, w1);
    assert!(system.lookup("/user/boss").is_some());
    assert!(system.lookup("/user/boss/w1").is_none());
    system.shutdown().await;
}

#[tokio::test]
async fn test_restart_limit_stops_child() {
    let system = system();
    let mut probe = TestProbe::new("reports");
    let mut watcher = TestProbe::new("watcher");
    start_boss::<Strict>(&system, &mut probe, &["w1"]).await;
    let w1 = child(&system, "w1");
    system.watch(watcher.actor_ref(), &w1);

    for _ in 0..3 {
        w1.tell(Work::Glitch, None).unwrap();
    }

    assert_eq!(
        reports(&mut probe, 3).await,
        ["w1 restart:2:glitch", "w1 restart:3:glitch", "w1 stop:3"]
    );
    assert_eq!(watcher.expect_terminated(WAIT).await, w1);
    system.shutdown().await;
}

#[tokio::test]
async fn test_all_for_one_restarts_siblings() {
    let system = system();
    let mut probe = TestProbe::new("reports");
    start_boss::<Team>(&system, &mut probe, &["w1", "w2"]).await;
    let w1 = child(&system, "w1");
    let w2 = child(&system, "w2");

    w1.tell(Work::Glitch, None).unwrap();

    let mut restarted = reports(&mut probe, 2).await;
    restarted.sort();
    assert_eq!(restarted, ["w1 restart:2:glitch", "w2 restart:2:glitch"]);

    w2.tell(Work::Job(7), None).unwrap();
    assert_eq!(next_report(&mut probe).await, "w2 ok:2:7");
    system.shutdown().await;
}

#[tokio::test]
async fn test_all_for_one_stops_siblings() {
    let system = system();
    let mut probe = TestProbe::new("reports");
    start_boss::<Team>(&system, &mut probe, &["w1", "w2"]).await;
    let w1 = child(&system, "w1");

    w1.tell(Work::Fatal, None).unwrap();

    let mut stopped = reports(&mut probe, 2).await;
    stopped.sort();
    assert_eq!(stopped, ["w1 stop:1", "w2 stop:1"]);
    system.shutdown().await;
}

#[tokio::test]
async fn test_escalation_restarts_the_parent() {
    let system = system();
    let mut probe = TestProbe::new("reports");
    let boss = start_boss::<Patient>(&system, &mut probe, &["w1"]).await;
    let w1 = child(&system, "w1");

    w1.tell(Work::Vague, None).unwrap();

    assert_eq!(
        reports(&mut probe, 3).await,
        ["w1 stop:1", "boss restart", "w1 start:1"]
    );
    let replacement = child(&system, "w1");
    assert_ne!(replacement, w1);
    assert!(w1.is_closed());
    assert_eq!(system.lookup("/user/boss"), Some(boss));
    system.shutdown().await;
}

#[tokio::test]
async fn test_severe_failure_stops_the_hierarchy() {
    let system = system();
    let mut probe = TestProbe::new("reports");
    let mut watcher = TestProbe::new("watcher");
    let boss = start_boss::<Patient>(&system, &mut probe, &["w1"]).await;
    system.watch(watcher.actor_ref(), &boss);

    child(&system, "w1").tell(Work::Panic, None).unwrap();

    assert_eq!(reports(&mut probe, 2).await, ["w1 stop:1", "boss stop"]);
    assert_eq!(watcher.expect_terminated(WAIT).await, boss);
    assert_eq!(system.actor_count(), 0);
    system.shutdown().await;
}

#[tokio::test]
async fn test_kill_stops_regardless_of_policy() {
    let system = system();
    let mut probe = TestProbe::new("reports");
    let mut watcher = TestProbe::new("watcher");
    start_boss::<Patient>(&system, &mut probe, &["w1"]).await;
    let w1 = child(&system, "w1");
    system.watch(watcher.actor_ref(), &w1);

    system.kill(&w1);

    assert_eq!(next_report(&mut probe).await, "w1 stop:1");
    assert_eq!(watcher.expect_terminated(WAIT).await, w1);
    system.shutdown().await;
}

#[tokio::test]
async fn test_children_stop_before_parent() {
    let system = system();
    let mut probe = TestProbe::new("reports");
    let boss = start_boss::<Patient>(&system, &mut probe, &["w1", "w2"]).await;

    system.stop(&boss);

    let mut children = reports(&mut probe, 2).await;
    children.sort();
    assert_eq!(children, ["w1 stop:1", "w2 stop:1"]);
    assert_eq!(next_report(&mut probe).await, "boss stop");
    system.shutdown().await;
    assert_eq!(system.actor_count(), 0);
}

/// Watches an actor without handling its termination.
struct Sentinel {
    target: ActorRef,
    report: ActorRef,
}

impl Behavior for Sentinel {
    fn declare(class: &mut ClassBuilder<Self>) {
        class
            .pre_start(|sentinel: &mut Sentinel, ctx| {
                ctx.watch(&sentinel.target);
                Ok(())
            })
            .post_stop(|sentinel: &mut Sentinel, _| {
                report(&sentinel.report, "sentinel stop");
                Ok(())
            });
    }
}

#[tokio::test]
async fn test_unhandled_termination_is_a_death_pact() {
    let system = system();
    let mut probe = TestProbe::new("reports");
    let boss = start_boss::<Patient>(&system, &mut probe, &[]).await;

    let target = boss.clone();
    let report = probe.actor_ref().clone();
    system
        .spawn(
            "sentinel",
            Props::new(move || Sentinel {
                target: target.clone(),
                report: report.clone(),
            }),
        )
        .unwrap();

    system.stop(&boss);

    assert_eq!(next_report(&mut probe).await, "boss stop");
    assert_eq!(next_report(&mut probe).await, "sentinel stop");
    probe.expect_no_msg(Duration::from_millis(100)).await;
    system.shutdown().await;
}
