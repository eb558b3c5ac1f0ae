//! Delayed and periodic deliveries on the paused tokio clock.

mod common;

use std::time::Duration;

use common::{next_report, report, system, Report, WAIT};
use stagehand_core::{
    typed, ActorRef, Behavior, Cancellable, ClassBuilder, Props, TimeoutNotice, Timeouter,
};
use stagehand_testing::TestProbe;
use tokio::time::{sleep, Instant};

#[derive(Debug, Clone)]
struct Start;

#[derive(Debug, Clone)]
struct Tick;

typed!(Start, Tick);

/// Ticks itself periodically and cancels after three ticks.
struct Ticker {
    report: ActorRef,
    period: Duration,
    ticks: u32,
    handle: Option<Cancellable>,
}

impl Behavior for Ticker {
    fn declare(class: &mut ClassBuilder<Self>) {
        class
            .handle(|ticker: &mut Ticker, _: Start, ctx| {
                let handle = ctx.schedule(Tick).to_self().period(ticker.period).go();
                ticker.handle = Some(handle);
                Ok(())
            })
            .handle(|ticker: &mut Ticker, _: Tick, _| {
                ticker.ticks += 1;
                report(&ticker.report, format!("tick:{}", ticker.ticks));
                if ticker.ticks == 3 {
                    if let Some(handle) = ticker.handle.take() {
                        report(&ticker.report, format!("cancelled:{}", handle.cancel()));
                    }
                }
                Ok(())
            });
    }
}

#[tokio::test(start_paused = true)]
async fn test_periodic_self_schedule_until_cancelled() {
    let system = system();
    let mut probe = TestProbe::new("reports");
    let period = Duration::from_millis(100);
    let report = probe.actor_ref().clone();
    let ticker = system
        .spawn(
            "ticker",
            Props::new(move || Ticker {
                report: report.clone(),
                period,
                ticks: 0,
                handle: None,
            }),
        )
        .unwrap();

    ticker.tell(Start, None).unwrap();

    let received = probe.receive_n(4, WAIT).await;
    let at: Vec<Instant> = received.iter().map(|r| r.at).collect();
    let texts: Vec<String> = received
        .into_iter()
        .filter_map(|r| r.downcast::<Report>())
        .map(|r| r.0)
        .collect();
    assert_eq!(texts, ["tick:1", "tick:2", "tick:3", "cancelled:true"]);
    for pair in at[..3].windows(2) {
        let gap = pair[1] - pair[0];
        assert!(gap >= period && gap < period * 2, "gap {gap:?}");
    }

    probe.expect_no_msg(period * 5).await;
    system.shutdown().await;
}

#[derive(Debug, Clone)]
struct Arm(Duration);

#[derive(Debug, Clone)]
struct Disarm;

#[derive(Debug, Clone)]
struct Ring;

typed!(Arm, Disarm, Ring);

/// A one-shot alarm that can be disarmed.
struct Alarm {
    report: ActorRef,
    pending: Option<Cancellable>,
}

impl Behavior for Alarm {
    fn declare(class: &mut ClassBuilder<Self>) {
        class
            .handle(|alarm: &mut Alarm, arm: Arm, ctx| {
                alarm.pending = Some(ctx.schedule(Ring).to_self().delay(arm.0).go());
                Ok(())
            })
            .handle(|alarm: &mut Alarm, _: Disarm, _| {
                let cancelled = alarm.pending.take().is_some_and(|h| h.cancel());
                report(&alarm.report, format!("disarmed:{cancelled}"));
                Ok(())
            })
            .handle(|alarm: &mut Alarm, _: Ring, _| {
                report(&alarm.report, "ring");
                Ok(())
            });
    }
}

fn alarm(probe: &TestProbe) -> Props<Alarm> {
    let report = probe.actor_ref().clone();
    Props::new(move || Alarm {
        report: report.clone(),
        pending: None,
    })
}

#[tokio::test(start_paused = true)]
async fn test_one_shot_fires_after_delay() {
    let system = system();
    let mut probe = TestProbe::new("reports");
    let actor = system.spawn("alarm", alarm(&probe)).unwrap();
    let delay = Duration::from_millis(250);

    let armed_at = Instant::now();
    actor.tell(Arm(delay), None).unwrap();
    let rang = probe.receive(WAIT).await.unwrap();
    assert_eq!(rang.downcast_ref::<Report>().unwrap().0, "ring");
    assert!(rang.at - armed_at >= delay);

    // Already fired, nothing left to cancel.
    actor.tell(Disarm, None).unwrap();
    assert_eq!(next_report(&mut probe).await, "disarmed:false");
    system.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_disarmed_one_shot_never_fires() {
    let system = system();
    let mut probe = TestProbe::new("reports");
    let actor = system.spawn("alarm", alarm(&probe)).unwrap();

    actor.tell(Arm(Duration::from_millis(100)), None).unwrap();
    actor.tell(Disarm, None).unwrap();

    assert_eq!(next_report(&mut probe).await, "disarmed:true");
    probe.expect_no_msg(Duration::from_millis(500)).await;
    system.shutdown().await;
}

#[derive(Debug, Clone)]
struct Poke;

typed!(Poke);

/// Reports when no poke arrived for a while.
struct Watchdog {
    report: ActorRef,
    timer: Timeouter,
}

impl Behavior for Watchdog {
    fn declare(class: &mut ClassBuilder<Self>) {
        class
            .handle(|dog: &mut Watchdog, _: Poke, ctx| dog.timer.start(ctx))
            .handle(|dog: &mut Watchdog, notice: TimeoutNotice, _| {
                let label = notice.info.label().unwrap_or("-");
                report(&dog.report, format!("quiet:{label}"));
                Ok(())
            });
    }
}

#[tokio::test(start_paused = true)]
async fn test_timeouter_restarts_on_every_poke() {
    let system = system();
    let mut probe = TestProbe::new("reports");
    let wait = Duration::from_millis(200);
    let report = probe.actor_ref().clone();
    let dog = system
        .spawn(
            "watchdog",
            Props::new(move || Watchdog {
                report: report.clone(),
                timer: Timeouter::new(wait).with_info("watchdog"),
            }),
        )
        .unwrap();

    let first = Instant::now();
    for _ in 0..3 {
        dog.tell(Poke, None).unwrap();
        sleep(Duration::from_millis(100)).await;
    }

    let quiet = probe.receive(WAIT).await.unwrap();
    assert_eq!(quiet.downcast_ref::<Report>().unwrap().0, "quiet:watchdog");
    assert!(quiet.at - first >= Duration::from_millis(400));
    probe.expect_no_msg(wait * 3).await;
    system.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_system_schedule_reaches_probe() {
    let system = system();
    let mut probe = TestProbe::new("target");

    let handle = system.schedule_periodic(
        probe.actor_ref(),
        Tick,
        Duration::from_millis(50),
        Duration::from_millis(100),
    );
    let received = probe.receive_n(3, WAIT).await;
    assert!(received.iter().all(|r| r.is::<Tick>() && r.sender.is_none()));

    assert!(handle.cancel());
    probe.expect_no_msg(Duration::from_millis(500)).await;
    system.shutdown().await;
}
