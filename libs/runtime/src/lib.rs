//! # stagehand-runtime
//!
//! Local tokio runtime for stagehand actors.
//!
//! Each actor runs as one task with two mailboxes: a bounded user mailbox and
//! an unbounded system mailbox that is always drained first. Failures are
//! reported to the parent actor, which answers with a directive; top-level
//! actors are supervised by the system's guardian policy.
//!
//! ```ignore
//! let system = ActorSystem::new(RuntimeConfig::from_env()?)?;
//! let ponger = system.spawn("ponger", Props::<Ponger>::default())?;
//! ponger.tell(Ping, None)?;
//! system.shutdown().await;
//! ```

mod actor_loop;
mod bus;
mod config;
mod mailbox;
mod supervisor;
mod system;
mod timer;

pub use bus::EventBus;
pub use config::RuntimeConfig;
pub use supervisor::RestartStats;
pub use system::ActorSystem;
