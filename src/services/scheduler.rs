//! Recurring-task runner.
//!
//! A `Scheduler` drives one `RecurringTask` on a single tokio task: once at
//! start-up, then on every tick of its `Schedule` or whenever a `RunTrigger`
//! fires. Runs are strictly sequential, so two passes never overlap; triggers
//! that arrive while a run is in progress collapse into one follow-up run.

use async_trait::async_trait;
use chrono::{Local, Timelike};
use std::{sync::Arc, time::Duration};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const HOUR: Duration = Duration::from_secs(60 * 60);

#[async_trait]
pub trait RecurringTask: Send + Sync {
    fn name(&self) -> &str;

    /// One pass. Errors are the task's to log; the schedule keeps going.
    async fn run(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Run at start-up and at minute zero of every local hour.
    HourlyAtTopOfHour,
    /// Run at start-up and then every fixed interval.
    Every(Duration),
    /// Run only when triggered.
    OnDemand,
}

impl Schedule {
    /// Delay until the next tick, measured from wall-clock time `now`.
    pub fn next_delay<T: Timelike>(&self, now: &T) -> Option<Duration> {
        match self {
            Schedule::HourlyAtTopOfHour => {
                let into_hour = Duration::from_secs(u64::from(now.minute() * 60 + now.second()))
                    + Duration::from_nanos(u64::from(now.nanosecond() % 1_000_000_000));
                Some(HOUR.saturating_sub(into_hour))
            }
            Schedule::Every(interval) => Some(*interval),
            Schedule::OnDemand => None,
        }
    }

    fn runs_at_start(&self) -> bool {
        !matches!(self, Schedule::OnDemand)
    }
}

/// Handle for requesting an out-of-schedule run.
#[derive(Debug, Clone, Default)]
pub struct RunTrigger {
    notify: Arc<Notify>,
}

impl RunTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.notify.notify_one();
    }

    async fn requested(&self) {
        self.notify.notified().await;
    }
}

pub struct Scheduler {
    schedule: Schedule,
    trigger: RunTrigger,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new(schedule: Schedule, shutdown: CancellationToken) -> Self {
        Self {
            schedule,
            trigger: RunTrigger::new(),
            shutdown,
        }
    }

    pub fn trigger(&self) -> RunTrigger {
        self.trigger.clone()
    }

    /// Drive `task` until the shutdown token is cancelled.
    ///
    /// Cancellation is observed between runs; a run in progress finishes.
    pub async fn run(self, task: Arc<dyn RecurringTask>) {
        if self.schedule.runs_at_start() {
            info!(task = task.name(), "initial run");
            task.run().await;
        }

        loop {
            let delay = self.schedule.next_delay(&Local::now());
            debug!(task = task.name(), ?delay, "waiting for next run");

            let tick = async {
                match delay {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!(task = task.name(), "scheduler stopped");
                    return;
                }
                _ = tick => info!(task = task.name(), "scheduled run"),
                _ = self.trigger.requested() => info!(task = task.name(), "on-demand run"),
            }

            task.run().await;
        }
    }
}
