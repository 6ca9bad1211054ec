//! Timer-driven invocation of backup runs.
//!
//! The default schedule mirrors the cron expression the backup has always
//! run on: every third day of the month (1st, 4th, 7th, ...) at 08:00 JST.

use crate::Config;
use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Utc};
use std::future::Future;
use std::time::Duration;
use tracing::info;

/// Recurring "every Nth day of the month at a fixed time" schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    time: NaiveTime,
    offset: FixedOffset,
    day_step: u32,
}

impl Schedule {
    /// Creates a schedule firing at `time` (in `offset`) on days of the
    /// month where `(day - 1) % day_step == 0`.
    pub fn new(time: NaiveTime, offset: FixedOffset, day_step: u32) -> Self {
        Self {
            time,
            offset,
            day_step: day_step.clamp(1, 31),
        }
    }

    /// Builds the schedule from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.schedule_time,
            config.schedule_offset,
            config.schedule_day_step,
        )
    }

    /// Returns true if the schedule fires on this day of the month.
    pub fn fires_on_day(&self, day: u32) -> bool {
        day >= 1 && (day - 1) % self.day_step == 0
    }

    /// First firing strictly after `now`.
    ///
    /// ```
    /// use chrono::{FixedOffset, NaiveTime, TimeZone, Utc};
    /// use logicapps_backup::schedule::Schedule;
    ///
    /// let jst = FixedOffset::east_opt(9 * 3600).unwrap();
    /// let schedule = Schedule::new(NaiveTime::from_hms_opt(8, 0, 0).unwrap(), jst, 3);
    ///
    /// // 2026-10-02 12:00 JST -> 2026-10-04 08:00 JST (= 10-03 23:00 UTC)
    /// let now = Utc.with_ymd_and_hms(2026, 10, 2, 3, 0, 0).unwrap();
    /// let next = schedule.next_after(now).unwrap();
    /// assert_eq!(next, Utc.with_ymd_and_hms(2026, 10, 3, 23, 0, 0).unwrap());
    /// ```
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local_now = now.with_timezone(&self.offset);
        let mut date = local_now.date_naive();

        // Day 1 always fires, so a match is at most one month away.
        for _ in 0..64 {
            if self.fires_on_day(date.day()) {
                let candidate = date
                    .and_time(self.time)
                    .and_local_timezone(self.offset)
                    .single()?;
                if candidate > local_now {
                    return Some(candidate.with_timezone(&Utc));
                }
            }
            date = date.succ_opt()?;
        }
        None
    }
}

/// Runs a job on a [`Schedule`] until shut down.
pub struct Scheduler {
    schedule: Schedule,
    run_on_startup: bool,
}

impl Scheduler {
    /// Creates a scheduler.
    pub fn new(schedule: Schedule, run_on_startup: bool) -> Self {
        Self {
            schedule,
            run_on_startup,
        }
    }

    /// Builds the scheduler from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(Schedule::from_config(config), config.run_on_startup)
    }

    /// Invokes `job` once per firing until `shutdown` resolves.
    ///
    /// Each firing runs the job to completion before the next firing is
    /// computed, so runs never overlap. Shutdown is observed while waiting
    /// between runs.
    pub async fn run_until<F, Fut, S>(&self, mut job: F, shutdown: S)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        if self.run_on_startup {
            info!("running backup on startup");
            job().await;
        }

        loop {
            let now = Utc::now();
            let Some(next) = self.schedule.next_after(now) else {
                info!("schedule has no further firings, stopping");
                return;
            };
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            info!(next = %next, wait_secs = wait.as_secs(), "next backup scheduled");

            tokio::select! {
                _ = tokio::time::sleep(wait) => job().await,
                _ = &mut shutdown => {
                    info!("scheduler shutting down");
                    return;
                }
            }
        }
    }
}
