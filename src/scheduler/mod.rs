//! Fixed-time daily trigger schedule: six wall-clock slots in one fixed
//! timezone. Installing a schedule always starts from a clean slate —
//! whatever was installed before is dropped first.

use crate::config::ScheduleConfig;
use crate::pipeline::Pipeline;
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::info;

pub struct UpdateSchedule {
    tz: Tz,
    slots: Vec<NaiveTime>,
}

impl UpdateSchedule {
    pub fn new(cfg: &ScheduleConfig) -> Result<Self> {
        let tz: Tz = cfg
            .timezone
            .parse()
            .map_err(|e| anyhow!("Invalid timezone '{}': {}", cfg.timezone, e))?;

        let mut schedule = Self {
            tz,
            slots: Vec::new(),
        };
        schedule.install(&cfg.times)?;
        Ok(schedule)
    }

    /// Replace every previously installed slot with the given times.
    /// A malformed time aborts the remaining installation and surfaces the
    /// error to the caller — schedule setup is a supervised action, unlike
    /// the forgiving runtime paths.
    pub fn install(&mut self, times: &[String]) -> Result<()> {
        self.slots.clear();
        for t in times {
            let parsed = NaiveTime::parse_from_str(t, "%H:%M")
                .with_context(|| format!("Invalid trigger time '{}'", t))?;
            self.slots.push(parsed);
        }
        Ok(())
    }

    pub fn slots(&self) -> &[NaiveTime] {
        &self.slots
    }

    /// The next trigger instant strictly after `after`. Looks at today's
    /// and tomorrow's slots; a local time skipped by a DST jump resolves
    /// to its earliest valid mapping.
    pub fn next_fire(&self, after: DateTime<Tz>) -> Option<DateTime<Tz>> {
        let mut best: Option<DateTime<Tz>> = None;

        for day_offset in 0..=1 {
            let date = after.date_naive() + Duration::days(day_offset);
            for slot in &self.slots {
                let Some(candidate) = self.tz.from_local_datetime(&date.and_time(*slot)).earliest()
                else {
                    continue;
                };
                if candidate > after && best.is_none_or(|b| candidate < b) {
                    best = Some(candidate);
                }
            }
        }

        best
    }

    /// Firing loop: sleep to the next slot, run the update to completion,
    /// repeat. Run-level failures are absorbed inside the pipeline, so the
    /// loop only ever stops with the process.
    pub async fn run(&self, pipeline: &Pipeline) -> Result<()> {
        if self.slots.is_empty() {
            bail!("No trigger times installed");
        }

        info!(
            "Schedule installed: {} daily triggers in {}",
            self.slots.len(),
            self.tz
        );

        loop {
            let now = Utc::now().with_timezone(&self.tz);
            let next = self
                .next_fire(now)
                .ok_or_else(|| anyhow!("Could not compute the next trigger time"))?;
            let wait = (next - now).to_std().unwrap_or_default();

            info!(
                "Next update at {} ({:.0?} from now)",
                next.format("%Y-%m-%d %H:%M %Z"),
                wait
            );
            tokio::time::sleep(wait).await;

            pipeline.run_absorbing().await;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule() -> UpdateSchedule {
        UpdateSchedule::new(&ScheduleConfig::default()).unwrap()
    }

    fn rome(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Tz> {
        chrono_tz::Europe::Rome
            .with_ymd_and_hms(y, mo, d, h, mi, 0)
            .unwrap()
    }

    #[test]
    fn install_replaces_previous_slots() {
        let mut sched = schedule();
        sched.install(&["01:00".to_string()]).unwrap();
        assert_eq!(sched.slots().len(), 1);

        sched.install(&ScheduleConfig::default().times).unwrap();
        assert_eq!(sched.slots().len(), 6);
        assert!(!sched
            .slots()
            .contains(&NaiveTime::from_hms_opt(1, 0, 0).unwrap()));
    }

    #[test]
    fn malformed_time_aborts_install() {
        let mut sched = schedule();
        let err = sched.install(&["09:00".to_string(), "25:99".to_string()]);
        assert!(err.is_err());
    }

    #[test]
    fn bad_timezone_is_rejected() {
        let cfg = ScheduleConfig {
            timezone: "Mars/Olympus".to_string(),
            ..ScheduleConfig::default()
        };
        assert!(UpdateSchedule::new(&cfg).is_err());
    }

    #[test]
    fn next_fire_picks_the_nearest_slot() {
        let sched = schedule();
        // 13:00 → 15:30 the same day.
        let next = sched.next_fire(rome(2024, 10, 23, 13, 0)).unwrap();
        assert_eq!(next, rome(2024, 10, 23, 15, 30));
        // 21:00 → 22:00 the same day.
        let next = sched.next_fire(rome(2024, 10, 23, 21, 0)).unwrap();
        assert_eq!(next, rome(2024, 10, 23, 22, 0));
    }

    #[test]
    fn next_fire_rolls_over_to_tomorrow() {
        let sched = schedule();
        let next = sched.next_fire(rome(2024, 10, 23, 23, 0)).unwrap();
        assert_eq!(next, rome(2024, 10, 24, 9, 0));
    }

    #[test]
    fn a_slot_is_not_its_own_successor() {
        let sched = schedule();
        // Exactly at a slot, the next fire is the following slot.
        let next = sched.next_fire(rome(2024, 10, 23, 12, 0)).unwrap();
        assert_eq!(next, rome(2024, 10, 23, 15, 30));
    }
}
