// src/cron/schedule_instant.rs
use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, Offset, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use crate::cron::cron_parser::CronSchedule;
use crate::error::{JobsError, Result};

const ROLLBACK_LOOKAHEAD_HOURS: i64 = 3;

/// One tick's view of a schedule: "now" floored to the minute plus the next
/// fire time, both UTC, computed against `time_zone`.
#[derive(Debug, Clone)]
pub struct ScheduleInstant<'a> {
    schedule: &'a CronSchedule,
    time_zone: Tz,
    now_instant: DateTime<Utc>,
    next_instant: Option<DateTime<Utc>>,
}

impl<'a> ScheduleInstant<'a> {
    /// Fails with [`JobsError::InvalidInput`] if `now` is not a UTC instant.
    pub fn compute<Z: TimeZone>(schedule: &'a CronSchedule, time_zone: Tz, now: &DateTime<Z>) -> Result<Self> {
        let now_utc = require_utc(now, "now")?;
        let now_instant = floor_to_minute(now_utc);

        let rollback = clock_rollback(time_zone, now_instant);
        let scan_from = now_instant.with_timezone(&time_zone).naive_local() - rollback;
        let mut upcoming = schedule
            .occurrences_after(scan_from)
            .flat_map(|local| resolve_local(time_zone, local).map(move |t| (local, t)))
            .filter(|(_, t)| *t > now_instant);

        // Inside a repeated hour wall-clock order and UTC order disagree.
        let next_instant = match upcoming.next() {
            Some((_, first)) if rollback == Duration::zero() => Some(first),
            Some((first_local, first)) => Some(
                upcoming
                    .take_while(|(local, _)| *local <= first_local + rollback)
                    .fold(first, |best, (_, t)| best.min(t)),
            ),
            None => None,
        };

        Ok(Self {
            schedule,
            time_zone,
            now_instant,
            next_instant,
        })
    }

    pub fn now_instant(&self) -> DateTime<Utc> {
        self.now_instant
    }

    pub fn next_instant(&self) -> Option<DateTime<Utc>> {
        self.next_instant
    }

    pub fn time_zone(&self) -> Tz {
        self.time_zone
    }

    /// Every fire time in `(last_instant, now_instant + 1s]`, ascending, UTC.
    /// Local times that do not exist in the zone are skipped.
    pub fn missed_occurrences<Z: TimeZone>(&self, last_instant: &DateTime<Z>) -> Result<Vec<DateTime<Utc>>> {
        let last = require_utc(last_instant, "last_instant")?;
        let mut hits: Vec<DateTime<Utc>> = self.window(last).collect();
        hits.sort_unstable();
        hits.dedup();
        Ok(hits)
    }

    /// Short-circuit form of `!missed_occurrences(last).is_empty()`.
    pub fn is_due<Z: TimeZone>(&self, last_instant: &DateTime<Z>) -> Result<bool> {
        let last = require_utc(last_instant, "last_instant")?;
        Ok(self.window(last).next().is_some())
    }

    fn window(&self, last: DateTime<Utc>) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        let until = self.now_instant + Duration::seconds(1);
        let tz = self.time_zone;
        let from_local = last.with_timezone(&tz).naive_local() - clock_rollback(tz, last);
        let until_local = until.with_timezone(&tz).naive_local();

        self.schedule
            .occurrences_between(from_local, until_local)
            .flat_map(move |local| resolve_local(tz, local))
            .filter(move |t| *t > last && *t <= until)
    }
}

/// Seconds and sub-seconds truncated.
pub fn floor_to_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    t.with_second(0).and_then(|t| t.with_nanosecond(0)).unwrap_or(t)
}

fn require_utc<Z: TimeZone>(value: &DateTime<Z>, name: &str) -> Result<DateTime<Utc>> {
    let offset = value.offset().fix().local_minus_utc();
    if offset != 0 {
        return Err(JobsError::InvalidInput(format!(
            "only UTC values should be passed as `{}`, got offset {}s",
            name, offset
        )));
    }
    Ok(value.with_timezone(&Utc))
}

/// How far the wall clock turns back within a few hours after `at`.
/// Zero unless a fall-back transition is coming up.
fn clock_rollback(tz: Tz, at: DateTime<Utc>) -> Duration {
    let offset = |t: DateTime<Utc>| t.with_timezone(&tz).offset().fix().local_minus_utc();
    let fallback = offset(at) - offset(at + Duration::hours(ROLLBACK_LOOKAHEAD_HOURS));
    Duration::seconds(i64::from(fallback.max(0)))
}

/// Wall-clock time to UTC. Gap times yield nothing; overlap times yield both instants.
fn resolve_local(tz: Tz, local: NaiveDateTime) -> impl Iterator<Item = DateTime<Utc>> {
    let (first, second) = match tz.from_local_datetime(&local) {
        LocalResult::Single(t) => (Some(t), None),
        LocalResult::Ambiguous(earliest, latest) => (Some(earliest), Some(latest)),
        LocalResult::None => (None, None),
    };
    first.into_iter().chain(second).map(|t| t.with_timezone(&Utc))
}
