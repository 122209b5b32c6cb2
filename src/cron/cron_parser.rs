// src/cron/cron_parser.rs
use anyhow::{anyhow, bail, Context, Result};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

/// Horizon of the next-occurrence search. A schedule with nothing inside it
/// (e.g. `0 0 30 2 *`) is treated as never firing again.
const SEARCH_HORIZON_YEARS: i32 = 5;

/// Parsed cron schedule (no external cron crate).
///
/// Supports:
/// - 6-field:  `sec  min  hour  dom  mon  dow`
/// - 5-field:  `min  hour  dom  mon  dow`   (seconds = 0)
/// - aliases:  `@yearly`, `@annually`, `@monthly`, `@weekly`, `@daily`, `@midnight`, `@hourly`
///
/// Tokens per field:
/// ```text
/// *         -> any   (`?` too, in the day fields)
/// a         -> exact
/// a,b,c     -> list
/// a-b       -> range inclusive
/// */n       -> step over full range
/// a-b/n     -> stepped range
/// a/n       -> step from a to the end of the field
/// Names:
///   Months:   JAN..DEC
///   Weekdays: SUN,MON,TUE,WED,THU,FRI,SAT  (0/7 = SUN)
/// ```
///
/// All matching happens on wall-clock (naive) time; mapping to a concrete
/// zone is left to [`ScheduleInstant`](crate::cron::ScheduleInstant).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    sec: Field,
    min: Field,
    hour: Field,
    dom: Field,
    mon: Field,
    dow: Field,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Field {
    allowed: BTreeSet<u32>,
    /// Written as `*`/`?`. Only matters for the DOM/DOW OR rule.
    any: bool,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self> {
        let six = normalize_to_six(expression)?;
        let parts: Vec<&str> = six.split_whitespace().collect();

        let months = month_name_map();
        let weekdays = weekday_name_map();

        let sec = Field::parse(parts[0], 0, 59, None).context("seconds field")?;
        let min = Field::parse(parts[1], 0, 59, None).context("minutes field")?;
        let hour = Field::parse(parts[2], 0, 23, None).context("hours field")?;
        let dom = Field::parse(parts[3], 1, 31, None).context("day-of-month field")?;
        let mon = Field::parse(parts[4], 1, 12, Some(&months)).context("month field")?;
        let dow = Field::parse(parts[5], 0, 7, Some(&weekdays))
            .context("day-of-week field")?
            .sunday_folded();

        Ok(Self {
            expression: expression.trim().to_string(),
            sec,
            min,
            hour,
            dom,
            mon,
            dow,
        })
    }

    /// The expression as it was registered.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Earliest wall-clock time strictly after `after` that matches, or `None`
    /// if nothing matches within the search horizon.
    pub fn next_after(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
        let limit_year = after.year() + SEARCH_HORIZON_YEARS;
        let mut t = after.with_nanosecond(0)? + Duration::seconds(1);

        while t.year() <= limit_year {
            // 1) MONTH
            if !self.mon.matches(t.month()) {
                t = match self.mon.next_gt(t.month()) {
                    Some(m) => midnight(t.year(), m, 1)?,
                    None => midnight(t.year() + 1, self.mon.first()?, 1)?,
                };
                continue;
            }

            // 2) DAY (DOM/DOW with OR)
            if !self.matches_day(t.date()) {
                t = t.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }

            // 3) HOUR
            if !self.hour.matches(t.hour()) {
                t = match self.hour.next_gt(t.hour()) {
                    Some(h) => t.date().and_hms_opt(h, 0, 0)?,
                    None => t.date().succ_opt()?.and_hms_opt(0, 0, 0)?,
                };
                continue;
            }

            // 4) MINUTE
            if !self.min.matches(t.minute()) {
                t = match self.min.next_gt(t.minute()) {
                    Some(m) => t.date().and_hms_opt(t.hour(), m, 0)?,
                    None => t.date().and_hms_opt(t.hour(), 0, 0)? + Duration::hours(1),
                };
                continue;
            }

            // 5) SECOND
            if !self.sec.matches(t.second()) {
                t = match self.sec.next_gt(t.second()) {
                    Some(s) => t.with_second(s)?,
                    None => t.date().and_hms_opt(t.hour(), t.minute(), 0)? + Duration::minutes(1),
                };
                continue;
            }

            return Some(t);
        }

        None
    }

    /// Ascending wall-clock occurrences strictly after `after`.
    pub fn occurrences_after(&self, after: NaiveDateTime) -> impl Iterator<Item = NaiveDateTime> + '_ {
        std::iter::successors(self.next_after(after), move |t| self.next_after(*t))
    }

    /// Occurrences in `(after, until]`.
    pub fn occurrences_between(
        &self,
        after: NaiveDateTime,
        until: NaiveDateTime,
    ) -> impl Iterator<Item = NaiveDateTime> + '_ {
        self.occurrences_after(after).take_while(move |t| *t <= until)
    }

    /// DOM/DOW OR logic:
    /// - If both are Any => accept any day
    /// - Else day is valid if (DOM matches) OR (DOW matches)
    fn matches_day(&self, date: NaiveDate) -> bool {
        let dom_match = self.dom.matches(date.day());
        let dow_match = self.dow.matches(date.weekday().num_days_from_sunday());

        match (self.dom.any, self.dow.any) {
            (true, true) => true,
            (false, true) => dom_match,
            (true, false) => dow_match,
            (false, false) => dom_match || dow_match,
        }
    }
}

impl FromStr for CronSchedule {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

impl Field {
    fn parse(token: &str, min: u32, max: u32, names: Option<&HashMap<&'static str, u32>>) -> Result<Self> {
        let token = token.trim();
        if token == "*" || token == "?" {
            return Ok(Self {
                allowed: (min..=max).collect(),
                any: true,
            });
        }

        let mut allowed = BTreeSet::new();
        for part in token.split(',') {
            let part = part.trim();
            if part.is_empty() {
                bail!("Empty list item in '{}'", token);
            }

            let (range, step) = match part.split_once('/') {
                Some((range, step_s)) => {
                    let step: u32 = step_s
                        .parse()
                        .with_context(|| format!("Invalid step value '{}'", step_s))?;
                    if step == 0 {
                        bail!("Step must be > 0 in '{}'", part);
                    }
                    (range, Some(step))
                }
                None => (part, None),
            };

            let (lo, hi) = if range == "*" {
                (min, max)
            } else if let Some((a_s, b_s)) = range.split_once('-') {
                let a = parse_num(a_s, min, max, names)?;
                let b = parse_num(b_s, min, max, names)?;
                if a <= b { (a, b) } else { (b, a) }
            } else {
                let a = parse_num(range, min, max, names)?;
                if step.is_some() { (a, max) } else { (a, a) }
            };

            allowed.extend((lo..=hi).step_by(step.unwrap_or(1) as usize));
        }

        if allowed.is_empty() {
            bail!("'{}' matches nothing", token);
        }

        Ok(Self { allowed, any: false })
    }

    /// Day-of-week accepts 7 as an alias for Sunday.
    fn sunday_folded(mut self) -> Self {
        if self.allowed.remove(&7) {
            self.allowed.insert(0);
        }
        self
    }

    #[inline]
    fn matches(&self, v: u32) -> bool {
        self.allowed.contains(&v)
    }

    #[inline]
    fn first(&self) -> Option<u32> {
        self.allowed.iter().next().copied()
    }

    #[inline]
    fn next_gt(&self, v: u32) -> Option<u32> {
        self.allowed.range(v + 1..).next().copied()
    }
}

// --------- helpers ----------

fn normalize_to_six(expr: &str) -> Result<String> {
    let expr = expr.trim();
    let expanded = match expr.to_ascii_lowercase().as_str() {
        "@yearly" | "@annually" => "0 0 0 1 1 *".to_string(),
        "@monthly" => "0 0 0 1 * *".to_string(),
        "@weekly" => "0 0 0 * * 0".to_string(),
        "@daily" | "@midnight" => "0 0 0 * * *".to_string(),
        "@hourly" => "0 0 * * * *".to_string(),
        _ => expr.to_string(),
    };

    let parts: Vec<&str> = expanded.split_whitespace().collect();
    match parts.len() {
        5 => Ok(format!("0 {}", parts.join(" "))),
        6 => Ok(parts.join(" ")),
        n => Err(anyhow!("Expected 5 or 6 fields, got {} in '{}'", n, expr)),
    }
}

fn midnight(y: i32, m: u32, d: u32) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(y, m, d)?.and_hms_opt(0, 0, 0)
}

fn parse_num(token: &str, min: u32, max: u32, names: Option<&HashMap<&'static str, u32>>) -> Result<u32> {
    let t = token.trim();
    if let Some(map) = names {
        if let Some(&n) = map.get(t.to_ascii_uppercase().as_str()) {
            return Ok(n);
        }
    }
    let n = u32::from_str(t).with_context(|| format!("Invalid number '{}'", t))?;
    if n < min || n > max {
        bail!("Value {} out of range {}..={}", n, min, max);
    }
    Ok(n)
}

fn month_name_map() -> HashMap<&'static str, u32> {
    HashMap::from([
        ("JAN", 1), ("FEB", 2), ("MAR", 3), ("APR", 4), ("MAY", 5), ("JUN", 6),
        ("JUL", 7), ("AUG", 8), ("SEP", 9), ("OCT", 10), ("NOV", 11), ("DEC", 12),
    ])
}

fn weekday_name_map() -> HashMap<&'static str, u32> {
    // 0=SUN .. 6=SAT
    HashMap::from([
        ("SUN", 0), ("MON", 1), ("TUE", 2), ("WED", 3),
        ("THU", 4), ("FRI", 5), ("SAT", 6),
    ])
}
