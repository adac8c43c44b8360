//! Lightweight cron expression parser.
//! Supports: "MIN HOUR DOM MON DOW" (5-field, no seconds), evaluated in UTC.
//! Per field: *, */N, N, A-B, A-B/N and comma-separated lists of those.
//! Months accept JAN-DEC and days of week SUN-SAT (case-insensitive).
//! Example: "0 8 * * 1-5" or "0 8 * * MON-FRI" = weekdays at 8:00
//!
//! Parsed once into bitmasks; `next_fire_after` is a pure function of the mask
//! and the reference time.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};

use repowatch_core::error::{RepoWatchError, Result};

/// How far ahead to search before declaring an expression unsatisfiable
/// (e.g. "0 0 31 2 *").
const SEARCH_HORIZON_DAYS: i64 = 366 * 5;

const MONTH_NAMES: &[&str] = &[
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];
const DAY_NAMES: &[&str] = &["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// A parsed cron expression, kept alongside its source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    minutes: u64,
    hours: u32,
    days_of_month: u32,
    months: u16,
    days_of_week: u8,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronSchedule {
    /// Parse a 5-field expression.
    pub fn parse(expression: &str) -> Result<Self> {
        let parts: Vec<&str> = expression.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(RepoWatchError::Cron(format!(
                "'{expression}' needs 5 fields: MIN HOUR DOM MON DOW"
            )));
        }

        let field = |idx: usize, min: u32, max: u32, names: &[&str], label: &str| {
            parse_field(parts[idx], min, max, names).ok_or_else(|| {
                RepoWatchError::Cron(format!(
                    "invalid {label} field '{}' in '{expression}'",
                    parts[idx]
                ))
            })
        };

        let minutes = field(0, 0, 59, &[], "minute")?;
        let hours = field(1, 0, 23, &[], "hour")?;
        let days_of_month = field(2, 1, 31, &[], "day-of-month")?;
        let months = field(3, 1, 12, MONTH_NAMES, "month")?;
        // 7 is an alias for Sunday.
        let mut days_of_week = field(4, 0, 7, DAY_NAMES, "day-of-week")?;
        if days_of_week & (1 << 7) != 0 {
            days_of_week |= 1;
        }

        Ok(Self {
            expression: expression.to_string(),
            minutes,
            hours: hours as u32,
            days_of_month: days_of_month as u32,
            months: months as u16,
            days_of_week: (days_of_week & 0x7f) as u8,
            dom_restricted: parts[2] != "*",
            dow_restricted: parts[4] != "*",
        })
    }

    /// First fire time strictly after `after`, at minute resolution.
    pub fn next_fire_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut candidate = after.with_second(0)?.with_nanosecond(0)? + Duration::minutes(1);
        let horizon = after + Duration::days(SEARCH_HORIZON_DAYS);

        while candidate <= horizon {
            if self.months & (1 << candidate.month()) == 0 {
                candidate = first_of_next_month(candidate)?;
                continue;
            }
            if !self.day_matches(candidate) {
                candidate = start_of_next_day(candidate)?;
                continue;
            }
            if self.hours & (1 << candidate.hour()) == 0 {
                candidate = candidate.with_minute(0)? + Duration::hours(1);
                continue;
            }
            if self.minutes & (1 << candidate.minute()) == 0 {
                candidate += Duration::minutes(1);
                continue;
            }
            return Some(candidate);
        }

        None
    }

    /// Vixie-cron day rule: when both DOM and DOW are restricted, either may match.
    fn day_matches(&self, t: DateTime<Utc>) -> bool {
        let dom = self.days_of_month & (1 << t.day()) != 0;
        let dow = self.days_of_week & (1 << t.weekday().num_days_from_sunday()) != 0;
        match (self.dom_restricted, self.dow_restricted) {
            (true, true) => dom || dow,
            (true, false) => dom,
            (false, true) => dow,
            (false, false) => true,
        }
    }
}

impl std::fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.expression)
    }
}

/// Parse an expression and compute the next run time.
pub fn next_run_from_cron(expression: &str, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match CronSchedule::parse(expression) {
        Ok(schedule) => schedule.next_fire_after(after),
        Err(e) => {
            tracing::warn!("Invalid cron expression: {e}");
            None
        }
    }
}

fn start_of_next_day(t: DateTime<Utc>) -> Option<DateTime<Utc>> {
    Some(t.date_naive().succ_opt()?.and_hms_opt(0, 0, 0)?.and_utc())
}

fn first_of_next_month(t: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let (y, m) = if t.month() == 12 {
        (t.year() + 1, 1)
    } else {
        (t.year(), t.month() + 1)
    };
    Some(NaiveDate::from_ymd_opt(y, m, 1)?.and_hms_opt(0, 0, 0)?.and_utc())
}

/// Parse a cron field into a bitmask of matching values.
fn parse_field(field: &str, min: u32, max: u32, names: &[&str]) -> Option<u64> {
    let mut mask = 0u64;
    for part in field.split(',') {
        mask |= parse_part(part.trim(), min, max, names)?;
    }
    (mask != 0).then_some(mask)
}

fn parse_part(part: &str, min: u32, max: u32, names: &[&str]) -> Option<u64> {
    // Optional "/N" step
    let (range, step) = match part.split_once('/') {
        Some((r, s)) => {
            let n: u32 = s.parse().ok()?;
            if n == 0 {
                return None;
            }
            (r, n)
        }
        None => (part, 1),
    };

    let (lo, hi) = if range == "*" {
        (min, max)
    } else if let Some((a, b)) = range.split_once('-') {
        (parse_value(a, min, names)?, parse_value(b, min, names)?)
    } else {
        let n = parse_value(range, min, names)?;
        // "N/step" means N..=max stepping
        if step > 1 { (n, max) } else { (n, n) }
    };

    if lo < min || hi > max || lo > hi {
        return None;
    }

    Some(
        (lo..=hi)
            .step_by(step as usize)
            .fold(0u64, |acc, v| acc | (1 << v)),
    )
}

/// A number, or a name whose position counts up from `min`.
fn parse_value(s: &str, min: u32, names: &[&str]) -> Option<u32> {
    if let Ok(n) = s.parse() {
        return Some(n);
    }
    let idx = names.iter().position(|name| name.eq_ignore_ascii_case(s))?;
    Some(min + idx as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_every_hour() {
        let after = at(2026, 2, 22, 10, 30, 0);
        let next = next_run_from_cron("0 * * * *", after).unwrap();
        assert_eq!(next.hour(), 11);
        assert_eq!(next.minute(), 0);
    }

    #[test]
    fn test_specific_time() {
        let after = at(2026, 2, 22, 7, 0, 0);
        let next = next_run_from_cron("0 8 * * *", after).unwrap();
        assert_eq!(next, at(2026, 2, 22, 8, 0, 0));
    }

    #[test]
    fn test_every_15_minutes() {
        let after = at(2026, 2, 22, 10, 2, 0);
        let next = next_run_from_cron("*/15 * * * *", after).unwrap();
        assert_eq!(next.minute(), 15);
    }

    #[test]
    fn test_strictly_after() {
        let s = CronSchedule::parse("0 */1 * * *").unwrap();
        let last = at(2024, 1, 15, 10, 0, 0);
        assert_eq!(s.next_fire_after(last), Some(at(2024, 1, 15, 11, 0, 0)));
        // Seconds past a match do not re-fire the same minute.
        assert_eq!(
            s.next_fire_after(at(2024, 1, 15, 11, 0, 30)),
            Some(at(2024, 1, 15, 12, 0, 0))
        );
    }

    #[test]
    fn test_day_rollover() {
        let s = CronSchedule::parse("30 2 * * *").unwrap();
        let next = s.next_fire_after(at(2024, 12, 31, 23, 0, 0)).unwrap();
        assert_eq!(next, at(2025, 1, 1, 2, 30, 0));
    }

    #[test]
    fn test_weekdays_range() {
        // 2024-01-13 is a Saturday
        let s = CronSchedule::parse("0 9 * * 1-5").unwrap();
        let next = s.next_fire_after(at(2024, 1, 13, 12, 0, 0)).unwrap();
        assert_eq!(next, at(2024, 1, 15, 9, 0, 0));
    }

    #[test]
    fn test_sunday_alias() {
        let s = CronSchedule::parse("0 0 * * 7").unwrap();
        let next = s.next_fire_after(at(2024, 1, 15, 0, 0, 0)).unwrap();
        assert_eq!(next, at(2024, 1, 21, 0, 0, 0));
    }

    #[test]
    fn test_day_and_month_names() {
        let named = CronSchedule::parse("0 9 * * MON-FRI").unwrap();
        let numeric = CronSchedule::parse("0 9 * * 1-5").unwrap();
        let from = at(2024, 1, 13, 12, 0, 0);
        assert_eq!(named.next_fire_after(from), numeric.next_fire_after(from));
        assert_eq!(named.next_fire_after(from), Some(at(2024, 1, 15, 9, 0, 0)));

        let s = CronSchedule::parse("0 0 1 mar,Sep sun").unwrap();
        assert_eq!(s, CronSchedule { expression: s.to_string(), ..CronSchedule::parse("0 0 1 3,9 0").unwrap() });

        assert!(CronSchedule::parse("0 9 * * MONDAY").is_err());
        assert!(CronSchedule::parse("0 9 * JAN-FOO *").is_err());
        assert!(CronSchedule::parse("0 MON * * *").is_err());
    }

    #[test]
    fn test_month_and_day() {
        let s = CronSchedule::parse("0 0 1 3,9 *").unwrap();
        let next = s.next_fire_after(at(2024, 3, 1, 0, 0, 0)).unwrap();
        assert_eq!(next, at(2024, 9, 1, 0, 0, 0));
    }

    #[test]
    fn test_dom_or_dow() {
        // 15th of the month OR Mondays; 2024-01-08 is a Monday
        let s = CronSchedule::parse("0 0 15 * 1").unwrap();
        let next = s.next_fire_after(at(2024, 1, 2, 0, 0, 0)).unwrap();
        assert_eq!(next, at(2024, 1, 8, 0, 0, 0));
    }

    #[test]
    fn test_list_and_stepped_range() {
        let s = CronSchedule::parse("5,10-20/5 * * * *").unwrap();
        let t = at(2024, 1, 1, 0, 0, 0);
        let a = s.next_fire_after(t).unwrap();
        let b = s.next_fire_after(a).unwrap();
        let c = s.next_fire_after(b).unwrap();
        let d = s.next_fire_after(c).unwrap();
        assert_eq!(
            [a.minute(), b.minute(), c.minute(), d.minute()],
            [5, 10, 15, 20]
        );
    }

    #[test]
    fn test_unsatisfiable() {
        let s = CronSchedule::parse("0 0 31 2 *").unwrap();
        assert!(s.next_fire_after(at(2024, 1, 1, 0, 0, 0)).is_none());
    }

    #[test]
    fn test_invalid_expression() {
        let after = Utc::now();
        assert!(next_run_from_cron("bad", after).is_none());
        assert!(CronSchedule::parse("60 * * * *").is_err());
        assert!(CronSchedule::parse("*/0 * * * *").is_err());
        assert!(CronSchedule::parse("5-1 * * * *").is_err());
        assert!(CronSchedule::parse("* * 0 * *").is_err());
    }
}
