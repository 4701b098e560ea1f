//! Cron recurrence and window iteration.
//!
//! Two dialects are accepted, and nothing else:
//! - standard five-field cron plus the `@hourly`-style descriptors
//! - `@every <duration>`, firing at a constant delay truncated to whole seconds
//!
//! Durations use the `<number><unit>` grammar (`15m`, `1h30m`, `-1.5h`,
//! `300ms`) shared with experiment durations and time offsets.

use chrono::{DateTime, Duration, Utc};
use std::fmt;

use crate::error::{SchedulerError, ValidationError};

/// Upper bound on window iterations, both in `iterate_next` and resume.
pub const ITER_MAX: usize = 10_000;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// A parsed scheduler expression.
pub enum CronSchedule {
    /// `@every <d>`
    Every(Duration),
    /// Standard cron via croner
    Standard { expr: String, cron: croner::Cron },
}

impl fmt::Debug for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CronSchedule::Every(d) => write!(f, "@every {}", format_duration(*d)),
            CronSchedule::Standard { expr, .. } => write!(f, "{}", expr),
        }
    }
}

impl CronSchedule {
    /// Parse a scheduler expression.
    pub fn parse(expr: &str) -> Result<Self, SchedulerError> {
        let trimmed = expr.trim();
        let parse_err = |reason: String| SchedulerError::Parse {
            expr: expr.to_string(),
            reason,
        };

        if let Some(rest) = trimmed.strip_prefix("@every ") {
            let delay = parse_duration(rest.trim()).map_err(|e| parse_err(e.to_string()))?;
            // Sub-second delays round up to one second, the rest truncate.
            let secs = delay.num_seconds().max(1);
            return Ok(CronSchedule::Every(Duration::seconds(secs)));
        }

        let normalized = match trimmed {
            "@midnight" => "@daily",
            "@annually" => "@yearly",
            other => other,
        };
        if !normalized.starts_with('@') && normalized.split_whitespace().count() != 5 {
            return Err(parse_err(format!(
                "expected exactly 5 fields, found {}",
                normalized.split_whitespace().count()
            )));
        }

        let cron = croner::Cron::new(normalized)
            .parse()
            .map_err(|e| parse_err(e.to_string()))?;
        Ok(CronSchedule::Standard {
            expr: trimmed.to_string(),
            cron,
        })
    }

    /// The earliest firing strictly after `t`.
    pub fn next_after(&self, t: DateTime<Utc>) -> Result<DateTime<Utc>, SchedulerError> {
        match self {
            CronSchedule::Every(delay) => {
                let subsec = Duration::nanoseconds(i64::from(t.timestamp_subsec_nanos()));
                Ok(t + *delay - subsec)
            }
            CronSchedule::Standard { expr, cron } => {
                cron.find_next_occurrence(&t, false)
                    .map_err(|e| SchedulerError::Parse {
                        expr: expr.clone(),
                        reason: e.to_string(),
                    })
            }
        }
    }
}

/// Compute the window after one starting at `start`.
///
/// Returns `(next_start, next_recover)` with `next_recover = start + duration`
/// and `next_start` the first firing after `start` that is not before
/// `next_recover`. Durations longer than the cron period skip firings.
pub fn iterate_next(
    schedule: Option<&CronSchedule>,
    start: DateTime<Utc>,
    duration: Duration,
) -> Result<(DateTime<Utc>, DateTime<Utc>), SchedulerError> {
    let schedule = schedule.ok_or(SchedulerError::Misdefined)?;

    let next_recover = start + duration;
    let mut next_start = schedule.next_after(start)?;

    let mut counter = 0;
    while next_recover > next_start {
        next_start = schedule.next_after(next_start)?;
        counter += 1;
        if counter > ITER_MAX {
            return Err(SchedulerError::IterationsExceeded {
                limit: ITER_MAX,
                context: format!(
                    "iterating with nextRecover({}) nextStart({})",
                    next_recover, next_start
                ),
            });
        }
    }

    Ok((next_start, next_recover))
}

// ============================================================================
// DURATION GRAMMAR
// ============================================================================

/// Parse a duration such as `15m`, `1h30m`, `-1.5h` or `300ms`.
pub fn parse_duration(input: &str) -> Result<Duration, ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidDuration {
        value: input.to_string(),
        reason: reason.to_string(),
    };

    let mut rest = input.trim();
    let mut negative = false;
    if let Some(r) = rest.strip_prefix('-') {
        negative = true;
        rest = r;
    } else if let Some(r) = rest.strip_prefix('+') {
        rest = r;
    }

    if rest == "0" {
        return Ok(Duration::zero());
    }
    if rest.is_empty() {
        return Err(invalid("empty duration"));
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| invalid("missing unit"))?;
        if number_len == 0 {
            return Err(invalid("expected a number"));
        }
        let (number, tail) = rest.split_at(number_len);

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);

        let unit_nanos: u128 = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => NANOS_PER_SEC,
            "m" => 60 * NANOS_PER_SEC,
            "h" => 3_600 * NANOS_PER_SEC,
            _ => return Err(invalid("unknown unit")),
        };

        let (whole, frac) = match number.split_once('.') {
            Some((w, f)) => (w, f),
            None => (number, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid("expected a number"));
        }
        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid("number out of range"))?
        };
        let out_of_range = || invalid("duration out of range");
        total = whole
            .checked_mul(unit_nanos)
            .and_then(|n| total.checked_add(n))
            .ok_or_else(out_of_range)?;

        if !frac.is_empty() {
            if frac.contains('.') {
                return Err(invalid("malformed fraction"));
            }
            let mut scale = unit_nanos;
            for digit in frac.chars() {
                scale /= 10;
                if scale == 0 {
                    break;
                }
                total = total
                    .checked_add(u128::from(digit.to_digit(10).unwrap_or(0)) * scale)
                    .ok_or_else(out_of_range)?;
            }
        }

        rest = tail;
    }

    let nanos = i64::try_from(total).map_err(|_| invalid("duration out of range"))?;
    Ok(Duration::nanoseconds(if negative { -nanos } else { nanos }))
}

/// Render a duration the same way it would be written in a spec (`15m0s`).
pub fn format_duration(d: Duration) -> String {
    let nanos = d
        .num_nanoseconds()
        .map(i128::from)
        .unwrap_or_else(|| i128::from(d.num_milliseconds()) * 1_000_000);
    if nanos == 0 {
        return "0s".to_string();
    }

    let mut out = String::new();
    if nanos < 0 {
        out.push('-');
    }
    let mut rem = nanos.unsigned_abs();

    if rem < NANOS_PER_SEC {
        let (unit, div) = if rem < 1_000 {
            ("ns", 1)
        } else if rem < 1_000_000 {
            ("µs", 1_000)
        } else {
            ("ms", 1_000_000)
        };
        out.push_str(&with_fraction(rem, div));
        out.push_str(unit);
        return out;
    }

    let hours = rem / (3_600 * NANOS_PER_SEC);
    rem %= 3_600 * NANOS_PER_SEC;
    let minutes = rem / (60 * NANOS_PER_SEC);
    rem %= 60 * NANOS_PER_SEC;

    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{}m", minutes));
    }
    out.push_str(&with_fraction(rem, NANOS_PER_SEC));
    out.push('s');
    out
}

fn with_fraction(value: u128, div: u128) -> String {
    let whole = value / div;
    let frac = value % div;
    if frac == 0 {
        return whole.to_string();
    }
    let width = div.to_string().len() - 1;
    let digits = format!("{:0width$}", frac, width = width);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}
