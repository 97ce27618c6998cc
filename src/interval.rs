//! ISO 8601 durations, as used for the archive chunk interval.
//!
//! Only components with a fixed length are accepted: weeks, days, hours, minutes and
//! (possibly fractional) seconds. Years and months are rejected since an archive grid
//! built on them would drift.

use chrono::TimeDelta;

use crate::error::{Error, Result};

const SECOND_MS: i64 = 1_000;
const MINUTE_MS: i64 = 60 * SECOND_MS;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;
const WEEK_MS: i64 = 7 * DAY_MS;

/// Parse an ISO 8601 duration such as `PT10M`, `P1DT12H` or `PT2.5S`.
///
/// The result is always strictly positive and has millisecond precision.
pub fn parse_duration(input: &str) -> Result<TimeDelta> {
    let invalid = |reason| Error::InvalidInterval {
        input: input.to_string(),
        reason,
    };

    let rest = input
        .trim()
        .strip_prefix('P')
        .ok_or_else(|| invalid("missing leading 'P'"))?;

    let mut total_ms: i64 = 0;
    let mut number = String::new();
    let mut in_time = false;
    let mut last_rank = 0u8;

    for c in rest.chars() {
        match c {
            '0'..='9' | '.' => number.push(c),
            // Comma is the ISO 8601 preferred decimal sign.
            ',' => number.push('.'),
            'T' => {
                if in_time || !number.is_empty() {
                    return Err(invalid("misplaced 'T'"));
                }
                in_time = true;
            }
            designator => {
                if number.is_empty() {
                    return Err(invalid("designator without a value"));
                }

                let (rank, unit_ms) = match (in_time, designator) {
                    (false, 'Y') | (false, 'M') => {
                        return Err(invalid("years and months have no fixed length"))
                    }
                    (false, 'W') => (1, WEEK_MS),
                    (false, 'D') => (2, DAY_MS),
                    (true, 'H') => (3, HOUR_MS),
                    (true, 'M') => (4, MINUTE_MS),
                    (true, 'S') => (5, SECOND_MS),
                    _ => return Err(invalid("unknown designator")),
                };
                if rank <= last_rank {
                    return Err(invalid("components out of order"));
                }
                last_rank = rank;

                let value: f64 = number.parse().map_err(|_| invalid("bad number"))?;
                let component_ms = (value * unit_ms as f64).round();
                if !component_ms.is_finite() || component_ms > i64::MAX as f64 {
                    return Err(invalid("out of range"));
                }
                total_ms = total_ms
                    .checked_add(component_ms as i64)
                    .ok_or_else(|| invalid("out of range"))?;
                number.clear();
            }
        }
    }

    if !number.is_empty() {
        return Err(invalid("trailing number without designator"));
    }
    if last_rank == 0 {
        return Err(invalid("no components"));
    }
    if in_time && last_rank < 3 {
        return Err(invalid("'T' without time components"));
    }
    if total_ms <= 0 {
        return Err(invalid("must be positive"));
    }

    TimeDelta::try_milliseconds(total_ms).ok_or_else(|| invalid("out of range"))
}

/// Render a duration back into ISO 8601 form, e.g. `P1DT2H30M` or `PT2.5S`.
pub fn format_duration(duration: TimeDelta) -> String {
    let mut ms = duration.num_milliseconds();
    let sign = if ms < 0 { "-" } else { "" };
    ms = ms.abs();

    let days = ms / DAY_MS;
    ms %= DAY_MS;
    let hours = ms / HOUR_MS;
    ms %= HOUR_MS;
    let minutes = ms / MINUTE_MS;
    ms %= MINUTE_MS;

    let mut out = format!("{sign}P");
    if days > 0 {
        out.push_str(&format!("{days}D"));
    }
    if hours == 0 && minutes == 0 && ms == 0 {
        if days == 0 {
            out.push_str("T0S");
        }
        return out;
    }

    out.push('T');
    if hours > 0 {
        out.push_str(&format!("{hours}H"));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes}M"));
    }
    if ms > 0 {
        let seconds = ms / SECOND_MS;
        let millis = ms % SECOND_MS;
        if millis == 0 {
            out.push_str(&format!("{seconds}S"));
        } else {
            let fraction = format!("{millis:03}");
            out.push_str(&format!("{seconds}.{}S", fraction.trim_end_matches('0')));
        }
    }

    out
}
