//! nginx-style interval parsing (`"30s"`, `"2m"`, `"1h 30m"`)

use std::time::Duration;

use burrow_core::error::BurrowError;
use serde::{Deserialize, Serialize};

use crate::ConfigResult;

/// Milliseconds per unit suffix; a bare number means seconds
const UNITS: &[(&str, f64)] = &[
    ("ms", 1.0),
    ("s", 1_000.0),
    ("m", 60_000.0),
    ("h", 3_600_000.0),
    ("d", 86_400_000.0),
    ("w", 7.0 * 86_400_000.0),
    ("M", 30.0 * 86_400_000.0),
    ("y", 365.0 * 86_400_000.0),
];

/// An interval as written in config: a number of seconds or a unit string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntervalValue {
    Seconds(f64),
    Text(String),
}

impl IntervalValue {
    /// Convert to a duration, reporting problems against `field`
    pub fn to_duration(&self, field: &str) -> ConfigResult<Duration> {
        match self {
            IntervalValue::Seconds(seconds) => {
                Duration::try_from_secs_f64(*seconds).map_err(|_| invalid(field, &seconds.to_string()))
            },
            IntervalValue::Text(text) => parse_interval(text).map_err(|_| invalid(field, text)),
        }
    }
}

fn invalid(field: &str, value: &str) -> BurrowError {
    BurrowError::ConfigValidation {
        field: field.to_string(),
        reason: format!("invalid interval: {}", value),
    }
}

/// Parse an interval such as `"1h 30m"`.
///
/// Each whitespace-separated part is a number with an optional unit. Units
/// must strictly decrease from left to right and a unitless part (seconds)
/// may only appear on its own.
pub fn parse_interval(input: &str) -> ConfigResult<Duration> {
    let mut total_ms = 0.0;
    let mut last_unit = f64::INFINITY;

    for part in input.split_whitespace() {
        let (number, suffix) = split_number(part).ok_or_else(|| invalid("interval", input))?;

        let unit = if suffix.is_empty() {
            if last_unit != f64::INFINITY {
                return Err(invalid("interval", input));
            }
            1_000.0
        } else {
            UNITS
                .iter()
                .find(|(name, _)| *name == suffix)
                .map(|(_, ms)| *ms)
                .ok_or_else(|| invalid("interval", input))?
        };

        if unit >= last_unit {
            return Err(invalid("interval", input));
        }
        last_unit = unit;
        total_ms += number * unit;
    }

    // Whole nanoseconds, so integral millisecond totals stay exact
    let nanos = (total_ms * 1_000_000.0).round();
    if !nanos.is_finite() || nanos >= u64::MAX as f64 {
        return Err(invalid("interval", input));
    }
    Ok(Duration::from_nanos(nanos as u64))
}

/// Split `12.5ms` into `(12.5, "ms")`; integer part may not have leading zeros
fn split_number(part: &str) -> Option<(f64, &str)> {
    let int_end = part.find(|c: char| !c.is_ascii_digit()).unwrap_or(part.len());
    let int_part = &part[..int_end];
    if int_part.is_empty() || (int_part.len() > 1 && int_part.starts_with('0')) {
        return None;
    }

    let mut end = int_end;
    if let Some(fraction) = part[int_end..].strip_prefix('.') {
        let frac_len = fraction.find(|c: char| !c.is_ascii_digit()).unwrap_or(fraction.len());
        if frac_len == 0 {
            return None;
        }
        end = int_end + 1 + frac_len;
    }

    let number = part[..end].parse().ok()?;
    Some((number, &part[end..]))
}
