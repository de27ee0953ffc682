//! Human-scaled formatting of sample values.

use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// The units a sample type may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitKind {
    Count,
    Bytes,
    Nanoseconds,
}

struct UnitScale {
    suffixes: &'static [&'static str],
    divisor: f64,
    /// Significant digits; zero prints a plain integer.
    digits: u32,
}

const COUNT: UnitScale = UnitScale {
    suffixes: &[""],
    divisor: 1000.0,
    digits: 0,
};

const BYTES: UnitScale = UnitScale {
    suffixes: &["B", "KiB", "MiB", "GiB", "TiB", "PiB"],
    divisor: 1024.0,
    digits: 3,
};

const NANOSECONDS: UnitScale = UnitScale {
    suffixes: &["ns", "µs", "ms", "s"],
    divisor: 1000.0,
    digits: 3,
};

impl UnitKind {
    fn scale(self) -> &'static UnitScale {
        match self {
            UnitKind::Count => &COUNT,
            UnitKind::Bytes => &BYTES,
            UnitKind::Nanoseconds => &NANOSECONDS,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UnitKind::Count => "count",
            UnitKind::Bytes => "bytes",
            UnitKind::Nanoseconds => "nanoseconds",
        }
    }
}

impl FromStr for UnitKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "count" => Ok(UnitKind::Count),
            "bytes" => Ok(UnitKind::Bytes),
            "nanoseconds" => Ok(UnitKind::Nanoseconds),
            other => Err(Error::UnsupportedUnit(other.to_string())),
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cost scaled to a readable magnitude.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scaled {
    pub value: String,
    pub unit: &'static str,
}

/// Scale `cost` into the largest unit that keeps it above the display threshold.
pub fn scale(kind: UnitKind, cost: i64) -> Scaled {
    let scale = kind.scale();
    let threshold = 10f64.powi(scale.digits as i32);

    let mut value = cost as f64;
    let mut step = 0;
    while value.abs() >= threshold && step + 1 < scale.suffixes.len() {
        value /= scale.divisor;
        step += 1;
    }

    Scaled {
        value: significant(value, scale.digits),
        unit: scale.suffixes[step],
    }
}

/// Share of `total` taken by `cost`, rounded to a whole percent.
pub fn percent(cost: i64, total: i64) -> String {
    if total == 0 {
        return "0%".to_string();
    }
    format!("{}%", (cost as f64 * 100.0 / total as f64).round() as i64)
}

/// Scaled value, unit and percentage, e.g. `2.00 KiB (50%)`.
pub fn format(kind: UnitKind, cost: i64, total: i64) -> String {
    let scaled = scale(kind, cost);
    format!("{} {} ({})", scaled.value, scaled.unit, percent(cost, total))
}

fn significant(value: f64, digits: u32) -> String {
    if digits == 0 {
        return format!("{}", value.round() as i64);
    }
    if value == 0.0 {
        return format!("{:.*}", digits as usize - 1, 0.0);
    }
    let magnitude = value.abs().log10().floor() as i64;
    let decimals = (digits as i64 - 1 - magnitude).max(0) as usize;
    format!("{:.*}", decimals, value)
}
