//! Human-readable size parsing.
//!
//! Supports the size grammar used by container CLIs:
//! - Binary (powers of 1024): "512m", "1g", "256MiB", "1.5GB" for memory limits
//! - Decimal (powers of 1000): "64k", "1M" for sizes like `--shm-size`
//!
//! An empty string always resolves to `0`, which callers treat as "unset".

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{KeelError, KeelResult};

static SIZE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+(?:\.\d+)*) ?([kKmMgGtTpP])?[iI]?[bB]?$").expect("size regex is valid")
});

/// Multiplier base for size suffixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitBase {
    /// k = 1024, m = 1024^2, ...
    Binary,
    /// k = 1000, m = 1000^2, ...
    Decimal,
}

impl UnitBase {
    const fn step(self) -> f64 {
        match self {
            Self::Binary => 1024.0,
            Self::Decimal => 1000.0,
        }
    }
}

/// Parse a size string into bytes.
///
/// `field` names the option being parsed and is carried into the error.
pub fn parse_size(field: &str, value: &str, base: UnitBase) -> KeelResult<i64> {
    if value.is_empty() {
        return Ok(0);
    }

    let caps = SIZE_RE
        .captures(value)
        .ok_or_else(|| KeelError::unit(field, value))?;

    let number: f64 = caps[1].parse().map_err(|_| KeelError::unit(field, value))?;

    let exponent = match caps.get(2).map(|m| m.as_str().to_ascii_lowercase()) {
        None => 0,
        Some(suffix) => match suffix.as_str() {
            "k" => 1,
            "m" => 2,
            "g" => 3,
            "t" => 4,
            "p" => 5,
            _ => return Err(KeelError::unit(field, value)),
        },
    };

    let bytes = number * base.step().powi(exponent);
    if !bytes.is_finite() || bytes > i64::MAX as f64 {
        return Err(KeelError::unit(field, value));
    }

    #[allow(clippy::cast_possible_truncation)]
    Ok(bytes as i64)
}

/// Parse a memory size with binary multipliers ("256MiB" == 268435456).
pub fn ram_in_bytes(field: &str, value: &str) -> KeelResult<i64> {
    parse_size(field, value, UnitBase::Binary)
}

/// Parse a size with decimal multipliers ("64k" == 64000).
pub fn human_size(field: &str, value: &str) -> KeelResult<i64> {
    parse_size(field, value, UnitBase::Decimal)
}

/// Format a byte count for diagnostics ("4MiB", "1.5GiB", "512B").
#[must_use]
pub fn format_bytes(bytes: i64) -> String {
    const UNITS: [&str; 5] = ["KiB", "MiB", "GiB", "TiB", "PiB"];

    #[allow(clippy::cast_precision_loss)]
    let mut value = bytes as f64;
    if value.abs() < 1024.0 {
        return format!("{bytes}B");
    }

    let mut unit = "B";
    for next in UNITS {
        if value.abs() < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = next;
    }

    let number = format!("{value:.3}");
    let number = number.trim_end_matches('0').trim_end_matches('.');
    format!("{number}{unit}")
}
