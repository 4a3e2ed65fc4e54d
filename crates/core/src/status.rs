//! Economic-status classification.
//!
//! Status is derived from monthly income on every read and never stored.
//! Each band is inclusive on its lower bound:
//!
//! | Income (Rp / month)             | Status          |
//! |---------------------------------|-----------------|
//! | `< 1,000,000`                   | `SeverelyPoor`  |
//! | `1,000,000 ..< 2,000,000`       | `Poor`          |
//! | `>= 2,000,000`                  | `Vulnerable`    |

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// Lower bound of the `Poor` band.
pub const POOR_THRESHOLD: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// Lower bound of the `Vulnerable` band.
pub const VULNERABLE_THRESHOLD: Decimal = Decimal::from_parts(2_000_000, 0, 0, false, 0);

/// Marker / badge color used when a record's status cannot be derived.
pub const UNKNOWN_STATUS_COLOR: &str = "#3b82f6";

/// Label shown when a record's status cannot be derived.
pub const UNKNOWN_STATUS_LABEL: &str = "Tidak Diketahui";

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Ordinal poverty tier, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EconomicStatus {
    SeverelyPoor,
    Poor,
    Vulnerable,
}

impl EconomicStatus {
    pub const ALL: [EconomicStatus; 3] = [Self::SeverelyPoor, Self::Poor, Self::Vulnerable];

    /// Stable key for logging and query strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SeverelyPoor => "severely_poor",
            Self::Poor => "poor",
            Self::Vulnerable => "vulnerable",
        }
    }

    /// Display label used on badges and in the map legend.
    pub fn label(&self) -> &'static str {
        match self {
            Self::SeverelyPoor => "Sangat Miskin",
            Self::Poor => "Miskin",
            Self::Vulnerable => "Rentan Miskin",
        }
    }

    /// Marker fill color.
    pub fn color(&self) -> &'static str {
        match self {
            Self::SeverelyPoor => "#ef4444",
            Self::Poor => "#f59e0b",
            Self::Vulnerable => "#22c55e",
        }
    }
}

impl std::fmt::Display for EconomicStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Map a monthly income to its economic-status tier.
pub fn classify(income: Decimal) -> EconomicStatus {
    if income < POOR_THRESHOLD {
        EconomicStatus::SeverelyPoor
    } else if income < VULNERABLE_THRESHOLD {
        EconomicStatus::Poor
    } else {
        EconomicStatus::Vulnerable
    }
}

/// Parse a string-encoded income as transmitted by the API.
///
/// Surrounding whitespace is ignored. Non-numeric and negative values are
/// rejected with [`CoreError::InvalidIncome`].
pub fn parse_income(raw: &str) -> Result<Decimal, CoreError> {
    let trimmed = raw.trim();
    let value = Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| CoreError::InvalidIncome {
            value: raw.to_string(),
        })?;

    if value.is_sign_negative() && !value.is_zero() {
        return Err(CoreError::InvalidIncome {
            value: raw.to_string(),
        });
    }
    Ok(value)
}

/// Parse and classify a string-encoded income in one step.
pub fn classify_raw(raw: &str) -> Result<EconomicStatus, CoreError> {
    parse_income(raw).map(classify)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
