use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::CapmError;

/// Trading days per year used to annualize daily statistics.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Annual risk-free rate applied to Sharpe ratios when none is configured (3%).
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.03;

/// CAPM expected returns assume no risk-free rate unless one is supplied.
pub const DEFAULT_CAPM_RISK_FREE_RATE: f64 = 0.0;

/// Risk-free assumption shared by every statistic in a computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskPolicy {
    /// Annual rate as a fraction (0.03 = 3%).
    pub risk_free_rate: f64,
}

impl RiskPolicy {
    pub fn new(risk_free_rate: f64) -> Self {
        Self { risk_free_rate }
    }

    /// Policy for CAPM expected returns: `DEFAULT_CAPM_RISK_FREE_RATE`.
    pub fn capm_default() -> Self {
        Self::new(DEFAULT_CAPM_RISK_FREE_RATE)
    }

    /// Rate in the percent units used by return tables.
    pub fn risk_free_pct(&self) -> f64 {
        self.risk_free_rate * 100.0
    }
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RISK_FREE_RATE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeriodUnit {
    Day,
    Week,
    Month,
    Year,
}

/// Trailing window such as `5y`, `6mo`, `2wk` or `30d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrailingPeriod {
    pub amount: u32,
    pub unit: PeriodUnit,
}

impl TrailingPeriod {
    /// First day of the window ending at `end`.
    pub fn start_from(&self, end: NaiveDate) -> Option<NaiveDate> {
        match self.unit {
            PeriodUnit::Day => end.checked_sub_days(Days::new(self.amount as u64)),
            PeriodUnit::Week => end.checked_sub_days(Days::new(self.amount as u64 * 7)),
            PeriodUnit::Month => end.checked_sub_months(Months::new(self.amount)),
            PeriodUnit::Year => end.checked_sub_months(Months::new(self.amount.checked_mul(12)?)),
        }
    }
}

impl FromStr for TrailingPeriod {
    type Err = CapmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim().to_ascii_lowercase();
        let split = raw
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| CapmError::InvalidPeriod(s.to_string()))?;
        let (digits, suffix) = raw.split_at(split);

        let amount: u32 = digits
            .parse()
            .map_err(|_| CapmError::InvalidPeriod(s.to_string()))?;
        if amount == 0 {
            return Err(CapmError::InvalidPeriod(s.to_string()));
        }

        let unit = match suffix {
            "d" => PeriodUnit::Day,
            "wk" => PeriodUnit::Week,
            "mo" => PeriodUnit::Month,
            "y" => PeriodUnit::Year,
            _ => return Err(CapmError::InvalidPeriod(s.to_string())),
        };

        Ok(Self { amount, unit })
    }
}

impl fmt::Display for TrailingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suffix = match self.unit {
            PeriodUnit::Day => "d",
            PeriodUnit::Week => "wk",
            PeriodUnit::Month => "mo",
            PeriodUnit::Year => "y",
        };
        write!(f, "{}{}", self.amount, suffix)
    }
}

/// How far back to fetch prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lookback {
    /// Same calendar day `n` years ago up to today.
    Years(u32),
    Trailing(TrailingPeriod),
    Range { start: NaiveDate, end: NaiveDate },
}

impl Lookback {
    /// Resolve to an inclusive `(start, end)` date range relative to `today`.
    pub fn resolve(&self, today: NaiveDate) -> Result<(NaiveDate, NaiveDate), CapmError> {
        match *self {
            Lookback::Years(0) => Err(CapmError::InvalidPeriod("0 years".to_string())),
            Lookback::Years(n) => {
                let period = TrailingPeriod { amount: n, unit: PeriodUnit::Year };
                let start = period
                    .start_from(today)
                    .ok_or_else(|| CapmError::InvalidPeriod(format!("{} years", n)))?;
                Ok((start, today))
            }
            Lookback::Trailing(period) => {
                let start = period
                    .start_from(today)
                    .ok_or_else(|| CapmError::InvalidPeriod(period.to_string()))?;
                Ok((start, today))
            }
            Lookback::Range { start, end } => {
                if start > end {
                    return Err(CapmError::InvalidPeriod(format!("{} is after {}", start, end)));
                }
                Ok((start, end))
            }
        }
    }
}

impl fmt::Display for Lookback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lookback::Years(n) => write!(f, "{}y", n),
            Lookback::Trailing(p) => write!(f, "{}", p),
            Lookback::Range { start, end } => write!(f, "{}..{}", start, end),
        }
    }
}
