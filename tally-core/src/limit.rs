use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::account::AccountNumber;

/// Per-account debit caps consulted by withdrawal and transfer operations.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitType {
    DailyWithdrawal,
    DailyTransfer,
    SingleTransaction,
    MonthlyWithdrawal,
}

impl LimitType {
    pub fn as_str(self) -> &'static str {
        match self {
            LimitType::DailyWithdrawal => "daily_withdrawal",
            LimitType::DailyTransfer => "daily_transfer",
            LimitType::SingleTransaction => "single_transaction",
            LimitType::MonthlyWithdrawal => "monthly_withdrawal",
        }
    }

    /// The accumulation window this cap applies over.
    pub fn period(self) -> LimitPeriod {
        match self {
            LimitType::DailyWithdrawal | LimitType::DailyTransfer => LimitPeriod::Daily,
            LimitType::SingleTransaction => LimitPeriod::PerTransaction,
            LimitType::MonthlyWithdrawal => LimitPeriod::Monthly,
        }
    }
}

impl fmt::Display for LimitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LimitType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily_withdrawal" => Ok(LimitType::DailyWithdrawal),
            "daily_transfer" => Ok(LimitType::DailyTransfer),
            "single_transaction" => Ok(LimitType::SingleTransaction),
            "monthly_withdrawal" => Ok(LimitType::MonthlyWithdrawal),
            other => Err(format!("unknown limit type: {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitPeriod {
    Daily,
    Monthly,
    PerTransaction,
}

impl LimitPeriod {
    /// Start of the window after the one containing `now`. Per-transaction
    /// caps never accumulate, so their window end is pushed far out.
    pub fn next_reset(self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            LimitPeriod::Daily => {
                let midnight = now.date_naive().and_hms_opt(0, 0, 0).expect("valid midnight");
                Utc.from_utc_datetime(&midnight) + Duration::days(1)
            }
            LimitPeriod::Monthly => {
                let (year, month) = if now.month() == 12 {
                    (now.year() + 1, 1)
                } else {
                    (now.year(), now.month() + 1)
                };
                Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
                    .single()
                    .expect("valid month start")
            }
            LimitPeriod::PerTransaction => now + Duration::days(365 * 100),
        }
    }
}

impl fmt::Display for LimitPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LimitPeriod::Daily => "daily",
            LimitPeriod::Monthly => "monthly",
            LimitPeriod::PerTransaction => "per_transaction",
        };
        f.write_str(name)
    }
}

impl FromStr for LimitPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(LimitPeriod::Daily),
            "monthly" => Ok(LimitPeriod::Monthly),
            "per_transaction" => Ok(LimitPeriod::PerTransaction),
            other => Err(format!("unknown limit period: {other}")),
        }
    }
}

/// One cap-and-usage counter. `used <= cap` must hold after every operation
/// that reserves against it; a breach aborts the whole operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LimitEntry {
    pub account: AccountNumber,
    pub limit_type: LimitType,
    pub cap: Decimal,
    pub used: Decimal,
    pub period: LimitPeriod,
    pub reset_at: DateTime<Utc>,
}

impl LimitEntry {
    /// Fresh entry with zero usage, windowed from `now`.
    pub fn new(
        account: AccountNumber,
        limit_type: LimitType,
        cap: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        let period = limit_type.period();
        Self {
            account,
            limit_type,
            cap,
            used: Decimal::ZERO,
            period,
            reset_at: period.next_reset(now),
        }
    }

    /// Whether the accumulation window has lapsed as of `now`.
    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        self.reset_at <= now
    }

    /// Usage that counts against the cap as of `now`. An expired window is
    /// treated as unused even before the sweep has zeroed it.
    pub fn effective_usage(&self, now: DateTime<Utc>) -> Decimal {
        if self.expired(now) {
            Decimal::ZERO
        } else {
            self.used
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn daily_reset_lands_on_next_midnight() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 17, 45, 12).unwrap();
        let reset = LimitPeriod::Daily.next_reset(now);
        assert_eq!(reset, Utc.with_ymd_and_hms(2024, 3, 16, 0, 0, 0).unwrap());
    }

    #[test]
    fn monthly_reset_rolls_over_december() {
        let now = Utc.with_ymd_and_hms(2024, 12, 20, 9, 0, 0).unwrap();
        let reset = LimitPeriod::Monthly.next_reset(now);
        assert_eq!(reset, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn expired_window_counts_as_unused() {
        let opened = Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap();
        let mut entry = LimitEntry::new(
            AccountNumber::from("ACC1"),
            LimitType::DailyWithdrawal,
            dec!(2000),
            opened,
        );
        entry.used = dec!(1500);

        let same_day = Utc.with_ymd_and_hms(2024, 3, 15, 23, 0, 0).unwrap();
        assert_eq!(entry.effective_usage(same_day), dec!(1500));

        let next_day = Utc.with_ymd_and_hms(2024, 3, 16, 0, 0, 1).unwrap();
        assert!(entry.expired(next_day));
        assert_eq!(entry.effective_usage(next_day), Decimal::ZERO);
    }
}
