//! Age arithmetic.
//!
//! Ages are derived from elapsed days with fixed conversion ratios and floored,
//! while target dates advance on the calendar (a month is a calendar month).

use chrono::{DateTime, Duration, Months, NaiveDate, NaiveTime, Utc};

use crate::models::AgeUnit;

pub const DAYS_PER_WEEK: f64 = 7.0;
pub const DAYS_PER_MONTH: f64 = 30.4375;
pub const DAYS_PER_YEAR: f64 = 365.25;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// A child's age expressed in every supported unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Age {
    pub days: i64,
    pub weeks: i64,
    pub months: i64,
    pub years: i64,
}

impl Age {
    /// Age at `as_of`. Birth dates in the future yield negative ages.
    ///
    /// Every unit is floored from the exact elapsed time in fractional days
    /// since midnight of the birth date, not from whole days: a child 30.5
    /// days old is 30 days but 1 month (30.5 / 30.4375) old.
    pub fn between(birth_date: NaiveDate, as_of: DateTime<Utc>) -> Self {
        let elapsed = as_of - start_of_day(birth_date);
        let days = elapsed.num_milliseconds() as f64 / MILLIS_PER_DAY;

        Self {
            days: days.floor() as i64,
            weeks: (days / DAYS_PER_WEEK).floor() as i64,
            months: (days / DAYS_PER_MONTH).floor() as i64,
            years: (days / DAYS_PER_YEAR).floor() as i64,
        }
    }

    pub fn in_unit(&self, unit: AgeUnit) -> i64 {
        match unit {
            AgeUnit::Days => self.days,
            AgeUnit::Weeks => self.weeks,
            AgeUnit::Months => self.months,
            AgeUnit::Years => self.years,
        }
    }
}

/// Midnight UTC of `date`
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Moves `date` forward (or back, for negative amounts) by `amount` units.
///
/// Month and year steps clamp to the last valid day of the target month.
/// Results outside chrono's range saturate.
pub fn advance(date: NaiveDate, unit: AgeUnit, amount: i32) -> NaiveDate {
    let saturated = if amount < 0 { NaiveDate::MIN } else { NaiveDate::MAX };

    let moved = match unit {
        AgeUnit::Days => date.checked_add_signed(Duration::days(i64::from(amount))),
        AgeUnit::Weeks => date.checked_add_signed(Duration::weeks(i64::from(amount))),
        AgeUnit::Months => add_months(date, i64::from(amount)),
        AgeUnit::Years => add_months(date, i64::from(amount) * 12),
    };

    moved.unwrap_or(saturated)
}

fn add_months(date: NaiveDate, months: i64) -> Option<NaiveDate> {
    let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        date.checked_add_months(magnitude)
    } else {
        date.checked_sub_months(magnitude)
    }
}
