//! Date window resolution for monthly reports
//!
//! Turns loose year/month/day/to_day parameters into a concrete date range and
//! the cache keys that identify it. Without parameters the window is the prior
//! calendar month. Days past the end of the month are clamped to its last day.

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::cache::{CacheKey, Ttl};
use crate::error::{ReportError, Result};

/// Window parameters as supplied by a caller. Zero month/day values count as absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowParams {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
    pub to_day: Option<u32>,
}

/// A resolved report window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// The window ends in the current calendar month
    pub is_current_month: bool,
    /// Key of the exact window
    pub range_key: CacheKey,
    /// Key of the enclosing full month, only set when it differs from `range_key`
    pub month_key: Option<CacheKey>,
}

impl DateWindow {
    /// Resolve parameters against `today`
    pub fn resolve(params: &WindowParams, today: NaiveDate) -> Result<Self> {
        let invalid = || ReportError::InvalidWindow(*params);

        let prior_month = first_of_month(today)
            .checked_sub_months(Months::new(1))
            .ok_or_else(invalid)?;

        let year = params.year.unwrap_or(prior_month.year());
        let month = given(params.month)
            .map(|m| m.clamp(1, 12))
            .unwrap_or(prior_month.month());

        let month_start = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
        let month_end = last_of_month(month_start).ok_or_else(invalid)?;

        let from = given(params.day)
            .map(|day| with_clamped_day(month_start, month_end, day))
            .unwrap_or(month_start);
        let to = given(params.to_day)
            .map(|day| with_clamped_day(month_start, month_end, day))
            .unwrap_or(month_end);

        let range_key = CacheKey::statement(from, to);
        let full_month_key = CacheKey::statement(month_start, month_end);
        let month_key = (full_month_key != range_key).then_some(full_month_key);

        Ok(Self {
            from,
            to,
            is_current_month: to.year() == today.year() && to.month() == today.month(),
            range_key,
            month_key,
        })
    }

    /// Cache lifetime for a report built over this window
    pub fn ttl(&self) -> Ttl {
        if self.is_current_month {
            Ttl::CURRENT_MONTH
        } else if self.month_key.is_none() {
            Ttl::FULL_MONTH
        } else {
            Ttl::PARTIAL_RANGE
        }
    }

    /// `to_day` fell before `day`, so the window covers no dates
    pub fn is_empty(&self) -> bool {
        self.from > self.to
    }

    /// First and last day-of-month covered by the window
    pub fn day_range(&self) -> (u32, u32) {
        (self.from.day(), self.to.day())
    }
}

/// Number of days in the month containing `date`
pub fn days_in_month(date: NaiveDate) -> u32 {
    last_of_month(first_of_month(date))
        .map(|d| d.day())
        .unwrap_or(31)
}

fn given(value: Option<u32>) -> Option<u32> {
    value.filter(|v| *v != 0)
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn last_of_month(month_start: NaiveDate) -> Option<NaiveDate> {
    month_start
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
}

fn with_clamped_day(month_start: NaiveDate, month_end: NaiveDate, day: u32) -> NaiveDate {
    month_start
        .with_day(day.clamp(1, month_end.day()))
        .unwrap_or(month_end)
}
