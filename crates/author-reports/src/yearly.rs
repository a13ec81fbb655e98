//! Yearly summaries from the monthly earnings history

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::aggregate::round2;
use crate::cache::{self, CacheKey, CacheStore, Ttl};
use crate::envato::MarketplaceApi;
use crate::error::Result;
use crate::reports::ReportBuilder;

/// One month of account history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyEarnings {
    /// First day of the month
    pub month: NaiveDate,
    pub sales: u64,
    pub earnings: f64,
}

/// Sales and earnings for one month of the year
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthSummary {
    pub sales: u64,
    pub amount: f64,
}

/// Month number (1-12) to summary, only months present in the history
pub type YearlyAggregate = BTreeMap<u32, MonthSummary>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct YearTotals {
    pub sales: u64,
    pub earnings: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct YearlyReport {
    pub yearly: YearlyAggregate,
    pub totals: YearTotals,
}

/// Summarize the history rows falling in `year`
pub fn summarize_year(history: &[MonthlyEarnings], year: i32) -> YearlyReport {
    let mut report = YearlyReport::default();

    for row in history.iter().filter(|row| row.month.year() == year) {
        let month = report.yearly.entry(row.month.month()).or_default();
        month.sales += row.sales;
        month.amount = round2(month.amount + row.earnings);

        report.totals.sales += row.sales;
        report.totals.earnings = round2(report.totals.earnings + row.earnings);
    }

    report
}

impl<A, C> ReportBuilder<A, C>
where
    A: MarketplaceApi,
    C: CacheStore,
{
    /// Build the yearly summary, defaulting to the current year
    pub async fn yearly_report(&self, year: Option<i32>) -> Result<YearlyReport> {
        let year = year.unwrap_or_else(|| self.today().year());
        let key = CacheKey::Yearly { year };

        let history: Vec<MonthlyEarnings> = match cache::load(&self.cache, &key).await? {
            Some(history) => history,
            None => {
                let history = self.api.earnings_by_month().await?;
                cache::save(&self.cache, &key, &history, Ttl::FULL_MONTH).await?;
                info!(year, months = history.len(), "cached earnings history");
                history
            }
        };

        let report = summarize_year(&history, year);
        debug!(
            year,
            months = report.yearly.len(),
            sales = report.totals.sales,
            "built yearly report"
        );

        Ok(report)
    }
}
