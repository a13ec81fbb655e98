//! Cache-aware monthly report building
//!
//! A monthly report is answered, in order of preference, from:
//! 1. the exact window's cached report,
//! 2. the enclosing month's cached report, narrowed to the requested days,
//! 3. a fresh statement fetch, which is then cached under the exact window.

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::aggregate::{
    DailyAggregate, ItemAggregate, MonthTotals, daily_aggregate, item_aggregate, month_totals,
};
use crate::cache::{self, CacheStore};
use crate::constants;
use crate::envato::MarketplaceApi;
use crate::error::{ReportError, Result};
use crate::statement::{LedgerEntry, SaleRecord, normalize};
use crate::window::{DateWindow, WindowParams};

/// Monthly report; also the unit stored in the cache
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportEnvelope {
    pub sales: Vec<SaleRecord>,
    pub monthly: DailyAggregate,
    pub totals: MonthTotals,
    pub items: Vec<ItemAggregate>,
}

impl ReportEnvelope {
    /// Aggregate a full set of net sales
    pub fn from_sales(sales: Vec<SaleRecord>) -> Self {
        let monthly = daily_aggregate(&sales);
        let totals = month_totals(&monthly);
        let items = item_aggregate(&sales, &totals);

        Self {
            sales,
            monthly,
            totals,
            items,
        }
    }

    /// Re-aggregate over sales whose day-of-month lies in `[from_day, to_day]`
    pub fn narrowed_to_days(&self, from_day: u32, to_day: u32) -> Self {
        let sales = self
            .sales
            .iter()
            .filter(|sale| (from_day..=to_day).contains(&sale.day))
            .cloned()
            .collect();

        Self::from_sales(sales)
    }

    /// Keep one item's sales; daily and total figures are recomputed, the item ranking is not
    pub fn filtered_to_item(self, item_id: u64) -> Self {
        let sales: Vec<SaleRecord> = self
            .sales
            .into_iter()
            .filter(|sale| sale.item_id == item_id)
            .collect();
        let monthly = daily_aggregate(&sales);
        let totals = month_totals(&monthly);

        Self {
            sales,
            monthly,
            totals,
            items: self.items,
        }
    }

    /// Cap the raw sales list; aggregates keep describing the full set
    pub fn truncated(mut self, limit: usize) -> Self {
        self.sales.truncate(limit);
        self
    }
}

/// Parameters of a monthly report request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyRequest {
    #[serde(flatten)]
    pub window: WindowParams,
    pub envato_item_id: Option<u64>,
}

/// Builds monthly and yearly reports over a marketplace API and a cache store
pub struct ReportBuilder<A, C> {
    pub(crate) api: A,
    pub(crate) cache: C,
    max_pages: u32,
    today: Option<NaiveDate>,
}

impl<A, C> ReportBuilder<A, C>
where
    A: MarketplaceApi,
    C: CacheStore,
{
    pub fn new(api: A, cache: C) -> Self {
        Self {
            api,
            cache,
            max_pages: constants::DEFAULT_MAX_PAGES,
            today: None,
        }
    }

    /// Limit on statement pages fetched for one window, at least one
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Pin "today" instead of reading the local clock
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub(crate) fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }

    /// Build the monthly report for a request
    pub async fn monthly_report(&self, request: &MonthlyRequest) -> Result<ReportEnvelope> {
        let window = DateWindow::resolve(&request.window, self.today())?;
        self.monthly_report_for(&window, request.envato_item_id).await
    }

    /// Build the monthly report for an already resolved window
    pub async fn monthly_report_for(
        &self,
        window: &DateWindow,
        envato_item_id: Option<u64>,
    ) -> Result<ReportEnvelope> {
        debug!(from = %window.from, to = %window.to, "building monthly report");

        if window.is_empty() {
            debug!("day range is inverted, returning an empty report");
            return Ok(ReportEnvelope::default());
        }

        let envelope = match self.cached_report(window).await? {
            Some(envelope) => envelope,
            None => self.fresh_report(window).await?,
        };

        if let Some(item_id) = envato_item_id {
            return Ok(envelope.filtered_to_item(item_id));
        }

        Ok(envelope.truncated(constants::SALES_DISPLAY_LIMIT))
    }

    /// Exact cached report, or the enclosing month's report narrowed to the window
    async fn cached_report(&self, window: &DateWindow) -> Result<Option<ReportEnvelope>> {
        let exact = cache::load::<ReportEnvelope, _>(&self.cache, &window.range_key).await?;
        if exact.is_some() {
            return Ok(exact);
        }

        let Some(month_key) = &window.month_key else {
            return Ok(None);
        };
        let Some(month) = cache::load::<ReportEnvelope, _>(&self.cache, month_key).await? else {
            return Ok(None);
        };

        let (from_day, to_day) = window.day_range();
        debug!(key = %month_key, from_day, to_day, "narrowing cached month report");
        Ok(Some(month.narrowed_to_days(from_day, to_day)))
    }

    /// Fetch, normalize, aggregate and cache a report for the window
    async fn fresh_report(&self, window: &DateWindow) -> Result<ReportEnvelope> {
        let entries = self.fetch_statement(window).await?;
        if entries.is_empty() {
            info!(from = %window.from, to = %window.to, "no statement entries for window");
            return Ok(ReportEnvelope::default());
        }

        let envelope = ReportEnvelope::from_sales(normalize(&entries));
        if envelope.sales.is_empty() {
            info!(entries = entries.len(), "statement has no sales for window");
            return Ok(envelope);
        }

        let ttl = window.ttl();
        cache::save(&self.cache, &window.range_key, &envelope, ttl).await?;
        info!(
            key = %window.range_key,
            sales = envelope.sales.len(),
            earnings = envelope.totals.earnings,
            ?ttl,
            "cached monthly report"
        );

        Ok(envelope)
    }

    /// Page through the statement until an empty page
    async fn fetch_statement(&self, window: &DateWindow) -> Result<Vec<LedgerEntry>> {
        let mut entries = Vec::new();

        for page in 1..=self.max_pages {
            let rows = self.api.statement_page(window.from, window.to, page).await?;
            if rows.is_empty() {
                debug!(pages = page - 1, entries = entries.len(), "statement exhausted");
                return Ok(entries);
            }
            debug!(page, rows = rows.len(), "fetched statement page");
            entries.extend(rows);
        }

        Err(ReportError::PageLimitExceeded {
            pages: self.max_pages,
        })
    }
}
