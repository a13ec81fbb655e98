//! Day, month and item aggregation over net sale records

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::statement::SaleRecord;
use crate::window::days_in_month;

/// Totals for one day of the month
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DayTotals {
    pub amount: f64,
    pub sales: u64,
}

/// Day-of-month to totals, ascending by day
pub type DailyAggregate = BTreeMap<u32, DayTotals>;

/// Totals for the whole report window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthTotals {
    pub sales: u64,
    /// Rounded up to a whole unit
    pub earnings: f64,
}

/// Per-item breakdown with share of total earnings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemAggregate {
    pub envato_id: u64,
    pub name: String,
    pub amount: f64,
    pub sales: u64,
    /// Whole percent of `MonthTotals::earnings`
    pub percentage: i64,
}

/// Round to cents
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Group sales by day, zero-filling every other day of the month
///
/// Month length comes from the first sale's date, so an empty input stays empty.
pub fn daily_aggregate(sales: &[SaleRecord]) -> DailyAggregate {
    let mut daily = DailyAggregate::new();

    for sale in sales {
        let totals = daily.entry(sale.day).or_default();
        totals.amount = round2(totals.amount + sale.amount);
        totals.sales += 1;
    }

    if let Some(first) = sales.first() {
        let days = days_in_month(first.date);
        if daily.len() < days as usize {
            for day in 1..=days {
                daily.entry(day).or_default();
            }
        }
    }

    daily
}

/// Sum the daily aggregate; earnings are summed unrounded, then ceiled
pub fn month_totals(daily: &DailyAggregate) -> MonthTotals {
    let amount: f64 = daily.values().map(|d| d.amount).sum();

    MonthTotals {
        sales: daily.values().map(|d| d.sales).sum(),
        earnings: amount.ceil(),
    }
}

/// Group sales by item, ranked by share of earnings (ties keep first-seen order)
pub fn item_aggregate(sales: &[SaleRecord], totals: &MonthTotals) -> Vec<ItemAggregate> {
    let mut items: Vec<ItemAggregate> = Vec::new();
    let mut by_id: HashMap<u64, usize> = HashMap::new();

    for sale in sales {
        if let Some(&index) = by_id.get(&sale.item_id) {
            let item = &mut items[index];
            item.amount = round2(item.amount + sale.amount);
            item.sales += 1;
        } else {
            by_id.insert(sale.item_id, items.len());
            items.push(ItemAggregate {
                envato_id: sale.item_id,
                name: sale.name.clone(),
                amount: round2(sale.amount),
                sales: 1,
                percentage: 0,
            });
        }
    }

    for item in &mut items {
        item.percentage = percentage_of(item.amount, totals.earnings);
    }

    // sort_by is stable
    items.sort_by(|a, b| b.percentage.cmp(&a.percentage));
    items
}

fn percentage_of(amount: f64, total: f64) -> i64 {
    if total == 0.0 {
        return 0;
    }
    (amount / total * 100.0).round() as i64
}
