//! Statement normalization
//!
//! The author statement lists a sale and the author fee taken on it as separate
//! ledger entries. Normalizing folds repeated entries for one order together
//! and subtracts each order's fee from its sale, leaving net sale records.

use chrono::{DateTime, Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use crate::aggregate::round2;
use crate::constants;
use crate::envato::de;

/// Raw statement row as returned by the marketplace
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LedgerEntry {
    /// e.g. "2024-03-05 10:22:41 +1100"
    #[serde(default)]
    pub date: String,
    #[serde(default, deserialize_with = "de::opt_u64")]
    pub order_id: Option<u64>,
    #[serde(default, deserialize_with = "de::opt_u64")]
    pub item_id: Option<u64>,
    /// Signed: fees are reported as negative amounts
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub amount: Option<f64>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// Item name followed by the licence in parentheses
    #[serde(default)]
    pub detail: Option<String>,
}

/// Net sale for one order (or one legacy entry without an order id)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub date: NaiveDate,
    pub day: u32,
    pub order_id: Option<u64>,
    pub item_id: u64,
    pub amount: f64,
    pub name: String,
}

/// Author fee for one order. Only lives until it has been netted against its sale.
pub type FeeRecord = SaleRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Sale,
    AuthorFee,
}

impl EntryKind {
    fn classify(kind: Option<&str>) -> Option<Self> {
        match kind? {
            constants::ENTRY_TYPE_SALE => Some(Self::Sale),
            constants::ENTRY_TYPE_AUTHOR_FEE => Some(Self::AuthorFee),
            _ => None,
        }
    }
}

impl SaleRecord {
    fn from_entry(entry: &LedgerEntry) -> Option<Self> {
        let Some(date) = parse_entry_date(&entry.date) else {
            warn!(
                date = %entry.date,
                order_id = ?entry.order_id,
                "skipping entry with unparseable date"
            );
            return None;
        };
        let Some(item_id) = entry.item_id else {
            warn!(order_id = ?entry.order_id, kind = ?entry.kind, "skipping entry without item id");
            return None;
        };
        let Some(amount) = entry.amount else {
            warn!(order_id = ?entry.order_id, item_id, "skipping entry without amount");
            return None;
        };

        Some(Self {
            date,
            day: date.day(),
            order_id: entry.order_id,
            item_id,
            amount: round2(amount.abs()),
            name: item_name(entry.detail.as_deref().unwrap_or_default()),
        })
    }
}

/// Records of one kind, merged by order id in first-seen order
#[derive(Default)]
struct Bucket {
    records: Vec<SaleRecord>,
    by_order: HashMap<u64, usize>,
}

impl Bucket {
    fn insert(&mut self, record: SaleRecord) {
        let Some(order_id) = record.order_id else {
            // Older statements carry no order ids; those entries stand alone
            self.records.push(record);
            return;
        };

        if let Some(&index) = self.by_order.get(&order_id) {
            let existing = &mut self.records[index];
            existing.amount = round2(existing.amount + record.amount);
        } else {
            self.by_order.insert(order_id, self.records.len());
            self.records.push(record);
        }
    }
}

/// Convert statement rows into net sale records
///
/// Entries other than sales and author fees (or with no type at all) are
/// ignored, as are sale and fee rows missing a usable date, item id or amount.
/// Net amounts may go negative if a fee exceeds its sale.
pub fn normalize(entries: &[LedgerEntry]) -> Vec<SaleRecord> {
    let mut sales = Bucket::default();
    let mut fees = Bucket::default();

    for entry in entries {
        let Some(kind) = EntryKind::classify(entry.kind.as_deref()) else {
            continue;
        };
        let Some(record) = SaleRecord::from_entry(entry) else {
            continue;
        };

        match kind {
            EntryKind::Sale => sales.insert(record),
            EntryKind::AuthorFee => fees.insert(record),
        }
    }

    net_fees(sales.records, &fees.records)
}

/// Subtract fees from the sale sharing their order and item
fn net_fees(mut sales: Vec<SaleRecord>, fees: &[FeeRecord]) -> Vec<SaleRecord> {
    let mut fee_totals: HashMap<(u64, u64), f64> = HashMap::new();
    for fee in fees {
        if let Some(order_id) = fee.order_id {
            *fee_totals.entry((order_id, fee.item_id)).or_insert(0.0) += fee.amount;
        }
    }

    for sale in &mut sales {
        let Some(order_id) = sale.order_id else {
            continue;
        };
        if let Some(fee) = fee_totals.get(&(order_id, sale.item_id)) {
            sale.amount = round2(sale.amount - fee);
            if sale.amount < 0.0 {
                warn!(
                    order_id,
                    item_id = sale.item_id,
                    net = sale.amount,
                    "fee exceeds sale amount"
                );
            }
        }
    }

    sales
}

/// Item display name: the detail text before the licence suffix
fn item_name(detail: &str) -> String {
    detail.split('(').next().unwrap_or_default().trim().to_string()
}

/// Calendar date of a statement timestamp, in the timestamp's own offset
pub(crate) fn parse_entry_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S %z")
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.date_naive())
        .ok()
        .or_else(|| {
            raw.get(..10)
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        })
}
