//! Envato author reports
//!
//! Builds cached monthly, day-range, per-item and yearly sales reports from the
//! Envato author statement and earnings history.

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod constants;
pub mod envato;
pub mod error;
pub mod export;
pub mod reports;
pub mod statement;
pub mod window;
pub mod yearly;

pub use cache::{CacheKey, CacheStore, MemoryCache, SqliteCache, Ttl};
pub use envato::{EnvatoClient, MarketplaceApi};
pub use error::{ApiError, CacheError, ReportError};
pub use reports::{MonthlyRequest, ReportBuilder, ReportEnvelope};
pub use window::{DateWindow, WindowParams};
pub use yearly::{YearlyReport, summarize_year};
