//! Centralized constants for the author reporting engine
//!
//! Account-specific settings (API token, cache location) are loaded from config.toml.

// =============================================================================
// API Endpoints
// =============================================================================

/// Envato API base URL
pub const ENVATO_API_BASE: &str = "https://api.envato.com";

/// Author statement endpoint (paginated ledger entries)
pub const STATEMENT_ENDPOINT: &str = "user/statement";

/// Monthly earnings and sales history endpoint
pub const EARNINGS_BY_MONTH_ENDPOINT: &str = "private/user/earnings-and-sales-by-month.json";

// =============================================================================
// Ledger Entry Types
// =============================================================================

/// Statement entry type for a sale
pub const ENTRY_TYPE_SALE: &str = "Sale";

/// Statement entry type for the marketplace fee charged on a sale
pub const ENTRY_TYPE_AUTHOR_FEE: &str = "Author Fee";

// =============================================================================
// Report Limits
// =============================================================================

/// Number of raw sale records returned with an unfiltered monthly report
pub const SALES_DISPLAY_LIMIT: usize = 50;

/// Upper bound on statement pages fetched for one window
pub const DEFAULT_MAX_PAGES: u32 = 500;

// =============================================================================
// Transport Defaults
// =============================================================================

/// HTTP request timeout
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Retries per upstream call after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff between attempts
pub const RETRY_BASE_DELAY_SECS: u64 = 2;

// =============================================================================
// Cache Lifetimes
// =============================================================================

/// Lifetime of a report covering the current month (minutes)
pub const CURRENT_MONTH_TTL_MINUTES: i64 = 60;

/// Lifetime of a partial past-month report (days)
pub const PARTIAL_RANGE_TTL_DAYS: i64 = 7;

/// Lifetime of a full past-month report or the yearly history (months)
pub const FULL_MONTH_TTL_MONTHS: u32 = 1;

// =============================================================================
// File Names
// =============================================================================

/// Default config file path
pub const CONFIG_FILENAME: &str = "config.toml";

/// Default SQLite cache path
pub const DEFAULT_CACHE_PATH: &str = "./data/cache.db";

/// Raw sales CSV export
pub const SALES_CSV_FILENAME: &str = "sales.csv";

/// Daily totals CSV export
pub const DAILY_CSV_FILENAME: &str = "daily.csv";

/// Per-item breakdown CSV export
pub const ITEMS_CSV_FILENAME: &str = "items.csv";
