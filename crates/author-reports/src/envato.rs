//! Envato marketplace API client
//!
//! Two endpoints feed the reports: the paginated author statement (one page of
//! ledger entries per call, an empty page marks the end) and the monthly
//! earnings-and-sales history used for yearly summaries.
//!
//! API docs: https://build.envato.com/api/

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::EnvatoConfig;
use crate::constants;
use crate::error::ApiError;
use crate::statement::LedgerEntry;
use crate::yearly::MonthlyEarnings;

/// Marketplace operations the report builders depend on
#[async_trait]
pub trait MarketplaceApi: Send + Sync {
    /// One page (1-based) of statement entries dated within `[from, to]`
    async fn statement_page(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        page: u32,
    ) -> Result<Vec<LedgerEntry>, ApiError>;

    /// Full monthly earnings and sales history of the account
    async fn earnings_by_month(&self) -> Result<Vec<MonthlyEarnings>, ApiError>;
}

/// API path version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiVersion {
    V1,
    V3,
}

impl ApiVersion {
    fn as_str(self) -> &'static str {
        match self {
            ApiVersion::V1 => "v1",
            ApiVersion::V3 => "v3",
        }
    }
}

// =============================================================================
// API Types
// =============================================================================

/// Statement page response
#[derive(Deserialize)]
struct StatementResponse {
    #[serde(default)]
    results: Vec<LedgerEntry>,
}

/// Monthly history response
#[derive(Deserialize)]
struct EarningsResponse {
    #[serde(rename = "earnings-and-sales-by-month", default)]
    months: Vec<EarningsRow>,
}

/// One month of the earnings history
#[derive(Deserialize)]
struct EarningsRow {
    /// e.g. "Mon Dec 01 00:00:00 +1100 2014"
    month: String,
    #[serde(deserialize_with = "de::u64_lenient")]
    sales: u64,
    #[serde(deserialize_with = "de::f64_lenient")]
    earnings: f64,
}

// =============================================================================
// Envato Client
// =============================================================================

/// Authenticated Envato API client
pub struct EnvatoClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    max_retries: u32,
}

impl EnvatoClient {
    pub fn new(config: &EnvatoConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|source| ApiError::Request {
                endpoint: "client setup".to_string(),
                source,
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            max_retries: config.max_retries,
        })
    }

    /// Perform one GET against `{base}/{version}/market/{endpoint}` and decode the body
    ///
    /// Transport errors, 5xx responses and rate limiting are retried up to
    /// `max_retries` times with exponential backoff; any other non-success
    /// status fails immediately.
    pub async fn call<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
        version: ApiVersion,
    ) -> Result<T, ApiError> {
        let url = build_url(&self.base_url, endpoint, query, version);
        let mut last_error = None;

        let attempts = self.max_retries.saturating_add(1);

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = backoff_delay(attempt);
                debug!(endpoint, attempt, ?delay, "retrying marketplace call");
                sleep(delay).await;
            }

            let response = match self
                .client
                .get(&url)
                .bearer_auth(&self.token)
                .header("Accept", "application/json")
                .send()
                .await
            {
                Ok(response) => response,
                Err(source) => {
                    last_error = Some(ApiError::Request {
                        endpoint: endpoint.to_string(),
                        source,
                    });
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                let body = response.text().await.map_err(|source| ApiError::Request {
                    endpoint: endpoint.to_string(),
                    source,
                })?;
                return serde_json::from_str(&body).map_err(|source| ApiError::Decode {
                    endpoint: endpoint.to_string(),
                    source,
                });
            }

            if status.as_u16() == 429 {
                warn!(endpoint, attempt, "rate limited by marketplace API");
                last_error = Some(ApiError::RateLimited {
                    endpoint: endpoint.to_string(),
                    attempts: attempt + 1,
                });
                continue;
            }

            let error = ApiError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            };
            if status.is_server_error() {
                last_error = Some(error);
                continue;
            }
            return Err(error);
        }

        Err(last_error.unwrap_or_else(|| {
            ApiError::Other(format!("{} failed after {} attempts", endpoint, attempts))
        }))
    }
}

#[async_trait]
impl MarketplaceApi for EnvatoClient {
    async fn statement_page(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        page: u32,
    ) -> Result<Vec<LedgerEntry>, ApiError> {
        let query = [
            ("from_date", from.format("%Y-%m-%d").to_string()),
            ("to_date", to.format("%Y-%m-%d").to_string()),
            ("page", page.to_string()),
        ];
        let response: StatementResponse = self
            .call(constants::STATEMENT_ENDPOINT, &query, ApiVersion::V3)
            .await?;

        Ok(response.results)
    }

    async fn earnings_by_month(&self) -> Result<Vec<MonthlyEarnings>, ApiError> {
        let response: EarningsResponse = self
            .call(constants::EARNINGS_BY_MONTH_ENDPOINT, &[], ApiVersion::V1)
            .await?;

        Ok(process_earnings_rows(response.months))
    }
}

/// Convert history rows, skipping any whose month can't be read
fn process_earnings_rows(rows: Vec<EarningsRow>) -> Vec<MonthlyEarnings> {
    rows.into_iter()
        .filter_map(|row| {
            let Some(month) = parse_history_month(&row.month) else {
                warn!(month = %row.month, "skipping history row with unparseable month");
                return None;
            };
            Some(MonthlyEarnings {
                month,
                sales: row.sales,
                earnings: row.earnings,
            })
        })
        .collect()
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Wait before retry number `attempt` (1-based): base, 2x base, 4x base, ...
fn backoff_delay(attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_secs(constants::RETRY_BASE_DELAY_SECS.saturating_mul(factor))
}

fn build_url(
    base_url: &str,
    endpoint: &str,
    query: &[(&str, String)],
    version: ApiVersion,
) -> String {
    let mut url = format!("{}/{}/market/{}", base_url, version.as_str(), endpoint);
    if !query.is_empty() {
        let pairs: Vec<String> = query.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        url.push('?');
        url.push_str(&pairs.join("&"));
    }
    url
}

/// Calendar month of a history row, e.g. "Mon Dec 01 00:00:00 +1100 2014"
fn parse_history_month(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DateTime::parse_from_str(raw, "%a %b %d %H:%M:%S %z %Y")
        .map(|dt| dt.date_naive())
        .ok()
        .or_else(|| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
        .or_else(|| NaiveDate::parse_from_str(&format!("{}-01", raw), "%Y-%m-%d").ok())
}

/// Lenient decoders: the API encodes numbers as either JSON numbers or strings
pub(crate) mod de {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn opt_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.as_ref().and_then(value_to_u64))
    }

    pub fn u64_lenient<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let value = Value::deserialize(deserializer)?;
        value_to_u64(&value).ok_or_else(|| {
            serde::de::Error::custom(format!("expected an unsigned integer, got {}", value))
        })
    }

    /// Blank strings, nulls and other non-numbers decode as `None`
    pub fn opt_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.as_ref().and_then(value_to_f64))
    }

    pub fn f64_lenient<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        let value = Value::deserialize(deserializer)?;
        value_to_f64(&value)
            .ok_or_else(|| serde::de::Error::custom(format!("expected a number, got {}", value)))
    }

    fn value_to_f64(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn value_to_u64(value: &Value) -> Option<u64> {
        match value {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url() {
        let query = [
            ("from_date", "2024-03-01".to_string()),
            ("page", "2".to_string()),
        ];
        assert_eq!(
            build_url("https://api.envato.com", "user/statement", &query, ApiVersion::V3),
            "https://api.envato.com/v3/market/user/statement?from_date=2024-03-01&page=2"
        );
        assert_eq!(
            build_url("http://localhost", "private/x.json", &[], ApiVersion::V1),
            "http://localhost/v1/market/private/x.json"
        );
    }

    #[test]
    fn test_parse_history_month() {
        let expected = NaiveDate::from_ymd_opt(2014, 12, 1).unwrap();
        assert_eq!(
            parse_history_month("Mon Dec 01 00:00:00 +1100 2014"),
            Some(expected)
        );
        assert_eq!(parse_history_month("2014-12-01"), Some(expected));
        assert_eq!(parse_history_month("2014-12"), Some(expected));
        assert_eq!(parse_history_month("December"), None);
    }

    #[test]
    fn test_statement_response_decodes() {
        let json = r#"{
            "count": 2,
            "results": [
                {"date": "2024-03-05 10:22:41 +1100", "order_id": 1, "item_id": 100,
                 "amount": 30.0, "type": "Sale", "detail": "Theme (Regular License)"},
                {"date": "2024-03-05 10:22:41 +1100", "order_id": 1, "item_id": 100,
                 "amount": -12.5, "type": "Author Fee", "detail": "Theme (Regular License)"}
            ]
        }"#;
        let response: StatementResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.results.len(), 2);
        assert_eq!(response.results[1].kind.as_deref(), Some("Author Fee"));

        let empty: StatementResponse = serde_json::from_str(r#"{"count": 0}"#).unwrap();
        assert!(empty.results.is_empty());
    }

    #[test]
    fn test_statement_page_with_odd_rows_keeps_valid_sales() {
        let json = r#"{
            "results": [
                {"date": "2024-03-05 10:22:41 +1100", "order_id": 1, "item_id": 100,
                 "amount": "30.00", "type": "Sale", "detail": "Theme (Regular License)"},
                {"date": "2024-03-06 08:00:00 +1100", "type": "Withdrawal", "amount": ""},
                {"amount": 1.0, "type": null}
            ]
        }"#;
        let response: StatementResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.results.len(), 3);

        let sales = crate::statement::normalize(&response.results);
        assert_eq!(sales.len(), 1);
        assert_eq!(sales[0].item_id, 100);
        assert_eq!(sales[0].amount, 30.0);
    }

    #[test]
    fn test_backoff_delay_doubles_and_saturates() {
        let base = constants::RETRY_BASE_DELAY_SECS;
        assert_eq!(backoff_delay(1), Duration::from_secs(base));
        assert_eq!(backoff_delay(2), Duration::from_secs(base * 2));
        assert_eq!(backoff_delay(3), Duration::from_secs(base * 4));
        assert_eq!(backoff_delay(100), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_earnings_rows_decode_and_convert() {
        let json = r#"{
            "earnings-and-sales-by-month": [
                {"month": "Mon Dec 01 00:00:00 +1100 2014", "sales": "3", "earnings": "40.50"},
                {"month": "Thu Jan 01 00:00:00 +1100 2015", "sales": 7, "earnings": 91.2},
                {"month": "sometime", "sales": 1, "earnings": 1}
            ]
        }"#;
        let response: EarningsResponse = serde_json::from_str(json).unwrap();
        let history = process_earnings_rows(response.months);

        assert_eq!(history.len(), 2);
        assert_eq!(history[0].month, NaiveDate::from_ymd_opt(2014, 12, 1).unwrap());
        assert_eq!(history[0].sales, 3);
        assert_eq!(history[0].earnings, 40.5);
        assert_eq!(history[1].sales, 7);
    }
}
