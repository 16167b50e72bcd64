//! External balance source
//!
//! Balances arrive in offset-paged JSON responses with no total count. The
//! sync loop infers the end of the data from a short page.

use crate::error::{SourceError, SourceResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use tracing::debug;

/// Records requested per page
pub const PAGE_SIZE: usize = 100;

/// One member's balance as reported by the source.
///
/// Ids and amounts are kept as raw text and parsed when applied, so one
/// malformed record never spoils the rest of its page.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BalanceRecord {
    #[serde(rename = "openId", default, deserialize_with = "lenient_text")]
    pub member_id: String,
    #[serde(rename = "currencyTotalFeeAmt", default, deserialize_with = "lenient_text")]
    pub currency_amount: String,
    #[serde(rename = "contractTotalFeeAmt", default, deserialize_with = "lenient_text")]
    pub contract_amount: String,
}

impl BalanceRecord {
    #[must_use]
    pub fn new(member_id: impl Into<String>, currency_amount: f64, contract_amount: f64) -> Self {
        Self {
            member_id: member_id.into(),
            currency_amount: currency_amount.to_string(),
            contract_amount: contract_amount.to_string(),
        }
    }

    #[must_use]
    pub fn parsed_member_id(&self) -> Option<u64> {
        self.member_id.trim().parse().ok()
    }

    /// Both amounts as numbers; an empty amount counts as zero
    #[must_use]
    pub fn parsed_amounts(&self) -> Option<(f64, f64)> {
        Some((parse_amount(&self.currency_amount)?, parse_amount(&self.contract_amount)?))
    }
}

fn parse_amount(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Some(0.0);
    }
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Accept strings, numbers or null for text fields
fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// One page of balances
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BalancePage {
    #[serde(default, deserialize_with = "nullable_vec")]
    pub data: Vec<BalanceRecord>,
}

fn nullable_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Source of member balances
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BalanceSource: Send + Sync {
    /// Fetch up to `PAGE_SIZE` records starting at `offset`
    async fn fetch_balances(&self, offset: usize) -> SourceResult<BalancePage>;
}

/// Balance source reached over HTTP
pub struct HttpBalanceSource {
    client: Client,
    url: String,
    token: Option<String>,
}

impl HttpBalanceSource {
    #[must_use]
    pub fn new(url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            token,
        }
    }
}

#[async_trait]
impl BalanceSource for HttpBalanceSource {
    async fn fetch_balances(&self, offset: usize) -> SourceResult<BalancePage> {
        let mut request = self
            .client
            .get(&self.url)
            .query(&[("offset", offset), ("limit", PAGE_SIZE)]);

        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        debug!("Fetching balances at offset {offset}");
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_decoding_accepts_strings_and_numbers() {
        let body = r#"{"data":[
            {"openId":"101","currencyTotalFeeAmt":"12.5","contractTotalFeeAmt":7},
            {"openId":202,"currencyTotalFeeAmt":null}
        ]}"#;
        let page: BalancePage = serde_json::from_str(body).unwrap();
        assert_eq!(page.data.len(), 2);

        assert_eq!(page.data[0].parsed_member_id(), Some(101));
        assert_eq!(page.data[0].parsed_amounts(), Some((12.5, 7.0)));

        assert_eq!(page.data[1].parsed_member_id(), Some(202));
        assert_eq!(page.data[1].parsed_amounts(), Some((0.0, 0.0)));
    }

    #[test]
    fn test_missing_or_null_data_is_empty_page() {
        let page: BalancePage = serde_json::from_str("{}").unwrap();
        assert!(page.data.is_empty());
        let page: BalancePage = serde_json::from_str(r#"{"data":null}"#).unwrap();
        assert!(page.data.is_empty());
    }

    #[test]
    fn test_malformed_values_are_rejected_per_record() {
        let record = BalanceRecord {
            member_id: "abc".to_string(),
            currency_amount: "NaN".to_string(),
            contract_amount: "1".to_string(),
        };
        assert_eq!(record.parsed_member_id(), None);
        assert_eq!(record.parsed_amounts(), None);
    }
}
