use crate::error::ConfigError;
use chrono::Duration;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

const DEFAULT_SYNC_INTERVAL_MINUTES: u64 = 30;
const DEFAULT_INACTIVITY_WARNING_HOURS: u64 = 24;
const DEFAULT_LANG: &str = "en";
const DEFAULT_DATA_DIR: &str = "data";

/// Process configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    /// The single guild whose membership is enforced
    pub group_id: u64,
    /// Administrators configured statically, merged with stored admins on every notification
    pub admin_ids: Vec<u64>,
    pub sync_interval_minutes: u64,
    pub inactivity_warning_hours: u64,
    pub default_lang: String,
    pub balance_api_url: String,
    pub balance_api_token: Option<String>,
    pub data_dir: PathBuf,
    /// Threshold used until an operator stores one
    pub default_threshold: f64,
}

impl Config {
    /// Load configuration from the environment, reading `.env` first if present
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if a required variable is missing or a numeric
    /// variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup
    ///
    /// # Errors
    ///
    /// See [`Config::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| lookup(key).ok_or(ConfigError::Missing(key));

        Ok(Self {
            discord_token: required("DISCORD_TOKEN")?,
            group_id: parse_value("GROUP_ID", &required("GROUP_ID")?)?,
            admin_ids: lookup("ADMIN_IDS")
                .map(|raw| parse_admin_ids(&raw))
                .unwrap_or_default(),
            sync_interval_minutes: parse_or(
                &lookup,
                "SYNC_INTERVAL_MINUTES",
                DEFAULT_SYNC_INTERVAL_MINUTES,
            )?,
            inactivity_warning_hours: parse_or(
                &lookup,
                "INACTIVITY_WARNING_HOURS",
                DEFAULT_INACTIVITY_WARNING_HOURS,
            )?,
            default_lang: lookup("DEFAULT_LANG").unwrap_or_else(|| DEFAULT_LANG.to_string()),
            balance_api_url: required("BALANCE_API_URL")?,
            balance_api_token: lookup("BALANCE_API_TOKEN").filter(|token| !token.is_empty()),
            data_dir: lookup("DATA_DIR").map_or_else(|| PathBuf::from(DEFAULT_DATA_DIR), PathBuf::from),
            default_threshold: parse_or(&lookup, "DEFAULT_THRESHOLD", 0.0)?,
        })
    }

    #[must_use]
    pub fn sync_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sync_interval_minutes.max(1) * 60)
    }

    #[must_use]
    pub fn inactivity_window(&self) -> Duration {
        Duration::hours(i64::try_from(self.inactivity_warning_hours).unwrap_or(i64::MAX / 3600))
    }
}

fn parse_value<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_string(),
    })
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => parse_value(key, &raw),
        _ => Ok(default),
    }
}

/// Parse `ADMIN_IDS`, a JSON array of numbers or numeric strings.
/// Anything that is not an array yields no admins; non-numeric entries are dropped.
#[must_use]
pub fn parse_admin_ids(raw: &str) -> Vec<u64> {
    let Ok(serde_json::Value::Array(items)) = serde_json::from_str::<serde_json::Value>(raw) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match item {
            serde_json::Value::Number(n) => n.as_u64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn minimal() -> Vec<(&'static str, &'static str)> {
        vec![
            ("DISCORD_TOKEN", "token"),
            ("GROUP_ID", "1234"),
            ("BALANCE_API_URL", "https://balances.example/team"),
        ]
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup_from(&minimal())).expect("config");
        assert_eq!(config.group_id, 1234);
        assert!(config.admin_ids.is_empty());
        assert_eq!(config.sync_interval_minutes, 30);
        assert_eq!(config.inactivity_warning_hours, 24);
        assert_eq!(config.default_lang, "en");
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert!(config.balance_api_token.is_none());
        assert_eq!(config.sync_interval(), std::time::Duration::from_secs(1800));
        assert_eq!(config.inactivity_window(), Duration::hours(24));
    }

    #[test]
    fn test_missing_required() {
        let err = Config::from_lookup(lookup_from(&[("DISCORD_TOKEN", "t")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("GROUP_ID")));
    }

    #[test]
    fn test_invalid_interval() {
        let mut pairs = minimal();
        pairs.push(("SYNC_INTERVAL_MINUTES", "soon"));
        let err = Config::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "SYNC_INTERVAL_MINUTES",
                ..
            }
        ));
    }

    #[test]
    fn test_admin_ids_parsing() {
        assert_eq!(parse_admin_ids("[1, \"2\", 3]"), vec![1, 2, 3]);
        assert_eq!(parse_admin_ids("[1, \"x\", null]"), vec![1]);
        assert!(parse_admin_ids("{\"a\": 1}").is_empty());
        assert!(parse_admin_ids("not json").is_empty());
    }
}
