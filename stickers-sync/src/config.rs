use std::path::PathBuf;

use crate::saved::model::DEFAULT_SAVED_CAPACITY;
use crate::saved::store::{StoreError, default_db_path};

const DEFAULT_API_URL: &str = "https://api.stickers.example";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncConfig {
    pub db_path: PathBuf,
    pub api_url: String,
    pub api_token: Option<String>,
    pub saved_capacity: usize,
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, StoreError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, StoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path = match lookup("STICKERS_DB_PATH").filter(|value| !value.is_empty()) {
            Some(value) => PathBuf::from(value),
            None => default_db_path()?,
        };
        let api_url = lookup("STICKERS_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_token = lookup("STICKERS_API_TOKEN").filter(|value| !value.is_empty());
        let saved_capacity = lookup("STICKERS_SAVED_CAPACITY")
            .and_then(|value| value.trim().parse::<usize>().ok())
            .filter(|capacity| *capacity > 0)
            .unwrap_or(DEFAULT_SAVED_CAPACITY);

        Ok(Self {
            db_path,
            api_url,
            api_token,
            saved_capacity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> SyncConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SyncConfig::from_lookup(|key| vars.get(key).cloned()).unwrap()
    }

    #[test]
    fn explicit_values_are_used() {
        let config = config_from(&[
            ("STICKERS_DB_PATH", "/tmp/stickers.db"),
            ("STICKERS_API_URL", "http://localhost:8080"),
            ("STICKERS_API_TOKEN", "secret"),
            ("STICKERS_SAVED_CAPACITY", "20"),
        ]);

        assert_eq!(config.db_path, PathBuf::from("/tmp/stickers.db"));
        assert_eq!(config.api_url, "http://localhost:8080");
        assert_eq!(config.api_token.as_deref(), Some("secret"));
        assert_eq!(config.saved_capacity, 20);
    }

    #[test]
    fn invalid_capacity_falls_back_to_default() {
        let config = config_from(&[
            ("STICKERS_DB_PATH", "/tmp/stickers.db"),
            ("STICKERS_SAVED_CAPACITY", "many"),
        ]);
        assert_eq!(config.saved_capacity, DEFAULT_SAVED_CAPACITY);
        assert_eq!(config.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn zero_capacity_falls_back_to_default() {
        let config = config_from(&[
            ("STICKERS_DB_PATH", "/tmp/stickers.db"),
            ("STICKERS_SAVED_CAPACITY", "0"),
        ]);
        assert_eq!(config.saved_capacity, DEFAULT_SAVED_CAPACITY);
    }

    #[test]
    fn empty_token_is_treated_as_missing() {
        let config = config_from(&[
            ("STICKERS_DB_PATH", "/tmp/stickers.db"),
            ("STICKERS_API_TOKEN", ""),
        ]);
        assert!(config.api_token.is_none());
    }
}
