//! Configuration management for the to-do application.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::persistence::{validate_key, DEFAULT_STORAGE_KEY};
use crate::store::ListStateOptions;
use crate::types::InsertionOrder;
use liststate_runtime::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use thiserror::Error;

/// Upper bound for `TODO_PERSIST_RETRIES`
pub const MAX_PERSIST_RETRIES: u32 = 10;

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// An environment variable could not be parsed
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        /// Variable name
        var: &'static str,
        /// Raw value
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// A parsed value is out of range
    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TodoConfig {
    /// Directory holding the persisted list (`TODO_DATA_DIR`)
    pub data_dir: PathBuf,
    /// Key of the persisted list (`TODO_STORAGE_KEY`)
    pub storage_key: String,
    /// Where new items are placed (`TODO_INSERT_ORDER`: append, prepend)
    pub insertion_order: InsertionOrder,
    /// Retries for a failed persistence write (`TODO_PERSIST_RETRIES`)
    pub persist_retries: u32,
    /// Log filter used when `RUST_LOG` is unset (`TODO_LOG`)
    pub log_filter: String,
    /// Multiplier for the simulated fetch latency (`TODO_FETCH_LATENCY_SCALE`)
    pub fetch_latency_scale: f64,
}

impl Default for TodoConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".liststate"),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            insertion_order: InsertionOrder::Append,
            persist_retries: 3,
            log_filter: "warn,liststate_todo=info".to_string(),
            fetch_latency_scale: 1.0,
        }
    }
}

impl TodoConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set to an unparsable or
    /// out-of-range value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Load configuration through `lookup` instead of the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set to an unparsable or
    /// out-of-range value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            data_dir: lookup("TODO_DATA_DIR").map_or(defaults.data_dir, PathBuf::from),
            storage_key: lookup("TODO_STORAGE_KEY").unwrap_or(defaults.storage_key),
            insertion_order: parse_var(&lookup, "TODO_INSERT_ORDER")?
                .unwrap_or(defaults.insertion_order),
            persist_retries: parse_var(&lookup, "TODO_PERSIST_RETRIES")?
                .unwrap_or(defaults.persist_retries),
            log_filter: lookup("TODO_LOG").unwrap_or(defaults.log_filter),
            fetch_latency_scale: parse_var(&lookup, "TODO_FETCH_LATENCY_SCALE")?
                .unwrap_or(defaults.fetch_latency_scale),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_key(&self.storage_key).map_err(|e| ConfigError::Validation(e.to_string()))?;

        if self.persist_retries > MAX_PERSIST_RETRIES {
            return Err(ConfigError::Validation(format!(
                "persist_retries must be at most {MAX_PERSIST_RETRIES}, got {}",
                self.persist_retries
            )));
        }

        if !self.fetch_latency_scale.is_finite() || self.fetch_latency_scale < 0.0 {
            return Err(ConfigError::Validation(format!(
                "fetch_latency_scale must be a non-negative number, got {}",
                self.fetch_latency_scale
            )));
        }

        Ok(())
    }

    /// Store options derived from this configuration
    #[must_use]
    pub fn store_options(&self) -> ListStateOptions {
        ListStateOptions::default()
            .with_storage_key(self.storage_key.clone())
            .with_insertion_order(self.insertion_order)
            .with_persist_retry(
                RetryPolicy::builder()
                    .max_retries(self.persist_retries)
                    .build(),
            )
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let Some(value) = lookup(var) else {
        return Ok(None);
    };

    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value,
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = TodoConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, TodoConfig::default());
        assert_eq!(config.storage_key, "todos");
        assert_eq!(config.insertion_order, InsertionOrder::Append);
    }

    #[test]
    fn test_reads_all_variables() {
        let config = TodoConfig::from_lookup(lookup(&[
            ("TODO_DATA_DIR", "/tmp/lists"),
            ("TODO_STORAGE_KEY", "work"),
            ("TODO_INSERT_ORDER", "Prepend"),
            ("TODO_PERSIST_RETRIES", " 5 "),
            ("TODO_LOG", "debug"),
            ("TODO_FETCH_LATENCY_SCALE", "0.01"),
        ]))
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/lists"));
        assert_eq!(config.storage_key, "work");
        assert_eq!(config.insertion_order, InsertionOrder::Prepend);
        assert_eq!(config.persist_retries, 5);
        assert_eq!(config.log_filter, "debug");
        assert!((config.fetch_latency_scale - 0.01).abs() < f64::EPSILON);

        let options = config.store_options();
        assert_eq!(options.storage_key, "work");
        assert_eq!(options.persist_retry.max_retries, 5);
    }

    #[test]
    fn test_unparsable_value_is_reported() {
        let err = TodoConfig::from_lookup(lookup(&[("TODO_PERSIST_RETRIES", "many")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { var: "TODO_PERSIST_RETRIES", .. }
        ));

        let err = TodoConfig::from_lookup(lookup(&[("TODO_INSERT_ORDER", "sideways")])).unwrap_err();
        assert!(err.to_string().contains("sideways"));
    }

    #[test]
    fn test_validation_rejects_out_of_range() {
        assert!(matches!(
            TodoConfig::from_lookup(lookup(&[("TODO_PERSIST_RETRIES", "99")])),
            Err(ConfigError::Validation(_))
        ));
        assert!(matches!(
            TodoConfig::from_lookup(lookup(&[("TODO_FETCH_LATENCY_SCALE", "-1")])),
            Err(ConfigError::Validation(_))
        ));
        assert!(matches!(
            TodoConfig::from_lookup(lookup(&[("TODO_STORAGE_KEY", "../etc")])),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_deserializes_with_defaults() {
        let config: TodoConfig =
            serde_json::from_str(r#"{"storage_key": "home", "insertion_order": "prepend"}"#)
                .unwrap();
        assert_eq!(config.storage_key, "home");
        assert_eq!(config.insertion_order, InsertionOrder::Prepend);
        assert_eq!(config.persist_retries, 3);
    }
}
