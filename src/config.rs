//! Runtime configuration for the pipeline.
//!
//! Resolved from environment variables (a `.env` file is loaded by the
//! binary before this runs) with CLI overrides layered on top.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_CONFIDENCE_THRESHOLD: u8 = 90;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_DB_FILE: &str = "reckon.db";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub request_timeout: Duration,
    pub confidence_threshold: u8,
    pub max_attempts: u32,
    pub db_path: PathBuf,
    pub verbose: bool,
}

impl Config {
    /// Build a config from the environment. `db_path` from the CLI wins over
    /// `RECKON_DB`. Fails when `RECKON_API_KEY` is absent.
    pub fn from_env(db_path: Option<PathBuf>, verbose: bool) -> Result<Self> {
        let api_key = std::env::var("RECKON_API_KEY")
            .context("RECKON_API_KEY is not set (required to call the generative service)")?;

        let api_base =
            std::env::var("RECKON_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        let model = std::env::var("RECKON_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let request_timeout = Duration::from_secs(
            env_parse("RECKON_TIMEOUT_SECS")?.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        );
        let confidence_threshold =
            env_parse("RECKON_CONFIDENCE_THRESHOLD")?.unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD);
        let max_attempts = env_parse("RECKON_MAX_ATTEMPTS")?.unwrap_or(DEFAULT_MAX_ATTEMPTS);

        Ok(Self {
            api_base,
            api_key,
            model,
            request_timeout,
            confidence_threshold,
            max_attempts,
            db_path: db_path.unwrap_or_else(Self::db_path_from_env),
            verbose,
        })
    }

    /// Resolve the database path alone. Used by commands that only read the
    /// store and must work without an API key.
    pub fn db_path_from_env() -> PathBuf {
        std::env::var("RECKON_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DB_FILE))
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => {
            let value = raw
                .parse::<T>()
                .with_context(|| format!("Invalid value for {}: {}", name, raw))?;
            Ok(Some(value))
        }
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_parse_rejects_garbage() {
        // Env mutation is process-wide; keep the variable name test-unique.
        unsafe { std::env::set_var("RECKON_TEST_GARBAGE", "not-a-number") };
        let parsed: Result<Option<u32>> = env_parse("RECKON_TEST_GARBAGE");
        assert!(parsed.is_err());
        unsafe { std::env::remove_var("RECKON_TEST_GARBAGE") };
    }

    #[test]
    fn env_parse_missing_is_none() {
        let parsed: Option<u32> = env_parse("RECKON_TEST_UNSET").unwrap();
        assert!(parsed.is_none());
    }

    #[test]
    fn db_path_defaults_when_env_unset() {
        // RECKON_DB may be set by the ambient environment in theory; this
        // asserts the default path shape only when it is not.
        if std::env::var("RECKON_DB").is_err() {
            assert_eq!(Config::db_path_from_env(), PathBuf::from(DEFAULT_DB_FILE));
        }
    }
}
