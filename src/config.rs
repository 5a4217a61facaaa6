//! Environment-backed configuration.

use crate::error::{AgentError, Result};
use crate::llm::{LlmSettings, RetryPolicy};
use crate::memory::DEFAULT_HISTORY_WINDOW;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_SHEET_NAME: &str = "Availability Tracker";

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub data_dir: PathBuf,
    pub sheet_name: String,
    pub history_window: usize,
    pub examples_top_k: usize,
    pub examples_min_score: u8,
    pub llm: LlmSettings,
    pub llm_max_attempts: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            sheet_name: DEFAULT_SHEET_NAME.to_string(),
            history_window: DEFAULT_HISTORY_WINDOW,
            examples_top_k: 3,
            examples_min_score: 50,
            llm: LlmSettings::default(),
            llm_max_attempts: RetryPolicy::default().max_attempts,
        }
    }
}

impl AgentConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = get("LLM_API_KEY")
            .or_else(|| get("OPENAI_API_KEY"))
            .unwrap_or_default();

        Ok(Self {
            data_dir: get("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            sheet_name: get("SHEET_NAME").unwrap_or(defaults.sheet_name),
            history_window: parse_or("HISTORY_WINDOW", get("HISTORY_WINDOW"), defaults.history_window)?,
            examples_top_k: parse_or("EXAMPLES_TOP_K", get("EXAMPLES_TOP_K"), defaults.examples_top_k)?,
            examples_min_score: parse_or(
                "EXAMPLES_MIN_SCORE",
                get("EXAMPLES_MIN_SCORE"),
                defaults.examples_min_score,
            )?,
            llm: LlmSettings {
                api_key,
                base_url: get("LLM_BASE_URL").unwrap_or(defaults.llm.base_url),
                model: get("LLM_MODEL").unwrap_or(defaults.llm.model),
                temperature: parse_or("LLM_TEMPERATURE", get("LLM_TEMPERATURE"), defaults.llm.temperature)?,
                timeout_secs: parse_or("LLM_TIMEOUT_SECS", get("LLM_TIMEOUT_SECS"), defaults.llm.timeout_secs)?,
            },
            llm_max_attempts: parse_or("LLM_MAX_ATTEMPTS", get("LLM_MAX_ATTEMPTS"), defaults.llm_max_attempts)?,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.llm_max_attempts.max(1),
            ..RetryPolicy::default()
        }
    }
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T> {
    match raw {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AgentError::Config(format!("{} has an invalid value: '{}'", key, raw))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AgentConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.sheet_name, "Availability Tracker");
        assert_eq!(config.history_window, 10);
        assert_eq!(config.examples_top_k, 3);
        assert_eq!(config.examples_min_score, 50);
        assert_eq!(config.retry_policy().max_attempts, 5);
    }

    #[test]
    fn test_overrides_and_key_fallback() {
        let config = AgentConfig::from_lookup(lookup(&[
            ("DATA_DIR", "/srv/reports"),
            ("OPENAI_API_KEY", "sk-test"),
            ("LLM_MAX_ATTEMPTS", "2"),
        ]))
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/reports"));
        assert_eq!(config.llm.api_key, "sk-test");
        assert_eq!(config.retry_policy().max_attempts, 2);
    }

    #[test]
    fn test_invalid_number_is_config_error() {
        let err = AgentConfig::from_lookup(lookup(&[("HISTORY_WINDOW", "ten")])).unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }
}
