use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::cli::chat::conversation_state::DEFAULT_MODEL;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Everything needed to build the completion client, read once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_key: String,
    pub base_url: Url,
    pub model: String,
    pub candidates: u32,
    pub timeout: Option<Duration>,
}

impl Settings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("OPENAI_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or(SettingsError::Missing("OPENAI_API_KEY"))?;

        let raw_base_url =
            lookup("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url =
            Url::parse(raw_base_url.trim_end_matches('/')).map_err(|e| SettingsError::Invalid {
                name: "OPENAI_BASE_URL",
                reason: e.to_string(),
            })?;

        let model = lookup("CHATUI_MODEL")
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let candidates = match lookup("CHATUI_CANDIDATES") {
            Some(raw) => parse_nonzero(&raw).map_err(|reason| SettingsError::Invalid {
                name: "CHATUI_CANDIDATES",
                reason,
            })?,
            None => 1,
        };

        let timeout = match lookup("CHATUI_TIMEOUT_SECS") {
            Some(raw) => {
                let secs = parse_nonzero::<u64>(&raw).map_err(|reason| SettingsError::Invalid {
                    name: "CHATUI_TIMEOUT_SECS",
                    reason,
                })?;
                Some(Duration::from_secs(secs))
            }
            None => None,
        };

        Ok(Self {
            api_key,
            base_url,
            model,
            candidates,
            timeout,
        })
    }

    /// Applies command line overrides on top of the environment.
    /// A blank model is ignored, as it is in the environment.
    pub fn with_overrides(
        mut self,
        model: Option<String>,
        candidates: Option<u32>,
    ) -> Result<Self, SettingsError> {
        if let Some(model) = model.filter(|m| !m.trim().is_empty()) {
            self.model = model;
        }
        if let Some(n) = candidates {
            if n == 0 {
                return Err(SettingsError::Invalid {
                    name: "--candidates",
                    reason: "must be at least 1".to_string(),
                });
            }
            self.candidates = n;
        }
        Ok(self)
    }
}

fn parse_nonzero<T>(raw: &str) -> Result<T, String>
where
    T: FromStr + Default + PartialEq,
    T::Err: Display,
{
    let n = raw.trim().parse::<T>().map_err(|e| e.to_string())?;
    if n == T::default() {
        return Err("must be at least 1".to_string());
    }
    Ok(n)
}
