//! Client configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use log::debug;

use crate::error::{Error, Result};
use crate::retry::BackoffPolicy;

pub const DEFAULT_BASE_URL: &str = "https://api.genesis.ai/v1";
pub const DEFAULT_TIMEOUT_SECS: f64 = 30.0;
pub const DEFAULT_MAX_RETRIES: usize = 3;

pub const API_KEY_ENV: &str = "GENESIS_API_KEY";
pub const BASE_URL_ENV: &str = "GENESIS_BASE_URL";

/// Settings fixed for the lifetime of a [`crate::client::GenesisClient`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig
{   /// Bearer credential, required
    pub api_key: String
  , /// API root, without trailing slash
    #[serde(default = "default_base_url")]
    pub base_url: String
  , /// Per-attempt timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64
  , /// Extra attempts after the first one
    #[serde(default = "default_max_retries")]
    pub max_retries: usize
  , #[serde(default)]
    pub backoff: BackoffPolicy
}

fn default_base_url() -> String { DEFAULT_BASE_URL.to_string() }
fn default_timeout_secs() -> f64 { DEFAULT_TIMEOUT_SECS }
fn default_max_retries() -> usize { DEFAULT_MAX_RETRIES }

impl ClientConfig
{   pub fn new(api_key: impl Into<String>) -> Self
    {   ClientConfig
        {   api_key: api_key.into()
          , base_url: default_base_url()
          , timeout_secs: DEFAULT_TIMEOUT_SECS
          , max_retries: DEFAULT_MAX_RETRIES
          , backoff: BackoffPolicy::default()
        }
    }

    /// Read `GENESIS_API_KEY` and, if set, `GENESIS_BASE_URL`
    pub fn from_env() -> Result<Self>
    {   let api_key = std::env::var(API_KEY_ENV)
          .map_err(|_| Error::Configuration(
            "API key is required".to_string()
          ))?;
        let mut config = ClientConfig::new(api_key);
        if let Ok(base_url) = std::env::var(BASE_URL_ENV)
        {   debug!("Using base URL from {}", BASE_URL_ENV);
            config = config.with_base_url(base_url);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self
    {   self.base_url = base_url.into();
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: f64) -> Self
    {   self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self
    {   self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self
    {   self.backoff = backoff;
        self
    }

    pub fn validate(&self) -> Result<()>
    {   if self.api_key.trim().is_empty()
        {   return Err(Error::Configuration(
              "API key is required".to_string()
            ));
        }
        if self.timeout_secs <= 0.0
          || Duration::try_from_secs_f64(self.timeout_secs).is_err()
        {   return Err(Error::Configuration(
              "Timeout must be positive".to_string()
            ));
        }
        if self.base_url.trim().is_empty()
        {   return Err(Error::Configuration(
              "Base URL is required".to_string()
            ));
        }
        Ok(())
    }

    /// Falls back to the default if `timeout_secs` is not a valid duration
    pub fn timeout(&self) -> Duration
    {   Duration::try_from_secs_f64(self.timeout_secs)
          .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS as u64))
    }

    /// `base_url` joined with `path`, with exactly one slash between
    pub(crate) fn endpoint(&self, path: &str) -> String
    {   format!(
          "{}/{}",
          self.base_url.trim_end_matches('/'),
          path.trim_start_matches('/')
        )
    }
}
