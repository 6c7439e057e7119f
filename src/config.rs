//! Configuration for proxy providers, fallback order and retry

use std::path::Path;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::Provider;

/// Provider configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig
{   /// Which backend this entry configures
    pub provider: Provider
  , /// API base URL (if custom)
    #[serde(default)]
    pub api_base: Option<String>
  , /// Model used when a request names none
    #[serde(default)]
    pub default_model: Option<String>
  , /// Request timeout in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>
  , /// Max tokens to generate
    #[serde(default)]
    pub max_tokens: Option<u32>
  , /// Temperature for sampling
    #[serde(default)]
    pub temperature: Option<f32>
}

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_TOKENS: u32 = 2048;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

impl ProviderConfig
{   pub fn new(provider: Provider) -> Self
    {   ProviderConfig
        {   provider
          , api_base: None
          , default_model: None
          , timeout_secs: None
          , max_tokens: None
          , temperature: None
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self
    {   self.api_base = Some(api_base.into());
        self
    }

    pub fn with_default_model(
      mut self
    , model: impl Into<String>
    ) -> Self
    {   self.default_model = Some(model.into());
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self
    {   self.timeout_secs = Some(secs);
        self
    }

    /// Base URL with any trailing slash removed
    pub fn base_url_or(&self, fallback: &str) -> String
    {   self.api_base
          .as_deref()
          .unwrap_or(fallback)
          .trim_end_matches('/')
          .to_string()
    }

    /// Configured default model, else the first catalog model
    pub fn model_or_catalog_default(&self) -> String
    {   self.default_model
          .clone()
          .unwrap_or_else(|| crate::catalog::default_model(self.provider))
    }

    pub fn timeout(&self) -> std::time::Duration
    {   std::time::Duration::from_secs(
          self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)
        )
    }

    pub fn max_tokens(&self) -> u32
    {   self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)
    }

    pub fn temperature(&self) -> f32
    {   self.temperature.unwrap_or(DEFAULT_TEMPERATURE)
    }
}

/// Retry configuration for the preferred provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig
{   /// Retries after the first attempt
    pub max_retries: u32
  , /// Backoff base; attempt n waits base * 2^n
    pub base_delay_ms: u64
  , /// Upper bound of the additive uniform jitter
    pub max_jitter_ms: u64
}

impl Default for RetryConfig
{   fn default() -> Self
    {   RetryConfig
        {   max_retries: 3
          , base_delay_ms: 1000
          , max_jitter_ms: 1000
        }
    }
}

/// Proxy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyConfig
{   /// Per-provider overrides; providers not listed use defaults
    #[serde(default)]
    pub providers: Vec<ProviderConfig>
  , /// Priority order of the fallback sweep
    #[serde(default = "default_fallback_order")]
    pub fallback_order: Vec<Provider>
  , /// Retry configuration
    #[serde(default)]
    pub retry: RetryConfig
}

pub fn default_fallback_order() -> Vec<Provider>
{   vec![Provider::Gemini, Provider::Groq, Provider::Cerebras]
}

impl Default for ProxyConfig
{   fn default() -> Self
    {   ProxyConfig
        {   providers: vec![]
          , fallback_order: default_fallback_order()
          , retry: RetryConfig::default()
        }
    }
}

impl ProxyConfig
{   /// Parse and validate a JSON configuration document
    pub fn from_json_str(json: &str) -> Result<Self, Error>
    {   let config: ProxyConfig = serde_json::from_str(json)
          .map_err(|e| {
            Error::InvalidConfiguration(e.to_string())
          })?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error>
    {   let path = path.as_ref();
        debug!("Loading proxy config from {}", path.display());
        let json = std::fs::read_to_string(path)
          .map_err(|e| {
            Error::InvalidConfiguration(
              format!("{}: {}", path.display(), e)
            )
          })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), Error>
    {   if self.retry.base_delay_ms == 0
        {   return Err(Error::InvalidConfiguration(
              "retry.base_delay_ms must be greater than zero"
                .to_string()
            ));
        }
        for (i, provider) in self.fallback_order.iter().enumerate()
        {   if *provider == Provider::Custom
            {   return Err(Error::InvalidConfiguration(
                  "custom has no adapter and cannot be in fallback_order"
                    .to_string()
                ));
            }
            if self.fallback_order[..i].contains(provider)
            {   return Err(Error::InvalidConfiguration(
                  format!("{} listed twice in fallback_order", provider)
                ));
            }
        }
        Ok(())
    }

    /// Settings for one provider, defaulted when not listed
    pub fn provider(&self, provider: Provider) -> ProviderConfig
    {   self.providers
          .iter()
          .find(|p| p.provider == provider)
          .cloned()
          .unwrap_or_else(|| ProviderConfig::new(provider))
    }

    pub fn retry_policy(&self) -> crate::failover::RetryPolicy
    {   crate::failover::RetryPolicy::from(&self.retry)
    }
}
