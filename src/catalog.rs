//! Known models, free-tier limits and pricing per provider

use serde::{Deserialize, Serialize};

use crate::Provider;

/// Free-tier limits published by a provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderLimits
{   /// Requests per minute
    pub rpm: Option<u64>
  , /// Requests per day
    pub rpd: Option<u64>
  , /// Tokens per minute
    pub tpm: Option<u64>
  , /// Tokens per day
    pub tpd: Option<u64>
  , pub daily_token_limit: Option<u64>
}

impl ProviderLimits
{   /// Daily token ceiling, whichever form the provider publishes
    pub fn daily_tokens(&self) -> Option<u64>
    {   self.tpd.or(self.daily_token_limit)
    }
}

/// Static description of a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderInfo
{   /// Human-readable name (e.g., "Groq Cloud")
    pub name: &'static str
  , /// Models in preference order; the first one is the default
    pub models: &'static [&'static str]
  , pub default_limits: ProviderLimits
  , /// Cost per 1M input tokens (in USD)
    pub cost_per_million_input_tokens: f64
  , /// Cost per 1M output tokens (in USD)
    pub cost_per_million_output_tokens: f64
}

pub fn provider_info(provider: Provider) -> ProviderInfo
{   match provider
    {   Provider::Gemini => ProviderInfo
        {   name: "Google Gemini"
          , models: &[
              "gemini-2.5-flash-lite"
            , "gemini-2.0-flash"
            , "gemini-1.5-pro"
            , "gemini-1.5-flash"
            ]
          , default_limits: ProviderLimits
            {   rpm: Some(15)
              , rpd: Some(1_500)
              , tpm: Some(1_000_000)
              , tpd: Some(50_000_000)
              , daily_token_limit: None
            }
          , cost_per_million_input_tokens: 1.25
          , cost_per_million_output_tokens: 5.0
        }
      , Provider::Groq => ProviderInfo
        {   name: "Groq Cloud"
          , models: &[
              "llama-3.3-70b-versatile"
            , "llama-3.1-8b-instant"
            , "gemma2-9b-it"
            ]
          , default_limits: ProviderLimits
            {   rpm: Some(30)
              , rpd: Some(14_400)
              , tpm: Some(6_000)
              , tpd: Some(500_000)
              , daily_token_limit: None
            }
          , cost_per_million_input_tokens: 0.05
          , cost_per_million_output_tokens: 0.08
        }
      , Provider::Cerebras => ProviderInfo
        {   name: "Cerebras"
          , models: &["llama3.1-8b", "llama-3.3-70b"]
          , default_limits: ProviderLimits
            {   rpm: Some(30)
              , rpd: Some(900)
              , tpm: None
              , tpd: None
              , daily_token_limit: Some(1_000_000)
            }
          , cost_per_million_input_tokens: 0.10
          , cost_per_million_output_tokens: 0.10
        }
      , Provider::Custom => ProviderInfo
        {   name: "Custom"
          , models: &[]
          , default_limits: ProviderLimits::default()
          , cost_per_million_input_tokens: 0.0
          , cost_per_million_output_tokens: 0.0
        }
    }
}

pub fn available_models(provider: Provider) -> Vec<String>
{   provider_info(provider)
      .models
      .iter()
      .map(|m| m.to_string())
      .collect()
}

/// First listed model, or an empty string when there is none
pub fn default_model(provider: Provider) -> String
{   provider_info(provider)
      .models
      .first()
      .map(|m| m.to_string())
      .unwrap_or_default()
}

pub fn lists_model(provider: Provider, model: &str) -> bool
{   provider_info(provider).models.contains(&model)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostEstimate
{   pub provider: Provider
  , pub input_tokens: u64
  , pub output_tokens: u64
  , /// USD at list price
    pub estimated_cost: f64
}

pub fn estimate_cost(
  provider: Provider
, input_tokens: u64
, output_tokens: u64
) -> CostEstimate
{   let info = provider_info(provider);
    let estimated_cost
      = input_tokens as f64 / 1_000_000.0
          * info.cost_per_million_input_tokens
      + output_tokens as f64 / 1_000_000.0
          * info.cost_per_million_output_tokens;
    CostEstimate
    {   provider
      , input_tokens
      , output_tokens
      , estimated_cost
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageStatus
{   Normal
  , Warning
  , Exceeded
}

/// Warning from 80% of the limit, Exceeded at the limit
pub fn usage_status(used: u64, limit: Option<u64>) -> UsageStatus
{   match limit
    {   Some(limit) if used >= limit => UsageStatus::Exceeded
      , Some(limit)
          if used.saturating_mul(5) >= limit.saturating_mul(4)
          => UsageStatus::Warning
      , _ => UsageStatus::Normal
    }
}
