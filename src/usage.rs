//! QA log and usage records handed to the external store.
//! The proxy only appends; it never reads these back.

use std::sync::Mutex;
use chrono::{DateTime, NaiveDate, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::catalog::{provider_info, usage_status, ProviderLimits, UsageStatus};
use crate::error::Error;
use crate::request::{GenerationRequest, GenerationResult};
use crate::Provider;

pub const DEFAULT_PROJECT: &str = "default";

/// One answered prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QaRecord
{   pub project_id: String
  , #[serde(skip_serializing_if = "Option::is_none", default)]
    pub project_name: Option<String>
  , pub provider: Provider
  , pub model: String
  , pub prompt: String
  , pub response: String
  , pub input_tokens: u64
  , pub output_tokens: u64
  , pub total_tokens: u64
  , pub latency_ms: u64
  , pub has_sensitive_data: bool
  , pub fallback_used: bool
  , #[serde(skip_serializing_if = "Option::is_none", default)]
    pub fallback_from: Option<Provider>
  , pub usage_estimated: bool
  , pub created_at: DateTime<Utc>
}

impl QaRecord
{   pub fn from_call(
      request: &GenerationRequest
    , result: &GenerationResult
    ) -> Self
    {   let has_sensitive_data
          = crate::sensitive::contains_sensitive_data(&request.prompt)
          || crate::sensitive::contains_sensitive_data(&result.text);
        QaRecord
        {   project_id: request.project_id
              .clone()
              .unwrap_or_else(|| DEFAULT_PROJECT.to_string())
          , project_name: request.project_name.clone()
          , provider: result.provider
          , model: result.model.clone()
          , prompt: request.prompt.clone()
          , response: result.text.clone()
          , input_tokens: result.input_tokens
          , output_tokens: result.output_tokens
          , total_tokens: result.total_tokens
          , latency_ms: result.latency_ms
          , has_sensitive_data
          , fallback_used: result.fallback_used
          , fallback_from: result.fallback_from
          , usage_estimated: result.usage_estimated
          , created_at: Utc::now()
        }
    }
}

/// Per-provider, per-day counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord
{   pub provider: Provider
  , /// YYYY-MM-DD
    pub date: String
  , pub request_count: u64
  , pub token_count: u64
  , #[serde(skip_serializing_if = "Option::is_none", default)]
    pub project_id: Option<String>
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary
{   pub provider: Provider
  , pub today_requests: u64
  , pub today_tokens: u64
  , pub limits: ProviderLimits
  , pub status: UsageStatus
}

impl UsageSummary
{   /// Worse of the request and token status against free-tier limits
    pub fn from_usage(usage: &UsageRecord) -> Self
    {   let limits = provider_info(usage.provider).default_limits;
        let status = usage_status(usage.request_count, limits.rpd)
          .max(usage_status(usage.token_count, limits.daily_tokens()));
        UsageSummary
        {   provider: usage.provider
          , today_requests: usage.request_count
          , today_tokens: usage.token_count
          , limits
          , status
        }
    }
}

pub trait UsageSink: Send + Sync
{   fn append(&self, record: QaRecord) -> Result<(), Error>;
}

/// Keeps records in process memory.
#[derive(Debug, Default)]
pub struct MemoryUsageSink
{   records: Mutex<Vec<QaRecord>>
}

impl MemoryUsageSink
{   pub fn new() -> Self
    {   Self::default()
    }

    pub fn records(&self) -> Vec<QaRecord>
    {   self.records
          .lock()
          .unwrap_or_else(|poisoned| poisoned.into_inner())
          .clone()
    }

    /// Requests and tokens for one provider on one UTC day
    pub fn daily_usage(
      &self
    , provider: Provider
    , date: NaiveDate
    ) -> UsageRecord
    {   let records = self.records();
        let today: Vec<&QaRecord> = records
          .iter()
          .filter(|r| {
            r.provider == provider && r.created_at.date_naive() == date
          })
          .collect();
        UsageRecord
        {   provider
          , date: date.format("%Y-%m-%d").to_string()
          , request_count: today.len() as u64
          , token_count: today.iter().map(|r| r.total_tokens).sum()
          , project_id: None
        }
    }

    pub fn summary(&self, provider: Provider, date: NaiveDate) -> UsageSummary
    {   UsageSummary::from_usage(&self.daily_usage(provider, date))
    }
}

impl UsageSink for MemoryUsageSink
{   fn append(&self, record: QaRecord) -> Result<(), Error>
    {   debug!(
          "Recording {} tokens for {}",
          record.total_tokens, record.provider
        );
        self.records
          .lock()
          .map_err(|_| Error::Other("usage sink lock poisoned".to_string()))?
          .push(record);
        Ok(())
    }
}
