//! Unified request and result types for the proxy

use serde::{Deserialize, Serialize};

use crate::Provider;

/// What the caller wants generated
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest
{   /// The prompt text
    pub prompt: String
  , /// Preferred provider; None sweeps the fallback order
    #[serde(default)]
    pub provider: Option<Provider>
  , /// Model override for the preferred provider
    #[serde(default)]
    pub model: Option<String>
  , /// Project the call is accounted to
    #[serde(default)]
    pub project_id: Option<String>
  , /// Display name of that project
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>
}

impl GenerationRequest
{   pub fn new(prompt: impl Into<String>) -> Self
    {   GenerationRequest
        {   prompt: prompt.into()
          , ..Default::default()
        }
    }

    pub fn with_provider(mut self, provider: Provider) -> Self
    {   self.provider = Some(provider);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self
    {   self.model = Some(model.into());
        self
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self
    {   self.project_id = Some(project_id.into());
        self
    }

    pub fn with_project_name(mut self, name: impl Into<String>) -> Self
    {   self.project_name = Some(name.into());
        self
    }
}

/// Provider-agnostic generation result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult
{   /// Generated text
    pub text: String
  , /// Provider that actually answered
    pub provider: Provider
  , /// Model that generated it
    pub model: String
  , pub input_tokens: u64
  , pub output_tokens: u64
  , pub total_tokens: u64
  , /// Wall-clock time of the successful call only
    pub latency_ms: u64
  , pub fallback_used: bool
  , /// Originally requested provider, set iff `fallback_used`
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub fallback_from: Option<Provider>
  , /// At least one token count is a chars/4 estimate
    #[serde(default)]
    pub usage_estimated: bool
}

impl GenerationResult
{   /// Mark this result as produced by a fallback away from `from`
    pub fn fell_back_from(mut self, from: Provider) -> Self
    {   self.fallback_used = true;
        self.fallback_from = Some(from);
        self
    }
}

/// Usage counters as reported by a backend, each possibly absent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportedUsage
{   pub input: Option<u64>
  , pub output: Option<u64>
  , pub total: Option<u64>
}

/// Normalized usage counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenCounts
{   pub input: u64
  , pub output: u64
  , pub total: u64
  , pub estimated: bool
}

/// ceil(chars / 4). An approximation, not a tokenizer.
pub fn estimate_tokens(text: &str) -> u64
{   let chars = text.chars().count() as u64;
    chars.div_ceil(4)
}

/// Fill in whatever the backend left out.
///
/// A zero counter is treated like a missing one. A reported total
/// wins over the sum; without one the total is input + output.
pub fn normalize_usage(
  prompt: &str
, text: &str
, reported: ReportedUsage
) -> TokenCounts
{   let present = |v: Option<u64>| v.filter(|n| *n > 0);
    let mut estimated = false;

    let input = present(reported.input).unwrap_or_else(|| {
      estimated = true;
      estimate_tokens(prompt)
    });
    let output = present(reported.output).unwrap_or_else(|| {
      estimated = true;
      estimate_tokens(text)
    });
    let total = present(reported.total)
      .unwrap_or(input + output);

    TokenCounts
    {   input
      , output
      , total
      , estimated
    }
}

/// Assemble a non-fallback result from one adapter call
pub fn build_result(
  provider: Provider
, model: String
, prompt: &str
, text: String
, reported: ReportedUsage
, latency: std::time::Duration
) -> GenerationResult
{   let counts = normalize_usage(prompt, &text, reported);
    GenerationResult
    {   text
      , provider
      , model
      , input_tokens: counts.input
      , output_tokens: counts.output
      , total_tokens: counts.total
      , latency_ms: latency.as_millis() as u64
      , fallback_used: false
      , fallback_from: None
      , usage_estimated: counts.estimated
    }
}
