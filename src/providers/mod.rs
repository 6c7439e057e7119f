//! Provider adapters: one per wire family

pub mod gemini;
pub mod chat_completions;

use std::time::{Duration, Instant};
use async_trait::async_trait;
use log::{error, trace};
use serde::de::DeserializeOwned;

use crate::error::Error;
use crate::request::GenerationResult;
use crate::Provider;

// Re-export for convenience
pub use chat_completions::ChatCompletionsAdapter;
pub use gemini::GeminiAdapter;

/// Translates a prompt into one backend's wire request and its
/// response back into a `GenerationResult`. Adapters never retry
/// or fall back.
#[async_trait]
pub trait ProviderAdapter: Send + Sync
{   fn provider(&self) -> Provider;

    /// Model used when the caller names none
    fn default_model(&self) -> &str;

    /// Exactly one outbound call, authenticated with `credential`.
    async fn invoke(
      &self
    , prompt: &str
    , model: Option<&str>
    , credential: &str
    ) -> Result<GenerationResult, Error>;
}

pub(crate) fn build_http_client(
  timeout: Duration
) -> Result<reqwest::Client, Error>
{   reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| Error::InvalidConfiguration(e.to_string()))
}

/// Send a prepared request and decode a 2xx JSON body.
///
/// The returned duration covers the send and the full body read.
pub(crate) async fn send_json<T: DeserializeOwned>(
  provider: Provider
, request: reqwest::RequestBuilder
) -> Result<(T, Duration), Error>
{   let start = Instant::now();

    let response = request
      .send()
      .await
      .map_err(|e| {
        error!("{} HTTP error: {}", provider, e);
        Error::from(e)
      })?;

    let status = response.status();
    trace!("{} response status: {}", provider, status);

    let body = response.text().await.map_err(|e| {
      error!("{} body read error: {}", provider, e);
      Error::from(e)
    })?;
    let latency = start.elapsed();

    if !status.is_success()
    {   error!("{} API error {}: {}", provider, status.as_u16(), body);
        return Err(Error::upstream(provider, status.as_u16(), body));
    }

    let parsed = serde_json::from_str(&body).map_err(|e| {
      error!("{} parse error: {}", provider, e);
      Error::ParseError(format!("{}: {}", provider, e))
    })?;
    Ok((parsed, latency))
}
