use async_trait::async_trait;
use log::{debug, error, trace};
use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;
use crate::error::Error;
use crate::request::{build_result, GenerationResult, ReportedUsage};
use crate::Provider;

pub const GEMINI_API_BASE: &str
  = "https://generativelanguage.googleapis.com/v1beta";

// ===== Wire Types =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiPart
{   #[serde(default)]
    pub text: Option<String>
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiContent
{   #[serde(default)]
    pub parts: Vec<GeminiPart>
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig
{   pub max_output_tokens: u32
  , pub temperature: f32
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiRequest
{   pub contents: Vec<GeminiContent>
  , pub generation_config: GenerationConfig
}

#[derive(Debug, Clone, Deserialize)]
pub struct Candidate
{   #[serde(default)]
    pub content: Option<GeminiContent>
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata
{   pub prompt_token_count: Option<u64>
  , pub candidates_token_count: Option<u64>
  , pub total_token_count: Option<u64>
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiResponse
{   #[serde(default)]
    pub candidates: Vec<Candidate>
  , #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>
}

impl GeminiResponse
{   /// candidates[0].content.parts[0].text
    pub fn first_text(&self) -> Option<String>
    {   let candidate = self.candidates.first()?;
        Some(
          candidate.content
            .as_ref()
            .and_then(|c| c.parts.first())
            .and_then(|p| p.text.clone())
            .unwrap_or_default()
        )
    }

    pub fn reported_usage(&self) -> ReportedUsage
    {   let usage = self.usage_metadata.clone().unwrap_or_default();
        ReportedUsage
        {   input: usage.prompt_token_count
          , output: usage.candidates_token_count
          , total: usage.total_token_count
        }
    }
}

// ===== Adapter =====

/// "candidates/parts" family. The key travels in the query string.
pub struct GeminiAdapter
{   http_client: reqwest::Client
  , api_base: String
  , default_model: String
  , max_tokens: u32
  , temperature: f32
}

impl GeminiAdapter
{   pub fn new(config: &ProviderConfig) -> Result<Self, Error>
    {   debug!("Creating GeminiAdapter");
        Ok(GeminiAdapter
        {   http_client: super::build_http_client(config.timeout())?
          , api_base: config.base_url_or(GEMINI_API_BASE)
          , default_model: config.model_or_catalog_default()
          , max_tokens: config.max_tokens()
          , temperature: config.temperature()
        })
    }
}

#[async_trait]
impl super::ProviderAdapter for GeminiAdapter
{   fn provider(&self) -> Provider
    {   Provider::Gemini
    }

    fn default_model(&self) -> &str
    {   &self.default_model
    }

    async fn invoke(
      &self
    , prompt: &str
    , model: Option<&str>
    , credential: &str
    ) -> Result<GenerationResult, Error>
    {   let model = model.unwrap_or(&self.default_model).to_string();
        debug!("Gemini generateContent for: {}", model);

        let request = GeminiRequest
        {   contents: vec![
              GeminiContent
              {   parts: vec![
                    GeminiPart { text: Some(prompt.to_string()) }
                  ]
              }
            ]
          , generation_config: GenerationConfig
            {   max_output_tokens: self.max_tokens
              , temperature: self.temperature
            }
        };
        trace!("Gemini request: {:?}", request);

        let builder = self.http_client
          .post(format!(
            "{}/models/{}:generateContent",
            self.api_base, model
          ))
          .query(&[("key", credential)])
          .json(&request);

        let (response, latency): (GeminiResponse, _)
          = super::send_json(Provider::Gemini, builder).await?;

        let text = response.first_text().ok_or_else(|| {
          error!("No candidates in Gemini response");
          Error::NoChoicesInResponse(Provider::Gemini)
        })?;

        Ok(build_result(
          Provider::Gemini
        , model
        , prompt
        , text
        , response.reported_usage()
        , latency
        ))
    }
}
