use async_trait::async_trait;
use log::{debug, error, trace};
use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;
use crate::error::Error;
use crate::request::{build_result, GenerationResult, ReportedUsage};
use crate::Provider;

pub const GROQ_API_BASE: &str
  = "https://api.groq.com/openai/v1";
pub const CEREBRAS_API_BASE: &str
  = "https://api.cerebras.ai/v1";

// ===== Message Types =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage
{   pub role: String
  , #[serde(default)]
    pub content: Option<String>
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest
{   pub model: String
  , pub messages: Vec<ChatMessage>
  , pub max_tokens: u32
  , pub temperature: f32
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice
{   pub message: ChatMessage
  , #[serde(default)]
    pub finish_reason: Option<String>
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatUsage
{   pub prompt_tokens: Option<u64>
  , pub completion_tokens: Option<u64>
  , pub total_tokens: Option<u64>
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse
{   #[serde(default)]
    pub choices: Vec<Choice>
  , #[serde(default)]
    pub usage: Option<ChatUsage>
}

impl ChatResponse
{   /// choices[0].message.content
    pub fn first_text(&self) -> Option<String>
    {   self.choices
          .first()
          .map(|c| c.message.content.clone().unwrap_or_default())
    }

    pub fn reported_usage(&self) -> ReportedUsage
    {   let usage = self.usage.clone().unwrap_or_default();
        ReportedUsage
        {   input: usage.prompt_tokens
          , output: usage.completion_tokens
          , total: usage.total_tokens
        }
    }
}

// ===== Adapter =====

/// OpenAI-compatible "choices/message" family with a bearer token.
/// Groq and Cerebras differ only in base URL and default model.
pub struct ChatCompletionsAdapter
{   provider: Provider
  , http_client: reqwest::Client
  , api_base: String
  , default_model: String
  , max_tokens: u32
  , temperature: f32
}

impl ChatCompletionsAdapter
{   pub fn new(config: &ProviderConfig) -> Result<Self, Error>
    {   let default_base = match config.provider
        {   Provider::Groq => GROQ_API_BASE
          , Provider::Cerebras => CEREBRAS_API_BASE
          , other => {
              return Err(Error::InvalidConfiguration(
                format!("{} is not a chat-completions backend", other)
              ));
            }
        };
        debug!("Creating ChatCompletionsAdapter for {}", config.provider);
        Ok(ChatCompletionsAdapter
        {   provider: config.provider
          , http_client: super::build_http_client(config.timeout())?
          , api_base: config.base_url_or(default_base)
          , default_model: config.model_or_catalog_default()
          , max_tokens: config.max_tokens()
          , temperature: config.temperature()
        })
    }
}

#[async_trait]
impl super::ProviderAdapter for ChatCompletionsAdapter
{   fn provider(&self) -> Provider
    {   self.provider
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
        debug!("{} chat completion for: {}", self.provider, model);

        let request = ChatRequest
        {   model: model.clone()
          , messages: vec![
              ChatMessage
              {   role: "user".to_string()
                , content: Some(prompt.to_string())
              }
            ]
          , max_tokens: self.max_tokens
          , temperature: self.temperature
        };
        trace!("{} request: {:?}", self.provider, request);

        let builder = self.http_client
          .post(format!("{}/chat/completions", self.api_base))
          .bearer_auth(credential)
          .json(&request);

        let (response, latency): (ChatResponse, _)
          = super::send_json(self.provider, builder).await?;

        let text = response.first_text().ok_or_else(|| {
          error!("No choices in {} response", self.provider);
          Error::NoChoicesInResponse(self.provider)
        })?;

        Ok(build_result(
          self.provider
        , model
        , prompt
        , text
        , response.reported_usage()
        , latency
        ))
    }
}
