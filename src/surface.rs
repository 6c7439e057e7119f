//! Single-call surface: one dispatch with a caller-supplied key,
//! no retry and no fallback. Replies carry an HTTP-style status and
//! a JSON body so a thin endpoint can forward them unchanged.

use log::{debug, error};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::dispatch::Dispatcher;
use crate::error::Error;
use crate::Provider;

pub const DEFAULT_PING_PROMPT: &str = "Hello";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SingleCallRequest
{   #[serde(default)]
    pub provider: Option<String>
  , /// Credential for this one call
    #[serde(default)]
    pub key: Option<String>
  , #[serde(default)]
    pub model: Option<String>
  , #[serde(default)]
    pub prompt: Option<String>
}

#[derive(Debug, Clone, PartialEq)]
pub struct SingleCallReply
{   pub status: u16
  , pub body: Value
}

impl SingleCallReply
{   fn error(status: u16, message: impl Into<String>) -> Self
    {   SingleCallReply
        {   status
          , body: json!({ "error": { "message": message.into() } })
        }
    }

    pub fn is_success(&self) -> bool
    {   (200..300).contains(&self.status)
    }
}

fn non_blank(value: &Option<String>) -> Option<&str>
{   value
      .as_deref()
      .map(str::trim)
      .filter(|v| !v.is_empty())
}

pub async fn single_call(
  dispatcher: &Dispatcher
, request: SingleCallRequest
) -> SingleCallReply
{   let (provider_name, key) = match (
      non_blank(&request.provider)
    , non_blank(&request.key)
    )
    {   (Some(p), Some(k)) => (p, k)
      , _ => {
          return SingleCallReply::error(
            400, "Provider and Key are required"
          );
        }
    };

    let provider = match provider_name.parse::<Provider>()
    {   Ok(p) if dispatcher.has_adapter(p) => p
      , _ => {
          return SingleCallReply::error(
            400, format!("Unsupported provider: {}", provider_name)
          );
        }
    };

    let prompt = non_blank(&request.prompt)
      .unwrap_or(DEFAULT_PING_PROMPT);
    let model = non_blank(&request.model);
    debug!("Single call to {} (model: {:?})", provider, model);

    match dispatcher
      .dispatch_with_credential(prompt, provider, model, key)
      .await
    {   Ok(result) => {
          let mut body = match serde_json::to_value(&result)
          {   Ok(body) => body
            , Err(e) => return SingleCallReply::error(500, e.to_string())
          };
          if let Value::Object(map) = &mut body
          {   map.remove("usageEstimated");
              map.insert("success".to_string(), Value::Bool(true));
          }
          SingleCallReply { status: 200, body }
        }
      , Err(e) => upstream_reply(e)
    }
}

fn upstream_reply(e: Error) -> SingleCallReply
{   match (e.status(), e.body())
    {   (Some(status), Some(raw)) => {
          let details: Value = serde_json::from_str(raw)
            .unwrap_or_else(|_| Value::String(raw.to_string()));
          let message = details
            .pointer("/error/message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("API Error: {}", status));
          SingleCallReply
          {   status
            , body: json!({
                "error": { "message": message, "details": details }
              })
          }
        }
      , _ => {
          error!("Single call failed locally: {}", e);
          SingleCallReply::error(500, e.to_string())
        }
    }
}
