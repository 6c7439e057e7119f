pub mod error;
pub mod config;
pub mod catalog;
pub mod credentials;
pub mod providers;
pub mod request;
pub mod dispatch;
pub mod failover;
pub mod orchestrator;
pub mod surface;
pub mod sensitive;
pub mod usage;
pub mod client;
use serde::{Deserialize, Serialize};

/*

allm-proxy: one request shape for a handful of free-tier text
generation backends, with retry on throttling and an automatic
fall-over to the next backend when the preferred one gives up.

allm-proxy/
├── Cargo.toml
├── src/
│   ├── lib.rs          # Provider identities and the backend channel API
│   ├── error.rs        # Error taxonomy and rate-limit classification
│   ├── config.rs       # Provider endpoints, fallback order, retry knobs
│   ├── catalog.rs      # Known models, free-tier limits, pricing
│   ├── credentials.rs  # Where API keys come from
│   ├── providers/      # One adapter per wire family
│   │   ├── mod.rs      # ProviderAdapter trait + shared HTTP plumbing
│   │   ├── gemini.rs   # "candidates/parts" family
│   │   └── chat_completions.rs  # "choices/message" family (Groq, Cerebras)
│   ├── request.rs      # GenerationRequest / GenerationResult
│   ├── dispatch.rs     # Provider -> adapter routing
│   ├── failover.rs     # Retry policy, backoff, fallback order
│   ├── orchestrator.rs # smart_call: preferred attempt + fallback sweep
│   ├── surface.rs      # Single-call (validate) surface
│   ├── sensitive.rs    # Sensitive-data pattern check
│   ├── usage.rs        # QA / usage records and sinks
│   ├── client.rs       # Task-owning backend handle
│   └── bin/proxy_call.rs
└── tests/

*/

/// ALLM PROXY API INTERFACE:

// ===== SmartCall =====

pub type SmartCallReply
  = Result<crate::request::GenerationResult, crate::error::Error>;
pub type SmartCallReplySender
  = tokio::sync::mpsc::UnboundedSender<SmartCallReply>;

pub struct SmartCallArgs
{   pub request: crate::request::GenerationRequest
  , pub reply: SmartCallReplySender
}

// ===== SingleCall =====

pub type SingleCallReplySender
  = tokio::sync::mpsc::UnboundedSender<crate::surface::SingleCallReply>;

pub struct SingleCallArgs
{   pub request: crate::surface::SingleCallRequest
  , pub reply: SingleCallReplySender
}

// ===== GetModelLists =====

pub type GetModelListsReply
  = Result<Vec<(crate::Provider, String)>, crate::error::Error>;
pub type GetModelListsReplySender
  = tokio::sync::mpsc::UnboundedSender<GetModelListsReply>;

pub struct GetModelListsArgs
{   pub reply: GetModelListsReplySender
}

// ===== KillProcess =====

pub type KillProcessReply = Result<(), crate::error::Error>;
pub type KillProcessReplySender
  = tokio::sync::mpsc::UnboundedSender<KillProcessReply>;

pub struct KillProcessArgs
{   pub reply: KillProcessReplySender
}

// ===== ProxyHand (sender side) =====

pub struct ProxyHand
{   pub smart_call_tx
      : tokio::sync::mpsc::UnboundedSender<SmartCallArgs>
  , pub single_call_tx
      : tokio::sync::mpsc::UnboundedSender<SingleCallArgs>
  , pub get_model_lists_tx
      : tokio::sync::mpsc::UnboundedSender<GetModelListsArgs>
  , pub kill_process_tx
      : tokio::sync::mpsc::UnboundedSender<KillProcessArgs>
}

// ===== ProxyFoot (receiver side) =====

pub struct ProxyFoot
{   pub smart_call_rx
      : tokio::sync::mpsc::UnboundedReceiver<SmartCallArgs>
  , pub single_call_rx
      : tokio::sync::mpsc::UnboundedReceiver<SingleCallArgs>
  , pub get_model_lists_rx
      : tokio::sync::mpsc::UnboundedReceiver<GetModelListsArgs>
  , pub kill_process_rx
      : tokio::sync::mpsc::UnboundedReceiver<KillProcessArgs>
}

/// ALLM PROXY STRUCTURES:

/// The closed set of backends the proxy knows about.
/// `Custom` is a user-defined key slot with no built-in adapter.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize
)]
#[serde(rename_all = "lowercase")]
pub enum Provider
{   /// Google AI Studio (Gemini), "candidates" wire family
    Gemini
  , /// Groq Cloud, OpenAI-compatible "choices" wire family
    Groq
  , /// Cerebras inference, OpenAI-compatible "choices" wire family
    Cerebras
  , /// User-supplied endpoint slot
    Custom
}

impl Provider
{   pub const ALL: [Provider; 4] =
      [ Provider::Gemini
      , Provider::Groq
      , Provider::Cerebras
      , Provider::Custom
      ];

    pub fn as_str(&self) -> &'static str
    {   match self
        {   Provider::Gemini => "gemini"
          , Provider::Groq => "groq"
          , Provider::Cerebras => "cerebras"
          , Provider::Custom => "custom"
        }
    }
}

impl std::fmt::Display for Provider
{   fn fmt(&self, f: &mut std::fmt::Formatter<'_>)
      -> std::fmt::Result
    {   f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Provider
{   type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {   let wanted = s.trim().to_lowercase();
        Provider::ALL
          .iter()
          .copied()
          .find(|p| p.as_str() == wanted)
          .ok_or_else(|| {
            crate::error::Error::UnknownProvider(s.trim().to_string())
          })
    }
}

/// A credential handed to the proxy by the key store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ApiKeySpec
{   pub provider: Provider
  , pub key: String
}

pub use client::ProxyBackend;
pub use dispatch::Dispatcher;
pub use error::{Error, ErrorKind};
pub use orchestrator::SmartProxy;
pub use request::{GenerationRequest, GenerationResult};
