use std::fmt;
use once_cell::sync::Lazy;
use regex::Regex;

/// Throttling markers. "rate" only as a whole word, so URLs such as
/// `models/x:generateContent` stay unclassified.
static RATE_LIMIT_MARKER: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"(?i)\brate\b|rate[ _-]?limit|too many requests")
    .expect("rate-limit marker compiles")
});

/// Custom error type for proxy operations
/// Implements Clone for sending through channels
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error
{   /// No credential available for a provider
    MissingApiKey(crate::Provider)
  , /// Provider identity has no adapter, or text names no provider
    UnknownProvider(String)
  , /// Backend throttled the request (HTTP 429 or a rate-limit marker)
    RateLimited
    {   provider: crate::Provider
      , status: Option<u16>
      , body: String
    }
  , /// Backend answered with any other non-2xx status
    UpstreamRejected
    {   provider: crate::Provider
      , status: u16
      , body: String
    }
  , /// HTTP transport error (connect, TLS, body read)
    HttpError(String)
  , /// Failed to parse API response
    ParseError(String)
  , /// Response carried no candidates / choices
    NoChoicesInResponse(crate::Provider)
  , /// Every attempted provider failed, in attempt order.
    /// Empty when nothing was attempted.
    AllProvidersFailed
    {   failures: Vec<(crate::Provider, Error)>
    }
  , /// Invalid configuration
    InvalidConfiguration(String)
  , /// Timeout error
    Timeout
  , /// Generic error
    Other(String)
}

/// Coarse classification used by the retry and fallback layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind
{   RateLimited
  , UpstreamRejected
  , UnknownProvider
  , AllProvidersFailed
  , LocalFailure
}

/// True when the text carries one of the throttling markers.
pub fn has_rate_limit_marker(text: &str) -> bool
{   RATE_LIMIT_MARKER.is_match(text)
}

impl Error
{   /// Build an upstream error from a non-2xx response,
    /// classifying it as RateLimited or UpstreamRejected.
    pub fn upstream(
      provider: crate::Provider
    , status: u16
    , body: String
    ) -> Self
    {   if status == 429 || has_rate_limit_marker(&body)
        {   Error::RateLimited
            {   provider
              , status: Some(status)
              , body
            }
        } else
        {   Error::UpstreamRejected
            {   provider
              , status
              , body
            }
        }
    }

    pub fn kind(&self) -> ErrorKind
    {   match self
        {   Error::RateLimited { .. } => ErrorKind::RateLimited
          , Error::UpstreamRejected { .. } => ErrorKind::UpstreamRejected
          , Error::UnknownProvider(_) => ErrorKind::UnknownProvider
          , Error::AllProvidersFailed { .. } => {
              ErrorKind::AllProvidersFailed
            }
          , Error::HttpError(msg) | Error::Other(msg)
              if has_rate_limit_marker(msg) => ErrorKind::RateLimited
          , _ => ErrorKind::LocalFailure
        }
    }

    /// Only rate-limit-class failures are eligible for backoff.
    pub fn is_rate_limited(&self) -> bool
    {   self.kind() == ErrorKind::RateLimited
    }

    /// HTTP status reported by the backend, if any
    pub fn status(&self) -> Option<u16>
    {   match self
        {   Error::RateLimited { status, .. } => *status
          , Error::UpstreamRejected { status, .. } => Some(*status)
          , _ => None
        }
    }

    /// Raw upstream body, if any
    pub fn body(&self) -> Option<&str>
    {   match self
        {   Error::RateLimited { body, .. }
          | Error::UpstreamRejected { body, .. } => Some(body.as_str())
          , _ => None
        }
    }

    /// Last underlying error of an exhausted sweep
    pub fn last_error(&self) -> Option<&Error>
    {   match self
        {   Error::AllProvidersFailed { failures } => {
              failures.last().map(|(_, e)| e)
            }
          , _ => None
        }
    }

    /// Providers attempted by an exhausted sweep, in order
    pub fn attempted(&self) -> Vec<crate::Provider>
    {   match self
        {   Error::AllProvidersFailed { failures } => {
              failures.iter().map(|(p, _)| *p).collect()
            }
          , _ => vec![]
        }
    }
}

impl fmt::Display for Error
{   fn fmt(&self, f: &mut fmt::Formatter<'_>)
      -> fmt::Result
    {   match self
        {   Error::MissingApiKey(provider) => {
              write!(f, "Missing API key for: {}", provider)
            }
          , Error::UnknownProvider(provider) => {
              write!(f, "Unknown provider: {}", provider)
            }
          , Error::RateLimited { provider, status, body } => {
              match status
              {   Some(code) => write!(f,
                    "{} API error {}: {}",
                    provider, code, body
                  )
                , None => write!(f,
                    "{} rate limited: {}",
                    provider, body
                  )
              }
            }
          , Error::UpstreamRejected { provider, status, body } => {
              write!(f, "{} API error {}: {}", provider, status, body)
            }
          , Error::HttpError(msg) => {
              write!(f, "HTTP error: {}", msg)
            }
          , Error::ParseError(msg) => {
              write!(f, "Parse error: {}", msg)
            }
          , Error::NoChoicesInResponse(provider) => {
              write!(f,
                "{} response contained no candidates",
                provider
              )
            }
          , Error::AllProvidersFailed { failures } => {
              match failures.last()
              {   None => write!(f, "All providers failed")
                , Some((provider, last)) => write!(f,
                    "All providers failed ({} tried), last from {}: {}",
                    failures.len(), provider, last
                  )
              }
            }
          , Error::InvalidConfiguration(msg) => {
              write!(f, "Invalid configuration: {}", msg)
            }
          , Error::Timeout => {
              write!(f, "Request timed out")
            }
          , Error::Other(msg) => {
              write!(f, "Error: {}", msg)
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<String> for Error
{   fn from(s: String) -> Self
    {   Error::Other(s)
    }
}

impl From<&str> for Error
{   fn from(s: &str) -> Self
    {   Error::Other(s.to_string())
    }
}

impl From<reqwest::Error> for Error
{   fn from(e: reqwest::Error) -> Self
    {   if e.is_timeout()
        {   Error::Timeout
        } else
        {   Error::HttpError(e.to_string())
        }
    }
}

impl From<serde_json::Error> for Error
{   fn from(e: serde_json::Error) -> Self
    {   Error::ParseError(e.to_string())
    }
}
