//! Credential sources. The proxy asks for a key on every dispatch
//! and never keeps one around.

use std::collections::HashMap;
use log::debug;

use crate::Provider;

pub trait CredentialStore: Send + Sync
{   /// Key for `provider`, or None when no usable key exists
    fn credential(&self, provider: Provider) -> Option<String>;
}

fn usable(key: &str) -> Option<String>
{   let key = key.trim();
    if key.is_empty()
    {   None
    } else
    {   Some(key.to_string())
    }
}

/// In-memory keys, usually filled from the key store.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials
{   keys: HashMap<Provider, String>
}

impl StaticCredentials
{   pub fn new() -> Self
    {   Self::default()
    }

    pub fn from_specs(specs: Vec<crate::ApiKeySpec>) -> Self
    {   let mut creds = Self::new();
        for spec in specs
        {   creds.set(spec.provider, spec.key);
        }
        creds
    }

    pub fn with(mut self, provider: Provider, key: impl Into<String>) -> Self
    {   self.set(provider, key);
        self
    }

    pub fn set(&mut self, provider: Provider, key: impl Into<String>)
    {   debug!("Setting key for: {}", provider);
        self.keys.insert(provider, key.into());
    }
}

impl CredentialStore for StaticCredentials
{   fn credential(&self, provider: Provider) -> Option<String>
    {   self.keys.get(&provider).and_then(|k| usable(k))
    }
}

/// Reads `<PROVIDER>_API_KEY` from the environment at call time.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentials;

impl EnvCredentials
{   pub fn env_var(provider: Provider) -> Option<&'static str>
    {   match provider
        {   Provider::Gemini => Some("GEMINI_API_KEY")
          , Provider::Groq => Some("GROQ_API_KEY")
          , Provider::Cerebras => Some("CEREBRAS_API_KEY")
          , Provider::Custom => None
        }
    }
}

impl CredentialStore for EnvCredentials
{   fn credential(&self, provider: Provider) -> Option<String>
    {   let var = Self::env_var(provider)?;
        std::env::var(var).ok().and_then(|k| usable(&k))
    }
}
