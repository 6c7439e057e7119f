//! Routes a provider identity to its adapter.
//!
//! The adapter map is filled once at startup; routing reads it and
//! nothing else, so the same identity always reaches the same adapter.

use std::collections::HashMap;
use std::sync::Arc;
use log::{debug, error};

use crate::config::ProxyConfig;
use crate::credentials::CredentialStore;
use crate::error::Error;
use crate::providers::{
  ChatCompletionsAdapter, GeminiAdapter, ProviderAdapter
};
use crate::request::GenerationResult;
use crate::Provider;

pub struct Dispatcher
{   adapters: HashMap<Provider, Arc<dyn ProviderAdapter>>
  , credentials: Arc<dyn CredentialStore>
}

impl Dispatcher
{   /// Empty dispatcher; register adapters before use
    pub fn new(credentials: Arc<dyn CredentialStore>) -> Self
    {   Dispatcher
        {   adapters: HashMap::new()
          , credentials
        }
    }

    /// Dispatcher with the built-in Gemini, Groq and Cerebras adapters
    pub fn from_config(
      config: &ProxyConfig
    , credentials: Arc<dyn CredentialStore>
    ) -> Result<Self, Error>
    {   let dispatcher = Dispatcher::new(credentials)
          .with_adapter(Arc::new(GeminiAdapter::new(
            &config.provider(Provider::Gemini)
          )?))
          .with_adapter(Arc::new(ChatCompletionsAdapter::new(
            &config.provider(Provider::Groq)
          )?))
          .with_adapter(Arc::new(ChatCompletionsAdapter::new(
            &config.provider(Provider::Cerebras)
          )?));
        Ok(dispatcher)
    }

    /// Register an adapter under the provider it reports
    pub fn with_adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self
    {   debug!("Registering adapter for: {}", adapter.provider());
        self.adapters.insert(adapter.provider(), adapter);
        self
    }

    pub fn has_adapter(&self, provider: Provider) -> bool
    {   self.adapters.contains_key(&provider)
    }

    /// Registered providers in `Provider::ALL` order
    pub fn providers(&self) -> Vec<Provider>
    {   Provider::ALL
          .iter()
          .copied()
          .filter(|p| self.has_adapter(*p))
          .collect()
    }

    pub fn adapter(
      &self
    , provider: Provider
    ) -> Result<&Arc<dyn ProviderAdapter>, Error>
    {   self.adapters.get(&provider).ok_or_else(|| {
          error!("No adapter registered for: {}", provider);
          Error::UnknownProvider(provider.to_string())
        })
    }

    /// Route to the adapter, authenticating from the credential store.
    pub async fn dispatch(
      &self
    , prompt: &str
    , provider: Provider
    , model: Option<&str>
    ) -> Result<GenerationResult, Error>
    {   let adapter = self.adapter(provider)?;
        let credential = self.credentials
          .credential(provider)
          .ok_or_else(|| {
            error!("No API key for: {}", provider);
            Error::MissingApiKey(provider)
          })?;
        debug!("Dispatching to {} (model: {:?})", provider, model);
        adapter.invoke(prompt, model, &credential).await
    }

    /// Route to the adapter with a caller-supplied key.
    pub async fn dispatch_with_credential(
      &self
    , prompt: &str
    , provider: Provider
    , model: Option<&str>
    , credential: &str
    ) -> Result<GenerationResult, Error>
    {   let adapter = self.adapter(provider)?;
        let credential = credential.trim();
        if credential.is_empty()
        {   return Err(Error::MissingApiKey(provider));
        }
        debug!(
          "Dispatching to {} with supplied key (model: {:?})",
          provider, model
        );
        adapter.invoke(prompt, model, credential).await
    }

    /// Parse a provider name, then dispatch
    pub async fn dispatch_named(
      &self
    , prompt: &str
    , provider: &str
    , model: Option<&str>
    ) -> Result<GenerationResult, Error>
    {   let provider: Provider = provider.parse()?;
        self.dispatch(prompt, provider, model).await
    }
}
