//! `smart_call`: the preferred provider with retry, then a single
//! attempt at each remaining provider in fallback order.

use std::sync::Arc;
use log::{debug, info, warn};

use crate::config::ProxyConfig;
use crate::credentials::CredentialStore;
use crate::dispatch::Dispatcher;
use crate::error::{Error, ErrorKind};
use crate::failover::{
  with_retry, FallbackOrder, RetryPolicy, Sleeper, TokioSleeper
};
use crate::request::{GenerationRequest, GenerationResult};
use crate::Provider;

pub struct SmartProxy
{   dispatcher: Dispatcher
  , fallback_order: FallbackOrder
  , retry_policy: RetryPolicy
  , sleeper: Arc<dyn Sleeper>
}

impl SmartProxy
{   /// Every provider in `fallback_order` must have an adapter.
    pub fn new(
      dispatcher: Dispatcher
    , fallback_order: Vec<Provider>
    , retry_policy: RetryPolicy
    ) -> Result<Self, Error>
    {   if let Some(missing) = fallback_order
          .iter()
          .find(|p| !dispatcher.has_adapter(**p))
        {   return Err(Error::UnknownProvider(missing.to_string()));
        }
        Ok(SmartProxy
        {   dispatcher
          , fallback_order: FallbackOrder::new(fallback_order)
          , retry_policy
          , sleeper: Arc::new(TokioSleeper)
        })
    }

    /// Built-in adapters, order and retry policy from `config`
    pub fn from_config(
      config: &ProxyConfig
    , credentials: Arc<dyn CredentialStore>
    ) -> Result<Self, Error>
    {   config.validate()?;
        let dispatcher = Dispatcher::from_config(config, credentials)?;
        SmartProxy::new(
          dispatcher
        , config.fallback_order.clone()
        , config.retry_policy()
        )
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self
    {   self.sleeper = sleeper;
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher
    {   &self.dispatcher
    }

    pub fn fallback_order(&self) -> &FallbackOrder
    {   &self.fallback_order
    }

    pub fn retry_policy(&self) -> &RetryPolicy
    {   &self.retry_policy
    }

    pub async fn smart_call(
      &self
    , request: &GenerationRequest
    ) -> Result<GenerationResult, Error>
    {   match request.provider
        {   Some(preferred) => self.preferred_call(request, preferred).await
          , None => self.ordered_call(request).await
        }
    }

    async fn call_with_retry(
      &self
    , prompt: &str
    , provider: Provider
    , model: Option<&str>
    ) -> Result<GenerationResult, Error>
    {   with_retry(
          &self.retry_policy
        , self.sleeper.as_ref()
        , || self.dispatcher.dispatch(prompt, provider, model)
        ).await
    }

    async fn preferred_call(
      &self
    , request: &GenerationRequest
    , preferred: Provider
    ) -> Result<GenerationResult, Error>
    {   // Unknown identities never reach retry or fallback.
        self.dispatcher.adapter(preferred)?;

        let preferred_err = match self
          .call_with_retry(
            &request.prompt
          , preferred
          , request.model.as_deref()
          )
          .await
        {   Ok(result) => return Ok(result)
          , Err(e) if e.kind() == ErrorKind::UnknownProvider => {
              return Err(e);
            }
          , Err(e) => e
        };
        warn!(
          "Provider {} failed, attempting fallback: {}",
          preferred, preferred_err
        );

        let mut failures = vec![(preferred, preferred_err)];
        for candidate in self.fallback_order.candidates_excluding(preferred)
        {   let model = model_for(candidate, request.model.as_deref());
            match self.dispatcher
              .dispatch(&request.prompt, candidate, model)
              .await
            {   Ok(result) => {
                  info!(
                    "Fell back from {} to {}",
                    preferred, candidate
                  );
                  return Ok(result.fell_back_from(preferred));
                }
              , Err(e) if e.kind() == ErrorKind::UnknownProvider => {
                  return Err(e);
                }
              , Err(e) => {
                  warn!("Fallback to {} also failed: {}", candidate, e);
                  failures.push((candidate, e));
                }
            }
        }

        Err(Error::AllProvidersFailed { failures })
    }

    /// No preference: every provider in order, each with retry.
    async fn ordered_call(
      &self
    , request: &GenerationRequest
    ) -> Result<GenerationResult, Error>
    {   let mut failures = Vec::new();
        for provider in self.fallback_order.as_slice().iter().copied()
        {   let model = model_for(provider, request.model.as_deref());
            debug!("Trying {} in fallback order", provider);
            match self
              .call_with_retry(&request.prompt, provider, model)
              .await
            {   Ok(result) => {
                  return Ok(match self.fallback_order.first()
                  {   Some(first) if first != provider => {
                        info!("Fell back from {} to {}", first, provider);
                        result.fell_back_from(first)
                      }
                    , _ => result
                  });
                }
              , Err(e) if e.kind() == ErrorKind::UnknownProvider => {
                  return Err(e);
                }
              , Err(e) => {
                  warn!("Provider {} failed: {}", provider, e);
                  failures.push((provider, e));
                }
            }
        }

        Err(Error::AllProvidersFailed { failures })
    }
}

/// Model overrides only travel to providers that list the model.
fn model_for<'a>(
  provider: Provider
, requested: Option<&'a str>
) -> Option<&'a str>
{   requested.filter(|m| crate::catalog::lists_model(provider, m))
}
