#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use allm_proxy::credentials::StaticCredentials;
use allm_proxy::failover::{RetryPolicy, Sleeper};
use allm_proxy::providers::ProviderAdapter;
use allm_proxy::request::{build_result, ReportedUsage};
use allm_proxy::{Dispatcher, Error, GenerationResult, Provider, SmartProxy};

pub fn init_logging()
{   let _ = env_logger::builder().is_test(true).try_init();
}

pub fn rate_limited(provider: Provider) -> Error
{   Error::upstream(
      provider
    , 429
    , r#"{"error":{"message":"Resource has been exhausted"}}"#.to_string()
    )
}

pub fn unauthorized(provider: Provider) -> Error
{   Error::upstream(provider, 401, "invalid api key".to_string())
}

pub fn server_error(provider: Provider) -> Error
{   Error::upstream(provider, 500, "internal error".to_string())
}

/// Adapter double: plays a script of outcomes, then repeats `then`.
pub struct ScriptedAdapter
{   provider: Provider
  , script: Mutex<VecDeque<Result<String, Error>>>
  , then: Result<String, Error>
  , calls: AtomicUsize
  , models: Mutex<Vec<Option<String>>>
  , credentials: Mutex<Vec<String>>
}

impl ScriptedAdapter
{   pub fn new(
      provider: Provider
    , script: Vec<Result<String, Error>>
    , then: Result<String, Error>
    ) -> Arc<Self>
    {   Arc::new(ScriptedAdapter
        {   provider
          , script: Mutex::new(script.into())
          , then
          , calls: AtomicUsize::new(0)
          , models: Mutex::new(vec![])
          , credentials: Mutex::new(vec![])
        })
    }

    pub fn answering(provider: Provider, text: &str) -> Arc<Self>
    {   Self::new(provider, vec![], Ok(text.to_string()))
    }

    pub fn failing(provider: Provider, error: Error) -> Arc<Self>
    {   Self::new(provider, vec![], Err(error))
    }

    pub fn calls(&self) -> usize
    {   self.calls.load(Ordering::SeqCst)
    }

    pub fn models(&self) -> Vec<Option<String>>
    {   self.models.lock().unwrap().clone()
    }

    pub fn credentials(&self) -> Vec<String>
    {   self.credentials.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter
{   fn provider(&self) -> Provider
    {   self.provider
    }

    fn default_model(&self) -> &str
    {   "scripted-model"
    }

    async fn invoke(
      &self
    , prompt: &str
    , model: Option<&str>
    , credential: &str
    ) -> Result<GenerationResult, Error>
    {   self.calls.fetch_add(1, Ordering::SeqCst);
        self.models.lock().unwrap().push(model.map(str::to_string));
        self.credentials.lock().unwrap().push(credential.to_string());

        let next = self.script
          .lock()
          .unwrap()
          .pop_front()
          .unwrap_or_else(|| self.then.clone());

        next.map(|text| {
          build_result(
            self.provider
          , model.unwrap_or("scripted-model").to_string()
          , prompt
          , text
          , ReportedUsage
            {   input: Some(5)
              , output: Some(7)
              , total: None
            }
          , Duration::from_millis(12)
          )
        })
    }
}

/// Records requested delays instead of waiting.
#[derive(Default)]
pub struct RecordingSleeper
{   delays: Mutex<Vec<Duration>>
}

impl RecordingSleeper
{   pub fn delays(&self) -> Vec<Duration>
    {   self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper
{   async fn sleep(&self, delay: Duration)
    {   self.delays.lock().unwrap().push(delay);
    }
}

pub fn all_keys() -> StaticCredentials
{   StaticCredentials::new()
      .with(Provider::Gemini, "gemini-key")
      .with(Provider::Groq, "groq-key")
      .with(Provider::Cerebras, "cerebras-key")
}

pub fn dispatcher(
  adapters: &[Arc<ScriptedAdapter>]
, credentials: StaticCredentials
) -> Dispatcher
{   adapters.iter().fold(
      Dispatcher::new(Arc::new(credentials))
    , |d, a| d.with_adapter(a.clone())
    )
}

/// Proxy over A/B/C doubles, order [Gemini, Groq, Cerebras],
/// 100ms base delay and no jitter.
pub fn proxy(
  adapters: &[Arc<ScriptedAdapter>]
, max_retries: u32
) -> (SmartProxy, Arc<RecordingSleeper>)
{   proxy_with(adapters, max_retries, all_keys())
}

pub fn proxy_with(
  adapters: &[Arc<ScriptedAdapter>]
, max_retries: u32
, credentials: StaticCredentials
) -> (SmartProxy, Arc<RecordingSleeper>)
{   let sleeper = Arc::new(RecordingSleeper::default());
    let proxy = SmartProxy::new(
      dispatcher(adapters, credentials)
    , vec![Provider::Gemini, Provider::Groq, Provider::Cerebras]
    , RetryPolicy::new(max_retries, 100, 0)
    )
    .expect("all providers registered")
    .with_sleeper(sleeper.clone());
    (proxy, sleeper)
}
