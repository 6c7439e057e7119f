mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use allm_proxy::credentials::StaticCredentials;
use allm_proxy::failover::{with_retry, FallbackOrder, RetryPolicy};
use allm_proxy::{Error, ErrorKind, GenerationRequest, Provider, SmartProxy};

use common::*;

// ===== Retry controller =====

#[tokio::test]
async fn test_retry_bound_on_persistent_rate_limit()
{   init_logging();
    let sleeper = RecordingSleeper::default();
    let policy = RetryPolicy::new(3, 100, 0);
    let attempts = AtomicUsize::new(0);

    let result: Result<(), Error> = with_retry(&policy, &sleeper, || {
      attempts.fetch_add(1, Ordering::SeqCst);
      async { Err(rate_limited(Provider::Gemini)) }
    }).await;

    assert_eq!(attempts.load(Ordering::SeqCst), 4);
    assert_eq!(result, Err(rate_limited(Provider::Gemini)));
    assert_eq!(
      sleeper.delays(),
      vec![
        Duration::from_millis(100),
        Duration::from_millis(200),
        Duration::from_millis(400),
      ]
    );
}

#[test]
fn test_zero_retries_means_one_attempt()
{   let sleeper = RecordingSleeper::default();
    let policy = RetryPolicy::new(0, 100, 0);
    let attempts = AtomicUsize::new(0);

    let result: Result<(), Error> = tokio_test::block_on(
      with_retry(&policy, &sleeper, || {
        attempts.fetch_add(1, Ordering::SeqCst);
        async { Err(rate_limited(Provider::Groq)) }
      })
    );

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert!(result.unwrap_err().is_rate_limited());
    assert!(sleeper.delays().is_empty());
}

#[tokio::test]
async fn test_no_retry_on_non_rate_limit_error()
{   let sleeper = RecordingSleeper::default();
    let policy = RetryPolicy::new(5, 100, 0);
    let attempts = AtomicUsize::new(0);

    let result: Result<(), Error> = with_retry(&policy, &sleeper, || {
      attempts.fetch_add(1, Ordering::SeqCst);
      async { Err(unauthorized(Provider::Gemini)) }
    }).await;

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(result.unwrap_err().status(), Some(401));
    assert!(sleeper.delays().is_empty());
}

#[tokio::test]
async fn test_rate_word_in_body_is_retried()
{   let sleeper = RecordingSleeper::default();
    let policy = RetryPolicy::new(2, 100, 0);
    let attempts = AtomicUsize::new(0);

    let result: Result<(), Error> = with_retry(&policy, &sleeper, || {
      attempts.fetch_add(1, Ordering::SeqCst);
      async {
        Err(Error::upstream(
          Provider::Groq
        , 503
        , r#"{"message":"Rate exceeded."}"#.to_string()
        ))
      }
    }).await;

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert!(result.unwrap_err().is_rate_limited());
    assert_eq!(sleeper.delays().len(), 2);
}

#[tokio::test]
async fn test_generate_content_body_is_not_retried()
{   let sleeper = RecordingSleeper::default();
    let policy = RetryPolicy::new(2, 100, 0);
    let attempts = AtomicUsize::new(0);

    let result: Result<(), Error> = with_retry(&policy, &sleeper, || {
      attempts.fetch_add(1, Ordering::SeqCst);
      async {
        Err(Error::upstream(
          Provider::Gemini
        , 400
        , "model x is not supported for generateContent".to_string()
        ))
      }
    }).await;

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(result.unwrap_err().kind(), ErrorKind::UpstreamRejected);
    assert!(sleeper.delays().is_empty());
}

#[tokio::test]
async fn test_local_failure_is_not_retried()
{   let sleeper = RecordingSleeper::default();
    let policy = RetryPolicy::new(3, 100, 0);
    let attempts = AtomicUsize::new(0);

    let result: Result<(), Error> = with_retry(&policy, &sleeper, || {
      attempts.fetch_add(1, Ordering::SeqCst);
      async { Err(Error::HttpError("connection refused".to_string())) }
    }).await;

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(result.unwrap_err().kind(), ErrorKind::LocalFailure);
}

#[tokio::test]
async fn test_retry_recovers_after_transient_throttling()
{   let sleeper = RecordingSleeper::default();
    let policy = RetryPolicy::new(3, 100, 0);
    let attempts = AtomicUsize::new(0);

    let result = with_retry(&policy, &sleeper, || {
      let n = attempts.fetch_add(1, Ordering::SeqCst);
      async move
      {   if n < 2
          {   Err(Error::Other("Rate limit exceeded".to_string()))
          } else
          {   Ok("done")
          }
      }
    }).await;

    assert_eq!(result, Ok("done"));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(sleeper.delays().len(), 2);
}

#[test]
fn test_backoff_doubles_and_jitter_is_additive()
{   let policy = RetryPolicy::new(3, 100, 50);
    assert_eq!(policy.backoff_for_attempt(0), Duration::from_millis(100));
    assert_eq!(policy.backoff_for_attempt(3), Duration::from_millis(800));

    for _ in 0..100
    {   let delay = policy.delay_for_attempt(2);
        assert!(delay >= Duration::from_millis(400));
        assert!(delay <= Duration::from_millis(450));
    }

    let no_jitter = policy.without_jitter();
    assert_eq!(no_jitter.delay_for_attempt(1), Duration::from_millis(200));
}

#[test]
fn test_backoff_saturates_instead_of_overflowing()
{   let policy = RetryPolicy::new(100, 1000, 0);
    assert!(policy.backoff_for_attempt(64) > Duration::from_secs(1_000_000));
}

#[test]
fn test_error_classification()
{   assert!(Error::upstream(Provider::Groq, 429, String::new()).is_rate_limited());
    assert!(
      Error::upstream(Provider::Groq, 400, "Rate limit reached for model".into())
        .is_rate_limited()
    );
    let rejected = Error::upstream(Provider::Groq, 403, "forbidden".into());
    assert_eq!(rejected.kind(), ErrorKind::UpstreamRejected);
    assert!(
      Error::upstream(Provider::Groq, 400, "x-ratelimit-remaining: 0".into())
        .is_rate_limited()
    );
    // "generate" must not read as a rate-limit marker
    assert!(
      !Error::upstream(Provider::Gemini, 404, "models/x:generateContent".into())
        .is_rate_limited()
    );
    assert_eq!(
      Error::MissingApiKey(Provider::Gemini).kind(),
      ErrorKind::LocalFailure
    );
}

#[test]
fn test_fallback_order_excludes_preferred()
{   let order = FallbackOrder::default();
    assert_eq!(order.first(), Some(Provider::Gemini));
    assert_eq!(
      order.candidates_excluding(Provider::Groq),
      vec![Provider::Gemini, Provider::Cerebras]
    );
    assert_eq!(
      order.candidates_excluding(Provider::Custom),
      vec![Provider::Gemini, Provider::Groq, Provider::Cerebras]
    );
}

// ===== Dispatcher =====

#[tokio::test]
async fn test_dispatch_unknown_provider_makes_no_call()
{   let gemini = ScriptedAdapter::answering(Provider::Gemini, "a");
    let groq = ScriptedAdapter::answering(Provider::Groq, "b");
    let d = dispatcher(&[gemini.clone(), groq.clone()], all_keys());

    let err = d
      .dispatch_named("hi", "not-a-real-provider", None)
      .await
      .unwrap_err();
    assert_eq!(err, Error::UnknownProvider("not-a-real-provider".into()));

    let err = d.dispatch("hi", Provider::Custom, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownProvider);

    assert_eq!(gemini.calls() + groq.calls(), 0);
}

#[tokio::test]
async fn test_dispatch_routes_same_identity_to_same_adapter()
{   let gemini = ScriptedAdapter::answering(Provider::Gemini, "a");
    let groq = ScriptedAdapter::answering(Provider::Groq, "b");
    let d = dispatcher(&[gemini.clone(), groq.clone()], all_keys());

    let first = d.dispatch("hi", Provider::Groq, None).await.unwrap();
    let second = d.dispatch("hi", Provider::Groq, None).await.unwrap();

    assert_eq!(first.provider, Provider::Groq);
    assert_eq!(second.provider, Provider::Groq);
    assert_eq!(first.text, second.text);
    assert_eq!(groq.calls(), 2);
    assert_eq!(gemini.calls(), 0);
}

#[tokio::test]
async fn test_dispatch_passes_model_and_credential_through()
{   let groq = ScriptedAdapter::answering(Provider::Groq, "b");
    let d = dispatcher(&[groq.clone()], all_keys());

    let result = d
      .dispatch("hi", Provider::Groq, Some("gemma2-9b-it"))
      .await
      .unwrap();

    assert_eq!(result.model, "gemma2-9b-it");
    assert_eq!(groq.models(), vec![Some("gemma2-9b-it".to_string())]);
    assert_eq!(groq.credentials(), vec!["groq-key".to_string()]);
}

#[tokio::test]
async fn test_dispatch_without_credential_fails_before_call()
{   let groq = ScriptedAdapter::answering(Provider::Groq, "b");
    let creds = StaticCredentials::new().with(Provider::Groq, "   ");
    let d = dispatcher(&[groq.clone()], creds);

    let err = d.dispatch("hi", Provider::Groq, None).await.unwrap_err();
    assert_eq!(err, Error::MissingApiKey(Provider::Groq));
    assert_eq!(groq.calls(), 0);
}

// ===== Fallback orchestrator =====

fn abc(
  gemini: Arc<ScriptedAdapter>
, groq: Arc<ScriptedAdapter>
, cerebras: Arc<ScriptedAdapter>
) -> [Arc<ScriptedAdapter>; 3]
{   [gemini, groq, cerebras]
}

#[tokio::test]
async fn test_preferred_success_reports_no_fallback()
{   let adapters = abc(
      ScriptedAdapter::answering(Provider::Gemini, "from gemini")
    , ScriptedAdapter::answering(Provider::Groq, "from groq")
    , ScriptedAdapter::answering(Provider::Cerebras, "from cerebras")
    );
    let (proxy, _) = proxy(&adapters, 2);

    let result = proxy
      .smart_call(&GenerationRequest::new("hi").with_provider(Provider::Gemini))
      .await
      .unwrap();

    assert_eq!(result.text, "from gemini");
    assert_eq!(result.provider, Provider::Gemini);
    assert!(!result.fallback_used);
    assert_eq!(result.fallback_from, None);
    assert_eq!(result.latency_ms, 12);
    assert_eq!(result.total_tokens, 12);
}

#[tokio::test]
async fn test_rate_limited_preferred_falls_back_after_retries()
{   init_logging();
    let adapters = abc(
      ScriptedAdapter::failing(Provider::Gemini, rate_limited(Provider::Gemini))
    , ScriptedAdapter::answering(Provider::Groq, "from groq")
    , ScriptedAdapter::answering(Provider::Cerebras, "from cerebras")
    );
    let (proxy, sleeper) = proxy(&adapters, 2);

    let result = proxy
      .smart_call(&GenerationRequest::new("hi").with_provider(Provider::Gemini))
      .await
      .unwrap();

    assert_eq!(adapters[0].calls(), 3);
    assert_eq!(adapters[1].calls(), 1);
    assert_eq!(adapters[2].calls(), 0);
    assert_eq!(result.provider, Provider::Groq);
    assert!(result.fallback_used);
    assert_eq!(result.fallback_from, Some(Provider::Gemini));
    assert_eq!(
      sleeper.delays(),
      vec![Duration::from_millis(100), Duration::from_millis(200)]
    );
}

#[tokio::test]
async fn test_non_rate_limit_failure_skips_retry_and_sweeps()
{   let adapters = abc(
      ScriptedAdapter::failing(Provider::Gemini, unauthorized(Provider::Gemini))
    , ScriptedAdapter::failing(Provider::Groq, server_error(Provider::Groq))
    , ScriptedAdapter::answering(Provider::Cerebras, "from cerebras")
    );
    let (proxy, sleeper) = proxy(&adapters, 3);

    let result = proxy
      .smart_call(&GenerationRequest::new("hi").with_provider(Provider::Gemini))
      .await
      .unwrap();

    assert_eq!(adapters[0].calls(), 1);
    assert_eq!(adapters[1].calls(), 1);
    assert_eq!(adapters[2].calls(), 1);
    assert!(sleeper.delays().is_empty());
    assert_eq!(result.provider, Provider::Cerebras);
    assert_eq!(result.fallback_from, Some(Provider::Gemini));
}

#[tokio::test]
async fn test_fallback_candidates_are_not_retried()
{   let adapters = abc(
      ScriptedAdapter::failing(Provider::Gemini, unauthorized(Provider::Gemini))
    , ScriptedAdapter::failing(Provider::Groq, rate_limited(Provider::Groq))
    , ScriptedAdapter::answering(Provider::Cerebras, "from cerebras")
    );
    let (proxy, sleeper) = proxy(&adapters, 3);

    let result = proxy
      .smart_call(&GenerationRequest::new("hi").with_provider(Provider::Gemini))
      .await
      .unwrap();

    assert_eq!(adapters[1].calls(), 1);
    assert!(sleeper.delays().is_empty());
    assert_eq!(result.provider, Provider::Cerebras);
}

#[tokio::test]
async fn test_fallback_attribution_names_preferred_not_candidate()
{   let adapters = abc(
      ScriptedAdapter::answering(Provider::Gemini, "from gemini")
    , ScriptedAdapter::failing(Provider::Groq, unauthorized(Provider::Groq))
    , ScriptedAdapter::answering(Provider::Cerebras, "from cerebras")
    );
    let (proxy, _) = proxy(&adapters, 1);

    let result = proxy
      .smart_call(&GenerationRequest::new("hi").with_provider(Provider::Groq))
      .await
      .unwrap();

    // Gemini comes first in the order once Groq is excluded
    assert_eq!(result.provider, Provider::Gemini);
    assert!(result.fallback_used);
    assert_eq!(result.fallback_from, Some(Provider::Groq));
}

#[tokio::test]
async fn test_every_provider_failing_reports_all_failures()
{   let adapters = abc(
      ScriptedAdapter::failing(Provider::Gemini, rate_limited(Provider::Gemini))
    , ScriptedAdapter::failing(Provider::Groq, unauthorized(Provider::Groq))
    , ScriptedAdapter::failing(Provider::Cerebras, server_error(Provider::Cerebras))
    );
    let (proxy, _) = proxy(&adapters, 1);

    let err = proxy
      .smart_call(&GenerationRequest::new("hi").with_provider(Provider::Gemini))
      .await
      .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AllProvidersFailed);
    assert_eq!(
      err.attempted(),
      vec![Provider::Gemini, Provider::Groq, Provider::Cerebras]
    );
    assert_eq!(err.last_error(), Some(&server_error(Provider::Cerebras)));
    assert_eq!(adapters[0].calls(), 2);
}

#[tokio::test]
async fn test_unknown_preferred_provider_short_circuits()
{   let adapters = abc(
      ScriptedAdapter::answering(Provider::Gemini, "a")
    , ScriptedAdapter::answering(Provider::Groq, "b")
    , ScriptedAdapter::answering(Provider::Cerebras, "c")
    );
    let (proxy, sleeper) = proxy(&adapters, 3);

    let err = proxy
      .smart_call(&GenerationRequest::new("hi").with_provider(Provider::Custom))
      .await
      .unwrap_err();

    assert_eq!(err, Error::UnknownProvider("custom".to_string()));
    assert_eq!(
      adapters.iter().map(|a| a.calls()).sum::<usize>(),
      0
    );
    assert!(sleeper.delays().is_empty());
}

#[tokio::test]
async fn test_missing_preferred_credential_triggers_fallback()
{   let adapters = abc(
      ScriptedAdapter::answering(Provider::Gemini, "a")
    , ScriptedAdapter::answering(Provider::Groq, "b")
    , ScriptedAdapter::answering(Provider::Cerebras, "c")
    );
    let creds = StaticCredentials::new()
      .with(Provider::Groq, "groq-key")
      .with(Provider::Cerebras, "cerebras-key");
    let (proxy, sleeper) = proxy_with(&adapters, 3, creds);

    let result = proxy
      .smart_call(&GenerationRequest::new("hi").with_provider(Provider::Gemini))
      .await
      .unwrap();

    assert_eq!(adapters[0].calls(), 0);
    assert!(sleeper.delays().is_empty());
    assert_eq!(result.provider, Provider::Groq);
    assert_eq!(result.fallback_from, Some(Provider::Gemini));
}

#[tokio::test]
async fn test_model_override_only_reaches_listing_providers()
{   let adapters = abc(
      ScriptedAdapter::failing(Provider::Gemini, unauthorized(Provider::Gemini))
    , ScriptedAdapter::answering(Provider::Groq, "b")
    , ScriptedAdapter::answering(Provider::Cerebras, "c")
    );
    let (proxy, _) = proxy(&adapters, 0);

    let request = GenerationRequest::new("hi")
      .with_provider(Provider::Gemini)
      .with_model("gemini-1.5-pro");
    let result = proxy.smart_call(&request).await.unwrap();

    assert_eq!(adapters[0].models(), vec![Some("gemini-1.5-pro".to_string())]);
    assert_eq!(adapters[1].models(), vec![None]);
    assert_eq!(result.model, "scripted-model");
}

#[tokio::test]
async fn test_no_preference_sweeps_order_with_retry()
{   let adapters = abc(
      ScriptedAdapter::failing(Provider::Gemini, unauthorized(Provider::Gemini))
    , ScriptedAdapter::failing(Provider::Groq, rate_limited(Provider::Groq))
    , ScriptedAdapter::answering(Provider::Cerebras, "from cerebras")
    );
    let (proxy, sleeper) = proxy(&adapters, 2);

    let result = proxy
      .smart_call(&GenerationRequest::new("hi"))
      .await
      .unwrap();

    assert_eq!(adapters[0].calls(), 1);
    assert_eq!(adapters[1].calls(), 3);
    assert_eq!(sleeper.delays().len(), 2);
    assert_eq!(result.provider, Provider::Cerebras);
    // Deviation from the head of the order counts as a fallback
    assert!(result.fallback_used);
    assert_eq!(result.fallback_from, Some(Provider::Gemini));
}

#[tokio::test]
async fn test_no_preference_first_provider_success_is_not_fallback()
{   let adapters = abc(
      ScriptedAdapter::answering(Provider::Gemini, "from gemini")
    , ScriptedAdapter::answering(Provider::Groq, "b")
    , ScriptedAdapter::answering(Provider::Cerebras, "c")
    );
    let (proxy, _) = proxy(&adapters, 2);

    let result = proxy.smart_call(&GenerationRequest::new("hi")).await.unwrap();
    assert_eq!(result.provider, Provider::Gemini);
    assert!(!result.fallback_used);
    assert_eq!(result.fallback_from, None);
}

#[tokio::test]
async fn test_empty_fallback_order_fails_without_attempts()
{   let gemini = ScriptedAdapter::answering(Provider::Gemini, "a");
    let proxy = SmartProxy::new(
      dispatcher(&[gemini.clone()], all_keys())
    , vec![]
    , RetryPolicy::new(1, 100, 0)
    ).unwrap();

    let err = proxy.smart_call(&GenerationRequest::new("hi")).await.unwrap_err();
    assert_eq!(err, Error::AllProvidersFailed { failures: vec![] });
    assert_eq!(err.to_string(), "All providers failed");
    assert_eq!(gemini.calls(), 0);
}

#[tokio::test]
async fn test_preferred_outside_order_still_sweeps_whole_order()
{   let gemini = ScriptedAdapter::failing(
      Provider::Gemini, unauthorized(Provider::Gemini)
    );
    let groq = ScriptedAdapter::answering(Provider::Groq, "b");
    let proxy = SmartProxy::new(
      dispatcher(&[gemini.clone(), groq.clone()], all_keys())
    , vec![Provider::Groq]
    , RetryPolicy::new(1, 100, 0)
    ).unwrap();

    let result = proxy
      .smart_call(&GenerationRequest::new("hi").with_provider(Provider::Gemini))
      .await
      .unwrap();
    assert_eq!(result.provider, Provider::Groq);
    assert_eq!(result.fallback_from, Some(Provider::Gemini));
}

#[test]
fn test_order_naming_unregistered_provider_is_rejected()
{   let gemini = ScriptedAdapter::answering(Provider::Gemini, "a");
    let result = SmartProxy::new(
      dispatcher(&[gemini], all_keys())
    , vec![Provider::Gemini, Provider::Groq]
    , RetryPolicy::default()
    );
    assert!(matches!(
      result,
      Err(Error::UnknownProvider(ref p)) if p == "groq"
    ));
}
