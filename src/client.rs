use std::sync::Arc;
use tokio::sync::mpsc;
use log::{debug, error, info, warn};
use crate::ProxyFoot;

use crate::usage::{QaRecord, UsageSink};
use crate::SmartProxy;

/// Public API for the proxy backend - owns the task
pub struct ProxyBackend
{   hand: crate::ProxyHand
  , _task_handle: tokio::task::JoinHandle<()>
}

impl ProxyBackend
{   /// Create and spawn a new proxy backend
    /// Returns immediately - spawns background task
    pub fn new(
      proxy: SmartProxy
    , usage_sink: Option<Arc<dyn UsageSink>>
    ) -> Self
    {   debug!("Creating ProxyBackend with task ownership");

        let (smart_call_tx, smart_call_rx)
          = mpsc::unbounded_channel();
        let (single_call_tx, single_call_rx)
          = mpsc::unbounded_channel();
        let (get_model_lists_tx, get_model_lists_rx)
          = mpsc::unbounded_channel();
        let (kill_process_tx, kill_process_rx)
          = mpsc::unbounded_channel();

        let hand = crate::ProxyHand
        {   smart_call_tx
          , single_call_tx
          , get_model_lists_tx
          , kill_process_tx
        };

        let foot = crate::ProxyFoot
        {   smart_call_rx
          , single_call_rx
          , get_model_lists_rx
          , kill_process_rx
        };

        let proxy = Arc::new(proxy);
        let _task_handle = tokio::spawn(async move {
          run_backend_loop(foot, proxy, usage_sink).await
        });

        ProxyBackend
        {   hand
          , _task_handle
        }
    }

    /// Queue a smart call - returns almost immediately
    pub async fn smart_call(
      &self
    , request: crate::request::GenerationRequest
    ) -> Result<
        mpsc::UnboundedReceiver<crate::SmartCallReply>,
        crate::error::Error
      >
    {   debug!("smart_call queuing for: {:?}", request.provider);
        let (reply_tx, reply_rx)
          = mpsc::unbounded_channel();

        let cmd = crate::SmartCallArgs
        {   request
          , reply: reply_tx
        };

        self.hand.smart_call_tx
          .send(cmd)
          .map_err(|_| disconnected())?;

        Ok(reply_rx)
    }

    /// Queue a single call - returns almost immediately
    pub async fn single_call(
      &self
    , request: crate::surface::SingleCallRequest
    ) -> Result<
        mpsc::UnboundedReceiver<crate::surface::SingleCallReply>,
        crate::error::Error
      >
    {   debug!("single_call queuing for: {:?}", request.provider);
        let (reply_tx, reply_rx)
          = mpsc::unbounded_channel();

        let cmd = crate::SingleCallArgs
        {   request
          , reply: reply_tx
        };

        self.hand.single_call_tx
          .send(cmd)
          .map_err(|_| disconnected())?;

        Ok(reply_rx)
    }

    /// Get model lists - returns almost immediately
    pub async fn get_model_lists(
      &self
    ) -> Result<
        mpsc::UnboundedReceiver<crate::GetModelListsReply>,
        crate::error::Error
      >
    {   debug!("get_model_lists queuing command");
        let (reply_tx, reply_rx)
          = mpsc::unbounded_channel();

        let cmd = crate::GetModelListsArgs
        {   reply: reply_tx
        };

        self.hand.get_model_lists_tx
          .send(cmd)
          .map_err(|_| disconnected())?;

        Ok(reply_rx)
    }

    /// Gracefully shutdown the backend
    pub async fn shutdown(self)
      -> Result<(), crate::error::Error>
    {   debug!("Shutting down ProxyBackend");
        let (reply_tx, mut reply_rx)
          = mpsc::unbounded_channel();

        let cmd = crate::KillProcessArgs
        {   reply: reply_tx
        };

        self.hand.kill_process_tx
          .send(cmd)
          .map_err(|_| {
            error!("Backend channel already closed");
            crate::error::Error::Other(
              "Backend already shutdown".to_string()
            )
          })?;

        // Wait for shutdown confirmation
        if let Some(result) = reply_rx.recv().await
        {   debug!("Backend shutdown confirmed");
            result
        } else
        {   error!("Backend shutdown timeout");
            Err(crate::error::Error::Timeout)
        }
    }
}

fn disconnected() -> crate::error::Error
{   error!("Backend channel closed");
    crate::error::Error::Other(
      "Backend disconnected".to_string()
    )
}

/// Main backend event loop
///
/// tokio::select! only routes. Every call runs in its own task so
/// a slow provider never holds up an unrelated caller.
async fn run_backend_loop(
  foot: crate::ProxyFoot
, proxy: Arc<SmartProxy>
, usage_sink: Option<Arc<dyn UsageSink>>
)
{   debug!("Starting ProxyBackend event loop");
    let ProxyFoot
    {   mut smart_call_rx
      , mut single_call_rx
      , mut get_model_lists_rx
      , mut kill_process_rx
    } = foot;

    loop
    { tokio::select!
      { Some(cmd) = smart_call_rx.recv() => {
          debug!("Received SmartCall");
          let proxy = Arc::clone(&proxy);
          let usage_sink = usage_sink.clone();
          tokio::spawn(async move {
            let result = proxy.smart_call(&cmd.request).await;
            if let (Ok(answer), Some(sink)) = (&result, &usage_sink)
            {   let record = QaRecord::from_call(&cmd.request, answer);
                if let Err(e) = sink.append(record)
                {   warn!("Failed to record usage: {}", e);
                }
            }
            let _ = cmd.reply.send(result);
          });
        }
      , Some(cmd) = single_call_rx.recv() => {
          debug!("Received SingleCall");
          let proxy = Arc::clone(&proxy);
          tokio::spawn(async move {
            let reply = crate::surface::single_call(
              proxy.dispatcher(),
              cmd.request
            ).await;
            let _ = cmd.reply.send(reply);
          });
        }
      , Some(cmd) = get_model_lists_rx.recv() => {
          debug!("Received GetModelLists");
          let models = proxy.dispatcher()
            .providers()
            .into_iter()
            .flat_map(|p| {
              crate::catalog::available_models(p)
                .into_iter()
                .map(move |m| (p, m))
            })
            .collect();
          let _ = cmd.reply.send(Ok(models));
        }
      , Some(cmd) = kill_process_rx.recv() => {
          debug!("Received KillProcess");
          let _ = cmd.reply.send(Ok(()));
          info!("ProxyBackend shutting down");
          break;
        }
      , else => {
          debug!("All command channels closed");
          break;
        }
      }
    }
}
