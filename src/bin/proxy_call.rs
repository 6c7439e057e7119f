use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::{info, warn};

use allm_proxy::config::ProxyConfig;
use allm_proxy::credentials::EnvCredentials;
use allm_proxy::{GenerationRequest, Provider, SmartProxy};

/// Send one prompt through the fallback proxy and print the result as JSON.
///
/// Keys come from GEMINI_API_KEY, GROQ_API_KEY and CEREBRAS_API_KEY.
#[derive(Debug, Parser)]
#[command(name = "proxy-call")]
struct Args
{   /// Prompt text
    prompt: String
  , /// Preferred provider (gemini, groq, cerebras)
    #[arg(short, long)]
    provider: Option<String>
  , /// Model override for the preferred provider
    #[arg(short, long)]
    model: Option<String>
  , /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>
  , /// Project the call is accounted to
    #[arg(long)]
    project: Option<String>
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>>
{   env_logger::init();
    let args = Args::parse();

    let config = match &args.config
    {   Some(path) => ProxyConfig::from_file(path)?
      , None => ProxyConfig::default()
    };
    let proxy = SmartProxy::from_config(&config, Arc::new(EnvCredentials))?;

    let mut request = GenerationRequest::new(args.prompt);
    if let Some(name) = &args.provider
    {   request = request.with_provider(name.parse::<Provider>()?);
    }
    if let Some(model) = args.model
    {   request = request.with_model(model);
    }
    if let Some(project) = args.project
    {   request = request.with_project(project);
    }

    if allm_proxy::sensitive::contains_sensitive_data(&request.prompt)
    {   warn!("Prompt looks like it contains sensitive data");
    }

    let result = proxy.smart_call(&request).await?;
    info!(
      "{} answered in {}ms (fallback: {})",
      result.provider, result.latency_ms, result.fallback_used
    );
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
