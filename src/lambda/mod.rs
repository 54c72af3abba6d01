// src/lambda/mod.rs

//! AWS Lambda handler for the archive jobs.
//!
//! Each invocation either runs the named trigger or, with no trigger in the
//! payload, drains the due messages of the trigger queue. A fresh
//! [`CrawlContext`] is opened per invocation.

use lambda_runtime::{Error as LambdaError, LambdaEvent};

use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::config::LambdaConfigLoader;
use crate::error::Result;
use crate::pipeline::{CrawlContext, RunOptions, RunOutcome, drain_queue, handle_message};

/// Lambda invocation payload.
#[derive(Debug, Default, Deserialize)]
pub struct CrawlRequest {
    /// Trigger message to run; drains the queue when absent
    pub trigger: Option<String>,

    /// Re-apply the translation asset even if unchanged
    #[serde(default)]
    pub force: bool,
}

/// Lambda response payload.
#[derive(Debug, Default, Serialize)]
pub struct CrawlResponse {
    /// Whether every requested job ran without a propagated error
    pub success: bool,

    pub outcomes: Vec<RunOutcome>,

    /// Error message if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Execution time in milliseconds
    pub execution_time_ms: u64,
}

/// Main Lambda handler function.
#[instrument(skip(event))]
pub async fn handler(
    event: LambdaEvent<CrawlRequest>,
) -> std::result::Result<CrawlResponse, LambdaError> {
    let start = std::time::Instant::now();
    let (request, _context) = event.into_parts();

    info!(
        "Invocation: trigger={:?}, force={}",
        request.trigger, request.force
    );

    match run(&request).await {
        Ok(outcomes) => {
            let execution_time_ms = start.elapsed().as_millis() as u64;
            info!("{} job(s) finished in {}ms", outcomes.len(), execution_time_ms);
            Ok(CrawlResponse {
                success: true,
                outcomes,
                error: None,
                execution_time_ms,
            })
        }
        Err(e) => {
            error!("Invocation failed: {}", e);
            Ok(CrawlResponse {
                success: false,
                error: Some(e.to_string()),
                execution_time_ms: start.elapsed().as_millis() as u64,
                ..Default::default()
            })
        }
    }
}

async fn run(request: &CrawlRequest) -> Result<Vec<RunOutcome>> {
    let config = LambdaConfigLoader::from_env().await.load_config().await?;
    let ctx = CrawlContext::open(config)?;
    dispatch(&ctx, request).await
}

/// Route one request against an opened context.
pub async fn dispatch(ctx: &CrawlContext, request: &CrawlRequest) -> Result<Vec<RunOutcome>> {
    let options = RunOptions {
        force_translation: request.force,
    };
    match request.trigger.as_deref() {
        Some(message) => Ok(handle_message(ctx, message, options)
            .await?
            .into_iter()
            .collect()),
        None => drain_queue(ctx, options).await,
    }
}
