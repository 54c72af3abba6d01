//! AWS Lambda entry point for the toplist archive.
//!
//! Deploy with `cargo lambda build --release --features lambda`.
//! Invoke with `{"trigger": "crawl-toplists"}`, or with `{}` to drain the
//! trigger queue from a scheduled rule.

use lambda_runtime::{Error as LambdaError, service_fn};

use toplist_archive::lambda::handler;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the AWS Lambda function.
#[tokio::main]
async fn main() -> Result<(), LambdaError> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Toplist archive Lambda starting...");
    lambda_runtime::run(service_fn(handler)).await
}
