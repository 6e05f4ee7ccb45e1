//! HTTP middleware with retry support using reqwest-middleware.
//!
//! The client itself never retries. Transient failures (connection errors,
//! timeouts, 5xx) can be retried transparently by handing the client an HTTP
//! stack wrapped in `reqwest-retry` middleware.
//!
//! Run with: `cargo run --example http_middleware_retry`

use std::time::Duration;

use npd_client::{NpdClient, Result};
use reqwest_middleware::ClientBuilder as MiddlewareClientBuilder;
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    println!("=== HTTP Middleware with Retry Example ===\n");

    // Retry transient errors up to 3 times with exponential delays
    let retry_policy = ExponentialBackoff::builder()
        .retry_bounds(Duration::from_millis(100), Duration::from_secs(5))
        .build_with_max_retries(3);

    let http_client = MiddlewareClientBuilder::new(reqwest::Client::new())
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build();

    let base_url = std::env::var("NPD_BASE_URL")
        .unwrap_or_else(|_| npd_client::client::DEFAULT_BASE_URL.to_string());

    let client = NpdClient::builder()
        .base_url(base_url)
        .http_client(http_client)
        .build()?;

    println!("Checking the service (retries are automatic)...");
    match client.ping().await {
        Ok(Some(status)) => println!("\n✅ Service is up: {:?}", status.0),
        Ok(None) => println!("\n❌ Health endpoint not found"),
        Err(e) => eprintln!("\n❌ Error after retries: {e}"),
    }

    println!("\nListing datasets...");
    match client.list_datasets().await {
        Ok(datasets) => println!("✅ {} datasets", datasets.len()),
        Err(e) if e.is_retryable() => eprintln!("❌ Still failing after retries: {e}"),
        Err(e) => eprintln!("❌ Permanent error: {e}"),
    }

    println!("\n=== Example Complete ===");

    Ok(())
}
