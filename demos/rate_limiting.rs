//! Example demonstrating Retry-After handling.
//!
//! This example shows how to:
//! - Rely on the default backoff, which honours Retry-After on 429 and 503
//! - Cap how long a server may make you wait
//! - Fall back to exponential backoff when no hint is given
//! - Parse Retry-After yourself
//!
//! Run with: `cargo run --example rate_limiting`

use http::{HeaderMap, HeaderValue, StatusCode};
use retryer::backoff::Exponential;
use retryer::rate_limit::{parse_retry_after, RetryAfter};
use retryer::{Context, HttpRetryer, MaxAttemptsMode};
use std::time::{Duration, Instant};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("retryer=debug")
        .init();

    let client = reqwest::Client::new();
    let ctx = Context::background();

    println!("=== Example 1: Default Retry-After Handling ===");
    println!("429 and 503 responses carrying Retry-After are retried after the");
    println!("requested wait; everything else waits 200ms.\n");

    let retryer = HttpRetryer::new()
        .client(client.clone())
        .max_attempts(MaxAttemptsMode::Total, 3);

    match retryer
        .call::<serde_json::Value, _>(
            &ctx,
            |_ctx| {
                Ok(client
                    .get("https://api.github.com/rate_limit")
                    .header("user-agent", "retryer-demo")
                    .build()?)
            },
            &[StatusCode::OK],
        )
        .await
    {
        Ok(body) => {
            if let Some(remaining) = body.get("rate").and_then(|r| r.get("remaining")) {
                println!("Rate limit remaining: {remaining}");
            }
        }
        Err(e) => println!("Error: {e}"),
    }
    println!();

    println!("=== Example 2: Capped Wait with Exponential Fallback ===");
    let backoff = RetryAfter::new(Exponential {
        initial_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(5),
        jitter: true,
    })
    .max_wait(Duration::from_secs(2));

    let capped = HttpRetryer::new()
        .client(client.clone())
        .max_attempts(MaxAttemptsMode::Total, 3)
        .backoff(backoff);

    let start = Instant::now();
    match capped
        .send(
            &ctx,
            |_ctx| Ok(client.get("https://httpbin.org/status/429").build()?),
            &[StatusCode::OK],
        )
        .await
    {
        Ok(_) => println!("Request succeeded"),
        Err(e) => println!("Gave up after {:?}: {e}", start.elapsed()),
    }
    println!();

    println!("=== Example 3: Parsing Retry-After ===");
    let mut headers = HeaderMap::new();
    headers.insert("retry-after", HeaderValue::from_static("120"));
    println!("Retry-After: 120 -> {:?}", parse_retry_after(&headers));

    headers.insert(
        "retry-after",
        HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
    );
    println!("Retry-After in the past -> {:?}", parse_retry_after(&headers));

    Ok(())
}
