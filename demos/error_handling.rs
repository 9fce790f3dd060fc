//! Example demonstrating comprehensive error handling.
//!
//! This example shows how to:
//! - Handle different error types
//! - Access the captured body and headers of unexpected status codes
//! - Deal with decode failures
//! - Check if errors are retryable
//!
//! Run with: `cargo run --example error_handling`

use http::StatusCode;
use retryer::{Context, DecodeError, Error, HttpRetryer, MaxAttemptsMode};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Post {
    id: u32,
    title: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("retryer=info")
        .init();

    let client = reqwest::Client::new();
    let retryer = HttpRetryer::new()
        .client(client.clone())
        .max_attempts(MaxAttemptsMode::Total, 2);
    let ctx = Context::background();

    println!("=== Example 1: Handling Unexpected Status Codes ===");
    // A 404 will never succeed on retry, so it returns immediately
    match retryer
        .call::<Post, _>(
            &ctx,
            |_ctx| {
                Ok(client
                    .get("https://jsonplaceholder.typicode.com/posts/999999")
                    .build()?)
            },
            &[StatusCode::OK],
        )
        .await
    {
        Ok(post) => println!("Success: {post:?}"),
        Err(Error::Status(err)) => {
            println!("HTTP Error:");
            println!("  Status: {}", err.status);
            println!("  Retryable: {}", err.is_retryable_status_code);
            println!("  Content-Type: {:?}", err.headers.get("content-type"));
            println!("  Body: {}", err.body_text().unwrap_or_default());
        }
        Err(e) => println!("Other error: {e}"),
    }
    println!();

    println!("=== Example 2: Handling Decode Errors ===");
    // The endpoint returns an array, not a single post
    match retryer
        .call::<Post, _>(
            &ctx,
            |_ctx| {
                Ok(client
                    .get("https://jsonplaceholder.typicode.com/posts")
                    .build()?)
            },
            &[StatusCode::OK],
        )
        .await
    {
        Ok(post) => println!("Success: {post:?}"),
        Err(Error::Decode { status, source }) => {
            println!("Decode Error (status {status}):");
            match source {
                DecodeError::Json(err) => println!("  Invalid JSON: {err}"),
                DecodeError::TooLarge { limit } => println!("  Body over {limit} bytes"),
                other => println!("  {other}"),
            }
        }
        Err(e) => println!("Other error: {e}"),
    }
    println!();

    println!("=== Example 3: Transport Errors ===");
    match retryer
        .send(
            &ctx,
            |_ctx| Ok(client.get("https://this-domain-does-not-exist-12345.com").build()?),
            &[StatusCode::OK],
        )
        .await
    {
        Ok(_) => println!("Unexpected success"),
        Err(e @ Error::Transport(_)) => {
            println!("Transport Error: {e}");
            println!("  Retryable: {}", e.is_retryable());
        }
        Err(e) => println!("Other error: {e}"),
    }
    println!();

    println!("=== Example 4: Per-Attempt Timeouts ===");
    let impatient = retryer.clone().timeout(Duration::from_millis(500));
    match impatient
        .send(
            &ctx,
            |_ctx| Ok(client.get("https://httpbin.org/delay/3").build()?),
            &[StatusCode::OK],
        )
        .await
    {
        Ok(_) => println!("Unexpected success"),
        Err(Error::Context(err)) => {
            println!("Every attempt timed out: {err}");
        }
        Err(e) => println!("Other error: {e}"),
    }
    println!();

    println!("=== Example 5: Checking Retryability ===");
    let errors = [
        Error::Status(retryer::StatusCodeError {
            status: StatusCode::SERVICE_UNAVAILABLE,
            is_retryable_status_code: true,
            headers: Default::default(),
            body: None,
        }),
        Error::Context(retryer::ContextError::DeadlineExceeded),
        Error::Context(retryer::ContextError::Canceled),
        Error::Build("missing url".into()),
    ];

    for error in &errors {
        println!("{error} -> retryable: {}", error.is_retryable());
    }

    Ok(())
}
