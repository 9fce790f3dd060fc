//! Example demonstrating custom retry predicates.
//!
//! This example shows how to:
//! - Retry on conditions the defaults do not cover
//! - Return early on failures that will never succeed
//! - Decide retryability from the captured response body
//! - Use the generic retry engine for non-HTTP work
//!
//! Run with: `cargo run --example custom_retry`

use http::StatusCode;
use retryer::backoff::Fixed;
use retryer::classify::{is_retryable_network_error, TransientError};
use retryer::{Context, Error, HttpRetryer, MaxAttemptsMode, Retryer};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Fails with a transient error until it has been called three times.
async fn flaky_lookup(calls: &AtomicUsize) -> Result<&'static str, TransientError> {
    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
        Err(TransientError::new("replica not ready"))
    } else {
        Ok("primary-eu-1")
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("retryer=debug,custom_retry=info")
        .init();

    let client = reqwest::Client::new();
    let ctx = Context::background();

    println!("=== Example 1: Retry on 500 as well ===");
    let retry_500 = HttpRetryer::new()
        .client(client.clone())
        .is_retryable_status_code_fn(|_ctx, status| {
            status.is_server_error() && status != StatusCode::NOT_IMPLEMENTED
        })
        .max_attempts(MaxAttemptsMode::Total, 3)
        .backoff(Fixed(Duration::from_millis(500)));

    match retry_500
        .send(
            &ctx,
            |_ctx| Ok(client.get("https://httpbin.org/status/500").build()?),
            &[StatusCode::OK],
        )
        .await
    {
        Ok(_) => println!("Request succeeded"),
        Err(e) => println!("Gave up after retries: {e}"),
    }
    println!();

    println!("=== Example 2: Retry on a body marker ===");
    let retry_on_marker = HttpRetryer::new()
        .client(client.clone())
        .is_retryable_fn(|_ctx, err: &Error| {
            err.is_retryable()
                || err
                    .as_status()
                    .and_then(|err| err.body_text())
                    .is_some_and(|body| body.contains("try again"))
        })
        .max_attempts(MaxAttemptsMode::NonRetryable, 1);

    match retry_on_marker
        .send(
            &ctx,
            |_ctx| Ok(client.get("https://httpbin.org/status/418").build()?),
            &[StatusCode::OK],
        )
        .await
    {
        Ok(_) => println!("Request succeeded"),
        Err(e) => println!("Not retried: {e}"),
    }
    println!();

    println!("=== Example 3: Early return on any 4xx ===");
    let strict = HttpRetryer::new()
        .client(client.clone())
        .is_early_return_fn(|_ctx, err: &Error| {
            err.status().is_some_and(|status| status.is_client_error())
        });

    match strict
        .send(
            &ctx,
            |_ctx| Ok(client.get("https://httpbin.org/status/409").build()?),
            &[StatusCode::OK],
        )
        .await
    {
        Ok(_) => println!("Request succeeded"),
        Err(e) => println!("Returned immediately: {e}"),
    }
    println!();

    println!("=== Example 4: Generic retries ===");
    let calls = AtomicUsize::new(0);
    let lookup = Retryer::<&'static str, TransientError>::new()
        .is_retryable_fn(|_ctx, err: &TransientError| is_retryable_network_error(err))
        .max_attempts(MaxAttemptsMode::Total, 5)
        .backoff(|attempt: usize, err: &TransientError| {
            println!("  attempt {attempt} failed: {err}");
            Duration::from_millis(100)
        });

    match lookup.run(&ctx, |_ctx| flaky_lookup(&calls)).await {
        Ok(host) => println!(
            "Resolved {host} after {} calls",
            calls.load(Ordering::SeqCst)
        ),
        Err(e) => println!("Lookup failed: {e}"),
    }

    Ok(())
}
