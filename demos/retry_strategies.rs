//! Example demonstrating attempt budgets and backoff strategies.
//!
//! This example shows how to:
//! - Pick a max-attempts mode
//! - Configure fixed, exponential and custom backoff
//! - Stop an unlimited retry loop with cancellation
//!
//! Run with: `cargo run --example retry_strategies`

use retryer::backoff::{Exponential, Fixed};
use retryer::classify::TransientError;
use retryer::{Context, MaxAttemptsMode, Retryer};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
enum JobError {
    #[error("worker busy")]
    Busy,
    #[error("invalid job")]
    Invalid,
}

fn job_retryer() -> Retryer<(), JobError> {
    Retryer::new().is_retryable_fn(|_ctx, err: &JobError| matches!(err, JobError::Busy))
}

/// Runs `retryer` against a job that fails with `errors` in order and reports how many calls it
/// took.
async fn run_job(name: &str, retryer: &Retryer<(), JobError>, errors: &[JobError]) {
    let calls = AtomicUsize::new(0);
    let result = retryer
        .run(&Context::background(), |_ctx| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            let outcome = match errors.get(n) {
                Some(JobError::Busy) => Err(JobError::Busy),
                Some(JobError::Invalid) => Err(JobError::Invalid),
                None => Ok(()),
            };
            async move { outcome }
        })
        .await;

    println!(
        "{name}: {:?} after {} calls",
        result,
        calls.load(Ordering::SeqCst)
    );
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter("retryer=trace,retry_strategies=info")
        .init();

    use JobError::{Busy, Invalid};
    let failures = [Busy, Busy, Invalid, Busy, Invalid];

    println!("=== Max-Attempts Modes (budget of 2) ===");
    for mode in [
        MaxAttemptsMode::Total,
        MaxAttemptsMode::NonRetryable,
        MaxAttemptsMode::NonRetryableReset,
        MaxAttemptsMode::Unlimited,
    ] {
        let retryer = job_retryer()
            .max_attempts(mode, 2)
            .backoff(Fixed(Duration::from_millis(10)));
        run_job(&format!("{mode:?}"), &retryer, &failures).await;
    }
    println!();

    println!("=== Exponential Backoff ===");
    println!("Delays: 100ms, 200ms, 400ms (with jitter)");
    let retryer = job_retryer()
        .max_attempts(MaxAttemptsMode::Total, 4)
        .backoff(Exponential {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            jitter: true,
        });
    run_job("exponential", &retryer, &[Busy, Busy, Busy]).await;
    println!();

    println!("=== Custom Backoff ===");
    let retryer = job_retryer()
        .max_attempts(MaxAttemptsMode::Total, 4)
        .backoff(|attempt: usize, err: &JobError| {
            println!("  attempt {attempt} failed with {err}");
            Duration::from_millis(50) * (attempt as u32 + 1)
        });
    run_job("linear", &retryer, &[Busy, Busy]).await;
    println!();

    println!("=== Per-Attempt Timeout ===");
    let slow = Retryer::<(), TransientError>::new()
        .max_attempts(MaxAttemptsMode::Total, 3)
        .timeout(Duration::from_millis(100))
        .no_backoff();
    let result = slow
        .run(&Context::background(), |ctx| async move {
            ctx.run(tokio::time::sleep(Duration::from_secs(1)))
                .await
                .map_err(TransientError::new)
        })
        .await;
    println!("slow operation: {result:?}");
    println!();

    println!("=== Cancelling an Unlimited Loop ===");
    let ctx = Context::background().with_timeout(Duration::from_millis(300));
    let forever = job_retryer()
        .max_attempts(MaxAttemptsMode::Unlimited, 0)
        .backoff(Fixed(Duration::from_millis(50)));
    let calls = AtomicUsize::new(0);
    let result = forever
        .run(&ctx, |_ctx| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(JobError::Busy) }
        })
        .await;
    println!(
        "unlimited: {result:?} after {} calls, context: {:?}",
        calls.load(Ordering::SeqCst),
        ctx.err()
    );
}
