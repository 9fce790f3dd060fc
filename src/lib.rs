//! # Retryer - policy-driven retries for fallible operations and HTTP calls
//!
//! The crate has two layers:
//!
//! - [`Retryer`], a generic engine that re-runs any async operation under a configurable attempt
//!   budget, backoff strategy, per-attempt timeout and early-return rule.
//! - [`HttpRetryer`], an adapter on top of it that rebuilds a `reqwest` request per attempt,
//!   classifies transport failures and unexpected status codes, and decodes response bodies.
//!
//! Both are driven by a [`Context`], which carries cancellation and an optional deadline.
//!
//! ## Quick Start
//!
//! ```no_run
//! use retryer::{Context, HttpRetryer};
//! use http::StatusCode;
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), retryer::Error> {
//!     let client = reqwest::Client::new();
//!     let retryer = HttpRetryer::new().client(client.clone());
//!
//!     // 503, 429 and connection resets are retried; a 404 returns immediately.
//!     let user: User = retryer
//!         .call(
//!             &Context::background(),
//!             |_ctx| Ok(client.get("https://api.example.com/users/123").build()?),
//!             &[StatusCode::OK],
//!         )
//!         .await?;
//!     println!("User {}: {}", user.id, user.name);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Attempt budgets
//!
//! [`MaxAttemptsMode`] decides which failures consume the budget:
//!
//! - `NonRetryableReset` (default): non-retryable failures spend it, a retryable failure refills it.
//! - `NonRetryable`: only non-retryable failures spend it.
//! - `Total`: every failure spends it.
//! - `Unlimited`: nothing does; only cancellation or an early return ends the call.
//!
//! ## Error Handling
//!
//! Unexpected status codes keep their headers and a capped copy of the body:
//!
//! ```no_run
//! use retryer::{Context, Error, HttpRetryer};
//! use http::StatusCode;
//!
//! # async fn example() {
//! let client = reqwest::Client::new();
//! let retryer = HttpRetryer::new();
//!
//! match retryer
//!     .send(
//!         &Context::background(),
//!         |_ctx| Ok(client.delete("https://api.example.com/items/1").build()?),
//!         &[StatusCode::NO_CONTENT],
//!     )
//!     .await
//! {
//!     Ok(_) => println!("Deleted"),
//!     Err(Error::Status(err)) => {
//!         eprintln!("HTTP {}: {}", err.status, err.body_text().unwrap_or_default());
//!     }
//!     Err(e) => eprintln!("Other error: {e}"),
//! }
//! # }
//! ```

pub mod backoff;
pub mod classify;
mod client;
pub mod context;
mod error;
pub mod rate_limit;
pub mod response;
pub mod retry;

pub use client::{HttpRetryer, StatusPredicate, Transport};
pub use context::{Context, ContextError};
pub use error::{BoxError, DecodeError, Error, Result, StatusCodeError};
pub use retry::{MaxAttemptsMode, Retryer};
