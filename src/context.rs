//! Cancellation scopes for retried operations.
//!
//! A [`Context`] carries a cancellation signal and an optional deadline. Every attempt made by a
//! [`Retryer`](crate::retry::Retryer) receives one, and every wait between attempts races against
//! it, so cancelling the caller's context stops a retry loop promptly.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// The reason a [`Context`] is done.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    /// The context, or one of its parents, was cancelled.
    #[error("context canceled")]
    Canceled,

    /// The context's deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// A cancellation signal paired with an optional deadline.
///
/// Cloning a `Context` yields a handle to the same scope. Deriving a child with
/// [`with_cancel`](Context::with_cancel), [`with_timeout`](Context::with_timeout) or
/// [`with_deadline`](Context::with_deadline) creates a new scope: cancelling the parent cancels
/// the child, but cancelling the child never affects the parent.
///
/// # Examples
///
/// ```
/// use retryer::Context;
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() {
/// let parent = Context::background();
/// let child = parent.with_timeout(Duration::from_millis(10));
///
/// child.done().await;
/// assert_eq!(child.err(), Some(retryer::ContextError::DeadlineExceeded));
/// assert!(parent.err().is_none());
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// Returns a context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Derives a child context that can be cancelled independently of this one.
    pub fn with_cancel(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derives a child context that expires after `timeout`, or at this context's deadline if
    /// that comes first.
    ///
    /// A timeout too large to represent as an instant adds no deadline of its own.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.with_cancel(),
        }
    }

    /// Derives a child context that expires at `deadline`, or at this context's deadline if that
    /// comes first.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(parent) => parent.min(deadline),
            None => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Cancels this context and every context derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns the deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the underlying cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns why the context is done, or `None` while it is still live.
    pub fn err(&self) -> Option<ContextError> {
        if self.token.is_cancelled() {
            return Some(ContextError::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Returns `true` once the context is cancelled or past its deadline.
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Completes once the context is cancelled or its deadline passes.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Runs `fut` until it completes or the context is done, whichever happens first.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, ContextError>
    where
        F: std::future::Future,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            output = fut => Ok(output),
            _ = self.done() => Err(self.err().unwrap_or(ContextError::Canceled)),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl From<CancellationToken> for Context {
    fn from(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }
}

/// Sleeps for `duration` or until `ctx` is done, whichever happens first.
pub async fn sleep(ctx: &Context, duration: Duration) {
    if duration.is_zero() {
        return;
    }
    tokio::select! {
        _ = ctx.done() => {}
        _ = tokio::time::sleep(duration) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timeout_child_expires() {
        let ctx = Context::background().with_timeout(Duration::from_secs(1));
        assert!(ctx.err().is_none());

        ctx.done().await;
        assert_eq!(ctx.err(), Some(ContextError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_parent_cancel_propagates() {
        let parent = Context::background();
        let child = parent.with_cancel();
        let grandchild = child.with_timeout(Duration::from_secs(60));

        parent.cancel();

        assert_eq!(child.err(), Some(ContextError::Canceled));
        assert_eq!(grandchild.err(), Some(ContextError::Canceled));
        grandchild.done().await;
    }

    #[tokio::test]
    async fn test_child_cancel_does_not_reach_parent() {
        let parent = Context::background();
        let child = parent.with_cancel();

        child.cancel();

        assert!(child.is_done());
        assert!(!parent.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_deadline_bounded_by_parent() {
        let parent = Context::background().with_timeout(Duration::from_secs(1));
        let child = parent.with_timeout(Duration::from_secs(10));

        assert_eq!(child.deadline(), parent.deadline());
    }

    #[tokio::test]
    async fn test_unrepresentable_timeout_keeps_parent_deadline() {
        let ctx = Context::background().with_timeout(Duration::MAX);
        assert_eq!(ctx.deadline(), None);
        assert!(!ctx.is_done());

        let parent = Context::background().with_timeout(Duration::from_secs(1));
        let child = parent.with_timeout(Duration::MAX);
        assert_eq!(child.deadline(), parent.deadline());

        parent.cancel();
        assert_eq!(child.err(), Some(ContextError::Canceled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_returns_on_cancel() {
        let ctx = Context::background();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        sleep(&ctx, Duration::from_secs(3600)).await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_reports_deadline() {
        let ctx = Context::background().with_timeout(Duration::from_secs(1));
        let result = ctx
            .run(tokio::time::sleep(Duration::from_secs(3)))
            .await;
        assert_eq!(result, Err(ContextError::DeadlineExceeded));
    }
}
