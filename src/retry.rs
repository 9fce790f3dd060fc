//! The generic retry engine.
//!
//! A [`Retryer`] repeatedly invokes a caller-supplied fallible operation, classifying each failure
//! as retryable or not, charging it against an attempt budget according to a
//! [`MaxAttemptsMode`], and waiting with a [`Backoff`] strategy between attempts.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use crate::backoff::{Backoff, Fixed, NoBackoff};
use crate::context::Context;

/// The number of attempts a new [`Retryer`] allows.
pub const DEFAULT_MAX_ATTEMPTS: u8 = 5;

/// A predicate over a failed attempt's error, shared between cheap copies of a policy.
pub type Predicate<E> = Arc<dyn Fn(&Context, &E) -> bool + Send + Sync>;

/// How the attempt budget is charged.
///
/// # Examples
///
/// ```
/// use retryer::{MaxAttemptsMode, Retryer};
///
/// // Give up after three failures of any kind.
/// let retryer = Retryer::<(), std::io::Error>::new().max_attempts(MaxAttemptsMode::Total, 3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaxAttemptsMode {
    /// Only non-retryable failures consume the budget, and any retryable failure restores it to
    /// the configured maximum.
    #[default]
    NonRetryableReset,

    /// Only non-retryable failures consume the budget; retryable failures retry for free.
    NonRetryable,

    /// Every failure consumes the budget, retryable or not.
    Total,

    /// The budget never runs out. Only an early return or the caller's context ends the loop.
    Unlimited,
}

/// What a failure does to the remaining budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Charge {
    /// Retry without touching the budget.
    Free,
    /// Restore the budget to the configured maximum, then retry.
    Reset,
    /// Spend one attempt; stop once nothing remains.
    Spend,
}

impl MaxAttemptsMode {
    fn charge(self, is_retryable: bool) -> Charge {
        match (self, is_retryable) {
            (MaxAttemptsMode::Unlimited, _) => Charge::Free,
            (MaxAttemptsMode::NonRetryableReset, true) => Charge::Reset,
            (MaxAttemptsMode::NonRetryable, true) => Charge::Free,
            (MaxAttemptsMode::NonRetryableReset | MaxAttemptsMode::NonRetryable, false) => {
                Charge::Spend
            }
            (MaxAttemptsMode::Total, _) => Charge::Spend,
        }
    }
}

/// Per-call attempt accounting. Never shared between calls.
#[derive(Debug)]
struct AttemptBudget {
    attempt: usize,
    remaining: u8,
    max_attempts: u8,
    mode: MaxAttemptsMode,
}

impl AttemptBudget {
    fn new(mode: MaxAttemptsMode, max_attempts: u8) -> Self {
        Self {
            attempt: 0,
            remaining: max_attempts,
            max_attempts,
            mode,
        }
    }

    /// Charges a failure. Returns `false` once the budget is exhausted.
    fn charge(&mut self, is_retryable: bool) -> bool {
        match self.mode.charge(is_retryable) {
            Charge::Free => true,
            Charge::Reset => {
                self.remaining = self.max_attempts;
                true
            }
            Charge::Spend => {
                self.remaining = self.remaining.saturating_sub(1);
                self.remaining > 0
            }
        }
    }
}

/// A reusable retry policy for operations producing `Result<T, E>`.
///
/// A `Retryer` holds no per-call state, so one value can drive any number of concurrent calls.
/// Configuration methods consume the value and return the reconfigured policy; cloning is cheap,
/// so a shared base policy is cloned and specialised without affecting other holders.
///
/// The defaults are:
/// - mode [`MaxAttemptsMode::NonRetryableReset`] with [`DEFAULT_MAX_ATTEMPTS`] attempts,
/// - no error is retryable (the element type is unknown until a predicate is supplied),
/// - no early return,
/// - a [`Fixed`] 200ms backoff,
/// - no per-attempt timeout.
///
/// # Examples
///
/// ```
/// use retryer::{backoff::NoBackoff, Context, MaxAttemptsMode, Retryer};
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// # #[tokio::main]
/// # async fn main() {
/// let calls = AtomicUsize::new(0);
/// let retryer = Retryer::<u32, &'static str>::new()
///     .is_retryable_fn(|_ctx, err: &&str| *err == "busy")
///     .max_attempts(MaxAttemptsMode::Total, 3)
///     .backoff(NoBackoff);
///
/// let result = retryer
///     .run(&Context::background(), |_ctx| {
///         let n = calls.fetch_add(1, Ordering::SeqCst);
///         async move { if n < 2 { Err("busy") } else { Ok(42) } }
///     })
///     .await;
///
/// assert_eq!(result, Ok(42));
/// assert_eq!(calls.load(Ordering::SeqCst), 3);
/// # }
/// ```
pub struct Retryer<T, E> {
    is_retryable: Predicate<E>,
    is_early_return: Option<Predicate<E>>,
    max_attempts_mode: MaxAttemptsMode,
    max_attempts: u8,
    backoff: Arc<dyn Backoff<E>>,
    timeout: Duration,
    _output: PhantomData<fn() -> T>,
}

impl<T, E> Clone for Retryer<T, E> {
    fn clone(&self) -> Self {
        Self {
            is_retryable: Arc::clone(&self.is_retryable),
            is_early_return: self.is_early_return.clone(),
            max_attempts_mode: self.max_attempts_mode,
            max_attempts: self.max_attempts,
            backoff: Arc::clone(&self.backoff),
            timeout: self.timeout,
            _output: PhantomData,
        }
    }
}

impl<T, E> fmt::Debug for Retryer<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retryer")
            .field("max_attempts_mode", &self.max_attempts_mode)
            .field("max_attempts", &self.max_attempts)
            .field("has_early_return", &self.is_early_return.is_some())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl<T, E> Default for Retryer<T, E>
where
    E: Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Retryer<T, E>
where
    E: Sync + 'static,
{
    /// Creates a policy with the default configuration.
    pub fn new() -> Self {
        Self {
            is_retryable: Arc::new(|_: &Context, _: &E| false),
            is_early_return: None,
            max_attempts_mode: MaxAttemptsMode::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Arc::new(Fixed::default()),
            timeout: Duration::ZERO,
            _output: PhantomData,
        }
    }

    /// Sets the predicate deciding whether a failure is transient.
    pub fn is_retryable_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context, &E) -> bool + Send + Sync + 'static,
    {
        self.is_retryable = Arc::new(f);
        self
    }

    /// Sets the predicate that ends the call on the first failure it flags, bypassing the attempt
    /// budget entirely.
    ///
    /// It is only consulted for failures the retryable predicate rejected: a failure that is
    /// retryable is never returned early.
    pub fn is_early_return_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context, &E) -> bool + Send + Sync + 'static,
    {
        self.is_early_return = Some(Arc::new(f));
        self
    }

    /// Removes the early-return predicate.
    pub fn no_early_return(mut self) -> Self {
        self.is_early_return = None;
        self
    }

    /// Sets how failures are charged and the size of the attempt budget.
    pub fn max_attempts(mut self, mode: MaxAttemptsMode, max_attempts: u8) -> Self {
        self.max_attempts_mode = mode;
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the strategy run between attempts.
    pub fn backoff<B>(mut self, backoff: B) -> Self
    where
        B: Backoff<E> + 'static,
    {
        self.backoff = Arc::new(backoff);
        self
    }

    /// Disables waiting between attempts.
    pub fn no_backoff(self) -> Self {
        self.backoff(NoBackoff)
    }

    /// Sets the timeout applied to each attempt individually. Zero disables it.
    ///
    /// Each attempt runs under a child of the caller's context that expires after `timeout` or at
    /// the caller's deadline, whichever is sooner, and is released when the attempt ends.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn with_parts(
        is_retryable: Predicate<E>,
        is_early_return: Option<Predicate<E>>,
        max_attempts_mode: MaxAttemptsMode,
        max_attempts: u8,
        backoff: Arc<dyn Backoff<E>>,
        timeout: Duration,
    ) -> Self {
        Self {
            is_retryable,
            is_early_return,
            max_attempts_mode,
            max_attempts,
            backoff,
            timeout,
            _output: PhantomData,
        }
    }

    /// Runs `operation` until it succeeds, the budget is exhausted, an early return triggers, or
    /// `ctx` is done.
    ///
    /// The operation receives the context for its attempt and should observe it. On failure the
    /// error of the last attempt is returned unchanged.
    pub async fn run<F, Fut>(&self, ctx: &Context, mut operation: F) -> Result<T, E>
    where
        F: FnMut(Context) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut budget = AttemptBudget::new(self.max_attempts_mode, self.max_attempts);

        loop {
            let result = if self.timeout.is_zero() {
                operation(ctx.clone()).await
            } else {
                let scope = ctx.with_timeout(self.timeout);
                let _release = scope.token().clone().drop_guard();
                operation(scope).await
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let is_retryable = (self.is_retryable)(ctx, &err);
            if !is_retryable
                && self
                    .is_early_return
                    .as_ref()
                    .is_some_and(|is_early_return| is_early_return(ctx, &err))
            {
                tracing::debug!(attempt = budget.attempt, "Early return on failed attempt");
                return Err(err);
            }

            if !budget.charge(is_retryable) {
                tracing::debug!(
                    attempt = budget.attempt,
                    is_retryable,
                    "Attempt budget exhausted"
                );
                return Err(err);
            }

            if ctx.is_done() {
                tracing::debug!(attempt = budget.attempt, "Context done, not retrying");
                return Err(err);
            }

            tracing::trace!(
                attempt = budget.attempt,
                is_retryable,
                remaining = budget.remaining,
                "Attempt failed, backing off"
            );
            self.backoff.backoff(ctx, budget.attempt, &err).await;
            budget.attempt += 1;
        }
    }
}
