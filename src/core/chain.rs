//! Result chaining
//!
//! Sequences dependent command executions without nested error checks. Each
//! step runs only if every earlier step succeeded; the first failure becomes
//! the result of the whole chain and no later step is evaluated.
//!
//! The plain form is an early-return scope:
//!
//! ```ignore
//! let total = db_result(|| {
//!     Command::text("INSERT INTO orders (id) VALUES (@id)")
//!         .param("id", 7)
//!         .build()
//!         .exec(&mut conn)?;
//!     Command::text("SELECT count(*) FROM orders")
//!         .build()
//!         .scalar::<_, i64>(&mut conn)
//! })?;
//! ```
//!
//! [`ResultChain`] and [`AsyncResultChain`] offer the same thing as
//! combinators, including steps that suspend.

use super::error::DbResult;
use futures::future::{AndThen, TryFutureExt};
use std::future::Future;

/// Run a chain of blocking steps that use `?` to stop at the first failure
pub fn db_result<T, F>(steps: F) -> DbResult<T>
where
    F: FnOnce() -> DbResult<T>,
{
    steps()
}

/// Run a chain of async steps that use `?` to stop at the first failure
///
/// Steps run strictly in sequence inside the returned future.
pub async fn db_result_async<T, F, Fut>(steps: F) -> DbResult<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = DbResult<T>>,
{
    steps().await
}

/// Chaining combinators on a completed [`DbResult`]
pub trait ResultChain<T>: Sized {
    /// Run `next` with the success value; a failure passes through untouched
    fn bind<U, F>(self, next: F) -> DbResult<U>
    where
        F: FnOnce(T) -> DbResult<U>;

    /// Continue with an async step
    ///
    /// On failure `next` is never called and the returned future resolves to
    /// the original error.
    fn bind_async<U, F, Fut>(self, next: F) -> impl Future<Output = DbResult<U>>
    where
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = DbResult<U>>;
}

impl<T> ResultChain<T> for DbResult<T> {
    fn bind<U, F>(self, next: F) -> DbResult<U>
    where
        F: FnOnce(T) -> DbResult<U>,
    {
        self.and_then(next)
    }

    fn bind_async<U, F, Fut>(self, next: F) -> impl Future<Output = DbResult<U>>
    where
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = DbResult<U>>,
    {
        async move {
            match self {
                Ok(value) => next(value).await,
                Err(e) => Err(e),
            }
        }
    }
}

/// Chaining combinators on a future that yields a [`DbResult`]
pub trait AsyncResultChain<T>: Future<Output = DbResult<T>> + Sized {
    /// Continue with another async step once this one succeeds
    fn bind<U, F, Fut>(self, next: F) -> AndThen<Self, Fut, F>
    where
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = DbResult<U>>,
    {
        TryFutureExt::and_then(self, next)
    }

    /// Continue with a blocking step once this one succeeds
    fn bind_sync<U, F>(self, next: F) -> impl Future<Output = DbResult<U>>
    where
        F: FnOnce(T) -> DbResult<U>,
    {
        async move {
            match self.await {
                Ok(value) => next(value),
                Err(e) => Err(e),
            }
        }
    }
}

impl<T, Fut> AsyncResultChain<T> for Fut where Fut: Future<Output = DbResult<T>> {}
