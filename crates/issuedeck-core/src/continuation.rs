//! Typed continuations for callers that prefer callbacks over futures.
//!
//! Editor integrations hand a callback to the pipeline and get control back
//! immediately. The callback runs exactly once with the outcome, or not at
//! all when the caller passed `None`.

use crate::error::Result;
use std::future::Future;
use tokio::task::JoinHandle;
use tracing::debug;

/// Callback receiving the outcome of an asynchronous operation.
pub type Continuation<T> = Box<dyn FnOnce(Result<T>) + Send + 'static>;

/// Hand a result to the continuation if there is one.
pub fn deliver<T>(continuation: Option<Continuation<T>>, result: Result<T>) {
    match continuation {
        Some(continuation) => continuation(result),
        None => debug!("No continuation supplied, discarding result"),
    }
}

/// Run `operation` on the current runtime and deliver its outcome.
///
/// Aborting the returned handle drops the operation before it completes;
/// the continuation is then never invoked.
pub fn spawn_with_continuation<T, F>(
    operation: F,
    continuation: Option<Continuation<T>>,
) -> JoinHandle<()>
where
    T: Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    tokio::spawn(async move {
        let result = operation.await;
        deliver(continuation, result);
    })
}
