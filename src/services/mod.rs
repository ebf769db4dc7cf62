//! Services exposed to callers.
//!
//! Services orchestrate the store and the retrieval building blocks, using
//! the `FromContext` derive macro for dependency injection. Every public call
//! runs under the configured deadline and the caller's cancellation token.

mod document;
mod export;
mod retrieval;

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::AppError;

pub use document::DocumentService;
pub use export::GraphExporter;
pub use retrieval::ContextAssembler;

/// Runs `call` until it completes, `cancel` fires, or `deadline` elapses.
///
/// Cancellation wins over a simultaneously ready result. On cancellation or
/// timeout the future is dropped and its partial work discarded.
pub async fn run_bounded<T, F>(
    deadline: Duration,
    cancel: &CancellationToken,
    call: F,
) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::debug!("Call cancelled");
            Err(AppError::Cancelled)
        }
        result = tokio::time::timeout(deadline, call) => match result {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(?deadline, "Call exceeded deadline");
                Err(AppError::DeadlineExceeded(deadline))
            }
        },
    }
}
