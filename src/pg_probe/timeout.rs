use std::future::Future;
use std::time::Duration;

/// Result of racing an operation against a timer.
#[derive(Debug, thiserror::Error)]
pub enum TimeoutError<E> {
    #[error("{0}")]
    Inner(E),

    #[error("timed out after {0:?}")]
    Elapsed(Duration),
}

/// Races `operation` against a timer of `limit`.
///
/// When the timer wins the operation future is dropped, which cancels any I/O
/// it still had in flight.
pub async fn with_timeout<F, T, E>(limit: Duration, operation: F) -> Result<T, TimeoutError<E>>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(TimeoutError::Inner(e)),
        Err(_) => Err(TimeoutError::Elapsed(limit)),
    }
}
