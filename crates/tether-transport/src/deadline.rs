//! Deadline racing.
//!
//! Start the operation, start a timer, and whichever completes first
//! cancels the other. Cancellation is by drop: the losing future is
//! dropped, which is why channel implementations must release resources on
//! drop as well as on explicit close.

use std::future::Future;
use std::time::Duration;

use tether_foundation::{DispatchError, DispatchResult};

/// Race `fut` against `deadline`; an elapsed deadline surfaces as
/// [`DispatchError::CallTimeout`] and the operation is abandoned.
pub async fn with_deadline<T, F>(deadline: Duration, fut: F) -> DispatchResult<T>
where
    F: Future<Output = DispatchResult<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(DispatchError::CallTimeout(deadline)),
    }
}
