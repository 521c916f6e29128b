//! Timeout constants and async timeout wrappers.

use crate::error::{ProtocolError, Result};
use std::future::Future;
use std::time::Duration;

/// Default bound for connection establishment
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on how long `disconnect` waits for the receive loop to exit
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Run `fut` and map an elapsed deadline to [`ProtocolError::Timeout`].
pub async fn with_timeout<F, T>(fut: F, duration: Duration) -> Result<T>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, fut)
        .await
        .map_err(|_| ProtocolError::Timeout)
}

/// Like [`with_timeout`] for futures that already return a protocol `Result`.
pub async fn with_timeout_error<F, T>(fut: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    with_timeout(fut, duration).await?
}
