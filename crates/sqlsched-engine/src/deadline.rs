//! Optional deadlines for remote calls

use std::future::Future;
use std::time::Duration;

/// Await `future`, giving up after `limit` when one is set.
///
/// On expiry the configured limit is returned as the error.
pub(crate) async fn bounded<F: Future>(limit: Option<Duration>, future: F) -> Result<F::Output, Duration> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, future).await.map_err(|_| limit),
        None => Ok(future.await),
    }
}
