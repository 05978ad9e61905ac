//! Prefetch helper for the data loader.
//!
//! Drive a batch stream on a background task and hand the consumer a
//! bounded receiver that stays up to `cap` items ahead.

use futures_util::StreamExt;
use tokio::sync::mpsc::channel;
use tokio_stream::wrappers::ReceiverStream;

use crate::data_loader::dataset::DynStream;

/// Spawn an async prefetcher over `inner`.
///
/// The returned stream yields the same items in the same order.  The
/// background task stops at the first error or when the consumer drops
/// the stream.  Must be called from within a Tokio runtime.
pub fn spawn_prefetch<T>(cap: usize, mut inner: DynStream<T>) -> DynStream<T>
where
    T: Send + 'static,
{
    let (tx, rx) = channel(cap.max(1));
    tokio::spawn(async move {
        while let Some(item) = inner.next().await {
            let failed = item.is_err();
            if tx.send(item).await.is_err() || failed {
                break;
            }
        }
    });
    Box::pin(ReceiverStream::new(rx))
}
