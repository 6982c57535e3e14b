// ── Device streams ──
//
// `Stream` adapters over the watch and broadcast channels of a device.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};

use crate::model::QuotaSnapshot;

/// Yields the snapshot now and after every change.
pub struct SnapshotStream {
    inner: WatchStream<QuotaSnapshot>,
}

impl SnapshotStream {
    pub(crate) fn new(receiver: watch::Receiver<QuotaSnapshot>) -> Self {
        Self {
            inner: WatchStream::new(receiver),
        }
    }
}

impl Stream for SnapshotStream {
    type Item = QuotaSnapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Raw device messages. Messages lost to a slow consumer are skipped.
pub struct MessageStream {
    inner: BroadcastStream<Arc<Value>>,
}

impl MessageStream {
    pub(crate) fn new(receiver: broadcast::Receiver<Arc<Value>>) -> Self {
        Self {
            inner: BroadcastStream::new(receiver),
        }
    }
}

impl Stream for MessageStream {
    type Item = Arc<Value>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(message))) => return Poll::Ready(Some(message)),
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                    tracing::debug!(skipped, "Message stream lagged");
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
