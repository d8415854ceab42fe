//! The seam between a chat session and the network.
//!
//! A [`Transport`] issues one request and hands back the response body as a lazy stream of
//! byte buffers.  Every request carries a [`CancellationToken`]; once it is signaled the
//! stream must not yield further chunks.  [`cancellable`] wraps any byte stream with that
//! guarantee.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::types::ChatRequest;

/// A response body: finite, not restartable, terminated by the server or by cancellation.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Something that can carry a [`ChatRequest`] to the assistant.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request` and returns the response body.
    ///
    /// Implementations report a signaled `cancel` as [`Error::Abort`], inactivity they detect
    /// themselves as [`Error::Timeout`], and everything else as a network or HTTP error.
    async fn send(&self, request: &ChatRequest, cancel: CancellationToken) -> Result<ByteStream>;
}

/// Wraps `inner` so that it stops as soon as `cancel` is signaled.
///
/// After cancellation the wrapped stream yields a single [`Error::Abort`] and then ends.
/// The inner stream is dropped at that point, which releases the underlying connection.
/// A chunk that races with cancellation is discarded rather than delivered.
pub fn cancellable<S>(inner: S, cancel: CancellationToken) -> ByteStream
where
    S: Stream<Item = Result<Bytes>> + Send + 'static,
{
    let inner: ByteStream = Box::pin(inner);
    Box::pin(stream::unfold(
        (Some(inner), cancel),
        |(inner, cancel)| async move {
            let mut inner = inner?;
            let aborted = || Error::abort("request cancelled by user");
            if cancel.is_cancelled() {
                return Some((Err(aborted()), (None, cancel)));
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Some((Err(aborted()), (None, cancel))),
                next = inner.next() => match next {
                    Some(_) if cancel.is_cancelled() => Some((Err(aborted()), (None, cancel))),
                    Some(item) => Some((item, (Some(inner), cancel))),
                    None => None,
                },
            }
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = Result<Bytes>> + Send + 'static {
        stream::iter(
            parts
                .iter()
                .map(|part| Ok(Bytes::from_static(part.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn passes_chunks_through_until_end() {
        let token = CancellationToken::new();
        let mut body = cancellable(chunks(&["Hi", " there"]), token);

        assert_eq!(body.next().await.unwrap().unwrap(), Bytes::from("Hi"));
        assert_eq!(body.next().await.unwrap().unwrap(), Bytes::from(" there"));
        assert!(body.next().await.is_none());
    }

    #[tokio::test]
    async fn cancelled_before_read_yields_abort_then_ends() {
        let token = CancellationToken::new();
        let mut body = cancellable(chunks(&["never"]), token.clone());
        token.cancel();

        let err = body.next().await.unwrap().unwrap_err();
        assert!(err.is_abort());
        assert!(body.next().await.is_none());
    }

    #[tokio::test]
    async fn cancel_interrupts_a_hung_read() {
        let token = CancellationToken::new();
        let hung = stream::pending::<Result<Bytes>>();
        let mut body = cancellable(hung, token.clone());

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            canceller.cancel();
        });

        let err = body.next().await.unwrap().unwrap_err();
        assert!(err.is_abort());
        assert!(body.next().await.is_none());
    }

    #[tokio::test]
    async fn no_chunks_after_cancel() {
        let token = CancellationToken::new();
        let mut body = cancellable(chunks(&["one", "two", "three"]), token.clone());

        assert_eq!(body.next().await.unwrap().unwrap(), Bytes::from("one"));
        token.cancel();
        token.cancel();

        let mut delivered = Vec::new();
        while let Some(item) = body.next().await {
            delivered.push(item);
        }
        assert_eq!(delivered.len(), 1);
        assert!(delivered[0].as_ref().unwrap_err().is_abort());
    }
}
