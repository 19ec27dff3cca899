//! Pushable request queue
//!
//! Bridges the push-based WebSocket message handler to tonic's pull-based
//! client-streaming API: the connection handler `push`es typed requests,
//! tonic consumes the queue as a `futures::Stream`.
//!
//! Semantics:
//! - `push` resolves a pending consumer immediately, otherwise buffers;
//!   fails with [`QueueClosed`] once the queue is closed.
//! - `close` is idempotent; buffered items drain FIFO first, then the
//!   stream ends; every waiter pending at close time is woken.
//! - Strict FIFO order is preserved regardless of push/poll interleaving.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use futures::Stream;
use parking_lot::Mutex;

use crate::errors::QueueClosed;

struct Inner<T> {
    buf: VecDeque<T>,
    wakers: Vec<Waker>,
    closed: bool,
}

/// A closable FIFO queue that implements `futures::Stream`.
///
/// Clones share the same queue; typically the connection handler keeps one
/// clone for pushing while tonic owns another as the request stream.
pub struct PushableQueue<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for PushableQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for PushableQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PushableQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                buf: VecDeque::new(),
                wakers: Vec::new(),
                closed: false,
            })),
        }
    }

    /// Enqueue one item, waking a pending consumer if there is one.
    pub fn push(&self, item: T) -> Result<(), QueueClosed> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(QueueClosed);
        }
        inner.buf.push_back(item);
        for waker in inner.wakers.drain(..) {
            waker.wake();
        }
        Ok(())
    }

    /// Close the queue. Idempotent; wakes every pending consumer.
    ///
    /// Items buffered before the close are still drained in order; only
    /// after the buffer empties does the stream report end-of-stream.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        inner.closed = true;
        for waker in inner.wakers.drain(..) {
            waker.wake();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().buf.len()
    }
}

impl<T> Stream for PushableQueue<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let mut inner = self.inner.lock();
        if let Some(item) = inner.buf.pop_front() {
            return Poll::Ready(Some(item));
        }
        if inner.closed {
            return Poll::Ready(None);
        }
        if !inner.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            inner.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;

    #[tokio::test]
    async fn yields_items_in_push_order() {
        let mut queue = PushableQueue::new();
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        queue.push(3).unwrap();
        assert_eq!(queue.next().await, Some(1));
        assert_eq!(queue.next().await, Some(2));
        assert_eq!(queue.next().await, Some(3));
    }

    #[tokio::test]
    async fn pending_consumer_resolves_on_push() {
        let queue = PushableQueue::new();
        let mut consumer = queue.clone();

        let waiter = tokio::spawn(async move { consumer.next().await });
        // Give the consumer time to park on the queue.
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.push(42u32).unwrap();

        assert_eq!(waiter.await.unwrap(), Some(42));
    }

    #[tokio::test]
    async fn fifo_preserved_across_interleaved_push_and_poll() {
        let queue = PushableQueue::new();
        let mut consumer = queue.clone();

        queue.push(1).unwrap();
        assert_eq!(consumer.next().await, Some(1));

        let waiter = tokio::spawn(async move {
            let a = consumer.next().await;
            let b = consumer.next().await;
            (a, b)
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.push(2).unwrap();
        queue.push(3).unwrap();
        assert_eq!(waiter.await.unwrap(), (Some(2), Some(3)));
    }

    #[tokio::test]
    async fn close_wakes_pending_consumer_with_end_of_stream() {
        let queue: PushableQueue<u32> = PushableQueue::new();
        let mut consumer = queue.clone();

        let waiter = tokio::spawn(async move { consumer.next().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.close();

        assert_eq!(waiter.await.unwrap(), None);
    }

    #[tokio::test]
    async fn push_after_close_fails() {
        let queue = PushableQueue::new();
        queue.close();
        assert_eq!(queue.push(1), Err(QueueClosed));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_drains_buffer_first() {
        let mut queue = PushableQueue::new();
        queue.push("a").unwrap();
        queue.push("b").unwrap();
        queue.close();
        queue.close();

        assert_eq!(queue.next().await, Some("a"));
        assert_eq!(queue.next().await, Some("b"));
        assert_eq!(queue.next().await, None);
        assert_eq!(queue.len(), 0);
    }
}
