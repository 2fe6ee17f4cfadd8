use std::future::Future;
use tokio_util::sync::CancellationToken;
use crate::core::error::QueueResult;

/// Producer-facing half of a hand-off queue.
///
/// Components that only feed work get this view instead of the full queue.
pub trait AsyncProducer<T>: Send + Sync {
    /// Append one item at the tail.
    ///
    /// Fails with [`QueueError::Cancelled`](crate::QueueError::Cancelled) if
    /// `token` fires before the lock is granted; the queue is then untouched.
    fn produce(&self, item: T, token: &CancellationToken) -> impl Future<Output = QueueResult<()>> + Send;

    /// Append a whole batch in one critical section, keeping its order.
    /// No consumer ever sees a partially appended batch.
    fn produce_all<I>(&self, items: I, token: &CancellationToken) -> impl Future<Output = QueueResult<()>> + Send
    where
        I: IntoIterator<Item = T> + Send;

    /// Mark the queue finished. Idempotent, never undone.
    fn finish(&self) -> impl Future<Output = ()> + Send;

    /// Items enqueued since creation.
    fn produced_count(&self) -> impl Future<Output = u64> + Send;
}

/// Consumer-facing half of a hand-off queue.
///
/// Every read is a non-blocking poll: an empty buffer yields `None`,
/// it never waits for a future producer.
pub trait AsyncConsumer<T>: Send + Sync {
    /// Remove and return the head item.
    fn get(&self) -> impl Future<Output = Option<T>> + Send;

    /// Drain everything currently buffered, oldest first, in one critical section.
    fn get_all(&self) -> impl Future<Output = Option<Vec<T>>> + Send;

    fn is_empty(&self) -> impl Future<Output = bool> + Send;

    fn is_finished(&self) -> impl Future<Output = bool> + Send;

    /// Finished and drained, checked under one lock acquisition.
    /// This is the termination signal for consumers.
    fn is_finished_and_empty(&self) -> impl Future<Output = bool> + Send;

    /// Items dequeued since creation.
    fn consumed_count(&self) -> impl Future<Output = u64> + Send;
}
