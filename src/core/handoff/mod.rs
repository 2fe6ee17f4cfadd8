//! The hand-off queue: one lock, one FIFO buffer, two counters and a
//! finished flag, all in a single consistency domain.
//!
//! Consumption after `finish()` is drain-then-stop: finishing never discards
//! buffered items, `get`/`get_all` keep returning them until the buffer is
//! empty. Production after `finish()` follows [`PostFinishPolicy`].

use std::path::Path;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use crate::core::{
    capability::{AsyncConsumer, AsyncProducer},
    config::{PostFinishPolicy, QueueConfig},
    error::{QueueError, QueueResult},
    log::{append_logs, Counters, LogEntry, Logger},
    queue::Queue,
};

/// Counters and flags captured in one critical section
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub produced: u64,
    pub consumed: u64,
    pub buffered: u64,
    pub finished: bool,
}

impl From<Counters> for QueueStats {
    fn from(counters: Counters) -> Self {
        Self {
            produced: counters.produced,
            consumed: counters.consumed,
            buffered: counters.buffered,
            finished: counters.finished,
        }
    }
}

impl QueueStats {
    /// Finished with nothing left to consume
    pub fn is_terminal(&self) -> bool {
        self.finished && self.buffered == 0
    }
}

/// Thread-safe FIFO hand-off queue between producers and consumers.
///
/// Every public operation takes the same exclusive lock, so operations are
/// linearized and the buffer order is the production order. Share it with
/// `Arc`; no external locking is needed.
///
/// Tracing events are emitted only after the guard is released, so a slow
/// log sink never stalls other producers or consumers.
pub struct HandoffQueue<T> {
    state: Mutex<Queue<T>>,
    export: Mutex<()>,  // serializes journal exports, never held with `state` across I/O
    config: QueueConfig,
}

impl<T> HandoffQueue<T> {
    /// Create an empty, open queue with the default config
    pub fn new() -> Self {
        Self::with_config(QueueConfig::default())
    }

    /// Create an empty, open queue
    pub fn with_config(config: QueueConfig) -> Self {
        let journal = config
            .record_operations
            .then(|| Logger::new(config.name.clone()));
        Self {
            state: Mutex::new(Queue::new(journal)),
            export: Mutex::new(()),
            config,
        }
    }

    /// Replay constructor: seed the buffer and mark the queue finished.
    /// The seed counts as produced.
    pub fn from_items<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        Self::from_items_with_config(items, QueueConfig::default())
    }

    pub fn from_items_with_config<I>(items: I, config: QueueConfig) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        let mut queue = Self::with_config(config);
        let state = queue.state.get_mut();
        let seeded = state.enqueue_all(items);
        state.finish();
        debug!(queue = %queue.config.name, seeded, "created finished replay queue");
        queue
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Narrowed producer view
    pub fn producer(&self) -> &impl AsyncProducer<T>
    where
        T: Send,
    {
        self
    }

    /// Narrowed consumer view
    pub fn consumer(&self) -> &impl AsyncConsumer<T>
    where
        T: Send,
    {
        self
    }

    /// Wait for the lock unless `token` fires first. A cancelled wait never
    /// holds the lock, so nothing can be half-applied.
    async fn lock_or_cancel(&self, token: &CancellationToken) -> QueueResult<MutexGuard<'_, Queue<T>>> {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(queue = %self.config.name, "lock wait cancelled");
                Err(QueueError::Cancelled)
            }
            guard = self.state.lock() => Ok(guard),
        }
    }

    fn discards_after_finish(&self, state: &Queue<T>) -> bool {
        state.is_finished() && self.config.post_finish == PostFinishPolicy::Discard
    }

    /// `get` with a cancellable lock wait
    pub async fn get_cancellable(&self, token: &CancellationToken) -> QueueResult<Option<T>> {
        let state = self.lock_or_cancel(token).await?;
        Ok(self.take_one(state))
    }

    /// `get_all` with a cancellable lock wait
    pub async fn get_all_cancellable(&self, token: &CancellationToken) -> QueueResult<Option<Vec<T>>> {
        let state = self.lock_or_cancel(token).await?;
        Ok(self.take_all(state))
    }

    fn take_one(&self, mut state: MutexGuard<'_, Queue<T>>) -> Option<T> {
        let item = state.dequeue();
        let counters = state.counters();
        drop(state);
        if item.is_some() {
            debug!(queue = %self.config.name, consumed = counters.consumed, buffered = counters.buffered, "consumed item");
        }
        item
    }

    fn take_all(&self, mut state: MutexGuard<'_, Queue<T>>) -> Option<Vec<T>> {
        let items = state.dequeue_all();
        let consumed = state.total_consumed();
        drop(state);
        if let Some(items) = &items {
            debug!(queue = %self.config.name, drained = items.len(), consumed, "drained queue");
        }
        items
    }

    /// Buffered item count
    pub async fn len(&self) -> usize {
        self.state.lock().await.len()
    }

    pub async fn stats(&self) -> QueueStats {
        self.state.lock().await.counters().into()
    }

    /// Journal entries not yet exported; empty unless `record_operations` is set
    pub async fn journal(&self) -> Vec<LogEntry> {
        let state = self.state.lock().await;
        state.journal().map(Logger::pending).unwrap_or_default()
    }

    /// Append the not yet exported journal entries to `path` as NDJSON, then
    /// release them from memory. The file is written without holding the
    /// queue lock. Returns the number of entries written.
    pub async fn export_journal(&self, path: impl AsRef<Path>) -> QueueResult<usize> {
        let _exporting = self.export.lock().await;
        let pending = self.journal().await;
        let Some(last) = pending.last().map(|entry| entry.local_log_id) else {
            return Ok(0);
        };

        append_logs(&pending, path)?;

        let mut state = self.state.lock().await;
        if let Some(journal) = state.journal_mut() {
            journal.release_through(last);
        }
        drop(state);
        debug!(queue = %self.config.name, exported = pending.len(), through = last, "journal exported");
        Ok(pending.len())
    }

    /// Explicit teardown: mark finished and report the counters at that
    /// instant. Safe to call more than once; only the first close is journaled.
    pub async fn close(&self) -> QueueStats {
        let mut state = self.state.lock().await;
        state.finish();
        let first_close = state.note_closed();
        let stats: QueueStats = state.counters().into();
        drop(state);

        if first_close {
            info!(
                queue = %self.config.name,
                produced = stats.produced,
                consumed = stats.consumed,
                buffered = stats.buffered,
                "queue closed"
            );
        }
        stats
    }
}

impl<T> Default for HandoffQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for HandoffQueue<T> {
    fn drop(&mut self) {
        // Exclusive access here: no lock wait needed.
        let state = self.state.get_mut();
        if state.finish() {
            debug!(queue = %self.config.name, buffered = state.len(), "queue dropped without finish");
        }
    }
}

impl<T: Send> AsyncProducer<T> for HandoffQueue<T> {
    async fn produce(&self, item: T, token: &CancellationToken) -> QueueResult<()> {
        let mut state = self.lock_or_cancel(token).await?;
        if self.discards_after_finish(&state) {
            state.note_discarded(1);
            drop(state);
            drop(item);
            warn!(queue = %self.config.name, "discarded item produced after finish");
            return Ok(());
        }
        state.enqueue(item);
        let counters = state.counters();
        drop(state);
        debug!(queue = %self.config.name, produced = counters.produced, buffered = counters.buffered, "produced item");
        Ok(())
    }

    async fn produce_all<I>(&self, items: I, token: &CancellationToken) -> QueueResult<()>
    where
        I: IntoIterator<Item = T> + Send,
    {
        let mut state = self.lock_or_cancel(token).await?;
        if self.discards_after_finish(&state) {
            // Item destructors run after the guard is released.
            let discarded: Vec<T> = items.into_iter().collect();
            state.note_discarded(discarded.len() as u64);
            drop(state);
            let dropped = discarded.len();
            drop(discarded);
            warn!(queue = %self.config.name, dropped, "discarded batch produced after finish");
            return Ok(());
        }
        let added = state.enqueue_all(items);
        let produced = state.total_produced();
        drop(state);
        debug!(queue = %self.config.name, added, produced, "produced batch");
        Ok(())
    }

    async fn finish(&self) {
        let mut state = self.state.lock().await;
        let first = state.finish();
        let buffered = state.len();
        drop(state);
        if first {
            info!(queue = %self.config.name, buffered, "queue finished");
        }
    }

    async fn produced_count(&self) -> u64 {
        self.state.lock().await.total_produced()
    }
}

impl<T: Send> AsyncConsumer<T> for HandoffQueue<T> {
    async fn get(&self) -> Option<T> {
        let state = self.state.lock().await;
        self.take_one(state)
    }

    async fn get_all(&self) -> Option<Vec<T>> {
        let state = self.state.lock().await;
        self.take_all(state)
    }

    async fn is_empty(&self) -> bool {
        self.state.lock().await.is_empty()
    }

    async fn is_finished(&self) -> bool {
        self.state.lock().await.is_finished()
    }

    async fn is_finished_and_empty(&self) -> bool {
        self.state.lock().await.is_finished_and_empty()
    }

    async fn consumed_count(&self) -> u64 {
        self.state.lock().await.total_consumed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::log::Op;
    use std::io;
    use std::sync::Arc;
    use std::time::Duration;

    /// Log sink that records, per write, whether the queue lock was free.
    struct LockCheckingWriter {
        queue: Arc<HandoffQueue<u32>>,
        lock_free: Arc<std::sync::Mutex<Vec<bool>>>,
    }

    impl io::Write for LockCheckingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let free = self.queue.state.try_lock().is_ok();
            self.lock_free.lock().unwrap().push(free);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn events_are_emitted_after_the_lock_is_released() {
        let queue = Arc::new(HandoffQueue::<u32>::with_config(
            QueueConfig::default().named("sink").post_finish(PostFinishPolicy::Discard),
        ));
        let lock_free = Arc::new(std::sync::Mutex::new(Vec::new()));
        let subscriber = {
            let queue = queue.clone();
            let lock_free = lock_free.clone();
            tracing_subscriber::fmt()
                .with_max_level(tracing::Level::DEBUG)
                .with_writer(move || LockCheckingWriter {
                    queue: queue.clone(),
                    lock_free: lock_free.clone(),
                })
                .finish()
        };
        let _default = tracing::subscriber::set_default(subscriber);

        let token = CancellationToken::new();
        queue.produce(1, &token).await.unwrap();
        queue.produce_all(vec![2, 3], &token).await.unwrap();
        queue.get().await;
        queue.get_all().await;
        queue.finish().await;
        queue.produce(4, &token).await.unwrap();
        queue.produce_all(vec![5, 6], &token).await.unwrap();
        queue.close().await;

        let writes = lock_free.lock().unwrap().clone();
        // produce, batch, get, drain, finish, two discards, close
        assert!(writes.len() >= 8, "expected every operation to log, got {}", writes.len());
        assert!(writes.iter().all(|free| *free), "an event was written while the queue lock was held");
    }

    #[tokio::test]
    async fn cancel_while_lock_is_held_leaves_queue_untouched() {
        let queue = Arc::new(HandoffQueue::<String>::new());
        let token = CancellationToken::new();

        let guard = queue.state.lock().await;
        let pending = {
            let queue = queue.clone();
            let token = token.clone();
            tokio::spawn(async move { queue.produce("late".to_string(), &token).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();

        let result = pending.await.unwrap();
        assert!(matches!(result, Err(QueueError::Cancelled)));
        drop(guard);

        assert_eq!(queue.produced_count().await, 0);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn cancelled_batch_while_lock_is_held_appends_nothing() {
        let queue = Arc::new(HandoffQueue::<u32>::new());
        queue.produce(1, &CancellationToken::new()).await.unwrap();
        let token = CancellationToken::new();

        let guard = queue.state.lock().await;
        let pending = {
            let queue = queue.clone();
            let token = token.clone();
            tokio::spawn(async move { queue.produce_all(vec![2, 3, 4], &token).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
        assert!(pending.await.unwrap().unwrap_err().is_cancelled());
        drop(guard);

        assert_eq!(queue.get_all().await, Some(vec![1]));
        assert_eq!(queue.stats().await.produced, 1);
    }

    #[tokio::test]
    async fn cancelled_get_while_lock_is_held_consumes_nothing() {
        let queue = Arc::new(HandoffQueue::from_items(vec![10u32, 20]));
        let token = CancellationToken::new();

        let guard = queue.state.lock().await;
        let single = {
            let queue = queue.clone();
            let token = token.clone();
            tokio::spawn(async move { queue.get_cancellable(&token).await })
        };
        let drain = {
            let queue = queue.clone();
            let token = token.clone();
            tokio::spawn(async move { queue.get_all_cancellable(&token).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
        assert!(single.await.unwrap().unwrap_err().is_cancelled());
        assert!(drain.await.unwrap().unwrap_err().is_cancelled());
        drop(guard);

        assert_eq!(queue.consumed_count().await, 0);
        assert_eq!(queue.get_all().await, Some(vec![10, 20]));
    }

    #[tokio::test]
    async fn cancelled_get_consumes_nothing() {
        let queue = HandoffQueue::from_items(["a"]);
        let token = CancellationToken::new();
        token.cancel();

        assert!(queue.get_cancellable(&token).await.unwrap_err().is_cancelled());
        assert!(queue.get_all_cancellable(&token).await.unwrap_err().is_cancelled());
        assert_eq!(queue.consumed_count().await, 0);
        assert_eq!(queue.get_cancellable(&CancellationToken::new()).await.unwrap(), Some("a"));
    }

    #[tokio::test]
    async fn close_is_journaled_once_and_reports_teardown_counters() {
        let queue = HandoffQueue::with_config(QueueConfig::default().named("c").recording(true));
        queue.produce(7u8, &CancellationToken::new()).await.unwrap();
        let first = queue.close().await;
        let second = queue.close().await;
        assert_eq!(first, QueueStats { produced: 1, consumed: 0, buffered: 1, finished: true });
        assert_eq!(second, first);

        let ops: Vec<Op> = queue.journal().await.iter().map(|e| e.op).collect();
        assert_eq!(ops, vec![Op::Produce, Op::Finish, Op::Close]);
    }

    /// Item whose destructor reports whether the queue lock was free.
    struct DropCheck {
        queue: Arc<HandoffQueue<DropCheck>>,
        lock_free: Arc<std::sync::Mutex<Vec<bool>>>,
    }

    impl Drop for DropCheck {
        fn drop(&mut self) {
            let free = self.queue.state.try_lock().is_ok();
            self.lock_free.lock().unwrap().push(free);
        }
    }

    #[tokio::test]
    async fn discarded_items_are_dropped_outside_the_lock() {
        let queue = Arc::new(HandoffQueue::<DropCheck>::with_config(
            QueueConfig::default().post_finish(PostFinishPolicy::Discard),
        ));
        let lock_free = Arc::new(std::sync::Mutex::new(Vec::new()));
        let item = || DropCheck { queue: queue.clone(), lock_free: lock_free.clone() };
        let token = CancellationToken::new();

        queue.finish().await;
        queue.produce(item(), &token).await.unwrap();
        queue.produce_all(vec![item(), item()], &token).await.unwrap();

        assert_eq!(*lock_free.lock().unwrap(), vec![true, true, true]);
        assert_eq!(queue.stats().await.produced, 0);
    }
}
