use std::collections::VecDeque;
use crate::core::log::{Counters, Logger, Op};

/// core queue state: buffer, counters and the finished flag.
/// Not synchronized; `HandoffQueue` owns it behind its single lock.
pub struct Queue<T> {
    items: VecDeque<T>,
    total_produced: u64,
    total_consumed: u64,
    finished: bool,
    closed: bool,
    journal: Option<Logger>,
}

impl<T> Queue<T> {
    /// Create a new, empty, open queue
    pub(crate) fn new(journal: Option<Logger>) -> Self {
        Self {
            items: VecDeque::new(),
            total_produced: 0,
            total_consumed: 0,
            finished: false,
            closed: false,
            journal,
        }
    }

    /// Enqueue an item at the tail
    pub(crate) fn enqueue(&mut self, item: T) {
        self.items.push_back(item);
        self.total_produced += 1;
        // -- post operation assertion
        assert!(!self.items.is_empty(), "Queue must have at least one item after enqueue");
        self.check_counters();
        self.record(Op::Produce, 1);
    }

    /// Enqueue a whole batch, preserving its order
    pub(crate) fn enqueue_all<I>(&mut self, items: I) -> u64
    where
        I: IntoIterator<Item = T>,
    {
        let len_before = self.items.len();
        self.items.extend(items);
        let added = (self.items.len() - len_before) as u64;
        self.total_produced += added;
        self.check_counters();
        self.record(Op::ProduceAll, added);
        added
    }

    /// Dequeue the head item
    pub(crate) fn dequeue(&mut self) -> Option<T> {
        let len_before = self.items.len();
        let result = self.items.pop_front();
        // -- post op assertion: queue size decreases if dequeue succeeded
        match result {
            Some(_) => {
                assert_eq!(self.items.len(), len_before - 1, "Queue length should decrease by 1");
                self.total_consumed += 1;
                self.check_counters();
                self.record(Op::Get, 1);
            }
            None => assert_eq!(self.items.len(), len_before, "Queue length unchanged when empty"),
        }
        result
    }

    /// Drain everything currently buffered, oldest first
    pub(crate) fn dequeue_all(&mut self) -> Option<Vec<T>> {
        if self.items.is_empty() {
            return None;
        }
        let drained: Vec<T> = self.items.drain(..).collect();
        self.total_consumed += drained.len() as u64;
        // -- post op assertion: nothing left behind
        assert!(self.items.is_empty(), "Queue must be empty after a full drain");
        self.check_counters();
        self.record(Op::GetAll, drained.len() as u64);
        Some(drained)
    }

    /// Set the finished flag. Returns true only on the first call.
    pub(crate) fn finish(&mut self) -> bool {
        if self.finished {
            return false;
        }
        self.finished = true;
        self.record(Op::Finish, 0);
        true
    }

    /// Record items dropped by a discard-after-finish policy
    pub(crate) fn note_discarded(&mut self, count: u64) {
        assert!(self.finished, "Only a finished queue discards production");
        self.record(Op::Discard, count);
    }

    /// Journal the first close only. Returns true on that first call.
    pub(crate) fn note_closed(&mut self) -> bool {
        if self.closed {
            return false;
        }
        assert!(self.finished, "A queue is finished before it is closed");
        self.closed = true;
        self.record(Op::Close, 0);
        true
    }

    /// Get the current queue length
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_finished_and_empty(&self) -> bool {
        self.finished && self.items.is_empty()
    }

    pub fn total_produced(&self) -> u64 {
        self.total_produced
    }

    pub fn total_consumed(&self) -> u64 {
        self.total_consumed
    }

    pub(crate) fn counters(&self) -> Counters {
        Counters {
            produced: self.total_produced,
            consumed: self.total_consumed,
            buffered: self.items.len() as u64,
            finished: self.finished,
        }
    }

    pub(crate) fn journal(&self) -> Option<&Logger> {
        self.journal.as_ref()
    }

    pub(crate) fn journal_mut(&mut self) -> Option<&mut Logger> {
        self.journal.as_mut()
    }

    fn check_counters(&self) {
        // --- Negative-space assertion: produced - consumed == len ---
        assert!(self.total_consumed <= self.total_produced, "Consumed must never exceed produced");
        assert_eq!(
            self.total_produced - self.total_consumed,
            self.items.len() as u64,
            "Counters must match the buffer length"
        );
    }

    fn record(&mut self, op: Op, count: u64) {
        let counters = self.counters();
        if let Some(journal) = self.journal.as_mut() {
            journal.log(op, count, counters);
        }
    }
}
