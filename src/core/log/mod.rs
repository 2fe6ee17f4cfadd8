use std::fmt::{Display, Formatter};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use serde::{Serialize, Deserialize};
use crate::core::error::QueueResult;

/// Kind of queue operation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    Produce,
    ProduceAll,
    Discard,
    Get,
    GetAll,
    Finish,
    Close,
}

impl Op {
    fn grows_buffer(self) -> bool {
        matches!(self, Op::Produce | Op::ProduceAll)
    }

    fn shrinks_buffer(self) -> bool {
        matches!(self, Op::Get | Op::GetAll)
    }
}

/// Journal entry recording one mutating operation and the counters right after it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub local_log_id: u64,
    pub queue: String,
    pub op: Op,
    pub count: u64,          // items moved by this operation
    pub produced: u64,
    pub consumed: u64,
    pub buffered: u64,
    pub finished: bool,
}

impl Display for LogEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "LogEntry {{ local_log_id: {}, queue: {}, op: {:?}, count: {}, produced: {}, consumed: {}, buffered: {}, finished: {} }}",
            self.local_log_id,
            self.queue,
            self.op,
            self.count,
            self.produced,
            self.consumed,
            self.buffered,
            self.finished,
        )
    }
}

/// Counters captured after an operation
#[derive(Clone, Copy, Debug)]
pub struct Counters {
    pub produced: u64,
    pub consumed: u64,
    pub buffered: u64,
    pub finished: bool,
}

#[derive(Clone, Debug)]
/// Logger storing all entries for one queue
pub struct Logger {
    pub(crate) entries: Vec<LogEntry>,
    queue: String,
    next_id: u64,
    exported_through: u64,  // highest id already written out
}

impl Logger {
    pub fn new(queue: String) -> Self {
        Self { entries: Vec::new(), queue, next_id: 1, exported_through: 0 }
    }

    /// Log an operation
    pub fn log(&mut self, op: Op, count: u64, counters: Counters) {
        // --- Negative-space assertion: only moving ops carry a count ---
        if !op.grows_buffer() && !op.shrinks_buffer() && op != Op::Discard {
            assert_eq!(count, 0, "{:?} must not move items", op);
        }
        // --- Negative-space assertion: journaled counters are consistent ---
        assert_eq!(
            counters.produced - counters.consumed,
            counters.buffered,
            "Journaled counters must match the buffer length"
        );

        let local_log_id = self.next_id;
        self.next_id += 1;

        let before = self.entries.len();
        self.entries.push(LogEntry {
            local_log_id,
            queue: self.queue.clone(),
            op,
            count,
            produced: counters.produced,
            consumed: counters.consumed,
            buffered: counters.buffered,
            finished: counters.finished,
        });

        assert_eq!(
            self.entries.len(),
            before + 1,
            "Logger must increase by exactly one entry"
        );
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Entries logged after the given id
    pub fn get_entries_since(&self, local_log_id: u64) -> Vec<LogEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.local_log_id > local_log_id)
            .cloned()
            .collect()
    }

    /// Entries not yet written out
    pub fn pending(&self) -> Vec<LogEntry> {
        self.get_entries_since(self.exported_through)
    }

    pub fn exported_through(&self) -> u64 {
        self.exported_through
    }

    /// Forget entries up to and including `local_log_id` once they are persisted
    pub fn release_through(&mut self, local_log_id: u64) {
        // --- Negative-space assertion: the export cursor only moves forward ---
        assert!(
            local_log_id >= self.exported_through && local_log_id < self.next_id,
            "Export cursor must move forward within logged ids"
        );
        let released = self.entries.partition_point(|entry| entry.local_log_id <= local_log_id);
        self.entries.drain(..released);
        self.exported_through = local_log_id;
    }
}

/// Append entries to `path` as NDJSON, one object per line.
pub fn append_logs(log: &[LogEntry], path: impl AsRef<Path>) -> QueueResult<()> {
    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;

    for entry in log {
        let json = serde_json::to_string(entry).map_err(std::io::Error::from)?;
        writeln!(file, "{}", json)?;
    }
    Ok(())
}
