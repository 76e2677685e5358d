//! Bounded multi-producer log buffer
//!
//! Producers enqueue preformatted records; the single writer thread
//! drains them. The buffer is bounded both by record count and by
//! accounted bytes (`record length + LINE_OVERHEAD` each). Producers are
//! never blocked beyond the buffer mutex: overload is absorbed by
//! dropping the oldest records and injecting a human-readable marker
//! record, so operators can see the loss in the stream itself.
//!
//! Drops happen only inside `enqueue`; the writer never drops. The
//! `closed` / `closed_finished` flags of the shutdown handshake live
//! under the same mutex so the closer can wait on the buffer's condvar.

use std::collections::VecDeque;
use std::time::{Duration, Instant, SystemTime};

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};

use crate::clock::Clock;

/// Per-record memory overhead approximation added to the byte accounting
pub const LINE_OVERHEAD: u64 = 60;

/// Cap on a single condvar wait, so the closer thread's deadline is
/// observed promptly even though it never signals.
const MAX_POLL_WAIT: Duration = Duration::from_millis(500);

/// Outcome of one writer-side wait on the buffer
#[derive(Debug)]
pub enum WaitOutcome {
    /// A record was dequeued and its bytes un-accounted
    Record(Bytes),
    /// The flush window elapsed with nothing above the write threshold
    TimeoutFlush,
    /// Shutdown was requested and the queue is fully drained
    Closed,
}

struct BufferInner {
    queue: VecDeque<Bytes>,
    bytes: u64,
    max_bytes: u64,
    write_threshold: u64,
    closed: bool,
    closed_finished: bool,
}

impl BufferInner {
    fn cost(record: &Bytes) -> u64 {
        record.len() as u64 + LINE_OVERHEAD
    }

    fn push(&mut self, record: Bytes) {
        self.bytes += Self::cost(&record);
        self.queue.push_back(record);
    }

    fn pop(&mut self) -> Option<Bytes> {
        let record = self.queue.pop_front()?;
        self.bytes -= Self::cost(&record);
        Some(record)
    }

    fn overflow_marker(&self, chopped: u64) -> Bytes {
        Bytes::from(format!(
            "GRRR: ERROR: Logging too fast, chopped {} entries, {} bytes in memory\n",
            chopped, self.bytes
        ))
    }
}

/// Bounded ordered record queue with byte accounting
pub struct BoundedLogBuffer {
    inner: Mutex<BufferInner>,
    cond: Condvar,
    max_count: usize,
}

impl BoundedLogBuffer {
    pub fn new(max_count: usize, max_bytes: u64) -> Self {
        Self {
            inner: Mutex::new(BufferInner {
                queue: VecDeque::new(),
                bytes: 0,
                max_bytes,
                write_threshold: max_bytes / 4,
                closed: false,
                closed_finished: false,
            }),
            cond: Condvar::new(),
            max_count,
        }
    }

    /// Enqueue one record. Never blocks beyond the buffer mutex and
    /// never fails: overload drops the oldest records instead.
    pub fn enqueue(&self, record: impl Into<Bytes>) {
        let record = record.into();
        let mut inner = self.inner.lock();
        let was_empty = inner.queue.is_empty();

        if inner.queue.len() < self.max_count {
            inner.push(record);
        } else {
            // Count saturation: drop the two oldest to make room for the
            // marker plus the new record. Pushes that still do not fit
            // drop silently; only successful pushes are accounted.
            inner.pop();
            inner.pop();
            let marker = inner.overflow_marker(2);
            if inner.queue.len() < self.max_count {
                inner.push(marker);
            }
            if inner.queue.len() < self.max_count {
                inner.push(record);
            }
        }

        // Byte saturation, independent of count: evict down to 90% of
        // both limits, then report how many records were lost. The
        // newest record is never evicted, so a single oversized record
        // ends up alone with its marker.
        if inner.bytes > inner.max_bytes {
            let mut chopped = 0u64;
            while inner.queue.len() > 1
                && (inner.queue.len() as u64 * 10 > self.max_count as u64 * 9
                    || inner.bytes.saturating_mul(10) > inner.max_bytes.saturating_mul(9))
            {
                inner.pop();
                chopped += 1;
            }
            if chopped > 0 {
                let marker = inner.overflow_marker(chopped);
                if inner.queue.len() < self.max_count {
                    inner.push(marker);
                } else {
                    // One retry after evicting a single record
                    inner.pop();
                    if inner.queue.len() < self.max_count {
                        inner.push(marker);
                    }
                }
            }
        }

        if was_empty {
            self.cond.notify_all();
        }
    }

    /// Dequeue one record for the writer, un-accounting its bytes
    pub fn drain(&self) -> Option<Bytes> {
        self.inner.lock().pop()
    }

    /// Currently accounted bytes
    pub fn bytes(&self) -> u64 {
        self.inner.lock().bytes
    }

    /// Number of buffered records
    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Update the byte bound; the write threshold follows at a quarter
    pub fn set_max_bytes(&self, max_bytes: u64) {
        let mut inner = self.inner.lock();
        inner.max_bytes = max_bytes;
        inner.write_threshold = max_bytes / 4;
    }

    /// Request shutdown; idempotent, non-blocking
    pub fn close(&self) {
        self.inner.lock().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Writer-side wait: dequeue one record, or report that the flush
    /// window elapsed, or report shutdown once the queue is drained.
    ///
    /// Writes are deferred until either the accounted bytes pass the
    /// write threshold or `flush_delay` elapses from the first pending
    /// byte, so the gzip stream sees sizeable blocks while latency stays
    /// bounded. `waiting_since` carries the pending-flush window start
    /// across calls. Individual condvar waits are capped at 500 ms so a
    /// concurrently set `closed` flag is noticed promptly.
    pub fn await_record(
        &self,
        clock: &dyn Clock,
        flush_delay: Duration,
        waiting_since: &mut Option<SystemTime>,
    ) -> WaitOutcome {
        let mut inner = self.inner.lock();
        let mut now = clock.now();
        let mut max_wait: Option<SystemTime> = waiting_since.map(|t| t + flush_delay);

        let mut record = inner.pop();
        while record.is_none() {
            if inner.closed {
                return WaitOutcome::Closed;
            }
            let before_deadline = max_wait.map_or(true, |mw| now < mw);
            if before_deadline {
                let timeout = max_wait
                    .and_then(|mw| mw.duration_since(now).ok())
                    .map_or(MAX_POLL_WAIT, |d| d.min(MAX_POLL_WAIT));
                self.cond.wait_for(&mut inner, timeout);
                now = clock.now();
                if inner.bytes < inner.write_threshold {
                    // Below the threshold the wait is purely time-gated:
                    // arm the flush window at the first pending byte and
                    // keep accumulating, unless we are shutting down.
                    if inner.bytes != 0 && max_wait.is_none() {
                        max_wait = Some(now + flush_delay);
                    }
                    if inner.closed {
                        record = inner.pop();
                    } else if max_wait.is_some() {
                        continue;
                    }
                } else {
                    record = inner.pop();
                }
            }
            if record.is_none() {
                if waiting_since.is_none() {
                    *waiting_since = Some(now);
                    max_wait = Some(now + flush_delay);
                }
                if let Some(mw) = max_wait {
                    if now >= mw {
                        *waiting_since = None;
                        return WaitOutcome::TimeoutFlush;
                    }
                }
            } else {
                break;
            }
        }
        match record {
            Some(r) => WaitOutcome::Record(r),
            None => WaitOutcome::Closed,
        }
    }

    /// Writer-side: the shutdown flush completed and the sinks are
    /// closed; wake the closer.
    pub fn mark_closed_finished(&self) {
        let mut inner = self.inner.lock();
        inner.closed_finished = true;
        self.cond.notify_all();
    }

    /// Closer-side handshake: request shutdown and wait up to `timeout`
    /// for the writer to drain and close. Returns whether the drain
    /// completed within the deadline.
    pub fn close_and_wait(&self, timeout: Duration) -> bool {
        let mut inner = self.inner.lock();
        inner.closed = true;
        let deadline = Instant::now() + timeout;
        while !inner.closed_finished {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            self.cond.wait_for(&mut inner, remaining);
        }
        true
    }

    pub fn closed_finished(&self) -> bool {
        self.inner.lock().closed_finished
    }
}
