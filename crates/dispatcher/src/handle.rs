//! SinkHandle - owns one record sink behind a bounded queue and a worker task
//!
//! Producers (serial reader threads, listener callbacks) never wait on file
//! I/O: `try_send` either queues the record or drops it and counts the drop.

use std::sync::Arc;

use contracts::RecordSink;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use crate::error::{DispatcherError, Result};
use crate::metrics::{SinkCounters, SinkStats};

/// Handle to a running sink worker
pub struct SinkHandle<S: RecordSink> {
    name: String,
    tx: mpsc::Sender<S::Record>,
    counters: Arc<SinkCounters>,
    /// The worker hands the sink back once the queue is drained
    worker_handle: JoinHandle<S>,
}

impl<S> SinkHandle<S>
where
    S: RecordSink + 'static,
    S::Record: Send + Sync + 'static,
{
    /// Spawn the worker task on the current tokio runtime
    pub fn spawn(sink: S, queue_capacity: usize) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let counters = Arc::new(SinkCounters::new());

        let worker_counters = Arc::clone(&counters);
        let worker_name = name.clone();
        let worker_handle =
            tokio::spawn(async move { sink_worker(sink, rx, worker_counters, worker_name).await });

        Self {
            name,
            tx,
            counters,
            worker_handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> SinkStats {
        self.counters.snapshot()
    }

    /// Queue a record without blocking
    ///
    /// Returns false when the record was dropped.
    pub fn try_send(&self, record: S::Record) -> bool {
        match self.tx.try_send(record) {
            Ok(()) => {
                let depth = self.tx.max_capacity() - self.tx.capacity();
                self.counters.observe_depth(depth);
                observability::record_sink_queue_depth(&self.name, depth);
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.counters.on_dropped();
                observability::record_record_dispatched(&self.name, false);
                warn!(sink = %self.name, dropped, "Queue full, record dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!(sink = %self.name, "Sink worker closed unexpectedly");
                false
            }
        }
    }

    /// Cloneable producer side, for listener closures
    pub fn sender(&self) -> SinkSender<S::Record> {
        SinkSender {
            name: self.name.clone(),
            tx: self.tx.clone(),
            counters: Arc::clone(&self.counters),
        }
    }

    /// Drain the queue, flush and close the sink, and hand it back
    ///
    /// Outstanding [`SinkSender`]s must be dropped first, otherwise the worker
    /// keeps waiting for records.
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(self) -> Result<S> {
        drop(self.tx);
        match self.worker_handle.await {
            Ok(sink) => {
                debug!(
                    sink = %self.name,
                    stats = %self.counters.snapshot(),
                    "SinkHandle shutdown complete"
                );
                Ok(sink)
            }
            Err(e) => {
                error!(sink = %self.name, error = ?e, "Worker task panicked");
                Err(DispatcherError::sink_worker(&self.name, e.to_string()))
            }
        }
    }
}

/// Producer side of a [`SinkHandle`]
pub struct SinkSender<R> {
    name: String,
    tx: mpsc::Sender<R>,
    counters: Arc<SinkCounters>,
}

impl<R> Clone for SinkSender<R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            tx: self.tx.clone(),
            counters: Arc::clone(&self.counters),
        }
    }
}

impl<R> SinkSender<R> {
    /// Same semantics as [`SinkHandle::try_send`]
    pub fn try_send(&self, record: R) -> bool {
        match self.tx.try_send(record) {
            Ok(()) => {
                self.counters
                    .observe_depth(self.tx.max_capacity() - self.tx.capacity());
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.counters.on_dropped();
                observability::record_record_dispatched(&self.name, false);
                warn!(sink = %self.name, dropped, "Queue full, record dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

/// Worker task that consumes records and writes them to the sink
#[instrument(
    name = "sink_worker_loop",
    skip(sink, rx, counters),
    fields(sink = %name)
)]
async fn sink_worker<S: RecordSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<S::Record>,
    counters: Arc<SinkCounters>,
    name: String,
) -> S {
    debug!(sink = %name, "Sink worker started");

    while let Some(record) = rx.recv().await {
        counters.observe_depth(rx.len());

        match sink.write(&record).await {
            Ok(()) => {
                counters.on_written();
                observability::record_record_dispatched(&name, true);
            }
            Err(e) => {
                counters.on_failed();
                observability::record_record_dispatched(&name, false);
                error!(sink = %name, error = %e, "Write failed");
            }
        }
    }

    if let Err(e) = sink.flush().await {
        error!(sink = %name, error = %e, "Flush failed on shutdown");
    }
    if let Err(e) = sink.close().await {
        error!(sink = %name, error = %e, "Close failed on shutdown");
    }

    debug!(sink = %name, stats = %counters.snapshot(), "Sink worker stopped");
    sink
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::ContractError;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::time::{sleep, Duration};

    /// Mock sink for testing
    struct MockSink {
        name: String,
        write_count: Arc<AtomicU64>,
        closed: bool,
        should_fail: bool,
        delay_ms: u64,
    }

    impl MockSink {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                write_count: Arc::new(AtomicU64::new(0)),
                closed: false,
                should_fail: false,
                delay_ms: 0,
            }
        }
    }

    impl RecordSink for MockSink {
        type Record = u64;

        fn name(&self) -> &str {
            &self.name
        }

        async fn write(&mut self, _record: &u64) -> std::result::Result<(), ContractError> {
            if self.delay_ms > 0 {
                sleep(Duration::from_millis(self.delay_ms)).await;
            }
            if self.should_fail {
                return Err(ContractError::sink_write(&self.name, "mock failure"));
            }
            self.write_count.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        async fn flush(&mut self) -> std::result::Result<(), ContractError> {
            Ok(())
        }

        async fn close(&mut self) -> std::result::Result<(), ContractError> {
            self.closed = true;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_sink_handle_basic() {
        let handle = SinkHandle::spawn(MockSink::new("test"), 10);

        for i in 0..5 {
            assert!(handle.try_send(i));
        }

        let sink = handle.shutdown().await.unwrap();
        assert_eq!(sink.write_count.load(Ordering::Relaxed), 5);
        assert!(sink.closed);
    }

    #[tokio::test]
    async fn test_sink_handle_queue_full() {
        let mut sink = MockSink::new("slow");
        sink.delay_ms = 100;
        let handle = SinkHandle::spawn(sink, 2);

        for i in 0..10 {
            handle.try_send(i);
        }

        assert!(handle.stats().dropped > 0);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_sink_handle_failure_isolation() {
        let mut sink = MockSink::new("failing");
        sink.should_fail = true;
        let handle = SinkHandle::spawn(sink, 10);

        for i in 0..3 {
            handle.try_send(i);
        }

        sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.stats().failed, 3);

        // A failing sink is still closed on shutdown
        let sink = handle.shutdown().await.unwrap();
        assert!(sink.closed);
    }

    #[tokio::test]
    async fn test_sender_from_other_thread() {
        let handle = SinkHandle::spawn(MockSink::new("threaded"), 100);
        let sender = handle.sender();

        std::thread::spawn(move || {
            for i in 0..20 {
                assert!(sender.try_send(i));
            }
        })
        .join()
        .unwrap();

        let sink = handle.shutdown().await.unwrap();
        assert_eq!(sink.write_count.load(Ordering::Relaxed), 20);
    }
}
