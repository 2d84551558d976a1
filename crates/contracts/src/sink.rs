//! RecordSink trait - Dispatcher output interface
//!
//! File writers (track log, sensor log) implement this and are driven by a
//! worker task that owns them for the lifetime of a session.

use crate::ContractError;

/// Record output trait
#[trait_variant::make(RecordSink: Send)]
pub trait LocalRecordSink {
    /// Record type accepted by this sink
    type Record;

    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Write one record
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn write(&mut self, record: &Self::Record) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink. Must be safe to call more than once.
    async fn close(&mut self) -> Result<(), ContractError>;
}
