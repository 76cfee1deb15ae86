//! Report rows and output sinks.

pub mod rows;
pub mod sink;

pub use rows::{QueryHistoryRow, SlotRow, StorageRow};
pub use sink::CsvSink;
