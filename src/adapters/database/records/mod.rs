pub mod job;

pub use job::{BulkJobRow, HistoryRow};
