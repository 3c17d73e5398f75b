//! Data sources producing record batches
//!
//! Sources only shape fetched data into rows of scalar values. Deduplication,
//! validation and persistence happen in the pipeline.

mod csv_file;
pub mod nba_stats;

pub use csv_file::{read_batch, CsvSource};
