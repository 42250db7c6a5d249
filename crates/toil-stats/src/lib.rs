//! Stats & Logging Aggregator: drains worker stats/log blobs from the Job
//! Store in the background (`spec.md` §4.6), grounded on `StatsAndLogging`
//! in `original_source/src/toil/leader.py`.

mod blob;
mod error;
mod manager;

pub use error::StatsAggregatorError;
pub use manager::{spawn, StatsAggregatorHandle};
