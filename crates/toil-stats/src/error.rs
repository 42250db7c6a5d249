use thiserror::Error;
use toil_job_store::JobStoreError;

#[derive(Debug, Error)]
pub enum StatsAggregatorError {
	#[error("stats aggregator worker has already exited")]
	WorkerGone,

	#[error("stats aggregator worker has died")]
	WorkerDied,

	#[error("stats aggregator worker panicked: {0}")]
	WorkerPanicked(String),

	#[error(transparent)]
	JobStore(#[from] JobStoreError),
}
