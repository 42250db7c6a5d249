use thiserror::Error;
use toil_job_store::JobStoreError;

#[derive(Debug, Error)]
pub enum ServiceManagerError {
	#[error("service manager worker has already exited")]
	WorkerGone,

	#[error("service manager worker has died")]
	WorkerDied,

	#[error("service manager worker panicked: {0}")]
	WorkerPanicked(String),

	#[error(transparent)]
	JobStore(#[from] JobStoreError),
}
