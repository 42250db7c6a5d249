use thiserror::Error;
use toil_job_store::JobStoreError;
use toil_types::JobId;

#[derive(Debug, Error)]
pub enum ToilStateError {
	#[error("job store error while reconstructing DAG: {0}")]
	JobStore(#[from] JobStoreError),

	#[error("join node '{0}' was processed before it was recorded in join_pending")]
	JoinNotPending(JobId),
}
