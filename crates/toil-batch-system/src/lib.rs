//! The Batch System external interface (`spec.md` §6).
//!
//! Assumed **not** thread-safe by the callers in this workspace (`spec.md`
//! §5): only the Leader issues and kills jobs against a given instance.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use toil_types::{BatchJobId, ResourceRequest};

#[derive(Debug, Error)]
pub enum BatchSystemError {
	#[error("batch system rejected job submission: {0}")]
	Submit(String),

	#[error("batch system failed to kill jobs: {0}")]
	Kill(String),

	#[error("batch system backend unavailable: {0}")]
	Unavailable(String),
}

/// One `getUpdatedBatchJob` result: a finished job's batch id, exit code,
/// and (if the backend tracks it) wall-clock run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdatedBatchJob {
	pub bs_id: BatchJobId,
	pub exit_code: i32,
	pub wall_time: Option<Duration>,
}

#[async_trait]
pub trait BatchSystem: Send + Sync {
	/// Submits `command` (the worker invocation line, `spec.md` §6) with the
	/// given resource request, returning the backend's handle for it.
	async fn issue_batch_job(
		&self,
		command: String,
		resources: ResourceRequest,
	) -> Result<BatchJobId, BatchSystemError>;

	async fn kill_batch_jobs(&self, ids: &[BatchJobId]) -> Result<(), BatchSystemError>;

	async fn get_issued_batch_job_ids(&self) -> Vec<BatchJobId>;

	/// Running jobs and how long (wall-clock) each has been running.
	async fn get_running_batch_job_ids(&self) -> HashMap<BatchJobId, Duration>;

	/// Blocks up to `timeout` for one completion event, or returns `None` on
	/// timeout. The Leader's only suspension point (`spec.md` §5).
	async fn get_updated_batch_job(
		&self,
		timeout: Duration,
	) -> Result<Option<UpdatedBatchJob>, BatchSystemError>;

	async fn shutdown(&self) -> Result<(), BatchSystemError>;
}
