//! The Job Store external interface (`spec.md` §6).
//!
//! The core never assumes a particular backend; it only calls through this
//! trait. A durable key/value + file store implementation lives outside this
//! workspace (an external collaborator); `toil-inproc` provides a reference
//! in-process implementation used by tests and the demo binary.

use async_trait::async_trait;
use thiserror::Error;
use toil_types::{FileId, JobId, JobRecord};

/// The well-known file the worker writes the root job's serialized return
/// value to on completion (`spec.md` §6 "Persisted state").
pub const ROOT_RETURN_VALUE_FILE: &str = "rootJobReturnValue";

#[derive(Debug, Error)]
pub enum JobStoreError {
	#[error("no such job: <id='{0}'>")]
	NoSuchJob(JobId),

	#[error("no such file: <id='{0}'>")]
	NoSuchFile(FileId),

	/// Some backends return a stale "exists" listing for a job whose record
	/// can no longer be loaded (`spec.md` §7 "Ghost job"). Callers treat
	/// this the same as the job having been successfully removed.
	#[error("stale listing for job that no longer loads: <id='{0}'>")]
	GhostJob(JobId),

	#[error("job store I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("job store serialization error: {0}")]
	Serde(#[from] serde_json::Error),
}

/// Invoked once per pending stats/logging blob by
/// [`JobStore::read_stats_and_logging`].
pub type StatsCallback<'a> = dyn FnMut(&[u8]) + Send + 'a;

#[async_trait]
pub trait JobStore: Send + Sync {
	async fn load(&self, id: &JobId) -> Result<JobRecord, JobStoreError>;

	async fn update(&self, record: &JobRecord) -> Result<(), JobStoreError>;

	async fn exists(&self, id: &JobId) -> bool;

	async fn delete(&self, id: &JobId) -> Result<(), JobStoreError>;

	async fn file_exists(&self, file_id: &FileId) -> bool;

	async fn delete_file(&self, file_id: &FileId) -> Result<(), JobStoreError>;

	async fn write_file(&self, file_id: &FileId, contents: &[u8]) -> Result<(), JobStoreError>;

	async fn read_file(&self, file_id: &FileId) -> Result<Vec<u8>, JobStoreError>;

	/// Invokes `callback` once per pending stats/logging blob, returning the
	/// number of blobs processed.
	async fn read_stats_and_logging(
		&self,
		callback: &mut StatsCallback<'_>,
	) -> Result<usize, JobStoreError>;

	/// Finalization write performed by the Stats Aggregator on shutdown.
	async fn write_stats_and_logging(&self, text: &str) -> Result<(), JobStoreError>;
}
