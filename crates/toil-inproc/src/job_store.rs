use std::path::PathBuf;

use async_trait::async_trait;
use toil_job_store::{JobStore, JobStoreError, StatsCallback};
use toil_types::{FileId, JobId, JobRecord};

/// Maps an opaque id to a path component. Ids are minted by this store or by
/// `toil-leader`'s callers, never taken verbatim from a worker process, but
/// we still refuse path separators the way `validate_instance_name` does for
/// CLI-supplied instance names (`apps/cli/src/main.rs`).
fn sanitize(raw: &str) -> Result<String, JobStoreError> {
	if raw.is_empty() || raw.contains(['/', '\\', '\0']) {
		return Err(JobStoreError::Io(std::io::Error::new(
			std::io::ErrorKind::InvalidInput,
			format!("unsafe id: {raw:?}"),
		)));
	}
	Ok(raw.to_owned())
}

/// A directory-backed [`JobStore`]: one JSON file per job record under
/// `jobs/`, raw blobs under `files/`, and one file per pending stats/logging
/// blob under `stats/` — the layout a Toil `FileJobStore` uses, minus the
/// content-addressed file IDs the real backend mints for itself.
pub struct FileJobStore {
	root: PathBuf,
}

impl FileJobStore {
	pub async fn open(root: impl Into<PathBuf>) -> Result<Self, JobStoreError> {
		let root = root.into();
		for sub in ["jobs", "files", "stats"] {
			tokio::fs::create_dir_all(root.join(sub)).await?;
		}
		Ok(Self { root })
	}

	fn job_path(&self, id: &JobId) -> Result<PathBuf, JobStoreError> {
		Ok(self.root.join("jobs").join(format!("{}.json", sanitize(&id.0)?)))
	}

	fn file_path(&self, id: &FileId) -> Result<PathBuf, JobStoreError> {
		Ok(self.root.join("files").join(sanitize(&id.0)?))
	}

	fn stats_dir(&self) -> PathBuf {
		self.root.join("stats")
	}

	/// Creates or overwrites a job record, bypassing the "must already
	/// exist" assumption `update` carries for callers that reload before
	/// writing. Used by the demo binary to seed a run's DAG.
	pub async fn put(&self, record: &JobRecord) -> Result<(), JobStoreError> {
		self.update(record).await
	}

	/// Appends one stats/logging blob, as a worker would on exit
	/// (`spec.md` §6 "Stats & logging").
	pub async fn push_stats_and_logging(&self, blob: &[u8]) -> Result<(), JobStoreError> {
		let name = format!("{}.blob", uuid::Uuid::new_v4());
		tokio::fs::write(self.root.join("stats").join(name), blob).await?;
		Ok(())
	}
}

#[async_trait]
impl JobStore for FileJobStore {
	async fn load(&self, id: &JobId) -> Result<JobRecord, JobStoreError> {
		let path = self.job_path(id)?;
		let bytes = tokio::fs::read(&path)
			.await
			.map_err(|_| JobStoreError::NoSuchJob(id.clone()))?;
		Ok(serde_json::from_slice(&bytes)?)
	}

	async fn update(&self, record: &JobRecord) -> Result<(), JobStoreError> {
		let path = self.job_path(&record.id)?;
		let bytes = serde_json::to_vec(record)?;
		tokio::fs::write(path, bytes).await?;
		Ok(())
	}

	async fn exists(&self, id: &JobId) -> bool {
		match self.job_path(id) {
			Ok(path) => tokio::fs::metadata(path).await.is_ok(),
			Err(_) => false,
		}
	}

	async fn delete(&self, id: &JobId) -> Result<(), JobStoreError> {
		let path = self.job_path(id)?;
		match tokio::fs::remove_file(path).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(e.into()),
		}
	}

	async fn file_exists(&self, file_id: &FileId) -> bool {
		match self.file_path(file_id) {
			Ok(path) => tokio::fs::metadata(path).await.is_ok(),
			Err(_) => false,
		}
	}

	async fn delete_file(&self, file_id: &FileId) -> Result<(), JobStoreError> {
		let path = self.file_path(file_id)?;
		match tokio::fs::remove_file(path).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(e.into()),
		}
	}

	async fn write_file(&self, file_id: &FileId, contents: &[u8]) -> Result<(), JobStoreError> {
		let path = self.file_path(file_id)?;
		tokio::fs::write(path, contents).await?;
		Ok(())
	}

	async fn read_file(&self, file_id: &FileId) -> Result<Vec<u8>, JobStoreError> {
		let path = self.file_path(file_id)?;
		tokio::fs::read(path)
			.await
			.map_err(|_| JobStoreError::NoSuchFile(file_id.clone()))
	}

	async fn read_stats_and_logging(
		&self,
		callback: &mut StatsCallback<'_>,
	) -> Result<usize, JobStoreError> {
		let mut count = 0;
		let mut entries = tokio::fs::read_dir(self.stats_dir()).await?;
		while let Some(entry) = entries.next_entry().await? {
			let path = entry.path();
			let bytes = tokio::fs::read(&path).await?;
			callback(&bytes);
			tokio::fs::remove_file(&path).await?;
			count += 1;
		}
		Ok(count)
	}

	async fn write_stats_and_logging(&self, text: &str) -> Result<(), JobStoreError> {
		tokio::fs::write(self.root.join("stats-summary.json"), text).await?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use toil_types::ResourceRequest;

	use super::*;

	fn record(id: &str) -> JobRecord {
		JobRecord {
			id: id.into(),
			command: Some(b"x".to_vec()),
			checkpoint: None,
			stack: vec![],
			services: vec![],
			predecessor_number: 1,
			predecessors_finished: Default::default(),
			remaining_retry_count: 1,
			resources: ResourceRequest::new(1, 1, 1, false),
			log_job_store_file_id: None,
			error_job_store_id: None,
			start_job_store_id: None,
			terminate_job_store_id: None,
		}
	}

	#[tokio::test]
	async fn round_trips_a_job_record() {
		let dir = tempfile::tempdir().unwrap();
		let store = FileJobStore::open(dir.path()).await.unwrap();

		let id: JobId = "A".into();
		assert!(!store.exists(&id).await);

		store.put(&record("A")).await.unwrap();
		assert!(store.exists(&id).await);

		let loaded = store.load(&id).await.unwrap();
		assert_eq!(loaded.id, id);

		store.delete(&id).await.unwrap();
		assert!(!store.exists(&id).await);
		assert!(matches!(
			store.load(&id).await,
			Err(JobStoreError::NoSuchJob(_))
		));
	}

	#[tokio::test]
	async fn files_round_trip() {
		let dir = tempfile::tempdir().unwrap();
		let store = FileJobStore::open(dir.path()).await.unwrap();
		let file_id: FileId = "start-flag".into();

		assert!(!store.file_exists(&file_id).await);
		store.write_file(&file_id, b"hello").await.unwrap();
		assert!(store.file_exists(&file_id).await);
		assert_eq!(store.read_file(&file_id).await.unwrap(), b"hello");

		store.delete_file(&file_id).await.unwrap();
		assert!(!store.file_exists(&file_id).await);
	}

	#[tokio::test]
	async fn stats_blobs_are_drained_once() {
		let dir = tempfile::tempdir().unwrap();
		let store = FileJobStore::open(dir.path()).await.unwrap();

		store.push_stats_and_logging(b"{\"total_time\":1.0}").await.unwrap();
		store.push_stats_and_logging(b"{\"total_time\":2.0}").await.unwrap();

		let mut seen = Vec::new();
		let mut callback = |blob: &[u8]| seen.push(blob.to_vec());
		let count = store.read_stats_and_logging(&mut callback).await.unwrap();
		assert_eq!(count, 2);
		assert_eq!(seen.len(), 2);

		let mut empty = |_: &[u8]| panic!("nothing left to drain");
		assert_eq!(store.read_stats_and_logging(&mut empty).await.unwrap(), 0);
	}

	#[tokio::test]
	async fn rejects_ids_containing_path_separators() {
		let dir = tempfile::tempdir().unwrap();
		let store = FileJobStore::open(dir.path()).await.unwrap();
		let id: JobId = "../escape".into();
		assert!(matches!(store.load(&id).await, Err(JobStoreError::Io(_))));
	}
}
