//! ToilState: the Leader's in-memory DAG snapshot and scheduling indices
//! (`spec.md` §3, §4.1).

mod error;
mod reconstruct;
mod state;

pub use error::ToilStateError;
pub use reconstruct::build_toil_state;
pub use state::{ServiceFlags, ToilState};

#[cfg(test)]
mod tests {
	use std::collections::HashMap;
	use std::sync::Mutex;

	use async_trait::async_trait;
	use toil_job_store::{JobStore, JobStoreError, StatsCallback};
	use toil_types::{FileId, JobId, JobRecord, JobStatus, ResourceRequest, SuccessorEdge};

	use super::*;

	struct FixtureStore {
		jobs: Mutex<HashMap<JobId, JobRecord>>,
	}

	impl FixtureStore {
		fn new(jobs: Vec<JobRecord>) -> Self {
			Self {
				jobs: Mutex::new(jobs.into_iter().map(|j| (j.id.clone(), j)).collect()),
			}
		}
	}

	#[async_trait]
	impl JobStore for FixtureStore {
		async fn load(&self, id: &JobId) -> Result<JobRecord, JobStoreError> {
			self.jobs
				.lock()
				.unwrap()
				.get(id)
				.cloned()
				.ok_or_else(|| JobStoreError::NoSuchJob(id.clone()))
		}

		async fn update(&self, record: &JobRecord) -> Result<(), JobStoreError> {
			self.jobs
				.lock()
				.unwrap()
				.insert(record.id.clone(), record.clone());
			Ok(())
		}

		async fn exists(&self, id: &JobId) -> bool {
			self.jobs.lock().unwrap().contains_key(id)
		}

		async fn delete(&self, id: &JobId) -> Result<(), JobStoreError> {
			self.jobs.lock().unwrap().remove(id);
			Ok(())
		}

		async fn file_exists(&self, _file_id: &FileId) -> bool {
			false
		}

		async fn delete_file(&self, _file_id: &FileId) -> Result<(), JobStoreError> {
			Ok(())
		}

		async fn write_file(&self, _file_id: &FileId, _contents: &[u8]) -> Result<(), JobStoreError> {
			Ok(())
		}

		async fn read_file(&self, file_id: &FileId) -> Result<Vec<u8>, JobStoreError> {
			Err(JobStoreError::NoSuchFile(file_id.clone()))
		}

		async fn read_stats_and_logging(
			&self,
			_callback: &mut StatsCallback<'_>,
		) -> Result<usize, JobStoreError> {
			Ok(0)
		}

		async fn write_stats_and_logging(&self, _text: &str) -> Result<(), JobStoreError> {
			Ok(())
		}
	}

	fn leaf(id: &str) -> JobRecord {
		JobRecord {
			id: id.into(),
			command: Some(format!("run-{id}").into_bytes()),
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

	fn internal(id: &str, succs: Vec<SuccessorEdge>) -> JobRecord {
		let mut r = leaf(id);
		r.command = None;
		r.stack = vec![succs];
		r
	}

	fn edge(succ_id: &str, pred_id: Option<&str>) -> SuccessorEdge {
		SuccessorEdge {
			succ_id: succ_id.into(),
			resources: ResourceRequest::new(1, 1, 1, false),
			predecessor_id: pred_id.map(Into::into),
		}
	}

	fn join(id: &str, n: u32) -> JobRecord {
		let mut r = leaf(id);
		r.predecessor_number = n;
		r
	}

	/// S1 — linear chain: `R -> A`, `A` is a plain command leaf.
	#[tokio::test]
	async fn linear_chain_builds_single_runnable_leaf() {
		let root = internal("R", vec![edge("A", None)]);
		let a = leaf("A");
		let store = FixtureStore::new(vec![root, a]);

		let mut state = build_toil_state(&store, &"R".into(), None).await.unwrap();

		let drained = state.drain_updated();
		assert_eq!(drained.len(), 1);
		assert_eq!(drained[0].0.id, "A".into());
		assert_eq!(drained[0].1, JobStatus::Fresh);
		assert_eq!(state.successor_counts.get(&JobId::from("R")), Some(&1));
	}

	/// S2 — diamond join: `R -> {A, B}`, both `-> C` with `predecessorNumber=2`.
	/// `C` must not be runnable until both predecessors are recorded.
	#[tokio::test]
	async fn diamond_join_waits_for_both_predecessors() {
		let root = internal("R", vec![edge("A", None), edge("B", None)]);
		let a = internal("A", vec![edge("C", Some("A"))]);
		let b = internal("B", vec![edge("C", Some("B"))]);
		let c = join("C", 2);
		let store = FixtureStore::new(vec![root, a, b, c]);

		let mut state = build_toil_state(&store, &"R".into(), None).await.unwrap();

		// Both A and B schedule C as their sole successor; once both have
		// reported, C is runnable and A/B's successor counts are satisfied
		// by C never needing to be "caught" mid-join.
		assert!(state.join_pending.is_empty());
		let drained = state.drain_updated();
		assert!(drained.iter().any(|(job, _)| job.id == "C".into()));
		assert_eq!(
			state
				.successor_to_predecessors
				.get(&JobId::from("C"))
				.map(Vec::len),
			Some(2)
		);
	}

	#[tokio::test]
	async fn checkpoint_leaf_restores_command() {
		let mut a = leaf("A");
		a.command = None;
		a.checkpoint = Some(b"orig".to_vec());
		let root = internal("R", vec![edge("A", None)]);
		let store = FixtureStore::new(vec![root, a]);

		let mut state = build_toil_state(&store, &"R".into(), None).await.unwrap();
		let drained = state.drain_updated();
		assert_eq!(drained[0].0.command, Some(b"orig".to_vec()));
	}
}
