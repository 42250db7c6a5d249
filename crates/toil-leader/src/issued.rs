use std::collections::HashMap;
use std::sync::Arc;

use toil_batch_system::BatchSystem;
use toil_types::{BatchJobId, JobId, ResourceRequest};

use crate::error::LeaderError;

struct Issued {
	job_id: JobId,
	preemptable: bool,
}

/// Tracks jobs currently handed to the Batch System
/// (`jobBatchSystemIDToIssuedJob` in `original_source/src/toil/leader.py`).
pub struct IssuedJobs {
	batch_system: Arc<dyn BatchSystem>,
	by_bs_id: HashMap<BatchJobId, Issued>,
	preemptable_count: usize,
}

impl IssuedJobs {
	pub fn new(batch_system: Arc<dyn BatchSystem>) -> Self {
		Self {
			batch_system,
			by_bs_id: HashMap::new(),
			preemptable_count: 0,
		}
	}

	pub async fn issue(
		&mut self,
		job_id: JobId,
		resources: ResourceRequest,
		command: String,
	) -> Result<BatchJobId, LeaderError> {
		let bs_id = self.batch_system.issue_batch_job(command, resources).await?;
		if resources.preemptable {
			self.preemptable_count += 1;
		}
		self.by_bs_id.insert(
			bs_id,
			Issued {
				job_id,
				preemptable: resources.preemptable,
			},
		);
		Ok(bs_id)
	}

	pub fn remove(&mut self, bs_id: BatchJobId) -> Option<JobId> {
		let issued = self.by_bs_id.remove(&bs_id)?;
		if issued.preemptable {
			self.preemptable_count -= 1;
		}
		Some(issued.job_id)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.by_bs_id.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.by_bs_id.is_empty()
	}

	#[must_use]
	pub fn preemptable_count(&self) -> usize {
		self.preemptable_count
	}

	pub fn ids(&self) -> impl Iterator<Item = BatchJobId> + '_ {
		self.by_bs_id.keys().copied()
	}

	/// `spec.md` §4.5 `killJobs`: instructs the Batch System to kill the
	/// given ids. Does not itself synthesize completion events; callers run
	/// `processFinishedJob(id, 1)` for each afterward.
	pub async fn kill(&self, ids: &[BatchJobId]) -> Result<(), LeaderError> {
		if ids.is_empty() {
			return Ok(());
		}
		self.batch_system.kill_batch_jobs(ids).await?;
		Ok(())
	}
}
