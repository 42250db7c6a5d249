use std::collections::{HashMap, HashSet, VecDeque};

use toil_types::{FlagId, JobId, JobRecord, JobStatus};

/// The three flag files a service job is tracked by once it has been handed
/// to the Service Manager (`spec.md` §3 `servicesIssued`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceFlags {
	pub start_flag_id: FlagId,
	pub terminate_flag_id: FlagId,
	pub error_flag_id: FlagId,
}

/// The Leader's in-memory DAG snapshot and mutable scheduling indices
/// (`spec.md` §3). Exclusively owned and mutated by the Leader main loop;
/// `toil-state` only centralizes the invariant-preserving operations on it.
#[derive(Debug, Default)]
pub struct ToilState {
	pub successor_to_predecessors: HashMap<JobId, Vec<JobRecord>>,
	pub successor_counts: HashMap<JobId, u32>,
	pub service_to_predecessor: HashMap<JobId, JobRecord>,
	pub services_issued: HashMap<JobId, HashMap<JobId, ServiceFlags>>,
	pub total_failed_jobs: HashSet<JobId>,
	pub has_failed_successors: HashSet<JobId>,
	pub failed_successors: HashSet<JobId>,
	pub join_pending: HashMap<JobId, JobRecord>,

	updated_jobs: VecDeque<(JobRecord, JobStatus)>,
	queued_job_ids: HashSet<JobId>,
}

impl ToilState {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Enqueues `(job, status)` into `updatedJobs`, a no-op if `job.id` is
	/// already queued for this drain (`spec.md` §3 invariant: "a job
	/// appears in `updatedJobs` at most once per iteration drain").
	pub fn enqueue_updated(&mut self, job: JobRecord, status: JobStatus) {
		if self.queued_job_ids.insert(job.id.clone()) {
			self.updated_jobs.push_back((job, status));
		}
	}

	#[must_use]
	pub fn updated_jobs_len(&self) -> usize {
		self.updated_jobs.len()
	}

	/// Snapshots and resets `updatedJobs` (`spec.md` §4.2 Step A: "drain
	/// updated jobs"). Entries added while draining are deferred to the
	/// next iteration because `queued_job_ids` is cleared up front.
	pub fn drain_updated(&mut self) -> Vec<(JobRecord, JobStatus)> {
		self.queued_job_ids.clear();
		self.updated_jobs.drain(..).collect()
	}

	/// Decrements `successor_counts[job_id]`, dropping the key once it
	/// reaches zero. Returns the new count (`0` if the key is now absent).
	pub fn decrement_successor_count(&mut self, job_id: &JobId) -> u32 {
		let Some(count) = self.successor_counts.get_mut(job_id) else {
			return 0;
		};
		*count -= 1;
		let remaining = *count;
		if remaining == 0 {
			self.successor_counts.remove(job_id);
		}
		remaining
	}

	#[must_use]
	pub fn has_pending_successors(&self, job_id: &JobId) -> bool {
		self.successor_counts.contains_key(job_id)
	}

	/// `spec.md` §3 invariant: on clean termination all scheduling indices
	/// are empty.
	#[must_use]
	pub fn indices_are_empty(&self) -> bool {
		self.updated_jobs.is_empty()
			&& self.successor_counts.is_empty()
			&& self.successor_to_predecessors.is_empty()
			&& self.service_to_predecessor.is_empty()
			&& self.services_issued.is_empty()
			&& self.join_pending.is_empty()
	}
}
