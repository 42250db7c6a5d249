//! Shared data model for the Leader control plane.
//!
//! Everything here is plain data: identifiers, resource requests, and the
//! persistent [`JobRecord`]. No subsystem-specific logic lives in this crate
//! so that `toil-job-store`, `toil-batch-system`, `toil-state`,
//! `toil-services`, and `toil-leader` can all depend on it without cycles.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies a [`JobRecord`] in the Job Store. Job stores mint opaque string
/// ids; the Leader never parses or constructs them itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<String> for JobId {
	fn from(s: String) -> Self {
		Self(s)
	}
}

impl From<&str> for JobId {
	fn from(s: &str) -> Self {
		Self(s.to_owned())
	}
}

/// Identifies a file-like artifact held by the Job Store: a start/terminate/
/// error flag for a service job, a worker log blob, or the shared
/// `rootJobReturnValue` file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub String);

impl fmt::Display for FileId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<String> for FileId {
	fn from(s: String) -> Self {
		Self(s)
	}
}

impl From<&str> for FileId {
	fn from(s: &str) -> Self {
		Self(s.to_owned())
	}
}

/// A service's start/terminate/error flags share the same file-id namespace
/// as any other Job Store artifact.
pub type FlagId = FileId;

/// The batch system's own handle for an issued command. Toil batch systems
/// hand out small integers; we keep that shape rather than inventing a UUID
/// scheme the reference implementation doesn't have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchJobId(pub u64);

impl fmt::Display for BatchJobId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// A resource request, carried on both jobs and the edges that schedule them
/// (a successor may ask for different resources than its predecessor).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequest {
	pub memory: u64,
	pub cores: u32,
	pub disk: u64,
	pub preemptable: bool,
}

impl ResourceRequest {
	#[must_use]
	pub const fn new(memory: u64, cores: u32, disk: u64, preemptable: bool) -> Self {
		Self {
			memory,
			cores,
			disk,
			preemptable,
		}
	}
}

/// One entry in a [`JobRecord::stack`] successor group: `(succID, resources,
/// predecessorID|null)`. `predecessor_id` is `Some` only for join nodes,
/// where it names which predecessor must be recorded in the successor's
/// `predecessors_finished` set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessorEdge {
	pub succ_id: JobId,
	pub resources: ResourceRequest,
	pub predecessor_id: Option<JobId>,
}

/// One entry in a [`JobRecord::services`] service group: `(serviceID,
/// resources, startFlagID, terminateFlagID, errorFlagID)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceEdge {
	pub service_id: JobId,
	pub resources: ResourceRequest,
	pub start_flag_id: FlagId,
	pub terminate_flag_id: FlagId,
	pub error_flag_id: FlagId,
}

/// A persistent node in the DAG, as held by the Job Store (`spec.md` §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
	pub id: JobId,

	/// `None` means "no work, just navigation".
	pub command: Option<Vec<u8>>,

	/// Snapshot of the original command, preserved so a failed subtree can
	/// restart from here instead of failing outright.
	pub checkpoint: Option<Vec<u8>>,

	/// Ordered successor groups; the last (topmost) group is scheduled next.
	pub stack: Vec<Vec<SuccessorEdge>>,

	/// Ordered service groups; brought up one group at a time, in order.
	pub services: Vec<Vec<ServiceEdge>>,

	/// Total predecessors this job must see finish before it is runnable.
	/// `1` for ordinary jobs, `>1` for join nodes.
	pub predecessor_number: u32,

	/// Predecessor ids that have already reported completion.
	pub predecessors_finished: HashSet<JobId>,

	pub remaining_retry_count: u32,

	pub resources: ResourceRequest,

	/// Pointer to a log blob emitted by a failed worker, if any.
	pub log_job_store_file_id: Option<FileId>,

	/// Populated only when this record is itself a service job.
	pub error_job_store_id: Option<FlagId>,
	pub start_job_store_id: Option<FlagId>,
	pub terminate_job_store_id: Option<FlagId>,
}

impl JobRecord {
	/// `spec.md` §4.1 "Runnable leaf test": a job with a command, a
	/// checkpoint, services to start, or nothing left on its stack is
	/// immediately runnable and must not be recursed into.
	#[must_use]
	pub fn is_runnable_leaf(&self) -> bool {
		self.command.is_some() || self.checkpoint.is_some() || !self.services.is_empty() || self.stack.is_empty()
	}

	/// The successor group the scheduler would issue next, if any.
	#[must_use]
	pub fn top_successor_group(&self) -> Option<&[SuccessorEdge]> {
		self.stack.last().map(Vec::as_slice)
	}

	#[must_use]
	pub fn has_services(&self) -> bool {
		!self.services.is_empty()
	}

	#[must_use]
	pub fn has_successors(&self) -> bool {
		!self.stack.is_empty() && self.stack.last().is_some_and(|g| !g.is_empty())
	}

	#[must_use]
	pub fn is_checkpoint(&self) -> bool {
		self.checkpoint.is_some()
	}

	/// `spec.md` §4.1: restart-from-checkpoint semantics, applied when a
	/// checkpoint job is (re)discovered as a runnable leaf.
	pub fn restore_checkpoint(&mut self) {
		if let Some(checkpoint) = self.checkpoint.clone() {
			self.command = Some(checkpoint);
		}
	}
}

/// The pair a job is enqueued with in `updatedJobs`: either it has never run
/// (`Fresh`) or it just finished with a batch-system exit code
/// (`Completed`). This is the "typed variant" called for in `spec.md` §9's
/// Design Notes, replacing the reference implementation's bare
/// `(jobWrapper, resultStatus)` tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
	Fresh,
	Completed(i32),
}

impl JobStatus {
	#[must_use]
	pub const fn exit_code(self) -> i32 {
		match self {
			Self::Fresh => 0,
			Self::Completed(code) => code,
		}
	}

	#[must_use]
	pub const fn failed(self) -> bool {
		matches!(self, Self::Completed(code) if code != 0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn empty_record(id: &str) -> JobRecord {
		JobRecord {
			id: id.into(),
			command: None,
			checkpoint: None,
			stack: vec![],
			services: vec![],
			predecessor_number: 1,
			predecessors_finished: HashSet::new(),
			remaining_retry_count: 1,
			resources: ResourceRequest::new(1, 1, 1, false),
			log_job_store_file_id: None,
			error_job_store_id: None,
			start_job_store_id: None,
			terminate_job_store_id: None,
		}
	}

	#[test]
	fn empty_stack_is_runnable_leaf() {
		assert!(empty_record("A").is_runnable_leaf());
	}

	#[test]
	fn internal_node_is_not_a_runnable_leaf() {
		let mut r = empty_record("R");
		r.stack.push(vec![SuccessorEdge {
			succ_id: "A".into(),
			resources: ResourceRequest::new(1, 1, 1, false),
			predecessor_id: None,
		}]);
		assert!(!r.is_runnable_leaf());
		assert!(r.has_successors());
	}

	#[test]
	fn checkpoint_restore_overwrites_command() {
		let mut r = empty_record("A");
		r.checkpoint = Some(b"orig-cmd".to_vec());
		r.restore_checkpoint();
		assert_eq!(r.command, Some(b"orig-cmd".to_vec()));
	}
}
