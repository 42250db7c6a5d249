use std::time::Duration;

use toil_types::ResourceRequest;

/// Scheduling parameters for a single run (`spec.md` §4.2, §4.5). `leaderd`
/// builds this from its own CLI/env configuration layer; this crate has no
/// opinion on how values are sourced.
#[derive(Debug, Clone)]
pub struct LeaderConfig {
	/// The worker entry point, prefixed onto every issued command
	/// (`spec.md` §6 "Worker command").
	pub worker_entry: String,

	/// Opaque locator the Job Store was constructed from; carried in a
	/// [`crate::FailedJobsReport`] the way the reference implementation's
	/// `FailedJobsException` carries `jobStoreLocator`.
	pub job_store_locator: String,

	/// How long to block per iteration on `BatchSystem::get_updated_batch_job`
	/// (`spec.md` §5 "Suspension / blocking points").
	pub batch_poll_timeout: Duration,

	/// Rescue passes run at most this often (`spec.md` §4.2 Step D).
	pub rescue_jobs_frequency: Duration,

	/// `spec.md` §4.5 `reissueOverLongJobs`: running jobs older than this are
	/// killed. A value `>= 10_000_000s` suppresses the check entirely.
	pub max_job_duration: Duration,

	/// `spec.md` §4.5 `reissueMissingJobs`: consecutive absences from the
	/// Batch System's issued list before a job is killed.
	pub kill_after_n_missing: u32,

	/// Resources used for the "empty cleanup" reissue path (`spec.md` §4.2
	/// Step A.7); always issued with `preemptable = true` regardless of
	/// this value's `preemptable` field.
	pub default_resources: ResourceRequest,
}

impl Default for LeaderConfig {
	fn default() -> Self {
		Self {
			worker_entry: "toil-worker".to_owned(),
			job_store_locator: String::new(),
			batch_poll_timeout: Duration::from_secs(2),
			rescue_jobs_frequency: Duration::from_secs(3600),
			max_job_duration: Duration::from_secs(10_000_001),
			kill_after_n_missing: 3,
			default_resources: ResourceRequest::new(1_073_741_824, 1, 1_073_741_824, false),
		}
	}
}
