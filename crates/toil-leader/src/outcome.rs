use toil_types::JobId;

/// `spec.md` §9 Design Notes: replaces the reference implementation's
/// `FailedJobsException`, raised at the end of `innerLoop` whenever
/// `totalFailedJobs` is non-empty.
#[derive(Debug, Clone)]
pub struct FailedJobsReport {
	pub job_store_locator: String,
	pub failed_jobs: Vec<JobId>,
}

/// The sum type returned at the run boundary (`spec.md` §9 Design Notes),
/// replacing the reference implementation's exception-driven control flow.
#[derive(Debug, Clone)]
pub enum RunOutcome {
	/// The run completed with no totally failed jobs. Carries the raw bytes
	/// read from `rootJobReturnValue`; decoding them (e.g. with `rmp-serde`)
	/// is left to the caller, since this crate has no opinion on the
	/// serialization format (`spec.md` §9 Open Questions).
	Success(Vec<u8>),
	Failed(FailedJobsReport),
}
