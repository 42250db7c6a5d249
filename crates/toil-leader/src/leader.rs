use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use toil_batch_system::BatchSystem;
use toil_job_store::{JobStore, JobStoreError, ROOT_RETURN_VALUE_FILE};
use toil_scaler::ClusterScaler;
use toil_services::ServiceManagerHandle;
use toil_state::{ServiceFlags, ToilState, build_toil_state};
use toil_stats::StatsAggregatorHandle;
use toil_types::{BatchJobId, JobId, JobRecord, JobStatus};

use crate::config::LeaderConfig;
use crate::error::LeaderError;
use crate::failure::get_successors;
use crate::issued::IssuedJobs;
use crate::outcome::{FailedJobsReport, RunOutcome};

/// Drives a single run to completion (`spec.md` §4.2). Owns the in-memory
/// [`ToilState`] exclusively; every other subsystem is an actor reached
/// through a handle or trait object.
pub struct Leader {
	job_store: Arc<dyn JobStore>,
	batch_system: Arc<dyn BatchSystem>,
	scaler: Option<Arc<dyn ClusterScaler>>,
	services: ServiceManagerHandle,
	stats: StatsAggregatorHandle,
	state: ToilState,
	issued: IssuedJobs,
	missing_hash: HashMap<BatchJobId, u32>,
	config: LeaderConfig,
}

impl Leader {
	/// Spawns the Service Manager and Stats Aggregator worker tasks and
	/// starts the Cluster Scaler, if one was supplied.
	pub async fn new(
		job_store: Arc<dyn JobStore>,
		batch_system: Arc<dyn BatchSystem>,
		scaler: Option<Arc<dyn ClusterScaler>>,
		config: LeaderConfig,
	) -> Result<Self, LeaderError> {
		let services = toil_services::spawn(Arc::clone(&job_store));
		let stats = toil_stats::spawn(Arc::clone(&job_store));
		if let Some(scaler) = &scaler {
			scaler.start().await?;
		}

		Ok(Self {
			issued: IssuedJobs::new(Arc::clone(&batch_system)),
			job_store,
			batch_system,
			scaler,
			services,
			stats,
			state: ToilState::new(),
			missing_hash: HashMap::new(),
			config,
		})
	}

	/// Runs the main loop to completion (`spec.md` §4.2) and returns the
	/// run's [`RunOutcome`]. Auxiliaries are torn down before returning,
	/// whether the run succeeded or a fatal error is about to propagate.
	pub async fn run(mut self, root_id: JobId) -> Result<RunOutcome, LeaderError> {
		self.state = build_toil_state(self.job_store.as_ref(), &root_id, None).await?;

		let mut last_rescue = Instant::now();
		let result = self.main_loop(&mut last_rescue).await;

		self.shutdown_auxiliaries().await;

		let outcome = result?;
		Ok(outcome)
	}

	async fn main_loop(&mut self, last_rescue: &mut Instant) -> Result<RunOutcome, LeaderError> {
		loop {
			// Step A — drain updated jobs.
			for (job, status) in self.state.drain_updated() {
				self.process_updated_job(job, status).await?;
			}

			// Step B — feed the batch system with newly startable service jobs.
			while let Some((service_id, resources)) =
				self.services.get_service_jobs_to_start(Duration::ZERO).await
			{
				let command = self.worker_command(&service_id);
				self.issued.issue(service_id, resources, command).await?;
			}

			// Step C — collect jobs whose services are now running.
			while let Some(mut job) = self.services.get_job_whose_services_are_running(Duration::ZERO).await {
				job.services.clear();
				self.state.enqueue_updated(job, JobStatus::Completed(0));
			}

			// Step D — poll batch-system completion.
			match self
				.batch_system
				.get_updated_batch_job(self.config.batch_poll_timeout)
				.await?
			{
				Some(update) => match self.issued.remove(update.bs_id) {
					Some(job_id) => {
						self.process_finished_job(job_id, update.bs_id, update.exit_code, update.wall_time)
							.await?;
					}
					None => {
						warn!(bs_id = ?update.bs_id, "ignoring completion for untracked batch job");
					}
				},
				None => {
					if last_rescue.elapsed() >= self.config.rescue_jobs_frequency {
						self.reissue_over_long_jobs().await?;
						let clean = self.reissue_missing_jobs().await?;
						*last_rescue = if clean {
							Instant::now()
						} else {
							// Recheck sooner (but never in the future) while jobs remain missing.
							let skew = self.config.rescue_jobs_frequency.saturating_sub(Duration::from_secs(60));
							Instant::now() - skew
						};
					}
				}
			}

			// Step E — health check.
			self.services.check()?;
			self.stats.check()?;
			if let Some(scaler) = &self.scaler {
				scaler.check().await?;
			}

			if self.state.updated_jobs_len() == 0 && self.issued.is_empty() && self.services.in_flight() == 0 {
				break;
			}
		}

		if !self.state.total_failed_jobs.is_empty() {
			return Ok(RunOutcome::Failed(FailedJobsReport {
				job_store_locator: self.config.job_store_locator.clone(),
				failed_jobs: self.state.total_failed_jobs.iter().cloned().collect(),
			}));
		}

		let root_value = self
			.job_store
			.read_file(&ROOT_RETURN_VALUE_FILE.into())
			.await
			.map_err(LeaderError::RootReturnValueMissing)?;
		Ok(RunOutcome::Success(root_value))
	}

	/// `spec.md` §4.2 Step A: the seven-branch cascade, first matching case
	/// wins.
	#[instrument(skip(self, job), fields(job_id = %job.id))]
	async fn process_updated_job(&mut self, mut job: JobRecord, status: JobStatus) -> Result<(), LeaderError> {
		// 1. Service-start pending: still owned by the Service Manager.
		if self.services.is_being_started(&job.id) {
			debug!("job still owned by service manager, deferring");
			return Ok(());
		}

		// 2. Subtree has failed successors.
		if self.state.has_failed_successors.contains(&job.id) {
			if let Some(services) = self.state.services_issued.get(&job.id).cloned() {
				self.services
					.kill_services(self.job_store.as_ref(), &services, true)
					.await?;
				return Ok(());
			}
			if self.state.has_pending_successors(&job.id) {
				return Ok(());
			}
			if job.checkpoint.is_some() && job.remaining_retry_count > 0 {
				self.reissue(job).await?;
				return Ok(());
			}
			self.process_totally_failed_job(job).await?;
			return Ok(());
		}

		// 3. Has command, or the previous run failed.
		if job.command.is_some() || status.failed() {
			let is_service = self.state.service_to_predecessor.contains_key(&job.id);
			let error_flag_gone = match &job.error_job_store_id {
				Some(flag) => !self.job_store.file_exists(flag).await,
				None => false,
			};
			if (is_service && error_flag_gone) || job.remaining_retry_count == 0 {
				self.process_totally_failed_job(job).await?;
				return Ok(());
			}
			self.reissue(job).await?;
			return Ok(());
		}

		// 4. Has services pending start.
		if job.has_services() {
			debug_assert!(!self.state.services_issued.contains_key(&job.id));
			let mut flags = HashMap::new();
			for group in &job.services {
				for service in group {
					self.state
						.service_to_predecessor
						.insert(service.service_id.clone(), job.clone());
					flags.insert(
						service.service_id.clone(),
						ServiceFlags {
							start_flag_id: service.start_flag_id.clone(),
							terminate_flag_id: service.terminate_flag_id.clone(),
							error_flag_id: service.error_flag_id.clone(),
						},
					);
				}
			}
			self.state.services_issued.insert(job.id.clone(), flags);
			self.services.schedule_services(job)?;
			return Ok(());
		}

		// 5. Has successors.
		if job.has_successors() {
			self.schedule_successors(job).await?;
			return Ok(());
		}

		// 6. Services to tear down: successor subtree succeeded.
		if let Some(services) = self.state.services_issued.remove(&job.id) {
			self.services
				.kill_services(self.job_store.as_ref(), &services, false)
				.await?;
			return Ok(());
		}

		// 7. Empty cleanup.
		if job.remaining_retry_count > 0 {
			let mut resources = self.config.default_resources;
			resources.preemptable = true;
			job.resources = resources;
			self.job_store.update(&job).await?;
			let command = self.worker_command(&job.id);
			let bs_id = self.issued.issue(job.id.clone(), resources, command).await?;
			let _ = bs_id;
			Ok(())
		} else {
			self.process_totally_failed_job(job).await
		}
	}

	/// `spec.md` §4.2 Step A.5: pops the top successor group, resolving join
	/// nodes and already-tainted successors, and issues everything that is
	/// ready this turn.
	async fn schedule_successors(&mut self, mut job: JobRecord) -> Result<(), LeaderError> {
		let top_group = job
			.stack
			.pop()
			.expect("has_successors guarantees a non-empty top group");
		self.state
			.successor_counts
			.insert(job.id.clone(), top_group.len() as u32);

		let mut ready = Vec::new();

		for edge in top_group {
			self.state
				.successor_to_predecessors
				.entry(edge.succ_id.clone())
				.or_default()
				.push(job.clone());

			let Some(pred_id) = &edge.predecessor_id else {
				ready.push((edge.succ_id.clone(), edge.resources));
				continue;
			};

			if self.state.failed_successors.contains(&edge.succ_id) {
				self.state.has_failed_successors.insert(job.id.clone());
				let remaining = self.state.decrement_successor_count(&job.id);
				if let Some(preds) = self.state.successor_to_predecessors.get_mut(&edge.succ_id) {
					preds.retain(|p| p.id != job.id);
					if preds.is_empty() {
						self.state.successor_to_predecessors.remove(&edge.succ_id);
					}
				}
				if remaining == 0 {
					self.state.enqueue_updated(job.clone(), JobStatus::Completed(0));
				}
				continue;
			}

			let mut succ = match self.state.join_pending.remove(&edge.succ_id) {
				Some(succ) => succ,
				None => {
					if self.job_store.exists(&edge.succ_id).await {
						self.job_store.load(&edge.succ_id).await?
					} else {
						continue;
					}
				}
			};
			succ.predecessors_finished.insert(pred_id.clone());

			if (succ.predecessors_finished.len() as u32) < succ.predecessor_number {
				self.state.join_pending.insert(edge.succ_id.clone(), succ);
				continue;
			}
			self.state.join_pending.insert(edge.succ_id.clone(), succ);
			ready.push((edge.succ_id.clone(), edge.resources));
		}

		for (succ_id, _resources) in ready {
			let succ_job = if let Some(cached) = self.state.join_pending.remove(&succ_id) {
				cached
			} else {
				self.job_store.load(&succ_id).await?
			};
			self.issue_runnable(succ_job).await;
		}

		Ok(())
	}

	/// Re-enqueues a newly-ready successor for another pass through Step A,
	/// which will issue it (if it is a runnable leaf), stage its services, or
	/// recurse into its own successors — mirroring the build-time traversal
	/// in `toil-state` applied live.
	async fn issue_runnable(&mut self, mut job: JobRecord) {
		if job.is_checkpoint() {
			job.restore_checkpoint();
		}
		self.state.enqueue_updated(job, JobStatus::Fresh);
	}

	async fn reissue(&mut self, job: JobRecord) -> Result<(), LeaderError> {
		let command = self.worker_command(&job.id);
		let resources = job.resources;
		self.job_store.update(&job).await?;
		self.issued.issue(job.id, resources, command).await?;
		Ok(())
	}

	/// `spec.md` §4.2 `processFinishedJob`. `job_id` is the id `bs_id` was
	/// already confirmed to map to by the caller's `IssuedJobs::remove`.
	async fn process_finished_job(
		&mut self,
		job_id: JobId,
		bs_id: BatchJobId,
		exit_code: i32,
		wall_time: Option<Duration>,
	) -> Result<(), LeaderError> {
		if let (Some(wall_time), Some(scaler)) = (wall_time, &self.scaler) {
			scaler.add_completed_job(bs_id, wall_time).await;
		}

		if !self.job_store.exists(&job_id).await {
			self.update_predecessor_status(&job_id).await?;
			return Ok(());
		}

		let mut job = match self.job_store.load(&job_id).await {
			Ok(job) => job,
			// `spec.md` §7 "Ghost job": a stale "exists" listing for a job
			// whose record no longer loads. Treat the same as having
			// observed the job store no longer holding it.
			Err(JobStoreError::GhostJob(_)) => {
				self.update_predecessor_status(&job_id).await?;
				return Ok(());
			}
			Err(error) => return Err(error.into()),
		};

		if let Some(log_file) = job.log_job_store_file_id.clone() {
			match self.job_store.read_file(&log_file).await {
				Ok(bytes) => info!(job_id = %job_id, log = %String::from_utf8_lossy(&bytes), "worker log"),
				Err(error) => warn!(job_id = %job_id, %error, "failed to read worker log blob"),
			}
		}

		if exit_code != 0 {
			job.remaining_retry_count = job.remaining_retry_count.saturating_sub(1);
			self.job_store.update(&job).await?;
		} else if self.state.has_failed_successors.remove(&job_id) {
			// No-op beyond the removal: this retry succeeded, drop the stale flag.
		}

		self.state.enqueue_updated(job, JobStatus::Completed(exit_code));
		Ok(())
	}

	/// `spec.md` §4.2 `updatePredecessorStatus`.
	async fn update_predecessor_status(&mut self, job_id: &JobId) -> Result<(), LeaderError> {
		if let Some(owner) = self.state.service_to_predecessor.remove(job_id) {
			if let Some(services) = self.state.services_issued.get_mut(&owner.id) {
				services.remove(job_id);
				if services.is_empty() {
					self.state.services_issued.remove(&owner.id);
					self.state.enqueue_updated(owner, JobStatus::Completed(0));
				}
			}
			return Ok(());
		}

		let Some(predecessors) = self.state.successor_to_predecessors.remove(job_id) else {
			return Ok(());
		};

		for predecessor in predecessors {
			let remaining = self.state.decrement_successor_count(&predecessor.id);
			if remaining == 0 {
				let mut predecessor = predecessor;
				predecessor.stack.pop();
				self.state.enqueue_updated(predecessor, JobStatus::Completed(0));
			}
		}
		Ok(())
	}

	/// `spec.md` §4.2 `processTotallyFailedJob` / §4.3 failure-subtree walk.
	async fn process_totally_failed_job(&mut self, job: JobRecord) -> Result<(), LeaderError> {
		self.state.total_failed_jobs.insert(job.id.clone());

		if let Some(owner) = self.state.service_to_predecessor.get(&job.id).cloned() {
			if let Some(start_flag) = &job.start_job_store_id {
				let _ = self.job_store.delete_file(start_flag).await;
			}
			self.update_predecessor_status(&job.id).await?;
			if let Some(services) = self.state.services_issued.get(&owner.id).cloned() {
				self.services
					.kill_services(self.job_store.as_ref(), &services, true)
					.await?;
			}
			self.state.has_failed_successors.insert(owner.id.clone());
			return Ok(());
		}

		let tainted = {
			let mut already_seen = std::mem::take(&mut self.state.failed_successors);
			let tainted = get_successors(&job, &mut already_seen, self.job_store.as_ref()).await?;
			self.state.failed_successors = already_seen;
			tainted
		};

		for descendant in tainted {
			let Some(predecessors) = self.state.successor_to_predecessors.remove(&descendant) else {
				continue;
			};
			for predecessor in predecessors {
				self.state.has_failed_successors.insert(predecessor.id.clone());
				let remaining = self.state.decrement_successor_count(&predecessor.id);
				if remaining == 0 {
					self.state.enqueue_updated(predecessor, JobStatus::Completed(0));
				}
			}
		}

		if let Some(predecessors) = self.state.successor_to_predecessors.get(&job.id).cloned() {
			for predecessor in predecessors {
				self.state.has_failed_successors.insert(predecessor.id.clone());
			}
			self.update_predecessor_status(&job.id).await?;
		}

		Ok(())
	}

	/// `spec.md` §4.5 `reissueOverLongJobs`.
	async fn reissue_over_long_jobs(&mut self) -> Result<(), LeaderError> {
		if self.config.max_job_duration >= Duration::from_secs(10_000_000) {
			return Ok(());
		}
		let running = self.batch_system.get_running_batch_job_ids().await;
		let to_kill: Vec<BatchJobId> = running
			.into_iter()
			.filter(|(_, wall)| *wall > self.config.max_job_duration)
			.map(|(id, _)| id)
			.collect();
		if !to_kill.is_empty() {
			warn!(count = to_kill.len(), "killing jobs over max duration");
			self.kill_jobs(&to_kill).await?;
		}
		Ok(())
	}

	/// `spec.md` §4.5 `reissueMissingJobs`. Returns `true` iff no job is
	/// currently flagged missing.
	async fn reissue_missing_jobs(&mut self) -> Result<bool, LeaderError> {
		let tracked: Vec<BatchJobId> = self.issued.ids().collect();
		let present: std::collections::HashSet<BatchJobId> =
			self.batch_system.get_issued_batch_job_ids().await.into_iter().collect();

		let mut missing = Vec::new();
		for bs_id in &tracked {
			if present.contains(bs_id) {
				self.missing_hash.remove(bs_id);
				continue;
			}
			let count = self.missing_hash.entry(*bs_id).or_insert(0);
			*count += 1;
			if *count >= self.config.kill_after_n_missing {
				missing.push(*bs_id);
			}
		}

		if !missing.is_empty() {
			warn!(count = missing.len(), "killing jobs missing from batch system");
			for bs_id in &missing {
				self.missing_hash.remove(bs_id);
			}
			self.kill_jobs(&missing).await?;
		}

		Ok(self.missing_hash.is_empty())
	}

	/// `spec.md` §4.5 `killJobs`.
	async fn kill_jobs(&mut self, ids: &[BatchJobId]) -> Result<(), LeaderError> {
		self.issued.kill(ids).await?;
		for &bs_id in ids {
			match self.issued.remove(bs_id) {
				Some(job_id) => self.process_finished_job(job_id, bs_id, 1, None).await?,
				None => warn!(%bs_id, "killed job was already untracked"),
			}
		}
		Ok(())
	}

	fn worker_command(&self, job_id: &JobId) -> String {
		format!(
			"{} {} {}",
			self.config.worker_entry, self.config.job_store_locator, job_id
		)
	}

	/// Best-effort reverse-order teardown; a subsystem failing to shut down
	/// cleanly is logged, not propagated, so the run's actual outcome still
	/// reaches the caller.
	async fn shutdown_auxiliaries(&self) {
		if let Some(scaler) = &self.scaler {
			scaler.shutdown().await;
		}
		if let Err(error) = self.stats.shutdown().await {
			warn!(%error, "stats aggregator did not shut down cleanly");
		}
		if let Err(error) = self.services.shutdown().await {
			warn!(%error, "service manager did not shut down cleanly");
		}
		if let Err(error) = self.batch_system.shutdown().await {
			warn!(%error, "batch system did not shut down cleanly");
		}
	}
}

#[cfg(test)]
mod tests {
	use std::collections::{HashMap as Map, HashSet as Set, VecDeque};
	use std::sync::Mutex;
	use std::sync::atomic::{AtomicU64, Ordering};

	use async_trait::async_trait;
	use toil_batch_system::{BatchSystemError, UpdatedBatchJob};
	use toil_job_store::{JobStoreError, StatsCallback};
	use toil_types::{FileId, ResourceRequest, SuccessorEdge};

	use super::*;

	struct FixtureJobStore {
		jobs: Mutex<Map<JobId, JobRecord>>,
		files: Mutex<Map<FileId, Vec<u8>>>,
		/// Ids a stale "exists" listing still reports, but whose record can no
		/// longer be loaded — `spec.md` §7 "Ghost job".
		ghosts: Mutex<Set<JobId>>,
	}

	impl FixtureJobStore {
		fn new(jobs: Vec<JobRecord>) -> Arc<Self> {
			let mut files = Map::new();
			files.insert(FileId::from(ROOT_RETURN_VALUE_FILE), b"42".to_vec());
			Arc::new(Self {
				jobs: Mutex::new(jobs.into_iter().map(|j| (j.id.clone(), j)).collect()),
				files: Mutex::new(files),
				ghosts: Mutex::new(Set::new()),
			})
		}

		/// Leaves `id`'s record listed (so `exists` keeps reporting `true`)
		/// but makes `load` fail as though the backend's listing outran its
		/// storage — a stale-listing backend's "ghost job".
		fn haunt(&self, id: JobId) {
			self.ghosts.lock().unwrap().insert(id);
		}
	}

	#[async_trait]
	impl JobStore for FixtureJobStore {
		async fn load(&self, id: &JobId) -> Result<JobRecord, JobStoreError> {
			if self.ghosts.lock().unwrap().contains(id) {
				return Err(JobStoreError::GhostJob(id.clone()));
			}
			self.jobs
				.lock()
				.unwrap()
				.get(id)
				.cloned()
				.ok_or_else(|| JobStoreError::NoSuchJob(id.clone()))
		}
		async fn update(&self, record: &JobRecord) -> Result<(), JobStoreError> {
			self.jobs.lock().unwrap().insert(record.id.clone(), record.clone());
			Ok(())
		}
		async fn exists(&self, id: &JobId) -> bool {
			self.jobs.lock().unwrap().contains_key(id)
		}
		async fn delete(&self, id: &JobId) -> Result<(), JobStoreError> {
			self.jobs.lock().unwrap().remove(id);
			Ok(())
		}
		async fn file_exists(&self, file_id: &FileId) -> bool {
			self.files.lock().unwrap().contains_key(file_id)
		}
		async fn delete_file(&self, file_id: &FileId) -> Result<(), JobStoreError> {
			self.files.lock().unwrap().remove(file_id);
			Ok(())
		}
		async fn write_file(&self, file_id: &FileId, contents: &[u8]) -> Result<(), JobStoreError> {
			self.files.lock().unwrap().insert(file_id.clone(), contents.to_vec());
			Ok(())
		}
		async fn read_file(&self, file_id: &FileId) -> Result<Vec<u8>, JobStoreError> {
			self.files
				.lock()
				.unwrap()
				.get(file_id)
				.cloned()
				.ok_or_else(|| JobStoreError::NoSuchFile(file_id.clone()))
		}
		async fn read_stats_and_logging(&self, _callback: &mut StatsCallback<'_>) -> Result<usize, JobStoreError> {
			Ok(0)
		}
		async fn write_stats_and_logging(&self, _text: &str) -> Result<(), JobStoreError> {
			Ok(())
		}
	}

	/// Completes every issued job instantly according to a per-job exit-code
	/// script, so `Leader::run` never has to wait on a real worker. Jobs
	/// listed in `missing_on_first_issue` are withheld from
	/// `get_issued_batch_job_ids` (and never completed) the first time they
	/// are issued, to drive the rescue path (S6).
	struct FixtureBatchSystem {
		job_store: Arc<FixtureJobStore>,
		next_id: AtomicU64,
		script: Map<JobId, i32>,
		missing_on_first_issue: Set<JobId>,
		/// Jobs that, on a successful exit, are haunted (`FixtureJobStore::haunt`)
		/// instead of having their record deleted, to drive the Ghost job path.
		ghost_on_complete: Set<JobId>,
		issue_count: Mutex<Map<JobId, u32>>,
		tracked: Mutex<Set<BatchJobId>>,
		ready: Mutex<VecDeque<UpdatedBatchJob>>,
	}

	impl FixtureBatchSystem {
		fn new(job_store: Arc<FixtureJobStore>, script: Map<JobId, i32>) -> Arc<Self> {
			Arc::new(Self {
				job_store,
				next_id: AtomicU64::new(1),
				script,
				missing_on_first_issue: Set::new(),
				ghost_on_complete: Set::new(),
				issue_count: Mutex::new(Map::new()),
				tracked: Mutex::new(Set::new()),
				ready: Mutex::new(VecDeque::new()),
			})
		}

		fn with_missing_on_first_issue(
			job_store: Arc<FixtureJobStore>,
			script: Map<JobId, i32>,
			missing: Set<JobId>,
		) -> Arc<Self> {
			Arc::new(Self {
				job_store,
				next_id: AtomicU64::new(1),
				script,
				missing_on_first_issue: missing,
				ghost_on_complete: Set::new(),
				issue_count: Mutex::new(Map::new()),
				tracked: Mutex::new(Set::new()),
				ready: Mutex::new(VecDeque::new()),
			})
		}

		fn with_ghost_on_complete(
			job_store: Arc<FixtureJobStore>,
			script: Map<JobId, i32>,
			ghost_on_complete: Set<JobId>,
		) -> Arc<Self> {
			Arc::new(Self {
				job_store,
				next_id: AtomicU64::new(1),
				script,
				missing_on_first_issue: Set::new(),
				ghost_on_complete,
				issue_count: Mutex::new(Map::new()),
				tracked: Mutex::new(Set::new()),
				ready: Mutex::new(VecDeque::new()),
			})
		}
	}

	fn job_id_from_command(command: &str) -> JobId {
		command.rsplit(' ').next().unwrap().into()
	}

	#[async_trait]
	impl BatchSystem for FixtureBatchSystem {
		/// Stands in for a real worker process: decides the exit code from
		/// `script`, and on success deletes the job record the way a worker
		/// deletes it on the real path, so `processFinishedJob` takes the
		/// "job store no longer holds it" branch exactly like production.
		async fn issue_batch_job(
			&self,
			command: String,
			_resources: ResourceRequest,
		) -> Result<BatchJobId, BatchSystemError> {
			let job_id = job_id_from_command(&command);
			let bs_id = BatchJobId(self.next_id.fetch_add(1, Ordering::SeqCst));

			let first_issue = {
				let mut counts = self.issue_count.lock().unwrap();
				let count = counts.entry(job_id.clone()).or_insert(0);
				*count += 1;
				*count == 1
			};

			if first_issue && self.missing_on_first_issue.contains(&job_id) {
				return Ok(bs_id);
			}

			self.tracked.lock().unwrap().insert(bs_id);
			let exit_code = self.script.get(&job_id).copied().unwrap_or(0);
			if exit_code == 0 {
				if self.ghost_on_complete.contains(&job_id) {
					self.job_store.haunt(job_id.clone());
				} else {
					self.job_store.jobs.lock().unwrap().remove(&job_id);
				}
			}
			self.ready.lock().unwrap().push_back(UpdatedBatchJob {
				bs_id,
				exit_code,
				wall_time: Some(Duration::from_secs(1)),
			});
			Ok(bs_id)
		}

		async fn kill_batch_jobs(&self, ids: &[BatchJobId]) -> Result<(), BatchSystemError> {
			let mut tracked = self.tracked.lock().unwrap();
			for id in ids {
				tracked.remove(id);
			}
			Ok(())
		}

		async fn get_issued_batch_job_ids(&self) -> Vec<BatchJobId> {
			self.tracked.lock().unwrap().iter().copied().collect()
		}

		async fn get_running_batch_job_ids(&self) -> Map<BatchJobId, Duration> {
			Map::new()
		}

		async fn get_updated_batch_job(
			&self,
			timeout: Duration,
		) -> Result<Option<UpdatedBatchJob>, BatchSystemError> {
			if let Some(item) = self.ready.lock().unwrap().pop_front() {
				return Ok(Some(item));
			}
			tokio::time::sleep(timeout.min(Duration::from_millis(5))).await;
			Ok(None)
		}

		async fn shutdown(&self) -> Result<(), BatchSystemError> {
			Ok(())
		}
	}

	fn test_config() -> LeaderConfig {
		LeaderConfig {
			batch_poll_timeout: Duration::from_millis(10),
			job_store_locator: "fixture://run".to_owned(),
			..Default::default()
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

	/// S1 — linear chain: `R -> A`; both run to completion with no failures.
	#[tokio::test]
	async fn linear_chain_runs_to_success() {
		let root = internal("R", vec![edge("A", None)]);
		let a = leaf("A");
		let job_store = FixtureJobStore::new(vec![root, a]);
		let batch_system = FixtureBatchSystem::new(Arc::clone(&job_store), Map::new());

		let leader = Leader::new(job_store, batch_system, None, test_config())
			.await
			.unwrap();
		let outcome = leader.run("R".into()).await.unwrap();

		match outcome {
			RunOutcome::Success(bytes) => assert_eq!(bytes, b"42"),
			RunOutcome::Failed(report) => panic!("expected success, got {report:?}"),
		}
	}

	/// S2 — diamond join: `R -> {A, B}`, both `-> C` with `predecessorNumber=2`.
	#[tokio::test]
	async fn diamond_join_runs_to_success() {
		let root = internal("R", vec![edge("A", None), edge("B", None)]);
		let a = internal("A", vec![edge("C", Some("A"))]);
		let b = internal("B", vec![edge("C", Some("B"))]);
		let c = join("C", 2);
		let job_store = FixtureJobStore::new(vec![root, a, b, c]);
		let batch_system = FixtureBatchSystem::new(Arc::clone(&job_store), Map::new());

		let leader = Leader::new(job_store, batch_system, None, test_config())
			.await
			.unwrap();
		let outcome = leader.run("R".into()).await.unwrap();

		assert!(matches!(outcome, RunOutcome::Success(_)));
	}

	/// S3 — failure taints the predecessor subtree: `R -> A -> {B, C}`, `C`
	/// fails out of retries. `A` and `R` must both end up totally failed
	/// (no checkpoint to restart from), while `B` still runs to completion.
	#[tokio::test]
	async fn failed_leaf_taints_ancestors_after_sibling_completes() {
		let root = internal("R", vec![edge("A", None)]);
		let a = internal("A", vec![edge("B", None), edge("C", None)]);
		let mut b = leaf("B");
		let mut c = leaf("C");
		b.command = Some(b"run-B".to_vec());
		c.command = Some(b"run-C".to_vec());

		let job_store = FixtureJobStore::new(vec![root, a, b, c]);
		let mut script = Map::new();
		script.insert(JobId::from("C"), 1);
		let batch_system = FixtureBatchSystem::new(Arc::clone(&job_store), script);

		let leader = Leader::new(job_store, batch_system, None, test_config())
			.await
			.unwrap();
		let outcome = leader.run("R".into()).await.unwrap();

		match outcome {
			RunOutcome::Failed(report) => {
				assert!(report.failed_jobs.contains(&JobId::from("C")));
				assert!(report.failed_jobs.contains(&JobId::from("A")));
				assert!(report.failed_jobs.contains(&JobId::from("R")));
			}
			RunOutcome::Success(_) => panic!("expected a failure report"),
		}
	}

	/// `spec.md` §7 "Ghost job": `A` completes successfully, but the backend's
	/// listing still reports its record as present while `load` can no longer
	/// find it. `processFinishedJob` must treat that the same as the record
	/// having been cleanly removed, running `updatePredecessorStatus` so `R`
	/// still becomes ready and the run still succeeds.
	#[tokio::test]
	async fn ghost_job_is_treated_as_successfully_removed() {
		let root = internal("R", vec![edge("A", None)]);
		let a = leaf("A");
		let job_store = FixtureJobStore::new(vec![root, a]);
		let batch_system = FixtureBatchSystem::with_ghost_on_complete(
			Arc::clone(&job_store),
			Map::new(),
			Set::from([JobId::from("A")]),
		);

		let leader = Leader::new(job_store, batch_system, None, test_config())
			.await
			.unwrap();
		let outcome = leader.run("R".into()).await.unwrap();

		match outcome {
			RunOutcome::Success(bytes) => assert_eq!(bytes, b"42"),
			RunOutcome::Failed(report) => panic!("expected success, got {report:?}"),
		}
	}

	/// S6 — missing-job rescue: a job that never appears in the batch
	/// system's issued list is killed after `kill_after_n_missing` scans,
	/// then reissued and allowed to complete normally.
	#[tokio::test]
	async fn missing_job_is_rescued_then_completes() {
		let root = internal("R", vec![edge("A", None)]);
		let mut a = leaf("A");
		a.remaining_retry_count = 2;
		let job_store = FixtureJobStore::new(vec![root, a]);
		let batch_system = FixtureBatchSystem::with_missing_on_first_issue(
			Arc::clone(&job_store),
			Map::new(),
			Set::from([JobId::from("A")]),
		);

		let mut config = test_config();
		config.rescue_jobs_frequency = Duration::ZERO;
		config.kill_after_n_missing = 2;

		let leader = Leader::new(job_store, batch_system, None, config).await.unwrap();
		let outcome = leader.run("R".into()).await.unwrap();

		assert!(matches!(outcome, RunOutcome::Success(_)));
	}
}
