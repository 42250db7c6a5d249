use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_channel as chan;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, trace, warn};

use toil_job_store::JobStore;
use toil_state::ServiceFlags;
use toil_types::{JobId, JobRecord, ResourceRequest};

use crate::error::ServiceManagerError;

const LIVENESS_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A handle to the background worker that stages service job groups
/// (`spec.md` §4.4). Cloning the handle is cheap; the worker itself is
/// spawned once by [`spawn`].
pub struct ServiceManagerHandle {
	schedule_tx: chan::Sender<JobRecord>,
	start_queue_rx: chan::Receiver<(JobId, ResourceRequest)>,
	ready_rx: chan::Receiver<JobRecord>,
	in_flight: Arc<AtomicI64>,
	/// Jobs currently owned by the worker, not yet handed back via
	/// [`ServiceManagerHandle::get_job_whose_services_are_running`]. Mirrors
	/// `jobWrappersWithServicesBeingStarted` in
	/// `original_source/src/toil/leader.py`'s `ServiceManager`, consulted by
	/// the Leader's Step A.1 ("still owned by the service manager").
	being_started: Mutex<HashSet<JobId>>,
	shutdown_tx: watch::Sender<bool>,
	worker: Mutex<Option<JoinHandle<()>>>,
}

/// Spawns the Service Manager's worker task. `job_store` is used only to
/// poll start/terminate flag files; scheduling a job group does not touch
/// the job's own record.
#[must_use]
pub fn spawn(job_store: Arc<dyn JobStore>) -> ServiceManagerHandle {
	let (schedule_tx, schedule_rx) = chan::unbounded();
	let (start_queue_tx, start_queue_rx) = chan::unbounded();
	let (ready_tx, ready_rx) = chan::unbounded();
	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	let in_flight = Arc::new(AtomicI64::new(0));

	let worker = tokio::spawn(run(
		job_store,
		schedule_rx,
		start_queue_tx,
		ready_tx,
		shutdown_rx,
	));

	ServiceManagerHandle {
		schedule_tx,
		start_queue_rx,
		ready_rx,
		in_flight,
		being_started: Mutex::new(HashSet::new()),
		shutdown_tx,
		worker: Mutex::new(Some(worker)),
	}
}

impl ServiceManagerHandle {
	/// `spec.md` §4.4 `scheduleServices`: hands a job's service groups to the
	/// worker and bumps `in_flight` by `Σ|group| + 1` up front, matching the
	/// reference implementation's `serviceJobsIssuedToServiceManager` counter
	/// (`original_source/src/toil/leader.py` `ServiceManager.scheduleServices`).
	#[instrument(skip(self, job), fields(job_id = %job.id))]
	pub fn schedule_services(&self, job: JobRecord) -> Result<(), ServiceManagerError> {
		let groups: i64 = job.services.iter().map(Vec::len).sum::<usize>() as i64 + 1;
		self.in_flight.fetch_add(groups, Ordering::SeqCst);
		self.being_started.lock().expect("being_started mutex poisoned").insert(job.id.clone());
		self.schedule_tx
			.try_send(job)
			.map_err(|_| ServiceManagerError::WorkerGone)
	}

	/// Mirrors `jobWrappersWithServicesBeingStarted` membership: `true` until
	/// the job has been handed back by
	/// [`get_job_whose_services_are_running`](Self::get_job_whose_services_are_running).
	#[must_use]
	pub fn is_being_started(&self, job_id: &JobId) -> bool {
		self.being_started
			.lock()
			.expect("being_started mutex poisoned")
			.contains(job_id)
	}

	/// `spec.md` §4.4 `getServiceJobsToStart`: pops one `(serviceId,
	/// resources)` pair the Leader should issue to the Batch System, waiting
	/// up to `max_wait`. Decrements `in_flight` by one on success.
	pub async fn get_service_jobs_to_start(&self, max_wait: Duration) -> Option<(JobId, ResourceRequest)> {
		let item = tokio::time::timeout(max_wait, self.start_queue_rx.recv())
			.await
			.ok()?
			.ok()?;
		self.in_flight.fetch_sub(1, Ordering::SeqCst);
		Some(item)
	}

	/// `spec.md` §4.4 `getJobWrapperWhoseServicesAreRunning`: pops one job
	/// whose entire service group chain has come up, waiting up to
	/// `max_wait`. Decrements `in_flight` by one on success.
	pub async fn get_job_whose_services_are_running(&self, max_wait: Duration) -> Option<JobRecord> {
		let job = tokio::time::timeout(max_wait, self.ready_rx.recv())
			.await
			.ok()?
			.ok()?;
		self.in_flight.fetch_sub(1, Ordering::SeqCst);
		self.being_started
			.lock()
			.expect("being_started mutex poisoned")
			.remove(&job.id);
		Some(job)
	}

	/// Mirrors `serviceJobsIssuedToServiceManager`: the number of service
	/// groups/job-completions the Leader still owes a `get_*` call for.
	#[must_use]
	pub fn in_flight(&self) -> i64 {
		self.in_flight.load(Ordering::SeqCst)
	}

	/// `spec.md` §4.4 `killServices`: deletes each service's terminate flag
	/// (and, if `error` is set, its error flag first) so the worker sees it
	/// and exits. Bypasses the worker task entirely, matching the reference
	/// implementation calling `jobStore.deleteFile` directly from the Leader
	/// thread.
	#[instrument(skip(self, job_store, services))]
	pub async fn kill_services(
		&self,
		job_store: &dyn JobStore,
		services: &HashMap<JobId, ServiceFlags>,
		error: bool,
	) -> Result<(), ServiceManagerError> {
		for flags in services.values() {
			if error {
				job_store.delete_file(&flags.error_flag_id).await?;
			}
			job_store.delete_file(&flags.terminate_flag_id).await?;
		}
		Ok(())
	}

	/// `spec.md` §4.4 `check`: fails if the worker task has already exited.
	pub fn check(&self) -> Result<(), ServiceManagerError> {
		let guard = self.worker.lock().expect("worker mutex poisoned");
		match guard.as_ref() {
			Some(handle) if handle.is_finished() => Err(ServiceManagerError::WorkerDied),
			_ => Ok(()),
		}
	}

	/// `spec.md` §4.4 `shutdown`: signals the worker to abort immediately
	/// (even mid-group) and waits for it to exit.
	pub async fn shutdown(&self) -> Result<(), ServiceManagerError> {
		let _ = self.shutdown_tx.send(true);
		let handle = self.worker.lock().expect("worker mutex poisoned").take();
		if let Some(handle) = handle {
			handle
				.await
				.map_err(|e| ServiceManagerError::WorkerPanicked(e.to_string()))?;
		}
		Ok(())
	}
}

/// Sentinel returned when a shutdown signal interrupts an in-progress group
/// startup. The job is dropped without being pushed to the ready queue.
struct Aborted;

async fn run(
	job_store: Arc<dyn JobStore>,
	schedule_rx: chan::Receiver<JobRecord>,
	start_queue_tx: chan::Sender<(JobId, ResourceRequest)>,
	ready_tx: chan::Sender<JobRecord>,
	mut shutdown_rx: watch::Receiver<bool>,
) {
	loop {
		tokio::select! {
			biased;

			changed = shutdown_rx.changed() => {
				if changed.is_err() || *shutdown_rx.borrow() {
					break;
				}
			}

			job = schedule_rx.recv() => {
				let Ok(job) = job else { break };
				let job_id = job.id.clone();
				match start_services(&job_store, &job, &start_queue_tx, &mut shutdown_rx).await {
					Ok(()) => {
						if ready_tx.send(job).await.is_err() {
							break;
						}
					}
					Err(Aborted) => {
						debug!(%job_id, "service startup aborted by shutdown");
						break;
					}
				}
			}
		}
	}
	trace!("service manager worker exiting");
}

/// `spec.md` §4.4 `_startServices`: brings up every service group in order,
/// one group at a time, waiting for the whole group to report running
/// before moving to the next.
async fn start_services(
	job_store: &Arc<dyn JobStore>,
	job: &JobRecord,
	start_queue_tx: &chan::Sender<(JobId, ResourceRequest)>,
	shutdown_rx: &mut watch::Receiver<bool>,
) -> Result<(), Aborted> {
	for group in &job.services {
		for service in group {
			if !job_store.file_exists(&service.start_flag_id).await {
				warn!(service_id = %service.service_id, "start flag missing before service dispatch");
			}
			if start_queue_tx
				.send((service.service_id.clone(), service.resources))
				.await
				.is_err()
			{
				return Err(Aborted);
			}
		}

		for service in group {
			wait_for_start(job_store, &service.start_flag_id, shutdown_rx).await?;
		}
	}
	Ok(())
}

/// A service is "running" once its start flag file disappears (written by
/// the worker that launches it, deleted once the service process is up).
async fn wait_for_start(
	job_store: &Arc<dyn JobStore>,
	start_flag_id: &toil_types::FlagId,
	shutdown_rx: &mut watch::Receiver<bool>,
) -> Result<(), Aborted> {
	loop {
		if !job_store.file_exists(start_flag_id).await {
			return Ok(());
		}
		tokio::select! {
			() = tokio::time::sleep(LIVENESS_POLL_INTERVAL) => {}
			changed = shutdown_rx.changed() => {
				if changed.is_err() || *shutdown_rx.borrow() {
					return Err(Aborted);
				}
			}
		}
	}
}
