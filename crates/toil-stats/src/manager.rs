use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, trace};

use toil_job_store::JobStore;

use crate::blob::process_blob;
use crate::error::StatsAggregatorError;

const IDLE_SLEEP: Duration = Duration::from_millis(500);

/// Final totals record written on shutdown (`spec.md` §4.6). Field names
/// match `original_source/src/toil/leader.py`'s `total_time`/`total_clock`
/// JSON keys so existing consumers of a run's stats file keep working.
#[derive(Debug, Serialize)]
struct Totals {
	total_time: String,
	total_clock: String,
}

/// A handle to the background stats/logging drain task.
pub struct StatsAggregatorHandle {
	shutdown_tx: watch::Sender<bool>,
	worker: Mutex<Option<JoinHandle<()>>>,
}

#[must_use]
pub fn spawn(job_store: Arc<dyn JobStore>) -> StatsAggregatorHandle {
	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	let worker = tokio::spawn(run(job_store, shutdown_rx));

	StatsAggregatorHandle {
		shutdown_tx,
		worker: Mutex::new(Some(worker)),
	}
}

impl StatsAggregatorHandle {
	/// `spec.md` §4.6 `check`: fails if the worker task has already exited.
	pub fn check(&self) -> Result<(), StatsAggregatorError> {
		let guard = self.worker.lock().expect("worker mutex poisoned");
		match guard.as_ref() {
			Some(handle) if handle.is_finished() => Err(StatsAggregatorError::WorkerDied),
			_ => Ok(()),
		}
	}

	/// `spec.md` §4.6 `shutdown`: requests one final drain and waits for the
	/// worker to write its totals record and exit.
	pub async fn shutdown(&self) -> Result<(), StatsAggregatorError> {
		let _ = self.shutdown_tx.send(true);
		let handle = self.worker.lock().expect("worker mutex poisoned").take();
		if let Some(handle) = handle {
			handle
				.await
				.map_err(|e| StatsAggregatorError::WorkerPanicked(e.to_string()))?;
		}
		Ok(())
	}
}

async fn run(job_store: Arc<dyn JobStore>, mut shutdown_rx: watch::Receiver<bool>) {
	let start = Instant::now();

	loop {
		let stopping = *shutdown_rx.borrow();

		match job_store.read_stats_and_logging(&mut process_blob).await {
			Ok(0) if !stopping => {
				tokio::select! {
					() = tokio::time::sleep(IDLE_SLEEP) => {}
					_ = shutdown_rx.changed() => {}
				}
			}
			Ok(_) => {}
			Err(error) => error!(%error, "stats aggregator failed to read blobs"),
		}

		if stopping {
			break;
		}
	}

	let elapsed = start.elapsed();
	let totals = Totals {
		total_time: format!("{:.6}", elapsed.as_secs_f64()),
		// Wall-clock delta stands in for the reference implementation's
		// process CPU-time accounting, which is out of scope here.
		total_clock: format!("{:.6}", elapsed.as_secs_f64()),
	};
	match serde_json::to_string(&totals) {
		Ok(text) => {
			if let Err(error) = job_store.write_stats_and_logging(&text).await {
				error!(%error, "failed to write final stats totals");
			}
		}
		Err(error) => error!(%error, "failed to serialize final stats totals"),
	}
	trace!("stats aggregator worker exiting");
}
