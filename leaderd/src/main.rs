mod config;

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use toil_inproc::{FileJobStore, NullClusterScaler, ProcessBatchSystem};
use toil_leader::{Leader, RunOutcome};
use toil_types::JobId;

use config::{build_leader_config, Args, FileConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| "info,leaderd=debug".into()),
		)
		.init();

	let args = Args::parse();

	let file_config = match &args.config {
		Some(path) => FileConfig::load(path)?,
		None => FileConfig::default(),
	};
	let (job_store_dir, leader_config) = build_leader_config(&args, &file_config);

	info!(?job_store_dir, "opening job store");
	let job_store: Arc<dyn toil_job_store::JobStore> = Arc::new(FileJobStore::open(&job_store_dir).await?);
	let batch_system: Arc<dyn toil_batch_system::BatchSystem> = Arc::new(ProcessBatchSystem::new());
	let scaler: Arc<dyn toil_scaler::ClusterScaler> = Arc::new(NullClusterScaler);

	let root_id: JobId = args.root_job_id.into();

	let leader = Leader::new(job_store, batch_system, Some(scaler), leader_config).await?;

	let run_handle = tokio::spawn(leader.run(root_id));
	let outcome = tokio::select! {
		result = run_handle => {
			result.map_err(|e| anyhow::anyhow!("leader task panicked: {e}"))??
		}
		() = shutdown_signal() => {
			warn!("shutdown requested before the run completed; exiting without a final RunOutcome");
			return Ok(());
		}
	};

	match outcome {
		RunOutcome::Success(root_value) => {
			match rmp_serde::from_slice::<serde_json::Value>(&root_value) {
				Ok(decoded) => info!(%decoded, "run completed successfully"),
				Err(e) => {
					error!("root return value failed to deserialize: {e}");
					anyhow::bail!("root job return value is corrupt: {e}");
				}
			}
			Ok(())
		}
		RunOutcome::Failed(report) => {
			error!(
				job_store_locator = %report.job_store_locator,
				failed_jobs = report.failed_jobs.len(),
				"run ended with totally failed jobs"
			);
			for job_id in &report.failed_jobs {
				error!(%job_id, "totally failed job");
			}
			anyhow::bail!(
				"{} job(s) totally failed under job store '{}'",
				report.failed_jobs.len(),
				report.job_store_locator
			);
		}
	}
}

/// Mirrors `apps/server/src/main.rs`'s `shutdown_signal`: race Ctrl+C against
/// SIGTERM, whichever arrives first.
async fn shutdown_signal() {
	let ctrl_c = async {
		tokio::signal::ctrl_c()
			.await
			.expect("failed to install Ctrl+C handler");
	};

	#[cfg(unix)]
	let terminate = async {
		tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
			.expect("failed to install signal handler")
			.recv()
			.await;
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		() = ctrl_c => {
			info!("received Ctrl+C, shutting down");
		}
		() = terminate => {
			info!("received SIGTERM, shutting down");
		}
	}
}
