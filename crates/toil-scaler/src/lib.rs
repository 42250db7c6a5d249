//! The Provisioner / Cluster Scaler external interface (`spec.md` §6).
//!
//! The core only starts, health-checks, and stops a scaler, and forwards it
//! completed-job samples; node lifecycle itself is out of scope (`spec.md`
//! §1).

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use toil_types::BatchJobId;

#[derive(Debug, Error)]
pub enum ClusterScalerError {
	#[error("cluster scaler failed to start: {0}")]
	Start(String),

	#[error("cluster scaler health check failed: {0}")]
	HealthCheck(String),
}

#[async_trait]
pub trait ClusterScaler: Send + Sync {
	async fn start(&self) -> Result<(), ClusterScalerError>;

	/// A fatal `Err` here is equivalent to any other auxiliary-thread death
	/// (`spec.md` §4.2 Step E).
	async fn check(&self) -> Result<(), ClusterScalerError>;

	/// Reports a completed batch job's wall time so the scaler can refine
	/// its throughput estimate.
	async fn add_completed_job(&self, issued_job: BatchJobId, wall_time: Duration);

	async fn shutdown(&self);
}
