use std::time::Duration;

use async_trait::async_trait;
use toil_scaler::{ClusterScaler, ClusterScalerError};
use toil_types::BatchJobId;

/// A scaler that manages no nodes: the demo binary's `ProcessBatchSystem`
/// runs jobs as local child processes, so there is nothing to provision.
/// Keeps the Leader's auxiliary-thread wiring exercised end to end without
/// a real cloud backend (`spec.md` §6 "Provisioner / Cluster Scaler" is
/// explicitly optional per run).
#[derive(Debug, Default)]
pub struct NullClusterScaler;

#[async_trait]
impl ClusterScaler for NullClusterScaler {
	async fn start(&self) -> Result<(), ClusterScalerError> {
		Ok(())
	}

	async fn check(&self) -> Result<(), ClusterScalerError> {
		Ok(())
	}

	async fn add_completed_job(&self, _issued_job: BatchJobId, _wall_time: Duration) {}

	async fn shutdown(&self) {}
}
