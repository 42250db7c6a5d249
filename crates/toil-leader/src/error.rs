use thiserror::Error;

use toil_batch_system::BatchSystemError;
use toil_job_store::JobStoreError;
use toil_scaler::ClusterScalerError;
use toil_services::ServiceManagerError;
use toil_stats::StatsAggregatorError;
use toil_state::ToilStateError;

#[derive(Debug, Error)]
pub enum LeaderError {
	#[error(transparent)]
	JobStore(#[from] JobStoreError),

	#[error(transparent)]
	BatchSystem(#[from] BatchSystemError),

	#[error(transparent)]
	Service(#[from] ServiceManagerError),

	#[error(transparent)]
	Stats(#[from] StatsAggregatorError),

	#[error(transparent)]
	Scaler(#[from] ClusterScalerError),

	#[error(transparent)]
	State(#[from] ToilStateError),

	/// `spec.md` §4.2 Step E / §7 "Auxiliary-thread death": a background
	/// task has died and the run cannot continue safely.
	#[error("auxiliary thread '{0}' has died")]
	AuxiliaryThreadDied(&'static str),

	/// `spec.md` §6 "Persisted state": the worker never wrote
	/// `rootJobReturnValue`, or it could not be read back.
	#[error("root job return value is missing or unreadable: {0}")]
	RootReturnValueMissing(JobStoreError),
}
