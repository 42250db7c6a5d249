//! Reference in-process implementations of the Job Store, Batch System, and
//! Cluster Scaler external interfaces (`spec.md` §6), used by the test
//! suites of other crates in this workspace and by the `leaderd` demo
//! binary. Not a production backend: a real deployment swaps these for a
//! durable store and a cluster-aware batch system without the Leader
//! noticing.

mod batch_system;
mod job_store;
mod scaler;

pub use batch_system::ProcessBatchSystem;
pub use job_store::FileJobStore;
pub use scaler::NullClusterScaler;
