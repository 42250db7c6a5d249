use std::collections::HashSet;

use toil_job_store::JobStore;
use toil_types::{JobId, JobRecord};

use crate::error::LeaderError;

/// `spec.md` §4.3 `getSuccessors`: depth-first over every group in `job`'s
/// stack (not just the top — a failure invalidates every remaining phase),
/// skipping ids already in `already_seen`. Iterative with an explicit stack
/// rather than the reference implementation's recursion (`spec.md` §9
/// Design Notes).
pub(crate) async fn get_successors(
	job: &JobRecord,
	already_seen: &mut HashSet<JobId>,
	job_store: &dyn JobStore,
) -> Result<HashSet<JobId>, LeaderError> {
	let mut found = HashSet::new();
	let mut frontier = vec![job.clone()];

	while let Some(current) = frontier.pop() {
		for group in &current.stack {
			for edge in group {
				if !already_seen.insert(edge.succ_id.clone()) {
					continue;
				}
				found.insert(edge.succ_id.clone());
				if job_store.exists(&edge.succ_id).await {
					frontier.push(job_store.load(&edge.succ_id).await?);
				}
			}
		}
	}

	Ok(found)
}
