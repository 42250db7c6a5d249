use std::collections::HashMap;
use std::collections::hash_map::Entry;

use tracing::trace;

use toil_job_store::JobStore;
use toil_types::{JobId, JobRecord, JobStatus};

use crate::error::ToilStateError;
use crate::state::ToilState;

/// A unit of work in the explicit traversal frontier (`spec.md` §9 Design
/// Notes: "iterative with an explicit stack" in place of the reference
/// implementation's recursion).
enum Frontier {
	/// Load this id (from the cache, falling back to the Job Store) before
	/// visiting it.
	ToLoad(JobId),
	/// Already loaded and merged (a join node whose predecessors just all
	/// finished); visit it directly.
	Ready(Box<JobRecord>),
}

/// `spec.md` §4.1: rebuild a full [`ToilState`] by depth-first traversal
/// from `root_id`, merging multi-predecessor joins along the way.
///
/// `job_cache` is consulted before falling back to `job_store.load`.
pub async fn build_toil_state(
	job_store: &dyn JobStore,
	root_id: &JobId,
	job_cache: Option<&HashMap<JobId, JobRecord>>,
) -> Result<ToilState, ToilStateError> {
	let mut state = ToilState::new();
	let mut frontier = vec![Frontier::ToLoad(root_id.clone())];

	while let Some(item) = frontier.pop() {
		let job = match item {
			Frontier::ToLoad(id) => load(job_store, job_cache, &id).await?,
			Frontier::Ready(job) => *job,
		};
		visit(job, job_store, job_cache, &mut state, &mut frontier).await?;
	}

	Ok(state)
}

async fn load(
	job_store: &dyn JobStore,
	job_cache: Option<&HashMap<JobId, JobRecord>>,
	id: &JobId,
) -> Result<JobRecord, ToilStateError> {
	if let Some(cached) = job_cache.and_then(|cache| cache.get(id)) {
		return Ok(cached.clone());
	}
	Ok(job_store.load(id).await?)
}

async fn visit(
	mut job: JobRecord,
	job_store: &dyn JobStore,
	job_cache: Option<&HashMap<JobId, JobRecord>>,
	state: &mut ToilState,
	frontier: &mut Vec<Frontier>,
) -> Result<(), ToilStateError> {
	if job.is_runnable_leaf() {
		trace!(job_id = %job.id, "runnable leaf discovered during build");
		if job.is_checkpoint() {
			job.restore_checkpoint();
		}
		state.enqueue_updated(job, JobStatus::Fresh);
		return Ok(());
	}

	// Internal node: it owes work to every successor in its top group.
	let top_group = job
		.top_successor_group()
		.expect("non-leaf jobs always have a non-empty top successor group")
		.to_vec();

	state
		.successor_counts
		.insert(job.id.clone(), top_group.len() as u32);

	for edge in &top_group {
		match state.successor_to_predecessors.entry(edge.succ_id.clone()) {
			Entry::Vacant(entry) => {
				entry.insert(vec![job.clone()]);

				if let Some(pred_id) = &edge.predecessor_id {
					let succ_record = load(job_store, job_cache, &edge.succ_id).await?;
					state.join_pending.insert(edge.succ_id.clone(), succ_record);
					process_join(state, &edge.succ_id, pred_id, frontier)?;
				} else {
					frontier.push(Frontier::ToLoad(edge.succ_id.clone()));
				}
			}
			Entry::Occupied(mut entry) => {
				entry.get_mut().push(job.clone());

				if state.join_pending.contains_key(&edge.succ_id) {
					if let Some(pred_id) = &edge.predecessor_id {
						process_join(state, &edge.succ_id, pred_id, frontier)?;
					}
				}
			}
		}
	}

	Ok(())
}

/// `spec.md` §4.1 "process-join": records `pred_id` as finished for the join
/// node `succ_id`; once every expected predecessor has reported, the node
/// moves from `join_pending` back onto the frontier.
fn process_join(
	state: &mut ToilState,
	succ_id: &JobId,
	pred_id: &JobId,
	frontier: &mut Vec<Frontier>,
) -> Result<(), ToilStateError> {
	let record = state
		.join_pending
		.get_mut(succ_id)
		.ok_or_else(|| ToilStateError::JoinNotPending(succ_id.clone()))?;

	record.predecessors_finished.insert(pred_id.clone());

	if record.predecessors_finished.len() as u32 == record.predecessor_number {
		let record = state
			.join_pending
			.remove(succ_id)
			.expect("just confirmed present above");
		frontier.push(Frontier::Ready(Box::new(record)));
	}

	Ok(())
}
