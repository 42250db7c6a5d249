use serde::Deserialize;
use tracing::Level;

/// One stats/logging blob as written by a worker (`spec.md` §4.6,
/// `original_source/src/toil/leader.py` `StatsAndLogging.statsAndLoggingAggregator`).
/// Both fields are absent on an ordinary successful job that never called
/// `logToMaster` and produced no attached worker log.
#[derive(Debug, Default, Deserialize)]
struct StatsBlob {
	#[serde(default)]
	workers: Option<WorkersSection>,
	#[serde(default)]
	logs: Option<Vec<JobLog>>,
}

#[derive(Debug, Deserialize)]
struct WorkersSection {
	#[serde(default, rename = "logsToMaster")]
	logs_to_master: Vec<LogMessage>,
}

#[derive(Debug, Deserialize)]
struct LogMessage {
	level: u32,
	text: String,
}

#[derive(Debug, Deserialize)]
struct JobLog {
	#[serde(rename = "jobStoreID")]
	job_store_id: String,
	text: String,
}

/// Parses one blob and emits its contents via `tracing`. Malformed blobs are
/// logged and dropped rather than aborting the aggregator.
pub(crate) fn process_blob(raw: &[u8]) {
	let blob: StatsBlob = match serde_json::from_slice(raw) {
		Ok(blob) => blob,
		Err(error) => {
			tracing::warn!(%error, "dropping malformed stats/logging blob");
			return;
		}
	};

	if let Some(workers) = blob.workers {
		for message in workers.logs_to_master {
			emit_worker_message(&message);
		}
	}

	if let Some(logs) = blob.logs {
		emit_job_logs(&logs);
	}
}

fn emit_worker_message(message: &LogMessage) {
	match python_log_level(message.level) {
		Level::ERROR => tracing::error!(text = %message.text, "message from job"),
		Level::WARN => tracing::warn!(text = %message.text, "message from job"),
		Level::INFO => tracing::info!(text = %message.text, "message from job"),
		Level::DEBUG => tracing::debug!(text = %message.text, "message from job"),
		Level::TRACE => tracing::trace!(text = %message.text, "message from job"),
	}
}

/// Maps Python `logging` module levels (`CRITICAL=50` .. `DEBUG=10`) onto
/// `tracing::Level`.
fn python_log_level(level: u32) -> Level {
	match level {
		40..=u32::MAX => Level::ERROR,
		30..=39 => Level::WARN,
		20..=29 => Level::INFO,
		10..=19 => Level::DEBUG,
		_ => Level::TRACE,
	}
}

/// Groups contiguous entries by `job_store_id` before emitting, matching the
/// reference implementation's `logWithFormatting` grouping (a worker may
/// attach logs from more than one job in a single blob).
fn emit_job_logs(logs: &[JobLog]) {
	let mut iter = logs.iter();
	let Some(first) = iter.next() else { return };

	let mut current_id = first.job_store_id.as_str();
	let mut group = vec![first.text.as_str()];

	for log in iter {
		if log.job_store_id == current_id {
			group.push(log.text.as_str());
		} else {
			flush_job_log_group(current_id, &group);
			current_id = log.job_store_id.as_str();
			group = vec![log.text.as_str()];
		}
	}
	flush_job_log_group(current_id, &group);
}

fn flush_job_log_group(job_store_id: &str, lines: &[&str]) {
	tracing::debug!(job_store_id, log = %lines.join("\n    "), "received worker log");
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn malformed_blob_does_not_panic() {
		process_blob(b"not json");
	}

	#[test]
	fn empty_blob_is_a_no_op() {
		process_blob(b"{}");
	}

	#[test]
	fn python_level_mapping_matches_logging_module() {
		assert_eq!(python_log_level(50), Level::ERROR);
		assert_eq!(python_log_level(40), Level::ERROR);
		assert_eq!(python_log_level(30), Level::WARN);
		assert_eq!(python_log_level(20), Level::INFO);
		assert_eq!(python_log_level(10), Level::DEBUG);
		assert_eq!(python_log_level(0), Level::TRACE);
	}
}
