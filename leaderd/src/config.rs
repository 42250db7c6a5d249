use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};
use toil_types::ResourceRequest;

/// CLI surface (`spec.md` §9 Ambient Stack). Every scheduling knob is
/// `Option` so we can tell "not given on the command line or via its `env`"
/// apart from "given, and happens to match the default" — the file config
/// only gets to supply a value when both are absent, mirroring
/// `AppConfig::load`'s CLI-args-always-win precedence.
#[derive(Parser, Debug)]
#[command(name = "leaderd", about = "Toil-style Leader control plane daemon")]
pub struct Args {
	/// Root job id to run.
	#[arg(long, env = "LEADERD_ROOT_JOB_ID")]
	pub root_job_id: String,

	/// Path to a TOML/JSON config file providing defaults for unset flags.
	#[arg(long)]
	pub config: Option<PathBuf>,

	/// Directory backing the reference file-based Job Store.
	#[arg(long, env = "LEADERD_JOB_STORE_DIR")]
	pub job_store_dir: Option<PathBuf>,

	/// Worker entry point prefixed onto every issued command.
	#[arg(long, env = "LEADERD_WORKER_ENTRY")]
	pub worker_entry: Option<String>,

	/// `spec.md` §4.5 `reissueOverLongJobs` threshold.
	#[arg(long, env = "LEADERD_MAX_JOB_DURATION_SECS")]
	pub max_job_duration_secs: Option<u64>,

	/// `spec.md` §4.2 Step D rescue cadence.
	#[arg(long, env = "LEADERD_RESCUE_JOBS_FREQUENCY_SECS")]
	pub rescue_jobs_frequency_secs: Option<u64>,

	/// `spec.md` §4.5 `reissueMissingJobs` threshold.
	#[arg(long, env = "LEADERD_KILL_AFTER_N_MISSING")]
	pub kill_after_n_missing: Option<u32>,

	/// `spec.md` §5 Batch System poll timeout.
	#[arg(long, env = "LEADERD_BATCH_POLL_TIMEOUT_SECS")]
	pub batch_poll_timeout_secs: Option<u64>,

	#[arg(long, env = "LEADERD_DEFAULT_MEMORY")]
	pub default_memory: Option<u64>,

	#[arg(long, env = "LEADERD_DEFAULT_CORES")]
	pub default_cores: Option<u32>,

	#[arg(long, env = "LEADERD_DEFAULT_DISK")]
	pub default_disk: Option<u64>,
}

/// On-disk shape, loaded before CLI/env overrides are applied. Field names
/// match `Args` so a config file reads like a frozen CLI invocation, the way
/// `AppConfig`'s fields mirror its own CLI/migration layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
	pub job_store_dir: Option<PathBuf>,
	pub worker_entry: Option<String>,
	pub max_job_duration_secs: Option<u64>,
	pub rescue_jobs_frequency_secs: Option<u64>,
	pub kill_after_n_missing: Option<u32>,
	pub batch_poll_timeout_secs: Option<u64>,
	pub default_memory: Option<u64>,
	pub default_cores: Option<u32>,
	pub default_disk: Option<u64>,
}

impl FileConfig {
	/// `.json` files parse with `serde_json`; anything else is treated as
	/// TOML (the `core::config::app_config` convention of preferring a
	/// human-editable format for on-disk config).
	pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
		let text = std::fs::read_to_string(path)?;
		if path.extension().and_then(|e| e.to_str()) == Some("json") {
			Ok(serde_json::from_str(&text)?)
		} else {
			Ok(toml::from_str(&text)?)
		}
	}
}

/// Merges `file` and `args` into a concrete [`toil_leader::LeaderConfig`]
/// plus the job-store directory used to construct the reference store.
/// CLI/env (already resolved into `args` by `clap`) wins whenever present.
pub fn build_leader_config(args: &Args, file: &FileConfig) -> (PathBuf, toil_leader::LeaderConfig) {
	let defaults = toil_leader::LeaderConfig::default();

	let job_store_dir = args
		.job_store_dir
		.clone()
		.or_else(|| file.job_store_dir.clone())
		.unwrap_or_else(|| PathBuf::from("./leaderd-data"));

	let worker_entry = args
		.worker_entry
		.clone()
		.or_else(|| file.worker_entry.clone())
		.unwrap_or(defaults.worker_entry);

	let max_job_duration_secs = args
		.max_job_duration_secs
		.or(file.max_job_duration_secs)
		.unwrap_or(defaults.max_job_duration.as_secs());

	let rescue_jobs_frequency_secs = args
		.rescue_jobs_frequency_secs
		.or(file.rescue_jobs_frequency_secs)
		.unwrap_or(defaults.rescue_jobs_frequency.as_secs());

	let kill_after_n_missing = args
		.kill_after_n_missing
		.or(file.kill_after_n_missing)
		.unwrap_or(defaults.kill_after_n_missing);

	let batch_poll_timeout_secs = args
		.batch_poll_timeout_secs
		.or(file.batch_poll_timeout_secs)
		.unwrap_or(defaults.batch_poll_timeout.as_secs());

	let default_memory = args.default_memory.or(file.default_memory).unwrap_or(defaults.default_resources.memory);
	let default_cores = args.default_cores.or(file.default_cores).unwrap_or(defaults.default_resources.cores);
	let default_disk = args.default_disk.or(file.default_disk).unwrap_or(defaults.default_resources.disk);

	let config = toil_leader::LeaderConfig {
		worker_entry,
		job_store_locator: job_store_dir.display().to_string(),
		batch_poll_timeout: std::time::Duration::from_secs(batch_poll_timeout_secs),
		rescue_jobs_frequency: std::time::Duration::from_secs(rescue_jobs_frequency_secs),
		max_job_duration: std::time::Duration::from_secs(max_job_duration_secs),
		kill_after_n_missing,
		default_resources: ResourceRequest::new(default_memory, default_cores, default_disk, false),
	};

	(job_store_dir, config)
}
