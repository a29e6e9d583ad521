//! Resumable LD_PRELOAD benchmark experiments.
//!
//! A command is measured repeatedly under named preload configurations.
//! Results land in a JSON database that is rewritten after every run, so an
//! interrupted invocation picks up where it stopped.

use chrono::Utc;
use std::fs;
use std::io::Write;
use std::path::Path;

mod error;
pub mod export;
pub mod fakes;
pub mod measure;
pub mod preload;
pub mod query;
mod record;
pub mod run;
pub mod schedule;
mod store;
pub mod summary;

pub use error::{BenchError, BenchResult};
pub use measure::{merge_environment, GnuTimeCapturer, MetricsCapturer, DEFAULT_PRELOAD_VAR};
pub use preload::{parse_env_assignment, parse_preload_spec, PreloadSpec};
pub use query::{delete_experiments, GlobPattern, NameMatcher};
pub use record::{Cell, ExperimentResult, Metrics, Table, COLUMNS};
pub use run::{execute_schedule, run_experiments, RunOptions, RunPlan, RunSummary};
pub use schedule::{calculate_schedule, shuffle_schedule, ScheduledItem};
pub use store::ResultStore;

pub(crate) fn ensure_dir(path: &Path) -> BenchResult<()> {
    fs::create_dir_all(path)?;
    Ok(())
}

/// Replace `path` with `bytes` via a synced sibling file and a rename, so a
/// reader only ever sees the previous or the new content.
pub(crate) fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> BenchResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(parent)?;
    }
    let ts = Utc::now().timestamp_micros();
    let pid = std::process::id();
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("tmpfile");
    let tmp = path.with_file_name(format!(".{}.tmp.{}.{}", name, pid, ts));
    let mut file = fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}
