//! The resumable run loop: load, plan, shuffle, then measure and persist one
//! item at a time.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use tracing::{info, warn};

use crate::error::{BenchError, BenchResult};
use crate::measure::{merge_environment, MetricsCapturer, DEFAULT_PRELOAD_VAR};
use crate::preload::parse_env_assignment;
use crate::record::ExperimentResult;
use crate::schedule::{calculate_schedule, shuffle_schedule, ScheduledItem};
use crate::store::ResultStore;

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// `(name, raw preload spec)` in declaration order.
    pub configurations: Vec<(String, String)>,
    pub repetitions: usize,
    /// `NAME=VALUE` assignments applied to every run.
    pub env: Vec<String>,
    pub preload_var: String,
    pub seed: Option<u64>,
    pub command: Vec<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            configurations: Vec::new(),
            repetitions: 1,
            env: Vec::new(),
            preload_var: DEFAULT_PRELOAD_VAR.to_string(),
            seed: None,
            command: Vec::new(),
        }
    }
}

/// A validated invocation with its shuffled work list.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub schedule: Vec<ScheduledItem>,
    pub base_env: BTreeMap<String, String>,
    pub preload_var: String,
    pub command: Vec<String>,
}

impl RunPlan {
    /// Validate `options` against the results already in `store` and compute
    /// what remains. Fails before anything is executed.
    pub fn from_options(options: &RunOptions, store: &ResultStore) -> BenchResult<Self> {
        if options.command.is_empty() {
            return Err(BenchError::ConfigurationParse(
                "no command given".to_string(),
            ));
        }
        if options.preload_var.is_empty() {
            return Err(BenchError::ConfigurationParse(
                "preload variable name cannot be empty".to_string(),
            ));
        }
        let mut seen = BTreeSet::new();
        for (name, _) in &options.configurations {
            if !seen.insert(name.as_str()) {
                return Err(BenchError::ConfigurationParse(format!(
                    "preload configuration '{}' is declared more than once",
                    name
                )));
            }
        }
        let base_env = options
            .env
            .iter()
            .map(|raw| parse_env_assignment(raw))
            .collect::<BenchResult<BTreeMap<_, _>>>()?;

        let mut schedule = calculate_schedule(
            |name| store.count_name(name),
            options.repetitions,
            &options.configurations,
        );
        shuffle_schedule(&mut schedule, options.seed);

        Ok(Self {
            schedule,
            base_env,
            preload_var: options.preload_var.clone(),
            command: options.command.clone(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub scheduled: usize,
    pub executed: usize,
    pub nonzero_exits: usize,
    pub stored: usize,
}

/// Measure every item of `plan`, appending each result to `store` and
/// syncing it to `db_path` before the next item starts. A capturer error
/// stops the loop; everything measured so far is already on disk.
pub fn execute_schedule<C: MetricsCapturer>(
    plan: &RunPlan,
    store: &mut ResultStore,
    db_path: &Path,
    capturer: &mut C,
) -> BenchResult<RunSummary> {
    let total = plan.schedule.len();
    let mut summary = RunSummary {
        scheduled: total,
        ..RunSummary::default()
    };
    for (counter, item) in plan.schedule.iter().enumerate() {
        info!("running experiment {}/{}: {}", counter + 1, total, item.name);
        let env = merge_environment(&plan.base_env, &item.spec, &plan.preload_var);
        let metrics = capturer.measure(&plan.command, &env)?;
        if metrics.exit != 0 {
            warn!(experiment = %item.name, exit = metrics.exit, "command exited non-zero");
            summary.nonzero_exits += 1;
        }
        store.insert(ExperimentResult::new(item.name.clone(), metrics));
        store.sync(db_path)?;
        summary.executed += 1;
    }
    summary.stored = store.len();
    Ok(summary)
}

/// Load the database at `db_path`, plan the missing repetitions and run them.
pub fn run_experiments<C: MetricsCapturer>(
    options: &RunOptions,
    db_path: &Path,
    capturer: &mut C,
) -> BenchResult<RunSummary> {
    let mut store = ResultStore::open(db_path)?;
    let plan = RunPlan::from_options(options, &store)?;
    info!(
        "scheduled {} experiments, with {} in the database",
        plan.schedule.len(),
        store.len()
    );
    if !plan.schedule.is_empty() {
        capturer.check_command(&plan.command, &plan.base_env)?;
    }
    execute_schedule(&plan, &mut store, db_path, capturer)
}
