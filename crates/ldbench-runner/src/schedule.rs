use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{thread_rng, SeedableRng};

use crate::preload::{parse_preload_spec, PreloadSpec};

/// One pending repetition of a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledItem {
    pub name: String,
    pub spec: PreloadSpec,
}

/// Work still needed to bring every configuration up to `repetitions` runs.
///
/// `existing` reports how many results are already stored for a name.
/// Configurations at or above the target contribute nothing; the others
/// contribute `repetitions - existing` copies of their parsed spec, grouped
/// and in declaration order. Ordering for execution is left to
/// [`shuffle_schedule`].
pub fn calculate_schedule<F>(
    existing: F,
    repetitions: usize,
    configurations: &[(String, String)],
) -> Vec<ScheduledItem>
where
    F: Fn(&str) -> usize,
{
    let mut schedule = Vec::new();
    for (name, raw_spec) in configurations {
        let done = existing(name);
        if done >= repetitions {
            continue;
        }
        let spec = parse_preload_spec(raw_spec);
        for _ in done..repetitions {
            schedule.push(ScheduledItem {
                name: name.clone(),
                spec: spec.clone(),
            });
        }
    }
    schedule
}

/// Randomise execution order so measurements are not confounded with their
/// position in the run. A seed makes the order reproducible.
pub fn shuffle_schedule(schedule: &mut [ScheduledItem], seed: Option<u64>) {
    match seed {
        Some(seed) => schedule.shuffle(&mut StdRng::seed_from_u64(seed)),
        None => schedule.shuffle(&mut thread_rng()),
    }
}
