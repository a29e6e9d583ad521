//! In-memory capturer for exercising the run loop without spawning processes.

use std::collections::BTreeMap;

use crate::error::{BenchError, BenchResult};
use crate::measure::MetricsCapturer;
use crate::record::Metrics;

/// One call observed by [`FakeCapturer`].
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub command: Vec<String>,
    pub env: BTreeMap<String, String>,
}

/// Returns scripted metrics. The n-th call reports `real = n` (1-based) and
/// `exit` taken from `exit_codes` when provided, so results stay traceable
/// to their call. Calls past `fail_after` fail like a broken timing facility.
#[derive(Debug, Default)]
pub struct FakeCapturer {
    pub invocations: Vec<Invocation>,
    pub exit_codes: Vec<i64>,
    pub fail_after: Option<usize>,
}

impl FakeCapturer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_after(calls: usize) -> Self {
        Self {
            fail_after: Some(calls),
            ..Self::default()
        }
    }

    pub fn with_exit_codes(exit_codes: Vec<i64>) -> Self {
        Self {
            exit_codes,
            ..Self::default()
        }
    }
}

impl MetricsCapturer for FakeCapturer {
    fn measure(
        &mut self,
        command: &[String],
        env: &BTreeMap<String, String>,
    ) -> BenchResult<Metrics> {
        let call = self.invocations.len();
        if self.fail_after.is_some_and(|limit| call >= limit) {
            return Err(BenchError::MeasurementFacility(format!(
                "fake facility failure on call {}",
                call + 1
            )));
        }
        self.invocations.push(Invocation {
            command: command.to_vec(),
            env: env.clone(),
        });
        Ok(Metrics {
            real: (call + 1) as f64,
            user: 0.5,
            sys: 0.25,
            mem_total_avg: 0,
            mem_max: 1024 + call as i64,
            exit: self.exit_codes.get(call).copied().unwrap_or(0),
        })
    }
}
