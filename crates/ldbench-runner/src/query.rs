//! Glob selection of experiments by name.

use std::path::Path;

use tracing::info;

use crate::error::BenchResult;
use crate::record::ExperimentResult;
use crate::store::ResultStore;

/// A name pattern where `*` matches any run of characters and everything
/// else is literal. The whole name must match.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    glob: String,
    segments: Vec<String>,
}

impl GlobPattern {
    pub fn new(glob: &str) -> Self {
        Self {
            glob: glob.to_string(),
            segments: glob.split('*').map(str::to_string).collect(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.glob
    }

    /// The first segment anchors the start, the last anchors the end, and
    /// the middle ones are found leftmost-first in between.
    pub fn matches(&self, name: &str) -> bool {
        let (first, rest) = match self.segments.split_first() {
            Some(split) => split,
            None => return name.is_empty(),
        };
        let Some((last, middle)) = rest.split_last() else {
            return name == first.as_str();
        };
        let Some(mut remaining) = name
            .strip_prefix(first.as_str())
            .and_then(|rest| rest.strip_suffix(last.as_str()))
        else {
            return false;
        };
        for segment in middle {
            match remaining.find(segment.as_str()) {
                Some(pos) => remaining = &remaining[pos + segment.len()..],
                None => return false,
            }
        }
        true
    }
}

/// True when any of its patterns matches.
#[derive(Debug, Clone, Default)]
pub struct NameMatcher {
    patterns: Vec<GlobPattern>,
}

impl NameMatcher {
    pub fn new<S: AsRef<str>>(globs: &[S]) -> Self {
        Self {
            patterns: globs.iter().map(|g| GlobPattern::new(g.as_ref())).collect(),
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(name))
    }

    pub fn matches_record(&self, record: &ExperimentResult) -> bool {
        self.matches(&record.name)
    }
}

/// Delete every result in the database at `db_path` whose name matches one
/// of `globs`, persist the survivors and return how many were removed.
pub fn delete_experiments<S: AsRef<str>>(db_path: &Path, globs: &[S]) -> BenchResult<usize> {
    let matcher = NameMatcher::new(globs);
    let mut store = ResultStore::open(db_path)?;
    let count = store.delete_where(|r| matcher.matches_record(r)).len();
    store.sync(db_path)?;
    info!("deleted {} results", count);
    Ok(count)
}
