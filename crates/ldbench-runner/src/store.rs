use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use tracing::debug;

use crate::error::{BenchError, BenchResult};
use crate::record::{ExperimentResult, Table, COLUMNS};

/// Append-ordered collection of experiment results backed by a JSON array.
///
/// The file is the source of truth across invocations: load it once, insert,
/// and [`sync`](ResultStore::sync) after every insert. Queries are linear
/// scans over the in-memory records.
#[derive(Debug, Default, Clone)]
pub struct ResultStore {
    records: Vec<ExperimentResult>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the database at `path`. A missing or empty file is an empty store.
    pub fn open(path: &Path) -> BenchResult<Self> {
        let mut store = Self::new();
        match fs::File::open(path) {
            Ok(file) => store.load(file)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        debug!(path = %path.display(), records = store.len(), "loaded result database");
        Ok(store)
    }

    /// Append every record encoded in `reader`, in file order.
    pub fn load<R: Read>(&mut self, mut reader: R) -> BenchResult<()> {
        let mut contents = Vec::new();
        reader.read_to_end(&mut contents)?;
        if contents.iter().all(u8::is_ascii_whitespace) {
            return Ok(());
        }
        let records: Vec<ExperimentResult> = serde_json::from_slice(&contents)
            .map_err(|source| BenchError::MalformedStore { source })?;
        self.records.extend(records);
        Ok(())
    }

    /// Atomically replace the database at `path` with the current records.
    pub fn sync(&self, path: &Path) -> BenchResult<()> {
        let bytes = self.to_json_bytes()?;
        crate::atomic_write_bytes(path, &bytes)?;
        debug!(path = %path.display(), records = self.len(), "synced result database");
        Ok(())
    }

    /// Write the full JSON document to `writer`.
    pub fn write_json<W: Write>(&self, mut writer: W) -> BenchResult<()> {
        let bytes = self.to_json_bytes()?;
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(())
    }

    fn to_json_bytes(&self) -> BenchResult<Vec<u8>> {
        serde_json::to_vec_pretty(&self.records)
            .map_err(|e| BenchError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
    }

    pub fn insert(&mut self, record: ExperimentResult) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every record in insertion order. Each call starts a fresh pass.
    pub fn all(&self) -> impl Iterator<Item = &ExperimentResult> + '_ {
        self.records.iter()
    }

    pub fn where_name<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a ExperimentResult> + 'a {
        self.records.iter().filter(move |r| r.name == name)
    }

    pub fn filter<'a, P>(
        &'a self,
        mut predicate: P,
    ) -> impl Iterator<Item = &'a ExperimentResult> + 'a
    where
        P: FnMut(&ExperimentResult) -> bool + 'a,
    {
        self.records.iter().filter(move |r| predicate(r))
    }

    pub fn count_name(&self, name: &str) -> usize {
        self.where_name(name).count()
    }

    /// Remove every record matching `predicate` and return the removed ones.
    /// Survivors keep their relative order. Nothing is persisted here.
    pub fn delete_where<P>(&mut self, mut predicate: P) -> Vec<ExperimentResult>
    where
        P: FnMut(&ExperimentResult) -> bool,
    {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.records)
            .into_iter()
            .partition(|r| predicate(r));
        self.records = kept;
        removed
    }

    pub fn to_table(&self) -> Table {
        Table {
            columns: COLUMNS.to_vec(),
            rows: self.records.iter().map(ExperimentResult::to_row).collect(),
        }
    }
}
