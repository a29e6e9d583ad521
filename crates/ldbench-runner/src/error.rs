use thiserror::Error;

/// Errors surfaced by the runner library. Every variant aborts the current
/// command invocation; none of them are retried.
#[derive(Error, Debug)]
pub enum BenchError {
    /// The database file has content, but it is not an array of result records.
    #[error("malformed result database: {source}")]
    MalformedStore {
        #[source]
        source: serde_json::Error,
    },

    /// The timing facility itself failed. The measured command's own exit
    /// status never ends up here; it is recorded as data.
    #[error("measurement facility failed: {0}")]
    MeasurementFacility(String),

    /// A preload declaration or environment assignment could not be used.
    #[error("invalid configuration: {0}")]
    ConfigurationParse(String),

    #[error("unknown column: {0}")]
    UnknownColumn(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type BenchResult<T> = std::result::Result<T, BenchError>;
