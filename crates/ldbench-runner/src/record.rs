use serde::{Deserialize, Deserializer, Serialize};

/// Column order shared by the table export, CSV and plots.
pub const COLUMNS: [&str; 7] = [
    "name",
    "real",
    "user",
    "sys",
    "mem_total_avg",
    "mem_max",
    "exit",
];

/// Metrics reported for a single execution of the measured command.
///
/// Times are seconds, memory figures are kilobytes. `mem_total_avg` comes
/// from the kernel's time-averaged accounting and is unreliable on Linux.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Metrics {
    pub real: f64,
    pub user: f64,
    pub sys: f64,
    pub mem_total_avg: i64,
    pub mem_max: i64,
    pub exit: i64,
}

/// One measured run of the command under a named configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExperimentResult {
    pub name: String,
    #[serde(deserialize_with = "non_negative_seconds")]
    pub real: f64,
    #[serde(deserialize_with = "non_negative_seconds")]
    pub user: f64,
    #[serde(deserialize_with = "non_negative_seconds")]
    pub sys: f64,
    pub mem_total_avg: i64,
    pub mem_max: i64,
    pub exit: i64,
}

fn non_negative_seconds<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(serde::de::Error::custom(format!(
            "time must be a non-negative number of seconds, got {}",
            value
        )))
    }
}

impl ExperimentResult {
    pub fn new(name: impl Into<String>, metrics: Metrics) -> Self {
        Self {
            name: name.into(),
            real: metrics.real,
            user: metrics.user,
            sys: metrics.sys,
            mem_total_avg: metrics.mem_total_avg,
            mem_max: metrics.mem_max,
            exit: metrics.exit,
        }
    }

    /// Numeric value of a metric column, `None` for `name` or unknown columns.
    pub fn metric(&self, column: &str) -> Option<f64> {
        match column {
            "real" => Some(self.real),
            "user" => Some(self.user),
            "sys" => Some(self.sys),
            "mem_total_avg" => Some(self.mem_total_avg as f64),
            "mem_max" => Some(self.mem_max as f64),
            "exit" => Some(self.exit as f64),
            _ => None,
        }
    }

    pub fn to_row(&self) -> Vec<Cell> {
        vec![
            Cell::Text(self.name.clone()),
            Cell::Float(self.real),
            Cell::Float(self.user),
            Cell::Float(self.sys),
            Cell::Int(self.mem_total_avg),
            Cell::Int(self.mem_max),
            Cell::Int(self.exit),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Float(f64),
    Int(i64),
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Text(s) => f.write_str(s),
            Cell::Float(v) => write!(f, "{:?}", v),
            Cell::Int(v) => write!(f, "{}", v),
        }
    }
}

/// Records laid out as rows under [`COLUMNS`], in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub columns: Vec<&'static str>,
    pub rows: Vec<Vec<Cell>>,
}
