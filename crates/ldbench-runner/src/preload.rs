//! Lexical parsing of preload declarations such as `"libfoo.so x=1"`.

use std::collections::BTreeMap;

use crate::error::{BenchError, BenchResult};

/// Libraries to preload and extra environment for one configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreloadSpec {
    pub libraries: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl PreloadSpec {
    /// Value for the preload variable: the libraries joined by single spaces.
    pub fn preload_value(&self) -> String {
        self.libraries.join(" ")
    }
}

/// Split `raw` on whitespace. Tokens containing `=` become environment
/// assignments (split at the first `=`, later duplicates win); every other
/// token is a library path, kept in order. Nothing is validated.
pub fn parse_preload_spec(raw: &str) -> PreloadSpec {
    let mut spec = PreloadSpec::default();
    for token in raw.split_whitespace() {
        match token.split_once('=') {
            Some((name, value)) => {
                spec.env.insert(name.to_string(), value.to_string());
            }
            None => spec.libraries.push(token.to_string()),
        }
    }
    spec
}

/// Parse a `NAME=VALUE` assignment given on the command line.
pub fn parse_env_assignment(raw: &str) -> BenchResult<(String, String)> {
    let (name, value) = raw.split_once('=').ok_or_else(|| {
        BenchError::ConfigurationParse(format!(
            "invalid environment assignment '{}': expected NAME=VALUE",
            raw
        ))
    })?;
    if name.is_empty() {
        return Err(BenchError::ConfigurationParse(format!(
            "invalid environment assignment '{}': name cannot be empty",
            raw
        )));
    }
    Ok((name.to_string(), value.to_string()))
}
