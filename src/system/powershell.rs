//! Helpers for PowerShell scripts that report back as JSON.

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{Result, TuneError};

/// `ConvertTo-Json` emits a bare object for one result and an array for many.
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

/// Parse `ConvertTo-Json` output into a list. Empty output is an empty list.
pub fn parse_json_list<T: DeserializeOwned>(output: &str) -> Result<Vec<T>> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let parsed: OneOrMany<T> = serde_json::from_str(trimmed)
        .map_err(|e| TuneError::ParseError(format!("PowerShell JSON: {}", e)))?;
    Ok(match parsed {
        OneOrMany::Many(items) => items,
        OneOrMany::One(item) => vec![item],
    })
}

/// Quote a string as a single-quoted PowerShell literal.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
