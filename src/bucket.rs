//! Partitioning a flat record list into fixed, named buckets.
//!
//! A bucketed catalog exports one list whose records carry a discriminant
//! field (`series`, `category`, ...). Each configured [`BucketRule`] maps one
//! discriminant value to one output file. Records are routed in input order:
//!
//! ```text
//! [{series: "Edge"}, {series: "ALF"}, {series: "Edge"}, {series: "Retro"}]
//!        │                  │                 │                 │
//!        ▼                  ▼                 ▼                 ▼
//!   edge.json[0]        alf.json[0]      edge.json[1]       unmatched
//! ```
//!
//! Every bucket is present in the result even when empty, and
//! `sum(bucket sizes) + unmatched == input length`. What happens to the
//! unmatched records is decided by the [`UnknownPolicy`].

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::fmt;
use thiserror::Error;

/// What to do with records whose discriminant matches no bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnknownPolicy {
    /// Discard them, logging at debug level only.
    Drop,
    /// Discard them with one warning naming the unmatched values.
    #[default]
    Warn,
    /// Fail the catalog; nothing is written.
    Reject,
}

impl fmt::Display for UnknownPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnknownPolicy::Drop => "drop",
            UnknownPolicy::Warn => "warn",
            UnknownPolicy::Reject => "reject",
        })
    }
}

/// One discriminant value and the file its records go to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BucketRule {
    pub value: String,
    /// Output file name, relative to the catalog's output directory.
    pub output: String,
}

#[derive(Error, Debug, PartialEq)]
pub enum BucketError {
    #[error("{count} record(s) with unrecognized {field}: {values}")]
    Unrecognized {
        field: String,
        count: usize,
        values: String,
    },
}

/// Result of [`partition`]: buckets in rule order, plus what matched none.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucketed {
    pub buckets: Vec<(BucketRule, Vec<Json>)>,
    pub unmatched: Vec<Json>,
}

impl Bucketed {
    pub fn total(&self) -> usize {
        self.buckets.iter().map(|(_, records)| records.len()).sum::<usize>() + self.unmatched.len()
    }
}

/// Short description of why a record matched no bucket, for messages.
fn describe_unmatched(record: &Json, field: &str) -> String {
    match record {
        Json::Object(map) => match map.get(field) {
            Some(Json::String(s)) => format!("{s:?}"),
            Some(other) => other.to_string(),
            None => format!("<no {field}>"),
        },
        _ => "<not an object>".to_string(),
    }
}

/// Route `records` into `rules` by the string value of `field`.
///
/// Non-object records and records whose discriminant is missing, not a
/// string, or not configured are unmatched; `policy` decides their fate.
pub fn partition(
    records: Vec<Json>,
    field: &str,
    rules: &[BucketRule],
    policy: UnknownPolicy,
) -> Result<Bucketed, BucketError> {
    let mut buckets: Vec<(BucketRule, Vec<Json>)> =
        rules.iter().map(|rule| (rule.clone(), Vec::new())).collect();
    let mut unmatched = Vec::new();

    for record in records {
        let slot = match record.get(field) {
            Some(Json::String(value)) => buckets.iter().position(|(rule, _)| rule.value == *value),
            _ => None,
        };
        match slot {
            Some(i) => buckets[i].1.push(record),
            None => unmatched.push(record),
        }
    }

    if !unmatched.is_empty() {
        let mut values: Vec<String> = Vec::new();
        for record in &unmatched {
            let described = describe_unmatched(record, field);
            if !values.contains(&described) {
                values.push(described);
            }
        }
        let values = values.join(", ");
        match policy {
            UnknownPolicy::Drop => {
                tracing::debug!(field, count = unmatched.len(), %values, "dropping unmatched records");
            }
            UnknownPolicy::Warn => {
                tracing::warn!(field, count = unmatched.len(), %values, "dropping unmatched records");
            }
            UnknownPolicy::Reject => {
                return Err(BucketError::Unrecognized {
                    field: field.to_string(),
                    count: unmatched.len(),
                    values,
                });
            }
        }
    }

    Ok(Bucketed { buckets, unmatched })
}
