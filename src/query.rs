//! Filter conditions and their encoding into Envirofacts URL segments.
//!
//! Envirofacts expresses filters as path segments after the table name:
//! `COLUMN/VALUE` for equality and `COLUMN/in/V1,V2` for set membership.

use std::collections::BTreeMap;

use crate::error::{PermanentError, Result};

/// A condition on a single column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Equals(String),
    OneOf(Vec<String>),
}

impl Condition {
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Condition::Equals(expected) => expected == value,
            Condition::OneOf(values) => values.iter().any(|v| v == value),
        }
    }

    fn segments(&self, column: &str) -> Result<Vec<String>> {
        match self {
            Condition::Equals(value) => {
                check_value(column, value)?;
                Ok(vec![column.to_string(), value.clone()])
            }
            Condition::OneOf(values) if values.is_empty() => {
                Err(PermanentError::InvalidRequest(format!(
                    "Condition on {} has an empty value list",
                    column
                ))
                .into())
            }
            Condition::OneOf(values) => {
                for v in values {
                    check_value(column, v)?;
                }
                if values.len() == 1 {
                    return Ok(vec![column.to_string(), values[0].clone()]);
                }
                if let Some(v) = values.iter().find(|v| v.contains(',')) {
                    return Err(PermanentError::InvalidRequest(format!(
                        "Value {:?} for {} contains a comma and cannot be used in a list",
                        v, column
                    ))
                    .into());
                }
                Ok(vec![column.to_string(), "in".to_string(), values.join(",")])
            }
        }
    }
}

/// Path words the service reads as operators rather than values.
const RESERVED_SEGMENTS: [&str; 5] = ["in", "rows", "COUNT", "JSON", "CSV"];

/// A blank value would vanish from the URL and shift every later segment.
fn check_value(column: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(
            PermanentError::InvalidRequest(format!("Empty value for {}", column)).into(),
        );
    }
    if RESERVED_SEGMENTS.contains(&value) {
        return Err(PermanentError::InvalidRequest(format!(
            "Value {:?} for {} is a reserved path segment",
            value, column
        ))
        .into());
    }
    Ok(())
}

impl From<&str> for Condition {
    fn from(value: &str) -> Self {
        Condition::Equals(value.to_string())
    }
}

impl From<String> for Condition {
    fn from(value: String) -> Self {
        Condition::Equals(value)
    }
}

impl<S: Into<String>> From<Vec<S>> for Condition {
    fn from(values: Vec<S>) -> Self {
        Condition::OneOf(values.into_iter().map(Into::into).collect())
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for Condition {
    fn from(values: [S; N]) -> Self {
        Condition::OneOf(values.into_iter().map(Into::into).collect())
    }
}

/// Column conditions for one query, keyed by upper-cased column name.
///
/// An empty filter selects every row of the table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    conditions: BTreeMap<String, Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the condition on `column`.
    pub fn with(mut self, column: &str, condition: impl Into<Condition>) -> Self {
        self.insert(column, condition);
        self
    }

    pub fn equals(self, column: &str, value: impl Into<String>) -> Self {
        self.with(column, Condition::Equals(value.into()))
    }

    pub fn one_of<I, S>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with(
            column,
            Condition::OneOf(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn insert(&mut self, column: &str, condition: impl Into<Condition>) {
        self.conditions
            .insert(column.trim().to_ascii_uppercase(), condition.into());
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.conditions.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Condition)> {
        self.conditions.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Unencoded path segments for this filter, in column order.
    pub fn to_segments(&self) -> Result<Vec<String>> {
        let mut segments = Vec::new();
        for (column, condition) in &self.conditions {
            if !is_identifier(column) {
                return Err(PermanentError::InvalidRequest(format!(
                    "Invalid column name: {:?}",
                    column
                ))
                .into());
            }
            segments.extend(condition.segments(column)?);
        }
        Ok(segments)
    }
}

impl<K, C> FromIterator<(K, C)> for Filter
where
    K: AsRef<str>,
    C: Into<Condition>,
{
    fn from_iter<T: IntoIterator<Item = (K, C)>>(iter: T) -> Self {
        let mut filter = Filter::new();
        for (column, condition) in iter {
            filter.insert(column.as_ref(), condition);
        }
        filter
    }
}

/// Table and column names: non-empty ASCII alphanumerics and underscores.
pub fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
