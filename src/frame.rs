//! In-memory tabular results.
//!
//! A [`Frame`] holds ordered column names and rows of JSON cells. Every row
//! has exactly one cell per column; when inputs disagree on the column set,
//! the frame takes the union in first-seen order and fills gaps with `null`.

use std::collections::HashMap;
use std::io::{self, Write};

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::{Map, Value};

use crate::error::{PermanentError, Result, TriError};

#[derive(Debug, Clone, Default)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    /// Upper-cased column name -> position.
    index: HashMap<String, usize>,
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.columns == other.columns && self.rows == other.rows
    }
}

/// Borrowed view of one row, addressable by column name.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    frame: &'a Frame,
    cells: &'a [Value],
}

impl<'a> Row<'a> {
    pub fn get(&self, column: &str) -> Option<&'a Value> {
        let cells = self.cells;
        self.frame.position(column).map(|i| &cells[i])
    }

    pub fn values(&self) -> &'a [Value] {
        self.cells
    }
}

/// Serializes as an array of objects, one per row, keys in column order.
impl Serialize for Frame {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for row in self.rows() {
            seq.serialize_element(&row)?;
        }
        seq.end()
    }
}

impl Serialize for Row<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (column, value) in self.frame.columns.iter().zip(self.cells) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a frame from column names and rows. Short rows are padded with
    /// `null`; long rows are rejected.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut frame = Frame::new();
        for column in columns {
            if frame.has_column(&column) {
                return Err(duplicate_column(&column));
            }
            frame.column_index(&column);
        }
        let width = frame.columns.len();
        for mut row in rows {
            if row.len() > width {
                return Err(PermanentError::Decode(format!(
                    "Row has {} cells but only {} columns",
                    row.len(),
                    width
                ))
                .into());
            }
            row.resize(width, Value::Null);
            frame.rows.push(row);
        }
        Ok(frame)
    }

    /// Decodes a JSON array of objects, the shape Envirofacts returns for
    /// `/JSON` requests.
    pub fn from_json_rows(body: &str) -> Result<Self> {
        let parsed: Value = serde_json::from_str(body)
            .map_err(|e| PermanentError::Decode(format!("Invalid JSON: {}", e)))?;

        let Value::Array(items) = parsed else {
            return Err(PermanentError::Decode(format!(
                "Expected a JSON array of rows, got: {}",
                type_name(&parsed)
            ))
            .into());
        };

        let mut frame = Frame::new();
        for item in items {
            let Value::Object(object) = item else {
                return Err(PermanentError::Decode(format!(
                    "Expected each row to be a JSON object, got: {}",
                    type_name(&item)
                ))
                .into());
            };
            frame.push_object(object)?;
        }
        Ok(frame)
    }

    /// Decodes a CSV payload with a header row. Empty cells become `null`
    /// and every other cell stays a string, so a number that arrives as
    /// `2020` over JSON arrives as `"2020"` here.
    pub fn from_csv(body: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(body.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| PermanentError::Decode(format!("Invalid CSV header: {}", e)))?
            .clone();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record =
                record.map_err(|e| PermanentError::Decode(format!("Invalid CSV row: {}", e)))?;
            let row = record
                .iter()
                .map(|cell| {
                    if cell.is_empty() {
                        Value::Null
                    } else {
                        Value::String(cell.to_string())
                    }
                })
                .collect();
            rows.push(row);
        }

        Frame::from_rows(headers.iter().map(str::to_string).collect(), rows)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.position(column).is_some()
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(move |cells| Row { frame: self, cells })
    }

    pub fn row(&self, i: usize) -> Option<Row<'_>> {
        self.rows.get(i).map(|cells| Row { frame: self, cells })
    }

    /// All values of one column, in row order. Column names match
    /// case-insensitively.
    pub fn column(&self, column: &str) -> Option<Vec<&Value>> {
        let i = self.position(column)?;
        Some(self.rows.iter().map(|row| &row[i]).collect())
    }

    /// Appends the rows of `other`, widening the column set as needed.
    pub fn append(&mut self, other: Frame) {
        if self.columns.is_empty() && self.rows.is_empty() {
            *self = other;
            return;
        }

        let mapping: Vec<usize> = other
            .columns
            .iter()
            .map(|c| self.column_index(c))
            .collect();
        let width = self.columns.len();

        for row in other.rows {
            let mut out = vec![Value::Null; width];
            for (cell, &target) in row.into_iter().zip(&mapping) {
                out[target] = cell;
            }
            self.rows.push(out);
        }
    }

    /// Rows as a JSON array of objects.
    pub fn to_json_rows(&self) -> Value {
        Value::Array(
            self.rows
                .iter()
                .map(|row| {
                    let object: Map<String, Value> = self
                        .columns
                        .iter()
                        .cloned()
                        .zip(row.iter().cloned())
                        .collect();
                    Value::Object(object)
                })
                .collect(),
        )
    }

    /// Writes the frame as CSV with a header row. `null` becomes an empty cell.
    pub fn write_csv<W: Write>(&self, writer: W) -> io::Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        if !self.columns.is_empty() {
            writer.write_record(&self.columns)?;
        }
        for row in &self.rows {
            writer.write_record(row.iter().map(cell_to_string))?;
        }
        writer.flush()
    }

    fn position(&self, column: &str) -> Option<usize> {
        self.index.get(&column.to_ascii_uppercase()).copied()
    }

    /// Position of `column`, adding it (and padding existing rows) if new.
    fn column_index(&mut self, column: &str) -> usize {
        let key = column.to_ascii_uppercase();
        if let Some(&i) = self.index.get(&key) {
            return i;
        }
        let i = self.columns.len();
        self.columns.push(column.to_string());
        self.index.insert(key, i);
        for row in &mut self.rows {
            row.push(Value::Null);
        }
        i
    }

    /// Keys that differ only in case would land in the same column.
    fn push_object(&mut self, object: Map<String, Value>) -> Result<()> {
        let mut row = vec![Value::Null; self.columns.len()];
        let mut filled = Vec::with_capacity(object.len());
        for (key, value) in object {
            let i = self.column_index(&key);
            if filled.contains(&i) {
                return Err(duplicate_column(&key));
            }
            filled.push(i);
            if i >= row.len() {
                row.resize(i + 1, Value::Null);
            }
            row[i] = value;
        }
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
        Ok(())
    }
}

fn duplicate_column(column: &str) -> TriError {
    PermanentError::Decode(format!(
        "Column {:?} appears twice (names are case-insensitive)",
        column
    ))
    .into()
}

fn cell_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
