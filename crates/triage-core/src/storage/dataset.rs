//! Tabular dataset loading and binary encoding.
//!
//! A dataset has one designated target column and any number of symptom
//! columns. Symptom cells are coerced to `{0, 1}`; target cells become the
//! states of the target variable.
//!
//! ## State ordering
//!
//! Target states are sorted lexicographically. The order is stable across runs
//! and across row subsets (see [`Dataset::select_rows`]), and it determines the
//! positional indexing used by CPTs, factors and posteriors.

use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;

use crate::engine::errors::TriageError;
use crate::engine::evidence::Evidence;
use crate::engine::model::Variable;

/// State names of every symptom variable, in index order.
pub const SYMPTOM_STATES: [&str; 2] = ["0", "1"];

/// An encoded, validated table of records.
///
/// Columns keep the order of the source header. Each column stores the state
/// index of every record, so `column(i)[row]` indexes into `states(i)`.
#[derive(Debug, Clone)]
pub struct Dataset {
    names: Vec<String>,
    states: Vec<Vec<String>>,
    columns: Vec<Vec<usize>>,
    target: usize,
    rows: usize,
}

impl Dataset {
    /// Loads a CSV file with a header row.
    pub fn from_csv_path(path: impl AsRef<Path>, target: &str) -> Result<Self, TriageError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            TriageError::DataFormat(format!("cannot open '{}': {}", path.display(), e))
        })?;
        Self::from_reader(file, target)
    }

    /// Loads CSV records from any reader. The first row must be the header.
    pub fn from_reader<R: Read>(reader: R, target: &str) -> Result<Self, TriageError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
        }
        Self::from_rows(headers, rows, target)
    }

    /// Builds a dataset from an in-memory header and string rows.
    pub fn from_rows(
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
        target: &str,
    ) -> Result<Self, TriageError> {
        if headers.is_empty() {
            return Err(TriageError::DataFormat("dataset has no columns".into()));
        }
        let mut seen = BTreeSet::new();
        for name in &headers {
            if name.is_empty() {
                return Err(TriageError::DataFormat("empty column name in header".into()));
            }
            if !seen.insert(name.as_str()) {
                return Err(TriageError::DataFormat(format!(
                    "duplicate column '{}'",
                    name
                )));
            }
        }
        let target_idx = headers.iter().position(|h| h == target).ok_or_else(|| {
            TriageError::DataFormat(format!("target column '{}' not found", target))
        })?;
        if rows.is_empty() {
            return Err(TriageError::DataFormat("dataset has no records".into()));
        }

        let width = headers.len();
        for (row_idx, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(TriageError::DataFormat(format!(
                    "row {}: expected {} fields, found {}",
                    row_idx + 1,
                    width,
                    row.len()
                )));
            }
        }

        let target_states: Vec<String> = {
            let mut labels = BTreeSet::new();
            for (row_idx, row) in rows.iter().enumerate() {
                let label = row[target_idx].trim();
                if label.is_empty() {
                    return Err(TriageError::DataFormat(format!(
                        "row {}: missing value in target column '{}'",
                        row_idx + 1,
                        target
                    )));
                }
                labels.insert(label.to_string());
            }
            labels.into_iter().collect()
        };

        let mut states = Vec::with_capacity(width);
        let mut columns = Vec::with_capacity(width);
        for (col_idx, name) in headers.iter().enumerate() {
            if col_idx == target_idx {
                let column = rows
                    .iter()
                    .map(|row| {
                        let label = row[col_idx].trim();
                        // Labels were collected from these same rows.
                        target_states
                            .binary_search_by(|s| s.as_str().cmp(label))
                            .map_err(|_| {
                                TriageError::Internal(format!(
                                    "target label '{}' missing from state set",
                                    label
                                ))
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                states.push(target_states.clone());
                columns.push(column);
            } else {
                let column = rows
                    .iter()
                    .enumerate()
                    .map(|(row_idx, row)| parse_binary(&row[col_idx], row_idx, name))
                    .collect::<Result<Vec<_>, _>>()?;
                states.push(SYMPTOM_STATES.iter().map(|s| s.to_string()).collect());
                columns.push(column);
            }
        }

        Ok(Self {
            names: headers,
            states,
            columns,
            target: target_idx,
            rows: rows.len(),
        })
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Number of columns (symptoms plus target).
    pub fn num_variables(&self) -> usize {
        self.names.len()
    }

    /// Column names in header order.
    pub fn variable_names(&self) -> &[String] {
        &self.names
    }

    pub fn name(&self, variable: usize) -> &str {
        &self.names[variable]
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// State names of a column.
    pub fn states(&self, variable: usize) -> &[String] {
        &self.states[variable]
    }

    pub fn cardinality(&self, variable: usize) -> usize {
        self.states[variable].len()
    }

    /// Encoded state indices of a column, one per record.
    pub fn column(&self, variable: usize) -> &[usize] {
        &self.columns[variable]
    }

    pub fn target_index(&self) -> usize {
        self.target
    }

    pub fn target_name(&self) -> &str {
        &self.names[self.target]
    }

    /// Target labels in their stable (sorted) order.
    pub fn target_states(&self) -> &[String] {
        &self.states[self.target]
    }

    /// Symptom column names in header order.
    pub fn symptom_names(&self) -> Vec<&str> {
        self.names
            .iter()
            .enumerate()
            .filter(|(idx, _)| *idx != self.target)
            .map(|(_, name)| name.as_str())
            .collect()
    }

    /// Variables described by this table, in column order.
    pub fn variables(&self) -> Vec<Variable> {
        self.names
            .iter()
            .zip(&self.states)
            .map(|(name, states)| Variable::from_parts(name.clone(), states.clone()))
            .collect()
    }

    /// Target label of a record.
    pub fn target_label(&self, row: usize) -> &str {
        &self.states[self.target][self.columns[self.target][row]]
    }

    /// All symptom observations of a record, as evidence.
    pub fn row_evidence(&self, row: usize) -> Evidence {
        let mut evidence = Evidence::new();
        for (idx, name) in self.names.iter().enumerate() {
            if idx != self.target {
                evidence.insert(name.clone(), self.columns[idx][row]);
            }
        }
        evidence
    }

    /// Number of records per target state, indexed like [`Self::target_states`].
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.cardinality(self.target)];
        for &state in &self.columns[self.target] {
            counts[state] += 1;
        }
        counts
    }

    /// Returns a new dataset holding the given records, in the given order.
    ///
    /// State sets are preserved even when a subset no longer contains every
    /// target label, so indexing stays compatible with the full dataset.
    pub fn select_rows(&self, rows: &[usize]) -> Result<Self, TriageError> {
        if rows.is_empty() {
            return Err(TriageError::DataFormat("row selection is empty".into()));
        }
        if let Some(&bad) = rows.iter().find(|&&r| r >= self.rows) {
            return Err(TriageError::DataFormat(format!(
                "row index {} out of range for {} records",
                bad, self.rows
            )));
        }
        let columns = self
            .columns
            .iter()
            .map(|column| rows.iter().map(|&r| column[r]).collect())
            .collect();
        Ok(Self {
            names: self.names.clone(),
            states: self.states.clone(),
            columns,
            target: self.target,
            rows: rows.len(),
        })
    }
}

fn parse_binary(raw: &str, row_idx: usize, column: &str) -> Result<usize, TriageError> {
    let value = raw.trim();
    let parsed = match value {
        "0" | "0.0" => Some(0),
        "1" | "1.0" => Some(1),
        _ if value.eq_ignore_ascii_case("false") => Some(0),
        _ if value.eq_ignore_ascii_case("true") => Some(1),
        _ => None,
    };
    parsed.ok_or_else(|| {
        if value.is_empty() {
            TriageError::DataFormat(format!(
                "row {}: missing value in column '{}'",
                row_idx + 1,
                column
            ))
        } else {
            TriageError::DataFormat(format!(
                "row {}: non-binary value '{}' in column '{}'",
                row_idx + 1,
                value,
                column
            ))
        }
    })
}
