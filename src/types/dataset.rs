//! Tabular claim datasets and their numeric feature view

use crate::error::DataError;
use std::io::Read;
use std::path::Path;

/// Default name of the fraud-label column in claim datasets.
pub const DEFAULT_LABEL_COLUMN: &str = "PotentialFraud";

/// A delimited-text table of claim records.
///
/// Cells are kept as text so exported rows reproduce the uploaded values exactly.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Dataset {
    /// Build a dataset, checking every row has one cell per column.
    pub fn from_parts(columns: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self, DataError> {
        if let Some((index, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(DataError::Unreadable {
                reason: format!(
                    "row {} has {} cells, header has {} columns",
                    index,
                    row.len(),
                    columns.len()
                ),
            });
        }
        Ok(Self { columns, rows })
    }

    /// Parse comma-separated text with a header row.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, DataError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(reader);

        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Self::from_parts(columns, rows)
    }

    pub fn from_csv_bytes(bytes: &[u8]) -> Result<Self, DataError> {
        Self::from_csv_reader(bytes)
    }

    /// Read a dataset from disk.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, DataError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => DataError::NotFound {
                path: path.to_path_buf(),
            },
            _ => DataError::Unreadable {
                reason: format!("{}: {}", path.display(), e),
            },
        })?;
        Self::from_csv_reader(std::io::BufReader::new(file))
    }

    /// Serialize as UTF-8 comma-separated text: header row, then one line per record.
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>, DataError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.into_inner().map_err(|e| DataError::Unreadable {
            reason: e.to_string(),
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Numeric view over every column except `label_column`.
    pub fn feature_matrix(&self, label_column: &str) -> Result<FeatureMatrix, DataError> {
        let label_index = self.column_index(label_column);
        let feature_indices: Vec<usize> = (0..self.columns.len())
            .filter(|&i| Some(i) != label_index)
            .collect();

        let columns = feature_indices
            .iter()
            .map(|&i| self.columns[i].clone())
            .collect();

        let mut values = Vec::with_capacity(self.rows.len());
        for (row_index, row) in self.rows.iter().enumerate() {
            let mut parsed = Vec::with_capacity(feature_indices.len());
            for &i in &feature_indices {
                let cell = row[i].trim();
                let value = cell
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| DataError::SchemaMismatch {
                        column: self.columns[i].clone(),
                        row: row_index,
                        value: row[i].clone(),
                    })?;
                parsed.push(value);
            }
            values.push(parsed);
        }

        Ok(FeatureMatrix { columns, values })
    }

    /// Ground-truth fraud labels from `label_column`.
    pub fn labels(&self, label_column: &str) -> Result<Vec<bool>, DataError> {
        let index = self
            .column_index(label_column)
            .ok_or_else(|| DataError::MissingLabelColumn {
                column: label_column.to_string(),
            })?;

        self.rows
            .iter()
            .enumerate()
            .map(|(row, cells)| {
                parse_label(&cells[index]).ok_or_else(|| DataError::InvalidLabel {
                    row,
                    value: cells[index].clone(),
                })
            })
            .collect()
    }

    /// Copy of this dataset with `flags` written as 0/1 into `column`.
    ///
    /// An existing column is overwritten in place; otherwise it is appended last.
    pub fn with_flag_column(&self, column: &str, flags: &[bool]) -> Dataset {
        let mut augmented = self.clone();
        let index = match augmented.column_index(column) {
            Some(index) => index,
            None => {
                augmented.columns.push(column.to_string());
                for row in &mut augmented.rows {
                    row.push(String::new());
                }
                augmented.columns.len() - 1
            }
        };

        for (row, &flag) in augmented.rows.iter_mut().zip(flags) {
            row[index] = if flag { "1" } else { "0" }.to_string();
        }
        augmented
    }

    /// Rows where `keep` is true, in their original order.
    pub fn filter_rows(&self, keep: &[bool]) -> Dataset {
        let rows = self
            .rows
            .iter()
            .zip(keep)
            .filter(|(_, &k)| k)
            .map(|(row, _)| row.clone())
            .collect();

        Dataset {
            columns: self.columns.clone(),
            rows,
        }
    }
}

fn parse_label(cell: &str) -> Option<bool> {
    match cell.trim().to_ascii_lowercase().as_str() {
        "1" | "1.0" | "yes" | "true" => Some(true),
        "0" | "0.0" | "no" | "false" => Some(false),
        _ => None,
    }
}

/// Row-major numeric feature table handed to detectors.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    values: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    /// Build from row-major values; rows shorter or longer than `columns` are rejected.
    pub fn new(columns: Vec<String>, values: Vec<Vec<f64>>) -> Result<Self, DataError> {
        if let Some(row) = values.iter().position(|r| r.len() != columns.len()) {
            return Err(DataError::Unreadable {
                reason: format!("feature row {} does not match {} columns", row, columns.len()),
            });
        }
        for (row, r) in values.iter().enumerate() {
            if let Some(j) = r.iter().position(|v| !v.is_finite()) {
                return Err(DataError::SchemaMismatch {
                    column: columns[j].clone(),
                    row,
                    value: r[j].to_string(),
                });
            }
        }
        Ok(Self { columns, values })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn n_rows(&self) -> usize {
        self.values.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn row(&self, index: usize) -> &[f64] {
        &self.values[index]
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.values
    }

    /// Copy of one column's values
    pub fn column(&self, index: usize) -> Vec<f64> {
        self.values.iter().map(|row| row[index]).collect()
    }
}
