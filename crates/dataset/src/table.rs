//! Comma-Separated Table I/O
//!
//! Raw statistics files may carry extra columns (sample ids, metadata) and
//! may omit the label for inference input. Engineered checkpoints are strict:
//! exactly the expected feature columns, in order, then the label.

use crate::error::{DatasetError, SchemaError};
use crate::record::{check_columns, Dataset, FeatureRecord};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

/// One row of a raw statistics table
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// Numeric columns, aligned with `RawTable::columns`
    pub values: Vec<f64>,
    /// Label, absent for inference input
    pub label: Option<String>,
}

/// Raw extracted statistics as read from disk
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    /// Numeric column names (label column excluded)
    pub columns: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl RawTable {
    /// Parse a table from any buffered reader
    pub fn from_reader<R: BufRead>(reader: R, label_column: &str) -> Result<Self, DatasetError> {
        let mut lines = reader.lines().enumerate();

        let header = loop {
            match lines.next() {
                Some((_, line)) => {
                    let line = line?;
                    if !line.trim().is_empty() {
                        break split_fields(&line);
                    }
                }
                None => return Err(SchemaError::Empty("missing header row".into()).into()),
            }
        };

        let label_idx = header.iter().position(|c| c == label_column);
        let columns: Vec<String> = header
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != label_idx)
            .map(|(_, c)| c.clone())
            .collect();

        let mut rows = Vec::new();
        for (line_no, line) in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let fields = split_fields(&line);
            if fields.len() != header.len() {
                return Err(SchemaError::RaggedRow {
                    row: line_no,
                    expected: header.len(),
                    actual: fields.len(),
                }
                .into());
            }

            let mut values = Vec::with_capacity(columns.len());
            let mut label = None;
            for (i, field) in fields.into_iter().enumerate() {
                if Some(i) == label_idx {
                    label = Some(field);
                    continue;
                }
                values.push(parse_value(&field, line_no, &header[i])?);
            }
            rows.push(RawRow { values, label });
        }

        debug!("Parsed raw table: {} columns, {} rows", columns.len(), rows.len());
        Ok(Self { columns, rows })
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// View every numeric column as a dataset (unlabelled rows get an empty label)
    pub fn to_raw_dataset(&self) -> Result<Dataset, SchemaError> {
        let records = self
            .rows
            .iter()
            .map(|row| FeatureRecord::new(row.values.clone(), row.label.clone().unwrap_or_default()))
            .collect();
        Dataset::from_records(self.columns.clone(), records)
    }
}

/// Read a raw statistics table from disk
pub fn read_raw_table(path: &Path, label_column: &str) -> Result<RawTable, DatasetError> {
    let file = File::open(path)?;
    let table = RawTable::from_reader(BufReader::new(file), label_column)?;
    info!("Loaded {} raw rows from {}", table.len(), path.display());
    Ok(table)
}

/// Read an engineered checkpoint, optionally enforcing the feature list
pub fn read_dataset(
    path: &Path,
    expected: Option<&[String]>,
    label_column: &str,
) -> Result<Dataset, DatasetError> {
    let file = File::open(path)?;
    let dataset = dataset_from_reader(BufReader::new(file), expected, label_column)?;
    info!("Loaded {} records from {}", dataset.len(), path.display());
    Ok(dataset)
}

fn dataset_from_reader<R: BufRead>(
    reader: R,
    expected: Option<&[String]>,
    label_column: &str,
) -> Result<Dataset, DatasetError> {
    let table = RawTable::from_reader(reader, label_column)?;
    if let Some(expected) = expected {
        check_columns(&table.columns, expected)?;
    }

    let mut records = Vec::with_capacity(table.rows.len());
    for (row, raw) in table.rows.into_iter().enumerate() {
        let label = raw
            .label
            .ok_or_else(|| SchemaError::MissingColumn(label_column.to_string()))?;
        if label.is_empty() {
            return Err(SchemaError::InvalidValue {
                row,
                column: label_column.to_string(),
                value: label,
            }
            .into());
        }
        records.push(FeatureRecord::new(raw.values, label));
    }
    Ok(Dataset::from_records(table.columns, records)?)
}

/// Write a dataset with feature columns first and the label last
pub fn write_dataset(path: &Path, dataset: &Dataset, label_column: &str) -> Result<(), DatasetError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_to(&mut writer, dataset, label_column)?;
    writer.flush()?;
    info!("Wrote {} records to {}", dataset.len(), path.display());
    Ok(())
}

fn write_to<W: Write>(writer: &mut W, dataset: &Dataset, label_column: &str) -> std::io::Result<()> {
    let mut header: Vec<String> = dataset.feature_names().iter().map(|n| escape(n)).collect();
    header.push(escape(label_column));
    writeln!(writer, "{}", header.join(","))?;

    for record in dataset.records() {
        let mut fields: Vec<String> = record.values.iter().map(|v| v.to_string()).collect();
        fields.push(escape(&record.label));
        writeln!(writer, "{}", fields.join(","))?;
    }
    Ok(())
}

fn parse_value(field: &str, row: usize, column: &str) -> Result<f64, SchemaError> {
    field
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| SchemaError::InvalidValue {
            row,
            column: column.to_string(),
            value: field.to_string(),
        })
}

/// Split one line on commas, honouring double-quoted fields
fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.trim_end_matches('\r').chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    fields.push(current.trim().to_string());
    fields
}

fn escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
