//! Source readers: delimited text and JSON

use crate::core::{DataType, Dataset, ExecutionContext, Operation, OperationKind, ReadParams, Value};
use crate::operators::{Operator, OperatorEnv, OperatorError};
use async_trait::async_trait;
use polars::prelude::{CsvReadOptions, PolarsResult, SerReader};
use std::collections::HashMap;
use std::io::Cursor;
use tracing::debug;

/// Bytes inspected when sniffing the delimiter
const SNIFF_LEN: usize = 1024;

/// Text encoding detected from raw bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Utf8Bom,
    Utf16Le,
    Utf16Be,
    /// Single-byte fallback; every byte maps to one code point
    Latin1,
}

/// Byte-level encoding heuristic: BOM first, then UTF-8 validity, else Latin-1
pub fn detect_encoding(bytes: &[u8]) -> Encoding {
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        Encoding::Utf8Bom
    } else if bytes.starts_with(&[0xFF, 0xFE]) {
        Encoding::Utf16Le
    } else if bytes.starts_with(&[0xFE, 0xFF]) {
        Encoding::Utf16Be
    } else if std::str::from_utf8(bytes).is_ok() {
        Encoding::Utf8
    } else {
        Encoding::Latin1
    }
}

/// Decode bytes into text using the detected encoding
pub fn decode(bytes: &[u8]) -> (String, Encoding) {
    let encoding = detect_encoding(bytes);
    let text = match encoding {
        Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        Encoding::Utf8Bom => String::from_utf8_lossy(&bytes[3..]).into_owned(),
        Encoding::Utf16Le | Encoding::Utf16Be => {
            let units: Vec<u16> = bytes[2..]
                .chunks_exact(2)
                .map(|pair| {
                    if encoding == Encoding::Utf16Le {
                        u16::from_le_bytes([pair[0], pair[1]])
                    } else {
                        u16::from_be_bytes([pair[0], pair[1]])
                    }
                })
                .collect();
            String::from_utf16_lossy(&units)
        }
        Encoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
    };
    (text, encoding)
}

/// Tab if the first kilobyte has more tabs than commas, otherwise comma
pub fn detect_delimiter(text: &str) -> u8 {
    let mut end = text.len().min(SNIFF_LEN);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let preview = &text[..end];

    let tabs = preview.matches('\t').count();
    let commas = preview.matches(',').count();
    if tabs > commas {
        b'\t'
    } else {
        b','
    }
}

/// Parse delimited text with a header row.
///
/// Every cell is read as text first. Empty cells become null. Columns that
/// infer to a single number or bool type are converted; any other column
/// keeps its raw text in every cell.
pub fn parse_csv(text: &str, delimiter: u8) -> PolarsResult<Dataset> {
    let frame = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .map_parse_options(|options| {
            options
                .with_separator(delimiter)
                .with_truncate_ragged_lines(true)
        })
        .into_reader_with_file_handle(Cursor::new(text.as_bytes().to_vec()))
        .finish()?;

    let raw = Dataset::from_frame(frame);
    let columns = raw
        .column_names()
        .into_iter()
        .map(|name| {
            let cells: Vec<Value> = raw
                .column_values(name)
                .unwrap_or_default()
                .into_iter()
                .map(|cell| match cell {
                    Value::Text(s) if s.is_empty() => Value::Null,
                    other => other,
                })
                .collect();
            let inferred: Vec<Value> = cells
                .iter()
                .map(|cell| cell.as_str().map_or(Value::Null, Value::infer))
                .collect();
            let cells = if DataType::of_cells(&inferred) == DataType::Text {
                cells
            } else {
                inferred
            };
            (name.to_string(), cells)
        })
        .collect();

    Dataset::from_columns(columns)
}

/// Parse a JSON array of objects, falling back to JSON Lines
pub fn parse_json(text: &str) -> Result<Dataset, String> {
    let array_err = match serde_json::from_str::<Vec<serde_json::Map<String, serde_json::Value>>>(text) {
        Ok(objects) => return objects_to_dataset(objects),
        Err(e) => e,
    };

    let mut objects = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(line) {
            Ok(obj) => objects.push(obj),
            Err(lines_err) => {
                return Err(format!(
                    "not a JSON array of objects ({}) nor JSON Lines (line {}: {})",
                    array_err,
                    line_no + 1,
                    lines_err
                ));
            }
        }
    }

    if objects.is_empty() {
        return Err(format!("not a JSON array of objects ({}) nor JSON Lines (no records)", array_err));
    }

    objects_to_dataset(objects)
}

fn objects_to_dataset(objects: Vec<serde_json::Map<String, serde_json::Value>>) -> Result<Dataset, String> {
    let mut names: Vec<String> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for obj in &objects {
        for key in obj.keys() {
            if !index.contains_key(key) {
                index.insert(key.clone(), names.len());
                names.push(key.clone());
            }
        }
    }

    let rows = objects
        .iter()
        .map(|obj| {
            let mut row = vec![Value::Null; names.len()];
            for (key, value) in obj {
                if let Some(&i) = index.get(key) {
                    row[i] = Value::from_json(value);
                }
            }
            row
        })
        .collect();

    Dataset::new(names, rows).map_err(|e| e.to_string())
}

async fn read_bytes(path: &str) -> Result<Vec<u8>, OperatorError> {
    tokio::fs::read(path).await.map_err(|e| OperatorError::SourceIo {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

/// `read_tabular_csv`
pub struct ReadCsv;

#[async_trait]
impl Operator for ReadCsv {
    fn kind(&self) -> OperationKind {
        OperationKind::ReadTabularCsv
    }

    async fn apply(
        &self,
        op: &Operation,
        ctx: &mut ExecutionContext,
        _env: &OperatorEnv,
    ) -> Result<(), OperatorError> {
        let Operation::ReadTabularCsv(ReadParams { name, path }) = op else {
            return Err(OperatorError::mismatch(self.kind(), op));
        };

        let bytes = read_bytes(path).await?;
        let (text, encoding) = decode(&bytes);
        let delimiter = detect_delimiter(&text);
        debug!(
            "Reading {} as {:?} with delimiter {:?}",
            path, encoding, delimiter as char
        );

        let dataset = parse_csv(&text, delimiter).map_err(|e| OperatorError::SourceIo {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        ctx.insert(name.clone(), dataset);
        Ok(())
    }
}

/// `read_tabular_json`
pub struct ReadJson;

#[async_trait]
impl Operator for ReadJson {
    fn kind(&self) -> OperationKind {
        OperationKind::ReadTabularJson
    }

    async fn apply(
        &self,
        op: &Operation,
        ctx: &mut ExecutionContext,
        _env: &OperatorEnv,
    ) -> Result<(), OperatorError> {
        let Operation::ReadTabularJson(ReadParams { name, path }) = op else {
            return Err(OperatorError::mismatch(self.kind(), op));
        };

        let bytes = read_bytes(path).await?;
        let (text, _) = decode(&bytes);
        let dataset = parse_json(&text).map_err(|reason| OperatorError::SourceIo {
            path: path.clone(),
            reason,
        })?;
        ctx.insert(name.clone(), dataset);
        Ok(())
    }
}
