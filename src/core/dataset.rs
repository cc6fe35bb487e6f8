//! In-memory tabular dataset
//!
//! A [`Dataset`] wraps a polars [`DataFrame`]. Cells cross the boundary as
//! [`Value`]s: steps and sinks read rows through [`Dataset::rows`], while
//! joins and aggregations run on the frame itself.

use polars::prelude::{
    Column as FrameColumn, DataFrame, DataType as FrameType, NamedFrom, PlSmallStr, PolarsResult,
    Series,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the value. Text counts when it parses as a finite number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) if !f.is_nan() => Some(*f),
            Value::Text(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Parse a raw text cell (CSV) into the narrowest value.
    ///
    /// Surrounding whitespace is ignored for numbers and bools; text keeps it.
    pub fn infer(raw: &str) -> Value {
        if raw.is_empty() {
            return Value::Null;
        }
        let trimmed = raw.trim();
        if let Ok(i) = trimmed.parse::<i64>() {
            return Value::Int(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            if f.is_finite() {
                return Value::Float(f);
            }
        }
        match trimmed {
            "true" | "True" | "TRUE" => Value::Bool(true),
            "false" | "False" | "FALSE" => Value::Bool(false),
            _ => Value::Text(raw.to_string()),
        }
    }

    /// Convert a JSON value into a cell. Nested values are kept as JSON text.
    pub fn from_json(value: &serde_json::Value) -> Value {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    n.as_f64().map(Value::Float).unwrap_or(Value::Null)
                }
            }
            serde_json::Value::String(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
        }
    }

    fn data_type(&self) -> DataType {
        match self {
            Value::Null => DataType::Null,
            Value::Bool(_) => DataType::Bool,
            Value::Int(_) => DataType::Int,
            Value::Float(_) => DataType::Float,
            Value::Text(_) => DataType::Text,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Column type, inferred from the non-null cells of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Null,
    Bool,
    Int,
    Float,
    Text,
}

impl DataType {
    /// Widen two observed types into one column type
    pub fn unify(self, other: DataType) -> DataType {
        use DataType::*;
        match (self, other) {
            (Null, t) | (t, Null) => t,
            (a, b) if a == b => a,
            (Int, Float) | (Float, Int) => Float,
            _ => Text,
        }
    }

    /// Narrowest type holding every cell
    pub fn of_cells(cells: &[Value]) -> DataType {
        cells
            .iter()
            .map(Value::data_type)
            .fold(DataType::Null, DataType::unify)
    }

    pub fn to_frame_type(self) -> FrameType {
        match self {
            DataType::Null => FrameType::Null,
            DataType::Bool => FrameType::Boolean,
            DataType::Int => FrameType::Int64,
            DataType::Float => FrameType::Float64,
            DataType::Text => FrameType::String,
        }
    }

    pub fn of_frame_type(dtype: &FrameType) -> DataType {
        match dtype {
            FrameType::Null => DataType::Null,
            FrameType::Boolean => DataType::Bool,
            FrameType::Int32 | FrameType::Int64 | FrameType::UInt32 | FrameType::UInt64 => DataType::Int,
            FrameType::Float32 | FrameType::Float64 => DataType::Float,
            _ => DataType::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub dtype: DataType,
}

/// One row as a name -> value mapping, in column order
pub type Row = serde_json::Map<String, serde_json::Value>;

/// An ordered table of named, typed columns
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    frame: DataFrame,
}

impl Dataset {
    /// Build a dataset from rows and infer column types.
    ///
    /// Short rows are padded with nulls, long rows are truncated to the header width.
    pub fn new(names: Vec<String>, rows: Vec<Vec<Value>>) -> PolarsResult<Self> {
        let mut cells: Vec<Vec<Value>> = vec![Vec::with_capacity(rows.len()); names.len()];
        for mut row in rows {
            row.resize(names.len(), Value::Null);
            for (column, value) in cells.iter_mut().zip(row) {
                column.push(value);
            }
        }
        Self::from_columns(names.into_iter().zip(cells).collect())
    }

    /// Build a dataset column by column
    pub fn from_columns(columns: Vec<(String, Vec<Value>)>) -> PolarsResult<Self> {
        let columns = columns
            .into_iter()
            .map(|(name, cells)| build_column(&name, DataType::of_cells(&cells), &cells))
            .collect();
        DataFrame::new(columns).map(Self::from_frame)
    }

    pub fn from_frame(frame: DataFrame) -> Self {
        Self { frame }
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn frame_mut(&mut self) -> &mut DataFrame {
        &mut self.frame
    }

    pub fn columns(&self) -> Vec<Column> {
        self.frame
            .get_columns()
            .iter()
            .map(|c| Column {
                name: c.name().to_string(),
                dtype: DataType::of_frame_type(c.dtype()),
            })
            .collect()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.frame.get_columns().iter().map(|c| c.name().as_str()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.frame.get_column_index(name)
    }

    pub fn column_type(&self, name: &str) -> Option<DataType> {
        self.frame
            .column(name)
            .ok()
            .map(|c| DataType::of_frame_type(c.dtype()))
    }

    /// Cells of one column, top to bottom
    pub fn column_values(&self, name: &str) -> Option<Vec<Value>> {
        self.frame.column(name).ok().map(column_values)
    }

    /// Materialize every row as cells
    pub fn rows(&self) -> Vec<Vec<Value>> {
        let mut rows = vec![Vec::with_capacity(self.frame.width()); self.len()];
        for column in self.frame.get_columns() {
            for (row, value) in rows.iter_mut().zip(column_values(column)) {
                row.push(value);
            }
        }
        rows
    }

    pub fn len(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert the first `n` rows into row mappings
    pub fn head(&self, n: usize) -> Vec<Row> {
        let head = Dataset::from_frame(self.frame.head(Some(n)));
        let names = head.column_names();
        head.rows()
            .into_iter()
            .map(|row| {
                names
                    .iter()
                    .zip(row)
                    .map(|(name, value)| (name.to_string(), value.to_json()))
                    .collect()
            })
            .collect()
    }
}

impl PartialEq for Dataset {
    fn eq(&self, other: &Self) -> bool {
        self.columns() == other.columns() && self.rows() == other.rows()
    }
}

fn build_column(name: &str, dtype: DataType, cells: &[Value]) -> FrameColumn {
    let name = PlSmallStr::from(name);
    let series = match dtype {
        DataType::Null => Series::new_null(name, cells.len()),
        DataType::Bool => {
            let values: Vec<Option<bool>> = cells
                .iter()
                .map(|v| match v {
                    Value::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect();
            Series::new(name, values)
        }
        DataType::Int => {
            let values: Vec<Option<i64>> = cells
                .iter()
                .map(|v| match v {
                    Value::Int(i) => Some(*i),
                    _ => None,
                })
                .collect();
            Series::new(name, values)
        }
        DataType::Float => {
            let values: Vec<Option<f64>> = cells.iter().map(Value::as_f64).collect();
            Series::new(name, values)
        }
        DataType::Text => {
            let values: Vec<Option<String>> = cells
                .iter()
                .map(|v| (!v.is_null()).then(|| v.to_string()))
                .collect();
            Series::new(name, values)
        }
    };
    FrameColumn::from(series)
}

fn column_values(column: &FrameColumn) -> Vec<Value> {
    let series = column.as_materialized_series();
    let values = match series.dtype() {
        FrameType::Null => Ok(vec![Value::Null; series.len()]),
        FrameType::Boolean => series
            .bool()
            .map(|ca| ca.into_iter().map(|v| v.map_or(Value::Null, Value::Bool)).collect()),
        FrameType::Int64 => series
            .i64()
            .map(|ca| ca.into_iter().map(|v| v.map_or(Value::Null, Value::Int)).collect()),
        FrameType::Int32 => series.i32().map(|ca| {
            ca.into_iter()
                .map(|v| v.map_or(Value::Null, |i| Value::Int(i as i64)))
                .collect()
        }),
        FrameType::UInt32 => series.u32().map(|ca| {
            ca.into_iter()
                .map(|v| v.map_or(Value::Null, |i| Value::Int(i as i64)))
                .collect()
        }),
        FrameType::UInt64 => series.u64().map(|ca| {
            ca.into_iter()
                .map(|v| v.map_or(Value::Null, |i| Value::Int(i as i64)))
                .collect()
        }),
        FrameType::Float64 => series
            .f64()
            .map(|ca| ca.into_iter().map(|v| v.map_or(Value::Null, Value::Float)).collect()),
        FrameType::Float32 => series.f32().map(|ca| {
            ca.into_iter()
                .map(|v| v.map_or(Value::Null, |f| Value::Float(f as f64)))
                .collect()
        }),
        FrameType::String => text_values(series),
        _ => series
            .cast(&FrameType::String)
            .and_then(|s| text_values(&s)),
    };
    // accessors match the dtype checked above
    values.unwrap_or_else(|_| vec![Value::Null; series.len()])
}

fn text_values(series: &Series) -> PolarsResult<Vec<Value>> {
    Ok(series
        .str()?
        .into_iter()
        .map(|v| v.map_or(Value::Null, |s| Value::Text(s.to_string())))
        .collect())
}
