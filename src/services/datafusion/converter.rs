// DataFusion result conversion
//
// Record batches to JSON rows (printing, round-trip checks) and query-service
// result sets back into record batches (DataFrame example).

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use datafusion::arrow::array::*;
use datafusion::arrow::datatypes::*;
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::arrow::util::display::{ArrayFormatter, FormatOptions};
use serde_json::{json, Value as JsonValue};

use crate::models::{Column, Row};

/// Converts between Arrow record batches and JSON rows
pub struct DataFusionResultConverter;

impl DataFusionResultConverter {
    /// Flatten record batches into JSON rows, one `Vec` per row
    pub fn batches_to_rows(batches: &[RecordBatch]) -> Result<Vec<Row>> {
        let total = batches.iter().map(|batch| batch.num_rows()).sum();
        let mut rows = Vec::with_capacity(total);

        for batch in batches {
            for row_idx in 0..batch.num_rows() {
                let row = batch
                    .columns()
                    .iter()
                    .map(|column| Self::array_value_to_json(column, row_idx))
                    .collect::<Result<Row>>()?;
                rows.push(row);
            }
        }

        Ok(rows)
    }

    /// Convert a single array value to JSON
    ///
    /// Booleans, integers, floats and strings keep their JSON type; every other
    /// Arrow type is rendered with Arrow's display formatter.
    fn array_value_to_json(array: &ArrayRef, row_idx: usize) -> Result<JsonValue> {
        if array.is_null(row_idx) {
            return Ok(JsonValue::Null);
        }

        let value = match array.data_type() {
            DataType::Boolean => json!(array.as_boolean().value(row_idx)),
            DataType::Int8 => json!(array.as_primitive::<Int8Type>().value(row_idx)),
            DataType::Int16 => json!(array.as_primitive::<Int16Type>().value(row_idx)),
            DataType::Int32 => json!(array.as_primitive::<Int32Type>().value(row_idx)),
            DataType::Int64 => json!(array.as_primitive::<Int64Type>().value(row_idx)),
            DataType::UInt8 => json!(array.as_primitive::<UInt8Type>().value(row_idx)),
            DataType::UInt16 => json!(array.as_primitive::<UInt16Type>().value(row_idx)),
            DataType::UInt32 => json!(array.as_primitive::<UInt32Type>().value(row_idx)),
            DataType::UInt64 => json!(array.as_primitive::<UInt64Type>().value(row_idx)),
            DataType::Float32 => json!(array.as_primitive::<Float32Type>().value(row_idx)),
            DataType::Float64 => json!(array.as_primitive::<Float64Type>().value(row_idx)),
            DataType::Utf8 => json!(array.as_string::<i32>().value(row_idx)),
            DataType::LargeUtf8 => json!(array.as_string::<i64>().value(row_idx)),
            DataType::Utf8View => json!(array.as_string_view().value(row_idx)),
            other => {
                let formatter = ArrayFormatter::try_new(array.as_ref(), &FormatOptions::default())
                    .with_context(|| format!("No display format for Arrow type {}", other))?;
                json!(formatter.value(row_idx).to_string())
            }
        };

        Ok(value)
    }

    /// Build a record batch from a query-service result set
    ///
    /// Column types come from the service type names. Types without a direct
    /// Arrow mapping (decimal, date, varchar, ...) become nullable strings.
    pub fn rows_to_batch(columns: &[Column], rows: &[Row]) -> Result<RecordBatch> {
        if columns.is_empty() {
            return Err(anyhow!("Result set has no columns"));
        }

        let fields: Vec<Field> = columns
            .iter()
            .map(|column| Field::new(&column.name, Self::arrow_type_for(column), true))
            .collect();

        let arrays = fields
            .iter()
            .enumerate()
            .map(|(idx, field)| Self::build_column(idx, field.data_type(), rows))
            .collect::<Vec<ArrayRef>>();

        RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
            .context("Failed to assemble record batch from result rows")
    }

    fn arrow_type_for(column: &Column) -> DataType {
        match column.base_type().to_ascii_lowercase().as_str() {
            "boolean" => DataType::Boolean,
            "tinyint" => DataType::Int8,
            "smallint" => DataType::Int16,
            "integer" | "int" => DataType::Int32,
            "bigint" => DataType::Int64,
            "real" => DataType::Float32,
            "double" => DataType::Float64,
            _ => DataType::Utf8,
        }
    }

    fn build_column(idx: usize, data_type: &DataType, rows: &[Row]) -> ArrayRef {
        let cells = rows.iter().map(|row| row.get(idx).unwrap_or(&JsonValue::Null));

        match data_type {
            DataType::Boolean => Arc::new(cells.map(JsonValue::as_bool).collect::<BooleanArray>()),
            DataType::Int8 => Arc::new(cells.map(|v| json_int::<i8>(v)).collect::<Int8Array>()),
            DataType::Int16 => Arc::new(cells.map(|v| json_int::<i16>(v)).collect::<Int16Array>()),
            DataType::Int32 => Arc::new(cells.map(|v| json_int::<i32>(v)).collect::<Int32Array>()),
            DataType::Int64 => Arc::new(cells.map(|v| json_int::<i64>(v)).collect::<Int64Array>()),
            DataType::Float32 => Arc::new(
                cells
                    .map(|v| json_float(v).map(|f| f as f32))
                    .collect::<Float32Array>(),
            ),
            DataType::Float64 => Arc::new(cells.map(json_float).collect::<Float64Array>()),
            _ => Arc::new(
                cells
                    .map(|v| match v {
                        JsonValue::Null => None,
                        JsonValue::String(s) => Some(s.clone()),
                        other => Some(other.to_string()),
                    })
                    .collect::<StringArray>(),
            ),
        }
    }
}

fn json_int<T: TryFrom<i64>>(value: &JsonValue) -> Option<T> {
    value.as_i64().and_then(|v| T::try_from(v).ok())
}

// NaN and infinities arrive as strings
fn json_float(value: &JsonValue) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.parse::<f64>().ok()))
}
