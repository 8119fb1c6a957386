// Sample write/read job
//
// Writes a fixed three-row table to a dataset location as Parquet and reads it
// back. The pass runs twice against the same location; the second pass shows
// that an overwrite replaces the previous files.

use std::sync::Arc;

use anyhow::{Context, Result};
use datafusion::arrow::array::{ArrayRef, Int64Array, StringArray};
use datafusion::arrow::datatypes::{DataType, Field, Schema};
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::dataframe::{DataFrame, DataFrameWriteOptions};
use datafusion::prelude::ParquetReadOptions;

use super::converter::DataFusionResultConverter;
use super::object_storage;
use super::session::LakehouseSession;
use crate::models::Row;

/// How many identical write/read passes `run_sample_operation` makes
pub const WRITE_READ_PASSES: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleRecord {
    pub id: i64,
    pub value: String,
}

impl SampleRecord {
    fn new(id: i64, value: &str) -> Self {
        Self {
            id,
            value: value.to_string(),
        }
    }
}

pub fn sample_records() -> Vec<SampleRecord> {
    vec![
        SampleRecord::new(1, "First"),
        SampleRecord::new(2, "Second"),
        SampleRecord::new(3, "Third"),
    ]
}

pub fn records_to_batch(records: &[SampleRecord]) -> Result<RecordBatch> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("value", DataType::Utf8, false),
    ]));

    let ids: ArrayRef = Arc::new(records.iter().map(|r| r.id).collect::<Int64Array>());
    let values: ArrayRef = Arc::new(
        records
            .iter()
            .map(|r| Some(r.value.as_str()))
            .collect::<StringArray>(),
    );

    RecordBatch::try_new(schema, vec![ids, values]).context("Failed to build sample batch")
}

/// Rows written and read back by one pass
#[derive(Debug, Clone)]
pub struct RoundTrip {
    pub written: Vec<Row>,
    pub read: Vec<Row>,
}

impl RoundTrip {
    /// Same rows on both sides, ignoring order
    pub fn rows_match(&self) -> bool {
        sorted_keys(&self.written) == sorted_keys(&self.read)
    }
}

fn sorted_keys(rows: &[Row]) -> Vec<String> {
    let mut keys: Vec<String> = rows
        .iter()
        .map(|row| serde_json::Value::Array(row.clone()).to_string())
        .collect();
    keys.sort();
    keys
}

/// Dataset locations are directories; make sure the engine sees one
pub fn as_collection(location: &str) -> String {
    if location.ends_with('/') {
        location.to_string()
    } else {
        format!("{}/", location)
    }
}

/// Write `df` to `location` as Parquet, replacing whatever is there
///
/// The Parquet writer only appends, so the location is cleared first.
pub async fn write_overwrite(
    session: &LakehouseSession,
    df: DataFrame,
    location: &str,
) -> Result<()> {
    let removed = object_storage::clear_location(session.ctx(), location).await?;
    if removed > 0 {
        tracing::info!("Overwrite removed {} existing file(s) at {}", removed, location);
    }

    df.write_parquet(location, DataFrameWriteOptions::new(), None)
        .await
        .with_context(|| format!("Failed to write Parquet to {}", location))?;

    Ok(())
}

/// Show the sample table, then write and read it back twice
pub async fn run_sample_operation(
    session: &LakehouseSession,
    location: &str,
) -> Result<Vec<RoundTrip>> {
    let location = as_collection(location);
    session.prepare_location(&location)?;

    let batch = records_to_batch(&sample_records())?;
    let written = DataFusionResultConverter::batches_to_rows(std::slice::from_ref(&batch))?;
    let df = session.ctx().read_batch(batch)?;

    println!("Sample DataFrame:");
    df.clone().show().await?;

    let mut passes = Vec::with_capacity(WRITE_READ_PASSES);
    for pass in 1..=WRITE_READ_PASSES {
        write_overwrite(session, df.clone(), &location).await?;
        println!("\nData saved to {} successfully!", location);

        let read_df = session
            .ctx()
            .read_parquet(location.as_str(), ParquetReadOptions::default())
            .await
            .with_context(|| format!("Failed to read Parquet from {}", location))?;
        println!("\nData read from {}:", location);
        read_df.clone().show().await?;

        let read = DataFusionResultConverter::batches_to_rows(&read_df.collect().await?)?;
        tracing::debug!("Pass {}: wrote {} rows, read {}", pass, written.len(), read.len());
        passes.push(RoundTrip {
            written: written.clone(),
            read,
        });
    }

    Ok(passes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::datafusion::session::create_session;
    use serde_json::json;

    #[test]
    fn test_sample_batch() {
        let batch = records_to_batch(&sample_records()).unwrap();
        assert_eq!(batch.num_rows(), 3);
        assert_eq!(batch.schema().field(0).name(), "id");
        assert_eq!(batch.schema().field(1).name(), "value");
    }

    #[test]
    fn test_rows_match_ignores_order() {
        let round_trip = RoundTrip {
            written: vec![vec![json!(1), json!("First")], vec![json!(2), json!("Second")]],
            read: vec![vec![json!(2), json!("Second")], vec![json!(1), json!("First")]],
        };
        assert!(round_trip.rows_match());

        let doubled = RoundTrip {
            written: round_trip.written.clone(),
            read: [round_trip.read.clone(), round_trip.read.clone()].concat(),
        };
        assert!(!doubled.rows_match());
    }

    #[test]
    fn test_as_collection() {
        assert_eq!(as_collection("s3a://spark-data/sample-data"), "s3a://spark-data/sample-data/");
        assert_eq!(as_collection("/tmp/out/"), "/tmp/out/");
    }

    #[tokio::test]
    async fn test_local_round_trip_with_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let location = dir.path().join("sample-data");
        let session = create_session(None).unwrap();

        let passes = run_sample_operation(&session, location.to_str().unwrap())
            .await
            .unwrap();

        assert_eq!(passes.len(), WRITE_READ_PASSES);
        for round_trip in &passes {
            assert_eq!(round_trip.read.len(), 3);
            assert!(round_trip.rows_match());
        }
    }
}
