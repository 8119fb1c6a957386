// DataFusion dataframe layer
//
// Session configuration from flat key/value settings, S3-compatible object
// storage, the sample Parquet write/read job, and Arrow <-> JSON conversion.

pub mod converter;
pub mod object_storage;
pub mod sample_job;
pub mod session;

pub use converter::DataFusionResultConverter;
pub use object_storage::S3Options;
pub use sample_job::{run_sample_operation, sample_records, RoundTrip, SampleRecord};
pub use session::{create_named_session, create_session, LakehouseSession, SessionBuilder};
