pub mod database; // Query-service client
pub mod datafusion; // Dataframe sessions and object storage
pub mod demos; // Query-service example routines

pub use database::{connect, ConnectOptions, Connection, Cursor};
pub use datafusion::{create_named_session, create_session, LakehouseSession};
pub use demos::{run_demo, Capabilities, DemoFlags, DemoSummary, Example};
