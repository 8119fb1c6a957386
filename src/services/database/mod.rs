// Query-service client (Trino HTTP statement protocol)
pub mod protocol;
pub mod trino;

pub use trino::{connect, Authentication, ConnectOptions, Connection, Cursor, HttpScheme};
