// Query-service example routines
//
// Each routine opens its own connection and cursor, runs its statements,
// prints the results and closes both before returning.

use datafusion::arrow::util::pretty::pretty_format_batches;
use datafusion::prelude::SessionContext;
use serde_json::Value;

use crate::config::TrinoConfig;
use crate::error::AppError;
use crate::models::{format_value, Column, QueryParameter, Row};
use crate::services::database::{connect, Authentication, ConnectOptions, Cursor};
use crate::services::datafusion::DataFusionResultConverter;

pub const CROSS_CATALOG_SQL: &str = "
    SELECT
        c.name AS customer,
        p.name AS product
    FROM
        mysql.example.customers c
    CROSS JOIN
        postgresql.public.products p
    LIMIT 5
    ";

pub const WATCHED_SESSION_PROPERTIES: [(&str, &str); 2] = [
    ("query_max_execution_time", "30m"),
    ("query_priority", "10"),
];

/// Connection options with the configured catalog and schema
pub fn default_options(config: &TrinoConfig) -> Result<ConnectOptions, AppError> {
    let mut options = ConnectOptions::from_config(config)?;
    if let Some(catalog) = &config.catalog {
        options = options.catalog(catalog);
    }
    if let Some(schema) = &config.schema {
        options = options.schema(schema);
    }
    Ok(options)
}

/// `SELECT 1` against the `system` catalog
pub async fn probe(config: &TrinoConfig) -> Result<(), AppError> {
    let conn = connect(ConnectOptions::from_config(config)?.catalog("system"))?;
    let mut cur = conn.cursor();
    cur.execute("SELECT 1", &[]).await?;
    cur.fetchall().await?;
    cur.close().await?;
    conn.close();
    Ok(())
}

async fn run_statement(cur: &mut Cursor<'_>, sql: &str) -> Result<Vec<Row>, AppError> {
    cur.execute(sql, &[]).await?;
    cur.fetchall().await
}

fn column_names(cur: &Cursor<'_>) -> Vec<String> {
    cur.description()
        .map(|columns| columns.iter().map(|c| c.name.clone()).collect())
        .unwrap_or_default()
}

/// Render a result set as an aligned table
pub fn format_table(columns: &[Column], rows: &[Row]) -> Result<String, AppError> {
    let batch = DataFusionResultConverter::rows_to_batch(columns, rows)?;
    let table = pretty_format_batches(&[batch])
        .map_err(|e| AppError::Internal(format!("Failed to format result table: {}", e)))?;
    Ok(table.to_string())
}

pub async fn basic_connection(config: &TrinoConfig) -> Result<Vec<String>, AppError> {
    println!("\n=== Basic Connection ===");
    let conn = connect(default_options(config)?)?;
    let mut cur = conn.cursor();

    let catalogs: Vec<String> = run_statement(&mut cur, "SHOW CATALOGS")
        .await?
        .iter()
        .filter_map(|row| row.first())
        .map(format_value)
        .collect();

    println!("Available catalogs:");
    for catalog in &catalogs {
        println!("  - {}", catalog);
    }

    cur.close().await?;
    conn.close();
    Ok(catalogs)
}

/// Connect with basic authentication and report who the server sees
pub async fn authentication_example(config: &TrinoConfig) -> Result<String, AppError> {
    println!("\n=== Authentication Example ===");
    let options = default_options(config)?
        .user(&config.auth_user)
        .auth(Authentication::basic(&config.auth_user, &config.auth_password));
    let conn = connect(options)?;
    let mut cur = conn.cursor();

    cur.execute("SELECT current_user", &[]).await?;
    let user = cur
        .fetchone()
        .await?
        .and_then(|row| row.first().map(format_value))
        .ok_or_else(|| AppError::Database("SELECT current_user returned no rows".to_string()))?;
    println!("Connected as user: {}", user);

    cur.close().await?;
    conn.close();
    Ok(user)
}

/// `?` placeholders bound from positional parameters
pub async fn query_with_parameters(
    config: &TrinoConfig,
) -> Result<Option<Vec<(String, Value)>>, AppError> {
    println!("\n=== Parameterized Queries ===");
    let conn = connect(default_options(config)?)?;
    let mut cur = conn.cursor();

    let customer_id: i64 = 1;
    cur.execute(
        "SELECT * FROM customers WHERE id = ?",
        &[QueryParameter::from(customer_id)],
    )
    .await?;

    let columns = column_names(&cur);
    let results = cur.fetchall().await?;
    let customer = results
        .first()
        .map(|row| columns.iter().cloned().zip(row.iter().cloned()).collect::<Vec<_>>());

    match &customer {
        Some(fields) => {
            println!("Customer with ID {}:", customer_id);
            for (column, value) in fields {
                println!("  {}: {}", column, format_value(value));
            }
        }
        None => println!("No customer found with ID {}", customer_id),
    }

    cur.close().await?;
    conn.close();
    Ok(customer)
}

/// Load a result set into a DataFusion DataFrame and summarize it
pub async fn with_dataframe(config: &TrinoConfig) -> Result<usize, AppError> {
    println!("\n=== DataFrame Integration ===");
    let conn = connect(default_options(config)?)?;
    let mut cur = conn.cursor();

    cur.execute("SELECT * FROM customers", &[]).await?;
    let columns = cur.description().map(<[Column]>::to_vec).unwrap_or_default();
    let rows = cur.fetchall().await?;

    let batch = DataFusionResultConverter::rows_to_batch(&columns, &rows)?;
    let ctx = SessionContext::new();
    let df = ctx.read_batch(batch)?;

    println!("Customers DataFrame:");
    df.clone().show().await?;

    println!("\nDataFrame info:");
    println!("  rows: {}", rows.len());
    for field in df.schema().fields() {
        println!(
            "  {}: {} (nullable: {})",
            field.name(),
            field.data_type(),
            field.is_nullable()
        );
    }

    println!("\nSummary statistics:");
    df.describe().await?.show().await?;

    cur.close().await?;
    conn.close();
    Ok(rows.len())
}

/// Join across two catalogs; a failure is printed, not returned
///
/// Returns the number of rows, or `None` when the query failed.
pub async fn cross_catalog_query(config: &TrinoConfig) -> Result<Option<usize>, AppError> {
    println!("\n=== Cross-Catalog Query ===");
    let conn = connect(ConnectOptions::from_config(config)?)?;
    let mut cur = conn.cursor();

    let outcome = match run_statement(&mut cur, CROSS_CATALOG_SQL).await {
        Ok(rows) => {
            let columns = cur.description().map(<[Column]>::to_vec).unwrap_or_default();
            format_table(&columns, &rows).map(|table| (table, rows.len()))
        }
        Err(e) => Err(e),
    };

    let row_count = match outcome {
        Ok((table, row_count)) => {
            println!("Cross-catalog query results:");
            println!("{}", table);
            Some(row_count)
        }
        Err(e) => {
            println!("Error executing cross-catalog query: {}", e);
            None
        }
    };

    cur.close().await?;
    conn.close();
    Ok(row_count)
}

pub async fn session_properties(config: &TrinoConfig) -> Result<Vec<(String, String)>, AppError> {
    println!("\n=== Session Properties ===");
    let options = WATCHED_SESSION_PROPERTIES
        .iter()
        .fold(default_options(config)?, |options, (name, value)| {
            options.session_property(*name, *value)
        });
    let conn = connect(options)?;
    let mut cur = conn.cursor();

    let watched: Vec<(String, String)> = run_statement(&mut cur, "SHOW SESSION")
        .await?
        .iter()
        .filter_map(|row| {
            let name = row.first().map(format_value)?;
            let value = row.get(1).map(format_value).unwrap_or_default();
            WATCHED_SESSION_PROPERTIES
                .iter()
                .any(|(watched, _)| *watched == name)
                .then_some((name, value))
        })
        .collect();

    println!("Session properties:");
    for (name, value) in &watched {
        println!("  {} = {}", name, value);
    }

    cur.close().await?;
    conn.close();
    Ok(watched)
}

/// Outcome of the error-handling routine
#[derive(Debug)]
pub struct ErrorHandlingReport {
    /// The query against a missing table; expected to fail
    pub expected_failure: Result<Vec<Row>, AppError>,
    /// Catalog count from the statement issued afterwards on the same connection
    pub follow_up: Result<usize, AppError>,
}

impl ErrorHandlingReport {
    pub fn connection_recovered(&self) -> bool {
        self.expected_failure.is_err() && self.follow_up.is_ok()
    }
}

pub async fn error_handling(config: &TrinoConfig) -> Result<ErrorHandlingReport, AppError> {
    println!("\n=== Error Handling ===");
    let conn = connect(default_options(config)?)?;
    let mut cur = conn.cursor();

    let expected_failure = run_statement(&mut cur, "SELECT * FROM non_existent_table").await;
    match &expected_failure {
        Ok(rows) => println!("{:?}", rows),
        Err(e) => {
            println!("Caught error: {}", e);
            println!("This is expected - we're demonstrating error handling");
        }
    }

    println!("\nConnection is still usable:");
    let follow_up = run_statement(&mut cur, "SHOW CATALOGS")
        .await
        .map(|catalogs| catalogs.len());
    match &follow_up {
        Ok(count) => println!("Found {} catalogs", count),
        Err(e) => println!("Connection failed after error: {}", e),
    }

    cur.close().await?;
    conn.close();
    Ok(ErrorHandlingReport {
        expected_failure,
        follow_up,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> TrinoConfig {
        TrinoConfig {
            host: "localhost".to_string(),
            port: 8080,
            user: "trino".to_string(),
            catalog: Some("mysql".to_string()),
            schema: Some("example".to_string()),
            http_scheme: None,
            request_timeout_secs: 5,
            auth_user: "admin".to_string(),
            auth_password: "password".to_string(),
        }
    }

    #[test]
    fn test_default_options_use_configured_namespace() {
        let options = default_options(&config()).unwrap();
        assert_eq!(options.catalog.as_deref(), Some("mysql"));
        assert_eq!(options.schema.as_deref(), Some("example"));
        assert!(options.auth.is_none());
    }

    #[test]
    fn test_format_table() {
        let columns = vec![Column::new("customer", "varchar"), Column::new("product", "varchar")];
        let rows = vec![vec![json!("Alice"), json!("Laptop")]];
        let table = format_table(&columns, &rows).unwrap();
        assert!(table.contains("| customer | product |"));
        assert!(table.contains("| Alice    | Laptop  |"));
    }

    #[test]
    fn test_report_recovery() {
        let report = ErrorHandlingReport {
            expected_failure: Err(AppError::Database("missing".to_string())),
            follow_up: Ok(3),
        };
        assert!(report.connection_recovered());

        let broken = ErrorHandlingReport {
            expected_failure: Err(AppError::Database("missing".to_string())),
            follow_up: Err(AppError::Connection("refused".to_string())),
        };
        assert!(!broken.connection_recovered());
    }
}
