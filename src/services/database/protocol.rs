// Wire types of the Trino HTTP statement protocol
//
// A statement is POSTed to /v1/statement; the client then follows `nextUri`
// until it disappears. Every page may carry columns, data and an error.

use std::collections::BTreeMap;

use serde::Deserialize;
use url::form_urlencoded;

use crate::error::QueryFailure;
use crate::models::{Column, Row};

pub const STATEMENT_PATH: &str = "/v1/statement";

// Lowercase: these are turned into static HeaderNames
pub const HEADER_USER: &str = "x-trino-user";
pub const HEADER_SOURCE: &str = "x-trino-source";
pub const HEADER_CATALOG: &str = "x-trino-catalog";
pub const HEADER_SCHEMA: &str = "x-trino-schema";
pub const HEADER_SESSION: &str = "x-trino-session";
pub const HEADER_PREPARED_STATEMENT: &str = "x-trino-prepared-statement";
pub const HEADER_SET_CATALOG: &str = "x-trino-set-catalog";
pub const HEADER_SET_SCHEMA: &str = "x-trino-set-schema";
pub const HEADER_SET_SESSION: &str = "x-trino-set-session";
pub const HEADER_CLEAR_SESSION: &str = "x-trino-clear-session";

/// One page of statement results
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResults {
    pub id: String,
    #[serde(default)]
    pub info_uri: Option<String>,
    #[serde(default)]
    pub next_uri: Option<String>,
    #[serde(default)]
    pub columns: Option<Vec<Column>>,
    #[serde(default)]
    pub data: Option<Vec<Row>>,
    #[serde(default)]
    pub stats: Option<StatementStats>,
    #[serde(default)]
    pub error: Option<QueryErrorBody>,
    #[serde(default)]
    pub update_type: Option<String>,
    #[serde(default)]
    pub update_count: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementStats {
    pub state: String,
    #[serde(default)]
    pub processed_rows: i64,
    #[serde(default)]
    pub elapsed_time_millis: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryErrorBody {
    pub message: String,
    #[serde(default)]
    pub error_code: i64,
    #[serde(default)]
    pub error_name: String,
    #[serde(default)]
    pub error_type: String,
}

impl QueryErrorBody {
    pub fn into_failure(self, query_id: &str) -> QueryFailure {
        QueryFailure {
            message: self.message,
            error_name: self.error_name,
            error_code: self.error_code,
            error_type: self.error_type,
            query_id: Some(query_id.to_string()),
        }
    }
}

pub fn encode_component(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// `X-Trino-Session` value: `k1=v1,k2=v2` with encoded values
pub fn encode_session_properties(properties: &BTreeMap<String, String>) -> Option<String> {
    if properties.is_empty() {
        return None;
    }

    let encoded = properties
        .iter()
        .map(|(key, value)| format!("{}={}", key, encode_component(value)))
        .collect::<Vec<_>>()
        .join(",");
    Some(encoded)
}

/// `X-Trino-Prepared-Statement` value for one statement
pub fn encode_prepared_statement(name: &str, sql: &str) -> String {
    format!("{}={}", name, encode_component(sql))
}

/// Decode a `key=value` response header such as `X-Trino-Set-Session`
pub fn parse_key_value_header(raw: &str) -> Option<(String, String)> {
    let (key, value) = form_urlencoded::parse(raw.trim().as_bytes()).next()?;
    if key.is_empty() {
        return None;
    }
    Some((key.into_owned(), value.into_owned()))
}
