//! In-process stand-in for a Trino coordinator.
//!
//! Serves the statement protocol over real HTTP: POST /v1/statement queues a
//! statement, each GET on its `nextUri` returns one row, DELETE cancels.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use serde_json::{json, Value};

use lakehouse_demos::config::TrinoConfig;

#[derive(Debug, Clone)]
struct Submitted {
    sql: String,
    headers: HeaderMap,
}

#[derive(Default)]
struct Answer {
    columns: Vec<(&'static str, &'static str)>,
    rows: Vec<Value>,
    update_type: Option<&'static str>,
    headers: Vec<(&'static str, String)>,
}

impl Answer {
    fn table(columns: Vec<(&'static str, &'static str)>, rows: Vec<Value>) -> Self {
        Self {
            columns,
            rows,
            ..Default::default()
        }
    }
}

pub struct MockState {
    base_url: String,
    next_id: AtomicU64,
    queries: Mutex<HashMap<String, Submitted>>,
    statements: Mutex<Vec<String>>,
    authorizations: Mutex<Vec<String>>,
    busy_responses: AtomicUsize,
    submissions: AtomicUsize,
    cancelled: AtomicUsize,
    missing_catalogs: Mutex<Vec<String>>,
}

pub struct MockTrino {
    pub addr: SocketAddr,
    pub state: Arc<MockState>,
}

impl MockTrino {
    pub async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let state = Arc::new(MockState {
            base_url: format!("http://{}", addr),
            next_id: AtomicU64::new(1),
            queries: Mutex::new(HashMap::new()),
            statements: Mutex::new(Vec::new()),
            authorizations: Mutex::new(Vec::new()),
            busy_responses: AtomicUsize::new(0),
            submissions: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
            missing_catalogs: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/v1/statement", post(submit))
            .route(
                "/v1/statement/executing/{id}/{token}",
                get(next_page).delete(cancel),
            )
            .with_state(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    /// Plain-HTTP configuration pointing at this server
    pub fn config(&self) -> TrinoConfig {
        TrinoConfig {
            host: self.addr.ip().to_string(),
            port: self.addr.port(),
            user: "trino".to_string(),
            catalog: Some("mysql".to_string()),
            schema: Some("example".to_string()),
            http_scheme: Some("http".to_string()),
            request_timeout_secs: 5,
            auth_user: "admin".to_string(),
            auth_password: "password".to_string(),
        }
    }

    /// Answer the next `count` submissions with 503
    pub fn fail_next_submissions(&self, count: usize) {
        self.state.busy_responses.store(count, Ordering::SeqCst);
    }

    /// Make statements referencing `catalog` fail with CATALOG_NOT_FOUND
    pub fn remove_catalog(&self, catalog: &str) {
        self.state
            .missing_catalogs
            .lock()
            .unwrap()
            .push(catalog.to_string());
    }

    /// Every POST to /v1/statement, busy answers included
    pub fn submissions(&self) -> usize {
        self.state.submissions.load(Ordering::SeqCst)
    }

    pub fn statements(&self) -> Vec<String> {
        self.state.statements.lock().unwrap().clone()
    }

    pub fn authorizations(&self) -> Vec<String> {
        self.state.authorizations.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> usize {
        self.state.cancelled.load(Ordering::SeqCst)
    }
}

/// Port with nothing listening on it
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn submit(State(state): State<Arc<MockState>>, headers: HeaderMap, sql: String) -> Response {
    state.submissions.fetch_add(1, Ordering::SeqCst);
    if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        state.authorizations.lock().unwrap().push(auth.to_string());
    }

    let busy = state
        .busy_responses
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    if busy.is_ok() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let id = format!("q{}", state.next_id.fetch_add(1, Ordering::SeqCst));
    state.statements.lock().unwrap().push(sql.clone());
    state
        .queries
        .lock()
        .unwrap()
        .insert(id.clone(), Submitted { sql, headers });

    Json(json!({
        "id": id,
        "infoUri": format!("{}/ui/query.html?{}", state.base_url, id),
        "nextUri": page_uri(&state, &id, 1),
        "stats": {"state": "QUEUED"}
    }))
    .into_response()
}

async fn next_page(
    State(state): State<Arc<MockState>>,
    Path((id, token)): Path<(String, usize)>,
) -> Response {
    let Some(submitted) = state.queries.lock().unwrap().get(&id).cloned() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let missing = state.missing_catalogs.lock().unwrap().clone();
    let answer = match answer(&submitted, &missing) {
        Ok(answer) => answer,
        Err(error) => {
            return Json(json!({
                "id": id,
                "stats": {"state": "FAILED"},
                "error": error
            }))
            .into_response();
        }
    };

    // one row per page
    let index = token.saturating_sub(1);
    let mut body = json!({
        "id": id,
        "stats": {"state": "RUNNING"}
    });
    if !answer.columns.is_empty() {
        body["columns"] = answer
            .columns
            .iter()
            .map(|(name, ty)| json!({"name": name, "type": ty}))
            .collect();
    }
    if let Some(row) = answer.rows.get(index) {
        body["data"] = json!([row]);
    }
    let last = index + 1 >= answer.rows.len();
    if last {
        body["stats"] = json!({"state": "FINISHED"});
        if let Some(update_type) = answer.update_type {
            body["updateType"] = json!(update_type);
        }
    } else {
        body["nextUri"] = json!(page_uri(&state, &id, token + 1));
    }

    let mut response = Json(body).into_response();
    if last {
        for (name, value) in answer.headers {
            response.headers_mut().append(
                HeaderName::from_static(name),
                HeaderValue::from_str(&value).unwrap(),
            );
        }
    }
    response
}

async fn cancel(
    State(state): State<Arc<MockState>>,
    Path((_id, _token)): Path<(String, usize)>,
) -> StatusCode {
    state.cancelled.fetch_add(1, Ordering::SeqCst);
    StatusCode::NO_CONTENT
}

fn page_uri(state: &MockState, id: &str, token: usize) -> String {
    format!("{}/v1/statement/executing/{}/{}", state.base_url, id, token)
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn query_error(name: &str, code: i64, message: String) -> Value {
    json!({
        "message": message,
        "errorCode": code,
        "errorName": name,
        "errorType": "USER_ERROR"
    })
}

fn customer_rows() -> Vec<Value> {
    vec![
        json!([1, "Alice", "alice@example.com"]),
        json!([2, "Bob", "bob@example.com"]),
        json!([3, "Carol", "carol@example.com"]),
    ]
}

const CUSTOMER_COLUMNS: [(&str, &str); 3] =
    [("id", "integer"), ("name", "varchar"), ("email", "varchar")];

fn current_user(headers: &HeaderMap) -> String {
    let from_basic = header(headers, "authorization")
        .and_then(|raw| raw.strip_prefix("Basic "))
        .and_then(|encoded| {
            base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .ok()
        })
        .and_then(|decoded| String::from_utf8(decoded).ok())
        .and_then(|pair| pair.split_once(':').map(|(user, _)| user.to_string()));

    from_basic
        .or_else(|| header(headers, "x-trino-user").map(str::to_string))
        .unwrap_or_default()
}

fn session_properties(headers: &HeaderMap) -> HashMap<String, String> {
    header(headers, "x-trino-session")
        .map(|raw| {
            raw.split(',')
                .filter_map(|pair| url::form_urlencoded::parse(pair.as_bytes()).next())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect()
        })
        .unwrap_or_default()
}

fn answer(submitted: &Submitted, missing_catalogs: &[String]) -> Result<Answer, Value> {
    let sql = submitted.sql.trim();
    let headers = &submitted.headers;

    if let Some(catalog) = missing_catalogs
        .iter()
        .find(|catalog| sql.contains(&format!("{}.", catalog)))
    {
        return Err(query_error(
            "CATALOG_NOT_FOUND",
            44,
            format!("line 8:9: Catalog '{}' not found", catalog),
        ));
    }

    if sql.contains("non_existent_table") {
        let catalog = header(headers, "x-trino-catalog").unwrap_or("system");
        let schema = header(headers, "x-trino-schema").unwrap_or("default");
        return Err(query_error(
            "TABLE_NOT_FOUND",
            46,
            format!("line 1:15: Table '{}.{}.non_existent_table' does not exist", catalog, schema),
        ));
    }

    if sql == "SELECT 1" {
        return Ok(Answer::table(vec![("_col0", "integer")], vec![json!([1])]));
    }

    if sql == "SHOW CATALOGS" {
        return Ok(Answer::table(
            vec![("Catalog", "varchar(10)")],
            vec![json!(["mysql"]), json!(["postgresql"]), json!(["system"])],
        ));
    }

    if sql == "SELECT current_user" {
        return Ok(Answer::table(
            vec![("_col0", "varchar")],
            vec![json!([current_user(headers)])],
        ));
    }

    if sql == "SELECT * FROM customers" {
        return Ok(Answer::table(CUSTOMER_COLUMNS.to_vec(), customer_rows()));
    }

    if let Some(rest) = sql.strip_prefix("EXECUTE ") {
        let (name, literals) = rest.split_once(" USING ").unwrap_or((rest, ""));
        let prepared = header(headers, "x-trino-prepared-statement")
            .and_then(|raw| url::form_urlencoded::parse(raw.as_bytes()).next())
            .filter(|(key, _)| key == name)
            .map(|(_, sql)| sql.into_owned());
        let Some(prepared) = prepared else {
            return Err(query_error(
                "NOT_FOUND",
                5,
                format!("Prepared statement not found: {}", name),
            ));
        };
        if !prepared.contains("FROM customers WHERE id = ?") {
            return Err(query_error("NOT_SUPPORTED", 13, prepared));
        }
        let rows = customer_rows()
            .into_iter()
            .filter(|row| row[0].to_string() == literals.trim())
            .collect();
        return Ok(Answer::table(CUSTOMER_COLUMNS.to_vec(), rows));
    }

    if sql.contains("CROSS JOIN") {
        return Ok(Answer::table(
            vec![("customer", "varchar"), ("product", "varchar")],
            vec![json!(["Alice", "Laptop"]), json!(["Alice", "Phone"])],
        ));
    }

    if sql == "SHOW SESSION" {
        let overrides = session_properties(headers);
        let known = [
            ("join_distribution_type", "AUTOMATIC", "varchar"),
            ("query_max_execution_time", "100.00d", "varchar"),
            ("query_priority", "1", "integer"),
        ];
        let rows = known
            .iter()
            .map(|(name, default, ty)| {
                let value = overrides.get(*name).cloned().unwrap_or(default.to_string());
                json!([name, value, default, ty, ""])
            })
            .collect();
        return Ok(Answer::table(
            vec![
                ("Name", "varchar"),
                ("Value", "varchar"),
                ("Default", "varchar"),
                ("Type", "varchar"),
                ("Description", "varchar"),
            ],
            rows,
        ));
    }

    if let Some(assignment) = sql.strip_prefix("SET SESSION ") {
        let (name, value) = assignment
            .split_once('=')
            .map(|(n, v)| (n.trim(), v.trim().trim_matches('\'')))
            .ok_or_else(|| query_error("SYNTAX_ERROR", 1, sql.to_string()))?;
        return Ok(Answer {
            columns: vec![("result", "boolean")],
            rows: vec![json!([true])],
            update_type: Some("SET SESSION"),
            headers: vec![("x-trino-set-session", format!("{}={}", name, value))],
        });
    }

    if let Some(target) = sql.strip_prefix("USE ") {
        let (catalog, schema) = target
            .split_once('.')
            .ok_or_else(|| query_error("SYNTAX_ERROR", 1, sql.to_string()))?;
        return Ok(Answer {
            update_type: Some("USE"),
            headers: vec![
                ("x-trino-set-catalog", catalog.to_string()),
                ("x-trino-set-schema", schema.to_string()),
            ],
            ..Default::default()
        });
    }

    Err(query_error(
        "SYNTAX_ERROR",
        1,
        format!("line 1:1: mismatched input '{}'", sql),
    ))
}
