// Trino client over the HTTP statement protocol
//
// Connection holds the HTTP client and the client session (catalog, schema,
// session properties); Cursor runs one statement at a time and pages through
// its results lazily.
use std::collections::{BTreeMap, VecDeque};
use std::str::FromStr;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use tokio::sync::RwLock;
use url::Url;
use uuid::Uuid;

use super::protocol::*;
use crate::config::TrinoConfig;
use crate::error::AppError;
use crate::models::{Column, QueryParameter, Row};

const MAX_RETRIES: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(250);
const DEFAULT_SOURCE: &str = "lakehouse-demos";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpScheme {
    Http,
    Https,
}

impl FromStr for HttpScheme {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "http" => Ok(HttpScheme::Http),
            "https" => Ok(HttpScheme::Https),
            other => Err(AppError::Validation(format!(
                "Unsupported HTTP scheme '{}', expected http or https",
                other
            ))),
        }
    }
}

impl HttpScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpScheme::Http => "http",
            HttpScheme::Https => "https",
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum Authentication {
    Basic { username: String, password: String },
}

impl Authentication {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Authentication::Basic {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Authentication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Authentication::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"****")
                .finish(),
        }
    }
}

/// Everything needed to open a connection
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub auth: Option<Authentication>,
    pub session_properties: BTreeMap<String, String>,
    pub http_scheme: Option<HttpScheme>,
    pub source: String,
    pub request_timeout: Duration,
}

impl ConnectOptions {
    pub fn new(host: impl Into<String>, port: u16, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            catalog: None,
            schema: None,
            auth: None,
            session_properties: BTreeMap::new(),
            http_scheme: None,
            source: DEFAULT_SOURCE.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Host, port, user, scheme and timeout from configuration; no catalog
    pub fn from_config(config: &TrinoConfig) -> Result<Self, AppError> {
        let mut options = Self::new(&config.host, config.port, &config.user)
            .request_timeout(config.request_timeout());
        if let Some(scheme) = &config.http_scheme {
            options = options.http_scheme(scheme.parse()?);
        }
        Ok(options)
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn catalog(mut self, catalog: impl Into<String>) -> Self {
        self.catalog = Some(catalog.into());
        self
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn auth(mut self, auth: Authentication) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn session_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.session_properties.insert(name.into(), value.into());
        self
    }

    pub fn http_scheme(mut self, scheme: HttpScheme) -> Self {
        self.http_scheme = Some(scheme);
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// HTTPS when credentials are sent and no scheme was chosen
    pub fn effective_scheme(&self) -> HttpScheme {
        match (self.http_scheme, &self.auth) {
            (Some(scheme), _) => scheme,
            (None, Some(_)) => HttpScheme::Https,
            (None, None) => HttpScheme::Http,
        }
    }

    pub fn base_url(&self) -> Result<Url, AppError> {
        let url = Url::parse(&format!(
            "{}://{}:{}",
            self.effective_scheme().as_str(),
            self.host,
            self.port
        ))?;
        Ok(url)
    }
}

/// Catalog, schema and properties that follow the connection across statements
#[derive(Debug, Clone, Default)]
struct ClientSession {
    catalog: Option<String>,
    schema: Option<String>,
    properties: BTreeMap<String, String>,
}

/// Open a connection. No request is made until a cursor executes.
pub fn connect(options: ConnectOptions) -> Result<Connection, AppError> {
    let base_url = options.base_url()?;

    if options.auth.is_some() && options.effective_scheme() == HttpScheme::Http {
        tracing::warn!(
            "Sending credentials over plain HTTP to {}; the server may reject them",
            base_url
        );
    }

    let client = Client::builder()
        .timeout(options.request_timeout)
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

    let session = ClientSession {
        catalog: options.catalog.clone(),
        schema: options.schema.clone(),
        properties: options.session_properties.clone(),
    };

    tracing::debug!("Opened connection to {} as {}", base_url, options.user);

    Ok(Connection {
        client,
        base_url,
        options,
        session: RwLock::new(session),
    })
}

pub struct Connection {
    client: Client,
    base_url: Url,
    options: ConnectOptions,
    session: RwLock<ClientSession>,
}

impl Connection {
    pub fn cursor(&self) -> Cursor<'_> {
        Cursor {
            conn: self,
            query: None,
        }
    }

    pub fn close(self) {
        tracing::debug!("Closed connection to {}", self.base_url);
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    pub async fn catalog(&self) -> Option<String> {
        self.session.read().await.catalog.clone()
    }

    pub async fn schema(&self) -> Option<String> {
        self.session.read().await.schema.clone()
    }

    pub async fn session_properties(&self) -> BTreeMap<String, String> {
        self.session.read().await.properties.clone()
    }

    async fn request_headers(&self) -> HeaderMap {
        let session = self.session.read().await;
        let mut pairs: Vec<(&str, String)> = vec![
            (HEADER_USER, self.options.user.clone()),
            (HEADER_SOURCE, self.options.source.clone()),
        ];
        if let Some(catalog) = &session.catalog {
            pairs.push((HEADER_CATALOG, catalog.clone()));
        }
        if let Some(schema) = &session.schema {
            pairs.push((HEADER_SCHEMA, schema.clone()));
        }
        if let Some(properties) = encode_session_properties(&session.properties) {
            pairs.push((HEADER_SESSION, properties));
        }

        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            match value.parse::<HeaderValue>() {
                Ok(value) => {
                    headers.insert(name, value);
                }
                Err(_) => tracing::warn!("Dropping header {} with invalid characters", name),
            }
        }
        headers
    }

    fn request(&self, method: Method, url: Url, headers: &HeaderMap) -> RequestBuilder {
        let builder = self.client.request(method, url).headers(headers.clone());
        match &self.options.auth {
            Some(Authentication::Basic { username, password }) => {
                builder.basic_auth(username, Some(password))
            }
            None => builder,
        }
    }

    /// Send a request, retrying while the server reports it is busy
    async fn send<F>(&self, build: F) -> Result<QueryResults, AppError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            let response = build().send().await?;
            let status = response.status();

            if is_retryable(status) && attempt < MAX_RETRIES {
                attempt += 1;
                tracing::debug!("Query service returned {}, retry {}/{}", status, attempt, MAX_RETRIES);
                tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
                return Err(match status {
                    StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AppError::Connection(
                        format!("Authentication failed ({}): {}", status, body.trim()),
                    ),
                    _ => AppError::Database(format!(
                        "Query service request failed ({}): {}",
                        status,
                        body.trim()
                    )),
                });
            }

            self.apply_response_headers(response.headers()).await;

            return response
                .json::<QueryResults>()
                .await
                .map_err(|e| AppError::Database(format!("Failed to parse query service response: {}", e)));
        }
    }

    async fn apply_response_headers(&self, headers: &HeaderMap) {
        let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
        let mut session = self.session.write().await;

        if let Some(catalog) = header_str(HEADER_SET_CATALOG) {
            session.catalog = Some(catalog.to_string());
        }
        if let Some(schema) = header_str(HEADER_SET_SCHEMA) {
            session.schema = Some(schema.to_string());
        }
        for value in headers.get_all(HEADER_SET_SESSION) {
            if let Some((name, value)) = value.to_str().ok().and_then(parse_key_value_header) {
                session.properties.insert(name, value);
            }
        }
        for value in headers.get_all(HEADER_CLEAR_SESSION) {
            if let Ok(name) = value.to_str() {
                session.properties.remove(name.trim());
            }
        }
    }

    async fn submit(&self, sql: &str, prepared: Option<&str>) -> Result<QueryResults, AppError> {
        let url = self.base_url.join(STATEMENT_PATH)?;
        let mut headers = self.request_headers().await;
        if let Some(prepared) = prepared {
            let value = prepared
                .parse::<HeaderValue>()
                .map_err(|_| AppError::Validation("Prepared statement is not a valid header".to_string()))?;
            headers.insert(HEADER_PREPARED_STATEMENT, value);
        }

        tracing::debug!("Submitting statement: {}", sql);
        self.send(|| {
            self.request(Method::POST, url.clone(), &headers)
                .body(sql.to_string())
        })
        .await
    }

    async fn fetch_page(&self, next_uri: &str) -> Result<QueryResults, AppError> {
        let url = Url::parse(next_uri)?;
        let headers = self.request_headers().await;
        self.send(|| self.request(Method::GET, url.clone(), &headers)).await
    }

    async fn cancel(&self, next_uri: &str) -> Result<(), AppError> {
        let url = Url::parse(next_uri)?;
        let headers = self.request_headers().await;
        let response = self.request(Method::DELETE, url, &headers).send().await?;
        if !response.status().is_success() && response.status() != StatusCode::GONE {
            return Err(AppError::Database(format!(
                "Failed to cancel query: HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }
}

fn is_retryable(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    )
}

/// State of the statement a cursor is working through
#[derive(Debug)]
struct ActiveQuery {
    id: String,
    next_uri: Option<String>,
    columns: Option<Vec<Column>>,
    buffer: VecDeque<Row>,
    state: Option<String>,
    update_type: Option<String>,
    update_count: Option<i64>,
}

impl ActiveQuery {
    fn start(page: QueryResults) -> Result<Self, AppError> {
        let mut query = ActiveQuery {
            id: page.id.clone(),
            next_uri: None,
            columns: None,
            buffer: VecDeque::new(),
            state: None,
            update_type: None,
            update_count: None,
        };
        query.absorb(page)?;
        Ok(query)
    }

    fn absorb(&mut self, page: QueryResults) -> Result<(), AppError> {
        if let Some(error) = page.error {
            return Err(AppError::Query(error.into_failure(&page.id)));
        }
        if page.columns.is_some() {
            self.columns = page.columns;
        }
        if let Some(data) = page.data {
            self.buffer.extend(data);
        }
        if let Some(stats) = page.stats {
            self.state = Some(stats.state);
        }
        if page.update_type.is_some() {
            self.update_type = page.update_type;
        }
        if page.update_count.is_some() {
            self.update_count = page.update_count;
        }
        self.next_uri = page.next_uri;
        Ok(())
    }
}

/// Executes statements on a connection and fetches their rows
pub struct Cursor<'c> {
    conn: &'c Connection,
    query: Option<ActiveQuery>,
}

impl<'c> Cursor<'c> {
    /// Run `sql`, binding `params` to its `?` placeholders
    ///
    /// Returns once the result columns are known or the statement finished,
    /// so planning errors (unknown table, bad syntax) show up here. A failed
    /// statement leaves the cursor ready for the next one.
    pub async fn execute(&mut self, sql: &str, params: &[QueryParameter]) -> Result<(), AppError> {
        self.abandon().await;

        let conn = self.conn;
        let page = if params.is_empty() {
            conn.submit(sql, None).await?
        } else {
            let name = format!("st_{}", Uuid::new_v4().simple());
            let literals = params
                .iter()
                .map(QueryParameter::to_sql_literal)
                .collect::<Vec<_>>()
                .join(", ");
            let statement = format!("EXECUTE {} USING {}", name, literals);
            let prepared = encode_prepared_statement(&name, sql);
            conn.submit(&statement, Some(&prepared)).await?
        };

        let mut query = ActiveQuery::start(page)?;
        while query.columns.is_none() {
            let Some(next_uri) = query.next_uri.clone() else {
                break;
            };
            let page = conn.fetch_page(&next_uri).await?;
            query.absorb(page)?;
        }

        tracing::debug!("Query {} started ({:?})", query.id, query.state);
        self.query = Some(query);
        Ok(())
    }

    /// Column descriptors of the current result, once known
    pub fn description(&self) -> Option<&[Column]> {
        self.query.as_ref()?.columns.as_deref()
    }

    /// Update count reported for DML statements
    pub fn rowcount(&self) -> Option<i64> {
        self.query.as_ref()?.update_count
    }

    pub fn update_type(&self) -> Option<&str> {
        self.query.as_ref()?.update_type.as_deref()
    }

    pub fn query_id(&self) -> Option<&str> {
        self.query.as_ref().map(|q| q.id.as_str())
    }

    pub async fn fetchone(&mut self) -> Result<Option<Row>, AppError> {
        let conn = self.conn;
        let query = self.query.as_mut().ok_or_else(no_active_query)?;

        loop {
            if let Some(row) = query.buffer.pop_front() {
                return Ok(Some(row));
            }
            let Some(next_uri) = query.next_uri.clone() else {
                return Ok(None);
            };

            let advanced = match conn.fetch_page(&next_uri).await {
                Ok(page) => query.absorb(page),
                Err(e) => Err(e),
            };
            if let Err(e) = advanced {
                self.query = None;
                return Err(e);
            }
        }
    }

    pub async fn fetchall(&mut self) -> Result<Vec<Row>, AppError> {
        let conn = self.conn;
        let query = self.query.as_mut().ok_or_else(no_active_query)?;
        let mut rows: Vec<Row> = query.buffer.drain(..).collect();

        while let Some(next_uri) = query.next_uri.clone() {
            let advanced = match conn.fetch_page(&next_uri).await {
                Ok(page) => query.absorb(page),
                Err(e) => Err(e),
            };
            if let Err(e) = advanced {
                self.query = None;
                return Err(e);
            }
            rows.extend(query.buffer.drain(..));
        }

        Ok(rows)
    }

    /// Cancel the running statement, if any, and release the cursor
    pub async fn close(mut self) -> Result<(), AppError> {
        if let Some(query) = self.query.take() {
            if let Some(next_uri) = query.next_uri.as_deref() {
                self.conn.cancel(next_uri).await?;
                tracing::debug!("Cancelled query {}", query.id);
            }
        }
        Ok(())
    }

    // Drop an unfinished statement before starting another one
    async fn abandon(&mut self) {
        if let Some(query) = self.query.take() {
            if let Some(next_uri) = query.next_uri.as_deref() {
                if let Err(e) = self.conn.cancel(next_uri).await {
                    tracing::warn!("Failed to cancel query {}: {}", query.id, e);
                }
            }
        }
    }
}

fn no_active_query() -> AppError {
    AppError::Validation("No statement has been executed on this cursor".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_defaults() {
        let plain = ConnectOptions::new("localhost", 8080, "trino");
        assert_eq!(plain.effective_scheme(), HttpScheme::Http);
        assert_eq!(plain.base_url().unwrap().as_str(), "http://localhost:8080/");

        let secured = plain.clone().auth(Authentication::basic("admin", "password"));
        assert_eq!(secured.effective_scheme(), HttpScheme::Https);

        let forced = secured.http_scheme(HttpScheme::Http);
        assert_eq!(forced.effective_scheme(), HttpScheme::Http);
    }

    #[test]
    fn test_auth_debug_hides_password() {
        let auth = Authentication::basic("admin", "hunter2");
        let rendered = format!("{:?}", auth);
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_http_scheme_parsing() {
        assert_eq!("HTTPS".parse::<HttpScheme>().unwrap(), HttpScheme::Https);
        assert_eq!(" http ".parse::<HttpScheme>().unwrap(), HttpScheme::Http);
        assert!(matches!("ftp".parse::<HttpScheme>(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_options_from_config_parse_scheme() {
        let mut config = TrinoConfig {
            host: "localhost".to_string(),
            port: 8443,
            user: "trino".to_string(),
            catalog: None,
            schema: None,
            http_scheme: Some("HTTPS".to_string()),
            request_timeout_secs: 5,
            auth_user: "admin".to_string(),
            auth_password: "password".to_string(),
        };
        let options = ConnectOptions::from_config(&config).unwrap();
        assert_eq!(options.http_scheme, Some(HttpScheme::Https));
        assert_eq!(options.base_url().unwrap().as_str(), "https://localhost:8443/");

        config.http_scheme = Some("gopher".to_string());
        assert!(ConnectOptions::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_connect_is_lazy() {
        // nothing listens here; connect must still succeed
        let conn = connect(
            ConnectOptions::new("127.0.0.1", 9, "trino")
                .catalog("mysql")
                .schema("example")
                .session_property("query_priority", "10"),
        )
        .unwrap();

        assert_eq!(conn.catalog().await.as_deref(), Some("mysql"));
        assert_eq!(conn.schema().await.as_deref(), Some("example"));
        assert_eq!(
            conn.session_properties().await.get("query_priority").map(String::as_str),
            Some("10")
        );

        let mut cursor = conn.cursor();
        assert!(cursor.description().is_none());
        assert!(matches!(cursor.fetchall().await, Err(AppError::Validation(_))));
        cursor.close().await.unwrap();
        conn.close();
    }
}
