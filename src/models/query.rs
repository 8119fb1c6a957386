use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One result row as returned by the query service
pub type Row = Vec<Value>;

/// Column descriptor of a result set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// Service type name, e.g. `varchar(255)` or `bigint`
    #[serde(rename = "type")]
    pub type_name: String,
}

impl Column {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }

    /// Type name without parameters: `varchar(255)` -> `varchar`
    pub fn base_type(&self) -> &str {
        self.type_name
            .split('(')
            .next()
            .unwrap_or(&self.type_name)
            .trim()
    }
}

/// Positional `?` parameter of a prepared statement
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParameter {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    Varchar(String),
}

impl QueryParameter {
    /// Render the parameter as a SQL literal for `EXECUTE ... USING`
    pub fn to_sql_literal(&self) -> String {
        match self {
            QueryParameter::Null => "NULL".to_string(),
            QueryParameter::Boolean(b) => b.to_string(),
            QueryParameter::Integer(i) => i.to_string(),
            QueryParameter::Double(d) if d.is_nan() => "nan()".to_string(),
            QueryParameter::Double(d) if d.is_infinite() => {
                if d.is_sign_positive() {
                    "infinity()".to_string()
                } else {
                    "-infinity()".to_string()
                }
            }
            QueryParameter::Double(d) => format!("DOUBLE '{}'", d),
            QueryParameter::Varchar(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }
}

impl From<i64> for QueryParameter {
    fn from(v: i64) -> Self {
        QueryParameter::Integer(v)
    }
}

impl From<i32> for QueryParameter {
    fn from(v: i32) -> Self {
        QueryParameter::Integer(v as i64)
    }
}

impl From<f64> for QueryParameter {
    fn from(v: f64) -> Self {
        QueryParameter::Double(v)
    }
}

impl From<bool> for QueryParameter {
    fn from(v: bool) -> Self {
        QueryParameter::Boolean(v)
    }
}

impl From<&str> for QueryParameter {
    fn from(v: &str) -> Self {
        QueryParameter::Varchar(v.to_string())
    }
}

impl From<String> for QueryParameter {
    fn from(v: String) -> Self {
        QueryParameter::Varchar(v)
    }
}

impl<T: Into<QueryParameter>> From<Option<T>> for QueryParameter {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(QueryParameter::Null)
    }
}

/// Render a cell for terminal output; strings print without quotes
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
