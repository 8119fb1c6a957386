// Session configuration mapping
//
// Flat string-keyed settings handed to the dataframe session builder. Values
// are strings or booleans and are not validated here.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// A single configuration value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Str(String),
}

impl SettingValue {
    /// Boolean view of the value (`"true"`/`"false"` strings included)
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Bool(b) => Some(*b),
            SettingValue::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Bool(b) => write!(f, "{}", b),
            SettingValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for SettingValue {
    fn from(s: &str) -> Self {
        SettingValue::Str(s.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(s: String) -> Self {
        SettingValue::Str(s)
    }
}

impl From<bool> for SettingValue {
    fn from(b: bool) -> Self {
        SettingValue::Bool(b)
    }
}

/// Ordered key/value settings for a dataframe session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SessionSettings {
    entries: BTreeMap<String, SettingValue>,
}

impl SessionSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built fresh on every call; there is no shared default table.
    pub fn defaults() -> Self {
        let mut settings = Self::new();
        settings
            .set("spark.master", "local[2]")
            .set("spark.driver.memory", "2g")
            .set("spark.sql.warehouse.dir", "tests/lakehouse/spark-warehouse/")
            .set("spark.sql.shuffle.partitions", "2")
            .set("spark.sql.extensions", "io.delta.sql.DeltaSparkSessionExtension")
            .set(
                "spark.sql.catalog.spark_catalog",
                "org.apache.spark.sql.delta.catalog.DeltaCatalog",
            )
            .set(
                "spark.jars.packages",
                "io.delta:delta-spark_2.12:3.2.0,org.xerial:sqlite-jdbc:3.45.3.0,\
                 com.databricks:spark-xml_2.12:0.18.0,org.apache.hadoop:hadoop-aws:3.3.2",
            )
            .set("spark.jars.excludes", "net.sourceforge.f2j:arpack_combined_all")
            .set("spark.sql.sources.parallelPartitionDiscovery.parallelism", "2")
            .set("spark.sql.legacy.charVarcharAsString", true)
            .set("spark.databricks.delta.optimizeWrite.enabled", true)
            .set("spark.sql.adaptive.enabled", true)
            .set("spark.databricks.delta.merge.enableLowShuffle", true)
            .set(
                "spark.driver.extraJavaOptions",
                "-Xss4M -Djava.security.manager=allow -Djava.security.policy=spark.policy",
            )
            .set("spark.authenticate", "false")
            .set("spark.network.crypto.enabled", "false")
            .set("spark.ui.enabled", "false")
            // MinIO
            .set("spark.hadoop.fs.s3a.endpoint", "http://localhost:30900")
            .set("spark.hadoop.fs.s3a.access.key", "minioadmin")
            .set("spark.hadoop.fs.s3a.secret.key", "minioadmin")
            .set("spark.hadoop.fs.s3a.path.style.access", "true")
            .set("spark.hadoop.fs.s3a.impl", "org.apache.hadoop.fs.s3a.S3AFileSystem")
            .set("spark.hadoop.fs.s3a.connection.ssl.enabled", "false");
        settings
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<SettingValue>) -> &mut Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&SettingValue> {
        self.entries.get(key)
    }

    /// String form of a value, booleans rendered as `true`/`false`
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|v| v.to_string())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SettingValue)> {
        self.entries.iter()
    }

    /// Overlay `overrides` on `self`; an override key replaces the value
    pub fn merge(mut self, overrides: &SessionSettings) -> Self {
        for (key, value) in overrides.iter() {
            self.entries.insert(key.clone(), value.clone());
        }
        self
    }
}

impl<K, V> FromIterator<(K, V)> for SessionSettings
where
    K: Into<String>,
    V: Into<SettingValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut settings = SessionSettings::new();
        for (key, value) in iter {
            settings.set(key, value);
        }
        settings
    }
}

/// Parse a `key=value` override as given on the command line
pub fn parse_override(raw: &str) -> Result<(String, SettingValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("Expected KEY=VALUE, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("Missing key in '{}'", raw));
    }

    let value = match value.trim() {
        "true" => SettingValue::Bool(true),
        "false" => SettingValue::Bool(false),
        other => SettingValue::Str(other.to_string()),
    };
    Ok((key.to_string(), value))
}
