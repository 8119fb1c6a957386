// DataFusion session builder
//
// Builds a SessionContext from flat key/value settings. Keys with a DataFusion
// equivalent are translated, `datafusion.*` keys are forwarded as-is and the
// rest are kept verbatim in the session's settings.

use std::fmt;

use anyhow::{Context, Result};
use datafusion::execution::runtime_env::RuntimeEnvBuilder;
use datafusion::execution::SessionStateBuilder;
use datafusion::prelude::*;

use super::object_storage::{self, S3Options, S3A_PREFIX};
use crate::models::{SessionSettings, SettingValue};

pub const DEFAULT_APP_NAME: &str = "Lakehouse on k3d";

const MASTER: &str = "spark.master";
const DRIVER_MEMORY: &str = "spark.driver.memory";
const PARTITION_DISCOVERY_PARALLELISM: &str =
    "spark.sql.sources.parallelPartitionDiscovery.parallelism";

/// Collects settings key by key and builds a [`LakehouseSession`]
///
/// # Example
/// ```rust,ignore
/// let session = SessionBuilder::new()
///     .app_name("Lakehouse on k3d")
///     .config("spark.master", "local[4]")
///     .build()?;
/// ```
#[derive(Debug, Default)]
pub struct SessionBuilder {
    app_name: Option<String>,
    settings: SessionSettings,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    /// Record one setting; a later call for the same key wins
    pub fn config(mut self, key: impl Into<String>, value: impl Into<SettingValue>) -> Self {
        self.settings.set(key, value);
        self
    }

    /// Create the session
    ///
    /// Nothing here talks to object storage, so an unreachable endpoint only
    /// shows up once a read or write runs.
    pub fn build(self) -> Result<LakehouseSession> {
        let app_name = self.app_name.unwrap_or_else(|| DEFAULT_APP_NAME.to_string());
        let mut config = SessionConfig::new();
        let mut runtime = RuntimeEnvBuilder::new();

        for (key, value) in self.settings.iter() {
            let raw = value.to_string();
            match key.as_str() {
                MASTER => match parse_master(&raw) {
                    Some(partitions) => config = config.with_target_partitions(partitions),
                    None => tracing::warn!(
                        "Master '{}' is not a local master; keeping {} target partitions",
                        raw,
                        config.target_partitions()
                    ),
                },
                DRIVER_MEMORY => match parse_memory(&raw) {
                    Some(bytes) => runtime = runtime.with_memory_limit(bytes, 1.0),
                    None => tracing::warn!("Ignoring unparseable {} '{}'", DRIVER_MEMORY, raw),
                },
                PARTITION_DISCOVERY_PARALLELISM => match raw.trim().parse::<usize>() {
                    Ok(n) if n > 0 => config.options_mut().execution.meta_fetch_concurrency = n,
                    _ => tracing::warn!(
                        "Ignoring invalid {} '{}'",
                        PARTITION_DISCOVERY_PARALLELISM,
                        raw
                    ),
                },
                k if k.starts_with("datafusion.") => {
                    if let Err(e) = config.options_mut().set(k, &raw) {
                        tracing::warn!("DataFusion rejected setting {}={}: {}", k, raw, e);
                    }
                }
                // Consumed by S3Options below
                k if k.starts_with(S3A_PREFIX) => {}
                k => tracing::debug!("Setting {} kept without an engine mapping", k),
            }
        }

        let runtime_env = runtime
            .build_arc()
            .context("Failed to create runtime environment")?;

        let state = SessionStateBuilder::new()
            .with_config(config)
            .with_runtime_env(runtime_env)
            .with_default_features()
            .build();

        let storage = S3Options::from_settings(&self.settings);

        tracing::info!(
            "Created session '{}' with {} settings",
            app_name,
            self.settings.len()
        );

        Ok(LakehouseSession {
            ctx: SessionContext::new_with_state(state),
            app_name,
            settings: self.settings,
            storage,
        })
    }
}

/// An open dataframe session plus the settings it was built from
pub struct LakehouseSession {
    ctx: SessionContext,
    app_name: String,
    settings: SessionSettings,
    storage: S3Options,
}

impl LakehouseSession {
    pub fn ctx(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Every setting the session was created with, mapped or not
    pub fn conf(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn storage_options(&self) -> &S3Options {
        &self.storage
    }

    pub fn target_partitions(&self) -> usize {
        self.ctx.copied_config().target_partitions()
    }

    /// Register whatever object store `location` needs
    pub fn prepare_location(&self, location: &str) -> Result<()> {
        object_storage::register_for_location(&self.ctx, &self.storage, location)
    }
}

impl fmt::Display for LakehouseSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LakehouseSession(app={}, master={}, target_partitions={}, session_id={})",
            self.app_name,
            self.settings
                .get_str(MASTER)
                .unwrap_or_else(|| "local".to_string()),
            self.target_partitions(),
            self.ctx.session_id()
        )
    }
}

/// Merge the defaults with `overrides` and build a session from the result
pub fn create_session(overrides: Option<SessionSettings>) -> Result<LakehouseSession> {
    create_named_session(DEFAULT_APP_NAME, overrides)
}

pub fn create_named_session(
    app_name: &str,
    overrides: Option<SessionSettings>,
) -> Result<LakehouseSession> {
    let final_settings = SessionSettings::defaults().merge(&overrides.unwrap_or_default());
    match serde_json::to_string(&final_settings) {
        Ok(json) => tracing::debug!("Session settings: {}", json),
        Err(e) => tracing::debug!("Could not render session settings: {}", e),
    }

    let mut builder = SessionBuilder::new().app_name(app_name);
    for (key, value) in final_settings.iter() {
        builder = builder.config(key.clone(), value.clone());
    }

    builder.build().context("Failed to create DataFusion session")
}

/// Partition count for `local`, `local[N]`, `local[*]` and `local[N,F]`
pub fn parse_master(master: &str) -> Option<usize> {
    let master = master.trim();
    if master == "local" {
        return Some(1);
    }

    let inner = master.strip_prefix("local[")?.strip_suffix(']')?;
    let threads = inner.split(',').next()?.trim();
    if threads == "*" {
        return Some(num_cpus::get());
    }
    threads.parse::<usize>().ok().filter(|n| *n > 0)
}

/// Bytes for JVM-style sizes (`512m`, `2g`, `1024k`); bare numbers are MiB
pub fn parse_memory(size: &str) -> Option<usize> {
    let size = size.trim().to_ascii_lowercase();
    let size = size.strip_suffix('b').unwrap_or(&size);
    let split = size
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(size.len());
    let (digits, unit) = size.split_at(split);
    let value = digits.parse::<usize>().ok()?;

    let multiplier: usize = match unit {
        "" | "m" => 1 << 20,
        "k" => 1 << 10,
        "g" => 1 << 30,
        "t" => 1 << 40,
        _ => return None,
    };
    value.checked_mul(multiplier)
}
