// Object storage wiring for DataFusion sessions
//
// Reads the `spark.hadoop.fs.s3a.*` settings and registers S3-compatible
// stores (MinIO in the default setup) with the session's runtime.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use datafusion::datasource::listing::ListingTableUrl;
use datafusion::execution::object_store::ObjectStoreUrl;
use datafusion::prelude::SessionContext;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::{ObjectMeta, ObjectStore};
use url::Url;

use crate::models::SessionSettings;

pub const S3A_PREFIX: &str = "spark.hadoop.fs.s3a.";

const S3_SCHEMES: [&str; 2] = ["s3", "s3a"];

/// S3 connection settings derived from session settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Options {
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub session_token: Option<String>,
    pub region: String,
    pub path_style: bool,
    pub ssl_enabled: bool,
}

impl S3Options {
    pub fn from_settings(settings: &SessionSettings) -> Self {
        let get = |suffix: &str| settings.get_str(&format!("{}{}", S3A_PREFIX, suffix));
        let flag = |suffix: &str, default: bool| {
            settings
                .get(&format!("{}{}", S3A_PREFIX, suffix))
                .and_then(|v| v.as_bool())
                .unwrap_or(default)
        };

        Self {
            endpoint: get("endpoint").filter(|e| !e.trim().is_empty()),
            access_key: get("access.key"),
            secret_key: get("secret.key"),
            session_token: get("session.token"),
            region: get("endpoint.region").unwrap_or_else(|| "us-east-1".to_string()),
            path_style: flag("path.style.access", false),
            ssl_enabled: flag("connection.ssl.enabled", true),
        }
    }

    /// Endpoint with a scheme; bare `host:port` gets one from the TLS flag
    pub fn endpoint_url(&self) -> Option<String> {
        self.endpoint.as_ref().map(|endpoint| {
            if endpoint.contains("://") {
                endpoint.clone()
            } else if self.ssl_enabled {
                format!("https://{}", endpoint)
            } else {
                format!("http://{}", endpoint)
            }
        })
    }

    /// Build a store for one bucket
    pub fn build_store(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(bucket)
            .with_region(&self.region)
            .with_virtual_hosted_style_request(!self.path_style);

        if let Some(endpoint) = self.endpoint_url() {
            builder = builder.with_endpoint(endpoint);
        }

        // Needed for MinIO without TLS
        if !self.ssl_enabled {
            builder = builder.with_allow_http(true);
        }

        if let Some(ak) = &self.access_key {
            builder = builder.with_access_key_id(ak);
        }
        if let Some(sk) = &self.secret_key {
            builder = builder.with_secret_access_key(sk);
        }
        if let Some(token) = &self.session_token {
            builder = builder.with_token(token);
        }

        let store = builder
            .build()
            .with_context(|| format!("Failed to configure S3 store for bucket '{}'", bucket))?;

        Ok(Arc::new(store))
    }
}

/// Make `location` resolvable by the session
///
/// `s3://` and `s3a://` locations get a store for their bucket, registered
/// under both schemes. Already registered buckets and local paths are left
/// alone.
pub fn register_for_location(
    ctx: &SessionContext,
    options: &S3Options,
    location: &str,
) -> Result<()> {
    let url = match Url::parse(location) {
        Ok(url) => url,
        // Plain filesystem path
        Err(_) => return Ok(()),
    };

    if !S3_SCHEMES.contains(&url.scheme()) {
        return Ok(());
    }

    let bucket = url
        .host_str()
        .filter(|b| !b.is_empty())
        .ok_or_else(|| anyhow!("Object storage location '{}' has no bucket", location))?;

    let probe = ObjectStoreUrl::parse(format!("{}://{}", url.scheme(), bucket))?;
    if ctx.runtime_env().object_store(&probe).is_ok() {
        return Ok(());
    }

    let store = options.build_store(bucket)?;
    for scheme in S3_SCHEMES {
        let store_url = Url::parse(&format!("{}://{}", scheme, bucket))?;
        ctx.register_object_store(&store_url, store.clone());
    }

    tracing::info!(
        "Registered S3 store for bucket '{}' (endpoint: {}, path style: {})",
        bucket,
        options.endpoint_url().unwrap_or_else(|| "aws default".to_string()),
        options.path_style
    );

    Ok(())
}

/// Delete every object under a dataset location, returning how many went
///
/// A location that does not exist yet counts as empty.
pub async fn clear_location(ctx: &SessionContext, location: &str) -> Result<usize> {
    let table_url = ListingTableUrl::parse(location)
        .with_context(|| format!("Invalid dataset location '{}'", location))?;
    let store = ctx.runtime_env().object_store(table_url.object_store())?;
    let prefix = table_url.prefix().clone();

    let listed: std::result::Result<Vec<ObjectMeta>, object_store::Error> =
        store.list(Some(&prefix)).try_collect().await;
    let objects = match listed {
        Ok(objects) => objects,
        Err(object_store::Error::NotFound { .. }) => return Ok(0),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to list objects under '{}'", location))
        }
    };

    for meta in &objects {
        store
            .delete(&meta.location)
            .await
            .with_context(|| format!("Failed to delete '{}'", meta.location))?;
    }

    tracing::debug!("Removed {} object(s) under {}", objects.len(), location);
    Ok(objects.len())
}
