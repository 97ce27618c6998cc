use std::collections::BTreeSet;
use std::sync::Arc;

use futures::TryStreamExt;
use object_store::path::Path;
use object_store::ObjectStore;
use tracing::{debug, info, instrument};

use crate::archive::Archive;
use crate::error::{Error, Result};

/// Connection settings for the S3-compatible store holding the archive.
#[derive(Debug, Clone)]
pub struct S3ArchiveConfig {
    /// `host:port`, optionally with a scheme. Plain HTTP is assumed without one.
    pub endpoint: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
}

impl S3ArchiveConfig {
    fn endpoint_url(&self) -> String {
        if self.endpoint.contains("://") {
            self.endpoint.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", self.endpoint.trim_end_matches('/'))
        }
    }

    /// Path-style URL of an archived object, as the Origin tools fetch it.
    pub fn object_url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.endpoint_url(), self.bucket, path)
    }
}

#[derive(Clone)]
pub struct ObjectStoreArchive {
    object_store: Arc<dyn ObjectStore>,
}

pub fn new_s3_archive(config: &S3ArchiveConfig) -> Result<ObjectStoreArchive> {
    let object_store = object_store::aws::AmazonS3Builder::new()
        .with_endpoint(config.endpoint_url())
        .with_allow_http(true)
        .with_virtual_hosted_style_request(false)
        .with_region(&config.region)
        .with_access_key_id(&config.access_key_id)
        .with_secret_access_key(&config.secret_access_key)
        .with_bucket_name(&config.bucket)
        .build()
        .map_err(Error::S3Config)?;

    Ok(ObjectStoreArchive::new(Arc::new(object_store)))
}

impl ObjectStoreArchive {
    pub fn new(object_store: Arc<dyn ObjectStore>) -> Self {
        Self { object_store }
    }
}

impl Archive for ObjectStoreArchive {
    #[instrument(skip_all, fields(channel = channel))]
    async fn list_chunk_keys(
        &self,
        channel: &str,
        dates: &BTreeSet<String>,
    ) -> Result<BTreeSet<String>> {
        let mut keys = BTreeSet::new();

        for date in dates {
            let prefix = Path::from(format!("{channel}/{date}"));
            let objects = self
                .object_store
                .list(Some(&prefix))
                .try_collect::<Vec<_>>()
                .await?;

            debug!(prefix = %prefix, count = objects.len(), "Listed archive prefix");
            keys.extend(objects.into_iter().map(|meta| meta.location.to_string()));
        }

        info!(dates = dates.len(), count = keys.len(), "Listed archive chunks");
        Ok(keys)
    }
}
