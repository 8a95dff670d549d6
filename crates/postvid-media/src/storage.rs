//! Template lookup and output storage.
//!
//! Templates always live on local disk. Outputs go either to a local
//! directory or, when R2 credentials are configured, to a Cloudflare R2
//! bucket.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use postvid_models::JobId;

use crate::error::{MediaError, MediaResult};
use crate::traits::MediaStorage;

/// Local storage directories.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory holding template videos
    pub templates_dir: PathBuf,
    /// Directory receiving outputs when R2 is not configured
    pub output_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            templates_dir: PathBuf::from("./templates"),
            output_dir: PathBuf::from("./outputs"),
        }
    }
}

impl StorageConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            templates_dir: std::env::var("TEMPLATES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.templates_dir),
            output_dir: std::env::var("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
        }
    }
}

/// Reject names that could escape the templates directory.
fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains(['/', '\\'])
        && name != "."
        && name != ".."
        && !name.starts_with('.')
}

/// Object key / file name for a job's output.
pub fn output_key(job_id: &JobId) -> String {
    format!("outputs/{}.mp4", job_id)
}

/// Templates and outputs on local disk.
#[derive(Debug, Clone)]
pub struct LocalMediaStorage {
    config: StorageConfig,
}

impl LocalMediaStorage {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    fn template_path(&self, name: &str) -> Option<PathBuf> {
        is_safe_name(name).then(|| self.config.templates_dir.join(name))
    }
}

#[async_trait]
impl MediaStorage for LocalMediaStorage {
    async fn template_exists(&self, name: &str) -> MediaResult<bool> {
        match self.template_path(name) {
            Some(path) => Ok(tokio::fs::try_exists(&path).await? && path.is_file()),
            None => Ok(false),
        }
    }

    async fn resolve_template(&self, name: &str) -> MediaResult<PathBuf> {
        if self.template_exists(name).await? {
            if let Some(path) = self.template_path(name) {
                return Ok(path);
            }
        }
        Err(MediaError::TemplateNotFound(name.to_string()))
    }

    async fn store_output(&self, job_id: &JobId, path: &Path) -> MediaResult<String> {
        let dest = self.config.output_dir.join(format!("{}.mp4", job_id));
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(path, &dest).await?;

        info!(job_id = %job_id, output = %dest.display(), "Stored output");
        Ok(dest.to_string_lossy().to_string())
    }
}

/// Configuration for R2 uploads.
#[derive(Debug, Clone)]
pub struct R2Config {
    /// R2 endpoint URL (S3 API endpoint)
    pub endpoint_url: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    /// Region (usually "auto" for R2)
    pub region: String,
}

impl R2Config {
    /// Read R2 settings; `None` unless endpoint, keys and bucket are all set.
    pub fn from_env() -> Option<Self> {
        Some(Self {
            endpoint_url: std::env::var("R2_ENDPOINT_URL").ok()?,
            access_key_id: std::env::var("R2_ACCESS_KEY_ID").ok()?,
            secret_access_key: std::env::var("R2_SECRET_ACCESS_KEY").ok()?,
            bucket_name: std::env::var("R2_BUCKET_NAME").ok()?,
            region: std::env::var("R2_REGION").unwrap_or_else(|_| "auto".to_string()),
        })
    }
}

/// Local templates, outputs uploaded to R2.
pub struct R2MediaStorage {
    client: Client,
    bucket: String,
    templates: LocalMediaStorage,
}

impl R2MediaStorage {
    pub fn new(config: R2Config, local: StorageConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "r2",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
            templates: LocalMediaStorage::new(local),
        }
    }
}

#[async_trait]
impl MediaStorage for R2MediaStorage {
    async fn template_exists(&self, name: &str) -> MediaResult<bool> {
        self.templates.template_exists(name).await
    }

    async fn resolve_template(&self, name: &str) -> MediaResult<PathBuf> {
        self.templates.resolve_template(name).await
    }

    async fn store_output(&self, job_id: &JobId, path: &Path) -> MediaResult<String> {
        let key = output_key(job_id);
        debug!("Uploading {} to {}", path.display(), key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| MediaError::storage(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(body)
            .content_type("video/mp4")
            .send()
            .await
            .map_err(|e| MediaError::storage(e.to_string()))?;

        info!(job_id = %job_id, key = %key, "Uploaded output to R2");
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(root: &Path) -> LocalMediaStorage {
        LocalMediaStorage::new(StorageConfig {
            templates_dir: root.join("templates"),
            output_dir: root.join("outputs"),
        })
    }

    #[tokio::test]
    async fn test_resolve_template() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(dir.path().join("templates")).await.unwrap();
        tokio::fs::write(dir.path().join("templates/parkour.mp4"), b"video")
            .await
            .unwrap();
        let storage = storage(dir.path());

        assert!(storage.template_exists("parkour.mp4").await.unwrap());
        assert_eq!(
            storage.resolve_template("parkour.mp4").await.unwrap(),
            dir.path().join("templates/parkour.mp4")
        );

        let missing = storage.resolve_template("nope.mp4").await.unwrap_err();
        assert!(matches!(missing, MediaError::TemplateNotFound(_)));
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(dir.path());

        for name in ["../secret.mp4", "a/b.mp4", "..", ".hidden", ""] {
            assert!(!storage.template_exists(name).await.unwrap(), "{name}");
        }
    }

    #[tokio::test]
    async fn test_store_output_copies_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(dir.path());
        let rendered = dir.path().join("final.mp4");
        tokio::fs::write(&rendered, b"composite").await.unwrap();

        let job_id = JobId::from_string("job-1");
        let output_ref = storage.store_output(&job_id, &rendered).await.unwrap();

        assert!(output_ref.ends_with("job-1.mp4"));
        assert_eq!(tokio::fs::read(&output_ref).await.unwrap(), b"composite");
    }

    #[test]
    fn test_output_key() {
        assert_eq!(output_key(&JobId::from_string("abc")), "outputs/abc.mp4");
    }
}
