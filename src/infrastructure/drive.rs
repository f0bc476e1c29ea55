//! Backup target adapters.
//!
//! `DirectoryTarget` writes backups into a local folder (typically a mounted
//! cloud-drive directory). `HttpTarget` PUTs backups to an HTTP endpoint with
//! optional basic auth. Both implement the `BackupTarget` seam the
//! coordinator uploads through.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::application::backup_service::BackupTarget;
use crate::domain::{AppConfig, AppError, Result, TargetKind, UploadError};

const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the configured backup target.
///
/// # Errors
/// Returns error if the http target is selected without a URL, or the HTTP
/// client cannot be constructed.
pub fn build_target(config: &AppConfig) -> Result<Arc<dyn BackupTarget>> {
    match config.target.kind {
        TargetKind::Directory => {
            let path = config
                .target
                .path
                .clone()
                .unwrap_or_else(|| config.default_target_dir());
            Ok(Arc::new(DirectoryTarget::new(path)))
        }
        TargetKind::Http => {
            let url = config.target.url.clone().ok_or_else(|| AppError::Config {
                message: "http target requires target.url".into(),
            })?;
            Ok(Arc::new(HttpTarget::new(
                url,
                config.target.username.clone(),
                config.target.password.clone(),
            )?))
        }
    }
}

/// Target writing backups into a local directory.
pub struct DirectoryTarget {
    dir: PathBuf,
}

impl DirectoryTarget {
    #[must_use]
    pub const fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

#[async_trait]
impl BackupTarget for DirectoryTarget {
    async fn is_connected(&self) -> bool {
        // A missing directory is created on demand; only a path we cannot
        // create counts as disconnected.
        tokio::fs::create_dir_all(&self.dir).await.is_ok()
    }

    async fn upload(&self, file_name: &str, body: &str) -> std::result::Result<(), UploadError> {
        let path = self.dir.join(file_name);
        let tmp = self.dir.join(format!("{file_name}.tmp"));

        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| UploadError::Io(e.to_string()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| UploadError::Io(e.to_string()))?;

        debug!(path = %path.display(), "backup written");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("directory {}", self.dir.display())
    }
}

/// Target uploading backups to an HTTP endpoint via PUT.
pub struct HttpTarget {
    client: reqwest::Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
}

impl HttpTarget {
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(base_url: String, username: Option<String>, password: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .timeout(HTTP_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::Config {
                message: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            username,
            password,
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.username {
            Some(user) => request.basic_auth(user, self.password.as_deref()),
            None => request,
        }
    }

    fn map_transport_error(err: &reqwest::Error) -> UploadError {
        if err.is_timeout() {
            UploadError::Timeout
        } else {
            UploadError::Network(err.to_string())
        }
    }
}

#[async_trait]
impl BackupTarget for HttpTarget {
    async fn is_connected(&self) -> bool {
        // Any HTTP answer means the endpoint is reachable; only transport
        // failures count as disconnected.
        let request = self.authorize(self.client.get(&self.base_url));
        request.send().await.is_ok()
    }

    async fn upload(&self, file_name: &str, body: &str) -> std::result::Result<(), UploadError> {
        let url = format!("{}/{file_name}", self.base_url);
        let request = self
            .authorize(self.client.put(&url))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_string());

        let response = request
            .send()
            .await
            .map_err(|e| Self::map_transport_error(&e))?;

        let status = response.status();
        if status.is_success() {
            debug!(%url, %status, "backup uploaded");
            return Ok(());
        }

        if status.is_server_error() {
            Err(UploadError::Server(status.as_u16()))
        } else if status.is_client_error() {
            Err(UploadError::Rejected(status.as_u16()))
        } else {
            Err(UploadError::Other(format!(
                "unexpected status {status} from {url}"
            )))
        }
    }

    fn describe(&self) -> String {
        format!("http {}", self.base_url)
    }
}
