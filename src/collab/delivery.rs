//! Delivery channels for the finished video

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use super::Delivery;
use crate::error::{CheerError, Result, Service};

/// Where a delivered artifact ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReceipt {
    pub channel: &'static str,
    /// File path, object URL or recipient address
    pub location: String,
}

/// Delivery channel selected in the configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum DeliveryConfig {
    /// Copy into a local directory (or onto a file path)
    Save { dest: PathBuf },
    /// HTTP PUT to a pre-signed object URL
    Upload {
        url: String,
        #[serde(default = "default_content_type")]
        content_type: String,
    },
    /// Multipart POST to a mail relay
    Email {
        endpoint: String,
        recipient: String,
        sender: String,
        #[serde(default = "default_subject")]
        subject: String,
        #[serde(default, skip_serializing)]
        api_key: Option<String>,
    },
}

fn default_content_type() -> String {
    "video/mp4".to_string()
}

fn default_subject() -> String {
    "Your cheer video".to_string()
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self::Save {
            dest: PathBuf::from("."),
        }
    }
}

impl DeliveryConfig {
    /// Instantiate the configured channel
    pub fn build(&self) -> Result<Box<dyn Delivery>> {
        let delivery: Box<dyn Delivery> = match self {
            Self::Save { dest } => Box::new(SaveToFile::new(dest)),
            Self::Upload { url, content_type } => Box::new(HttpUpload::new(url, content_type)?),
            Self::Email {
                endpoint,
                recipient,
                sender,
                subject,
                api_key,
            } => Box::new(
                MailRelay::new(endpoint, recipient, sender)?
                    .with_subject(subject)
                    .with_api_key(api_key.clone()),
            ),
        };
        Ok(delivery)
    }
}

fn delivery_error(message: impl Into<String>) -> CheerError {
    CheerError::collaborator(Service::Delivery, message)
}

fn file_name(artifact: &Path) -> String {
    artifact
        .file_name()
        .map_or_else(|| "cheer.mp4".to_string(), |n| n.to_string_lossy().into_owned())
}

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(300))
        .build()
        .map_err(|e| delivery_error(e.to_string()))
}

/// Download delivery: copy the artifact to a local path
#[derive(Debug, Clone)]
pub struct SaveToFile {
    dest: PathBuf,
}

impl SaveToFile {
    /// `dest` is a file path, or a directory the artifact is copied into
    pub fn new(dest: impl Into<PathBuf>) -> Self {
        Self { dest: dest.into() }
    }

    /// A destination ending in a separator names a directory even before it exists
    fn names_directory(&self) -> bool {
        self.dest.is_dir()
            || self
                .dest
                .to_string_lossy()
                .chars()
                .last()
                .is_some_and(std::path::is_separator)
    }

    fn target_for(&self, artifact: &Path) -> PathBuf {
        if self.names_directory() {
            self.dest.join(file_name(artifact))
        } else {
            self.dest.clone()
        }
    }
}

#[async_trait]
impl Delivery for SaveToFile {
    fn channel(&self) -> &'static str {
        "download"
    }

    async fn deliver(&self, artifact: &Path) -> Result<DeliveryReceipt> {
        let target = self.target_for(artifact);
        let parent = target
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        tokio::fs::create_dir_all(&parent)
            .await
            .map_err(|e| delivery_error(format!("cannot create {}: {e}", parent.display())))?;

        // Staged beside the target; only a complete copy is renamed into place
        let staged = tempfile::NamedTempFile::new_in(&parent)
            .map_err(|e| delivery_error(format!("cannot stage in {}: {e}", parent.display())))?;
        let bytes = tokio::fs::copy(artifact, staged.path())
            .await
            .map_err(|e| delivery_error(format!("cannot write {}: {e}", target.display())))?;
        staged
            .persist(&target)
            .map_err(|e| delivery_error(format!("cannot store {}: {e}", target.display())))?;

        info!("Saved {} bytes to {}", bytes, target.display());
        Ok(DeliveryReceipt {
            channel: self.channel(),
            location: target.display().to_string(),
        })
    }
}

/// Cloud delivery: PUT to a pre-signed URL
#[derive(Debug, Clone)]
pub struct HttpUpload {
    client: reqwest::Client,
    url: Url,
    content_type: String,
}

impl HttpUpload {
    pub fn new(url: &str, content_type: &str) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| delivery_error(format!("invalid upload URL: {e}")))?;
        Ok(Self {
            client: http_client()?,
            url,
            content_type: content_type.to_string(),
        })
    }

    /// Object location without the signing query
    fn public_location(&self) -> String {
        let mut url = self.url.clone();
        url.set_query(None);
        url.set_fragment(None);
        url.to_string()
    }
}

#[async_trait]
impl Delivery for HttpUpload {
    fn channel(&self) -> &'static str {
        "upload"
    }

    async fn deliver(&self, artifact: &Path) -> Result<DeliveryReceipt> {
        let body = tokio::fs::read(artifact).await?;
        let size = body.len();

        let response = self
            .client
            .put(self.url.clone())
            .header(reqwest::header::CONTENT_TYPE, &self.content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| delivery_error(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(delivery_error(format!("upload returned {status}: {text}")));
        }

        let location = self.public_location();
        info!("Uploaded {} bytes to {}", size, location);
        Ok(DeliveryReceipt {
            channel: self.channel(),
            location,
        })
    }
}

/// Email delivery: attachment posted to a mail relay
#[derive(Debug, Clone)]
pub struct MailRelay {
    client: reqwest::Client,
    endpoint: Url,
    recipient: String,
    sender: String,
    subject: String,
    api_key: Option<String>,
}

impl MailRelay {
    pub fn new(endpoint: &str, recipient: &str, sender: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint).map_err(|e| delivery_error(format!("invalid mail relay URL: {e}")))?;
        if !recipient.contains('@') {
            return Err(CheerError::InvalidRequest(format!("not an email address: {recipient}")));
        }
        Ok(Self {
            client: http_client()?,
            endpoint,
            recipient: recipient.to_string(),
            sender: sender.to_string(),
            subject: default_subject(),
            api_key: None,
        })
    }

    #[must_use]
    pub fn with_subject(mut self, subject: &str) -> Self {
        self.subject = subject.to_string();
        self
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }
}

#[async_trait]
impl Delivery for MailRelay {
    fn channel(&self) -> &'static str {
        "email"
    }

    async fn deliver(&self, artifact: &Path) -> Result<DeliveryReceipt> {
        let bytes = tokio::fs::read(artifact).await?;
        let attachment = Part::bytes(bytes)
            .file_name(file_name(artifact))
            .mime_str("video/mp4")
            .map_err(|e| delivery_error(e.to_string()))?;

        let form = Form::new()
            .text("from", self.sender.clone())
            .text("to", self.recipient.clone())
            .text("subject", self.subject.clone())
            .text("text", "Your cheer video is attached.")
            .part("attachment", attachment);

        let mut request = self.client.post(self.endpoint.clone()).multipart(form);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| delivery_error(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(delivery_error(format!("mail relay returned {status}: {text}")));
        }

        info!("Mailed video to {}", self.recipient);
        Ok(DeliveryReceipt {
            channel: self.channel(),
            location: self.recipient.clone(),
        })
    }
}
