use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::provider::{Provider, ProviderName};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    Pending,
    Downloading,
    Completed,
    Failed,
}

impl TransferStatus {
    /// `COMPLETED` and `FAILED` never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, TransferStatus::Completed | TransferStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransferStatus::Pending => "PENDING",
            TransferStatus::Downloading => "DOWNLOADING",
            TransferStatus::Completed => "COMPLETED",
            TransferStatus::Failed => "FAILED",
        }
    }
}

/// One server-side transfer job as returned by `GET /files`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    pub id: String,
    pub original_name: Option<String>,
    pub mime_type: Option<String>,
    /// Byte count as decimal text; may exceed any fixed-width integer.
    pub size: Option<String>,
    pub status: TransferStatus,
    #[serde(default)]
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub r2_key: Option<String>,
    pub pixeldrain_id: Option<String>,
    pub idrive_key: Option<String>,
    pub vikingfile_id: Option<String>,
}

impl TransferRecord {
    pub fn provider_id(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::R2 => self.r2_key.as_deref(),
            Provider::Pixeldrain => self.pixeldrain_id.as_deref(),
            Provider::Idrive => self.idrive_key.as_deref(),
            Provider::Vikingfile => self.vikingfile_id.as_deref(),
        }
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Progress is only meaningful while bytes are moving; stale values on
    /// other statuses are hidden.
    pub fn display_progress(&self) -> Option<u8> {
        match self.status {
            TransferStatus::Downloading => Some(self.progress.min(100)),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &str {
        self.original_name.as_deref().unwrap_or("Unknown file")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRequest {
    pub url: String,
}

/// The upload endpoint answers either with the bare record or wrapped in a
/// `file` envelope depending on backend version.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum UploadResponse {
    Wrapped { file: TransferRecord },
    Bare(TransferRecord),
}

impl UploadResponse {
    pub fn into_record(self) -> TransferRecord {
        match self {
            UploadResponse::Wrapped { file } => file,
            UploadResponse::Bare(record) => record,
        }
    }
}

/// Public metadata for the download page of one job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DownloadInfo {
    pub id: String,
    pub original_name: Option<String>,
    pub mime_type: Option<String>,
    pub size: Option<String>,
    #[serde(default)]
    pub providers: BTreeMap<String, bool>,
    #[serde(default)]
    pub vikingfile_url: Option<String>,
}

impl DownloadInfo {
    pub fn flagged_providers(&self) -> impl Iterator<Item = ProviderName> + '_ {
        self.providers
            .iter()
            .filter(|(_, available)| **available)
            .map(|(name, _)| ProviderName::from(name.as_str()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectUrlResponse {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_password: Option<String>,
}

impl CredentialsUpdate {
    pub fn is_empty(&self) -> bool {
        self.new_email.is_none() && self.new_password.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateResponse {
    #[serde(default)]
    pub message: Option<String>,
    pub user: Option<User>,
}
