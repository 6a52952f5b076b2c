use async_trait::async_trait;
use mirror_contract::{
    AuthResponse, CredentialsUpdate, DirectUrlResponse, DownloadInfo, TransferRecord,
    UpdateResponse,
};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Network(String),
    #[error("not authorized: {0}")]
    Auth(String),
    /// Non-success reply; `detail` is the backend's `error` message, if any.
    #[error("{operation}: {} (HTTP {status})", .detail.as_deref().unwrap_or("request rejected"))]
    Status {
        operation: String,
        status: u16,
        detail: Option<String>,
    },
    #[error("unexpected response body: {0}")]
    Decode(String),
    #[error("local write failed: {0}")]
    Io(String),
}

impl ClientError {
    pub fn is_auth(&self) -> bool {
        matches!(self, ClientError::Auth(_))
    }

    /// Message the backend wrote into its error body.
    pub fn detail(&self) -> Option<&str> {
        match self {
            ClientError::Status { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }
}

/// Supplies the bearer token attached to authenticated calls.
pub trait TokenSource: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

/// The transfer backend's HTTP surface.
#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn list_files(&self) -> Result<Vec<TransferRecord>, ClientError>;

    async fn create_transfer(&self, url: &str) -> Result<TransferRecord, ClientError>;

    async fn delete_file(&self, id: &str) -> Result<(), ClientError>;

    async fn download_info(&self, id: &str) -> Result<DownloadInfo, ClientError>;

    async fn direct_url(&self, id: &str, provider: &str)
        -> Result<DirectUrlResponse, ClientError>;

    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ClientError>;

    async fn update_credentials(
        &self,
        update: &CredentialsUpdate,
    ) -> Result<UpdateResponse, ClientError>;
}

/// Address of the backend's streaming proxy for one job and provider.
pub fn proxy_url(base_url: &str, job_id: &str, provider: &str) -> String {
    format!(
        "{}/api/download/{}/proxy?provider={}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(job_id),
        urlencoding::encode(provider)
    )
}
