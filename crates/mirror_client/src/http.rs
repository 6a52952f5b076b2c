use std::sync::Arc;

use async_trait::async_trait;
use mirror_contract::{
    AuthResponse, CredentialsUpdate, DirectUrlResponse, DownloadInfo, LoginRequest,
    TransferRecord, UpdateResponse, UploadRequest, UploadResponse,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::api::{BackendApi, ClientError, TokenSource};

/// `BackendApi` over reqwest. Every call except login carries the bearer
/// token current at send time.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    tokens: Arc<dyn TokenSource>,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, tokens: Arc<dyn TokenSource>) -> Result<Self, ClientError> {
        let client = Client::builder()
            .build()
            .map_err(|e| ClientError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, base_url, tokens))
    }

    pub fn with_client(
        client: Client,
        base_url: impl Into<String>,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            tokens,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.tokens.bearer_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response, ClientError> {
        let response = request
            .send()
            .await
            .map_err(|e| ClientError::Network(format!("{what}: {e}")))?;
        check_status(response, what).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> Result<T, ClientError> {
        let response = self.send(request, what).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ClientError::Decode(format!("{what}: {e}")))
    }
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn list_files(&self) -> Result<Vec<TransferRecord>, ClientError> {
        let request = self.authorized(self.client.get(self.url("/files")));
        let files: Vec<TransferRecord> = self.send_json(request, "list files").await?;
        debug!(count = files.len(), "fetched transfer collection");
        Ok(files)
    }

    async fn create_transfer(&self, url: &str) -> Result<TransferRecord, ClientError> {
        let request = self
            .authorized(self.client.post(self.url("/files/upload")))
            .json(&UploadRequest {
                url: url.to_string(),
            });
        let created: UploadResponse = self.send_json(request, "create transfer").await?;
        Ok(created.into_record())
    }

    async fn delete_file(&self, id: &str) -> Result<(), ClientError> {
        let path = format!("/files/{}", urlencoding::encode(id));
        let request = self.authorized(self.client.delete(self.url(&path)));
        self.send(request, "delete file").await?;
        Ok(())
    }

    async fn download_info(&self, id: &str) -> Result<DownloadInfo, ClientError> {
        let path = format!("/api/download/{}", urlencoding::encode(id));
        let request = self.authorized(self.client.get(self.url(&path)));
        self.send_json(request, "download info").await
    }

    async fn direct_url(
        &self,
        id: &str,
        provider: &str,
    ) -> Result<DirectUrlResponse, ClientError> {
        let path = format!(
            "/api/download/{}/direct-url?provider={}",
            urlencoding::encode(id),
            urlencoding::encode(provider)
        );
        let request = self.authorized(self.client.get(self.url(&path)));
        self.send_json(request, "direct url").await
    }

    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ClientError> {
        let request = self.client.post(self.url("/api/auth/login")).json(&LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        });
        self.send_json(request, "login").await
    }

    async fn update_credentials(
        &self,
        update: &CredentialsUpdate,
    ) -> Result<UpdateResponse, ClientError> {
        let request = self
            .authorized(self.client.put(self.url("/api/auth/update")))
            .json(update);
        self.send_json(request, "update credentials").await
    }
}

async fn check_status(response: Response, what: &str) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = error_detail(&body);
    warn!(status = %status, operation = %what, detail = ?detail, "backend rejected request");

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ClientError::Auth(
            detail.unwrap_or_else(|| status.to_string()),
        )),
        _ => Err(ClientError::Status {
            operation: what.to_string(),
            status: status.as_u16(),
            detail,
        }),
    }
}

/// Pulls the `error` field out of a JSON error body, if there is one.
fn error_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("error")
        .and_then(Value::as_str)
        .filter(|message| !message.trim().is_empty())
        .map(str::to_string)
}
