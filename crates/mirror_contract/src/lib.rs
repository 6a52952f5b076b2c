pub mod format;
pub mod provider;
pub mod records;

pub use format::{format_age, format_size};
pub use provider::{Provider, ProviderName};
pub use records::{
    AuthResponse, CredentialsUpdate, DirectUrlResponse, DownloadInfo, LoginRequest,
    TransferRecord, TransferStatus, UpdateResponse, UploadRequest, UploadResponse, User,
};
