mod api;
mod http;
mod stream;

pub use api::{proxy_url, BackendApi, ClientError, TokenSource};
pub use http::HttpBackend;
pub use stream::save_stream;
