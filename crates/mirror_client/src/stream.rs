use std::path::{Path, PathBuf};

use futures::StreamExt;
use reqwest::{Client, Response};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::api::ClientError;

/// Flush threshold for buffered writes.
const WRITE_BUFFER_SIZE: usize = 2 * 1024 * 1024;

/// Streams `url` into `dir`, saving under `suggested_name` with any path
/// components stripped. Returns the written path and byte count.
///
/// Bytes land in a `.part` sibling that is renamed into place only after the
/// last flush, so a failed download never replaces an earlier copy.
pub async fn save_stream(
    client: &Client,
    url: &str,
    dir: &Path,
    suggested_name: &str,
) -> Result<(PathBuf, u64), ClientError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ClientError::Network(format!("proxy download: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(ClientError::Status {
            operation: "proxy download".to_string(),
            status: status.as_u16(),
            detail: None,
        });
    }

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| ClientError::Io(format!("create {}: {e}", dir.display())))?;
    let file_name = safe_file_name(suggested_name);
    let destination = dir.join(&file_name);
    let partial = dir.join(format!("{file_name}.part"));

    let written = match write_partial(response, &partial).await {
        Ok(written) => written,
        Err(err) => {
            if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                warn!(path = %partial.display(), error = %cleanup, "failed to remove partial download");
            }
            return Err(err);
        }
    };

    if let Err(e) = tokio::fs::rename(&partial, &destination).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(ClientError::Io(format!(
            "move into {}: {e}",
            destination.display()
        )));
    }

    info!(bytes = written, path = %destination.display(), "proxy download saved");
    Ok((destination, written))
}

async fn write_partial(response: Response, partial: &Path) -> Result<u64, ClientError> {
    let mut file = File::create(partial)
        .await
        .map_err(|e| ClientError::Io(format!("create {}: {e}", partial.display())))?;

    let mut stream = response.bytes_stream();
    let mut buffer = Vec::with_capacity(WRITE_BUFFER_SIZE);
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ClientError::Network(format!("read chunk: {e}")))?;
        buffer.extend_from_slice(&chunk);
        written += chunk.len() as u64;

        if buffer.len() >= WRITE_BUFFER_SIZE {
            file.write_all(&buffer)
                .await
                .map_err(|e| ClientError::Io(format!("write buffer: {e}")))?;
            buffer.clear();
            debug!(bytes = written, path = %partial.display(), "proxy download progress");
        }
    }

    if !buffer.is_empty() {
        file.write_all(&buffer)
            .await
            .map_err(|e| ClientError::Io(format!("write remaining buffer: {e}")))?;
    }
    file.flush()
        .await
        .map_err(|e| ClientError::Io(format!("flush file: {e}")))?;
    Ok(written)
}

fn safe_file_name(suggested: &str) -> String {
    let name = suggested
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() || name == "." || name == ".." {
        "download".to_string()
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::safe_file_name;

    #[test]
    fn strips_directories_from_suggested_name() {
        assert_eq!(safe_file_name("../../etc/passwd"), "passwd");
        assert_eq!(safe_file_name("C:\\temp\\movie.mkv"), "movie.mkv");
        assert_eq!(safe_file_name("  "), "download");
        assert_eq!(safe_file_name("dir/"), "download");
    }
}
