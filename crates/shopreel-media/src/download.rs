//! HTTP artifact download.
//!
//! Provider result URLs are plain HTTPS links to finished media files;
//! downloads stream straight to disk.

use std::path::Path;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{MediaError, MediaResult};

/// Download a URL to a local file, streaming chunks to disk.
pub async fn download_to_file(url: &str, dest: impl AsRef<Path>) -> MediaResult<u64> {
    let dest = dest.as_ref();
    debug!("Downloading {} to {}", url, dest.display());

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let response = reqwest::get(url)
        .await
        .map_err(|e| MediaError::download_failed(e.to_string()))?;

    if !response.status().is_success() {
        return Err(MediaError::download_failed(format!(
            "{} returned {}",
            url,
            response.status()
        )));
    }

    let mut file = tokio::fs::File::create(dest).await?;
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| MediaError::download_failed(e.to_string()))?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    if written == 0 {
        return Err(MediaError::download_failed(format!("{url} returned an empty body")));
    }

    info!("Downloaded {} bytes to {}", written, dest.display());
    Ok(written)
}
