//! High-level storage operations.

use std::path::Path;
use std::time::Duration;

use crate::client::R2Client;
use crate::error::StorageResult;

/// Default expiry for delivery URLs handed to the dashboard.
pub const DELIVERY_URL_EXPIRY: Duration = Duration::from_secs(24 * 3600);

/// Key of a video's finished artifact.
pub fn artifact_key(user_id: &str, video_id: &str, filename: &str) -> String {
    format!("{}/{}/videos/{}", user_id, video_id, filename)
}

/// Key of a video's thumbnail.
pub fn thumbnail_key(user_id: &str, video_id: &str) -> String {
    format!("{}/{}/thumbnail.jpg", user_id, video_id)
}

impl R2Client {
    /// Upload a finished video artifact and return its key.
    pub async fn upload_artifact(
        &self,
        path: impl AsRef<Path>,
        user_id: &str,
        video_id: &str,
        filename: &str,
    ) -> StorageResult<String> {
        let key = artifact_key(user_id, video_id, filename);
        self.put_file(path, &key).await?;
        Ok(key)
    }

    /// Upload a thumbnail image and return its key.
    pub async fn upload_thumbnail(
        &self,
        path: impl AsRef<Path>,
        user_id: &str,
        video_id: &str,
    ) -> StorageResult<String> {
        let key = thumbnail_key(user_id, video_id);
        self.put_file(path, &key).await?;
        Ok(key)
    }

    /// Presigned delivery URL with the default expiry.
    pub async fn delivery_url(&self, key: &str) -> StorageResult<String> {
        self.presign_get(key, DELIVERY_URL_EXPIRY).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_key_layout() {
        assert_eq!(
            artifact_key("u1", "v1", "final.mp4"),
            "u1/v1/videos/final.mp4"
        );
        assert_eq!(thumbnail_key("u1", "v1"), "u1/v1/thumbnail.jpg");
    }
}
