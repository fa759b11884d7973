use reqwest::header::CONTENT_TYPE;
use tracing::{info, warn};

use super::{read_error, Platform};
use crate::error::{ClientError, ClientResult};

impl Platform {
    /// Upload bytes to the configured bucket and return the object's public URL
    pub async fn upload_object(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> ClientResult<String> {
        let size = bytes.len();
        let response = self
            .http()
            .post(self.config().storage_object_url(path))
            .headers(self.headers())
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await
            .map_err(|e| ClientError::upload(e.to_string()))?;

        if !response.status().is_success() {
            let (message, _) = read_error(response).await;
            warn!(path, error = %message, "Storage upload rejected");
            return Err(ClientError::upload(message));
        }

        info!(path, size, "Uploaded object");
        Ok(self.public_url(path))
    }

    pub fn public_url(&self, path: &str) -> String {
        self.config().public_object_url(path)
    }
}
