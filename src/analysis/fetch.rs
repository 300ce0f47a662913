//! Loading image bytes for analysis

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

use super::AnalysisError;

/// Raw image bytes with their MIME type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Source of image bytes
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, AnalysisError>;
}

/// Fetches images over HTTP.
///
/// URLs under the local storage prefix (e.g. `/uploads/...`) are read from
/// disk instead, since they have no host to request. Images larger than
/// `max_bytes` are refused without buffering them whole.
pub struct HttpImageFetcher {
    client: reqwest::Client,
    local: Option<(String, PathBuf)>,
    max_bytes: u64,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration, max_bytes: u64) -> Result<Self, AnalysisError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("atelier/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| AnalysisError::Fetch(format!("HTTP client error: {}", e)))?;
        Ok(Self {
            client,
            local: None,
            max_bytes,
        })
    }

    /// Serve URLs starting with `public_url` from `root`
    pub fn with_local_storage(mut self, public_url: &str, root: PathBuf) -> Self {
        self.local = Some((public_url.trim_end_matches('/').to_string(), root));
        self
    }

    fn local_path(&self, url: &str) -> Option<PathBuf> {
        let (prefix, root) = self.local.as_ref()?;
        let name = url.strip_prefix(prefix.as_str())?.strip_prefix('/')?;
        if name.is_empty() || name.contains("..") || name.contains('\\') {
            return None;
        }
        Some(root.join(name))
    }

    fn too_large(&self, url: &str, size: u64) -> AnalysisError {
        AnalysisError::Fetch(format!(
            "{}: image is {} bytes, the limit is {}",
            url, size, self.max_bytes
        ))
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, AnalysisError> {
        if let Some(path) = self.local_path(url) {
            let size = tokio::fs::metadata(&path)
                .await
                .map_err(|e| AnalysisError::Fetch(format!("{}: {}", url, e)))?
                .len();
            if size > self.max_bytes {
                return Err(self.too_large(url, size));
            }
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| AnalysisError::Fetch(format!("{}: {}", url, e)))?;
            let mime_type = detect_mime(&bytes)
                .ok_or_else(|| AnalysisError::UnsupportedImage(url.to_string()))?;
            return Ok(FetchedImage {
                bytes,
                mime_type: mime_type.to_string(),
            });
        }

        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(AnalysisError::Fetch(format!("Unsupported image URL: {}", url)));
        }

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AnalysisError::Fetch(format!("{}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(AnalysisError::Fetch(format!(
                "{}: HTTP {}",
                url,
                response.status()
            )));
        }

        let header_mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_lowercase());

        if let Some(size) = response.content_length().filter(|&size| size > self.max_bytes) {
            return Err(self.too_large(url, size));
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| AnalysisError::Fetch(format!("{}: {}", url, e)))?
        {
            let size = (bytes.len() + chunk.len()) as u64;
            if size > self.max_bytes {
                return Err(self.too_large(url, size));
            }
            bytes.extend_from_slice(&chunk);
        }

        let mime_type = match header_mime {
            Some(mime) if mime.starts_with("image/") => mime,
            _ => detect_mime(&bytes)
                .ok_or_else(|| AnalysisError::UnsupportedImage(url.to_string()))?
                .to_string(),
        };

        Ok(FetchedImage { bytes, mime_type })
    }
}

/// Sniff an image MIME type from magic bytes
pub fn detect_mime(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [0x89, b'P', b'N', b'G', ..] => Some("image/png"),
        [b'G', b'I', b'F', b'8', ..] => Some("image/gif"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("image/webp"),
        [b'B', b'M', ..] => Some("image/bmp"),
        _ => None,
    }
}
