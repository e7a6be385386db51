use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use image::ImageReader;
use reqwest::StatusCode;
use tracing::{debug, error, warn};

use crate::studio::error::StudioError;
use crate::utils::http::get_http_client;

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    if data.len() > 12 {
        let ftyp = &data[4..12];
        if ftyp.starts_with(b"ftyp") {
            let brand = &ftyp[4..8];
            if brand == b"heic" || brand == b"heif" || brand == b"hevc" {
                return Some("image/heic".to_string());
            }
        }
    }

    infer::get(data).map(|kind| kind.mime_type().to_string())
}

pub fn normalize_image_mime_type(mime_type: &str) -> String {
    let lowered = mime_type.trim().to_ascii_lowercase();
    match lowered.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        "image/x-png" => "image/png".to_string(),
        _ => lowered,
    }
}

pub fn gemini_supports_image_mime(mime_type: &str) -> bool {
    matches!(
        mime_type,
        "image/png" | "image/jpeg" | "image/webp" | "image/heic" | "image/heif"
    )
}

pub fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        "image/heic" | "image/heif" => "heic",
        _ => "png",
    }
}

const MEDIA_DOWNLOAD_MAX_ATTEMPTS: usize = 3;
const MEDIA_DOWNLOAD_BASE_DELAY_MS: u64 = 400;
const MEDIA_DOWNLOAD_ERROR_BODY_LIMIT: usize = 800;

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn should_retry_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

fn should_retry_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

pub async fn download_media(url: &str) -> Option<Vec<u8>> {
    let client = get_http_client();
    for attempt in 0..MEDIA_DOWNLOAD_MAX_ATTEMPTS {
        let response = match client.get(url).send().await {
            Ok(resp) => resp,
            Err(err) => {
                warn!(
                    "Failed to fetch media {url}: {err} (timeout={}, connect={}, status={:?}, attempt={}/{})",
                    err.is_timeout(),
                    err.is_connect(),
                    err.status(),
                    attempt + 1,
                    MEDIA_DOWNLOAD_MAX_ATTEMPTS
                );
                if !should_retry_error(&err) || attempt + 1 == MEDIA_DOWNLOAD_MAX_ATTEMPTS {
                    return None;
                }
                let delay = Duration::from_millis(MEDIA_DOWNLOAD_BASE_DELAY_MS << attempt);
                tokio::time::sleep(delay).await;
                continue;
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(
                "Media download failed for {url} with status {}: {}",
                status,
                truncate_for_log(&body, MEDIA_DOWNLOAD_ERROR_BODY_LIMIT)
            );
            if !should_retry_status(status) || attempt + 1 == MEDIA_DOWNLOAD_MAX_ATTEMPTS {
                return None;
            }
            let delay = Duration::from_millis(MEDIA_DOWNLOAD_BASE_DELAY_MS << attempt);
            tokio::time::sleep(delay).await;
            continue;
        }

        return match response.bytes().await {
            Ok(bytes) => Some(bytes.to_vec()),
            Err(err) => {
                error!(
                    "Failed to read media bytes {url}: {err} (attempt={}/{})",
                    attempt + 1,
                    MEDIA_DOWNLOAD_MAX_ATTEMPTS
                );
                if attempt + 1 == MEDIA_DOWNLOAD_MAX_ATTEMPTS {
                    None
                } else {
                    let delay = Duration::from_millis(MEDIA_DOWNLOAD_BASE_DELAY_MS << attempt);
                    tokio::time::sleep(delay).await;
                    continue;
                }
            }
        };
    }

    None
}

/// An image payload exactly as it was sourced, with its MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub origin: Option<PathBuf>,
}

impl ImageAsset {
    pub fn new(bytes: Vec<u8>, mime_type: String, origin: Option<PathBuf>) -> Self {
        Self {
            bytes,
            mime_type,
            origin,
        }
    }

    /// Sniffs the MIME type and rejects anything the generation service
    /// cannot take as inline image data.
    pub fn from_bytes(bytes: Vec<u8>, origin: Option<PathBuf>) -> Result<Self, StudioError> {
        if bytes.is_empty() {
            return Err(StudioError::Load("image file is empty".to_string()));
        }
        let mime_type = detect_mime_type(&bytes)
            .map(|mime| normalize_image_mime_type(&mime))
            .ok_or_else(|| StudioError::Decode("unrecognized image format".to_string()))?;
        if !gemini_supports_image_mime(&mime_type) {
            return Err(StudioError::Decode(format!(
                "unsupported image type {mime_type}"
            )));
        }
        Ok(Self::new(bytes, mime_type, origin))
    }

    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.bytes)
    }

    /// Natural pixel size, read from the encoded header.
    pub fn dimensions(&self) -> Result<(u32, u32), StudioError> {
        ImageReader::new(Cursor::new(&self.bytes))
            .with_guessed_format()
            .map_err(|err| StudioError::Decode(err.to_string()))?
            .into_dimensions()
            .map_err(|err| StudioError::Decode(err.to_string()))
    }

    pub fn display_name(&self) -> String {
        self.origin
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| format!("<{} in memory>", self.mime_type))
    }
}

pub async fn read_image_file(path: &Path) -> Result<ImageAsset, StudioError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|err| StudioError::Load(format!("{}: {}", path.display(), err)))?;
    debug!("Read {} bytes from {}", bytes.len(), path.display());
    ImageAsset::from_bytes(bytes, Some(path.to_path_buf()))
}

/// Loads an image from a local path or an http(s) URL.
pub async fn load_image_asset(source: &str) -> Result<ImageAsset, StudioError> {
    let source = source.trim();
    if source.starts_with("http://") || source.starts_with("https://") {
        let bytes = download_media(source)
            .await
            .ok_or_else(|| StudioError::Load(format!("could not download {source}")))?;
        return ImageAsset::from_bytes(bytes, None);
    }
    read_image_file(Path::new(source)).await
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};

    pub(crate) fn png_fixture(width: u32, height: u32, shade: u8) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Rgba([shade, 64, 128, 255]));
        let mut buf = Cursor::new(Vec::new());
        image
            .write_to(&mut buf, ImageFormat::Png)
            .expect("encode png fixture");
        buf.into_inner()
    }

    #[test]
    fn detects_png_and_reads_dimensions() {
        let asset = ImageAsset::from_bytes(png_fixture(40, 30, 1), None).unwrap();
        assert_eq!(asset.mime_type, "image/png");
        assert_eq!(asset.dimensions().unwrap(), (40, 30));
    }

    #[test]
    fn rejects_non_image_bytes() {
        let err = ImageAsset::from_bytes(b"plain text, not an image".to_vec(), None).unwrap_err();
        assert!(matches!(err, StudioError::Decode(_)));
        let err = ImageAsset::from_bytes(Vec::new(), None).unwrap_err();
        assert!(matches!(err, StudioError::Load(_)));
    }

    #[test]
    fn undecodable_payload_fails_dimension_read() {
        let asset = ImageAsset::new(vec![1, 2, 3, 4], "image/png".to_string(), None);
        assert!(matches!(asset.dimensions(), Err(StudioError::Decode(_))));
    }

    #[test]
    fn normalizes_legacy_jpeg_mime() {
        assert_eq!(normalize_image_mime_type("IMAGE/JPG"), "image/jpeg");
        assert_eq!(extension_for_mime("image/jpeg"), "jpg");
        assert_eq!(extension_for_mime("image/png"), "png");
    }

    #[tokio::test]
    async fn missing_file_is_a_load_error() {
        let err = load_image_asset("/definitely/not/here.png").await.unwrap_err();
        assert!(matches!(err, StudioError::Load(_)));
    }
}
