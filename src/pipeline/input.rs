//! Input resolution: turn user-supplied paths or URLs into [`CardImage`]s.
//!
//! The whole image is read into memory: business-card photos are a few
//! megabytes at most, and the staging step needs the bytes anyway. The
//! format is detected from magic bytes rather than the file extension, so a
//! mis-named upload is rejected here with a clear error instead of failing
//! later inside the VLM call.

use crate::error::CardScanError;
use image::ImageFormat;
use std::path::Path;
use tracing::{debug, info};

/// Raw image data as submitted by the caller. Never mutated by the pipeline.
#[derive(Clone)]
pub struct CardImage {
    /// Name used in outcomes and progress events (file name or URL segment).
    pub filename: String,
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
}

impl std::fmt::Debug for CardImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardImage")
            .field("filename", &self.filename)
            .field("bytes", &self.bytes.len())
            .field("format", &self.format)
            .finish()
    }
}

impl CardImage {
    /// Wrap raw bytes, detecting the image format from its magic bytes.
    pub fn from_bytes(filename: impl Into<String>, bytes: Vec<u8>) -> Result<Self, CardScanError> {
        let filename = filename.into();
        match detect_format(&bytes) {
            Some(format) => Ok(Self {
                filename,
                bytes,
                format,
            }),
            None => {
                let mut magic = [0u8; 4];
                let n = bytes.len().min(4);
                magic[..n].copy_from_slice(&bytes[..n]);
                Err(CardScanError::UnsupportedImage {
                    name: filename,
                    magic,
                })
            }
        }
    }

    /// MIME type of the original bytes.
    pub fn content_type(&self) -> &'static str {
        self.format.to_mime_type()
    }
}

/// Formats the encode stage can decode.
const SUPPORTED_FORMATS: [ImageFormat; 6] = [
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::WebP,
    ImageFormat::Gif,
    ImageFormat::Bmp,
    ImageFormat::Tiff,
];

/// Detect a supported image format from the leading bytes.
pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
    image::guess_format(bytes)
        .ok()
        .filter(|f| SUPPORTED_FORMATS.contains(f))
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve every input, in order, one result per input.
///
/// A missing or non-image input does not stop the others from loading; the
/// caller decides what a failed slot means.
pub async fn resolve_inputs(
    inputs: &[String],
    timeout_secs: u64,
) -> Vec<Result<CardImage, CardScanError>> {
    let mut images = Vec::with_capacity(inputs.len());
    for input in inputs {
        images.push(resolve_input(input, timeout_secs).await);
    }
    images
}

/// Name an input is reported under, whether or not it could be loaded.
pub fn input_name(input: &str) -> String {
    if is_url(input) {
        filename_from_url(input)
    } else {
        file_name_of(Path::new(input))
    }
}

/// Resolve a single local path or HTTP(S) URL to a [`CardImage`].
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<CardImage, CardScanError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(Path::new(input)).await
    }
}

async fn read_local(path: &Path) -> Result<CardImage, CardScanError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => CardScanError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => CardScanError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;

    let filename = file_name_of(path);
    debug!("Read local card image: {} ({} bytes)", path.display(), bytes.len());
    CardImage::from_bytes(filename, bytes)
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<CardImage, CardScanError> {
    info!("Downloading card image from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| CardScanError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            CardScanError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            CardScanError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(CardScanError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| CardScanError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    CardImage::from_bytes(filename_from_url(url), bytes.to_vec())
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Last non-empty URL path segment, or a generic name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() {
                    return last.to_string();
                }
            }
        }
    }
    "downloaded_card".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];
    const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10];

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/card.jpg"));
        assert!(is_url("http://example.com/card.jpg"));
        assert!(!is_url("/tmp/card.jpg"));
        assert!(!is_url("card.jpg"));
        assert!(!is_url(""));
    }

    #[test]
    fn detects_png_and_jpeg() {
        assert_eq!(detect_format(PNG_MAGIC), Some(ImageFormat::Png));
        assert_eq!(detect_format(JPEG_MAGIC), Some(ImageFormat::Jpeg));
        assert_eq!(detect_format(b"%PDF-1.7"), None);
    }

    #[test]
    fn from_bytes_rejects_text() {
        let err = CardImage::from_bytes("notes.txt", b"hello world".to_vec()).unwrap_err();
        match err {
            CardScanError::UnsupportedImage { name, magic } => {
                assert_eq!(name, "notes.txt");
                assert_eq!(&magic, b"hell");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn from_bytes_handles_short_input() {
        let err = CardImage::from_bytes("tiny", vec![1]).unwrap_err();
        assert!(matches!(err, CardScanError::UnsupportedImage { magic, .. } if magic == [1, 0, 0, 0]));
    }

    #[test]
    fn filename_from_url_uses_last_segment() {
        assert_eq!(filename_from_url("https://x.io/cards/acme.png"), "acme.png");
        assert_eq!(filename_from_url("https://x.io/"), "downloaded_card");
    }

    #[tokio::test]
    async fn resolves_local_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(JPEG_MAGIC).unwrap();
        let img = resolve_input(tmp.path().to_str().unwrap(), 5).await.unwrap();
        assert_eq!(img.format, ImageFormat::Jpeg);
        assert_eq!(img.content_type(), "image/jpeg");
        assert_eq!(img.bytes, JPEG_MAGIC);
    }

    #[test]
    fn input_name_matches_loaded_filename() {
        assert_eq!(input_name("/tmp/cards/acme.jpg"), "acme.jpg");
        assert_eq!(input_name("https://x.io/cards/acme.png"), "acme.png");
    }

    #[tokio::test]
    async fn resolve_inputs_keeps_going_past_a_bad_input() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(JPEG_MAGIC).unwrap();
        let inputs = vec![
            "/definitely/not/here.jpg".to_string(),
            tmp.path().to_str().unwrap().to_string(),
        ];

        let results = resolve_inputs(&inputs, 5).await;

        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], Err(CardScanError::FileNotFound { .. })));
        assert!(results[1].is_ok());
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let err = resolve_input("/definitely/not/here.jpg", 5).await.unwrap_err();
        assert!(matches!(err, CardScanError::FileNotFound { .. }));
    }
}
