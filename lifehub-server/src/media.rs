//! Uploaded files under the media root
//!
//! Uploads arrive as base64 strings inside JSON bodies and are written to
//! `<media_root>/<kind>/YYYY/MM/<uuid>.<ext>`. Stored paths are relative to
//! the media root.

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose, Engine as _};
use chrono::Datelike;
use lifehub_common::{time, uuid_utils};
use tracing::warn;

use crate::error::{ApiError, ApiResult};

/// Image types accepted for text recognition
pub const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "tiff", "webp"];

/// Lowercase extension of a filename, without the dot
pub fn extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .filter(|e| !e.is_empty())
}

/// Decode a base64 payload, tolerating a `data:<mime>;base64,` prefix
pub fn decode_base64(field: &str, data: &str) -> ApiResult<Vec<u8>> {
    let payload = match data.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => data,
    };
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|_| ApiError::field(field, "Invalid base64 data"))
}

/// Absolute location of a stored relative path
pub fn resolve(root: &Path, relative: &str) -> PathBuf {
    root.join(relative)
}

/// Write `bytes` under `kind/YYYY/MM/` and return the relative path
pub async fn store(root: &Path, kind: &str, ext: &str, bytes: &[u8]) -> ApiResult<String> {
    let today = time::today();
    let relative = format!(
        "{}/{:04}/{:02}/{}.{}",
        kind,
        today.year(),
        today.month(),
        uuid_utils::generate(),
        ext
    );
    let path = resolve(root, &relative);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&path, bytes).await?;
    Ok(relative)
}

/// Best-effort removal of a stored file
pub async fn remove(root: &Path, relative: &str) {
    if relative.is_empty() {
        return;
    }
    let path = resolve(root, relative);
    if let Err(e) = tokio::fs::remove_file(&path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_lowercases() {
        assert_eq!(extension("Scan.PNG").as_deref(), Some("png"));
        assert_eq!(extension("archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(extension("noext"), None);
    }

    #[test]
    fn test_decode_accepts_data_url() {
        assert_eq!(decode_base64("image", "aGVsbG8=").unwrap(), b"hello");
        assert_eq!(decode_base64("image", "data:image/png;base64,aGVs\nbG8=").unwrap(), b"hello");
        assert!(decode_base64("image", "***").is_err());
    }

    #[tokio::test]
    async fn test_store_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let relative = store(dir.path(), "ocr_images", "png", b"data").await.unwrap();
        assert!(relative.starts_with("ocr_images/"));
        assert!(relative.ends_with(".png"));

        let path = resolve(dir.path(), &relative);
        assert_eq!(std::fs::read(&path).unwrap(), b"data");

        remove(dir.path(), &relative).await;
        assert!(!path.exists());
        // second removal is silent
        remove(dir.path(), &relative).await;
    }
}
