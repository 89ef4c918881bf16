use std::path::{Path, PathBuf};

use base64::{engine::general_purpose, Engine as _};
use log::{debug, warn};
use thiserror::Error;
use uuid::Uuid;

const POST_IMAGES_DIR: &str = "posts";

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Invalid file type. Only JPEG, PNG, GIF, and WEBP are allowed.")]
    UnsupportedType(String),
    #[error("Invalid base64 image data")]
    InvalidData(#[from] base64::DecodeError),
    #[error("Image is empty")]
    Empty,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A decoded image coming from a post form, not yet written anywhere.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    bytes: Vec<u8>,
    extension: &'static str,
}

impl UploadedImage {
    /// Decodes a `data:image/<type>;base64,<payload>` URL.
    pub fn from_data_url(data_url: &str) -> Result<Self, MediaError> {
        let (header, payload) = data_url
            .strip_prefix("data:")
            .and_then(|rest| rest.split_once(','))
            .ok_or_else(|| MediaError::UnsupportedType("missing data URL header".to_string()))?;
        let content_type = header.split(';').next().unwrap_or_default();
        Self::from_base64(content_type, payload)
    }

    pub fn from_base64(content_type: &str, payload: &str) -> Result<Self, MediaError> {
        let extension = image_extension(content_type)?;
        let bytes = general_purpose::STANDARD.decode(payload.trim())?;
        if bytes.is_empty() {
            return Err(MediaError::Empty);
        }
        Ok(Self { bytes, extension })
    }

    pub fn extension(&self) -> &'static str {
        self.extension
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }
}

fn image_extension(content_type: &str) -> Result<&'static str, MediaError> {
    let parsed: mime::Mime = content_type
        .trim()
        .parse()
        .map_err(|_| MediaError::UnsupportedType(content_type.to_string()))?;
    if parsed.type_() != mime::IMAGE {
        return Err(MediaError::UnsupportedType(content_type.to_string()));
    }
    match parsed.subtype().as_str() {
        "jpeg" | "jpg" => Ok("jpg"),
        "png" => Ok("png"),
        "gif" => Ok("gif"),
        "webp" => Ok("webp"),
        _ => Err(MediaError::UnsupportedType(content_type.to_string())),
    }
}

pub fn content_type_for(filename: &str) -> &'static str {
    match Path::new(filename).extension().and_then(|ext| ext.to_str()) {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Post images on the local filesystem under `root/posts/`.
#[derive(Debug, Clone)]
pub struct MediaStorage {
    root: PathBuf,
}

impl MediaStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Writes the image and returns its path relative to the media root.
    pub async fn save_post_image(&self, image: &UploadedImage) -> Result<String, MediaError> {
        let dir = self.root.join(POST_IMAGES_DIR);
        tokio::fs::create_dir_all(&dir).await?;

        let filename = format!("{}.{}", Uuid::new_v4(), image.extension);
        tokio::fs::write(dir.join(&filename), &image.bytes).await?;
        debug!("Stored post image {} ({} bytes)", filename, image.len());

        Ok(format!("{}/{}", POST_IMAGES_DIR, filename))
    }

    /// Best-effort removal of a stored image.
    pub async fn remove(&self, relative: &str) {
        if let Err(e) = tokio::fs::remove_file(self.root.join(relative)).await {
            warn!("Failed to remove media file {}: {}", relative, e);
        }
    }

    /// Maps a requested file name onto the post images directory, dropping
    /// any directory components.
    pub fn post_image_path(&self, filename: &str) -> Option<PathBuf> {
        let safe = Path::new(filename).file_name()?.to_str()?;
        Some(self.root.join(POST_IMAGES_DIR).join(safe))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 1x1 transparent gif
    const SMALL_GIF: &str = "R0lGODlhAQABAIAAAAAAAP///yH5BAEAAAAALAAAAAABAAEAAAIBRAA7";

    #[test]
    fn decodes_data_url() {
        let image = UploadedImage::from_data_url(&format!("data:image/gif;base64,{}", SMALL_GIF))
            .unwrap();
        assert_eq!(image.extension(), "gif");
        assert!(image.len() > 0);
    }

    #[test]
    fn rejects_non_images_and_garbage() {
        assert!(matches!(
            UploadedImage::from_base64("text/plain", SMALL_GIF),
            Err(MediaError::UnsupportedType(_))
        ));
        assert!(matches!(
            UploadedImage::from_base64("image/gif", "not base64!!"),
            Err(MediaError::InvalidData(_))
        ));
        assert!(matches!(
            UploadedImage::from_data_url("plain text"),
            Err(MediaError::UnsupportedType(_))
        ));
    }

    #[test]
    fn content_type_follows_extension() {
        assert_eq!(content_type_for("a.jpg"), "image/jpeg");
        assert_eq!(content_type_for("a.webp"), "image/webp");
        assert_eq!(content_type_for("a.exe"), "application/octet-stream");
    }

    #[test]
    fn post_image_path_strips_directories() {
        let storage = MediaStorage::new("/srv/media");
        assert_eq!(
            storage.post_image_path("../../etc/passwd").unwrap(),
            PathBuf::from("/srv/media/posts/passwd")
        );
    }

    #[tokio::test]
    async fn saves_under_posts_directory() {
        let root = std::env::temp_dir().join(format!("yatube-media-{}", Uuid::new_v4()));
        let storage = MediaStorage::new(root.clone());
        let image = UploadedImage::from_base64("image/gif", SMALL_GIF).unwrap();

        let relative = storage.save_post_image(&image).await.unwrap();
        assert!(relative.starts_with("posts/"));
        assert!(relative.ends_with(".gif"));
        assert!(root.join(&relative).exists());

        storage.remove(&relative).await;
        assert!(!root.join(&relative).exists());
        let _ = std::fs::remove_dir_all(root);
    }
}
