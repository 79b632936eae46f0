use crate::adapters::storage::ObjectStorage;
use crate::config::StorageConfig;
use crate::error::{AppError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub(crate) struct Metrics {
    pub(crate) uploaded_total: Counter<u64>,
    pub(crate) upload_size_bytes: Histogram<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("parley-server");
        Self {
            uploaded_total: meter
                .u64_counter("media_uploads_total")
                .with_description("Images uploaded to object storage")
                .build(),
            upload_size_bytes: meter
                .u64_histogram("media_upload_size_bytes")
                .with_description("Distribution of decoded image sizes")
                .build(),
        }
    }
}

/// Folder an image is stored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFolder {
    Messages,
    Avatars,
}

impl MediaFolder {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Messages => "messages",
            Self::Avatars => "avatars",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct DecodedImage {
    content_type: &'static str,
    extension: &'static str,
    body: Bytes,
}

#[derive(Clone, Debug)]
pub struct MediaService {
    storage: Arc<dyn ObjectStorage>,
    public_url: String,
    max_image_bytes: usize,
    metrics: Metrics,
}

impl MediaService {
    #[must_use]
    pub fn new(storage: Arc<dyn ObjectStorage>, config: &StorageConfig) -> Self {
        Self {
            storage,
            public_url: config.public_url.trim_end_matches('/').to_string(),
            max_image_bytes: config.max_image_bytes,
            metrics: Metrics::new(),
        }
    }

    /// Stores an image given as a `data:` URI or bare base64 and returns its
    /// public URL. A URL already served from our public base is returned as is.
    ///
    /// # Errors
    /// Returns `AppError::Validation` if the payload is not a supported image or is too large.
    /// Returns `AppError::Upstream` if the object store rejects the upload.
    #[tracing::instrument(err(level = "warn"), skip(self, payload), fields(folder = folder.as_str(), key = tracing::field::Empty))]
    pub async fn upload_image(&self, folder: MediaFolder, payload: &str) -> Result<String> {
        let payload = payload.trim();
        if payload.starts_with(&format!("{}/", self.public_url)) {
            return Ok(payload.to_string());
        }

        let image = self.decode(payload)?;
        let key = format!("{}/{}.{}", folder.as_str(), Uuid::new_v4(), image.extension);
        tracing::Span::current().record("key", key.as_str());

        let size = image.body.len() as u64;
        self.storage.put(&key, image.body, image.content_type).await?;

        self.metrics.uploaded_total.add(1, &[KeyValue::new("folder", folder.as_str())]);
        self.metrics.upload_size_bytes.record(size, &[]);
        tracing::debug!(size, "Image stored");

        Ok(format!("{}/{key}", self.public_url))
    }

    fn decode(&self, payload: &str) -> Result<DecodedImage> {
        let (declared, data) = match payload.strip_prefix("data:") {
            Some(rest) => {
                let (meta, data) =
                    rest.split_once(',').ok_or_else(|| AppError::Validation("Malformed data URI".to_string()))?;
                let mime = meta
                    .strip_suffix(";base64")
                    .ok_or_else(|| AppError::Validation("Image data URI must be base64 encoded".to_string()))?;
                (Some(mime.to_ascii_lowercase()), data)
            }
            None => (None, payload),
        };

        // base64 expands by 4/3; reject oversized payloads before decoding them
        if data.len() / 4 * 3 > self.max_image_bytes + 3 {
            return Err(self.too_large());
        }

        let body = STANDARD.decode(data).map_err(|_| AppError::Validation("Image is not valid base64".to_string()))?;
        if body.is_empty() {
            return Err(AppError::Validation("Image is empty".to_string()));
        }
        if body.len() > self.max_image_bytes {
            return Err(self.too_large());
        }

        let (content_type, extension) = match declared.as_deref() {
            Some(mime) => image_type_for_mime(mime)
                .ok_or_else(|| AppError::Validation(format!("Unsupported image type: {mime}")))?,
            None => sniff_image_type(&body)
                .ok_or_else(|| AppError::Validation("Unrecognized image format".to_string()))?,
        };

        Ok(DecodedImage { content_type, extension, body: Bytes::from(body) })
    }

    fn too_large(&self) -> AppError {
        AppError::Validation(format!("Image exceeds the {} byte limit", self.max_image_bytes))
    }
}

fn image_type_for_mime(mime: &str) -> Option<(&'static str, &'static str)> {
    match mime {
        "image/png" => Some(("image/png", "png")),
        "image/jpeg" | "image/jpg" => Some(("image/jpeg", "jpg")),
        "image/gif" => Some(("image/gif", "gif")),
        "image/webp" => Some(("image/webp", "webp")),
        _ => None,
    }
}

fn sniff_image_type(body: &[u8]) -> Option<(&'static str, &'static str)> {
    match body {
        [0x89, b'P', b'N', b'G', ..] => Some(("image/png", "png")),
        [0xFF, 0xD8, 0xFF, ..] => Some(("image/jpeg", "jpg")),
        [b'G', b'I', b'F', b'8', ..] => Some(("image/gif", "gif")),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some(("image/webp", "webp")),
        _ => None,
    }
}
