//! Domain types for cached assets.

use std::io::Cursor;
use std::sync::Arc;

use bytes::Bytes;
use image::{AnimationDecoder, DynamicImage, ImageFormat};

use crate::domain::errors::AssetError;

/// Stable identifier for a cached asset.
/// Generated from a hash of the source URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetKey(String);

impl AssetKey {
    /// Creates a new `AssetKey` from any string-like input.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Creates an `AssetKey` from a URL by hashing it.
    #[must_use]
    pub fn from_url(url: &str) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        let result = hasher.finalize();
        Self(hex::encode(&result[..16]))
    }

    /// Returns the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AssetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AssetKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for AssetKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A decoded asset together with the bytes it was decoded from.
///
/// Multi-frame assets (animated GIFs) keep every frame; the memory tier
/// charges them proportionally.
#[derive(Debug, Clone)]
pub struct Asset {
    frames: Vec<DynamicImage>,
    scale: f32,
    data: Option<Bytes>,
}

impl Asset {
    /// Wraps a single decoded frame.
    #[must_use]
    pub fn new(image: DynamicImage) -> Self {
        Self {
            frames: vec![image],
            scale: 1.0,
            data: None,
        }
    }

    /// Wraps an animation. Returns `None` for an empty frame list.
    #[must_use]
    pub fn animated(frames: Vec<DynamicImage>) -> Option<Self> {
        if frames.is_empty() {
            return None;
        }
        Some(Self {
            frames,
            scale: 1.0,
            data: None,
        })
    }

    /// Sets the display scale factor.
    #[must_use]
    pub const fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    /// Attaches the raw encoded bytes.
    #[must_use]
    pub fn with_data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Decodes a fetched payload, keeping the raw bytes for persistence.
    ///
    /// # Errors
    /// Returns [`AssetError::Decode`] if the bytes are not a supported image.
    pub fn decode(data: Bytes) -> Result<Self, AssetError> {
        let format = image::guess_format(&data).map_err(AssetError::decode)?;

        let frames = if format == ImageFormat::Gif {
            let decoder = image::codecs::gif::GifDecoder::new(Cursor::new(data.as_ref()))
                .map_err(AssetError::decode)?;
            decoder
                .into_frames()
                .collect_frames()
                .map_err(AssetError::decode)?
                .into_iter()
                .map(|frame| DynamicImage::ImageRgba8(frame.into_buffer()))
                .collect()
        } else {
            vec![image::load_from_memory_with_format(&data, format).map_err(AssetError::decode)?]
        };

        Self::animated(frames)
            .map(|asset| asset.with_data(data))
            .ok_or_else(|| AssetError::decode("payload contains no frames"))
    }

    /// Returns bytes suitable for persisting this asset.
    /// Falls back to re-encoding the first frame as PNG when no raw bytes are held.
    ///
    /// # Errors
    /// Returns [`AssetError::Decode`] if PNG encoding fails.
    pub fn encode(&self) -> Result<Bytes, AssetError> {
        if let Some(data) = &self.data {
            return Ok(data.clone());
        }

        let mut buffer = Cursor::new(Vec::new());
        self.image()
            .write_to(&mut buffer, ImageFormat::Png)
            .map_err(AssetError::decode)?;
        Ok(Bytes::from(buffer.into_inner()))
    }

    /// Eviction cost: `frames x width x height x scale^2`.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn cost(&self) -> u64 {
        let image = self.image();
        let pixels = u64::from(image.width()) * u64::from(image.height());
        let scale = f64::from(self.scale);
        (self.frames.len() as f64 * pixels as f64 * scale * scale) as u64
    }

    /// First (or only) frame.
    #[must_use]
    pub fn image(&self) -> &DynamicImage {
        &self.frames[0]
    }

    /// All frames.
    #[must_use]
    pub fn frames(&self) -> &[DynamicImage] {
        &self.frames
    }

    /// Number of frames, at least one.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Display scale factor.
    #[must_use]
    pub const fn scale(&self) -> f32 {
        self.scale
    }

    /// Raw encoded bytes, if retained.
    #[must_use]
    pub const fn data(&self) -> Option<&Bytes> {
        self.data.as_ref()
    }

    /// Width of the first frame in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.image().width()
    }

    /// Height of the first frame in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.image().height()
    }
}

/// State of a download operation, also used to tag what a caller observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetState {
    /// Registered, fetch not yet started.
    #[default]
    New,
    /// Fetch in progress.
    Downloading,
    /// Fetch succeeded.
    Downloaded,
    /// Served from a storage tier.
    Cached,
    /// Fetch or decode failed.
    Failed,
    /// Every waiter withdrew before completion.
    Cancelled,
}

impl AssetState {
    /// Returns true for states no transition leaves.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Downloaded | Self::Cached | Self::Failed | Self::Cancelled
        )
    }

    /// Returns true if `next` is a legal successor of `self`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::New => matches!(next, Self::Downloading | Self::Cached | Self::Failed | Self::Cancelled),
            Self::Downloading => {
                matches!(next, Self::Downloaded | Self::Failed | Self::Cancelled)
            }
            Self::Downloaded | Self::Cached | Self::Failed | Self::Cancelled => false,
        }
    }
}

impl std::fmt::Display for AssetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Downloading => write!(f, "downloading"),
            Self::Downloaded => write!(f, "downloaded"),
            Self::Cached => write!(f, "cached"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// What a completed request hands back to its caller.
#[derive(Debug, Clone)]
pub struct LoadedAsset {
    /// The asset key.
    pub key: AssetKey,
    /// The decoded asset, shared between every waiter of the same operation.
    pub asset: Arc<Asset>,
    /// How this caller was served.
    pub state: AssetState,
}
