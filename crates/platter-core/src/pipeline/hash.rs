//! Content hashing and storage key derivation.

use blake3::Hasher as Blake3Hasher;
use url::Url;

use crate::types::ImageType;

/// Extension used when neither the content type nor the URL names one.
pub const FALLBACK_EXTENSION: &str = "bin";

/// Prefix every storage key lives under.
pub const KEY_PREFIX: &str = "images";

/// Content hashing for deduplicated storage.
pub struct Hasher;

impl Hasher {
    /// Generate a BLAKE3 hash from an in-memory byte buffer.
    ///
    /// Equal bytes always produce equal hashes, so equal images share one key.
    pub fn content_hash_from_bytes(data: &[u8]) -> String {
        let mut hasher = Blake3Hasher::new();
        hasher.update(data);
        hasher.finalize().to_hex().to_string()
    }

    /// Pick the key extension: content type first, then a known image
    /// extension on the URL path, then [`FALLBACK_EXTENSION`].
    pub fn extension_for(content_type: Option<ImageType>, source: Option<&Url>) -> String {
        if let Some(kind) = content_type {
            return kind.extension().to_string();
        }

        source
            .and_then(|url| url.path_segments()?.next_back().map(str::to_string))
            .and_then(|last| {
                let (_, ext) = last.rsplit_once('.')?;
                ImageType::from_extension(ext)
            })
            .map(|kind| kind.extension().to_string())
            .unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
    }

    /// `images/<hash>.<ext>`
    pub fn storage_key(hash: &str, extension: &str) -> String {
        format!("{KEY_PREFIX}/{hash}.{extension}")
    }
}
