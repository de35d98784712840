//! Content validation for fetched images.
//!
//! Two gates: a URL heuristic that runs before any fetch, and a type check on
//! the response. The declared type is checked before the body is read; the
//! magic bytes are checked after, and they decide the stored type.

use crate::config::ValidationConfig;
use crate::error::{IngestError, ValidationError};
use crate::pipeline::fetch::FetchOutcome;
use crate::types::{ImageType, ResolvedTarget, ValidatedAsset};

/// Declared types that carry no information; the body decides.
const GENERIC_TYPES: &[&str] = &["application/octet-stream", "binary/octet-stream"];

/// Validates sources and fetched content.
#[derive(Debug, Clone)]
pub struct Validator {
    config: ValidationConfig,
}

impl Validator {
    /// Create a new validator with the given settings.
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Reject URLs that only ever serve stock or dummy images.
    ///
    /// Runs before the fetch, so a rejected source costs no network I/O.
    pub fn check_source(&self, target: &ResolvedTarget) -> Result<(), ValidationError> {
        if !self.config.reject_placeholders {
            return Ok(());
        }

        let host = target.host();
        let host_match = self.config.placeholder_hosts.iter().any(|pattern| {
            let pattern = pattern.trim().trim_start_matches('.').to_ascii_lowercase();
            !pattern.is_empty()
                && (host == pattern || host.ends_with(&format!(".{pattern}")))
        });
        if host_match {
            return Err(ValidationError::LooksLikePlaceholder(host.to_string()));
        }

        let path_match = target
            .url()
            .path_segments()
            .map(|mut segments| {
                segments.any(|s| s.to_ascii_lowercase().contains("placeholder"))
            })
            .unwrap_or(false);
        if path_match {
            return Err(ValidationError::LooksLikePlaceholder(
                target.url().path().to_string(),
            ));
        }

        Ok(())
    }

    /// Check the declared type, drain the capped body, then check the bytes.
    ///
    /// Fetch errors from reading the body (size cap, deadline) pass through.
    pub async fn validate(&self, outcome: FetchOutcome) -> Result<ValidatedAsset, IngestError> {
        let declared = declared_type(outcome.declared_content_type.as_deref())?;

        let bytes = outcome.body.read_capped().await?;
        if bytes.is_empty() {
            return Err(ValidationError::NotAnImage("empty body".to_string()).into());
        }

        let sniffed = sniff_image_type(&bytes).ok_or_else(|| {
            ValidationError::NotAnImage("unrecognized image signature".to_string())
        })?;

        if let Some(declared) = declared {
            if declared != sniffed {
                tracing::debug!(
                    declared = declared.mime(),
                    sniffed = sniffed.mime(),
                    "Declared type disagrees with content; using sniffed type"
                );
            }
        }

        Ok(ValidatedAsset {
            bytes,
            content_type: sniffed,
            source_url: outcome.final_url,
        })
    }
}

/// `Ok(Some)` for an allowed image type, `Ok(None)` when the body must decide.
fn declared_type(content_type: Option<&str>) -> Result<Option<ImageType>, ValidationError> {
    let Some(raw) = content_type else {
        return Ok(None);
    };
    let essence = raw.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    if essence.is_empty() || GENERIC_TYPES.contains(&essence.as_str()) {
        return Ok(None);
    }
    ImageType::from_mime(&essence)
        .map(Some)
        .ok_or(ValidationError::NotAnImage(essence))
}

/// Identify an allowed image format from its leading bytes.
pub fn sniff_image_type(header: &[u8]) -> Option<ImageType> {
    if header.len() < 4 {
        return None;
    }

    // JPEG: FF D8 FF
    if header.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(ImageType::Jpeg);
    }

    // PNG: 89 50 4E 47 0D 0A 1A 0A
    if header.starts_with(&[0x89, b'P', b'N', b'G']) {
        return Some(ImageType::Png);
    }

    // GIF: GIF87a / GIF89a
    if header.starts_with(b"GIF87a") || header.starts_with(b"GIF89a") {
        return Some(ImageType::Gif);
    }

    // WebP: RIFF....WEBP
    if header.len() >= 12 && header.starts_with(b"RIFF") && &header[8..12] == b"WEBP" {
        return Some(ImageType::Webp);
    }

    // AVIF: ftyp box at offset 4 with an avif/avis major brand.
    // HEIC shares the box layout but is not accepted.
    if header.len() >= 12 && &header[4..8] == b"ftyp" {
        let brand = &header[8..12];
        if brand == b"avif" || brand == b"avis" {
            return Some(ImageType::Avif);
        }
    }

    None
}
