/*!
 * Contracts for external collaborators.
 *
 * The engine core does not extract subtitles from containers, run OCR, or
 * talk to media managers; those jobs belong to collaborators behind the
 * traits below. The core consumes already-extracted text subtitle files
 * and optional series metadata.
 */

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::job::SeriesMetadata;

/// Extraction failed in the collaborator
#[derive(Error, Debug)]
#[error("Subtitle extraction failed: {0}")]
pub struct ExtractionFailed(pub String);

/// Metadata provider could not serve the series
#[derive(Error, Debug)]
#[error("Series metadata unavailable: {0}")]
pub struct Unavailable(pub String);

/// A subtitle track extracted from a container
#[derive(Debug, Clone)]
pub struct ExtractedTrack {
    /// Path to the extracted text subtitle file (SRT or ASS)
    pub path: PathBuf,
    /// Track language code, when the container declares one
    pub language: Option<String>,
    /// Container codec id (subrip, ass, ...)
    pub codec_id: Option<String>,
}

/// Yields already-extracted text subtitle files for a video.
/// Implementations live outside the core (ffmpeg wrapper, OCR service).
#[async_trait]
pub trait SubtitleSource: Send + Sync {
    /// Extract the text subtitle tracks of a video, optionally limited to
    /// one preferred track id.
    async fn extract(
        &self,
        video_path: &Path,
        preferred_track: Option<usize>,
    ) -> Result<Vec<ExtractedTrack>, ExtractionFailed>;
}

/// Supplies series metadata for glossary seeding and prompt enrichment.
/// When it returns `Unavailable` the core runs glossary-less.
#[async_trait]
pub trait SeriesMetadataProvider: Send + Sync {
    async fn metadata(&self, series_id: i64) -> Result<SeriesMetadata, Unavailable>;

    /// Alternative titles worth preserving verbatim, keyed lowercased
    async fn alternative_titles(&self, _series_id: i64) -> Result<HashMap<String, String>, Unavailable> {
        Ok(HashMap::new())
    }
}

/// Provider that always reports metadata as unavailable; used when no
/// media manager is configured.
pub struct NoMetadata;

#[async_trait]
impl SeriesMetadataProvider for NoMetadata {
    async fn metadata(&self, series_id: i64) -> Result<SeriesMetadata, Unavailable> {
        Err(Unavailable(format!("no metadata provider configured (series {})", series_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noMetadata_shouldReportUnavailable() {
        let provider = NoMetadata;
        let result = provider.metadata(42).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_alternativeTitles_defaultIsEmpty() {
        let provider = NoMetadata;
        let titles = provider.alternative_titles(42).await.unwrap();
        assert!(titles.is_empty());
    }
}
