//! Frame-set resolver.
//!
//! After capture, inspects the frame directory to find out what the engine
//! really wrote: which naming pattern (and zero padding) it used, where the
//! numbering starts and how many frames exist. This is the post-condition
//! check standing between the capture engine and the encoder.

use std::io;
use std::path::{Path, PathBuf};

use crate::sanitize::MAX_TOTAL_FRAMES;

/// How many frames a capture may fall short before it counts as incomplete.
pub const COUNT_TOLERANCE: u32 = 5;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

#[derive(Debug, thiserror::Error)]
pub enum FrameSetError {
    #[error("capture produced no frames")]
    Empty,

    #[error("incomplete capture: found {found} frames, expected {expected}")]
    Incomplete { found: u32, expected: u32 },

    #[error("unrecognized frame file name '{0}'")]
    UnrecognizedName(String),

    #[error("expected frame count {expected} exceeds the ceiling of {ceiling}")]
    OverBudget { expected: u32, ceiling: u32 },

    #[error("failed to read frame directory: {0}")]
    Io(#[from] io::Error),
}

/// The discovered layout of a captured frame sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePattern {
    pub directory: PathBuf,
    /// printf-style file name, e.g. `image-%09d.png`.
    pub file_pattern: String,
    /// Number embedded in the first frame's name.
    pub start_number: u32,
    pub frame_count: u32,
}

impl FramePattern {
    /// Full path template handed to the encoder.
    pub fn path_template(&self) -> PathBuf {
        self.directory.join(&self.file_pattern)
    }
}

/// Resolve the frame set in `frame_dir` and validate its size.
///
/// Having more frames than expected is fine; the encoder reads at the
/// capture frame rate and trailing frames do no harm.
pub async fn resolve(frame_dir: &Path, expected: u32) -> Result<FramePattern, FrameSetError> {
    if expected > MAX_TOTAL_FRAMES {
        return Err(FrameSetError::OverBudget {
            expected,
            ceiling: MAX_TOTAL_FRAMES,
        });
    }

    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(frame_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if is_image(name) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();

    let first = names.first().ok_or(FrameSetError::Empty)?;
    let (file_pattern, start_number) =
        infer_pattern(first).ok_or_else(|| FrameSetError::UnrecognizedName(first.clone()))?;

    let found = u32::try_from(names.len()).unwrap_or(u32::MAX);
    if found.saturating_add(COUNT_TOLERANCE) < expected {
        return Err(FrameSetError::Incomplete { found, expected });
    }

    tracing::debug!(
        pattern = %file_pattern,
        start_number,
        found,
        expected,
        "Resolved frame set",
    );

    Ok(FramePattern {
        directory: frame_dir.to_path_buf(),
        file_pattern,
        start_number,
        frame_count: found,
    })
}

/// Infer a printf-style pattern from one frame file name.
///
/// The trailing digit run of the stem is the frame number. A leading zero
/// means fixed-width padding of that run's length; otherwise the number is
/// unpadded. Returns the pattern and the parsed number.
pub fn infer_pattern(file_name: &str) -> Option<(String, u32)> {
    let (stem, extension) = file_name.rsplit_once('.')?;
    let digits_start = stem
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;

    let prefix = stem[..digits_start].replace('%', "%%");
    let digits = &stem[digits_start..];
    let number = digits.parse::<u32>().ok()?;

    let spec = if digits.len() > 1 && digits.starts_with('0') {
        format!("%0{}d", digits.len())
    } else {
        "%d".to_string()
    };

    Some((format!("{prefix}{spec}.{extension}"), number))
}

fn is_image(name: &str) -> bool {
    name.rsplit_once('.')
        .map(|(_, ext)| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn populate(dir: &Path, names: impl IntoIterator<Item = String>) {
        for name in names {
            std::fs::write(dir.join(name), b"\x89PNG").expect("write frame");
        }
    }

    #[test]
    fn infers_padded_and_unpadded_patterns() {
        assert_eq!(
            infer_pattern("image-000000001.png"),
            Some(("image-%09d.png".into(), 1))
        );
        assert_eq!(infer_pattern("image-1.png"), Some(("image-%d.png".into(), 1)));
        assert_eq!(infer_pattern("001.png"), Some(("%03d.png".into(), 1)));
        assert_eq!(infer_pattern("frame_0.jpg"), Some(("frame_%d.jpg".into(), 0)));
        assert_eq!(infer_pattern("100%-5.png"), Some(("100%%-%d.png".into(), 5)));
        assert_eq!(infer_pattern("image.png"), None);
        assert_eq!(infer_pattern("image-1"), None);
    }

    #[tokio::test]
    async fn resolves_nine_digit_padding() {
        let dir = tempfile::tempdir().expect("tempdir");
        populate(dir.path(), (1..=90).map(|i| format!("image-{i:09}.png")));

        let pattern = resolve(dir.path(), 90).await.expect("resolve");
        assert_eq!(pattern.file_pattern, "image-%09d.png");
        assert_eq!(pattern.start_number, 1);
        assert_eq!(pattern.frame_count, 90);
        assert_eq!(pattern.path_template(), dir.path().join("image-%09d.png"));
    }

    #[tokio::test]
    async fn unpadded_half_capture_is_incomplete() {
        let dir = tempfile::tempdir().expect("tempdir");
        populate(dir.path(), (1..=45).map(|i| format!("image-{i}.png")));

        let result = resolve(dir.path(), 90).await;
        assert_matches!(
            result,
            Err(FrameSetError::Incomplete { found: 45, expected: 90 })
        );
    }

    #[tokio::test]
    async fn shortfall_within_tolerance_is_accepted() {
        let dir = tempfile::tempdir().expect("tempdir");
        populate(dir.path(), (1..=55).map(|i| format!("image-{i}.png")));

        let pattern = resolve(dir.path(), 60).await.expect("resolve");
        assert_eq!(pattern.file_pattern, "image-%d.png");
        assert_eq!(pattern.frame_count, 55);

        let dir = tempfile::tempdir().expect("tempdir");
        populate(dir.path(), (1..=54).map(|i| format!("image-{i}.png")));
        assert_matches!(
            resolve(dir.path(), 60).await,
            Err(FrameSetError::Incomplete { found: 54, .. })
        );
    }

    #[tokio::test]
    async fn extra_frames_and_non_images_are_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        populate(dir.path(), (1..=70).map(|i| format!("image-{i:03}.png")));
        std::fs::write(dir.path().join("log.txt"), b"noise").expect("write");
        std::fs::create_dir(dir.path().join("nested.png")).expect("mkdir");

        let pattern = resolve(dir.path(), 60).await.expect("resolve");
        assert_eq!(pattern.file_pattern, "image-%03d.png");
        assert_eq!(pattern.frame_count, 70);
    }

    #[tokio::test]
    async fn empty_directory_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_matches!(resolve(dir.path(), 10).await, Err(FrameSetError::Empty));
    }

    #[tokio::test]
    async fn expectation_over_ceiling_is_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_matches!(
            resolve(dir.path(), MAX_TOTAL_FRAMES + 1).await,
            Err(FrameSetError::OverBudget { .. })
        );
    }

    #[tokio::test]
    async fn missing_directory_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_matches!(
            resolve(&dir.path().join("gone"), 10).await,
            Err(FrameSetError::Io(_))
        );
    }
}
