//! Parameter sanitizer for render requests.
//!
//! Turns untrusted client input into a [`RenderConfig`] that is safe to hand
//! to the capture engine and the encoder. Oversized values are silently
//! capped; values that cannot be interpreted at all are rejected.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Defaults and ceilings
// ---------------------------------------------------------------------------

pub const DEFAULT_WIDTH: u32 = 800;
pub const DEFAULT_HEIGHT: u32 = 400;
pub const DEFAULT_DURATION_SECS: u32 = 3;
pub const DEFAULT_FPS: u32 = 30;
pub const DEFAULT_BACKGROUND: &str = "transparent";

/// Maximum width or height in pixels.
pub const MAX_DIMENSION: u32 = 1280;
/// Maximum animation length in seconds.
pub const MAX_DURATION_SECS: u32 = 20;
/// Maximum number of frames a single job may capture.
pub const MAX_TOTAL_FRAMES: u32 = 450;
/// fps never drops below this when reduced to fit [`MAX_TOTAL_FRAMES`].
pub const MIN_REDUCED_FPS: u32 = 10;

/// Longest accepted background color token.
const MAX_BACKGROUND_LEN: usize = 64;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Raw `POST /start` body as sent by the client.
///
/// Numeric fields accept JSON numbers or numeric strings; fractional values
/// are truncated.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RenderRequest {
    pub html: Option<String>,
    pub css: Option<String>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub width: Option<i64>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub height: Option<i64>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub duration: Option<i64>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub fps: Option<i64>,
    #[serde(alias = "backgroundColor")]
    pub bg: Option<String>,
}

/// Validated, immutable render configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub duration_secs: u32,
    pub fps: u32,
    pub background_color: String,
}

impl RenderConfig {
    /// Frame budget for the job (`duration_secs * fps`).
    pub fn total_frames(&self) -> u32 {
        self.duration_secs * self.fps
    }

    pub fn is_transparent(&self) -> bool {
        self.background_color.eq_ignore_ascii_case("transparent")
    }
}

/// A sanitized request: the config plus the document content it renders.
#[derive(Debug, Clone)]
pub struct RenderInput {
    pub config: RenderConfig,
    pub html: String,
    pub css: String,
}

// ---------------------------------------------------------------------------
// Sanitizing
// ---------------------------------------------------------------------------

/// Validate and clamp a raw request.
pub fn sanitize(raw: RenderRequest) -> Result<RenderInput, CoreError> {
    let html = raw
        .html
        .ok_or_else(|| CoreError::Validation("'html' is required".to_string()))?;
    let css = raw.css.unwrap_or_default();

    let width = even_ceil(positive("width", raw.width, DEFAULT_WIDTH)?.min(MAX_DIMENSION));
    let height = even_ceil(positive("height", raw.height, DEFAULT_HEIGHT)?.min(MAX_DIMENSION));
    let duration_secs =
        positive("duration", raw.duration, DEFAULT_DURATION_SECS)?.min(MAX_DURATION_SECS);
    let fps = fit_fps(duration_secs, positive("fps", raw.fps, DEFAULT_FPS)?);
    let background_color = background(raw.bg.as_deref())?;

    Ok(RenderInput {
        config: RenderConfig {
            width,
            height,
            duration_secs,
            fps,
            background_color,
        },
        html,
        css,
    })
}

/// Reduce `fps` so that `duration_secs * fps` stays within [`MAX_TOTAL_FRAMES`].
///
/// Returns the requested value untouched when it already fits; otherwise the
/// largest fps under the ceiling, never lower than [`MIN_REDUCED_FPS`].
pub fn fit_fps(duration_secs: u32, fps: u32) -> u32 {
    if duration_secs == 0 || duration_secs.saturating_mul(fps) <= MAX_TOTAL_FRAMES {
        return fps;
    }
    (MAX_TOTAL_FRAMES / duration_secs).max(MIN_REDUCED_FPS)
}

/// Round up to the next even integer. The palette filters reject odd sizes.
pub fn even_ceil(value: u32) -> u32 {
    value + (value % 2)
}

fn positive(field: &str, value: Option<i64>, default: u32) -> Result<u32, CoreError> {
    match value {
        None => Ok(default),
        Some(v) if v <= 0 => Err(CoreError::Validation(format!(
            "'{field}' must be a positive integer, got {v}"
        ))),
        Some(v) => Ok(u32::try_from(v).unwrap_or(u32::MAX)),
    }
}

fn background(bg: Option<&str>) -> Result<String, CoreError> {
    let bg = bg.map(str::trim).unwrap_or_default();
    if bg.is_empty() {
        return Ok(DEFAULT_BACKGROUND.to_string());
    }
    if bg.len() > MAX_BACKGROUND_LEN {
        return Err(CoreError::Validation(format!(
            "'bg' must be at most {MAX_BACKGROUND_LEN} characters"
        )));
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || "#(),.% -".contains(c);
    if !bg.chars().all(allowed) {
        return Err(CoreError::Validation(format!(
            "'bg' is not a plain CSS color: '{bg}'"
        )));
    }
    Ok(bg.to_string())
}

/// Accept `30`, `30.7` and `"30"` alike.
fn lenient_int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntLike {
        Int(i64),
        Float(f64),
        Text(String),
    }

    match Option::<IntLike>::deserialize(deserializer)? {
        None => Ok(None),
        Some(IntLike::Int(v)) => Ok(Some(v)),
        Some(IntLike::Float(v)) => Ok(Some(v.trunc() as i64)),
        Some(IntLike::Text(s)) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            s.parse::<f64>()
                .map(|v| Some(v.trunc() as i64))
                .map_err(|_| serde::de::Error::custom(format!("expected a number, got '{s}'")))
        }
    }
}
