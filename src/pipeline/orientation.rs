//! Orientation check: ask the vision oracle how far to turn the drawing.
//!
//! Orientation is best-effort. Any failure (transport, timeout, non-JSON
//! content, an angle outside {0, 90, 180, 270}) yields [`Rotation::None`] and
//! a warning; this stage never fails a file.

use crate::config::ExtractionConfig;
use crate::oracle::{ImageRef, OracleRequest, VisionOracle};
use crate::pipeline::encode::data_uri;
use crate::pipeline::normalize::{ProcessedImage, Rotation};
use crate::pipeline::parse::parse_object;
use crate::prompts::{ORIENTATION_SYSTEM_PROMPT, ORIENTATION_USER_PROMPT};
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

/// The oracle's orientation answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrientationVerdict {
    pub rotation: Rotation,
    pub reasoning: Option<String>,
}

impl OrientationVerdict {
    fn identity() -> Self {
        Self {
            rotation: Rotation::None,
            reasoning: None,
        }
    }
}

/// Build the orientation request: inline data URI, bounded timeout, JSON mode.
pub fn orientation_request(
    image: &ProcessedImage,
    name: &str,
    config: &ExtractionConfig,
) -> OracleRequest {
    OracleRequest {
        label: format!("{name}/orientation"),
        model: config.orientation_model.clone(),
        system: ORIENTATION_SYSTEM_PROMPT.to_string(),
        user_text: ORIENTATION_USER_PROMPT.to_string(),
        image: ImageRef::DataUri(data_uri(image)),
        max_tokens: Some(config.orientation_max_tokens),
        temperature: Some(0.0),
        json_mode: true,
        timeout: Duration::from_secs(config.orientation_timeout_secs),
    }
}

/// Ask `oracle` for the counter-clockwise correction of `image`.
pub async fn detect_orientation(
    oracle: &dyn VisionOracle,
    image: &ProcessedImage,
    name: &str,
    config: &ExtractionConfig,
) -> OrientationVerdict {
    let request = orientation_request(image, name, config);
    let content = match oracle.infer(&request).await {
        Ok(content) => content,
        Err(e) => {
            warn!("{}: orientation check failed, assuming 0°: {}", name, e);
            return OrientationVerdict::identity();
        }
    };

    match parse_verdict(&content) {
        Ok(verdict) => {
            info!(
                "{}: orientation oracle suggests {}° CCW",
                name,
                verdict.rotation.degrees()
            );
            verdict
        }
        Err(reason) => {
            warn!("{}: {}, assuming 0°", name, reason);
            OrientationVerdict::identity()
        }
    }
}

/// Parse the oracle's `{rotation_angle_ccw, reasoning}` answer.
///
/// A missing angle means 0. The angle may arrive as an integer, an integral
/// float or a numeric string.
pub fn parse_verdict(content: &str) -> Result<OrientationVerdict, String> {
    let map = parse_object(content, "orientation").map_err(|e| e.to_string())?;

    let degrees = match map.get("rotation_angle_ccw") {
        None | Some(Value::Null) => 0,
        Some(v) => angle_of(v).ok_or_else(|| format!("unreadable rotation angle {v}"))?,
    };
    let rotation = Rotation::from_degrees(degrees)
        .ok_or_else(|| format!("invalid rotation angle {degrees}"))?;

    Ok(OrientationVerdict {
        rotation,
        reasoning: map
            .get("reasoning")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

fn angle_of(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
