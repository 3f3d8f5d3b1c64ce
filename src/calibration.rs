//! Camera calibration loading.
//!
//! Calibration files use the standard camera-calibration YAML layout:
//!
//! ```yaml
//! image_width: 1920
//! image_height: 1080
//! distortion_model: plumb_bob
//! distortion_coefficients: { rows: 1, cols: 5, data: [0, 0, 0, 0, 0] }
//! camera_matrix: { rows: 3, cols: 3, data: [...] }
//! rectification_matrix: { rows: 3, cols: 3, data: [...] }
//! projection_matrix: { rows: 3, cols: 4, data: [...] }
//! ```
//!
//! The provider never fails: anything unreadable yields the fallback record.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::AcquisitionError;

pub const DEFAULT_HEIGHT: u32 = 1080;
pub const DEFAULT_WIDTH: u32 = 1920;
pub const DEFAULT_DISTORTION_MODEL: &str = "plumb_bob";

const IDENTITY_3X3: [f64; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
const FALLBACK_K: [f64; 9] = [1000.0, 0.0, 960.0, 0.0, 1000.0, 540.0, 0.0, 0.0, 1.0];
const FALLBACK_P: [f64; 12] = [
    1000.0, 0.0, 960.0, 0.0, 0.0, 1000.0, 540.0, 0.0, 0.0, 0.0, 1.0, 0.0,
];

/// Geometric camera model shared by every published frame.
///
/// Serializes with the conventional short names (`D`, `K`, `R`, `P`).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CalibrationRecord {
    pub frame_id: String,
    pub height: u32,
    pub width: u32,
    pub distortion_model: String,
    #[serde(rename = "D")]
    pub distortion_coeffs: Vec<f64>,
    #[serde(rename = "K")]
    pub intrinsic_matrix: [f64; 9],
    #[serde(rename = "R")]
    pub rectification_matrix: [f64; 9],
    #[serde(rename = "P")]
    pub projection_matrix: [f64; 12],
}

impl CalibrationRecord {
    /// Record used when no usable calibration file exists.
    pub fn fallback(frame_id: &str) -> Self {
        Self {
            frame_id: frame_id.to_string(),
            height: DEFAULT_HEIGHT,
            width: DEFAULT_WIDTH,
            distortion_model: DEFAULT_DISTORTION_MODEL.to_string(),
            distortion_coeffs: vec![0.0; 5],
            intrinsic_matrix: FALLBACK_K,
            rectification_matrix: IDENTITY_3X3,
            projection_matrix: FALLBACK_P,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CalibrationFile {
    image_height: u32,
    image_width: u32,
    distortion_model: String,
    distortion_coefficients: MatrixData,
    camera_matrix: MatrixData,
    rectification_matrix: MatrixData,
    projection_matrix: MatrixData,
}

#[derive(Debug, Deserialize)]
struct MatrixData {
    data: Vec<f64>,
}

pub struct CalibrationProvider;

impl CalibrationProvider {
    /// Load calibration from `path`, falling back to `CalibrationRecord::fallback`.
    pub fn load(path: &Path, frame_id: &str) -> CalibrationRecord {
        match Self::try_load(path, frame_id) {
            Ok(record) => {
                log::info!("camera calibration loaded from {}", path.display());
                record
            }
            Err(err) => {
                log::error!("failed to load camera calibration: {}", err);
                log::warn!(
                    "using default calibration ({}x{}, {})",
                    DEFAULT_WIDTH,
                    DEFAULT_HEIGHT,
                    DEFAULT_DISTORTION_MODEL
                );
                CalibrationRecord::fallback(frame_id)
            }
        }
    }

    /// Load calibration from `path`, reporting why it could not be used.
    pub fn try_load(path: &Path, frame_id: &str) -> Result<CalibrationRecord, AcquisitionError> {
        let config_failure = |reason: String| AcquisitionError::Configuration {
            source_name: path.display().to_string(),
            reason,
        };
        let raw = std::fs::read_to_string(path).map_err(|e| config_failure(e.to_string()))?;
        Self::parse(&raw, frame_id).map_err(|e| config_failure(e.to_string()))
    }

    fn parse(raw: &str, frame_id: &str) -> Result<CalibrationRecord, serde_yaml::Error> {
        let file: CalibrationFile = serde_yaml::from_str(raw)?;
        Ok(CalibrationRecord {
            frame_id: frame_id.to_string(),
            height: file.image_height,
            width: file.image_width,
            distortion_model: file.distortion_model,
            distortion_coeffs: file.distortion_coefficients.data,
            intrinsic_matrix: fixed_or("camera_matrix", file.camera_matrix.data, [0.0; 9]),
            rectification_matrix: fixed_or(
                "rectification_matrix",
                file.rectification_matrix.data,
                IDENTITY_3X3,
            ),
            projection_matrix: fixed_or(
                "projection_matrix",
                file.projection_matrix.data,
                [0.0; 12],
            ),
        })
    }
}

/// Convert to a fixed-size matrix, substituting `default` on a length mismatch.
fn fixed_or<const N: usize>(name: &str, data: Vec<f64>, default: [f64; N]) -> [f64; N] {
    let len = data.len();
    data.try_into().unwrap_or_else(|_| {
        log::warn!(
            "{} has {} elements, expected {}; using default",
            name,
            len,
            N
        );
        default
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const FRAME_ID: &str = "camera_optical_frame";

    const VALID_YAML: &str = r#"
image_width: 640
image_height: 480
camera_name: front
distortion_model: rational_polynomial
distortion_coefficients:
  rows: 1
  cols: 8
  data: [-0.1, 0.02, 0.0, 0.0, 0.001, 0.0, 0.0, 0.0]
camera_matrix:
  rows: 3
  cols: 3
  data: [500.0, 0, 320.0, 0, 500.0, 240.0, 0, 0, 1]
rectification_matrix:
  rows: 3
  cols: 3
  data: [1, 0, 0, 0, 1, 0, 0, 0, 1]
projection_matrix:
  rows: 3
  cols: 4
  data: [500.0, 0, 320.0, 0, 0, 500.0, 240.0, 0, 0, 0, 1, 0]
"#;

    fn write_calibration(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp calibration");
        file.write_all(contents.as_bytes()).expect("write calibration");
        file
    }

    fn assert_is_fallback(record: &CalibrationRecord) {
        assert_eq!(record.height, 1080);
        assert_eq!(record.width, 1920);
        assert_eq!(record.distortion_model, "plumb_bob");
        assert_eq!(record.distortion_coeffs, vec![0.0; 5]);
        assert_eq!(record.intrinsic_matrix, FALLBACK_K);
        assert_eq!(record.rectification_matrix, IDENTITY_3X3);
        assert_eq!(record.projection_matrix, FALLBACK_P);
    }

    #[test]
    fn loads_valid_calibration() {
        let file = write_calibration(VALID_YAML);
        let record = CalibrationProvider::try_load(file.path(), FRAME_ID).expect("load");

        assert_eq!(record.frame_id, FRAME_ID);
        assert_eq!(record.width, 640);
        assert_eq!(record.height, 480);
        assert_eq!(record.distortion_model, "rational_polynomial");
        assert_eq!(record.distortion_coeffs.len(), 8);
        assert_eq!(record.intrinsic_matrix[0], 500.0);
        assert_eq!(record.intrinsic_matrix[5], 240.0);
        assert_eq!(record.projection_matrix[10], 1.0);
    }

    #[test]
    fn missing_file_falls_back_to_default() {
        let dir = tempfile::tempdir().expect("temp dir");
        let record = CalibrationProvider::load(&dir.path().join("absent.yml"), FRAME_ID);
        assert_is_fallback(&record);
        assert_eq!(record.frame_id, FRAME_ID);
    }

    #[test]
    fn malformed_sources_fall_back_to_default() {
        let cases = vec![
            String::new(),
            "not: [valid yaml".to_string(),
            "image_width: 640\nimage_height: 480\n".to_string(),
            VALID_YAML.replace("image_height: 480", "image_height: tall"),
            VALID_YAML.replace("image_width: 640", "image_width: -640"),
            VALID_YAML.replace("distortion_model: rational_polynomial", "distortion_model: [1]"),
        ];
        for contents in &cases {
            let file = write_calibration(contents);
            assert!(CalibrationProvider::try_load(file.path(), FRAME_ID).is_err());
            assert_is_fallback(&CalibrationProvider::load(file.path(), FRAME_ID));
        }
    }

    #[test]
    fn wrong_length_matrices_are_replaced_per_field() {
        let yaml = VALID_YAML
            .replace(
                "data: [500.0, 0, 320.0, 0, 500.0, 240.0, 0, 0, 1]",
                "data: [500.0, 0, 320.0]",
            )
            .replace(
                "data: [500.0, 0, 320.0, 0, 0, 500.0, 240.0, 0, 0, 0, 1, 0]",
                "data: [500.0, 0, 320.0, 0, 0, 500.0, 240.0, 0, 0, 0, 1, 0, 7]",
            );
        let file = write_calibration(&yaml);
        let record = CalibrationProvider::load(file.path(), FRAME_ID);

        assert_eq!(record.intrinsic_matrix, [0.0; 9]);
        assert_eq!(record.projection_matrix, [0.0; 12]);
        // Correctly sized fields come from the file untouched.
        assert_eq!(record.rectification_matrix, IDENTITY_3X3);
        assert_eq!(record.width, 640);
        assert_eq!(record.distortion_model, "rational_polynomial");
        assert_eq!(record.distortion_coeffs.len(), 8);
    }

    #[test]
    fn short_rectification_becomes_identity() {
        let yaml = VALID_YAML.replace(
            "data: [1, 0, 0, 0, 1, 0, 0, 0, 1]",
            "data: [2, 0, 0, 0, 2]",
        );
        let file = write_calibration(&yaml);
        let record = CalibrationProvider::load(file.path(), FRAME_ID);

        assert_eq!(record.rectification_matrix, IDENTITY_3X3);
        assert_eq!(record.intrinsic_matrix[0], 500.0);
    }

    #[test]
    fn record_serializes_with_short_matrix_names() {
        let record = CalibrationRecord::fallback(FRAME_ID);
        let json = serde_json::to_value(&record).expect("serialize");
        assert_eq!(json["distortion_model"], "plumb_bob");
        assert_eq!(json["K"].as_array().map(|k| k.len()), Some(9));
        assert_eq!(json["R"].as_array().map(|r| r.len()), Some(9));
        assert_eq!(json["P"].as_array().map(|p| p.len()), Some(12));
        assert_eq!(json["D"].as_array().map(|d| d.len()), Some(5));
    }
}
