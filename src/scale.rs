use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::error::{EngineError, EngineResult};
use crate::gpa::round_2_decimals;

/// Percentages are compared at two-decimal resolution, so adjacent bands meet
/// at `prev.max + STEP`.
const STEP: f64 = 0.01;
const EPS: f64 = 1e-6;
pub const MAX_GRADE_POINT: f64 = 4.0;

#[derive(Debug, Error)]
pub enum ScaleError {
    #[error("grading scale has no bands")]
    Empty,
    #[error("band {label} has min {min} greater than max {max}")]
    Inverted { label: String, min: f64, max: f64 },
    #[error("band {label} grade point {point} is outside 0..=4")]
    PointOutOfRange { label: String, point: f64 },
    #[error("grading scale must start at 0, starts at {0}")]
    BadStart(f64),
    #[error("grading scale must end at 100, ends at {0}")]
    BadEnd(f64),
    #[error("gap between {prev} (ends {prev_max}) and {next} (starts {next_min})")]
    Gap {
        prev: String,
        prev_max: f64,
        next: String,
        next_min: f64,
    },
    #[error("{prev} (ends {prev_max}) overlaps {next} (starts {next_min})")]
    Overlap {
        prev: String,
        prev_max: f64,
        next: String,
        next_min: f64,
    },
    #[error("cannot read grading scale file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse grading scale file: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeBand {
    pub label: String,
    #[serde(rename = "min")]
    pub min_percentage: f64,
    #[serde(rename = "max")]
    pub max_percentage: f64,
    #[serde(rename = "point")]
    pub grade_point: f64,
}

impl GradeBand {
    fn new(label: &str, min: f64, max: f64, point: f64) -> Self {
        Self {
            label: label.to_string(),
            min_percentage: min,
            max_percentage: max,
            grade_point: point,
        }
    }

    fn contains(&self, percentage: f64) -> bool {
        percentage >= self.min_percentage - EPS && percentage <= self.max_percentage + EPS
    }
}

#[derive(Debug, Deserialize)]
struct ScaleFile {
    bands: Vec<GradeBand>,
}

/// Validated, immutable percentage → grade point table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradingScale {
    bands: Vec<GradeBand>,
}

impl Default for GradingScale {
    fn default() -> Self {
        let bands = vec![
            GradeBand::new("A", 85.0, 100.0, 4.0),
            GradeBand::new("A-", 80.0, 84.99, 3.7),
            GradeBand::new("B+", 75.0, 79.99, 3.3),
            GradeBand::new("B", 70.0, 74.99, 3.0),
            GradeBand::new("B-", 68.0, 69.99, 2.7),
            GradeBand::new("C+", 64.0, 67.99, 2.3),
            GradeBand::new("C", 61.0, 63.99, 2.0),
            GradeBand::new("C-", 58.0, 60.99, 1.7),
            GradeBand::new("D+", 54.0, 57.99, 1.3),
            GradeBand::new("D", 50.0, 53.99, 1.0),
            GradeBand::new("F", 0.0, 49.99, 0.0),
        ];
        let mut scale = Self { bands };
        scale.bands.sort_by(|a, b| a.min_percentage.total_cmp(&b.min_percentage));
        scale
    }
}

impl GradingScale {
    /// Sorts bands by lower bound and checks they tile 0..=100 with no gaps or overlaps.
    pub fn new(mut bands: Vec<GradeBand>) -> Result<Self, ScaleError> {
        if bands.is_empty() {
            return Err(ScaleError::Empty);
        }
        for b in &bands {
            if !b.min_percentage.is_finite()
                || !b.max_percentage.is_finite()
                || b.min_percentage > b.max_percentage
            {
                return Err(ScaleError::Inverted {
                    label: b.label.clone(),
                    min: b.min_percentage,
                    max: b.max_percentage,
                });
            }
            if !(0.0..=MAX_GRADE_POINT).contains(&b.grade_point) {
                return Err(ScaleError::PointOutOfRange {
                    label: b.label.clone(),
                    point: b.grade_point,
                });
            }
        }
        bands.sort_by(|a, b| a.min_percentage.total_cmp(&b.min_percentage));

        let first = &bands[0];
        if first.min_percentage.abs() > EPS {
            return Err(ScaleError::BadStart(first.min_percentage));
        }
        let last = &bands[bands.len() - 1];
        if (last.max_percentage - 100.0).abs() > EPS {
            return Err(ScaleError::BadEnd(last.max_percentage));
        }

        for pair in bands.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            let expected = prev.max_percentage + STEP;
            if next.min_percentage > expected + EPS {
                return Err(ScaleError::Gap {
                    prev: prev.label.clone(),
                    prev_max: prev.max_percentage,
                    next: next.label.clone(),
                    next_min: next.min_percentage,
                });
            }
            if next.min_percentage < expected - EPS {
                return Err(ScaleError::Overlap {
                    prev: prev.label.clone(),
                    prev_max: prev.max_percentage,
                    next: next.label.clone(),
                    next_min: next.min_percentage,
                });
            }
        }

        Ok(Self { bands })
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ScaleError> {
        let file: ScaleFile = toml::from_str(text)?;
        Self::new(file.bands)
    }

    pub fn load(path: &Path) -> Result<Self, ScaleError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Bands in ascending percentage order.
    pub fn bands(&self) -> &[GradeBand] {
        &self.bands
    }

    pub fn band_for(&self, percentage: f64) -> EngineResult<&GradeBand> {
        if !percentage.is_finite() || !(0.0..=100.0).contains(&percentage) {
            return Err(EngineError::OutOfRange(percentage));
        }
        let p = round_2_decimals(percentage);
        self.bands
            .iter()
            .rev()
            .find(|b| b.contains(p))
            .ok_or_else(|| {
                EngineError::InternalConsistency(format!("no grade band covers {p}"))
            })
    }

    pub fn grade_point_for(&self, percentage: f64) -> EngineResult<f64> {
        self.band_for(percentage).map(|b| b.grade_point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_scale_passes_its_own_validation() {
        let scale = GradingScale::default();
        let rebuilt = GradingScale::new(scale.bands().to_vec()).expect("valid default");
        assert_eq!(rebuilt, scale);
    }

    #[test]
    fn band_edges_map_to_the_right_point() {
        let scale = GradingScale::default();
        assert_eq!(scale.grade_point_for(100.0).unwrap(), 4.0);
        assert_eq!(scale.grade_point_for(85.0).unwrap(), 4.0);
        assert_eq!(scale.grade_point_for(84.99).unwrap(), 3.7);
        assert_eq!(scale.grade_point_for(80.0).unwrap(), 3.7);
        assert_eq!(scale.grade_point_for(70.0).unwrap(), 3.0);
        assert_eq!(scale.grade_point_for(69.99).unwrap(), 2.7);
        assert_eq!(scale.grade_point_for(50.0).unwrap(), 1.0);
        assert_eq!(scale.grade_point_for(49.99).unwrap(), 0.0);
        assert_eq!(scale.grade_point_for(0.0).unwrap(), 0.0);
    }

    #[test]
    fn unrounded_percentages_do_not_fall_between_bands() {
        let scale = GradingScale::default();
        // 84.996 rounds to 85.00
        assert_eq!(scale.grade_point_for(84.996).unwrap(), 4.0);
        assert_eq!(scale.grade_point_for(84.994).unwrap(), 3.7);
        assert_eq!(scale.band_for(2.0 / 3.0 * 100.0).unwrap().label, "C+");
    }

    #[test]
    fn out_of_range_percentages_are_rejected() {
        let scale = GradingScale::default();
        assert!(matches!(
            scale.grade_point_for(-0.5),
            Err(EngineError::OutOfRange(_))
        ));
        assert!(matches!(
            scale.grade_point_for(100.01),
            Err(EngineError::OutOfRange(_))
        ));
        assert!(matches!(
            scale.grade_point_for(f64::NAN),
            Err(EngineError::OutOfRange(_))
        ));
    }

    #[test]
    fn gaps_and_overlaps_fail_at_load() {
        let gap = vec![
            GradeBand::new("P", 50.0, 100.0, 4.0),
            GradeBand::new("F", 0.0, 48.99, 0.0),
        ];
        assert!(matches!(GradingScale::new(gap), Err(ScaleError::Gap { .. })));

        let overlap = vec![
            GradeBand::new("P", 50.0, 100.0, 4.0),
            GradeBand::new("F", 0.0, 50.0, 0.0),
        ];
        assert!(matches!(
            GradingScale::new(overlap),
            Err(ScaleError::Overlap { .. })
        ));

        let short = vec![GradeBand::new("P", 0.0, 99.0, 4.0)];
        assert!(matches!(GradingScale::new(short), Err(ScaleError::BadEnd(_))));

        let late = vec![GradeBand::new("P", 1.0, 100.0, 4.0)];
        assert!(matches!(GradingScale::new(late), Err(ScaleError::BadStart(_))));

        assert!(matches!(GradingScale::new(Vec::new()), Err(ScaleError::Empty)));
    }

    #[test]
    fn grade_points_above_four_are_rejected() {
        let bands = vec![GradeBand::new("A", 0.0, 100.0, 5.0)];
        assert!(matches!(
            GradingScale::new(bands),
            Err(ScaleError::PointOutOfRange { .. })
        ));
    }

    #[test]
    fn loads_pass_fail_scale_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"
[[bands]]
label = "F"
min = 0.0
max = 59.99
point = 0.0

[[bands]]
label = "P"
min = 60.0
max = 100.0
point = 4.0
"#
        )
        .expect("write scale");

        let scale = GradingScale::load(file.path()).expect("load scale");
        assert_eq!(scale.bands().len(), 2);
        assert_eq!(scale.grade_point_for(59.99).unwrap(), 0.0);
        assert_eq!(scale.grade_point_for(60.0).unwrap(), 4.0);
    }

    #[test]
    fn malformed_toml_is_a_scale_error() {
        let err = GradingScale::from_toml_str("bands = 3").unwrap_err();
        assert!(matches!(err, ScaleError::Toml(_)));
    }
}
