//! Binds a marker-group input to a numeric property

use crate::detector::DetectionResult;
use crate::error::{Result, TangibleError};
use crate::observable::Observable;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub fn new(min: f64, max: f64) -> Result<Self> {
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(TangibleError::Config(format!(
                "Invalid range [{}, {}]",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    pub fn length(&self) -> f64 {
        self.max - self.min
    }
}

/// Drives a property from one input of a named marker group
pub struct SliderGroupBinding {
    input_group: String,
    input_name: String,
    range: ValueRange,
    property: Observable<f64>,
}

impl SliderGroupBinding {
    pub fn new(
        input_group: impl Into<String>,
        input_name: impl Into<String>,
        range: ValueRange,
        property: Observable<f64>,
    ) -> Self {
        Self {
            input_group: input_group.into(),
            input_name: input_name.into(),
            range,
            property,
        }
    }

    /// Map the normalized marker value into the property's range. Leaves the
    /// property untouched when the group is missing or its anchor is not
    /// visible. Returns the value written, if any.
    pub fn update(&self, result: Option<&DetectionResult>) -> Option<f64> {
        let group = result?.as_markers()?.group(&self.input_group)?;
        if !group.anchor_present {
            return None;
        }

        let input = group.input(&self.input_name)?;
        let value = input * self.range.length() + self.range.min;
        self.property.set(value);
        Some(value)
    }

    pub fn value(&self) -> f64 {
        self.property.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{MarkerGroup, MarkerInputValue, MarkerResults};

    fn markers(anchor_present: bool, value: f64) -> DetectionResult {
        DetectionResult::Markers(MarkerResults {
            groups: vec![MarkerGroup {
                name: "ratio".to_string(),
                anchor_present,
                inputs: vec![MarkerInputValue {
                    name: "left".to_string(),
                    value,
                }],
            }],
        })
    }

    #[test]
    fn test_maps_into_range() {
        let property = Observable::new(0.0);
        let binding = SliderGroupBinding::new(
            "ratio",
            "left",
            ValueRange::new(10.0, 20.0).unwrap(),
            property.clone(),
        );

        assert_eq!(binding.update(Some(&markers(true, 0.5))), Some(15.0));
        assert_eq!(property.get(), 15.0);
    }

    #[test]
    fn test_ignores_missing_anchor() {
        let property = Observable::new(3.0);
        let binding = SliderGroupBinding::new(
            "ratio",
            "left",
            ValueRange::new(0.0, 1.0).unwrap(),
            property.clone(),
        );

        assert_eq!(binding.update(Some(&markers(false, 0.9))), None);
        assert_eq!(binding.update(None), None);
        assert_eq!(binding.value(), 3.0);
    }

    #[test]
    fn test_invalid_range() {
        assert!(ValueRange::new(2.0, 1.0).is_err());
        assert!(ValueRange::new(f64::NAN, 1.0).is_err());
    }
}
