use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{LevelerError, Result};

/// Default cut-off frequency of the scale low-pass filter.
pub const DEFAULT_FILTER_FREQUENCY: f64 = 1.8;
/// Filter frequency used by [`FlexSpeed::Responsive`] unless the configured
/// frequency is already higher.
pub const RESPONSIVE_FILTER_FREQUENCY: f64 = 6.0;
pub const DEFAULT_HYSTERESIS_DEGREES: f64 = 5.0;
pub const DEFAULT_FOCUS_LOCK_PRESS_SECS: f64 = 0.5;

/// The category of media the camera captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    #[default]
    Video,
    Photo,
}

/// Frame orientation of still images in photo mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StillImageOrientation {
    /// Follow the device between horizontal and vertical.
    #[default]
    Auto,
    Horizontal,
    Vertical,
}

/// How the crop region compensates for device tilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropMode {
    /// Rotate and scale continuously.
    #[default]
    Flex,
    /// Rotate with a constant scale.
    Rotate,
    /// Leveling disabled; rotate only in quarter turns.
    Locked,
}

/// Scale response under [`CropMode::Flex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlexSpeed {
    #[default]
    Smooth,
    Responsive,
}

/// Expected physical orientation under [`CropMode::Locked`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockedOrientation {
    #[default]
    Auto,
    /// Device must be held vertically.
    Vertical,
    AlwaysVertical,
    /// Device must be held horizontally.
    Horizontal,
    AlwaysHorizontal,
}

/// Capture parameters requested by the host at activation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CaptureRequest {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub record_audio: bool,
}

impl Default for CaptureRequest {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            frame_rate: 30.0,
            record_audio: true,
        }
    }
}

/// Activation configuration of the leveler. Every field may be replaced
/// live between frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LevelerConfig {
    /// Scale low-pass cut-off in Hz. Smaller values give smoother zoom.
    pub filter_frequency: f64,
    pub crop_mode: CropMode,
    pub flex_speed: FlexSpeed,
    pub locked_orientation: LockedOrientation,
    pub capture_mode: CaptureMode,
    pub still_image_orientation: StillImageOrientation,
    /// Extra angle past a quadrant boundary required before a locked
    /// orientation switches.
    pub hysteresis_degrees: f64,
    /// Output frame aspect ratio (width / height).
    pub output_aspect_ratio: f64,
    /// Constant scale used by [`CropMode::Rotate`]. Defaults to the flex
    /// scale at 45 degrees for the configured aspect ratio.
    pub rotate_scale: Option<f64>,
    pub focus_lock_press_secs: f64,
    pub capture: CaptureRequest,
}

impl Default for LevelerConfig {
    fn default() -> Self {
        Self {
            filter_frequency: DEFAULT_FILTER_FREQUENCY,
            crop_mode: CropMode::default(),
            flex_speed: FlexSpeed::default(),
            locked_orientation: LockedOrientation::default(),
            capture_mode: CaptureMode::default(),
            still_image_orientation: StillImageOrientation::default(),
            hysteresis_degrees: DEFAULT_HYSTERESIS_DEGREES,
            output_aspect_ratio: 16.0 / 9.0,
            rotate_scale: None,
            focus_lock_press_secs: DEFAULT_FOCUS_LOCK_PRESS_SECS,
            capture: CaptureRequest::default(),
        }
    }
}

impl LevelerConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.filter_frequency.is_finite() && self.filter_frequency > 0.0) {
            return Err(LevelerError::invalid_settings(format!(
                "filter frequency must be a positive number, got {}",
                self.filter_frequency
            )));
        }
        if !(self.hysteresis_degrees.is_finite()
            && (0.0..45.0).contains(&self.hysteresis_degrees))
        {
            return Err(LevelerError::invalid_settings(format!(
                "hysteresis must lie in [0, 45) degrees, got {}",
                self.hysteresis_degrees
            )));
        }
        if !(self.output_aspect_ratio.is_finite() && self.output_aspect_ratio > 0.0) {
            return Err(LevelerError::invalid_settings(
                "output aspect ratio must be positive",
            ));
        }
        if let Some(scale) = self.rotate_scale {
            if !(scale.is_finite() && scale > 0.0) {
                return Err(LevelerError::invalid_settings(
                    "rotate scale must be positive",
                ));
            }
        }
        if !(self.focus_lock_press_secs.is_finite() && self.focus_lock_press_secs >= 0.0) {
            return Err(LevelerError::invalid_settings(
                "focus lock press duration must not be negative",
            ));
        }
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(LevelerError::invalid_settings(
                "capture resolution must be non-zero",
            ));
        }
        if !(self.capture.frame_rate.is_finite() && self.capture.frame_rate > 0.0) {
            return Err(LevelerError::invalid_settings(
                "capture frame rate must be positive",
            ));
        }
        Ok(())
    }

    /// Cut-off frequency the scale filter should run at right now.
    pub fn effective_filter_frequency(&self) -> f64 {
        match self.flex_speed {
            FlexSpeed::Smooth => self.filter_frequency,
            FlexSpeed::Responsive => self.filter_frequency.max(RESPONSIVE_FILTER_FREQUENCY),
        }
    }

    /// Locked orientation after applying the still image constraint of
    /// photo mode.
    pub fn effective_locked_orientation(&self) -> LockedOrientation {
        match (self.capture_mode, self.still_image_orientation) {
            (CaptureMode::Photo, StillImageOrientation::Horizontal) => {
                LockedOrientation::AlwaysHorizontal
            }
            (CaptureMode::Photo, StillImageOrientation::Vertical) => {
                LockedOrientation::AlwaysVertical
            }
            _ => self.locked_orientation,
        }
    }

    pub fn hysteresis_radians(&self) -> f64 {
        self.hysteresis_degrees.to_radians()
    }

    /// Nominal interval between frames, used when frame timestamps are
    /// missing or do not advance.
    pub fn nominal_frame_interval(&self) -> f64 {
        1.0 / self.capture.frame_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCode;

    #[test]
    fn defaults_are_valid() {
        let config = LevelerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.filter_frequency, 1.8);
        assert_eq!(config.crop_mode, CropMode::Flex);
    }

    #[test]
    fn rejects_non_positive_frequency() {
        for frequency in [0.0, -1.0, f64::NAN] {
            let config = LevelerConfig {
                filter_frequency: frequency,
                ..Default::default()
            };
            let err = config.validate().unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidSettings);
        }
    }

    #[test]
    fn parses_camel_case_json_with_defaults() {
        let config = LevelerConfig::from_json_str(
            r#"{
                "filterFrequency": 3.0,
                "cropMode": "locked",
                "lockedOrientation": "always_vertical"
            }"#,
        )
        .unwrap();

        assert_eq!(config.filter_frequency, 3.0);
        assert_eq!(config.crop_mode, CropMode::Locked);
        assert_eq!(config.locked_orientation, LockedOrientation::AlwaysVertical);
        assert_eq!(config.hysteresis_degrees, DEFAULT_HYSTERESIS_DEGREES);
    }

    #[test]
    fn json_with_bad_frequency_is_invalid_settings() {
        let err = LevelerConfig::from_json_str(r#"{ "filterFrequency": -2 }"#).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidSettings);
    }

    #[test]
    fn responsive_speed_raises_frequency() {
        let mut config = LevelerConfig::default();
        assert_eq!(config.effective_filter_frequency(), 1.8);
        config.flex_speed = FlexSpeed::Responsive;
        assert_eq!(config.effective_filter_frequency(), RESPONSIVE_FILTER_FREQUENCY);
        config.filter_frequency = 10.0;
        assert_eq!(config.effective_filter_frequency(), 10.0);
    }

    #[test]
    fn still_orientation_only_applies_in_photo_mode() {
        let mut config = LevelerConfig {
            still_image_orientation: StillImageOrientation::Horizontal,
            ..Default::default()
        };
        assert_eq!(config.effective_locked_orientation(), LockedOrientation::Auto);
        config.capture_mode = CaptureMode::Photo;
        assert_eq!(
            config.effective_locked_orientation(),
            LockedOrientation::AlwaysHorizontal
        );
    }
}
