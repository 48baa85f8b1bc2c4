use serde::{Deserialize, Serialize};

use crate::{CaptureRequest, ErrorCode, LevelerError, Result};

/// Capabilities of the capture device handed to the leveler at activation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeviceCapabilities {
    pub max_width: u32,
    pub max_height: u32,
    pub max_frame_rate: f64,
    pub supports_audio: bool,
    pub supports_hdr: bool,
    pub has_flash: bool,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            max_width: 3840,
            max_height: 2160,
            max_frame_rate: 60.0,
            supports_audio: true,
            supports_hdr: false,
            has_flash: false,
        }
    }
}

impl DeviceCapabilities {
    /// Checks a capture request against the device. Resolutions are compared
    /// long side to long side so portrait requests are accepted too.
    pub fn check_request(&self, request: &CaptureRequest) -> Result<()> {
        let (request_long, request_short) = long_short(request.width, request.height);
        let (max_long, max_short) = long_short(self.max_width, self.max_height);

        if request_long > max_long || request_short > max_short {
            return Err(LevelerError::new(
                ErrorCode::ResolutionOrFrameRateUnsupported,
                format!(
                    "{}x{} exceeds device maximum {}x{}",
                    request.width, request.height, self.max_width, self.max_height
                ),
            ));
        }

        if request.frame_rate > self.max_frame_rate {
            return Err(LevelerError::new(
                ErrorCode::ResolutionOrFrameRateUnsupported,
                format!(
                    "{} fps exceeds device maximum {} fps",
                    request.frame_rate, self.max_frame_rate
                ),
            ));
        }

        Ok(())
    }
}

fn long_short(a: u32, b: u32) -> (u32, u32) {
    if a >= b {
        (a, b)
    } else {
        (b, a)
    }
}
