use serde::{Deserialize, Serialize};

/// Identifier of the error domain every [`LevelerError`] belongs to.
pub const ERROR_DOMAIN: &str = "HorizonLevelerErrorDomain";

/// Result alias that carries the custom [`LevelerError`] type.
pub type Result<T> = std::result::Result<T, LevelerError>;

/// Closed set of failure kinds surfaced to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    #[error("unknown error")]
    Unknown,
    /// Requested capture parameters exceed what the device can deliver.
    #[error("resolution or frame rate not supported by the device")]
    ResolutionOrFrameRateUnsupported,
    /// A focus gesture landed outside the tappable region.
    #[error("focus point outside the tappable region")]
    FocusOutOfBounds,
    #[error("audio recording is not available")]
    AudioRecordingUnavailable,
    #[error("video stream not found during composition")]
    VideoNotFoundDuringComposition,
    #[error("a photo capture is already pending")]
    PhotoCaptureBusy,
    #[error("photo mode is not enabled")]
    PhotoModeNotEnabled,
    #[error("video mode is not enabled")]
    VideoModeNotEnabled,
    /// HDR is either missing on the device or the camera is not in photo mode.
    #[error("photo HDR is not supported")]
    PhotoHdrNotSupported,
    #[error("capture device was not provided")]
    CaptureDeviceNotProvided,
    /// Malformed configuration, e.g. a non-positive filter frequency.
    #[error("invalid settings")]
    InvalidSettings,
}

impl ErrorCode {
    /// Stable numeric value of the code within [`ERROR_DOMAIN`].
    pub fn raw(self) -> i64 {
        match self {
            Self::Unknown => -1,
            Self::ResolutionOrFrameRateUnsupported => -3300,
            Self::FocusOutOfBounds => -3301,
            Self::AudioRecordingUnavailable => -3302,
            Self::VideoNotFoundDuringComposition => -3303,
            Self::PhotoCaptureBusy => -3304,
            Self::PhotoModeNotEnabled => -3305,
            Self::PhotoHdrNotSupported => -3306,
            Self::CaptureDeviceNotProvided => -3307,
            Self::VideoModeNotEnabled => -3308,
            Self::InvalidSettings => -3309,
        }
    }

    /// Whether the failure ends the attempt that raised it (activation or a
    /// composition pass). Recoverable codes leave the engine running.
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            Self::Unknown
                | Self::ResolutionOrFrameRateUnsupported
                | Self::VideoNotFoundDuringComposition
                | Self::CaptureDeviceNotProvided
                | Self::InvalidSettings
        )
    }
}

/// Error type for the leveling engine: a `(code, message)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct LevelerError {
    pub code: ErrorCode,
    pub message: String,
}

impl LevelerError {
    pub fn new<T: Into<String>>(code: ErrorCode, message: T) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unknown<T: Into<String>>(message: T) -> Self {
        Self::new(ErrorCode::Unknown, message)
    }

    pub fn invalid_settings<T: Into<String>>(message: T) -> Self {
        Self::new(ErrorCode::InvalidSettings, message)
    }

    pub fn domain(&self) -> &'static str {
        ERROR_DOMAIN
    }
}

impl From<std::io::Error> for LevelerError {
    fn from(value: std::io::Error) -> Self {
        Self::unknown(value.to_string())
    }
}

impl From<serde_json::Error> for LevelerError {
    fn from(value: serde_json::Error) -> Self {
        Self::invalid_settings(value.to_string())
    }
}
