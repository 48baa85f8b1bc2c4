//! Core library of the Horizon leveler.
//!
//! Turns device motion into a per-frame scale/rotation that keeps captured
//! video and photos level with the horizon. Each module owns one stage of
//! the pipeline: orientation tracking, scale filtering, crop policies, the
//! recording state machine and the emitter that hands transforms and
//! notifications to the host. [`Leveler`] ties them together behind a
//! thread-safe handle.

pub mod config;
pub mod device;
pub mod emitter;
pub mod engine;
pub mod error;
pub mod filter;
pub mod orientation;
pub mod policy;
pub mod record;
pub mod timeline;

pub use config::{
    CaptureMode, CaptureRequest, CropMode, FlexSpeed, LevelerConfig, LockedOrientation,
    StillImageOrientation,
};
pub use device::DeviceCapabilities;
pub use emitter::{FocusPoint, LevelerEvent, Notification};
pub use engine::Leveler;
pub use error::{ErrorCode, LevelerError, Result, ERROR_DOMAIN};
pub use filter::ScaleFilter;
pub use orientation::{MotionSample, OrientationTracker, SensorFeed};
pub use policy::{CropPolicy, TransformParams};
pub use record::{LevelingStateMachine, RecordingState, RecordingTransition};
pub use timeline::{FrameRecord, HostEvent, ReplayOutcome};
