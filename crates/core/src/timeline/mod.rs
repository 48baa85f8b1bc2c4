//! Host event scripts: a recorded or synthetic sequence of sensor samples,
//! frame ticks and host calls that can be replayed against a [`Leveler`].

use serde::{Deserialize, Serialize};

use crate::{
    emitter::{FocusPoint, LevelerEvent},
    orientation::MotionSample,
    record::RecordingState,
    CaptureMode, CropMode, ErrorCode, FlexSpeed, Leveler, LevelerError, LockedOrientation,
    Result, StillImageOrientation,
};

/// One entry of a host script, tagged by `kind` in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HostEvent {
    Sample { timestamp: f64, gravity: [f64; 3] },
    Frame { timestamp: f64 },
    StartRecording,
    StopRecording,
    CropMode { mode: CropMode },
    FlexSpeed { speed: FlexSpeed },
    LockedOrientation { orientation: LockedOrientation },
    CaptureMode { mode: CaptureMode },
    StillImageOrientation { orientation: StillImageOrientation },
    FlashAvailable { available: bool },
    FocusPress { x: f64, y: f64, timestamp: f64 },
    FocusRelease,
    FocusAdjusting { adjusting: bool },
    SubjectAreaChanged,
}

/// Transform produced for one frame event of a replay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub timestamp: f64,
    /// Device tilt the tracker held for this frame, radians.
    pub tilt: f64,
    pub scale: f64,
    pub angle: f64,
    pub recording: RecordingState,
}

#[derive(Debug, Default, Clone)]
pub struct ReplayOutcome {
    pub frames: Vec<FrameRecord>,
    pub events: Vec<LevelerEvent>,
}

/// Parses a JSON-lines script. Blank lines and lines starting with `#` are
/// skipped.
pub fn parse_script(input: &str) -> Result<Vec<HostEvent>> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !trimmed.starts_with('#')
        })
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|err| {
                LevelerError::invalid_settings(format!("script line {}: {err}", index + 1))
            })
        })
        .collect()
}

/// Feeds every event into `leveler` in order.
///
/// Mode errors returned by host calls (for example starting a recording in
/// photo mode) are recorded as faults and the replay continues. A script
/// without frame events has nothing to compose and fails.
pub fn replay(leveler: &Leveler, events: &[HostEvent]) -> Result<ReplayOutcome> {
    if !events
        .iter()
        .any(|event| matches!(event, HostEvent::Frame { .. }))
    {
        return Err(LevelerError::new(
            ErrorCode::VideoNotFoundDuringComposition,
            "script contains no frame events",
        ));
    }

    let subscription = leveler.subscribe()?;
    let mut outcome = ReplayOutcome::default();

    for event in events {
        let result = match event {
            HostEvent::Sample {
                timestamp,
                gravity,
            } => leveler.push_sample(MotionSample::new(*timestamp, *gravity)),
            HostEvent::Frame { timestamp } => {
                let params = leveler.next_frame(*timestamp)?;
                outcome.frames.push(FrameRecord {
                    timestamp: *timestamp,
                    tilt: leveler.tilt()?,
                    scale: params.scale,
                    angle: params.angle,
                    recording: leveler.recording_state()?,
                });
                Ok(())
            }
            HostEvent::StartRecording => leveler.start_recording().map(|_| ()),
            HostEvent::StopRecording => leveler.stop_recording().map(|_| ()),
            HostEvent::CropMode { mode } => leveler.set_crop_mode(*mode),
            HostEvent::FlexSpeed { speed } => leveler.set_flex_speed(*speed),
            HostEvent::LockedOrientation { orientation } => {
                leveler.set_locked_orientation(*orientation)
            }
            HostEvent::CaptureMode { mode } => leveler.set_capture_mode(*mode),
            HostEvent::StillImageOrientation { orientation } => {
                leveler.set_still_image_orientation(*orientation)
            }
            HostEvent::FlashAvailable { available } => leveler.set_flash_available(*available),
            HostEvent::FocusPress { x, y, timestamp } => {
                leveler.focus_press(FocusPoint::new(*x, *y), *timestamp)
            }
            HostEvent::FocusRelease => leveler.focus_release(),
            HostEvent::FocusAdjusting { adjusting } => leveler.focus_adjusting(*adjusting),
            HostEvent::SubjectAreaChanged => leveler.subject_area_changed(),
        };

        match result {
            Ok(()) => {}
            Err(err) if err.code.is_fatal() => return Err(err),
            Err(err) => {
                tracing::warn!(%err, ?event, "host call rejected during replay");
                outcome.events.push(LevelerEvent::Fault(err));
            }
        }
        outcome.events.extend(subscription.try_iter());
    }

    Ok(outcome)
}

/// Synthetic script of a device turning from `from_degrees` to `to_degrees`
/// over `frames` frames, with one sample before each frame.
pub fn sweep_script(from_degrees: f64, to_degrees: f64, frames: usize, fps: f64) -> Vec<HostEvent> {
    let mut events = Vec::with_capacity(frames * 2);
    let steps = frames.saturating_sub(1).max(1) as f64;
    for index in 0..frames {
        let timestamp = index as f64 / fps;
        let degrees = from_degrees + (to_degrees - from_degrees) * index as f64 / steps;
        let sample = MotionSample::from_tilt(timestamp, degrees.to_radians());
        events.push(HostEvent::Sample {
            timestamp,
            gravity: sample.gravity,
        });
        events.push(HostEvent::Frame { timestamp });
    }
    events
}
