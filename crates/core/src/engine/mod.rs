use std::sync::{mpsc::Receiver, Arc, Mutex, MutexGuard};

use crate::{
    emitter::{FocusPoint, LevelerEvent, ParameterEmitter},
    orientation::{MotionSample, OrientationTracker, SensorFeed},
    policy::{CropPolicy, TransformParams},
    record::{LevelingStateMachine, RecordingState, RecordingTransition},
    CaptureMode, CropMode, DeviceCapabilities, ErrorCode, FlexSpeed, LevelerConfig, LevelerError,
    LockedOrientation, Result, StillImageOrientation,
};

/// Engine state guarded as one unit so a frame never observes a half-applied
/// configuration or a recording transition in flight.
#[derive(Debug)]
struct LevelerCore {
    config: LevelerConfig,
    device: DeviceCapabilities,
    tracker: OrientationTracker,
    policy: CropPolicy,
    recording: LevelingStateMachine,
    emitter: ParameterEmitter,
    last_frame_at: Option<f64>,
    photo_hdr: bool,
}

impl LevelerCore {
    fn compute_frame(&mut self, sample: Option<MotionSample>, timestamp: f64) -> TransformParams {
        if let Some(sample) = sample {
            self.tracker.update(&sample);
        }
        let dt = self.frame_interval(timestamp);
        // A locked freeze without a value takes the first locked frame, even
        // if the crop mode has moved on since the start.
        let mode = if self.recording.awaiting_freeze() {
            CropMode::Locked
        } else {
            self.config.crop_mode
        };
        let computed = self.policy.apply(mode, self.tracker.angle(), dt, &self.config);
        let gated = self.recording.gate(computed);
        let source = match self.recording.snapshot() {
            Some(snapshot) if snapshot.freezes() => CropMode::Locked,
            _ => mode,
        };
        self.emitter.emit_frame(source, gated)
    }

    fn frame_interval(&mut self, timestamp: f64) -> f64 {
        let nominal = self.config.nominal_frame_interval();
        let dt = match self.last_frame_at {
            Some(previous) if timestamp > previous => timestamp - previous,
            _ => nominal,
        };
        if timestamp.is_finite()
            && self.last_frame_at.map_or(true, |previous| timestamp > previous)
        {
            self.last_frame_at = Some(timestamp);
        }
        dt
    }

    fn apply_config(&mut self, config: LevelerConfig) -> Result<()> {
        if let Err(err) = config
            .validate()
            .and_then(|()| self.device.check_request(&config.capture))
        {
            tracing::warn!(%err, "rejected configuration update");
            return Err(err);
        }

        let previous = std::mem::replace(&mut self.config, config);
        if previous.crop_mode != self.config.crop_mode {
            tracing::debug!(
                from = ?previous.crop_mode,
                to = ?self.config.crop_mode,
                "crop mode changed"
            );
            self.policy.switch_mode(self.emitter.last_emitted());
        } else if previous.effective_locked_orientation()
            != self.config.effective_locked_orientation()
        {
            tracing::debug!(
                orientation = ?self.config.effective_locked_orientation(),
                "locked orientation changed"
            );
            self.policy.reset_locked();
        }
        if previous.capture_mode == CaptureMode::Photo
            && self.config.capture_mode != CaptureMode::Photo
        {
            self.photo_hdr = false;
        }
        Ok(())
    }
}

/// Horizon leveling engine handle.
///
/// Clones share the same engine. Sensor samples go through [`SensorFeed`] and
/// may be pushed from another thread; everything else is serialised on the
/// engine lock.
#[derive(Clone)]
pub struct Leveler {
    core: Arc<Mutex<LevelerCore>>,
    feed: SensorFeed,
}

impl Leveler {
    /// Validates the configuration against the device and starts the engine.
    pub fn activate(config: LevelerConfig, device: Option<DeviceCapabilities>) -> Result<Self> {
        let device = device.ok_or_else(|| {
            LevelerError::new(
                ErrorCode::CaptureDeviceNotProvided,
                "activation requires a capture device",
            )
        })?;
        config.validate()?;
        device.check_request(&config.capture)?;

        tracing::info!(
            crop_mode = ?config.crop_mode,
            filter_frequency = config.filter_frequency,
            width = config.capture.width,
            height = config.capture.height,
            "leveler activated"
        );

        let core = LevelerCore {
            emitter: ParameterEmitter::new(device.has_flash),
            config,
            device,
            tracker: OrientationTracker::new(),
            policy: CropPolicy::new(),
            recording: LevelingStateMachine::new(),
            last_frame_at: None,
            photo_hdr: false,
        };

        Ok(Self {
            core: Arc::new(Mutex::new(core)),
            feed: SensorFeed::new(),
        })
    }

    /// Returns a handle the sensor producer can push samples through.
    pub fn sensor_feed(&self) -> SensorFeed {
        self.feed.clone()
    }

    /// Hands a motion sample to the next frame.
    pub fn push_sample(&self, sample: MotionSample) -> Result<()> {
        self.feed.push(sample)
    }

    /// Registers an observer for notifications and faults. The channel
    /// disconnects when the engine is deactivated or dropped.
    pub fn subscribe(&self) -> Result<Receiver<LevelerEvent>> {
        let mut core = self.lock()?;
        Ok(core.emitter.subscribe())
    }

    /// Computes the transform for the frame at `timestamp` (seconds).
    pub fn next_frame(&self, timestamp: f64) -> Result<TransformParams> {
        let sample = self.feed.take()?;
        let mut core = self.lock()?;
        Ok(core.compute_frame(sample, timestamp))
    }

    /// Transform returned by the most recent frame, if any.
    pub fn last_emitted(&self) -> Result<Option<TransformParams>> {
        Ok(self.lock()?.emitter.last_emitted())
    }

    /// Current tilt as seen by the orientation tracker, before any crop
    /// policy is applied.
    pub fn tilt(&self) -> Result<f64> {
        Ok(self.lock()?.tracker.angle())
    }

    /// Snapshot of the active configuration.
    pub fn config(&self) -> Result<LevelerConfig> {
        Ok(self.lock()?.config.clone())
    }

    /// Replaces the whole configuration atomically with respect to frames.
    /// Invalid configurations, or capture requests the device cannot
    /// deliver, are rejected and the previous configuration is kept.
    pub fn update_config(&self, config: LevelerConfig) -> Result<()> {
        self.lock()?.apply_config(config)
    }

    /// Switches crop mode from the next frame on. An active locked freeze
    /// stays in place.
    pub fn set_crop_mode(&self, crop_mode: CropMode) -> Result<()> {
        self.modify(|config| config.crop_mode = crop_mode)
    }

    /// Selects the smoothing preset used under flex.
    pub fn set_flex_speed(&self, flex_speed: FlexSpeed) -> Result<()> {
        self.modify(|config| config.flex_speed = flex_speed)
    }

    /// Changes the quadrant family used under locked.
    pub fn set_locked_orientation(&self, orientation: LockedOrientation) -> Result<()> {
        self.modify(|config| config.locked_orientation = orientation)
    }

    /// Switches between video and photo capture. Leaving photo mode turns
    /// HDR off.
    pub fn set_capture_mode(&self, capture_mode: CaptureMode) -> Result<()> {
        self.modify(|config| config.capture_mode = capture_mode)
    }

    /// Orientation forced onto still captures in photo mode.
    pub fn set_still_image_orientation(&self, orientation: StillImageOrientation) -> Result<()> {
        self.modify(|config| config.still_image_orientation = orientation)
    }

    /// Cutoff of the scale filter in Hz; must be positive.
    pub fn set_filter_frequency(&self, frequency: f64) -> Result<()> {
        self.modify(|config| config.filter_frequency = frequency)
    }

    /// Starts recording a clip. Only valid in video capture mode.
    pub fn start_recording(&self) -> Result<RecordingTransition> {
        let mut core = self.lock()?;
        if core.config.capture_mode != CaptureMode::Video {
            return Err(LevelerError::new(
                ErrorCode::VideoModeNotEnabled,
                "recording requires video capture mode",
            ));
        }

        let crop_mode = core.config.crop_mode;
        let last = core.emitter.last_emitted_under(crop_mode);
        let transition = core.recording.start(crop_mode, last);
        match transition {
            RecordingTransition::Started => {
                tracing::info!(?crop_mode, frozen = ?last, "recording started");
                if core.config.capture.record_audio && !core.device.supports_audio {
                    core.emitter.fault(LevelerError::new(
                        ErrorCode::AudioRecordingUnavailable,
                        "device has no audio input, recording video only",
                    ));
                }
            }
            _ => tracing::debug!(?transition, "start request ignored"),
        }
        Ok(transition)
    }

    /// Ends the clip and releases any freeze.
    pub fn stop_recording(&self) -> Result<RecordingTransition> {
        let mut core = self.lock()?;
        let transition = core.recording.stop();
        match transition {
            RecordingTransition::Stopped => tracing::info!("recording stopped"),
            _ => tracing::debug!(?transition, "stop request ignored"),
        }
        Ok(transition)
    }

    /// Whether a clip is being recorded.
    pub fn recording_state(&self) -> Result<RecordingState> {
        Ok(self.lock()?.recording.state())
    }

    /// Transform to apply to a still capture: the most recent frame's, or
    /// a freshly computed one if no frame has been emitted yet.
    pub fn capture_photo_params(&self) -> Result<TransformParams> {
        let sample = self.feed.take()?;
        let mut core = self.lock()?;
        if core.config.capture_mode != CaptureMode::Photo {
            return Err(LevelerError::new(
                ErrorCode::PhotoModeNotEnabled,
                "still capture requires photo capture mode",
            ));
        }
        match (sample, core.emitter.last_emitted()) {
            (None, Some(last)) => Ok(last),
            (sample, _) => {
                let timestamp = sample.map_or(0.0, |sample| sample.timestamp);
                Ok(core.compute_frame(sample, timestamp))
            }
        }
    }

    /// Enables or disables HDR for still captures.
    pub fn set_photo_hdr(&self, enabled: bool) -> Result<()> {
        let mut core = self.lock()?;
        if enabled
            && (!core.device.supports_hdr || core.config.capture_mode != CaptureMode::Photo)
        {
            return Err(LevelerError::new(
                ErrorCode::PhotoHdrNotSupported,
                "HDR needs an HDR capable device in photo mode",
            ));
        }
        core.photo_hdr = enabled;
        Ok(())
    }

    /// Whether HDR is enabled for still captures.
    pub fn photo_hdr(&self) -> Result<bool> {
        Ok(self.lock()?.photo_hdr)
    }

    /// Reports the flash availability level; only changes notify.
    pub fn set_flash_available(&self, available: bool) -> Result<()> {
        self.lock()?.emitter.flash_available(available);
        Ok(())
    }

    /// Reports a press (initial or still held) of the focus gesture.
    pub fn focus_press(&self, point: FocusPoint, timestamp: f64) -> Result<()> {
        let mut core = self.lock()?;
        let lock_after = core.config.focus_lock_press_secs;
        core.emitter.focus_press(point, timestamp, lock_after);
        Ok(())
    }

    /// Ends the focus press.
    pub fn focus_release(&self) -> Result<()> {
        self.lock()?.emitter.focus_release();
        Ok(())
    }

    /// Reports whether the camera is still adjusting focus.
    pub fn focus_adjusting(&self, adjusting: bool) -> Result<()> {
        self.lock()?.emitter.focus_adjusting(adjusting);
        Ok(())
    }

    /// Reports a significant change of the subject area.
    pub fn subject_area_changed(&self) -> Result<()> {
        self.lock()?.emitter.subject_area_changed();
        Ok(())
    }

    /// Disconnects every subscriber. Frames can still be computed, but no
    /// further events are delivered to existing receivers.
    pub fn deactivate(&self) -> Result<()> {
        let mut core = self.lock()?;
        core.emitter.close();
        tracing::info!(
            frames = core.emitter.frames_emitted(),
            accepted_samples = core.tracker.accepted_samples(),
            rejected_samples = core.tracker.rejected_samples(),
            "leveler deactivated"
        );
        Ok(())
    }

    fn modify(&self, change: impl FnOnce(&mut LevelerConfig)) -> Result<()> {
        let mut core = self.lock()?;
        let mut config = core.config.clone();
        change(&mut config);
        core.apply_config(config)
    }

    fn lock(&self) -> Result<MutexGuard<'_, LevelerCore>> {
        self.core
            .lock()
            .map_err(|_| LevelerError::unknown("leveler state has been poisoned"))
    }
}

impl std::fmt::Debug for Leveler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Leveler").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activate(config: LevelerConfig) -> Leveler {
        Leveler::activate(config, Some(DeviceCapabilities::default())).unwrap()
    }

    #[test]
    fn activation_requires_a_device() {
        let err = Leveler::activate(LevelerConfig::default(), None).unwrap_err();
        assert_eq!(err.code, ErrorCode::CaptureDeviceNotProvided);
    }

    #[test]
    fn activation_rejects_invalid_frequency() {
        let config = LevelerConfig {
            filter_frequency: 0.0,
            ..Default::default()
        };
        let err = Leveler::activate(config, Some(DeviceCapabilities::default())).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidSettings);
    }

    #[test]
    fn live_update_with_bad_frequency_keeps_previous_config() {
        let leveler = activate(LevelerConfig::default());
        let err = leveler.set_filter_frequency(-1.0).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidSettings);
        assert_eq!(leveler.config().unwrap().filter_frequency, 1.8);
    }

    #[test]
    fn live_update_with_unsupported_capture_keeps_previous_config() {
        let leveler = activate(LevelerConfig::default());
        let mut config = leveler.config().unwrap();
        config.capture.width = 100_000;
        config.capture.height = 100_000;
        config.capture.frame_rate = 1000.0;

        let err = leveler.update_config(config).unwrap_err();
        assert_eq!(err.code, ErrorCode::ResolutionOrFrameRateUnsupported);
        assert_eq!(leveler.config().unwrap().capture, LevelerConfig::default().capture);
    }

    #[test]
    fn nan_frame_tick_does_not_stick_as_previous_frame() {
        let leveler = activate(LevelerConfig::default());
        let mut core = leveler.lock().unwrap();
        let nominal = core.config.nominal_frame_interval();

        assert_eq!(core.frame_interval(f64::NAN), nominal);
        assert_eq!(core.frame_interval(1.0), nominal);
        assert!((core.frame_interval(1.01) - 0.01).abs() < 1e-12);
        assert!((core.frame_interval(1.03) - 0.02).abs() < 1e-12);
    }

    #[test]
    fn sensor_gap_holds_last_angle() {
        let leveler = activate(LevelerConfig {
            crop_mode: CropMode::Rotate,
            ..Default::default()
        });
        leveler.push_sample(MotionSample::from_tilt(0.0, 0.3)).unwrap();
        let first = leveler.next_frame(0.0).unwrap();
        let second = leveler.next_frame(1.0 / 30.0).unwrap();
        assert!((first.angle - 0.3).abs() < 1e-9);
        assert_eq!(first, second);
    }

    #[test]
    fn recording_requires_video_mode() {
        let leveler = activate(LevelerConfig {
            capture_mode: CaptureMode::Photo,
            ..Default::default()
        });
        let err = leveler.start_recording().unwrap_err();
        assert_eq!(err.code, ErrorCode::VideoModeNotEnabled);
    }

    #[test]
    fn photo_params_require_photo_mode() {
        let leveler = activate(LevelerConfig::default());
        let err = leveler.capture_photo_params().unwrap_err();
        assert_eq!(err.code, ErrorCode::PhotoModeNotEnabled);

        leveler.set_capture_mode(CaptureMode::Photo).unwrap();
        leveler.next_frame(0.0).unwrap();
        assert_eq!(
            leveler.capture_photo_params().unwrap(),
            leveler.last_emitted().unwrap().unwrap()
        );
    }

    #[test]
    fn hdr_requires_capable_device_in_photo_mode() {
        let device = DeviceCapabilities {
            supports_hdr: true,
            ..Default::default()
        };
        let leveler = Leveler::activate(LevelerConfig::default(), Some(device)).unwrap();
        let err = leveler.set_photo_hdr(true).unwrap_err();
        assert_eq!(err.code, ErrorCode::PhotoHdrNotSupported);

        leveler.set_capture_mode(CaptureMode::Photo).unwrap();
        leveler.set_photo_hdr(true).unwrap();
        assert!(leveler.photo_hdr().unwrap());

        leveler.set_capture_mode(CaptureMode::Video).unwrap();
        assert!(!leveler.photo_hdr().unwrap());
    }

    #[test]
    fn missing_audio_is_reported_as_fault() {
        let device = DeviceCapabilities {
            supports_audio: false,
            ..Default::default()
        };
        let leveler = Leveler::activate(LevelerConfig::default(), Some(device)).unwrap();
        let events = leveler.subscribe().unwrap();

        assert_eq!(leveler.start_recording().unwrap(), RecordingTransition::Started);
        match events.try_recv() {
            Ok(LevelerEvent::Fault(err)) => {
                assert_eq!(err.code, ErrorCode::AudioRecordingUnavailable)
            }
            other => panic!("expected audio fault, got {other:?}"),
        }
    }

    #[test]
    fn deactivate_disconnects_subscribers() {
        let leveler = activate(LevelerConfig::default());
        let events = leveler.subscribe().unwrap();
        leveler.deactivate().unwrap();
        leveler.set_flash_available(true).unwrap();
        assert!(matches!(
            events.try_recv(),
            Err(std::sync::mpsc::TryRecvError::Disconnected)
        ));
    }
}
