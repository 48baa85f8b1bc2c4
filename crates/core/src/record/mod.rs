use serde::{Deserialize, Serialize};

use crate::{CropMode, TransformParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingState {
    #[default]
    Idle,
    Recording,
}

/// Outcome of a start/stop request. The `Already*` variants are no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingTransition {
    Started,
    Stopped,
    AlreadyRecording,
    AlreadyIdle,
}

/// State captured when a recording starts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecordingSnapshot {
    /// Crop mode active when the recording started.
    pub crop_mode: CropMode,
    /// Transform held for the whole clip, only for recordings started in
    /// [`CropMode::Locked`]. `None` until the first frame fills it when no
    /// frame had been emitted before the start.
    pub frozen: Option<TransformParams>,
}

impl RecordingSnapshot {
    /// Whether the clip holds one transform from start to stop.
    pub fn freezes(&self) -> bool {
        self.crop_mode == CropMode::Locked
    }
}

/// Tracks whether a clip is being recorded and owns the freeze snapshot.
///
/// State and snapshot live in one value, so a recording can never exist
/// without its snapshot.
#[derive(Debug, Default, Clone)]
pub struct LevelingStateMachine {
    session: Option<RecordingSnapshot>,
}

impl LevelingStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RecordingState {
        match self.session {
            Some(_) => RecordingState::Recording,
            None => RecordingState::Idle,
        }
    }

    /// Whether the next frame must come from a locked freeze that has no
    /// value yet.
    pub fn awaiting_freeze(&self) -> bool {
        self.session
            .map_or(false, |snapshot| snapshot.freezes() && snapshot.frozen.is_none())
    }

    /// Snapshot of the running recording, if any.
    pub fn snapshot(&self) -> Option<&RecordingSnapshot> {
        self.session.as_ref()
    }

    /// Starts a recording. `last_emitted` is the transform shown on the frame
    /// right before the call, if that frame was produced under `crop_mode`.
    pub fn start(
        &mut self,
        crop_mode: CropMode,
        last_emitted: Option<TransformParams>,
    ) -> RecordingTransition {
        if self.session.is_some() {
            return RecordingTransition::AlreadyRecording;
        }

        let frozen = match crop_mode {
            CropMode::Locked => last_emitted,
            CropMode::Flex | CropMode::Rotate => None,
        };
        self.session = Some(RecordingSnapshot { crop_mode, frozen });
        RecordingTransition::Started
    }

    /// Ends the recording and drops its snapshot.
    pub fn stop(&mut self) -> RecordingTransition {
        match self.session.take() {
            Some(_) => RecordingTransition::Stopped,
            None => RecordingTransition::AlreadyIdle,
        }
    }

    /// Applies the freeze rule to a freshly computed transform.
    pub fn gate(&mut self, computed: TransformParams) -> TransformParams {
        match self.session.as_mut() {
            Some(snapshot) if snapshot.freezes() => *snapshot.frozen.get_or_insert(computed),
            _ => computed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        let machine = LevelingStateMachine::new();
        assert_eq!(machine.state(), RecordingState::Idle);
        assert!(machine.snapshot().is_none());
    }

    #[test]
    fn double_start_and_stop_are_no_ops() {
        let mut machine = LevelingStateMachine::new();
        assert_eq!(machine.stop(), RecordingTransition::AlreadyIdle);
        assert_eq!(machine.start(CropMode::Flex, None), RecordingTransition::Started);
        assert_eq!(
            machine.start(CropMode::Locked, None),
            RecordingTransition::AlreadyRecording
        );
        assert_eq!(machine.snapshot().map(|s| s.crop_mode), Some(CropMode::Flex));
        assert_eq!(machine.stop(), RecordingTransition::Stopped);
        assert_eq!(machine.state(), RecordingState::Idle);
    }

    #[test]
    fn locked_recording_freezes_last_emitted() {
        let mut machine = LevelingStateMachine::new();
        let before = TransformParams::new(1.0, 0.0);
        machine.start(CropMode::Locked, Some(before));

        let gated = machine.gate(TransformParams::new(1.0, std::f64::consts::FRAC_PI_2));
        assert_eq!(gated, before);

        machine.stop();
        let live = TransformParams::new(1.0, std::f64::consts::FRAC_PI_2);
        assert_eq!(machine.gate(live), live);
    }

    #[test]
    fn locked_recording_without_history_freezes_first_frame() {
        let mut machine = LevelingStateMachine::new();
        machine.start(CropMode::Locked, None);

        let first = TransformParams::new(1.0, std::f64::consts::PI);
        assert!(machine.awaiting_freeze());
        assert_eq!(machine.gate(first), first);
        assert!(!machine.awaiting_freeze());
        assert_eq!(machine.gate(TransformParams::new(1.0, 0.0)), first);
    }

    #[test]
    fn flex_recording_passes_through() {
        let mut machine = LevelingStateMachine::new();
        machine.start(CropMode::Flex, Some(TransformParams::new(1.0, 0.0)));
        let computed = TransformParams::new(1.3, 0.2);
        assert_eq!(machine.gate(computed), computed);
    }
}
