//! Frame hand-off and edge-triggered notifications.

use std::sync::mpsc::{self, Receiver, Sender};

use serde::{Deserialize, Serialize};

use crate::{CropMode, ErrorCode, LevelerError, TransformParams};

/// Discrete state changes raised for the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Notification {
    FlashAvailabilityChanged,
    /// Focus and exposure locked after a sustained press.
    FocusExposureLocked,
    /// Significant subject area change; focus returns to continuous mode.
    SubjectAreaChanged,
    FocusFinished,
}

/// Item delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelerEvent {
    Notification(Notification),
    /// Recoverable failure reported alongside normal delivery.
    Fault(LevelerError),
}

/// Observer registry owned by one engine instance. Dropping the bus
/// disconnects every subscriber.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<Sender<LevelerEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an observer; it receives every event published from now on.
    pub fn subscribe(&mut self) -> Receiver<LevelerEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    /// Sends to every live subscriber, dropping those whose receiver is gone.
    pub fn publish(&mut self, event: LevelerEvent) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Disconnects every observer.
    pub fn close(&mut self) {
        self.subscribers.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
}

/// Turns a level reported repeatedly into its transitions.
#[derive(Debug, Default, Clone)]
pub struct EdgeTrigger {
    level: bool,
}

impl EdgeTrigger {
    pub fn new(initial: bool) -> Self {
        Self { level: initial }
    }

    /// Returns the edge crossed by moving to `level`, if any.
    pub fn update(&mut self, level: bool) -> Option<Edge> {
        if level == self.level {
            return None;
        }
        self.level = level;
        Some(if level { Edge::Rising } else { Edge::Falling })
    }
}

/// Normalised point of a focus gesture; the tappable region is the unit
/// square.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FocusPoint {
    pub x: f64,
    pub y: f64,
}

impl FocusPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_tappable(&self) -> bool {
        (0.0..=1.0).contains(&self.x) && (0.0..=1.0).contains(&self.y)
    }
}

/// Long-press detector for the focus lock gesture.
#[derive(Debug, Default, Clone)]
struct FocusGesture {
    pressed_at: Option<f64>,
    locked: bool,
}

impl FocusGesture {
    /// Returns true exactly once per press, when it has been held long enough.
    fn hold(&mut self, timestamp: f64, threshold: f64) -> bool {
        let started = *self.pressed_at.get_or_insert(timestamp);
        if self.locked || timestamp - started < threshold {
            return false;
        }
        self.locked = true;
        true
    }

    fn release(&mut self) {
        self.pressed_at = None;
        self.locked = false;
    }
}

/// Publishes transforms and gesture-derived notifications.
#[derive(Debug, Default)]
pub struct ParameterEmitter {
    bus: EventBus,
    flash: EdgeTrigger,
    focusing: EdgeTrigger,
    gesture: FocusGesture,
    frames: u64,
    /// Last emitted transform with the crop mode that produced it.
    last: Option<(CropMode, TransformParams)>,
}

impl ParameterEmitter {
    /// `flash_available` is the level reported by the device at activation.
    pub fn new(flash_available: bool) -> Self {
        Self {
            flash: EdgeTrigger::new(flash_available),
            ..Default::default()
        }
    }

    pub fn subscribe(&mut self) -> Receiver<LevelerEvent> {
        let receiver = self.bus.subscribe();
        tracing::debug!(subscribers = self.bus.subscriber_count(), "observer registered");
        receiver
    }

    /// Records the frame's transform, produced under `source`, and hands the
    /// consumer its copy.
    pub fn emit_frame(&mut self, source: CropMode, params: TransformParams) -> TransformParams {
        self.frames += 1;
        self.last = Some((source, params));
        tracing::trace!(frame = self.frames, scale = params.scale, angle = params.angle, "emit");
        params
    }

    /// Last transform handed to the consumer, whatever mode produced it.
    pub fn last_emitted(&self) -> Option<TransformParams> {
        self.last.map(|(_, params)| params)
    }

    /// Last emitted transform, only if it was produced under `mode`.
    pub fn last_emitted_under(&self, mode: CropMode) -> Option<TransformParams> {
        self.last
            .filter(|(source, _)| *source == mode)
            .map(|(_, params)| params)
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frames
    }

    /// Host reports the flash availability level.
    pub fn flash_available(&mut self, available: bool) {
        if self.flash.update(available).is_some() {
            self.notify(Notification::FlashAvailabilityChanged);
        }
    }

    /// Host reports a press (initial or sustained) at `point`.
    pub fn focus_press(&mut self, point: FocusPoint, timestamp: f64, lock_after: f64) {
        if !point.is_tappable() {
            self.gesture.release();
            self.fault(LevelerError::new(
                ErrorCode::FocusOutOfBounds,
                format!("focus point ({:.3}, {:.3}) outside tappable region", point.x, point.y),
            ));
            return;
        }
        if self.gesture.hold(timestamp, lock_after) {
            self.notify(Notification::FocusExposureLocked);
        }
    }

    /// Ends the press and re-arms the lock.
    pub fn focus_release(&mut self) {
        self.gesture.release();
    }

    /// Host reports whether the camera is still adjusting focus.
    pub fn focus_adjusting(&mut self, adjusting: bool) {
        if self.focusing.update(adjusting) == Some(Edge::Falling) {
            self.notify(Notification::FocusFinished);
        }
    }

    /// Fires once per host report.
    pub fn subject_area_changed(&mut self) {
        self.notify(Notification::SubjectAreaChanged);
    }

    /// Publishes a recoverable error to every observer.
    pub fn fault(&mut self, error: LevelerError) {
        tracing::warn!(code = ?error.code, message = %error.message, "leveler fault");
        self.bus.publish(LevelerEvent::Fault(error));
    }

    pub fn close(&mut self) {
        self.bus.close();
    }

    fn notify(&mut self, notification: Notification) {
        tracing::debug!(?notification, "notification");
        self.bus.publish(LevelerEvent::Notification(notification));
    }
}
