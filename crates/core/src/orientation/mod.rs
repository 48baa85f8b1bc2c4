//! Device tilt tracking from gravity samples.

use std::{
    f64::consts::{PI, TAU},
    sync::{Arc, Mutex, MutexGuard},
};

use serde::{Deserialize, Serialize};

use crate::{LevelerError, Result};

/// Samples whose in-plane gravity component is weaker than this (in g) are
/// too close to lying flat to give a usable tilt.
const MIN_PLANAR_GRAVITY: f64 = 0.1;

/// One reading from the platform motion service.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    /// Seconds on the capture timeline.
    pub timestamp: f64,
    /// Gravity in device coordinates, in units of g.
    pub gravity: [f64; 3],
}

impl MotionSample {
    pub fn new(timestamp: f64, gravity: [f64; 3]) -> Self {
        Self { timestamp, gravity }
    }

    /// Builds the sample a device rolled by `angle` radians would report.
    pub fn from_tilt(timestamp: f64, angle: f64) -> Self {
        Self::new(timestamp, [angle.sin(), -angle.cos(), 0.0])
    }

    /// Raw tilt in (-pi, pi], or `None` when the sample cannot be trusted.
    fn raw_tilt(&self) -> Option<f64> {
        let [gx, gy, gz] = self.gravity;
        if !(gx.is_finite() && gy.is_finite() && gz.is_finite()) {
            return None;
        }
        if gx.hypot(gy) < MIN_PLANAR_GRAVITY {
            return None;
        }
        Some(gx.atan2(-gy))
    }
}

/// Wraps an angle into [-pi, pi).
pub(crate) fn wrap_angle(angle: f64) -> f64 {
    (angle + PI).rem_euclid(TAU) - PI
}

/// Converts motion samples into a continuous tilt angle.
///
/// The angle is unwrapped across the +/-pi seam so a device turning past
/// upside-down keeps counting instead of jumping by a full turn. Unusable or
/// stale samples leave the last good angle in place.
#[derive(Debug, Default, Clone)]
pub struct OrientationTracker {
    angle: f64,
    last_raw: Option<f64>,
    last_timestamp: Option<f64>,
    accepted: u64,
    rejected: u64,
}

impl OrientationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a sample and returns the current tilt.
    pub fn update(&mut self, sample: &MotionSample) -> f64 {
        if let Some(last) = self.last_timestamp {
            if sample.timestamp < last {
                self.rejected += 1;
                return self.angle;
            }
        }

        let Some(raw) = sample.raw_tilt() else {
            self.rejected += 1;
            return self.angle;
        };

        match self.last_raw {
            Some(previous) => self.angle += wrap_angle(raw - previous),
            None => self.angle = raw,
        }
        self.last_raw = Some(raw);
        self.last_timestamp = Some(sample.timestamp);
        self.accepted += 1;
        self.angle
    }

    /// Last known tilt in radians; 0 before the first usable sample.
    pub fn angle(&self) -> f64 {
        self.angle
    }

    pub fn rejected_samples(&self) -> u64 {
        self.rejected
    }

    pub fn accepted_samples(&self) -> u64 {
        self.accepted
    }
}

/// Single-slot hand-off between the sensor producer and frame computation.
///
/// The producer overwrites the slot with its newest sample; the frame side
/// takes whatever is there. An empty slot means no new data since the last
/// frame and the tracker holds its angle.
#[derive(Clone, Default)]
pub struct SensorFeed {
    slot: Arc<Mutex<Option<MotionSample>>>,
}

impl SensorFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a sample, replacing any sample not yet consumed.
    pub fn push(&self, sample: MotionSample) -> Result<()> {
        let mut slot = self.lock()?;
        *slot = Some(sample);
        Ok(())
    }

    pub(crate) fn take(&self) -> Result<Option<MotionSample>> {
        let mut slot = self.lock()?;
        Ok(slot.take())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<MotionSample>>> {
        self.slot
            .lock()
            .map_err(|_| LevelerError::unknown("sensor feed has been poisoned"))
    }
}

impl std::fmt::Debug for SensorFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorFeed").finish()
    }
}
