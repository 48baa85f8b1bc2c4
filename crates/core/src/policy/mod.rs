//! Crop policies turning a filtered tilt into the per-frame transform.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

use serde::{Deserialize, Serialize};

use crate::{
    filter::ScaleFilter, orientation::wrap_angle, CropMode, LevelerConfig, LockedOrientation,
};

/// Scale and rotation the compositor applies to one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformParams {
    pub scale: f64,
    /// Radians.
    pub angle: f64,
}

impl TransformParams {
    pub fn new(scale: f64, angle: f64) -> Self {
        Self { scale, angle }
    }
}

/// Scale needed for an output frame of `aspect_ratio` to stay covered when
/// rotated by `angle`.
///
/// The angle is folded onto [0, pi/4] so the result rises with |angle| up to
/// 45 degrees and mirrors beyond it.
pub fn flex_target_scale(angle: f64, aspect_ratio: f64) -> f64 {
    let ratio = if aspect_ratio >= 1.0 {
        aspect_ratio
    } else {
        1.0 / aspect_ratio
    };
    let within = angle.abs() % FRAC_PI_2;
    let folded = if within > FRAC_PI_4 {
        FRAC_PI_2 - within
    } else {
        within
    };
    ratio.mul_add(folded.sin(), folded.cos())
}

/// Constant scale of [`CropMode::Rotate`] for a configuration.
pub fn rotate_scale(config: &LevelerConfig) -> f64 {
    config
        .rotate_scale
        .unwrap_or_else(|| flex_target_scale(FRAC_PI_4, config.output_aspect_ratio))
}

/// One of the four quarter-turn orientations, counted counter-clockwise from
/// upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Quadrant(u8);

const ALL_QUADRANTS: [Quadrant; 4] = [Quadrant(0), Quadrant(1), Quadrant(2), Quadrant(3)];
const VERTICAL_QUADRANTS: [Quadrant; 2] = [Quadrant(0), Quadrant(2)];
const HORIZONTAL_QUADRANTS: [Quadrant; 2] = [Quadrant(1), Quadrant(3)];

impl Quadrant {
    /// Rotation of the quadrant in (-pi, pi].
    pub fn angle(self) -> f64 {
        match self.0 {
            0 => 0.0,
            1 => FRAC_PI_2,
            2 => PI,
            _ => -FRAC_PI_2,
        }
    }

    fn distance(self, tilt: f64) -> f64 {
        wrap_angle(tilt - self.angle()).abs()
    }

    fn nearest(tilt: f64, allowed: &[Quadrant]) -> Quadrant {
        allowed
            .iter()
            .copied()
            .min_by(|a, b| a.distance(tilt).total_cmp(&b.distance(tilt)))
            .unwrap_or(Quadrant(0))
    }

    /// Keeps `current` until the tilt is more than half the family spacing
    /// plus `band` away from it.
    fn with_hysteresis(
        current: Option<Quadrant>,
        tilt: f64,
        allowed: &[Quadrant],
        band: f64,
    ) -> Quadrant {
        match current {
            Some(current) if allowed.contains(&current) => {
                let half_spacing = PI / allowed.len() as f64;
                if current.distance(tilt) > half_spacing + band {
                    Quadrant::nearest(tilt, allowed)
                } else {
                    current
                }
            }
            _ => Quadrant::nearest(tilt, allowed),
        }
    }
}

/// Snaps the tilt to quarter turns for [`CropMode::Locked`].
#[derive(Debug, Default, Clone)]
pub struct LockedQuantizer {
    device: Option<Quadrant>,
    emitted: Option<Quadrant>,
}

impl LockedQuantizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snap(&mut self, tilt: f64, orientation: LockedOrientation, band: f64) -> Quadrant {
        let device = Quadrant::with_hysteresis(self.device, tilt, &ALL_QUADRANTS, band);
        self.device = Some(device);

        let quadrant = match orientation {
            LockedOrientation::Auto => device,
            LockedOrientation::AlwaysVertical => {
                Quadrant::with_hysteresis(self.emitted, tilt, &VERTICAL_QUADRANTS, band)
            }
            LockedOrientation::AlwaysHorizontal => {
                Quadrant::with_hysteresis(self.emitted, tilt, &HORIZONTAL_QUADRANTS, band)
            }
            LockedOrientation::Vertical => self.follow_within(device, tilt, &VERTICAL_QUADRANTS),
            LockedOrientation::Horizontal => {
                self.follow_within(device, tilt, &HORIZONTAL_QUADRANTS)
            }
        };

        self.emitted = Some(quadrant);
        quadrant
    }

    /// Device quadrant when it belongs to `family`, otherwise the last
    /// emitted member of the family.
    fn follow_within(&self, device: Quadrant, tilt: f64, family: &[Quadrant]) -> Quadrant {
        if family.contains(&device) {
            return device;
        }
        self.emitted
            .filter(|quadrant| family.contains(quadrant))
            .unwrap_or_else(|| Quadrant::nearest(tilt, family))
    }

    pub fn reset(&mut self) {
        self.device = None;
        self.emitted = None;
    }
}

/// Stateful crop policy engine: scale filter plus locked quantizer.
#[derive(Debug, Default, Clone)]
pub struct CropPolicy {
    filter: ScaleFilter,
    locked: LockedQuantizer,
}

impl CropPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes the transform for one frame under `mode`, which is normally
    /// `config.crop_mode`. `dt` is the time since the previous frame in
    /// seconds.
    pub fn apply(
        &mut self,
        mode: CropMode,
        tilt: f64,
        dt: f64,
        config: &LevelerConfig,
    ) -> TransformParams {
        match mode {
            CropMode::Flex => {
                let target = flex_target_scale(tilt, config.output_aspect_ratio);
                let scale = self
                    .filter
                    .apply(target, config.effective_filter_frequency(), dt);
                TransformParams::new(scale, tilt)
            }
            CropMode::Rotate => TransformParams::new(rotate_scale(config), tilt),
            CropMode::Locked => {
                let quadrant = self.locked.snap(
                    tilt,
                    config.effective_locked_orientation(),
                    config.hysteresis_radians(),
                );
                TransformParams::new(1.0, quadrant.angle())
            }
        }
    }

    /// Prepares for a crop mode switch so the next frame continues from
    /// `last` instead of jumping.
    pub fn switch_mode(&mut self, last: Option<TransformParams>) {
        match last {
            Some(params) => self.filter.reseed(params.scale),
            None => self.filter.reset(),
        }
        self.locked.reset();
    }

    /// Forgets the locked quadrant so the next frame picks the nearest one
    /// under a new orientation constraint.
    pub fn reset_locked(&mut self) {
        self.locked.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f64 = 1.0 / 30.0;

    fn deg(value: f64) -> f64 {
        value.to_radians()
    }

    #[test]
    fn flex_scale_is_one_when_level() {
        assert!((flex_target_scale(0.0, 16.0 / 9.0) - 1.0).abs() < 1e-12);
        assert!((flex_target_scale(FRAC_PI_2, 16.0 / 9.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn flex_scale_mirrors_around_45_degrees() {
        let below = flex_target_scale(deg(30.0), 1.5);
        let above = flex_target_scale(deg(60.0), 1.5);
        assert!((below - above).abs() < 1e-12);
        assert!(flex_target_scale(deg(45.0), 1.5) > below);
    }

    #[test]
    fn portrait_aspect_matches_landscape() {
        let landscape = flex_target_scale(deg(20.0), 16.0 / 9.0);
        let portrait = flex_target_scale(deg(20.0), 9.0 / 16.0);
        assert!((landscape - portrait).abs() < 1e-12);
    }

    #[test]
    fn rotate_defaults_to_worst_case_flex_scale() {
        let config = LevelerConfig::default();
        let expected = flex_target_scale(FRAC_PI_4, config.output_aspect_ratio);
        assert_eq!(rotate_scale(&config), expected);

        let fixed = LevelerConfig {
            rotate_scale: Some(1.25),
            ..Default::default()
        };
        assert_eq!(rotate_scale(&fixed), 1.25);
    }

    #[test]
    fn auto_lock_holds_inside_hysteresis_band() {
        let mut quantizer = LockedQuantizer::new();
        let band = deg(5.0);
        assert_eq!(quantizer.snap(deg(44.0), LockedOrientation::Auto, band), Quadrant(0));
        assert_eq!(quantizer.snap(deg(46.0), LockedOrientation::Auto, band), Quadrant(0));
        assert_eq!(quantizer.snap(deg(49.0), LockedOrientation::Auto, band), Quadrant(0));
        assert_eq!(quantizer.snap(deg(51.0), LockedOrientation::Auto, band), Quadrant(1));
        assert_eq!(quantizer.snap(deg(44.0), LockedOrientation::Auto, band), Quadrant(1));
        assert_eq!(quantizer.snap(deg(39.0), LockedOrientation::Auto, band), Quadrant(0));
    }

    #[test]
    fn always_vertical_only_emits_upright_or_upside_down() {
        let mut quantizer = LockedQuantizer::new();
        for degrees in (-360..=360).step_by(7) {
            let quadrant =
                quantizer.snap(deg(degrees as f64), LockedOrientation::AlwaysVertical, deg(5.0));
            assert!(quadrant == Quadrant(0) || quadrant == Quadrant(2));
        }
    }

    #[test]
    fn must_hold_vertical_keeps_last_value_when_turned_sideways() {
        let mut quantizer = LockedQuantizer::new();
        let band = deg(5.0);
        assert_eq!(quantizer.snap(deg(170.0), LockedOrientation::Vertical, band), Quadrant(2));
        assert_eq!(quantizer.snap(deg(100.0), LockedOrientation::Vertical, band), Quadrant(2));
        assert_eq!(quantizer.snap(deg(10.0), LockedOrientation::Vertical, band), Quadrant(0));
    }

    #[test]
    fn always_horizontal_picks_nearest_side() {
        let mut quantizer = LockedQuantizer::new();
        let quadrant = quantizer.snap(deg(-20.0), LockedOrientation::AlwaysHorizontal, deg(5.0));
        assert_eq!(quadrant.angle(), -FRAC_PI_2);
    }

    #[test]
    fn rotate_mode_keeps_scale_constant() {
        let mut policy = CropPolicy::new();
        let config = LevelerConfig {
            crop_mode: CropMode::Rotate,
            ..Default::default()
        };
        let first = policy.apply(config.crop_mode, deg(5.0), DT, &config);
        let second = policy.apply(config.crop_mode, deg(40.0), DT, &config);
        assert_eq!(first.scale, second.scale);
        assert_eq!(second.angle, deg(40.0));
    }

    #[test]
    fn mode_switch_continues_from_last_scale() {
        let mut policy = CropPolicy::new();
        let mut config = LevelerConfig {
            crop_mode: CropMode::Rotate,
            ..Default::default()
        };
        let last = policy.apply(config.crop_mode, deg(10.0), DT, &config);

        config.crop_mode = CropMode::Flex;
        policy.switch_mode(Some(last));
        let next = policy.apply(config.crop_mode, deg(10.0), DT, &config);
        assert_eq!(next.scale, last.scale);
    }
}
