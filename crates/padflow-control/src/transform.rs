//! Signal shaping applied to every raw sample before state is updated.
//!
//! Steps run in a fixed order: granularity, dead zone, inversion,
//! recentering, clamp. Later steps rely on the normalization done by the
//! earlier ones.

use crate::config::{ControlConfiguration, DeadZone};
use crate::control::ControlKind;

/// Maps a raw device sample to its shaped value.
#[inline]
pub fn shape(raw: f32, config: &ControlConfiguration, kind: ControlKind) -> f32 {
    let mut value = raw;
    if let Some(granularity) = config.granularity() {
        value = quantize(value, granularity);
    }
    if let Some(dead_zone) = config.dead_zone() {
        value = collapse_dead_zone(value, dead_zone);
    }
    if config.is_inverted() {
        value = invert(value, kind);
    }
    let center = config.center();
    if center != 0.0 && !kind.is_discrete() {
        value = recenter(value, center);
    }
    clamp(value)
}

/// Snaps `value` to the nearest multiple of `granularity`.
///
/// Bin edges sit on odd multiples of `granularity / 2`; a value on an edge
/// belongs to the bin farther from zero. Full deflection (±1 and beyond)
/// is left untouched so it still reads as full scale, and so is any value
/// whose bin index does not fit a float.
#[inline]
pub fn quantize(value: f32, granularity: f32) -> f32 {
    if value.is_nan() || value.abs() >= 1.0 {
        return value;
    }
    let bin = (value / granularity).round();
    if !bin.is_finite() {
        return value;
    }
    bin * granularity
}

#[inline]
pub fn collapse_dead_zone(value: f32, dead_zone: DeadZone) -> f32 {
    if dead_zone.contains(value) {
        0.0
    } else {
        value
    }
}

#[inline]
pub fn invert(value: f32, kind: ControlKind) -> f32 {
    if kind.is_discrete() {
        1.0 - value
    } else {
        -value
    }
}

/// Rescales both halves independently so that `center` becomes 0 while
/// ±1 stay ±1.
#[inline]
pub fn recenter(value: f32, center: f32) -> f32 {
    if value >= center {
        (value - center) / (1.0 - center)
    } else {
        (value - center) / (1.0 + center)
    }
}

/// Forces `value` into [-1, 1]. Negative zero becomes zero, NaN passes through.
#[inline]
pub fn clamp(value: f32) -> f32 {
    if value == 0.0 {
        0.0
    } else {
        value.clamp(-1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MIN_GRANULARITY;
    use crate::control::AxisKind;

    const AXIS: ControlKind = ControlKind::Continuous(AxisKind::Absolute);
    const BUTTON: ControlKind = ControlKind::Discrete;

    fn samples() -> impl Iterator<Item = f32> {
        (-100..=100).map(|i| i as f32 / 100.0)
    }

    fn config(f: impl FnOnce(&mut ControlConfiguration)) -> ControlConfiguration {
        let mut cfg = ControlConfiguration::default();
        f(&mut cfg);
        cfg
    }

    #[test]
    fn default_configuration_is_identity_in_range() {
        let cfg = ControlConfiguration::default();
        for v in samples() {
            assert_eq!(shape(v, &cfg, AXIS), v);
        }
    }

    #[test]
    fn granularity_snaps_to_nearest_bin() {
        assert_eq!(quantize(0.02, 0.25), 0.0);
        assert_eq!(quantize(0.26, 0.25), 0.25);
        assert_eq!(quantize(0.24, 0.25), 0.25);
        assert_eq!(quantize(-0.3, 0.25), -0.25);
        assert_eq!(quantize(0.6, 0.25), 0.5);
    }

    #[test]
    fn granularity_edges_go_away_from_zero() {
        assert_eq!(quantize(0.125, 0.25), 0.25);
        assert_eq!(quantize(-0.125, 0.25), -0.25);
        assert_eq!(quantize(0.375, 0.25), 0.5);
        assert_eq!(quantize(0.124, 0.25), 0.0);
    }

    #[test]
    fn granularity_keeps_full_deflection() {
        assert_eq!(quantize(1.0, 0.3), 1.0);
        assert_eq!(quantize(-1.0, 0.3), -1.0);
        assert!((quantize(0.99, 0.3) - 0.9).abs() < 1e-6);
        assert!(quantize(f32::NAN, 0.3).is_nan());
    }

    #[test]
    fn subnormal_granularity_does_not_saturate() {
        assert_eq!(quantize(0.5, 1e-39), 0.5);
        assert_eq!(quantize(-0.5, 1e-39), -0.5);
        assert_eq!(quantize(0.0, 1e-39), 0.0);
    }

    #[test]
    fn smallest_granularity_keeps_values() {
        let cfg = config(|c| c.set_granularity(MIN_GRANULARITY).expect("granularity"));
        for v in samples() {
            let once = shape(v, &cfg, AXIS);
            assert!((once - v).abs() <= MIN_GRANULARITY, "v={v} shaped={once}");
            assert_eq!(shape(once, &cfg, AXIS), once, "v={v}");
        }
    }

    #[test]
    fn shape_is_idempotent_with_granularity() {
        for g in [MIN_GRANULARITY, 0.05, 0.1, 0.25, 0.3, 0.7, 1.0] {
            let cfg = config(|c| {
                c.set_granularity(g).expect("granularity");
                c.set_dead_zone(-0.05, 0.05).expect("dead zone");
            });
            for v in samples() {
                let once = shape(v, &cfg, AXIS);
                assert_eq!(shape(once, &cfg, AXIS), once, "g={g} v={v}");
            }
        }
    }

    #[test]
    fn dead_zone_collapses_inclusive_range() {
        let cfg = config(|c| c.set_dead_zone(-0.2, 0.1).expect("dead zone"));
        for v in samples() {
            let shaped = shape(v, &cfg, AXIS);
            if (-0.2..=0.1).contains(&v) {
                assert_eq!(shaped, 0.0, "v={v}");
            } else {
                assert_eq!(shaped, v, "v={v}");
            }
        }
    }

    #[test]
    fn dead_zone_result_is_positive_zero() {
        let cfg = config(|c| {
            c.set_dead_zone(-0.1, 0.1).expect("dead zone");
            c.set_inverted(true);
        });
        let shaped = shape(-0.05, &cfg, AXIS);
        assert_eq!(shaped.to_bits(), 0.0_f32.to_bits());
    }

    #[test]
    fn inversion_is_self_inverse_for_axes() {
        for v in samples() {
            assert_eq!(invert(invert(v, AXIS), AXIS), v);
        }
    }

    #[test]
    fn inversion_flips_button_endpoints() {
        let cfg = config(|c| c.set_inverted(true));
        assert_eq!(shape(0.0, &cfg, BUTTON), 1.0);
        assert_eq!(shape(1.0, &cfg, BUTTON), 0.0);
        assert_eq!(shape(0.5, &cfg, AXIS), -0.5);
    }

    #[test]
    fn recentering_maps_center_to_zero_and_keeps_extremes() {
        let cfg = config(|c| c.set_center(0.2).expect("center"));
        assert_eq!(shape(0.2, &cfg, AXIS), 0.0);
        assert_eq!(shape(1.0, &cfg, AXIS), 1.0);
        assert_eq!(shape(-1.0, &cfg, AXIS), -1.0);
        assert!((shape(0.6, &cfg, AXIS) - 0.5).abs() < 1e-6);
        assert!((shape(-0.4, &cfg, AXIS) + 0.5).abs() < 1e-6);
        assert!(shape(0.1, &cfg, AXIS) < 0.0);
    }

    #[test]
    fn recentering_skips_buttons() {
        let cfg = config(|c| c.set_center(0.5).expect("center"));
        assert_eq!(shape(1.0, &cfg, BUTTON), 1.0);
        assert_eq!(shape(0.0, &cfg, BUTTON), 0.0);
    }

    #[test]
    fn output_is_clamped() {
        let cfg = ControlConfiguration::default();
        let wheel = ControlKind::Continuous(AxisKind::Relative);
        assert_eq!(shape(3.5, &cfg, wheel), 1.0);
        assert_eq!(shape(f32::NEG_INFINITY, &cfg, wheel), -1.0);
        assert!(shape(f32::NAN, &cfg, wheel).is_nan());
    }

    #[test]
    fn pipeline_matches_reference_sequence() {
        let cfg = config(|c| {
            c.set_granularity(0.25).expect("granularity");
            c.set_dead_zone(-0.05, 0.05).expect("dead zone");
        });
        let shaped: Vec<f32> = [0.02, 0.26, 0.24, -0.3]
            .into_iter()
            .map(|v| shape(v, &cfg, AXIS))
            .collect();
        assert_eq!(shaped, [0.0, 0.25, 0.25, -0.25]);
    }
}
