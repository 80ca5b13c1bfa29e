//! Module combustion and heat-exchange formulas
//!
//! All temperatures are normalized (0 = ambient start, 1 = full flame).
//! Functions are pure so the stepper can apply them in any order it needs.

use std::f32::consts::PI;

/// Divisors below this are treated as zero
const NEAR_ZERO: f32 = 1e-9;

/// Reaction rate for a module at temperature `t`
///
/// Zero below `ignition`, one at or above `attenuation`, and the smoothstep
/// `3x² - 2x³` with `x = (t - ignition) / (attenuation - ignition)` in
/// between. Continuous at both thresholds.
#[inline]
pub fn reaction_rate(t: f32, ignition: f32, attenuation: f32) -> f32 {
    if t.is_nan() || t <= ignition {
        return 0.0;
    }
    if t >= attenuation {
        return 1.0;
    }
    let span = attenuation - ignition;
    if span <= NEAR_ZERO {
        return 1.0;
    }
    let x = (t - ignition) / span;
    x * x * (3.0 - 2.0 * x)
}

/// Mass of a solid cylinder
#[inline]
pub fn cylinder_mass(radius: f32, height: f32, density: f32) -> f32 {
    PI * density * height * radius * radius
}

/// Inverse of [`cylinder_mass`]: `sqrt(mass / (π·density·height))`
///
/// Returns 0 for a degenerate denominator or non-positive mass.
#[inline]
pub fn radius_from_mass(mass: f32, density: f32, height: f32) -> f32 {
    let denom = PI * density * height;
    if denom <= NEAR_ZERO || mass <= 0.0 {
        return 0.0;
    }
    (mass / denom).sqrt()
}

/// Lateral surface of a cylinder, `2π·r·h`
#[inline]
pub fn lateral_surface_area(radius: f32, height: f32) -> f32 {
    2.0 * PI * radius * height
}

/// Mass consumed in one tick
#[inline]
pub fn mass_loss(rate: f32, surface_area: f32, thickness: f32) -> f32 {
    rate * surface_area * thickness
}

/// Energy handed to the grid for `lost` kilograms of burnt wood
#[inline]
pub fn released_energy(lost: f32, release_temperature_factor: f32) -> f32 {
    lost * release_temperature_factor / 1000.0
}

/// Temperature change of a module exchanging heat with the air around it
///
/// Positive when the air is hotter. The caller moves the negated amount into
/// the grid delta. The two factors apply to opposite directions of the gap.
#[inline]
pub fn ambient_exchange(
    module_t: f32,
    ambient_t: f32,
    air_transfer_factor: f32,
    module_transfer_factor: f32,
) -> f32 {
    let gap = ambient_t - module_t;
    if gap > 0.0 {
        air_transfer_factor * gap
    } else {
        module_transfer_factor * gap
    }
}

/// Temperature change of a child equalizing with its parent
///
/// Both sides move the same fraction toward their mean; the parent receives
/// the negated amount. The fraction `factor * dt` is capped at 1 so the pair
/// never overshoots the mean.
#[inline]
pub fn parent_diffusion(child_t: f32, parent_t: f32, factor: f32, dt: f32) -> f32 {
    let k = (factor * dt).clamp(0.0, 1.0);
    k * 0.5 * (parent_t - child_t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const IGN: f32 = 0.15;
    const ATT: f32 = 0.45;

    #[test]
    fn test_reaction_rate_regions() {
        assert_eq!(reaction_rate(0.0, IGN, ATT), 0.0);
        assert_eq!(reaction_rate(IGN, IGN, ATT), 0.0);
        assert_eq!(reaction_rate(ATT, IGN, ATT), 1.0);
        assert_eq!(reaction_rate(2.0, IGN, ATT), 1.0);
        assert_relative_eq!(reaction_rate(0.30, IGN, ATT), 0.5, epsilon = 1e-5);
        assert_eq!(reaction_rate(f32::NAN, IGN, ATT), 0.0);
    }

    #[test]
    fn test_reaction_rate_continuity() {
        let eps = 1e-4;
        assert!(reaction_rate(IGN + eps, IGN, ATT) < 1e-5);
        assert!(reaction_rate(IGN - eps, IGN, ATT) == 0.0);
        assert!((1.0 - reaction_rate(ATT - eps, IGN, ATT)) < 1e-5);
        assert!(reaction_rate(ATT + eps, IGN, ATT) == 1.0);
    }

    #[test]
    fn test_reaction_rate_monotonic() {
        let mut last = 0.0;
        for i in 0..=100 {
            let t = i as f32 * 0.006;
            let r = reaction_rate(t, IGN, ATT);
            assert!(r >= last, "rate decreased at t = {t}");
            last = r;
        }
    }

    #[test]
    fn test_radius_mass_roundtrip() {
        let mass = cylinder_mass(0.25, 3.0, 800.0);
        assert_relative_eq!(radius_from_mass(mass, 800.0, 3.0), 0.25, max_relative = 1e-5);
        assert_eq!(radius_from_mass(mass, 800.0, 0.0), 0.0);
        assert_eq!(radius_from_mass(0.0, 800.0, 3.0), 0.0);
    }

    #[test]
    fn test_ambient_exchange_asymmetric() {
        // Air hotter: module gains air_transfer_factor of the gap
        assert_relative_eq!(ambient_exchange(0.2, 0.6, 0.1, 0.3), 0.04, epsilon = 1e-6);
        // Module hotter: module loses module_transfer_factor of the gap
        assert_relative_eq!(ambient_exchange(0.6, 0.2, 0.1, 0.3), -0.12, epsilon = 1e-6);
        assert_eq!(ambient_exchange(0.5, 0.5, 0.1, 0.3), 0.0);
    }

    #[test]
    fn test_parent_diffusion_moves_toward_mean() {
        let d = parent_diffusion(0.0, 1.0, 0.5, 0.1);
        assert_relative_eq!(d, 0.025, epsilon = 1e-6);
        // Huge dt is capped: both meet at the mean
        let d = parent_diffusion(0.0, 1.0, 10.0, 10.0);
        assert_relative_eq!(d, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_released_energy_scaling() {
        assert_relative_eq!(released_energy(0.002, 10_000.0), 0.02, epsilon = 1e-7);
        assert_relative_eq!(mass_loss(0.5, 2.0, 0.01), 0.01, epsilon = 1e-7);
    }
}
