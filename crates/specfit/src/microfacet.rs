//! Tabulated specular curves and their GGX lobe fit.
//!
//! Sample `m` of a curve with resolution `M` sits at `u = m / M`, `cos θ_h = 1 - u²`.
//! A lobe is parameterized by its reflectivity `R` (hemispherical integral of the curve
//! weighted by `cos θ_h`) and the squared GGX roughness `α²`.

use std::f32::consts::PI;

pub const EPSILON: f32 = 1e-6;
pub const MIN_ALPHA_SQUARED: f32 = 1e-4;
const MAX_DAMPING: f32 = 1e6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lobe {
    pub reflectivity: f32,
    pub alpha_squared: f32,
}

pub fn half_angle_cosine(m: usize, resolution: usize) -> f32 {
    if resolution == 0 {
        return 1.0;
    }
    let u = m as f32 / resolution as f32;
    1.0 - u * u
}

pub fn ggx_distribution(cos_h: f32, alpha_squared: f32) -> f32 {
    let k = cos_h * cos_h * (alpha_squared - 1.0) + 1.0;
    alpha_squared / (PI * (k * k).max(EPSILON))
}

/// d/d(α²) of [`ggx_distribution`].
pub fn ggx_distribution_derivative(cos_h: f32, alpha_squared: f32) -> f32 {
    let c2 = cos_h * cos_h;
    let k = c2 * (alpha_squared - 1.0) + 1.0;
    (k - 2.0 * alpha_squared * c2) / (PI * (k * k * k).max(EPSILON))
}

/// `2π ∫ f(u) (1 - u²) 2u du` over `u ∈ [0, 1]` by the trapezoid rule.
pub fn reflectivity_integral(curve: &[f32]) -> f32 {
    let resolution = curve.len().saturating_sub(1);
    if resolution == 0 {
        return 0.0;
    }
    let du = 1.0 / resolution as f32;
    let integrand = |m: usize| {
        let u = m as f32 * du;
        curve[m] * (1.0 - u * u) * 2.0 * u
    };
    let sum: f32 = (0..resolution).map(|m| 0.5 * (integrand(m) + integrand(m + 1)) * du).sum();
    2.0 * PI * sum
}

/// One-shot estimate: reflectivity from the integral, roughness from the peak height.
pub fn estimate_lobe(curve: &[f32]) -> Lobe {
    let reflectivity = reflectivity_integral(curve).max(0.0);
    let peak = curve.first().copied().unwrap_or(0.0).max(EPSILON);
    let alpha_squared = (reflectivity / (PI * peak)).clamp(MIN_ALPHA_SQUARED, 1.0);
    Lobe { reflectivity, alpha_squared }
}

pub fn lobe_error(curve: &[f32], lobe: Lobe) -> f32 {
    let resolution = curve.len().saturating_sub(1);
    curve
        .iter()
        .enumerate()
        .map(|(m, f)| {
            let d = ggx_distribution(half_angle_cosine(m, resolution), lobe.alpha_squared);
            let r = lobe.reflectivity * d - f;
            r * r
        })
        .sum()
}

/// A single damped Gauss-Newton step on `(R, α²)`. The damped normal matrix is solved
/// directly; a near-singular system leaves the lobe unchanged.
pub fn damped_step(curve: &[f32], lobe: Lobe, damping: f32, max_reflectivity: f32) -> Lobe {
    let resolution = curve.len().saturating_sub(1);
    let (mut a, mut b, mut d, mut g_r, mut g_s) = (0.0f32, 0.0f32, 0.0f32, 0.0f32, 0.0f32);

    for (m, f) in curve.iter().enumerate() {
        let cos_h = half_angle_cosine(m, resolution);
        let dist = ggx_distribution(cos_h, lobe.alpha_squared);
        let j_r = dist;
        let j_s = lobe.reflectivity * ggx_distribution_derivative(cos_h, lobe.alpha_squared);
        let residual = lobe.reflectivity * dist - f;

        a += j_r * j_r;
        b += j_r * j_s;
        d += j_s * j_s;
        g_r += j_r * residual;
        g_s += j_s * residual;
    }

    let a = a * (1.0 + damping) + EPSILON;
    let d = d * (1.0 + damping) + EPSILON;
    let det = a * d - b * b;
    if det.abs() < EPSILON * EPSILON || !det.is_finite() {
        return lobe;
    }

    let delta_r = (-g_r * d + g_s * b) / det;
    let delta_s = (-g_s * a + g_r * b) / det;

    Lobe {
        reflectivity: (lobe.reflectivity + delta_r).clamp(0.0, max_reflectivity.max(0.0)),
        alpha_squared: (lobe.alpha_squared + delta_s).clamp(MIN_ALPHA_SQUARED, 1.0),
    }
}

/// Outcome of one per-pixel refinement pass over all three channels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefinedPixel {
    pub lobes: [Lobe; 3],
    pub damping: f32,
    pub error: f32,
}

/// Tries one damped step per channel and keeps it only if the summed error drops. The
/// incoming lobes are first pulled under `max_reflectivity`, so neither outcome exceeds it.
pub fn refine_pixel(
    curves: [&[f32]; 3],
    lobes: [Lobe; 3],
    damping: f32,
    damping_scale: f32,
    max_reflectivity: [f32; 3],
    increase: f32,
    decrease: f32,
) -> RefinedPixel {
    let lobes: [Lobe; 3] = std::array::from_fn(|c| Lobe {
        reflectivity: lobes[c].reflectivity.clamp(0.0, max_reflectivity[c].max(0.0)),
        ..lobes[c]
    });
    let lambda = damping * damping_scale;
    let candidate: [Lobe; 3] =
        std::array::from_fn(|c| damped_step(curves[c], lobes[c], lambda, max_reflectivity[c]));

    let old_error: f32 = (0..3).map(|c| lobe_error(curves[c], lobes[c])).sum();
    let new_error: f32 = (0..3).map(|c| lobe_error(curves[c], candidate[c])).sum();

    if new_error < old_error {
        RefinedPixel {
            lobes: candidate,
            damping: (damping * decrease).max(EPSILON),
            error: new_error,
        }
    } else {
        RefinedPixel {
            lobes,
            damping: (damping * increase).min(MAX_DAMPING),
            error: old_error,
        }
    }
}

pub fn encode_reflectivity(reflectivity: f32, gamma_inv: f32) -> f32 {
    reflectivity.max(0.0).powf(gamma_inv)
}

pub fn decode_reflectivity(encoded: f32, gamma: f32) -> f32 {
    encoded.max(0.0).powf(gamma)
}

/// glTF roughness `r` satisfies `α = r²`, so it is stored as `(α²)^¼`.
pub fn encode_roughness(alpha_squared: f32) -> f32 {
    alpha_squared.max(0.0).sqrt().sqrt()
}

pub fn decode_roughness(encoded: f32) -> f32 {
    let a = encoded * encoded;
    a * a
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_approx_eq(a: f32, b: f32, eps: f32) {
        assert!((a - b).abs() < eps, "{a} != {b}");
    }

    fn sampled(lobe: Lobe, resolution: usize) -> Vec<f32> {
        (0..=resolution)
            .map(|m| lobe.reflectivity * ggx_distribution(half_angle_cosine(m, resolution), lobe.alpha_squared))
            .collect()
    }

    #[test]
    fn test_distribution_is_normalized() {
        for alpha_squared in [0.05, 0.25, 1.0] {
            let curve = sampled(Lobe { reflectivity: 1.0, alpha_squared }, 1024);
            assert_approx_eq(reflectivity_integral(&curve), 1.0, 1e-2);
        }
    }

    #[test]
    fn test_estimate_recovers_lobe() {
        let truth = Lobe { reflectivity: 0.4, alpha_squared: 0.25 };
        let estimate = estimate_lobe(&sampled(truth, 256));
        assert_approx_eq(estimate.reflectivity, 0.4, 1e-2);
        assert_approx_eq(estimate.alpha_squared, 0.25, 1e-2);
    }

    #[test]
    fn test_estimate_of_empty_curve() {
        let estimate = estimate_lobe(&[0.0; 9]);
        assert_eq!(estimate.reflectivity, 0.0);
        assert_eq!(estimate.alpha_squared, MIN_ALPHA_SQUARED);
        assert!(estimate_lobe(&[]).reflectivity == 0.0);
    }

    #[test]
    fn test_refinement_reduces_error() {
        let truth = Lobe { reflectivity: 0.5, alpha_squared: 0.2 };
        let curve = sampled(truth, 32);
        let curves = [curve.as_slice(), curve.as_slice(), curve.as_slice()];

        let start = Lobe { reflectivity: 0.3, alpha_squared: 0.5 };
        let mut lobes = [start; 3];
        let mut damping = 1.0;
        let initial_error: f32 = (0..3).map(|_| lobe_error(&curve, start)).sum();
        let mut error = initial_error;

        for _ in 0..100 {
            let refined = refine_pixel(curves, lobes, damping, 1.0, [1.0; 3], 2.0, 0.5);
            assert!(refined.error <= error);
            lobes = refined.lobes;
            damping = refined.damping;
            error = refined.error;
        }

        assert!(error < initial_error * 1e-3);
        assert_approx_eq(lobes[0].reflectivity, 0.5, 1e-2);
        assert_approx_eq(lobes[0].alpha_squared, 0.2, 1e-2);
    }

    #[test]
    fn test_reflectivity_respects_energy_bound() {
        let curve = sampled(Lobe { reflectivity: 0.9, alpha_squared: 0.3 }, 32);
        let step = damped_step(&curve, Lobe { reflectivity: 0.1, alpha_squared: 0.3 }, 0.0, 0.6);
        assert!(step.reflectivity <= 0.6);
    }

    #[test]
    fn test_refinement_pulls_start_under_energy_bound() {
        // the exact lobe fits perfectly but carries more energy than the bound allows
        let truth = Lobe { reflectivity: 0.9, alpha_squared: 0.3 };
        let curve = sampled(truth, 32);
        let curves = [curve.as_slice(), curve.as_slice(), curve.as_slice()];

        let mut lobes = [truth; 3];
        let mut damping = 1.0;
        for _ in 0..10 {
            let refined = refine_pixel(curves, lobes, damping, 1.0, [0.5; 3], 2.0, 0.5);
            assert!(refined.lobes.iter().all(|lobe| lobe.reflectivity <= 0.5));
            lobes = refined.lobes;
            damping = refined.damping;
        }
    }

    #[test]
    fn test_roughness_encoding() {
        assert_approx_eq(encode_roughness(0.0625), 0.5, 1e-6);
        assert_approx_eq(decode_roughness(0.5), 0.0625, 1e-6);
        assert_approx_eq(decode_reflectivity(encode_reflectivity(0.3, 1.0 / 2.2), 2.2), 0.3, 1e-5);
    }
}
