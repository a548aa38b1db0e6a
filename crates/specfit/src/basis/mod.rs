mod resources;
mod weights;

pub use resources::{BasisResources, BasisWeightResources, create_rgb_texture};
pub use weights::BasisWeights;

use crate::error::FitError;

/// A fitted set of shared specular basis functions. Each has a red, green and blue
/// response curve over `resolution() + 1` half-angle samples and a diffuse color.
pub trait MaterialBasis {
    fn basis_count(&self) -> usize;

    /// Microfacet distribution resolution `M`; curves hold `M + 1` samples.
    fn resolution(&self) -> usize;

    fn evaluate_specular_red(&self, basis_index: usize, angle_index: usize) -> f64;

    fn evaluate_specular_green(&self, basis_index: usize, angle_index: usize) -> f64;

    fn evaluate_specular_blue(&self, basis_index: usize, angle_index: usize) -> f64;

    fn diffuse_color(&self, basis_index: usize) -> [f64; 3];

    fn evaluate_specular(&self, channel: usize, basis_index: usize, angle_index: usize) -> f64 {
        match channel {
            0 => self.evaluate_specular_red(basis_index, angle_index),
            1 => self.evaluate_specular_green(basis_index, angle_index),
            _ => self.evaluate_specular_blue(basis_index, angle_index),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimpleMaterialBasis {
    basis_count: usize,
    resolution: usize,
    // basis-major, `resolution + 1` samples per basis function
    specular: [Vec<f64>; 3],
    diffuse: Vec<[f64; 3]>,
}

impl SimpleMaterialBasis {
    pub fn new(
        basis_count: usize,
        resolution: usize,
        specular: [Vec<f64>; 3],
        diffuse: Vec<[f64; 3]>,
    ) -> Result<Self, FitError> {
        let expected = basis_count * (resolution + 1);
        for (channel, values) in specular.iter().enumerate() {
            if values.len() != expected {
                return Err(FitError::InvalidBasis(format!(
                    "channel {channel} has {} samples, expected {expected}",
                    values.len()
                )));
            }
        }
        if diffuse.len() != basis_count {
            return Err(FitError::InvalidBasis(format!(
                "{} diffuse colors for {basis_count} basis functions",
                diffuse.len()
            )));
        }
        Ok(Self { basis_count, resolution, specular, diffuse })
    }

    /// Builds a basis from per-function curves, `curves[b] = [red, green, blue]`.
    pub fn from_curves(curves: Vec<[Vec<f64>; 3]>, diffuse: Vec<[f64; 3]>) -> Result<Self, FitError> {
        let samples = curves.first().map(|c| c[0].len()).unwrap_or(1);
        if samples == 0 {
            return Err(FitError::InvalidBasis("empty specular curve".to_owned()));
        }

        let mut specular: [Vec<f64>; 3] = Default::default();
        for (b, curve) in curves.iter().enumerate() {
            for (channel, values) in curve.iter().enumerate() {
                if values.len() != samples {
                    return Err(FitError::InvalidBasis(format!(
                        "basis {b} channel {channel} has {} samples, expected {samples}",
                        values.len()
                    )));
                }
                specular[channel].extend_from_slice(values);
            }
        }

        Self::new(curves.len(), samples - 1, specular, diffuse)
    }

    fn sample(&self, channel: usize, basis_index: usize, angle_index: usize) -> f64 {
        self.specular[channel][basis_index * (self.resolution + 1) + angle_index]
    }
}

impl MaterialBasis for SimpleMaterialBasis {
    fn basis_count(&self) -> usize {
        self.basis_count
    }

    fn resolution(&self) -> usize {
        self.resolution
    }

    fn evaluate_specular_red(&self, basis_index: usize, angle_index: usize) -> f64 {
        self.sample(0, basis_index, angle_index)
    }

    fn evaluate_specular_green(&self, basis_index: usize, angle_index: usize) -> f64 {
        self.sample(1, basis_index, angle_index)
    }

    fn evaluate_specular_blue(&self, basis_index: usize, angle_index: usize) -> f64 {
        self.sample(2, basis_index, angle_index)
    }

    fn diffuse_color(&self, basis_index: usize) -> [f64; 3] {
        self.diffuse[basis_index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_curves() {
        let basis = SimpleMaterialBasis::from_curves(
            vec![
                [vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]],
                [vec![7.0, 8.0], vec![9.0, 10.0], vec![11.0, 12.0]],
            ],
            vec![[0.1, 0.2, 0.3], [0.4, 0.5, 0.6]],
        )
        .unwrap();

        assert_eq!(basis.basis_count(), 2);
        assert_eq!(basis.resolution(), 1);
        assert_eq!(basis.evaluate_specular_red(1, 0), 7.0);
        assert_eq!(basis.evaluate_specular_green(0, 1), 4.0);
        assert_eq!(basis.evaluate_specular(2, 1, 1), 12.0);
        assert_eq!(basis.diffuse_color(1), [0.4, 0.5, 0.6]);
    }

    #[test]
    fn test_mismatched_curves_rejected() {
        let result = SimpleMaterialBasis::from_curves(
            vec![[vec![1.0, 2.0], vec![3.0], vec![5.0, 6.0]]],
            vec![[0.0; 3]],
        );
        assert!(matches!(result, Err(FitError::InvalidBasis(_))));

        let result = SimpleMaterialBasis::new(2, 1, [vec![0.0; 4], vec![0.0; 4], vec![0.0; 4]], vec![[0.0; 3]]);
        assert!(matches!(result, Err(FitError::InvalidBasis(_))));
    }
}
