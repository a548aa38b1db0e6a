use super::LeastSquaresModel;

/// One view's worth of per-texel observations: an RGBA color (alpha is coverage) and the
/// tangent-space light direction it was lit from.
#[derive(Debug, Clone)]
pub struct LuminanceSamples {
    pub colors: Vec<[f32; 4]>,
    pub light_directions: Vec<[f32; 3]>,
}

impl LuminanceSamples {
    pub fn texel_count(&self) -> usize {
        self.colors.len()
    }
}

/// Quadratic polynomial texture map, `{1, u, v, w, uv, u² + v²}` in the light direction,
/// fit independently per texel and color channel. System `i` is texel `i % texel_count`,
/// channel `i / texel_count`.
#[derive(Debug, Clone, Copy)]
pub struct PolynomialTextureMapModel {
    texel_count: usize,
}

impl PolynomialTextureMapModel {
    pub const BASIS_FUNCTION_COUNT: usize = 6;

    pub fn new(width: u32, height: u32) -> Self {
        Self { texel_count: width as usize * height as usize }
    }

    pub fn system_count(&self) -> usize {
        self.texel_count * 3
    }

    fn split(&self, system_index: usize) -> (usize, usize) {
        (system_index % self.texel_count, system_index / self.texel_count)
    }
}

impl LeastSquaresModel<LuminanceSamples, f64> for PolynomialTextureMapModel {
    fn is_valid(&self, samples: &LuminanceSamples, system_index: usize) -> bool {
        let (texel, _) = self.split(system_index);
        let color = samples.colors[texel];
        color[3] >= 1.0 && !color[..3].iter().any(|c| c.is_nan())
    }

    fn sample_weight(&self, _samples: &LuminanceSamples, _system_index: usize) -> f64 {
        0.5
    }

    fn samples(&self, samples: &LuminanceSamples, system_index: usize) -> f64 {
        let (texel, channel) = self.split(system_index);
        samples.colors[texel][channel] as f64
    }

    fn basis_function_count(&self) -> usize {
        Self::BASIS_FUNCTION_COUNT
    }

    fn basis_functions(&self, samples: &LuminanceSamples, system_index: usize) -> impl Fn(usize) -> f64 {
        let (texel, _) = self.split(system_index);
        let [u, v, w] = samples.light_directions[texel].map(f64::from);
        move |b| match b {
            0 => 1.0,
            1 => u,
            2 => v,
            3 => w,
            4 => u * v,
            5 => u * u + v * v,
            _ => 0.0,
        }
    }

    fn inner_product(&self, a: &f64, b: &f64) -> f64 {
        a * b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::least_squares::LeastSquaresMatrixBuilder;

    fn light(i: usize) -> [f32; 3] {
        let theta = i as f32 * 0.7;
        let radius = 0.04 * i as f32;
        let u = radius * theta.cos();
        let v = radius * theta.sin();
        [u, v, (1.0 - u * u - v * v).sqrt()]
    }

    #[test]
    fn test_recovers_polynomial() {
        let coefficients = [0.1, 0.2, -0.1, 0.3, 0.05, -0.2];
        let model = PolynomialTextureMapModel::new(1, 1);

        let bundles: Vec<LuminanceSamples> = (0..24)
            .map(|i| {
                let l = light(i);
                let probe = LuminanceSamples { colors: vec![[0.0; 4]], light_directions: vec![l] };
                let f = model.basis_functions(&probe, 0);
                let value: f64 = coefficients.iter().enumerate().map(|(b, c)| c * f(b)).sum();
                let value = value as f32;
                LuminanceSamples {
                    colors: vec![[value, value, value, if i == 3 { 0.0 } else { 1.0 }]],
                    light_directions: vec![l],
                }
            })
            .collect();

        let mut builder = LeastSquaresMatrixBuilder::new(model.system_count(), model.basis_function_count());
        builder.build_matrices(bundles, &model, |_| {});

        for channel in 0..3 {
            assert_eq!(builder.sample_count(channel), 23);
            let solution = builder.solve(channel).unwrap();
            for (b, c) in coefficients.iter().enumerate() {
                assert!((solution[b] - c).abs() < 1e-2, "channel {channel} basis {b}: {}", solution[b]);
            }
        }
    }

    #[test]
    fn test_nan_sample_is_invalid() {
        let model = PolynomialTextureMapModel::new(2, 1);
        let samples = LuminanceSamples {
            colors: vec![[0.5, f32::NAN, 0.5, 1.0], [0.5, 0.5, 0.5, 1.0]],
            light_directions: vec![[0.0, 0.0, 1.0]; 2],
        };
        assert!(!model.is_valid(&samples, 0));
        assert!(!model.is_valid(&samples, 2));
        assert!(model.is_valid(&samples, 1));
        assert!(model.is_valid(&samples, 5));
    }
}
