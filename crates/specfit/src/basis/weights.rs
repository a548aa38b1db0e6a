use super::MaterialBasis;

/// Per-texel weights over the basis functions, with a validity flag per texel.
#[derive(Debug, Clone, PartialEq)]
pub struct BasisWeights {
    width: u32,
    height: u32,
    basis_count: usize,
    // texel-major: texel p holds weights[p * basis_count..(p + 1) * basis_count]
    weights: Vec<f32>,
    valid: Vec<bool>,
}

impl BasisWeights {
    /// All weights zero, all texels invalid.
    pub fn new(width: u32, height: u32, basis_count: usize) -> Self {
        let texels = width as usize * height as usize;
        Self {
            width,
            height,
            basis_count,
            weights: vec![0.0; texels * basis_count],
            valid: vec![false; texels],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn basis_count(&self) -> usize {
        self.basis_count
    }

    pub fn texel_count(&self) -> usize {
        self.valid.len()
    }

    pub fn weight(&self, texel: usize, basis_index: usize) -> f32 {
        self.weights[texel * self.basis_count + basis_index]
    }

    pub fn set_weight(&mut self, texel: usize, basis_index: usize, value: f32) {
        self.weights[texel * self.basis_count + basis_index] = value;
    }

    pub fn weights(&self, texel: usize) -> &[f32] {
        &self.weights[texel * self.basis_count..(texel + 1) * self.basis_count]
    }

    pub fn set_weights(&mut self, texel: usize, values: &[f32]) {
        self.weights[texel * self.basis_count..(texel + 1) * self.basis_count].copy_from_slice(values);
        self.valid[texel] = true;
    }

    pub fn is_valid(&self, texel: usize) -> bool {
        self.valid[texel]
    }

    pub fn set_valid(&mut self, texel: usize, valid: bool) {
        self.valid[texel] = valid;
    }

    /// Fills invalid texels with the average of their valid 4-neighbours, repeating until
    /// nothing changes (at most `max(width, height)` passes). Neighbours wrap around in
    /// flattened texel order.
    pub fn fill_holes(&mut self) -> usize {
        let texels = self.texel_count();
        let width = self.width as usize;
        let mut total = 0;

        for _ in 0..self.width.max(self.height) {
            let mut filled = Vec::new();

            for p in (0..texels).filter(|p| !self.valid[*p]) {
                let neighbours = [
                    (texels + p - 1) % texels,
                    (p + 1) % texels,
                    (texels + p - width % texels) % texels,
                    (p + width) % texels,
                ];
                let valid: Vec<usize> = neighbours.into_iter().filter(|n| self.valid[*n]).collect();
                if valid.is_empty() {
                    continue;
                }

                let average: Vec<f32> = (0..self.basis_count)
                    .map(|b| valid.iter().map(|n| self.weight(*n, b)).sum::<f32>() / valid.len() as f32)
                    .collect();
                filled.push((p, average));
            }

            if filled.is_empty() {
                break;
            }
            total += filled.len();
            for (p, average) in filled {
                self.set_weights(p, &average);
            }
        }

        total
    }

    /// Per-texel diffuse color `Σ_b w_b · diffuse_b`; invalid texels are black.
    pub fn diffuse_albedo(&self, basis: &impl MaterialBasis) -> Vec<[f32; 3]> {
        (0..self.texel_count())
            .map(|p| {
                if !self.valid[p] {
                    return [0.0; 3];
                }
                let mut color = [0.0f64; 3];
                for (b, w) in self.weights(p).iter().enumerate() {
                    let diffuse = basis.diffuse_color(b);
                    for c in 0..3 {
                        color[c] += *w as f64 * diffuse[c];
                    }
                }
                color.map(|c| c as f32)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::SimpleMaterialBasis;

    #[test]
    fn test_fill_holes() {
        // 3x1 strip with only the middle texel valid
        let mut weights = BasisWeights::new(3, 1, 2);
        weights.set_weights(1, &[0.25, 0.75]);

        let filled = weights.fill_holes();
        assert_eq!(filled, 2);
        for p in 0..3 {
            assert!(weights.is_valid(p));
            assert_eq!(weights.weights(p), &[0.25, 0.75]);
        }
    }

    #[test]
    fn test_fill_holes_spreads_over_passes() {
        let mut weights = BasisWeights::new(5, 5, 1);
        weights.set_weights(12, &[1.0]);

        weights.fill_holes();
        assert!((0..25).all(|p| weights.is_valid(p)));
        assert!((0..25).all(|p| (weights.weight(p, 0) - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_fill_holes_without_valid_texels() {
        let mut weights = BasisWeights::new(4, 4, 3);
        assert_eq!(weights.fill_holes(), 0);
        assert!(!weights.is_valid(0));
    }

    #[test]
    fn test_diffuse_albedo() {
        let basis = SimpleMaterialBasis::from_curves(
            vec![[vec![0.0], vec![0.0], vec![0.0]], [vec![0.0], vec![0.0], vec![0.0]]],
            vec![[1.0, 0.0, 0.0], [0.0, 0.5, 1.0]],
        )
        .unwrap();
        let mut weights = BasisWeights::new(2, 1, 2);
        weights.set_weights(0, &[0.5, 0.5]);

        let albedo = weights.diffuse_albedo(&basis);
        assert_eq!(albedo[0], [0.5, 0.25, 0.5]);
        assert_eq!(albedo[1], [0.0; 3]);
    }
}
