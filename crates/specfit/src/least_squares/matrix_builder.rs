use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use tracing::debug;

use super::LeastSquaresModel;

/// `coefficients · w = rhs`, appended to every system with a Lagrange multiplier.
#[derive(Debug, Clone)]
pub struct LinearConstraint {
    pub coefficients: Vec<f64>,
    pub rhs: f64,
}

/// Accumulates the normal equations `AᵀA w = Aᵀb` for many independent systems at once.
pub struct LeastSquaresMatrixBuilder {
    system_count: usize,
    weight_count: usize,
    constraints: Vec<LinearConstraint>,
    ata: Vec<DMatrix<f64>>,
    atb: Vec<DVector<f64>>,
    sample_counts: Vec<usize>,
}

impl LeastSquaresMatrixBuilder {
    pub fn new(system_count: usize, weight_count: usize) -> Self {
        Self::with_constraints(system_count, weight_count, Vec::new())
    }

    pub fn with_constraints(system_count: usize, weight_count: usize, constraints: Vec<LinearConstraint>) -> Self {
        Self {
            system_count,
            weight_count,
            constraints,
            ata: vec![DMatrix::zeros(weight_count, weight_count); system_count],
            atb: vec![DVector::zeros(weight_count); system_count],
            sample_counts: vec![0; system_count],
        }
    }

    pub fn system_count(&self) -> usize {
        self.system_count
    }

    pub fn weight_count(&self) -> usize {
        self.weight_count
    }

    /// Accumulates one row per valid system for every bundle. `sample_validator` is
    /// called once for each valid (bundle, system) pair.
    pub fn build_matrices<S, T, M, I, V>(&mut self, bundles: I, model: &M, mut sample_validator: V)
    where
        S: Sync,
        M: LeastSquaresModel<S, T> + Sync,
        I: IntoIterator<Item = S>,
        V: FnMut(usize),
    {
        let weight_count = self.weight_count;
        let mut bundle_count = 0;

        for bundle in bundles {
            let valid: Vec<bool> = (0..self.system_count)
                .into_par_iter()
                .map(|p| model.is_valid(&bundle, p))
                .collect();

            self.ata
                .par_iter_mut()
                .zip(self.atb.par_iter_mut())
                .zip(self.sample_counts.par_iter_mut())
                .enumerate()
                .filter(|(p, _)| valid[*p])
                .for_each(|(p, ((ata, atb), count))| {
                    let weight = model.sample_weight(&bundle, p);
                    let actual = model.samples(&bundle, p);
                    let basis = model.basis_functions(&bundle, p);
                    let evaluated: Vec<T> = (0..weight_count).map(&basis).collect();

                    for i in 0..weight_count {
                        for j in 0..weight_count {
                            ata[(i, j)] += weight * model.inner_product(&evaluated[i], &evaluated[j]);
                        }
                        atb[i] += weight * model.inner_product(&evaluated[i], &actual);
                    }
                    *count += 1;
                });

            for (p, _) in valid.iter().enumerate().filter(|(_, v)| **v) {
                sample_validator(p);
            }
            bundle_count += 1;
        }

        debug!(bundle_count, systems = self.system_count, "built least squares matrices");
    }

    pub fn normal_matrix(&self, system: usize) -> &DMatrix<f64> {
        &self.ata[system]
    }

    pub fn normal_rhs(&self, system: usize) -> &DVector<f64> {
        &self.atb[system]
    }

    pub fn sample_count(&self, system: usize) -> usize {
        self.sample_counts[system]
    }

    /// Solves one system, including any constraints. Returns `None` if the system never
    /// received a valid sample or is singular.
    pub fn solve(&self, system: usize) -> Option<DVector<f64>> {
        if self.sample_counts[system] == 0 {
            return None;
        }

        let n = self.weight_count;
        let size = n + self.constraints.len();
        let mut matrix = DMatrix::zeros(size, size);
        let mut rhs = DVector::zeros(size);

        matrix.view_mut((0, 0), (n, n)).copy_from(&self.ata[system]);
        rhs.rows_mut(0, n).copy_from(&self.atb[system]);

        for (k, constraint) in self.constraints.iter().enumerate() {
            for (b, c) in constraint.coefficients.iter().take(n).enumerate() {
                matrix[(b, n + k)] = *c;
                matrix[(n + k, b)] = *c;
            }
            rhs[n + k] = constraint.rhs;
        }

        matrix.lu().solve(&rhs).map(|solution| solution.rows(0, n).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Rows are `y = a + b x`; each bundle holds one (x, y, valid) triple per system.
    struct LineModel {
        evaluated_invalid: AtomicUsize,
    }

    type Bundle = Vec<(f64, f64, bool)>;

    impl LeastSquaresModel<Bundle, f64> for LineModel {
        fn is_valid(&self, samples: &Bundle, system_index: usize) -> bool {
            samples[system_index].2
        }

        fn sample_weight(&self, _samples: &Bundle, _system_index: usize) -> f64 {
            1.0
        }

        fn samples(&self, samples: &Bundle, system_index: usize) -> f64 {
            if !samples[system_index].2 {
                self.evaluated_invalid.fetch_add(1, Ordering::Relaxed);
            }
            samples[system_index].1
        }

        fn basis_function_count(&self) -> usize {
            2
        }

        fn basis_functions(&self, samples: &Bundle, system_index: usize) -> impl Fn(usize) -> f64 {
            let x = samples[system_index].0;
            move |b| if b == 0 { 1.0 } else { x }
        }

        fn inner_product(&self, a: &f64, b: &f64) -> f64 {
            a * b
        }
    }

    fn assert_approx_eq(a: f64, b: f64, eps: f64) {
        assert!((a - b).abs() < eps, "{a} != {b}");
    }

    #[test]
    fn test_invalid_rows_are_excluded() {
        // y = 1 + 2x, with two wildly wrong samples marked invalid
        let rows: Vec<(f64, f64, bool)> = vec![
            (0.0, 1.0, true),
            (1.0, 3.0, true),
            (2.0, 100.0, false),
            (3.0, 7.0, true),
            (4.0, -50.0, false),
            (5.0, 11.0, true),
        ];
        let with_invalid: Vec<Bundle> = rows.iter().map(|r| vec![*r]).collect();
        let without_invalid: Vec<Bundle> = rows.iter().filter(|r| r.2).map(|r| vec![*r]).collect();

        let model = LineModel { evaluated_invalid: AtomicUsize::new(0) };

        let mut validated = 0;
        let mut a = LeastSquaresMatrixBuilder::new(1, 2);
        a.build_matrices(with_invalid, &model, |_| validated += 1);
        let mut b = LeastSquaresMatrixBuilder::new(1, 2);
        b.build_matrices(without_invalid, &model, |_| {});

        assert_eq!(validated, 4);
        assert_eq!(a.sample_count(0), 4);
        assert_eq!(model.evaluated_invalid.load(Ordering::Relaxed), 0);
        assert_eq!(a.normal_matrix(0), b.normal_matrix(0));
        assert_eq!(a.normal_rhs(0), b.normal_rhs(0));

        let solution = a.solve(0).unwrap();
        assert_approx_eq(solution[0], 1.0, 1e-9);
        assert_approx_eq(solution[1], 2.0, 1e-9);
    }

    #[test]
    fn test_system_without_samples_has_no_solution() {
        let model = LineModel { evaluated_invalid: AtomicUsize::new(0) };
        let mut builder = LeastSquaresMatrixBuilder::new(2, 2);
        builder.build_matrices(
            vec![vec![(0.0, 1.0, true), (0.0, 0.0, false)], vec![(1.0, 2.0, true), (1.0, 0.0, false)]],
            &model,
            |_| {},
        );
        assert!(builder.solve(0).is_some());
        assert!(builder.solve(1).is_none());
    }

    #[test]
    fn test_constraint_is_honored() {
        // least squares would give a = b = 1; force a + b = 3
        let model = LineModel { evaluated_invalid: AtomicUsize::new(0) };
        let mut builder = LeastSquaresMatrixBuilder::with_constraints(
            1,
            2,
            vec![LinearConstraint { coefficients: vec![1.0, 1.0], rhs: 3.0 }],
        );
        let bundles: Vec<Bundle> = (0..4).map(|x| vec![(x as f64, 1.0 + x as f64, true)]).collect();
        builder.build_matrices(bundles, &model, |_| {});

        let solution = builder.solve(0).unwrap();
        assert_approx_eq(solution[0] + solution[1], 3.0, 1e-9);
    }
}
