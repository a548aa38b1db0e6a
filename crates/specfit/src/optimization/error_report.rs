use rayon::prelude::*;

/// Aggregate squared error of one candidate state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorReport {
    pub error: f64,
    pub sample_count: usize,
}

impl ErrorReport {
    pub fn new(error: f64, sample_count: usize) -> Self {
        Self { error, sample_count }
    }

    /// Sums one channel of an RGBA readback.
    pub fn from_channel(rgba: &[f32], channel: usize) -> Self {
        let error = rgba.par_chunks_exact(4).map(|texel| texel[channel] as f64).sum();
        Self { error, sample_count: rgba.len() / 4 }
    }

    pub fn rmse(&self) -> f64 {
        if self.sample_count == 0 {
            0.0
        } else {
            (self.error / self.sample_count as f64).sqrt()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_channel() {
        let data = [1.0, 2.0, 0.0, 1.0, 3.0, 6.0, 0.0, 1.0];
        let report = ErrorReport::from_channel(&data, 1);
        assert_eq!(report.error, 8.0);
        assert_eq!(report.sample_count, 2);
        assert_eq!(report.rmse(), 2.0);
        assert_eq!(ErrorReport::from_channel(&[], 1).rmse(), 0.0);
    }
}
