use crate::settings::DampingSchedule;

const MIN_DAMPING_SCALE: f32 = 1e-6;
const MAX_DAMPING_SCALE: f32 = 1e6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Accepted { converged: bool },
    Rejected { exhausted: bool },
}

/// Decides whether each new error is accepted and when the loop stops.
///
/// Any improvement over the best error so far is accepted; an accepted step that improves
/// by no more than `tolerance` ends the loop. Steps that do not improve (including NaN)
/// are rejected, and `max_unsuccessful` consecutive rejections end the loop.
#[derive(Debug, Clone)]
pub struct ConvergenceTracker {
    tolerance: f64,
    max_unsuccessful: u32,
    best: f64,
    unsuccessful: u32,
}

impl ConvergenceTracker {
    pub fn new(tolerance: f64, max_unsuccessful: u32, initial_error: f64) -> Self {
        Self {
            tolerance,
            max_unsuccessful: max_unsuccessful.max(1),
            best: if initial_error.is_nan() { f64::INFINITY } else { initial_error },
            unsuccessful: 0,
        }
    }

    pub fn best_error(&self) -> f64 {
        self.best
    }

    pub fn unsuccessful_iterations(&self) -> u32 {
        self.unsuccessful
    }

    pub fn improves(&self, error: f64) -> bool {
        error < self.best
    }

    pub fn observe(&mut self, error: f64) -> StepOutcome {
        if self.improves(error) {
            let improvement = self.best - error;
            self.best = error;
            self.unsuccessful = 0;
            StepOutcome::Accepted { converged: improvement <= self.tolerance }
        } else {
            self.unsuccessful += 1;
            StepOutcome::Rejected { exhausted: self.unsuccessful >= self.max_unsuccessful }
        }
    }
}

/// Global multiplier on the per-pixel damping, adjusted after every step.
#[derive(Debug, Clone, Copy)]
pub struct DampingController {
    schedule: DampingSchedule,
    scale: f32,
}

impl DampingController {
    pub fn new(schedule: DampingSchedule) -> Self {
        Self { schedule, scale: 1.0 }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn accepted(&mut self) {
        self.scale = (self.scale * self.schedule.decrease).max(MIN_DAMPING_SCALE);
    }

    pub fn rejected(&mut self) {
        self.scale = (self.scale * self.schedule.increase).min(MAX_DAMPING_SCALE);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceOutcome {
    Converged,
    Exhausted,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergenceSummary {
    pub iterations: u32,
    pub accepted: u32,
    pub rejected: u32,
    pub final_error: f64,
    pub outcome: ConvergenceOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_finite_error_is_accepted() {
        let mut tracker = ConvergenceTracker::new(1e-3, 3, f64::INFINITY);
        assert_eq!(tracker.observe(10.0), StepOutcome::Accepted { converged: false });
        assert_eq!(tracker.best_error(), 10.0);
    }

    #[test]
    fn test_small_improvement_converges() {
        let mut tracker = ConvergenceTracker::new(1e-3, 3, 1.0);
        assert_eq!(tracker.observe(0.9995), StepOutcome::Accepted { converged: true });
        assert_eq!(tracker.best_error(), 0.9995);
    }

    #[test]
    fn test_rejections_exhaust() {
        let mut tracker = ConvergenceTracker::new(1e-3, 2, 1.0);
        assert_eq!(tracker.observe(1.0), StepOutcome::Rejected { exhausted: false });
        assert_eq!(tracker.observe(0.5), StepOutcome::Accepted { converged: false });
        assert_eq!(tracker.unsuccessful_iterations(), 0);
        assert_eq!(tracker.observe(f64::NAN), StepOutcome::Rejected { exhausted: false });
        assert_eq!(tracker.observe(2.0), StepOutcome::Rejected { exhausted: true });
        assert_eq!(tracker.unsuccessful_iterations(), 2);
        assert_eq!(tracker.best_error(), 0.5);
    }

    #[test]
    fn test_nan_baseline_and_zero_cap() {
        let mut tracker = ConvergenceTracker::new(0.0, 0, f64::NAN);
        assert_eq!(tracker.best_error(), f64::INFINITY);
        assert_eq!(tracker.observe(f64::INFINITY), StepOutcome::Rejected { exhausted: true });
    }

    #[test]
    fn test_damping_controller() {
        let mut damping = DampingController::new(DampingSchedule::default());
        damping.accepted();
        assert_eq!(damping.scale(), 0.5);
        damping.rejected();
        damping.rejected();
        assert_eq!(damping.scale(), 2.0);
        for _ in 0..100 {
            damping.rejected();
        }
        assert_eq!(damping.scale(), MAX_DAMPING_SCALE);
    }
}
