use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tracing::{debug, info, info_span};

use crate::{
    error::GpuError,
    gpu::{Context, Drawable, FramebufferDesc, ProgramDesc},
    settings::DampingSchedule,
};

use super::{
    ConvergenceOutcome, ConvergenceSummary, ConvergenceTracker, DampingController, DoubleBuffer, ErrorReport,
    StepOutcome,
};

/// Handed to setup callbacks before every render: the program about to be drawn, the
/// accepted state to read from, and the scratch state to be drawn into.
pub struct SetupContext<'a, C: Context> {
    pub program: &'a mut C::Program,
    pub front: &'a C::Framebuffer,
    pub back: &'a mut C::Framebuffer,
    pub damping_scale: f32,
}

type SetupCallback<C> = Box<dyn FnMut(&mut SetupContext<'_, C>) -> Result<(), GpuError>>;
type PostUpdateCallback<C> = Box<dyn FnMut(&<C as Context>::Framebuffer)>;

/// Double-buffered optimization where each step is a full-screen draw. Every iteration
/// renders a candidate into the back framebuffer from the front one and keeps it only if
/// its error improves on the best so far.
pub struct ShaderBasedOptimization<C: Context> {
    drawable: C::Drawable,
    buffers: DoubleBuffer<C::Framebuffer>,
    setup_callbacks: Vec<SetupCallback<C>>,
    post_update_callbacks: Vec<PostUpdateCallback<C>>,
    damping: DampingController,
    cancel: Option<Arc<AtomicBool>>,
}

impl<C: Context> ShaderBasedOptimization<C> {
    pub fn new(
        context: &C,
        program: &ProgramDesc,
        framebuffer: &FramebufferDesc,
        damping: DampingSchedule,
    ) -> Result<Self, GpuError> {
        let program = context.compile_program(program)?;
        let front = context.create_framebuffer(framebuffer)?;
        let back = context.create_framebuffer(framebuffer)?;
        let drawable = context.create_full_screen_quad(program)?;

        Ok(Self {
            drawable,
            buffers: DoubleBuffer::new(front, back),
            setup_callbacks: Vec::new(),
            post_update_callbacks: Vec::new(),
            damping: DampingController::new(damping),
            cancel: None,
        })
    }

    pub fn add_setup_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&mut SetupContext<'_, C>) -> Result<(), GpuError> + 'static,
    {
        self.setup_callbacks.push(Box::new(callback));
    }

    pub fn add_post_update_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&C::Framebuffer) + 'static,
    {
        self.post_update_callbacks.push(Box::new(callback));
    }

    /// Checked between iterations; a set flag stops the loop before the next render.
    pub fn set_cancel_flag(&mut self, flag: Arc<AtomicBool>) {
        self.cancel = Some(flag);
    }

    pub fn front_framebuffer(&self) -> &C::Framebuffer {
        self.buffers.front()
    }

    pub fn front_framebuffer_mut(&mut self) -> &mut C::Framebuffer {
        self.buffers.front_mut()
    }

    pub fn back_framebuffer(&self) -> &C::Framebuffer {
        self.buffers.back()
    }

    pub fn program_mut(&mut self) -> &mut C::Program {
        self.drawable.program_mut()
    }

    pub fn damping_scale(&self) -> f32 {
        self.damping.scale()
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn render(&mut self) -> Result<(), GpuError> {
        let damping_scale = self.damping.scale();
        let (front, back) = self.buffers.split_mut();
        {
            let mut setup = SetupContext::<C> {
                program: self.drawable.program_mut(),
                front,
                back: &mut *back,
                damping_scale,
            };
            for callback in self.setup_callbacks.iter_mut() {
                callback(&mut setup)?;
            }
        }
        self.drawable.draw(back)
    }

    fn accept(&mut self) {
        self.buffers.swap();
        for callback in self.post_update_callbacks.iter_mut() {
            callback(self.buffers.front());
        }
    }

    /// Renders a new state and makes it the front unconditionally.
    pub fn run_once(&mut self) -> Result<(), GpuError> {
        self.render()?;
        self.accept();
        Ok(())
    }

    /// Renders a candidate and keeps it only if its error is below `best_error`.
    pub fn run_once_with_error<F>(&mut self, evaluate: &mut F, best_error: f64) -> Result<(ErrorReport, bool), GpuError>
    where
        F: FnMut(&C::Framebuffer) -> Result<ErrorReport, GpuError>,
    {
        self.render()?;
        let report = evaluate(self.buffers.back())?;

        let accepted = report.error < best_error;
        if accepted {
            self.accept();
            self.damping.accepted();
        } else {
            self.damping.rejected();
        }
        Ok((report, accepted))
    }

    /// Iterates until an accepted step improves by no more than `tolerance`, or until
    /// `max_unsuccessful` consecutive steps fail to improve. The starting error is taken
    /// from the current front framebuffer.
    pub fn run_until_convergence<F>(
        &mut self,
        mut evaluate: F,
        tolerance: f64,
        max_unsuccessful: u32,
    ) -> Result<ConvergenceSummary, GpuError>
    where
        F: FnMut(&C::Framebuffer) -> Result<ErrorReport, GpuError>,
    {
        let _span = info_span!("run_until_convergence").entered();

        let baseline = evaluate(self.buffers.front())?;
        let mut tracker = ConvergenceTracker::new(tolerance, max_unsuccessful, baseline.error);
        let mut summary = ConvergenceSummary {
            iterations: 0,
            accepted: 0,
            rejected: 0,
            final_error: tracker.best_error(),
            outcome: ConvergenceOutcome::Exhausted,
        };

        loop {
            if self.is_cancelled() {
                summary.outcome = ConvergenceOutcome::Cancelled;
                break;
            }

            let (report, _) = self.run_once_with_error(&mut evaluate, tracker.best_error())?;
            summary.iterations += 1;

            match tracker.observe(report.error) {
                StepOutcome::Accepted { converged } => {
                    summary.accepted += 1;
                    debug!(
                        iteration = summary.iterations,
                        error = report.error,
                        rmse = report.rmse(),
                        damping_scale = self.damping.scale(),
                        "accepted"
                    );
                    if converged {
                        summary.outcome = ConvergenceOutcome::Converged;
                        break;
                    }
                }
                StepOutcome::Rejected { exhausted } => {
                    summary.rejected += 1;
                    debug!(
                        iteration = summary.iterations,
                        error = report.error,
                        unsuccessful = tracker.unsuccessful_iterations(),
                        damping_scale = self.damping.scale(),
                        "rejected"
                    );
                    if exhausted {
                        summary.outcome = ConvergenceOutcome::Exhausted;
                        break;
                    }
                }
            }
        }

        summary.final_error = tracker.best_error();
        info!(
            iterations = summary.iterations,
            accepted = summary.accepted,
            final_error = summary.final_error,
            outcome = ?summary.outcome,
            "optimization finished"
        );
        Ok(summary)
    }

    /// Drops the scratch framebuffer and the program, keeping the accepted state.
    pub fn finish(self) -> C::Framebuffer {
        self.buffers.into_front()
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::gpu::{ColorFormat, Framebuffer, Program, ShaderInterface, TextureDesc};

    static INTERFACE: ShaderInterface = ShaderInterface { uniforms: &[], textures: &[], outputs: 1 };

    /// Each framebuffer remembers which draw last wrote it.
    #[derive(Clone)]
    struct MockContext {
        draws: Rc<RefCell<u32>>,
    }

    struct MockFramebuffer {
        desc: FramebufferDesc,
        written_by: u32,
    }

    struct MockProgram;

    struct MockDrawable {
        program: MockProgram,
        draws: Rc<RefCell<u32>>,
    }

    impl Framebuffer for MockFramebuffer {
        type Texture = ();

        fn desc(&self) -> &FramebufferDesc {
            &self.desc
        }

        fn clear_color_buffer(&mut self, _index: usize, _rgba: [f32; 4]) -> Result<(), GpuError> {
            Ok(())
        }

        fn color_attachment_texture(&self, _index: usize) -> Result<(), GpuError> {
            Ok(())
        }

        fn read_floating_point_rgba(&self, _index: usize) -> Result<Vec<f32>, GpuError> {
            Ok(vec![self.written_by as f32, 0.0, 0.0, 1.0])
        }

        fn blit_color_attachment(&mut self, _index: usize, _source: &()) -> Result<(), GpuError> {
            Ok(())
        }
    }

    impl Program for MockProgram {
        type Texture = ();

        fn interface(&self) -> &ShaderInterface {
            &INTERFACE
        }

        fn set_uniform(&mut self, _name: &str, _value: f32) -> Result<(), GpuError> {
            Ok(())
        }

        fn set_texture(&mut self, _name: &str, _texture: &()) -> Result<(), GpuError> {
            Ok(())
        }
    }

    impl Drawable for MockDrawable {
        type Program = MockProgram;
        type Framebuffer = MockFramebuffer;

        fn program(&self) -> &MockProgram {
            &self.program
        }

        fn program_mut(&mut self) -> &mut MockProgram {
            &mut self.program
        }

        fn draw(&self, framebuffer: &mut MockFramebuffer) -> Result<(), GpuError> {
            *self.draws.borrow_mut() += 1;
            framebuffer.written_by = *self.draws.borrow();
            Ok(())
        }
    }

    impl Context for MockContext {
        type Texture = ();
        type Framebuffer = MockFramebuffer;
        type Program = MockProgram;
        type Drawable = MockDrawable;

        fn create_texture(&self, _desc: &TextureDesc, _data: &[f32]) -> Result<(), GpuError> {
            Ok(())
        }

        fn create_framebuffer(&self, desc: &FramebufferDesc) -> Result<MockFramebuffer, GpuError> {
            desc.validate()?;
            Ok(MockFramebuffer { desc: desc.clone(), written_by: 0 })
        }

        fn compile_program(&self, _desc: &ProgramDesc) -> Result<MockProgram, GpuError> {
            Ok(MockProgram)
        }

        fn create_full_screen_quad(&self, program: MockProgram) -> Result<MockDrawable, GpuError> {
            Ok(MockDrawable { program, draws: self.draws.clone() })
        }
    }

    fn optimization() -> ShaderBasedOptimization<MockContext> {
        let context = MockContext { draws: Rc::new(RefCell::new(0)) };
        ShaderBasedOptimization::new(
            &context,
            &ProgramDesc::new("vertex", "fragment", INTERFACE),
            &FramebufferDesc::new(1, 1).add_color_attachment(ColorFormat::R32F),
            DampingSchedule::default(),
        )
        .unwrap()
    }

    /// Yields the given errors in order, repeating the last one forever.
    fn sequence(errors: Vec<f64>) -> impl FnMut(&MockFramebuffer) -> Result<ErrorReport, GpuError> {
        let mut index = 0;
        move |_: &MockFramebuffer| {
            let error = errors[index.min(errors.len() - 1)];
            index += 1;
            Ok(ErrorReport::new(error, 1))
        }
    }

    #[test]
    fn test_constant_error_exhausts_after_cap() {
        let mut optimization = optimization();
        let summary = optimization.run_until_convergence(sequence(vec![1.0]), 1e-6, 5).unwrap();

        assert_eq!(summary.iterations, 5);
        assert_eq!(summary.accepted, 0);
        assert_eq!(summary.outcome, ConvergenceOutcome::Exhausted);
        assert_eq!(optimization.front_framebuffer().written_by, 0);
    }

    #[test]
    fn test_decreasing_error_converges() {
        let errors: Vec<f64> = (0..40).map(|k| 1.0 + 0.5f64.powi(k)).collect();
        let mut optimization = optimization();
        let summary = optimization.run_until_convergence(sequence(errors), 1e-3, 3).unwrap();

        // improvement at iteration i is 0.5^i, first <= 1e-3 at i = 10
        assert_eq!(summary.iterations, 10);
        assert_eq!(summary.accepted, 10);
        assert_eq!(summary.outcome, ConvergenceOutcome::Converged);
        assert_eq!(optimization.front_framebuffer().written_by, 10);
    }

    #[test]
    fn test_rejected_steps_keep_front() {
        let mut optimization = optimization();
        let scales = Rc::new(RefCell::new(Vec::new()));
        let recorded = scales.clone();
        optimization.add_setup_callback(move |setup| {
            recorded.borrow_mut().push(setup.damping_scale);
            Ok(())
        });
        let updates = Rc::new(RefCell::new(Vec::new()));
        let seen = updates.clone();
        optimization.add_post_update_callback(move |front| seen.borrow_mut().push(front.written_by));

        let summary = optimization
            .run_until_convergence(sequence(vec![5.0, 4.0, 6.0, 3.0, 3.0]), 1e-6, 2)
            .unwrap();

        assert_eq!(summary.iterations, 5);
        assert_eq!(summary.accepted, 2);
        assert_eq!(summary.rejected, 3);
        assert_eq!(summary.final_error, 3.0);
        assert_eq!(optimization.front_framebuffer().written_by, 3);
        assert_eq!(*updates.borrow(), vec![1, 3]);
        assert_eq!(*scales.borrow(), vec![1.0, 0.5, 1.0, 0.5, 1.0]);
        assert_eq!(optimization.damping_scale(), 2.0);
        assert_eq!(optimization.finish().written_by, 3);
    }

    #[test]
    fn test_cancel_before_first_iteration() {
        let mut optimization = optimization();
        let flag = Arc::new(AtomicBool::new(true));
        optimization.set_cancel_flag(flag);

        let summary = optimization.run_until_convergence(sequence(vec![1.0, 0.5]), 1e-6, 3).unwrap();
        assert_eq!(summary.iterations, 0);
        assert_eq!(summary.outcome, ConvergenceOutcome::Cancelled);
    }

    #[test]
    fn test_run_once_always_swaps() {
        let mut optimization = optimization();
        optimization.run_once().unwrap();
        assert_eq!(optimization.front_framebuffer().written_by, 1);
        assert_eq!(optimization.back_framebuffer().written_by, 0);
    }
}
