use std::sync::{Arc, atomic::AtomicBool};

use tracing::debug;

use crate::{
    basis::{BasisResources, BasisWeightResources},
    error::{FitError, GpuError},
    gpu::{ColorFormat, Context, Framebuffer, FramebufferDesc, Program},
    optimization::{ConvergenceSummary, ErrorReport, ShaderBasedOptimization},
    settings::{RoughnessSettings, TextureResolution},
};

use super::{DAMPING_ERROR_ATTACHMENT, REFLECTIVITY_ATTACHMENT, ROUGHNESS_ATTACHMENT, RoughnessRefinement, shaders};

/// Levenberg-Marquardt refinement of the one-pass estimate. Each texel carries its own
/// damping factor in attachment 2 next to its current error; the driver's global damping
/// scale multiplies it.
pub struct DampedRefinement<C: Context> {
    optimization: ShaderBasedOptimization<C>,
    settings: RoughnessSettings,
}

impl<C: Context> DampedRefinement<C> {
    pub fn new(
        basis: &BasisResources<C>,
        diffuse: C::Texture,
        resolution: TextureResolution,
        settings: &RoughnessSettings,
    ) -> Result<Self, GpuError> {
        let framebuffer = FramebufferDesc::new(resolution.width, resolution.height)
            .add_color_attachment(ColorFormat::Rgb32F)
            .add_color_attachment(ColorFormat::Rgb32F)
            .add_color_attachment(ColorFormat::Rg32F);
        let program = shaders::program_desc(
            shaders::OPTIMIZE_ROUGHNESS,
            shaders::optimize_roughness::INTERFACE,
            basis.basis_count(),
            basis.resolution(),
        );

        let mut optimization = ShaderBasedOptimization::new(basis.context(), &program, &framebuffer, settings.damping)?;

        let program = optimization.program_mut();
        program.set_texture(shaders::BASIS_FUNCTIONS, basis.basis_functions())?;
        program.set_uniform(shaders::DAMPING_INCREASE, settings.damping.increase)?;
        program.set_uniform(shaders::DAMPING_DECREASE, settings.damping.decrease)?;

        optimization.add_setup_callback(move |setup| {
            // previous estimate in, cleared scratch out
            let program = &mut *setup.program;
            program.set_texture(shaders::DIFFUSE_MAP, &diffuse)?;
            program.set_texture(
                shaders::SPECULAR_ESTIMATE,
                &setup.front.color_attachment_texture(REFLECTIVITY_ATTACHMENT)?,
            )?;
            program.set_texture(shaders::ROUGHNESS_MAP, &setup.front.color_attachment_texture(ROUGHNESS_ATTACHMENT)?)?;
            program.set_texture(shaders::DAMPING_TEX, &setup.front.color_attachment_texture(DAMPING_ERROR_ATTACHMENT)?)?;
            program.set_uniform(shaders::DAMPING_SCALE, setup.damping_scale)?;

            for index in [REFLECTIVITY_ATTACHMENT, ROUGHNESS_ATTACHMENT, DAMPING_ERROR_ATTACHMENT] {
                setup.back.clear_color_buffer(index, [0.0; 4])?;
            }
            Ok(())
        });

        Ok(Self { optimization, settings: settings.clone() })
    }

    pub fn set_cancel_flag(&mut self, flag: Arc<AtomicBool>) {
        self.optimization.set_cancel_flag(flag);
    }

    pub fn optimization(&self) -> &ShaderBasedOptimization<C> {
        &self.optimization
    }
}

impl<C: Context> RoughnessRefinement<C> for DampedRefinement<C> {
    fn framebuffer(&self) -> Option<&C::Framebuffer> {
        Some(self.optimization.front_framebuffer())
    }

    fn initial_target(&mut self, _context: &C) -> Result<&mut C::Framebuffer, GpuError> {
        Ok(self.optimization.front_framebuffer_mut())
    }

    fn set_input_weights(&mut self, weights: &BasisWeightResources<C>) -> Result<(), GpuError> {
        let program = self.optimization.program_mut();
        program.set_texture(shaders::WEIGHT_MAPS, weights.weight_maps())?;
        program.set_texture(shaders::WEIGHT_MASK, weights.weight_mask())?;
        Ok(())
    }

    fn refine(&mut self, gamma: f32) -> Result<Option<ConvergenceSummary>, FitError> {
        // every texel starts at the initial damping with an unbounded error
        self.optimization
            .front_framebuffer_mut()
            .clear_color_buffer(DAMPING_ERROR_ATTACHMENT, [self.settings.damping.initial, f32::MAX, 0.0, 0.0])?;

        let program = self.optimization.program_mut();
        program.set_uniform(shaders::GAMMA, gamma)?;
        program.set_uniform(shaders::GAMMA_INV, 1.0 / gamma)?;

        debug!(
            tolerance = self.settings.convergence_tolerance,
            cap = self.settings.unsuccessful_iterations_allowed,
            "refining roughness"
        );
        let summary = self.optimization.run_until_convergence(
            |framebuffer| {
                let data = framebuffer.read_floating_point_rgba(DAMPING_ERROR_ATTACHMENT)?;
                Ok(ErrorReport::from_channel(&data, 1))
            },
            self.settings.convergence_tolerance,
            self.settings.iteration_cap(),
        )?;

        Ok(Some(summary))
    }
}
