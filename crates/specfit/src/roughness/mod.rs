//! Per-texel specular reflectivity and roughness from the basis decomposition.
//!
//! [`RoughnessOptimizer`] owns the one-pass estimate shared by every fit and delegates
//! what happens after it to a [`RoughnessRefinement`]: [`SinglePass`] stops there,
//! [`DampedRefinement`] iterates Levenberg-Marquardt steps on the GPU.

mod iterative;
pub mod shaders;
mod single_pass;

use std::path::Path;

use tracing::{info_span, warn};

pub use iterative::DampedRefinement;
pub use single_pass::SinglePass;

use crate::{
    basis::{BasisResources, BasisWeightResources},
    error::{FitError, GpuError},
    gpu::{ColorFormat, Context, Drawable, Framebuffer, Program, TextureDesc},
    io::{self, ExportReport},
    optimization::ConvergenceSummary,
    settings::{RoughnessSettings, TextureResolution},
};

pub const SPECULAR_TEXTURE_FILE_NAME: &str = "specular.png";
pub const ROUGHNESS_TEXTURE_FILE_NAME: &str = "roughness.png";

pub const REFLECTIVITY_ATTACHMENT: usize = 0;
pub const ROUGHNESS_ATTACHMENT: usize = 1;
pub const DAMPING_ERROR_ATTACHMENT: usize = 2;

/// What happens after the one-pass estimate has been drawn.
pub trait RoughnessRefinement<C: Context> {
    /// The framebuffer holding the accepted estimate, if it exists yet.
    fn framebuffer(&self) -> Option<&C::Framebuffer>;

    /// The framebuffer the one-pass estimate is drawn into.
    fn initial_target(&mut self, context: &C) -> Result<&mut C::Framebuffer, GpuError>;

    fn set_input_weights(&mut self, _weights: &BasisWeightResources<C>) -> Result<(), GpuError> {
        Ok(())
    }

    /// Improves on the estimate in [`initial_target`](Self::initial_target).
    fn refine(&mut self, gamma: f32) -> Result<Option<ConvergenceSummary>, FitError>;
}

pub struct RoughnessOptimizer<C: Context, R: RoughnessRefinement<C>> {
    context: C,
    estimate: C::Drawable,
    weights_set: bool,
    refinement: R,
}

pub type SimpleRoughnessOptimizer<C> = RoughnessOptimizer<C, SinglePass<C>>;
pub type IterativeRoughnessOptimizer<C> = RoughnessOptimizer<C, DampedRefinement<C>>;

impl<C: Context, R: RoughnessRefinement<C>> RoughnessOptimizer<C, R> {
    /// Compiles the estimation program for this basis. Missing or broken shaders are
    /// returned as errors.
    pub fn new(basis: &BasisResources<C>, refinement: R) -> Result<Self, GpuError> {
        let context = basis.context().clone();
        let program = context.compile_program(&shaders::program_desc(
            shaders::ESTIMATE_SPECULAR,
            shaders::estimate_specular::INTERFACE,
            basis.basis_count(),
            basis.resolution(),
        ))?;
        let mut estimate = context.create_full_screen_quad(program)?;
        estimate.program_mut().set_texture(shaders::BASIS_FUNCTIONS, basis.basis_functions())?;

        Ok(Self { context, estimate, weights_set: false, refinement })
    }

    pub fn refinement(&self) -> &R {
        &self.refinement
    }

    pub fn refinement_mut(&mut self) -> &mut R {
        &mut self.refinement
    }

    pub fn set_input_weights(&mut self, weights: &BasisWeightResources<C>) -> Result<(), GpuError> {
        let program = self.estimate.program_mut();
        program.set_texture(shaders::WEIGHT_MAPS, weights.weight_maps())?;
        program.set_texture(shaders::WEIGHT_MASK, weights.weight_mask())?;
        self.refinement.set_input_weights(weights)?;
        self.weights_set = true;
        Ok(())
    }

    /// Resets to the prior: black reflectivity, maximally rough.
    pub fn clear(&mut self) -> Result<(), GpuError> {
        let target = self.refinement.initial_target(&self.context)?;
        target.clear_color_buffer(REFLECTIVITY_ATTACHMENT, [0.0, 0.0, 0.0, 1.0])?;
        target.clear_color_buffer(ROUGHNESS_ATTACHMENT, [1.0, 1.0, 1.0, 1.0])?;
        Ok(())
    }

    /// Runs the whole fit, overwriting the current estimate.
    pub fn execute(&mut self, gamma: f32) -> Result<Option<ConvergenceSummary>, FitError> {
        if !self.weights_set {
            return Err(FitError::MissingInputWeights);
        }
        let _span = info_span!("roughness_fit", gamma).entered();

        let program = self.estimate.program_mut();
        program.set_uniform(shaders::GAMMA, gamma)?;
        program.set_uniform(shaders::GAMMA_INV, 1.0 / gamma)?;

        let target = self.refinement.initial_target(&self.context)?;
        for index in 0..target.desc().color_attachments.len() {
            target.clear_color_buffer(index, [0.0; 4])?;
        }
        self.estimate.draw(target)?;

        self.refinement.refine(gamma)
    }

    pub fn reflectivity_texture(&self) -> Result<Option<C::Texture>, GpuError> {
        self.refinement
            .framebuffer()
            .map(|fb| fb.color_attachment_texture(REFLECTIVITY_ATTACHMENT))
            .transpose()
    }

    pub fn roughness_texture(&self) -> Result<Option<C::Texture>, GpuError> {
        self.refinement
            .framebuffer()
            .map(|fb| fb.color_attachment_texture(ROUGHNESS_ATTACHMENT))
            .transpose()
    }

    /// Writes `specular.png` and `roughness.png`. Failures are logged and reported, never
    /// returned.
    pub fn save_textures(&self, directory: &Path) -> ExportReport {
        let mut report = ExportReport::default();
        let Some(framebuffer) = self.refinement.framebuffer() else {
            warn!("no roughness estimate to save");
            return report;
        };
        let (width, height) = framebuffer.size();

        for (index, name) in [
            (REFLECTIVITY_ATTACHMENT, SPECULAR_TEXTURE_FILE_NAME),
            (ROUGHNESS_ATTACHMENT, ROUGHNESS_TEXTURE_FILE_NAME),
        ] {
            let path = directory.join(name);
            let result = framebuffer
                .read_floating_point_rgba(index)
                .map_err(|e| e.to_string())
                .and_then(|data| io::write_rgb8(&path, width, height, &data, true).map_err(|e| e.to_string()));
            report.record(path, result);
        }

        report
    }
}

impl<C: Context> RoughnessOptimizer<C, SinglePass<C>> {
    pub fn simple(basis: &BasisResources<C>, resolution: TextureResolution) -> Result<Self, GpuError> {
        Self::new(basis, SinglePass::new(resolution))
    }

    /// Starts from `specular.png` and `roughness.png` in `directory`, rescaled to
    /// `resolution`. A missing map keeps the cleared prior.
    pub fn from_prior_solution(
        basis: &BasisResources<C>,
        resolution: TextureResolution,
        directory: &Path,
    ) -> Result<Self, FitError> {
        let mut optimizer = Self::simple(basis, resolution)?;
        optimizer.clear()?;

        for (index, name) in [
            (REFLECTIVITY_ATTACHMENT, SPECULAR_TEXTURE_FILE_NAME),
            (ROUGHNESS_ATTACHMENT, ROUGHNESS_TEXTURE_FILE_NAME),
        ] {
            let path = directory.join(name);
            if !path.exists() {
                warn!("prior solution has no {}", path.display());
                continue;
            }

            let (width, height, data) = io::read_rgba_f32(&path, true)?;
            let texture = optimizer
                .context
                .create_texture(&TextureDesc::new_2d(width, height, ColorFormat::Rgba32F), &data)?;
            optimizer
                .refinement
                .initial_target(&optimizer.context)?
                .blit_color_attachment(index, &texture)?;
        }

        Ok(optimizer)
    }
}

impl<C: Context> RoughnessOptimizer<C, DampedRefinement<C>> {
    /// `diffuse` is the linear diffuse albedo the reflectivity is bounded by.
    pub fn iterative(
        basis: &BasisResources<C>,
        diffuse: C::Texture,
        resolution: TextureResolution,
        settings: &RoughnessSettings,
    ) -> Result<Self, GpuError> {
        let refinement = DampedRefinement::new(basis, diffuse, resolution, settings)?;
        Self::new(basis, refinement)
    }
}
