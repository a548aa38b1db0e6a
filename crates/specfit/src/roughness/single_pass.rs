use crate::{
    error::{FitError, GpuError},
    gpu::{ColorFormat, Context, FramebufferDesc},
    optimization::ConvergenceSummary,
    settings::TextureResolution,
};

use super::RoughnessRefinement;

/// Keeps the one-pass estimate as is. The framebuffer is created on first use.
pub struct SinglePass<C: Context> {
    desc: FramebufferDesc,
    framebuffer: Option<C::Framebuffer>,
}

impl<C: Context> SinglePass<C> {
    pub fn new(resolution: TextureResolution) -> Self {
        Self {
            desc: FramebufferDesc::new(resolution.width, resolution.height)
                .add_color_attachment(ColorFormat::Rgb32F)
                .add_color_attachment(ColorFormat::Rgb32F),
            framebuffer: None,
        }
    }
}

impl<C: Context> RoughnessRefinement<C> for SinglePass<C> {
    fn framebuffer(&self) -> Option<&C::Framebuffer> {
        self.framebuffer.as_ref()
    }

    fn initial_target(&mut self, context: &C) -> Result<&mut C::Framebuffer, GpuError> {
        let framebuffer = match self.framebuffer.take() {
            Some(framebuffer) => framebuffer,
            None => context.create_framebuffer(&self.desc)?,
        };
        Ok(self.framebuffer.insert(framebuffer))
    }

    fn refine(&mut self, _gamma: f32) -> Result<Option<ConvergenceSummary>, FitError> {
        Ok(None)
    }
}
