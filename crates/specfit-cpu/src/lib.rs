//! Software implementation of the `specfit` GPU contract.
//!
//! Every draw runs the fragment program on the CPU, one rayon task per row. Texture
//! handles are shared and reference counted the way GL names are, so the context is
//! single-threaded even though each draw is not.

mod framebuffer;
mod program;
pub mod shaders;
mod texture;


use std::rc::Rc;

use specfit::{
    GpuError,
    gpu::{Context, FramebufferDesc, ProgramDesc, TextureDesc},
};
use tracing::debug;

pub use framebuffer::SoftwareFramebuffer;
pub use program::{Fragment, FragmentShader, SoftwareProgram, SoftwareQuad};
pub use shaders::ShaderRegistry;
pub use texture::{SoftwareTexture, TextureData};

#[derive(Clone)]
pub struct SoftwareContext {
    registry: Rc<ShaderRegistry>,
}

impl SoftwareContext {
    pub fn new() -> Self {
        Self::with_registry(ShaderRegistry::with_builtin_shaders())
    }

    pub fn with_registry(registry: ShaderRegistry) -> Self {
        Self { registry: Rc::new(registry) }
    }
}

impl Default for SoftwareContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Context for SoftwareContext {
    type Texture = SoftwareTexture;
    type Framebuffer = SoftwareFramebuffer;
    type Program = SoftwareProgram;
    type Drawable = SoftwareQuad;

    fn create_texture(&self, desc: &TextureDesc, data: &[f32]) -> Result<SoftwareTexture, GpuError> {
        desc.validate_data(data)?;
        Ok(SoftwareTexture::new(TextureData::from_rgba(*desc, data)))
    }

    fn create_framebuffer(&self, desc: &FramebufferDesc) -> Result<SoftwareFramebuffer, GpuError> {
        SoftwareFramebuffer::new(desc)
    }

    fn compile_program(&self, desc: &ProgramDesc) -> Result<SoftwareProgram, GpuError> {
        let shader = self.registry.compile(desc)?;
        debug!(fragment = %desc.fragment, defines = ?desc.defines, "compiled software program");
        Ok(SoftwareProgram::new(&desc.fragment, desc.interface, shader))
    }

    fn create_full_screen_quad(&self, program: SoftwareProgram) -> Result<SoftwareQuad, GpuError> {
        Ok(SoftwareQuad::new(program))
    }
}
