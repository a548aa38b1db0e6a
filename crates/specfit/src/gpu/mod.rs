//! The narrow GPU contract the fitting engine is written against: render targets with a
//! handful of color attachments, programs with named inputs, full-screen draws, and
//! floating-point readback. Backends live in separate crates.

mod framebuffer;
mod program;
mod texture;

pub use framebuffer::{ColorFormat, Framebuffer, FramebufferDesc, MAX_COLOR_ATTACHMENTS};
pub use program::{Drawable, Program, ProgramDesc, ShaderInterface, TextureBinding};
pub use texture::{TextureDesc, TextureKind};

use crate::error::GpuError;

pub trait Context: Clone + 'static {
    type Texture: Clone + 'static;
    type Framebuffer: Framebuffer<Texture = Self::Texture> + 'static;
    type Program: Program<Texture = Self::Texture> + 'static;
    type Drawable: Drawable<Program = Self::Program, Framebuffer = Self::Framebuffer> + 'static;

    /// `data` holds four floats (RGBA) per texel, layers stored one after another.
    fn create_texture(&self, desc: &TextureDesc, data: &[f32]) -> Result<Self::Texture, GpuError>;

    fn create_framebuffer(&self, desc: &FramebufferDesc) -> Result<Self::Framebuffer, GpuError>;

    fn compile_program(&self, desc: &ProgramDesc) -> Result<Self::Program, GpuError>;

    fn create_full_screen_quad(&self, program: Self::Program) -> Result<Self::Drawable, GpuError>;
}
