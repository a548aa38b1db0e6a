use crate::error::GpuError;

use super::TextureKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureBinding {
    pub name: &'static str,
    pub kind: TextureKind,
}

/// Named inputs of a program, in slot order. Backends map names to slots with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderInterface {
    pub uniforms: &'static [&'static str],
    pub textures: &'static [TextureBinding],
    /// number of color outputs written by the fragment stage
    pub outputs: usize,
}

impl ShaderInterface {
    pub fn uniform_slot(&self, name: &str) -> Option<usize> {
        self.uniforms.iter().position(|u| *u == name)
    }

    pub fn texture_slot(&self, name: &str) -> Option<usize> {
        self.textures.iter().position(|t| t.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgramDesc {
    pub vertex: String,
    pub fragment: String,
    pub defines: Vec<(String, i64)>,
    pub interface: ShaderInterface,
}

impl ProgramDesc {
    pub fn new(vertex: &str, fragment: &str, interface: ShaderInterface) -> Self {
        Self {
            vertex: vertex.to_owned(),
            fragment: fragment.to_owned(),
            defines: Vec::new(),
            interface,
        }
    }

    pub fn define(mut self, name: &str, value: i64) -> Self {
        self.defines.push((name.to_owned(), value));
        self
    }

    pub fn define_value(&self, name: &str) -> Option<i64> {
        self.defines.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    pub fn require_define(&self, name: &str) -> Result<i64, GpuError> {
        self.define_value(name).ok_or_else(|| GpuError::MissingDefine {
            shader: self.fragment.clone(),
            define: name.to_owned(),
        })
    }
}

pub trait Program {
    type Texture;

    fn interface(&self) -> &ShaderInterface;

    fn set_uniform(&mut self, name: &str, value: f32) -> Result<(), GpuError>;

    fn set_texture(&mut self, name: &str, texture: &Self::Texture) -> Result<(), GpuError>;
}

pub trait Drawable {
    type Program;
    type Framebuffer;

    fn program(&self) -> &Self::Program;

    fn program_mut(&mut self) -> &mut Self::Program;

    /// Draws a full-screen quad into every color attachment of `framebuffer`.
    fn draw(&self, framebuffer: &mut Self::Framebuffer) -> Result<(), GpuError>;
}
