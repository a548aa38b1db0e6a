use std::{cell::Ref, sync::Arc};

use rayon::prelude::*;
use specfit::{
    GpuError,
    gpu::{Drawable, Framebuffer, Program, ShaderInterface},
};

use crate::{
    framebuffer::SoftwareFramebuffer,
    texture::{SoftwareTexture, TextureData},
};

/// A fragment program run once per texel of the target. Outputs are indexed like the
/// framebuffer's color attachments; returning `false` discards the fragment and leaves
/// every attachment untouched at that texel.
pub trait FragmentShader: Send + Sync {
    fn shade(&self, fragment: &Fragment<'_>, outputs: &mut [[f32; 4]]) -> bool;
}

/// Inputs visible to one invocation. Textures and uniforms are addressed by the slot
/// order of the program's [`ShaderInterface`].
pub struct Fragment<'a> {
    pub x: u32,
    pub y: u32,
    uniforms: &'a [f32],
    textures: &'a [&'a TextureData],
}

impl Fragment<'_> {
    pub fn uniform(&self, slot: usize) -> f32 {
        self.uniforms[slot]
    }

    pub fn texel(&self, slot: usize, x: i64, y: i64, layer: u32) -> [f32; 4] {
        self.textures[slot].texel(x, y, layer)
    }

    /// The texel of `slot` under this fragment.
    pub fn here(&self, slot: usize) -> [f32; 4] {
        self.texel(slot, self.x as i64, self.y as i64, 0)
    }

    pub fn texture_size(&self, slot: usize) -> (u32, u32) {
        self.textures[slot].size()
    }
}

pub struct SoftwareProgram {
    name: String,
    interface: ShaderInterface,
    shader: Arc<dyn FragmentShader>,
    uniforms: Vec<f32>,
    textures: Vec<Option<SoftwareTexture>>,
}

impl SoftwareProgram {
    pub(crate) fn new(name: &str, interface: ShaderInterface, shader: Arc<dyn FragmentShader>) -> Self {
        Self {
            name: name.to_owned(),
            interface,
            shader,
            uniforms: vec![0.0; interface.uniforms.len()],
            textures: vec![None; interface.textures.len()],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Program for SoftwareProgram {
    type Texture = SoftwareTexture;

    fn interface(&self) -> &ShaderInterface {
        &self.interface
    }

    fn set_uniform(&mut self, name: &str, value: f32) -> Result<(), GpuError> {
        let slot = self
            .interface
            .uniform_slot(name)
            .ok_or_else(|| GpuError::UnknownBinding(name.to_owned()))?;
        self.uniforms[slot] = value;
        Ok(())
    }

    fn set_texture(&mut self, name: &str, texture: &SoftwareTexture) -> Result<(), GpuError> {
        let slot = self
            .interface
            .texture_slot(name)
            .ok_or_else(|| GpuError::UnknownBinding(name.to_owned()))?;
        self.textures[slot] = Some(texture.clone());
        Ok(())
    }
}

pub struct SoftwareQuad {
    program: SoftwareProgram,
}

impl SoftwareQuad {
    pub(crate) fn new(program: SoftwareProgram) -> Self {
        Self { program }
    }
}

impl Drawable for SoftwareQuad {
    type Program = SoftwareProgram;
    type Framebuffer = SoftwareFramebuffer;

    fn program(&self) -> &SoftwareProgram {
        &self.program
    }

    fn program_mut(&mut self) -> &mut SoftwareProgram {
        &mut self.program
    }

    fn draw(&self, framebuffer: &mut SoftwareFramebuffer) -> Result<(), GpuError> {
        let program = &self.program;

        let inputs: Vec<Ref<'_, TextureData>> = program
            .textures
            .iter()
            .zip(program.interface.textures)
            .map(|(texture, binding)| {
                let texture = texture.as_ref().ok_or_else(|| GpuError::UnboundTexture(binding.name.to_owned()))?;
                texture.0.try_borrow().map_err(|_| GpuError::FeedbackLoop)
            })
            .collect::<Result<_, _>>()?;
        let mut targets = framebuffer
            .attachments
            .iter()
            .map(|attachment| attachment.0.try_borrow_mut().map_err(|_| GpuError::FeedbackLoop))
            .collect::<Result<Vec<_>, _>>()?;

        let views: Vec<&TextureData> = inputs.iter().map(|input| &**input).collect();
        let uniforms = &program.uniforms[..];
        let shader = &*program.shader;
        let width = framebuffer.desc().width as usize;
        let height = framebuffer.desc().height as usize;
        let outputs = program.interface.outputs.min(targets.len());
        if outputs == 0 {
            return Ok(());
        }

        let mut results = vec![[0.0f32; 4]; width * height * outputs];
        let mut written = vec![false; width * height];

        results
            .par_chunks_mut(width * outputs)
            .zip(written.par_chunks_mut(width))
            .enumerate()
            .for_each(|(y, (row, row_written))| {
                for x in 0..width {
                    let fragment = Fragment {
                        x: x as u32,
                        y: y as u32,
                        uniforms,
                        textures: &views,
                    };
                    row_written[x] = shader.shade(&fragment, &mut row[x * outputs..(x + 1) * outputs]);
                }
            });

        for (index, target) in targets.iter_mut().take(outputs).enumerate() {
            let format = target.desc.format;
            for (p, texel) in target.texels.iter_mut().enumerate() {
                if written[p] {
                    *texel = format.mask(results[p * outputs + index]);
                }
            }
        }

        Ok(())
    }
}
