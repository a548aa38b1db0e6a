//! Headless wgpu implementation of the `specfit` GPU contract. Programs are WGSL modules
//! assembled from the sources under `shaders/`, with defines prepended as constants.

mod framebuffer;
mod program;
mod shaders;
mod texture;


use std::sync::Arc;

use pollster::FutureExt;
use specfit::{
    GpuError,
    gpu::{Context, FramebufferDesc, ProgramDesc, TextureDesc},
};
use tracing::info;

pub use framebuffer::WgpuFramebuffer;
pub use program::{WgpuProgram, WgpuQuad};
pub use shaders::ShaderLibrary;
pub use texture::WgpuTexture;

pub(crate) struct GpuState {
    pub(crate) device: wgpu::Device,
    pub(crate) queue: wgpu::Queue,
    pub(crate) library: ShaderLibrary,
}

#[derive(Clone)]
pub struct WgpuContext {
    state: Arc<GpuState>,
}

impl WgpuContext {
    /// Picks the default adapter without a surface.
    pub fn new() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::from_env_or_default());

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .block_on()
            .ok_or_else(|| GpuError::Device("no suitable adapter".to_owned()))?;
        info!(adapter = ?adapter.get_info().name, backend = ?adapter.get_info().backend, "using adapter");

        // three float attachments exceed the default per-sample budget
        let limits = wgpu::Limits {
            max_color_attachment_bytes_per_sample: adapter.limits().max_color_attachment_bytes_per_sample,
            ..wgpu::Limits::default()
        };

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Specular Fit Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits,
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .block_on()
            .map_err(|e| GpuError::Device(e.to_string()))?;

        Ok(Self::from_device(device, queue))
    }

    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self { state: Arc::new(GpuState { device, queue, library: ShaderLibrary::builtin() }) }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.state.device
    }
}

impl Context for WgpuContext {
    type Texture = WgpuTexture;
    type Framebuffer = WgpuFramebuffer;
    type Program = WgpuProgram;
    type Drawable = WgpuQuad;

    fn create_texture(&self, desc: &TextureDesc, data: &[f32]) -> Result<WgpuTexture, GpuError> {
        desc.validate_data(data)?;
        let texture = WgpuTexture::new(&self.state.device, *desc, "Input Texture");
        texture.upload(&self.state.queue, data);
        Ok(texture)
    }

    fn create_framebuffer(&self, desc: &FramebufferDesc) -> Result<WgpuFramebuffer, GpuError> {
        WgpuFramebuffer::new(&self.state, desc)
    }

    fn compile_program(&self, desc: &ProgramDesc) -> Result<WgpuProgram, GpuError> {
        WgpuProgram::compile(&self.state, desc)
    }

    fn create_full_screen_quad(&self, program: WgpuProgram) -> Result<WgpuQuad, GpuError> {
        Ok(WgpuQuad::new(program))
    }
}
