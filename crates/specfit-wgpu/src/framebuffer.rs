use std::sync::Arc;

use specfit::{
    GpuError,
    gpu::{Framebuffer, FramebufferDesc, Program, ProgramDesc, ShaderInterface, TextureBinding, TextureDesc, TextureKind},
    roughness::shaders::FULLSCREEN_VERTEX,
};

use crate::{GpuState, program::WgpuProgram, shaders::BLIT, texture::WgpuTexture};

const BLIT_INTERFACE: ShaderInterface = ShaderInterface {
    uniforms: &["target_width", "target_height"],
    textures: &[TextureBinding { name: "source", kind: TextureKind::D2 }],
    outputs: 1,
};

/// Depth and stencil requests are validated but allocate nothing; no program here tests
/// depth.
pub struct WgpuFramebuffer {
    state: Arc<GpuState>,
    desc: FramebufferDesc,
    pub(crate) attachments: Vec<WgpuTexture>,
}

impl WgpuFramebuffer {
    pub(crate) fn new(state: &Arc<GpuState>, desc: &FramebufferDesc) -> Result<Self, GpuError> {
        desc.validate()?;
        let attachments = desc
            .color_attachments
            .iter()
            .map(|format| {
                WgpuTexture::new(
                    &state.device,
                    TextureDesc::new_2d(desc.width, desc.height, *format),
                    "Color Attachment",
                )
            })
            .collect();
        Ok(Self { state: Arc::clone(state), desc: desc.clone(), attachments })
    }

    fn attachment(&self, index: usize) -> Result<&WgpuTexture, GpuError> {
        self.desc.check_index(index)?;
        Ok(&self.attachments[index])
    }
}

impl Framebuffer for WgpuFramebuffer {
    type Texture = WgpuTexture;

    fn desc(&self) -> &FramebufferDesc {
        &self.desc
    }

    fn clear_color_buffer(&mut self, index: usize, rgba: [f32; 4]) -> Result<(), GpuError> {
        let attachment = self.attachment(index)?;
        let [r, g, b, a] = attachment.desc.format.mask(rgba).map(f64::from);
        let view = attachment.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let device = &self.state.device;
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Clear Encoder") });
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Clear Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        self.state.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn color_attachment_texture(&self, index: usize) -> Result<WgpuTexture, GpuError> {
        self.attachment(index).cloned()
    }

    fn read_floating_point_rgba(&self, index: usize) -> Result<Vec<f32>, GpuError> {
        self.attachment(index)?.read_rgba(&self.state.device, &self.state.queue)
    }

    fn blit_color_attachment(&mut self, index: usize, source: &WgpuTexture) -> Result<(), GpuError> {
        let attachment = self.attachment(index)?;
        let mut blit = WgpuProgram::compile(&self.state, &ProgramDesc::new(FULLSCREEN_VERTEX, BLIT, BLIT_INTERFACE))?;
        blit.set_uniform("target_width", self.desc.width as f32)?;
        blit.set_uniform("target_height", self.desc.height as f32)?;
        blit.set_texture("source", source)?;
        blit.render(&[attachment])
    }
}
