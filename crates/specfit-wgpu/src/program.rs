use std::{borrow::Cow, cell::RefCell, collections::HashMap, sync::Arc};

use pollster::FutureExt;
use specfit::{
    GpuError,
    gpu::{Drawable, Program, ProgramDesc, ShaderInterface, TextureKind},
};
use tracing::debug;
use wgpu::util::DeviceExt;

use crate::{
    GpuState,
    framebuffer::WgpuFramebuffer,
    texture::{WgpuTexture, texture_format},
};

const UNIFORM_BINDING: u32 = 0;

fn texture_binding(slot: usize) -> u32 {
    slot as u32 + 1
}

/// Runs `create` inside a validation scope so wgpu errors surface as `ShaderCompile`
/// instead of the uncaptured-error panic.
fn validated<T>(state: &GpuState, name: &str, create: impl FnOnce() -> T) -> Result<T, GpuError> {
    state.device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = create();
    match state.device.pop_error_scope().block_on() {
        Some(error) => Err(GpuError::ShaderCompile { name: name.to_owned(), message: error.to_string() }),
        None => Ok(value),
    }
}

pub struct WgpuProgram {
    state: Arc<GpuState>,
    name: String,
    interface: ShaderInterface,
    module: wgpu::ShaderModule,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    // keyed by the formats of the color targets
    pipelines: RefCell<HashMap<Vec<wgpu::TextureFormat>, Arc<wgpu::RenderPipeline>>>,
    uniforms: Vec<f32>,
    textures: Vec<Option<WgpuTexture>>,
}

impl WgpuProgram {
    pub(crate) fn compile(state: &Arc<GpuState>, desc: &ProgramDesc) -> Result<Self, GpuError> {
        let source = state.library.assemble(desc)?;
        let device = &state.device;

        let module = validated(state, &desc.fragment, || {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&desc.fragment),
                source: wgpu::ShaderSource::Wgsl(Cow::Owned(source)),
            })
        })?;

        let mut entries = vec![wgpu::BindGroupLayoutEntry {
            binding: UNIFORM_BINDING,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }];
        for (slot, binding) in desc.interface.textures.iter().enumerate() {
            let view_dimension = match binding.kind {
                TextureKind::D2 => wgpu::TextureViewDimension::D2,
                TextureKind::D2Array => wgpu::TextureViewDimension::D2Array,
            };
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: texture_binding(slot),
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension,
                    multisampled: false,
                },
                count: None,
            });
        }

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&desc.fragment),
            entries: &entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&desc.fragment),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        debug!(fragment = %desc.fragment, defines = ?desc.defines, "compiled wgsl program");

        Ok(Self {
            state: Arc::clone(state),
            name: desc.fragment.clone(),
            interface: desc.interface,
            module,
            bind_group_layout,
            pipeline_layout,
            pipelines: RefCell::new(HashMap::new()),
            uniforms: vec![0.0; desc.interface.uniforms.len()],
            textures: vec![None; desc.interface.textures.len()],
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn pipeline(&self, formats: &[wgpu::TextureFormat]) -> Result<Arc<wgpu::RenderPipeline>, GpuError> {
        if let Some(pipeline) = self.pipelines.borrow().get(formats) {
            return Ok(Arc::clone(pipeline));
        }

        // targets past the program's outputs are left untouched
        let targets: Vec<Option<wgpu::ColorTargetState>> = formats
            .iter()
            .enumerate()
            .map(|(index, format)| {
                Some(wgpu::ColorTargetState {
                    format: *format,
                    blend: None,
                    write_mask: if index < self.interface.outputs {
                        wgpu::ColorWrites::ALL
                    } else {
                        wgpu::ColorWrites::empty()
                    },
                })
            })
            .collect();

        let pipeline = validated(&self.state, &self.name, || {
            self.state.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&self.name),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &self.module,
                    entry_point: Some("vs_main"),
                    compilation_options: Default::default(),
                    buffers: &[],
                },
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &self.module,
                    entry_point: Some("fs_main"),
                    compilation_options: Default::default(),
                    targets: &targets,
                }),
                multiview: None,
                cache: None,
            })
        })?;

        let pipeline = Arc::new(pipeline);
        self.pipelines.borrow_mut().insert(formats.to_vec(), Arc::clone(&pipeline));
        Ok(pipeline)
    }

    /// Draws a full-screen triangle into `targets`, keeping what is already there where
    /// fragments are discarded.
    pub(crate) fn render(&self, targets: &[&WgpuTexture]) -> Result<(), GpuError> {
        let mut views = Vec::with_capacity(self.textures.len());
        for (texture, binding) in self.textures.iter().zip(self.interface.textures) {
            let texture = texture.as_ref().ok_or_else(|| GpuError::UnboundTexture(binding.name.to_owned()))?;
            if targets.iter().any(|target| target.ptr_eq(texture)) {
                return Err(GpuError::FeedbackLoop);
            }
            views.push(texture.view(binding.kind));
        }

        let formats: Vec<wgpu::TextureFormat> = targets.iter().map(|t| texture_format(t.desc.format)).collect();
        let pipeline = self.pipeline(&formats)?;
        let device = &self.state.device;

        // uniform structs are padded out to 16 bytes
        let mut uniforms = self.uniforms.clone();
        uniforms.resize(uniforms.len().div_ceil(4).max(1) * 4, 0.0);
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Program Uniforms"),
            contents: bytemuck::cast_slice(&uniforms),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: UNIFORM_BINDING,
            resource: uniform_buffer.as_entire_binding(),
        }];
        for (slot, view) in views.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: texture_binding(slot),
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&self.name),
            layout: &self.bind_group_layout,
            entries: &entries,
        });

        let target_views: Vec<wgpu::TextureView> = targets
            .iter()
            .map(|t| t.texture.create_view(&wgpu::TextureViewDescriptor::default()))
            .collect();
        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = target_views
            .iter()
            .map(|view| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations { load: wgpu::LoadOp::Load, store: wgpu::StoreOp::Store },
                })
            })
            .collect();

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(&self.name) });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(&self.name),
                color_attachments: &color_attachments,
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        self.state.queue.submit(Some(encoder.finish()));
        Ok(())
    }
}

impl Program for WgpuProgram {
    type Texture = WgpuTexture;

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

    fn set_texture(&mut self, name: &str, texture: &WgpuTexture) -> Result<(), GpuError> {
        let slot = self
            .interface
            .texture_slot(name)
            .ok_or_else(|| GpuError::UnknownBinding(name.to_owned()))?;
        self.textures[slot] = Some(texture.clone());
        Ok(())
    }
}

pub struct WgpuQuad {
    program: WgpuProgram,
}

impl WgpuQuad {
    pub(crate) fn new(program: WgpuProgram) -> Self {
        Self { program }
    }
}

impl Drawable for WgpuQuad {
    type Program = WgpuProgram;
    type Framebuffer = WgpuFramebuffer;

    fn program(&self) -> &WgpuProgram {
        &self.program
    }

    fn program_mut(&mut self) -> &mut WgpuProgram {
        &mut self.program
    }

    fn draw(&self, framebuffer: &mut WgpuFramebuffer) -> Result<(), GpuError> {
        let targets: Vec<&WgpuTexture> = framebuffer.attachments.iter().collect();
        if targets.is_empty() {
            return Ok(());
        }
        self.program.render(&targets)
    }
}
