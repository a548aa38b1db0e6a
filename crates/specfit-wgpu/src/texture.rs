use std::sync::{Arc, mpsc};

use specfit::{
    GpuError,
    gpu::{ColorFormat, TextureDesc, TextureKind},
};

/// wgpu has no three-channel float format; RGB is stored as RGBA and masked on readback.
pub(crate) fn texture_format(format: ColorFormat) -> wgpu::TextureFormat {
    match format {
        ColorFormat::R32F => wgpu::TextureFormat::R32Float,
        ColorFormat::Rg32F => wgpu::TextureFormat::Rg32Float,
        ColorFormat::Rgb32F | ColorFormat::Rgba32F => wgpu::TextureFormat::Rgba32Float,
        ColorFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
    }
}

pub(crate) fn bytes_per_texel(format: ColorFormat) -> u32 {
    match format {
        ColorFormat::R32F | ColorFormat::Rgba8 => 4,
        ColorFormat::Rg32F => 8,
        ColorFormat::Rgb32F | ColorFormat::Rgba32F => 16,
    }
}

/// Rows of a buffer copy must start on 256-byte boundaries.
pub(crate) fn padded_bytes_per_row(width: u32, format: ColorFormat) -> u32 {
    let unpadded = width * bytes_per_texel(format);
    unpadded.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT
}

/// RGBA floats to the texel bytes of `format`.
pub(crate) fn encode_texels(format: ColorFormat, rgba: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(rgba.len() / 4 * bytes_per_texel(format) as usize);
    for texel in rgba.chunks_exact(4) {
        let texel = format.mask([texel[0], texel[1], texel[2], texel[3]]);
        match format {
            ColorFormat::R32F => bytes.extend_from_slice(bytemuck::bytes_of(&texel[0])),
            ColorFormat::Rg32F => bytes.extend_from_slice(bytemuck::cast_slice(&texel[..2])),
            ColorFormat::Rgb32F | ColorFormat::Rgba32F => bytes.extend_from_slice(bytemuck::cast_slice(&texel[..])),
            ColorFormat::Rgba8 => bytes.extend(texel.map(|c| (c * 255.0).round() as u8)),
        }
    }
    bytes
}

/// Texel bytes of `format` back to masked RGBA floats.
pub(crate) fn decode_texels(format: ColorFormat, bytes: &[u8], out: &mut Vec<f32>) {
    let stride = bytes_per_texel(format) as usize;
    for texel in bytes.chunks_exact(stride) {
        let mut rgba = [0.0f32; 4];
        match format {
            ColorFormat::Rgba8 => {
                for (c, byte) in texel.iter().enumerate() {
                    rgba[c] = *byte as f32 / 255.0;
                }
            }
            _ => {
                for (c, value) in texel.chunks_exact(4).enumerate() {
                    rgba[c] = f32::from_le_bytes([value[0], value[1], value[2], value[3]]);
                }
            }
        }
        out.extend_from_slice(&format.mask(rgba));
    }
}

#[derive(Debug, Clone)]
pub struct WgpuTexture {
    pub(crate) texture: Arc<wgpu::Texture>,
    pub(crate) desc: TextureDesc,
}

impl WgpuTexture {
    pub(crate) fn new(device: &wgpu::Device, desc: TextureDesc, label: &str) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d { width: desc.width, height: desc.height, depth_or_array_layers: desc.layers },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(desc.format),
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        Self { texture: Arc::new(texture), desc }
    }

    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    pub fn ptr_eq(&self, other: &WgpuTexture) -> bool {
        Arc::ptr_eq(&self.texture, &other.texture)
    }

    pub(crate) fn upload(&self, queue: &wgpu::Queue, rgba: &[f32]) {
        let bytes = encode_texels(self.desc.format, rgba);
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &bytes,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(self.desc.width * bytes_per_texel(self.desc.format)),
                rows_per_image: Some(self.desc.height),
            },
            self.texture.size(),
        );
    }

    /// The view a program binding of `kind` expects; single-layer textures can be viewed
    /// as arrays.
    pub(crate) fn view(&self, kind: TextureKind) -> wgpu::TextureView {
        let dimension = match kind {
            TextureKind::D2 => wgpu::TextureViewDimension::D2,
            TextureKind::D2Array => wgpu::TextureViewDimension::D2Array,
        };
        self.texture.create_view(&wgpu::TextureViewDescriptor { dimension: Some(dimension), ..Default::default() })
    }

    /// Copies layer 0 back to the host as four floats per texel, first row first.
    pub(crate) fn read_rgba(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<Vec<f32>, GpuError> {
        let TextureDesc { width, height, format, .. } = self.desc;
        let padded = padded_bytes_per_row(width, format);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: padded as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Readback Encoder") });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        );
        queue.submit(Some(encoder.finish()));

        let slice = buffer.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|e| GpuError::Device(e.to_string()))?
            .map_err(|e| GpuError::Device(e.to_string()))?;

        let row_bytes = (width * bytes_per_texel(format)) as usize;
        let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
        {
            let mapped = slice.get_mapped_range();
            for row in mapped.chunks_exact(padded as usize) {
                decode_texels(format, &row[..row_bytes], &mut rgba);
            }
        }
        buffer.unmap();
        Ok(rgba)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_padding() {
        assert_eq!(padded_bytes_per_row(1, ColorFormat::R32F), 256);
        assert_eq!(padded_bytes_per_row(64, ColorFormat::R32F), 256);
        assert_eq!(padded_bytes_per_row(65, ColorFormat::R32F), 512);
        assert_eq!(padded_bytes_per_row(16, ColorFormat::Rgba32F), 256);
        assert_eq!(padded_bytes_per_row(17, ColorFormat::Rgb32F), 512);
    }

    #[test]
    fn test_texel_bytes_round_trip() {
        let rgba = [0.25, 0.5, 0.75, 0.0, 1.0, 2.0, 3.0, 4.0];

        let mut out = Vec::new();
        decode_texels(ColorFormat::Rg32F, &encode_texels(ColorFormat::Rg32F, &rgba), &mut out);
        assert_eq!(out, [0.25, 0.5, 0.0, 1.0, 1.0, 2.0, 0.0, 1.0]);

        let mut out = Vec::new();
        decode_texels(ColorFormat::Rgb32F, &encode_texels(ColorFormat::Rgb32F, &rgba), &mut out);
        assert_eq!(out, [0.25, 0.5, 0.75, 1.0, 1.0, 2.0, 3.0, 1.0]);

        let bytes = encode_texels(ColorFormat::Rgba8, &rgba);
        assert_eq!(bytes, [64, 128, 191, 0, 255, 255, 255, 255]);
    }
}
