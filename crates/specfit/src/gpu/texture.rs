use crate::error::GpuError;

use super::ColorFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureKind {
    D2,
    D2Array,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub layers: u32,
    pub format: ColorFormat,
}

impl TextureDesc {
    pub fn new_2d(width: u32, height: u32, format: ColorFormat) -> Self {
        Self { width, height, layers: 1, format }
    }

    pub fn new_2d_array(width: u32, height: u32, layers: u32, format: ColorFormat) -> Self {
        Self { width, height, layers, format }
    }

    pub fn kind(&self) -> TextureKind {
        if self.layers > 1 { TextureKind::D2Array } else { TextureKind::D2 }
    }

    pub fn texel_count(&self) -> usize {
        self.width as usize * self.height as usize * self.layers as usize
    }

    pub fn validate_data(&self, data: &[f32]) -> Result<(), GpuError> {
        if self.width == 0 || self.height == 0 || self.layers == 0 {
            return Err(GpuError::ZeroSize { width: self.width, height: self.height });
        }
        let expected = self.texel_count() * 4;
        if data.len() != expected {
            return Err(GpuError::TextureSize { expected, actual: data.len() });
        }
        Ok(())
    }
}
