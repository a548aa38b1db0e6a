use crate::error::GpuError;

pub const MAX_COLOR_ATTACHMENTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorFormat {
    R32F,
    Rg32F,
    Rgb32F,
    Rgba32F,
    Rgba8,
}

impl ColorFormat {
    pub fn channels(self) -> usize {
        match self {
            ColorFormat::R32F => 1,
            ColorFormat::Rg32F => 2,
            ColorFormat::Rgb32F => 3,
            ColorFormat::Rgba32F | ColorFormat::Rgba8 => 4,
        }
    }

    /// Channels that are not stored read back as zero, except alpha which reads back as one.
    pub fn mask(self, rgba: [f32; 4]) -> [f32; 4] {
        let mut out = [0.0, 0.0, 0.0, 1.0];
        let stored = self.channels();
        out[..stored].copy_from_slice(&rgba[..stored]);
        if self == ColorFormat::Rgba8 {
            for c in &mut out {
                *c = (c.clamp(0.0, 1.0) * 255.0).round() / 255.0;
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramebufferDesc {
    pub width: u32,
    pub height: u32,
    pub color_attachments: Vec<ColorFormat>,
    pub depth_attachment: bool,
    pub stencil_attachment: bool,
}

impl FramebufferDesc {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            color_attachments: Vec::new(),
            depth_attachment: false,
            stencil_attachment: false,
        }
    }

    pub fn add_color_attachment(mut self, format: ColorFormat) -> Self {
        self.color_attachments.push(format);
        self
    }

    pub fn with_depth_attachment(mut self) -> Self {
        self.depth_attachment = true;
        self
    }

    pub fn with_stencil_attachment(mut self) -> Self {
        self.stencil_attachment = true;
        self
    }

    pub fn validate(&self) -> Result<(), GpuError> {
        if self.color_attachments.is_empty() && !self.depth_attachment && !self.stencil_attachment {
            return Err(GpuError::NoAttachments);
        }
        if self.width == 0 || self.height == 0 {
            return Err(GpuError::ZeroSize { width: self.width, height: self.height });
        }
        if self.color_attachments.len() > MAX_COLOR_ATTACHMENTS {
            return Err(GpuError::TooManyAttachments {
                count: self.color_attachments.len(),
                max: MAX_COLOR_ATTACHMENTS,
            });
        }
        Ok(())
    }

    pub fn check_index(&self, index: usize) -> Result<(), GpuError> {
        if index >= self.color_attachments.len() {
            Err(GpuError::AttachmentOutOfRange { index, count: self.color_attachments.len() })
        } else {
            Ok(())
        }
    }
}

pub trait Framebuffer {
    type Texture;

    fn desc(&self) -> &FramebufferDesc;

    fn size(&self) -> (u32, u32) {
        (self.desc().width, self.desc().height)
    }

    fn clear_color_buffer(&mut self, index: usize, rgba: [f32; 4]) -> Result<(), GpuError>;

    /// A handle to the attachment that can be bound as a program input.
    fn color_attachment_texture(&self, index: usize) -> Result<Self::Texture, GpuError>;

    /// Four floats per texel in row-major order, first row first.
    fn read_floating_point_rgba(&self, index: usize) -> Result<Vec<f32>, GpuError>;

    /// Resamples `source` to fill the whole attachment.
    fn blit_color_attachment(&mut self, index: usize, source: &Self::Texture) -> Result<(), GpuError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_attachments_rejected() {
        let desc = FramebufferDesc::new(16, 16);
        assert!(matches!(desc.validate(), Err(GpuError::NoAttachments)));
    }

    #[test]
    fn test_depth_only_is_allowed() {
        let desc = FramebufferDesc::new(16, 16).with_depth_attachment();
        assert!(desc.validate().is_ok());
    }

    #[test]
    fn test_attachment_limits() {
        let mut desc = FramebufferDesc::new(4, 4);
        for _ in 0..=MAX_COLOR_ATTACHMENTS {
            desc = desc.add_color_attachment(ColorFormat::R32F);
        }
        assert!(matches!(desc.validate(), Err(GpuError::TooManyAttachments { count: 9, max: 8 })));

        let desc = FramebufferDesc::new(0, 4).add_color_attachment(ColorFormat::Rgb32F);
        assert!(matches!(desc.validate(), Err(GpuError::ZeroSize { .. })));

        let desc = FramebufferDesc::new(4, 4).add_color_attachment(ColorFormat::Rgb32F);
        assert!(desc.check_index(0).is_ok());
        assert!(matches!(desc.check_index(1), Err(GpuError::AttachmentOutOfRange { index: 1, count: 1 })));
    }

    #[test]
    fn test_format_mask() {
        assert_eq!(ColorFormat::Rg32F.mask([0.25, 0.5, 0.75, 0.0]), [0.25, 0.5, 0.0, 1.0]);
        assert_eq!(ColorFormat::Rgba32F.mask([0.25, 0.5, 0.75, 0.0]), [0.25, 0.5, 0.75, 0.0]);
        assert_eq!(ColorFormat::Rgba8.mask([2.0, 0.0, 1.0, 1.0]), [1.0, 0.0, 1.0, 1.0]);
    }
}
