use specfit::{
    GpuError,
    gpu::{Framebuffer, FramebufferDesc, TextureDesc},
};

use crate::texture::{SoftwareTexture, TextureData};

/// Color attachments are ordinary textures so they can be bound as inputs of a later
/// draw. Depth and stencil requests are accepted and ignored; no program here tests depth.
#[derive(Debug)]
pub struct SoftwareFramebuffer {
    desc: FramebufferDesc,
    pub(crate) attachments: Vec<SoftwareTexture>,
}

impl SoftwareFramebuffer {
    pub(crate) fn new(desc: &FramebufferDesc) -> Result<Self, GpuError> {
        desc.validate()?;
        let attachments = desc
            .color_attachments
            .iter()
            .map(|format| SoftwareTexture::new(TextureData::new(TextureDesc::new_2d(desc.width, desc.height, *format))))
            .collect();
        Ok(Self { desc: desc.clone(), attachments })
    }

    fn attachment(&self, index: usize) -> Result<&SoftwareTexture, GpuError> {
        self.desc.check_index(index)?;
        Ok(&self.attachments[index])
    }
}

impl Framebuffer for SoftwareFramebuffer {
    type Texture = SoftwareTexture;

    fn desc(&self) -> &FramebufferDesc {
        &self.desc
    }

    fn clear_color_buffer(&mut self, index: usize, rgba: [f32; 4]) -> Result<(), GpuError> {
        let attachment = self.attachment(index)?;
        let mut data = attachment.0.try_borrow_mut().map_err(|_| GpuError::FeedbackLoop)?;
        let value = data.desc.format.mask(rgba);
        data.texels.fill(value);
        Ok(())
    }

    fn color_attachment_texture(&self, index: usize) -> Result<SoftwareTexture, GpuError> {
        self.attachment(index).cloned()
    }

    fn read_floating_point_rgba(&self, index: usize) -> Result<Vec<f32>, GpuError> {
        Ok(self.attachment(index)?.to_rgba())
    }

    fn blit_color_attachment(&mut self, index: usize, source: &SoftwareTexture) -> Result<(), GpuError> {
        let attachment = self.attachment(index)?;
        if attachment.ptr_eq(source) {
            return Err(GpuError::FeedbackLoop);
        }

        let source = source.0.borrow();
        let mut target = attachment.0.borrow_mut();
        let (width, height) = (self.desc.width, self.desc.height);
        let format = target.desc.format;

        for y in 0..height {
            for x in 0..width {
                let u = (x as f32 + 0.5) / width as f32;
                let v = (y as f32 + 0.5) / height as f32;
                target.texels[(y * width + x) as usize] = format.mask(source.sample_bilinear(u, v));
            }
        }
        Ok(())
    }
}
