use std::{cell::RefCell, rc::Rc};

use specfit::gpu::TextureDesc;

/// Texel storage. Every texel is kept as RGBA with the format mask already applied, so
/// reads never need to know the format.
#[derive(Debug)]
pub struct TextureData {
    pub(crate) desc: TextureDesc,
    pub(crate) texels: Vec<[f32; 4]>,
}

impl TextureData {
    pub(crate) fn new(desc: TextureDesc) -> Self {
        let cleared = desc.format.mask([0.0; 4]);
        Self { desc, texels: vec![cleared; desc.texel_count()] }
    }

    pub(crate) fn from_rgba(desc: TextureDesc, data: &[f32]) -> Self {
        let texels = data
            .chunks_exact(4)
            .map(|t| desc.format.mask([t[0], t[1], t[2], t[3]]))
            .collect();
        Self { desc, texels }
    }

    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    pub fn size(&self) -> (u32, u32) {
        (self.desc.width, self.desc.height)
    }

    /// Coordinates are clamped to the edge, like `texelFetch` on a clamped sampler.
    pub fn texel(&self, x: i64, y: i64, layer: u32) -> [f32; 4] {
        let w = self.desc.width as i64;
        let h = self.desc.height as i64;
        let x = x.clamp(0, w - 1);
        let y = y.clamp(0, h - 1);
        let layer = layer.min(self.desc.layers - 1) as i64;
        self.texels[((layer * h + y) * w + x) as usize]
    }

    /// Bilinear lookup at normalized coordinates on layer 0, texel centers at half-integers.
    pub fn sample_bilinear(&self, u: f32, v: f32) -> [f32; 4] {
        let fx = u * self.desc.width as f32 - 0.5;
        let fy = v * self.desc.height as f32 - 0.5;
        let x0 = fx.floor();
        let y0 = fy.floor();
        let tx = fx - x0;
        let ty = fy - y0;
        let (x0, y0) = (x0 as i64, y0 as i64);

        let t00 = self.texel(x0, y0, 0);
        let t10 = self.texel(x0 + 1, y0, 0);
        let t01 = self.texel(x0, y0 + 1, 0);
        let t11 = self.texel(x0 + 1, y0 + 1, 0);

        std::array::from_fn(|c| {
            let top = t00[c] + (t10[c] - t00[c]) * tx;
            let bottom = t01[c] + (t11[c] - t01[c]) * tx;
            top + (bottom - top) * ty
        })
    }
}

/// Shared handle to a software texture; framebuffer attachments hand these out so a
/// previous result can be read by the next draw.
#[derive(Debug, Clone)]
pub struct SoftwareTexture(pub(crate) Rc<RefCell<TextureData>>);

impl SoftwareTexture {
    pub(crate) fn new(data: TextureData) -> Self {
        Self(Rc::new(RefCell::new(data)))
    }

    pub fn desc(&self) -> TextureDesc {
        self.0.borrow().desc
    }

    /// Four floats per texel, layers one after another.
    pub fn to_rgba(&self) -> Vec<f32> {
        self.0.borrow().texels.iter().flatten().copied().collect()
    }

    pub fn ptr_eq(&self, other: &SoftwareTexture) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

#[cfg(test)]
mod tests {
    use specfit::gpu::ColorFormat;

    use super::*;

    #[test]
    fn test_texel_clamps_to_edge() {
        let desc = TextureDesc::new_2d(2, 2, ColorFormat::R32F);
        let data = TextureData::from_rgba(desc, &[1.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 3.0, 0.0, 0.0, 0.0, 4.0, 0.0, 0.0, 0.0]);

        assert_eq!(data.texel(-3, 0, 0), [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(data.texel(5, 1, 0), [4.0, 0.0, 0.0, 1.0]);
        assert_eq!(data.texel(1, 0, 7), [2.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_bilinear_center_and_midpoint() {
        let desc = TextureDesc::new_2d(2, 1, ColorFormat::Rgba32F);
        let data = TextureData::from_rgba(desc, &[0.0, 0.0, 0.0, 1.0, 1.0, 2.0, 4.0, 1.0]);

        assert_eq!(data.sample_bilinear(0.25, 0.5), [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(data.sample_bilinear(0.5, 0.5), [0.5, 1.0, 2.0, 1.0]);
        assert_eq!(data.sample_bilinear(1.0, 0.5), [1.0, 2.0, 4.0, 1.0]);
    }
}
