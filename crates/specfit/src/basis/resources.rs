use crate::{
    error::GpuError,
    gpu::{ColorFormat, Context, TextureDesc},
};

use super::{BasisWeights, MaterialBasis};

/// Basis functions uploaded as a `(M + 1) × B` texture, one row per basis function with
/// the red, green and blue curves in the first three channels.
pub struct BasisResources<C: Context> {
    context: C,
    basis_count: usize,
    resolution: usize,
    basis_functions: C::Texture,
}

impl<C: Context> BasisResources<C> {
    pub fn new(context: &C, basis: &impl MaterialBasis) -> Result<Self, GpuError> {
        let basis_count = basis.basis_count();
        let resolution = basis.resolution();
        let samples = resolution + 1;

        let mut data = Vec::with_capacity(basis_count * samples * 4);
        for b in 0..basis_count {
            for m in 0..samples {
                data.extend_from_slice(&[
                    basis.evaluate_specular_red(b, m) as f32,
                    basis.evaluate_specular_green(b, m) as f32,
                    basis.evaluate_specular_blue(b, m) as f32,
                    0.0,
                ]);
            }
        }

        let desc = TextureDesc::new_2d(samples as u32, basis_count as u32, ColorFormat::Rgba32F);
        let basis_functions = context.create_texture(&desc, &data)?;

        Ok(Self { context: context.clone(), basis_count, resolution, basis_functions })
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn basis_count(&self) -> usize {
        self.basis_count
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    pub fn basis_functions(&self) -> &C::Texture {
        &self.basis_functions
    }
}

/// Weight maps as a `W × H` array texture with one layer per basis function, plus a
/// validity mask (1 for valid texels).
pub struct BasisWeightResources<C: Context> {
    width: u32,
    height: u32,
    basis_count: usize,
    weight_maps: C::Texture,
    weight_mask: C::Texture,
}

impl<C: Context> BasisWeightResources<C> {
    pub fn new(context: &C, weights: &BasisWeights) -> Result<Self, GpuError> {
        let texels = weights.texel_count();
        let basis_count = weights.basis_count();

        let mut maps = vec![0.0f32; texels * basis_count.max(1) * 4];
        for b in 0..basis_count {
            for p in 0..texels {
                maps[(b * texels + p) * 4] = weights.weight(p, b);
            }
        }

        let mask: Vec<f32> = (0..texels)
            .flat_map(|p| {
                let v = if weights.is_valid(p) { 1.0 } else { 0.0 };
                [v, v, v, 1.0]
            })
            .collect();

        let maps_desc = TextureDesc::new_2d_array(
            weights.width(),
            weights.height(),
            basis_count.max(1) as u32,
            ColorFormat::R32F,
        );
        let mask_desc = TextureDesc::new_2d(weights.width(), weights.height(), ColorFormat::R32F);

        Ok(Self {
            width: weights.width(),
            height: weights.height(),
            basis_count,
            weight_maps: context.create_texture(&maps_desc, &maps)?,
            weight_mask: context.create_texture(&mask_desc, &mask)?,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn basis_count(&self) -> usize {
        self.basis_count
    }

    pub fn weight_maps(&self) -> &C::Texture {
        &self.weight_maps
    }

    pub fn weight_mask(&self) -> &C::Texture {
        &self.weight_mask
    }
}

/// Uploads a linear RGB image (row-major, first row first) as an RGBA float texture.
pub fn create_rgb_texture<C: Context>(
    context: &C,
    width: u32,
    height: u32,
    pixels: &[[f32; 3]],
) -> Result<C::Texture, GpuError> {
    let data: Vec<f32> = pixels.iter().flat_map(|[r, g, b]| [*r, *g, *b, 1.0]).collect();
    context.create_texture(&TextureDesc::new_2d(width, height, ColorFormat::Rgb32F), &data)
}
