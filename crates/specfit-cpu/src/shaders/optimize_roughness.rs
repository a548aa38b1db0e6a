use std::sync::Arc;

use specfit::{
    GpuError,
    gpu::ProgramDesc,
    microfacet::{
        Lobe, MIN_ALPHA_SQUARED, decode_reflectivity, decode_roughness, encode_reflectivity, encode_roughness,
        refine_pixel,
    },
    roughness::shaders::optimize_roughness::*,
};

use super::{BasisLayout, is_valid};
use crate::program::{Fragment, FragmentShader};

pub struct OptimizeRoughness {
    layout: BasisLayout,
}

impl OptimizeRoughness {
    pub fn compile(desc: &ProgramDesc) -> Result<Arc<dyn FragmentShader>, GpuError> {
        Ok(Arc::new(Self { layout: BasisLayout::from_defines(desc)? }))
    }
}

impl FragmentShader for OptimizeRoughness {
    fn shade(&self, fragment: &Fragment<'_>, outputs: &mut [[f32; 4]]) -> bool {
        if !is_valid(fragment, T_WEIGHT_MASK) {
            return false;
        }

        let curves = self.layout.reconstruct(fragment, T_BASIS_FUNCTIONS, T_WEIGHT_MAPS);
        let gamma = fragment.uniform(U_GAMMA);
        let gamma_inv = fragment.uniform(U_GAMMA_INV);

        let reflectivity = fragment.here(T_SPECULAR_ESTIMATE);
        let roughness = fragment.here(T_ROUGHNESS_MAP);
        let [damping, ..] = fragment.here(T_DAMPING_TEX);
        let diffuse = fragment.here(T_DIFFUSE_MAP);

        let lobes: [Lobe; 3] = std::array::from_fn(|c| Lobe {
            reflectivity: decode_reflectivity(reflectivity[c], gamma),
            alpha_squared: decode_roughness(roughness[c]).clamp(MIN_ALPHA_SQUARED, 1.0),
        });
        // energy left over after the diffuse lobe
        let max_reflectivity: [f32; 3] = std::array::from_fn(|c| (1.0 - diffuse[c]).max(0.0));

        let refined = refine_pixel(
            [curves[0].as_slice(), curves[1].as_slice(), curves[2].as_slice()],
            lobes,
            damping,
            fragment.uniform(U_DAMPING_SCALE),
            max_reflectivity,
            fragment.uniform(U_DAMPING_INCREASE),
            fragment.uniform(U_DAMPING_DECREASE),
        );

        let [r, g, b] = refined.lobes;
        let results = [
            [
                encode_reflectivity(r.reflectivity, gamma_inv),
                encode_reflectivity(g.reflectivity, gamma_inv),
                encode_reflectivity(b.reflectivity, gamma_inv),
                1.0,
            ],
            [encode_roughness(r.alpha_squared), encode_roughness(g.alpha_squared), encode_roughness(b.alpha_squared), 1.0],
            [refined.damping, refined.error, 0.0, 1.0],
        ];
        for (output, result) in outputs.iter_mut().zip(results) {
            *output = result;
        }
        true
    }
}
