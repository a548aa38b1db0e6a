use std::sync::Arc;

use specfit::{
    GpuError,
    gpu::ProgramDesc,
    microfacet::{encode_reflectivity, encode_roughness, estimate_lobe},
    roughness::shaders::estimate_specular::*,
};

use super::{BasisLayout, is_valid};
use crate::program::{Fragment, FragmentShader};

pub struct EstimateSpecular {
    layout: BasisLayout,
}

impl EstimateSpecular {
    pub fn compile(desc: &ProgramDesc) -> Result<Arc<dyn FragmentShader>, GpuError> {
        Ok(Arc::new(Self { layout: BasisLayout::from_defines(desc)? }))
    }
}

impl FragmentShader for EstimateSpecular {
    fn shade(&self, fragment: &Fragment<'_>, outputs: &mut [[f32; 4]]) -> bool {
        if !is_valid(fragment, T_WEIGHT_MASK) {
            return false;
        }

        let curves = self.layout.reconstruct(fragment, T_BASIS_FUNCTIONS, T_WEIGHT_MAPS);
        let lobes = curves.each_ref().map(|curve| estimate_lobe(curve));
        let gamma_inv = fragment.uniform(U_GAMMA_INV);

        let results = [
            lobes.map(|lobe| encode_reflectivity(lobe.reflectivity, gamma_inv)),
            lobes.map(|lobe| encode_roughness(lobe.alpha_squared)),
        ];
        for (output, [r, g, b]) in outputs.iter_mut().zip(results) {
            *output = [r, g, b, 1.0];
        }
        true
    }
}
