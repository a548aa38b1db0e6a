//! Names and input layouts of the roughness fitting programs. Every backend provides
//! shaders under these names; the slot constants index the interface arrays.

use crate::gpu::{ProgramDesc, ShaderInterface, TextureBinding, TextureKind};

pub const FULLSCREEN_VERTEX: &str = "common/fullscreen";
pub const ESTIMATE_SPECULAR: &str = "specularfit/estimate_specular";
pub const OPTIMIZE_ROUGHNESS: &str = "specularfit/optimize_roughness";

pub const BASIS_COUNT: &str = "BASIS_COUNT";
pub const BASIS_RESOLUTION: &str = "BASIS_RESOLUTION";

pub const GAMMA: &str = "gamma";
pub const GAMMA_INV: &str = "gamma_inv";
pub const DAMPING_SCALE: &str = "damping_scale";
pub const DAMPING_INCREASE: &str = "damping_increase";
pub const DAMPING_DECREASE: &str = "damping_decrease";

pub const BASIS_FUNCTIONS: &str = "basis_functions";
pub const WEIGHT_MAPS: &str = "weight_maps";
pub const WEIGHT_MASK: &str = "weight_mask";
pub const DIFFUSE_MAP: &str = "diffuse_map";
pub const SPECULAR_ESTIMATE: &str = "specular_estimate";
pub const ROUGHNESS_MAP: &str = "roughness_map";
pub const DAMPING_TEX: &str = "damping_tex";

const SHARED_TEXTURES: [TextureBinding; 3] = [
    TextureBinding { name: BASIS_FUNCTIONS, kind: TextureKind::D2 },
    TextureBinding { name: WEIGHT_MAPS, kind: TextureKind::D2Array },
    TextureBinding { name: WEIGHT_MASK, kind: TextureKind::D2 },
];

/// Writes the gamma-encoded reflectivity (0) and roughness (1) estimated in one pass.
pub mod estimate_specular {
    use super::*;

    pub const U_GAMMA: usize = 0;
    pub const U_GAMMA_INV: usize = 1;

    pub const T_BASIS_FUNCTIONS: usize = 0;
    pub const T_WEIGHT_MAPS: usize = 1;
    pub const T_WEIGHT_MASK: usize = 2;

    pub const INTERFACE: ShaderInterface = ShaderInterface {
        uniforms: &[GAMMA, GAMMA_INV],
        textures: &SHARED_TEXTURES,
        outputs: 2,
    };
}

/// One damped refinement step from the previous reflectivity, roughness and damping.
/// Writes reflectivity (0), roughness (1) and damping/error (2).
pub mod optimize_roughness {
    use super::*;

    pub const U_GAMMA: usize = 0;
    pub const U_GAMMA_INV: usize = 1;
    pub const U_DAMPING_SCALE: usize = 2;
    pub const U_DAMPING_INCREASE: usize = 3;
    pub const U_DAMPING_DECREASE: usize = 4;

    pub const T_BASIS_FUNCTIONS: usize = 0;
    pub const T_WEIGHT_MAPS: usize = 1;
    pub const T_WEIGHT_MASK: usize = 2;
    pub const T_DIFFUSE_MAP: usize = 3;
    pub const T_SPECULAR_ESTIMATE: usize = 4;
    pub const T_ROUGHNESS_MAP: usize = 5;
    pub const T_DAMPING_TEX: usize = 6;

    pub const INTERFACE: ShaderInterface = ShaderInterface {
        uniforms: &[GAMMA, GAMMA_INV, DAMPING_SCALE, DAMPING_INCREASE, DAMPING_DECREASE],
        textures: &[
            SHARED_TEXTURES[0],
            SHARED_TEXTURES[1],
            SHARED_TEXTURES[2],
            TextureBinding { name: DIFFUSE_MAP, kind: TextureKind::D2 },
            TextureBinding { name: SPECULAR_ESTIMATE, kind: TextureKind::D2 },
            TextureBinding { name: ROUGHNESS_MAP, kind: TextureKind::D2 },
            TextureBinding { name: DAMPING_TEX, kind: TextureKind::D2 },
        ],
        outputs: 3,
    };
}

pub fn program_desc(fragment: &str, interface: ShaderInterface, basis_count: usize, resolution: usize) -> ProgramDesc {
    ProgramDesc::new(FULLSCREEN_VERTEX, fragment, interface)
        .define(BASIS_COUNT, basis_count as i64)
        .define(BASIS_RESOLUTION, resolution as i64)
}
