//! Fragment programs compiled from Rust closures instead of source text. Programs are looked
//! up by the same names every backend uses and receive the program's defines at compile time.

mod estimate_specular;
mod optimize_roughness;

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use specfit::{
    GpuError,
    gpu::ProgramDesc,
    roughness::shaders::{self, BASIS_COUNT, BASIS_RESOLUTION},
};

use crate::program::{Fragment, FragmentShader};

pub use estimate_specular::EstimateSpecular;
pub use optimize_roughness::OptimizeRoughness;

pub type ShaderFactory = fn(&ProgramDesc) -> Result<Arc<dyn FragmentShader>, GpuError>;

pub struct ShaderRegistry {
    vertex: HashSet<String>,
    fragment: HashMap<String, ShaderFactory>,
}

impl ShaderRegistry {
    pub fn empty() -> Self {
        Self { vertex: HashSet::new(), fragment: HashMap::new() }
    }

    pub fn with_builtin_shaders() -> Self {
        let mut registry = Self::empty();
        registry.register_vertex(shaders::FULLSCREEN_VERTEX);
        registry.register_fragment(shaders::ESTIMATE_SPECULAR, EstimateSpecular::compile);
        registry.register_fragment(shaders::OPTIMIZE_ROUGHNESS, OptimizeRoughness::compile);
        registry
    }

    /// Vertex stages carry no behavior here; only full-screen quads are ever drawn.
    pub fn register_vertex(&mut self, name: &str) {
        self.vertex.insert(name.to_owned());
    }

    pub fn register_fragment(&mut self, name: &str, factory: ShaderFactory) {
        self.fragment.insert(name.to_owned(), factory);
    }

    pub fn compile(&self, desc: &ProgramDesc) -> Result<Arc<dyn FragmentShader>, GpuError> {
        if !self.vertex.contains(&desc.vertex) {
            return Err(GpuError::ShaderNotFound(desc.vertex.clone()));
        }
        let factory = self
            .fragment
            .get(&desc.fragment)
            .ok_or_else(|| GpuError::ShaderNotFound(desc.fragment.clone()))?;
        factory(desc)
    }
}

impl Default for ShaderRegistry {
    fn default() -> Self {
        Self::with_builtin_shaders()
    }
}

/// Basis size baked into a program through its defines.
#[derive(Debug, Clone, Copy)]
struct BasisLayout {
    basis_count: usize,
    resolution: usize,
}

impl BasisLayout {
    fn from_defines(desc: &ProgramDesc) -> Result<Self, GpuError> {
        let basis_count = desc.require_define(BASIS_COUNT)?;
        let resolution = desc.require_define(BASIS_RESOLUTION)?;
        if basis_count < 0 || resolution < 1 {
            return Err(GpuError::ShaderCompile {
                name: desc.fragment.clone(),
                message: format!("invalid basis layout {basis_count}x{resolution}"),
            });
        }
        Ok(Self { basis_count: basis_count as usize, resolution: resolution as usize })
    }

    /// The specular curves of this fragment, `Σ_b w_b · basis_b[m]` per channel.
    fn reconstruct(&self, fragment: &Fragment<'_>, basis_functions: usize, weight_maps: usize) -> [Vec<f32>; 3] {
        let samples = self.resolution + 1;
        let mut curves = [vec![0.0f32; samples], vec![0.0f32; samples], vec![0.0f32; samples]];

        for b in 0..self.basis_count {
            let weight = fragment.texel(weight_maps, fragment.x as i64, fragment.y as i64, b as u32)[0];
            if weight == 0.0 {
                continue;
            }
            for m in 0..samples {
                let basis = fragment.texel(basis_functions, m as i64, b as i64, 0);
                for (c, curve) in curves.iter_mut().enumerate() {
                    curve[m] += weight * basis[c];
                }
            }
        }

        curves
    }
}

fn is_valid(fragment: &Fragment<'_>, weight_mask: usize) -> bool {
    fragment.here(weight_mask)[0] > 0.5
}
