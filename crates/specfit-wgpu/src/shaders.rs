use std::collections::HashMap;

use specfit::{
    GpuError,
    gpu::ProgramDesc,
    roughness::shaders::{self, BASIS_COUNT, BASIS_RESOLUTION},
};

pub(crate) const BLIT: &str = "common/blit";

const FULLSCREEN_WGSL: &str = include_str!("../shaders/common/fullscreen.wgsl");
const BLIT_WGSL: &str = include_str!("../shaders/common/blit.wgsl");
const MICROFACET_WGSL: &str = include_str!("../shaders/specularfit/microfacet.wgsl");
const ESTIMATE_SPECULAR_WGSL: &str = include_str!("../shaders/specularfit/estimate_specular.wgsl");
const OPTIMIZE_ROUGHNESS_WGSL: &str = include_str!("../shaders/specularfit/optimize_roughness.wgsl");

/// A fragment stage: the WGSL chunks it is assembled from and the defines it reads.
struct FragmentSource {
    chunks: &'static [&'static str],
    defines: &'static [&'static str],
}

/// WGSL sources by program name. Defines are prepended to the assembled module as
/// `const NAME: i32 = value;` lines.
pub struct ShaderLibrary {
    vertex: HashMap<&'static str, &'static str>,
    fragment: HashMap<&'static str, FragmentSource>,
}

impl ShaderLibrary {
    pub fn builtin() -> Self {
        let vertex = HashMap::from([(shaders::FULLSCREEN_VERTEX, FULLSCREEN_WGSL)]);
        let fragment = HashMap::from([
            (
                shaders::ESTIMATE_SPECULAR,
                FragmentSource {
                    chunks: &[MICROFACET_WGSL, ESTIMATE_SPECULAR_WGSL],
                    defines: &[BASIS_COUNT, BASIS_RESOLUTION],
                },
            ),
            (
                shaders::OPTIMIZE_ROUGHNESS,
                FragmentSource {
                    chunks: &[MICROFACET_WGSL, OPTIMIZE_ROUGHNESS_WGSL],
                    defines: &[BASIS_COUNT, BASIS_RESOLUTION],
                },
            ),
            (BLIT, FragmentSource { chunks: &[BLIT_WGSL], defines: &[] }),
        ]);
        Self { vertex, fragment }
    }

    pub fn assemble(&self, desc: &ProgramDesc) -> Result<String, GpuError> {
        let vertex = self
            .vertex
            .get(desc.vertex.as_str())
            .ok_or_else(|| GpuError::ShaderNotFound(desc.vertex.clone()))?;
        let fragment = self
            .fragment
            .get(desc.fragment.as_str())
            .ok_or_else(|| GpuError::ShaderNotFound(desc.fragment.clone()))?;

        let mut source = String::new();
        for name in fragment.defines {
            let value = desc.require_define(name)?;
            source.push_str(&format!("const {name}: i32 = {value};\n"));
        }
        source.push_str(vertex);
        for chunk in fragment.chunks {
            source.push('\n');
            source.push_str(chunk);
        }
        Ok(source)
    }
}

#[cfg(test)]
mod tests {
    use specfit::gpu::ShaderInterface;

    use super::*;

    const EMPTY: ShaderInterface = ShaderInterface { uniforms: &[], textures: &[], outputs: 1 };

    #[test]
    fn test_defines_are_prepended() {
        let desc = shaders::program_desc(shaders::ESTIMATE_SPECULAR, shaders::estimate_specular::INTERFACE, 3, 90);
        let source = ShaderLibrary::builtin().assemble(&desc).unwrap();
        assert!(source.starts_with("const BASIS_COUNT: i32 = 3;\nconst BASIS_RESOLUTION: i32 = 90;\n"));
        assert!(source.contains("fn vs_main"));
        assert!(source.contains("fn estimate_lobe"));
    }

    #[test]
    fn test_missing_sources_and_defines() {
        let library = ShaderLibrary::builtin();

        let desc = ProgramDesc::new("common/nothing", BLIT, EMPTY);
        assert!(matches!(library.assemble(&desc), Err(GpuError::ShaderNotFound(name)) if name == "common/nothing"));

        let desc = ProgramDesc::new(shaders::FULLSCREEN_VERTEX, "specularfit/nothing", EMPTY);
        assert!(matches!(library.assemble(&desc), Err(GpuError::ShaderNotFound(_))));

        let desc = ProgramDesc::new(shaders::FULLSCREEN_VERTEX, shaders::OPTIMIZE_ROUGHNESS, EMPTY)
            .define(BASIS_RESOLUTION, 8);
        assert!(matches!(
            library.assemble(&desc),
            Err(GpuError::MissingDefine { define, .. }) if define == BASIS_COUNT
        ));

        let desc = ProgramDesc::new(shaders::FULLSCREEN_VERTEX, BLIT, EMPTY);
        assert!(library.assemble(&desc).is_ok());
    }
}
