use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};

use super::{ExportReport, lod, serializer};

pub const MATERIAL_EXTRAS_FILE_NAME: &str = "materialExtras.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LodInfo {
    pub base_res: u32,
    pub lods: BTreeMap<u32, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextureReference {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lod_info: Option<LodInfo>,
}

impl TextureReference {
    pub fn new(uri: &str) -> Self {
        Self { uri: uri.to_owned(), lod_info: None }
    }

    fn add_lods(&mut self, base_res: u32, minimum: u32) {
        let lods = lod::lod_sizes(base_res, minimum)
            .into_iter()
            .map(|size| (size, lod::lod_file_name(Path::new(&self.uri), size).to_string_lossy().into_owned()))
            .collect();
        self.lod_info = Some(LodInfo { base_res, lods });
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecularWeights {
    /// weight maps per texture: 1, or 4 when packed into RGBA
    pub stride: u32,
    pub textures: Vec<TextureReference>,
}

/// Texture and basis references attached to the exported material for the viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialExtras {
    pub base_color_texture: TextureReference,
    pub diffuse_texture: TextureReference,
    pub normal_texture: TextureReference,
    pub roughness_metallic_texture: TextureReference,
    pub specular_texture: TextureReference,
    pub roughness_texture: TextureReference,
    pub basis_functions_uri: String,
    pub specular_weights: SpecularWeights,
}

impl MaterialExtras {
    pub fn new(basis_count: usize, combined_weights: bool) -> Self {
        let (stride, names): (u32, Vec<String>) = if combined_weights {
            (
                serializer::WEIGHTS_PER_COMBINED_IMAGE as u32,
                (0..serializer::combined_weight_image_count(basis_count))
                    .map(serializer::combined_weight_file_name)
                    .collect(),
            )
        } else {
            (1, (0..basis_count).map(serializer::weight_file_name).collect())
        };

        Self {
            base_color_texture: TextureReference::new("albedo.png"),
            diffuse_texture: TextureReference::new("diffuse.png"),
            normal_texture: TextureReference::new("normal.png"),
            roughness_metallic_texture: TextureReference::new("orm.png"),
            specular_texture: TextureReference::new("specular.png"),
            roughness_texture: TextureReference::new("roughness.png"),
            basis_functions_uri: serializer::BASIS_FUNCTIONS_FILE_NAME.to_owned(),
            specular_weights: SpecularWeights {
                stride,
                textures: names.iter().map(|n| TextureReference::new(n)).collect(),
            },
        }
    }

    /// Lists the LOD chain each texture gets from [`LodGenerator`](super::LodGenerator).
    /// `base_res` is the texture height, which the chain is keyed on.
    pub fn with_lods(mut self, base_res: u32, minimum: u32) -> Self {
        for texture in [
            &mut self.base_color_texture,
            &mut self.diffuse_texture,
            &mut self.normal_texture,
            &mut self.roughness_metallic_texture,
            &mut self.specular_texture,
            &mut self.roughness_texture,
        ] {
            texture.add_lods(base_res, minimum);
        }
        for texture in &mut self.specular_weights.textures {
            texture.add_lods(base_res, minimum);
        }
        self
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn write(&self, directory: &Path) -> ExportReport {
        let path = directory.join(MATERIAL_EXTRAS_FILE_NAME);
        let mut report = ExportReport::default();
        let result = self
            .to_json()
            .map_err(|e| e.to_string())
            .and_then(|json| std::fs::write(&path, json).map_err(|e| e.to_string()));
        report.record(path, result);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extras_json() {
        let extras = MaterialExtras::new(6, true).with_lods(1024, 256);
        let json: serde_json::Value = serde_json::from_str(&extras.to_json().unwrap()).unwrap();

        assert_eq!(json["baseColorTexture"]["uri"], "albedo.png");
        assert_eq!(json["roughnessMetallicTexture"]["uri"], "orm.png");
        assert_eq!(json["basisFunctionsUri"], "basisFunctions.csv");
        assert_eq!(json["specularWeights"]["stride"], 4);
        assert_eq!(json["specularWeights"]["textures"][1]["uri"], "weights0407.png");
        assert_eq!(json["specularTexture"]["lodInfo"]["baseRes"], 1024);
        assert_eq!(json["specularTexture"]["lodInfo"]["lods"]["256"], "specular-256.png");
    }

    #[test]
    fn test_extras_without_lods() {
        let extras = MaterialExtras::new(2, false);
        assert_eq!(extras.specular_weights.stride, 1);
        assert_eq!(extras.specular_weights.textures[1].uri, "weights01.png");

        let json = extras.to_json().unwrap();
        assert!(!json.contains("lodInfo"));
        let parsed: MaterialExtras = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, extras);
    }

    #[test]
    fn test_write() {
        let dir = tempfile::tempdir().unwrap();
        let report = MaterialExtras::new(1, false).write(dir.path());
        assert!(report.is_complete());
        assert!(dir.path().join(MATERIAL_EXTRAS_FILE_NAME).exists());
    }
}
