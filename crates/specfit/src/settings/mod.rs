use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureResolution {
    pub width: u32,
    pub height: u32,
}

impl TextureResolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn texel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Multiplicative damping adjustments for the Levenberg-Marquardt refinement.
/// Applied both to the per-pixel damping channel and to the global damping scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DampingSchedule {
    pub initial: f32,
    /// factor applied after a rejected step
    pub increase: f32,
    /// factor applied after an accepted step
    pub decrease: f32,
}

impl Default for DampingSchedule {
    fn default() -> Self {
        Self {
            initial: 1.0,
            increase: 2.0,
            decrease: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoughnessMode {
    Simple,
    #[default]
    Iterative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoughnessSettings {
    pub mode: RoughnessMode,
    pub gamma: f32,
    pub convergence_tolerance: f64,
    pub unsuccessful_iterations_allowed: u32,
    pub damping: DampingSchedule,
}

impl Default for RoughnessSettings {
    fn default() -> Self {
        Self {
            mode: RoughnessMode::default(),
            gamma: 2.2,
            convergence_tolerance: 1e-5,
            unsuccessful_iterations_allowed: 8,
            damping: DampingSchedule::default(),
        }
    }
}

impl RoughnessSettings {
    /// The unsuccessful-iteration cap is mandatory; zero is treated as one.
    pub fn iteration_cap(&self) -> u32 {
        if self.unsuccessful_iterations_allowed == 0 {
            warn!("unsuccessful_iterations_allowed must be at least 1, using 1");
            1
        } else {
            self.unsuccessful_iterations_allowed
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub generate_low_res_textures: bool,
    pub minimum_texture_resolution: u32,
    pub combine_weights: bool,
    pub write_material_extras: bool,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            generate_low_res_textures: false,
            minimum_texture_resolution: 128,
            combine_weights: false,
            write_material_extras: true,
        }
    }
}

/// The fit runs at the resolution of the weight images, so it is not configured here.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecularFitSettings {
    pub roughness: RoughnessSettings,
    pub export: ExportSettings,
}

impl SpecularFitSettings {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse settings file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_settings_use_defaults() {
        let settings: SpecularFitSettings = serde_json::from_str(
            r#"{ "roughness": { "mode": "simple", "damping": { "increase": 4.0 } } }"#,
        )
        .unwrap();

        assert_eq!(settings.roughness.mode, RoughnessMode::Simple);
        assert_eq!(settings.roughness.gamma, 2.2);
        assert_eq!(settings.roughness.damping.increase, 4.0);
        assert_eq!(settings.roughness.damping.decrease, 0.5);
        assert_eq!(settings.export.minimum_texture_resolution, 128);
    }

    #[test]
    fn test_zero_iteration_cap_is_coerced() {
        let settings = RoughnessSettings {
            unsuccessful_iterations_allowed: 0,
            ..Default::default()
        };
        assert_eq!(settings.iteration_cap(), 1);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "export": { "combine_weights": true } }"#).unwrap();

        let settings = SpecularFitSettings::load(&path).unwrap();
        assert!(settings.export.combine_weights);
        assert_eq!(settings.roughness, RoughnessSettings::default());
        assert!(SpecularFitSettings::load(&dir.path().join("missing.json")).is_err());
    }
}
