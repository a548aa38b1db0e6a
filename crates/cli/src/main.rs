use std::path::{Path, PathBuf};

use anyhow::{Context as _, bail};
use clap::Parser;
use specfit::{
    basis::{BasisResources, BasisWeightResources, BasisWeights, MaterialBasis, SimpleMaterialBasis, create_rgb_texture},
    gpu::Context,
    io::{self, ExportReport, LodGenerator, MaterialExtras},
    microfacet::{estimate_lobe, reflectivity_integral},
    roughness::{IterativeRoughnessOptimizer, SimpleRoughnessOptimizer},
    settings::{RoughnessMode, SpecularFitSettings, TextureResolution},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DIFFUSE_TEXTURE_FILE_NAME: &str = "diffuse.png";

#[derive(Debug, clap::Parser)]
#[command(about = "Specular basis fitting tools")]
struct CommandLineArguments {
    #[arg(long, help = "JSON settings file; command-line options override it")]
    settings: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Backend::Cpu, help = "Backend the fitting programs run on")]
    backend: Backend,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum Backend {
    Cpu,
    #[cfg(feature = "wgpu")]
    Wgpu,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum Mode {
    Simple,
    Iterative,
}

#[derive(Debug, clap::Args)]
struct WeightLayout {
    #[arg(long, help = "Weights are packed four per RGBA image")]
    combined: bool,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    #[command(about = "Fit specular reflectivity and roughness maps from a basis and its weights")]
    FitRoughness {
        #[arg(help = "Directory holding basisFunctions.csv and the weight images")]
        basis_dir: PathBuf,
        #[arg(short, long, help = "Output directory (defaults to the basis directory)")]
        output: Option<PathBuf>,
        #[command(flatten)]
        layout: WeightLayout,
        #[arg(long, value_enum, help = "Roughness fitting mode")]
        mode: Option<Mode>,
        #[arg(long, help = "Gamma of the stored reflectivity")]
        gamma: Option<f32>,
        #[arg(long, help = "Stop once an accepted step improves the error by no more than this")]
        tolerance: Option<f64>,
        #[arg(long, help = "Consecutive rejected steps before giving up")]
        max_unsuccessful: Option<u32>,
        #[arg(long, help = "Export specular.png and roughness.png from this prior solution, rescaled, instead of refitting (simple mode)")]
        prior: Option<PathBuf>,
        #[arg(long, help = "Fill invalid texels from their neighbours before fitting")]
        fill_holes: bool,
        #[arg(long, help = "Also write downsampled copies of every texture")]
        lods: bool,
        #[arg(long, help = "Smallest downsampled resolution")]
        min_lod: Option<u32>,
        #[arg(long, help = "Skip writing materialExtras.json")]
        no_extras: bool,
    },
    #[command(about = "Write downsampled copies of the exported textures in a directory")]
    Lods {
        directory: PathBuf,
        #[arg(long, help = "Number of basis functions")]
        basis_count: usize,
        #[command(flatten)]
        layout: WeightLayout,
        #[arg(long, default_value_t = 128, help = "Smallest downsampled resolution")]
        min: u32,
    },
    #[command(about = "Write materialExtras.json for an exported material")]
    Extras {
        directory: PathBuf,
        #[arg(long, help = "Number of basis functions")]
        basis_count: usize,
        #[command(flatten)]
        layout: WeightLayout,
        #[arg(long, help = "Height of the exported textures; lists their LODs")]
        base_res: Option<u32>,
        #[arg(long, default_value_t = 128, help = "Smallest downsampled resolution")]
        min: u32,
    },
    #[command(about = "Print a summary of basisFunctions.csv as JSON")]
    BasisInfo { basis_dir: PathBuf },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli_args = CommandLineArguments::parse();

    let mut settings = match &cli_args.settings {
        Some(path) => SpecularFitSettings::load(path)?,
        None => SpecularFitSettings::default(),
    };

    match cli_args.command {
        Command::FitRoughness {
            basis_dir,
            output,
            layout,
            mode,
            gamma,
            tolerance,
            max_unsuccessful,
            prior,
            fill_holes,
            lods,
            min_lod,
            no_extras,
        } => {
            // override file / default settings
            let roughness = &mut settings.roughness;
            if let Some(mode) = mode {
                roughness.mode = match mode {
                    Mode::Simple => RoughnessMode::Simple,
                    Mode::Iterative => RoughnessMode::Iterative,
                };
            }
            roughness.gamma = gamma.unwrap_or(roughness.gamma);
            roughness.convergence_tolerance = tolerance.unwrap_or(roughness.convergence_tolerance);
            roughness.unsuccessful_iterations_allowed =
                max_unsuccessful.unwrap_or(roughness.unsuccessful_iterations_allowed);

            let export = &mut settings.export;
            export.combine_weights |= layout.combined;
            export.generate_low_res_textures |= lods;
            export.minimum_texture_resolution = min_lod.unwrap_or(export.minimum_texture_resolution);
            export.write_material_extras &= !no_extras;

            let job = FitJob {
                output: output.unwrap_or_else(|| basis_dir.clone()),
                basis_dir,
                prior,
                fill_holes,
                settings,
            };
            let report = match cli_args.backend {
                Backend::Cpu => job.run(specfit_cpu::SoftwareContext::new())?,
                #[cfg(feature = "wgpu")]
                Backend::Wgpu => job.run(specfit_wgpu::WgpuContext::new()?)?,
            };
            summarize(&report);
        }
        Command::Lods { directory, basis_count, layout, min } => {
            let report = LodGenerator::new(min).rescale_all(&directory, basis_count, layout.combined);
            summarize(&report);
        }
        Command::Extras { directory, basis_count, layout, base_res, min } => {
            let mut extras = MaterialExtras::new(basis_count, layout.combined);
            if let Some(base_res) = base_res {
                extras = extras.with_lods(base_res, min);
            }
            summarize(&extras.write(&directory));
        }
        Command::BasisInfo { basis_dir } => {
            let basis = load_basis(&basis_dir)?;
            println!("{}", serde_json::to_string_pretty(&basis_summary(&basis))?);
        }
    }

    Ok(())
}

fn load_basis(directory: &Path) -> anyhow::Result<SimpleMaterialBasis> {
    match io::deserialize_basis_functions(directory)
        .with_context(|| format!("failed to read basis functions from {}", directory.display()))?
    {
        Some(basis) => Ok(basis),
        None => bail!("{} has no {}", directory.display(), io::BASIS_FUNCTIONS_FILE_NAME),
    }
}

fn basis_summary(basis: &SimpleMaterialBasis) -> serde_json::Value {
    let functions: Vec<serde_json::Value> = (0..basis.basis_count())
        .map(|b| {
            let channels: Vec<serde_json::Value> = (0..3)
                .map(|c| {
                    let curve: Vec<f32> =
                        (0..=basis.resolution()).map(|m| basis.evaluate_specular(c, b, m) as f32).collect();
                    let lobe = estimate_lobe(&curve);
                    serde_json::json!({
                        "reflectivity": reflectivity_integral(&curve),
                        "alphaSquared": lobe.alpha_squared,
                    })
                })
                .collect();
            serde_json::json!({
                "index": b,
                "diffuse": basis.diffuse_color(b),
                "specular": channels,
            })
        })
        .collect();

    serde_json::json!({
        "basisCount": basis.basis_count(),
        "resolution": basis.resolution(),
        "functions": functions,
    })
}

fn summarize(report: &ExportReport) {
    info!(written = report.written.len(), failed = report.failed.len(), "export finished");
    for (path, message) in &report.failed {
        warn!("{}: {message}", path.display());
    }
}

struct FitJob {
    basis_dir: PathBuf,
    output: PathBuf,
    prior: Option<PathBuf>,
    fill_holes: bool,
    settings: SpecularFitSettings,
}

impl FitJob {
    fn load_weights(&self, basis_count: usize) -> anyhow::Result<BasisWeights> {
        let mut weights = if self.settings.export.combine_weights {
            io::load_combined_weight_images(&self.basis_dir, basis_count)
        } else {
            io::load_weight_images(&self.basis_dir, basis_count)
        }
        .with_context(|| format!("failed to read weight images from {}", self.basis_dir.display()))?;

        if self.fill_holes {
            let filled = weights.fill_holes();
            info!(filled, "filled invalid texels");
        }
        Ok(weights)
    }

    /// Linear diffuse albedo: `diffuse.png` next to the basis if present, otherwise the
    /// weighted basis diffuse colors.
    fn diffuse(&self, basis: &SimpleMaterialBasis, weights: &BasisWeights) -> anyhow::Result<Vec<[f32; 3]>> {
        let path = self.basis_dir.join(DIFFUSE_TEXTURE_FILE_NAME);
        if !path.exists() {
            return Ok(weights.diffuse_albedo(basis));
        }

        let (width, height, rgba) =
            io::read_rgba_f32(&path, true).with_context(|| format!("failed to read {}", path.display()))?;
        if (width, height) != (weights.width(), weights.height()) {
            bail!(
                "{} is {width}x{height} but the weights are {}x{}",
                path.display(),
                weights.width(),
                weights.height()
            );
        }
        let gamma = self.settings.roughness.gamma;
        Ok(rgba.chunks_exact(4).map(|t| [t[0].powf(gamma), t[1].powf(gamma), t[2].powf(gamma)]).collect())
    }

    fn run<C: Context>(self, context: C) -> anyhow::Result<ExportReport> {
        let basis = load_basis(&self.basis_dir)?;
        let weights = self.load_weights(basis.basis_count())?;
        let resolution = TextureResolution::new(weights.width(), weights.height());

        std::fs::create_dir_all(&self.output)
            .with_context(|| format!("failed to create {}", self.output.display()))?;

        let basis_resources = BasisResources::new(&context, &basis)?;
        let weight_resources = BasisWeightResources::new(&context, &weights)?;
        let roughness = &self.settings.roughness;

        let mut report = match roughness.mode {
            RoughnessMode::Simple => match &self.prior {
                Some(prior) => {
                    info!(prior = %prior.display(), "exporting prior solution instead of refitting");
                    let optimizer = SimpleRoughnessOptimizer::from_prior_solution(&basis_resources, resolution, prior)?;
                    optimizer.save_textures(&self.output)
                }
                None => {
                    let mut optimizer = SimpleRoughnessOptimizer::simple(&basis_resources, resolution)?;
                    optimizer.set_input_weights(&weight_resources)?;
                    optimizer.execute(roughness.gamma)?;
                    optimizer.save_textures(&self.output)
                }
            },
            RoughnessMode::Iterative => {
                if self.prior.is_some() {
                    warn!("a prior solution only applies to the simple fit; ignoring it");
                }
                let diffuse = self.diffuse(&basis, &weights)?;
                let diffuse = create_rgb_texture(&context, resolution.width, resolution.height, &diffuse)?;
                let mut optimizer = IterativeRoughnessOptimizer::iterative(&basis_resources, diffuse, resolution, roughness)?;
                optimizer.set_input_weights(&weight_resources)?;
                if let Some(summary) = optimizer.execute(roughness.gamma)? {
                    info!(
                        iterations = summary.iterations,
                        final_error = summary.final_error,
                        outcome = ?summary.outcome,
                        "roughness refined"
                    );
                }
                optimizer.save_textures(&self.output)
            }
        };

        let export = &self.settings.export;
        if self.output != self.basis_dir {
            report.merge(io::serialize_basis_functions(&basis, &self.output));
            report.merge(if export.combine_weights {
                io::save_combined_weight_images(&weights, &self.output)
            } else {
                io::save_weight_images(&weights, &self.output)
            });
        }

        if export.generate_low_res_textures {
            let lods = LodGenerator::new(export.minimum_texture_resolution);
            report.merge(lods.rescale_all(&self.output, basis.basis_count(), export.combine_weights));
        }

        if export.write_material_extras {
            let mut extras = MaterialExtras::new(basis.basis_count(), export.combine_weights);
            if export.generate_low_res_textures {
                // LOD chains are keyed on image height
                extras = extras.with_lods(resolution.height, export.minimum_texture_resolution);
            }
            report.merge(extras.write(&self.output));
        }

        Ok(report)
    }
}
