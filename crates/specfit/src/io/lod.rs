use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageReader, Rgba32FImage, imageops};
use tracing::{debug, info_span};

use crate::error::SerializationError;

use super::{ExportReport, serializer};

/// Textures written by a full export, in addition to the weight images.
pub const STANDARD_TEXTURES: [&str; 7] = [
    "albedo.png",
    "diffuse.png",
    "normal.png",
    "orm.png",
    "specular.png",
    "roughness.png",
    "constant.png",
];

/// `base / 2, base / 4, ...` down to and including `minimum`.
pub fn lod_sizes(base: u32, minimum: u32) -> Vec<u32> {
    let minimum = minimum.max(1);
    let mut sizes = Vec::new();
    let mut size = base / 2;
    while size >= minimum {
        sizes.push(size);
        size /= 2;
    }
    sizes
}

/// `dir/name.ext` becomes `dir/name-size.ext`.
pub fn lod_file_name(path: &Path, size: u32) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}-{size}.{}", ext.to_string_lossy()),
        None => format!("{stem}-{size}"),
    };
    path.with_file_name(name)
}

/// Writes downsampled copies of exported textures next to the originals.
#[derive(Debug, Clone, Copy)]
pub struct LodGenerator {
    minimum_resolution: u32,
}

impl LodGenerator {
    pub fn new(minimum_resolution: u32) -> Self {
        Self { minimum_resolution }
    }

    pub fn minimum_resolution(&self) -> u32 {
        self.minimum_resolution
    }

    /// Generates the chain for one image, keyed on its height. A missing source is
    /// skipped silently.
    pub fn generate_lods_for(&self, path: &Path) -> ExportReport {
        let mut report = ExportReport::default();
        if !path.exists() {
            debug!("skipping lods for missing {}", path.display());
            return report;
        }

        let source = match open(path) {
            Ok(source) => source,
            Err(e) => {
                report.record(path.to_owned(), Err(e));
                return report;
            }
        };

        let (width, height) = (source.width(), source.height());
        let mut level: Rgba32FImage = source.to_rgba32f();

        for size in lod_sizes(height, self.minimum_resolution) {
            let level_width = (width as u64 * size as u64 / height as u64).max(1) as u32;
            level = imageops::resize(&level, level_width, size, imageops::FilterType::Lanczos3);

            let target = lod_file_name(path, size);
            let result = convert_like(&source, level.clone()).save(&target);
            report.record(target, result);
        }

        report
    }

    /// Generates chains for every standard texture and weight image in `directory`.
    pub fn rescale_all(&self, directory: &Path, basis_count: usize, combined_weights: bool) -> ExportReport {
        let _span = info_span!("rescale_all", directory = %directory.display()).entered();
        let mut report = ExportReport::default();

        let weight_files: Vec<String> = if combined_weights {
            (0..serializer::combined_weight_image_count(basis_count))
                .map(serializer::combined_weight_file_name)
                .collect()
        } else {
            (0..basis_count).map(serializer::weight_file_name).collect()
        };

        for name in STANDARD_TEXTURES.iter().copied().chain(weight_files.iter().map(String::as_str)) {
            report.merge(self.generate_lods_for(&directory.join(name)));
        }

        report
    }
}

fn open(path: &Path) -> Result<DynamicImage, SerializationError> {
    Ok(ImageReader::open(path)?.with_guessed_format()?.decode()?)
}

/// Converts a float level back to the channel layout and depth of the source.
fn convert_like(source: &DynamicImage, level: Rgba32FImage) -> DynamicImage {
    let level = DynamicImage::ImageRgba32F(level);
    let color = source.color();
    let sixteen_bit = color.bytes_per_pixel() / color.channel_count() >= 2;

    match (color.has_color(), color.has_alpha(), sixteen_bit) {
        (false, false, false) => DynamicImage::ImageLuma8(level.to_luma8()),
        (false, true, false) => DynamicImage::ImageLumaA8(level.to_luma_alpha8()),
        (true, false, false) => DynamicImage::ImageRgb8(level.to_rgb8()),
        (true, true, false) => DynamicImage::ImageRgba8(level.to_rgba8()),
        (false, false, true) => DynamicImage::ImageLuma16(level.to_luma16()),
        (false, true, true) => DynamicImage::ImageLumaA16(level.to_luma_alpha16()),
        (true, false, true) => DynamicImage::ImageRgb16(level.to_rgb16()),
        (true, true, true) => DynamicImage::ImageRgba16(level.to_rgba16()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lod_sizes() {
        assert_eq!(lod_sizes(2048, 256), vec![1024, 512, 256]);
        assert!(lod_sizes(300, 256).is_empty());
        assert_eq!(lod_sizes(8, 0), vec![4, 2, 1]);
    }

    #[test]
    fn test_lod_file_name() {
        assert_eq!(lod_file_name(Path::new("out/specular.png"), 512), PathBuf::from("out/specular-512.png"));
        assert_eq!(lod_file_name(Path::new("weights00"), 64), PathBuf::from("weights00-64"));
    }

    #[test]
    fn test_generate_lods() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("albedo.png");
        image::RgbImage::from_pixel(64, 32, image::Rgb([200, 100, 50])).save(&path).unwrap();

        let report = LodGenerator::new(8).generate_lods_for(&path);
        assert!(report.is_complete());
        assert_eq!(report.written.len(), 2);

        let half = image::open(dir.path().join("albedo-16.png")).unwrap();
        assert_eq!((half.width(), half.height()), (32, 16));
        assert_eq!(half.color(), image::ColorType::Rgb8);
        let pixel = half.to_rgb8().get_pixel(10, 8).0;
        assert!(pixel.iter().zip([200u8, 100, 50]).all(|(a, b)| a.abs_diff(b) <= 1));

        assert!(dir.path().join("albedo-8.png").exists());
        assert!(!dir.path().join("albedo-4.png").exists());
    }

    #[test]
    fn test_rescale_all_skips_missing() {
        let dir = tempfile::tempdir().unwrap();
        image::GrayImage::from_pixel(16, 16, image::Luma([128])).save(dir.path().join("weights01.png")).unwrap();
        image::GrayImage::from_pixel(16, 16, image::Luma([128])).save(dir.path().join("weights0003.png")).unwrap();

        let report = LodGenerator::new(4).rescale_all(dir.path(), 3, false);
        assert!(report.is_complete());
        assert_eq!(report.written.len(), 2);
        assert!(dir.path().join("weights01-8.png").exists());
        assert!(dir.path().join("weights01-4.png").exists());
        assert!(!dir.path().join("weights0003-8.png").exists());

        let report = LodGenerator::new(4).rescale_all(dir.path(), 3, true);
        assert_eq!(report.written.len(), 2);
        assert!(dir.path().join("weights0003-8.png").exists());
    }
}
