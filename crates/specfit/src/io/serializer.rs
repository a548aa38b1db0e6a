use std::{
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
};

use image::{ImageBuffer, Rgb, Rgba};
use tracing::{debug, warn};

use crate::{
    basis::{BasisWeights, MaterialBasis, SimpleMaterialBasis},
    error::SerializationError,
};

use super::{ExportReport, image_io::read_rgba_f32};

pub const BASIS_FUNCTIONS_FILE_NAME: &str = "basisFunctions.csv";
pub const WEIGHTS_PER_COMBINED_IMAGE: usize = 4;

pub fn weight_file_name(basis_index: usize) -> String {
    format!("weights{basis_index:02}.png")
}

/// Name of an image holding `count` consecutive weight maps starting at `first`.
pub fn weight_file_name_range(first: usize, count: usize) -> String {
    if count <= 1 {
        weight_file_name(first)
    } else {
        format!("weights{first:02}{:02}.png", first + count - 1)
    }
}

pub fn combined_weight_file_name(image_index: usize) -> String {
    weight_file_name_range(image_index * WEIGHTS_PER_COMBINED_IMAGE, WEIGHTS_PER_COMBINED_IMAGE)
}

pub fn combined_weight_image_count(basis_count: usize) -> usize {
    basis_count.div_ceil(WEIGHTS_PER_COMBINED_IMAGE)
}

fn weight_to_u8(weight: f32) -> u8 {
    (weight.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Texel index of image pixel (x, y); images are stored vertically flipped.
fn texel_index(x: u32, y: u32, width: u32, height: u32) -> usize {
    x as usize + width as usize * (height - y - 1) as usize
}

/// One grayscale-in-RGB PNG per basis function.
pub fn save_weight_images(weights: &BasisWeights, directory: &Path) -> ExportReport {
    let (width, height) = (weights.width(), weights.height());
    let mut report = ExportReport::default();

    for b in 0..weights.basis_count() {
        let image = ImageBuffer::from_fn(width, height, |x, y| {
            let w = weight_to_u8(weights.weight(texel_index(x, y, width, height), b));
            Rgb([w, w, w])
        });
        let path = directory.join(weight_file_name(b));
        report.record(path.clone(), image.save(&path));
    }

    report
}

/// Four weight maps per RGBA PNG; channels past the last basis function are zero.
pub fn save_combined_weight_images(weights: &BasisWeights, directory: &Path) -> ExportReport {
    let (width, height) = (weights.width(), weights.height());
    let basis_count = weights.basis_count();
    let mut report = ExportReport::default();

    for i in 0..combined_weight_image_count(basis_count) {
        let image = ImageBuffer::from_fn(width, height, |x, y| {
            let p = texel_index(x, y, width, height);
            Rgba(std::array::from_fn(|c| {
                let b = i * WEIGHTS_PER_COMBINED_IMAGE + c;
                if b < basis_count { weight_to_u8(weights.weight(p, b)) } else { 0 }
            }))
        });
        let path = directory.join(combined_weight_file_name(i));
        report.record(path.clone(), image.save(&path));
    }

    report
}

fn read_weight_image(
    path: &Path,
    expected: &mut Option<(u32, u32)>,
) -> Result<(u32, u32, Vec<f32>), SerializationError> {
    // the flip is undone by texel_index below, so read in image order
    let (width, height, data) = read_rgba_f32(path, false)?;
    match expected {
        Some(size) if *size != (width, height) => Err(SerializationError::Dimensions {
            path: path.to_owned(),
            expected: *size,
            actual: (width, height),
        }),
        _ => {
            *expected = Some((width, height));
            Ok((width, height, data))
        }
    }
}

fn load_weights<F>(basis_count: usize, per_image: usize, mut path_of: F) -> Result<BasisWeights, SerializationError>
where
    F: FnMut(usize) -> PathBuf,
{
    let image_count = basis_count.div_ceil(per_image);
    let mut size = None;
    let mut images = Vec::with_capacity(image_count);
    for i in 0..image_count {
        images.push(read_weight_image(&path_of(i), &mut size)?);
    }

    let (width, height) = size.unwrap_or((0, 0));
    let mut weights = BasisWeights::new(width, height, basis_count);

    for (i, (_, _, data)) in images.iter().enumerate() {
        for y in 0..height {
            for x in 0..width {
                let p = texel_index(x, y, width, height);
                let pixel = &data[(y as usize * width as usize + x as usize) * 4..][..4];
                for c in 0..per_image {
                    let b = i * per_image + c;
                    if b < basis_count {
                        weights.set_weight(p, b, pixel[c]);
                    }
                }
            }
        }
    }
    for p in 0..weights.texel_count() {
        weights.set_valid(p, true);
    }

    Ok(weights)
}

/// Reads `weights00.png` .. for each basis function. All texels are marked valid.
pub fn load_weight_images(directory: &Path, basis_count: usize) -> Result<BasisWeights, SerializationError> {
    load_weights(basis_count, 1, |b| directory.join(weight_file_name(b)))
}

pub fn load_combined_weight_images(directory: &Path, basis_count: usize) -> Result<BasisWeights, SerializationError> {
    load_weights(basis_count, WEIGHTS_PER_COMBINED_IMAGE, |i| directory.join(combined_weight_file_name(i)))
}

fn format_basis_functions(basis: &impl MaterialBasis) -> String {
    let mut out = String::new();
    let samples = basis.resolution() + 1;

    for b in 0..basis.basis_count() {
        for (channel, tag) in ["Red", "Green", "Blue"].into_iter().enumerate() {
            let _ = write!(out, "{tag}#{b}");
            for m in 0..samples {
                let _ = write!(out, ", {}", basis.evaluate_specular(channel, b, m));
            }
            out.push('\n');
        }
    }

    for b in 0..basis.basis_count() {
        let [r, g, bl] = basis.diffuse_color(b);
        let _ = writeln!(out, "Diffuse#{b}, {r}, {g}, {bl}");
    }

    out.push('\n');
    out
}

/// Writes `basisFunctions.csv`: a `Red#b`, `Green#b` and `Blue#b` line per basis
/// function, then one `Diffuse#b` line per basis function.
pub fn serialize_basis_functions(basis: &impl MaterialBasis, directory: &Path) -> ExportReport {
    let path = directory.join(BASIS_FUNCTIONS_FILE_NAME);
    let mut report = ExportReport::default();
    report.record(path.clone(), fs::write(&path, format_basis_functions(basis)));
    report
}

struct Tokens<'a> {
    path: &'a Path,
    tokens: Vec<(usize, &'a str)>,
    position: usize,
}

impl<'a> Tokens<'a> {
    fn new(path: &'a Path, text: &'a str) -> Self {
        let tokens = text
            .lines()
            .enumerate()
            .flat_map(|(line, content)| {
                content.split(',').map(str::trim).filter(|t| !t.is_empty()).map(move |t| (line + 1, t))
            })
            .collect();
        Self { path, tokens, position: 0 }
    }

    fn error(&self, line: usize, message: String) -> SerializationError {
        SerializationError::Format { path: self.path.to_owned(), line, message }
    }

    fn last_line(&self) -> usize {
        self.tokens.last().map(|(line, _)| *line).unwrap_or(1)
    }

    fn peek(&self) -> Option<&'a str> {
        self.tokens.get(self.position).map(|(_, t)| *t)
    }

    fn expect_tag(&mut self, expected: &str) -> Result<(), SerializationError> {
        match self.tokens.get(self.position) {
            Some((_, token)) if *token == expected => {
                self.position += 1;
                Ok(())
            }
            Some((line, token)) => Err(self.error(*line, format!("expected `{expected}`, found `{token}`"))),
            None => Err(self.error(self.last_line(), format!("expected `{expected}`, found end of file"))),
        }
    }

    fn number(&mut self) -> Result<f64, SerializationError> {
        match self.tokens.get(self.position) {
            Some((line, token)) => {
                let value = token
                    .parse()
                    .map_err(|_| self.error(*line, format!("expected a number, found `{token}`")))?;
                self.position += 1;
                Ok(value)
            }
            None => Err(self.error(self.last_line(), "expected a number, found end of file".to_owned())),
        }
    }

    fn numbers(&mut self, count: usize) -> Result<Vec<f64>, SerializationError> {
        (0..count).map(|_| self.number()).collect()
    }
}

/// Parses `basisFunctions.csv` from `directory`. Returns `Ok(None)` if the file does not
/// exist. Missing `Diffuse#b` lines default to black.
pub fn deserialize_basis_functions(directory: &Path) -> Result<Option<SimpleMaterialBasis>, SerializationError> {
    let path = directory.join(BASIS_FUNCTIONS_FILE_NAME);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("no basis functions at {}", path.display());
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    parse_basis_functions(&path, &text).map(Some)
}

fn parse_basis_functions(path: &Path, text: &str) -> Result<SimpleMaterialBasis, SerializationError> {
    let format_error = |line: usize, message: &str| SerializationError::Format {
        path: path.to_owned(),
        line,
        message: message.to_owned(),
    };

    // the first line fixes the number of samples per curve; a trailing comma adds nothing
    let first = text.lines().next().ok_or_else(|| format_error(1, "empty basis function file"))?;
    let samples = first.split(',').skip(1).filter(|t| !t.trim().is_empty()).count();
    if samples == 0 {
        return Err(format_error(1, "basis function line has no samples"));
    }

    let mut tokens = Tokens::new(path, text);
    let mut curves = Vec::new();

    while tokens.peek().is_some_and(|t| t.starts_with("Red#")) {
        let b = curves.len();
        tokens.expect_tag(&format!("Red#{b}"))?;
        let red = tokens.numbers(samples)?;
        tokens.expect_tag(&format!("Green#{b}"))?;
        let green = tokens.numbers(samples)?;
        tokens.expect_tag(&format!("Blue#{b}"))?;
        let blue = tokens.numbers(samples)?;
        curves.push([red, green, blue]);
    }

    let mut diffuse = Vec::with_capacity(curves.len());
    while tokens.peek().is_some() {
        if diffuse.len() >= curves.len() {
            let line = tokens.tokens[tokens.position].0;
            return Err(format_error(line, "unexpected data after the last basis function"));
        }
        tokens.expect_tag(&format!("Diffuse#{}", diffuse.len()))?;
        let color = tokens.numbers(3)?;
        diffuse.push([color[0], color[1], color[2]]);
    }

    if diffuse.len() < curves.len() {
        warn!(
            "{} has no diffuse color for {} basis functions, using black",
            path.display(),
            curves.len() - diffuse.len()
        );
        diffuse.resize(curves.len(), [0.0; 3]);
    }

    SimpleMaterialBasis::from_curves(curves, diffuse)
        .map_err(|e| format_error(tokens.last_line(), &e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::MaterialBasis;

    fn sample_basis() -> SimpleMaterialBasis {
        SimpleMaterialBasis::from_curves(
            vec![
                [vec![0.1, 1.0 / 3.0, 2e-9], vec![0.5, 0.25, 0.0], vec![-1.5, 1e20, 7.0]],
                [vec![0.7, 0.6, 0.5], vec![0.123456789012345, 0.2, 0.3], vec![0.0, 0.0, 0.1]],
            ],
            vec![[0.25, 0.5, 0.75], [1.0 / 7.0, 0.0, 1.0]],
        )
        .unwrap()
    }

    #[test]
    fn test_weight_file_names() {
        assert_eq!(weight_file_name(3), "weights03.png");
        assert_eq!(weight_file_name(12), "weights12.png");
        assert_eq!(combined_weight_file_name(2), weight_file_name_range(8, 4));
        assert_eq!(combined_weight_file_name(2), "weights0811.png");
        assert_eq!(weight_file_name_range(5, 1), "weights05.png");
        assert_eq!(combined_weight_image_count(9), 3);
    }

    #[test]
    fn test_basis_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let basis = sample_basis();
        assert!(serialize_basis_functions(&basis, dir.path()).is_complete());

        let read = deserialize_basis_functions(dir.path()).unwrap().unwrap();
        assert_eq!(read, basis);
    }

    #[test]
    fn test_file_layout() {
        let text = format_basis_functions(&sample_basis());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 9);
        assert!(lines[0].starts_with("Red#0, 0.1, "));
        assert!(lines[4].starts_with("Green#1, "));
        assert_eq!(lines[6], "Diffuse#0, 0.25, 0.5, 0.75");
        assert_eq!(lines[8], "");
    }

    #[test]
    fn test_trailing_comma() {
        let text = "Red#0, 1.0, 2.0, 3.0,\nGreen#0, 4.0, 5.0, 6.0,\nBlue#0, 7.0, 8.0, 9.0,\n";
        let basis = parse_basis_functions(Path::new("basisFunctions.csv"), text).unwrap();

        assert_eq!(basis.basis_count(), 1);
        assert_eq!(basis.resolution() + 1, 3);
        assert_eq!(basis.evaluate_specular_red(0, 2), 3.0);
        assert_eq!(basis.evaluate_specular_blue(0, 0), 7.0);
    }

    #[test]
    fn test_missing_diffuse_defaults_to_black() {
        let text = "Red#0, 1, 2\nGreen#0, 3, 4\nBlue#0, 5, 6\nRed#1, 1, 2\nGreen#1, 3, 4\nBlue#1, 5, 6\nDiffuse#0, 0.5, 0.5, 0.5\n";
        let basis = parse_basis_functions(Path::new("basisFunctions.csv"), text).unwrap();
        assert_eq!(basis.diffuse_color(0), [0.5; 3]);
        assert_eq!(basis.diffuse_color(1), [0.0; 3]);
    }

    #[test]
    fn test_tag_mismatch_is_an_error() {
        let text = "Red#0, 1, 2\nBlue#0, 3, 4\nGreen#0, 5, 6\n";
        let err = parse_basis_functions(Path::new("basisFunctions.csv"), text).unwrap_err();
        assert!(matches!(err, SerializationError::Format { line: 2, .. }), "{err}");

        let text = "Red#0, 1, 2\nGreen#0, 3\nBlue#0, 5, 6\n";
        assert!(parse_basis_functions(Path::new("basisFunctions.csv"), text).is_err());

        let text = "Red#0, 1, 2\nGreen#0, 3, 4\nBlue#0, 5, 6\nDiffuse#1, 0, 0, 0\n";
        assert!(parse_basis_functions(Path::new("basisFunctions.csv"), text).is_err());

        assert!(parse_basis_functions(Path::new("basisFunctions.csv"), "").is_err());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(deserialize_basis_functions(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_weight_image_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut weights = BasisWeights::new(3, 2, 5);
        for p in 0..6 {
            let values: Vec<f32> = (0..5).map(|b| ((p * 5 + b) as f32 * 0.037) % 1.0).collect();
            weights.set_weights(p, &values);
        }

        assert_eq!(save_weight_images(&weights, dir.path()).written.len(), 5);
        assert_eq!(save_combined_weight_images(&weights, dir.path()).written.len(), 2);
        assert!(dir.path().join("weights04.png").exists());
        assert!(dir.path().join("weights0407.png").exists());

        for read in [
            load_weight_images(dir.path(), 5).unwrap(),
            load_combined_weight_images(dir.path(), 5).unwrap(),
        ] {
            assert_eq!((read.width(), read.height()), (3, 2));
            for p in 0..6 {
                assert!(read.is_valid(p));
                for b in 0..5 {
                    assert!((read.weight(p, b) - weights.weight(p, b)).abs() <= 1.0 / 255.0);
                }
            }
        }
    }

    #[test]
    fn test_weight_image_is_flipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut weights = BasisWeights::new(1, 2, 1);
        weights.set_weights(0, &[1.0]);
        weights.set_weights(1, &[0.0]);
        save_weight_images(&weights, dir.path());

        let decoder = png::Decoder::new(fs::File::open(dir.path().join("weights00.png")).unwrap());
        let reader = decoder.read_info().unwrap();
        assert_eq!(reader.info().bit_depth, png::BitDepth::Eight);
        assert_eq!(reader.info().color_type, png::ColorType::Rgb);

        let image = image::open(dir.path().join("weights00.png")).unwrap().to_rgb8();
        assert_eq!(image.get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(image.get_pixel(0, 1).0, [255, 255, 255]);
    }

    #[test]
    fn test_unwritable_directory_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let weights = BasisWeights::new(2, 2, 2);

        let report = save_weight_images(&weights, &missing);
        assert!(report.written.is_empty());
        assert_eq!(report.failed.len(), 2);
    }
}
