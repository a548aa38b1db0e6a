use std::path::Path;

use image::{ImageBuffer, ImageReader, Rgb, Rgba};

use crate::error::SerializationError;

fn to_u8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Maps an image row to the texel row it holds. Images on disk are stored bottom row
/// first relative to texel order.
fn source_row(y: u32, height: u32, flip: bool) -> usize {
    if flip { (height - y - 1) as usize } else { y as usize }
}

/// Writes the RGB channels of an RGBA float buffer as an 8-bit PNG.
pub fn write_rgb8(path: &Path, width: u32, height: u32, rgba: &[f32], flip: bool) -> Result<(), SerializationError> {
    let image = ImageBuffer::from_fn(width, height, |x, y| {
        let i = (source_row(y, height, flip) * width as usize + x as usize) * 4;
        Rgb([to_u8(rgba[i]), to_u8(rgba[i + 1]), to_u8(rgba[i + 2])])
    });
    image.save(path)?;
    Ok(())
}

pub fn write_rgba8(path: &Path, width: u32, height: u32, rgba: &[f32], flip: bool) -> Result<(), SerializationError> {
    let image = ImageBuffer::from_fn(width, height, |x, y| {
        let i = (source_row(y, height, flip) * width as usize + x as usize) * 4;
        Rgba([to_u8(rgba[i]), to_u8(rgba[i + 1]), to_u8(rgba[i + 2]), to_u8(rgba[i + 3])])
    });
    image.save(path)?;
    Ok(())
}

/// Reads any image as normalized RGBA floats in texel order.
pub fn read_rgba_f32(path: &Path, flip: bool) -> Result<(u32, u32, Vec<f32>), SerializationError> {
    let image = ImageReader::open(path)?.with_guessed_format()?.decode()?.to_rgba32f();
    let (width, height) = image.dimensions();

    let mut data = Vec::with_capacity(width as usize * height as usize * 4);
    for y in 0..height {
        let row = source_row(y, height, flip) as u32;
        for x in 0..width {
            data.extend_from_slice(&image.get_pixel(x, row).0);
        }
    }
    Ok((width, height, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flip_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flip.png");

        // 1x2: top texel white, bottom texel black
        let data = [1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        write_rgb8(&path, 1, 2, &data, true).unwrap();

        let on_disk = image::open(&path).unwrap().to_rgb8();
        assert_eq!(on_disk.get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(on_disk.get_pixel(0, 1).0, [255, 255, 255]);

        let (width, height, read) = read_rgba_f32(&path, true).unwrap();
        assert_eq!((width, height), (1, 2));
        assert_eq!(read, data.to_vec());
    }
}
