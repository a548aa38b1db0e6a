//! Persistent forms of a fitted material: weight images, the basis function CSV,
//! downsampled texture chains and the material extras consumed by the glTF writer.
//!
//! Writing never aborts halfway: each file's failure is logged and recorded in an
//! [`ExportReport`] while the remaining files are still written.

mod export;
mod gltf_extras;
mod image_io;
mod lod;
mod serializer;

pub use export::ExportReport;
pub use gltf_extras::{LodInfo, MaterialExtras, SpecularWeights, TextureReference, MATERIAL_EXTRAS_FILE_NAME};
pub use image_io::{read_rgba_f32, write_rgb8, write_rgba8};
pub use lod::{LodGenerator, STANDARD_TEXTURES, lod_file_name, lod_sizes};
pub use serializer::{
    BASIS_FUNCTIONS_FILE_NAME, WEIGHTS_PER_COMBINED_IMAGE, combined_weight_file_name, combined_weight_image_count,
    deserialize_basis_functions, load_combined_weight_images, load_weight_images, save_combined_weight_images,
    save_weight_images, serialize_basis_functions, weight_file_name, weight_file_name_range,
};
