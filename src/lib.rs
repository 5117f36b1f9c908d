pub mod binary_image;
pub mod catalog;
pub mod command;
pub mod cursor;
pub mod error;
pub mod fat;
pub mod header;
pub mod helpers;
pub mod machine;
pub mod objc;
pub mod type_decode;

pub use binary_image::{Arch, BinaryImage};
pub use catalog::Catalog;
pub use error::MachOErr;
pub use type_decode::{decode_type, Type};

pub fn parse(path: &std::path::Path, arch: Arch) -> Option<Catalog> {
    let image = BinaryImage::load(path).ok()?;
    let image = image.select(arch)?;
    Some(objc::parse(&image))
}
