//! Parsing and indexing of 32 bit ARM ELF executables.

pub(crate) mod image;
mod types;

pub use image::ElfImage;
pub use image::Segment;
pub use image::Symbol;
