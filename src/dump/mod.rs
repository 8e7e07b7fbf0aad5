//! Parsing of core dumps as produced by the target device.

pub(crate) mod image;
mod types;

pub use image::CoreDumpImage;
pub use types::status_str;
pub use types::stop_reason_str;
pub use types::Module;
pub use types::ModuleSegment;
pub use types::RegisterFile;
pub use types::Thread;
pub use types::REG_LR;
pub use types::REG_PC;
pub use types::REG_SP;
