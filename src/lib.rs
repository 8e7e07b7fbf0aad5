//! **vitacore** turns a PS Vita core dump and the application's ELF
//! image into a symbolized crash report.
//!
//! The library revolves around a small number of types:
//! - [`ElfImage`] parses and indexes the application executable,
//! - [`CoreDumpImage`] parses the dump's module and thread tables and
//!   serves captured memory,
//! - [`Resolver`](resolve::Resolver) maps runtime addresses back to
//!   symbols and segments,
//! - [`ReportBuilder`](report::ReportBuilder) combines the two images
//!   into a [`CrashReport`](report::CrashReport).
//!
//! Parse failures of either input are fatal and reported as [`Error`]s.
//! Everything downstream degrades per datum: an address that does not
//! resolve or memory that was not captured merely produces a less
//! detailed report.
//!
//! # Features
//! - `disasm`: enable annotation of faulting instructions via the
//!   capstone disassembler.
//! - `tracing`: emit diagnostic traces using the `tracing` crate.

mod log;

pub mod dump;
pub mod elf;
mod error;
mod mmap;
pub mod report;
pub mod resolve;
mod util;

pub use crate::error::Error;
pub use crate::error::ErrorExt;
pub use crate::error::ErrorKind;
pub use crate::error::IntoCowStr;
pub use crate::error::IntoError;
pub use crate::error::Result;

pub use crate::dump::CoreDumpImage;
pub use crate::elf::ElfImage;
pub use crate::report::CrashReport;
pub use crate::report::ReportBuilder;

/// A type representing addresses in the 32 bit target address space.
pub type Addr = u32;
