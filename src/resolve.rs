//! Resolution of runtime addresses against an executable image.

use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;

use crate::elf::ElfImage;
use crate::Addr;

#[cfg(feature = "disasm")]
use crate::Error;
#[cfg(feature = "disasm")]
use crate::Result;


/// How an address relates to the executable image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// The address maps to a symbol.
    Symbol {
        /// The symbol's name.
        name: Box<str>,
        /// The address' distance from the symbol's start.
        offset: u32,
    },
    /// No symbol covers the address, but a loadable segment does (or
    /// precedes it).
    Module {
        /// The segment's name.
        name: Box<str>,
        /// The address' distance from the segment's start.
        offset: u32,
    },
    /// The address maps to nothing in the image.
    Unresolved,
}


/// An address annotated with what the executable image knows about it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressNotation {
    /// A caller provided label describing where the address came from,
    /// e.g., a register name.
    pub label: Box<str>,
    /// The address itself.
    pub addr: Addr,
    /// How the address resolved.
    pub resolution: Resolution,
    /// Whether the address falls strictly inside the matched extent.
    located: bool,
    /// Disassembly of the instruction at the address, if available.
    pub disasm: Option<Box<str>>,
}

impl AddressNotation {
    /// Check whether the address falls strictly inside the extent of
    /// whatever it resolved to.
    ///
    /// An address past the end of the nearest symbol, or one matching a
    /// symbol that declares no size, is resolved but not located.
    #[inline]
    pub fn is_located(&self) -> bool {
        self.located
    }
}

impl Display for AddressNotation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.resolution {
            Resolution::Symbol { name, offset } | Resolution::Module { name, offset } => {
                if *offset == 0 {
                    write!(f, "{name}")
                } else {
                    write!(f, "{name}+{offset:#x}")
                }
            }
            Resolution::Unresolved => write!(f, "{:#010x}", self.addr),
        }
    }
}


/// A resolver of runtime addresses against a single executable image.
///
/// Resolution is a pure function of the image and the queried address:
/// the same query always produces the same notation.
#[derive(Clone, Debug)]
pub struct Resolver<'elf> {
    elf: &'elf ElfImage,
}

impl<'elf> Resolver<'elf> {
    /// Create a resolver working against the provided image.
    #[inline]
    pub fn new(elf: &'elf ElfImage) -> Self {
        Self { elf }
    }

    /// Resolve `addr`, attaching `label` to the produced notation.
    pub fn resolve(&self, label: &str, addr: Addr) -> AddressNotation {
        let bias = self.elf.load_bias();

        let (resolution, located) = if let Some(sym) = self.elf.find_symbol(addr) {
            let start = sym.addr.wrapping_add(bias);
            let offset = addr.wrapping_sub(start);
            let located = u64::from(offset) < u64::from(sym.size);
            (
                Resolution::Symbol {
                    name: sym.name.clone(),
                    offset,
                },
                located,
            )
        } else if let Some(segment) = self.elf.find_segment(addr) {
            let start = segment.start.wrapping_add(bias);
            let offset = addr.wrapping_sub(start);
            let located = u64::from(offset) < u64::from(segment.size);
            (
                Resolution::Module {
                    name: segment.name.clone(),
                    offset,
                },
                located,
            )
        } else {
            (Resolution::Unresolved, false)
        };

        AddressNotation {
            label: Box::from(label),
            addr,
            resolution,
            located,
            disasm: None,
        }
    }
}


/// A hook for annotating located code addresses with instruction text.
pub trait Disassembler {
    /// Disassemble the first instruction in `code`, assumed to reside
    /// at `addr`. Any failure degrades to `None`.
    fn disassemble(&self, addr: Addr, code: &[u8]) -> Option<String>;
}

#[cfg(feature = "disasm")]
mod capstone_impl {
    use super::*;

    use std::fmt::Debug;

    use capstone::arch::arm::ArchMode;
    use capstone::arch::BuildsCapstone as _;
    use capstone::Capstone;


    /// A [`Disassembler`] backed by capstone.
    ///
    /// The instruction set is selected per address: an odd address
    /// indicates Thumb state, as is the convention for ARM interworking
    /// branches.
    pub struct CapstoneDisassembler {
        /// Engine configured for the ARM instruction set.
        arm: Capstone,
        /// Engine configured for the Thumb instruction set.
        thumb: Capstone,
    }

    impl CapstoneDisassembler {
        /// Instantiate the disassembler.
        pub fn new() -> Result<Self> {
            let arm = Capstone::new()
                .arm()
                .mode(ArchMode::Arm)
                .build()
                .map_err(|err| {
                    Error::with_invalid_data(format!("failed to instantiate disassembler: {err}"))
                })?;
            let thumb = Capstone::new()
                .arm()
                .mode(ArchMode::Thumb)
                .build()
                .map_err(|err| {
                    Error::with_invalid_data(format!("failed to instantiate disassembler: {err}"))
                })?;
            Ok(Self { arm, thumb })
        }
    }

    impl Debug for CapstoneDisassembler {
        fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
            f.debug_struct("CapstoneDisassembler").finish()
        }
    }

    impl Disassembler for CapstoneDisassembler {
        fn disassemble(&self, addr: Addr, code: &[u8]) -> Option<String> {
            let (engine, addr) = if addr & 1 != 0 {
                (&self.thumb, addr & !1)
            } else {
                (&self.arm, addr)
            };

            let insns = engine.disasm_count(code, u64::from(addr), 1).ok()?;
            let insn = insns.iter().next()?;
            let mnemonic = insn.mnemonic()?;
            let text = match insn.op_str() {
                Some(ops) if !ops.is_empty() => format!("{mnemonic} {ops}"),
                _ => mnemonic.to_string(),
            };
            Some(text)
        }
    }
}

#[cfg(feature = "disasm")]
pub use capstone_impl::CapstoneDisassembler;


#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::elf::image::tests::ElfBuilder;


    fn image() -> ElfImage {
        let data = ElfBuilder::default()
            .sym("main", 0x8100_0000, 0x40)
            .sym("idle", 0x8100_0100, 0)
            .load(0x8100_0000, 0x1_0000, 0x5)
            // A data segment below any symbol, exercising the segment
            // fallback.
            .load(0x8050_0000, 0x1000, 0x6)
            .build();
        ElfImage::parse(&data).unwrap()
    }


    /// Check that addresses inside a symbol's extent are located.
    #[test]
    fn symbol_resolution() {
        let elf = image();
        let resolver = Resolver::new(&elf);

        let notation = resolver.resolve("PC", 0x8100_0010);
        assert_eq!(notation.addr, 0x8100_0010);
        assert_eq!(
            notation.resolution,
            Resolution::Symbol {
                name: Box::from("main"),
                offset: 0x10,
            }
        );
        assert!(notation.is_located());
        assert_eq!(format!("{notation}"), "main+0x10");

        let notation = resolver.resolve("PC", 0x8100_0000);
        assert!(notation.is_located());
        assert_eq!(format!("{notation}"), "main");
    }

    /// Make sure that addresses past a symbol's extent resolve without
    /// being located.
    #[test]
    fn resolution_past_extent() {
        let elf = image();
        let resolver = Resolver::new(&elf);

        // One past the end of `main`.
        let notation = resolver.resolve("LR", 0x8100_0040);
        assert_eq!(
            notation.resolution,
            Resolution::Symbol {
                name: Box::from("main"),
                offset: 0x40,
            }
        );
        assert!(!notation.is_located());
    }

    /// Make sure that a zero sized symbol is never located, even at its
    /// exact address.
    #[test]
    fn zero_sized_symbol_never_located() {
        let elf = image();
        let resolver = Resolver::new(&elf);

        let notation = resolver.resolve("PC", 0x8100_0100);
        assert_eq!(
            notation.resolution,
            Resolution::Symbol {
                name: Box::from("idle"),
                offset: 0,
            }
        );
        assert!(!notation.is_located());
    }

    /// Check the segment fallback for addresses without a preceding
    /// symbol.
    #[test]
    fn module_fallback() {
        let elf = image();
        let resolver = Resolver::new(&elf);

        let notation = resolver.resolve("SP", 0x8050_0800);
        assert_eq!(
            notation.resolution,
            Resolution::Module {
                name: Box::from("load1"),
                offset: 0x800,
            }
        );
        assert!(notation.is_located());
    }

    /// Check that addresses outside the image are unresolved.
    #[test]
    fn unresolved_addresses() {
        let elf = image();
        let resolver = Resolver::new(&elf);

        let notation = resolver.resolve("PC", 0x9999);
        assert_eq!(notation.resolution, Resolution::Unresolved);
        assert!(!notation.is_located());
        assert_eq!(format!("{notation}"), "0x00009999");
    }

    /// Make sure that resolution is deterministic.
    #[test]
    fn deterministic_resolution() {
        let elf = image();
        let resolver = Resolver::new(&elf);

        let first = resolver.resolve("PC", 0x8100_0010);
        let second = resolver.resolve("PC", 0x8100_0010);
        assert_eq!(first, second);
    }
}
