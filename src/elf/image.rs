use std::mem::size_of;
use std::path::Path;

use crate::log::debug;
use crate::log::warn;
use crate::mmap::Mmap;
use crate::util::find_match_or_lower_bound_by_key;
use crate::util::Pod;
use crate::util::ReadRaw as _;
use crate::Addr;
use crate::Error;
use crate::ErrorExt as _;
use crate::IntoError as _;
use crate::Result;

use super::types::Elf32_Ehdr;
use super::types::Elf32_Phdr;
use super::types::Elf32_Shdr;
use super::types::Elf32_Sym;
use super::types::ELFCLASS32;
use super::types::ELFDATA2LSB;
use super::types::ELFMAG;
use super::types::EM_ARM;
use super::types::PF_R;
use super::types::PF_W;
use super::types::PF_X;
use super::types::PT_LOAD;
use super::types::SHN_UNDEF;


/// A symbol as indexed from the ELF image's symbol table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Symbol {
    /// The symbol's name.
    pub name: Box<str>,
    /// The symbol's start address, in file address space.
    pub addr: Addr,
    /// The size of the symbol's extent. May legitimately be zero, in
    /// which case the extent is considered empty.
    pub size: u32,
}

/// A loadable segment of the ELF image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    /// A synthesized name of the form `loadN`, with `N` being the
    /// index of the segment in program header order.
    pub name: Box<str>,
    /// The segment's start address, in file address space.
    pub start: Addr,
    /// The size of the segment in memory.
    pub size: u32,
    /// The segment's `PF_*` flags.
    pub flags: u32,
}

impl Segment {
    /// Render the segment's permissions in `rwx` notation.
    pub fn perms(&self) -> String {
        let mut perms = String::with_capacity(3);
        let () = perms.push(if self.flags & PF_R != 0 { 'r' } else { '-' });
        let () = perms.push(if self.flags & PF_W != 0 { 'w' } else { '-' });
        let () = perms.push(if self.flags & PF_X != 0 { 'x' } else { '-' });
        perms
    }
}


fn read_table<T>(data: &[u8], offset: u32, count: usize, what: &str) -> Result<Vec<T>>
where
    T: Pod,
{
    let mut table = data
        .get(offset as usize..)
        .ok_or_invalid_elf(|| format!("{what} table is located beyond file end"))?;

    (0..count)
        .map(|_| {
            table
                .read_pod::<T>()
                .ok_or_invalid_elf(|| format!("{what} table is truncated"))
        })
        .collect()
}

fn section_data<'data>(data: &'data [u8], shdr: &Elf32_Shdr, what: &str) -> Result<&'data [u8]> {
    let mut raw = data
        .get(shdr.sh_offset as usize..)
        .ok_or_invalid_elf(|| format!("{what} section is located beyond file end"))?;
    raw.read_slice(shdr.sh_size as usize)
        .ok_or_invalid_elf(|| format!("{what} section is truncated"))
}


/// A parsed executable image.
///
/// Parsing is eager: symbols and loadable segments are extracted and
/// indexed up front and the input data is not referenced afterwards.
#[derive(Debug)]
pub struct ElfImage {
    /// The executable's entry point, in file address space.
    entry: Addr,
    /// The bias to subtract from runtime addresses before consulting
    /// the indexes.
    load_bias: u32,
    /// Symbols with an address, sorted by address and, within an
    /// address, by decreasing size.
    syms: Box<[Symbol]>,
    /// Loadable segments, sorted by start address.
    segments: Box<[Segment]>,
}

impl ElfImage {
    /// Parse an ELF image from a byte buffer, assuming that it is
    /// loaded without relocation.
    pub fn parse(data: &[u8]) -> Result<Self> {
        Self::parse_with_bias(data, 0)
    }

    /// Parse an ELF image from a byte buffer, with runtime addresses
    /// differing from file addresses by `load_bias`.
    pub fn parse_with_bias(data: &[u8], load_bias: u32) -> Result<Self> {
        let mut raw = data;
        let ehdr = raw
            .read_pod::<Elf32_Ehdr>()
            .ok_or_invalid_elf(|| "failed to read ELF header")?;

        if ehdr.e_ident[..4] != ELFMAG {
            return Err(Error::with_invalid_elf("ELF magic not found"))
        }
        if ehdr.e_ident[4] != ELFCLASS32 {
            return Err(Error::with_invalid_elf(
                "only 32 bit ELF images are supported",
            ))
        }
        if ehdr.e_ident[5] != ELFDATA2LSB {
            return Err(Error::with_invalid_elf(
                "only little endian ELF images are supported",
            ))
        }
        if ehdr.e_machine != EM_ARM {
            warn!("image targets machine {:#x}, not ARM", ehdr.e_machine);
        }

        if ehdr.e_phnum > 0 && usize::from(ehdr.e_phentsize) != size_of::<Elf32_Phdr>() {
            return Err(Error::with_invalid_elf(format!(
                "unexpected program header entry size: {}",
                ehdr.e_phentsize
            )))
        }
        if ehdr.e_shnum > 0 && usize::from(ehdr.e_shentsize) != size_of::<Elf32_Shdr>() {
            return Err(Error::with_invalid_elf(format!(
                "unexpected section header entry size: {}",
                ehdr.e_shentsize
            )))
        }

        let phdrs = read_table::<Elf32_Phdr>(
            data,
            ehdr.e_phoff,
            usize::from(ehdr.e_phnum),
            "program header",
        )?;
        let shdrs = read_table::<Elf32_Shdr>(
            data,
            ehdr.e_shoff,
            usize::from(ehdr.e_shnum),
            "section header",
        )?;

        let syms = Self::index_symbols(data, &shdrs, ehdr.e_shstrndx)?;
        let segments = Self::index_segments(&phdrs);

        Ok(Self {
            entry: ehdr.e_entry,
            load_bias,
            syms,
            segments,
        })
    }

    /// Open and parse the ELF image at `path`.
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let mmap = Mmap::open(path)?;
        Self::parse(&mmap)
            .with_context(|| format!("failed to parse ELF image {}", path.display()))
    }

    fn index_symbols(
        data: &[u8],
        shdrs: &[Elf32_Shdr],
        shstrndx: u16,
    ) -> Result<Box<[Symbol]>> {
        let shstrtab = match shdrs.get(usize::from(shstrndx)) {
            Some(shdr) if shstrndx != SHN_UNDEF => {
                section_data(data, shdr, "section name string table")?
            }
            _ => &[],
        };

        let section_name = |shdr: &Elf32_Shdr| -> Option<&str> {
            let mut raw = shstrtab.get(shdr.sh_name as usize..)?;
            raw.read_cstr()?.to_str().ok()
        };

        // Prefer the full symbol table and fall back to the dynamic
        // one, which stripped images often still carry.
        let symtab_shdr = shdrs
            .iter()
            .find(|shdr| section_name(shdr) == Some(".symtab"))
            .or_else(|| {
                shdrs
                    .iter()
                    .find(|shdr| section_name(shdr) == Some(".dynsym"))
            });

        let Some(symtab_shdr) = symtab_shdr else {
            debug!("image contains no symbol table");
            return Ok(Box::default())
        };

        let symtab = section_data(data, symtab_shdr, "symbol table")?;
        let strtab_shdr = shdrs
            .get(symtab_shdr.sh_link as usize)
            .ok_or_invalid_elf(|| "symbol table references an invalid string table")?;
        let strtab = section_data(data, strtab_shdr, "string table")?;

        let count = symtab.len() / size_of::<Elf32_Sym>();
        let mut raw = symtab;
        let mut syms = Vec::new();
        for _ in 0..count {
            // Sizes were validated above, so reads out of `symtab`
            // cannot fail.
            let sym = raw
                .read_pod::<Elf32_Sym>()
                .ok_or_invalid_elf(|| "symbol table is truncated")?;
            if !sym.is_extent() || sym.st_shndx == SHN_UNDEF {
                continue
            }

            let name = strtab
                .get(sym.st_name as usize..)
                .and_then(|mut raw| raw.read_cstr())
                .ok_or_invalid_elf(|| "symbol name is not a valid string table reference")?
                .to_string_lossy();
            if name.is_empty() {
                continue
            }

            let () = syms.push(Symbol {
                name: Box::from(name.as_ref()),
                addr: sym.st_value,
                size: sym.st_size,
            });
        }

        // Symbols with a larger extent sort first within an address, so
        // that lookup prefers the most encompassing alias.
        let () = syms.sort_by(|lhs, rhs| {
            lhs.addr
                .cmp(&rhs.addr)
                .then_with(|| rhs.size.cmp(&lhs.size))
        });
        Ok(syms.into_boxed_slice())
    }

    fn index_segments(phdrs: &[Elf32_Phdr]) -> Box<[Segment]> {
        let mut segments = phdrs
            .iter()
            .filter(|phdr| phdr.p_type == PT_LOAD)
            .enumerate()
            .map(|(idx, phdr)| Segment {
                name: format!("load{idx}").into_boxed_str(),
                start: phdr.p_vaddr,
                size: phdr.p_memsz,
                flags: phdr.p_flags,
            })
            .collect::<Vec<_>>();

        let () = segments.sort_by_key(|segment| segment.start);
        segments.into_boxed_slice()
    }

    /// The executable's runtime entry point.
    #[inline]
    pub fn entry_point(&self) -> Addr {
        self.entry.wrapping_add(self.load_bias)
    }

    /// The bias between runtime and file addresses.
    #[inline]
    pub fn load_bias(&self) -> u32 {
        self.load_bias
    }

    /// Find the symbol covering or most closely preceding the provided
    /// runtime address.
    ///
    /// The returned symbol's extent is not guaranteed to contain the
    /// address. Callers that care need to check containment themselves.
    pub fn find_symbol(&self, addr: Addr) -> Option<&Symbol> {
        let addr = addr.checked_sub(self.load_bias)?;
        let idx = find_match_or_lower_bound_by_key(&self.syms, addr, |sym| sym.addr)?;

        let mut fallback = None;
        for sym in self.syms[idx..].iter() {
            if sym.addr > addr {
                break
            }
            if u64::from(addr) < u64::from(sym.addr) + u64::from(sym.size) {
                return Some(sym)
            }
            if fallback.is_none() {
                fallback = Some(sym);
            }
        }
        fallback
    }

    /// Find the loadable segment covering or most closely preceding the
    /// provided runtime address.
    pub fn find_segment(&self, addr: Addr) -> Option<&Segment> {
        let addr = addr.checked_sub(self.load_bias)?;
        let idx = find_match_or_lower_bound_by_key(&self.segments, addr, |segment| segment.start)?;

        let mut fallback = None;
        for segment in self.segments[idx..].iter() {
            if segment.start > addr {
                break
            }
            if u64::from(addr) < u64::from(segment.start) + u64::from(segment.size) {
                return Some(segment)
            }
            if fallback.is_none() {
                fallback = Some(segment);
            }
        }
        fallback
    }
}


#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use std::io::Write as _;
    use std::slice;

    use tempfile::NamedTempFile;

    use test_log::test;

    use crate::ErrorKind;


    fn pod_bytes<T>(pod: &T) -> &[u8] {
        // SAFETY: Our on-disk types contain no padding, so every byte
        //         is initialized.
        unsafe { slice::from_raw_parts((pod as *const T).cast::<u8>(), size_of::<T>()) }
    }

    /// A builder for minimal but well-formed 32 bit ELF images.
    #[derive(Default)]
    pub(crate) struct ElfBuilder {
        entry: u32,
        syms: Vec<(&'static str, u32, u32)>,
        loads: Vec<(u32, u32, u32)>,
    }

    impl ElfBuilder {
        pub(crate) fn entry(mut self, entry: u32) -> Self {
            self.entry = entry;
            self
        }

        pub(crate) fn sym(mut self, name: &'static str, addr: u32, size: u32) -> Self {
            let () = self.syms.push((name, addr, size));
            self
        }

        pub(crate) fn load(mut self, vaddr: u32, memsz: u32, flags: u32) -> Self {
            let () = self.loads.push((vaddr, memsz, flags));
            self
        }

        pub(crate) fn build(&self) -> Vec<u8> {
            let phoff = size_of::<Elf32_Ehdr>() as u32;
            let shoff = phoff + (self.loads.len() * size_of::<Elf32_Phdr>()) as u32;
            let symtab_off = shoff + (4 * size_of::<Elf32_Shdr>()) as u32;
            let symtab_size = ((1 + self.syms.len()) * size_of::<Elf32_Sym>()) as u32;
            let strtab_off = symtab_off + symtab_size;

            let mut strtab = vec![0u8];
            let mut name_offs = Vec::new();
            for (name, ..) in &self.syms {
                let () = name_offs.push(strtab.len() as u32);
                let () = strtab.extend_from_slice(name.as_bytes());
                let () = strtab.push(0);
            }

            let shstrtab = b"\0.symtab\0.strtab\0.shstrtab\0";
            let shstrtab_off = strtab_off + strtab.len() as u32;

            let ehdr = Elf32_Ehdr {
                e_ident: [
                    0x7f, b'E', b'L', b'F', ELFCLASS32, ELFDATA2LSB, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0,
                ],
                e_type: 2,
                e_machine: EM_ARM,
                e_version: 1,
                e_entry: self.entry,
                e_phoff: phoff,
                e_shoff: shoff,
                e_flags: 0,
                e_ehsize: size_of::<Elf32_Ehdr>() as u16,
                e_phentsize: size_of::<Elf32_Phdr>() as u16,
                e_phnum: self.loads.len() as u16,
                e_shentsize: size_of::<Elf32_Shdr>() as u16,
                e_shnum: 4,
                e_shstrndx: 3,
            };

            let mut data = Vec::new();
            let () = data.extend_from_slice(pod_bytes(&ehdr));

            for (vaddr, memsz, flags) in &self.loads {
                let phdr = Elf32_Phdr {
                    p_type: PT_LOAD,
                    p_offset: 0,
                    p_vaddr: *vaddr,
                    p_paddr: *vaddr,
                    p_filesz: *memsz,
                    p_memsz: *memsz,
                    p_flags: *flags,
                    p_align: 0x1000,
                };
                let () = data.extend_from_slice(pod_bytes(&phdr));
            }

            let null_shdr = Elf32_Shdr {
                sh_name: 0,
                sh_type: 0,
                sh_flags: 0,
                sh_addr: 0,
                sh_offset: 0,
                sh_size: 0,
                sh_link: 0,
                sh_info: 0,
                sh_addralign: 0,
                sh_entsize: 0,
            };
            let symtab_shdr = Elf32_Shdr {
                sh_name: 1,
                sh_type: 2,
                sh_offset: symtab_off,
                sh_size: symtab_size,
                sh_link: 2,
                sh_entsize: size_of::<Elf32_Sym>() as u32,
                ..null_shdr
            };
            let strtab_shdr = Elf32_Shdr {
                sh_name: 9,
                sh_type: 3,
                sh_offset: strtab_off,
                sh_size: strtab.len() as u32,
                ..null_shdr
            };
            let shstrtab_shdr = Elf32_Shdr {
                sh_name: 17,
                sh_type: 3,
                sh_offset: shstrtab_off,
                sh_size: shstrtab.len() as u32,
                ..null_shdr
            };
            let () = data.extend_from_slice(pod_bytes(&null_shdr));
            let () = data.extend_from_slice(pod_bytes(&symtab_shdr));
            let () = data.extend_from_slice(pod_bytes(&strtab_shdr));
            let () = data.extend_from_slice(pod_bytes(&shstrtab_shdr));

            let null_sym = Elf32_Sym {
                st_name: 0,
                st_value: 0,
                st_size: 0,
                st_info: 0,
                st_other: 0,
                st_shndx: 0,
            };
            let () = data.extend_from_slice(pod_bytes(&null_sym));
            for (name_off, (_, addr, size)) in name_offs.iter().zip(&self.syms) {
                let sym = Elf32_Sym {
                    st_name: *name_off,
                    st_value: *addr,
                    st_size: *size,
                    // Global function.
                    st_info: 0x12,
                    st_other: 0,
                    st_shndx: 1,
                };
                let () = data.extend_from_slice(pod_bytes(&sym));
            }

            let () = data.extend_from_slice(&strtab);
            let () = data.extend_from_slice(shstrtab);
            data
        }
    }


    /// Check that symbols resolve to exact, interior, and floor matches
    /// as expected.
    #[test]
    fn symbol_lookup() {
        let data = ElfBuilder::default()
            .sym("main", 0x8100_0000, 0x40)
            .sym("helper", 0x8100_0100, 0)
            .build();
        let elf = ElfImage::parse(&data).unwrap();

        assert_eq!(elf.find_symbol(0x8100_0000).unwrap().name.as_ref(), "main");
        assert_eq!(elf.find_symbol(0x8100_003f).unwrap().name.as_ref(), "main");
        // Past the extent, but `main` remains the floor match.
        assert_eq!(elf.find_symbol(0x8100_0040).unwrap().name.as_ref(), "main");
        // A zero sized symbol is still reported as a floor match.
        let helper = elf.find_symbol(0x8100_0100).unwrap();
        assert_eq!(helper.name.as_ref(), "helper");
        assert_eq!(helper.size, 0);
        // Before the first symbol there is nothing to report.
        assert_eq!(elf.find_symbol(0x80ff_ffff), None);
    }

    /// Make sure that among symbols sharing an address the one covering
    /// the queried address wins.
    #[test]
    fn symbol_lookup_aliases() {
        let data = ElfBuilder::default()
            .sym("outer", 0x1000, 0x100)
            .sym("inner", 0x1000, 0x10)
            .build();
        let elf = ElfImage::parse(&data).unwrap();

        assert_eq!(elf.find_symbol(0x1050).unwrap().name.as_ref(), "outer");
        assert_eq!(elf.find_symbol(0x1008).unwrap().name.as_ref(), "outer");
    }

    /// Check segment lookup and permission rendering.
    #[test]
    fn segment_lookup() {
        let data = ElfBuilder::default()
            .load(0x8100_0000, 0x1_0000, PF_R | PF_X)
            .load(0x8110_0000, 0x2000, PF_R | PF_W)
            .build();
        let elf = ElfImage::parse(&data).unwrap();

        let text = elf.find_segment(0x8100_8000).unwrap();
        assert_eq!(text.name.as_ref(), "load0");
        assert_eq!(text.perms(), "r-x");

        let data_seg = elf.find_segment(0x8110_1fff).unwrap();
        assert_eq!(data_seg.name.as_ref(), "load1");
        assert_eq!(data_seg.perms(), "rw-");

        assert_eq!(elf.find_segment(0x8000_0000), None);
    }

    /// Check that a load bias shifts lookups and the entry point.
    #[test]
    fn load_bias_application() {
        let data = ElfBuilder::default()
            .entry(0x8100_0000)
            .sym("main", 0x8100_0000, 0x40)
            .build();
        let elf = ElfImage::parse_with_bias(&data, 0x1000).unwrap();

        assert_eq!(elf.load_bias(), 0x1000);
        assert_eq!(elf.entry_point(), 0x8100_1000);
        assert_eq!(elf.find_symbol(0x8100_1010).unwrap().name.as_ref(), "main");
        // Runtime addresses below the bias cannot map to a file address.
        assert_eq!(elf.find_symbol(0x500), None);
    }

    /// Make sure that non-ELF input is rejected up front.
    #[test]
    fn reject_bad_magic() {
        let mut data = ElfBuilder::default().build();
        data[0] = 0x7e;

        let err = ElfImage::parse(&data).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidElf);
    }

    /// Make sure that 64 bit images are rejected.
    #[test]
    fn reject_wrong_class() {
        let mut data = ElfBuilder::default().build();
        // ELFCLASS64
        data[4] = 2;

        let err = ElfImage::parse(&data).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidElf);
    }

    /// Check that truncated inputs surface as parse errors instead of
    /// panics.
    #[test]
    fn reject_truncated_input() {
        let data = ElfBuilder::default().sym("main", 0x1000, 0x40).build();

        let err = ElfImage::parse(&[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidElf);

        for len in [size_of::<Elf32_Ehdr>(), data.len() - 1] {
            let err = ElfImage::parse(&data[..len]).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidElf, "len {len}");
        }
    }

    /// Check that we can parse an image straight from a file.
    #[test]
    fn open_from_file() {
        let data = ElfBuilder::default().sym("main", 0x1000, 0x40).build();
        let mut file = NamedTempFile::new().unwrap();
        let () = file.write_all(&data).unwrap();

        let elf = ElfImage::open(file.path()).unwrap();
        assert_eq!(elf.find_symbol(0x1000).unwrap().name.as_ref(), "main");
    }
}
