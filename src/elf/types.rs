#![allow(non_camel_case_types)]

use crate::util::Pod;

pub(crate) const EI_NIDENT: usize = 16;

type Elf32_Addr = u32;
type Elf32_Half = u16;
type Elf32_Off = u32;
type Elf32_Word = u32;

pub(crate) const ELFMAG: [u8; 4] = [0x7f, b'E', b'L', b'F'];
pub(crate) const ELFCLASS32: u8 = 1;
pub(crate) const ELFDATA2LSB: u8 = 1;

/// The machine type of the target device (32 bit ARM).
pub(crate) const EM_ARM: u16 = 40;

#[derive(Debug)]
#[repr(C)]
pub(crate) struct Elf32_Ehdr {
    pub e_ident: [u8; EI_NIDENT], /* ELF "magic number" */
    pub e_type: Elf32_Half,
    pub e_machine: Elf32_Half,
    pub e_version: Elf32_Word,
    pub e_entry: Elf32_Addr, /* Entry point virtual address */
    pub e_phoff: Elf32_Off,  /* Program header table file offset */
    pub e_shoff: Elf32_Off,  /* Section header table file offset */
    pub e_flags: Elf32_Word,
    pub e_ehsize: Elf32_Half,
    pub e_phentsize: Elf32_Half,
    pub e_phnum: Elf32_Half,
    pub e_shentsize: Elf32_Half,
    pub e_shnum: Elf32_Half,
    pub e_shstrndx: Elf32_Half,
}

// SAFETY: `Elf32_Ehdr` is valid for any bit pattern.
unsafe impl Pod for Elf32_Ehdr {}

pub(crate) const PT_LOAD: u32 = 1;

pub(crate) const PF_X: Elf32_Word = 1;
pub(crate) const PF_W: Elf32_Word = 2;
pub(crate) const PF_R: Elf32_Word = 4;

#[derive(Debug)]
#[repr(C)]
pub(crate) struct Elf32_Phdr {
    pub p_type: Elf32_Word,
    pub p_offset: Elf32_Off, /* Segment file offset */
    pub p_vaddr: Elf32_Addr, /* Segment virtual address */
    pub p_paddr: Elf32_Addr, /* Segment physical address */
    pub p_filesz: Elf32_Word, /* Segment size in file */
    pub p_memsz: Elf32_Word, /* Segment size in memory */
    pub p_flags: Elf32_Word,
    pub p_align: Elf32_Word, /* Segment alignment, file & memory */
}

// SAFETY: `Elf32_Phdr` is valid for any bit pattern.
unsafe impl Pod for Elf32_Phdr {}

#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub(crate) struct Elf32_Shdr {
    pub sh_name: Elf32_Word,      /* Section name, index in string tbl */
    pub sh_type: Elf32_Word,      /* Type of section */
    pub sh_flags: Elf32_Word,     /* Miscellaneous section attributes */
    pub sh_addr: Elf32_Addr,      /* Section virtual addr at execution */
    pub sh_offset: Elf32_Off,     /* Section file offset */
    pub sh_size: Elf32_Word,      /* Size of section in bytes */
    pub sh_link: Elf32_Word,      /* Index of another section */
    pub sh_info: Elf32_Word,      /* Additional section information */
    pub sh_addralign: Elf32_Word, /* Section alignment */
    pub sh_entsize: Elf32_Word,   /* Entry size if section holds table */
}

// SAFETY: `Elf32_Shdr` is valid for any bit pattern.
unsafe impl Pod for Elf32_Shdr {}

pub(crate) const SHN_UNDEF: u16 = 0;

pub(crate) const STT_OBJECT: u8 = 1;
pub(crate) const STT_FUNC: u8 = 2;

#[derive(Clone, Debug)]
#[repr(C)]
pub(crate) struct Elf32_Sym {
    pub st_name: Elf32_Word,  /* Symbol name, index in string tbl */
    pub st_value: Elf32_Addr, /* Value of the symbol */
    pub st_size: Elf32_Word,  /* Associated symbol size */
    pub st_info: u8,          /* Type and binding attributes */
    pub st_other: u8,         /* No defined meaning, 0 */
    pub st_shndx: Elf32_Half, /* Associated section index */
}

impl Elf32_Sym {
    /// Extract the symbol's type, typically represented by a STT_* constant.
    #[inline]
    pub fn type_(&self) -> u8 {
        self.st_info & 0xf
    }

    /// Check whether the symbol describes an entity with a memory extent
    /// worth indexing (a function or a variable).
    #[inline]
    pub fn is_extent(&self) -> bool {
        let type_ = self.type_();
        type_ == STT_FUNC || type_ == STT_OBJECT
    }
}

// SAFETY: `Elf32_Sym` is valid for any bit pattern.
unsafe impl Pod for Elf32_Sym {}
