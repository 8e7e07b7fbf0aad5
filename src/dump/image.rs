use std::ops::Range;
use std::path::Path;

use miniz_oxide::inflate::decompress_to_vec;

use crate::log::debug;
use crate::mmap::Mmap;
use crate::util::find_match_or_lower_bound_by_key;
use crate::util::ReadRaw as _;
use crate::Addr;
use crate::Error;
use crate::ErrorExt as _;
use crate::IntoError as _;
use crate::Result;

use super::types::Module;
use super::types::ModuleSegment;
use super::types::RegisterFile;
use super::types::Thread;


/// The dump container magic, "P2DM" in little endian byte order.
const DUMP_MAGIC: u32 = 0x4d44_3250;
/// The container version we understand.
const DUMP_VERSION: u32 = 1;
/// The two byte magic identifying a gzip stream.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

const GZIP_FHCRC: u8 = 0x02;
const GZIP_FEXTRA: u8 = 0x04;
const GZIP_FNAME: u8 = 0x08;
const GZIP_FCOMMENT: u8 = 0x10;


/// Strip the gzip framing off `data` and inflate the contained deflate
/// stream.
fn gunzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut raw = data;
    let _magic = raw
        .read_slice(2)
        .ok_or_invalid_dump(|| "gzip header is truncated")?;
    let method = raw
        .read_u8()
        .ok_or_invalid_dump(|| "gzip header is truncated")?;
    if method != 8 {
        return Err(Error::with_invalid_dump(format!(
            "unsupported gzip compression method: {method}"
        )))
    }
    let flags = raw
        .read_u8()
        .ok_or_invalid_dump(|| "gzip header is truncated")?;
    // Modification time, extra flags, and OS byte.
    let _ = raw
        .read_slice(6)
        .ok_or_invalid_dump(|| "gzip header is truncated")?;

    if flags & GZIP_FEXTRA != 0 {
        let len = raw
            .read_u16()
            .ok_or_invalid_dump(|| "gzip extra field is truncated")?;
        let _ = raw
            .read_slice(usize::from(len))
            .ok_or_invalid_dump(|| "gzip extra field is truncated")?;
    }
    if flags & GZIP_FNAME != 0 {
        let _ = raw
            .read_cstr()
            .ok_or_invalid_dump(|| "gzip file name is not terminated")?;
    }
    if flags & GZIP_FCOMMENT != 0 {
        let _ = raw
            .read_cstr()
            .ok_or_invalid_dump(|| "gzip comment is not terminated")?;
    }
    if flags & GZIP_FHCRC != 0 {
        let _ = raw
            .read_slice(2)
            .ok_or_invalid_dump(|| "gzip header checksum is truncated")?;
    }

    decompress_to_vec(raw)
        .map_err(|err| Error::with_invalid_dump(format!("failed to inflate dump: {err}")))
}


/// A region of captured process memory, referencing a range of the
/// dump's own data.
#[derive(Debug)]
struct MemorySegment {
    /// The virtual address the region was captured from.
    vaddr: Addr,
    /// The region's extent within the dump data.
    data: Range<usize>,
}

impl MemorySegment {
    #[inline]
    fn size(&self) -> u32 {
        (self.data.end - self.data.start) as u32
    }
}


/// A parsed core dump.
///
/// Like with executable images, parsing is eager. Module and thread
/// tables are extracted up front, while captured memory is referenced
/// in place and served through [`read_vaddr`][Self::read_vaddr].
#[derive(Debug)]
pub struct CoreDumpImage {
    /// The raw (decompressed) dump data.
    data: Box<[u8]>,
    /// The modules loaded into the dumped process, in table order.
    modules: Box<[Module]>,
    /// The dumped process' threads, in table order.
    threads: Box<[Thread]>,
    /// Captured memory regions, sorted by start address.
    memory: Box<[MemorySegment]>,
}

impl CoreDumpImage {
    /// Parse a core dump from a byte buffer.
    ///
    /// Dumps are frequently stored gzip compressed. That is handled
    /// transparently here.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let data = if data.starts_with(&GZIP_MAGIC) {
            debug!("dump is gzip compressed; inflating");
            gunzip(data)?
        } else {
            data.to_vec()
        };

        let mut raw = data.as_slice();
        let magic = raw
            .read_u32()
            .ok_or_invalid_dump(|| "failed to read dump header")?;
        if magic != DUMP_MAGIC {
            return Err(Error::with_invalid_dump("dump magic not found"))
        }
        let version = raw
            .read_u32()
            .ok_or_invalid_dump(|| "failed to read dump header")?;
        if version != DUMP_VERSION {
            return Err(Error::with_invalid_dump(format!(
                "unsupported dump version: {version}"
            )))
        }

        let mut header = || {
            raw.read_u32()
                .ok_or_invalid_dump(|| "failed to read dump header")
        };
        let module_off = header()?;
        let module_cnt = header()?;
        let thread_off = header()?;
        let thread_cnt = header()?;
        let mem_off = header()?;
        let mem_cnt = header()?;

        let modules = Self::parse_modules(&data, module_off, module_cnt)?;
        let () = Self::check_module_overlap(&modules)?;
        let threads = Self::parse_threads(&data, thread_off, thread_cnt)?;
        let memory = Self::parse_memory(&data, mem_off, mem_cnt)?;

        Ok(Self {
            data: data.into_boxed_slice(),
            modules,
            threads,
            memory,
        })
    }

    /// Open and parse the core dump at `path`.
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let mmap = Mmap::open(path)?;
        Self::parse(&mmap)
            .with_context(|| format!("failed to parse core dump {}", path.display()))
    }

    fn parse_modules(data: &[u8], offset: u32, count: u32) -> Result<Box<[Module]>> {
        let mut raw = data
            .get(offset as usize..)
            .ok_or_invalid_dump(|| "module table is located beyond file end")?;

        let mut modules = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            let name_len = raw
                .read_u32()
                .ok_or_invalid_dump(|| "module table is truncated")?;
            let name = raw
                .read_slice(name_len as usize)
                .ok_or_invalid_dump(|| "module name is truncated")?;
            let name = String::from_utf8_lossy(name);

            let seg_cnt = raw
                .read_u32()
                .ok_or_invalid_dump(|| "module table is truncated")?;
            let segments = (0..seg_cnt)
                .map(|_| {
                    let mut field = || {
                        raw.read_u32()
                            .ok_or_invalid_dump(|| "module segment table is truncated")
                    };
                    Ok(ModuleSegment {
                        start: field()?,
                        size: field()?,
                        attr: field()?,
                        align: field()?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            let () = modules.push(Module {
                name: Box::from(name.as_ref()),
                segments: segments.into_boxed_slice(),
            });
        }
        Ok(modules.into_boxed_slice())
    }

    /// Module segments must not overlap. A dump violating that is
    /// corrupt, not merged silently.
    fn check_module_overlap(modules: &[Module]) -> Result<()> {
        let mut extents = modules
            .iter()
            .flat_map(|module| module.segments.iter())
            .filter(|segment| segment.size > 0)
            .map(|segment| (segment.start, segment.size))
            .collect::<Vec<_>>();
        let () = extents.sort_unstable();

        for pair in extents.windows(2) {
            let (start, size) = pair[0];
            let (next, _) = pair[1];
            if u64::from(start) + u64::from(size) > u64::from(next) {
                return Err(Error::with_invalid_dump(format!(
                    "module segments at {start:#x} and {next:#x} overlap"
                )))
            }
        }
        Ok(())
    }

    fn parse_threads(data: &[u8], offset: u32, count: u32) -> Result<Box<[Thread]>> {
        let mut raw = data
            .get(offset as usize..)
            .ok_or_invalid_dump(|| "thread table is located beyond file end")?;

        let mut threads = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            let mut field = || {
                raw.read_u32()
                    .ok_or_invalid_dump(|| "thread table is truncated")
            };
            let uid = field()?;
            let name = raw
                .read_slice(32)
                .ok_or_invalid_dump(|| "thread table is truncated")?;
            let name = match name.iter().position(|byte| *byte == b'\0') {
                Some(idx) => &name[..idx],
                None => name,
            };
            let name = String::from_utf8_lossy(name);

            let mut field = || {
                raw.read_u32()
                    .ok_or_invalid_dump(|| "thread table is truncated")
            };
            let status = field()?;
            let stop_reason = field()?;

            let mut gpr = [0u32; 16];
            for reg in gpr.iter_mut() {
                *reg = field()?;
            }
            let cpsr = field()?;

            let () = threads.push(Thread {
                uid,
                name: Box::from(name.as_ref()),
                status,
                stop_reason,
                regs: RegisterFile { gpr, cpsr },
            });
        }
        Ok(threads.into_boxed_slice())
    }

    fn parse_memory(data: &[u8], offset: u32, count: u32) -> Result<Box<[MemorySegment]>> {
        let mut raw = data
            .get(offset as usize..)
            .ok_or_invalid_dump(|| "memory table is located beyond file end")?;

        let mut memory = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            let mut field = || {
                raw.read_u32()
                    .ok_or_invalid_dump(|| "memory table is truncated")
            };
            let vaddr = field()?;
            let size = field()?;
            let file_off = field()?;

            let start = file_off as usize;
            let end = start
                .checked_add(size as usize)
                .filter(|end| *end <= data.len())
                .ok_or_invalid_dump(|| {
                    format!("memory region at {vaddr:#x} extends beyond file end")
                })?;

            let () = memory.push(MemorySegment {
                vaddr,
                data: start..end,
            });
        }

        let () = memory.sort_by_key(|segment| segment.vaddr);
        for pair in memory.windows(2) {
            let end = u64::from(pair[0].vaddr) + u64::from(pair[0].size());
            if end > u64::from(pair[1].vaddr) {
                return Err(Error::with_invalid_dump(format!(
                    "memory regions at {:#x} and {:#x} overlap",
                    pair[0].vaddr, pair[1].vaddr
                )))
            }
        }
        Ok(memory.into_boxed_slice())
    }

    /// The modules loaded into the dumped process, in dump order.
    #[inline]
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// The dumped process' threads, in dump order.
    #[inline]
    pub fn threads(&self) -> &[Thread] {
        &self.threads
    }

    /// Read `len` bytes of captured memory starting at virtual address
    /// `addr`.
    ///
    /// The requested range has to be fully contained in a single
    /// captured region. `None` is reported otherwise, including for
    /// reads straddling two adjacent regions.
    pub fn read_vaddr(&self, addr: Addr, len: usize) -> Option<&[u8]> {
        let idx = find_match_or_lower_bound_by_key(&self.memory, addr, |segment| segment.vaddr)?;

        for segment in self.memory[idx..].iter() {
            if segment.vaddr > addr {
                break
            }
            let offset = (addr - segment.vaddr) as usize;
            let end = offset.checked_add(len)?;
            if end <= segment.data.len() {
                let data = &self.data[segment.data.clone()];
                return Some(&data[offset..end])
            }
        }
        None
    }

    /// Read a little endian `u32` of captured memory at virtual address
    /// `addr`.
    pub fn read_u32(&self, addr: Addr) -> Option<u32> {
        let mut data = self.read_vaddr(addr, 4)?;
        data.read_u32()
    }
}
