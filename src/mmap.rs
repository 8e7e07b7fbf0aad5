use std::fs::File;
use std::ops::Deref;
use std::path::Path;

use memmap2::Mmap as Mapping;
use memmap2::MmapOptions;

use crate::ErrorExt as _;
use crate::Result;


/// A type encapsulating a region of memory mapped file data.
///
/// Mappings only live for the duration of a parse. Both image types copy
/// what they index, so the mapping is released once parsing completes or
/// fails.
#[derive(Debug)]
pub(crate) struct Mmap {
    /// The actual memory mapping, if any.
    mapping: Option<Mapping>,
}

impl Mmap {
    /// Memory map the file at the provided `path`.
    pub(crate) fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        Self::map(&file)
    }

    /// Map the provided file into memory, in its entirety.
    pub(crate) fn map(file: &File) -> Result<Self> {
        let len = file.metadata().context("failed to query file size")?.len();

        // The kernel does not allow mmap'ing a region of size 0. We
        // want to handle this case transparently, though.
        let mapping = if len == 0 {
            None
        } else {
            let mapping = unsafe { MmapOptions::new().map(file) }
                .context("failed to memory map file")?;
            Some(mapping)
        };
        Ok(Self { mapping })
    }
}

impl Deref for Mmap {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        match &self.mapping {
            Some(mapping) => mapping.deref(),
            None => &[],
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write as _;

    use tempfile::NamedTempFile;


    /// Check that we can map a file and read back its contents.
    #[test]
    fn map_file_contents() {
        let mut file = NamedTempFile::new().unwrap();
        let () = file.write_all(b"vitacore").unwrap();

        let mmap = Mmap::open(file.path()).unwrap();
        assert_eq!(&*mmap, b"vitacore");
    }

    /// Make sure that an empty file maps to an empty slice.
    #[test]
    fn map_empty_file() {
        let file = NamedTempFile::new().unwrap();
        let mmap = Mmap::open(file.path()).unwrap();
        assert_eq!(&*mmap, b"");
    }
}
