use core::ops::Deref;
use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::io;
use std::path::Path;

/// Read-only view of either a shared file mapping or a sealed anonymous mapping.
///
/// The mapping is released when the value is dropped.
#[derive(Debug)]
pub struct MMappedMemory {
    map: Mmap,
}

impl MMappedMemory {
    /// Maps the first `size` bytes of `path` read-only and shared, so that the
    /// pages are the same physical frames any other process mapping the file uses.
    ///
    /// A `size` of 0 maps the whole file.
    pub fn map_file(path: &Path, size: usize) -> io::Result<MMappedMemory> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let size = if size == 0 {
            usize::try_from(file_len)
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "file too large to map"))?
        } else {
            size
        };
        if size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot map an empty file",
            ));
        }
        // Touching a page past EOF would SIGBUS instead of failing here.
        if file_len < size as u64 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "{} is {} bytes long, {} bytes requested",
                    path.display(),
                    file_len,
                    size
                ),
            ));
        }
        let map = unsafe { MmapOptions::new().len(size).map(&file) }?;
        log::debug!("mapped {} bytes of {} at {:p}", size, path.display(), map.as_ptr());
        Ok(MMappedMemory { map })
    }

    /// Private anonymous mapping of `size` bytes, byte `i` set to `initializer(i)`,
    /// then sealed read-only.
    ///
    /// Every page is written before sealing so none of them stays backed by the
    /// shared zero page.
    pub fn anonymous(size: usize, initializer: impl Fn(usize) -> u8) -> io::Result<MMappedMemory> {
        let mut map = MmapOptions::new().len(size).map_anon()?;
        for (i, b) in map.iter_mut().enumerate() {
            *b = initializer(i);
        }
        let map = map.make_read_only()?;
        Ok(MMappedMemory { map })
    }

    pub fn slice(&self) -> &[u8] {
        &self.map
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.map.as_ptr()
    }
}

impl Deref for MMappedMemory {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.slice()
    }
}

impl AsRef<[u8]> for MMappedMemory {
    fn as_ref(&self) -> &[u8] {
        self.slice()
    }
}
