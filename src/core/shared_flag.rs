//! Lock-free boolean shared between threads and processes.
//!
//! The flag is a single `AtomicU32` at the start of a memory mapping. A
//! file-backed mapping is visible to every process that opens the same path,
//! so an external controller can start or arm capture without talking to the
//! streaming process. Writes are whole-word stores; readers poll once per
//! processing call and may see a value up to one call stale.

use memmap2::{MmapMut, MmapOptions};
use std::fmt;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::error::Result;

const FLAG_LEN: usize = std::mem::size_of::<AtomicU32>();

struct FlagRegion {
    /// Keeps the mapping alive for `word`
    _mmap: MmapMut,

    /// SAFETY: points at the page-aligned start of `_mmap`, valid while it lives
    word: *const AtomicU32,

    path: Option<PathBuf>,
}

// SAFETY: the region is only accessed through `AtomicU32` operations.
unsafe impl Send for FlagRegion {}
unsafe impl Sync for FlagRegion {}

impl FlagRegion {
    fn new(mut mmap: MmapMut, path: Option<PathBuf>) -> Self {
        let word = mmap.as_mut_ptr() as *const AtomicU32;
        Self {
            _mmap: mmap,
            word,
            path,
        }
    }

    fn word(&self) -> &AtomicU32 {
        // SAFETY: mappings are page aligned and at least FLAG_LEN bytes long.
        unsafe { &*self.word }
    }
}

/// Shared on/off flag. Clones refer to the same word.
#[derive(Clone)]
pub struct SharedFlag {
    region: Arc<FlagRegion>,
}

impl SharedFlag {
    /// Process-local flag, initially clear.
    pub fn anonymous() -> Result<Self> {
        let mmap = MmapOptions::new().len(FLAG_LEN).map_anon()?;
        Ok(Self {
            region: Arc::new(FlagRegion::new(mmap, None)),
        })
    }

    /// Flag backed by `path`, created clear if it does not exist yet.
    ///
    /// Every process that opens the same path shares the value.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        if file.metadata()?.len() < FLAG_LEN as u64 {
            file.set_len(FLAG_LEN as u64)?;
        }

        // SAFETY: the file is only ever accessed through this atomic word.
        let mmap = unsafe { MmapOptions::new().len(FLAG_LEN).map_mut(&file)? };

        Ok(Self {
            region: Arc::new(FlagRegion::new(mmap, Some(path.to_path_buf()))),
        })
    }

    pub fn is_set(&self) -> bool {
        self.region.word().load(Ordering::Acquire) != 0
    }

    pub fn set(&self) {
        self.region.word().store(1, Ordering::Release);
    }

    pub fn clear(&self) {
        self.region.word().store(0, Ordering::Release);
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.region.path.as_deref()
    }
}

impl fmt::Debug for SharedFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedFlag")
            .field("set", &self.is_set())
            .field("path", &self.region.path)
            .finish()
    }
}
