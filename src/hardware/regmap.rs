//! Physical register windows.
//!
//! A [`RegisterWindow`] maps a physical address range through `/dev/mem`. The
//! mapping always starts on a page boundary and covers whole pages; the window
//! hides that rounding and addresses registers relative to the requested
//! physical address.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};
use std::sync::Arc;

use super::HardwareError;

/// 32-bit register access within one mapped peripheral.
///
/// Offsets are byte offsets from the peripheral base and must be 4-byte
/// aligned.
pub trait RegisterIo: Send + Sync {
    fn read32(&self, offset: usize) -> u32;
    fn write32(&self, offset: usize, value: u32);
}

/// Something that can open a physical address range as a [`RegisterIo`].
pub trait WindowSource: Send + Sync {
    fn open(&self, phys_addr: u64, size: usize) -> Result<Arc<dyn RegisterIo>, HardwareError>;
}

/// Page-aligned span `(start, len)` covering `[addr, addr + size)`.
pub fn page_span(addr: u64, size: usize, page: usize) -> (u64, usize) {
    let page64 = page as u64;
    let start = addr - addr % page64;
    let wanted = size + (addr - start) as usize;
    let len = wanted.div_ceil(page) * page;
    (start, len)
}

fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page > 0 { page as usize } else { 4096 }
}

/// A `/dev/mem` mapping of one physical range.
pub struct RegisterWindow {
    _file: File,
    map: NonNull<libc::c_void>,
    map_len: usize,
    base: NonNull<u32>,
    size: usize,
}

// The mapping is plain device memory; every access is a single volatile
// 32-bit load or store.
unsafe impl Send for RegisterWindow {}
unsafe impl Sync for RegisterWindow {}

impl RegisterWindow {
    /// Map `[phys_addr, phys_addr + size)` from `device`.
    pub fn open(device: &Path, phys_addr: u64, size: usize) -> Result<Self, HardwareError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(device)
            .map_err(|source| HardwareError::DeviceOpen {
                path: device.to_path_buf(),
                source,
            })?;

        let (start, map_len) = page_span(phys_addr, size, page_size());
        // SAFETY: a fresh shared mapping of an open descriptor; the result is
        // checked against MAP_FAILED before use.
        let raw = unsafe {
            libc::mmap(
                ptr::null_mut(),
                map_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                start as libc::off_t,
            )
        };
        if raw == libc::MAP_FAILED {
            return Err(HardwareError::Map {
                addr: phys_addr,
                source: std::io::Error::last_os_error(),
            });
        }
        let map = NonNull::new(raw).ok_or_else(|| HardwareError::Map {
            addr: phys_addr,
            source: std::io::Error::last_os_error(),
        })?;
        // SAFETY: phys_addr - start < page size <= map_len.
        let base = unsafe { map.cast::<u8>().add((phys_addr - start) as usize) }.cast::<u32>();

        tracing::debug!(
            "mapped {:#x}+{:#x} as {:#x}+{:#x} at {:p}",
            phys_addr,
            size,
            start,
            map_len,
            base.as_ptr()
        );

        Ok(Self {
            _file: file,
            map,
            map_len,
            base,
            size,
        })
    }

    fn unmap(&mut self) -> Result<(), HardwareError> {
        // SAFETY: map/map_len come from the successful mmap in open(), and
        // this runs once, from drop.
        if unsafe { libc::munmap(self.map.as_ptr(), self.map_len) } < 0 {
            return Err(HardwareError::Unmap(std::io::Error::last_os_error()));
        }
        Ok(())
    }

    fn check(&self, offset: usize) {
        assert!(offset % 4 == 0, "register offset {offset:#x} is not word aligned");
        assert!(offset + 4 <= self.size, "register offset {offset:#x} outside window");
    }
}

impl RegisterIo for RegisterWindow {
    fn read32(&self, offset: usize) -> u32 {
        self.check(offset);
        // SAFETY: bounds and alignment checked above; the mapping is live
        // while self exists.
        unsafe { ptr::read_volatile(self.base.as_ptr().add(offset / 4)) }
    }

    fn write32(&self, offset: usize, value: u32) {
        self.check(offset);
        // SAFETY: as for read32.
        unsafe { ptr::write_volatile(self.base.as_ptr().add(offset / 4), value) }
    }
}

/// Dropping the window unmaps it and closes the device. The registry drops
/// its window when the last lease goes away.
impl Drop for RegisterWindow {
    fn drop(&mut self) {
        if let Err(e) = self.unmap() {
            tracing::error!("{}", e);
        }
    }
}

/// Opens windows through a memory device node, normally `/dev/mem`.
#[derive(Debug, Clone)]
pub struct DevMem {
    path: PathBuf,
}

impl DevMem {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for DevMem {
    fn default() -> Self {
        Self::new("/dev/mem")
    }
}

impl WindowSource for DevMem {
    fn open(&self, phys_addr: u64, size: usize) -> Result<Arc<dyn RegisterIo>, HardwareError> {
        Ok(Arc::new(RegisterWindow::open(&self.path, phys_addr, size)?))
    }
}
