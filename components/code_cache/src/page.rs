//! OS-level executable page mapping.
//!
//! One [`Page`] is a slab of read/write/execute memory obtained directly
//! from the operating system. Pages are owned exclusively by the code cache
//! and released only when the cache is torn down (plus the one case where
//! `extend` discards a completely unused page).

use std::ptr::NonNull;

/// Fallback allocation granularity when the OS cannot be queried.
pub(crate) const FALLBACK_PAGE_SIZE: usize = 4096;

/// Platform page granularity for executable mappings.
#[cfg(unix)]
pub(crate) fn os_page_granularity() -> usize {
    // SAFETY: sysconf has no preconditions
    let n = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if n > 0 {
        n as usize
    } else {
        FALLBACK_PAGE_SIZE
    }
}

/// Platform page granularity for executable mappings.
///
/// VirtualAlloc reserves at 64 KiB allocation granularity.
#[cfg(windows)]
pub(crate) fn os_page_granularity() -> usize {
    64 * 1024
}

/// Platform page granularity for executable mappings.
#[cfg(not(any(unix, windows)))]
pub(crate) fn os_page_granularity() -> usize {
    FALLBACK_PAGE_SIZE
}

/// Round `size` up to a multiple of `granularity` (a power of two or any
/// positive unit).
pub(crate) fn round_up(size: usize, granularity: usize) -> usize {
    debug_assert!(granularity > 0);
    match size % granularity {
        0 => size.max(granularity),
        rem => size + (granularity - rem),
    }
}

#[cfg(all(unix, not(target_os = "macos")))]
fn map_exec_region(len: usize) -> Option<NonNull<u8>> {
    // SAFETY: anonymous private mapping with no address hint
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
            libc::MAP_ANON | libc::MAP_PRIVATE,
            -1,
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        return None;
    }
    NonNull::new(ptr as *mut u8)
}

#[cfg(target_os = "macos")]
unsafe extern "C" {
    fn pthread_jit_write_protect_np(enabled: libc::c_int);
}

#[cfg(target_os = "macos")]
fn map_exec_region(len: usize) -> Option<NonNull<u8>> {
    // SAFETY: anonymous private MAP_JIT mapping with no address hint
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
            libc::MAP_ANON | libc::MAP_PRIVATE | libc::MAP_JIT,
            -1,
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        return None;
    }
    // MAP_JIT pages start write-protected on Apple Silicon. This thread
    // only ever writes through the cache, never jumps into the page, so
    // leave the mapping writable.
    // SAFETY: toggling the per-thread JIT write protection is always valid
    unsafe { pthread_jit_write_protect_np(0) };
    NonNull::new(ptr as *mut u8)
}

#[cfg(unix)]
fn unmap_region(ptr: NonNull<u8>, len: usize) {
    // SAFETY: `ptr`/`len` came from a successful map_exec_region call
    let _ = unsafe { libc::munmap(ptr.as_ptr() as *mut _, len) };
}

#[cfg(windows)]
fn map_exec_region(len: usize) -> Option<NonNull<u8>> {
    use windows_sys::Win32::System::Memory::{
        MEM_COMMIT, MEM_RESERVE, PAGE_EXECUTE_READWRITE, VirtualAlloc,
    };

    // SAFETY: committing a fresh private region with no address hint
    let ptr = unsafe {
        VirtualAlloc(
            std::ptr::null_mut(),
            len,
            MEM_COMMIT | MEM_RESERVE,
            PAGE_EXECUTE_READWRITE,
        ) as *mut u8
    };
    NonNull::new(ptr)
}

#[cfg(windows)]
fn unmap_region(ptr: NonNull<u8>, _len: usize) {
    use windows_sys::Win32::System::Memory::{MEM_RELEASE, VirtualFree};

    // SAFETY: `ptr` came from a successful VirtualAlloc reservation
    let _ = unsafe { VirtualFree(ptr.as_ptr() as *mut _, 0, MEM_RELEASE) };
}

/// Plain heap fallback for targets without an executable-mapping API. The
/// memory is not executable, which only matters to native code generators;
/// the interpreter never jumps into it.
#[cfg(not(any(unix, windows)))]
fn map_exec_region(len: usize) -> Option<NonNull<u8>> {
    let layout = std::alloc::Layout::from_size_align(len, FALLBACK_PAGE_SIZE).ok()?;
    // SAFETY: layout has non-zero size
    NonNull::new(unsafe { std::alloc::alloc(layout) })
}

#[cfg(not(any(unix, windows)))]
fn unmap_region(ptr: NonNull<u8>, len: usize) {
    let layout = std::alloc::Layout::from_size_align(len, FALLBACK_PAGE_SIZE)
        .expect("layout was valid at allocation time");
    // SAFETY: `ptr`/`layout` match the allocation in map_exec_region
    unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) };
}

/// One OS-allocated slab of executable memory.
#[derive(Debug)]
pub struct Page {
    base: NonNull<u8>,
    size: usize,
}

// SAFETY: the page is an exclusively owned anonymous mapping; nothing about
// it is tied to the thread that created it.
unsafe impl Send for Page {}
// SAFETY: shared references to a Page only read the base/size metadata.
unsafe impl Sync for Page {}

impl Page {
    /// Map a new page of at least `size` bytes, rounded up to the platform
    /// granularity. Returns `None` if the operating system refuses.
    pub(crate) fn map(size: usize) -> Option<Page> {
        let size = round_up(size, os_page_granularity());
        let base = map_exec_region(size)?;
        Some(Page { base, size })
    }

    /// Base address of the mapping.
    pub fn base(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    /// Size of the mapping in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether `addr` falls inside this page.
    pub fn contains(&self, addr: usize) -> bool {
        let base = self.base.as_ptr() as usize;
        addr >= base && addr < base + self.size
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        unmap_region(self.base, self.size);
    }
}
