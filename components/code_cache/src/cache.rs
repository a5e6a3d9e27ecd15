//! The code cache: page management, function transactions, and the
//! program-counter index.
//!
//! Allocation within the active page is dual-ended: code grows up from the
//! bottom through `free_start`, auxiliary data (constant pools, exception
//! tables) grows down from the top through `free_end`. Both cursors are
//! absolute addresses; zero means no active page.
//!
//! The cache is append-only. Insufficient space is never recovered by
//! evicting old functions - compiled code may be executing on another
//! thread at any time, so no safe eviction point exists without pervasive
//! reference counting. The only corrective action is `extend` plus a retry
//! of the whole function-compilation attempt.

use log::debug;
use thiserror::Error;

use core_types::FunctionId;

use crate::page::{os_page_granularity, round_up, Page};
use crate::tree::{FunctionRecord, IntervalTree};

/// Alignment applied to the code cursor when a function transaction opens,
/// so word-encoded instruction streams can be stored directly.
const CODE_ALIGN: usize = 8;

/// Configuration for a [`CodeCache`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Unit page size in bytes; rounded up to the platform granularity.
    pub page_size: usize,
    /// Maximum multiple of the unit size a single page may have.
    pub max_page_factor: usize,
    /// Optional cap on total mapped bytes across all pages.
    pub budget_bytes: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            page_size: 64 * 1024,
            max_page_factor: 1024,
            budget_bytes: None,
        }
    }
}

/// Result codes for cache operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The requested page factor exceeds the configured maximum, or the
    /// page budget would be exceeded.
    #[error("requested cache page is too big")]
    TooBig,
    /// The function did not fit in the remaining space. The transaction
    /// has been rolled back; extend the cache and retry the whole
    /// function-compilation attempt.
    #[error("function did not fit in the cache; restart required")]
    Restart,
    /// The operation violates the transaction protocol. Indicates a caller
    /// bug; no recovery is attempted.
    #[error("cache protocol violation: {0}")]
    Protocol(&'static str),
    /// The operating system refused to map more memory.
    #[error("out of executable memory")]
    OutOfMemory,
}

/// Read-only usage counters for a cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of mapped pages.
    pub pages: usize,
    /// Total mapped bytes.
    pub bytes_mapped: usize,
    /// Bytes handed out by `allocate_code`.
    pub bytes_code: usize,
    /// Bytes handed out by `allocate_aux`.
    pub bytes_aux: usize,
    /// Finalized function records in the interval index.
    pub records: usize,
}

/// The in-progress function transaction.
#[derive(Debug)]
struct OpenFunction {
    owner: FunctionId,
    /// First code byte of the function (post-alignment cursor).
    start: usize,
    /// Cursor positions to restore on rollback.
    saved_start: usize,
    saved_end: usize,
}

/// Page-granular executable memory manager with a PC interval index.
///
/// All write operations (`begin_function`, `allocate_code`,
/// `allocate_aux`, `end_function`, `extend`) must be serialized by the
/// caller; `find_record` and reads of finalized regions are safe from any
/// thread once the writer is quiescent, because finalized records and
/// their backing bytes are never mutated or relocated.
#[derive(Debug)]
pub struct CodeCache {
    config: CacheConfig,
    /// Unit page size after rounding to the platform granularity.
    unit: usize,
    /// Page list, kept separate from the pages' own memory so teardown
    /// never touches possibly swapped-out mappings.
    pages: Vec<Page>,
    tree: IntervalTree,
    /// Code cursor; grows upward. Zero when no active page.
    free_start: usize,
    /// Auxiliary-data cursor; grows downward. Zero when no active page.
    free_end: usize,
    stats: CacheStats,
    open: Option<OpenFunction>,
}

impl CodeCache {
    /// Create a cache with the given configuration. No page is mapped
    /// until the first function transaction needs one.
    pub fn new(config: CacheConfig) -> Self {
        let unit = round_up(config.page_size.max(1), os_page_granularity());
        CodeCache {
            config,
            unit,
            pages: Vec::new(),
            tree: IntervalTree::new(),
            free_start: 0,
            free_end: 0,
            stats: CacheStats::default(),
            open: None,
        }
    }

    /// Unit page size in bytes after platform rounding.
    pub fn unit_page_size(&self) -> usize {
        self.unit
    }

    /// Current usage counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            records: self.tree.len(),
            ..self.stats
        }
    }

    /// Whether a function transaction is open.
    pub fn in_function(&self) -> bool {
        self.open.is_some()
    }

    fn has_active_page(&self) -> bool {
        self.free_start != 0
    }

    /// Map a page of `factor * unit` bytes and make it the active page.
    ///
    /// Any previous partially used page keeps its finalized contents but
    /// receives no further allocations. On failure the allocation cursors
    /// are left null.
    pub fn allocate_page(&mut self, factor: usize) -> Result<(), CacheError> {
        if factor == 0 || factor > self.config.max_page_factor {
            self.free_start = 0;
            self.free_end = 0;
            return Err(CacheError::TooBig);
        }
        let size = self.unit * factor;
        if let Some(budget) = self.config.budget_bytes {
            if self.stats.bytes_mapped + size > budget {
                self.free_start = 0;
                self.free_end = 0;
                return Err(CacheError::TooBig);
            }
        }
        let page = match Page::map(size) {
            Some(page) => page,
            None => {
                self.free_start = 0;
                self.free_end = 0;
                return Err(CacheError::OutOfMemory);
            }
        };
        self.free_start = page.base() as usize;
        self.free_end = self.free_start + page.size();
        self.stats.bytes_mapped += page.size();
        self.stats.pages += 1;
        debug!(
            "mapped cache page #{} at {:#x} ({} bytes)",
            self.stats.pages,
            self.free_start,
            page.size()
        );
        self.pages.push(page);
        Ok(())
    }

    /// Open a function transaction for `owner`, recording the current code
    /// cursor as the function's start address.
    ///
    /// Fails with [`CacheError::Protocol`] if a transaction is already
    /// open, and with [`CacheError::TooBig`] if no active page exists and
    /// none can be allocated.
    pub fn begin_function(&mut self, owner: FunctionId) -> Result<(), CacheError> {
        if self.open.is_some() {
            return Err(CacheError::Protocol("function transaction already open"));
        }
        if !self.has_active_page() {
            self.allocate_page(1)?;
        }
        let saved_start = self.free_start;
        let saved_end = self.free_end;
        let aligned = round_up(self.free_start, CODE_ALIGN).min(self.free_end);
        self.free_start = aligned;
        self.open = Some(OpenFunction {
            owner,
            start: aligned,
            saved_start,
            saved_end,
        });
        Ok(())
    }

    /// Bump-allocate `n` bytes of code space, growing upward.
    ///
    /// Returns the absolute start address, or `None` when the cursors
    /// would cross - the signal to finish the transaction with a failure
    /// result and restart after `extend`.
    pub fn allocate_code(&mut self, n: usize) -> Option<usize> {
        if !self.has_active_page() {
            return None;
        }
        let next = self.free_start.checked_add(n)?;
        if next > self.free_end {
            return None;
        }
        let addr = self.free_start;
        self.free_start = next;
        self.stats.bytes_code += n;
        Some(addr)
    }

    /// Bump-allocate `n` bytes of auxiliary data, growing downward and
    /// aligning the result down to `align` (a power of two).
    ///
    /// May be called with or without an open function transaction;
    /// auxiliary blocks adjacent to a transaction belong to that
    /// function's reserved region.
    pub fn allocate_aux(&mut self, n: usize, align: usize) -> Option<usize> {
        if !self.has_active_page() || align == 0 || !align.is_power_of_two() {
            return None;
        }
        let old_end = self.free_end;
        let lowered = old_end.checked_sub(n)?;
        let aligned = lowered & !(align - 1);
        if aligned < self.free_start {
            return None;
        }
        self.free_end = aligned;
        self.stats.bytes_aux += old_end - aligned;
        Some(aligned)
    }

    /// Close the open function transaction.
    ///
    /// With `ok == false`, both allocation cursors are rolled back to
    /// their positions at `begin_function` time, the pending record is
    /// discarded, and [`CacheError::Restart`] tells the caller to retry
    /// the whole attempt (typically after `extend`).
    ///
    /// With `ok == true`, the record's end address is fixed at the current
    /// code cursor, the record is inserted into the interval index, and a
    /// copy of it is returned.
    pub fn end_function(&mut self, ok: bool) -> Result<FunctionRecord, CacheError> {
        let open = self
            .open
            .take()
            .ok_or(CacheError::Protocol("no function transaction open"))?;
        if !ok {
            self.free_start = open.saved_start;
            self.free_end = open.saved_end;
            return Err(CacheError::Restart);
        }
        let rec = FunctionRecord {
            start: open.start,
            end: self.free_start,
            owner: open.owner,
        };
        self.tree.insert(rec.clone());
        debug!(
            "finalized {} at [{:#x}, {:#x})",
            rec.owner, rec.start, rec.end
        );
        Ok(rec)
    }

    /// Replace the active page with one of at least `1 << log2_factor`
    /// units. If the active page is entirely unused it is unmapped first;
    /// this is the only early page release the cache ever performs.
    ///
    /// Must not be called while a function transaction is open (the
    /// in-progress function assumes a contiguous range); doing so is a
    /// protocol error and leaves the cache untouched.
    pub fn extend(&mut self, log2_factor: u32) -> Result<(), CacheError> {
        if self.open.is_some() {
            return Err(CacheError::Protocol(
                "cannot extend while a function transaction is open",
            ));
        }
        if log2_factor as usize >= usize::BITS as usize {
            return Err(CacheError::TooBig);
        }
        let factor = 1usize << log2_factor;
        if factor > self.config.max_page_factor {
            return Err(CacheError::TooBig);
        }
        if self.has_active_page() {
            if let Some(page) = self.pages.last() {
                let base = page.base() as usize;
                if self.free_start == base && self.free_end == base + page.size() {
                    let page = self.pages.pop().expect("active page exists");
                    self.stats.bytes_mapped -= page.size();
                    self.stats.pages -= 1;
                    debug!("released unused cache page at {:#x}", base);
                    drop(page);
                    self.free_start = 0;
                    self.free_end = 0;
                }
            }
        }
        self.allocate_page(factor)
    }

    /// Map a program counter to the finalized record owning it.
    pub fn find_record(&self, addr: usize) -> Option<&FunctionRecord> {
        self.tree.find(addr)
    }

    /// Height of the interval index; diagnostic only.
    pub fn index_height(&self) -> usize {
        self.tree.height()
    }

    fn page_containing(&self, addr: usize, len: usize) -> Option<&Page> {
        let last = addr.checked_add(len)?.checked_sub(1)?;
        self.pages
            .iter()
            .find(|p| p.contains(addr) && p.contains(last))
    }

    /// Copy `bytes` into cache memory at `addr`.
    ///
    /// The range must lie within one mapped page. Returns `false` without
    /// writing otherwise. Callers only write regions they have allocated
    /// in their own open transaction; finalized regions are immutable by
    /// contract.
    pub fn write_bytes(&mut self, addr: usize, bytes: &[u8]) -> bool {
        if bytes.is_empty() {
            return true;
        }
        if self.page_containing(addr, bytes.len()).is_none() {
            return false;
        }
        // SAFETY: the destination range is inside one live mapping, and the
        // cache is the only writer by the serialization contract.
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), addr as *mut u8, bytes.len());
        }
        true
    }

    /// Copy `words` into cache memory at `addr` (8-byte aligned).
    pub fn write_words(&mut self, addr: usize, words: &[u64]) -> bool {
        if addr % 8 != 0 {
            return false;
        }
        if words.is_empty() {
            return true;
        }
        let len = words.len() * 8;
        if self.page_containing(addr, len).is_none() {
            return false;
        }
        // SAFETY: destination is aligned, inside one live mapping, and the
        // cache is the only writer by the serialization contract.
        unsafe {
            std::ptr::copy_nonoverlapping(words.as_ptr(), addr as *mut u64, words.len());
        }
        true
    }

    /// Borrow `len_words` words of cache memory starting at `addr`
    /// (8-byte aligned). Returns `None` if the range is not wholly inside
    /// one mapped page.
    pub fn code_words(&self, addr: usize, len_words: usize) -> Option<&[u64]> {
        if addr % 8 != 0 {
            return None;
        }
        let len = len_words.checked_mul(8)?;
        if len == 0 {
            return Some(&[]);
        }
        self.page_containing(addr, len)?;
        // SAFETY: the range is inside one live mapping that outlives the
        // returned borrow; finalized bytes are never mutated.
        Some(unsafe { std::slice::from_raw_parts(addr as *const u64, len_words) })
    }

    /// Borrow `len` bytes of cache memory starting at `addr`.
    pub fn code_bytes(&self, addr: usize, len: usize) -> Option<&[u8]> {
        if len == 0 {
            return Some(&[]);
        }
        self.page_containing(addr, len)?;
        // SAFETY: as in `code_words`.
        Some(unsafe { std::slice::from_raw_parts(addr as *const u8, len) })
    }
}

impl Drop for CodeCache {
    fn drop(&mut self) {
        // Pages unmap themselves; one pass over the metadata list.
        debug!(
            "tearing down code cache: {} pages, {} bytes",
            self.stats.pages, self.stats.bytes_mapped
        );
    }
}
