//! The runtime context: function registry, native table, and the code
//! cache behind the serialized write path.
//!
//! Functions are installed into the cache on demand, at their first call
//! or invocation: the runtime opens a cache transaction, writes the
//! interpreted-function header followed by the instruction stream, and
//! finalizes the record. A function that does not fit restarts the
//! attempt once after extending the cache to a page large enough for the
//! whole stream.
//!
//! Installed entries are immutable. The dispatch loop reads their words
//! through a raw span without taking the cache lock; only registration,
//! installation, and record lookup synchronize.

use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use bytecode_system::{FunctionSource, InterpHeader};
use code_cache::{CacheConfig, CacheStats, CodeCache};
use core_types::{FaultKind, FunctionId, NativeId, Signature, Value, VmError};

use crate::apply::{NativeEntry, NativeFn, MAX_CALL_ARGS};
use crate::dispatch;
use crate::exception::{self, InFlight};
use crate::unwind;

/// Tunables for the interpreter.
#[derive(Debug, Clone)]
pub struct InterpreterConfig {
    /// Non-tail call depth at which the stack-overflow fault is raised.
    pub max_call_depth: usize,
    /// Bound on one call's outgoing-argument block.
    pub max_args: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            max_call_depth: 512,
            max_args: MAX_CALL_ARGS,
        }
    }
}

/// An installed function: its decoded header and the finalized code span.
#[derive(Debug, Clone)]
pub(crate) struct Installed {
    pub header: Arc<InterpHeader>,
    /// Address of the first instruction word, past the header prefix.
    code_addr: usize,
    /// Instruction stream length in words.
    pub code_words: usize,
    /// The function's whole cache region, header included.
    region: (usize, usize),
}

#[derive(Debug)]
struct FunctionEntry {
    source: FunctionSource,
    installed: Option<Installed>,
}

/// The execution core's runtime: code cache, registries, and the
/// invocation entry point.
///
/// All cache writes go through the internal mutex; reads of finalized
/// code take no lock because finalized regions are never mutated or
/// relocated. Any number of threads may invoke concurrently, each on its
/// own execution frame and thread-local unwind state.
#[derive(Debug)]
pub struct Runtime {
    config: InterpreterConfig,
    cache: Mutex<CodeCache>,
    functions: Mutex<Vec<FunctionEntry>>,
    natives: Mutex<Vec<NativeEntry>>,
}

impl Runtime {
    /// Create a runtime over a fresh code cache.
    pub fn new(cache_config: CacheConfig, config: InterpreterConfig) -> Self {
        Runtime {
            config,
            cache: Mutex::new(CodeCache::new(cache_config)),
            functions: Mutex::new(Vec::new()),
            natives: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// Record a function a front end built. Installation into the cache
    /// is deferred to the first call.
    pub fn register_function(&self, source: FunctionSource) -> FunctionId {
        let mut functions = self.functions.lock();
        let id = FunctionId(functions.len() as u32);
        functions.push(FunctionEntry {
            source,
            installed: None,
        });
        id
    }

    /// Record an external callable reachable through `CallExternal`.
    pub fn register_native(&self, func: NativeFn, signature: Signature) -> NativeId {
        let mut natives = self.natives.lock();
        let id = NativeId(natives.len() as u32);
        natives.push(NativeEntry::new(func, signature));
        id
    }

    pub(crate) fn native(&self, id: NativeId) -> Option<NativeEntry> {
        self.natives.lock().get(id.0 as usize).cloned()
    }

    /// Whether `id` names a registered function.
    pub fn is_registered(&self, id: FunctionId) -> bool {
        (id.0 as usize) < self.functions.lock().len()
    }

    /// Current cache usage counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.lock().stats()
    }

    /// Map a program counter to the logical function owning that code.
    /// Shared with native collaborators walking a raw stack.
    pub fn find_owner(&self, addr: usize) -> Option<FunctionId> {
        self.cache.lock().find_record(addr).map(|rec| rec.owner)
    }

    /// The cache region `[start, end)` an installed function occupies, or
    /// `None` while it is not yet installed.
    pub fn installed_range(&self, id: FunctionId) -> Option<(usize, usize)> {
        let functions = self.functions.lock();
        functions
            .get(id.0 as usize)
            .and_then(|entry| entry.installed.as_ref())
            .map(|installed| installed.region)
    }

    /// Register a code range emitted by a native code generator, so stack
    /// walks over its output resolve through the same interval index.
    pub fn register_native_range(&self, owner: FunctionId, bytes: usize) -> Option<(usize, usize)> {
        let mut cache = self.cache.lock();
        cache.begin_function(owner).ok()?;
        if cache.allocate_code(bytes).is_none() {
            let _ = cache.end_function(false);
            return None;
        }
        let record = cache.end_function(true).ok()?;
        Some((record.start, record.end))
    }

    /// Resolve `id` to its installed entry, installing on demand.
    pub(crate) fn resolve(&self, id: FunctionId) -> Result<Installed, FaultKind> {
        let mut functions = self.functions.lock();
        let entry = functions
            .get_mut(id.0 as usize)
            .ok_or(FaultKind::CompileFailed)?;
        if let Some(installed) = &entry.installed {
            return Ok(installed.clone());
        }
        let installed = self.install(id, &entry.source)?;
        entry.installed = Some(installed.clone());
        Ok(installed)
    }

    /// Write header + stream into the cache inside one transaction. A
    /// `Restart` is retried once after extending to a page that holds the
    /// whole stream.
    fn install(&self, id: FunctionId, source: &FunctionSource) -> Result<Installed, FaultKind> {
        let header = InterpHeader::for_source(id, source);
        let header_words = header.size_words();
        let mut words = Vec::with_capacity(header_words + source.words.len());
        header.encode_into(&mut words);
        words.extend_from_slice(&source.words);
        let total_bytes = words.len() * 8;

        let mut cache = self.cache.lock();
        for attempt in 0..2 {
            if cache.begin_function(id).is_err() {
                return Err(FaultKind::CompileFailed);
            }
            if let Some(addr) = cache.allocate_code(total_bytes) {
                if !cache.write_words(addr, &words) {
                    let _ = cache.end_function(false);
                    return Err(FaultKind::CompileFailed);
                }
                let record = cache
                    .end_function(true)
                    .map_err(|_| FaultKind::CompileFailed)?;
                debug!(
                    "installed {} at [{:#x}, {:#x}), {} code words",
                    id,
                    record.start,
                    record.end,
                    source.words.len()
                );
                return Ok(Installed {
                    header: Arc::new(header),
                    code_addr: addr + header_words * 8,
                    code_words: source.words.len(),
                    region: (record.start, record.end),
                });
            }
            // Did not fit: roll back, and on the first attempt grow to a
            // page covering the whole stream before retrying.
            let _ = cache.end_function(false);
            if attempt == 0 {
                let unit = cache.unit_page_size();
                let factor = ((total_bytes + unit - 1) / unit).max(1);
                let log2 = factor.next_power_of_two().trailing_zeros();
                if cache.extend(log2).is_err() {
                    return Err(FaultKind::CompileFailed);
                }
            }
        }
        Err(FaultKind::CompileFailed)
    }

    /// Borrow an installed function's instruction words.
    pub(crate) fn code_span(&self, fun: &Installed) -> &[u64] {
        // SAFETY: the span was finalized by `install` inside a page owned
        // by `self.cache`. Finalized regions are never mutated or
        // relocated, and their pages are unmapped only at cache teardown
        // (`extend` releases only wholly unused pages, which an installed
        // region's page never is). The borrow cannot outlive `self`.
        unsafe { std::slice::from_raw_parts(fun.code_addr as *const u64, fun.code_words) }
    }

    /// Execute a registered function with `args` as its incoming-argument
    /// block.
    ///
    /// The invocation establishes the outermost recovery point for the
    /// call: an exception unwinding past it is stored as the thread's
    /// last exception and returned as [`VmError::UncaughtException`]; an
    /// untranslated builtin fault is returned as [`VmError::Fault`].
    pub fn invoke(&self, id: FunctionId, args: &[Value]) -> Result<Value, VmError> {
        if !self.is_registered(id) {
            return Err(VmError::UnknownFunction(id));
        }
        let installed = self.resolve(id)?;

        unwind::push_recovery(0);
        unwind::push_frame(id, 0);
        let outcome = dispatch::run(self, installed, args.to_vec(), 0);
        unwind::pop_frame();
        unwind::pop_recovery();

        match outcome {
            Ok(value) => Ok(value),
            Err(_thrown) => match exception::take_in_flight() {
                Some(InFlight::Exception(value)) => {
                    exception::set_last(value.clone());
                    Err(VmError::UncaughtException(value))
                }
                Some(InFlight::Fault(kind)) => Err(kind.into()),
                None => Err(FaultKind::InvalidInstruction.into()),
            },
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Runtime::new(CacheConfig::default(), InterpreterConfig::default())
    }
}
