//! Function-level containers: what a front end hands to the runtime, and
//! the header serialized ahead of each installed instruction stream.

use core_types::{FunctionId, Signature};

use crate::stream::StreamError;

/// One try region of a function: while the program counter lies in
/// `[start, end)`, a thrown exception is delivered to the instruction at
/// `handler` with the exception object in r0. All offsets are word
/// offsets into the function's stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TryRegion {
    /// First covered word offset.
    pub start: usize,
    /// One past the last covered word offset.
    pub end: usize,
    /// Word offset of the handler entry.
    pub handler: usize,
}

impl TryRegion {
    /// Whether `pc` lies inside this region.
    pub fn covers(&self, pc: usize) -> bool {
        pc >= self.start && pc < self.end
    }
}

/// Everything a front end provides for one function: signature, frame
/// sizing, exception regions, and the finished instruction stream.
#[derive(Debug, Clone)]
pub struct FunctionSource {
    /// Parameter and return types.
    pub signature: Signature,
    /// Slots in the incoming-argument area; one per parameter.
    pub arg_slots: u32,
    /// Slots in the local frame, locals plus transient working area.
    pub frame_slots: u32,
    /// Working-area slots reserved for expression evaluation (a suffix of
    /// the frame).
    pub frame_working_slots: u32,
    /// Whether the function contains exception-handling regions.
    pub has_try: bool,
    /// Handler table; empty unless `has_try`.
    pub try_table: Vec<TryRegion>,
    /// The word-encoded instruction stream.
    pub words: Vec<u64>,
}

impl FunctionSource {
    /// Create a source with no try regions. The argument area is sized
    /// from the signature's arity.
    pub fn new(signature: Signature, frame_slots: u32, working_slots: u32, words: Vec<u64>) -> Self {
        let arg_slots = signature.arity() as u32;
        Self {
            signature,
            arg_slots,
            frame_slots,
            frame_working_slots: working_slots,
            has_try: false,
            try_table: Vec::new(),
            words,
        }
    }

    /// Attach a handler table, marking the function as containing try
    /// regions.
    pub fn with_try_table(mut self, table: Vec<TryRegion>) -> Self {
        self.has_try = !table.is_empty();
        self.try_table = table;
        self
    }
}

/// Metadata prefixed immediately before a function's instruction stream
/// in its code region.
///
/// The word layout is: owner, argument-area slots, frame slots, working
/// slots, flags, try-region count, stream length, then three words per
/// try region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpHeader {
    /// Owning logical function.
    pub owner: FunctionId,
    /// Slots in the incoming-argument area.
    pub arg_slots: u32,
    /// Slots in the local frame (locals plus working area).
    pub frame_slots: u32,
    /// Working-area slots reserved for expression evaluation.
    pub working_slots: u32,
    /// Whether entering this function pushes a recovery point.
    pub has_try: bool,
    /// Handler table.
    pub try_table: Vec<TryRegion>,
    /// Length of the instruction stream in words.
    pub code_words: u32,
}

const FLAG_HAS_TRY: u64 = 1;

impl InterpHeader {
    /// Fixed number of header words before the try table.
    pub const FIXED_WORDS: usize = 7;

    /// Build the header for `source`, owned by `owner`.
    pub fn for_source(owner: FunctionId, source: &FunctionSource) -> Self {
        InterpHeader {
            owner,
            arg_slots: source.arg_slots,
            frame_slots: source.frame_slots,
            working_slots: source.frame_working_slots,
            has_try: source.has_try,
            try_table: source.try_table.clone(),
            code_words: source.words.len() as u32,
        }
    }

    /// Total header size in words, including the try table.
    pub fn size_words(&self) -> usize {
        Self::FIXED_WORDS + 3 * self.try_table.len()
    }

    /// Append the word serialization of this header to `out`.
    pub fn encode_into(&self, out: &mut Vec<u64>) {
        out.push(self.owner.0 as u64);
        out.push(self.arg_slots as u64);
        out.push(self.frame_slots as u64);
        out.push(self.working_slots as u64);
        out.push(if self.has_try { FLAG_HAS_TRY } else { 0 });
        out.push(self.try_table.len() as u64);
        out.push(self.code_words as u64);
        for region in &self.try_table {
            out.push(region.start as u64);
            out.push(region.end as u64);
            out.push(region.handler as u64);
        }
    }

    /// Decode a header from the start of `words`; returns the header and
    /// its length in words.
    pub fn decode(words: &[u64]) -> Result<(InterpHeader, usize), StreamError> {
        if words.len() < Self::FIXED_WORDS {
            return Err(StreamError::Truncated { at: words.len() });
        }
        let ntry = words[5] as usize;
        let total = Self::FIXED_WORDS + 3 * ntry;
        if words.len() < total {
            return Err(StreamError::Truncated { at: words.len() });
        }
        let mut try_table = Vec::with_capacity(ntry);
        for i in 0..ntry {
            let base = Self::FIXED_WORDS + 3 * i;
            try_table.push(TryRegion {
                start: words[base] as usize,
                end: words[base + 1] as usize,
                handler: words[base + 2] as usize,
            });
        }
        let header = InterpHeader {
            owner: FunctionId(words[0] as u32),
            arg_slots: words[1] as u32,
            frame_slots: words[2] as u32,
            working_slots: words[3] as u32,
            has_try: words[4] & FLAG_HAS_TRY != 0,
            try_table,
            code_words: words[6] as u32,
        };
        Ok((header, total))
    }

    /// Find the handler covering `pc`, if any. Later table entries take
    /// precedence so inner regions can shadow outer ones.
    pub fn handler_for(&self, pc: usize) -> Option<usize> {
        self.try_table
            .iter()
            .rev()
            .find(|region| region.covers(pc))
            .map(|region| region.handler)
    }
}
