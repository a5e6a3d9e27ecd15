//! Instruction stream writer and reader.
//!
//! The writer is the encoding surface a front end targets: instructions go
//! in decoded form, branch targets go through deferred labels, and
//! `finish` patches every fixup and hands back the flat word vector that
//! the cache will store. The reader is the matching bounds-checked decode
//! cursor.

use thiserror::Error;

use crate::instruction::Instr;
use crate::opcode::{Opcode, Reg};

/// Errors from encoding or decoding an instruction stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StreamError {
    /// A word did not decode to a known opcode tag.
    #[error("unknown opcode tag {tag} at word {at}")]
    UnknownOpcode {
        /// Word offset of the bad tag.
        at: usize,
        /// The offending word.
        tag: u64,
    },
    /// The stream ended in the middle of an instruction.
    #[error("instruction truncated at word {at}")]
    Truncated {
        /// Word offset where input ran out.
        at: usize,
    },
    /// A register operand named a register outside the scratch file.
    #[error("bad register index {index} at word {at}")]
    BadRegister {
        /// Word offset of the bad operand.
        at: usize,
        /// The offending index.
        index: u64,
    },
    /// `finish` found a branch to a label that was never bound.
    #[error("label {label} was never bound")]
    UnboundLabel {
        /// The unbound label's id.
        label: u32,
    },
    /// A label was bound twice.
    #[error("label {label} bound twice")]
    LabelRebound {
        /// The rebound label's id.
        label: u32,
    },
}

/// A deferred branch target handed out by [`StreamWriter::new_label`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(u32);

/// Builder for one function's word-encoded instruction stream.
#[derive(Debug, Default)]
pub struct StreamWriter {
    words: Vec<u64>,
    labels: Vec<Option<u64>>,
    fixups: Vec<(usize, Label)>,
}

impl StreamWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current word offset; the next instruction will start here.
    pub fn here(&self) -> usize {
        self.words.len()
    }

    /// Append one instruction.
    pub fn push(&mut self, instr: Instr) {
        instr.encode(&mut self.words);
    }

    /// Allocate a fresh, unbound label.
    pub fn new_label(&mut self) -> Label {
        let label = Label(self.labels.len() as u32);
        self.labels.push(None);
        label
    }

    /// Bind `label` to the current offset.
    pub fn bind(&mut self, label: Label) -> Result<(), StreamError> {
        let slot = &mut self.labels[label.0 as usize];
        if slot.is_some() {
            return Err(StreamError::LabelRebound { label: label.0 });
        }
        *slot = Some(self.words.len() as u64);
        Ok(())
    }

    fn push_branch(&mut self, op: Opcode, cond: Option<Reg>, label: Label) {
        self.words.push(op.to_word());
        if let Some(cond) = cond {
            self.words.push(cond.0 as u64);
        }
        self.fixups.push((self.words.len(), label));
        self.words.push(0);
    }

    /// Append an unconditional branch to `label`.
    pub fn branch(&mut self, label: Label) {
        self.push_branch(Opcode::Branch, None, label);
    }

    /// Append a branch taken when `cond` is a true condition.
    pub fn branch_if_true(&mut self, cond: Reg, label: Label) {
        self.push_branch(Opcode::BranchIfTrue, Some(cond), label);
    }

    /// Append a branch taken when `cond` is a false condition.
    pub fn branch_if_false(&mut self, cond: Reg, label: Label) {
        self.push_branch(Opcode::BranchIfFalse, Some(cond), label);
    }

    /// Patch every deferred branch and return the finished stream.
    pub fn finish(mut self) -> Result<Vec<u64>, StreamError> {
        for (at, label) in self.fixups {
            let target = self.labels[label.0 as usize]
                .ok_or(StreamError::UnboundLabel { label: label.0 })?;
            self.words[at] = target;
        }
        Ok(self.words)
    }
}

/// Bounds-checked decode cursor over a word stream.
#[derive(Debug)]
pub struct StreamReader<'a> {
    words: &'a [u64],
    pos: usize,
}

impl<'a> StreamReader<'a> {
    /// Create a reader at the start of `words`.
    pub fn new(words: &'a [u64]) -> Self {
        Self { words, pos: 0 }
    }

    /// Current word offset.
    pub fn offset(&self) -> usize {
        self.pos
    }

    /// Whether the reader has consumed the whole stream.
    pub fn is_at_end(&self) -> bool {
        self.pos >= self.words.len()
    }

    /// Decode the next instruction, or `None` at end of stream.
    pub fn decode_next(&mut self) -> Option<Result<Instr, StreamError>> {
        if self.is_at_end() {
            return None;
        }
        match Instr::decode(self.words, self.pos) {
            Ok((instr, next)) => {
                self.pos = next;
                Some(Ok(instr))
            }
            Err(err) => Some(Err(err)),
        }
    }
}

/// Render a stream one instruction per line for diagnostics.
///
/// Decoding stops at the first malformed instruction, which is rendered
/// with its error.
pub fn disassemble(words: &[u64]) -> String {
    let mut out = String::new();
    let mut reader = StreamReader::new(words);
    loop {
        let at = reader.offset();
        match reader.decode_next() {
            None => break,
            Some(Ok(instr)) => {
                out.push_str(&format!("{at:04}: {instr:?}\n"));
            }
            Some(Err(err)) => {
                out.push_str(&format!("{at:04}: <{err}>\n"));
                break;
            }
        }
    }
    out
}
