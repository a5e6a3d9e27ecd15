//! Contract tests verifying the bytecode_system API matches what the
//! interpreter and runtime rely on.

use bytecode_system::{
    FunctionSource, Instr, InterpHeader, Opcode, Reg, StreamReader, StreamWriter, TryRegion,
};
use core_types::{FunctionId, Signature, ValueType};

/// Contract: opcode tags are stable words.
#[test]
fn contract_opcode_words_are_stable() {
    assert_eq!(Opcode::Nop.to_word(), 0);
    assert_eq!(Opcode::from_word(0), Some(Opcode::Nop));
    assert_eq!(Opcode::Alloca.to_word(), 39);
}

/// Contract: StreamWriter::finish() -> Result<Vec<u64>, StreamError>
#[test]
fn contract_writer_produces_words() {
    let mut w = StreamWriter::new();
    w.push(Instr::ReturnVoid);
    let words: Vec<u64> = w.finish().unwrap();
    assert_eq!(words, vec![Opcode::ReturnVoid.to_word()]);
}

/// Contract: StreamReader walks a stream instruction by instruction.
#[test]
fn contract_reader_decodes() {
    let mut w = StreamWriter::new();
    w.push(Instr::Nop);
    w.push(Instr::ReturnVoid);
    let words = w.finish().unwrap();

    let mut r = StreamReader::new(&words);
    assert_eq!(r.decode_next().unwrap().unwrap(), Instr::Nop);
    assert_eq!(r.decode_next().unwrap().unwrap(), Instr::ReturnVoid);
    assert!(r.decode_next().is_none());
}

/// Contract: the header carries frame sizing and the try table, and
/// serializes ahead of the stream.
#[test]
fn contract_header_shape() {
    let sig = Signature::new(vec![ValueType::Int], ValueType::Int);
    let source = FunctionSource::new(sig, 3, 1, vec![Opcode::ReturnVoid.to_word()])
        .with_try_table(vec![TryRegion {
            start: 0,
            end: 1,
            handler: 0,
        }]);
    let header = InterpHeader::for_source(FunctionId(2), &source);
    assert_eq!(header.owner, FunctionId(2));
    assert_eq!(header.arg_slots, 1);
    assert_eq!(header.frame_slots, 3);
    assert_eq!(header.working_slots, 1);
    assert!(header.has_try);
    assert_eq!(header.code_words, 1);

    let mut words = Vec::new();
    header.encode_into(&mut words);
    let (decoded, used) = InterpHeader::decode(&words).unwrap();
    assert_eq!(used, header.size_words());
    assert_eq!(decoded, header);
}

/// Contract: handler lookup is by covering program counter.
#[test]
fn contract_handler_lookup() {
    let header = InterpHeader {
        owner: FunctionId(0),
        arg_slots: 0,
        frame_slots: 0,
        working_slots: 0,
        has_try: true,
        try_table: vec![TryRegion {
            start: 2,
            end: 8,
            handler: 20,
        }],
        code_words: 30,
    };
    assert_eq!(header.handler_for(2), Some(20));
    assert_eq!(header.handler_for(7), Some(20));
    assert_eq!(header.handler_for(8), None);
}
