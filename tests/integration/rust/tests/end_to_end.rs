//! End-to-end tests: a front end builds instruction streams, the runtime
//! installs them into the code cache, and the interpreter executes them.

use bytecode_system::{FunctionSource, Instr, InterpHeader, Reg, StreamWriter, TryRegion};
use code_cache::{CacheConfig, CodeCache};
use core_types::{FunctionId, Signature, Value, ValueType};
use interpreter::{InterpreterConfig, Runtime};

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn int_source(params: usize, frame_slots: u32, words: Vec<u64>) -> FunctionSource {
    FunctionSource::new(
        Signature::new(vec![ValueType::Int; params], ValueType::Int),
        frame_slots,
        0,
        words,
    )
}

/// fib(n) = n < 2 ? n : fib(n - 1) + fib(n - 2), as plain recursion.
fn fib_source(self_id: FunctionId) -> FunctionSource {
    let mut w = StreamWriter::new();
    let recurse = w.new_label();
    w.push(Instr::LoadSlot {
        dst: Reg(0),
        slot: -1,
    });
    w.push(Instr::ConstInt {
        dst: Reg(1),
        value: 2,
    });
    w.push(Instr::CmpLt {
        dst: Reg(2),
        a: Reg(0),
        b: Reg(1),
    });
    w.branch_if_false(Reg(2), recurse);
    w.push(Instr::Return { src: Reg(0) });
    w.bind(recurse).unwrap();
    // slot0 = fib(n - 1)
    w.push(Instr::ConstInt {
        dst: Reg(1),
        value: 1,
    });
    w.push(Instr::Sub {
        dst: Reg(1),
        a: Reg(0),
        b: Reg(1),
    });
    w.push(Instr::PushArg { src: Reg(1) });
    w.push(Instr::Call { func: self_id });
    w.push(Instr::StoreSlot {
        src: Reg(0),
        slot: 0,
    });
    // r0 = fib(n - 2)
    w.push(Instr::LoadSlot {
        dst: Reg(0),
        slot: -1,
    });
    w.push(Instr::ConstInt {
        dst: Reg(1),
        value: 2,
    });
    w.push(Instr::Sub {
        dst: Reg(0),
        a: Reg(0),
        b: Reg(1),
    });
    w.push(Instr::PushArg { src: Reg(0) });
    w.push(Instr::Call { func: self_id });
    w.push(Instr::LoadSlot {
        dst: Reg(1),
        slot: 0,
    });
    w.push(Instr::Add {
        dst: Reg(0),
        a: Reg(0),
        b: Reg(1),
    });
    w.push(Instr::Return { src: Reg(0) });
    int_source(1, 1, w.finish().unwrap())
}

#[test]
fn test_recursive_fibonacci_through_the_full_stack() {
    init_logs();
    let rt = Runtime::default();
    let fib = rt.register_function(fib_source(FunctionId(0)));
    assert_eq!(fib, FunctionId(0));

    let expect = [0, 1, 1, 2, 3, 5, 8, 13, 21, 34, 55];
    for (n, want) in expect.iter().enumerate() {
        assert_eq!(
            rt.invoke(fib, &[Value::Int(n as i32)]),
            Ok(Value::Int(*want)),
            "fib({n})"
        );
    }
}

#[test]
fn test_install_on_first_call_and_pc_lookup() {
    init_logs();
    let rt = Runtime::default();
    let fib = rt.register_function(fib_source(FunctionId(0)));

    assert_eq!(rt.cache_stats().records, 0);
    rt.invoke(fib, &[Value::Int(5)]).unwrap();

    let stats = rt.cache_stats();
    assert_eq!(stats.records, 1);
    assert!(stats.pages >= 1);
    assert!(stats.bytes_code > 0);

    // Any program counter inside the installed region resolves back to
    // the logical function, the same lookup a native stack walk uses.
    let (start, end) = rt.installed_range(fib).unwrap();
    for addr in [start, (start + end) / 2, end - 1] {
        assert_eq!(rt.find_owner(addr), Some(fib));
    }
    assert_eq!(rt.find_owner(end), None);
}

#[test]
fn test_function_larger_than_unit_page_installs_after_restart() {
    init_logs();
    let rt = Runtime::new(
        CacheConfig {
            page_size: 4096,
            max_page_factor: 64,
            budget_bytes: None,
        },
        InterpreterConfig::default(),
    );

    // A stream several unit pages long.
    let mut w = StreamWriter::new();
    for _ in 0..4000 {
        w.push(Instr::Nop);
    }
    w.push(Instr::ConstInt {
        dst: Reg(0),
        value: 7,
    });
    w.push(Instr::Return { src: Reg(0) });
    let big = rt.register_function(int_source(0, 0, w.finish().unwrap()));

    assert_eq!(rt.invoke(big, &[]), Ok(Value::Int(7)));
    let (start, end) = rt.installed_range(big).unwrap();
    assert!(end - start > 4096);
    assert_eq!(rt.find_owner(start + 4096), Some(big));
}

#[test]
fn test_deep_tail_recursion_completes() {
    init_logs();
    // f(n) = n == 0 ? 0 : f(n - 1), tail form.
    let mut w = StreamWriter::new();
    let recurse = w.new_label();
    w.push(Instr::LoadSlot {
        dst: Reg(0),
        slot: -1,
    });
    w.branch_if_true(Reg(0), recurse);
    w.push(Instr::Return { src: Reg(0) });
    w.bind(recurse).unwrap();
    w.push(Instr::ConstInt {
        dst: Reg(1),
        value: 1,
    });
    w.push(Instr::Sub {
        dst: Reg(0),
        a: Reg(0),
        b: Reg(1),
    });
    w.push(Instr::PushArg { src: Reg(0) });
    w.push(Instr::CallTail {
        func: FunctionId(0),
    });

    let rt = Runtime::default();
    let id = rt.register_function(int_source(1, 0, w.finish().unwrap()));
    assert_eq!(id, FunctionId(0));
    assert_eq!(rt.invoke(id, &[Value::Int(2_000_000)]), Ok(Value::Int(0)));
}

/// The interpreted-function header round-trips through real cache
/// memory, the way the runtime stores it ahead of each stream.
#[test]
fn test_header_round_trip_through_cache_region() {
    init_logs();
    let mut cache = CodeCache::new(CacheConfig {
        page_size: 4096,
        max_page_factor: 4,
        budget_bytes: None,
    });

    let header = InterpHeader {
        owner: FunctionId(3),
        arg_slots: 2,
        frame_slots: 5,
        working_slots: 2,
        has_try: true,
        try_table: vec![TryRegion {
            start: 0,
            end: 9,
            handler: 12,
        }],
        code_words: 40,
    };
    let mut words = Vec::new();
    header.encode_into(&mut words);

    cache.begin_function(header.owner).unwrap();
    let addr = cache.allocate_code(words.len() * 8).unwrap();
    assert!(cache.write_words(addr, &words));
    let record = cache.end_function(true).unwrap();

    let stored = cache.code_words(addr, words.len()).unwrap();
    let (decoded, used) = InterpHeader::decode(stored).unwrap();
    assert_eq!(decoded, header);
    assert_eq!(used, words.len());
    assert_eq!(cache.find_record(record.start).unwrap().owner, header.owner);
}

/// Multiple functions share pages and every one remains resolvable and
/// executable after later installs.
#[test]
fn test_many_functions_coexist() {
    init_logs();
    let rt = Runtime::default();

    let mut ids = Vec::new();
    for value in 0..32 {
        let mut w = StreamWriter::new();
        w.push(Instr::ConstInt {
            dst: Reg(0),
            value,
        });
        w.push(Instr::Return { src: Reg(0) });
        ids.push(rt.register_function(int_source(0, 0, w.finish().unwrap())));
    }

    for (value, id) in ids.iter().enumerate() {
        assert_eq!(rt.invoke(*id, &[]), Ok(Value::Int(value as i32)));
    }
    assert_eq!(rt.cache_stats().records, 32);

    // Earlier installs are still exactly resolvable.
    for id in &ids {
        let (start, end) = rt.installed_range(*id).unwrap();
        assert_eq!(rt.find_owner(start).as_ref(), Some(id));
        assert_eq!(rt.find_owner(end - 1).as_ref(), Some(id));
    }
}
