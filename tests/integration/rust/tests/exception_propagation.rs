//! Exception propagation across invocation, call, and native
//! boundaries, and the per-thread isolation of unwind state.

use std::sync::{Arc, OnceLock};

use bytecode_system::{FunctionSource, Instr, Reg, StreamWriter, TryRegion};
use core_types::{FaultKind, FunctionId, Signature, Value, ValueType, VmError};
use interpreter::{exception, Runtime};

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn throwing_source(value: i64) -> FunctionSource {
    let mut w = StreamWriter::new();
    w.push(Instr::ConstLong {
        dst: Reg(0),
        value,
    });
    w.push(Instr::Throw { src: Reg(0) });
    FunctionSource::new(Signature::new(vec![], ValueType::Void), 0, 0, w.finish().unwrap())
}

/// An exception crosses two interpreted frames without try regions and
/// lands in the outermost function's handler.
#[test]
fn test_propagation_across_two_call_levels() {
    init_logs();
    let rt = Runtime::default();
    let thrower = rt.register_function(throwing_source(64));

    // middle() just calls thrower().
    let mut w = StreamWriter::new();
    w.push(Instr::Call { func: thrower });
    w.push(Instr::ReturnVoid);
    let middle = rt.register_function(FunctionSource::new(
        Signature::new(vec![], ValueType::Void),
        0,
        0,
        w.finish().unwrap(),
    ));

    let mut w = StreamWriter::new();
    let region_start = w.here();
    w.push(Instr::Call { func: middle });
    let region_end = w.here();
    w.push(Instr::ConstLong {
        dst: Reg(0),
        value: -1,
    });
    w.push(Instr::Return { src: Reg(0) });
    let handler = w.here();
    w.push(Instr::Return { src: Reg(0) });

    let outer = rt.register_function(
        FunctionSource::new(
            Signature::new(vec![], ValueType::Long),
            0,
            0,
            w.finish().unwrap(),
        )
        .with_try_table(vec![TryRegion {
            start: region_start,
            end: region_end,
            handler,
        }]),
    );

    assert_eq!(rt.invoke(outer, &[]), Ok(Value::Long(64)));
    assert_eq!(exception::last(), Some(Value::Long(64)));
}

#[test]
fn test_uncaught_exception_reaches_the_invocation_boundary() {
    init_logs();
    let rt = Runtime::default();
    let thrower = rt.register_function(throwing_source(17));

    assert_eq!(
        rt.invoke(thrower, &[]),
        Err(VmError::UncaughtException(Value::Long(17)))
    );
    assert_eq!(exception::last(), Some(Value::Long(17)));

    // The boundary contained the unwind: the runtime stays usable.
    let mut w = StreamWriter::new();
    w.push(Instr::ConstInt {
        dst: Reg(0),
        value: 5,
    });
    w.push(Instr::Return { src: Reg(0) });
    let ok = rt.register_function(FunctionSource::new(
        Signature::new(vec![], ValueType::Int),
        0,
        0,
        w.finish().unwrap(),
    ));
    assert_eq!(rt.invoke(ok, &[]), Ok(Value::Int(5)));
}

static NESTED_RT: OnceLock<Runtime> = OnceLock::new();
static NESTED_THROWER: OnceLock<FunctionId> = OnceLock::new();

/// A native callee runs a whole nested invocation that throws, catches
/// its error result, and returns normally to the interpreted caller.
fn nested_invoke_native(_args: &[Value]) -> Result<Value, FaultKind> {
    let rt = NESTED_RT.get().expect("runtime installed");
    let thrower = *NESTED_THROWER.get().expect("thrower registered");
    match rt.invoke(thrower, &[]) {
        Err(VmError::UncaughtException(Value::Long(v))) => Ok(Value::Long(v)),
        _ => Err(FaultKind::CalledNested),
    }
}

#[test]
fn test_nested_invocation_inside_a_native_is_contained() {
    init_logs();
    let rt = NESTED_RT.get_or_init(Runtime::default);
    NESTED_THROWER.get_or_init(|| rt.register_function(throwing_source(23)));

    let native = rt.register_native(
        nested_invoke_native,
        Signature::new(vec![], ValueType::Long),
    );

    let mut w = StreamWriter::new();
    w.push(Instr::CallExternal { native });
    w.push(Instr::Return { src: Reg(0) });
    let outer = rt.register_function(FunctionSource::new(
        Signature::new(vec![], ValueType::Long),
        0,
        0,
        w.finish().unwrap(),
    ));

    // The nested invocation's recovery point caught its own exception;
    // nothing unwound into the outer invocation.
    assert_eq!(rt.invoke(outer, &[]), Ok(Value::Long(23)));
}

/// Every thread runs on its own unwind state: concurrent invocations of
/// the same throwing function stay independent.
#[test]
fn test_unwind_state_is_per_thread() {
    init_logs();
    let rt = Arc::new(Runtime::default());
    let thrower = rt.register_function(throwing_source(31));

    // Install once from this thread so the cache write path is exercised
    // before the readers start.
    assert!(rt.invoke(thrower, &[]).is_err());

    let mut handles = Vec::new();
    for i in 0..4 {
        let rt = Arc::clone(&rt);
        handles.push(std::thread::spawn(move || {
            for _ in 0..100 {
                assert_eq!(
                    rt.invoke(thrower, &[]),
                    Err(VmError::UncaughtException(Value::Long(31)))
                );
                assert_eq!(exception::last(), Some(Value::Long(31)));
            }
            i
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
}

/// Fault handlers are installed per thread; a handler on one thread does
/// not translate faults on another.
#[test]
fn test_fault_handler_is_per_thread() {
    init_logs();
    fn to_object(kind: FaultKind) -> Value {
        Value::Long(kind.code() as i64)
    }

    let rt = Arc::new(Runtime::default());
    let mut w = StreamWriter::new();
    w.push(Instr::ConstInt {
        dst: Reg(0),
        value: 1,
    });
    w.push(Instr::ConstInt {
        dst: Reg(1),
        value: 0,
    });
    w.push(Instr::Div {
        dst: Reg(0),
        a: Reg(0),
        b: Reg(1),
    });
    w.push(Instr::Return { src: Reg(0) });
    let div0 = rt.register_function(FunctionSource::new(
        Signature::new(vec![], ValueType::Int),
        0,
        0,
        w.finish().unwrap(),
    ));

    exception::install_handler(to_object);
    assert_eq!(
        rt.invoke(div0, &[]),
        Err(VmError::UncaughtException(Value::Long(
            FaultKind::DivisionByZero.code() as i64
        )))
    );

    // The spawned thread has no handler installed.
    let rt2 = Arc::clone(&rt);
    let joined = std::thread::spawn(move || rt2.invoke(div0, &[]))
        .join()
        .unwrap();
    assert_eq!(joined, Err(VmError::Fault(FaultKind::DivisionByZero)));

    exception::remove_handler();
}
