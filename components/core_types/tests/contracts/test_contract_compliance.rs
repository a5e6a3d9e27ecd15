//! Contract compliance tests for core_types
//!
//! These tests verify that the exported types and methods the other
//! components rely on exist with the expected shapes.

use core_types::{Abi, FaultKind, FunctionId, NativeId, Signature, Value, ValueType, VmError};

#[cfg(test)]
mod value_contract_tests {
    use super::*;

    /// Contract: Value must expose every operand variant.
    #[test]
    fn test_value_variants() {
        let _: Value = Value::Void;
        let _: Value = Value::Int(0);
        let _: Value = Value::Long(0);
        let _: Value = Value::Float32(0.0);
        let _: Value = Value::Float64(0.0);
        let _: Value = Value::Ptr(0);
        let _: Value = Value::FuncRef(FunctionId(0));
        let _: Value = Value::Struct(Box::from([0u8; 4]));
    }

    /// Contract: arithmetic helpers return Result<Value, FaultKind>.
    #[test]
    fn test_value_arithmetic_signatures() {
        let a = Value::Int(1);
        let _: Result<Value, FaultKind> = a.wrapping_add(&a);
        let _: Result<Value, FaultKind> = a.checked_mul(&a);
        let _: Result<Value, FaultKind> = a.div(&a);
        let _: Result<bool, FaultKind> = a.as_condition();
    }
}

#[cfg(test)]
mod descriptor_contract_tests {
    use super::*;

    /// Contract: Signature carries params, return type and ABI tag.
    #[test]
    fn test_signature_fields() {
        let sig = Signature::with_abi(vec![ValueType::Int], ValueType::Void, Abi::Cdecl);
        let _: &Vec<ValueType> = &sig.params;
        let _: ValueType = sig.return_type;
        let _: Abi = sig.abi;
    }

    /// Contract: identities are plain index newtypes.
    #[test]
    fn test_identity_newtypes() {
        let f = FunctionId(3);
        let n = NativeId(4);
        assert_eq!(f.0, 3);
        assert_eq!(n.0, 4);
    }

    /// Contract: fault codes are stable and invertible.
    #[test]
    fn test_fault_code_stability() {
        assert_eq!(FaultKind::ArithmeticOverflow.code(), -1);
        assert_eq!(FaultKind::from_code(-2), Some(FaultKind::DivisionByZero));
    }

    /// Contract: VmError wraps uncaught exceptions and faults.
    #[test]
    fn test_vm_error_variants() {
        let _: VmError = VmError::UncaughtException(Value::Int(1));
        let _: VmError = VmError::UnknownFunction(FunctionId(0));
        let _: VmError = VmError::Fault(FaultKind::OutOfMemory);
    }
}
