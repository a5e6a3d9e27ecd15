//! Unit tests for signature descriptors.

use core_types::{Abi, Signature, ValueType};

#[test]
fn test_default_abi_is_internal() {
    assert_eq!(Abi::default(), Abi::Internal);
}

#[test]
fn test_signature_shape() {
    let sig = Signature::new(
        vec![ValueType::Int, ValueType::Float64, ValueType::Ptr],
        ValueType::Long,
    );
    assert_eq!(sig.arity(), 3);
    assert_eq!(sig.params[1], ValueType::Float64);
    assert_eq!(sig.return_type, ValueType::Long);
}

#[test]
fn test_cdecl_signature() {
    let sig = Signature::with_abi(vec![ValueType::Int], ValueType::Int, Abi::Cdecl);
    assert_eq!(sig.abi, Abi::Cdecl);
}
