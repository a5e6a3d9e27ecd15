//! Unit tests for the Value operand type.

use core_types::{FaultKind, FunctionId, Value, ValueType};

#[cfg(test)]
mod arithmetic_tests {
    use super::*;

    #[test]
    fn test_typed_addition() {
        assert_eq!(
            Value::Long(40).wrapping_add(&Value::Long(2)).unwrap(),
            Value::Long(42)
        );
        assert_eq!(
            Value::Float32(1.5).wrapping_add(&Value::Float32(0.5)).unwrap(),
            Value::Float32(2.0)
        );
    }

    #[test]
    fn test_checked_long_multiply_overflow() {
        let big = Value::Long(i64::MAX / 2 + 1);
        assert_eq!(
            big.checked_mul(&Value::Long(2)),
            Err(FaultKind::ArithmeticOverflow)
        );
    }

    #[test]
    fn test_checked_float_add_never_faults() {
        let v = Value::Float64(f64::MAX)
            .checked_add(&Value::Float64(f64::MAX))
            .unwrap();
        assert_eq!(v, Value::Float64(f64::INFINITY));
    }

    #[test]
    fn test_negation() {
        assert_eq!(Value::Int(5).wrapping_neg().unwrap(), Value::Int(-5));
        assert_eq!(
            Value::Int(i32::MIN).wrapping_neg().unwrap(),
            Value::Int(i32::MIN)
        );
    }
}

#[cfg(test)]
mod comparison_tests {
    use super::*;

    #[test]
    fn test_ordering() {
        assert!(Value::Int(1).lt_value(&Value::Int(2)).unwrap());
        assert!(Value::Int(2).le_value(&Value::Int(2)).unwrap());
        assert!(!Value::Float64(2.0).lt_value(&Value::Float64(1.0)).unwrap());
    }

    #[test]
    fn test_equality() {
        assert!(Value::Ptr(16).eq_value(&Value::Ptr(16)).unwrap());
        assert!(Value::FuncRef(FunctionId(1))
            .eq_value(&Value::FuncRef(FunctionId(1)))
            .unwrap());
    }

    #[test]
    fn test_mixed_comparison_faults() {
        assert_eq!(
            Value::Int(1).lt_value(&Value::Float64(2.0)),
            Err(FaultKind::InvalidInstruction)
        );
    }
}

#[test]
fn test_value_type_tags() {
    assert_eq!(Value::Void.value_type(), ValueType::Void);
    assert_eq!(Value::FuncRef(FunctionId(0)).value_type(), ValueType::Ptr);
}
