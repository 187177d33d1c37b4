//! Strict operator semantics.
//!
//! Fixed-width integers wrap at their width (two's complement); division and
//! modulo by zero raise `ArithmeticError` on every integer type while floats
//! follow IEEE-754. Exponentiation goes through a generic float power and is
//! cast back to the operand width. Right shift sign-extends on the signed
//! widths and shift counts mask to the width. `LogicalAnd`/`LogicalOr` never
//! reach this module; the evaluator short-circuits them.

use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::{Pow, Signed, ToPrimitive, Zero};

use crate::ir::expr::{BinaryOp, UnaryOp};
use crate::ir::symbol::Loc;

use super::error::EvalError;
use super::value::Value;

pub(crate) fn unary(op: UnaryOp, v: Value, loc: Loc) -> Result<Value, EvalError> {
    match op {
        UnaryOp::LogicalNot => match v {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            other => Err(operand_mismatch(op, &other, loc)),
        },
        UnaryOp::Plus => Ok(v),
        UnaryOp::Minus => match v {
            Value::F32(a) => Ok(Value::F32(-a)),
            Value::F64(a) => Ok(Value::F64(-a)),
            Value::I8(a) => Ok(Value::I8(a.wrapping_neg())),
            Value::I16(a) => Ok(Value::I16(a.wrapping_neg())),
            Value::I32(a) => Ok(Value::I32(a.wrapping_neg())),
            Value::I64(a) => Ok(Value::I64(a.wrapping_neg())),
            Value::BigInt(a) => Ok(Value::BigInt(Rc::new(-&*a))),
            other => Err(operand_mismatch(op, &other, loc)),
        },
        UnaryOp::BitwiseNegate => match v {
            Value::I8(a) => Ok(Value::I8(!a)),
            Value::I16(a) => Ok(Value::I16(!a)),
            Value::I32(a) => Ok(Value::I32(!a)),
            Value::I64(a) => Ok(Value::I64(!a)),
            Value::BigInt(a) => Ok(Value::BigInt(Rc::new(!&*a))),
            other => Err(operand_mismatch(op, &other, loc)),
        },
    }
}

pub(crate) fn binary(op: BinaryOp, v1: Value, v2: Value, loc: Loc) -> Result<Value, EvalError> {
    match op {
        BinaryOp::Equal => Ok(Value::Bool(v1 == v2)),
        BinaryOp::NotEqual => Ok(Value::Bool(v1 != v2)),
        BinaryOp::LogicalAnd | BinaryOp::LogicalOr => Err(EvalError::mismatch(
            "short-circuit operator reached strict dispatch",
            loc,
        )),
        BinaryOp::Plus
        | BinaryOp::Minus
        | BinaryOp::Times
        | BinaryOp::Divide
        | BinaryOp::Modulo
        | BinaryOp::Exponentiate => arith(op, v1, v2, loc),
        BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => {
            compare(op, v1, v2, loc)
        }
        BinaryOp::BitwiseAnd
        | BinaryOp::BitwiseOr
        | BinaryOp::BitwiseXor
        | BinaryOp::BitwiseLeftShift
        | BinaryOp::BitwiseRightShift => bitwise(op, v1, v2, loc),
    }
}

fn arith(op: BinaryOp, v1: Value, v2: Value, loc: Loc) -> Result<Value, EvalError> {
    macro_rules! ints {
        ($variant:ident, $ty:ty, $a:ident, $b:ident) => {{
            let r = match op {
                BinaryOp::Plus => $a.wrapping_add($b),
                BinaryOp::Minus => $a.wrapping_sub($b),
                BinaryOp::Times => $a.wrapping_mul($b),
                BinaryOp::Divide => {
                    if $b == 0 {
                        return Err(EvalError::arithmetic("division by zero", loc));
                    }
                    $a.wrapping_div($b)
                }
                BinaryOp::Modulo => {
                    if $b == 0 {
                        return Err(EvalError::arithmetic("modulo by zero", loc));
                    }
                    $a.wrapping_rem($b)
                }
                BinaryOp::Exponentiate => ($a as f64).powf($b as f64) as $ty,
                _ => unreachable!(),
            };
            Ok(Value::$variant(r))
        }};
    }
    macro_rules! floats {
        ($variant:ident, $a:ident, $b:ident) => {{
            let r = match op {
                BinaryOp::Plus => $a + $b,
                BinaryOp::Minus => $a - $b,
                BinaryOp::Times => $a * $b,
                BinaryOp::Divide => $a / $b,
                BinaryOp::Modulo => $a % $b,
                BinaryOp::Exponentiate => $a.powf($b),
                _ => unreachable!(),
            };
            Ok(Value::$variant(r))
        }};
    }
    match (v1, v2) {
        (Value::I8(a), Value::I8(b)) => ints!(I8, i8, a, b),
        (Value::I16(a), Value::I16(b)) => ints!(I16, i16, a, b),
        (Value::I32(a), Value::I32(b)) => ints!(I32, i32, a, b),
        (Value::I64(a), Value::I64(b)) => ints!(I64, i64, a, b),
        (Value::F32(a), Value::F32(b)) => floats!(F32, a, b),
        (Value::F64(a), Value::F64(b)) => floats!(F64, a, b),
        (Value::BigInt(a), Value::BigInt(b)) => big_arith(op, &a, &b, loc),
        (a, b) => Err(pair_mismatch(op, &a, &b, loc)),
    }
}

fn big_arith(op: BinaryOp, a: &BigInt, b: &BigInt, loc: Loc) -> Result<Value, EvalError> {
    let r = match op {
        BinaryOp::Plus => a + b,
        BinaryOp::Minus => a - b,
        BinaryOp::Times => a * b,
        BinaryOp::Divide => {
            if b.is_zero() {
                return Err(EvalError::arithmetic("division by zero", loc));
            }
            a / b
        }
        BinaryOp::Modulo => {
            if b.is_zero() {
                return Err(EvalError::arithmetic("modulo by zero", loc));
            }
            a % b
        }
        BinaryOp::Exponentiate => {
            if b.is_negative() {
                return Err(EvalError::arithmetic("negative exponent", loc));
            }
            let e = b
                .to_u32()
                .ok_or(EvalError::arithmetic("exponent out of range", loc))?;
            Pow::pow(a, e)
        }
        _ => unreachable!(),
    };
    Ok(Value::big(r))
}

fn compare(op: BinaryOp, v1: Value, v2: Value, loc: Loc) -> Result<Value, EvalError> {
    macro_rules! ord {
        ($a:expr, $b:expr) => {{
            let r = match op {
                BinaryOp::Less => $a < $b,
                BinaryOp::LessEqual => $a <= $b,
                BinaryOp::Greater => $a > $b,
                BinaryOp::GreaterEqual => $a >= $b,
                _ => unreachable!(),
            };
            Ok(Value::Bool(r))
        }};
    }
    match (v1, v2) {
        (Value::Char(a), Value::Char(b)) => ord!(a, b),
        (Value::I8(a), Value::I8(b)) => ord!(a, b),
        (Value::I16(a), Value::I16(b)) => ord!(a, b),
        (Value::I32(a), Value::I32(b)) => ord!(a, b),
        (Value::I64(a), Value::I64(b)) => ord!(a, b),
        (Value::F32(a), Value::F32(b)) => ord!(a, b),
        (Value::F64(a), Value::F64(b)) => ord!(a, b),
        (Value::BigInt(a), Value::BigInt(b)) => ord!(a, b),
        (a, b) => Err(pair_mismatch(op, &a, &b, loc)),
    }
}

fn bitwise(op: BinaryOp, v1: Value, v2: Value, loc: Loc) -> Result<Value, EvalError> {
    macro_rules! ints {
        ($variant:ident, $a:ident, $b:ident) => {{
            let r = match op {
                BinaryOp::BitwiseAnd => $a & $b,
                BinaryOp::BitwiseOr => $a | $b,
                BinaryOp::BitwiseXor => $a ^ $b,
                BinaryOp::BitwiseLeftShift => $a.wrapping_shl($b as u32),
                BinaryOp::BitwiseRightShift => $a.wrapping_shr($b as u32),
                _ => unreachable!(),
            };
            Ok(Value::$variant(r))
        }};
    }
    match (v1, v2) {
        (Value::I8(a), Value::I8(b)) => ints!(I8, a, b),
        (Value::I16(a), Value::I16(b)) => ints!(I16, a, b),
        (Value::I32(a), Value::I32(b)) => ints!(I32, a, b),
        (Value::I64(a), Value::I64(b)) => ints!(I64, a, b),
        (Value::BigInt(a), Value::BigInt(b)) => big_bitwise(op, &a, &b, loc),
        (a, b) => Err(pair_mismatch(op, &a, &b, loc)),
    }
}

fn big_bitwise(op: BinaryOp, a: &BigInt, b: &BigInt, loc: Loc) -> Result<Value, EvalError> {
    let r = match op {
        BinaryOp::BitwiseAnd => a & b,
        BinaryOp::BitwiseOr => a | b,
        BinaryOp::BitwiseXor => a ^ b,
        BinaryOp::BitwiseLeftShift | BinaryOp::BitwiseRightShift => {
            if b.is_negative() {
                return Err(EvalError::arithmetic("negative shift amount", loc));
            }
            let n = b
                .to_usize()
                .ok_or(EvalError::arithmetic("shift amount out of range", loc))?;
            if op == BinaryOp::BitwiseLeftShift {
                a << n
            } else {
                a >> n
            }
        }
        _ => unreachable!(),
    };
    Ok(Value::big(r))
}

fn operand_mismatch(op: UnaryOp, found: &Value, loc: Loc) -> EvalError {
    EvalError::mismatch(
        format!("{op:?} applied to a {} operand", found.type_name()),
        loc,
    )
}

fn pair_mismatch(op: BinaryOp, a: &Value, b: &Value, loc: Loc) -> EvalError {
    EvalError::mismatch(
        format!(
            "{op:?} applied to {} and {} operands",
            a.type_name(),
            b.type_name()
        ),
        loc,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::error::ErrorKind;

    const L: Loc = Loc::UNKNOWN;

    #[test]
    fn integer_addition() {
        let r = binary(BinaryOp::Plus, Value::I32(2), Value::I32(3), L).unwrap();
        assert_eq!(r, Value::I32(5));
    }

    #[test]
    fn integer_division_by_zero_fails() {
        let e = binary(BinaryOp::Divide, Value::I32(1), Value::I32(0), L).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Arithmetic);
        let e = binary(BinaryOp::Modulo, Value::I64(1), Value::I64(0), L).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Arithmetic);
    }

    #[test]
    fn float_division_by_zero_is_ieee() {
        let r = binary(BinaryOp::Divide, Value::F64(1.0), Value::F64(0.0), L).unwrap();
        assert_eq!(r, Value::F64(f64::INFINITY));
    }

    #[test]
    fn integer_arithmetic_wraps() {
        let r = binary(BinaryOp::Plus, Value::I8(i8::MAX), Value::I8(1), L).unwrap();
        assert_eq!(r, Value::I8(i8::MIN));
        let r = binary(BinaryOp::Divide, Value::I32(i32::MIN), Value::I32(-1), L).unwrap();
        assert_eq!(r, Value::I32(i32::MIN));
    }

    #[test]
    fn exponentiation_rounds_back_to_width() {
        let r = binary(BinaryOp::Exponentiate, Value::I32(2), Value::I32(10), L).unwrap();
        assert_eq!(r, Value::I32(1024));
    }

    #[test]
    fn bigint_ops() {
        let big = |i: i64| Value::big(i);
        let r = binary(BinaryOp::Times, big(1 << 40), big(1 << 40), L).unwrap();
        assert_eq!(r, Value::big(BigInt::from(1u128 << 80)));
        let e = binary(BinaryOp::Divide, big(1), big(0), L).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Arithmetic);
        let e = binary(BinaryOp::Exponentiate, big(2), big(-1), L).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Arithmetic);
    }

    #[test]
    fn right_shift_sign_extends() {
        let r = binary(
            BinaryOp::BitwiseRightShift,
            Value::I32(-16),
            Value::I32(2),
            L,
        )
        .unwrap();
        assert_eq!(r, Value::I32(-4));
    }

    #[test]
    fn char_ordering() {
        let r = binary(BinaryOp::Less, Value::Char('a'), Value::Char('b'), L).unwrap();
        assert_eq!(r, Value::Bool(true));
    }

    #[test]
    fn nan_comparisons_are_false() {
        for op in [
            BinaryOp::Less,
            BinaryOp::LessEqual,
            BinaryOp::Greater,
            BinaryOp::GreaterEqual,
        ] {
            let r = binary(op, Value::F64(f64::NAN), Value::F64(1.0), L).unwrap();
            assert_eq!(r, Value::Bool(false));
        }
    }

    #[test]
    fn mixed_operands_are_rejected() {
        let e = binary(BinaryOp::Plus, Value::I32(1), Value::I64(1), L).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::TypeMismatch);
    }
}
