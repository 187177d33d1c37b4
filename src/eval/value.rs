//! Runtime values.
//!
//! Values are immutable except for the contents of [`BoxCell`]s. Equality is
//! structural deep equality: tags compare by case name plus payload, tuples
//! element-wise, closures by definition symbol plus captures, and boxes by
//! cell identity. Floats are IEEE-equal with NaN equal to itself and both
//! zeroes identified, which keeps `Eq`/`Hash` consistent so values can key
//! the tuple stores.

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::Arc;

use num_bigint::BigInt;
use once_cell::unsync::OnceCell;

use crate::ir::symbol::{DefSym, EnumSym};

#[derive(Clone, Debug)]
pub enum Value {
    Unit,
    Bool(bool),
    Char(char),
    F32(f32),
    F64(f64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    BigInt(Rc<BigInt>),
    Str(Arc<str>),
    Tag(Rc<TagVal>),
    Tuple(Rc<[Value]>),
    Closure(Rc<Closure>),
    Box(BoxCell),
}

/// A tagged enum value: one case name carrying exactly one payload.
#[derive(Clone, Debug)]
pub struct TagVal {
    pub enm: EnumSym,
    pub tag: Arc<str>,
    pub payload: Value,
}

/// A closure over a lifted definition.
///
/// Each capture slot is write-once. `MkClosureDef` fills the slots it can
/// from the surrounding environment; a slot for the closure's own binding is
/// left empty and later back-patched by `LetRec` with [`Capture::SelfRef`].
/// The self slot is materialized back into a `Value::Closure` of the owning
/// `Rc` at application time, so no reference cycle exists.
#[derive(Debug)]
pub struct Closure {
    pub def: DefSym,
    captures: Box<[OnceCell<Capture>]>,
}

#[derive(Clone, Debug)]
pub enum Capture {
    Value(Value),
    SelfRef,
}

impl Closure {
    pub fn new(def: DefSym, slots: usize) -> Self {
        Self {
            def,
            captures: (0..slots).map(|_| OnceCell::new()).collect(),
        }
    }

    #[inline]
    pub fn num_captures(&self) -> usize {
        self.captures.len()
    }

    #[inline]
    pub fn capture(&self, i: usize) -> Option<&Capture> {
        self.captures.get(i).and_then(OnceCell::get)
    }

    /// Fills a capture slot. Returns `false` when the slot index is out of
    /// range; an already-filled slot is left untouched.
    pub fn fill(&self, i: usize, capture: Capture) -> bool {
        match self.captures.get(i) {
            Some(slot) => {
                let _ = slot.set(capture);
                true
            }
            None => false,
        }
    }
}

/// Resolves a capture slot against the closure that owns it.
pub fn capture_value(capture: &Capture, owner: &Rc<Closure>) -> Value {
    match capture {
        Capture::Value(v) => v.clone(),
        Capture::SelfRef => Value::Closure(owner.clone()),
    }
}

/// A one-cell mutable container implementing reference semantics.
#[derive(Clone, Debug)]
pub struct BoxCell(Rc<RefCell<Value>>);

impl BoxCell {
    pub fn new(v: Value) -> Self {
        Self(Rc::new(RefCell::new(v)))
    }

    pub fn get(&self) -> Value {
        self.0.borrow().clone()
    }

    pub fn set(&self, v: Value) {
        *self.0.borrow_mut() = v;
    }

    #[inline]
    pub fn same_cell(&self, other: &BoxCell) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }
}

impl Value {
    pub fn big(i: impl Into<BigInt>) -> Self {
        Value::BigInt(Rc::new(i.into()))
    }

    pub fn str_(s: impl Into<Arc<str>>) -> Self {
        Value::Str(s.into())
    }

    pub fn tag(enm: EnumSym, tag: impl Into<Arc<str>>, payload: Value) -> Self {
        Value::Tag(Rc::new(TagVal {
            enm,
            tag: tag.into(),
            payload,
        }))
    }

    pub fn tuple(elms: Vec<Value>) -> Self {
        Value::Tuple(elms.into())
    }

    /// A short name for the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::Bool(_) => "bool",
            Value::Char(_) => "char",
            Value::F32(_) => "float32",
            Value::F64(_) => "float64",
            Value::I8(_) => "int8",
            Value::I16(_) => "int16",
            Value::I32(_) => "int32",
            Value::I64(_) => "int64",
            Value::BigInt(_) => "bigint",
            Value::Str(_) => "string",
            Value::Tag(_) => "tag",
            Value::Tuple(_) => "tuple",
            Value::Closure(_) => "closure",
            Value::Box(_) => "ref",
        }
    }

    /// The elements a loop generator iterates: a tuple yields its fields and
    /// a `Cons`/`Nil` tag chain yields the list it encodes.
    pub fn elements(&self) -> Option<Vec<Value>> {
        match self {
            Value::Tuple(elms) => Some(elms.to_vec()),
            Value::Tag(_) => {
                let mut out = Vec::new();
                let mut cursor = self.clone();
                loop {
                    let Value::Tag(t) = cursor else {
                        return None;
                    };
                    match (&*t.tag, &t.payload) {
                        ("Nil", _) => return Some(out),
                        ("Cons", Value::Tuple(pair)) if pair.len() == 2 => {
                            out.push(pair[0].clone());
                            cursor = pair[1].clone();
                        }
                        _ => return None,
                    }
                }
            }
            _ => None,
        }
    }
}

fn f32_key(x: f32) -> u32 {
    if x == 0.0 {
        0.0f32.to_bits()
    } else if x.is_nan() {
        f32::NAN.to_bits()
    } else {
        x.to_bits()
    }
}

fn f64_key(x: f64) -> u64 {
    if x == 0.0 {
        0.0f64.to_bits()
    } else if x.is_nan() {
        f64::NAN.to_bits()
    } else {
        x.to_bits()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Unit, Value::Unit) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::F32(a), Value::F32(b)) => f32_key(*a) == f32_key(*b),
            (Value::F64(a), Value::F64(b)) => f64_key(*a) == f64_key(*b),
            (Value::I8(a), Value::I8(b)) => a == b,
            (Value::I16(a), Value::I16(b)) => a == b,
            (Value::I32(a), Value::I32(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::BigInt(a), Value::BigInt(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Tag(a), Value::Tag(b)) => a.tag == b.tag && a.payload == b.payload,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Closure(a), Value::Closure(b)) => closure_eq(a, b),
            (Value::Box(a), Value::Box(b)) => a.same_cell(b),
            _ => false,
        }
    }
}

impl Eq for Value {}

fn closure_eq(a: &Closure, b: &Closure) -> bool {
    if a.def != b.def || a.num_captures() != b.num_captures() {
        return false;
    }
    (0..a.num_captures()).all(|i| match (a.capture(i), b.capture(i)) {
        (None, None) => true,
        (Some(Capture::SelfRef), Some(Capture::SelfRef)) => true,
        (Some(Capture::Value(x)), Some(Capture::Value(y))) => x == y,
        _ => false,
    })
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Unit => {}
            Value::Bool(b) => b.hash(state),
            Value::Char(c) => c.hash(state),
            Value::F32(x) => f32_key(*x).hash(state),
            Value::F64(x) => f64_key(*x).hash(state),
            Value::I8(i) => i.hash(state),
            Value::I16(i) => i.hash(state),
            Value::I32(i) => i.hash(state),
            Value::I64(i) => i.hash(state),
            Value::BigInt(i) => i.hash(state),
            Value::Str(s) => s.hash(state),
            Value::Tag(t) => {
                t.tag.hash(state);
                t.payload.hash(state);
            }
            Value::Tuple(elms) => {
                elms.len().hash(state);
                for e in elms.iter() {
                    e.hash(state);
                }
            }
            Value::Closure(c) => {
                c.def.hash(state);
                c.num_captures().hash(state);
                for i in 0..c.num_captures() {
                    match c.capture(i) {
                        None => state.write_u8(0),
                        Some(Capture::SelfRef) => state.write_u8(1),
                        Some(Capture::Value(v)) => {
                            state.write_u8(2);
                            v.hash(state);
                        }
                    }
                }
            }
            Value::Box(cell) => cell.addr().hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "()"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Char(c) => write!(f, "{c:?}"),
            Value::F32(x) => write!(f, "{x}"),
            Value::F64(x) => write!(f, "{x}"),
            Value::I8(i) => write!(f, "{i}"),
            Value::I16(i) => write!(f, "{i}"),
            Value::I32(i) => write!(f, "{i}"),
            Value::I64(i) => write!(f, "{i}"),
            Value::BigInt(i) => write!(f, "{i}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Tag(t) => write!(f, "{}({})", t.tag, t.payload),
            Value::Tuple(elms) => {
                write!(f, "(")?;
                for (i, e) in elms.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{e}")?;
                }
                write!(f, ")")
            }
            Value::Closure(c) => write!(f, "<closure {}>", c.def),
            // content is withheld: cells can be part of cyclic value graphs
            Value::Box(_) => write!(f, "<ref>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use std::collections::hash_map::DefaultHasher;

    use super::*;

    fn hash_of(v: &Value) -> u64 {
        let mut hasher = DefaultHasher::new();
        v.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn tags_compare_by_name_and_payload() {
        let enm = EnumSym::new(0, "Option");
        let a = Value::tag(enm.clone(), "Some", Value::I32(7));
        let b = Value::tag(enm.clone(), "Some", Value::I32(7));
        let c = Value::tag(enm, "None", Value::Unit);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn boxes_compare_by_cell_identity() {
        let a = BoxCell::new(Value::I32(1));
        let b = BoxCell::new(Value::I32(1));
        assert_eq!(Value::Box(a.clone()), Value::Box(a.clone()));
        assert_ne!(Value::Box(a), Value::Box(b));
    }

    #[test]
    fn closures_compare_by_def_and_captures() {
        let f = DefSym::new(0, "f");
        let g = DefSym::new(1, "g");
        let mk = |def: &DefSym, cap: Value| {
            let c = Closure::new(def.clone(), 1);
            c.fill(0, Capture::Value(cap));
            Value::Closure(Rc::new(c))
        };
        assert_eq!(mk(&f, Value::I32(1)), mk(&f, Value::I32(1)));
        assert_ne!(mk(&f, Value::I32(1)), mk(&f, Value::I32(2)));
        // same behavior, different definition: unequal by design
        assert_ne!(mk(&f, Value::I32(1)), mk(&g, Value::I32(1)));
    }

    #[test]
    fn float_zeroes_are_identified() {
        assert_eq!(Value::F64(0.0), Value::F64(-0.0));
        assert_eq!(hash_of(&Value::F64(0.0)), hash_of(&Value::F64(-0.0)));
        assert_eq!(Value::F64(f64::NAN), Value::F64(f64::NAN));
    }

    #[test]
    fn cons_chain_yields_elements() {
        let list = EnumSym::new(9, "List");
        let nil = Value::tag(list.clone(), "Nil", Value::Unit);
        let cons = |head: Value, tail: Value| {
            Value::tag(list.clone(), "Cons", Value::tuple(vec![head, tail]))
        };
        let v = cons(Value::I32(1), cons(Value::I32(2), nil));
        assert_eq!(v.elements(), Some(vec![Value::I32(1), Value::I32(2)]));
        assert_eq!(Value::I32(3).elements(), None);
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Unit),
            any::<bool>().prop_map(Value::Bool),
            any::<char>().prop_map(Value::Char),
            any::<i32>().prop_map(Value::I32),
            any::<i64>().prop_map(Value::I64),
            any::<f64>().prop_map(Value::F64),
            any::<i64>().prop_map(|i| Value::big(i)),
            "[a-z]{0,6}".prop_map(|s| Value::str_(s)),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop::collection::vec(inner, 0..4).prop_map(Value::tuple)
        })
    }

    proptest! {
        #[test]
        fn equality_is_reflexive_and_hash_consistent(v in arb_value()) {
            prop_assert!(v == v);
            prop_assert_eq!(hash_of(&v), hash_of(&v.clone()));
        }

        #[test]
        fn equality_is_symmetric(a in arb_value(), b in arb_value()) {
            prop_assert_eq!(a == b, b == a);
        }

        #[test]
        fn equality_is_transitive(a in arb_value(), b in arb_value(), c in arb_value()) {
            if a == b && b == c {
                prop_assert!(a == c);
            }
        }

        #[test]
        fn equal_values_hash_alike(a in arb_value(), b in arb_value()) {
            if a == b {
                prop_assert_eq!(hash_of(&a), hash_of(&b));
            }
        }
    }
}
