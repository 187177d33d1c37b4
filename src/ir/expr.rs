//! The simplified expression IR consumed by the evaluator.
//!
//! Every expression node carries a static type tag, used to dispatch
//! arithmetic to the right numeric width, and a source location for error
//! reporting. The tree is produced by the upstream pipeline after closure
//! conversion: lambdas are gone, replaced by `MkClosureDef`/`ApplyClosure`
//! pairs over lifted definitions.

use std::fmt;
use std::sync::Arc;

use itertools::Itertools;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use super::symbol::{DefSym, EnumSym, HookSym, Loc, VarSym};
use crate::List;

/// The static type tag attached to every expression.
///
/// Only the numeric tags drive behavior (arithmetic dispatch); the rest are
/// carried so lattice operator bundles can be looked up by value type.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum IrType {
    Unit,
    Bool,
    Char,
    F32,
    F64,
    I8,
    I16,
    I32,
    I64,
    BigInt,
    Str,
    Enum(EnumSym),
    Tuple,
    Fn,
    Ref,
    Other,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    LogicalNot,
    Plus,
    Minus,
    BitwiseNegate,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Plus,
    Minus,
    Times,
    Divide,
    Modulo,
    Exponentiate,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    NotEqual,
    LogicalAnd,
    LogicalOr,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    BitwiseLeftShift,
    BitwiseRightShift,
}

/// An IR expression: a [`kind`](ExprKind) plus its static type and location.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub tpe: IrType,
    pub loc: Loc,
}

/// Interface for the simplified expression language.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    /// The unit literal
    Unit,
    /// Boolean literal
    Bool(bool),
    /// Character literal
    Char(char),
    /// 32-bit float literal
    F32(f32),
    /// 64-bit float literal
    F64(f64),
    /// 8-bit integer literal
    I8(i8),
    /// 16-bit integer literal
    I16(i16),
    /// 32-bit integer literal
    I32(i32),
    /// 64-bit integer literal
    I64(i64),
    /// Arbitrary-precision integer literal
    BigInt(BigInt),
    /// String literal
    Str(Arc<str>),
    /// Reads a variable from the current environment
    Var(VarSym),
    /// Evaluates the body of a zero-argument definition under the current
    /// environment
    Def(DefSym),
    /// `MkClosureDef(def, free_vars)` allocates a closure over `def` with one
    /// capture slot per free variable. Slots whose variable is absent from
    /// the environment stay empty until `LetRec` back-patches them.
    MkClosureDef { def: DefSym, free_vars: List<VarSym> },
    /// `ApplyDef(def, args)` evaluates `args` left to right and invokes the
    /// definition through the linker
    ApplyDef { def: DefSym, args: List<Expr> },
    /// Same observable semantics as `ApplyDef`; the distinction is a tail
    /// position hint emitted by the simplifier
    ApplyTail { def: DefSym, args: List<Expr> },
    /// `ApplyHook(hook, args)` calls out to a host-provided function
    ApplyHook { hook: HookSym, args: List<Expr> },
    /// `ApplyClosure(target, args)` evaluates `target` to a closure, binds
    /// the callee's leading formals to the captures and the rest to `args`,
    /// then evaluates the callee body
    ApplyClosure { target: Box<Expr>, args: List<Expr> },
    /// Unary operator application; the operand's type tag selects the
    /// numeric variant
    Unary { op: UnaryOp, e: Box<Expr> },
    /// Binary operator application; dispatches on the left operand's type
    /// tag. `LogicalAnd`/`LogicalOr` short-circuit.
    Binary {
        op: BinaryOp,
        e1: Box<Expr>,
        e2: Box<Expr>,
    },
    /// Evaluates the condition, then exactly one branch
    IfThenElse {
        e1: Box<Expr>,
        e2: Box<Expr>,
        e3: Box<Expr>,
    },
    /// `Let(sym, e1, e2)` binds the value of `e1` for the extent of `e2`
    Let {
        sym: VarSym,
        e1: Box<Expr>,
        e2: Box<Expr>,
    },
    /// `LetRec(sym, e1, e2)` where `e1` must be `MkClosureDef`: allocates
    /// the closure, writes the self-reference into the capture slot at the
    /// variable's offset, then evaluates `e2`
    LetRec {
        sym: VarSym,
        e1: Box<Expr>,
        e2: Box<Expr>,
    },
    /// Tests whether the value of `e` carries the given tag
    Is {
        enm: EnumSym,
        tag: Arc<str>,
        e: Box<Expr>,
    },
    /// Wraps the value of `e` in the given tag
    Tag {
        enm: EnumSym,
        tag: Arc<str>,
        e: Box<Expr>,
    },
    /// Extracts the payload of a tagged value; the tag must match
    Untag {
        enm: EnumSym,
        tag: Arc<str>,
        e: Box<Expr>,
    },
    /// Projects the element at `offset` out of a tuple
    Index { base: Box<Expr>, offset: usize },
    /// Evaluates the elements left to right and builds a tuple
    Tuple(List<Expr>),
    /// Allocates a fresh mutable cell holding the value of `e`
    Ref(Box<Expr>),
    /// Reads the current content of a cell
    Deref(Box<Expr>),
    /// `Assign(e1, e2)` overwrites the cell `e1` with the value of `e2` and
    /// returns unit
    Assign { e1: Box<Expr>, e2: Box<Expr> },
    /// Reflective host constructor call
    NativeConstructor { hook: HookSym, args: List<Expr> },
    /// Reflective host field read
    NativeField { hook: HookSym },
    /// Reflective host method call
    NativeMethod { hook: HookSym, args: List<Expr> },
    /// Unconditional failure raised by the source program
    UserError,
    /// Residual of a non-exhaustive match
    MatchError,
    /// Residual of a non-exhaustive switch
    SwitchError,
    /// Illegal at evaluation time; eliminated by the upstream pipeline
    Existential { params: List<VarSym>, body: Box<Expr> },
    /// Illegal at evaluation time; eliminated by the upstream pipeline
    Universal { params: List<VarSym>, body: Box<Expr> },
}

impl Expr {
    #[inline]
    pub fn new(kind: ExprKind, tpe: IrType, loc: Loc) -> Self {
        Self { kind, tpe, loc }
    }

    pub fn unit(loc: Loc) -> Self {
        Self::new(ExprKind::Unit, IrType::Unit, loc)
    }

    pub fn bool_(b: bool, loc: Loc) -> Self {
        Self::new(ExprKind::Bool(b), IrType::Bool, loc)
    }

    pub fn char_(c: char, loc: Loc) -> Self {
        Self::new(ExprKind::Char(c), IrType::Char, loc)
    }

    pub fn f32_(x: f32, loc: Loc) -> Self {
        Self::new(ExprKind::F32(x), IrType::F32, loc)
    }

    pub fn f64_(x: f64, loc: Loc) -> Self {
        Self::new(ExprKind::F64(x), IrType::F64, loc)
    }

    pub fn i8_(i: i8, loc: Loc) -> Self {
        Self::new(ExprKind::I8(i), IrType::I8, loc)
    }

    pub fn i16_(i: i16, loc: Loc) -> Self {
        Self::new(ExprKind::I16(i), IrType::I16, loc)
    }

    pub fn i32_(i: i32, loc: Loc) -> Self {
        Self::new(ExprKind::I32(i), IrType::I32, loc)
    }

    pub fn i64_(i: i64, loc: Loc) -> Self {
        Self::new(ExprKind::I64(i), IrType::I64, loc)
    }

    pub fn big(i: impl Into<BigInt>, loc: Loc) -> Self {
        Self::new(ExprKind::BigInt(i.into()), IrType::BigInt, loc)
    }

    pub fn str_(s: impl Into<Arc<str>>, loc: Loc) -> Self {
        Self::new(ExprKind::Str(s.into()), IrType::Str, loc)
    }

    pub fn var(sym: VarSym, tpe: IrType, loc: Loc) -> Self {
        Self::new(ExprKind::Var(sym), tpe, loc)
    }

    pub fn unary(op: UnaryOp, e: Expr, tpe: IrType, loc: Loc) -> Self {
        Self::new(
            ExprKind::Unary {
                op,
                e: Box::new(e),
            },
            tpe,
            loc,
        )
    }

    pub fn binary(op: BinaryOp, e1: Expr, e2: Expr, tpe: IrType, loc: Loc) -> Self {
        Self::new(
            ExprKind::Binary {
                op,
                e1: Box::new(e1),
                e2: Box::new(e2),
            },
            tpe,
            loc,
        )
    }

    pub fn if_then_else(e1: Expr, e2: Expr, e3: Expr, tpe: IrType, loc: Loc) -> Self {
        Self::new(
            ExprKind::IfThenElse {
                e1: Box::new(e1),
                e2: Box::new(e2),
                e3: Box::new(e3),
            },
            tpe,
            loc,
        )
    }

    pub fn let_(sym: VarSym, e1: Expr, e2: Expr, tpe: IrType, loc: Loc) -> Self {
        Self::new(
            ExprKind::Let {
                sym,
                e1: Box::new(e1),
                e2: Box::new(e2),
            },
            tpe,
            loc,
        )
    }

    pub fn let_rec(sym: VarSym, e1: Expr, e2: Expr, tpe: IrType, loc: Loc) -> Self {
        Self::new(
            ExprKind::LetRec {
                sym,
                e1: Box::new(e1),
                e2: Box::new(e2),
            },
            tpe,
            loc,
        )
    }

    pub fn apply_def(def: DefSym, args: Vec<Expr>, tpe: IrType, loc: Loc) -> Self {
        Self::new(
            ExprKind::ApplyDef {
                def,
                args: args.into(),
            },
            tpe,
            loc,
        )
    }

    pub fn apply_closure(target: Expr, args: Vec<Expr>, tpe: IrType, loc: Loc) -> Self {
        Self::new(
            ExprKind::ApplyClosure {
                target: Box::new(target),
                args: args.into(),
            },
            tpe,
            loc,
        )
    }

    pub fn mk_closure_def(def: DefSym, free_vars: Vec<VarSym>, loc: Loc) -> Self {
        Self::new(
            ExprKind::MkClosureDef {
                def,
                free_vars: free_vars.into(),
            },
            IrType::Fn,
            loc,
        )
    }

    pub fn tuple(elms: Vec<Expr>, loc: Loc) -> Self {
        Self::new(ExprKind::Tuple(elms.into()), IrType::Tuple, loc)
    }

    /// Renders the expression on a single line, for diagnostics.
    pub fn pretty(&self) -> String {
        self.kind.pretty()
    }
}

impl ExprKind {
    fn pretty_args(args: &[Expr]) -> String {
        args.iter().map(|a| a.pretty()).join(", ")
    }

    pub fn pretty(&self) -> String {
        match self {
            ExprKind::Unit => "()".into(),
            ExprKind::Bool(b) => b.to_string(),
            ExprKind::Char(c) => format!("{c:?}"),
            ExprKind::F32(x) => format!("{x}f32"),
            ExprKind::F64(x) => format!("{x}f64"),
            ExprKind::I8(i) => format!("{i}i8"),
            ExprKind::I16(i) => format!("{i}i16"),
            ExprKind::I32(i) => format!("{i}i32"),
            ExprKind::I64(i) => format!("{i}i64"),
            ExprKind::BigInt(i) => format!("{i}ii"),
            ExprKind::Str(s) => format!("{s:?}"),
            ExprKind::Var(sym) => sym.to_string(),
            ExprKind::Def(sym) => sym.to_string(),
            ExprKind::MkClosureDef { def, free_vars } => {
                format!("closure {def}[{}]", free_vars.iter().join(", "))
            }
            ExprKind::ApplyDef { def, args } | ExprKind::ApplyTail { def, args } => {
                format!("{def}({})", Self::pretty_args(args))
            }
            ExprKind::ApplyHook { hook, args } => {
                format!("hook {hook}({})", Self::pretty_args(args))
            }
            ExprKind::ApplyClosure { target, args } => {
                format!("({})({})", target.pretty(), Self::pretty_args(args))
            }
            ExprKind::Unary { op, e } => format!("{op:?}({})", e.pretty()),
            ExprKind::Binary { op, e1, e2 } => {
                format!("{op:?}({}, {})", e1.pretty(), e2.pretty())
            }
            ExprKind::IfThenElse { e1, e2, e3 } => format!(
                "if {} then {} else {}",
                e1.pretty(),
                e2.pretty(),
                e3.pretty()
            ),
            ExprKind::Let { sym, e1, e2 } => {
                format!("let {sym} = {}; {}", e1.pretty(), e2.pretty())
            }
            ExprKind::LetRec { sym, e1, e2 } => {
                format!("letrec {sym} = {}; {}", e1.pretty(), e2.pretty())
            }
            ExprKind::Is { tag, e, .. } => format!("{} is {tag}", e.pretty()),
            ExprKind::Tag { tag, e, .. } => format!("{tag}({})", e.pretty()),
            ExprKind::Untag { tag, e, .. } => format!("untag {tag}({})", e.pretty()),
            ExprKind::Index { base, offset } => format!("{}[{offset}]", base.pretty()),
            ExprKind::Tuple(elms) => format!("({})", Self::pretty_args(elms)),
            ExprKind::Ref(e) => format!("ref {}", e.pretty()),
            ExprKind::Deref(e) => format!("deref {}", e.pretty()),
            ExprKind::Assign { e1, e2 } => format!("{} := {}", e1.pretty(), e2.pretty()),
            ExprKind::NativeConstructor { hook, args } => {
                format!("new {hook}({})", Self::pretty_args(args))
            }
            ExprKind::NativeField { hook } => format!("field {hook}"),
            ExprKind::NativeMethod { hook, args } => {
                format!("invoke {hook}({})", Self::pretty_args(args))
            }
            ExprKind::UserError => "error".into(),
            ExprKind::MatchError => "match-error".into(),
            ExprKind::SwitchError => "switch-error".into(),
            ExprKind::Existential { params, body } => {
                format!("exists [{}]. {}", params.iter().join(", "), body.pretty())
            }
            ExprKind::Universal { params, body } => {
                format!("forall [{}]. {}", params.iter().join(", "), body.pretty())
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pretty())
    }
}
