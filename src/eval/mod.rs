//! The expression evaluator.
//!
//! [`eval`] walks the simplified IR and produces [`Value`]s. It is pure with
//! respect to everything except box cells and host callbacks; all failures
//! are immediate and propagate to the caller as [`EvalError`]s. Recursion
//! depth is bounded by source nesting.

mod arith;
pub mod env;
pub mod error;
pub mod value;

use std::fmt;
use std::rc::Rc;

use crate::ir::expr::{BinaryOp, Expr, ExprKind};
use crate::ir::symbol::{DefSym, HookSym, Loc};
use crate::ir::{Def, Root};

pub use env::Env;
pub use error::{ErrorKind, EvalError};
pub use value::{capture_value, BoxCell, Capture, Closure, TagVal, Value};

/// A host-supplied function of fixed arity. Installed on the [`Root`] either
/// as a linker fallback for a definition symbol or as a hook; either way the
/// evaluator hands it the evaluated argument vector and expects a [`Value`]
/// back. Failures are wrapped into [`EvalError::Host`].
pub struct HostFn {
    arity: usize,
    f: Box<dyn Fn(&[Value]) -> Result<Value, String>>,
}

impl HostFn {
    pub fn new(arity: usize, f: impl Fn(&[Value]) -> Result<Value, String> + 'static) -> Self {
        Self {
            arity,
            f: Box::new(f),
        }
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn call(&self, args: &[Value], loc: Loc) -> Result<Value, EvalError> {
        if args.len() != self.arity {
            return Err(EvalError::mismatch(
                format!(
                    "host function of arity {} called with {} arguments",
                    self.arity,
                    args.len()
                ),
                loc,
            ));
        }
        (self.f)(args).map_err(|msg| EvalError::Host { msg, loc })
    }
}

impl fmt::Debug for HostFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFn").field("arity", &self.arity).finish()
    }
}

/// Evaluates an expression under an environment against a program root.
pub fn eval(expr: &Expr, env: &mut Env, root: &Root) -> Result<Value, EvalError> {
    let loc = expr.loc;
    match &expr.kind {
        ExprKind::Unit => Ok(Value::Unit),
        ExprKind::Bool(b) => Ok(Value::Bool(*b)),
        ExprKind::Char(c) => Ok(Value::Char(*c)),
        ExprKind::F32(x) => Ok(Value::F32(*x)),
        ExprKind::F64(x) => Ok(Value::F64(*x)),
        ExprKind::I8(i) => Ok(Value::I8(*i)),
        ExprKind::I16(i) => Ok(Value::I16(*i)),
        ExprKind::I32(i) => Ok(Value::I32(*i)),
        ExprKind::I64(i) => Ok(Value::I64(*i)),
        ExprKind::BigInt(i) => Ok(Value::big(i.clone())),
        ExprKind::Str(s) => Ok(Value::Str(s.clone())),
        ExprKind::Var(sym) => env.lookup(sym).cloned().ok_or_else(|| {
            EvalError::UnboundVariable {
                name: sym.name().into(),
                loc,
            }
        }),
        ExprKind::Def(sym) => match root.defs.get(sym) {
            Some(def) => eval(&def.body, env, root),
            None => match root.natives.get(sym) {
                Some(host) => host.call(&[], loc),
                None => Err(unlinked_def(sym, loc)),
            },
        },
        ExprKind::MkClosureDef { def, free_vars } => {
            let closure = Closure::new(def.clone(), free_vars.len());
            for (i, fv) in free_vars.iter().enumerate() {
                // absent slots stay empty until LetRec back-patches them
                if let Some(v) = env.lookup(fv) {
                    closure.fill(i, Capture::Value(v.clone()));
                }
            }
            Ok(Value::Closure(Rc::new(closure)))
        }
        ExprKind::ApplyDef { def, args } | ExprKind::ApplyTail { def, args } => {
            let vals = eval_args(args, env, root)?;
            call_def(root, def, &vals, loc)
        }
        ExprKind::ApplyHook { hook, args }
        | ExprKind::NativeConstructor { hook, args }
        | ExprKind::NativeMethod { hook, args } => {
            let vals = eval_args(args, env, root)?;
            call_hook(root, hook, &vals, loc)
        }
        ExprKind::NativeField { hook } => call_hook(root, hook, &[], loc),
        ExprKind::ApplyClosure { target, args } => {
            let target = eval(target, env, root)?;
            let vals = eval_args(args, env, root)?;
            apply_closure(root, &target, &vals, loc)
        }
        ExprKind::Unary { op, e } => {
            let v = eval(e, env, root)?;
            arith::unary(*op, v, loc)
        }
        ExprKind::Binary { op, e1, e2 } => match op {
            BinaryOp::LogicalAnd => match eval(e1, env, root)? {
                Value::Bool(false) => Ok(Value::Bool(false)),
                Value::Bool(true) => expect_bool(eval(e2, env, root)?, loc),
                other => Err(logic_mismatch(&other, loc)),
            },
            BinaryOp::LogicalOr => match eval(e1, env, root)? {
                Value::Bool(true) => Ok(Value::Bool(true)),
                Value::Bool(false) => expect_bool(eval(e2, env, root)?, loc),
                other => Err(logic_mismatch(&other, loc)),
            },
            _ => {
                let v1 = eval(e1, env, root)?;
                let v2 = eval(e2, env, root)?;
                arith::binary(*op, v1, v2, loc)
            }
        },
        ExprKind::IfThenElse { e1, e2, e3 } => match eval(e1, env, root)? {
            Value::Bool(true) => eval(e2, env, root),
            Value::Bool(false) => eval(e3, env, root),
            other => Err(EvalError::mismatch(
                format!("if condition evaluated to a {}", other.type_name()),
                loc,
            )),
        },
        ExprKind::Let { sym, e1, e2 } => {
            let v1 = eval(e1, env, root)?;
            let mark = env.mark();
            env.bind(sym, v1);
            let result = eval(e2, env, root);
            env.truncate(mark);
            result
        }
        ExprKind::LetRec { sym, e1, e2 } => {
            if !matches!(e1.kind, ExprKind::MkClosureDef { .. }) {
                return Err(EvalError::mismatch(
                    "letrec binds a non-closure expression",
                    loc,
                ));
            }
            let closure = eval(e1, env, root)?;
            let Value::Closure(rc) = &closure else {
                return Err(EvalError::mismatch(
                    "letrec bound expression did not yield a closure",
                    loc,
                ));
            };
            // back-patch: the self slot lives at the variable's offset
            if !rc.fill(sym.offset() as usize, Capture::SelfRef) {
                return Err(EvalError::mismatch(
                    format!(
                        "letrec self slot {} out of range for `{}`",
                        sym.offset(),
                        sym.name()
                    ),
                    loc,
                ));
            }
            let mark = env.mark();
            env.bind(sym, closure);
            let result = eval(e2, env, root);
            env.truncate(mark);
            result
        }
        ExprKind::Is { tag, e, .. } => match eval(e, env, root)? {
            Value::Tag(t) => Ok(Value::Bool(t.tag == *tag)),
            other => Err(EvalError::mismatch(
                format!("tag test on a {}", other.type_name()),
                loc,
            )),
        },
        ExprKind::Tag { enm, tag, e } => {
            let payload = eval(e, env, root)?;
            Ok(Value::tag(enm.clone(), tag.clone(), payload))
        }
        ExprKind::Untag { tag, e, .. } => match eval(e, env, root)? {
            Value::Tag(t) if t.tag == *tag => Ok(t.payload.clone()),
            Value::Tag(t) => Err(EvalError::mismatch(
                format!("untag {tag} applied to a {} value", t.tag),
                loc,
            )),
            other => Err(EvalError::mismatch(
                format!("untag applied to a {}", other.type_name()),
                loc,
            )),
        },
        ExprKind::Index { base, offset } => match eval(base, env, root)? {
            Value::Tuple(elms) => elms.get(*offset).cloned().ok_or_else(|| {
                EvalError::mismatch(
                    format!("tuple index {offset} out of range for arity {}", elms.len()),
                    loc,
                )
            }),
            other => Err(EvalError::mismatch(
                format!("tuple index on a {}", other.type_name()),
                loc,
            )),
        },
        ExprKind::Tuple(elms) => {
            let vals = eval_args(elms, env, root)?;
            Ok(Value::Tuple(vals.into()))
        }
        ExprKind::Ref(e) => {
            let v = eval(e, env, root)?;
            Ok(Value::Box(BoxCell::new(v)))
        }
        ExprKind::Deref(e) => match eval(e, env, root)? {
            Value::Box(cell) => Ok(cell.get()),
            other => Err(EvalError::mismatch(
                format!("deref of a {}", other.type_name()),
                loc,
            )),
        },
        ExprKind::Assign { e1, e2 } => {
            let cell = match eval(e1, env, root)? {
                Value::Box(cell) => cell,
                other => {
                    return Err(EvalError::mismatch(
                        format!("assignment to a {}", other.type_name()),
                        loc,
                    ))
                }
            };
            let v = eval(e2, env, root)?;
            cell.set(v);
            Ok(Value::Unit)
        }
        ExprKind::UserError => Err(EvalError::User { loc }),
        ExprKind::MatchError => Err(EvalError::NonExhaustiveMatch { loc }),
        ExprKind::SwitchError => Err(EvalError::NonExhaustiveSwitch { loc }),
        ExprKind::Existential { .. } | ExprKind::Universal { .. } => Err(EvalError::mismatch(
            "quantified expression reached the evaluator",
            loc,
        )),
    }
}

fn eval_args(args: &[Expr], env: &mut Env, root: &Root) -> Result<Vec<Value>, EvalError> {
    args.iter().map(|a| eval(a, env, root)).collect()
}

/// Invokes a definition through the linker: an IR body when the root has
/// one, the host fallback otherwise.
pub fn call_def(root: &Root, sym: &DefSym, args: &[Value], loc: Loc) -> Result<Value, EvalError> {
    if let Some(def) = root.defs.get(sym) {
        if def.formals.len() != args.len() {
            return Err(arity_mismatch(def, args.len(), loc));
        }
        let mut env = Env::with_capacity(def.formals.len());
        for (formal, v) in def.formals.iter().zip(args) {
            env.bind(formal, v.clone());
        }
        eval(&def.body, &mut env, root)
    } else if let Some(host) = root.natives.get(sym) {
        host.call(args, loc)
    } else {
        Err(unlinked_def(sym, loc))
    }
}

fn call_hook(root: &Root, hook: &HookSym, args: &[Value], loc: Loc) -> Result<Value, EvalError> {
    match root.hooks.get(hook) {
        Some(host) => host.call(args, loc),
        None => Err(EvalError::UnboundVariable {
            name: format!("hook `{}` is not installed", hook.name()),
            loc,
        }),
    }
}

/// Applies a closure value: the callee's leading formals receive the capture
/// slots, the remainder the argument vector.
pub fn apply_closure(
    root: &Root,
    target: &Value,
    args: &[Value],
    loc: Loc,
) -> Result<Value, EvalError> {
    let Value::Closure(closure) = target else {
        return Err(EvalError::mismatch(
            format!("closure application target is a {}", target.type_name()),
            loc,
        ));
    };
    let Some(def) = root.defs.get(&closure.def) else {
        return Err(unlinked_def(&closure.def, loc));
    };
    let ncaps = closure.num_captures();
    if def.formals.len() != ncaps + args.len() {
        return Err(arity_mismatch(def, ncaps + args.len(), loc));
    }
    let mut env = Env::with_capacity(def.formals.len());
    for (i, formal) in def.formals.iter().take(ncaps).enumerate() {
        let Some(capture) = closure.capture(i) else {
            return Err(EvalError::UnboundVariable {
                name: format!("capture slot {i} of `{}` was never filled", closure.def),
                loc,
            });
        };
        env.bind(formal, capture_value(capture, closure));
    }
    for (formal, v) in def.formals.iter().skip(ncaps).zip(args) {
        env.bind(formal, v.clone());
    }
    eval(&def.body, &mut env, root)
}

/// Applies a lattice operator expression to an argument vector. Definition
/// references go straight through the linker; anything else must evaluate to
/// a closure.
pub fn apply_op(root: &Root, op: &Expr, args: &[Value]) -> Result<Value, EvalError> {
    match &op.kind {
        ExprKind::Def(sym) => call_def(root, sym, args, op.loc),
        _ => {
            let mut env = Env::new();
            let target = eval(op, &mut env, root)?;
            apply_closure(root, &target, args, op.loc)
        }
    }
}

fn expect_bool(v: Value, loc: Loc) -> Result<Value, EvalError> {
    match v {
        Value::Bool(b) => Ok(Value::Bool(b)),
        other => Err(logic_mismatch(&other, loc)),
    }
}

fn logic_mismatch(found: &Value, loc: Loc) -> EvalError {
    EvalError::mismatch(
        format!("logical operator applied to a {}", found.type_name()),
        loc,
    )
}

fn unlinked_def(sym: &DefSym, loc: Loc) -> EvalError {
    EvalError::UnboundVariable {
        name: format!("definition `{}` is not linked", sym.name()),
        loc,
    }
}

fn arity_mismatch(def: &Def, found: usize, loc: Loc) -> EvalError {
    EvalError::mismatch(
        format!(
            "`{}` takes {} arguments but received {found}",
            def.sym.name(),
            def.formals.len()
        ),
        loc,
    )
}
