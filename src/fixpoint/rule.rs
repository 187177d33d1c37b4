//! Evaluation of a single constraint against the current stores.
//!
//! The body folds a binding stream left to right in declaration order; the
//! surviving bindings are materialized before the head runs, so one rule
//! pass reads a consistent snapshot of the stores and only then writes its
//! emissions. Repeated evaluation against unchanged stores derives nothing
//! new, which the driver relies on for change detection.

use itertools::Itertools;
use rustc_hash::FxHashMap;

use crate::eval::{call_def, eval, Env, EvalError, Value};
use crate::ir::rule::{
    BodyPredicate, BodyTerm, Constraint, HeadPredicate, HeadTerm, Pattern, Polarity,
};
use crate::ir::symbol::{Loc, TableSym, VarSym};
use crate::ir::table::Table;
use crate::ir::Root;
use crate::List;

use super::lattice::LatticeStore;
use super::relation::RelationStore;

/// A partial mapping from rule variables to values.
type Binding = FxHashMap<u32, Value>;

pub(crate) struct RuleReport {
    pub changed: bool,
    pub derived: usize,
}

/// Evaluates one constraint: folds the body into surviving bindings, then
/// applies the head to the stores.
pub(crate) fn eval_constraint(
    root: &Root,
    c: &Constraint,
    rel: &mut RelationStore,
    lat: &mut LatticeStore,
) -> Result<RuleReport, EvalError> {
    let mut bindings = Vec::new();
    let mut seed = Binding::default();
    fold_body(root, rel, lat, &c.body, &mut seed, &mut bindings, c.loc)?;

    let mut report = RuleReport {
        changed: false,
        derived: 0,
    };
    match &c.head {
        HeadPredicate::True => {}
        HeadPredicate::False => {
            if !bindings.is_empty() {
                return Err(EvalError::Integrity { loc: c.loc });
            }
        }
        // negative heads only exist for dependency analysis upstream
        HeadPredicate::Atom {
            polarity: Polarity::Negative,
            ..
        } => {}
        HeadPredicate::Atom {
            table,
            polarity: Polarity::Positive,
            terms,
        } => {
            let decl = root.table(table).ok_or_else(|| unknown_table(table, c.loc))?;
            let is_lattice = decl.is_lattice();
            for binding in &bindings {
                let row: Vec<Value> = terms
                    .iter()
                    .map(|t| head_term_value(root, t, binding, c.loc))
                    .collect::<Result<_, _>>()?;
                let fresh = if is_lattice {
                    let mut row = row;
                    let value = row.pop().ok_or_else(|| {
                        EvalError::mismatch("lattice emission without a value column", c.loc)
                    })?;
                    lat.upsert(root, table, row.into(), value)?
                } else {
                    rel.insert(table, row.into())?
                };
                if fresh {
                    report.changed = true;
                    report.derived += 1;
                }
            }
        }
    }
    Ok(report)
}

fn fold_body(
    root: &Root,
    rel: &RelationStore,
    lat: &LatticeStore,
    preds: &[BodyPredicate],
    binding: &mut Binding,
    out: &mut Vec<Binding>,
    loc: Loc,
) -> Result<(), EvalError> {
    let Some((pred, rest)) = preds.split_first() else {
        out.push(binding.clone());
        return Ok(());
    };
    match pred {
        BodyPredicate::Atom {
            table,
            polarity: Polarity::Positive,
            terms,
        } => match root.table(table).ok_or_else(|| unknown_table(table, loc))? {
            Table::Relation { .. } => {
                // probe an index when its columns are already determined
                match select_probe(root, table, terms, binding)? {
                    Some((index_no, key)) => {
                        for row in rel.lookup_by_index(table, index_no, &key) {
                            if let Some(bound) = unify_row(root, terms, row, binding)? {
                                fold_body(root, rel, lat, rest, binding, out, loc)?;
                                undo(binding, &bound);
                            }
                        }
                    }
                    None => {
                        for row in rel.scan(table) {
                            if let Some(bound) = unify_row(root, terms, row, binding)? {
                                fold_body(root, rel, lat, rest, binding, out, loc)?;
                                undo(binding, &bound);
                            }
                        }
                    }
                }
            }
            Table::Lattice { keys, .. } => {
                let nk = keys.len();
                for (key, value) in lat.scan(table) {
                    let mut bound = Vec::new();
                    let mut ok = true;
                    for (term, col) in terms[..nk].iter().zip_eq(key.iter()) {
                        if !unify_term(root, term, col, binding, &mut bound)? {
                            ok = false;
                            break;
                        }
                    }
                    if ok && unify_term(root, &terms[nk], value, binding, &mut bound)? {
                        fold_body(root, rel, lat, rest, binding, out, loc)?;
                    }
                    undo(binding, &bound);
                }
            }
        },
        BodyPredicate::Atom {
            table,
            polarity: Polarity::Negative,
            terms,
        } => {
            // fail-close: the binding survives iff nothing matches
            let mut matched = false;
            match root.table(table).ok_or_else(|| unknown_table(table, loc))? {
                Table::Relation { .. } => {
                    for row in rel.scan(table) {
                        if let Some(bound) = unify_row(root, terms, row, binding)? {
                            undo(binding, &bound);
                            matched = true;
                            break;
                        }
                    }
                }
                Table::Lattice { keys, .. } => {
                    let nk = keys.len();
                    for (key, value) in lat.scan(table) {
                        let mut bound = Vec::new();
                        let mut ok = true;
                        for (term, col) in terms[..nk].iter().zip_eq(key.iter()) {
                            if !unify_term(root, term, col, binding, &mut bound)? {
                                ok = false;
                                break;
                            }
                        }
                        let hit = ok && unify_term(root, &terms[nk], value, binding, &mut bound)?;
                        undo(binding, &bound);
                        if hit {
                            matched = true;
                            break;
                        }
                    }
                }
            }
            if !matched {
                fold_body(root, rel, lat, rest, binding, out, loc)?;
            }
        }
        BodyPredicate::Filter { def, args } => {
            let vals: Vec<Value> = args
                .iter()
                .map(|t| filter_term_value(root, t, binding, loc))
                .collect::<Result<_, _>>()?;
            match call_def(root, def, &vals, loc)? {
                Value::Bool(true) => fold_body(root, rel, lat, rest, binding, out, loc)?,
                Value::Bool(false) => {}
                other => {
                    return Err(EvalError::mismatch(
                        format!("filter `{}` returned a {}", def.name(), other.type_name()),
                        loc,
                    ))
                }
            }
        }
        BodyPredicate::Loop { var, term } => {
            let generator = head_term_value(root, term, binding, loc)?;
            let elements = generator.elements().ok_or_else(|| {
                EvalError::mismatch(
                    format!("loop generator yielded a {}", generator.type_name()),
                    loc,
                )
            })?;
            for element in elements {
                let shadowed = binding.insert(var.id(), element);
                fold_body(root, rel, lat, rest, binding, out, loc)?;
                restore(binding, var, shadowed);
            }
        }
    }
    Ok(())
}

/// Unifies every term against its column; on success returns the variables
/// freshly bound in the process, otherwise rolls them back.
fn unify_row(
    root: &Root,
    terms: &[BodyTerm],
    row: &[Value],
    binding: &mut Binding,
) -> Result<Option<Vec<u32>>, EvalError> {
    let mut bound = Vec::new();
    for (term, col) in terms.iter().zip_eq(row.iter()) {
        if !unify_term(root, term, col, binding, &mut bound)? {
            undo(binding, &bound);
            return Ok(None);
        }
    }
    Ok(Some(bound))
}

fn unify_term(
    root: &Root,
    term: &BodyTerm,
    col: &Value,
    binding: &mut Binding,
    bound: &mut Vec<u32>,
) -> Result<bool, EvalError> {
    match term {
        BodyTerm::Wild => Ok(true),
        BodyTerm::Var(v) => Ok(bind_var(v, col, binding, bound)),
        BodyTerm::Lit(e) => Ok(eval(e, &mut Env::new(), root)? == *col),
        BodyTerm::Pat(p) => unify_pattern(root, p, col, binding, bound),
    }
}

fn unify_pattern(
    root: &Root,
    pattern: &Pattern,
    col: &Value,
    binding: &mut Binding,
    bound: &mut Vec<u32>,
) -> Result<bool, EvalError> {
    match pattern {
        Pattern::Wild => Ok(true),
        Pattern::Var(v) => Ok(bind_var(v, col, binding, bound)),
        Pattern::Lit(e) => Ok(eval(e, &mut Env::new(), root)? == *col),
        Pattern::Tag { tag, pat, .. } => match col {
            Value::Tag(t) if t.tag == *tag => unify_pattern(root, pat, &t.payload, binding, bound),
            _ => Ok(false),
        },
        Pattern::Tuple(pats) => match col {
            Value::Tuple(elms) if elms.len() == pats.len() => {
                for (p, e) in pats.iter().zip(elms.iter()) {
                    if !unify_pattern(root, p, e, binding, bound)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => Ok(false),
        },
    }
}

fn bind_var(v: &VarSym, col: &Value, binding: &mut Binding, bound: &mut Vec<u32>) -> bool {
    match binding.get(&v.id()) {
        Some(existing) => existing == col,
        None => {
            binding.insert(v.id(), col.clone());
            bound.push(v.id());
            true
        }
    }
}

fn undo(binding: &mut Binding, bound: &[u32]) {
    for id in bound {
        binding.remove(id);
    }
}

fn restore(binding: &mut Binding, var: &VarSym, shadowed: Option<Value>) {
    match shadowed {
        Some(v) => {
            binding.insert(var.id(), v);
        }
        None => {
            binding.remove(&var.id());
        }
    }
}

/// Picks the first declared index all of whose columns are determined by the
/// current binding, together with the probe key.
fn select_probe(
    root: &Root,
    table: &TableSym,
    terms: &[BodyTerm],
    binding: &Binding,
) -> Result<Option<(usize, List<Value>)>, EvalError> {
    let Some(decls) = root.indexes.get(table) else {
        return Ok(None);
    };
    'decls: for (index_no, decl) in decls.iter().enumerate() {
        let mut key = Vec::with_capacity(decl.cols.len());
        for &col in decl.cols.iter() {
            match terms.get(col) {
                Some(BodyTerm::Var(v)) => match binding.get(&v.id()) {
                    Some(val) => key.push(val.clone()),
                    None => continue 'decls,
                },
                Some(BodyTerm::Lit(e)) => key.push(eval(e, &mut Env::new(), root)?),
                _ => continue 'decls,
            }
        }
        return Ok(Some((index_no, key.into())));
    }
    Ok(None)
}

fn head_term_value(
    root: &Root,
    term: &HeadTerm,
    binding: &Binding,
    loc: Loc,
) -> Result<Value, EvalError> {
    match term {
        HeadTerm::Var(v) => binding.get(&v.id()).cloned().ok_or_else(|| {
            EvalError::UnboundVariable {
                name: v.name().into(),
                loc,
            }
        }),
        HeadTerm::Lit(e) => eval(e, &mut Env::new(), root),
        HeadTerm::App { def, args } => {
            let vals: Vec<Value> = args
                .iter()
                .map(|v| {
                    binding.get(&v.id()).cloned().ok_or_else(|| {
                        EvalError::UnboundVariable {
                            name: v.name().into(),
                            loc,
                        }
                    })
                })
                .collect::<Result<_, _>>()?;
            call_def(root, def, &vals, loc)
        }
    }
}

fn filter_term_value(
    root: &Root,
    term: &BodyTerm,
    binding: &Binding,
    loc: Loc,
) -> Result<Value, EvalError> {
    match term {
        BodyTerm::Var(v) => binding.get(&v.id()).cloned().ok_or_else(|| {
            EvalError::UnboundVariable {
                name: v.name().into(),
                loc,
            }
        }),
        BodyTerm::Lit(e) => eval(e, &mut Env::new(), root),
        BodyTerm::Wild => Err(EvalError::mismatch("wildcard in applied position", loc)),
        BodyTerm::Pat(_) => Err(EvalError::mismatch("pattern in applied position", loc)),
    }
}

fn unknown_table(table: &TableSym, loc: Loc) -> EvalError {
    EvalError::mismatch(format!("`{}` is not a declared table", table.name()), loc)
}
