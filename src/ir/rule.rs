//! Constraints: Horn-like rules with a single head and an ordered body.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::expr::Expr;
use super::symbol::{DefSym, EnumSym, Loc, TableSym, VarSym};
use crate::List;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Polarity {
    Positive,
    Negative,
}

/// A term in head position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum HeadTerm {
    /// Reads the variable from the surviving binding
    Var(VarSym),
    /// A constant expression, evaluated in an empty environment
    Lit(Expr),
    /// Applies a definition to the bound values of the listed variables
    App { def: DefSym, args: List<VarSym> },
}

/// A term in body position, unified against a tuple column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum BodyTerm {
    /// Matches any column value
    Wild,
    /// Reads the current binding and requires equality, or binds the column
    Var(VarSym),
    /// A constant expression; requires value equality
    Lit(Expr),
    /// Matches the column against a pattern, binding sub-variables
    Pat(Pattern),
}

/// A pattern over runtime values: tags, nested tuples and literals.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Pattern {
    Wild,
    Var(VarSym),
    Lit(Expr),
    Tag {
        enm: EnumSym,
        tag: Arc<str>,
        pat: Box<Pattern>,
    },
    Tuple(List<Pattern>),
}

/// The head of a constraint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum HeadPredicate {
    /// Always satisfied; derives nothing
    True,
    /// Integrity violation if any binding survives the body
    False,
    Atom {
        table: TableSym,
        polarity: Polarity,
        terms: List<HeadTerm>,
    },
}

/// One element of a constraint body, evaluated in declaration order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum BodyPredicate {
    /// Unifies against the tuples of a table. Negative atoms fail-close:
    /// the incoming binding survives iff nothing in the table matches.
    Atom {
        table: TableSym,
        polarity: Polarity,
        terms: List<BodyTerm>,
    },
    /// Applies a boolean definition to the term values; the binding survives
    /// iff the result is `true`
    Filter { def: DefSym, args: List<BodyTerm> },
    /// Binds the variable to each element of the collection the term
    /// evaluates to
    Loop { var: VarSym, term: HeadTerm },
}

/// A Horn-like rule: head, ordered body, and the rule's variables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub cparams: List<VarSym>,
    pub head: HeadPredicate,
    pub body: List<BodyPredicate>,
    pub loc: Loc,
}

impl Constraint {
    /// A constraint with an empty body derives its head exactly once per
    /// saturation pass: a fact.
    pub fn is_fact(&self) -> bool {
        self.body.is_empty()
    }
}

/// A group of constraints saturated together. Strata are linearly ordered;
/// negation only ever crosses stratum boundaries.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Stratum {
    pub constraints: Vec<Constraint>,
}

impl Stratum {
    pub fn new(constraints: Vec<Constraint>) -> Self {
        Self { constraints }
    }
}
