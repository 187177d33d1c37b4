//! Table schemas and lattice operator bundles.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::expr::{Expr, IrType};
use super::symbol::TableSym;
use crate::List;

/// A named, typed column of a table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: Arc<str>,
    pub tpe: IrType,
}

impl Attribute {
    pub fn new(name: impl Into<Arc<str>>, tpe: IrType) -> Self {
        Self {
            name: name.into(),
            tpe,
        }
    }
}

/// The schema of a table the constraint system derives into.
///
/// A `Relation` holds a set of tuples. A `Lattice` maps key tuples to a
/// single value which only ever ascends under the value type's lattice
/// ordering.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Table {
    Relation {
        sym: TableSym,
        attributes: List<Attribute>,
    },
    Lattice {
        sym: TableSym,
        keys: List<Attribute>,
        value: Attribute,
    },
}

impl Table {
    #[inline]
    pub fn sym(&self) -> &TableSym {
        match self {
            Table::Relation { sym, .. } | Table::Lattice { sym, .. } => sym,
        }
    }

    /// Number of columns a full row of this table carries. For lattices this
    /// counts the key columns plus the value column.
    pub fn arity(&self) -> usize {
        match self {
            Table::Relation { attributes, .. } => attributes.len(),
            Table::Lattice { keys, .. } => keys.len() + 1,
        }
    }

    #[inline]
    pub fn is_lattice(&self) -> bool {
        matches!(self, Table::Lattice { .. })
    }
}

/// A user-declared secondary index: an ordered subset of column positions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDecl {
    pub cols: List<usize>,
}

impl IndexDecl {
    pub fn new(cols: Vec<usize>) -> Self {
        Self { cols: cols.into() }
    }
}

/// The operator bundle attached to a lattice-typed value.
///
/// `bot` and `top` evaluate to values; `leq`, `lub` and `glb` are applied to
/// argument pairs through the evaluator. The stores never inspect the bundle
/// beyond calling `leq` and `lub`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LatticeOps {
    pub bot: Expr,
    pub top: Expr,
    pub leq: Expr,
    pub lub: Expr,
    pub glb: Expr,
}
