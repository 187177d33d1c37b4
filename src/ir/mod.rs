//! The compiled program representation handed to the runtime.
//!
//! A [`Root`] is produced once per program by the upstream pipeline and never
//! mutated. [`Root::validate`] is the ingest gate: it checks head arities,
//! table references, lattice operator availability and (optionally) that
//! negation is stratified, so the solver can trust the IR afterwards.

pub mod expr;
pub mod rule;
pub mod symbol;
pub mod table;

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::eval::HostFn;
use crate::List;
use expr::{Expr, IrType};
use rule::{BodyPredicate, Constraint, HeadPredicate, HeadTerm, Polarity, Stratum};
use symbol::{DefSym, EnumSym, HookSym, Loc, TableSym, VarSym};
use table::{IndexDecl, LatticeOps, Table};

/// A definition: formal parameters and a body expression. When a definition
/// backs a closure, its leading formals receive the capture values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Def {
    pub sym: DefSym,
    pub formals: List<VarSym>,
    pub body: Expr,
    pub tpe: IrType,
}

/// One case of an enum declaration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnumCase {
    pub tag: Arc<str>,
    pub tpe: IrType,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnumDecl {
    pub sym: EnumSym,
    pub cases: Vec<EnumCase>,
}

/// A law attached to the program by the surface language. The runtime
/// carries properties as data; verification happens upstream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub law: DefSym,
    pub defn: Expr,
    pub loc: Loc,
}

/// The immutable bundle the runtime consumes: definitions, enums, lattice
/// operator bundles keyed by value type, table schemas, secondary index
/// declarations, strata and properties, plus the host registries (which are
/// attached after deserialization and never serialized).
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Root {
    pub defs: FxHashMap<DefSym, Def>,
    pub enums: FxHashMap<EnumSym, EnumDecl>,
    pub lattices: FxHashMap<IrType, LatticeOps>,
    pub tables: FxHashMap<TableSym, Table>,
    pub indexes: FxHashMap<TableSym, Vec<IndexDecl>>,
    pub strata: Vec<Stratum>,
    pub properties: Vec<Property>,
    pub reachable: FxHashSet<DefSym>,
    /// Linker fallback: definitions implemented by the host.
    #[serde(skip)]
    pub natives: FxHashMap<DefSym, HostFn>,
    /// Host callbacks for `ApplyHook` and the native-interop expressions.
    #[serde(skip)]
    pub hooks: FxHashMap<HookSym, HostFn>,
}

/// Rejection of a malformed `Root` at ingest, before any evaluation runs.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum IngestError {
    #[error("unknown table `{table}` referenced by the constraint at {loc}")]
    UnknownTable { table: String, loc: Loc },
    #[error("unknown definition `{def}` referenced by the constraint at {loc}")]
    UnknownDef { def: String, loc: Loc },
    #[error(
        "the constraint at {loc} supplies {found} terms for table `{table}` of arity {expected}"
    )]
    ArityMismatch {
        table: String,
        expected: usize,
        found: usize,
        loc: Loc,
    },
    #[error("no lattice operations are registered for the value type of table `{table}`")]
    MissingLatticeOps { table: String },
    #[error("index on table `{table}` names column {col}, beyond its arity {arity}")]
    IndexOutOfRange {
        table: String,
        col: usize,
        arity: usize,
    },
    #[error(
        "table `{table}` is negated in stratum {stratum} but derived in stratum {derived_in}; \
         negation may only reach strictly earlier strata"
    )]
    UnstratifiedNegation {
        table: String,
        stratum: usize,
        derived_in: usize,
    },
}

impl Root {
    #[inline]
    pub fn def(&self, sym: &DefSym) -> Option<&Def> {
        self.defs.get(sym)
    }

    #[inline]
    pub fn table(&self, sym: &TableSym) -> Option<&Table> {
        self.tables.get(sym)
    }

    #[inline]
    pub fn lattice_ops(&self, tpe: &IrType) -> Option<&LatticeOps> {
        self.lattices.get(tpe)
    }

    /// Checks the constraint system against the schemas. With `check_strata`
    /// set, additionally verifies that every negated body atom refers to a
    /// table all of whose derivations live in strictly earlier strata.
    pub fn validate(&self, check_strata: bool) -> Result<(), IngestError> {
        for (sym, decls) in &self.indexes {
            let Some(table) = self.tables.get(sym) else {
                continue;
            };
            let arity = table.arity();
            for decl in decls {
                if let Some(&col) = decl.cols.iter().find(|&&c| c >= arity) {
                    return Err(IngestError::IndexOutOfRange {
                        table: sym.name().into(),
                        col,
                        arity,
                    });
                }
            }
        }
        for table in self.tables.values() {
            if let Table::Lattice { sym, value, .. } = table {
                if !self.lattices.contains_key(&value.tpe) {
                    return Err(IngestError::MissingLatticeOps {
                        table: sym.name().into(),
                    });
                }
            }
        }
        let derived = self.derived_tables();
        for (i, stratum) in self.strata.iter().enumerate() {
            for c in &stratum.constraints {
                self.check_constraint(c, i, check_strata, &derived)?;
            }
        }
        Ok(())
    }

    /// The set of tables derived (appearing in a positive head) per stratum.
    fn derived_tables(&self) -> Vec<FxHashSet<TableSym>> {
        self.strata
            .iter()
            .map(|stratum| {
                stratum
                    .constraints
                    .iter()
                    .filter_map(|c| match &c.head {
                        HeadPredicate::Atom {
                            table,
                            polarity: Polarity::Positive,
                            ..
                        } => Some(table.clone()),
                        _ => None,
                    })
                    .collect()
            })
            .collect()
    }

    fn check_constraint(
        &self,
        c: &Constraint,
        stratum: usize,
        check_strata: bool,
        derived: &[FxHashSet<TableSym>],
    ) -> Result<(), IngestError> {
        if let HeadPredicate::Atom { table, terms, .. } = &c.head {
            self.check_atom_arity(table, terms.len(), c.loc)?;
            for term in terms.iter() {
                if let HeadTerm::App { def, .. } = term {
                    self.check_def(def, c.loc)?;
                }
            }
        }
        for pred in c.body.iter() {
            match pred {
                BodyPredicate::Atom {
                    table,
                    polarity,
                    terms,
                } => {
                    self.check_atom_arity(table, terms.len(), c.loc)?;
                    if check_strata && *polarity == Polarity::Negative {
                        if let Some(derived_in) = derived
                            .iter()
                            .enumerate()
                            .skip(stratum)
                            .find(|(_, heads)| heads.contains(table))
                            .map(|(j, _)| j)
                        {
                            return Err(IngestError::UnstratifiedNegation {
                                table: table.name().into(),
                                stratum,
                                derived_in,
                            });
                        }
                    }
                }
                BodyPredicate::Filter { def, .. } => self.check_def(def, c.loc)?,
                BodyPredicate::Loop { term, .. } => {
                    if let HeadTerm::App { def, .. } = term {
                        self.check_def(def, c.loc)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn check_atom_arity(
        &self,
        table: &TableSym,
        found: usize,
        loc: Loc,
    ) -> Result<(), IngestError> {
        let Some(decl) = self.tables.get(table) else {
            return Err(IngestError::UnknownTable {
                table: table.name().into(),
                loc,
            });
        };
        let expected = decl.arity();
        if found != expected {
            return Err(IngestError::ArityMismatch {
                table: table.name().into(),
                expected,
                found,
                loc,
            });
        }
        Ok(())
    }

    fn check_def(&self, def: &DefSym, loc: Loc) -> Result<(), IngestError> {
        if self.defs.contains_key(def) || self.natives.contains_key(def) {
            Ok(())
        } else {
            Err(IngestError::UnknownDef {
                def: def.name().into(),
                loc,
            })
        }
    }
}
