//! The stratified fixed-point driver.
//!
//! Strata run in order. Within a stratum every constraint is evaluated
//! repeatedly until no store reports a change; the stores only ever grow
//! (relations) or ascend (lattice entries), so saturation terminates for
//! lattices of finite height. Any evaluator failure aborts the run and no
//! partial result is returned.

use crate::eval::{EvalError, Value};
use crate::ir::symbol::TableSym;
use crate::ir::{IngestError, Root};
use crate::List;
use thiserror::Error;

use super::lattice::LatticeStore;
use super::relation::RelationStore;
use super::rule::eval_constraint;

/// Ingest-time switches. The default is the production configuration.
#[derive(Clone, Copy, Debug)]
pub struct Options {
    /// Verify at ingest that every negated body atom refers to a table whose
    /// derivations all live in strictly earlier strata. The upstream
    /// stratifier already guarantees this; the check catches hand-built or
    /// corrupted IR.
    pub check_strata: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self { check_strata: true }
    }
}

/// Counters describing a saturation run.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SaturationStats {
    /// Strata entered.
    pub strata: usize,
    /// Total fixed-point iterations across all strata.
    pub iterations: usize,
    /// Constraint evaluations (one rule evaluated once counts one).
    pub rule_applications: usize,
    /// Fresh rows plus changed lattice entries.
    pub facts_derived: usize,
}

/// An initial fact, inserted before stratum 0 runs.
#[derive(Clone, Debug, PartialEq)]
pub enum Fact {
    Relation {
        table: TableSym,
        row: List<Value>,
    },
    Lattice {
        table: TableSym,
        key: List<Value>,
        value: Value,
    },
}

/// Failure of [`saturate`]: either the root was rejected at ingest or a rule
/// failed during evaluation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SaturateError {
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Eval(#[from] EvalError),
}

/// The driver: owns both stores and runs the strata of a validated root.
#[derive(Debug)]
pub struct Solver<'r> {
    root: &'r Root,
    rel: RelationStore,
    lat: LatticeStore,
    stats: SaturationStats,
}

impl<'r> Solver<'r> {
    /// Validates the root and prepares empty stores.
    pub fn new(root: &'r Root, options: Options) -> Result<Self, IngestError> {
        root.validate(options.check_strata)?;
        Ok(Self {
            root,
            rel: RelationStore::new(root),
            lat: LatticeStore::new(root),
            stats: SaturationStats::default(),
        })
    }

    /// Seeds the stores. Facts pass through the same arity and lattice-ops
    /// checks as rule emissions.
    pub fn assert_facts(
        &mut self,
        facts: impl IntoIterator<Item = Fact>,
    ) -> Result<(), EvalError> {
        for fact in facts {
            match fact {
                Fact::Relation { table, row } => {
                    self.rel.insert(&table, row)?;
                }
                Fact::Lattice { table, key, value } => {
                    self.lat.upsert(self.root, &table, key, value)?;
                }
            }
        }
        Ok(())
    }

    /// Runs every stratum to its fixed point. Calling this again on a
    /// saturated solver derives nothing further.
    pub fn saturate(&mut self) -> Result<(), EvalError> {
        for stratum in &self.root.strata {
            self.stats.strata += 1;
            loop {
                self.stats.iterations += 1;
                let mut changed = false;
                for c in &stratum.constraints {
                    self.stats.rule_applications += 1;
                    let report = eval_constraint(self.root, c, &mut self.rel, &mut self.lat)?;
                    changed |= report.changed;
                    self.stats.facts_derived += report.derived;
                }
                if !changed {
                    break;
                }
            }
        }
        Ok(())
    }

    #[inline]
    pub fn stats(&self) -> &SaturationStats {
        &self.stats
    }

    #[inline]
    pub fn relations(&self) -> &RelationStore {
        &self.rel
    }

    #[inline]
    pub fn lattices(&self) -> &LatticeStore {
        &self.lat
    }

    /// Consumes the solver and returns the read-only view of both stores.
    pub fn into_solution(self) -> Solution {
        Solution {
            rel: self.rel,
            lat: self.lat,
            stats: self.stats,
        }
    }
}

/// The read-only result of saturation: per relation the set of derived rows,
/// per lattice table the key-to-value mapping (bottom entries absent).
#[derive(Debug)]
pub struct Solution {
    rel: RelationStore,
    lat: LatticeStore,
    stats: SaturationStats,
}

impl Solution {
    pub fn rows(&self, table: &TableSym) -> impl Iterator<Item = &List<Value>> + '_ {
        self.rel.scan(table)
    }

    pub fn contains(&self, table: &TableSym, row: &[Value]) -> bool {
        self.rel.contains(table, row)
    }

    pub fn lattice_value(&self, table: &TableSym, key: &[Value]) -> Option<&Value> {
        self.lat.get(table, key)
    }

    pub fn lattice_entries(
        &self,
        table: &TableSym,
    ) -> impl Iterator<Item = (&List<Value>, &Value)> + '_ {
        self.lat.scan(table)
    }

    #[inline]
    pub fn stats(&self) -> &SaturationStats {
        &self.stats
    }
}

/// Validates `root`, seeds `facts`, saturates, and returns the solution.
pub fn saturate(root: &Root, facts: Vec<Fact>) -> Result<Solution, SaturateError> {
    let mut solver = Solver::new(root, Options::default())?;
    solver.assert_facts(facts)?;
    solver.saturate()?;
    Ok(solver.into_solution())
}
