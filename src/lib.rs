//! Runtime core for the Silt language.
//!
//! Silt is a strict, statically-typed functional language whose programs may
//! declare first-class, stratified Datalog-like constraints over user-defined
//! bounded lattices. An upstream compiler pipeline lowers surface programs to
//! the IR in [`ir`]; this crate evaluates that IR:
//!
//! * [`eval`] walks IR expressions and produces runtime [`eval::Value`]s,
//!   covering closures, recursive lets, algebraic data types, tuples, mutable
//!   reference cells and host interop.
//! * [`fixpoint`] saturates the constraint system: it runs the program's
//!   strata in order, repeatedly deriving facts into relation and lattice
//!   stores until nothing changes.

pub mod eval;
pub mod fixpoint;
pub mod ir;

/// The default container for IR and runtime sequences.
pub type List<T> = Box<[T]>;

pub(crate) type FxIndexMap<K, V> = indexmap::IndexMap<K, V, rustc_hash::FxBuildHasher>;
pub(crate) type FxIndexSet<T> = indexmap::IndexSet<T, rustc_hash::FxBuildHasher>;
