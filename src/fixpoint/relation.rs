//! The relation tuple store.
//!
//! Each relation holds an insertion-ordered set of fixed-arity rows. Every
//! index declared for a table keeps a posting map from partial key to row
//! positions, updated in the same call as the insert so readers never see a
//! row without its index entries. Rows only ever accumulate; there is no
//! delete surface.

use rustc_hash::FxHashMap;

use crate::eval::{EvalError, Value};
use crate::ir::symbol::{Loc, TableSym};
use crate::ir::table::Table;
use crate::ir::Root;
use crate::{FxIndexSet, List};

#[derive(Debug, Default)]
pub struct RelationStore {
    tables: FxHashMap<TableSym, RelationTable>,
}

#[derive(Debug)]
struct RelationTable {
    arity: usize,
    rows: FxIndexSet<List<Value>>,
    indexes: Vec<RelIndex>,
}

#[derive(Debug)]
struct RelIndex {
    cols: List<usize>,
    postings: FxHashMap<List<Value>, Vec<usize>>,
}

impl RelIndex {
    fn key_of(&self, row: &[Value]) -> List<Value> {
        self.cols.iter().map(|&c| row[c].clone()).collect()
    }
}

impl RelationStore {
    /// Builds empty tables for every relation declared in the root, with the
    /// root's index declarations in declaration order.
    pub fn new(root: &Root) -> Self {
        let tables = root
            .tables
            .values()
            .filter_map(|table| match table {
                Table::Relation { sym, attributes } => {
                    let indexes = root
                        .indexes
                        .get(sym)
                        .map(|decls| {
                            decls
                                .iter()
                                .map(|decl| RelIndex {
                                    cols: decl.cols.clone(),
                                    postings: FxHashMap::default(),
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                    Some((
                        sym.clone(),
                        RelationTable {
                            arity: attributes.len(),
                            rows: FxIndexSet::default(),
                            indexes,
                        },
                    ))
                }
                Table::Lattice { .. } => None,
            })
            .collect();
        Self { tables }
    }

    /// Inserts a row, updating every index. Returns whether the row is new.
    pub fn insert(&mut self, sym: &TableSym, row: List<Value>) -> Result<bool, EvalError> {
        let table = self.tables.get_mut(sym).ok_or_else(|| unknown(sym))?;
        if row.len() != table.arity {
            return Err(EvalError::mismatch(
                format!(
                    "row of width {} emitted into `{}` of arity {}",
                    row.len(),
                    sym.name(),
                    table.arity
                ),
                Loc::UNKNOWN,
            ));
        }
        let (pos, fresh) = table.rows.insert_full(row);
        if fresh {
            // rows.get_index(pos) is the row just inserted
            if let Some(row) = table.rows.get_index(pos) {
                let keys: Vec<List<Value>> =
                    table.indexes.iter().map(|ix| ix.key_of(row)).collect();
                for (ix, key) in table.indexes.iter_mut().zip(keys) {
                    ix.postings.entry(key).or_default().push(pos);
                }
            }
        }
        Ok(fresh)
    }

    /// All rows of a table, in insertion order.
    pub fn scan(&self, sym: &TableSym) -> impl Iterator<Item = &List<Value>> + '_ {
        self.tables
            .get(sym)
            .into_iter()
            .flat_map(|table| table.rows.iter())
    }

    /// The rows whose projection onto the index's columns equals the partial
    /// key.
    pub fn lookup_by_index<'a>(
        &'a self,
        sym: &TableSym,
        index_no: usize,
        key: &'a [Value],
    ) -> impl Iterator<Item = &'a List<Value>> + 'a {
        self.tables.get(sym).into_iter().flat_map(move |table| {
            table
                .indexes
                .get(index_no)
                .and_then(|ix| ix.postings.get(key))
                .into_iter()
                .flatten()
                .filter_map(move |&pos| table.rows.get_index(pos))
        })
    }

    pub fn contains(&self, sym: &TableSym, row: &[Value]) -> bool {
        self.tables
            .get(sym)
            .is_some_and(|table| table.rows.contains(row))
    }

    pub fn count(&self, sym: &TableSym) -> usize {
        self.tables.get(sym).map_or(0, |table| table.rows.len())
    }

    /// Total rows across all relations; the driver's monotonicity witness.
    pub fn total_rows(&self) -> usize {
        self.tables.values().map(|table| table.rows.len()).sum()
    }
}

fn unknown(sym: &TableSym) -> EvalError {
    EvalError::mismatch(
        format!("`{}` is not a known relation", sym.name()),
        Loc::UNKNOWN,
    )
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::ir::table::{Attribute, IndexDecl};
    use crate::ir::expr::IrType;

    fn edge_root() -> (Root, TableSym) {
        let edge = TableSym::new(0, "Edge");
        let mut root = Root::default();
        root.tables.insert(
            edge.clone(),
            Table::Relation {
                sym: edge.clone(),
                attributes: [
                    Attribute::new("src", IrType::I64),
                    Attribute::new("dst", IrType::I64),
                ]
                .into(),
            },
        );
        root.indexes.insert(edge.clone(), vec![IndexDecl::new(vec![0])]);
        (root, edge)
    }

    fn row(a: i64, b: i64) -> List<Value> {
        [Value::I64(a), Value::I64(b)].into()
    }

    #[test]
    fn insert_scan_and_duplicate() {
        let (root, edge) = edge_root();
        let mut store = RelationStore::new(&root);
        assert!(store.insert(&edge, row(1, 2)).unwrap());
        assert!(store.insert(&edge, row(2, 3)).unwrap());
        assert!(!store.insert(&edge, row(1, 2)).unwrap());
        assert_eq!(store.count(&edge), 2);
        assert!(store.contains(&edge, &row(1, 2)));
        assert_eq!(store.scan(&edge).count(), 2);
    }

    #[test]
    fn index_probe_returns_matching_rows() {
        let (root, edge) = edge_root();
        let mut store = RelationStore::new(&root);
        store.insert(&edge, row(1, 2)).unwrap();
        store.insert(&edge, row(1, 3)).unwrap();
        store.insert(&edge, row(2, 3)).unwrap();
        let hits: Vec<_> = store
            .lookup_by_index(&edge, 0, &[Value::I64(1)])
            .collect();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|r| r[0] == Value::I64(1)));
        assert_eq!(store.lookup_by_index(&edge, 0, &[Value::I64(9)]).count(), 0);
    }

    #[test]
    fn arity_is_enforced() {
        let (root, edge) = edge_root();
        let mut store = RelationStore::new(&root);
        assert!(store.insert(&edge, [Value::I64(1)].into()).is_err());
    }

    proptest! {
        #[test]
        fn inserted_rows_are_visible_and_idempotent(pairs in prop::collection::vec((0i64..32, 0i64..32), 0..64)) {
            let (root, edge) = edge_root();
            let mut store = RelationStore::new(&root);
            for &(a, b) in &pairs {
                store.insert(&edge, row(a, b)).unwrap();
            }
            let count = store.count(&edge);
            for &(a, b) in &pairs {
                prop_assert!(store.contains(&edge, &row(a, b)));
                prop_assert!(!store.insert(&edge, row(a, b)).unwrap());
            }
            prop_assert_eq!(store.count(&edge), count);
        }
    }
}
