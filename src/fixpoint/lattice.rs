//! The lattice tuple store.
//!
//! Each lattice table maps a key tuple to a single value. Updates join: the
//! stored value is replaced by the least upper bound of the old value and
//! the incoming one, computed through the table's operator bundle. Bottom is
//! absorbing and never stored, and no operation ever moves an entry down
//! under the lattice's ordering: the store is strictly monotone.

use once_cell::unsync::OnceCell;
use rustc_hash::FxHashMap;

use crate::eval::{apply_op, eval, Env, EvalError, Value};
use crate::ir::expr::IrType;
use crate::ir::symbol::{Loc, TableSym};
use crate::ir::table::{LatticeOps, Table};
use crate::ir::Root;
use crate::{FxIndexMap, List};

#[derive(Debug, Default)]
pub struct LatticeStore {
    tables: FxHashMap<TableSym, LatticeTable>,
}

#[derive(Debug)]
struct LatticeTable {
    num_keys: usize,
    value_tpe: IrType,
    map: FxIndexMap<List<Value>, Value>,
    /// The table's bottom element, evaluated on first use.
    bot: OnceCell<Value>,
}

impl LatticeStore {
    /// Builds empty tables for every lattice declared in the root.
    pub fn new(root: &Root) -> Self {
        let tables = root
            .tables
            .values()
            .filter_map(|table| match table {
                Table::Lattice { sym, keys, value } => Some((
                    sym.clone(),
                    LatticeTable {
                        num_keys: keys.len(),
                        value_tpe: value.tpe.clone(),
                        map: FxIndexMap::default(),
                        bot: OnceCell::new(),
                    },
                )),
                Table::Relation { .. } => None,
            })
            .collect();
        Self { tables }
    }

    /// Joins `incoming` into the entry at `key`. Returns whether the stored
    /// value changed; an update that lands on bottom leaves the entry absent.
    pub fn upsert(
        &mut self,
        root: &Root,
        sym: &TableSym,
        key: List<Value>,
        incoming: Value,
    ) -> Result<bool, EvalError> {
        let table = self.tables.get_mut(sym).ok_or_else(|| unknown(sym))?;
        if key.len() != table.num_keys {
            return Err(EvalError::mismatch(
                format!(
                    "key of width {} emitted into `{}` with {} key columns",
                    key.len(),
                    sym.name(),
                    table.num_keys
                ),
                Loc::UNKNOWN,
            ));
        }
        let ops = root.lattice_ops(&table.value_tpe).ok_or_else(|| {
            EvalError::mismatch(
                format!("no lattice operations for the value type of `{}`", sym.name()),
                Loc::UNKNOWN,
            )
        })?;
        let bot = table
            .bot
            .get_or_try_init(|| eval(&ops.bot, &mut Env::new(), root))?
            .clone();
        let current = table.map.get(&key).cloned();
        let joined = match &current {
            None => incoming,
            Some(cur) => apply_op(root, &ops.lub, &[cur.clone(), incoming])?,
        };
        if lat_eq(root, ops, &joined, &bot)? {
            // bottom is absorbing: the entry stays (or becomes) absent
            return Ok(false);
        }
        let changed = match &current {
            None => true,
            Some(cur) => !lat_eq(root, ops, &joined, cur)?,
        };
        if changed {
            table.map.insert(key, joined);
        }
        Ok(changed)
    }

    pub fn get(&self, sym: &TableSym, key: &[Value]) -> Option<&Value> {
        self.tables.get(sym).and_then(|table| table.map.get(key))
    }

    /// All entries of a table, in first-insertion order.
    pub fn scan(&self, sym: &TableSym) -> impl Iterator<Item = (&List<Value>, &Value)> + '_ {
        self.tables
            .get(sym)
            .into_iter()
            .flat_map(|table| table.map.iter())
    }

    pub fn count(&self, sym: &TableSym) -> usize {
        self.tables.get(sym).map_or(0, |table| table.map.len())
    }

    pub fn total_entries(&self) -> usize {
        self.tables.values().map(|table| table.map.len()).sum()
    }
}

/// Lattice-order equivalence: `a ⊑ b` and `b ⊑ a`.
fn lat_eq(root: &Root, ops: &LatticeOps, a: &Value, b: &Value) -> Result<bool, EvalError> {
    Ok(lat_leq(root, ops, a, b)? && lat_leq(root, ops, b, a)?)
}

pub(crate) fn lat_leq(
    root: &Root,
    ops: &LatticeOps,
    a: &Value,
    b: &Value,
) -> Result<bool, EvalError> {
    match apply_op(root, &ops.leq, &[a.clone(), b.clone()])? {
        Value::Bool(b) => Ok(b),
        other => Err(EvalError::mismatch(
            format!("lattice leq returned a {}", other.type_name()),
            ops.leq.loc,
        )),
    }
}

fn unknown(sym: &TableSym) -> EvalError {
    EvalError::mismatch(
        format!("`{}` is not a known lattice table", sym.name()),
        Loc::UNKNOWN,
    )
}
