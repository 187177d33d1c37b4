//! Variable environments.
//!
//! An `Env` is a flat binding stack scoped by mark/truncate: `Let` pushes a
//! binding for the extent of its body, calls build a fresh frame from the
//! callee's formals. Lookup scans backwards so inner bindings shadow outer
//! ones.

use crate::ir::symbol::VarSym;

use super::value::Value;

#[derive(Clone, Debug, Default)]
pub struct Env {
    slots: Vec<(u32, Value)>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            slots: Vec::with_capacity(n),
        }
    }

    pub fn bind(&mut self, sym: &VarSym, v: Value) {
        self.slots.push((sym.id(), v));
    }

    pub fn lookup(&self, sym: &VarSym) -> Option<&Value> {
        let id = sym.id();
        self.slots
            .iter()
            .rev()
            .find(|(bound, _)| *bound == id)
            .map(|(_, v)| v)
    }

    /// The current stack depth, restored by [`Env::truncate`] on scope exit.
    #[inline]
    pub fn mark(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn truncate(&mut self, mark: usize) {
        self.slots.truncate(mark);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_bindings_shadow_and_unwind() {
        let x = VarSym::new(0, 0, "x");
        let mut env = Env::new();
        env.bind(&x, Value::I32(1));
        let mark = env.mark();
        env.bind(&x, Value::I32(2));
        assert_eq!(env.lookup(&x), Some(&Value::I32(2)));
        env.truncate(mark);
        assert_eq!(env.lookup(&x), Some(&Value::I32(1)));
    }

    #[test]
    fn missing_variable_is_none() {
        let env = Env::new();
        assert_eq!(env.lookup(&VarSym::new(7, 0, "ghost")), None);
    }
}
