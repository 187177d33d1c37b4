//! Symbols and source locations for the compiled IR.
//!
//! Symbols are opaque identifiers minted by the upstream compiler. Identity
//! is the numeric id alone; the attached name exists purely for display and
//! error messages, so two symbols with the same name but different ids never
//! collide.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

macro_rules! symbols {
    ($($(#[$doc:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            #[derive(Clone, Debug, Serialize, Deserialize)]
            pub struct $name {
                id: u32,
                name: Arc<str>,
            }

            impl $name {
                pub fn new(id: u32, name: impl Into<Arc<str>>) -> Self {
                    Self {
                        id,
                        name: name.into(),
                    }
                }

                #[inline]
                pub fn id(&self) -> u32 {
                    self.id
                }

                #[inline]
                pub fn name(&self) -> &str {
                    &self.name
                }
            }

            impl PartialEq for $name {
                fn eq(&self, other: &Self) -> bool {
                    self.id == other.id
                }
            }

            impl Eq for $name {}

            impl Hash for $name {
                fn hash<H: Hasher>(&self, state: &mut H) {
                    self.id.hash(state);
                }
            }

            impl PartialOrd for $name {
                fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                    Some(self.cmp(other))
                }
            }

            impl Ord for $name {
                fn cmp(&self, other: &Self) -> std::cmp::Ordering {
                    self.id.cmp(&other.id)
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.name)
                }
            }
        )*
    };
}

symbols! {
    /// Identifies a definition in the program [`Root`](crate::ir::Root).
    DefSym,
    /// Identifies an enum declaration.
    EnumSym,
    /// Identifies a relation or lattice table.
    TableSym,
    /// Identifies a host hook installation site.
    HookSym,
}

/// Identifies a variable. The `offset` is the variable's capture-slot index,
/// consumed by `LetRec` when it back-patches a closure's self-reference.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VarSym {
    id: u32,
    offset: u32,
    name: Arc<str>,
}

impl VarSym {
    pub fn new(id: u32, offset: u32, name: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            offset,
            name: name.into(),
        }
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    pub fn offset(&self) -> u32 {
        self.offset
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for VarSym {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for VarSym {}

impl Hash for VarSym {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for VarSym {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VarSym {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Display for VarSym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A source position, carried by every expression and constraint. Used only
/// when rendering errors.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Loc {
    pub line: u32,
    pub col: u32,
}

impl Loc {
    /// Position for synthesized IR with no surface counterpart.
    pub const UNKNOWN: Loc = Loc { line: 0, col: 0 };

    #[inline]
    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Loc::UNKNOWN {
            write!(f, "?:?")
        } else {
            write!(f, "{}:{}", self.line, self.col)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_identity_is_id_only() {
        let a = DefSym::new(1, "foo");
        let b = DefSym::new(1, "bar");
        let c = DefSym::new(2, "foo");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn loc_display() {
        assert_eq!(Loc::new(3, 14).to_string(), "3:14");
        assert_eq!(Loc::UNKNOWN.to_string(), "?:?");
    }
}
