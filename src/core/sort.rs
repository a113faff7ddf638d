//! Universe levels and sorts.
//!
//! A sort is a pair of a predicative level and a homotopy level. Levels are
//! affine expressions over at most one level variable, with a separate
//! constant kept under a `max`: `max(v + constant, max_constant)`. The
//! distinguished variables [`LevelVariable::P`] and [`LevelVariable::H`] are
//! the implicit polymorphic levels of every definition; a call instantiates
//! them through its sort argument.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::source::SourceNode;
use crate::symbol::Symbol;

/// Whether a level variable ranges over predicative or homotopy levels.
/// Only homotopy levels may be solved to infinity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum LevelKind {
    PLevel,
    HLevel,
}

static NEXT_LEVEL_META: AtomicU32 = AtomicU32::new(0);

/// A metavariable standing for an undetermined level, created while
/// inferring a sort. Identity is the numeric id; the kind and source node
/// ride along for solving and reporting.
#[derive(Debug, Copy, Clone)]
pub struct LevelMetaVar {
    id: u32,
    kind: LevelKind,
    name: Symbol,
    source: SourceNode,
}

impl LevelMetaVar {
    pub fn fresh(kind: LevelKind, name: Symbol, source: SourceNode) -> LevelMetaVar {
        LevelMetaVar {
            id: NEXT_LEVEL_META.fetch_add(1, Ordering::Relaxed),
            kind,
            name,
            source,
        }
    }

    pub fn kind(&self) -> LevelKind {
        self.kind
    }

    pub fn name(&self) -> Symbol {
        self.name
    }

    pub fn source(&self) -> SourceNode {
        self.source
    }
}

impl PartialEq for LevelMetaVar {
    fn eq(&self, other: &LevelMetaVar) -> bool {
        self.id == other.id
    }
}

impl Eq for LevelMetaVar {}

impl std::hash::Hash for LevelMetaVar {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// A level variable: one of the two polymorphic levels of the enclosing
/// definition, or a level metavariable awaiting a solution.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum LevelVariable {
    P,
    H,
    Meta(LevelMetaVar),
}

impl LevelVariable {
    pub fn kind(&self) -> LevelKind {
        match self {
            LevelVariable::P => LevelKind::PLevel,
            LevelVariable::H => LevelKind::HLevel,
            LevelVariable::Meta(var) => var.kind(),
        }
    }

    pub fn as_meta(&self) -> Option<LevelMetaVar> {
        match self {
            LevelVariable::Meta(var) => Some(*var),
            _ => None,
        }
    }
}

/// `max(var + constant, max_constant)`, or infinity.
///
/// For a closed level both constants coincide, so `closed(n)` simply denotes
/// `n`. Homotopy level `-1` is the level of propositions.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Level {
    var: Option<LevelVariable>,
    constant: i32,
    max_constant: i32,
    infinity: bool,
}

impl Level {
    pub const INFINITY: Level = Level {
        var: None,
        constant: 0,
        max_constant: 0,
        infinity: true,
    };

    pub const fn closed(constant: i32) -> Level {
        Level {
            var: None,
            constant,
            max_constant: constant,
            infinity: false,
        }
    }

    pub const fn new(var: Option<LevelVariable>, constant: i32) -> Level {
        Level {
            var,
            constant,
            max_constant: constant,
            infinity: false,
        }
    }

    pub const fn with_max(var: LevelVariable, constant: i32, max_constant: i32) -> Level {
        Level {
            var: Some(var),
            constant,
            max_constant,
            infinity: false,
        }
    }

    pub fn is_infinity(&self) -> bool {
        self.infinity
    }

    pub fn is_closed(&self) -> bool {
        !self.infinity && self.var.is_none()
    }

    pub fn var(&self) -> Option<LevelVariable> {
        if self.infinity {
            None
        } else {
            self.var
        }
    }

    pub fn constant(&self) -> i32 {
        self.constant
    }

    pub fn max_constant(&self) -> i32 {
        self.max_constant
    }

    pub fn add(self, n: i32) -> Level {
        if self.infinity {
            self
        } else {
            Level {
                var: self.var,
                constant: self.constant + n,
                max_constant: self.max_constant + n,
                infinity: false,
            }
        }
    }

    pub fn succ(self) -> Level {
        self.add(1)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.infinity {
            return write!(f, "inf");
        }
        match self.var {
            None => write!(f, "{}", self.constant),
            Some(var) => {
                let var = match var {
                    LevelVariable::P => "\\lP".to_owned(),
                    LevelVariable::H => "\\lH".to_owned(),
                    LevelVariable::Meta(meta) => format!("?{}", meta.name()),
                };
                if self.constant == 0 {
                    write!(f, "{var}")
                } else {
                    write!(f, "{var} + {}", self.constant)
                }
            }
        }
    }
}

/// A universe sort: a predicative level paired with a homotopy level.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Sort {
    pub p: Level,
    pub h: Level,
}

impl Sort {
    /// The sort of propositions, `\Prop`.
    pub const PROP: Sort = Sort {
        p: Level::closed(0),
        h: Level::closed(-1),
    };

    /// The smallest sort of sets, `\Set0`.
    pub const SET0: Sort = Sort {
        p: Level::closed(0),
        h: Level::closed(0),
    };

    /// The polymorphic sort `\Type (\lP, \lH)` every definition is checked
    /// under.
    pub const STD: Sort = Sort {
        p: Level::new(Some(LevelVariable::P), 0),
        h: Level::new(Some(LevelVariable::H), 0),
    };

    pub const fn new(p: Level, h: Level) -> Sort {
        Sort { p, h }
    }

    pub fn is_prop(&self) -> bool {
        self.h.is_closed() && self.h.constant() == -1
    }

    pub fn is_set(&self) -> bool {
        self.h.is_closed() && self.h.constant() == 0
    }

    pub fn succ(self) -> Sort {
        Sort {
            p: self.p.succ(),
            h: self.h.succ(),
        }
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_prop() {
            write!(f, "\\Prop")
        } else {
            write!(f, "\\Type ({}, {})", self.p, self.h)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prop_and_set() {
        assert!(Sort::PROP.is_prop());
        assert!(!Sort::PROP.is_set());
        assert!(Sort::SET0.is_set());
        assert!(!Sort::STD.is_prop());
    }

    #[test]
    fn succ_shifts_both_levels() {
        let sort = Sort::SET0.succ();
        assert_eq!(sort.p, Level::closed(1));
        assert_eq!(sort.h, Level::closed(1));
        assert!(Level::INFINITY.succ().is_infinity());
    }

    #[test]
    fn level_meta_identity() {
        let name = Symbol::intern("l");
        let a = LevelMetaVar::fresh(LevelKind::PLevel, name, SourceNode::SYNTHETIC);
        let b = LevelMetaVar::fresh(LevelKind::PLevel, name, SourceNode::SYNTHETIC);
        assert_ne!(a, b);
        assert_eq!(a, a);
    }
}
