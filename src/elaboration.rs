//! Services used while elaborating surface syntax into core terms.
//!
//! The elaborator proper lives outside this crate; what lives here is the
//! state it threads through a definition: the metavariable registry
//! ([`MetaVars`]), the deferred-equation solver ([`equations::Equations`]),
//! the pattern-match compiler ([`patterns`]) and the pool of local class
//! instances consulted when inferring instance arguments.

use std::cell::RefCell;

use rpds::HashTrieSet;

use crate::core::compare::{self, Cmp, DummyEquations};
use crate::core::def::FieldId;
use crate::core::semantics::Normalizer;
use crate::core::{BindingId, Expr, ExprPtr};
use crate::reporting::Message;
use crate::source::SourceNode;
use crate::symbol::Symbol;

pub mod equations;
pub mod patterns;

/// A metavariable: a placeholder for a term the elaborator has not
/// determined yet.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetaVar(u32);

#[derive(Debug)]
struct MetaEntry {
    name: Symbol,
    ty: ExprPtr,
    source: SourceNode,
    /// Bindings that were in scope when the metavariable was created; a
    /// solution may only mention these.
    bounds: HashTrieSet<BindingId>,
    /// Set when the metavariable stands for a class instance, recording
    /// the field whose value classifies candidate instances.
    classifying_field: Option<FieldId>,
    solution: Option<ExprPtr>,
}

/// The registry of metavariables created while elaborating a definition.
///
/// The registry hands out shared references to the evaluator and the
/// comparer while the solver assigns solutions, so the entries sit behind a
/// `RefCell`; all of this is single-threaded by construction.
#[derive(Debug, Default)]
pub struct MetaVars {
    entries: RefCell<Vec<MetaEntry>>,
}

impl MetaVars {
    pub fn new() -> MetaVars {
        MetaVars::default()
    }

    pub fn fresh(
        &self,
        name: Symbol,
        ty: ExprPtr,
        source: SourceNode,
        bounds: HashTrieSet<BindingId>,
    ) -> MetaVar {
        self.push(MetaEntry {
            name,
            ty,
            source,
            bounds,
            classifying_field: None,
            solution: None,
        })
    }

    pub fn fresh_classifying(
        &self,
        name: Symbol,
        ty: ExprPtr,
        source: SourceNode,
        bounds: HashTrieSet<BindingId>,
        classifying_field: FieldId,
    ) -> MetaVar {
        self.push(MetaEntry {
            name,
            ty,
            source,
            bounds,
            classifying_field: Some(classifying_field),
            solution: None,
        })
    }

    fn push(&self, entry: MetaEntry) -> MetaVar {
        let mut entries = self.entries.borrow_mut();
        entries.push(entry);
        MetaVar(entries.len() as u32 - 1)
    }

    pub fn name(&self, var: MetaVar) -> Symbol {
        self.entries.borrow()[var.0 as usize].name
    }

    pub fn type_of(&self, var: MetaVar) -> ExprPtr {
        self.entries.borrow()[var.0 as usize].ty.clone()
    }

    pub fn source(&self, var: MetaVar) -> SourceNode {
        self.entries.borrow()[var.0 as usize].source
    }

    pub fn bounds(&self, var: MetaVar) -> HashTrieSet<BindingId> {
        self.entries.borrow()[var.0 as usize].bounds.clone()
    }

    pub fn classifying_field(&self, var: MetaVar) -> Option<FieldId> {
        self.entries.borrow()[var.0 as usize].classifying_field
    }

    pub fn is_solved(&self, var: MetaVar) -> bool {
        self.entries.borrow()[var.0 as usize].solution.is_some()
    }

    pub fn solution(&self, var: MetaVar) -> Option<ExprPtr> {
        self.entries.borrow()[var.0 as usize].solution.clone()
    }

    /// Record a solution. A metavariable is solved exactly once; solving it
    /// again is a logic error.
    pub fn solve(&self, var: MetaVar, solution: ExprPtr) {
        let mut entries = self.entries.borrow_mut();
        let entry = &mut entries[var.0 as usize];
        assert!(
            entry.solution.is_none(),
            "metavariable ?{} solved twice",
            entry.name
        );
        entry.solution = Some(solution);
    }

    /// If `expr` is a reference to a metavariable without a solution,
    /// return that variable.
    pub fn as_unsolved(&self, expr: &ExprPtr) -> Option<MetaVar> {
        match &**expr {
            Expr::InferenceRef(var) if !self.is_solved(*var) => Some(*var),
            _ => None,
        }
    }

    /// Metavariables that never received a solution, for end-of-definition
    /// reporting.
    pub fn unsolved(&self) -> Vec<MetaVar> {
        let entries = self.entries.borrow();
        (0..entries.len() as u32)
            .map(MetaVar)
            .filter(|var| entries[var.0 as usize].solution.is_none())
            .collect()
    }
}

/// Class instances available in the current scope, keyed by the value of
/// their classifying field.
#[derive(Debug, Default)]
pub struct LocalInstancePool {
    entries: Vec<InstanceEntry>,
}

#[derive(Debug)]
struct InstanceEntry {
    classifying: ExprPtr,
    instance: ExprPtr,
    source: SourceNode,
}

impl LocalInstancePool {
    pub fn new() -> LocalInstancePool {
        LocalInstancePool::default()
    }

    /// Add an instance. An instance whose classifying value coincides with
    /// one already present shadows nothing and is reported instead.
    pub fn add(
        &mut self,
        norm: &Normalizer<'_>,
        classifying: ExprPtr,
        instance: ExprPtr,
        source: SourceNode,
    ) -> Option<Message> {
        if self.find(norm, &classifying).is_some() {
            return Some(Message::DuplicateInstance {
                classifying,
                source,
            });
        }
        self.entries.push(InstanceEntry {
            classifying,
            instance,
            source,
        });
        None
    }

    /// Look up the instance whose classifying value is definitionally equal
    /// to `classifying`.
    pub fn find(&self, norm: &Normalizer<'_>, classifying: &ExprPtr) -> Option<ExprPtr> {
        self.entries.iter().find_map(|entry| {
            compare::compare(
                norm,
                &mut DummyEquations,
                Cmp::Eq,
                &entry.classifying,
                classifying,
                entry.source,
            )
            .then(|| entry.instance.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sort::Sort;

    #[test]
    fn fresh_metavariables_are_distinct_and_unsolved() {
        let metas = MetaVars::new();
        let ty = Expr::universe(Sort::SET0);
        let a = metas.fresh(
            Symbol::intern("a"),
            ty.clone(),
            SourceNode::SYNTHETIC,
            HashTrieSet::new(),
        );
        let b = metas.fresh(
            Symbol::intern("b"),
            ty,
            SourceNode::SYNTHETIC,
            HashTrieSet::new(),
        );
        assert_ne!(a, b);
        assert!(!metas.is_solved(a));
        assert_eq!(metas.unsolved(), vec![a, b]);
    }

    #[test]
    fn solving_records_the_solution() {
        let metas = MetaVars::new();
        let var = metas.fresh(
            Symbol::intern("x"),
            Expr::universe(Sort::SET0),
            SourceNode::SYNTHETIC,
            HashTrieSet::new(),
        );
        metas.solve(var, Expr::universe(Sort::PROP));
        assert!(metas.is_solved(var));
        assert!(metas.unsolved().is_empty());
        assert!(metas.as_unsolved(&Expr::inference_ref(var)).is_none());
    }

    #[test]
    #[should_panic(expected = "solved twice")]
    fn double_solve_panics() {
        let metas = MetaVars::new();
        let var = metas.fresh(
            Symbol::intern("x"),
            Expr::universe(Sort::SET0),
            SourceNode::SYNTHETIC,
            HashTrieSet::new(),
        );
        metas.solve(var, Expr::universe(Sort::PROP));
        metas.solve(var, Expr::universe(Sort::PROP));
    }
}
