//! Messages reported during type-checking.
//!
//! A message carries the data needed to render it along with the source
//! node it is attached to. Rendering is the caller's concern; the solver
//! and the pattern-match compiler only collect messages.

use crate::core::ExprPtr;
use crate::elaboration::equations::{Equation, LevelEquation};
use crate::elaboration::patterns::ClauseElem;
use crate::elaboration::MetaVar;
use crate::source::SourceNode;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub enum Message {
    /// A metavariable was about to be solved by a term containing the
    /// metavariable itself.
    OccursCheck {
        var: MetaVar,
        candidate: ExprPtr,
        source: SourceNode,
    },
    /// A solution was found for a metavariable but its type does not fit
    /// the expected one.
    TypeMismatch {
        expected: ExprPtr,
        actual: ExprPtr,
        candidate: ExprPtr,
        source: SourceNode,
    },
    /// Equations between terms were left over after solving.
    SolveEquations {
        equations: Vec<Equation>,
        source: SourceNode,
    },
    /// The universe level constraints admit no solution.
    SolveLevelEquations {
        equations: Vec<LevelEquation>,
        source: SourceNode,
    },
    /// A pattern-matching definition does not cover these cases. At most a
    /// fixed number of missing clauses is collected; `truncated` records
    /// whether the list was cut short.
    MissingClauses {
        clauses: Vec<Vec<ClauseElem>>,
        truncated: bool,
        source: SourceNode,
    },
    /// A clause can never be reached.
    RedundantClause { source: SourceNode },
    /// Two instances in scope share a classifying value.
    DuplicateInstance {
        classifying: ExprPtr,
        source: SourceNode,
    },
    /// A pattern-matching definition with no clauses over a non-empty type.
    ExpectedClauseList { source: SourceNode },
    WrongNumberOfPatterns {
        expected: usize,
        found: usize,
        source: SourceNode,
    },
    /// Variables listed in an elimination clause must be a subsequence of
    /// the parameters, in order.
    ElimOrder { source: SourceNode },
    /// The set of constructors matching an indexed family could not be
    /// computed from the concrete parameters.
    CannotEliminate { source: SourceNode },
    /// A metavariable was never determined.
    CannotInfer { var: MetaVar, source: SourceNode },
}

impl Message {
    pub fn severity(&self) -> Severity {
        match self {
            Message::RedundantClause { .. } | Message::DuplicateInstance { .. } => {
                Severity::Warning
            }
            _ => Severity::Error,
        }
    }

    pub fn source(&self) -> SourceNode {
        match self {
            Message::OccursCheck { source, .. }
            | Message::TypeMismatch { source, .. }
            | Message::SolveEquations { source, .. }
            | Message::SolveLevelEquations { source, .. }
            | Message::MissingClauses { source, .. }
            | Message::RedundantClause { source }
            | Message::DuplicateInstance { source, .. }
            | Message::ExpectedClauseList { source }
            | Message::WrongNumberOfPatterns { source, .. }
            | Message::ElimOrder { source }
            | Message::CannotEliminate { source }
            | Message::CannotInfer { source, .. } => *source,
        }
    }
}
