//! Compiled elimination trees and patterns.
//!
//! Pattern-matching bodies are compiled (see
//! [`crate::elaboration::patterns`]) into first-match-wins decision trees.
//! A node consumes a prefix of the argument stack into its parameter
//! telescope; a branch then inspects the next argument's weak head normal
//! form and dispatches on its constructor. Evaluation of the trees lives in
//! [`crate::core::semantics`].

use fxhash::FxHashMap;
use itertools::Itertools;

use crate::core::def::ConId;
use crate::core::semantics::Normalizer;
use crate::core::sort::Sort;
use crate::core::{Binding, Expr, ExprPtr};

/// The body of a function or the conditions of a constructor.
#[derive(Debug, Clone)]
pub enum Body {
    Tree(ElimTree),
    /// Matching on interval endpoints: boundary expressions for the
    /// trailing interval arguments, with an ordinary tree as the fallback
    /// for arguments stuck between the endpoints.
    Interval(IntervalElim),
}

#[derive(Debug, Clone)]
pub enum ElimTree {
    Leaf(LeafElimTree),
    Branch(BranchElimTree),
}

impl ElimTree {
    pub fn params(&self) -> &[Binding] {
        match self {
            ElimTree::Leaf(leaf) => &leaf.params,
            ElimTree::Branch(branch) => &branch.params,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LeafElimTree {
    pub params: Vec<Binding>,
    pub body: ExprPtr,
}

#[derive(Debug, Clone)]
pub struct BranchElimTree {
    pub params: Vec<Binding>,
    pub children: FxHashMap<BranchKey, ElimTree>,
}

impl BranchElimTree {
    /// Select the child for a scrutinee whose head is `con`. A constructor
    /// without its own entry falls back to the catch-all child when one
    /// exists. A stuck scrutinee (`None`) selects nothing: the match stays
    /// stuck. The second component tells whether the scrutinee is to be
    /// decomposed into the constructor's arguments; the catch-all child
    /// instead binds the scrutinee whole.
    pub fn child(&self, con: Option<ConId>) -> Option<(&ElimTree, bool)> {
        let con = con?;
        if let Some(child) = self.children.get(&BranchKey::Con(con)) {
            return Some((child, true));
        }
        self.children.get(&BranchKey::Any).map(|child| (child, false))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BranchKey {
    Con(ConId),
    /// The catch-all child produced by a variable pattern alongside
    /// constructor patterns.
    Any,
}

/// Boundary rules for interval arguments.
///
/// `cases[i]` governs the `i`-th of the trailing interval-typed parameters:
/// the first component applies when the argument reduces to `left`, the
/// second when it reduces to `right`. A missing component, and a stuck
/// argument, fall through to `otherwise`.
#[derive(Debug, Clone)]
pub struct IntervalElim {
    pub params: Vec<Binding>,
    pub cases: Vec<(Option<ExprPtr>, Option<ExprPtr>)>,
    pub otherwise: Option<ElimTree>,
}

/// An elaborated pattern.
#[derive(Debug, Clone)]
pub enum Pattern {
    Binding(Binding),
    Constructor(ConstructorPattern),
    /// The absurd pattern: marks a constructor-less scrutinee. A clause
    /// containing it has no body.
    Empty,
}

impl Pattern {
    pub fn binding(&self) -> Option<&Binding> {
        match self {
            Pattern::Binding(binding) => Some(binding),
            _ => None,
        }
    }

    /// The term this pattern denotes, with pattern variables free.
    pub fn to_expr(&self) -> ExprPtr {
        match self {
            Pattern::Binding(binding) => Expr::var(binding),
            Pattern::Constructor(con) => con.to_expr(),
            Pattern::Empty => Expr::error(None),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConstructorPattern {
    pub con: ConId,
    pub sort: Sort,
    pub data_args: Vec<ExprPtr>,
    pub patterns: Vec<Pattern>,
}

impl ConstructorPattern {
    pub fn to_expr(&self) -> ExprPtr {
        std::sync::Arc::new(Expr::ConCall(crate::core::ConCallExpr {
            con: self.con,
            sort: self.sort,
            data_args: self.data_args.clone(),
            args: self.patterns.iter().map(Pattern::to_expr).collect(),
        }))
    }
}

/// The result of matching terms against patterns.
#[derive(Debug, PartialEq, Eq)]
pub enum MatchResult {
    /// All patterns matched.
    Match,
    /// Some term is too stuck to decide.
    Maybe,
    /// Some term's head constructor rules its pattern out.
    Fail,
}

impl Pattern {
    /// Match `expr` against this pattern, reducing to weak head normal form
    /// as needed. Subterms matched by pattern variables are pushed onto
    /// `out` in pattern order.
    pub fn match_expr(
        &self,
        norm: &Normalizer<'_>,
        expr: &ExprPtr,
        out: &mut Vec<ExprPtr>,
    ) -> MatchResult {
        match self {
            Pattern::Binding(_) => {
                out.push(expr.clone());
                MatchResult::Match
            }
            Pattern::Empty => MatchResult::Maybe,
            Pattern::Constructor(pattern) => {
                let whnf = norm.whnf(expr);
                match &*whnf {
                    Expr::ConCall(call) if call.con == pattern.con => {
                        Pattern::match_all(&pattern.patterns, norm, &call.args, out)
                    }
                    Expr::ConCall(_) => MatchResult::Fail,
                    _ => MatchResult::Maybe,
                }
            }
        }
    }

    /// Match a telescope of patterns against a list of terms.
    pub fn match_all(
        patterns: &[Pattern],
        norm: &Normalizer<'_>,
        exprs: &[ExprPtr],
        out: &mut Vec<ExprPtr>,
    ) -> MatchResult {
        for (pattern, expr) in patterns.iter().zip_eq(exprs) {
            match pattern.match_expr(norm, expr, out) {
                MatchResult::Match => {}
                result => return result,
            }
        }
        MatchResult::Match
    }
}
