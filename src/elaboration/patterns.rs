//! Compiling pattern-matching clauses into elimination trees.
//!
//! The compiler works column by column: it finds the first column in which
//! some clause matches on a constructor, branches on that column's
//! constructors, and recurses into each group with the sub-patterns spliced
//! in. Variable patterns flow into every group that has a constructor
//! clause of its own; constructors no clause names are handled by a single
//! catch-all child that binds the scrutinee whole. A scrutinee that does
//! not reduce to a constructor never selects a child, so the match stays
//! stuck. First match wins; along the way the compiler records which
//! clauses were ever reached and which constructors no clause covers.

use fxhash::{FxHashMap, FxHashSet};
use itertools::Itertools;

use crate::core::def::{ConId, DataId};
use crate::core::elim::{
    BranchElimTree, BranchKey, ConstructorPattern, ElimTree, LeafElimTree, MatchResult,
};
use crate::core::semantics::Normalizer;
use crate::core::sort::Sort;
use crate::core::subst::Substitution;
use crate::core::typing;
use crate::core::{Binding, Expr, ExprPtr, Pattern};
use crate::reporting::Message;
use crate::source::SourceNode;

/// How many missing clauses are collected before the report is cut short.
const MISSING_CLAUSES_LIMIT: usize = 10;

/// One user-written clause: a pattern per eliminated parameter and a body.
/// A clause containing an absurd pattern has no body.
#[derive(Debug, Clone)]
pub struct Clause {
    pub patterns: Vec<Pattern>,
    pub body: Option<ExprPtr>,
    pub source: SourceNode,
}

/// An element of a missing-clause description: either a pattern already
/// determined, or a constructor the user still has to match on.
#[derive(Debug, Clone)]
pub enum ClauseElem {
    Pattern(Pattern),
    Constructor(ConId),
}

/// A clause in flight: its remaining patterns and the substitution
/// accumulated from the columns consumed so far.
#[derive(Clone)]
struct ClauseState {
    patterns: Vec<Pattern>,
    body: Option<ExprPtr>,
    subst: Substitution,
    /// Position in the original clause list, for redundancy reporting.
    index: usize,
    source: SourceNode,
}

/// The set of constructors whose patterns match concrete data-type
/// arguments, each paired with the instantiated constructor arguments.
/// `None` when some argument is too stuck to decide.
pub fn matched_constructors(
    norm: &Normalizer<'_>,
    data: DataId,
    sort: Sort,
    args: &[ExprPtr],
) -> Option<Vec<(ConId, Sort, Vec<ExprPtr>)>> {
    let mut result = Vec::new();
    for &con in &norm.defs.data(data).constructors {
        let def = norm.defs.constructor(con);
        match &def.patterns {
            None => result.push((con, sort, args.to_vec())),
            Some(patterns) => {
                let mut out = Vec::new();
                match Pattern::match_all(patterns, norm, args, &mut out) {
                    MatchResult::Match => result.push((con, sort, out)),
                    MatchResult::Maybe => return None,
                    MatchResult::Fail => {}
                }
            }
        }
    }
    Some(result)
}

pub struct ElimTypechecking<'a> {
    norm: Normalizer<'a>,
    /// The sort of the result type, when known; matching on a truncated
    /// type may skip its path constructor if the result lives low enough.
    result_sort: Option<Sort>,
    source: SourceNode,
    context: Vec<ClauseElem>,
    missing: Vec<Vec<ClauseElem>>,
    missing_truncated: bool,
    used: FxHashSet<usize>,
    messages: Vec<Message>,
    ok: bool,
}

impl<'a> ElimTypechecking<'a> {
    pub fn new(
        norm: Normalizer<'a>,
        result_type: &ExprPtr,
        source: SourceNode,
    ) -> ElimTypechecking<'a> {
        let result_sort = typing::sort_of(&norm, result_type);
        ElimTypechecking {
            norm,
            result_sort,
            source,
            context: Vec::new(),
            missing: Vec::new(),
            missing_truncated: false,
            used: FxHashSet::default(),
            messages: Vec::new(),
            ok: true,
        }
    }

    pub fn take_messages(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.messages)
    }

    /// Compile `clauses` matching on `params`. When `elim_refs` is given
    /// the clauses carry patterns only for those parameters, which must
    /// appear in parameter order; the rest are padded with variable
    /// patterns.
    pub fn typecheck(
        &mut self,
        params: &[Binding],
        elim_refs: Option<&[Binding]>,
        clauses: &[Clause],
    ) -> Option<ElimTree> {
        let expected = elim_refs.map_or(params.len(), <[Binding]>::len);
        for clause in clauses {
            if clause.patterns.len() != expected {
                self.messages.push(Message::WrongNumberOfPatterns {
                    expected,
                    found: clause.patterns.len(),
                    source: clause.source,
                });
                return None;
            }
        }
        if let Some(refs) = elim_refs {
            let mut params_iter = params.iter();
            if !refs.iter().all(|binding| params_iter.any(|param| param == binding)) {
                self.messages.push(Message::ElimOrder {
                    source: self.source,
                });
                return None;
            }
        }
        if clauses.is_empty() {
            self.messages.push(Message::ExpectedClauseList {
                source: self.source,
            });
            return None;
        }

        let states = clauses
            .iter()
            .enumerate()
            .map(|(index, clause)| {
                let patterns = match elim_refs {
                    None => clause.patterns.clone(),
                    Some(refs) => {
                        let mut supplied = clause.patterns.iter();
                        params
                            .iter()
                            .map(|param| {
                                if refs.contains(param) {
                                    supplied.next().cloned().unwrap_or(Pattern::Empty)
                                } else {
                                    Pattern::Binding(param.clone())
                                }
                            })
                            .collect()
                    }
                };
                ClauseState {
                    patterns,
                    body: clause.body.clone(),
                    subst: Substitution::new(),
                    index,
                    source: clause.source,
                }
            })
            .collect();
        let tree = self.build(states);

        if !self.missing.is_empty() {
            let missing = std::mem::take(&mut self.missing);
            self.messages.push(Message::MissingClauses {
                clauses: missing,
                truncated: self.missing_truncated,
                source: self.source,
            });
            return None;
        }
        for (index, clause) in clauses.iter().enumerate() {
            if !self.used.contains(&index) {
                self.messages.push(Message::RedundantClause {
                    source: clause.source,
                });
            }
        }
        if self.ok {
            tree
        } else {
            None
        }
    }

    fn build(&mut self, mut clauses: Vec<ClauseState>) -> Option<ElimTree> {
        let defs = self.norm.defs;
        let width = clauses[0].patterns.len();
        let index = (0..width).find(|&column| {
            clauses
                .iter()
                .any(|clause| !matches!(clause.patterns[column], Pattern::Binding(_)))
        });

        // every remaining pattern is a variable: the first clause wins
        let index = match index {
            None => {
                let clause = &mut clauses[0];
                self.used.insert(clause.index);
                let bindings: Vec<Binding> = clause
                    .patterns
                    .iter()
                    .filter_map(|pattern| pattern.binding().cloned())
                    .collect();
                let params = freshen(clause, &bindings);
                let body = match &clause.body {
                    Some(body) => clause.subst.apply(body),
                    None => Expr::error(None),
                };
                return Some(ElimTree::Leaf(LeafElimTree { params, body }));
            }
            Some(index) => index,
        };

        // consume the all-variable prefix before the matched column
        let prefix: Vec<Binding> = clauses[0].patterns[..index]
            .iter()
            .filter_map(|pattern| pattern.binding().cloned())
            .collect();
        let vars = freshen(&mut clauses[0], &prefix);
        for clause in &mut clauses[1..] {
            for (var, pattern) in vars.iter().zip(&clause.patterns[..index]) {
                if let Pattern::Binding(binding) = pattern {
                    clause.subst.compose(binding, Expr::var(var));
                }
            }
        }
        for clause in &mut clauses {
            clause.patterns.drain(..index);
        }
        let depth = self.context.len();
        for var in &vars {
            self.context
                .push(ClauseElem::Pattern(Pattern::Binding(var.clone())));
        }

        // an absurd pattern: the data type has no matching constructors,
        // so a branch with no children is complete
        if let Some(clause) = clauses
            .iter()
            .find(|clause| matches!(clause.patterns[0], Pattern::Empty))
        {
            self.used.insert(clause.index);
            self.context.truncate(depth);
            return Some(ElimTree::Branch(BranchElimTree {
                params: vars,
                children: FxHashMap::default(),
            }));
        }

        let (some_clause, some_pattern): (usize, ConstructorPattern) = clauses
            .iter()
            .enumerate()
            .find_map(|(index, clause)| match &clause.patterns[0] {
                Pattern::Constructor(pattern) => Some((index, pattern.clone())),
                _ => None,
            })
            .unwrap_or_else(|| panic!("matched column contains no constructor pattern"));
        let data_args = clauses[some_clause]
            .subst
            .clone()
            .apply_all(&some_pattern.data_args);
        let sort = some_pattern.sort;
        let data = defs.constructor(some_pattern.con).data;

        let matched = if defs.data(data).has_indexed_constructors {
            match matched_constructors(&self.norm, data, sort, &data_args) {
                Some(matched) => matched,
                None => {
                    self.messages.push(Message::CannotEliminate {
                        source: self.source,
                    });
                    self.ok = false;
                    self.context.truncate(depth);
                    return None;
                }
            }
        } else {
            defs.data(data)
                .constructors
                .iter()
                .map(|&con| (con, sort, data_args.clone()))
                .collect()
        };

        let has_vars = clauses
            .iter()
            .any(|clause| matches!(clause.patterns[0], Pattern::Binding(_)));
        let mut children = FxHashMap::default();
        // set when a constructor has no clause of its own and falls to the
        // catch-all child
        let mut uncovered = false;
        for (con, con_sort, con_data_args) in matched {
            let explicit = clauses.iter().any(|clause| {
                matches!(&clause.patterns[0], Pattern::Constructor(pattern) if pattern.con == con)
            });
            if !explicit {
                if has_vars {
                    uncovered = true;
                } else if !self.truncation_excuses(con) {
                    self.context.push(ClauseElem::Constructor(con));
                    self.add_missing();
                    self.context.pop();
                }
                continue;
            }
            let con_def = defs.constructor(con);
            let mut rows = Vec::new();
            for clause in &clauses {
                match &clause.patterns[0] {
                    Pattern::Constructor(pattern) if pattern.con == con => {
                        let mut patterns = pattern.patterns.clone();
                        patterns.extend_from_slice(&clause.patterns[1..]);
                        rows.push(ClauseState {
                            patterns,
                            body: clause.body.clone(),
                            subst: clause.subst.clone(),
                            index: clause.index,
                            source: clause.source,
                        });
                    }
                    Pattern::Binding(binding) => {
                        // expand the variable into a fresh application of
                        // the constructor
                        let mut con_subst = Substitution::new();
                        for (param, arg) in con_def.data_params.iter().zip_eq(&con_data_args) {
                            con_subst.add(param, arg.clone());
                        }
                        let fresh = con_subst.apply_bindings(&con_def.params);
                        let con_call = Expr::con_call(
                            defs,
                            con,
                            con_sort,
                            con_data_args.clone(),
                            fresh.iter().map(Expr::var).collect(),
                        );
                        let mut subst = clause.subst.clone();
                        subst.compose(binding, con_call);
                        let mut patterns: Vec<Pattern> =
                            fresh.into_iter().map(Pattern::Binding).collect();
                        patterns.extend_from_slice(&clause.patterns[1..]);
                        rows.push(ClauseState {
                            patterns,
                            body: clause.body.clone(),
                            subst,
                            index: clause.index,
                            source: clause.source,
                        });
                    }
                    _ => {}
                }
            }
            self.context.push(ClauseElem::Constructor(con));
            let child = self.build(rows);
            self.context.pop();
            match child {
                Some(child) => {
                    children.insert(BranchKey::Con(con), child);
                }
                None => self.ok = false,
            }
        }
        if uncovered {
            let rows: Vec<ClauseState> = clauses
                .iter()
                .filter(|clause| matches!(clause.patterns[0], Pattern::Binding(_)))
                .cloned()
                .collect();
            match self.build(rows) {
                Some(child) => {
                    children.insert(BranchKey::Any, child);
                }
                None => self.ok = false,
            }
        }
        self.context.truncate(depth);
        Some(ElimTree::Branch(BranchElimTree {
            params: vars,
            children,
        }))
    }

    /// Matching on a truncated type may ignore its path constructor when
    /// the result type is itself propositional (or a set, for the set
    /// truncation).
    fn truncation_excuses(&self, con: ConId) -> bool {
        if con == self.norm.prelude.prop_trunc_path_con {
            return self.result_sort.map_or(false, |sort| sort.is_prop());
        }
        if con == self.norm.prelude.set_trunc_path_con {
            return self
                .result_sort
                .map_or(false, |sort| sort.is_prop() || sort.is_set());
        }
        false
    }

    fn add_missing(&mut self) {
        if self.missing.len() < MISSING_CLAUSES_LIMIT {
            self.missing.push(self.context.clone());
        } else {
            self.missing_truncated = true;
        }
    }
}

/// Freshen pattern variables through the clause's substitution, so their
/// types see the terms substituted for earlier columns.
fn freshen(clause: &mut ClauseState, bindings: &[Binding]) -> Vec<Binding> {
    bindings
        .iter()
        .map(|binding| {
            let ty = clause.subst.apply(binding.ty());
            let fresh = Binding::with_plicity(binding.name(), ty, binding.is_explicit());
            clause.subst.compose(binding, Expr::var(&fresh));
            fresh
        })
        .collect()
}
