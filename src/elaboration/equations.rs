//! The deferred-equation solver.
//!
//! Comparison records the equations it cannot decide here, each keyed by
//! the metavariable it is stuck on. An equation whose one side is a bare
//! metavariable is attacked immediately: by direct assignment when the
//! comparison is an equality, by decomposition when the other side is a pi
//! type or a universe, and through the instance pool when the metavariable
//! stands for a class instance. Everything else waits in the queue; solving
//! a metavariable re-runs the equations stuck on it.
//!
//! Universe level constraints are collected separately and solved at the
//! end of the definition by [`solve_all`](Equations::solve_all), which
//! also resolves class-call bounds and reports whatever remains.

use fxhash::FxHashMap;

use crate::core::compare::{self, compare_sorts, Cmp, EquationSink};
use crate::core::def::Definitions;
use crate::core::prelude::Prelude;
use crate::core::semantics::Normalizer;
use crate::core::sort::{Level, LevelKind, LevelMetaVar, LevelVariable, Sort};
use crate::core::subst::LevelSubstitution;
use crate::core::typing;
use crate::core::{Expr, ExprPtr};
use crate::elaboration::{LocalInstancePool, MetaVar, MetaVars};
use crate::reporting::Message;
use crate::source::SourceNode;
use crate::symbol::Symbol;

/// A deferred comparison `lhs cmp rhs`. When one side is a bare unsolved
/// metavariable it is always the right-hand side.
#[derive(Debug, Clone)]
pub struct Equation {
    pub lhs: ExprPtr,
    pub rhs: ExprPtr,
    pub cmp: Cmp,
    pub source: SourceNode,
    /// The metavariable whose solution unblocks this equation.
    pub stuck: MetaVar,
}

/// A constraint between universe levels. Levels are measured as natural
/// numbers; a missing variable stands for the constant zero.
#[derive(Debug, Clone)]
pub enum LevelEquation {
    /// The variable must be solved to infinity.
    Infinity(LevelMetaVar),
    /// `var1 <= max(var2 + constant, max_constant)`.
    Cmp {
        var1: Option<LevelMetaVar>,
        var2: Option<LevelMetaVar>,
        constant: i32,
        max_constant: Option<i32>,
    },
}

/// State of the solver for one definition.
pub struct Equations<'a> {
    defs: &'a Definitions,
    metas: &'a MetaVars,
    prelude: &'a Prelude,
    equations: Vec<Equation>,
    level_vars: Vec<LevelMetaVar>,
    level_equations: Vec<LevelEquation>,
    /// Polymorphic level each level metavariable is measured against, for
    /// variables bounded below by `\lP` or `\lH`.
    bases: FxHashMap<LevelMetaVar, LevelVariable>,
    pub instances: LocalInstancePool,
    messages: Vec<Message>,
}

impl<'a> Equations<'a> {
    pub fn new(defs: &'a Definitions, metas: &'a MetaVars, prelude: &'a Prelude) -> Equations<'a> {
        Equations {
            defs,
            metas,
            prelude,
            equations: Vec::new(),
            level_vars: Vec::new(),
            level_equations: Vec::new(),
            bases: FxHashMap::default(),
            instances: LocalInstancePool::new(),
            messages: Vec::new(),
        }
    }

    fn norm(&self) -> Normalizer<'a> {
        Normalizer::new(self.defs, self.metas, self.prelude)
    }

    pub fn take_messages(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.messages)
    }

    pub fn add_variable(&mut self, var: LevelMetaVar) {
        self.level_vars.push(var);
    }

    /// A fresh sort made of two level metavariables.
    pub fn generate_sort_vars(&mut self, source: SourceNode) -> Sort {
        let p = LevelMetaVar::fresh(LevelKind::PLevel, Symbol::intern_static("p"), source);
        let h = LevelMetaVar::fresh(LevelKind::HLevel, Symbol::intern_static("h"), source);
        self.add_variable(p);
        self.add_variable(h);
        Sort::new(
            Level::new(Some(LevelVariable::Meta(p)), 0),
            Level::new(Some(LevelVariable::Meta(h)), 0),
        )
    }

    fn push_equation(
        &mut self,
        lhs: ExprPtr,
        rhs: ExprPtr,
        mut cmp: Cmp,
        source: SourceNode,
        stuck: MetaVar,
    ) -> bool {
        let inf_lhs = self.metas.as_unsolved(&lhs);
        let inf_rhs = self.metas.as_unsolved(&rhs);
        if inf_lhs.is_some() && inf_lhs == inf_rhs {
            return true;
        }

        let (var, other, var_on_lhs) = match (inf_lhs, inf_rhs) {
            (Some(var), _) => (var, rhs, true),
            (None, Some(var)) => (var, lhs, false),
            (None, None) => {
                if let Some(solved) = self.solve_classifying_field(&lhs, &rhs) {
                    return solved;
                }
                self.equations.push(Equation {
                    lhs,
                    rhs,
                    cmp,
                    source,
                    stuck,
                });
                return true;
            }
        };

        let norm = self.norm();
        let c_type = norm.whnf(&other);
        let stuck_meta = match norm.stuck_expr(&c_type).as_deref() {
            Some(Expr::InferenceRef(meta)) => Some(*meta),
            _ => None,
        };
        if !matches!(
            &*c_type,
            Expr::Pi(_) | Expr::Universe(_) | Expr::ClassCall(_)
        ) && stuck_meta.is_none()
        {
            // the other side cannot be decomposed, so only an assignment
            // can satisfy the equation
            cmp = Cmp::Eq;
        }
        if cmp == Cmp::Eq {
            return self.solve_variable(var, &c_type);
        }
        if var_on_lhs {
            // normalize to `c_type cmp ?var`
            cmp = cmp.not();
        }

        match &*c_type {
            Expr::Pi(pi) => {
                let cod_sort = self.generate_sort_vars(source);
                let cod_var = self.metas.fresh(
                    self.metas.name(var).with_suffix("-cod"),
                    Expr::universe(cod_sort),
                    self.metas.source(var),
                    self.metas.bounds(var),
                );
                let solution = Expr::pi(pi.sort, pi.params.clone(), Expr::inference_ref(cod_var));
                let codomain = pi.codomain.clone();
                if !self.solve_variable(var, &solution) {
                    return false;
                }
                self.push_equation(
                    codomain,
                    Expr::inference_ref(cod_var),
                    cmp,
                    source,
                    cod_var,
                )
            }
            Expr::Universe(sort) => {
                let sort = *sort;
                let generated = self.generate_sort_vars(source);
                if !self.solve_variable(var, &Expr::universe(generated)) {
                    return false;
                }
                match cmp {
                    Cmp::Le => compare_sorts(&sort, &generated, Cmp::Le, self, source),
                    _ => {
                        // `generated <= sort`, level by level
                        let mut ok = self.add_level_equation(
                            generated.p.var(),
                            sort.p.var(),
                            sort.p.constant(),
                            sort.p.max_constant(),
                            source,
                        );
                        if !sort.h.is_infinity() {
                            ok &= self.add_level_equation(
                                generated.h.var(),
                                sort.h.var(),
                                sort.h.constant(),
                                sort.h.max_constant(),
                                source,
                            );
                        }
                        ok
                    }
                }
            }
            _ => {
                self.equations.push(Equation {
                    lhs: c_type,
                    rhs: Expr::inference_ref(var),
                    cmp,
                    source,
                    stuck: stuck_meta.unwrap_or(var),
                });
                true
            }
        }
    }

    /// The fast path for instance inference: an equation of the shape
    /// `field ?inst = value`, where `field` classifies `?inst`, is solved
    /// by looking `value` up in the instance pool.
    fn solve_classifying_field(&mut self, lhs: &ExprPtr, rhs: &ExprPtr) -> Option<bool> {
        for (call_side, value) in [(lhs, rhs), (rhs, lhs)] {
            if let Expr::FieldCall(field, inner) = &**call_side {
                if let Some(var) = self.metas.as_unsolved(inner) {
                    if self.metas.classifying_field(var) == Some(*field) {
                        let norm = self.norm();
                        if let Some(instance) = self.instances.find(&norm, value) {
                            return Some(self.solve_variable(var, &instance));
                        }
                    }
                }
            }
        }
        None
    }

    /// Assign `expr` to `var`, after the occurs check and a check that the
    /// type of `expr` fits the type the metavariable was created at.
    pub fn solve_variable(&mut self, var: MetaVar, expr: &ExprPtr) -> bool {
        let norm = self.norm();
        let expr = norm.whnf(expr);
        if self.metas.as_unsolved(&expr) == Some(var) {
            return true;
        }
        let source = self.metas.source(var);
        if expr.find_meta(var) {
            self.messages.push(Message::OccursCheck {
                var,
                candidate: expr,
                source,
            });
            self.assign(var, Expr::error(None));
            return false;
        }
        let expected = self.metas.type_of(var);
        match typing::type_of(&norm, &expr) {
            Some(actual)
                if !compare::compare(&norm, self, Cmp::Le, &actual, &expected, source) =>
            {
                self.messages.push(Message::TypeMismatch {
                    expected,
                    actual,
                    candidate: expr.clone(),
                    source,
                });
                self.assign(var, Expr::error(Some(expr)));
                false
            }
            _ => {
                self.assign(var, Expr::of_type(expr, expected));
                true
            }
        }
    }

    /// Record the solution and re-run every equation that was stuck on the
    /// variable.
    fn assign(&mut self, var: MetaVar, solution: ExprPtr) {
        self.metas.solve(var, solution);
        let (pending, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.equations)
            .into_iter()
            .partition(|equation| equation.stuck == var);
        self.equations = rest;
        for equation in pending {
            let norm = self.norm();
            if !compare::compare(
                &norm,
                self,
                equation.cmp,
                &equation.lhs,
                &equation.rhs,
                equation.source,
            ) {
                let source = equation.source;
                self.messages.push(Message::SolveEquations {
                    equations: vec![equation],
                    source,
                });
            }
        }
    }

    /// Record `var1 <= max(var2 + constant, max_constant)` between level
    /// variables, where `None` stands for the constant zero.
    fn add_level_equation(
        &mut self,
        var1: Option<LevelVariable>,
        var2: Option<LevelVariable>,
        constant: i32,
        max_constant: i32,
        source: SourceNode,
    ) -> bool {
        let meta2 = var2.and_then(|var| var.as_meta());
        let report = |this: &mut Self| {
            let equation = LevelEquation::Cmp {
                var1: var1.and_then(|var| var.as_meta()),
                var2: meta2,
                constant,
                max_constant: Some(max_constant),
            };
            this.messages.push(Message::SolveLevelEquations {
                equations: vec![equation],
                source,
            });
            false
        };
        if constant < 0 && max_constant < 0 && meta2.is_none() {
            return report(self);
        }
        let var1 = match var1 {
            None => {
                // a constraint on the zero level matters only when it
                // forces the right-hand variable upwards
                if constant < 0 && max_constant < 0 {
                    self.level_equations.push(LevelEquation::Cmp {
                        var1: None,
                        var2: meta2,
                        constant,
                        max_constant: Some(max_constant),
                    });
                }
                return true;
            }
            Some(var1) => var1,
        };
        match var1.as_meta() {
            Some(meta1) => match meta2 {
                Some(meta2) => {
                    self.level_equations.push(LevelEquation::Cmp {
                        var1: Some(meta1),
                        var2: Some(meta2),
                        constant,
                        max_constant: (max_constant >= 0).then_some(max_constant),
                    });
                    true
                }
                None => {
                    // a polymorphic level on the right is approximated from
                    // below by zero
                    self.level_equations.push(LevelEquation::Cmp {
                        var1: Some(meta1),
                        var2: None,
                        constant: constant.max(max_constant),
                        max_constant: None,
                    });
                    true
                }
            },
            None => {
                if var2 == Some(var1) {
                    return true;
                }
                match meta2 {
                    Some(meta2) => {
                        self.bases.insert(meta2, var1);
                        if constant < 0 {
                            self.level_equations.push(LevelEquation::Cmp {
                                var1: None,
                                var2: Some(meta2),
                                constant,
                                max_constant: None,
                            });
                        }
                        true
                    }
                    None => report(self),
                }
            }
        }
    }

    /// Solve class-call bounds accumulated in the queue. Lower bounds
    /// (`C <= ?m`) are merged towards the largest one, upper bounds
    /// (`C >= ?m`) towards the smallest.
    fn solve_class_calls(&mut self) {
        let norm = self.norm();
        let metas = self.metas;

        let is_class_bound = move |equation: &Equation, upper: bool| {
            metas.as_unsolved(&equation.rhs).is_some()
                && (metas.as_unsolved(&equation.lhs).is_some()
                    || (matches!(&*equation.lhs, Expr::ClassCall(_))
                        && (equation.cmp == Cmp::Ge) == upper))
        };

        // lower bounds first
        let (lower, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.equations)
            .into_iter()
            .partition(|equation| is_class_bound(equation, false));
        self.equations = rest;
        let mut bounds: Vec<(ExprPtr, MetaVar, SourceNode)> = Vec::new();
        for equation in lower {
            match equation.cmp {
                Cmp::Le => {
                    if let Some(var) = self.metas.as_unsolved(&equation.rhs) {
                        bounds.push((equation.lhs, var, equation.source));
                    }
                }
                Cmp::Ge => {
                    // both sides are metavariables here; flip to `rhs <= lhs`
                    if let Some(var) = self.metas.as_unsolved(&equation.lhs) {
                        bounds.push((equation.rhs, var, equation.source));
                    }
                }
                Cmp::Eq => {
                    if let Some(var) = self.metas.as_unsolved(&equation.rhs) {
                        bounds.push((equation.lhs.clone(), var, equation.source));
                    }
                    if let Some(var) = self.metas.as_unsolved(&equation.lhs) {
                        bounds.push((equation.rhs, var, equation.source));
                    }
                }
            }
        }

        // keep the largest lower bound per variable, iterating because a
        // bound may itself be a metavariable solved along the way
        let mut merged: FxHashMap<MetaVar, (ExprPtr, SourceNode)> = FxHashMap::default();
        let mut remaining = bounds;
        for _round in 0..=remaining.len() {
            let mut next = Vec::new();
            for (bound, var, source) in remaining {
                let bound = match self.metas.as_unsolved(&bound) {
                    Some(bound_var) => match merged.get(&bound_var) {
                        Some((known, _)) => known.clone(),
                        None => {
                            next.push((bound, var, source));
                            continue;
                        }
                    },
                    None => bound,
                };
                match merged.get(&var) {
                    None => {
                        merged.insert(var, (bound, source));
                    }
                    Some((old, _)) => {
                        if compare::is_less_or_equals(&norm, &bound, old, source) {
                            // the old bound already subsumes the new one
                        } else if compare::is_less_or_equals(&norm, old, &bound, source) {
                            merged.insert(var, (bound, source));
                        } else {
                            let equations = vec![
                                Equation {
                                    lhs: old.clone(),
                                    rhs: Expr::inference_ref(var),
                                    cmp: Cmp::Le,
                                    source,
                                    stuck: var,
                                },
                                Equation {
                                    lhs: bound,
                                    rhs: Expr::inference_ref(var),
                                    cmp: Cmp::Le,
                                    source,
                                    stuck: var,
                                },
                            ];
                            self.messages
                                .push(Message::SolveEquations { equations, source });
                        }
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            remaining = next;
        }
        for (var, (bound, _source)) in merged {
            if !self.metas.is_solved(var) {
                self.solve_variable(var, &bound);
            }
        }

        // then upper bounds
        let (upper, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.equations)
            .into_iter()
            .partition(|equation| is_class_bound(equation, true));
        self.equations = rest;
        let mut minimal: FxHashMap<MetaVar, (ExprPtr, SourceNode)> = FxHashMap::default();
        for equation in upper {
            let var = match self.metas.as_unsolved(&equation.rhs) {
                Some(var) => var,
                None => continue,
            };
            if self.metas.as_unsolved(&equation.lhs).is_some() {
                // a bound that is itself undetermined cannot be used;
                // leave the equation for final reporting
                self.equations.push(equation);
                continue;
            }
            match minimal.get(&var) {
                None => {
                    minimal.insert(var, (equation.lhs, equation.source));
                }
                Some((old, _)) => {
                    if compare::is_less_or_equals(&norm, old, &equation.lhs, equation.source) {
                        // keep the old, smaller bound
                    } else if compare::is_less_or_equals(&norm, &equation.lhs, old, equation.source)
                    {
                        minimal.insert(var, (equation.lhs, equation.source));
                    } else {
                        let source = equation.source;
                        self.messages.push(Message::SolveEquations {
                            equations: vec![equation],
                            source,
                        });
                    }
                }
            }
        }
        for (var, (bound, _source)) in minimal {
            if !self.metas.is_solved(var) {
                self.solve_variable(var, &bound);
            }
        }
    }

    /// Finish the definition: resolve class-call bounds, solve the level
    /// constraints, and report everything that remains undecided. Returns
    /// the substitution instantiating the solved level metavariables.
    pub fn solve_all(&mut self, source: SourceNode) -> LevelSubstitution {
        self.solve_class_calls();

        let vars = std::mem::take(&mut self.level_vars);
        let level_equations = std::mem::take(&mut self.level_equations);
        let mut solution: FxHashMap<LevelMetaVar, Option<i32>> = FxHashMap::default();
        let solver = LevelEquationsSolver {
            vars: &vars,
            equations: &level_equations,
        };
        if let Some(cycle) = solver.solve(&mut solution) {
            let cycle_source = cycle
                .iter()
                .find_map(|equation| match equation {
                    LevelEquation::Infinity(var) => Some(var.source()),
                    LevelEquation::Cmp { var1: Some(var), .. } => Some(var.source()),
                    _ => None,
                })
                .unwrap_or(source);
            self.messages.push(Message::SolveLevelEquations {
                equations: cycle,
                source: cycle_source,
            });
        }
        let mut subst = LevelSubstitution::new();
        for var in &vars {
            let level = match solution.get(var).copied().flatten() {
                Some(value) => {
                    let base = self.bases.get(var).copied();
                    Level::new(base, value)
                }
                None => {
                    debug_assert_eq!(var.kind(), LevelKind::HLevel);
                    Level::INFINITY
                }
            };
            subst.add(LevelVariable::Meta(*var), level);
        }
        self.bases.clear();

        let norm = self.norm();
        let leftover: Vec<Equation> = std::mem::take(&mut self.equations)
            .into_iter()
            .filter(|equation| {
                let dropped = |expr: &ExprPtr| {
                    matches!(
                        norm.stuck_expr(expr).as_deref(),
                        Some(Expr::InferenceRef(_) | Expr::Error(_))
                    )
                };
                !dropped(&equation.lhs) && !dropped(&equation.rhs)
            })
            .collect();
        if !leftover.is_empty() {
            self.messages.push(Message::SolveEquations {
                equations: leftover,
                source,
            });
        }
        subst
    }

    /// Report every metavariable that never received a solution.
    pub fn report_unsolved(&mut self) {
        for var in self.metas.unsolved() {
            self.messages.push(Message::CannotInfer {
                var,
                source: self.metas.source(var),
            });
        }
    }
}

impl EquationSink for Equations<'_> {
    fn add_equation(
        &mut self,
        lhs: &ExprPtr,
        rhs: &ExprPtr,
        cmp: Cmp,
        source: SourceNode,
        stuck: MetaVar,
    ) -> bool {
        self.push_equation(lhs.clone(), rhs.clone(), cmp, source, stuck)
    }

    fn add_levels(&mut self, l1: &Level, l2: &Level, cmp: Cmp, source: SourceNode) -> bool {
        match cmp {
            Cmp::Le => self.level_less_or_equals(l1, l2, source),
            Cmp::Ge => self.level_less_or_equals(l2, l1, source),
            Cmp::Eq => {
                self.level_less_or_equals(l1, l2, source)
                    && self.level_less_or_equals(l2, l1, source)
            }
        }
    }
}

impl Equations<'_> {
    fn level_less_or_equals(&mut self, l1: &Level, l2: &Level, source: SourceNode) -> bool {
        if l2.is_infinity() {
            return true;
        }
        if l1.is_infinity() {
            return match l2.var().and_then(|var| var.as_meta()) {
                Some(meta) => {
                    self.level_equations.push(LevelEquation::Infinity(meta));
                    true
                }
                None => {
                    self.messages.push(Message::SolveLevelEquations {
                        equations: vec![LevelEquation::Cmp {
                            var1: None,
                            var2: l2.var().and_then(|var| var.as_meta()),
                            constant: l2.constant(),
                            max_constant: Some(l2.max_constant()),
                        }],
                        source,
                    });
                    false
                }
            };
        }
        self.add_level_equation(
            l1.var(),
            l2.var(),
            l2.constant() - l1.constant(),
            l2.max_constant() - l1.constant(),
            source,
        ) && self.add_level_equation(
            None,
            l2.var(),
            l2.constant() - l1.max_constant(),
            l2.max_constant() - l1.max_constant(),
            source,
        )
    }
}

/// Solves a batch of level constraints for the minimal assignment.
struct LevelEquationsSolver<'a> {
    vars: &'a [LevelMetaVar],
    equations: &'a [LevelEquation],
}

impl LevelEquationsSolver<'_> {
    /// Compute the minimal solution into `solution` (`None` marks a
    /// variable solved to infinity). Returns the offending constraints
    /// when no solution exists.
    fn solve(
        &self,
        solution: &mut FxHashMap<LevelMetaVar, Option<i32>>,
    ) -> Option<Vec<LevelEquation>> {
        // propagate infinity: a constraint with an infinite left-hand
        // variable forces its right-hand variable to infinity as well
        let mut infinite: Vec<LevelMetaVar> = self
            .equations
            .iter()
            .filter_map(|equation| match equation {
                LevelEquation::Infinity(var) => Some(*var),
                _ => None,
            })
            .collect();
        loop {
            let mut changed = false;
            for equation in self.equations {
                if let LevelEquation::Cmp {
                    var1: Some(var1),
                    var2,
                    ..
                } = equation
                {
                    if infinite.contains(var1) {
                        match var2 {
                            Some(var2) if !infinite.contains(var2) => {
                                infinite.push(*var2);
                                changed = true;
                            }
                            Some(_) => {}
                            None => return Some(vec![equation.clone()]),
                        }
                    }
                }
            }
            if !changed {
                break;
            }
        }

        // Bellman-Ford over the remaining variables; values are negated
        // levels, relaxed downwards from zero. `None` is the zero node.
        let mut values: FxHashMap<Option<LevelMetaVar>, i64> = FxHashMap::default();
        values.insert(None, 0);
        for var in self.vars {
            values.insert(Some(*var), 0);
        }
        let mut predecessor: FxHashMap<Option<LevelMetaVar>, LevelEquation> = FxHashMap::default();
        let rounds = values.len() + 1;
        let mut last_relaxed = None;
        for round in 0..rounds {
            let mut changed = false;
            for equation in self.equations {
                let (var1, var2, constant, max_constant) = match equation {
                    LevelEquation::Cmp {
                        var1,
                        var2,
                        constant,
                        max_constant,
                    } => (*var1, *var2, *constant, *max_constant),
                    LevelEquation::Infinity(_) => continue,
                };
                if var1.map_or(false, |var| infinite.contains(&var))
                    || var2.map_or(false, |var| infinite.contains(&var))
                {
                    continue;
                }
                let value1 = values.get(&var1).copied().unwrap_or(0);
                // `max_constant` offers an escape: the constraint holds
                // outright when the left level is below it
                if let Some(max) = max_constant {
                    if -value1 <= i64::from(max) {
                        continue;
                    }
                }
                let bound = value1 + i64::from(constant);
                let entry = values.entry(var2).or_insert(0);
                if *entry > bound {
                    *entry = bound;
                    predecessor.insert(var2, equation.clone());
                    last_relaxed = Some(var2);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
            if round == rounds - 1 {
                // still relaxing after every node had its turn
                return Some(self.collect_chain(&predecessor, last_relaxed?));
            }
        }
        if values.get(&None).copied().unwrap_or(0) < 0 {
            return Some(self.collect_chain(&predecessor, None));
        }

        for var in self.vars {
            if infinite.contains(var) {
                solution.insert(*var, None);
            } else {
                let value = values.get(&Some(*var)).copied().unwrap_or(0);
                solution.insert(*var, Some(-value as i32));
            }
        }
        None
    }

    /// Walk the predecessor graph from `start`, collecting the constraints
    /// responsible for an unsatisfiable chain or cycle.
    fn collect_chain(
        &self,
        predecessor: &FxHashMap<Option<LevelMetaVar>, LevelEquation>,
        start: Option<LevelMetaVar>,
    ) -> Vec<LevelEquation> {
        let mut chain = Vec::new();
        let mut seen = Vec::new();
        let mut node = start;
        while !seen.contains(&node) {
            seen.push(node);
            let equation = match predecessor.get(&node) {
                Some(equation) => equation.clone(),
                None => break,
            };
            let previous = match &equation {
                LevelEquation::Cmp { var1, .. } => *var1,
                LevelEquation::Infinity(_) => None,
            };
            chain.push(equation);
            node = previous;
        }
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::def::{ClassDef, FieldDef, FunId, FunctionDef, Status};
    use crate::core::elim::{Body, BranchElimTree, BranchKey, ElimTree, LeafElimTree};
    use crate::core::{Binding, ClassCallExpr};
    use rpds::HashTrieSet;

    fn setup() -> (Definitions, Prelude, MetaVars) {
        let mut defs = Definitions::new();
        let prelude = Prelude::new(&mut defs);
        (defs, prelude, MetaVars::new())
    }

    fn nat_type(defs: &Definitions, prelude: &Prelude) -> ExprPtr {
        Expr::data_call(defs, prelude.nat, Sort::SET0, vec![])
    }

    fn fresh_meta(metas: &MetaVars, name: &str, ty: ExprPtr) -> MetaVar {
        metas.fresh(
            Symbol::intern(name),
            ty,
            SourceNode::SYNTHETIC,
            HashTrieSet::new(),
        )
    }

    /// `pred : Nat -> Nat` matching on its argument.
    fn define_pred(defs: &mut Definitions, prelude: &Prelude) -> FunId {
        let nat = nat_type(defs, prelude);
        let n = Binding::new(Some(Symbol::intern("n")), nat.clone());
        let pred = defs.add_function(FunctionDef {
            name: Symbol::intern("pred"),
            params: vec![n],
            result_type: nat.clone(),
            body: None,
            status: Status::HeaderChecked,
        });
        let m = Binding::new(Some(Symbol::intern("m")), nat);
        let mut children = FxHashMap::default();
        children.insert(
            BranchKey::Con(prelude.zero),
            ElimTree::Leaf(LeafElimTree {
                params: vec![],
                body: prelude.nat_literal(defs, 0),
            }),
        );
        children.insert(
            BranchKey::Con(prelude.suc),
            ElimTree::Leaf(LeafElimTree {
                params: vec![m.clone()],
                body: Expr::var(&m),
            }),
        );
        let tree = ElimTree::Branch(BranchElimTree {
            params: vec![],
            children,
        });
        defs.set_function_body(pred, Some(Body::Tree(tree)), Status::NoErrors);
        pred
    }

    #[test]
    fn equality_with_a_bare_metavariable_solves_it() {
        let (defs, prelude, metas) = setup();
        let mut equations = Equations::new(&defs, &metas, &prelude);
        let var = fresh_meta(&metas, "n", nat_type(&defs, &prelude));
        let two = prelude.nat_literal(&defs, 2);

        let ok = equations.add_equation(
            &Expr::inference_ref(var),
            &two,
            Cmp::Eq,
            SourceNode::SYNTHETIC,
            var,
        );
        assert!(ok);
        assert!(metas.is_solved(var));
        let norm = Normalizer::new(&defs, &metas, &prelude);
        assert_eq!(
            prelude.nat_value(&norm.whnf(&Expr::inference_ref(var))),
            Some(2)
        );
        assert!(equations.take_messages().is_empty());
    }

    #[test]
    fn deferred_equation_reruns_when_the_variable_is_solved() {
        let (mut defs, prelude, metas) = setup();
        let pred = define_pred(&mut defs, &prelude);
        let mut equations = Equations::new(&defs, &metas, &prelude);
        let var = fresh_meta(&metas, "n", nat_type(&defs, &prelude));
        let norm = Normalizer::new(&defs, &metas, &prelude);

        // pred ?n = 2 cannot be decided yet
        let lhs = Expr::fun_call(
            &defs,
            pred,
            Sort::SET0,
            vec![Expr::inference_ref(var)],
        );
        let two = prelude.nat_literal(&defs, 2);
        let ok = compare::compare(
            &norm,
            &mut equations,
            Cmp::Eq,
            &lhs,
            &two,
            SourceNode::SYNTHETIC,
        );
        assert!(ok, "the comparison defers instead of failing");
        assert!(!metas.is_solved(var));

        // solving ?n := 3 wakes the equation up, and pred 3 = 2 holds
        let three = prelude.nat_literal(&defs, 3);
        assert!(equations.add_equation(
            &Expr::inference_ref(var),
            &three,
            Cmp::Eq,
            SourceNode::SYNTHETIC,
            var,
        ));
        assert!(equations.take_messages().is_empty());

        equations.solve_all(SourceNode::SYNTHETIC);
        assert!(equations.take_messages().is_empty());
    }

    #[test]
    fn failed_deferred_equation_is_reported() {
        let (mut defs, prelude, metas) = setup();
        let pred = define_pred(&mut defs, &prelude);
        let mut equations = Equations::new(&defs, &metas, &prelude);
        let var = fresh_meta(&metas, "n", nat_type(&defs, &prelude));
        let norm = Normalizer::new(&defs, &metas, &prelude);

        let lhs = Expr::fun_call(
            &defs,
            pred,
            Sort::SET0,
            vec![Expr::inference_ref(var)],
        );
        let two = prelude.nat_literal(&defs, 2);
        assert!(compare::compare(
            &norm,
            &mut equations,
            Cmp::Eq,
            &lhs,
            &two,
            SourceNode::SYNTHETIC,
        ));

        // pred 0 = 2 does not hold
        let zero = prelude.nat_literal(&defs, 0);
        equations.add_equation(
            &Expr::inference_ref(var),
            &zero,
            Cmp::Eq,
            SourceNode::SYNTHETIC,
            var,
        );
        let messages = equations.take_messages();
        assert!(
            matches!(messages.as_slice(), [Message::SolveEquations { .. }]),
            "expected the rerun to report, got {messages:?}"
        );
    }

    #[test]
    fn occurs_check_reports_and_poisons_the_variable() {
        let (defs, prelude, metas) = setup();
        let mut equations = Equations::new(&defs, &metas, &prelude);
        let var = fresh_meta(&metas, "n", nat_type(&defs, &prelude));

        let candidate = Expr::con_call(
            &defs,
            prelude.suc,
            Sort::SET0,
            vec![],
            vec![Expr::inference_ref(var)],
        );
        let ok = equations.add_equation(
            &Expr::inference_ref(var),
            &candidate,
            Cmp::Eq,
            SourceNode::SYNTHETIC,
            var,
        );
        assert!(!ok);
        let messages = equations.take_messages();
        assert!(matches!(
            messages.as_slice(),
            [Message::OccursCheck { var: reported, .. }] if *reported == var
        ));
        // the variable is poisoned so later uses do not cascade
        assert!(matches!(
            metas.solution(var).as_deref(),
            Some(Expr::Error(None))
        ));
    }

    #[test]
    fn pi_types_are_decomposed() {
        let (defs, prelude, metas) = setup();
        let mut equations = Equations::new(&defs, &metas, &prelude);
        let var = fresh_meta(&metas, "F", Expr::universe(Sort::SET0));
        let nat = nat_type(&defs, &prelude);

        // (Nat -> Nat) <= ?F forces ?F to be a pi type
        let arrow = Expr::pi(
            Sort::SET0,
            vec![Binding::new(None, nat.clone())],
            nat.clone(),
        );
        assert!(equations.add_equation(
            &arrow,
            &Expr::inference_ref(var),
            Cmp::Le,
            SourceNode::SYNTHETIC,
            var,
        ));
        assert!(metas.unsolved().is_empty(), "codomain variable solved too");

        let norm = Normalizer::new(&defs, &metas, &prelude);
        let solution = norm.whnf(&Expr::inference_ref(var));
        match &*solution {
            Expr::Pi(pi) => {
                let codomain = norm.whnf(&pi.codomain);
                assert!(
                    matches!(&*codomain, Expr::DataCall(call) if call.data == prelude.nat)
                );
            }
            other => panic!("expected a pi type, got {other:?}"),
        }
        assert!(equations.take_messages().is_empty());
    }

    #[test]
    fn universes_are_decomposed_into_level_constraints() {
        let (defs, prelude, metas) = setup();
        let mut equations = Equations::new(&defs, &metas, &prelude);
        let var = fresh_meta(&metas, "A", Expr::universe(Sort::SET0.succ()));

        // ?A >= \Set0 solves ?A to a universe of fresh levels
        assert!(equations.add_equation(
            &Expr::inference_ref(var),
            &Expr::universe(Sort::SET0),
            Cmp::Ge,
            SourceNode::SYNTHETIC,
            var,
        ));
        let norm = Normalizer::new(&defs, &metas, &prelude);
        let solution = norm.whnf(&Expr::inference_ref(var));
        let sort = match &*solution {
            Expr::Universe(sort) => *sort,
            other => panic!("expected a universe, got {other:?}"),
        };
        assert!(sort.p.var().is_some(), "levels are fresh metavariables");

        // the minimal solution of the collected constraints is \Set0
        let subst = equations.solve_all(SourceNode::SYNTHETIC);
        assert!(equations.take_messages().is_empty());
        assert_eq!(sort.subst(&subst), Sort::SET0);
    }

    #[test]
    fn level_cycle_is_reported() {
        let (defs, prelude, metas) = setup();
        let mut equations = Equations::new(&defs, &metas, &prelude);
        let x = LevelMetaVar::fresh(
            LevelKind::PLevel,
            Symbol::intern("x"),
            SourceNode::SYNTHETIC,
        );
        let y = LevelMetaVar::fresh(
            LevelKind::PLevel,
            Symbol::intern("y"),
            SourceNode::SYNTHETIC,
        );
        equations.add_variable(x);
        equations.add_variable(y);

        // ?x <= ?y - 1 and ?y <= ?x - 1 admit no solution
        let level_x = Level::new(Some(LevelVariable::Meta(x)), 0);
        let level_y = Level::new(Some(LevelVariable::Meta(y)), 0);
        equations.add_levels(&level_x, &level_y.add(-1), Cmp::Le, SourceNode::SYNTHETIC);
        equations.add_levels(&level_y, &level_x.add(-1), Cmp::Le, SourceNode::SYNTHETIC);

        equations.solve_all(SourceNode::SYNTHETIC);
        let messages = equations.take_messages();
        assert!(
            matches!(messages.as_slice(), [Message::SolveLevelEquations { .. }]),
            "expected a level error, got {messages:?}"
        );
    }

    #[test]
    fn satisfiable_level_constraints_get_the_minimal_solution() {
        let (defs, prelude, metas) = setup();
        let mut equations = Equations::new(&defs, &metas, &prelude);
        let x = LevelMetaVar::fresh(
            LevelKind::PLevel,
            Symbol::intern("x"),
            SourceNode::SYNTHETIC,
        );
        equations.add_variable(x);

        // 2 <= ?x
        let level_x = Level::new(Some(LevelVariable::Meta(x)), 0);
        assert!(equations.add_levels(
            &Level::closed(2),
            &level_x,
            Cmp::Le,
            SourceNode::SYNTHETIC
        ));
        let subst = equations.solve_all(SourceNode::SYNTHETIC);
        assert!(equations.take_messages().is_empty());
        assert_eq!(subst.get(LevelVariable::Meta(x)), Some(Level::closed(2)));
    }

    fn pointed_class(
        defs: &mut Definitions,
        prelude: &Prelude,
    ) -> (crate::core::ClassId, crate::core::FieldId) {
        let class = defs.add_class(ClassDef {
            name: Symbol::intern("Pointed"),
            fields: Vec::new(),
            superclasses: Vec::new(),
            implemented: FxHashMap::default(),
            sort: Sort::STD,
            status: Status::NoErrors,
        });
        let this_binding = Binding::new(
            Some(Symbol::intern("this")),
            Expr::class_call(defs, class, Sort::STD, FxHashMap::default()),
        );
        let point = defs.add_field(FieldDef {
            name: Symbol::intern("point"),
            class,
            this_binding,
            ty: nat_type(defs, prelude),
            status: Status::NoErrors,
        });
        (class, point)
    }

    #[test]
    fn classifying_field_equation_consults_the_instance_pool() {
        let (mut defs, prelude, metas) = setup();
        let (class, point) = pointed_class(&mut defs, &prelude);
        let mut equations = Equations::new(&defs, &metas, &prelude);

        let two = prelude.nat_literal(&defs, 2);
        let mut implementations = FxHashMap::default();
        implementations.insert(point, two.clone());
        let instance = Expr::new_expr(ClassCallExpr {
            class,
            sort: Sort::STD,
            implementations,
        });
        let norm = Normalizer::new(&defs, &metas, &prelude);
        assert!(equations
            .instances
            .add(&norm, two.clone(), instance, SourceNode::SYNTHETIC)
            .is_none());

        let var = metas.fresh_classifying(
            Symbol::intern("inst"),
            Expr::class_call(&defs, class, Sort::STD, FxHashMap::default()),
            SourceNode::SYNTHETIC,
            HashTrieSet::new(),
            point,
        );
        let field_call = Expr::field_call(&defs, point, Expr::inference_ref(var));
        assert!(equations.add_equation(
            &field_call,
            &two,
            Cmp::Eq,
            SourceNode::SYNTHETIC,
            var,
        ));
        assert!(metas.is_solved(var));
        assert!(matches!(
            Normalizer::new(&defs, &metas, &prelude)
                .whnf(&Expr::inference_ref(var))
                .as_ref(),
            Expr::New(_)
        ));
        assert!(equations.take_messages().is_empty());
    }

    #[test]
    fn class_call_lower_bound_solves_the_variable() {
        let (mut defs, prelude, metas) = setup();
        let (class, point) = pointed_class(&mut defs, &prelude);
        let mut equations = Equations::new(&defs, &metas, &prelude);
        let var = fresh_meta(&metas, "C", Expr::universe(Sort::STD));

        let mut implementations = FxHashMap::default();
        implementations.insert(point, prelude.nat_literal(&defs, 2));
        let bound = Expr::class_call(&defs, class, Sort::STD, implementations);
        assert!(equations.add_equation(
            &bound,
            &Expr::inference_ref(var),
            Cmp::Le,
            SourceNode::SYNTHETIC,
            var,
        ));
        assert!(!metas.is_solved(var), "class bounds wait for solve_all");

        equations.solve_all(SourceNode::SYNTHETIC);
        assert!(metas.is_solved(var));
        let norm = Normalizer::new(&defs, &metas, &prelude);
        assert!(matches!(
            norm.whnf(&Expr::inference_ref(var)).as_ref(),
            Expr::ClassCall(call) if call.implementations.contains_key(&point)
        ));
        assert!(equations.take_messages().is_empty());
    }

    #[test]
    fn conflicting_class_call_bounds_are_reported() {
        let (mut defs, prelude, metas) = setup();
        let (class, point) = pointed_class(&mut defs, &prelude);
        let mut equations = Equations::new(&defs, &metas, &prelude);
        let var = fresh_meta(&metas, "C", Expr::universe(Sort::STD));

        for value in [2u64, 3] {
            let mut implementations = FxHashMap::default();
            implementations.insert(point, prelude.nat_literal(&defs, value));
            let bound = Expr::class_call(&defs, class, Sort::STD, implementations);
            equations.add_equation(
                &bound,
                &Expr::inference_ref(var),
                Cmp::Le,
                SourceNode::SYNTHETIC,
                var,
            );
        }
        equations.solve_all(SourceNode::SYNTHETIC);
        let messages = equations.take_messages();
        assert!(
            messages
                .iter()
                .any(|message| matches!(message, Message::SolveEquations { .. })),
            "incomparable lower bounds must be reported, got {messages:?}"
        );
    }

    #[test]
    fn unsolved_metavariables_are_reported_on_demand() {
        let (defs, prelude, metas) = setup();
        let mut equations = Equations::new(&defs, &metas, &prelude);
        let var = fresh_meta(&metas, "n", nat_type(&defs, &prelude));
        equations.report_unsolved();
        let messages = equations.take_messages();
        assert!(matches!(
            messages.as_slice(),
            [Message::CannotInfer { var: reported, .. }] if *reported == var
        ));
    }
}
