//! Definitional equality.
//!
//! [`compare`] decides whether two terms are convertible, up to the
//! direction `cmp`: subtyping is used for universes (cumulativity), for
//! covariant data parameters and for class calls (a call implementing more
//! fields is smaller). Eta rules are applied for functions, tuples, paths
//! and fully-implemented class calls.
//!
//! Comparison is entangled with elaboration: when a side is stuck on an
//! unsolved metavariable the comparison is not decided here but recorded
//! through the [`EquationSink`], and optimistically assumed to hold. Pure
//! conversion checks pass [`DummyEquations`], which refuses to defer.

use fxhash::FxHashMap;

use crate::core::def::Definitions;
use crate::core::elim::ElimTree;
use crate::core::semantics::Normalizer;
use crate::core::sort::{Level, Sort};
use crate::core::subst::Substitution;
use crate::core::typing;
use crate::core::{
    Binding, BindingId, ClassCallExpr, ConCallExpr, Expr, ExprPtr,
};
use crate::elaboration::MetaVar;
use crate::source::SourceNode;

/// The direction of a comparison.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Cmp {
    Le,
    Ge,
    Eq,
}

impl Cmp {
    pub fn not(self) -> Cmp {
        match self {
            Cmp::Le => Cmp::Ge,
            Cmp::Ge => Cmp::Le,
            Cmp::Eq => Cmp::Eq,
        }
    }
}

/// Where comparison records the equations it cannot decide.
pub trait EquationSink {
    /// Record `lhs cmp rhs`, stuck on the metavariable `stuck`. Returns
    /// whether the equation was accepted.
    fn add_equation(
        &mut self,
        lhs: &ExprPtr,
        rhs: &ExprPtr,
        cmp: Cmp,
        source: SourceNode,
        stuck: MetaVar,
    ) -> bool;

    /// Record `l1 cmp l2` between universe levels.
    fn add_levels(&mut self, l1: &Level, l2: &Level, cmp: Cmp, source: SourceNode) -> bool;
}

/// A sink that accepts no equations: level comparisons must hold outright
/// and term equations fail. Used for pure conversion checks.
pub struct DummyEquations;

fn level_less_or_equals(l1: &Level, l2: &Level) -> bool {
    if l2.is_infinity() {
        return true;
    }
    if l1.is_infinity() {
        return false;
    }
    if l1.var() == l2.var() {
        return l1.constant() <= l2.constant() && l1.max_constant() <= l2.max_constant();
    }
    // a closed level is below any variable level with a larger constant
    l1.var().is_none() && l1.constant() <= l2.constant() && l1.constant() <= l2.max_constant()
}

impl EquationSink for DummyEquations {
    fn add_equation(
        &mut self,
        _lhs: &ExprPtr,
        _rhs: &ExprPtr,
        _cmp: Cmp,
        _source: SourceNode,
        _stuck: MetaVar,
    ) -> bool {
        false
    }

    fn add_levels(&mut self, l1: &Level, l2: &Level, cmp: Cmp, _source: SourceNode) -> bool {
        match cmp {
            Cmp::Le => level_less_or_equals(l1, l2),
            Cmp::Ge => level_less_or_equals(l2, l1),
            Cmp::Eq => level_less_or_equals(l1, l2) && level_less_or_equals(l2, l1),
        }
    }
}

/// Compare two sorts. Propositions sit below everything; other sorts are
/// compared level-wise through the sink.
pub fn compare_sorts(
    s1: &Sort,
    s2: &Sort,
    cmp: Cmp,
    sink: &mut dyn EquationSink,
    source: SourceNode,
) -> bool {
    if s1.is_prop() {
        return cmp == Cmp::Le || s2.is_prop();
    }
    if s2.is_prop() {
        return cmp == Cmp::Ge;
    }
    sink.add_levels(&s1.p, &s2.p, cmp, source) && sink.add_levels(&s1.h, &s2.h, cmp, source)
}

/// Compare `lhs cmp rhs`.
pub fn compare(
    norm: &Normalizer<'_>,
    equations: &mut dyn EquationSink,
    cmp: Cmp,
    lhs: &ExprPtr,
    rhs: &ExprPtr,
    source: SourceNode,
) -> bool {
    CompareVisitor {
        norm: *norm,
        equations,
        source,
        cmp,
        renaming: FxHashMap::default(),
    }
    .compare(lhs, rhs)
}

/// Is the type `lhs` a subtype of `rhs`? Both sides are fully normalized
/// first; no equations may be generated.
pub fn is_less_or_equals(
    norm: &Normalizer<'_>,
    lhs: &ExprPtr,
    rhs: &ExprPtr,
    source: SourceNode,
) -> bool {
    compare(
        norm,
        &mut DummyEquations,
        Cmp::Le,
        &norm.nf(lhs),
        &norm.nf(rhs),
        source,
    )
}

/// Compare two elimination trees for equality.
pub fn compare_trees(
    norm: &Normalizer<'_>,
    equations: &mut dyn EquationSink,
    t1: &ElimTree,
    t2: &ElimTree,
    source: SourceNode,
) -> bool {
    CompareVisitor {
        norm: *norm,
        equations,
        source,
        cmp: Cmp::Eq,
        renaming: FxHashMap::default(),
    }
    .visit_trees(t1, t2)
}

struct CompareVisitor<'a, 'e> {
    norm: Normalizer<'a>,
    equations: &'e mut dyn EquationSink,
    source: SourceNode,
    cmp: Cmp,
    /// Maps bindings of the right-hand side onto the left-hand bindings
    /// they are paired with when walking under binders.
    renaming: FxHashMap<BindingId, Binding>,
}

impl<'a, 'e> CompareVisitor<'a, 'e> {
    fn defs(&self) -> &'a Definitions {
        self.norm.defs
    }

    /// Rewrite right-hand bindings to their left-hand counterparts, so an
    /// equation stored for later is scoped like the left-hand side.
    fn rename(&self, expr: &ExprPtr) -> ExprPtr {
        if self.renaming.is_empty() {
            return expr.clone();
        }
        let mut subst = Substitution::new();
        for (id, binding) in &self.renaming {
            subst.add_id(*id, Expr::var(binding));
        }
        subst.apply(expr)
    }

    fn compare(&mut self, lhs: &ExprPtr, rhs: &ExprPtr) -> bool {
        let orig_cmp = self.cmp;
        let result = self.compare_with(lhs, rhs);
        self.cmp = orig_cmp;
        result
    }

    fn compare_with(&mut self, lhs: &ExprPtr, rhs: &ExprPtr) -> bool {
        // Calls of the same function are first compared argument-wise
        // without unfolding, which keeps recursive definitions cheap. The
        // comparison must not leak equations, so it runs against a dummy
        // sink and falls through to the full algorithm on failure.
        if let (Expr::FunCall(call1), Expr::FunCall(call2)) = (&**lhs, &**rhs) {
            if call1.fun == call2.fun && call1.args.len() == call2.args.len() {
                let mut quick = CompareVisitor {
                    norm: self.norm,
                    equations: &mut DummyEquations,
                    source: self.source,
                    cmp: Cmp::Eq,
                    renaming: self.renaming.clone(),
                };
                if call1
                    .args
                    .iter()
                    .zip(&call2.args)
                    .all(|(arg1, arg2)| quick.compare(arg1, arg2))
                {
                    return true;
                }
            }
        }

        let lhs = self.norm.whnf(lhs);
        let rhs = self.norm.whnf(rhs);
        let stuck_lhs = self.norm.stuck_expr(&lhs);
        let stuck_rhs = self.norm.stuck_expr(&rhs);

        // a side stuck on an error compares with anything that is not
        // itself awaiting inference
        if let Some(stuck) = &stuck_lhs {
            if stuck.is_error() && !matches!(stuck_rhs.as_deref(), Some(Expr::InferenceRef(_))) {
                return true;
            }
        }
        if let Some(stuck) = &stuck_rhs {
            if stuck.is_error() && !matches!(stuck_lhs.as_deref(), Some(Expr::InferenceRef(_))) {
                return true;
            }
        }

        if let Some(var) = self.norm.metas.as_unsolved(&lhs) {
            let rhs = self.rename(&rhs);
            let source = self.norm.metas.source(var);
            return self.equations.add_equation(&lhs, &rhs, self.cmp, source, var);
        }
        if let Some(var) = self.norm.metas.as_unsolved(&rhs) {
            let source = self.norm.metas.source(var);
            return self.equations.add_equation(&lhs, &rhs, self.cmp, source, var);
        }

        // only type formers are compared directionally
        if !matches!(
            &*lhs,
            Expr::Universe(_)
                | Expr::Pi(_)
                | Expr::ClassCall(_)
                | Expr::DataCall(_)
                | Expr::App(..)
                | Expr::Sigma(_)
        ) {
            self.cmp = Cmp::Eq;
        }

        let ok = if let Expr::ConCall(call2) = &*rhs {
            if call2.con == self.norm.prelude.path_con && !matches!(&*lhs, Expr::ConCall(_)) {
                self.compare_path_eta(call2, &lhs, false)
            } else {
                self.visit(&lhs, &rhs)
            }
        } else if matches!(&*rhs, Expr::Lam(_)) {
            self.compare_lam(&rhs, &lhs, false)
        } else if matches!(&*rhs, Expr::Tuple(_)) {
            self.compare_tuple(&rhs, &lhs, false)
        } else {
            let type1 = typing::type_of(&self.norm, &lhs).map(|ty| self.norm.whnf(&ty));
            let unit1 = match type1.as_deref() {
                Some(Expr::ClassCall(call)) if call.is_unit(self.defs()) => Some(call.clone()),
                _ => None,
            };
            if let Some(call) = unit1 {
                self.compare_unit(&call, &rhs, true)
            } else {
                let type2 = typing::type_of(&self.norm, &rhs).map(|ty| self.norm.whnf(&ty));
                let unit2 = match type2.as_deref() {
                    Some(Expr::ClassCall(call)) if call.is_unit(self.defs()) => Some(call.clone()),
                    _ => None,
                };
                if let Some(call) = unit2 {
                    self.compare_unit(&call, &lhs, false)
                } else {
                    self.visit(&lhs, &rhs)
                }
            }
        };
        if ok {
            return true;
        }

        // structurally different, but a stuck metavariable may still make
        // the sides equal once solved
        for stuck in [&stuck_lhs, &stuck_rhs] {
            if let Some(Expr::InferenceRef(var)) = stuck.as_deref() {
                if !self.norm.metas.is_solved(*var) {
                    let rhs = self.rename(&rhs);
                    let source = self.norm.metas.source(*var);
                    return self.equations.add_equation(&lhs, &rhs, self.cmp, source, *var);
                }
            }
        }
        false
    }

    fn visit(&mut self, lhs: &ExprPtr, rhs: &ExprPtr) -> bool {
        match &**lhs {
            Expr::Var(binding1) => match &**rhs {
                Expr::Var(binding2) => match self.renaming.get(&binding2.id()) {
                    Some(mapped) => mapped == binding1,
                    None => binding1 == binding2,
                },
                _ => false,
            },
            Expr::InferenceRef(_) => false,
            Expr::App(..) => self.visit_app(lhs, rhs),
            Expr::Lam(_) => self.compare_lam(lhs, rhs, true),
            Expr::Pi(_) => self.visit_pi(lhs, rhs),
            Expr::Sigma(sigma1) => match &**rhs {
                Expr::Sigma(sigma2) => self.compare_parameters(&sigma1.params, &sigma2.params),
                _ => false,
            },
            Expr::Tuple(_) => self.compare_tuple(lhs, rhs, true),
            Expr::Proj(inner1, field1) => match &**rhs {
                Expr::Proj(inner2, field2) => field1 == field2 && self.compare(inner1, inner2),
                _ => false,
            },
            Expr::Universe(sort1) => match &**rhs {
                Expr::Universe(sort2) => {
                    compare_sorts(sort1, sort2, self.cmp, self.equations, self.source)
                }
                _ => false,
            },
            Expr::OfType(inner, _) => self.compare(inner, rhs),
            Expr::Error(_) => false,
            Expr::Let(_) => unreachable!("let expressions are unfolded before comparison"),
            Expr::Case(case1) => match &**rhs {
                Expr::Case(case2) => {
                    case1.args.len() == case2.args.len()
                        && case1
                            .args
                            .iter()
                            .zip(&case2.args)
                            .all(|(arg1, arg2)| self.compare(arg1, arg2))
                        && self.visit_trees(&case1.tree, &case2.tree)
                }
                _ => false,
            },
            Expr::FunCall(call1) => match &**rhs {
                Expr::FunCall(call2) if call1.fun == call2.fun => {
                    call1.args.len() == call2.args.len()
                        && call1
                            .args
                            .iter()
                            .zip(&call2.args)
                            .all(|(arg1, arg2)| self.compare(arg1, arg2))
                }
                _ => false,
            },
            Expr::ConCall(call1) => {
                if call1.con == self.norm.prelude.path_con && !matches!(&**rhs, Expr::ConCall(_)) {
                    return self.compare_path_eta(call1, rhs, true);
                }
                match &**rhs {
                    Expr::ConCall(call2) if call1.con == call2.con => {
                        call1.args.len() == call2.args.len()
                            && call1
                                .args
                                .iter()
                                .zip(&call2.args)
                                .all(|(arg1, arg2)| self.compare(arg1, arg2))
                    }
                    _ => false,
                }
            }
            Expr::DataCall(call1) => match &**rhs {
                Expr::DataCall(call2) if call1.data == call2.data => {
                    let orig_cmp = self.cmp;
                    let def = self.defs().data(call1.data);
                    call1.args.len() == call2.args.len()
                        && call1.args.iter().zip(&call2.args).enumerate().all(
                            |(index, (arg1, arg2))| {
                                self.cmp = if def.is_covariant(index) {
                                    orig_cmp
                                } else {
                                    Cmp::Eq
                                };
                                self.compare(arg1, arg2)
                            },
                        )
                }
                _ => false,
            },
            Expr::FieldCall(field1, inner1) => match &**rhs {
                Expr::FieldCall(field2, inner2) if field1 == field2 => {
                    let var = self
                        .norm
                        .metas
                        .as_unsolved(inner1)
                        .or_else(|| self.norm.metas.as_unsolved(inner2));
                    if let Some(var) = var {
                        let rhs = self.rename(rhs);
                        let source = self.norm.metas.source(var);
                        return self.equations.add_equation(lhs, &rhs, Cmp::Eq, source, var);
                    }
                    self.compare(inner1, inner2)
                }
                _ => false,
            },
            Expr::ClassCall(call1) => match &**rhs {
                Expr::ClassCall(call2) => self.visit_class_call(call1, call2),
                _ => false,
            },
            Expr::New(_) => false,
        }
    }

    fn visit_app(&mut self, lhs: &ExprPtr, rhs: &ExprPtr) -> bool {
        let (head1, args1) = Expr::app_spine(lhs);
        let (head2, args2) = Expr::app_spine(rhs);
        // a spine headed by an unsolved metavariable is deferred whole
        if let Some(var) = self.norm.metas.as_unsolved(head1) {
            let rhs = self.rename(rhs);
            let source = self.norm.metas.source(var);
            return self.equations.add_equation(lhs, &rhs, self.cmp, source, var);
        }
        if let Some(var) = self.norm.metas.as_unsolved(head2) {
            let rhs = self.rename(rhs);
            let source = self.norm.metas.source(var);
            return self.equations.add_equation(lhs, &rhs, self.cmp, source, var);
        }
        if args1.len() != args2.len() || !self.compare(head1, head2) {
            return false;
        }
        self.cmp = Cmp::Eq;
        args1
            .iter()
            .zip(&args2)
            .all(|(arg1, arg2)| self.compare(arg1, arg2))
    }

    fn visit_pi(&mut self, lhs: &ExprPtr, rhs: &ExprPtr) -> bool {
        let (pi1, pi2) = match (&**lhs, &**rhs) {
            (Expr::Pi(pi1), Expr::Pi(pi2)) => (pi1, pi2),
            _ => return false,
        };
        let orig_cmp = self.cmp;
        let bound = pi1.params.len().min(pi2.params.len());
        for index in 0..bound {
            self.cmp = Cmp::Eq;
            if !self.compare(pi1.params[index].ty(), pi2.params[index].ty()) {
                self.cmp = orig_cmp;
                return false;
            }
            self.renaming
                .insert(pi2.params[index].id(), pi1.params[index].clone());
        }
        self.cmp = orig_cmp;
        let codomain1 = if pi1.params.len() > bound {
            Expr::pi(pi1.sort, pi1.params[bound..].to_vec(), pi1.codomain.clone())
        } else {
            pi1.codomain.clone()
        };
        let codomain2 = if pi2.params.len() > bound {
            Expr::pi(pi2.sort, pi2.params[bound..].to_vec(), pi2.codomain.clone())
        } else {
            pi2.codomain.clone()
        };
        self.compare(&codomain1, &codomain2)
    }

    fn compare_parameters(&mut self, params1: &[Binding], params2: &[Binding]) -> bool {
        if params1.len() != params2.len() {
            return false;
        }
        for (param1, param2) in params1.iter().zip(params2) {
            if !self.compare(param1.ty(), param2.ty()) {
                return false;
            }
            self.renaming.insert(param2.id(), param1.clone());
        }
        true
    }

    /// Compare a lambda with another term, eta-expanding as needed.
    /// `lam_side` is the left-hand side exactly when `correct_order` holds.
    fn compare_lam(&mut self, lam_side: &ExprPtr, other: &ExprPtr, correct_order: bool) -> bool {
        let (params_a, mut body_a) = strip_lams(lam_side);
        let (params_b, mut body_b) = strip_lams(other);
        let bound = params_a.len().min(params_b.len());
        for index in 0..bound {
            if correct_order {
                self.renaming
                    .insert(params_b[index].id(), params_a[index].clone());
            } else {
                self.renaming
                    .insert(params_a[index].id(), params_b[index].clone());
            }
        }
        if params_a.len() > bound {
            body_b = Expr::apps(body_b, params_a[bound..].iter().map(Expr::var));
        }
        if params_b.len() > bound {
            body_a = Expr::apps(body_a, params_b[bound..].iter().map(Expr::var));
        }
        if correct_order {
            self.compare(&body_a, &body_b)
        } else {
            self.compare(&body_b, &body_a)
        }
    }

    /// Compare a tuple with another term, falling back to component-wise
    /// projections when the other side is not a tuple.
    fn compare_tuple(&mut self, tuple_side: &ExprPtr, other: &ExprPtr, correct_order: bool) -> bool {
        let tuple = match &**tuple_side {
            Expr::Tuple(tuple) => tuple,
            _ => return false,
        };
        if let Expr::Tuple(other_tuple) = &**other {
            return tuple.fields.len() == other_tuple.fields.len()
                && tuple
                    .fields
                    .iter()
                    .zip(&other_tuple.fields)
                    .all(|(field1, field2)| {
                        if correct_order {
                            self.compare(field1, field2)
                        } else {
                            self.compare(field2, field1)
                        }
                    });
        }
        tuple.fields.iter().enumerate().all(|(index, field)| {
            let projection = Expr::proj(other.clone(), index);
            if correct_order {
                self.compare(field, &projection)
            } else {
                self.compare(&projection, field)
            }
        })
    }

    /// Eta for paths: `path f = p` reduces to comparing `f` with
    /// `\lam i => p @ i`.
    fn compare_path_eta(
        &mut self,
        call: &ConCallExpr,
        other: &ExprPtr,
        correct_order: bool,
    ) -> bool {
        let i = Binding::new(
            Some(crate::symbol::Symbol::intern_static("i")),
            self.norm.prelude.interval_type(self.defs()),
        );
        let mut args = call.data_args.clone();
        args.push(other.clone());
        args.push(Expr::var(&i));
        let at_call = Expr::fun_call(self.defs(), self.norm.prelude.at, call.sort, args);
        let lam = Expr::lam(call.sort, vec![i], at_call);
        if correct_order {
            self.compare(&call.args[0], &lam)
        } else {
            self.compare(&lam, &call.args[0])
        }
    }

    /// Eta for fully-implemented class calls: every inhabitant is equal to
    /// the record of the call's implementations.
    fn compare_unit(&mut self, call: &ClassCallExpr, other: &ExprPtr, correct_order: bool) -> bool {
        if let Expr::New(new_call) = &**other {
            if self.defs().is_subclass_of(new_call.class, call.class) {
                return true;
            }
        }
        let orig_cmp = self.cmp;
        self.cmp = Cmp::Eq;
        let implemented: Vec<(crate::core::FieldId, ExprPtr)> = call
            .implementations
            .iter()
            .map(|(field, term)| (*field, term.clone()))
            .chain(
                self.defs()
                    .class(call.class)
                    .implemented
                    .iter()
                    .map(|(field, implementation)| (*field, implementation.term.clone())),
            )
            .collect();
        for (field, term) in implemented {
            let projection = Expr::field_call(self.defs(), field, other.clone());
            let ok = if correct_order {
                self.compare(&term, &projection)
            } else {
                self.compare(&projection, &term)
            };
            if !ok {
                self.cmp = orig_cmp;
                return false;
            }
        }
        self.cmp = orig_cmp;
        true
    }

    fn visit_class_call(&mut self, call1: &ClassCallExpr, call2: &ClassCallExpr) -> bool {
        let cmp = self.cmp;
        let subclass_ok = (cmp == Cmp::Le || self.defs().is_subclass_of(call2.class, call1.class))
            && (cmp == Cmp::Ge || self.defs().is_subclass_of(call1.class, call2.class));
        if !subclass_ok {
            return false;
        }
        if cmp != Cmp::Le && !self.implementations_cover(call2, call1) {
            return false;
        }
        if cmp != Cmp::Ge && !self.implementations_cover(call1, call2) {
            return false;
        }
        true
    }

    /// Does `from` implement, with equal values, every field `to` does?
    fn implementations_cover(&mut self, from: &ClassCallExpr, to: &ClassCallExpr) -> bool {
        let fields: Vec<crate::core::FieldId> = to.implementations.keys().copied().collect();
        for field in fields {
            let term_to = to.implementations[&field].clone();
            let term_from = match from.implementations.get(&field) {
                Some(term) => term.clone(),
                None => return false,
            };
            let orig_cmp = self.cmp;
            self.cmp = Cmp::Eq;
            let ok = self.compare(&term_from, &term_to);
            self.cmp = orig_cmp;
            if !ok {
                return false;
            }
        }
        true
    }

    fn visit_trees(&mut self, t1: &ElimTree, t2: &ElimTree) -> bool {
        match (t1, t2) {
            (ElimTree::Leaf(leaf1), ElimTree::Leaf(leaf2)) => {
                self.compare_parameters(&leaf1.params, &leaf2.params)
                    && self.compare(&leaf1.body, &leaf2.body)
            }
            (ElimTree::Branch(branch1), ElimTree::Branch(branch2)) => {
                if !self.compare_parameters(&branch1.params, &branch2.params)
                    || branch1.children.len() != branch2.children.len()
                {
                    return false;
                }
                for (key, child1) in &branch1.children {
                    match branch2.children.get(key) {
                        Some(child2) => {
                            if !self.visit_trees(child1, child2) {
                                return false;
                            }
                        }
                        None => return false,
                    }
                }
                true
            }
            _ => false,
        }
    }
}

fn strip_lams(expr: &ExprPtr) -> (Vec<Binding>, ExprPtr) {
    let mut params = Vec::new();
    let mut body = expr.clone();
    loop {
        let next = match &*body {
            Expr::Lam(lam) => {
                params.extend(lam.params.iter().cloned());
                lam.body.clone()
            }
            _ => break,
        };
        body = next;
    }
    (params, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::def::{
        ClassDef, Definitions, FieldDef, Status,
    };
    use crate::core::prelude::Prelude;
    use crate::core::sort::Sort;
    use crate::elaboration::MetaVars;
    use crate::symbol::Symbol;

    fn setup() -> (Definitions, Prelude, MetaVars) {
        let mut defs = Definitions::new();
        let prelude = Prelude::new(&mut defs);
        (defs, prelude, MetaVars::new())
    }

    fn eq(norm: &Normalizer<'_>, lhs: &ExprPtr, rhs: &ExprPtr) -> bool {
        compare(
            norm,
            &mut DummyEquations,
            Cmp::Eq,
            lhs,
            rhs,
            SourceNode::SYNTHETIC,
        )
    }

    #[test]
    fn alpha_equivalence_of_pi_types() {
        let (defs, prelude, metas) = setup();
        let norm = Normalizer::new(&defs, &metas, &prelude);
        let nat = Expr::data_call(&defs, prelude.nat, Sort::SET0, vec![]);

        let x = Binding::new(Some(Symbol::intern("x")), nat.clone());
        let y = Binding::new(Some(Symbol::intern("y")), nat.clone());
        let pi1 = Expr::pi(Sort::SET0, vec![x.clone()], Expr::var(&x));
        let pi2 = Expr::pi(Sort::SET0, vec![y.clone()], Expr::var(&y));
        assert!(eq(&norm, &pi1, &pi2));

        let constant = Expr::pi(Sort::SET0, vec![Binding::new(None, nat.clone())], nat);
        assert!(!eq(&norm, &pi1, &constant));
    }

    #[test]
    fn multi_parameter_pi_matches_nested_pi() {
        let (defs, prelude, metas) = setup();
        let norm = Normalizer::new(&defs, &metas, &prelude);
        let nat = Expr::data_call(&defs, prelude.nat, Sort::SET0, vec![]);

        let x1 = Binding::new(None, nat.clone());
        let y1 = Binding::new(None, nat.clone());
        let flat = Expr::pi(Sort::SET0, vec![x1, y1], nat.clone());

        let x2 = Binding::new(None, nat.clone());
        let y2 = Binding::new(None, nat.clone());
        let nested = Expr::pi(
            Sort::SET0,
            vec![x2],
            Expr::pi(Sort::SET0, vec![y2], nat.clone()),
        );
        assert!(eq(&norm, &flat, &nested));
    }

    #[test]
    fn lambda_eta() {
        let (defs, prelude, metas) = setup();
        let norm = Normalizer::new(&defs, &metas, &prelude);
        let nat = Expr::data_call(&defs, prelude.nat, Sort::SET0, vec![]);

        let arrow = {
            let param = Binding::new(None, nat.clone());
            Expr::pi(Sort::SET0, vec![param], nat.clone())
        };
        let f = Binding::new(Some(Symbol::intern("f")), arrow);
        let x = Binding::new(Some(Symbol::intern("x")), nat);
        let expanded = Expr::lam(
            Sort::SET0,
            vec![x.clone()],
            Expr::app(Expr::var(&f), Expr::var(&x)),
        );
        assert!(eq(&norm, &expanded, &Expr::var(&f)));
        assert!(eq(&norm, &Expr::var(&f), &expanded));
    }

    #[test]
    fn tuple_eta() {
        let (defs, prelude, metas) = setup();
        let norm = Normalizer::new(&defs, &metas, &prelude);
        let nat = Expr::data_call(&defs, prelude.nat, Sort::SET0, vec![]);

        let sigma = Expr::sigma(
            Sort::SET0,
            vec![Binding::new(None, nat.clone()), Binding::new(None, nat.clone())],
        );
        let p = Binding::new(Some(Symbol::intern("p")), sigma.clone());
        let expanded = Expr::tuple(
            vec![
                Expr::proj(Expr::var(&p), 0),
                Expr::proj(Expr::var(&p), 1),
            ],
            sigma,
        );
        assert!(eq(&norm, &expanded, &Expr::var(&p)));
        assert!(eq(&norm, &Expr::var(&p), &expanded));
    }

    #[test]
    fn path_eta() {
        let (defs, prelude, metas) = setup();
        let norm = Normalizer::new(&defs, &metas, &prelude);

        let line = Binding::new(Some(Symbol::intern("A")), Expr::universe(Sort::STD));
        let start = Binding::new(Some(Symbol::intern("a")), Expr::universe(Sort::STD));
        let end = Binding::new(Some(Symbol::intern("a'")), Expr::universe(Sort::STD));
        let data_args = vec![Expr::var(&line), Expr::var(&start), Expr::var(&end)];
        let p = Binding::new(
            Some(Symbol::intern("p")),
            Expr::data_call(&defs, prelude.path, Sort::STD, data_args.clone()),
        );

        let i = Binding::new(Some(Symbol::intern("i")), prelude.interval_type(&defs));
        let mut at_args = data_args.clone();
        at_args.push(Expr::var(&p));
        at_args.push(Expr::var(&i));
        let expanded = Expr::con_call(
            &defs,
            prelude.path_con,
            Sort::STD,
            data_args,
            vec![Expr::lam(
                Sort::STD,
                vec![i],
                Expr::fun_call(&defs, prelude.at, Sort::STD, at_args),
            )],
        );
        assert!(eq(&norm, &expanded, &Expr::var(&p)));
        assert!(eq(&norm, &Expr::var(&p), &expanded));
    }

    #[test]
    fn unit_class_calls_compare_by_fields() {
        let (mut defs, prelude, metas) = setup();
        let class = defs.add_class(ClassDef {
            name: Symbol::intern("Pointed"),
            fields: Vec::new(),
            superclasses: Vec::new(),
            implemented: fxhash::FxHashMap::default(),
            sort: Sort::STD,
            status: Status::NoErrors,
        });
        let this_binding = Binding::new(
            Some(Symbol::intern("this")),
            Expr::class_call(&defs, class, Sort::STD, fxhash::FxHashMap::default()),
        );
        let nat = Expr::data_call(&defs, prelude.nat, Sort::SET0, vec![]);
        let point = defs.add_field(FieldDef {
            name: Symbol::intern("point"),
            class,
            this_binding,
            ty: nat.clone(),
            status: Status::NoErrors,
        });
        let norm = Normalizer::new(&defs, &metas, &prelude);

        let call_with = |value: ExprPtr| {
            let mut implementations = fxhash::FxHashMap::default();
            implementations.insert(point, value);
            ClassCallExpr {
                class,
                sort: Sort::STD,
                implementations,
            }
        };
        let two = call_with(prelude.nat_literal(&defs, 2));
        let record = Binding::new(
            Some(Symbol::intern("r")),
            std::sync::Arc::new(Expr::ClassCall(two.clone())),
        );

        // any inhabitant of a fully implemented class equals its record
        assert!(eq(&norm, &Expr::var(&record), &Expr::new_expr(two.clone())));
        assert!(eq(&norm, &Expr::new_expr(two.clone()), &Expr::var(&record)));

        let three = call_with(prelude.nat_literal(&defs, 3));
        assert!(!eq(
            &norm,
            &Expr::new_expr(three),
            &Expr::new_expr(two)
        ));
    }

    #[test]
    fn class_call_subtyping_by_implementations() {
        let (mut defs, prelude, metas) = setup();
        let class = defs.add_class(ClassDef {
            name: Symbol::intern("Pointed"),
            fields: Vec::new(),
            superclasses: Vec::new(),
            implemented: fxhash::FxHashMap::default(),
            sort: Sort::STD,
            status: Status::NoErrors,
        });
        let this_binding = Binding::new(
            Some(Symbol::intern("this")),
            Expr::class_call(&defs, class, Sort::STD, fxhash::FxHashMap::default()),
        );
        let nat = Expr::data_call(&defs, prelude.nat, Sort::SET0, vec![]);
        let point = defs.add_field(FieldDef {
            name: Symbol::intern("point"),
            class,
            this_binding,
            ty: nat,
            status: Status::NoErrors,
        });
        let norm = Normalizer::new(&defs, &metas, &prelude);

        let bare = Expr::class_call(&defs, class, Sort::STD, fxhash::FxHashMap::default());
        let mut implementations = fxhash::FxHashMap::default();
        implementations.insert(point, prelude.nat_literal(&defs, 2));
        let implemented = Expr::class_call(&defs, class, Sort::STD, implementations);

        // implementing more fields makes the type smaller
        assert!(compare(
            &norm,
            &mut DummyEquations,
            Cmp::Le,
            &implemented,
            &bare,
            SourceNode::SYNTHETIC,
        ));
        assert!(!compare(
            &norm,
            &mut DummyEquations,
            Cmp::Le,
            &bare,
            &implemented,
            SourceNode::SYNTHETIC,
        ));
    }

    #[test]
    fn universe_cumulativity() {
        let (defs, prelude, metas) = setup();
        let norm = Normalizer::new(&defs, &metas, &prelude);
        let small = Expr::universe(Sort::SET0);
        let big = Expr::universe(Sort::SET0.succ());
        let le = |lhs: &ExprPtr, rhs: &ExprPtr| {
            compare(
                &norm,
                &mut DummyEquations,
                Cmp::Le,
                lhs,
                rhs,
                SourceNode::SYNTHETIC,
            )
        };
        assert!(le(&small, &big));
        assert!(!le(&big, &small));
        assert!(eq(&norm, &small, &small));
        // propositions sit below every other sort
        assert!(le(&Expr::universe(Sort::PROP), &small));
    }

    #[test]
    fn errors_compare_with_anything() {
        let (defs, prelude, metas) = setup();
        let norm = Normalizer::new(&defs, &metas, &prelude);
        let error = Expr::error(None);
        let two = prelude.nat_literal(&defs, 2);
        assert!(eq(&norm, &error, &two));
        assert!(eq(&norm, &two, &error));
    }

    #[test]
    fn stuck_metavariables_defer_equations() {
        struct Recording(Vec<MetaVar>);
        impl EquationSink for Recording {
            fn add_equation(
                &mut self,
                _lhs: &ExprPtr,
                _rhs: &ExprPtr,
                _cmp: Cmp,
                _source: SourceNode,
                stuck: MetaVar,
            ) -> bool {
                self.0.push(stuck);
                true
            }
            fn add_levels(&mut self, _: &Level, _: &Level, _: Cmp, _: SourceNode) -> bool {
                true
            }
        }

        let (defs, prelude, metas) = setup();
        let norm = Normalizer::new(&defs, &metas, &prelude);
        let nat = Expr::data_call(&defs, prelude.nat, Sort::SET0, vec![]);
        let var = metas.fresh(
            Symbol::intern("n"),
            nat,
            SourceNode::SYNTHETIC,
            rpds::HashTrieSet::new(),
        );

        let mut sink = Recording(Vec::new());
        let ok = compare(
            &norm,
            &mut sink,
            Cmp::Eq,
            &Expr::inference_ref(var),
            &prelude.nat_literal(&defs, 2),
            SourceNode::SYNTHETIC,
        );
        assert!(ok, "deferred comparisons succeed optimistically");
        assert_eq!(sink.0, vec![var]);

        // the dummy sink instead refuses
        assert!(!eq(
            &norm,
            &Expr::inference_ref(var),
            &prelude.nat_literal(&defs, 2)
        ));
    }
}
