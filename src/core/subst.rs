//! Capture-avoiding substitution.
//!
//! Binding ids are globally unique, so substitution never captures: when a
//! substitution passes under a binder it allocates a fresh binding for it
//! and extends itself with an `old -> new` entry. The original term is left
//! untouched; applying a substitution always rebuilds the affected spine.

use fxhash::FxHashMap;

use crate::core::elim::{BranchElimTree, ElimTree, LeafElimTree};
use crate::core::sort::{Level, LevelVariable, Sort};
use crate::core::{
    Binding, BindingId, CaseExpr, ClassCallExpr, ConCallExpr, DataCallExpr, Expr, ExprPtr,
    FunCallExpr, LetClause, LetExpr,
};

/// A map from level variables to levels.
#[derive(Debug, Clone, Default)]
pub struct LevelSubstitution {
    map: FxHashMap<LevelVariable, Level>,
}

impl LevelSubstitution {
    pub fn new() -> LevelSubstitution {
        LevelSubstitution::default()
    }

    /// The substitution instantiating the polymorphic levels of a
    /// definition with the levels of a call's sort argument.
    pub fn std(sort: &Sort) -> LevelSubstitution {
        let mut subst = LevelSubstitution::new();
        subst.map.insert(LevelVariable::P, sort.p);
        subst.map.insert(LevelVariable::H, sort.h);
        subst
    }

    pub fn add(&mut self, var: LevelVariable, level: Level) {
        self.map.insert(var, level);
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get(&self, var: LevelVariable) -> Option<Level> {
        self.map.get(&var).copied()
    }
}

impl Level {
    pub fn subst(&self, subst: &LevelSubstitution) -> Level {
        let var = match self.var() {
            Some(var) => var,
            None => return *self,
        };
        let mapped = match subst.get(var) {
            Some(level) => level,
            None => return *self,
        };
        if mapped.is_infinity() {
            return Level::INFINITY;
        }
        let shifted = mapped.add(self.constant());
        match shifted.var() {
            Some(v) => Level::with_max(
                v,
                shifted.constant(),
                shifted.max_constant().max(self.max_constant()),
            ),
            None => Level::closed(shifted.constant().max(self.max_constant())),
        }
    }
}

impl Sort {
    pub fn subst(&self, subst: &LevelSubstitution) -> Sort {
        Sort::new(self.p.subst(subst), self.h.subst(subst))
    }
}

/// A simultaneous substitution of terms for bindings and levels for level
/// variables.
#[derive(Debug, Clone, Default)]
pub struct Substitution {
    exprs: FxHashMap<BindingId, ExprPtr>,
    levels: LevelSubstitution,
}

impl Substitution {
    pub fn new() -> Substitution {
        Substitution::default()
    }

    pub fn single(binding: &Binding, expr: ExprPtr) -> Substitution {
        let mut subst = Substitution::new();
        subst.add(binding, expr);
        subst
    }

    pub fn from_levels(levels: LevelSubstitution) -> Substitution {
        Substitution {
            exprs: FxHashMap::default(),
            levels,
        }
    }

    pub fn add(&mut self, binding: &Binding, expr: ExprPtr) {
        self.exprs.insert(binding.id(), expr);
    }

    pub fn add_id(&mut self, binding: BindingId, expr: ExprPtr) {
        self.exprs.insert(binding, expr);
    }

    /// Add `binding -> expr` and rewrite occurrences of the binding inside
    /// values already present, so chains of entries stay fully resolved.
    pub fn compose(&mut self, binding: &Binding, expr: ExprPtr) {
        let mut single = Substitution::single(binding, expr.clone());
        for value in self.exprs.values_mut() {
            if value.find_binding(binding.id()) {
                *value = single.apply(value);
            }
        }
        self.add(binding, expr);
    }

    pub fn remove(&mut self, binding: &Binding) {
        self.exprs.remove(&binding.id());
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty() && self.levels.is_empty()
    }

    fn sort(&self, sort: &Sort) -> Sort {
        sort.subst(&self.levels)
    }

    /// Apply the substitution. Binders encountered along the way are
    /// freshened and the substitution is extended to redirect their old
    /// occurrences, so the substitution accumulates entries as it is used.
    pub fn apply(&mut self, expr: &ExprPtr) -> ExprPtr {
        match &**expr {
            Expr::Var(binding) => match self.exprs.get(&binding.id()) {
                Some(mapped) => mapped.clone(),
                None => expr.clone(),
            },
            Expr::InferenceRef(_) => expr.clone(),
            Expr::App(fun, arg) => {
                let fun = self.apply(fun);
                let arg = self.apply(arg);
                Expr::app(fun, arg)
            }
            Expr::Lam(lam) => {
                let sort = self.sort(&lam.sort);
                let params = self.apply_bindings(&lam.params);
                let body = self.apply(&lam.body);
                Expr::lam(sort, params, body)
            }
            Expr::Pi(pi) => {
                let sort = self.sort(&pi.sort);
                let params = self.apply_bindings(&pi.params);
                let codomain = self.apply(&pi.codomain);
                Expr::pi(sort, params, codomain)
            }
            Expr::Sigma(sigma) => {
                let sort = self.sort(&sigma.sort);
                let params = self.apply_bindings(&sigma.params);
                Expr::sigma(sort, params)
            }
            Expr::Tuple(tuple) => {
                let fields = self.apply_all(&tuple.fields);
                let sigma_type = self.apply(&tuple.sigma_type);
                Expr::tuple(fields, sigma_type)
            }
            Expr::Proj(inner, field) => Expr::proj(self.apply(inner), *field),
            Expr::Universe(sort) => Expr::universe(self.sort(sort)),
            Expr::OfType(inner, ty) => {
                let inner = self.apply(inner);
                let ty = self.apply(ty);
                Expr::of_type(inner, ty)
            }
            Expr::Error(inner) => Expr::error(inner.as_ref().map(|inner| self.apply(inner))),
            Expr::Let(let_expr) => {
                let clauses = let_expr
                    .clauses
                    .iter()
                    .map(|clause| {
                        let expr = self.apply(&clause.expr);
                        let binding = self.apply_binding(&clause.binding);
                        LetClause { binding, expr }
                    })
                    .collect();
                let body = self.apply(&let_expr.body);
                Expr::let_in(clauses, body)
            }
            Expr::Case(case) => {
                let args = self.apply_all(&case.args);
                let params = self.apply_bindings(&case.params);
                let result_type = self.apply(&case.result_type);
                let tree = self.apply_tree(&case.tree);
                std::sync::Arc::new(Expr::Case(CaseExpr {
                    params,
                    result_type,
                    tree,
                    args,
                }))
            }
            Expr::FunCall(call) => std::sync::Arc::new(Expr::FunCall(FunCallExpr {
                fun: call.fun,
                sort: self.sort(&call.sort),
                args: self.apply_all(&call.args),
            })),
            Expr::ConCall(call) => std::sync::Arc::new(Expr::ConCall(ConCallExpr {
                con: call.con,
                sort: self.sort(&call.sort),
                data_args: self.apply_all(&call.data_args),
                args: self.apply_all(&call.args),
            })),
            Expr::DataCall(call) => std::sync::Arc::new(Expr::DataCall(DataCallExpr {
                data: call.data,
                sort: self.sort(&call.sort),
                args: self.apply_all(&call.args),
            })),
            Expr::FieldCall(field, inner) => {
                std::sync::Arc::new(Expr::FieldCall(*field, self.apply(inner)))
            }
            Expr::ClassCall(call) => std::sync::Arc::new(Expr::ClassCall(self.apply_class(call))),
            Expr::New(call) => std::sync::Arc::new(Expr::New(self.apply_class(call))),
        }
    }

    pub fn apply_all(&mut self, exprs: &[ExprPtr]) -> Vec<ExprPtr> {
        exprs.iter().map(|expr| self.apply(expr)).collect()
    }

    fn apply_class(&mut self, call: &ClassCallExpr) -> ClassCallExpr {
        ClassCallExpr {
            class: call.class,
            sort: self.sort(&call.sort),
            implementations: call
                .implementations
                .iter()
                .map(|(field, term)| (*field, self.apply(term)))
                .collect(),
        }
    }

    /// Freshen a single binding, redirecting its old occurrences to the
    /// fresh one.
    pub fn apply_binding(&mut self, binding: &Binding) -> Binding {
        let ty = self.apply(binding.ty());
        let fresh = Binding::with_plicity(binding.name(), ty, binding.is_explicit());
        self.add(binding, Expr::var(&fresh));
        fresh
    }

    /// Freshen a telescope left to right, so later types see the fresh
    /// earlier bindings.
    pub fn apply_bindings(&mut self, bindings: &[Binding]) -> Vec<Binding> {
        bindings
            .iter()
            .map(|binding| self.apply_binding(binding))
            .collect()
    }

    pub fn apply_tree(&mut self, tree: &ElimTree) -> ElimTree {
        match tree {
            ElimTree::Leaf(leaf) => {
                let params = self.apply_bindings(&leaf.params);
                let body = self.apply(&leaf.body);
                ElimTree::Leaf(LeafElimTree { params, body })
            }
            ElimTree::Branch(branch) => {
                let params = self.apply_bindings(&branch.params);
                let children = branch
                    .children
                    .iter()
                    .map(|(key, child)| (*key, self.apply_tree(child)))
                    .collect();
                ElimTree::Branch(BranchElimTree { params, children })
            }
        }
    }
}

// Let bindings are eliminated during evaluation by substituting every
// clause into the body in order.
impl LetExpr {
    pub fn unfold(&self) -> ExprPtr {
        let mut subst = Substitution::new();
        for clause in &self.clauses {
            let expr = subst.apply(&clause.expr);
            subst.add(&clause.binding, expr);
        }
        subst.apply(&self.body)
    }
}
