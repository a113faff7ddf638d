//! Evaluation of core terms.
//!
//! [`Normalizer`] reduces terms in one of three modes:
//!
//! - [`Mode::Whnf`]: reduce until the head is no longer a redex.
//! - [`Mode::Nf`]: reduce everywhere, including under binders.
//! - [`Mode::Rnf`]: like [`Mode::Nf`] but without normalizing the arguments
//!   of stuck applications, which keeps error messages readable.
//!
//! Definition bodies unfold by running their elimination tree against the
//! call's arguments ([`Normalizer::eval_tree`]); a tree that gets stuck on
//! an argument leaves the call as a normal form. The evaluator can be
//! interrupted cooperatively through an [`AtomicBool`], unwinding with
//! [`Interrupted`].

use std::panic::panic_any;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::core::def::Definitions;
use crate::core::elim::{Body, ElimTree, IntervalElim};
use crate::core::prelude::Prelude;
use crate::core::sort::Sort;
use crate::core::subst::{LevelSubstitution, Substitution};
use crate::core::typing;
use crate::core::{Binding, ConCallExpr, Expr, ExprPtr, FunCallExpr};
use crate::elaboration::MetaVars;
use crate::symbol::Symbol;

/// How far to reduce.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Mode {
    Whnf,
    Nf,
    Rnf,
}

/// Panic payload used when evaluation is interrupted from another thread.
#[derive(Debug)]
pub struct Interrupted;

/// The evaluator. Holds the context evaluation needs: the definitions that
/// may unfold, the metavariable registry for chasing solutions, and the
/// prelude ids driving the interval and coercion rules.
#[derive(Copy, Clone)]
pub struct Normalizer<'a> {
    pub defs: &'a Definitions,
    pub metas: &'a MetaVars,
    pub prelude: &'a Prelude,
    interrupt: Option<&'a AtomicBool>,
}

impl<'a> Normalizer<'a> {
    pub fn new(defs: &'a Definitions, metas: &'a MetaVars, prelude: &'a Prelude) -> Normalizer<'a> {
        Normalizer {
            defs,
            metas,
            prelude,
            interrupt: None,
        }
    }

    pub fn with_interrupt(self, interrupt: &'a AtomicBool) -> Normalizer<'a> {
        Normalizer {
            interrupt: Some(interrupt),
            ..self
        }
    }

    fn check_interrupt(&self) {
        if let Some(flag) = self.interrupt {
            if flag.load(Ordering::Relaxed) {
                panic_any(Interrupted);
            }
        }
    }

    pub fn whnf(&self, expr: &ExprPtr) -> ExprPtr {
        self.normalize(expr, Mode::Whnf)
    }

    pub fn nf(&self, expr: &ExprPtr) -> ExprPtr {
        self.normalize(expr, Mode::Nf)
    }

    pub fn rnf(&self, expr: &ExprPtr) -> ExprPtr {
        self.normalize(expr, Mode::Rnf)
    }

    pub fn normalize(&self, expr: &ExprPtr, mode: Mode) -> ExprPtr {
        match &**expr {
            Expr::Var(_) | Expr::Universe(_) | Expr::Error(None) => expr.clone(),
            Expr::InferenceRef(var) => match self.metas.solution(*var) {
                Some(solution) => self.normalize(&solution, mode),
                None => expr.clone(),
            },
            Expr::App(..) => self.visit_app(expr, mode),
            Expr::Lam(lam) => match mode {
                Mode::Whnf => expr.clone(),
                Mode::Nf => Expr::lam(lam.sort, lam.params.clone(), self.normalize(&lam.body, mode)),
                Mode::Rnf => {
                    let mut subst = Substitution::new();
                    let params = self.normalize_bindings(&lam.params, &mut subst, mode);
                    let body = self.normalize(&subst.apply(&lam.body), mode);
                    Expr::lam(lam.sort, params, body)
                }
            },
            Expr::Pi(pi) => match mode {
                Mode::Whnf => expr.clone(),
                Mode::Nf | Mode::Rnf => {
                    let mut subst = Substitution::new();
                    let params = self.normalize_bindings(&pi.params, &mut subst, mode);
                    let codomain = self.normalize(&subst.apply(&pi.codomain), mode);
                    Expr::pi(pi.sort, params, codomain)
                }
            },
            Expr::Sigma(sigma) => match mode {
                Mode::Whnf => expr.clone(),
                Mode::Nf | Mode::Rnf => {
                    let mut subst = Substitution::new();
                    let params = self.normalize_bindings(&sigma.params, &mut subst, mode);
                    Expr::sigma(sigma.sort, params)
                }
            },
            Expr::Tuple(tuple) => match mode {
                Mode::Whnf => expr.clone(),
                Mode::Nf | Mode::Rnf => {
                    let fields = tuple
                        .fields
                        .iter()
                        .map(|field| self.normalize(field, mode))
                        .collect();
                    Expr::tuple(fields, tuple.sigma_type.clone())
                }
            },
            Expr::Proj(inner, field) => {
                let inner_whnf = self.whnf(inner);
                if let Expr::Tuple(tuple) = &*inner_whnf {
                    return self.normalize(&tuple.fields[*field], mode);
                }
                match mode {
                    Mode::Whnf => Expr::proj(inner_whnf, *field),
                    Mode::Nf | Mode::Rnf => Expr::proj(self.normalize(&inner_whnf, mode), *field),
                }
            }
            Expr::OfType(inner, ty) => match mode {
                Mode::Nf => Expr::of_type(self.normalize(inner, mode), ty.clone()),
                Mode::Whnf | Mode::Rnf => self.normalize(inner, mode),
            },
            Expr::Error(Some(inner)) => match mode {
                Mode::Whnf => expr.clone(),
                Mode::Nf | Mode::Rnf => Expr::error(Some(self.normalize(inner, mode))),
            },
            Expr::Let(let_expr) => self.normalize(&let_expr.unfold(), mode),
            Expr::Case(case) => {
                if let Some(result) = self.eval_tree(&case.tree, &case.args, Substitution::new()) {
                    return self.normalize(&result, mode);
                }
                match mode {
                    Mode::Whnf | Mode::Rnf => expr.clone(),
                    Mode::Nf => {
                        let args = case
                            .args
                            .iter()
                            .map(|arg| self.normalize(arg, mode))
                            .collect();
                        let mut subst = Substitution::new();
                        let params = self.normalize_bindings(&case.params, &mut subst, mode);
                        let result_type = self.normalize(&subst.apply(&case.result_type), mode);
                        let tree = self.normalize_tree(&subst.apply_tree(&case.tree));
                        Expr::case(params, result_type, tree, args)
                    }
                }
            }
            Expr::FunCall(call) => self.visit_fun_call(call, expr, mode),
            Expr::ConCall(call) => self.visit_con_call(call, expr, mode),
            Expr::DataCall(call) => match mode {
                Mode::Whnf => expr.clone(),
                Mode::Nf | Mode::Rnf => Expr::data_call(
                    self.defs,
                    call.data,
                    call.sort,
                    call.args.iter().map(|arg| self.normalize(arg, mode)).collect(),
                ),
            },
            Expr::FieldCall(field, inner) => self.visit_field_call(*field, inner, expr, mode),
            Expr::ClassCall(call) => match mode {
                Mode::Whnf => expr.clone(),
                Mode::Nf | Mode::Rnf => {
                    let mut call = call.clone();
                    for term in call.implementations.values_mut() {
                        *term = self.normalize(term, mode);
                    }
                    std::sync::Arc::new(Expr::ClassCall(call))
                }
            },
            Expr::New(call) => match mode {
                Mode::Whnf => expr.clone(),
                Mode::Nf | Mode::Rnf => {
                    let mut call = call.clone();
                    for term in call.implementations.values_mut() {
                        *term = self.normalize(term, mode);
                    }
                    Expr::new_expr(call)
                }
            },
        }
    }

    /// Freshen a telescope, normalizing the binding types.
    fn normalize_bindings(
        &self,
        params: &[Binding],
        subst: &mut Substitution,
        mode: Mode,
    ) -> Vec<Binding> {
        params
            .iter()
            .map(|param| {
                let ty = self.normalize(&subst.apply(param.ty()), mode);
                let fresh = Binding::with_plicity(param.name(), ty, param.is_explicit());
                subst.add(param, Expr::var(&fresh));
                fresh
            })
            .collect()
    }

    fn normalize_tree(&self, tree: &ElimTree) -> ElimTree {
        match tree {
            ElimTree::Leaf(leaf) => ElimTree::Leaf(crate::core::elim::LeafElimTree {
                params: leaf.params.clone(),
                body: self.nf(&leaf.body),
            }),
            ElimTree::Branch(branch) => ElimTree::Branch(crate::core::elim::BranchElimTree {
                params: branch.params.clone(),
                children: branch
                    .children
                    .iter()
                    .map(|(key, child)| (*key, self.normalize_tree(child)))
                    .collect(),
            }),
        }
    }

    fn visit_app(&self, expr: &ExprPtr, mode: Mode) -> ExprPtr {
        let (head, args) = Expr::app_spine(expr);
        let fun = self.whnf(head);
        if let Expr::Lam(lam) = &*fun {
            let args: Vec<ExprPtr> = args.into_iter().cloned().collect();
            let result = beta_reduce(lam, &args);
            return self.normalize(&result, mode);
        }
        match mode {
            Mode::Whnf => Expr::apps(fun, args.into_iter().cloned()),
            Mode::Rnf => Expr::apps(self.normalize(&fun, mode), args.into_iter().cloned()),
            Mode::Nf => Expr::apps(
                self.normalize(&fun, mode),
                args.into_iter().map(|arg| self.normalize(arg, mode)),
            ),
        }
    }

    fn visit_fun_call(&self, call: &FunCallExpr, expr: &ExprPtr, mode: Mode) -> ExprPtr {
        let def = self.defs.function(call.fun);
        if !def.status.body_ok() {
            return self.apply_fun_call(call, expr, mode);
        }
        if call.fun == self.prelude.coerce {
            if let Some(result) = self.normalize_coerce(call) {
                return self.normalize(&result, mode);
            }
        }
        let levels = LevelSubstitution::std(&call.sort);
        match &def.body {
            None => self.apply_fun_call(call, expr, mode),
            Some(Body::Tree(tree)) => {
                match self.eval_tree(tree, &call.args, Substitution::from_levels(levels)) {
                    Some(result) => self.normalize(&result, mode),
                    None => self.apply_fun_call(call, expr, mode),
                }
            }
            Some(Body::Interval(elim)) => self.eval_interval(
                elim,
                &call.args,
                Substitution::from_levels(levels),
                expr,
                mode,
            ),
        }
    }

    fn apply_fun_call(&self, call: &FunCallExpr, expr: &ExprPtr, mode: Mode) -> ExprPtr {
        match mode {
            Mode::Whnf => expr.clone(),
            Mode::Nf | Mode::Rnf => Expr::fun_call(
                self.defs,
                call.fun,
                call.sort,
                call.args.iter().map(|arg| self.normalize(arg, mode)).collect(),
            ),
        }
    }

    fn visit_con_call(&self, call: &ConCallExpr, expr: &ExprPtr, mode: Mode) -> ExprPtr {
        let def = self.defs.constructor(call.con);

        // Arguments instantiating not-yet-supplied data parameters are moved
        // out of the argument list first.
        let missing = def.data_params.len().saturating_sub(call.data_args.len());
        let call_storage;
        let call = if missing > 0 && call.args.len() >= missing {
            let mut moved = call.clone();
            let rest = moved.args.split_off(missing);
            moved.data_args.extend(std::mem::replace(&mut moved.args, rest));
            call_storage = moved;
            &call_storage
        } else {
            call
        };

        if !def.status.body_ok() {
            return self.apply_con_call(call, expr, mode);
        }

        let body = match &def.body {
            Some(body) => body,
            None => return self.apply_con_call(call, expr, mode),
        };
        let mut subst = Substitution::from_levels(LevelSubstitution::std(&call.sort));
        for (param, arg) in def.data_params.iter().zip(&call.data_args) {
            subst.add(param, arg.clone());
        }
        match body {
            Body::Tree(tree) => match self.eval_tree(tree, &call.args, subst) {
                Some(result) => self.normalize(&result, mode),
                None => self.apply_con_call(call, expr, mode),
            },
            Body::Interval(elim) => self.eval_interval(elim, &call.args, subst, expr, mode),
        }
    }

    fn apply_con_call(&self, call: &ConCallExpr, expr: &ExprPtr, mode: Mode) -> ExprPtr {
        match mode {
            Mode::Whnf => {
                if let Expr::ConCall(original) = &**expr {
                    if original.data_args.len() == call.data_args.len() {
                        return expr.clone();
                    }
                }
                std::sync::Arc::new(Expr::ConCall(call.clone()))
            }
            Mode::Nf | Mode::Rnf => Expr::con_call(
                self.defs,
                call.con,
                call.sort,
                call.data_args
                    .iter()
                    .map(|arg| self.normalize(arg, mode))
                    .collect(),
                call.args.iter().map(|arg| self.normalize(arg, mode)).collect(),
            ),
        }
    }

    fn visit_field_call(
        &self,
        field: crate::core::FieldId,
        inner: &ExprPtr,
        expr: &ExprPtr,
        mode: Mode,
    ) -> ExprPtr {
        let def = self.defs.field(field);
        if def.status.body_ok() {
            let this_expr = self.whnf(inner);
            // A metavariable standing for an instance is left for the
            // instance solver rather than projected through its type.
            let awaiting_instance = match &*this_expr {
                Expr::InferenceRef(var) => self.metas.classifying_field(*var).is_some(),
                _ => false,
            };
            if !awaiting_instance {
                if let Some(ty) = typing::type_of(self, &this_expr) {
                    if let Expr::ClassCall(class_call) = &*self.whnf(&ty) {
                        if let Some(term) = class_call.implementations.get(&field) {
                            return self.normalize(term, mode);
                        }
                        if let Some(implementation) =
                            self.defs.class(class_call.class).implemented.get(&field)
                        {
                            let term = implementation.term.clone();
                            let mut subst =
                                Substitution::single(&implementation.this_binding, this_expr);
                            return self.normalize(&subst.apply(&term), mode);
                        }
                    }
                }
            }
        }
        match mode {
            Mode::Whnf => expr.clone(),
            Mode::Nf | Mode::Rnf => {
                Expr::field_call(self.defs, field, self.normalize(inner, mode))
            }
        }
    }

    /// The computation rules of `coe`: a coercion along a constant line of
    /// types is the identity, and a coercion along an `iso` line to the
    /// `right` endpoint applies the isomorphism.
    fn normalize_coerce(&self, call: &FunCallExpr) -> Option<ExprPtr> {
        let [type_line, start, point] = &call.args[..] else {
            return None;
        };
        let binding = Binding::new(Some(Symbol::intern("i")), self.prelude.interval_type(self.defs));
        let line = self.nf(&Expr::app(type_line.clone(), Expr::var(&binding)));
        if !line.find_binding(binding.id()) {
            return Some(start.clone());
        }
        if let Expr::FunCall(iso_call) = &*line {
            if iso_call.fun == self.prelude.iso
                && iso_call.args.len() == 7
                && iso_call.args[..6]
                    .iter()
                    .all(|arg| !arg.find_binding(binding.id()))
            {
                if let Expr::ConCall(end) = &*self.nf(point) {
                    if end.con == self.prelude.right {
                        return Some(Expr::app(iso_call.args[2].clone(), start.clone()));
                    }
                }
            }
        }
        None
    }

    /// Run the boundary rules of an interval elimination, falling back to
    /// its ordinary tree for arguments stuck between the endpoints.
    fn eval_interval(
        &self,
        elim: &IntervalElim,
        args: &[ExprPtr],
        mut subst: Substitution,
        expr: &ExprPtr,
        mode: Mode,
    ) -> ExprPtr {
        let offset = args.len() - elim.cases.len();
        for index in (offset..args.len()).rev() {
            let arg = self.whnf(&args[index]);
            let endpoint = match &*arg {
                Expr::ConCall(con) if con.con == self.prelude.left => 0,
                Expr::ConCall(con) if con.con == self.prelude.right => 1,
                _ => continue,
            };
            let case = &elim.cases[index - offset];
            let boundary = if endpoint == 0 { &case.0 } else { &case.1 };
            let boundary = match boundary {
                Some(boundary) => boundary,
                None => return self.apply_stuck(expr, args, mode),
            };
            for (position, param) in elim.params.iter().enumerate() {
                if position != index {
                    subst.add(param, args[position].clone());
                }
            }
            return self.normalize(&subst.apply(boundary), mode);
        }
        if let Some(tree) = &elim.otherwise {
            if let Some(result) = self.eval_tree(tree, args, subst) {
                return self.normalize(&result, mode);
            }
        }
        self.apply_stuck(expr, args, mode)
    }

    fn apply_stuck(&self, expr: &ExprPtr, args: &[ExprPtr], mode: Mode) -> ExprPtr {
        match &**expr {
            Expr::FunCall(call) => self.apply_fun_call(call, expr, mode),
            Expr::ConCall(call) => self.apply_con_call(call, expr, mode),
            _ => {
                debug_assert!(args.is_empty());
                expr.clone()
            }
        }
    }

    /// Run an elimination tree against arguments. Returns `None` when a
    /// branch gets stuck on a scrutinee that does not reduce to a
    /// constructor.
    pub fn eval_tree(
        &self,
        tree: &ElimTree,
        args: &[ExprPtr],
        mut subst: Substitution,
    ) -> Option<ExprPtr> {
        let mut stack: Vec<ExprPtr> = args.iter().rev().cloned().collect();
        let mut tree = tree;
        loop {
            self.check_interrupt();
            for param in tree.params() {
                let arg = match stack.pop() {
                    Some(arg) => arg,
                    None => panic!("elimination tree consumes more arguments than supplied"),
                };
                subst.add(param, arg);
            }
            match tree {
                ElimTree::Leaf(leaf) => return Some(subst.apply(&leaf.body)),
                ElimTree::Branch(branch) => {
                    let top = match stack.last() {
                        Some(top) => top,
                        None => panic!("elimination tree consumes more arguments than supplied"),
                    };
                    let scrutinee = self.whnf(top);
                    let con_call = match &*scrutinee {
                        Expr::ConCall(call) => Some(call),
                        _ => None,
                    };
                    let (child, decompose) = branch.child(con_call.map(|call| call.con))?;
                    if decompose {
                        let call = con_call.unwrap();
                        let con_args: Vec<ExprPtr> = call.args.clone();
                        stack.pop();
                        stack.extend(con_args.into_iter().rev());
                    }
                    tree = child;
                }
            }
        }
    }

    /// Would [`Normalizer::eval_tree`] reach a leaf on these arguments?
    /// Unlike evaluation this treats missing arguments as success: a
    /// partial application can still evaluate once completed.
    pub fn does_evaluate(&self, tree: &ElimTree, args: &[ExprPtr]) -> bool {
        let mut stack: Vec<ExprPtr> = args.iter().rev().cloned().collect();
        let mut tree = tree;
        loop {
            for _ in tree.params() {
                if stack.pop().is_none() {
                    return true;
                }
            }
            match tree {
                ElimTree::Leaf(_) => return true,
                ElimTree::Branch(branch) => {
                    let top = match stack.last() {
                        Some(top) => top,
                        None => return true,
                    };
                    let scrutinee = self.whnf(top);
                    let con_call = match &*scrutinee {
                        Expr::ConCall(call) => Some(call),
                        _ => None,
                    };
                    let (child, decompose) = match branch.child(con_call.map(|call| call.con)) {
                        Some(child) => child,
                        None => return false,
                    };
                    if decompose {
                        let call = con_call.unwrap();
                        let con_args: Vec<ExprPtr> = call.args.clone();
                        stack.pop();
                        stack.extend(con_args.into_iter().rev());
                    }
                    tree = child;
                }
            }
        }
    }

    /// The subterm blocking evaluation of `expr`, if any. Comparison uses
    /// this to recognise terms stuck on a metavariable (deferred as an
    /// equation) or on an error (compared leniently).
    pub fn stuck_expr(&self, expr: &ExprPtr) -> Option<ExprPtr> {
        match &**expr {
            Expr::InferenceRef(var) => match self.metas.solution(*var) {
                Some(solution) => self.stuck_expr(&solution),
                None => Some(expr.clone()),
            },
            Expr::Error(_) => Some(expr.clone()),
            Expr::App(fun, _) => self.stuck_expr(fun),
            Expr::Proj(inner, _) => self.stuck_expr(inner),
            Expr::FieldCall(_, inner) => self.stuck_expr(inner),
            Expr::OfType(inner, _) => self.stuck_expr(inner),
            Expr::FunCall(call) => {
                let def = self.defs.function(call.fun);
                if !def.status.body_ok() {
                    return None;
                }
                match &def.body {
                    Some(Body::Tree(tree)) => self.tree_stuck(tree, &call.args),
                    _ => None,
                }
            }
            Expr::ConCall(call) => {
                let def = self.defs.constructor(call.con);
                if !def.status.body_ok() {
                    return None;
                }
                match &def.body {
                    Some(Body::Tree(tree)) => self.tree_stuck(tree, &call.args),
                    _ => None,
                }
            }
            Expr::Case(case) => self.tree_stuck(&case.tree, &case.args),
            _ => None,
        }
    }

    fn tree_stuck(&self, tree: &ElimTree, args: &[ExprPtr]) -> Option<ExprPtr> {
        let mut stack: Vec<ExprPtr> = args.iter().rev().cloned().collect();
        let mut tree = tree;
        loop {
            for _ in tree.params() {
                stack.pop()?;
            }
            match tree {
                ElimTree::Leaf(_) => return None,
                ElimTree::Branch(branch) => {
                    let top = stack.last()?;
                    let scrutinee = self.whnf(top);
                    let con_call = match &*scrutinee {
                        Expr::ConCall(call) => Some(call),
                        _ => None,
                    };
                    let (child, decompose) = match branch.child(con_call.map(|call| call.con)) {
                        Some(child) => child,
                        None => {
                            return self
                                .stuck_expr(&scrutinee)
                                .or(Some(scrutinee.clone()))
                        }
                    };
                    if decompose {
                        let call = con_call.unwrap();
                        let con_args: Vec<ExprPtr> = call.args.clone();
                        stack.pop();
                        stack.extend(con_args.into_iter().rev());
                    }
                    tree = child;
                }
            }
        }
    }
}

/// Apply a lambda to arguments, rewrapping leftover parameters or
/// re-applying leftover arguments as needed.
fn beta_reduce(lam: &crate::core::LamExpr, args: &[ExprPtr]) -> ExprPtr {
    let bound = lam.params.len().min(args.len());
    let mut subst = Substitution::new();
    for (param, arg) in lam.params[..bound].iter().zip(&args[..bound]) {
        subst.add(param, arg.clone());
    }
    let body = if lam.params.len() > bound {
        let leftover = subst.apply_bindings(&lam.params[bound..]);
        let body = subst.apply(&lam.body);
        Expr::lam(lam.sort, leftover, body)
    } else {
        subst.apply(&lam.body)
    };
    Expr::apps(body, args[bound..].iter().cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::def::{FunId, FunctionDef, Status};
    use crate::core::elim::{BranchElimTree, BranchKey, LeafElimTree};
    use crate::core::prelude::Prelude;
    use fxhash::FxHashMap;

    fn setup() -> (Definitions, Prelude, MetaVars) {
        let mut defs = Definitions::new();
        let prelude = Prelude::new(&mut defs);
        (defs, prelude, MetaVars::new())
    }

    fn nat(defs: &Definitions, prelude: &Prelude) -> ExprPtr {
        Expr::data_call(defs, prelude.nat, Sort::SET0, vec![])
    }

    /// `plus` by recursion on the first argument, with a hand-built tree.
    fn define_plus(defs: &mut Definitions, prelude: &Prelude) -> FunId {
        let nat_ty = nat(defs, prelude);
        let x = Binding::new(Some(Symbol::intern("x")), nat_ty.clone());
        let y = Binding::new(Some(Symbol::intern("y")), nat_ty.clone());
        let plus = defs.add_function(FunctionDef {
            name: Symbol::intern("plus"),
            params: vec![x, y],
            result_type: nat_ty.clone(),
            body: None,
            status: Status::HeaderChecked,
        });

        let y0 = Binding::new(Some(Symbol::intern("y")), nat_ty.clone());
        let zero_leaf = ElimTree::Leaf(LeafElimTree {
            params: vec![y0.clone()],
            body: Expr::var(&y0),
        });

        let n = Binding::new(Some(Symbol::intern("n")), nat_ty.clone());
        let y1 = Binding::new(Some(Symbol::intern("y")), nat_ty.clone());
        let recursive = Expr::fun_call(
            defs,
            plus,
            Sort::SET0,
            vec![Expr::var(&n), Expr::var(&y1)],
        );
        let suc_leaf = ElimTree::Leaf(LeafElimTree {
            params: vec![n, y1],
            body: Expr::con_call(defs, prelude.suc, Sort::SET0, vec![], vec![recursive]),
        });

        let mut children = FxHashMap::default();
        children.insert(BranchKey::Con(prelude.zero), zero_leaf);
        children.insert(BranchKey::Con(prelude.suc), suc_leaf);
        let tree = ElimTree::Branch(BranchElimTree {
            params: vec![],
            children,
        });
        defs.set_function_body(plus, Some(Body::Tree(tree)), Status::NoErrors);
        plus
    }

    #[test]
    fn three_plus_five_normalizes_to_eight() {
        let (mut defs, prelude, metas) = setup();
        let plus = define_plus(&mut defs, &prelude);
        let norm = Normalizer::new(&defs, &metas, &prelude);

        let call = Expr::fun_call(
            &defs,
            plus,
            Sort::SET0,
            vec![
                prelude.nat_literal(&defs, 3),
                prelude.nat_literal(&defs, 5),
            ],
        );
        let result = norm.nf(&call);
        assert_eq!(prelude.nat_value(&result), Some(8));
    }

    #[test]
    fn whnf_stops_at_the_head_constructor() {
        let (mut defs, prelude, metas) = setup();
        let plus = define_plus(&mut defs, &prelude);
        let norm = Normalizer::new(&defs, &metas, &prelude);

        let call = Expr::fun_call(
            &defs,
            plus,
            Sort::SET0,
            vec![
                prelude.nat_literal(&defs, 1),
                prelude.nat_literal(&defs, 1),
            ],
        );
        let result = norm.whnf(&call);
        match &*result {
            Expr::ConCall(con) => {
                assert_eq!(con.con, prelude.suc);
                assert!(
                    matches!(&*con.args[0], Expr::FunCall(_)),
                    "whnf must not normalize constructor arguments"
                );
            }
            other => panic!("expected a constructor application, got {other:?}"),
        }
    }

    #[test]
    fn normal_forms_are_idempotent() {
        let (mut defs, prelude, metas) = setup();
        let plus = define_plus(&mut defs, &prelude);
        let norm = Normalizer::new(&defs, &metas, &prelude);

        // stuck on a free variable, so normalization rebuilds the call
        let k = Binding::new(Some(Symbol::intern("k")), nat(&defs, &prelude));
        let call = Expr::fun_call(
            &defs,
            plus,
            Sort::SET0,
            vec![Expr::var(&k), prelude.nat_literal(&defs, 2)],
        );
        let once = norm.nf(&call);
        let twice = norm.nf(&once);
        assert!(crate::core::compare::compare(
            &norm,
            &mut crate::core::compare::DummyEquations,
            crate::core::compare::Cmp::Eq,
            &once,
            &twice,
            crate::source::SourceNode::SYNTHETIC,
        ));
    }

    #[test]
    fn whnf_then_nf_agrees_with_nf() {
        let (mut defs, prelude, metas) = setup();
        let plus = define_plus(&mut defs, &prelude);
        let norm = Normalizer::new(&defs, &metas, &prelude);

        let call = Expr::fun_call(
            &defs,
            plus,
            Sort::SET0,
            vec![
                prelude.nat_literal(&defs, 2),
                prelude.nat_literal(&defs, 2),
            ],
        );
        let via_whnf = norm.nf(&norm.whnf(&call));
        let direct = norm.nf(&call);
        assert_eq!(prelude.nat_value(&via_whnf), prelude.nat_value(&direct));
        assert_eq!(prelude.nat_value(&direct), Some(4));
    }

    #[test]
    fn beta_reduction_binds_left_to_right() {
        let (defs, prelude, metas) = setup();
        let norm = Normalizer::new(&defs, &metas, &prelude);

        let x = Binding::new(Some(Symbol::intern("x")), nat(&defs, &prelude));
        let identity = Expr::lam(Sort::SET0, vec![x.clone()], Expr::var(&x));
        let applied = Expr::app(identity, prelude.nat_literal(&defs, 1));
        assert_eq!(prelude.nat_value(&norm.whnf(&applied)), Some(1));
    }

    #[test]
    fn partial_application_rewraps_leftover_parameters() {
        let (defs, prelude, metas) = setup();
        let norm = Normalizer::new(&defs, &metas, &prelude);

        let x = Binding::new(Some(Symbol::intern("x")), nat(&defs, &prelude));
        let y = Binding::new(Some(Symbol::intern("y")), nat(&defs, &prelude));
        let const_fn = Expr::lam(Sort::SET0, vec![x.clone(), y], Expr::var(&x));
        let applied = Expr::app(const_fn, prelude.nat_literal(&defs, 7));
        match &*norm.whnf(&applied) {
            Expr::Lam(lam) => {
                assert_eq!(lam.params.len(), 1);
                assert_eq!(prelude.nat_value(&lam.body), Some(7));
            }
            other => panic!("expected a lambda, got {other:?}"),
        }
    }

    #[test]
    fn projection_reduces_tuples() {
        let (defs, prelude, metas) = setup();
        let norm = Normalizer::new(&defs, &metas, &prelude);

        let nat_ty = nat(&defs, &prelude);
        let sigma = Expr::sigma(
            Sort::SET0,
            vec![
                Binding::new(None, nat_ty.clone()),
                Binding::new(None, nat_ty),
            ],
        );
        let tuple = Expr::tuple(
            vec![
                prelude.nat_literal(&defs, 1),
                prelude.nat_literal(&defs, 2),
            ],
            sigma,
        );
        assert_eq!(
            prelude.nat_value(&norm.whnf(&Expr::proj(tuple, 1))),
            Some(2)
        );
    }

    #[test]
    fn type_annotations_are_transparent() {
        let (defs, prelude, metas) = setup();
        let norm = Normalizer::new(&defs, &metas, &prelude);

        let annotated = Expr::of_type(prelude.nat_literal(&defs, 3), nat(&defs, &prelude));
        assert_eq!(prelude.nat_value(&norm.whnf(&annotated)), Some(3));
    }

    #[test]
    fn unchecked_bodies_do_not_unfold() {
        let (mut defs, prelude, metas) = setup();
        let plus = define_plus(&mut defs, &prelude);
        defs.set_function_status(plus, Status::HeaderChecked);
        let norm = Normalizer::new(&defs, &metas, &prelude);

        let call = Expr::fun_call(
            &defs,
            plus,
            Sort::SET0,
            vec![
                prelude.nat_literal(&defs, 1),
                prelude.nat_literal(&defs, 1),
            ],
        );
        assert!(matches!(&*norm.whnf(&call), Expr::FunCall(_)));
    }

    #[test]
    fn solved_metavariables_are_chased() {
        let (mut defs, prelude, metas) = setup();
        let plus = define_plus(&mut defs, &prelude);
        let norm = Normalizer::new(&defs, &metas, &prelude);

        let var = metas.fresh(
            Symbol::intern("n"),
            nat(&defs, &prelude),
            crate::source::SourceNode::SYNTHETIC,
            rpds::HashTrieSet::new(),
        );
        let call = Expr::fun_call(
            &defs,
            plus,
            Sort::SET0,
            vec![Expr::inference_ref(var), prelude.nat_literal(&defs, 1)],
        );
        assert!(matches!(&*norm.whnf(&call), Expr::FunCall(_)));

        metas.solve(var, prelude.nat_literal(&defs, 1));
        assert_eq!(prelude.nat_value(&norm.nf(&call)), Some(2));
    }

    #[test]
    fn does_evaluate_agrees_with_evaluation() {
        let (mut defs, prelude, metas) = setup();
        let plus = define_plus(&mut defs, &prelude);
        let norm = Normalizer::new(&defs, &metas, &prelude);
        let tree = match &defs.function(plus).body {
            Some(Body::Tree(tree)) => tree.clone(),
            other => panic!("expected a tree body, got {other:?}"),
        };

        let k = Binding::new(Some(Symbol::intern("k")), nat(&defs, &prelude));
        let literal_args = vec![
            prelude.nat_literal(&defs, 2),
            prelude.nat_literal(&defs, 2),
        ];
        let stuck_args = vec![Expr::var(&k), prelude.nat_literal(&defs, 2)];

        assert!(norm.does_evaluate(&tree, &literal_args));
        assert!(norm
            .eval_tree(&tree, &literal_args, Substitution::new())
            .is_some());
        assert!(!norm.does_evaluate(&tree, &stuck_args));
        assert!(norm
            .eval_tree(&tree, &stuck_args, Substitution::new())
            .is_none());
    }

    #[test]
    fn stuck_expressions_surface_metavariables() {
        let (mut defs, prelude, metas) = setup();
        let plus = define_plus(&mut defs, &prelude);
        let norm = Normalizer::new(&defs, &metas, &prelude);

        let var = metas.fresh(
            Symbol::intern("n"),
            nat(&defs, &prelude),
            crate::source::SourceNode::SYNTHETIC,
            rpds::HashTrieSet::new(),
        );
        let call = Expr::fun_call(
            &defs,
            plus,
            Sort::SET0,
            vec![Expr::inference_ref(var), prelude.nat_literal(&defs, 1)],
        );
        let stuck = norm.stuck_expr(&call);
        assert!(matches!(stuck.as_deref(), Some(Expr::InferenceRef(v)) if *v == var));
    }

    #[test]
    fn interruption_unwinds() {
        let (mut defs, prelude, metas) = setup();
        let plus = define_plus(&mut defs, &prelude);
        let flag = AtomicBool::new(true);
        let norm = Normalizer::new(&defs, &metas, &prelude).with_interrupt(&flag);

        let call = Expr::fun_call(
            &defs,
            plus,
            Sort::SET0,
            vec![
                prelude.nat_literal(&defs, 1),
                prelude.nat_literal(&defs, 1),
            ],
        );
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| norm.nf(&call)));
        let payload = match result {
            Err(payload) => payload,
            Ok(_) => panic!("evaluation should have been interrupted"),
        };
        assert!(payload.downcast_ref::<Interrupted>().is_some());
    }
}
