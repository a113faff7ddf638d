//! Type synthesis for core terms.
//!
//! Core terms carry enough information to reconstruct their types without
//! re-checking: bindings own their types, tuples their sigma type, calls
//! their sort argument. [`type_of`] does exactly that reconstruction and
//! returns `None` only for error placeholders and terms built from them.

use crate::core::semantics::Normalizer;
use crate::core::sort::Sort;
use crate::core::subst::{LevelSubstitution, Substitution};
use crate::core::{Expr, ExprPtr};

pub fn type_of(norm: &Normalizer<'_>, expr: &ExprPtr) -> Option<ExprPtr> {
    match &**expr {
        Expr::Var(binding) => Some(binding.ty().clone()),
        Expr::InferenceRef(var) => match norm.metas.solution(*var) {
            Some(solution) => type_of(norm, &solution),
            None => Some(norm.metas.type_of(*var)),
        },
        Expr::App(fun, arg) => {
            let fun_type = norm.whnf(&type_of(norm, fun)?);
            match &*fun_type {
                Expr::Pi(pi) => {
                    let mut subst = Substitution::single(&pi.params[0], arg.clone());
                    if pi.params.len() > 1 {
                        let rest = subst.apply_bindings(&pi.params[1..]);
                        let codomain = subst.apply(&pi.codomain);
                        Some(Expr::pi(pi.sort, rest, codomain))
                    } else {
                        Some(subst.apply(&pi.codomain))
                    }
                }
                _ => None,
            }
        }
        Expr::Lam(lam) => {
            let body_type = type_of(norm, &lam.body)?;
            Some(Expr::pi(lam.sort, lam.params.clone(), body_type))
        }
        Expr::Pi(pi) => Some(Expr::universe(pi.sort)),
        Expr::Sigma(sigma) => Some(Expr::universe(sigma.sort)),
        Expr::Tuple(tuple) => Some(tuple.sigma_type.clone()),
        Expr::Proj(inner, field) => {
            let inner_type = norm.whnf(&type_of(norm, inner)?);
            match &*inner_type {
                Expr::Sigma(sigma) => {
                    let mut subst = Substitution::new();
                    for (index, param) in sigma.params[..*field].iter().enumerate() {
                        subst.add(param, Expr::proj(inner.clone(), index));
                    }
                    Some(subst.apply(sigma.params[*field].ty()))
                }
                _ => None,
            }
        }
        Expr::Universe(sort) => Some(Expr::universe(sort.succ())),
        Expr::OfType(_, ty) => Some(ty.clone()),
        Expr::Error(_) => None,
        Expr::Let(let_expr) => type_of(norm, &let_expr.unfold()),
        Expr::Case(case) => {
            let mut subst = Substitution::new();
            for (param, arg) in case.params.iter().zip(&case.args) {
                subst.add(param, arg.clone());
            }
            Some(subst.apply(&case.result_type))
        }
        Expr::FunCall(call) => {
            let def = norm.defs.function(call.fun);
            let mut subst = Substitution::from_levels(LevelSubstitution::std(&call.sort));
            for (param, arg) in def.params.iter().zip(&call.args) {
                subst.add(param, arg.clone());
            }
            Some(subst.apply(&def.result_type))
        }
        Expr::ConCall(call) => {
            let def = norm.defs.constructor(call.con);
            Some(Expr::data_call(
                norm.defs,
                def.data,
                call.sort,
                call.data_args.clone(),
            ))
        }
        Expr::DataCall(call) => {
            let def = norm.defs.data(call.data);
            Some(Expr::universe(
                def.sort.subst(&LevelSubstitution::std(&call.sort)),
            ))
        }
        Expr::FieldCall(field, inner) => {
            let def = norm.defs.field(*field);
            let mut subst = Substitution::single(&def.this_binding, inner.clone());
            Some(subst.apply(&def.ty))
        }
        Expr::ClassCall(call) => {
            let def = norm.defs.class(call.class);
            Some(Expr::universe(
                def.sort.subst(&LevelSubstitution::std(&call.sort)),
            ))
        }
        Expr::New(call) => Some(std::sync::Arc::new(Expr::ClassCall(call.clone()))),
    }
}

/// The sort of the type `ty`, when `ty` reduces to a universe.
pub fn sort_of_type(norm: &Normalizer<'_>, ty: &ExprPtr) -> Option<Sort> {
    match &*norm.whnf(ty) {
        Expr::Universe(sort) => Some(*sort),
        _ => None,
    }
}

/// The sort of the type of `expr`.
pub fn sort_of(norm: &Normalizer<'_>, expr: &ExprPtr) -> Option<Sort> {
    sort_of_type(norm, &type_of(norm, expr)?)
}
