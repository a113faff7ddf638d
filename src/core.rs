//! The core term language.
//!
//! Terms are fully elaborated: names have been resolved to [`Binding`]s or
//! definition ids, implicit arguments are explicit, and pattern-matching
//! definitions have been compiled to elimination trees. Terms are immutable
//! and shared through [`ExprPtr`]; every reduction step reconstructs the
//! nodes it changes, so a term handed to the evaluator or the comparer is
//! never invalidated behind the caller's back.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use fxhash::FxHashMap;

use crate::elaboration::MetaVar;
use crate::symbol::Symbol;

pub mod compare;
pub mod def;
pub mod elim;
pub mod prelude;
pub mod semantics;
pub mod sort;
pub mod subst;
pub mod typing;

pub use self::def::{ClassId, ConId, DataId, Definitions, FieldId, FunId};
pub use self::elim::{ElimTree, Pattern};
pub use self::sort::{Level, LevelVariable, Sort};

/// Identity of a bound variable. Ids are drawn from a process-wide counter,
/// so two bindings are the same variable exactly when their ids coincide.
pub type BindingId = u64;

static NEXT_BINDING_ID: AtomicU64 = AtomicU64::new(0);

/// A typed bound variable.
///
/// A binding owns its type and is shared by reference counting: the
/// telescope that introduces it and every variable occurrence point at the
/// same underlying data. Substitution never mutates a binding; it creates a
/// fresh one and rewrites occurrences (see [`subst::Substitution`]).
#[derive(Clone)]
pub struct Binding(Arc<BindingData>);

struct BindingData {
    id: BindingId,
    name: Option<Symbol>,
    ty: ExprPtr,
    explicit: bool,
}

impl Binding {
    pub fn new(name: Option<Symbol>, ty: ExprPtr) -> Binding {
        Binding::with_plicity(name, ty, true)
    }

    pub fn implicit(name: Option<Symbol>, ty: ExprPtr) -> Binding {
        Binding::with_plicity(name, ty, false)
    }

    pub fn with_plicity(name: Option<Symbol>, ty: ExprPtr, explicit: bool) -> Binding {
        Binding(Arc::new(BindingData {
            id: NEXT_BINDING_ID.fetch_add(1, Ordering::Relaxed),
            name,
            ty,
            explicit,
        }))
    }

    pub fn id(&self) -> BindingId {
        self.0.id
    }

    pub fn name(&self) -> Option<Symbol> {
        self.0.name
    }

    pub fn ty(&self) -> &ExprPtr {
        &self.0.ty
    }

    pub fn is_explicit(&self) -> bool {
        self.0.explicit
    }
}

impl PartialEq for Binding {
    fn eq(&self, other: &Binding) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Binding {}

impl std::hash::Hash for Binding {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.name {
            Some(name) => write!(f, "{}#{}", name, self.0.id),
            None => write!(f, "_#{}", self.0.id),
        }
    }
}

/// A shared, immutable term.
pub type ExprPtr = Arc<Expr>;

/// The expression sum type.
///
/// Definition-call variants ([`Expr::FunCall`], [`Expr::ConCall`],
/// [`Expr::DataCall`], [`Expr::FieldCall`], [`Expr::ClassCall`]) may only be
/// constructed through the checked constructors below, which require the
/// target definition to have passed header type-checking.
#[derive(Debug, Clone)]
pub enum Expr {
    /// A reference to a bound variable.
    Var(Binding),
    /// A reference to a metavariable. Solved metavariables are chased
    /// through the [`crate::elaboration::MetaVars`] registry during
    /// normalization.
    InferenceRef(MetaVar),
    App(ExprPtr, ExprPtr),
    Lam(LamExpr),
    Pi(PiExpr),
    Sigma(SigmaExpr),
    Tuple(TupleExpr),
    /// Projection of the `n`-th component of a tuple.
    Proj(ExprPtr, usize),
    Universe(Sort),
    /// A term annotated with its type. Transparent to evaluation and
    /// comparison; produced when a metavariable is solved.
    OfType(ExprPtr, ExprPtr),
    /// A placeholder for a term that failed to elaborate. Carries the
    /// original term when one exists. Comparison treats errors as equal to
    /// anything so a single failure does not cascade.
    Error(Option<ExprPtr>),
    Let(LetExpr),
    Case(CaseExpr),
    FunCall(FunCallExpr),
    ConCall(ConCallExpr),
    DataCall(DataCallExpr),
    FieldCall(FieldId, ExprPtr),
    ClassCall(ClassCallExpr),
    /// Instantiation of a fully-implemented record type.
    New(ClassCallExpr),
}

#[derive(Debug, Clone)]
pub struct LamExpr {
    pub sort: Sort,
    pub params: Vec<Binding>,
    pub body: ExprPtr,
}

#[derive(Debug, Clone)]
pub struct PiExpr {
    pub sort: Sort,
    pub params: Vec<Binding>,
    pub codomain: ExprPtr,
}

#[derive(Debug, Clone)]
pub struct SigmaExpr {
    pub sort: Sort,
    pub params: Vec<Binding>,
}

#[derive(Debug, Clone)]
pub struct TupleExpr {
    pub fields: Vec<ExprPtr>,
    /// The sigma type this tuple inhabits.
    pub sigma_type: ExprPtr,
}

#[derive(Debug, Clone)]
pub struct LetExpr {
    pub clauses: Vec<LetClause>,
    pub body: ExprPtr,
}

#[derive(Debug, Clone)]
pub struct LetClause {
    pub binding: Binding,
    pub expr: ExprPtr,
}

#[derive(Debug, Clone)]
pub struct CaseExpr {
    pub params: Vec<Binding>,
    pub result_type: ExprPtr,
    pub tree: ElimTree,
    pub args: Vec<ExprPtr>,
}

#[derive(Debug, Clone)]
pub struct FunCallExpr {
    pub fun: FunId,
    pub sort: Sort,
    pub args: Vec<ExprPtr>,
}

#[derive(Debug, Clone)]
pub struct ConCallExpr {
    pub con: ConId,
    pub sort: Sort,
    /// Arguments instantiating the parameters of the constructor's data
    /// type. Fully determined by typing; not matched by elimination trees.
    pub data_args: Vec<ExprPtr>,
    pub args: Vec<ExprPtr>,
}

#[derive(Debug, Clone)]
pub struct DataCallExpr {
    pub data: DataId,
    pub sort: Sort,
    pub args: Vec<ExprPtr>,
}

#[derive(Debug, Clone)]
pub struct ClassCallExpr {
    pub class: ClassId,
    pub sort: Sort,
    /// Fields implemented at this call site, on top of those implemented in
    /// the class definition itself.
    pub implementations: FxHashMap<FieldId, ExprPtr>,
}

impl ClassCallExpr {
    /// A class call is a unit type when no field is left unimplemented; its
    /// inhabitants are then compared field-by-field rather than
    /// structurally.
    pub fn is_unit(&self, defs: &Definitions) -> bool {
        let class = defs.class(self.class);
        class
            .fields
            .iter()
            .all(|field| self.implementations.contains_key(field) || class.is_implemented(*field))
    }
}

impl Expr {
    pub fn var(binding: &Binding) -> ExprPtr {
        Arc::new(Expr::Var(binding.clone()))
    }

    pub fn inference_ref(var: MetaVar) -> ExprPtr {
        Arc::new(Expr::InferenceRef(var))
    }

    pub fn app(fun: ExprPtr, arg: ExprPtr) -> ExprPtr {
        Arc::new(Expr::App(fun, arg))
    }

    pub fn apps(fun: ExprPtr, args: impl IntoIterator<Item = ExprPtr>) -> ExprPtr {
        args.into_iter().fold(fun, Expr::app)
    }

    pub fn lam(sort: Sort, params: Vec<Binding>, body: ExprPtr) -> ExprPtr {
        Arc::new(Expr::Lam(LamExpr { sort, params, body }))
    }

    pub fn pi(sort: Sort, params: Vec<Binding>, codomain: ExprPtr) -> ExprPtr {
        Arc::new(Expr::Pi(PiExpr {
            sort,
            params,
            codomain,
        }))
    }

    pub fn sigma(sort: Sort, params: Vec<Binding>) -> ExprPtr {
        Arc::new(Expr::Sigma(SigmaExpr { sort, params }))
    }

    pub fn tuple(fields: Vec<ExprPtr>, sigma_type: ExprPtr) -> ExprPtr {
        Arc::new(Expr::Tuple(TupleExpr { fields, sigma_type }))
    }

    pub fn proj(expr: ExprPtr, field: usize) -> ExprPtr {
        Arc::new(Expr::Proj(expr, field))
    }

    pub fn universe(sort: Sort) -> ExprPtr {
        Arc::new(Expr::Universe(sort))
    }

    pub fn of_type(expr: ExprPtr, ty: ExprPtr) -> ExprPtr {
        Arc::new(Expr::OfType(expr, ty))
    }

    pub fn error(expr: Option<ExprPtr>) -> ExprPtr {
        Arc::new(Expr::Error(expr))
    }

    pub fn let_in(clauses: Vec<LetClause>, body: ExprPtr) -> ExprPtr {
        Arc::new(Expr::Let(LetExpr { clauses, body }))
    }

    pub fn case(
        params: Vec<Binding>,
        result_type: ExprPtr,
        tree: ElimTree,
        args: Vec<ExprPtr>,
    ) -> ExprPtr {
        Arc::new(Expr::Case(CaseExpr {
            params,
            result_type,
            tree,
            args,
        }))
    }

    /// Construct a function call. The callee must have passed header
    /// type-checking; violating this is a logic error, not a user error.
    pub fn fun_call(defs: &Definitions, fun: FunId, sort: Sort, args: Vec<ExprPtr>) -> ExprPtr {
        assert!(
            defs.function(fun).status.headers_ok(),
            "called function has not passed header type-checking"
        );
        Arc::new(Expr::FunCall(FunCallExpr { fun, sort, args }))
    }

    pub fn con_call(
        defs: &Definitions,
        con: ConId,
        sort: Sort,
        data_args: Vec<ExprPtr>,
        args: Vec<ExprPtr>,
    ) -> ExprPtr {
        assert!(
            defs.constructor(con).status.headers_ok(),
            "called constructor has not passed header type-checking"
        );
        Arc::new(Expr::ConCall(ConCallExpr {
            con,
            sort,
            data_args,
            args,
        }))
    }

    pub fn data_call(defs: &Definitions, data: DataId, sort: Sort, args: Vec<ExprPtr>) -> ExprPtr {
        assert!(
            defs.data(data).status.headers_ok(),
            "called data type has not passed header type-checking"
        );
        Arc::new(Expr::DataCall(DataCallExpr { data, sort, args }))
    }

    pub fn field_call(defs: &Definitions, field: FieldId, expr: ExprPtr) -> ExprPtr {
        assert!(
            defs.field(field).status.headers_ok(),
            "called field has not passed header type-checking"
        );
        Arc::new(Expr::FieldCall(field, expr))
    }

    pub fn class_call(
        defs: &Definitions,
        class: ClassId,
        sort: Sort,
        implementations: FxHashMap<FieldId, ExprPtr>,
    ) -> ExprPtr {
        assert!(
            defs.class(class).status.headers_ok(),
            "called class has not passed header type-checking"
        );
        Arc::new(Expr::ClassCall(ClassCallExpr {
            class,
            sort,
            implementations,
        }))
    }

    pub fn new_expr(class_call: ClassCallExpr) -> ExprPtr {
        Arc::new(Expr::New(class_call))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Expr::Error(_))
    }

    /// Strip an application spine, returning the head and the arguments in
    /// application order.
    pub fn app_spine(expr: &ExprPtr) -> (&ExprPtr, Vec<&ExprPtr>) {
        let mut args = Vec::new();
        let mut fun = expr;
        while let Expr::App(next_fun, arg) = &**fun {
            args.push(arg);
            fun = next_fun;
        }
        args.reverse();
        (fun, args)
    }

    /// Does the variable introduced by `binding` occur free in this term?
    pub fn find_binding(&self, binding: BindingId) -> bool {
        self.any_subexpr(&mut |expr| match expr {
            Expr::Var(b) => b.id() == binding,
            _ => false,
        })
    }

    /// Does a reference to the metavariable `var` occur in this term? Used
    /// by the occurs check when solving `var`.
    pub fn find_meta(&self, var: MetaVar) -> bool {
        self.any_subexpr(&mut |expr| match expr {
            Expr::InferenceRef(m) => *m == var,
            _ => false,
        })
    }

    fn any_subexpr(&self, pred: &mut dyn FnMut(&Expr) -> bool) -> bool {
        fn any_bindings(params: &[Binding], pred: &mut dyn FnMut(&Expr) -> bool) -> bool {
            params.iter().any(|param| param.ty().any_subexpr(pred))
        }

        fn any_tree(tree: &ElimTree, pred: &mut dyn FnMut(&Expr) -> bool) -> bool {
            match tree {
                ElimTree::Leaf(leaf) => {
                    any_bindings(&leaf.params, pred) || leaf.body.any_subexpr(pred)
                }
                ElimTree::Branch(branch) => {
                    any_bindings(&branch.params, pred)
                        || branch.children.values().any(|child| any_tree(child, pred))
                }
            }
        }

        if pred(self) {
            return true;
        }
        match self {
            Expr::Var(_) | Expr::InferenceRef(_) | Expr::Universe(_) | Expr::Error(None) => false,
            Expr::App(fun, arg) => fun.any_subexpr(pred) || arg.any_subexpr(pred),
            Expr::Lam(lam) => any_bindings(&lam.params, pred) || lam.body.any_subexpr(pred),
            Expr::Pi(pi) => any_bindings(&pi.params, pred) || pi.codomain.any_subexpr(pred),
            Expr::Sigma(sigma) => any_bindings(&sigma.params, pred),
            Expr::Tuple(tuple) => {
                tuple.fields.iter().any(|field| field.any_subexpr(pred))
                    || tuple.sigma_type.any_subexpr(pred)
            }
            Expr::Proj(expr, _) => expr.any_subexpr(pred),
            Expr::OfType(expr, ty) => expr.any_subexpr(pred) || ty.any_subexpr(pred),
            Expr::Error(Some(expr)) => expr.any_subexpr(pred),
            Expr::Let(let_expr) => {
                let_expr.clauses.iter().any(|clause| {
                    clause.binding.ty().any_subexpr(pred) || clause.expr.any_subexpr(pred)
                }) || let_expr.body.any_subexpr(pred)
            }
            Expr::Case(case) => {
                any_bindings(&case.params, pred)
                    || case.result_type.any_subexpr(pred)
                    || any_tree(&case.tree, pred)
                    || case.args.iter().any(|arg| arg.any_subexpr(pred))
            }
            Expr::FunCall(call) => call.args.iter().any(|arg| arg.any_subexpr(pred)),
            Expr::ConCall(call) => {
                call.data_args.iter().any(|arg| arg.any_subexpr(pred))
                    || call.args.iter().any(|arg| arg.any_subexpr(pred))
            }
            Expr::DataCall(call) => call.args.iter().any(|arg| arg.any_subexpr(pred)),
            Expr::FieldCall(_, expr) => expr.any_subexpr(pred),
            Expr::ClassCall(call) | Expr::New(call) => call
                .implementations
                .values()
                .any(|implementation| implementation.any_subexpr(pred)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_type() -> ExprPtr {
        Expr::universe(Sort::SET0)
    }

    #[test]
    fn binding_identity() {
        let x = Binding::new(Some(Symbol::intern("x")), dummy_type());
        let y = Binding::new(Some(Symbol::intern("x")), dummy_type());
        assert_eq!(x, x.clone());
        assert_ne!(x, y, "bindings with equal names are still distinct");
    }

    #[test]
    fn find_binding_sees_through_binders() {
        let x = Binding::new(Some(Symbol::intern("x")), dummy_type());
        let y = Binding::new(Some(Symbol::intern("y")), dummy_type());
        let body = Expr::app(Expr::var(&x), Expr::var(&y));
        let lam = Expr::lam(Sort::SET0, vec![y.clone()], body);
        assert!(lam.find_binding(x.id()));
        let z = Binding::new(None, dummy_type());
        assert!(!lam.find_binding(z.id()));
    }

    #[test]
    fn app_spine_order() {
        let x = Binding::new(Some(Symbol::intern("f")), dummy_type());
        let a = Expr::universe(Sort::PROP);
        let b = Expr::universe(Sort::SET0);
        let app = Expr::apps(Expr::var(&x), [a, b]);
        let (head, args) = Expr::app_spine(&app);
        assert!(matches!(&**head, Expr::Var(v) if *v == x));
        assert_eq!(args.len(), 2);
        assert!(matches!(&**args[0], Expr::Universe(s) if s.is_prop()));
    }
}
