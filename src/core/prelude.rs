//! The built-in definitions.
//!
//! The prelude is built once into a [`Definitions`] registry and the
//! resulting ids are carried around explicitly by [`Prelude`]; nothing in
//! the crate reaches for global state to find them. The evaluator needs the
//! interval and coercion ids for its special reduction rules, and the
//! pattern-match compiler needs the truncation constructors to excuse them
//! from coverage at the right sorts.

use fxhash::FxHashMap;

use crate::core::def::{
    ConId, ConstructorDef, DataDef, DataId, Definitions, FunId, FunctionDef, Status,
};
use crate::core::elim::{Body, BranchElimTree, BranchKey, ElimTree, IntervalElim, LeafElimTree};
use crate::core::sort::{Level, LevelVariable, Sort};
use crate::core::{Binding, Expr, ExprPtr};
use crate::symbol::Symbol;

/// Ids of the built-in definitions.
#[derive(Debug)]
pub struct Prelude {
    pub interval: DataId,
    pub left: ConId,
    pub right: ConId,
    pub nat: DataId,
    pub zero: ConId,
    pub suc: ConId,
    pub path: DataId,
    pub path_con: ConId,
    pub path_infix: FunId,
    pub at: FunId,
    pub coerce: FunId,
    pub iso: FunId,
    pub prop_trunc: DataId,
    pub prop_trunc_path_con: ConId,
    pub set_trunc: DataId,
    pub set_trunc_path_con: ConId,
}

fn plain_data(name: &'static str, sort: Sort, params: Vec<Binding>) -> DataDef {
    let covariant = vec![false; params.len()];
    DataDef {
        name: Symbol::intern_static(name),
        params,
        sort,
        constructors: Vec::new(),
        covariant,
        has_indexed_constructors: false,
        status: Status::NoErrors,
    }
}

fn plain_con(
    name: &'static str,
    data: DataId,
    data_params: Vec<Binding>,
    params: Vec<Binding>,
) -> ConstructorDef {
    ConstructorDef {
        name: Symbol::intern_static(name),
        data,
        data_params,
        params,
        patterns: None,
        body: None,
        status: Status::NoErrors,
    }
}

impl Prelude {
    pub fn new(defs: &mut Definitions) -> Prelude {
        let path_sort = Sort::new(
            Level::new(Some(LevelVariable::P), 0),
            Level::new(Some(LevelVariable::H), -1),
        );

        // \data I | left | right, in \Prop
        let interval = defs.add_data(plain_data("I", Sort::PROP, vec![]));
        let left = defs.add_constructor(plain_con("left", interval, vec![], vec![]));
        let right = defs.add_constructor(plain_con("right", interval, vec![], vec![]));
        let interval_ty = Expr::data_call(defs, interval, Sort::PROP, vec![]);
        let endpoint =
            |defs: &Definitions, con: ConId| Expr::con_call(defs, con, Sort::PROP, vec![], vec![]);

        // \data Nat | zero | suc Nat
        let nat = defs.add_data(plain_data("Nat", Sort::SET0, vec![]));
        let zero = defs.add_constructor(plain_con("zero", nat, vec![], vec![]));
        let nat_ty = Expr::data_call(defs, nat, Sort::SET0, vec![]);
        let suc = defs.add_constructor(plain_con(
            "suc",
            nat,
            vec![],
            vec![Binding::new(None, nat_ty)],
        ));

        // \data Path (A : I -> \Type) (a : A left) (a' : A right)
        //   | path (\Pi (i : I) -> A i)
        let line_of = |interval_ty: &ExprPtr| {
            let i = Binding::new(Some(Symbol::intern_static("i")), interval_ty.clone());
            Expr::pi(Sort::STD.succ(), vec![i], Expr::universe(Sort::STD))
        };
        let line = Binding::new(Some(Symbol::intern_static("A")), line_of(&interval_ty));
        let start = Binding::new(
            Some(Symbol::intern_static("a")),
            Expr::app(Expr::var(&line), endpoint(defs, left)),
        );
        let end = Binding::new(
            Some(Symbol::intern_static("a'")),
            Expr::app(Expr::var(&line), endpoint(defs, right)),
        );
        let path_params = vec![line.clone(), start, end];
        let path = defs.add_data(plain_data("Path", path_sort, path_params.clone()));
        let path_fun = {
            let i = Binding::new(Some(Symbol::intern_static("i")), interval_ty.clone());
            let codomain = Expr::app(Expr::var(&line), Expr::var(&i));
            Binding::new(
                Some(Symbol::intern_static("f")),
                Expr::pi(Sort::STD, vec![i], codomain),
            )
        };
        let path_con =
            defs.add_constructor(plain_con("path", path, path_params, vec![path_fun]));

        // = (A : \Type) (a a' : A) => Path (\lam _ => A) a a'
        let path_infix = {
            let a_ty = Binding::new(Some(Symbol::intern_static("A")), Expr::universe(Sort::STD));
            let a = Binding::new(Some(Symbol::intern_static("a")), Expr::var(&a_ty));
            let b = Binding::new(Some(Symbol::intern_static("a'")), Expr::var(&a_ty));
            let constant_line = {
                let i = Binding::new(None, interval_ty.clone());
                Expr::lam(Sort::STD, vec![i], Expr::var(&a_ty))
            };
            let body = Expr::data_call(
                defs,
                path,
                Sort::STD,
                vec![constant_line, Expr::var(&a), Expr::var(&b)],
            );
            let params = vec![a_ty, a, b];
            let id = defs.add_function(FunctionDef {
                name: Symbol::intern_static("="),
                params: params.clone(),
                result_type: Expr::universe(Sort::STD),
                body: None,
                status: Status::HeaderChecked,
            });
            let tree = ElimTree::Leaf(LeafElimTree { params, body });
            defs.set_function_body(id, Some(Body::Tree(tree)), Status::NoErrors);
            id
        };

        // @ (A : I -> \Type) (a : A left) (a' : A right) (p : Path A a a')
        //   (i : I) : A i, with boundaries a and a' and projection through
        //   the path constructor otherwise
        let at = {
            let line = Binding::new(Some(Symbol::intern_static("A")), line_of(&interval_ty));
            let start = Binding::new(
                Some(Symbol::intern_static("a")),
                Expr::app(Expr::var(&line), endpoint(defs, left)),
            );
            let end = Binding::new(
                Some(Symbol::intern_static("a'")),
                Expr::app(Expr::var(&line), endpoint(defs, right)),
            );
            let p = Binding::new(
                Some(Symbol::intern_static("p")),
                Expr::data_call(
                    defs,
                    path,
                    Sort::STD,
                    vec![Expr::var(&line), Expr::var(&start), Expr::var(&end)],
                ),
            );
            let i = Binding::new(Some(Symbol::intern_static("i")), interval_ty.clone());
            let result_type = Expr::app(Expr::var(&line), Expr::var(&i));
            let params = vec![line.clone(), start.clone(), end.clone(), p, i.clone()];
            let id = defs.add_function(FunctionDef {
                name: Symbol::intern_static("@"),
                params: params.clone(),
                result_type,
                body: None,
                status: Status::HeaderChecked,
            });

            let fun = {
                let j = Binding::new(Some(Symbol::intern_static("j")), interval_ty.clone());
                let codomain = Expr::app(Expr::var(&line), Expr::var(&j));
                Binding::new(
                    Some(Symbol::intern_static("f")),
                    Expr::pi(Sort::STD, vec![j], codomain),
                )
            };
            let mut children = FxHashMap::default();
            children.insert(
                BranchKey::Con(path_con),
                ElimTree::Leaf(LeafElimTree {
                    params: vec![fun.clone(), i.clone()],
                    body: Expr::app(Expr::var(&fun), Expr::var(&i)),
                }),
            );
            let otherwise = ElimTree::Branch(BranchElimTree {
                params: vec![line, start.clone(), end.clone()],
                children,
            });
            let elim = IntervalElim {
                params,
                cases: vec![(Some(Expr::var(&start)), Some(Expr::var(&end)))],
                otherwise: Some(otherwise),
            };
            defs.set_function_body(id, Some(Body::Interval(elim)), Status::NoErrors);
            id
        };

        // coe (A : I -> \Type) (a : A left) (i : I) : A i
        let coerce = {
            let line = Binding::new(Some(Symbol::intern_static("A")), line_of(&interval_ty));
            let start = Binding::new(
                Some(Symbol::intern_static("a")),
                Expr::app(Expr::var(&line), endpoint(defs, left)),
            );
            let i = Binding::new(Some(Symbol::intern_static("i")), interval_ty.clone());
            let result_type = Expr::app(Expr::var(&line), Expr::var(&i));
            let params = vec![line.clone(), start.clone(), i];
            let id = defs.add_function(FunctionDef {
                name: Symbol::intern_static("coe"),
                params,
                result_type,
                body: None,
                status: Status::HeaderChecked,
            });
            let mut children = FxHashMap::default();
            children.insert(
                BranchKey::Con(left),
                ElimTree::Leaf(LeafElimTree {
                    params: vec![],
                    body: Expr::var(&start),
                }),
            );
            let tree = ElimTree::Branch(BranchElimTree {
                params: vec![line, start],
                children,
            });
            defs.set_function_body(id, Some(Body::Tree(tree)), Status::NoErrors);
            id
        };

        // iso (A B : \Type) (f : A -> B) (g : B -> A)
        //     (p : \Pi (x : A) -> g (f x) = x) (q : \Pi (y : B) -> f (g y) = y)
        //     (i : I) : \Type, with endpoints A and B
        let iso = {
            let a = Binding::new(Some(Symbol::intern_static("A")), Expr::universe(Sort::STD));
            let b = Binding::new(Some(Symbol::intern_static("B")), Expr::universe(Sort::STD));
            let arrow = |dom: &Binding, cod: &Binding| {
                let x = Binding::new(None, Expr::var(dom));
                Expr::pi(Sort::STD, vec![x], Expr::var(cod))
            };
            let f = Binding::new(Some(Symbol::intern_static("f")), arrow(&a, &b));
            let g = Binding::new(Some(Symbol::intern_static("g")), arrow(&b, &a));
            let section = |defs: &Definitions,
                           dom: &Binding,
                           outer: &Binding,
                           inner: &Binding|
             -> ExprPtr {
                let x = Binding::new(Some(Symbol::intern_static("x")), Expr::var(dom));
                let round_trip = Expr::app(
                    Expr::var(outer),
                    Expr::app(Expr::var(inner), Expr::var(&x)),
                );
                let eq = Expr::fun_call(
                    defs,
                    path_infix,
                    Sort::STD,
                    vec![Expr::var(dom), round_trip, Expr::var(&x)],
                );
                Expr::pi(Sort::STD, vec![x], eq)
            };
            let p = Binding::new(Some(Symbol::intern_static("p")), section(defs, &a, &g, &f));
            let q = Binding::new(Some(Symbol::intern_static("q")), section(defs, &b, &f, &g));
            let i = Binding::new(Some(Symbol::intern_static("i")), interval_ty.clone());
            let params = vec![a.clone(), b.clone(), f, g, p, q, i];
            let id = defs.add_function(FunctionDef {
                name: Symbol::intern_static("iso"),
                params: params.clone(),
                result_type: Expr::universe(Sort::STD),
                body: None,
                status: Status::HeaderChecked,
            });
            let mut children = FxHashMap::default();
            children.insert(
                BranchKey::Con(left),
                ElimTree::Leaf(LeafElimTree {
                    params: vec![],
                    body: Expr::var(&a),
                }),
            );
            children.insert(
                BranchKey::Con(right),
                ElimTree::Leaf(LeafElimTree {
                    params: vec![],
                    body: Expr::var(&b),
                }),
            );
            let tree = ElimTree::Branch(BranchElimTree {
                params: params[..6].to_vec(),
                children,
            });
            defs.set_function_body(id, Some(Body::Tree(tree)), Status::NoErrors);
            id
        };

        // \data TrP (A : \Type), in \Prop
        //   | inP A
        //   | truncP (a a' : TrP A) (i : I), with boundaries a and a'
        let (prop_trunc, prop_trunc_path_con) = {
            let a = Binding::new(Some(Symbol::intern_static("A")), Expr::universe(Sort::STD));
            let data = defs.add_data(plain_data("TrP", Sort::PROP, vec![a.clone()]));
            let element = Binding::new(None, Expr::var(&a));
            let _in_p =
                defs.add_constructor(plain_con("inP", data, vec![a.clone()], vec![element]));
            let trunc_ty = Expr::data_call(defs, data, Sort::STD, vec![Expr::var(&a)]);
            let x = Binding::new(Some(Symbol::intern_static("a")), trunc_ty.clone());
            let y = Binding::new(Some(Symbol::intern_static("a'")), trunc_ty);
            let i = Binding::new(Some(Symbol::intern_static("i")), interval_ty.clone());
            let con_params = vec![x.clone(), y.clone(), i];
            let con = defs.add_constructor(plain_con(
                "truncP",
                data,
                vec![a],
                con_params.clone(),
            ));
            let elim = IntervalElim {
                params: con_params,
                cases: vec![(Some(Expr::var(&x)), Some(Expr::var(&y)))],
                otherwise: None,
            };
            defs.set_constructor_body(con, Some(Body::Interval(elim)), Status::NoErrors);
            (data, con)
        };

        // \data TrS (A : \Type), in \Set
        //   | inS A
        //   | truncS (a a' : TrS A) (p p' : a = a') (i j : I), constant in j
        //     at the endpoints of i
        let (set_trunc, set_trunc_path_con) = {
            let a = Binding::new(Some(Symbol::intern_static("A")), Expr::universe(Sort::STD));
            let set_sort = Sort::new(Level::new(Some(LevelVariable::P), 0), Level::closed(0));
            let data = defs.add_data(plain_data("TrS", set_sort, vec![a.clone()]));
            let element = Binding::new(None, Expr::var(&a));
            let _in_s =
                defs.add_constructor(plain_con("inS", data, vec![a.clone()], vec![element]));
            let trunc_ty = Expr::data_call(defs, data, Sort::STD, vec![Expr::var(&a)]);
            let x = Binding::new(Some(Symbol::intern_static("a")), trunc_ty.clone());
            let y = Binding::new(Some(Symbol::intern_static("a'")), trunc_ty.clone());
            let constant_line = {
                let k = Binding::new(None, interval_ty.clone());
                Expr::lam(Sort::STD, vec![k], trunc_ty.clone())
            };
            let eq_ty = Expr::data_call(
                defs,
                path,
                Sort::STD,
                vec![constant_line, Expr::var(&x), Expr::var(&y)],
            );
            let p = Binding::new(Some(Symbol::intern_static("p")), eq_ty.clone());
            let p2 = Binding::new(Some(Symbol::intern_static("p'")), eq_ty);
            let i = Binding::new(Some(Symbol::intern_static("i")), interval_ty.clone());
            let j = Binding::new(Some(Symbol::intern_static("j")), interval_ty.clone());
            let con_params = vec![x, y, p.clone(), p2.clone(), i.clone(), j];
            let con = defs.add_constructor(plain_con(
                "truncS",
                data,
                vec![a.clone()],
                con_params.clone(),
            ));
            let project = |defs: &Definitions, along: &Binding| -> ExprPtr {
                let line = {
                    let k = Binding::new(None, interval_ty.clone());
                    Expr::lam(
                        Sort::STD,
                        vec![k],
                        Expr::data_call(defs, data, Sort::STD, vec![Expr::var(&a)]),
                    )
                };
                Expr::fun_call(
                    defs,
                    at,
                    Sort::STD,
                    vec![
                        line,
                        Expr::var(&con_params[0]),
                        Expr::var(&con_params[1]),
                        Expr::var(along),
                        Expr::var(&i),
                    ],
                )
            };
            let elim = IntervalElim {
                params: con_params.clone(),
                cases: vec![
                    (None, None),
                    (Some(project(defs, &p)), Some(project(defs, &p2))),
                ],
                otherwise: None,
            };
            defs.set_constructor_body(con, Some(Body::Interval(elim)), Status::NoErrors);
            (data, con)
        };

        Prelude {
            interval,
            left,
            right,
            nat,
            zero,
            suc,
            path,
            path_con,
            path_infix,
            at,
            coerce,
            iso,
            prop_trunc,
            prop_trunc_path_con,
            set_trunc,
            set_trunc_path_con,
        }
    }

    pub fn interval_type(&self, defs: &Definitions) -> ExprPtr {
        Expr::data_call(defs, self.interval, Sort::PROP, vec![])
    }

    pub fn left_endpoint(&self, defs: &Definitions) -> ExprPtr {
        Expr::con_call(defs, self.left, Sort::PROP, vec![], vec![])
    }

    pub fn right_endpoint(&self, defs: &Definitions) -> ExprPtr {
        Expr::con_call(defs, self.right, Sort::PROP, vec![], vec![])
    }

    /// The numeral `n` as a constructor tower.
    pub fn nat_literal(&self, defs: &Definitions, n: u64) -> ExprPtr {
        let mut expr = Expr::con_call(defs, self.zero, Sort::SET0, vec![], vec![]);
        for _ in 0..n {
            expr = Expr::con_call(defs, self.suc, Sort::SET0, vec![], vec![expr]);
        }
        expr
    }

    /// Read a constructor tower back into a numeral, when `expr` is one.
    pub fn nat_value(&self, expr: &ExprPtr) -> Option<u64> {
        let mut expr = expr.clone();
        let mut value = 0;
        loop {
            let next = match &*expr {
                Expr::ConCall(call) if call.con == self.zero => return Some(value),
                Expr::ConCall(call) if call.con == self.suc => call.args[0].clone(),
                Expr::OfType(inner, _) => inner.clone(),
                _ => return None,
            };
            value += 1;
            expr = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::semantics::Normalizer;
    use crate::elaboration::MetaVars;

    fn setup() -> (Definitions, Prelude, MetaVars) {
        let mut defs = Definitions::new();
        let prelude = Prelude::new(&mut defs);
        (defs, prelude, MetaVars::new())
    }

    #[test]
    fn bootstrap_shapes() {
        let (defs, prelude, _) = setup();
        assert_eq!(defs.data(prelude.interval).constructors.len(), 2);
        assert!(defs.data(prelude.interval).sort.is_prop());
        assert_eq!(defs.data(prelude.nat).constructors.len(), 2);
        assert!(defs.data(prelude.prop_trunc).sort.is_prop());
        assert!(defs.data(prelude.set_trunc).sort.is_set());
        assert!(defs
            .constructor(prelude.prop_trunc_path_con)
            .body
            .is_some());
    }

    #[test]
    fn nat_literals_round_trip() {
        let (defs, prelude, _) = setup();
        let three = prelude.nat_literal(&defs, 3);
        assert_eq!(prelude.nat_value(&three), Some(3));
        assert_eq!(prelude.nat_value(&prelude.interval_type(&defs)), None);
    }

    #[test]
    fn at_projects_endpoints() {
        let (defs, prelude, metas) = setup();
        let norm = Normalizer::new(&defs, &metas, &prelude);

        let line = Binding::new(Some(Symbol::intern("A")), Expr::universe(Sort::STD));
        let start = Binding::new(Some(Symbol::intern("a")), Expr::var(&line));
        let end = Binding::new(Some(Symbol::intern("a'")), Expr::var(&line));
        let p = Binding::new(Some(Symbol::intern("p")), Expr::universe(Sort::STD));
        let args = |point: ExprPtr| {
            vec![
                Expr::var(&line),
                Expr::var(&start),
                Expr::var(&end),
                Expr::var(&p),
                point,
            ]
        };

        let at_left = Expr::fun_call(
            &defs,
            prelude.at,
            Sort::STD,
            args(prelude.left_endpoint(&defs)),
        );
        assert!(matches!(&*norm.whnf(&at_left), Expr::Var(v) if *v == start));

        let at_right = Expr::fun_call(
            &defs,
            prelude.at,
            Sort::STD,
            args(prelude.right_endpoint(&defs)),
        );
        assert!(matches!(&*norm.whnf(&at_right), Expr::Var(v) if *v == end));
    }

    #[test]
    fn at_applies_the_path_function() {
        let (defs, prelude, metas) = setup();
        let norm = Normalizer::new(&defs, &metas, &prelude);

        let f = Binding::new(Some(Symbol::intern("f")), Expr::universe(Sort::STD));
        let data_args = vec![
            Expr::universe(Sort::STD),
            Expr::universe(Sort::STD),
            Expr::universe(Sort::STD),
        ];
        let path_value = Expr::con_call(
            &defs,
            prelude.path_con,
            Sort::STD,
            data_args.clone(),
            vec![Expr::var(&f)],
        );
        let i = Binding::new(Some(Symbol::intern("i")), prelude.interval_type(&defs));
        let mut args = data_args;
        args.push(path_value);
        args.push(Expr::var(&i));
        let applied = Expr::fun_call(&defs, prelude.at, Sort::STD, args);

        match &*norm.whnf(&applied) {
            Expr::App(fun, arg) => {
                assert!(matches!(&**fun, Expr::Var(v) if *v == f));
                assert!(matches!(&**arg, Expr::Var(v) if *v == i));
            }
            other => panic!("expected the path function applied, got {other:?}"),
        }
    }

    #[test]
    fn coe_along_a_constant_line_is_the_identity() {
        let (defs, prelude, metas) = setup();
        let norm = Normalizer::new(&defs, &metas, &prelude);

        let nat_ty = Expr::data_call(&defs, prelude.nat, Sort::SET0, vec![]);
        let constant_line = {
            let i = Binding::new(None, prelude.interval_type(&defs));
            Expr::lam(Sort::STD, vec![i], nat_ty)
        };
        let point = Binding::new(Some(Symbol::intern("i")), prelude.interval_type(&defs));
        let call = Expr::fun_call(
            &defs,
            prelude.coerce,
            Sort::STD,
            vec![
                constant_line,
                prelude.nat_literal(&defs, 2),
                Expr::var(&point),
            ],
        );
        assert_eq!(prelude.nat_value(&norm.whnf(&call)), Some(2));
    }

    #[test]
    fn coe_along_iso_to_right_applies_the_function() {
        let (defs, prelude, metas) = setup();
        let norm = Normalizer::new(&defs, &metas, &prelude);

        let nat_ty = Expr::data_call(&defs, prelude.nat, Sort::SET0, vec![]);
        let f = Binding::new(Some(Symbol::intern("f")), Expr::universe(Sort::STD));
        let g = Binding::new(Some(Symbol::intern("g")), Expr::universe(Sort::STD));
        let p = Binding::new(Some(Symbol::intern("p")), Expr::universe(Sort::STD));
        let q = Binding::new(Some(Symbol::intern("q")), Expr::universe(Sort::STD));
        let line = {
            let i = Binding::new(Some(Symbol::intern("i")), prelude.interval_type(&defs));
            let iso_call = Expr::fun_call(
                &defs,
                prelude.iso,
                Sort::STD,
                vec![
                    nat_ty.clone(),
                    nat_ty.clone(),
                    Expr::var(&f),
                    Expr::var(&g),
                    Expr::var(&p),
                    Expr::var(&q),
                    Expr::var(&i),
                ],
            );
            Expr::lam(Sort::STD, vec![i], iso_call)
        };
        let start = Binding::new(Some(Symbol::intern("a")), nat_ty);
        let call = Expr::fun_call(
            &defs,
            prelude.coerce,
            Sort::STD,
            vec![line, Expr::var(&start), prelude.right_endpoint(&defs)],
        );
        match &*norm.whnf(&call) {
            Expr::App(fun, arg) => {
                assert!(matches!(&**fun, Expr::Var(v) if *v == f));
                assert!(matches!(&**arg, Expr::Var(v) if *v == start));
            }
            other => panic!("expected the isomorphism applied to the start value, got {other:?}"),
        }
    }

    #[test]
    fn trunc_p_computes_at_endpoints() {
        let (defs, prelude, metas) = setup();
        let norm = Normalizer::new(&defs, &metas, &prelude);

        let nat_ty = Expr::data_call(&defs, prelude.nat, Sort::SET0, vec![]);
        let x = Binding::new(Some(Symbol::intern("x")), Expr::universe(Sort::STD));
        let y = Binding::new(Some(Symbol::intern("y")), Expr::universe(Sort::STD));
        let call = Expr::con_call(
            &defs,
            prelude.prop_trunc_path_con,
            Sort::STD,
            vec![nat_ty],
            vec![
                Expr::var(&x),
                Expr::var(&y),
                prelude.left_endpoint(&defs),
            ],
        );
        assert!(matches!(&*norm.whnf(&call), Expr::Var(v) if *v == x));
    }
}
