//! End-to-end fixed-point scenarios: transitive closure, lattice joins,
//! stratified negation, filters, loop generators and integrity checks.

use silt::eval::Value;
use silt::fixpoint::{saturate, Fact, Options, SaturateError, Solver};
use silt::ir::expr::{BinaryOp, Expr, ExprKind, IrType};
use silt::ir::rule::{
    BodyPredicate, BodyTerm, Constraint, HeadPredicate, HeadTerm, Polarity, Stratum,
};
use silt::ir::symbol::{DefSym, EnumSym, Loc, TableSym, VarSym};
use silt::ir::table::{Attribute, IndexDecl, LatticeOps, Table};
use silt::ir::{Def, Root};

const L: Loc = Loc::UNKNOWN;

fn relation(sym: &TableSym, cols: &[(&str, IrType)]) -> Table {
    Table::Relation {
        sym: sym.clone(),
        attributes: cols
            .iter()
            .map(|(name, tpe)| Attribute::new(*name, tpe.clone()))
            .collect::<Vec<_>>()
            .into(),
    }
}

fn body_atom(table: &TableSym, polarity: Polarity, vars: &[&VarSym]) -> BodyPredicate {
    BodyPredicate::Atom {
        table: table.clone(),
        polarity,
        terms: vars
            .iter()
            .map(|v| BodyTerm::Var((*v).clone()))
            .collect::<Vec<_>>()
            .into(),
    }
}

fn head_atom(table: &TableSym, terms: Vec<HeadTerm>) -> HeadPredicate {
    HeadPredicate::Atom {
        table: table.clone(),
        polarity: Polarity::Positive,
        terms: terms.into(),
    }
}

fn rule(cparams: &[&VarSym], head: HeadPredicate, body: Vec<BodyPredicate>) -> Constraint {
    Constraint {
        cparams: cparams.iter().map(|v| (*v).clone()).collect::<Vec<_>>().into(),
        head,
        body: body.into(),
        loc: L,
    }
}

fn hvar(v: &VarSym) -> HeadTerm {
    HeadTerm::Var(v.clone())
}

fn edge_fact(table: &TableSym, src: &str, dst: &str) -> Fact {
    Fact::Relation {
        table: table.clone(),
        row: [Value::str_(src), Value::str_(dst)].into(),
    }
}

fn str_row(cols: &[&str]) -> Vec<Value> {
    cols.iter().map(|c| Value::str_(*c)).collect()
}

/// Edge and Path with the seed and step rules for transitive closure, plus
/// an index on Path's first column so the step rule probes instead of
/// scanning.
fn closure_root() -> (Root, TableSym, TableSym) {
    let edge = TableSym::new(0, "Edge");
    let path = TableSym::new(1, "Path");
    let x = VarSym::new(0, 0, "x");
    let y = VarSym::new(1, 1, "y");
    let z = VarSym::new(2, 2, "z");
    let mut root = Root::default();
    root.tables.insert(
        edge.clone(),
        relation(&edge, &[("src", IrType::Str), ("dst", IrType::Str)]),
    );
    root.tables.insert(
        path.clone(),
        relation(&path, &[("src", IrType::Str), ("dst", IrType::Str)]),
    );
    root.indexes
        .insert(path.clone(), vec![IndexDecl::new(vec![0])]);
    root.strata = vec![Stratum::new(vec![
        // Path(x, y) :- Edge(x, y).
        rule(
            &[&x, &y],
            head_atom(&path, vec![hvar(&x), hvar(&y)]),
            vec![body_atom(&edge, Polarity::Positive, &[&x, &y])],
        ),
        // Path(x, z) :- Edge(x, y), Path(y, z).
        rule(
            &[&x, &y, &z],
            head_atom(&path, vec![hvar(&x), hvar(&z)]),
            vec![
                body_atom(&edge, Polarity::Positive, &[&x, &y]),
                body_atom(&path, Polarity::Positive, &[&y, &z]),
            ],
        ),
    ])];
    (root, edge, path)
}

#[test]
fn transitive_closure_saturates() {
    let (root, edge, path) = closure_root();
    let facts = vec![edge_fact(&edge, "a", "b"), edge_fact(&edge, "b", "c")];
    let solution = saturate(&root, facts).unwrap();
    for expected in [&["a", "b"], &["b", "c"], &["a", "c"]] {
        assert!(solution.contains(&path, &str_row(expected)));
    }
    assert_eq!(solution.rows(&path).count(), 3);
}

#[test]
fn saturation_is_idempotent() {
    let (root, edge, _path) = closure_root();
    let mut solver = Solver::new(&root, Options::default()).unwrap();
    solver
        .assert_facts(vec![
            edge_fact(&edge, "a", "b"),
            edge_fact(&edge, "b", "c"),
            edge_fact(&edge, "c", "d"),
        ])
        .unwrap();
    solver.saturate().unwrap();
    let derived = solver.stats().facts_derived;
    let rows = solver.relations().total_rows();
    // one extra full run past saturation derives nothing
    solver.saturate().unwrap();
    assert_eq!(solver.stats().facts_derived, derived);
    assert_eq!(solver.relations().total_rows(), rows);
}

#[test]
fn fact_rules_with_literal_heads_seed_the_store() {
    let (mut root, edge, path) = closure_root();
    root.strata[0].constraints.push(rule(
        &[],
        head_atom(
            &edge,
            vec![
                HeadTerm::Lit(Expr::str_("seed", L)),
                HeadTerm::Lit(Expr::str_("leaf", L)),
            ],
        ),
        vec![],
    ));
    let solution = saturate(&root, vec![]).unwrap();
    assert!(solution.contains(&path, &str_row(&["seed", "leaf"])));
}

/// The Belnap four-point lattice {Bot, True, False, Top} under the knowledge
/// order, encoded as an enum with unit payloads and definition-backed
/// operators.
fn belnap_root() -> (Root, EnumSym) {
    let belnap = EnumSym::new(0, "Belnap");
    let tpe = IrType::Enum(belnap.clone());
    let a = VarSym::new(10, 0, "a");
    let b = VarSym::new(11, 1, "b");

    let point = |tag: &str| {
        Expr::new(
            ExprKind::Tag {
                enm: belnap.clone(),
                tag: tag.into(),
                e: Box::new(Expr::unit(L)),
            },
            tpe.clone(),
            L,
        )
    };
    let is_ = |tag: &str, v: &VarSym| {
        Expr::new(
            ExprKind::Is {
                enm: belnap.clone(),
                tag: tag.into(),
                e: Box::new(Expr::var(v.clone(), tpe.clone(), L)),
            },
            IrType::Bool,
            L,
        )
    };
    let ite = |c: Expr, t: Expr, f: Expr, tpe: IrType| Expr::if_then_else(c, t, f, tpe, L);
    let var = |v: &VarSym| Expr::var(v.clone(), tpe.clone(), L);

    // leq: Bot below everything, Top above everything, True/False only
    // below themselves and Top
    let leq_body = ite(
        is_("Bot", &a),
        Expr::bool_(true, L),
        ite(
            is_("Top", &b),
            Expr::bool_(true, L),
            ite(
                is_("True", &a),
                is_("True", &b),
                ite(
                    is_("False", &a),
                    is_("False", &b),
                    Expr::bool_(false, L),
                    IrType::Bool,
                ),
                IrType::Bool,
            ),
            IrType::Bool,
        ),
        IrType::Bool,
    );
    let lub_body = ite(
        is_("Bot", &a),
        var(&b),
        ite(
            is_("Bot", &b),
            var(&a),
            ite(
                is_("Top", &a),
                var(&a),
                ite(
                    is_("Top", &b),
                    var(&b),
                    ite(
                        Expr::binary(BinaryOp::Equal, var(&a), var(&b), IrType::Bool, L),
                        var(&a),
                        point("Top"),
                        tpe.clone(),
                    ),
                    tpe.clone(),
                ),
                tpe.clone(),
            ),
            tpe.clone(),
        ),
        tpe.clone(),
    );
    let glb_body = ite(
        is_("Top", &a),
        var(&b),
        ite(
            is_("Top", &b),
            var(&a),
            ite(
                Expr::binary(BinaryOp::Equal, var(&a), var(&b), IrType::Bool, L),
                var(&a),
                point("Bot"),
                tpe.clone(),
            ),
            tpe.clone(),
        ),
        tpe.clone(),
    );

    let mut root = Root::default();
    let mut install = |id: u32, name: &str, body: Expr, out: IrType| -> DefSym {
        let sym = DefSym::new(id, name);
        root.defs.insert(
            sym.clone(),
            Def {
                sym: sym.clone(),
                formals: [a.clone(), b.clone()].into(),
                body,
                tpe: out,
            },
        );
        sym
    };
    let leq = install(100, "belnapLeq", leq_body, IrType::Bool);
    let lub = install(101, "belnapLub", lub_body, tpe.clone());
    let glb = install(102, "belnapGlb", glb_body, tpe.clone());

    root.lattices.insert(
        tpe.clone(),
        LatticeOps {
            bot: point("Bot"),
            top: point("Top"),
            leq: Expr::new(ExprKind::Def(leq), IrType::Fn, L),
            lub: Expr::new(ExprKind::Def(lub), IrType::Fn, L),
            glb: Expr::new(ExprKind::Def(glb), IrType::Fn, L),
        },
    );
    (root, belnap)
}

fn belnap_value(enm: &EnumSym, tag: &str) -> Value {
    Value::tag(enm.clone(), tag, Value::Unit)
}

#[test]
fn belnap_join_reaches_top() {
    let (mut root, belnap) = belnap_root();
    let tpe = IrType::Enum(belnap.clone());
    let observed = TableSym::new(0, "Observed");
    let flag = TableSym::new(1, "Flag");
    let report = TableSym::new(2, "Report");
    let k = VarSym::new(0, 0, "k");
    let v = VarSym::new(1, 1, "v");

    root.tables.insert(
        observed.clone(),
        relation(&observed, &[("key", IrType::Str), ("value", tpe.clone())]),
    );
    root.tables.insert(
        flag.clone(),
        Table::Lattice {
            sym: flag.clone(),
            keys: [Attribute::new("key", IrType::Str)].into(),
            value: Attribute::new("value", tpe.clone()),
        },
    );
    root.tables.insert(
        report.clone(),
        relation(&report, &[("key", IrType::Str), ("value", tpe.clone())]),
    );
    root.strata = vec![
        // Flag(k; v) :- Observed(k, v).
        Stratum::new(vec![rule(
            &[&k, &v],
            head_atom(&flag, vec![hvar(&k), hvar(&v)]),
            vec![body_atom(&observed, Polarity::Positive, &[&k, &v])],
        )]),
        // Report(k, v) :- Flag(k; v).
        Stratum::new(vec![rule(
            &[&k, &v],
            head_atom(&report, vec![hvar(&k), hvar(&v)]),
            vec![body_atom(&flag, Polarity::Positive, &[&k, &v])],
        )]),
    ];

    let facts = vec![
        Fact::Relation {
            table: observed.clone(),
            row: [Value::str_("wire"), belnap_value(&belnap, "True")].into(),
        },
        Fact::Relation {
            table: observed.clone(),
            row: [Value::str_("wire"), belnap_value(&belnap, "False")].into(),
        },
        Fact::Relation {
            table: observed.clone(),
            row: [Value::str_("calm"), belnap_value(&belnap, "True")].into(),
        },
    ];
    let solution = saturate(&root, facts).unwrap();

    // conflicting observations join to Top, agreeing ones stay put
    assert_eq!(
        solution.lattice_value(&flag, &[Value::str_("wire")]),
        Some(&belnap_value(&belnap, "Top"))
    );
    assert_eq!(
        solution.lattice_value(&flag, &[Value::str_("calm")]),
        Some(&belnap_value(&belnap, "True"))
    );
    // the later stratum reads the saturated lattice through a body atom
    assert!(solution.contains(
        &report,
        &[Value::str_("wire"), belnap_value(&belnap, "Top")]
    ));
    assert_eq!(solution.rows(&report).count(), 2);
}

#[test]
fn bottom_facts_never_materialize() {
    let (mut root, belnap) = belnap_root();
    let tpe = IrType::Enum(belnap.clone());
    let flag = TableSym::new(1, "Flag");
    root.tables.insert(
        flag.clone(),
        Table::Lattice {
            sym: flag.clone(),
            keys: [Attribute::new("key", IrType::Str)].into(),
            value: Attribute::new("value", tpe),
        },
    );
    let mut solver = Solver::new(&root, Options::default()).unwrap();
    solver
        .assert_facts(vec![Fact::Lattice {
            table: flag.clone(),
            key: [Value::str_("k")].into(),
            value: belnap_value(&belnap, "Bot"),
        }])
        .unwrap();
    solver.saturate().unwrap();
    let solution = solver.into_solution();
    assert_eq!(solution.lattice_value(&flag, &[Value::str_("k")]), None);
    assert_eq!(solution.lattice_entries(&flag).count(), 0);
}

#[test]
fn stratified_negation_fails_closed() {
    let node = TableSym::new(0, "Node");
    let edge = TableSym::new(1, "Edge");
    let reached = TableSym::new(2, "Reached");
    let isolated = TableSym::new(3, "Isolated");
    let x = VarSym::new(0, 0, "x");
    let y = VarSym::new(1, 1, "y");

    let mut root = Root::default();
    root.tables
        .insert(node.clone(), relation(&node, &[("n", IrType::Str)]));
    root.tables.insert(
        edge.clone(),
        relation(&edge, &[("src", IrType::Str), ("dst", IrType::Str)]),
    );
    root.tables
        .insert(reached.clone(), relation(&reached, &[("n", IrType::Str)]));
    root.tables
        .insert(isolated.clone(), relation(&isolated, &[("n", IrType::Str)]));
    root.strata = vec![
        // Reached(y) :- Edge(x, y).
        Stratum::new(vec![rule(
            &[&x, &y],
            head_atom(&reached, vec![hvar(&y)]),
            vec![body_atom(&edge, Polarity::Positive, &[&x, &y])],
        )]),
        // Isolated(x) :- Node(x), not Reached(x).
        Stratum::new(vec![rule(
            &[&x],
            head_atom(&isolated, vec![hvar(&x)]),
            vec![
                body_atom(&node, Polarity::Positive, &[&x]),
                body_atom(&reached, Polarity::Negative, &[&x]),
            ],
        )]),
    ];

    let facts = vec![
        Fact::Relation {
            table: node.clone(),
            row: [Value::str_("a")].into(),
        },
        Fact::Relation {
            table: node.clone(),
            row: [Value::str_("b")].into(),
        },
        Fact::Relation {
            table: node.clone(),
            row: [Value::str_("c")].into(),
        },
        edge_fact(&edge, "a", "b"),
    ];
    let solution = saturate(&root, facts).unwrap();
    assert!(solution.contains(&isolated, &str_row(&["a"])));
    assert!(solution.contains(&isolated, &str_row(&["c"])));
    assert!(!solution.contains(&isolated, &str_row(&["b"])));
}

#[test]
fn false_heads_raise_integrity_violations() {
    let edge = TableSym::new(0, "Edge");
    let x = VarSym::new(0, 0, "x");
    let mut root = Root::default();
    root.tables.insert(
        edge.clone(),
        relation(&edge, &[("src", IrType::Str), ("dst", IrType::Str)]),
    );
    // false :- Edge(x, x).
    root.strata = vec![Stratum::new(vec![rule(
        &[&x],
        HeadPredicate::False,
        vec![body_atom(&edge, Polarity::Positive, &[&x, &x])],
    )])];

    let ok = saturate(&root, vec![edge_fact(&edge, "a", "b")]);
    assert!(ok.is_ok());

    let err = saturate(
        &root,
        vec![edge_fact(&edge, "a", "b"), edge_fact(&edge, "c", "c")],
    )
    .unwrap_err();
    assert!(matches!(err, SaturateError::Eval(e) if e.to_string().contains("integrity")));
}

#[test]
fn filters_prune_bindings() {
    let num = TableSym::new(0, "Num");
    let even = TableSym::new(1, "Even");
    let is_even = DefSym::new(0, "isEven");
    let n = VarSym::new(0, 0, "n");
    let mut root = Root::default();
    root.tables
        .insert(num.clone(), relation(&num, &[("n", IrType::I64)]));
    root.tables
        .insert(even.clone(), relation(&even, &[("n", IrType::I64)]));
    root.defs.insert(
        is_even.clone(),
        Def {
            sym: is_even.clone(),
            formals: [n.clone()].into(),
            body: Expr::binary(
                BinaryOp::Equal,
                Expr::binary(
                    BinaryOp::Modulo,
                    Expr::var(n.clone(), IrType::I64, L),
                    Expr::i64_(2, L),
                    IrType::I64,
                    L,
                ),
                Expr::i64_(0, L),
                IrType::Bool,
                L,
            ),
            tpe: IrType::Bool,
        },
    );
    // Even(n) :- Num(n), isEven(n).
    root.strata = vec![Stratum::new(vec![rule(
        &[&n],
        head_atom(&even, vec![hvar(&n)]),
        vec![
            body_atom(&num, Polarity::Positive, &[&n]),
            BodyPredicate::Filter {
                def: is_even,
                args: [BodyTerm::Var(n.clone())].into(),
            },
        ],
    )])];

    let facts = (1..=6)
        .map(|i| Fact::Relation {
            table: num.clone(),
            row: [Value::I64(i)].into(),
        })
        .collect();
    let solution = saturate(&root, facts).unwrap();
    assert_eq!(solution.rows(&even).count(), 3);
    for i in [2, 4, 6] {
        assert!(solution.contains(&even, &[Value::I64(i)]));
    }
}

#[test]
fn loop_generators_bind_each_element() {
    let elem = TableSym::new(0, "Elem");
    let x = VarSym::new(0, 0, "x");
    let mut root = Root::default();
    root.tables
        .insert(elem.clone(), relation(&elem, &[("x", IrType::I64)]));
    // Elem(x) :- x <- (10, 20, 30).
    root.strata = vec![Stratum::new(vec![rule(
        &[&x],
        head_atom(&elem, vec![hvar(&x)]),
        vec![BodyPredicate::Loop {
            var: x.clone(),
            term: HeadTerm::Lit(Expr::tuple(
                vec![Expr::i64_(10, L), Expr::i64_(20, L), Expr::i64_(30, L)],
                L,
            )),
        }],
    )])];
    let solution = saturate(&root, vec![]).unwrap();
    assert_eq!(solution.rows(&elem).count(), 3);
    for i in [10, 20, 30] {
        assert!(solution.contains(&elem, &[Value::I64(i)]));
    }
}

#[test]
fn head_applications_transform_bound_values() {
    let num = TableSym::new(0, "Num");
    let doubled = TableSym::new(1, "Doubled");
    let double = DefSym::new(0, "double");
    let n = VarSym::new(0, 0, "n");
    let mut root = Root::default();
    root.tables
        .insert(num.clone(), relation(&num, &[("n", IrType::I64)]));
    root.tables
        .insert(doubled.clone(), relation(&doubled, &[("n", IrType::I64)]));
    root.defs.insert(
        double.clone(),
        Def {
            sym: double.clone(),
            formals: [n.clone()].into(),
            body: Expr::binary(
                BinaryOp::Times,
                Expr::var(n.clone(), IrType::I64, L),
                Expr::i64_(2, L),
                IrType::I64,
                L,
            ),
            tpe: IrType::I64,
        },
    );
    // Doubled(double(n)) :- Num(n).
    root.strata = vec![Stratum::new(vec![rule(
        &[&n],
        head_atom(
            &doubled,
            vec![HeadTerm::App {
                def: double,
                args: [n.clone()].into(),
            }],
        ),
        vec![body_atom(&num, Polarity::Positive, &[&n])],
    )])];
    let facts = vec![
        Fact::Relation {
            table: num.clone(),
            row: [Value::I64(3)].into(),
        },
        Fact::Relation {
            table: num.clone(),
            row: [Value::I64(4)].into(),
        },
    ];
    let solution = saturate(&root, facts).unwrap();
    assert!(solution.contains(&doubled, &[Value::I64(6)]));
    assert!(solution.contains(&doubled, &[Value::I64(8)]));
}

mod monotonicity {
    use proptest::prelude::*;

    use super::*;

    proptest! {
        /// Growing the initial facts never loses a derived path.
        #[test]
        fn derived_facts_grow_with_the_input(
            edges in prop::collection::hash_set((0u8..5, 0u8..5), 0..10),
            extra in (0u8..5, 0u8..5),
        ) {
            let (root, edge, path) = closure_root();
            let name = |n: u8| n.to_string();
            let fact = |(a, b): (u8, u8)| edge_fact(&edge, &name(a), &name(b));

            let smaller = saturate(&root, edges.iter().copied().map(fact).collect()).unwrap();
            let mut grown: Vec<_> = edges.iter().copied().map(fact).collect();
            grown.push(fact(extra));
            let larger = saturate(&root, grown).unwrap();

            for row in smaller.rows(&path) {
                prop_assert!(larger.contains(&path, row));
            }
        }
    }
}

#[test]
fn unknown_tables_are_rejected_at_ingest() {
    let ghost = TableSym::new(0, "Ghost");
    let x = VarSym::new(0, 0, "x");
    let mut root = Root::default();
    root.strata = vec![Stratum::new(vec![rule(
        &[&x],
        head_atom(&ghost, vec![hvar(&x)]),
        vec![],
    )])];
    let err = saturate(&root, vec![]).unwrap_err();
    assert!(matches!(err, SaturateError::Ingest(_)));
}
