use aegis_ast::{BinOp, ExprKind, ForIter, Item, Stmt, TypeRefKind, UnaryOp};
use aegis_parse::{parse_expr, parse_source, parse_with_recovery};

const USER_SYSTEM: &str = r#"
module UserSystem:
    struct User:
        name: string
        age: int

    enum Role:
        Admin(string)
        Guest

    const LIMIT: int = 10 * 2

    fn get_user(name: string) -> User:
        return User(name, 25)

    async fn load(path: string) -> string:
        let text: Option<string> = await read_file(path)
        if text == None:
            return ""
        return text.value
"#;

#[test]
fn module_members_parse() {
    let program = parse_source(USER_SYSTEM).expect("example should parse");
    assert_eq!(program.modules.len(), 1);
    let module = &program.modules[0];
    assert_eq!(module.name.node, "UserSystem");
    let names: Vec<_> = module.members.iter().map(|m| m.name().node.as_str()).collect();
    assert_eq!(names, ["User", "Role", "LIMIT", "get_user", "load"]);

    let Item::Enum(role) = &module.members[1] else {
        panic!("expected enum");
    };
    assert_eq!(role.variants[0].payload.len(), 1);
    assert!(role.variants[1].payload.is_empty());

    let Item::Fn(load) = &module.members[4] else {
        panic!("expected fn");
    };
    assert!(load.is_async);
    let Stmt::Let(let_text) = &load.body.stmts[0] else {
        panic!("expected let");
    };
    let Some(ty) = &let_text.ty else {
        panic!("expected annotation");
    };
    let TypeRefKind::Named { path, args } = &ty.kind else {
        panic!("expected named type");
    };
    assert_eq!(path[0].node, "Option");
    assert_eq!(args.len(), 1);
    assert!(matches!(let_text.value.kind, ExprKind::Await(_)));
}

#[test]
fn precedence_tiers_nest_as_expected() {
    let e = parse_expr("a || b && c == d < e + f * -g").unwrap();
    let ExprKind::Binary { op: BinOp::Or, right, .. } = &e.kind else {
        panic!("|| should be outermost: {e:?}");
    };
    let ExprKind::Binary { op: BinOp::And, right, .. } = &right.kind else {
        panic!("&& next");
    };
    let ExprKind::Binary { op: BinOp::Eq, right, .. } = &right.kind else {
        panic!("== next");
    };
    let ExprKind::Binary { op: BinOp::Lt, right, .. } = &right.kind else {
        panic!("< next");
    };
    let ExprKind::Binary { op: BinOp::Add, right, .. } = &right.kind else {
        panic!("+ next");
    };
    let ExprKind::Binary { op: BinOp::Mul, right, .. } = &right.kind else {
        panic!("* next");
    };
    assert!(matches!(right.kind, ExprKind::Unary { op: UnaryOp::Neg, .. }));
}

#[test]
fn binary_tiers_are_left_associative() {
    let e = parse_expr("a - b - c").unwrap();
    let ExprKind::Binary { left, op: BinOp::Sub, .. } = &e.kind else {
        panic!("expected subtraction");
    };
    assert!(matches!(left.kind, ExprKind::Binary { op: BinOp::Sub, .. }));
}

#[test]
fn ternary_is_right_associative_and_lowest() {
    let e = parse_expr("a || b ? 1 : c ? 2 : 3").unwrap();
    let ExprKind::Ternary { cond, else_expr, .. } = &e.kind else {
        panic!("expected ternary");
    };
    assert!(matches!(cond.kind, ExprKind::Binary { op: BinOp::Or, .. }));
    assert!(matches!(else_expr.kind, ExprKind::Ternary { .. }));
}

#[test]
fn postfix_chains_left_to_right() {
    let e = parse_expr("users[0].name.len(1)").unwrap();
    let ExprKind::Call { callee, .. } = &e.kind else {
        panic!("call outermost");
    };
    let ExprKind::Member { base, member } = &callee.kind else {
        panic!("member");
    };
    assert_eq!(member.node, "len");
    let ExprKind::Member { base, .. } = &base.kind else {
        panic!("member");
    };
    assert!(matches!(base.kind, ExprKind::Index { .. }));
}

#[test]
fn unary_binds_looser_than_await() {
    let e = parse_expr("-await fetch()").unwrap();
    let ExprKind::Unary { expr, .. } = &e.kind else {
        panic!("unary outermost");
    };
    assert!(matches!(expr.kind, ExprKind::Await(_)));
}

#[test]
fn elif_becomes_nested_if() {
    let src = "module M:\n    fn f(x: int) -> int:\n        if x < 0:\n            return 0\n        elif x < 10:\n            return 1\n        else:\n            return 2\n";
    let program = parse_source(src).unwrap();
    let Item::Fn(f) = &program.modules[0].members[0] else {
        panic!("fn");
    };
    let Stmt::If(outer) = &f.body.stmts[0] else {
        panic!("if");
    };
    let else_block = outer.else_block.as_ref().unwrap();
    let [Stmt::If(inner)] = else_block.stmts.as_slice() else {
        panic!("elif should desugar to a single nested if");
    };
    assert!(inner.else_block.is_some());
}

#[test]
fn for_loops_over_ranges_and_arrays() {
    let src = "module M:\n    fn f(xs: [int]):\n        for i in 0..10:\n            print(\"x\")\n        for x in xs:\n            print(\"y\")\n";
    let program = parse_source(src).unwrap();
    let Item::Fn(f) = &program.modules[0].members[0] else {
        panic!("fn");
    };
    let Stmt::For(range) = &f.body.stmts[0] else {
        panic!("for");
    };
    assert!(matches!(range.iter, ForIter::Range { .. }));
    let Stmt::For(each) = &f.body.stmts[1] else {
        panic!("for");
    };
    assert!(matches!(each.iter, ForIter::Each(_)));
}

#[test]
fn assignment_targets_must_be_places() {
    let src = "module M:\n    fn f():\n        f() = 1\n";
    let err = parse_source(src).expect_err("expected parse error");
    assert!(err.to_string().contains("invalid assignment target"));

    let ok = "module M:\n    fn f():\n        user.name = \"x\"\n        xs[0] = 1\n";
    parse_source(ok).expect("places are assignable");
}

#[test]
fn independent_syntax_errors_are_all_reported() {
    let src = "module M:\n    fn a():\n        let = 1\n        print(\"ok\")\n    fn b():\n        return 1 +\n    fn c() -> int:\n        return 3 3\n    fn d() -> int:\n        return 4\n";
    let parsed = parse_with_recovery(src, 64);
    assert!(parsed.lex_errors.is_empty());
    assert_eq!(parsed.parse_errors.len(), 3, "{:?}", parsed.parse_errors);
    let module = &parsed.program.modules[0];
    assert!(module.members.iter().any(|m| m.name().node == "d"));
    let Some(Item::Fn(a)) = module.members.iter().find(|m| m.name().node == "a") else {
        panic!("fn a should survive its broken statement");
    };
    assert_eq!(a.body.stmts.len(), 1);
}

#[test]
fn broken_header_skips_its_body() {
    let src = "module M:\n    fn a -> int:\n        if true:\n            print(\"x\")\n    fn b():\n        print(\"y\")\n";
    let parsed = parse_with_recovery(src, 64);
    assert_eq!(parsed.parse_errors.len(), 1, "{:?}", parsed.parse_errors);
    let names: Vec<_> = parsed.program.modules[0]
        .members
        .iter()
        .map(|m| m.name().node.clone())
        .collect();
    assert_eq!(names, ["b"]);
}

#[test]
fn pathological_nesting_hits_the_depth_limit() {
    let depth = 5_000;
    let expr = format!("{}1{}", "(".repeat(depth), ")".repeat(depth));
    let src = format!("module M:\n    fn f() -> int:\n        return {expr}\n");
    let parsed = parse_with_recovery(&src, 64);
    assert!(parsed.parse_errors.iter().any(|e| e.resource_limit));
}

#[test]
fn long_operator_chains_are_charged_against_the_depth_limit() {
    let chain = vec!["1"; 5_000].join(" + ");
    let src = format!("module M:\n    fn f() -> int:\n        return {chain}\n");
    let parsed = parse_with_recovery(&src, 64);
    let limits: Vec<_> = parsed.parse_errors.iter().filter(|e| e.resource_limit).collect();
    assert_eq!(limits.len(), 1, "{:?}", parsed.parse_errors);

    let members = format!("a{}", ".b".repeat(5_000));
    let src = format!("module M:\n    fn f() -> int:\n        return {members}\n");
    let parsed = parse_with_recovery(&src, 64);
    assert!(parsed.parse_errors.iter().any(|e| e.resource_limit));

    // Short chains stay well inside the budget.
    let chain = vec!["1"; 40].join(" * ");
    let src = format!("module M:\n    fn f() -> int:\n        return {chain} + a.b.c(1)[0]\n");
    assert!(parse_with_recovery(&src, 64).is_clean());
}

#[test]
fn node_ids_are_unique() {
    let program = parse_source(USER_SYSTEM).unwrap();
    let Item::Fn(load) = &program.modules[0].members[4] else {
        panic!("fn");
    };
    let Stmt::Let(l) = &load.body.stmts[0] else {
        panic!("let");
    };
    let ExprKind::Await(inner) = &l.value.kind else {
        panic!("await");
    };
    assert_ne!(l.value.id, inner.id);
}
