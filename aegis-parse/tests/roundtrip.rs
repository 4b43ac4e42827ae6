use aegis_parse::{format_program, parse_source};
use proptest::{
    prelude::{prop, Just, Strategy},
    prop_oneof,
    test_runner::{Config, TestCaseError, TestRunner},
};

fn assert_roundtrips(src: &str) {
    let first = parse_source(src).unwrap_or_else(|e| panic!("{e:?}\n{src}"));
    let printed = format_program(&first);
    let second = parse_source(&printed).unwrap_or_else(|e| panic!("{e:?}\n{printed}"));
    assert_eq!(first.erase_spans(), second.erase_spans(), "printed:\n{printed}");
    // Printing is idempotent.
    assert_eq!(printed, format_program(&second));
}

#[test]
fn full_language_surface_roundtrips() {
    assert_roundtrips(
        r#"
module UserSystem:
    struct User:
        name: string
        age: int
        tags: [string]

    enum Role:
        Admin(string)
        Pair(int, Other.Thing)
        Guest

    const LIMIT: int = (10 + 2) * -3

    fn get_user(name: string) -> User:
        return User(name, 25)

    async fn load(path: string, cb: fn(int, string) -> bool) -> Result<string, int>:
        let text: Option<string> = await read_file(path)
        let mut n = 0
        if text == None:
            return Err(1)
        elif n > 3 && !false:
            n = n + 1
        else:
            n = n % 2
        for i in 0..LIMIT:
            n = i
        for t in ["a", "b \"q\""]:
            print(t)
        while n >= 0:
            n = n - 1
        let f = 1.5 * 2.0
        let pick = n == 0 ? "zero" : n < 0 ? "neg" : "pos"
        return Ok(text.value)

module Other:
    struct Thing:
        id: int

    fn touch(t: Thing):
        t.id = t.id + 1
        return
"#,
    );
}

#[test]
fn explicit_else_if_and_elif_print_the_same() {
    let a = "module M:\n    fn f(x: int):\n        if x == 1:\n            print(\"a\")\n        else:\n            if x == 2:\n                print(\"b\")\n";
    let b = "module M:\n    fn f(x: int):\n        if x == 1:\n            print(\"a\")\n        elif x == 2:\n            print(\"b\")\n";
    let pa = parse_source(a).unwrap();
    let pb = parse_source(b).unwrap();
    assert_eq!(pa.erase_spans(), pb.erase_spans());
    assert_eq!(format_program(&pa), b);
}

fn expr_source() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        (0i64..10_000).prop_map(|n| n.to_string()),
        (0u32..1000, 0u32..1000).prop_map(|(a, b)| format!("{a}.{b}")),
        prop::sample::select(vec!["a", "b", "user", "xs", "true", "false"])
            .prop_map(str::to_string),
        "[a-z #]{0,6}".prop_map(|s| format!("\"{s}\"")),
        Just("\"say \\\"hi\\\"\"".to_string()),
    ];

    leaf.prop_recursive(4, 48, 4, |inner| {
        prop_oneof![
            (
                inner.clone(),
                prop::sample::select(vec![
                    "+", "-", "*", "/", "%", "==", "!=", "<", "<=", ">", ">=", "&&", "||",
                ]),
                inner.clone(),
            )
                .prop_map(|(l, op, r)| format!("({l} {op} {r})")),
            (prop::sample::select(vec!["-", "+", "!"]), inner.clone())
                .prop_map(|(op, e)| format!("{op}({e})")),
            (inner.clone(), inner.clone(), inner.clone())
                .prop_map(|(c, t, e)| format!("({c} ? {t} : {e})")),
            inner.clone().prop_map(|e| format!("await ({e})")),
            (inner.clone(), prop::collection::vec(inner.clone(), 0..3))
                .prop_map(|(f, args)| format!("({f})({})", args.join(", "))),
            (inner.clone(), inner.clone()).prop_map(|(b, i)| format!("({b})[{i}]")),
            inner.clone().prop_map(|e| format!("({e}).field")),
            prop::collection::vec(inner, 0..3).prop_map(|xs| format!("[{}]", xs.join(", "))),
        ]
    })
}

#[test]
fn random_expressions_roundtrip_through_the_printer() {
    let mut runner = TestRunner::new(Config {
        cases: 256,
        ..Config::default()
    });

    runner
        .run(&expr_source(), |expr| {
            let src = format!("module M:\n    fn f():\n        let x = {expr}\n");
            let first = parse_source(&src).map_err(|e| TestCaseError::fail(format!("{e:?}")))?;
            let printed = format_program(&first);
            let second = parse_source(&printed)
                .map_err(|e| TestCaseError::fail(format!("{e:?}\n{printed}")))?;
            if first.erase_spans() != second.erase_spans() {
                return Err(TestCaseError::fail(format!("{src}\nprinted as\n{printed}")));
            }
            Ok(())
        })
        .map_err(|e| e.to_string())
        .unwrap();
}
