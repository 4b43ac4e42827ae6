mod common;

use aegis_ast::ErrorKind;
use aegis_ir::Type;
use common::{compile, compile_ok, errors_of, has_error};
use proptest::test_runner::{Config, TestCaseError, TestRunner};

#[test]
fn moving_a_struct_twice_reports_the_second_use() {
    let src = "\
module M:
    struct User:
        name: string

    fn make_user() -> User:
        return User(\"ann\")

    fn use(u: User):
        print(u.name)

    fn main():
        let a: User = make_user()
        let b: User = a
        use(a)
";
    let out = compile(src);
    let ownership = errors_of(&out, ErrorKind::Ownership);
    assert_eq!(ownership.len(), 1, "{:#?}", out.diagnostics);
    assert_eq!(out.error_count(), 1);
    assert!(ownership[0].message.contains("use of moved value `a`"));
    let second_use = src.rfind("(a)").unwrap() + 1;
    assert_eq!(ownership[0].span.offset(), second_use);
    assert_eq!(ownership[0].line, 14);
}

#[test]
fn variant_constructed_without_its_payload_is_an_arity_error() {
    let out = compile(
        "\
module M:
    enum Role:
        Admin(string)
        Guest

    fn pick() -> Role:
        return Role.Admin()
",
    );
    assert_eq!(out.error_count(), 1, "{:#?}", out.diagnostics);
    assert!(has_error(
        &out,
        ErrorKind::Type,
        "variant `Role.Admin` expects 1 argument(s), found 0"
    ));
}

#[test]
fn user_system_compiles_cleanly() {
    let ir = compile_ok(
        "\
module UserSystem:
    struct User:
        name: string
        age: int

    fn get_user(name: string) -> User:
        return User(name, 25)
",
    );
    assert_eq!(ir.functions.len(), 1);
    let f = ir.function("get_user").unwrap();
    assert_eq!(f.params.len(), 1);
    assert_eq!(f.params[0].ty, Type::String);
    assert_eq!(f.ret, Type::named("UserSystem", "User"));
    assert!(ir.types.contains_key("UserSystem.User"));
}

#[test]
fn user_system_reports_no_diagnostics_at_all() {
    let out = compile(
        "\
module UserSystem:
    struct User:
        name: string
        age: int

    fn get_user(name: string) -> User:
        return User(name, 25)
",
    );
    assert!(out.diagnostics.is_empty(), "{:#?}", out.diagnostics);
    assert!(out.succeeded());
}

#[test]
fn undeclared_name_points_at_the_use() {
    let out = compile("module M:\n    fn foo() -> int:\n        return x\n");
    assert_eq!(out.diagnostics.len(), 1, "{:#?}", out.diagnostics);
    let d = &out.diagnostics[0];
    assert_eq!(d.kind, ErrorKind::Name);
    assert_eq!((d.line, d.column), (3, 16));
    assert!(d.message.contains("`x`"));
    assert!(out.units[0].ir.is_none());
}

#[test]
fn unchecked_option_from_a_foreign_call_is_a_type_error() {
    let out = compile(
        "\
module Files:
    fn load(path: string) -> string:
        let text: string = read_file(path)
        return text
",
    );
    let errors = errors_of(&out, ErrorKind::Type);
    assert_eq!(errors.len(), 1, "{:#?}", out.diagnostics);
    assert!(
        errors[0]
            .message
            .contains("expected `string`, found `Option<string>`")
    );
    assert!(errors[0].help.as_deref().unwrap_or("").contains("checked with `if`"));
}

#[test]
fn calls_with_the_wrong_argument_count_are_always_rejected() {
    let mut runner = TestRunner::new(Config {
        cases: 48,
        ..Config::default()
    });
    runner
        .run(&(0usize..4, 0usize..4), |(params, args)| {
            let decl: Vec<String> = (0..params).map(|i| format!("p{i}: int")).collect();
            let call: Vec<String> = (0..args).map(|i| i.to_string()).collect();
            let src = format!(
                "module M:\n    fn f({}) -> int:\n        return 0\n\n    fn g() -> int:\n        return f({})\n",
                decl.join(", "),
                call.join(", ")
            );
            let out = compile(&src);
            let arity = format!("function `f` expects {params} argument(s), found {args}");
            if params == args {
                if out.error_count() != 0 {
                    return Err(TestCaseError::fail(format!("{:#?}", out.diagnostics)));
                }
            } else if !has_error(&out, ErrorKind::Type, &arity) {
                return Err(TestCaseError::fail(format!(
                    "missing arity error for {params}/{args}: {:#?}",
                    out.diagnostics
                )));
            }
            Ok(())
        })
        .unwrap();
}
