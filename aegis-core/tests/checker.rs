mod common;

use aegis_ast::ErrorKind;
use aegis_core::{Compiler, CompilerConfig, ForeignTable, SourceUnit, UnitStatus};
use common::{compile, compile_ok, errors_of, has_error, warnings};

#[test]
fn immutable_bindings_cannot_be_reassigned() {
    let out = compile(
        "module M:\n    fn f() -> int:\n        let n = 1\n        n = 2\n        return n\n",
    );
    assert_eq!(out.error_count(), 1, "{:#?}", out.diagnostics);
    let err = errors_of(&out, ErrorKind::Type)[0];
    assert!(err.message.contains("cannot assign to immutable binding `n`"));
    assert_eq!(err.help.as_deref(), Some("declare it with `let mut n`"));

    compile_ok("module M:\n    fn f() -> int:\n        let mut n = 1\n        n = n + 2\n        return n\n");
}

#[test]
fn every_path_must_return_a_value() {
    let out = compile(
        "module M:\n    fn sign(x: int) -> int:\n        if x > 0:\n            return 1\n",
    );
    assert!(has_error(&out, ErrorKind::Type, "missing return in function `sign` returning `int`"));
    let d = out.errors().next().unwrap();
    assert_eq!((d.line, d.column), (2, 8));

    compile_ok(
        "\
module M:
    fn sign(x: int) -> int:
        if x > 0:
            return 1
        elif x < 0:
            return -1
        else:
            return 0
",
    );
}

#[test]
fn await_requires_an_async_function() {
    let out = compile(
        "module Net:\n    fn fetch(url: string) -> string:\n        let body = await http_get(url)\n        return body\n",
    );
    assert!(has_error(&out, ErrorKind::Type, "`await` is only allowed inside an `async fn`"));

    let ir = compile_ok(
        "module Net:\n    async fn fetch(url: string) -> string:\n        let body = await http_get(url)\n        return body\n",
    );
    assert!(ir.function("fetch").unwrap().is_async);
}

#[test]
fn warnings_do_not_fail_the_unit() {
    let out = compile(
        "\
module M:
    fn f() -> int:
        1 + 2
        return 1
        print(\"never\")
",
    );
    assert_eq!(out.error_count(), 0, "{:#?}", out.diagnostics);
    let messages: Vec<&str> = warnings(&out).iter().map(|d| d.message.as_str()).collect();
    assert_eq!(messages, ["expression result is unused", "unreachable code"]);
    assert_eq!(out.units[0].status, UnitStatus::Compiled);
}

#[test]
fn duplicate_bindings_in_one_block_are_name_errors() {
    let out = compile(
        "module M:\n    fn f() -> int:\n        let x = 1\n        let x = 2\n        return x\n",
    );
    assert!(has_error(&out, ErrorKind::Name, "`x` is already declared in this scope"));

    // A nested block may shadow.
    compile_ok(
        "module M:\n    fn f() -> int:\n        let x = 1\n        if x > 0:\n            let x = 2\n            return x\n        return x\n",
    );
}

#[test]
fn payloads_need_a_case_check_first() {
    let out = compile(
        "module Files:\n    fn load(path: string) -> string:\n        let text = read_file(path)\n        return text.value\n",
    );
    let err = errors_of(&out, ErrorKind::Type)[0];
    assert!(
        err.message
            .contains("cannot use `.value` of `Option<string>` without checking that it is `Some`"),
        "{}",
        err.message
    );
    assert_eq!(err.help.as_deref(), Some("check it first: `if text != None:`"));

    compile_ok(
        "\
module Files:
    fn load(path: string) -> string:
        let text = read_file(path)
        if text != None:
            return text.value
        return \"\"

    fn early(path: string) -> string:
        let text = read_file(path)
        if text == None:
            return \"\"
        return text.value

    fn both(r: Result<int, string>) -> string:
        if r == Ok:
            return \"ok\"
        else:
            return r.error
",
    );
}

#[test]
fn reassignment_forgets_an_earlier_case_check() {
    let out = compile(
        "\
module Files:
    fn load(path: string) -> string:
        let mut text = read_file(path)
        if text == None:
            return \"\"
        text = read_file(\"other\")
        return text.value
",
    );
    assert!(has_error(&out, ErrorKind::Type, "without checking that it is `Some`"));
}

#[test]
fn reassignment_in_a_falling_through_branch_forgets_the_check() {
    let out = compile(
        "\
module Files:
    fn load(start: Option<int>) -> int:
        let mut x: Option<int> = start
        if x == Some:
            x = None
        else:
            return 0
        return x.value
",
    );
    let errors = errors_of(&out, ErrorKind::Type);
    assert_eq!(errors.len(), 1, "{:#?}", out.diagnostics);
    assert!(errors[0].message.contains("without checking that it is `Some`"));
    assert_eq!(errors[0].line, 8);

    // Without the reassignment the check carries past the `if`.
    compile_ok(
        "\
module Files:
    fn load(start: Option<int>) -> int:
        let x: Option<int> = start
        if x == Some:
            print(\"some\")
        else:
            return 0
        return x.value
",
    );
}

#[test]
fn a_branch_that_returns_does_not_forget_checks_for_the_other() {
    compile_ok(
        "\
module Files:
    fn load(start: Option<int>, c: bool) -> int:
        let mut x: Option<int> = start
        if x == None:
            return 0
        if c:
            x = None
            return 1
        return x.value
",
    );
}

#[test]
fn loop_bodies_that_reassign_lose_earlier_checks() {
    let out = compile(
        "\
module Files:
    fn sum(start: Option<int>) -> int:
        let mut x: Option<int> = start
        let mut s = 0
        if x == None:
            return 0
        while s < 3:
            s = s + x.value
            x = None
        return s
",
    );
    assert!(
        has_error(&out, ErrorKind::Type, "without checking that it is `Some`"),
        "{:#?}",
        out.diagnostics
    );

    let out = compile(
        "\
module Files:
    fn sum(start: Option<int>, n: int) -> int:
        let mut x: Option<int> = start
        let mut s = 0
        if x == None:
            return 0
        for i in 0..n:
            if i > 1:
                x = None
            s = s + x.value
        return s
",
    );
    assert!(has_error(&out, ErrorKind::Type, "without checking that it is `Some`"));

    // The loop condition is re-checked on every iteration.
    compile_ok(
        "\
module Files:
    fn drain(start: Option<int>) -> int:
        let mut x: Option<int> = start
        let mut s = 0
        while x != None:
            s = s + x.value
            x = None
        return s
",
    );
}

#[test]
fn enum_variants_discriminate_with_equality() {
    compile_ok(
        "\
module Auth:
    enum Role:
        Admin(string)
        Guest

    fn is_admin(r: Role) -> bool:
        return r == Role.Admin
",
    );
    let out = compile(
        "\
module Auth:
    enum Role:
        Admin(string)
        Guest

    fn odd(n: int) -> bool:
        return n == Role.Guest
",
    );
    assert!(has_error(&out, ErrorKind::Type, "cannot compare `int` with `Role.Guest`"));
}

#[test]
fn operators_and_conditions_are_typed() {
    let out = compile(
        "\
module M:
    fn f() -> string:
        if 1:
            return \"a\" + 1
        return \"b\"
",
    );
    assert!(has_error(&out, ErrorKind::Type, "condition must be `bool`, found `int`"));
    assert!(has_error(&out, ErrorKind::Type, "operator `+` cannot be applied to `string` and `int`"));
}

#[test]
fn constants_must_be_compile_time_values() {
    let out = compile("module M:\n    const T: int = current_timestamp()\n");
    assert!(has_error(&out, ErrorKind::Type, "compile-time constant"));

    let ir = compile_ok(
        "module M:\n    const LIMIT: int = 10 * 2\n    fn limit() -> int:\n        return LIMIT + 1\n",
    );
    assert_eq!(ir.constants.len(), 1);
    assert_eq!(ir.constants[0].value, aegis_ir::Constant::Int(20));
}

#[test]
fn void_values_cannot_be_bound() {
    let out = compile("module M:\n    fn f():\n        let x = print(\"hi\")\n");
    assert!(has_error(&out, ErrorKind::Type, "`x` would have type `void`"));
}

#[test]
fn modules_see_each_other_across_units() {
    let a = SourceUnit::new("a.ae", "module A:\n    fn one() -> int:\n        return 1\n");
    let b = SourceUnit::new("b.ae", "module B:\n    fn two() -> int:\n        return A.one() + 1\n");
    let out = Compiler::default().compile_units(&[a, b]);
    assert!(out.succeeded(), "{:#?}", out.diagnostics);
    assert!(out.unit("b.ae").unwrap().ir.as_ref().unwrap().function("two").is_some());

    let a = SourceUnit::new("a.ae", "module A:\n    fn one() -> int:\n        return 1\n");
    let c = SourceUnit::new("c.ae", "module C:\n    fn three() -> int:\n        return A.missing()\n");
    let out = Compiler::default().compile_units(&[a, c]);
    assert_eq!(out.unit("a.ae").unwrap().status, UnitStatus::Compiled);
    assert_eq!(out.unit("c.ae").unwrap().status, UnitStatus::Failed);
    assert!(has_error(&out, ErrorKind::Name, "module `A` has no member `missing`"));
    assert!(out.errors().all(|d| d.file == "c.ae"));
}

#[test]
fn duplicate_modules_are_reported() {
    let a = SourceUnit::new("a.ae", "module A:\n    const X: int = 1\n");
    let b = SourceUnit::new("b.ae", "module A:\n    const Y: int = 2\n");
    let out = Compiler::default().compile_units(&[a, b]);
    assert!(has_error(&out, ErrorKind::Name, "module `A` is declared more than once"));
    assert_eq!(out.unit("b.ae").unwrap().status, UnitStatus::Failed);
}

#[test]
fn foreign_table_comes_from_the_config() {
    let src = "module M:\n    fn nap() -> bool:\n        return sleep(5)\n";
    let out = compile(src);
    assert!(has_error(&out, ErrorKind::Name, "cannot find `sleep` in this scope"));

    let config = CompilerConfig::default()
        .with_foreign(ForeignTable::empty())
        .declare_foreign("sleep", "fn(int) -> bool")
        .unwrap();
    let mut out = Compiler::new(config).compile_source("main.ae", src);
    assert_eq!(out.error_count(), 0, "{:#?}", out.diagnostics);
    let ir = out.units.remove(0).ir.unwrap();
    assert_eq!(ir.foreign.len(), 1);
    assert!(ir.foreign.contains_key("sleep"));
}

#[test]
fn deep_nesting_is_a_resource_limit_error() {
    let expr = format!("{}1{}", "(".repeat(40), ")".repeat(40));
    let src = format!("module M:\n    fn f() -> int:\n        return {expr}\n");
    let out = Compiler::new(CompilerConfig::default().with_max_depth(16)).compile_source("deep.ae", &src);
    assert!(!errors_of(&out, ErrorKind::ResourceLimit).is_empty(), "{:#?}", out.diagnostics);
    assert!(out.units[0].ir.is_none());

    // The default limit accepts it.
    compile_ok(&src);
}

#[test]
fn long_flat_chains_are_a_resource_limit_error() {
    let chain = vec!["1"; 5_000].join(" + ");
    let out = compile(&format!("module M:\n    fn f() -> int:\n        return {chain}\n"));
    assert_eq!(errors_of(&out, ErrorKind::ResourceLimit).len(), 1, "{:#?}", out.diagnostics);
    assert_eq!(out.units[0].status, UnitStatus::Failed);

    let members = format!("t{}", ".next".repeat(5_000));
    let out = compile(&format!("module M:\n    fn f(t: int) -> int:\n        return {members}\n"));
    assert!(!errors_of(&out, ErrorKind::ResourceLimit).is_empty(), "{:#?}", out.diagnostics);
}

#[test]
fn diagnostics_are_sorted_by_position() {
    let out = compile(
        "module M:\n    fn f() -> int:\n        let a = b\n        let c = d\n        return e\n",
    );
    let lines: Vec<u32> = out.diagnostics.iter().map(|d| d.line).collect();
    assert_eq!(lines, [3, 4, 5]);
    assert!(out.diagnostics.iter().all(|d| d.kind == ErrorKind::Name));
}
