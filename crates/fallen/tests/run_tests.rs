//! End-to-end scenario tests for the full pipeline: source in, console
//! output (or a formatted error) out.

use fallen::{CollectConsole, Error, run_source};
use pretty_assertions::assert_eq;

/// Runs a program with no scripted input and returns its stdout.
fn run(source: &str) -> String {
    let mut console = CollectConsole::new();
    run_source(source, "t.fallen", ".", &mut console).unwrap_or_else(|err| panic!("program failed: {err}"));
    console.output().to_owned()
}

/// Runs a program expected to fail and returns the rendered error.
fn run_err(source: &str) -> String {
    let mut console = CollectConsole::new();
    let err = run_source(source, "t.fallen", ".", &mut console).expect_err("program should fail");
    err.to_string()
}

#[test]
fn arithmetic_precedence() {
    assert_eq!(run("write(2 + 3 * 4)"), "14\n");
}

#[test]
fn while_loop_counts() {
    let source = "i =i 0\nwhile i < 3 {\n    write(i)\n    i =i i + 1\n}";
    assert_eq!(run(source), "0\n1\n2\n");
}

#[test]
fn set_list_index() {
    let source = "nums =l [10, 20, 30]\nset nums(1) to (99)\nwrite(nums)";
    assert_eq!(run(source), "[10, 99, 30]\n");
}

#[test]
fn recursive_factorial() {
    let source = "\
func f(n =i) {
    if n <= 1 {
        return 1
    }
    return n * f(n - 1)
}
write(f(5))";
    assert_eq!(run(source), "120\n");
}

#[test]
fn match_selects_the_equal_case() {
    let source = "\
match 2 {
    1 { write(\"a\") }
    2 { write(\"b\") }
    else { write(\"c\") }
}";
    assert_eq!(run(source), "b\n");
}

#[test]
fn match_without_matching_case_falls_through() {
    let source = "match 9 {\n    1 { write(\"a\") }\n}\nwrite(\"after\")";
    assert_eq!(run(source), "after\n");
}

#[test]
fn functions_are_callable_before_their_definition() {
    let source = "write(double(21))\nfunc double(n =i) {\n    return n * 2\n}";
    assert_eq!(run(source), "42\n");
}

#[test]
fn short_circuit_skips_the_right_operand() {
    // If the right operand ran, `enter` would consume no input and return
    // "", and conv_bool("") would raise.
    let source = "\
a =b false and conv_bool(enter(\"\"))
b =b true or conv_bool(enter(\"\"))
write(a)
write(b)";
    assert_eq!(run(source), "false\ntrue\n");
}

#[test]
fn short_circuit_evaluates_when_needed() {
    let source = "c =b false or conv_bool(\"true\")\nd =b true and conv_bool(\"false\")\nwrite(c)\nwrite(d)";
    assert_eq!(run(source), "true\nfalse\n");
}

#[test]
fn container_aliasing_is_by_reference() {
    let source = "a =l [1, 2]\nb =l a\nadd b(3)\nwrite(a)";
    assert_eq!(run(source), "[1, 2, 3]\n");
}

#[test]
fn type_marker_mismatch_is_a_runtime_error() {
    let expected = ["Runtime error: Type error: variable 'x' has marker =i but value is str",
        "  ip=0001",
        "  at func <main> (t.fallen:1)"]
    .join("\n");
    assert_eq!(run_err("x =i \"s\""), expected);
}

#[test]
fn parameter_markers_are_checked_at_call_time() {
    let source = "func f(n =i) {\n    return n\n}\nwrite(f(\"s\"))";
    let err = run_err(source);
    assert!(
        err.starts_with("Runtime error: Type error: parameter 'n' of 'f' has marker =i but argument is str"),
        "unexpected error: {err}"
    );
}

#[test]
fn stack_trace_has_one_frame_per_call_plus_main() {
    let source = "\
func inner(n =i) {
    return n / 0
}
func outer(n =i) {
    return inner(n)
}
write(outer(1))";
    let rendered = run_err(source);
    let lines: Vec<&str> = rendered.lines().collect();
    assert_eq!(lines[0], "Runtime error: Division by zero");
    assert!(lines[1].starts_with("  ip="), "unexpected ip line: {}", lines[1]);
    assert_eq!(lines[2], "  at func inner (t.fallen:2)");
    assert_eq!(lines[3], "  at func outer (t.fallen:5)");
    assert_eq!(lines[4], "  at func <main> (t.fallen:7)");
    assert_eq!(lines.len(), 5);
}

#[test]
fn error_struct_exposes_the_trace() {
    let mut console = CollectConsole::new();
    let err = run_source(
        "func g(n =i) {\n    return missing\n}\nwrite(g(1))",
        "t.fallen",
        ".",
        &mut console,
    )
    .unwrap_err();
    let Error::Runtime(err) = err else {
        panic!("expected a runtime error, got {err:?}");
    };
    assert_eq!(err.message, "Undefined variable 'missing'");
    assert_eq!(err.trace.len(), 2);
    assert_eq!(err.trace[0].func_name, "g");
    assert_eq!(err.trace[1].func_name, "<main>");
}

#[test]
fn for_loop_iterates_lists_strings_and_dict_keys() {
    let source = "\
for x in [1, 2] { write(x) }
for c in \"ab\" { write(c) }
d =d {\"k\": 1, \"j\": 2}
for key in d { write(key) }";
    assert_eq!(run(source), "1\n2\na\nb\nk\nj\n");
}

#[test]
fn stop_and_continue_inside_for() {
    let source = "\
for x in [1, 2, 3, 4] {
    if x == 2 { continue }
    if x == 4 { stop }
    write(x)
}
write(\"end\")";
    assert_eq!(run(source), "1\n3\nend\n");
}

#[test]
fn stop_breaks_only_the_innermost_loop() {
    let source = "\
for i in [1, 2] {
    j =i 0
    while j < 10 {
        j =i j + 1
        if j == 2 { stop }
    }
    write(j)
}";
    assert_eq!(run(source), "2\n2\n");
}

#[test]
fn stop_and_continue_inside_match_bind_to_the_enclosing_loop() {
    let source = "\
i =i 0
while i < 5 {
    i =i i + 1
    match i {
        2 { continue }
        4 { stop }
    }
    write(i)
}
write(\"done\")";
    assert_eq!(run(source), "1\n3\ndone\n");
}

#[test]
fn conversions_and_try_variants() {
    let source = "\
write(conv_int(\"12\"))
write(conv_float(2))
write(conv_bool(0))
write(try_conv_int(\"abc\"))
write(try_conv_float(\"2.5\"))";
    assert_eq!(run(source), "12\n2.0\nfalse\nnull\n2.5\n");
}

#[test]
fn conv_failure_message_quotes_the_value() {
    assert!(run_err("x =i conv_int(\"abc\")").starts_with("Runtime error: Cannot convert to int: \"abc\""));
}

#[test]
fn amount_of_strings_lists_and_dicts() {
    let source = "write(amount(\"héllo\"))\nwrite(amount([1, 2]))\nwrite(amount({\"a\": 1}))";
    assert_eq!(run(source), "5\n2\n1\n");
    assert!(run_err("write(amount(1))").starts_with("Runtime error: 'amount' expects a str, list, or dict, got int"));
}

#[test]
fn amount_arity_fails_before_execution() {
    assert_eq!(
        run_err("write(amount())"),
        "Compile error: 'amount' takes 1 argument but 0 were given (t.fallen:1)"
    );
}

#[test]
fn del_pops_and_returns() {
    let source = "xs =l [1, 2, 3]\nwrite(del(xs))\nwrite(xs)";
    assert_eq!(run(source), "3\n[1, 2]\n");
}

#[test]
fn string_indexing_yields_one_character_strings() {
    let source = "s =s \"héllo\"\nwrite(call s(1))";
    assert_eq!(run(source), "é\n");
}

#[test]
fn dict_set_get_and_remove_by_key() {
    let source = "\
d =d {\"a\": 1}
set d(\"b\") to 2
write(call d(\"b\"))
remove d(\"a\")
write(d)";
    assert_eq!(run(source), "2\n{\"b\": 2}\n");
}

#[test]
fn insert_and_remove_on_lists() {
    let source = "xs =l [1, 3]\ninsert xs(1, 2)\nwrite(xs)\nremove xs(0)\nwrite(xs)";
    assert_eq!(run(source), "[1, 2, 3]\n[2, 3]\n");
}

#[test]
fn enter_reads_scripted_input() {
    let mut console = CollectConsole::with_input(&["bob"]);
    run_source("name =s enter(\"? \")\nwrite(name)", "t.fallen", ".", &mut console).unwrap();
    assert_eq!(console.output(), "? bob\n");
    assert_eq!(console.remaining_input(), 0);
}

#[test]
fn division_by_zero_and_index_errors() {
    assert!(run_err("write(1 / 0)").starts_with("Runtime error: Division by zero"));
    assert!(run_err("xs =l [1]\nwrite(call xs(5))").starts_with("Runtime error: Index out of range: 5 (len 1)"));
    assert!(run_err("d =d {}\nwrite(call d(\"k\"))").starts_with("Runtime error: Key not found: \"k\""));
}

#[test]
fn conditions_must_be_bool() {
    assert!(run_err("if 1 { }").starts_with("Runtime error: Condition must be a bool, got int"));
    assert!(run_err("while \"x\" { }").starts_with("Runtime error: Condition must be a bool, got str"));
}

#[test]
fn float_display_uses_shortest_form() {
    assert_eq!(run("write(2.5)\nwrite(1.0 / 2.0)\nwrite(3.0)"), "2.5\n0.5\n3.0\n");
}

#[test]
fn string_concatenation_and_equality() {
    let source = "s =s \"ab\" + \"cd\"\nwrite(s)\nwrite(s == \"abcd\")\nwrite([1, 2] == [1, 2])";
    assert_eq!(run(source), "abcd\ntrue\ntrue\n");
}

#[test]
fn trace_mode_emits_exact_lines_to_the_diagnostic_sink() {
    let mut console = CollectConsole::new();
    run_source("trace on\nwrite(1)\ntrace off", "t.fallen", ".", &mut console).unwrap();
    assert_eq!(console.output(), "1\n");
    assert_eq!(
        console.diagnostics(),
        "TRACE ip=0001 (LOAD_CONST, 0) stack=0\n\
         TRACE ip=0002 (CALL, 1) stack=1\n\
         TRACE ip=0003 (POP, 0) stack=1\n\
         TRACE ip=0004 (TRACE_OFF, 0) stack=0\n"
    );
}

#[test]
fn arity_mismatch_is_a_runtime_error() {
    let source = "func f(a =i, b =i) {\n    return a + b\n}\nwrite(f(1))";
    assert!(run_err(source).starts_with("Runtime error: Function 'f' takes 2 arguments but 1 were given"));
}

#[test]
fn undefined_names_are_runtime_errors() {
    assert!(run_err("write(x)").starts_with("Runtime error: Undefined variable 'x'"));
    assert!(run_err("f()").starts_with("Runtime error: Undefined function 'f'"));
}
