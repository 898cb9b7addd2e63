//! Tests for `ReplSession`: persistent environment, error recovery, and the
//! registry shared across inputs.

use std::fs;

use fallen::{CollectConsole, ReplSession, Value};
use pretty_assertions::assert_eq;

fn execute(session: &mut ReplSession, source: &str) -> String {
    let mut console = CollectConsole::new();
    session
        .execute(source, &mut console)
        .unwrap_or_else(|err| panic!("input failed: {err}"));
    console.output().to_owned()
}

#[test]
fn variables_persist_across_inputs() {
    let mut session = ReplSession::new(".");
    execute(&mut session, "x =i 42");
    assert_eq!(execute(&mut session, "write(x)"), "42\n");
    assert_eq!(execute(&mut session, "x =i x + 1\nwrite(x)"), "43\n");
}

#[test]
fn functions_defined_earlier_stay_callable() {
    let mut session = ReplSession::new(".");
    execute(&mut session, "func double(n =i) {\n    return n * 2\n}");
    assert_eq!(execute(&mut session, "write(double(21))"), "42\n");
}

#[test]
fn function_bodies_can_call_functions_from_earlier_inputs() {
    let mut session = ReplSession::new(".");
    execute(&mut session, "func double(n =i) {\n    return n * 2\n}");
    execute(&mut session, "func quad(n =i) {\n    return double(double(n))\n}");
    assert_eq!(execute(&mut session, "write(quad(3))"), "12\n");
}

#[test]
fn errors_leave_the_environment_alive() {
    let mut session = ReplSession::new(".");
    execute(&mut session, "x =i 1");
    let mut console = CollectConsole::new();
    let err = session.execute("boom()", &mut console).unwrap_err();
    assert!(err.to_string().starts_with("Runtime error: Undefined function 'boom'"));
    assert_eq!(execute(&mut session, "write(x)"), "1\n");
}

#[test]
fn parse_errors_are_caught_per_input() {
    let mut session = ReplSession::new(".");
    assert!(session.execute("x =", &mut CollectConsole::new()).is_err());
    execute(&mut session, "x =i 5");
    assert_eq!(execute(&mut session, "write(x)"), "5\n");
}

#[test]
fn session_environment_is_observable() {
    let mut session = ReplSession::new(".");
    execute(&mut session, "x =i 7");
    assert_eq!(session.env().get("x"), Some(&Value::Int(7)));
}

#[test]
fn the_registry_is_shared_across_inputs() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("m.fallen"), "write(\"m-run\")\nx =i 1").unwrap();
    let mut session = ReplSession::new(dir.path());
    assert_eq!(execute(&mut session, "import \"m.fallen\""), "m-run\n");
    // Second import in a later input must not re-run the module body.
    assert_eq!(execute(&mut session, "import \"m.fallen\"\nwrite(x)"), "1\n");
}

#[test]
fn trace_flag_survives_inputs() {
    let mut session = ReplSession::new(".");
    execute(&mut session, "trace on");
    let mut console = CollectConsole::new();
    session.execute("x =i 1", &mut console).unwrap();
    assert!(console.diagnostics().contains("TRACE ip="), "tracing should still be on");
    execute(&mut session, "trace off");
}
