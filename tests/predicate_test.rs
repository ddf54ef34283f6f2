//! Predicate evaluator tests.

use std::collections::BTreeMap;

use autolog::{evaluate, Args, Predicate, PredicateError, Value};

fn debug_args(debug: bool) -> Args {
    Args::new().arg("a", 2).arg("b", 3).arg("debug", debug)
}

#[test]
fn debug_gate_scenario() {
    assert!(!evaluate("#debug == true", &debug_args(false)));
    assert!(evaluate("#debug == true", &debug_args(true)));
}

#[test]
fn word_and_symbol_operators_agree() {
    let args = debug_args(true);
    for (symbolic, worded) in [
        ("#a < #b && #debug", "#a lt #b and #debug"),
        ("#a >= 2 || !#debug", "#a ge 2 or not #debug"),
        ("#b != 3", "#b ne 3"),
    ] {
        assert_eq!(evaluate(symbolic, &args), evaluate(worded, &args), "{}", symbolic);
    }
}

#[test]
fn precedence_and_grouping() {
    let args = Args::new().arg("x", 1);
    assert!(evaluate("#x == 1 || #x == 2 && #x == 3", &args));
    assert!(!evaluate("(#x == 1 || #x == 2) && #x == 3", &args));
    assert!(evaluate("!(#x > 5)", &args));
}

#[test]
fn string_literals_and_escapes() {
    let args = Args::new().arg("name", "O'Brien").arg("env", "prod");
    assert!(evaluate("#name == 'O''Brien'", &args));
    assert!(evaluate("#env == \"prod\"", &args));
    assert!(evaluate("#env > 'dev'", &args));
}

#[test]
fn unknown_variable_reads_as_null() {
    let args = Args::new();
    assert!(evaluate("#missing == null", &args));
    assert!(!evaluate("#missing == true", &args));
}

#[test]
fn target_and_property_access() {
    let mut user = BTreeMap::new();
    user.insert("role".to_string(), Value::from("admin"));
    user.insert("age".to_string(), Value::from(41));
    let args = Args::new().target(Value::Map(user));

    assert!(evaluate("#this.role == 'admin'", &args));
    assert!(evaluate("#root.age > 40", &args));
    assert!(evaluate("#this.nickname == null", &args));
}

#[test]
fn negative_and_float_literals() {
    let args = Args::new().arg("delta", -2).arg("ratio", 0.5);
    assert!(evaluate("#delta == -2", &args));
    assert!(evaluate("#ratio < 1", &args));
    assert!(evaluate("#delta lt -1.5", &args));
}

// =============================================================================
// Fail-closed behavior
// =============================================================================

#[test]
fn parse_errors_fail_closed() {
    let args = debug_args(true);
    assert!(!evaluate("#debug ==", &args));
    assert!(!evaluate("debug == true", &args));
    assert!(!evaluate("#debug == 'open", &args));
    assert!(!evaluate("#debug == true)", &args));
}

#[test]
fn type_errors_fail_closed() {
    let args = Args::new().arg("name", "x").arg("n", 1);
    assert!(!evaluate("#name > 3", &args));
    assert!(!evaluate("#n && true", &args));
    assert!(!evaluate("#n.field == 1", &args));
}

#[test]
fn redacted_values_cannot_be_compared() {
    let args = Args::new().redacted("password");
    assert!(!evaluate("#password == '[redacted]'", &args));
    assert!(!evaluate("#password != 'secret'", &args));
}

#[test]
fn deeply_nested_expression_fails_closed() {
    let args = debug_args(true);
    let parens = format!("{}#debug{}", "(".repeat(50_000), ")".repeat(50_000));
    assert!(!evaluate(&parens, &args));
    let nots = format!("{}#debug", "!".repeat(50_000));
    assert!(!evaluate(&nots, &args));

    let err = Predicate::parse(&parens).unwrap_err();
    assert!(err.to_string().contains("nested too deeply"), "{}", err);
}

#[test]
fn parse_error_reports_position() {
    let err = Predicate::parse("#a == == 1").unwrap_err();
    assert!(matches!(err, PredicateError::Parse { position: 6, .. }), "{:?}", err);
    assert!(err.to_string().starts_with("invalid expression at position 6"));
}

#[test]
fn parsed_predicate_is_reusable() {
    let predicate = Predicate::parse("#debug eq true").unwrap();
    assert_eq!(predicate.source(), "#debug eq true");
    assert!(!predicate.eval(&debug_args(false)));
    assert!(predicate.eval(&debug_args(true)));
    assert_eq!(predicate.try_eval(&Args::new().arg("debug", 1)), Ok(false));
}
