//! Error handling tests for the formula parser.
//!
//! The parser must never abort: every input yields a root node, malformed
//! subtrees become `Error` nodes, and well-formed siblings are still parsed.

use formula_ast::{ExprKind, spans_are_nested, walk_expr};
use formula_parser::{MAX_NESTING, ParseErrorKind, ParseResult, ParserOptions, parse};
use std::collections::HashSet;

/// Helper to verify that parsing fails with at least one error.
fn expect_error(source: &str) -> ParseResult {
    let result = parse(source, &ParserOptions::default());
    assert!(!result.success, "expected '{source}' to fail");
    assert!(!result.errors.is_empty(), "failure must carry errors");
    result
}

// =============================================================================
// Recovery
// =============================================================================

#[test]
fn test_bad_argument_does_not_hide_siblings() {
    let result = expect_error("F(1 +, G(2))");
    let ExprKind::Call { args, .. } = &result.root.kind else {
        panic!("expected call, got {:?}", result.root.kind);
    };
    assert_eq!(args.len(), 2);
    match &args[0].kind {
        ExprKind::Binary { right, .. } => assert!(right.is_error()),
        other => panic!("expected binary with error operand, got {other:?}"),
    }
    assert!(matches!(&args[1].kind, ExprKind::Call { head, .. } if head.name == "G"));
}

#[test]
fn test_junk_inside_argument_list() {
    let result = expect_error("F(1 2, 3)");
    let ExprKind::Call { args, .. } = &result.root.kind else {
        panic!("expected call");
    };
    assert_eq!(args.len(), 2);
    assert_eq!(result.errors[0].kind, ParseErrorKind::UnexpectedToken);
}

#[test]
fn test_unclosed_paren_reports_eof() {
    let result = expect_error("F(1, 2");
    assert!(
        result
            .errors
            .iter()
            .any(|e| e.kind == ParseErrorKind::UnexpectedEof),
        "got: {:?}",
        result.errors
    );
}

#[test]
fn test_stray_closer_after_expression() {
    let result = expect_error("1 + 2)");
    assert!(matches!(result.root.kind, ExprKind::Binary { .. }));
    assert_eq!(result.errors.len(), 1);
}

#[test]
fn test_unterminated_string_is_lex_error() {
    let result = expect_error(r#"1 & "abc"#);
    assert!(result.errors.iter().any(|e| e.kind == ParseErrorKind::Lex));
}

#[test]
fn test_unknown_character() {
    let result = expect_error("1 # 2");
    assert!(result.errors.iter().any(|e| e.kind == ParseErrorKind::Lex));
}

#[test]
fn test_record_field_must_be_name() {
    let result = expect_error("{1: 2, b: 3}");
    let ExprKind::Record(fields) = &result.root.kind else {
        panic!("expected record");
    };
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].0.name, "b");
}

#[test]
fn test_duplicate_record_field() {
    let result = expect_error("{a: 1, a: 2}");
    assert!(result.errors[0].message.contains("duplicate"));
}

#[test]
fn test_call_on_non_name() {
    let result = expect_error("(1)(2)");
    assert!(result.root.is_error());
}

#[test]
fn test_as_outside_call_arguments() {
    expect_error("T As x");
}

// =============================================================================
// Nesting depth
// =============================================================================

fn expect_too_deep(source: &str) -> ParseResult {
    let result = expect_error(source);
    let kinds: Vec<ParseErrorKind> = result.errors.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![ParseErrorKind::NestedTooDeeply]);
    assert!(spans_are_nested(&result.root));
    result
}

#[test]
fn test_deep_parentheses_are_an_error() {
    for n in [MAX_NESTING, 1_000, 5_000] {
        expect_too_deep(&format!("{}1{}", "(".repeat(n), ")".repeat(n)));
    }
}

#[test]
fn test_nesting_below_limit_parses() {
    let n = MAX_NESTING - 10;
    let result = parse(
        &format!("{}1{}", "(".repeat(n), ")".repeat(n)),
        &ParserOptions::default(),
    );
    assert!(result.success, "{:?}", result.errors);
}

#[test]
fn test_deep_argument_nesting_keeps_siblings() {
    let n = 2_000;
    let source = format!("F({}1{}, 2)", "G(".repeat(n), ")".repeat(n));
    let result = expect_too_deep(&source);
    let ExprKind::Call { args, .. } = &result.root.kind else {
        panic!("expected call, got {:?}", result.root.kind);
    };
    assert_eq!(args.len(), 2);
    assert!(matches!(args[1].kind, ExprKind::NumLit(_) | ExprKind::DecLit(_)));
}

#[test]
fn test_long_operator_chains_are_bounded() {
    let terms = vec!["1"; 5_000];
    expect_too_deep(&terms.join(" + "));
    expect_too_deep(&terms.join(" ^ "));
    expect_too_deep(&format!("{}1", "-".repeat(5_000)));
    expect_too_deep(&format!("a{}", ".b".repeat(5_000)));
}

// =============================================================================
// Side effects
// =============================================================================

#[test]
fn test_set_requires_side_effects() {
    let result = expect_error("Set(x, 1)");
    assert_eq!(result.errors[0].kind, ParseErrorKind::SideEffectsNotAllowed);
    // The call is still built.
    assert!(matches!(result.root.kind, ExprKind::Call { .. }));

    let allowed = parse("Set(x, 1)", &ParserOptions::default().with_side_effects());
    assert!(allowed.success);
}

#[test]
fn test_chaining_requires_side_effects() {
    let result = expect_error("a; b");
    assert_eq!(result.errors[0].kind, ParseErrorKind::SideEffectsNotAllowed);
    assert!(matches!(result.root.kind, ExprKind::Variadic { .. }));
}

// =============================================================================
// Structural invariants
// =============================================================================

const SOURCES: &[&str] = &[
    "1 + 2 * 3",
    "F(1 +, G(2))",
    "F( , 1)",
    "{a: 1, b: }",
    "[1, 2",
    "$\"x{1 + }y\"",
    "a.",
    "(1 + 2",
    "F(a, ;b)",
    "Not",
    "x.y.z(1, , )",
    "-",
    "@",
    "[{a: 1}, {a: 2}].a",
];

#[test]
fn test_spans_are_nested_even_on_errors() {
    for source in SOURCES {
        let result = parse(source, &ParserOptions::default());
        assert!(
            spans_are_nested(&result.root),
            "spans not nested for '{source}': {:#?}",
            result.root
        );
    }
}

#[test]
fn test_node_ids_are_unique() {
    for source in SOURCES {
        let result = parse(source, &ParserOptions::default());
        let mut ids = HashSet::new();
        let mut total = 0;
        walk_expr(&result.root, &mut |e| {
            assert!(e.id.0 < result.node_count);
            ids.insert(e.id);
            total += 1;
        });
        assert_eq!(ids.len(), total, "duplicate node id in '{source}'");
    }
}

#[test]
fn test_comments_are_collected() {
    let result = parse("1 /* one */ + 2 // two", &ParserOptions::default());
    assert!(result.success);
    assert_eq!(result.comments.len(), 2);
    assert_eq!(result.comments[0].text, "/* one */");
    assert!(matches!(result.root.kind, ExprKind::Binary { .. }));
}
