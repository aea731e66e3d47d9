//! Operator precedence, associativity and literal tests.

use formula_ast::{Expr, ExprKind, VariadicOp};
use formula_parser::{Culture, ParserOptions, parse};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Parse and require success.
fn parse_ok(source: &str) -> Arc<Expr> {
    parse_with(source, &ParserOptions::default())
}

fn parse_with(source: &str, options: &ParserOptions) -> Arc<Expr> {
    let result = parse(source, options);
    assert!(
        result.success,
        "expected '{}' to parse, got: {:?}",
        source, result.errors
    );
    result.root
}

/// Compact prefix rendering for shape assertions.
fn sexpr(expr: &Expr) -> String {
    fn list(items: &[Arc<Expr>]) -> String {
        items.iter().map(|e| sexpr(e)).collect::<Vec<_>>().join(" ")
    }
    match &expr.kind {
        ExprKind::BoolLit(b) => b.to_string(),
        ExprKind::NumLit(n) => n.to_string(),
        ExprKind::DecLit(d) => d.to_string(),
        ExprKind::StrLit(s) => format!("{s:?}"),
        ExprKind::FirstName(ident) => ident.name.clone(),
        ExprKind::Unary { op, operand } => format!("({op} {})", sexpr(operand)),
        ExprKind::Binary { op, left, right } => {
            format!("({op} {} {})", sexpr(left), sexpr(right))
        }
        ExprKind::DottedName { left, right } => format!("(. {} {})", sexpr(left), right.name),
        ExprKind::Call {
            namespace,
            head,
            args,
        } => {
            let mut name = namespace.join(".");
            if !name.is_empty() {
                name.push('.');
            }
            name.push_str(&head.name);
            format!("({name} {})", list(args))
        }
        ExprKind::Variadic { children, .. } => format!("(; {})", list(children)),
        ExprKind::Blank => "_".to_string(),
        ExprKind::Error(_) => "<err>".to_string(),
        other => format!("{other:?}"),
    }
}

fn shape(source: &str) -> String {
    sexpr(&parse_ok(source))
}

#[test]
fn test_multiplication_binds_tighter_than_addition() {
    assert_eq!(shape("1 + 2 * 3"), "(+ 1 (* 2 3))");
}

#[test]
fn test_subtraction_is_left_associative() {
    assert_eq!(shape("1 - 2 - 3"), "(- (- 1 2) 3)");
}

#[test]
fn test_power_is_right_associative() {
    assert_eq!(shape("2 ^ 3 ^ 2"), "(^ 2 (^ 3 2))");
}

#[test]
fn test_prefix_minus_binds_tighter_than_power() {
    assert_eq!(shape("-2 ^ 2"), "(^ (- 2) 2)");
}

#[test]
fn test_logical_precedence() {
    assert_eq!(shape("a = 1 And b Or c"), "(Or (And (= a 1) b) c)");
    assert_eq!(shape("a || b && c"), "(Or a (And b c))");
}

#[test]
fn test_concat_below_addition() {
    assert_eq!(shape(r#""n" & 1 + 2"#), r#"(& "n" (+ 1 2))"#);
}

#[test]
fn test_not_is_prefix_unary() {
    assert_eq!(shape("Not a = b"), "(= (Not a) b)");
    assert_eq!(shape("!a"), "(Not a)");
}

#[test]
fn test_percent_postfix() {
    assert_eq!(shape("50% * 2"), "(* (% 50) 2)");
}

#[test]
fn test_in_and_dotted_names() {
    assert_eq!(shape("x in T.Name"), "(in x (. T Name))");
    assert_eq!(shape("a.b.c"), "(. (. a b) c)");
}

#[test]
fn test_namespaced_call() {
    assert_eq!(shape("Ns.Sub.Func(1, 2)"), "(Ns.Sub.Func 1 2)");
}

#[test]
fn test_missing_arguments_are_blank() {
    assert_eq!(shape("F(a,,b)"), "(F a _ b)");
}

#[test]
fn test_decimal_literals_by_default() {
    let root = parse_ok("1.5");
    assert_eq!(root.kind, ExprKind::DecLit(Decimal::new(15, 1)));

    let root = parse_ok("2e-3");
    assert_eq!(root.kind, ExprKind::DecLit(Decimal::new(2, 3)));

    let root = parse_ok(".25");
    assert_eq!(root.kind, ExprKind::DecLit(Decimal::new(25, 2)));
}

#[test]
fn test_numbers_as_float_option() {
    let options = ParserOptions::default().with_numbers_as_float();
    assert_eq!(parse_with("1.5", &options).kind, ExprKind::NumLit(1.5));
}

#[test]
fn test_comma_decimal_culture() {
    let options = ParserOptions::default().with_culture(Culture::CommaDecimal);
    let root = parse_with("F(1,5; 2)", &options);
    assert_eq!(sexpr(&root), "(F 1.5 2)");
}

#[test]
fn test_chain_with_side_effects() {
    let options = ParserOptions::default().with_side_effects();
    let root = parse_with("Set(x, 1); x + 1;", &options);
    match &root.kind {
        ExprKind::Variadic { op, children } => {
            assert_eq!(*op, VariadicOp::Chain);
            assert_eq!(children.len(), 2);
        }
        other => panic!("expected chain, got {other:?}"),
    }
}

#[test]
fn test_interpolated_string_parts() {
    let root = parse_ok(r#"$"Hello {name}!""#);
    let ExprKind::StrInterp(parts) = &root.kind else {
        panic!("expected interpolation, got {:?}", root.kind);
    };
    let rendered: Vec<String> = parts.iter().map(|p| sexpr(p)).collect();
    assert_eq!(rendered, vec![r#""Hello ""#, "name", r#""!""#]);
}

#[test]
fn test_record_and_table_literals() {
    let root = parse_ok("[{a: 1, b: \"x\"}, {a: 2}]");
    let ExprKind::Table(rows) = &root.kind else {
        panic!("expected table, got {:?}", root.kind);
    };
    assert_eq!(rows.len(), 2);
    let ExprKind::Record(fields) = &rows[0].kind else {
        panic!("expected record");
    };
    let names: Vec<&str> = fields.iter().map(|(n, _)| n.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
}

#[test]
fn test_as_alias_in_call_argument() {
    let root = parse_ok("ForAll(T As row, row.a)");
    let ExprKind::Call { args, .. } = &root.kind else {
        panic!("expected call");
    };
    match &args[0].kind {
        ExprKind::As { left, alias } => {
            assert_eq!(sexpr(left), "T");
            assert_eq!(alias.name, "row");
        }
        other => panic!("expected As, got {other:?}"),
    }
}

#[test]
fn test_disambiguated_name() {
    let root = parse_ok("@x");
    match &root.kind {
        ExprKind::FirstName(ident) => {
            assert!(ident.disambiguated);
            assert_eq!(ident.name, "x");
        }
        other => panic!("expected name, got {other:?}"),
    }
}

#[test]
fn test_self_and_parent() {
    assert_eq!(parse_ok("Self").kind, ExprKind::SelfRef);
    assert!(matches!(
        &parse_ok("Parent.Width").kind,
        ExprKind::DottedName { left, right } if left.kind == ExprKind::ParentRef && right.name == "Width"
    ));
}

#[test]
fn test_empty_formula_is_blank() {
    assert_eq!(parse_ok("").kind, ExprKind::Blank);
    assert_eq!(parse_ok("  // only a comment").kind, ExprKind::Blank);
}
