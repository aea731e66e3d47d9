//! Expression tree walking.
//!
//! A single pre-order `walk_expr` with a closure visitor; passes that need
//! scoped state (the binder, the interpreter) recurse themselves.

use crate::expr::Expr;

/// Visit `expr` and every descendant in pre-order, children left-to-right.
///
/// ```
/// # use formula_ast::*;
/// # use std::sync::Arc;
/// let leaf = Arc::new(Expr::new(NodeId(0), ExprKind::NumLit(1.0), Span::new(0, 1)));
/// let root = Expr::new(
///     NodeId(1),
///     ExprKind::Unary { op: UnaryOp::Neg, operand: leaf },
///     Span::new(0, 2),
/// );
/// let mut count = 0;
/// walk_expr(&root, &mut |_| count += 1);
/// assert_eq!(count, 2);
/// ```
pub fn walk_expr<V>(expr: &Expr, visitor: &mut V)
where
    V: FnMut(&Expr),
{
    visitor(expr);
    for child in expr.children() {
        walk_expr(child, visitor);
    }
}

/// Check the span-containment invariant over a whole tree.
pub fn spans_are_nested(expr: &Expr) -> bool {
    expr.children()
        .into_iter()
        .all(|child| expr.span.contains(&child.span) && spans_are_nested(child))
}
