//! Syntax tree types for the formula language.
//!
//! This crate contains the node definitions shared by the parser, binder and
//! interpreter: [`Span`], [`NodeId`], operators and the immutable [`Expr`]
//! tree.

pub mod expr;
pub mod ops;
pub mod span;
pub mod walk;

pub use expr::{Expr, ExprKind, Ident, NodeId};
pub use ops::{BinaryOp, UnaryOp, VariadicOp};
pub use span::Span;
pub use walk::{spans_are_nested, walk_expr};
