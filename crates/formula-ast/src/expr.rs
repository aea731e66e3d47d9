//! Expression tree.
//!
//! Trees are immutable once the parser hands them out. Children are shared
//! through `Arc` so a sub-expression can be captured for deferred evaluation
//! (lambda and lazy arguments) without cloning the subtree.
//!
//! # Invariants
//!
//! - every node's span is contained in its parent's span
//! - child order is evaluation order (short-circuit operators excepted)
//! - [`NodeId`]s are unique within one parse (assigned as nodes complete,
//!   children before parents), so per-node binding info can live in side
//!   tables

use crate::ops::{BinaryOp, UnaryOp, VariadicOp};
use crate::span::Span;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identity of a node within one parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A name as written, with its location.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
    /// Written as `@name`: resolve against globals only, skipping row scopes.
    pub disambiguated: bool,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
            disambiguated: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub id: NodeId,
    pub span: Span,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    // === Literals ===
    BoolLit(bool),
    NumLit(f64),
    DecLit(Decimal),
    StrLit(String),
    /// `$"..."`: literal runs are `StrLit` children, islands are arbitrary
    /// expressions.
    StrInterp(Vec<Arc<Expr>>),

    // === Operators ===
    Unary {
        op: UnaryOp,
        operand: Arc<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Arc<Expr>,
        right: Arc<Expr>,
    },
    Variadic {
        op: VariadicOp,
        children: Vec<Arc<Expr>>,
    },

    // === Names and calls ===
    Call {
        namespace: Vec<String>,
        head: Ident,
        args: Vec<Arc<Expr>>,
    },
    FirstName(Ident),
    DottedName {
        left: Arc<Expr>,
        right: Ident,
    },
    SelfRef,
    ParentRef,

    // === Aggregates ===
    Record(Vec<(Ident, Arc<Expr>)>),
    Table(Vec<Arc<Expr>>),
    /// `source As alias`; only meaningful as a scope-introducing call argument.
    As {
        left: Arc<Expr>,
        alias: Ident,
    },

    /// Missing operand, e.g. the middle argument of `F(a,,b)`.
    Blank,
    /// Placeholder covering text the parser could not make sense of.
    Error(String),
}

impl Expr {
    pub fn new(id: NodeId, kind: ExprKind, span: Span) -> Self {
        Self { id, span, kind }
    }

    /// Direct children in evaluation order.
    pub fn children(&self) -> Vec<&Arc<Expr>> {
        match &self.kind {
            ExprKind::StrInterp(parts) => parts.iter().collect(),
            ExprKind::Unary { operand, .. } => vec![operand],
            ExprKind::Binary { left, right, .. } => vec![left, right],
            ExprKind::Variadic { children, .. } => children.iter().collect(),
            ExprKind::Call { args, .. } => args.iter().collect(),
            ExprKind::DottedName { left, .. } => vec![left],
            ExprKind::Record(fields) => fields.iter().map(|(_, e)| e).collect(),
            ExprKind::Table(rows) => rows.iter().collect(),
            ExprKind::As { left, .. } => vec![left],
            ExprKind::BoolLit(_)
            | ExprKind::NumLit(_)
            | ExprKind::DecLit(_)
            | ExprKind::StrLit(_)
            | ExprKind::FirstName(_)
            | ExprKind::SelfRef
            | ExprKind::ParentRef
            | ExprKind::Blank
            | ExprKind::Error(_) => Vec::new(),
        }
    }

    pub fn as_str_literal(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::StrLit(s) => Some(s),
            _ => None,
        }
    }

    /// Find the node with `id` in this subtree.
    pub fn find(&self, id: NodeId) -> Option<&Expr> {
        if self.id == id {
            return Some(self);
        }
        self.children().into_iter().find_map(|c| c.find(id))
    }

    /// Dotted path for plain name chains (`a.b.c`), `None` otherwise.
    pub fn as_path(&self) -> Option<Vec<String>> {
        match &self.kind {
            ExprKind::FirstName(ident) => Some(vec![ident.name.clone()]),
            ExprKind::DottedName { left, right } => {
                let mut path = left.as_path()?;
                path.push(right.name.clone());
                Some(path)
            }
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.kind, ExprKind::Error(_))
    }
}
