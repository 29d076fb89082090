//! Code fragment IR
//!
//! Conversion bodies are built as a small statement tree before they are
//! lowered to tokens. Keeping an IR lets tests evaluate a plan directly
//! (see [`crate::eval`]) and lets the lowering pass own every rendering
//! decision about borrows and clones.

use serde_json::Value;
use stubgen_schema::{RustType, Scalar, TypePath};

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// An owned local or by-value parameter.
    Local(String),
    /// A borrowed binding: the source parameter, loop items, `if let` and
    /// `match` bindings.
    Bound(String),
    Field(Box<Expr>, String),
    /// Scalar read with a width or signedness coercion.
    Convert {
        value: Box<Expr>,
        from: Scalar,
        to: Scalar,
    },
    /// Deep copy of the value at a place.
    Cloned(Box<Expr>),
    Some(Box<Expr>),
    Boxed(Box<Expr>),
    Literal {
        value: Value,
        scalar: Scalar,
    },
    DefaultOf(RustType),
    /// Struct literal; unset fields come from `Default`.
    Struct {
        ty: TypePath,
        fields: Vec<(String, Expr)>,
    },
    Variant {
        ty: TypePath,
        variant: String,
        payload: Box<Expr>,
    },
    Call {
        helper: String,
        arg: Box<Expr>,
    },
    /// `Vec::with_capacity(source.len())`
    VecWithCapacity(Box<Expr>),
    /// `HashMap::with_capacity(source.len())`
    MapWithCapacity(Box<Expr>),
}

impl Expr {
    pub fn local(name: impl Into<String>) -> Self {
        Expr::Local(name.into())
    }

    pub fn bound(name: impl Into<String>) -> Self {
        Expr::Bound(name.into())
    }

    pub fn field(self, name: impl Into<String>) -> Self {
        Expr::Field(Box::new(self), name.into())
    }

    pub fn some(self) -> Self {
        Expr::Some(Box::new(self))
    }

    pub fn boxed(self) -> Self {
        Expr::Boxed(Box::new(self))
    }

    pub fn cloned(self) -> Self {
        Expr::Cloned(Box::new(self))
    }

    pub fn convert(self, from: Scalar, to: Scalar) -> Self {
        Expr::Convert {
            value: Box::new(self),
            from,
            to,
        }
    }
}

/// Zero test used for conflated values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Zero {
    Scalar(Scalar),
    Collection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Arm {
    pub ty: TypePath,
    pub variant: String,
    pub bind: String,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Let {
        name: String,
        mutable: bool,
        value: Expr,
    },
    /// `let name;` initialized on every branch that follows.
    Declare(String),
    Assign {
        place: Expr,
        value: Expr,
    },
    IfSome {
        value: Expr,
        bind: String,
        body: Vec<Stmt>,
    },
    IfNone {
        value: Expr,
        body: Vec<Stmt>,
    },
    /// Runs `body` when `value` is the zero value, or when it is not if
    /// `negate` is set.
    IfZero {
        value: Expr,
        zero: Zero,
        negate: bool,
        body: Vec<Stmt>,
    },
    ForEach {
        source: Expr,
        bind: String,
        body: Vec<Stmt>,
    },
    ForEachEntry {
        source: Expr,
        key: String,
        value: String,
        body: Vec<Stmt>,
    },
    Push {
        target: Expr,
        value: Expr,
    },
    Insert {
        target: Expr,
        key: Expr,
        value: Expr,
    },
    Match {
        value: Expr,
        arms: Vec<Arm>,
    },
    Return(Expr),
}

fn expr_calls(expr: &Expr, out: &mut Vec<String>) {
    match expr {
        Expr::Call { helper, arg } => {
            if !out.contains(helper) {
                out.push(helper.clone());
            }
            expr_calls(arg, out);
        }
        Expr::Field(inner, _)
        | Expr::Cloned(inner)
        | Expr::Some(inner)
        | Expr::Boxed(inner)
        | Expr::VecWithCapacity(inner)
        | Expr::MapWithCapacity(inner) => expr_calls(inner, out),
        Expr::Convert { value, .. } => expr_calls(value, out),
        Expr::Variant { payload, .. } => expr_calls(payload, out),
        Expr::Struct { fields, .. } => {
            for (_, e) in fields {
                expr_calls(e, out);
            }
        }
        Expr::Local(_) | Expr::Bound(_) | Expr::Literal { .. } | Expr::DefaultOf(_) => {}
    }
}

fn stmt_calls(stmt: &Stmt, out: &mut Vec<String>) {
    match stmt {
        Stmt::Let { value, .. } | Stmt::Return(value) => expr_calls(value, out),
        Stmt::Declare(_) => {}
        Stmt::Assign { place, value } | Stmt::Push { target: place, value } => {
            expr_calls(place, out);
            expr_calls(value, out);
        }
        Stmt::Insert { target, key, value } => {
            expr_calls(target, out);
            expr_calls(key, out);
            expr_calls(value, out);
        }
        Stmt::IfSome { value, body, .. }
        | Stmt::IfNone { value, body }
        | Stmt::IfZero { value, body, .. } => {
            expr_calls(value, out);
            for s in body {
                stmt_calls(s, out);
            }
        }
        Stmt::ForEach { source, body, .. } | Stmt::ForEachEntry { source, body, .. } => {
            expr_calls(source, out);
            for s in body {
                stmt_calls(s, out);
            }
        }
        Stmt::Match { value, arms } => {
            expr_calls(value, out);
            for arm in arms {
                for s in &arm.body {
                    stmt_calls(s, out);
                }
            }
        }
    }
}

/// Helper procedures referenced by `body`, in first-call order.
pub fn called_helpers(body: &[Stmt]) -> Vec<String> {
    let mut out = Vec::new();
    for stmt in body {
        stmt_calls(stmt, &mut out);
    }
    out
}

/// Statements of `body` and all nested blocks, depth first.
pub fn walk<'a>(body: &'a [Stmt], visit: &mut dyn FnMut(&'a Stmt)) {
    for stmt in body {
        visit(stmt);
        match stmt {
            Stmt::IfSome { body, .. }
            | Stmt::IfNone { body, .. }
            | Stmt::IfZero { body, .. }
            | Stmt::ForEach { body, .. }
            | Stmt::ForEachEntry { body, .. } => walk(body, visit),
            Stmt::Match { arms, .. } => {
                for arm in arms {
                    walk(&arm.body, visit);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_called_helpers_deduplicated_in_order() {
        let call = |name: &str| Expr::Call {
            helper: name.to_string(),
            arg: Box::new(Expr::bound("v").field("a")),
        };
        let body = vec![
            Stmt::Assign {
                place: Expr::local("res").field("a"),
                value: call("decode_a"),
            },
            Stmt::IfSome {
                value: Expr::bound("v").field("b"),
                bind: "x".into(),
                body: vec![Stmt::Assign {
                    place: Expr::local("res").field("b"),
                    value: call("decode_b").some(),
                }],
            },
            Stmt::Push {
                target: Expr::local("items"),
                value: call("decode_a"),
            },
        ];
        assert_eq!(called_helpers(&body), vec!["decode_a", "decode_b"]);
    }
}
