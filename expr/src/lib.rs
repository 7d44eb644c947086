//! Typed expressions for the reactive parameter language consumed by the rendering engine.
//!
//! Expressions are parsed once, rewritten structurally (placeholder substitution, constraint
//! wrapping) and rendered back to text only when the output document is serialized.

use std::{collections::BTreeSet, fmt, str::FromStr};

use serde_json::Value;
use serde_with::{DeserializeFromStr, SerializeDisplay};

mod parse;

pub use parse::ParseError;

/// Token standing for "the node that produces this value" until a concrete id is known.
pub const PLACEHOLDER: &str = "BASE_NAME";

/// Join a node id and an optional signal suffix the way every generated signal is named.
pub fn qualified_name(owner: &str, suffix: Option<&str>) -> String {
    match suffix {
        Some(suffix) => format!("{owner}_{suffix}"),
        None => owner.to_string(),
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq | BinaryOp::Ne => 3,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 4,
            BinaryOp::Add | BinaryOp::Sub => 5,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 6,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        }
    }
}

const UNARY_PRECEDENCE: u8 = 7;
const POSTFIX_PRECEDENCE: u8 = 8;

#[derive(Clone, Debug, PartialEq, SerializeDisplay, DeserializeFromStr)]
pub enum Expr {
    Ident(String),
    /// `BASE_NAME` or `BASE_NAME_<suffix>`.
    Placeholder {
        suffix: Option<String>,
    },
    Member {
        object: Box<Expr>,
        property: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        callee: String,
        args: Vec<Expr>,
    },
    Literal(Literal),
    Array(Vec<Expr>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        parse::parse(input)
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Self::Ident(name.into())
    }

    pub fn placeholder(suffix: Option<&str>) -> Self {
        Self::Placeholder {
            suffix: suffix.map(str::to_string),
        }
    }

    pub fn number(value: f64) -> Self {
        Self::Literal(Literal::Number(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::Literal(Literal::String(value.into()))
    }

    pub fn null() -> Self {
        Self::Literal(Literal::Null)
    }

    pub fn member(self, property: impl Into<String>) -> Self {
        Self::Member {
            object: Box::new(self),
            property: property.into(),
        }
    }

    pub fn index(self, index: Expr) -> Self {
        Self::Index {
            object: Box::new(self),
            index: Box::new(index),
        }
    }

    pub fn call(callee: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::Call {
            callee: callee.into(),
            args,
        }
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Self::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// `clamp(value, min, max)`
    pub fn clamp(value: Expr, min: Expr, max: Expr) -> Self {
        Self::call("clamp", vec![value, min, max])
    }

    /// `nearest(value, candidates)`; `candidates` should evaluate to an array.
    pub fn nearest(value: Expr, candidates: Expr) -> Self {
        Self::call("nearest", vec![value, candidates])
    }

    /// `merge(a, b)`
    pub fn merge(a: Expr, b: Expr) -> Self {
        Self::call("merge", vec![a, b])
    }

    pub fn as_ident(&self) -> Option<&str> {
        match self {
            Self::Ident(name) => Some(name),
            _ => None,
        }
    }

    /// Visit every sub-expression, parents before children.
    pub fn walk(&self, visit: &mut impl FnMut(&Expr)) {
        visit(self);
        match self {
            Self::Ident(_) | Self::Placeholder { .. } | Self::Literal(_) => {}
            Self::Member { object, .. } => object.walk(visit),
            Self::Index { object, index } => {
                object.walk(visit);
                index.walk(visit);
            }
            Self::Call { args, .. } | Self::Array(args) => {
                for arg in args {
                    arg.walk(visit);
                }
            }
            Self::Unary { operand, .. } => operand.walk(visit),
            Self::Binary { lhs, rhs, .. } => {
                lhs.walk(visit);
                rhs.walk(visit);
            }
        }
    }

    /// Signal names this expression reads. Function names and member properties are not
    /// references.
    pub fn references(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.walk(&mut |expr| {
            if let Self::Ident(name) = expr {
                out.insert(name.clone());
            }
        });
        out
    }

    pub fn has_placeholders(&self) -> bool {
        let mut found = false;
        self.walk(&mut |expr| {
            found |= matches!(expr, Self::Placeholder { .. });
        });
        found
    }

    /// Replace every placeholder with the expression `f` returns for its suffix.
    pub fn map_placeholders<F>(&self, mut f: F) -> Expr
    where
        F: FnMut(Option<&str>) -> Expr,
    {
        self.map_placeholders_with(&mut f)
    }

    fn map_placeholders_with<F>(&self, f: &mut F) -> Expr
    where
        F: FnMut(Option<&str>) -> Expr,
    {
        match self {
            Self::Placeholder { suffix } => f(suffix.as_deref()),
            Self::Ident(_) | Self::Literal(_) => self.clone(),
            Self::Member { object, property } => Self::Member {
                object: Box::new(object.map_placeholders_with(f)),
                property: property.clone(),
            },
            Self::Index { object, index } => Self::Index {
                object: Box::new(object.map_placeholders_with(f)),
                index: Box::new(index.map_placeholders_with(f)),
            },
            Self::Call { callee, args } => Self::Call {
                callee: callee.clone(),
                args: args.iter().map(|arg| arg.map_placeholders_with(f)).collect(),
            },
            Self::Array(items) => {
                Self::Array(items.iter().map(|item| item.map_placeholders_with(f)).collect())
            }
            Self::Unary { op, operand } => Self::Unary {
                op: *op,
                operand: Box::new(operand.map_placeholders_with(f)),
            },
            Self::Binary { op, lhs, rhs } => Self::Binary {
                op: *op,
                lhs: Box::new(lhs.map_placeholders_with(f)),
                rhs: Box::new(rhs.map_placeholders_with(f)),
            },
        }
    }

    /// Resolve placeholders to concrete signals owned by `owner`.
    pub fn resolve_placeholders(&self, owner: &str) -> Expr {
        self.map_placeholders(|suffix| Expr::Ident(qualified_name(owner, suffix)))
    }

    /// Literal JSON form, if the expression is a literal or an array of literals.
    pub fn as_json(&self) -> Option<Value> {
        match self {
            Self::Literal(Literal::Null) => Some(Value::Null),
            Self::Literal(Literal::Bool(b)) => Some(Value::Bool(*b)),
            Self::Literal(Literal::Number(n)) => match self.as_number_i64() {
                Some(i) => Some(Value::from(i)),
                None => serde_json::Number::from_f64(*n).map(Value::Number),
            },
            Self::Literal(Literal::String(s)) => Some(Value::String(s.clone())),
            Self::Array(items) => items
                .iter()
                .map(Expr::as_json)
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
            Self::Unary {
                op: UnaryOp::Neg,
                operand,
            } => match operand.as_ref() {
                Self::Literal(Literal::Number(n)) => Self::number(-n).as_json(),
                _ => None,
            },
            _ => None,
        }
    }

    fn as_number_i64(&self) -> Option<i64> {
        match self {
            Self::Literal(Literal::Number(n)) if n.fract() == 0.0 && n.abs() < 1e15 => {
                Some(*n as i64)
            }
            _ => None,
        }
    }

    /// Lift a JSON scalar or array into a literal expression. Objects have no literal form.
    pub fn from_json(value: &Value) -> Option<Self> {
        Some(match value {
            Value::Null => Self::null(),
            Value::Bool(b) => Self::Literal(Literal::Bool(*b)),
            Value::Number(n) => Self::number(n.as_f64()?),
            Value::String(s) => Self::string(s.clone()),
            Value::Array(items) => {
                Self::Array(items.iter().map(Self::from_json).collect::<Option<Vec<_>>>()?)
            }
            Value::Object(_) => return None,
        })
    }

    fn precedence(&self) -> u8 {
        match self {
            Self::Binary { op, .. } => op.precedence(),
            Self::Unary { .. } => UNARY_PRECEDENCE,
            Self::Literal(Literal::Number(n)) if n.is_sign_negative() => UNARY_PRECEDENCE,
            _ => POSTFIX_PRECEDENCE,
        }
    }

    fn fmt_prec(&self, f: &mut fmt::Formatter<'_>, min: u8) -> fmt::Result {
        let parens = self.precedence() < min;
        if parens {
            f.write_str("(")?;
        }
        match self {
            Self::Ident(name) => f.write_str(name)?,
            Self::Placeholder { suffix } => {
                f.write_str(&qualified_name(PLACEHOLDER, suffix.as_deref()))?
            }
            Self::Member { object, property } => {
                object.fmt_prec(f, POSTFIX_PRECEDENCE)?;
                write!(f, ".{property}")?;
            }
            Self::Index { object, index } => {
                object.fmt_prec(f, POSTFIX_PRECEDENCE)?;
                f.write_str("[")?;
                index.fmt_prec(f, 0)?;
                f.write_str("]")?;
            }
            Self::Call { callee, args } => {
                write!(f, "{callee}(")?;
                write_list(f, args)?;
                f.write_str(")")?;
            }
            Self::Literal(literal) => write_literal(f, literal)?,
            Self::Array(items) => {
                f.write_str("[")?;
                write_list(f, items)?;
                f.write_str("]")?;
            }
            Self::Unary { op, operand } => {
                f.write_str(match op {
                    UnaryOp::Neg => "-",
                    UnaryOp::Not => "!",
                })?;
                operand.fmt_prec(f, POSTFIX_PRECEDENCE)?;
            }
            Self::Binary { op, lhs, rhs } => {
                let prec = op.precedence();
                lhs.fmt_prec(f, prec)?;
                write!(f, " {} ", op.symbol())?;
                rhs.fmt_prec(f, prec + 1)?;
            }
        }
        if parens {
            f.write_str(")")?;
        }
        Ok(())
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        item.fmt_prec(f, 0)?;
    }
    Ok(())
}

fn write_literal(f: &mut fmt::Formatter<'_>, literal: &Literal) -> fmt::Result {
    match literal {
        Literal::Null => f.write_str("null"),
        Literal::Bool(b) => write!(f, "{b}"),
        Literal::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
        Literal::Number(n) => write!(f, "{n}"),
        Literal::String(s) => {
            let quoted = serde_json::to_string(s).map_err(|_| fmt::Error)?;
            f.write_str(&quoted)
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_prec(f, 0)
    }
}

impl FromStr for Expr {
    type Err = ParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        parse::parse(input)
    }
}

impl From<Literal> for Expr {
    fn from(value: Literal) -> Self {
        Self::Literal(value)
    }
}
