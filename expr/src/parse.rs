use std::sync::LazyLock;

use miette::{Diagnostic, SourceSpan};
use pest::{
    Parser as _,
    error::{ErrorVariant, InputLocation},
    iterators::{Pair, Pairs},
    pratt_parser::{Assoc, Op, PrattParser},
};
use pest_derive::Parser;
use thiserror::Error;

use crate::{BinaryOp, Expr, Literal, PLACEHOLDER, UnaryOp};

/// Deepest bracket or prefix-operator nesting accepted.
pub(crate) const MAX_NESTING: usize = 128;

#[derive(Parser)]
#[grammar = "expr.pest"]
struct ExprParser;

static PRATT: LazyLock<PrattParser<Rule>> = LazyLock::new(|| {
    PrattParser::new()
        .op(Op::infix(Rule::or, Assoc::Left))
        .op(Op::infix(Rule::and, Assoc::Left))
        .op(Op::infix(Rule::eq, Assoc::Left) | Op::infix(Rule::ne, Assoc::Left))
        .op(Op::infix(Rule::lt, Assoc::Left)
            | Op::infix(Rule::le, Assoc::Left)
            | Op::infix(Rule::gt, Assoc::Left)
            | Op::infix(Rule::ge, Assoc::Left))
        .op(Op::infix(Rule::add, Assoc::Left) | Op::infix(Rule::sub, Assoc::Left))
        .op(Op::infix(Rule::mul, Assoc::Left)
            | Op::infix(Rule::div, Assoc::Left)
            | Op::infix(Rule::rem, Assoc::Left))
        .op(Op::prefix(Rule::neg) | Op::prefix(Rule::not))
        .op(Op::postfix(Rule::member) | Op::postfix(Rule::index))
});

#[derive(Clone, Debug, Error, Diagnostic)]
#[error("invalid expression `{src}`: {message}")]
#[diagnostic(code(expr::parse_error))]
pub struct ParseError {
    message: String,
    #[source_code]
    src: String,
    #[label("{message}")]
    span: SourceSpan,
}

impl ParseError {
    fn new(src: &str, offset: usize, len: usize, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            src: src.to_string(),
            span: (offset, len).into(),
        }
    }

    fn from_pest(src: &str, err: pest::error::Error<Rule>) -> Self {
        let (offset, len) = match err.location {
            InputLocation::Pos(pos) => (pos, src[pos..].chars().next().map_or(0, char::len_utf8)),
            InputLocation::Span((start, end)) => (start, end - start),
        };
        let found = match src[offset..].chars().next() {
            Some(c) => format!("unexpected `{c}`"),
            None => "unexpected end of expression".to_string(),
        };
        let message = match err.variant {
            ErrorVariant::ParsingError { positives, .. } => {
                let mut expected: Vec<&str> = positives.into_iter().map(describe).collect();
                expected.sort_unstable();
                expected.dedup();
                if expected.is_empty() {
                    found
                } else {
                    format!("{found}; expected {}", expected.join(", "))
                }
            }
            ErrorVariant::CustomError { message } => message,
        };
        Self::new(src, offset, len, message)
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn offset(&self) -> usize {
        self.span.offset()
    }
}

fn describe(rule: Rule) -> &'static str {
    match rule {
        Rule::or
        | Rule::and
        | Rule::eq
        | Rule::ne
        | Rule::lt
        | Rule::le
        | Rule::gt
        | Rule::ge
        | Rule::add
        | Rule::sub
        | Rule::mul
        | Rule::div
        | Rule::rem => "an operator",
        Rule::member => "`.`",
        Rule::index => "`[`",
        Rule::EOI => "end of expression",
        _ => "a value",
    }
}

pub(crate) fn parse(src: &str) -> Result<Expr, ParseError> {
    prescan(src)?;
    let mut pairs =
        ExprParser::parse(Rule::expression, src).map_err(|e| ParseError::from_pest(src, e))?;
    match pairs.next() {
        Some(expr) => build(src, expr.into_inner()),
        None => Err(ParseError::new(src, 0, 0, "empty expression")),
    }
}

/// Reject what the grammar would only recurse into: unterminated strings and nesting past
/// [`MAX_NESTING`].
fn prescan(src: &str) -> Result<(), ParseError> {
    let mut depth = 0usize;
    let mut prefixes = 0usize;
    let mut quote: Option<(char, usize)> = None;
    let mut escaped = false;

    for (offset, c) in src.char_indices() {
        if let Some((open, _)) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == open {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some((c, offset)),
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            _ => {}
        }
        match c {
            '-' | '!' => prefixes += 1,
            c if c.is_whitespace() => {}
            _ => prefixes = 0,
        }
        if depth + prefixes > MAX_NESTING {
            return Err(ParseError::new(
                src,
                offset,
                c.len_utf8(),
                format!("expression nests deeper than {MAX_NESTING} levels"),
            ));
        }
    }

    match quote {
        Some((_, start)) => Err(ParseError::new(
            src,
            start,
            src.len() - start,
            "unterminated string literal",
        )),
        None => Ok(()),
    }
}

fn build(src: &str, pairs: Pairs<'_, Rule>) -> Result<Expr, ParseError> {
    PRATT
        .map_primary(|pair| primary(src, pair))
        .map_prefix(|op, operand| {
            let operand = operand?;
            Ok(match (op.as_rule(), operand) {
                (Rule::neg, Expr::Literal(Literal::Number(n))) => Expr::number(-n),
                (Rule::neg, operand) => Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                },
                (_, operand) => Expr::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
            })
        })
        .map_postfix(|object, op| {
            let object = object?;
            let span = op.as_span();
            let inner = op.into_inner().next();
            match inner {
                Some(property) if property.as_rule() == Rule::ident => {
                    Ok(object.member(property.as_str()))
                }
                Some(index) => Ok(object.index(build(src, index.into_inner())?)),
                None => Err(ParseError::new(
                    src,
                    span.start(),
                    span.end() - span.start(),
                    "incomplete accessor",
                )),
            }
        })
        .map_infix(|lhs, op, rhs| Ok(Expr::binary(binary_op(op.as_rule()), lhs?, rhs?)))
        .parse(pairs)
}

fn binary_op(rule: Rule) -> BinaryOp {
    match rule {
        Rule::or => BinaryOp::Or,
        Rule::and => BinaryOp::And,
        Rule::eq => BinaryOp::Eq,
        Rule::ne => BinaryOp::Ne,
        Rule::lt => BinaryOp::Lt,
        Rule::le => BinaryOp::Le,
        Rule::gt => BinaryOp::Gt,
        Rule::ge => BinaryOp::Ge,
        Rule::add => BinaryOp::Add,
        Rule::sub => BinaryOp::Sub,
        Rule::mul => BinaryOp::Mul,
        Rule::div => BinaryOp::Div,
        _ => BinaryOp::Rem,
    }
}

fn primary(src: &str, pair: Pair<'_, Rule>) -> Result<Expr, ParseError> {
    let span = pair.as_span();
    match pair.as_rule() {
        Rule::expr => build(src, pair.into_inner()),
        Rule::number => pair.as_str().parse::<f64>().map(Expr::number).map_err(|_| {
            ParseError::new(src, span.start(), span.end() - span.start(), "malformed number")
        }),
        Rule::string => Ok(Expr::string(unescape(
            pair.into_inner().next().map_or("", |inner| inner.as_str()),
        ))),
        Rule::array => pair
            .into_inner()
            .map(|item| build(src, item.into_inner()))
            .collect::<Result<_, _>>()
            .map(Expr::Array),
        Rule::call => {
            let mut inner = pair.into_inner();
            let callee = inner.next().map_or("", |name| name.as_str()).to_string();
            let args = inner
                .map(|arg| build(src, arg.into_inner()))
                .collect::<Result<_, _>>()?;
            Ok(Expr::call(callee, args))
        }
        Rule::ident => Ok(match pair.as_str() {
            "true" => Expr::Literal(Literal::Bool(true)),
            "false" => Expr::Literal(Literal::Bool(false)),
            "null" => Expr::null(),
            name => ident_or_placeholder(name),
        }),
        _ => Err(ParseError::new(
            src,
            span.start(),
            span.end() - span.start(),
            "expected a value",
        )),
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

fn ident_or_placeholder(name: &str) -> Expr {
    if name == PLACEHOLDER {
        return Expr::placeholder(None);
    }
    match name
        .strip_prefix(PLACEHOLDER)
        .and_then(|rest| rest.strip_prefix('_'))
    {
        Some(suffix) if !suffix.is_empty() => Expr::placeholder(Some(suffix)),
        _ => Expr::ident(name),
    }
}
