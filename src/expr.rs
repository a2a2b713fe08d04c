//! Computed-parameter expressions: AST and PEST-based parser.
//!
//! Expressions are evaluated lazily by [`crate::env`]; free identifiers are
//! resolved through the owning object's scope chain at evaluation time.

use crate::error::{BinDataError, Result};
use crate::value::Value;
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser as PestParser;
use std::str::FromStr;

#[derive(PestParser)]
#[grammar = "expr.pest"]
struct ExprParser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Shl,
    Shr,
    BitAnd,
    BitXor,
    BitOr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// Expression AST.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Ident(String),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Cond(Box<Expr>, Box<Expr>, Box<Expr>),
}

impl FromStr for Expr {
    type Err = BinDataError;

    fn from_str(source: &str) -> Result<Self> {
        parse(source)
    }
}

/// Parse expression source into an AST.
pub fn parse(source: &str) -> Result<Expr> {
    let pairs = ExprParser::parse(Rule::expression, source)
        .map_err(|e| BinDataError::Expression(format!("parse error: {}", e)))?;
    let expression = pairs
        .into_iter()
        .next()
        .ok_or_else(|| BinDataError::Expression("empty parse".to_string()))?;
    let inner = expression
        .into_inner()
        .find(|p| p.as_rule() == Rule::expr)
        .ok_or_else(|| BinDataError::Expression("empty expression".to_string()))?;
    build_expr(inner)
}

fn malformed(what: &str) -> BinDataError {
    BinDataError::Expression(format!("malformed {}", what))
}

fn build_expr(pair: Pair<Rule>) -> Result<Expr> {
    match pair.as_rule() {
        Rule::expr => {
            let mut it = pair.into_inner();
            let cond = build_expr(it.next().ok_or_else(|| malformed("expr"))?)?;
            match (it.next(), it.next()) {
                (Some(then), Some(otherwise)) => Ok(Expr::Cond(
                    Box::new(cond),
                    Box::new(build_expr(then)?),
                    Box::new(build_expr(otherwise)?),
                )),
                _ => Ok(cond),
            }
        }
        Rule::or_expr => fold_same_op(pair, BinaryOp::Or),
        Rule::and_expr => fold_same_op(pair, BinaryOp::And),
        Rule::cmp_expr | Rule::bor_expr | Rule::bxor_expr | Rule::band_expr
        | Rule::shift_expr | Rule::add_expr | Rule::mul_expr => fold_binary(pair),
        Rule::unary => {
            let mut ops = Vec::new();
            let mut operand = None;
            for inner in pair.into_inner() {
                match inner.as_rule() {
                    Rule::unary_op => ops.push(match inner.as_str() {
                        "-" => UnaryOp::Neg,
                        _ => UnaryOp::Not,
                    }),
                    _ => operand = Some(build_expr(inner)?),
                }
            }
            let mut e = operand.ok_or_else(|| malformed("unary"))?;
            for op in ops.into_iter().rev() {
                e = Expr::Unary(op, Box::new(e));
            }
            Ok(e)
        }
        Rule::postfix => {
            let mut it = pair.into_inner();
            let mut e = build_expr(it.next().ok_or_else(|| malformed("postfix"))?)?;
            for suffix in it {
                match suffix.as_rule() {
                    Rule::member => {
                        let name = suffix
                            .into_inner()
                            .next()
                            .ok_or_else(|| malformed("member"))?;
                        e = Expr::Member(Box::new(e), name.as_str().to_string());
                    }
                    Rule::index => {
                        let idx = suffix
                            .into_inner()
                            .next()
                            .ok_or_else(|| malformed("index"))?;
                        e = Expr::Index(Box::new(e), Box::new(build_expr(idx)?));
                    }
                    _ => return Err(malformed("postfix")),
                }
            }
            Ok(e)
        }
        Rule::primary => build_expr(pair.into_inner().next().ok_or_else(|| malformed("primary"))?),
        Rule::call => {
            let mut it = pair.into_inner();
            let name = it.next().ok_or_else(|| malformed("call"))?.as_str().to_string();
            let args = it.map(build_expr).collect::<Result<Vec<_>>>()?;
            Ok(Expr::Call(name, args))
        }
        Rule::ident => Ok(Expr::Ident(pair.as_str().to_string())),
        Rule::boolean => Ok(Expr::Literal(Value::Bool(pair.as_str() == "true"))),
        Rule::int => pair
            .as_str()
            .parse::<i128>()
            .map(|x| Expr::Literal(Value::Int(x)))
            .map_err(|e| BinDataError::Expression(format!("bad integer '{}': {}", pair.as_str(), e))),
        Rule::hex => i128::from_str_radix(&pair.as_str()[2..], 16)
            .map(|x| Expr::Literal(Value::Int(x)))
            .map_err(|e| BinDataError::Expression(format!("bad hex '{}': {}", pair.as_str(), e))),
        Rule::float => pair
            .as_str()
            .parse::<f64>()
            .map(|x| Expr::Literal(Value::Float(x)))
            .map_err(|e| BinDataError::Expression(format!("bad float '{}': {}", pair.as_str(), e))),
        Rule::string => {
            let raw = pair.into_inner().next().map(|p| p.as_str()).unwrap_or("");
            Ok(Expr::Literal(Value::Bytes(unescape(raw))))
        }
        other => Err(BinDataError::Expression(format!("unexpected rule {:?}", other))),
    }
}

/// `a op b op c` where the operator is implied by the rule (`||`, `&&`).
fn fold_same_op(pair: Pair<Rule>, op: BinaryOp) -> Result<Expr> {
    let mut it = pair.into_inner();
    let mut lhs = build_expr(it.next().ok_or_else(|| malformed("operand"))?)?;
    for rhs in it {
        lhs = Expr::Binary(op, Box::new(lhs), Box::new(build_expr(rhs)?));
    }
    Ok(lhs)
}

/// Left-associative chain with explicit operator pairs between operands.
fn fold_binary(pair: Pair<Rule>) -> Result<Expr> {
    let mut it = pair.into_inner();
    let mut lhs = build_expr(it.next().ok_or_else(|| malformed("operand"))?)?;
    while let Some(op_pair) = it.next() {
        let op = binary_op(op_pair.as_str())?;
        let rhs = build_expr(it.next().ok_or_else(|| malformed("operand"))?)?;
        lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
    }
    Ok(lhs)
}

fn binary_op(s: &str) -> Result<BinaryOp> {
    Ok(match s {
        "*" => BinaryOp::Mul,
        "/" => BinaryOp::Div,
        "%" => BinaryOp::Rem,
        "+" => BinaryOp::Add,
        "-" => BinaryOp::Sub,
        "<<" => BinaryOp::Shl,
        ">>" => BinaryOp::Shr,
        "&" => BinaryOp::BitAnd,
        "^" => BinaryOp::BitXor,
        "|" => BinaryOp::BitOr,
        "==" => BinaryOp::Eq,
        "!=" => BinaryOp::Ne,
        "<" => BinaryOp::Lt,
        "<=" => BinaryOp::Le,
        ">" => BinaryOp::Gt,
        ">=" => BinaryOp::Ge,
        other => return Err(BinDataError::Expression(format!("unknown operator '{}'", other))),
    })
}

fn unescape(raw: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next() {
            Some('n') => out.push(b'\n'),
            Some('t') => out.push(b'\t'),
            Some('0') => out.push(0),
            Some(other) => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
            }
            None => out.push(b'\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(s: &str) -> Box<Expr> {
        Box::new(Expr::Ident(s.to_string()))
    }

    fn int(x: i128) -> Box<Expr> {
        Box::new(Expr::Literal(Value::Int(x)))
    }

    #[test]
    fn parses_precedence() {
        let e = parse("a + 2 * b").expect("parse");
        assert_eq!(
            e,
            Expr::Binary(
                BinaryOp::Add,
                ident("a"),
                Box::new(Expr::Binary(BinaryOp::Mul, int(2), ident("b")))
            )
        );
    }

    #[test]
    fn parses_left_associative_subtraction() {
        let e = parse("a - 1 - 2").expect("parse");
        assert_eq!(
            e,
            Expr::Binary(
                BinaryOp::Sub,
                Box::new(Expr::Binary(BinaryOp::Sub, ident("a"), int(1))),
                int(2)
            )
        );
    }

    #[test]
    fn parses_member_index_and_call() {
        let e = parse("len(hdr.items[0x2])").expect("parse");
        assert_eq!(
            e,
            Expr::Call(
                "len".to_string(),
                vec![Expr::Index(
                    Box::new(Expr::Member(ident("hdr"), "items".to_string())),
                    int(2)
                )]
            )
        );
    }

    #[test]
    fn parses_ternary_and_logic() {
        let e = parse("flags & 1 != 0 && !done ? 4 : 0").expect("parse");
        match e {
            Expr::Cond(cond, then, otherwise) => {
                assert!(matches!(*cond, Expr::Binary(BinaryOp::And, _, _)));
                assert_eq!(*then, Expr::Literal(Value::Int(4)));
                assert_eq!(*otherwise, Expr::Literal(Value::Int(0)));
            }
            other => panic!("expected ternary, got {:?}", other),
        }
    }

    #[test]
    fn distinguishes_bitwise_from_logical_or() {
        assert!(matches!(parse("a | b").expect("parse"), Expr::Binary(BinaryOp::BitOr, _, _)));
        assert!(matches!(parse("a || b").expect("parse"), Expr::Binary(BinaryOp::Or, _, _)));
        assert!(matches!(parse("a << 2").expect("parse"), Expr::Binary(BinaryOp::Shl, _, _)));
        assert!(matches!(parse("a <= 2").expect("parse"), Expr::Binary(BinaryOp::Le, _, _)));
    }

    #[test]
    fn parses_literals() {
        assert_eq!(parse("true").expect("parse"), Expr::Literal(Value::Bool(true)));
        assert_eq!(parse("trueish").expect("parse"), Expr::Ident("trueish".to_string()));
        assert_eq!(parse("1.5").expect("parse"), Expr::Literal(Value::Float(1.5)));
        assert_eq!(
            parse(r#""ab\n""#).expect("parse"),
            Expr::Literal(Value::Bytes(b"ab\n".to_vec()))
        );
        assert_eq!(
            parse("-3").expect("parse"),
            Expr::Unary(UnaryOp::Neg, int(3))
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse("a +").is_err());
        assert!(parse("").is_err());
        assert!(parse("(a").is_err());
    }
}
