//! Lazy evaluation of parameters in an object's scope.
//!
//! A name used by a parameter of object E is resolved, in order, against:
//! the evaluation overrides, E's locals (`index` for array elements), the
//! extra parameters of E's parent P (evaluated in P), the fields of P, and
//! then the same lookup starting from P. Evaluation is re-run on every use;
//! nothing is cached.

use crate::ast::Param;
use crate::error::{BinDataError, Result};
use crate::expr::{BinaryOp, Expr, UnaryOp};
use crate::registry::Kind;
use crate::tree::{truth, ObjectId, Tree};
use crate::value::Value;
use std::cmp::Ordering;

/// Nesting limit for parameters whose evaluation needs other parameters.
/// Cyclic references between computed parameters hit this instead of
/// overflowing the stack.
pub(crate) const MAX_EVAL_DEPTH: usize = 64;

/// Result of a lookup: a plain value, or a data object whose value is
/// taken only when needed (so `hdr.len` and `items[2]` can navigate).
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Operand {
    Value(Value),
    Object(ObjectId),
}

/// Names bound for one evaluation only (`offset`, `value`, `index`,
/// `element`, `array`). They shadow everything else.
#[derive(Debug, Clone, Default)]
pub(crate) struct Overrides(Vec<(&'static str, Operand)>);

impl Overrides {
    pub(crate) fn none() -> Self {
        Overrides(Vec::new())
    }

    pub(crate) fn with(mut self, name: &'static str, operand: Operand) -> Self {
        self.0.push((name, operand));
        self
    }

    fn get(&self, name: &str) -> Option<&Operand> {
        self.0.iter().rev().find(|(k, _)| *k == name).map(|(_, v)| v)
    }
}

impl Tree {
    /// Evaluate accepted parameter `key` of `id`, if present.
    pub(crate) fn eval_param(
        &mut self,
        id: ObjectId,
        key: &str,
        overrides: &Overrides,
    ) -> Result<Option<Value>> {
        match self.param(id, key)? {
            Some(param) => self.evaluate(id, &param, overrides).map(Some),
            None => Ok(None),
        }
    }

    /// Evaluate a parameter value in the scope of `env`.
    pub(crate) fn evaluate(&mut self, env: ObjectId, param: &Param, overrides: &Overrides) -> Result<Value> {
        let operand = self.eval_operand(env, param, overrides)?;
        self.operand_value(operand)
    }

    fn eval_operand(&mut self, env: ObjectId, param: &Param, overrides: &Overrides) -> Result<Operand> {
        self.depth += 1;
        let result = if self.depth > MAX_EVAL_DEPTH {
            Err(BinDataError::Expression(format!(
                "evaluation nested deeper than {} levels in {}",
                MAX_EVAL_DEPTH,
                self.debug_name(env).unwrap_or_default()
            )))
        } else {
            match param {
                Param::Value(v) => Ok(Operand::Value(v.clone())),
                Param::Symbol(name) => self.resolve(env, name, overrides),
                Param::Expr(expr) => self.eval_expr(env, expr, overrides),
                other => Err(BinDataError::Argument(format!(
                    "parameter cannot be evaluated: {:?}",
                    other
                ))),
            }
        };
        self.depth -= 1;
        result
    }

    pub(crate) fn operand_value(&mut self, operand: Operand) -> Result<Value> {
        match operand {
            Operand::Value(v) => Ok(v),
            Operand::Object(id) => self.value(id),
        }
    }

    fn resolve(&mut self, env: ObjectId, name: &str, overrides: &Overrides) -> Result<Operand> {
        if let Some(operand) = overrides.get(name) {
            return Ok(operand.clone());
        }
        let mut current = env;
        loop {
            let node = self.node(current)?;
            if let Some(v) = node.locals.get(name) {
                return Ok(Operand::Value(v.clone()));
            }
            let parent = match node.parent {
                Some(p) => p,
                None => {
                    return Err(BinDataError::NoSuchName {
                        name: name.to_string(),
                        context: self.debug_name(env)?,
                    })
                }
            };
            let extra = self.node(parent)?.params.extra.get(name).cloned();
            if let Some(param) = extra {
                return self.eval_operand(parent, &param, &Overrides::none());
            }
            if let Some(field) = self.find_field(parent, name)? {
                return Ok(Operand::Object(field));
            }
            current = parent;
        }
    }

    fn eval_value(&mut self, env: ObjectId, expr: &Expr, overrides: &Overrides) -> Result<Value> {
        let operand = self.eval_expr(env, expr, overrides)?;
        self.operand_value(operand)
    }

    fn eval_expr(&mut self, env: ObjectId, expr: &Expr, overrides: &Overrides) -> Result<Operand> {
        match expr {
            Expr::Literal(v) => Ok(Operand::Value(v.clone())),
            Expr::Ident(name) => self.resolve(env, name, overrides),
            Expr::Member(base, member) => {
                let base = self.eval_expr(env, base, overrides)?;
                self.member(base, member)
            }
            Expr::Index(base, index) => {
                let base = self.eval_expr(env, base, overrides)?;
                let index = self.eval_value(env, index, overrides)?;
                self.index(base, &index)
            }
            Expr::Call(name, args) => self.call(env, name, args, overrides),
            Expr::Unary(op, operand) => {
                let v = self.eval_value(env, operand, overrides)?;
                unary(*op, v).map(Operand::Value)
            }
            Expr::Binary(BinaryOp::And, lhs, rhs) => {
                let l = self.eval_value(env, lhs, overrides)?;
                if !truth(&l, "&&")? {
                    return Ok(Operand::Value(Value::Bool(false)));
                }
                let r = self.eval_value(env, rhs, overrides)?;
                Ok(Operand::Value(Value::Bool(truth(&r, "&&")?)))
            }
            Expr::Binary(BinaryOp::Or, lhs, rhs) => {
                let l = self.eval_value(env, lhs, overrides)?;
                if truth(&l, "||")? {
                    return Ok(Operand::Value(Value::Bool(true)));
                }
                let r = self.eval_value(env, rhs, overrides)?;
                Ok(Operand::Value(Value::Bool(truth(&r, "||")?)))
            }
            Expr::Binary(op, lhs, rhs) => {
                let l = self.eval_value(env, lhs, overrides)?;
                let r = self.eval_value(env, rhs, overrides)?;
                binary(*op, l, r).map(Operand::Value)
            }
            Expr::Cond(cond, then, otherwise) => {
                let c = self.eval_value(env, cond, overrides)?;
                if truth(&c, "condition")? {
                    self.eval_expr(env, then, overrides)
                } else {
                    self.eval_expr(env, otherwise, overrides)
                }
            }
        }
    }

    fn member(&mut self, base: Operand, member: &str) -> Result<Operand> {
        match base {
            Operand::Object(id) => {
                if let Some(field) = self.find_field(id, member)? {
                    return Ok(Operand::Object(field));
                }
                match member {
                    "num_bytes" => Ok(Operand::Value(Value::Int(self.num_bytes(id)? as i128))),
                    "length" if self.kind(id)? == Kind::Array => {
                        Ok(Operand::Value(Value::Int(self.len(id)? as i128)))
                    }
                    _ => Err(BinDataError::NoSuchName {
                        name: member.to_string(),
                        context: self.debug_name(id)?,
                    }),
                }
            }
            Operand::Value(v) => v
                .get(member)
                .cloned()
                .map(Operand::Value)
                .ok_or_else(|| BinDataError::NoSuchName {
                    name: member.to_string(),
                    context: format!("{} value", v.kind_name()),
                }),
        }
    }

    fn index(&mut self, base: Operand, index: &Value) -> Result<Operand> {
        let i = index
            .as_int()
            .and_then(|i| usize::try_from(i).ok())
            .ok_or_else(|| BinDataError::Expression(format!("bad index {}", index)))?;
        let out_of_range = || BinDataError::Expression(format!("index {} out of range", i));
        match base {
            Operand::Object(id) if self.kind(id)? == Kind::Array => {
                if i < self.len(id)? {
                    self.element(id, i).map(Operand::Object)
                } else {
                    Err(out_of_range())
                }
            }
            Operand::Object(id) => {
                let v = self.value(id)?;
                self.index(Operand::Value(v), index)
            }
            Operand::Value(Value::List(items)) => {
                items.get(i).cloned().map(Operand::Value).ok_or_else(out_of_range)
            }
            Operand::Value(Value::Bytes(bytes)) => bytes
                .get(i)
                .map(|b| Operand::Value(Value::Int(*b as i128)))
                .ok_or_else(out_of_range),
            Operand::Value(other) => Err(BinDataError::Expression(format!(
                "cannot index a {} value",
                other.kind_name()
            ))),
        }
    }

    fn call(&mut self, env: ObjectId, name: &str, args: &[Expr], overrides: &Overrides) -> Result<Operand> {
        match (name, args) {
            ("len", [arg]) => {
                let operand = self.eval_expr(env, arg, overrides)?;
                let n = match operand {
                    Operand::Object(id) if self.kind(id)? == Kind::Array => self.len(id)?,
                    other => match self.operand_value(other)? {
                        Value::List(items) => items.len(),
                        Value::Bytes(bytes) => bytes.len(),
                        Value::Record(entries) => entries.len(),
                        v => {
                            return Err(BinDataError::Expression(format!(
                                "len() of a {} value",
                                v.kind_name()
                            )))
                        }
                    },
                };
                Ok(Operand::Value(Value::Int(n as i128)))
            }
            ("min" | "max", [a, b]) => {
                let a = self.eval_value(env, a, overrides)?;
                let b = self.eval_value(env, b, overrides)?;
                let ord = compare(&a, &b)?;
                let pick_a = if name == "min" { ord != Ordering::Greater } else { ord != Ordering::Less };
                Ok(Operand::Value(if pick_a { a } else { b }))
            }
            ("offset_of", [Expr::Ident(target)]) => match self.speculative_offset(env, target) {
                Some(offset) => Ok(Operand::Value(Value::Int(offset as i128))),
                None => Err(BinDataError::NoSuchName {
                    name: target.clone(),
                    context: self.debug_name(env)?,
                }),
            },
            _ => Err(BinDataError::NoSuchName {
                name: format!("{}/{}", name, args.len()),
                context: self.debug_name(env)?,
            }),
        }
    }

    /// Offset of sibling `name` within `env`'s parent, or `None` when it
    /// cannot be computed. Never fails.
    pub(crate) fn speculative_offset(&mut self, env: ObjectId, name: &str) -> Option<u64> {
        let parent = self.node(env).ok()?.parent?;
        let sibling = self.find_field(parent, name).ok()??;
        match self.offset_of(parent, sibling) {
            Ok(offset) => Some(offset),
            Err(e) => {
                log::trace!("offset_of({}) unavailable: {}", name, e);
                None
            }
        }
    }
}

fn unary(op: UnaryOp, v: Value) -> Result<Value> {
    match (op, v) {
        (UnaryOp::Neg, Value::Int(x)) => x.checked_neg().map(Value::Int).ok_or_else(overflow),
        (UnaryOp::Neg, Value::Float(x)) => Ok(Value::Float(-x)),
        (UnaryOp::Not, v) => Ok(Value::Bool(!truth(&v, "!")?)),
        (UnaryOp::Neg, other) => Err(BinDataError::Expression(format!(
            "cannot negate a {} value",
            other.kind_name()
        ))),
    }
}

fn overflow() -> BinDataError {
    BinDataError::Expression("integer overflow".to_string())
}

fn binary(op: BinaryOp, l: Value, r: Value) -> Result<Value> {
    use BinaryOp::*;
    match op {
        Eq => return Ok(Value::Bool(equal(&l, &r))),
        Ne => return Ok(Value::Bool(!equal(&l, &r))),
        Lt | Le | Gt | Ge => {
            let ord = compare(&l, &r)?;
            return Ok(Value::Bool(match op {
                Lt => ord == Ordering::Less,
                Le => ord != Ordering::Greater,
                Gt => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            }));
        }
        _ => {}
    }
    match (&l, &r) {
        (Value::Int(a), Value::Int(b)) => {
            let (a, b) = (*a, *b);
            let shift = || u32::try_from(b).ok().filter(|s| *s < 128);
            let result = match op {
                Add => a.checked_add(b),
                Sub => a.checked_sub(b),
                Mul => a.checked_mul(b),
                Div | Rem if b == 0 => {
                    return Err(BinDataError::Expression("division by zero".to_string()))
                }
                Div => a.checked_div(b),
                Rem => a.checked_rem(b),
                Shl => shift().and_then(|s| a.checked_shl(s)),
                Shr => shift().and_then(|s| a.checked_shr(s)),
                BitAnd => Some(a & b),
                BitOr => Some(a | b),
                BitXor => Some(a ^ b),
                _ => None,
            };
            result.map(Value::Int).ok_or_else(overflow)
        }
        (Value::Bytes(a), Value::Bytes(b)) if op == Add => {
            let mut out = a.clone();
            out.extend_from_slice(b);
            Ok(Value::Bytes(out))
        }
        _ => match (l.as_f64(), r.as_f64()) {
            (Some(a), Some(b)) => match op {
                Add => Ok(Value::Float(a + b)),
                Sub => Ok(Value::Float(a - b)),
                Mul => Ok(Value::Float(a * b)),
                Div => Ok(Value::Float(a / b)),
                Rem => Ok(Value::Float(a % b)),
                _ => Err(type_error(op, &l, &r)),
            },
            _ => Err(type_error(op, &l, &r)),
        },
    }
}

fn type_error(op: BinaryOp, l: &Value, r: &Value) -> BinDataError {
    BinDataError::Expression(format!(
        "operator {:?} not defined for {} and {}",
        op,
        l.kind_name(),
        r.kind_name()
    ))
}

fn equal(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
        _ => l == r,
    }
}

fn compare(l: &Value, r: &Value) -> Result<Ordering> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
        (Value::Bytes(a), Value::Bytes(b)) => Ok(a.cmp(b)),
        _ => match (l.as_f64(), r.as_f64()) {
            (Some(a), Some(b)) => a
                .partial_cmp(&b)
                .ok_or_else(|| BinDataError::Expression("comparison with NaN".to_string())),
            _ => Err(BinDataError::Expression(format!(
                "cannot compare {} with {}",
                l.kind_name(),
                r.kind_name()
            ))),
        },
    }
}
