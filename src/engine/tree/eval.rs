//! Expression evaluator.
//!
//! Evaluates a CST expression against one binding row. Three-valued logic
//! throughout: comparisons involving null yield null, and only a strict
//! `true` passes a filter.

use regex::Regex;

use crate::cypher::ast::{BinaryOp, Expr, Literal, StringOp, UnaryOp, is_aggregate_function};
use crate::model::{PropertyMap, Value};
use crate::{Error, Result};

use super::{ExecContext, Row, functions, matching};

/// Strict filter semantics: only `true` passes.
pub(crate) fn is_true(value: &Value) -> bool {
    matches!(value, Value::Bool(true))
}

pub(crate) fn eval_expr(ectx: &ExecContext, row: &Row, expr: &Expr) -> Result<Value> {
    match expr {
        Expr::Literal(lit) => Ok(match lit {
            Literal::Null => Value::Null,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(i) => Value::Int(*i),
            Literal::Float(f) => Value::Float(*f),
            Literal::String(s) => Value::String(s.clone()),
        }),

        Expr::Variable(name) => row.get(name).cloned().ok_or_else(|| Error::TypeError {
            expected: "bound variable".into(),
            got: name.clone(),
        }),

        // Unknown parameters evaluate to null.
        Expr::Parameter(name) => Ok(ectx.params.get(name).cloned().unwrap_or(Value::Null)),

        Expr::Property { expr: inner, key } => {
            let value = eval_expr(ectx, row, inner)?;
            match value {
                Value::Node(n) => Ok(n.get(key).cloned().unwrap_or(Value::Null)),
                Value::Relationship(r) => Ok(r.get(key).cloned().unwrap_or(Value::Null)),
                Value::Map(m) => Ok(m.get(key).cloned().unwrap_or(Value::Null)),
                Value::Null => Ok(Value::Null),
                other => Err(Error::TypeError {
                    expected: "Node, Relationship, or Map".into(),
                    got: other.type_name().into(),
                }),
            }
        }

        Expr::FunctionCall { name, args, .. } => {
            if is_aggregate_function(name) {
                return Err(Error::TypeError {
                    expected: "non-aggregating expression".into(),
                    got: format!("{name}(...)"),
                });
            }
            functions::eval_function(ectx, row, name, args)
        }

        Expr::BinaryOp { left, op, right } => eval_binary(ectx, row, left, *op, right),

        Expr::UnaryOp { op, expr: inner } => {
            let value = eval_expr(ectx, row, inner)?;
            match op {
                UnaryOp::Not => match value {
                    Value::Null => Ok(Value::Null),
                    Value::Bool(b) => Ok(Value::Bool(!b)),
                    other => Err(Error::TypeError {
                        expected: "BOOLEAN".into(),
                        got: other.type_name().into(),
                    }),
                },
                UnaryOp::Negate => match value {
                    Value::Int(i) => Ok(Value::Int(-i)),
                    Value::Float(f) => Ok(Value::Float(-f)),
                    Value::Null => Ok(Value::Null),
                    other => Err(Error::TypeError {
                        expected: "numeric".into(),
                        got: other.type_name().into(),
                    }),
                },
            }
        }

        Expr::List(items) => {
            let values: Vec<Value> = items
                .iter()
                .map(|e| eval_expr(ectx, row, e))
                .collect::<Result<_>>()?;
            Ok(Value::List(values))
        }

        Expr::MapLiteral(entries) => {
            let mut map = PropertyMap::new();
            for (key, value_expr) in entries {
                map.insert(key.clone(), eval_expr(ectx, row, value_expr)?);
            }
            Ok(Value::Map(map))
        }

        Expr::Case { operand, whens, else_expr } => {
            match operand {
                Some(op_expr) => {
                    let subject = eval_expr(ectx, row, op_expr)?;
                    for (when_expr, then_expr) in whens {
                        let candidate = eval_expr(ectx, row, when_expr)?;
                        if subject.eq_value(&candidate) == Some(true) {
                            return eval_expr(ectx, row, then_expr);
                        }
                    }
                }
                None => {
                    for (when_expr, then_expr) in whens {
                        if is_true(&eval_expr(ectx, row, when_expr)?) {
                            return eval_expr(ectx, row, then_expr);
                        }
                    }
                }
            }
            match else_expr {
                Some(e) => eval_expr(ectx, row, e),
                None => Ok(Value::Null),
            }
        }

        Expr::In { expr: item, list } => {
            let needle = eval_expr(ectx, row, item)?;
            let haystack = eval_expr(ectx, row, list)?;
            match haystack {
                Value::Null => Ok(Value::Null),
                Value::List(items) => {
                    if items.is_empty() {
                        return Ok(Value::Bool(false));
                    }
                    let mut saw_null = needle.is_null();
                    for candidate in &items {
                        match needle.eq_value(candidate) {
                            Some(true) => return Ok(Value::Bool(true)),
                            Some(false) => {}
                            None => saw_null = true,
                        }
                    }
                    if saw_null { Ok(Value::Null) } else { Ok(Value::Bool(false)) }
                }
                other => Err(Error::TypeError {
                    expected: "LIST".into(),
                    got: other.type_name().into(),
                }),
            }
        }

        Expr::IsNull { expr: inner, negated } => {
            let value = eval_expr(ectx, row, inner)?;
            let is_null = value.is_null();
            Ok(Value::Bool(if *negated { !is_null } else { is_null }))
        }

        Expr::HasLabel { expr: inner, label } => {
            let value = eval_expr(ectx, row, inner)?;
            match value {
                Value::Node(n) => Ok(Value::Bool(n.has_label(label))),
                Value::Null => Ok(Value::Null),
                other => Err(Error::TypeError {
                    expected: "NODE".into(),
                    got: other.type_name().into(),
                }),
            }
        }

        Expr::StringOp { left, op, right } => {
            let lv = eval_expr(ectx, row, left)?;
            let rv = eval_expr(ectx, row, right)?;
            match (&lv, &rv) {
                (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
                (Value::String(a), Value::String(b)) => {
                    let result = match op {
                        StringOp::StartsWith => a.starts_with(b.as_str()),
                        StringOp::EndsWith => a.ends_with(b.as_str()),
                        StringOp::Contains => a.contains(b.as_str()),
                    };
                    Ok(Value::Bool(result))
                }
                _ => Err(Error::TypeError {
                    expected: "STRING".into(),
                    got: format!("{}, {}", lv.type_name(), rv.type_name()),
                }),
            }
        }

        Expr::ListComprehension { variable, list, predicate, projection } => {
            let source = eval_expr(ectx, row, list)?;
            let items = match source {
                Value::Null => return Ok(Value::Null),
                Value::List(items) => items,
                other => {
                    return Err(Error::TypeError {
                        expected: "LIST".into(),
                        got: other.type_name().into(),
                    });
                }
            };

            let mut out = Vec::new();
            let mut inner_row = row.clone();
            for item in items {
                ectx.token.check()?;
                inner_row.insert(variable.clone(), item.clone());
                if let Some(pred) = predicate {
                    if !is_true(&eval_expr(ectx, &inner_row, pred)?) {
                        continue;
                    }
                }
                match projection {
                    Some(proj) => out.push(eval_expr(ectx, &inner_row, proj)?),
                    None => out.push(item),
                }
            }
            Ok(Value::List(out))
        }

        Expr::ExistsSubquery(sub) => {
            let count = matching::match_subquery(ectx, row, sub)?;
            Ok(Value::Bool(count > 0))
        }

        Expr::CountSubquery(sub) => {
            let count = matching::match_subquery(ectx, row, sub)?;
            Ok(Value::Int(count as i64))
        }

        Expr::Star => Err(Error::TypeError {
            expected: "expression".into(),
            got: "*".into(),
        }),
    }
}

// ============================================================================
// Binary operators
// ============================================================================

fn eval_binary(
    ectx: &ExecContext,
    row: &Row,
    left: &Expr,
    op: BinaryOp,
    right: &Expr,
) -> Result<Value> {
    // Logical operators get Kleene short-circuit treatment.
    match op {
        BinaryOp::And => {
            let lv = as_kleene(eval_expr(ectx, row, left)?)?;
            if lv == Some(false) {
                return Ok(Value::Bool(false));
            }
            let rv = as_kleene(eval_expr(ectx, row, right)?)?;
            return Ok(kleene_to_value(match (lv, rv) {
                (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            }));
        }
        BinaryOp::Or => {
            let lv = as_kleene(eval_expr(ectx, row, left)?)?;
            if lv == Some(true) {
                return Ok(Value::Bool(true));
            }
            let rv = as_kleene(eval_expr(ectx, row, right)?)?;
            return Ok(kleene_to_value(match (lv, rv) {
                (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            }));
        }
        BinaryOp::Xor => {
            let lv = as_kleene(eval_expr(ectx, row, left)?)?;
            let rv = as_kleene(eval_expr(ectx, row, right)?)?;
            return Ok(kleene_to_value(match (lv, rv) {
                (Some(a), Some(b)) => Some(a ^ b),
                _ => None,
            }));
        }
        _ => {}
    }

    let lv = eval_expr(ectx, row, left)?;
    let rv = eval_expr(ectx, row, right)?;
    eval_binary_values(&lv, op, &rv)
}

pub(crate) fn eval_binary_values(left: &Value, op: BinaryOp, right: &Value) -> Result<Value> {
    match op {
        BinaryOp::Eq => Ok(kleene_to_value(left.eq_value(right))),
        BinaryOp::Neq => Ok(kleene_to_value(left.eq_value(right).map(|b| !b))),

        BinaryOp::Lt | BinaryOp::Lte | BinaryOp::Gt | BinaryOp::Gte => {
            if left.is_null() || right.is_null() {
                return Ok(Value::Null);
            }
            let ord = left.order_cmp(right);
            let result = match op {
                BinaryOp::Lt => ord == std::cmp::Ordering::Less,
                BinaryOp::Lte => ord != std::cmp::Ordering::Greater,
                BinaryOp::Gt => ord == std::cmp::Ordering::Greater,
                BinaryOp::Gte => ord != std::cmp::Ordering::Less,
                _ => unreachable!(),
            };
            Ok(Value::Bool(result))
        }

        BinaryOp::Add => eval_add(left, right),
        BinaryOp::Sub => eval_arith(left, right, "-", |a, b| Some(a - b), |a, b| Some(a - b)),
        BinaryOp::Mul => eval_arith(left, right, "*", |a, b| Some(a * b), |a, b| Some(a * b)),
        // Division and modulo by zero yield null, not an error.
        BinaryOp::Div => eval_arith(
            left,
            right,
            "/",
            |a, b| if b == 0 { None } else { Some(a / b) },
            |a, b| if b == 0.0 { None } else { Some(a / b) },
        ),
        BinaryOp::Mod => eval_arith(
            left,
            right,
            "%",
            |a, b| if b == 0 { None } else { Some(a % b) },
            |a, b| if b == 0.0 { None } else { Some(a % b) },
        ),
        BinaryOp::Pow => {
            if left.is_null() || right.is_null() {
                return Ok(Value::Null);
            }
            let base = left.as_float().ok_or_else(|| Error::TypeError {
                expected: "numeric".into(),
                got: left.type_name().into(),
            })?;
            let exp = right.as_float().ok_or_else(|| Error::TypeError {
                expected: "numeric".into(),
                got: right.type_name().into(),
            })?;
            Ok(Value::Float(base.powf(exp)))
        }

        BinaryOp::RegexMatch => eval_regex(left, right),

        BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => {
            unreachable!("logical operators handled with short-circuit")
        }
    }
}

fn eval_add(left: &Value, right: &Value) -> Result<Value> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 + b)),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a + *b as f64)),
        (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
        (Value::List(a), Value::List(b)) => {
            let mut out = a.clone();
            out.extend(b.iter().cloned());
            Ok(Value::List(out))
        }
        (Value::List(a), b) => {
            let mut out = a.clone();
            out.push(b.clone());
            Ok(Value::List(out))
        }
        _ => Err(Error::TypeError {
            expected: "compatible operands for +".into(),
            got: format!("{}, {}", left.type_name(), right.type_name()),
        }),
    }
}

fn eval_arith(
    left: &Value,
    right: &Value,
    op: &str,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> Option<f64>,
) -> Result<Value> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Int(a), Value::Int(b)) => {
            Ok(int_op(*a, *b).map(Value::Int).unwrap_or(Value::Null))
        }
        (Value::Float(a), Value::Float(b)) => {
            Ok(float_op(*a, *b).map(Value::Float).unwrap_or(Value::Null))
        }
        (Value::Int(a), Value::Float(b)) => {
            Ok(float_op(*a as f64, *b).map(Value::Float).unwrap_or(Value::Null))
        }
        (Value::Float(a), Value::Int(b)) => {
            Ok(float_op(*a, *b as f64).map(Value::Float).unwrap_or(Value::Null))
        }
        _ => Err(Error::TypeError {
            expected: format!("numeric operands for {op}"),
            got: format!("{}, {}", left.type_name(), right.type_name()),
        }),
    }
}

fn eval_regex(left: &Value, right: &Value) -> Result<Value> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::String(text), Value::String(pattern)) => {
            // Whole-string match; an invalid pattern yields null so the
            // enclosing filter simply drops the row.
            match Regex::new(&format!("^(?:{pattern})$")) {
                Ok(re) => Ok(Value::Bool(re.is_match(text))),
                Err(_) => Ok(Value::Null),
            }
        }
        _ => Err(Error::TypeError {
            expected: "STRING".into(),
            got: format!("{}, {}", left.type_name(), right.type_name()),
        }),
    }
}

fn as_kleene(value: Value) -> Result<Option<bool>> {
    match value {
        Value::Bool(b) => Ok(Some(b)),
        Value::Null => Ok(None),
        other => Err(Error::TypeError {
            expected: "BOOLEAN".into(),
            got: other.type_name().into(),
        }),
    }
}

fn kleene_to_value(b: Option<bool>) -> Value {
    match b {
        Some(b) => Value::Bool(b),
        None => Value::Null,
    }
}
