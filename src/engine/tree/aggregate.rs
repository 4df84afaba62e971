//! Aggregation and grouping.
//!
//! A projection containing any aggregation call triggers grouping: the
//! non-aggregating items become the grouping key (compared by canonical
//! textual equality), and each aggregating item is computed per group.

use hashbrown::HashMap;

use crate::cypher::ast::{BinaryOp, Expr, UnaryOp, is_aggregate_function};
use crate::model::Value;
use crate::{Error, Result};

use super::eval::{eval_binary_values, eval_expr};
use super::{ExecContext, Row};

pub(crate) fn aggregate_project(
    ectx: &ExecContext,
    named: &[(String, Expr)],
    rows: &[Row],
) -> Result<Vec<Row>> {
    let group_items: Vec<&(String, Expr)> =
        named.iter().filter(|(_, e)| !e.contains_aggregate()).collect();
    let agg_items: Vec<&(String, Expr)> =
        named.iter().filter(|(_, e)| e.contains_aggregate()).collect();

    // Group rows by the canonical text of the grouping key, preserving
    // first-seen order.
    let mut order: Vec<Vec<String>> = Vec::new();
    let mut groups: HashMap<Vec<String>, (Vec<Value>, Vec<&Row>)> = HashMap::new();

    for row in rows {
        ectx.token.check()?;
        let mut key = Vec::with_capacity(group_items.len());
        let mut values = Vec::with_capacity(group_items.len());
        for (_, expr) in &group_items {
            let value = eval_expr(ectx, row, expr)?;
            key.push(value.canonical_text());
            values.push(value);
        }
        match groups.get_mut(&key) {
            Some((_, members)) => members.push(row),
            None => {
                order.push(key.clone());
                groups.insert(key, (values, vec![row]));
            }
        }
    }

    // With no grouping key, an empty input still produces one group so that
    // count(*) over nothing yields 0.
    if order.is_empty() && group_items.is_empty() {
        order.push(Vec::new());
        groups.insert(Vec::new(), (Vec::new(), Vec::new()));
    }

    let mut out = Vec::new();
    for key in order {
        let (values, members) = &groups[&key];
        let mut row = Row::new();
        for (i, (name, _)) in group_items.iter().enumerate() {
            row.insert(name.clone(), values[i].clone());
        }
        for (name, expr) in &agg_items {
            row.insert(name.clone(), eval_agg_expr(ectx, expr, members)?);
        }
        out.push(row);
    }
    Ok(out)
}

/// Evaluate an expression that contains aggregation calls over one group.
///
/// Aggregate calls reduce the group; non-aggregating subtrees evaluate
/// against the group's first row (the representative).
fn eval_agg_expr(ectx: &ExecContext, expr: &Expr, group: &[&Row]) -> Result<Value> {
    if !expr.contains_aggregate() {
        return match group.first() {
            Some(row) => eval_expr(ectx, row, expr),
            None => Ok(Value::Null),
        };
    }

    match expr {
        Expr::FunctionCall { name, args, distinct } if is_aggregate_function(name) => {
            compute_aggregate(ectx, name, args, *distinct, group)
        }
        Expr::BinaryOp { left, op, right } => {
            let lv = eval_agg_expr(ectx, left, group)?;
            let rv = eval_agg_expr(ectx, right, group)?;
            match op {
                BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => Err(Error::TypeError {
                    expected: "arithmetic around aggregates".into(),
                    got: op.to_string(),
                }),
                _ => eval_binary_values(&lv, *op, &rv),
            }
        }
        Expr::UnaryOp { op: UnaryOp::Negate, expr: inner } => {
            match eval_agg_expr(ectx, inner, group)? {
                Value::Int(i) => Ok(Value::Int(-i)),
                Value::Float(f) => Ok(Value::Float(-f)),
                Value::Null => Ok(Value::Null),
                other => Err(Error::TypeError {
                    expected: "numeric".into(),
                    got: other.type_name().into(),
                }),
            }
        }
        other => Err(Error::TypeError {
            expected: "supported aggregate expression".into(),
            got: other.to_string(),
        }),
    }
}

fn compute_aggregate(
    ectx: &ExecContext,
    name: &str,
    args: &[Expr],
    distinct: bool,
    group: &[&Row],
) -> Result<Value> {
    let lower = name.to_lowercase();

    // count(*) counts rows, nulls included.
    if args.is_empty() {
        if lower == "count" {
            return Ok(Value::Int(group.len() as i64));
        }
        return Err(Error::TypeError {
            expected: format!("1 argument for {name}()"),
            got: "0 arguments".into(),
        });
    }

    // Evaluate per row; aggregates ignore nulls.
    let mut values = Vec::new();
    for row in group {
        ectx.token.check()?;
        let value = eval_expr(ectx, row, &args[0])?;
        if !value.is_null() {
            values.push(value);
        }
    }
    if distinct {
        let mut seen = hashbrown::HashSet::new();
        values.retain(|v| seen.insert(v.canonical_text()));
    }

    match lower.as_str() {
        "count" => Ok(Value::Int(values.len() as i64)),
        "sum" => {
            let mut int_sum: i64 = 0;
            let mut float_sum: f64 = 0.0;
            let mut has_float = false;
            for value in &values {
                match value {
                    Value::Int(i) => int_sum += i,
                    Value::Float(f) => {
                        has_float = true;
                        float_sum += f;
                    }
                    other => {
                        return Err(Error::TypeError {
                            expected: "numeric values for sum()".into(),
                            got: other.type_name().into(),
                        });
                    }
                }
            }
            if has_float {
                Ok(Value::Float(int_sum as f64 + float_sum))
            } else {
                Ok(Value::Int(int_sum))
            }
        }
        "avg" => {
            if values.is_empty() {
                return Ok(Value::Null);
            }
            let mut sum = 0.0;
            for value in &values {
                sum += value.as_float().ok_or_else(|| Error::TypeError {
                    expected: "numeric values for avg()".into(),
                    got: value.type_name().into(),
                })?;
            }
            Ok(Value::Float(sum / values.len() as f64))
        }
        "min" => Ok(values
            .into_iter()
            .reduce(|a, b| if b.order_cmp(&a) == std::cmp::Ordering::Less { b } else { a })
            .unwrap_or(Value::Null)),
        "max" => Ok(values
            .into_iter()
            .reduce(|a, b| if b.order_cmp(&a) == std::cmp::Ordering::Greater { b } else { a })
            .unwrap_or(Value::Null)),
        "collect" => Ok(Value::List(values)),
        other => Err(Error::TypeError {
            expected: "aggregate function".into(),
            got: other.to_owned(),
        }),
    }
}
