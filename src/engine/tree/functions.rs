//! Scalar builtin functions.
//!
//! Aggregates (`count`, `sum`, `avg`, `min`, `max`, `collect`) are not here;
//! they are computed per group by the aggregation engine.

use chrono::Utc;

use crate::cypher::ast::Expr;
use crate::model::Value;
use crate::{Error, Result};

use super::{ExecContext, Row, eval::eval_expr};

/// Builtin function names, for `SHOW FUNCTIONS`.
pub(crate) const FUNCTION_NAMES: &[&str] = &[
    "abs", "avg", "coalesce", "collect", "count", "degree", "exists", "head", "id",
    "inDegree", "keys", "labels", "last", "length", "max", "min", "nodes", "outDegree",
    "properties", "range", "relationships", "size", "sum", "tail", "timestamp",
    "toBoolean", "toFloat", "toInteger", "toLower", "toString", "toUpper", "trim", "type",
];

pub(crate) fn eval_function(
    ectx: &ExecContext,
    row: &Row,
    name: &str,
    args: &[Expr],
) -> Result<Value> {
    match name.to_lowercase().as_str() {
        "id" => {
            let value = single(ectx, row, args, "id")?;
            match value {
                Value::Node(n) => Ok(Value::String(n.id.0.clone())),
                Value::Relationship(r) => Ok(Value::String(r.id.0.clone())),
                Value::Null => Ok(Value::Null),
                other => type_err("NODE or RELATIONSHIP", &other),
            }
        }
        "labels" => {
            let value = single(ectx, row, args, "labels")?;
            match value {
                Value::Node(n) => Ok(Value::List(
                    n.labels.iter().map(|l| Value::String(l.clone())).collect(),
                )),
                Value::Null => Ok(Value::Null),
                other => type_err("NODE", &other),
            }
        }
        "type" => {
            let value = single(ectx, row, args, "type")?;
            match value {
                Value::Relationship(r) => Ok(Value::String(r.rel_type.clone())),
                Value::Null => Ok(Value::Null),
                other => type_err("RELATIONSHIP", &other),
            }
        }
        "properties" => {
            let value = single(ectx, row, args, "properties")?;
            match value {
                Value::Node(n) => Ok(Value::Map(n.properties.clone())),
                Value::Relationship(r) => Ok(Value::Map(r.properties.clone())),
                Value::Map(m) => Ok(Value::Map(m)),
                Value::Null => Ok(Value::Null),
                other => type_err("NODE, RELATIONSHIP, or MAP", &other),
            }
        }
        "keys" => {
            let value = single(ectx, row, args, "keys")?;
            let mut keys: Vec<String> = match value {
                Value::Node(n) => n.properties.keys().cloned().collect(),
                Value::Relationship(r) => r.properties.keys().cloned().collect(),
                Value::Map(m) => m.keys().cloned().collect(),
                Value::Null => return Ok(Value::Null),
                other => return type_err("NODE, RELATIONSHIP, or MAP", &other),
            };
            keys.sort();
            Ok(Value::List(keys.into_iter().map(Value::String).collect()))
        }
        "size" => {
            let value = single(ectx, row, args, "size")?;
            match value {
                Value::String(s) => Ok(Value::Int(s.chars().count() as i64)),
                Value::List(l) => Ok(Value::Int(l.len() as i64)),
                Value::Null => Ok(Value::Null),
                other => type_err("STRING or LIST", &other),
            }
        }
        "length" => {
            let value = single(ectx, row, args, "length")?;
            match value {
                Value::Path(p) => Ok(Value::Int(p.len() as i64)),
                Value::String(s) => Ok(Value::Int(s.chars().count() as i64)),
                Value::List(l) => Ok(Value::Int(l.len() as i64)),
                Value::Null => Ok(Value::Null),
                other => type_err("PATH, STRING, or LIST", &other),
            }
        }
        "head" => {
            let value = single(ectx, row, args, "head")?;
            match value {
                Value::List(l) => Ok(l.into_iter().next().unwrap_or(Value::Null)),
                Value::Null => Ok(Value::Null),
                other => type_err("LIST", &other),
            }
        }
        "last" => {
            let value = single(ectx, row, args, "last")?;
            match value {
                Value::List(l) => Ok(l.into_iter().next_back().unwrap_or(Value::Null)),
                Value::Null => Ok(Value::Null),
                other => type_err("LIST", &other),
            }
        }
        "tail" => {
            let value = single(ectx, row, args, "tail")?;
            match value {
                Value::List(mut l) => {
                    if !l.is_empty() {
                        l.remove(0);
                    }
                    Ok(Value::List(l))
                }
                Value::Null => Ok(Value::Null),
                other => type_err("LIST", &other),
            }
        }
        "range" => {
            if args.len() < 2 || args.len() > 3 {
                return Err(Error::TypeError {
                    expected: "range(start, end[, step])".into(),
                    got: format!("{} arguments", args.len()),
                });
            }
            let start = int_arg(ectx, row, &args[0], "range start")?;
            let end = int_arg(ectx, row, &args[1], "range end")?;
            let step = if args.len() == 3 {
                int_arg(ectx, row, &args[2], "range step")?
            } else {
                1
            };
            if step == 0 {
                return Err(Error::TypeError {
                    expected: "non-zero range step".into(),
                    got: "0".into(),
                });
            }
            let mut out = Vec::new();
            let mut i = start;
            while (step > 0 && i <= end) || (step < 0 && i >= end) {
                out.push(Value::Int(i));
                i += step;
            }
            Ok(Value::List(out))
        }
        "tostring" => {
            let value = single(ectx, row, args, "toString")?;
            match value {
                Value::Null => Ok(Value::Null),
                other => Ok(Value::String(other.canonical_text())),
            }
        }
        "tointeger" | "toint" => {
            let value = single(ectx, row, args, "toInteger")?;
            match value {
                Value::Int(_) => Ok(value),
                Value::Float(f) => Ok(Value::Int(f as i64)),
                Value::String(s) => {
                    Ok(s.trim().parse::<i64>().map(Value::Int).unwrap_or(Value::Null))
                }
                Value::Bool(b) => Ok(Value::Int(if b { 1 } else { 0 })),
                Value::Null => Ok(Value::Null),
                other => type_err("convertible to INTEGER", &other),
            }
        }
        "tofloat" => {
            let value = single(ectx, row, args, "toFloat")?;
            match value {
                Value::Float(_) => Ok(value),
                Value::Int(i) => Ok(Value::Float(i as f64)),
                Value::String(s) => {
                    Ok(s.trim().parse::<f64>().map(Value::Float).unwrap_or(Value::Null))
                }
                Value::Null => Ok(Value::Null),
                other => type_err("convertible to FLOAT", &other),
            }
        }
        "toboolean" => {
            let value = single(ectx, row, args, "toBoolean")?;
            match value {
                Value::Bool(_) => Ok(value),
                Value::String(s) => match s.trim().to_lowercase().as_str() {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    _ => Ok(Value::Null),
                },
                Value::Null => Ok(Value::Null),
                other => type_err("convertible to BOOLEAN", &other),
            }
        }
        "coalesce" => {
            for arg in args {
                let value = eval_expr(ectx, row, arg)?;
                if !value.is_null() {
                    return Ok(value);
                }
            }
            Ok(Value::Null)
        }
        "abs" => {
            let value = single(ectx, row, args, "abs")?;
            match value {
                Value::Int(i) => Ok(Value::Int(i.abs())),
                Value::Float(f) => Ok(Value::Float(f.abs())),
                Value::Null => Ok(Value::Null),
                other => type_err("numeric", &other),
            }
        }
        "trim" => string_fn(ectx, row, args, "trim", |s| s.trim().to_owned()),
        "tolower" => string_fn(ectx, row, args, "toLower", |s| s.to_lowercase()),
        "toupper" => string_fn(ectx, row, args, "toUpper", |s| s.to_uppercase()),
        "exists" => {
            let value = single(ectx, row, args, "exists")?;
            Ok(Value::Bool(!value.is_null()))
        }
        "timestamp" => Ok(Value::Int(Utc::now().timestamp_millis())),
        "indegree" => degree_fn(ectx, row, args, "inDegree", DegreeKind::In),
        "outdegree" => degree_fn(ectx, row, args, "outDegree", DegreeKind::Out),
        "degree" => degree_fn(ectx, row, args, "degree", DegreeKind::Both),
        "nodes" => {
            let value = single(ectx, row, args, "nodes")?;
            match value {
                Value::Path(p) => Ok(Value::List(
                    p.nodes.into_iter().map(|n| Value::Node(Box::new(n))).collect(),
                )),
                Value::Null => Ok(Value::Null),
                other => type_err("PATH", &other),
            }
        }
        "relationships" => {
            let value = single(ectx, row, args, "relationships")?;
            match value {
                Value::Path(p) => Ok(Value::List(
                    p.relationships
                        .into_iter()
                        .map(|r| Value::Relationship(Box::new(r)))
                        .collect(),
                )),
                Value::Null => Ok(Value::Null),
                other => type_err("PATH", &other),
            }
        }
        other => Err(Error::TypeError {
            expected: "known function".into(),
            got: other.to_owned(),
        }),
    }
}

// ============================================================================
// Helpers
// ============================================================================

enum DegreeKind {
    In,
    Out,
    Both,
}

fn degree_fn(
    ectx: &ExecContext,
    row: &Row,
    args: &[Expr],
    name: &str,
    kind: DegreeKind,
) -> Result<Value> {
    let value = single(ectx, row, args, name)?;
    let node = match value {
        Value::Node(n) => n,
        Value::Null => return Ok(Value::Null),
        other => return type_err("NODE", &other),
    };
    let count = match kind {
        DegreeKind::In => ectx.store.incoming_edges(&node.id)?.len(),
        DegreeKind::Out => ectx.store.outgoing_edges(&node.id)?.len(),
        DegreeKind::Both => {
            ectx.store.incoming_edges(&node.id)?.len() + ectx.store.outgoing_edges(&node.id)?.len()
        }
    };
    Ok(Value::Int(count as i64))
}

fn string_fn(
    ectx: &ExecContext,
    row: &Row,
    args: &[Expr],
    name: &str,
    f: fn(&str) -> String,
) -> Result<Value> {
    let value = single(ectx, row, args, name)?;
    match value {
        Value::String(s) => Ok(Value::String(f(&s))),
        Value::Null => Ok(Value::Null),
        other => type_err("STRING", &other),
    }
}

fn single(ectx: &ExecContext, row: &Row, args: &[Expr], name: &str) -> Result<Value> {
    let arg = args.first().ok_or_else(|| Error::TypeError {
        expected: format!("1 argument for {name}()"),
        got: "0 arguments".into(),
    })?;
    eval_expr(ectx, row, arg)
}

fn int_arg(ectx: &ExecContext, row: &Row, arg: &Expr, what: &str) -> Result<i64> {
    let value = eval_expr(ectx, row, arg)?;
    value.as_int().ok_or_else(|| Error::TypeError {
        expected: format!("integer for {what}"),
        got: value.type_name().into(),
    })
}

fn type_err(expected: &str, got: &Value) -> Result<Value> {
    Err(Error::TypeError {
        expected: expected.into(),
        got: got.type_name().into(),
    })
}
