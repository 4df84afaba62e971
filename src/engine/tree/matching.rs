//! Pattern matching for MATCH, OPTIONAL MATCH, MERGE, and EXISTS/COUNT
//! subqueries.
//!
//! Matching extends an accumulated binding set row by row. A variable that
//! is already bound constrains the match (natural join); an unbound variable
//! is bound to each candidate. Undirected patterns yield one row per
//! direction.

use hashbrown::HashSet;

use crate::cypher::ast::{
    MatchClause, NodePattern, PatternDirection, PatternPart, RelPattern, SubqueryPattern,
};
use crate::model::{Node, Path, Relationship, Value};
use crate::Result;

use super::eval::{eval_expr, is_true};
use super::{ExecContext, Row, bind_name, paths};

/// A row under construction together with the path traversed so far.
pub(crate) struct Partial {
    pub row: Row,
    pub path: Path,
}

// ============================================================================
// Clause entry points
// ============================================================================

pub(crate) fn match_clause(
    ectx: &ExecContext,
    m: &MatchClause,
    rows: Vec<Row>,
    scope: &mut Vec<String>,
) -> Result<Vec<Row>> {
    let new_vars = pattern_variables(&m.patterns);

    let result = if m.optional {
        // Per input row: either the match extends it, or nulls fill in.
        let mut out = Vec::new();
        for row in rows {
            ectx.token.check()?;
            let mut expanded = expand_patterns(ectx, &m.patterns, vec![row.clone()])?;
            if let Some(pred) = &m.where_clause {
                expanded = filter_rows(ectx, expanded, pred)?;
            }
            if expanded.is_empty() {
                let mut nulled = row;
                for var in &new_vars {
                    nulled.entry(var.clone()).or_insert(Value::Null);
                }
                out.push(nulled);
            } else {
                out.append(&mut expanded);
            }
        }
        out
    } else {
        let mut expanded = expand_patterns(ectx, &m.patterns, rows)?;
        if let Some(pred) = &m.where_clause {
            expanded = filter_rows(ectx, expanded, pred)?;
        }
        expanded
    };

    for var in &new_vars {
        bind_name(scope, var);
    }
    Ok(result)
}

/// Run an EXISTS/COUNT subquery body against one seed row; returns the
/// number of rows the pattern produces.
pub(crate) fn match_subquery(
    ectx: &ExecContext,
    row: &Row,
    sub: &SubqueryPattern,
) -> Result<usize> {
    let mut rows = expand_patterns(ectx, &sub.patterns, vec![row.clone()])?;
    if let Some(pred) = &sub.where_clause {
        rows = filter_rows(ectx, rows, pred)?;
    }
    Ok(rows.len())
}

pub(crate) fn filter_rows(ectx: &ExecContext, rows: Vec<Row>, pred: &crate::cypher::ast::Expr) -> Result<Vec<Row>> {
    let mut kept = Vec::new();
    for row in rows {
        ectx.token.check()?;
        if is_true(&eval_expr(ectx, &row, pred)?) {
            kept.push(row);
        }
    }
    Ok(kept)
}

// ============================================================================
// Pattern expansion
// ============================================================================

pub(crate) fn expand_patterns(
    ectx: &ExecContext,
    patterns: &[PatternPart],
    rows: Vec<Row>,
) -> Result<Vec<Row>> {
    let mut rows = rows;
    for part in patterns {
        rows = expand_pattern_part(ectx, part, rows)?;
    }
    Ok(rows)
}

pub(crate) fn expand_pattern_part(
    ectx: &ExecContext,
    part: &PatternPart,
    rows: Vec<Row>,
) -> Result<Vec<Row>> {
    if part.shortest.is_some() {
        return paths::shortest_pattern(ectx, part, rows);
    }

    let mut out = Vec::new();
    for row in rows {
        ectx.token.check()?;
        for start in start_candidates(ectx, &row, &part.start)? {
            let mut seeded = row.clone();
            if let Some(var) = &part.start.variable {
                seeded.insert(var.clone(), Value::Node(Box::new(start.clone())));
            }
            let partial = Partial { row: seeded, path: Path::single(start) };
            for expanded in expand_chain(ectx, &part.chain, vec![partial])? {
                let mut finished = expanded.row;
                if let Some(path_var) = &part.variable {
                    finished.insert(path_var.clone(), Value::Path(Box::new(expanded.path)));
                }
                out.push(finished);
            }
        }
    }
    Ok(out)
}

/// Resolve the candidate nodes for a node pattern against one row.
///
/// A bound variable joins: its node is the only candidate and must still
/// satisfy the pattern's labels and properties. Unbound patterns scan by
/// label union (deduped) or the whole store.
pub(crate) fn start_candidates(
    ectx: &ExecContext,
    row: &Row,
    np: &NodePattern,
) -> Result<Vec<Node>> {
    if let Some(var) = &np.variable {
        if let Some(bound) = row.get(var) {
            return match bound {
                Value::Node(n) => {
                    if node_matches(ectx, row, np, n)? {
                        Ok(vec![(**n).clone()])
                    } else {
                        Ok(Vec::new())
                    }
                }
                // Null or a conflicting kind joins nothing.
                _ => Ok(Vec::new()),
            };
        }
    }

    let candidates = if np.labels.is_empty() {
        ectx.store.all_nodes()?
    } else {
        let mut seen = HashSet::new();
        let mut union = Vec::new();
        for label in &np.labels {
            for node in ectx.store.nodes_by_label(label)? {
                if seen.insert(node.id.clone()) {
                    union.push(node);
                }
            }
        }
        union
    };

    let mut matched = Vec::new();
    for node in candidates {
        ectx.token.check()?;
        if node_matches(ectx, row, np, &node)? {
            matched.push(node);
        }
    }
    Ok(matched)
}

pub(crate) fn node_matches(
    ectx: &ExecContext,
    row: &Row,
    np: &NodePattern,
    node: &Node,
) -> Result<bool> {
    for label in &np.labels {
        if !node.has_label(label) {
            return Ok(false);
        }
    }
    for (key, expr) in &np.properties {
        let expected = eval_expr(ectx, row, expr)?;
        let actual = node.get(key).cloned().unwrap_or(Value::Null);
        if actual.eq_value(&expected) != Some(true) {
            return Ok(false);
        }
    }
    Ok(true)
}

pub(crate) fn rel_matches(
    ectx: &ExecContext,
    row: &Row,
    rp: &RelPattern,
    edge: &Relationship,
) -> Result<bool> {
    if !rp.rel_types.is_empty() && !rp.rel_types.iter().any(|t| *t == edge.rel_type) {
        return Ok(false);
    }
    for (key, expr) in &rp.properties {
        let expected = eval_expr(ectx, row, expr)?;
        let actual = edge.get(key).cloned().unwrap_or(Value::Null);
        if actual.eq_value(&expected) != Some(true) {
            return Ok(false);
        }
    }
    Ok(true)
}

fn expand_chain(
    ectx: &ExecContext,
    chain: &[(RelPattern, NodePattern)],
    partials: Vec<Partial>,
) -> Result<Vec<Partial>> {
    let mut current = partials;
    for (rp, np) in chain {
        let mut next = Vec::new();
        for partial in &current {
            ectx.token.check()?;
            if rp.var_length.is_some() {
                next.extend(paths::expand_var_length(ectx, partial, rp, np)?);
            } else {
                next.extend(expand_single_hop(ectx, partial, rp, np)?);
            }
        }
        current = next;
    }
    Ok(current)
}

/// The edges leaving the tip of a partial match, direction-resolved.
///
/// Undirected patterns produce the outgoing legs first, then the incoming
/// ones, yielding one row per direction.
pub(crate) fn adjacent_legs(
    ectx: &ExecContext,
    tip: &crate::model::NodeId,
    direction: PatternDirection,
) -> Result<Vec<(Relationship, crate::model::NodeId)>> {
    let mut legs = Vec::new();
    match direction {
        PatternDirection::Outgoing => {
            for edge in ectx.store.outgoing_edges(tip)? {
                let neighbor = edge.dst.clone();
                legs.push((edge, neighbor));
            }
        }
        PatternDirection::Incoming => {
            for edge in ectx.store.incoming_edges(tip)? {
                let neighbor = edge.src.clone();
                legs.push((edge, neighbor));
            }
        }
        PatternDirection::Undirected => {
            for edge in ectx.store.outgoing_edges(tip)? {
                let neighbor = edge.dst.clone();
                legs.push((edge, neighbor));
            }
            for edge in ectx.store.incoming_edges(tip)? {
                let neighbor = edge.src.clone();
                legs.push((edge, neighbor));
            }
        }
    }
    Ok(legs)
}

fn expand_single_hop(
    ectx: &ExecContext,
    partial: &Partial,
    rp: &RelPattern,
    np: &NodePattern,
) -> Result<Vec<Partial>> {
    let tip = partial.path.end().id.clone();
    let mut out = Vec::new();

    for (edge, neighbor_id) in adjacent_legs(ectx, &tip, rp.direction)? {
        ectx.token.check()?;
        if !rel_matches(ectx, &partial.row, rp, &edge)? {
            continue;
        }

        // A bound relationship variable must refer to this same edge.
        if let Some(var) = &rp.variable {
            if let Some(existing) = partial.row.get(var) {
                match existing {
                    Value::Relationship(r) if r.id == edge.id => {}
                    _ => continue,
                }
            }
        }

        let Some(neighbor) = ectx.store.get_node(&neighbor_id)? else {
            continue;
        };

        if let Some(var) = &np.variable {
            if let Some(existing) = partial.row.get(var) {
                match existing {
                    Value::Node(n) if n.id == neighbor.id => {}
                    _ => continue,
                }
            }
        }
        if !node_matches(ectx, &partial.row, np, &neighbor)? {
            continue;
        }

        let mut row = partial.row.clone();
        if let Some(var) = &rp.variable {
            row.insert(var.clone(), Value::Relationship(Box::new(edge.clone())));
        }
        if let Some(var) = &np.variable {
            row.insert(var.clone(), Value::Node(Box::new(neighbor.clone())));
        }
        let mut path = partial.path.clone();
        path.append(edge, neighbor);
        out.push(Partial { row, path });
    }

    Ok(out)
}

// ============================================================================
// Variable inventory
// ============================================================================

/// Variables a pattern list would bind, in declaration order.
pub(crate) fn pattern_variables(patterns: &[PatternPart]) -> Vec<String> {
    let mut vars: Vec<String> = Vec::new();
    let mut push = |vars: &mut Vec<String>, name: &Option<String>| {
        if let Some(name) = name {
            if !vars.iter().any(|v| v == name) {
                vars.push(name.clone());
            }
        }
    };
    for part in patterns {
        push(&mut vars, &part.start.variable);
        for (rp, np) in &part.chain {
            push(&mut vars, &rp.variable);
            push(&mut vars, &np.variable);
        }
        push(&mut vars, &part.variable);
    }
    vars
}
