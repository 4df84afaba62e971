//! Variable-length traversal and shortest-path search.
//!
//! Both walk simple paths: an edge is never re-used within one path, while
//! nodes may repeat. Unbounded spans cap at `VAR_LENGTH_MAX_HOPS`.

use hashbrown::{HashMap, HashSet};

use crate::cypher::ast::{NodePattern, PatternDirection, PatternPart, RelPattern, ShortestKind};
use crate::model::{Node, NodeId, Path, RelId, Relationship, Value};
use crate::{Error, Result};

use super::matching::{
    Partial, adjacent_legs, node_matches, rel_matches, start_candidates,
};
use super::{ExecContext, Row, VAR_LENGTH_MAX_HOPS};

// ============================================================================
// Variable-length expansion
// ============================================================================

/// Expand `-[r:T*min..max]->` from the tip of a partial match.
///
/// Every simple path with a hop count in `[min, max]` whose endpoint
/// satisfies the node pattern produces one partial. A named relationship
/// variable binds the list of traversed edges.
pub(crate) fn expand_var_length(
    ectx: &ExecContext,
    partial: &Partial,
    rp: &RelPattern,
    np: &NodePattern,
) -> Result<Vec<Partial>> {
    let span = rp.var_length.expect("caller checked var_length");
    let min = span.min.unwrap_or(1);
    let max = span.max.unwrap_or(VAR_LENGTH_MAX_HOPS).min(VAR_LENGTH_MAX_HOPS);
    if min > max {
        return Ok(Vec::new());
    }

    let mut out = Vec::new();
    // Edges already on the partial path may not repeat either.
    let mut used_edges: HashSet<RelId> =
        origin_edge_ids(partial);
    walk(
        ectx,
        partial,
        rp,
        np,
        partial.path.end().clone(),
        Vec::new(),
        &mut used_edges,
        min,
        max,
        &mut out,
    )?;
    Ok(out)
}

fn origin_edge_ids(partial: &Partial) -> HashSet<RelId> {
    partial.path.relationships.iter().map(|r| r.id.clone()).collect()
}

#[allow(clippy::too_many_arguments)]
fn walk(
    ectx: &ExecContext,
    origin: &Partial,
    rp: &RelPattern,
    np: &NodePattern,
    current: Node,
    traversed: Vec<(Relationship, Node)>,
    used_edges: &mut HashSet<RelId>,
    min: u32,
    max: u32,
    out: &mut Vec<Partial>,
) -> Result<()> {
    ectx.token.check()?;
    let hops = traversed.len() as u32;

    if hops >= min && node_matches(ectx, &origin.row, np, &current)? {
        out.push(finish_var_length(origin, rp, np, &current, &traversed));
    }
    if hops == max {
        return Ok(());
    }

    for (edge, neighbor_id) in adjacent_legs(ectx, &current.id, rp.direction)? {
        if used_edges.contains(&edge.id) {
            continue;
        }
        if !rel_matches(ectx, &origin.row, rp, &edge)? {
            continue;
        }
        let Some(neighbor) = ectx.store.get_node(&neighbor_id)? else {
            continue;
        };

        used_edges.insert(edge.id.clone());
        let mut next = traversed.clone();
        next.push((edge.clone(), neighbor.clone()));
        walk(ectx, origin, rp, np, neighbor, next, used_edges, min, max, out)?;
        used_edges.remove(&edge.id);
    }
    Ok(())
}

fn finish_var_length(
    origin: &Partial,
    rp: &RelPattern,
    np: &NodePattern,
    endpoint: &Node,
    traversed: &[(Relationship, Node)],
) -> Partial {
    let mut row = origin.row.clone();
    let mut path = origin.path.clone();
    for (edge, node) in traversed {
        path.append(edge.clone(), node.clone());
    }
    if let Some(var) = &rp.variable {
        let edges: Vec<Value> = traversed
            .iter()
            .map(|(edge, _)| Value::Relationship(Box::new(edge.clone())))
            .collect();
        row.insert(var.clone(), Value::List(edges));
    }
    if let Some(var) = &np.variable {
        row.insert(var.clone(), Value::Node(Box::new(endpoint.clone())));
    }
    Partial { row, path }
}

// ============================================================================
// shortestPath / allShortestPaths
// ============================================================================

/// Expand a `p = shortestPath((a)-[...]->(b))` pattern part.
pub(crate) fn shortest_pattern(
    ectx: &ExecContext,
    part: &PatternPart,
    rows: Vec<Row>,
) -> Result<Vec<Row>> {
    let kind = part.shortest.expect("caller checked shortest");
    if part.chain.len() != 1 {
        return Err(Error::UnsupportedQuery(
            "shortestPath takes a single relationship pattern".into(),
        ));
    }
    let (rp, end_np) = &part.chain[0];
    let max_hops = rp
        .var_length
        .and_then(|v| v.max)
        .unwrap_or(VAR_LENGTH_MAX_HOPS)
        .min(VAR_LENGTH_MAX_HOPS);

    let mut out = Vec::new();
    for row in rows {
        ectx.token.check()?;
        let starts = start_candidates(ectx, &row, &part.start)?;
        let ends = start_candidates(ectx, &row, end_np)?;

        for start in &starts {
            for end in &ends {
                let mut found = bfs_shortest(
                    ectx,
                    &start.id,
                    &end.id,
                    &rp.rel_types,
                    rp.direction,
                    max_hops,
                    kind == ShortestKind::All,
                )?;
                if kind == ShortestKind::Single {
                    found.truncate(1);
                }
                for path in found {
                    let mut new_row = row.clone();
                    if let Some(var) = &part.start.variable {
                        new_row.insert(var.clone(), Value::Node(Box::new(start.clone())));
                    }
                    if let Some(var) = &end_np.variable {
                        new_row.insert(var.clone(), Value::Node(Box::new(end.clone())));
                    }
                    if let Some(var) = &rp.variable {
                        let edges: Vec<Value> = path
                            .relationships
                            .iter()
                            .map(|e| Value::Relationship(Box::new(e.clone())))
                            .collect();
                        new_row.insert(var.clone(), Value::List(edges));
                    }
                    if let Some(var) = &part.variable {
                        new_row.insert(var.clone(), Value::Path(Box::new(path.clone())));
                    }
                    out.push(new_row);
                }
            }
        }
    }
    Ok(out)
}

/// BFS over the allowed direction and types; returns the shortest path(s)
/// from `start` to `end`, or none within `max_hops`.
pub(crate) fn bfs_shortest(
    ectx: &ExecContext,
    start: &NodeId,
    end: &NodeId,
    rel_types: &[String],
    direction: PatternDirection,
    max_hops: u32,
    all: bool,
) -> Result<Vec<Path>> {
    let Some(start_node) = ectx.store.get_node(start)? else {
        return Ok(Vec::new());
    };
    if start == end {
        return Ok(vec![Path::single(start_node)]);
    }

    // Predecessors per node at its BFS depth; several when `all` is set.
    let mut predecessors: HashMap<NodeId, Vec<(Relationship, NodeId)>> = HashMap::new();
    let mut depth_of: HashMap<NodeId, u32> = HashMap::new();
    depth_of.insert(start.clone(), 0);

    let mut frontier = vec![start.clone()];
    let mut found_at = None;

    for depth in 1..=max_hops {
        if found_at.is_some() {
            break;
        }
        let mut next_frontier = Vec::new();
        for node_id in &frontier {
            ectx.token.check()?;
            for (edge, neighbor) in adjacent_legs(ectx, node_id, direction)? {
                if !rel_types.is_empty() && !rel_types.iter().any(|t| *t == edge.rel_type) {
                    continue;
                }
                match depth_of.get(&neighbor) {
                    None => {
                        depth_of.insert(neighbor.clone(), depth);
                        predecessors
                            .entry(neighbor.clone())
                            .or_default()
                            .push((edge, node_id.clone()));
                        if neighbor == *end {
                            found_at = Some(depth);
                        } else {
                            next_frontier.push(neighbor);
                        }
                    }
                    // Another equal-length way in: only kept for allShortestPaths.
                    Some(&d) if d == depth && all => {
                        predecessors
                            .entry(neighbor.clone())
                            .or_default()
                            .push((edge, node_id.clone()));
                    }
                    Some(_) => {}
                }
            }
        }
        frontier = next_frontier;
        if frontier.is_empty() && found_at.is_none() {
            break;
        }
    }

    if found_at.is_none() {
        return Ok(Vec::new());
    }

    // Reconstruct every path from end back to start through the
    // predecessor lists.
    let mut chains: Vec<Vec<Relationship>> = Vec::new();
    collect_chains(&predecessors, start, end, &mut Vec::new(), &mut chains);
    if !all {
        chains.truncate(1);
    }

    let mut paths = Vec::new();
    for chain in chains {
        let mut path = Path::single(start_node.clone());
        let mut cursor = start.clone();
        for edge in chain.into_iter().rev() {
            let next_id = if edge.src == cursor { edge.dst.clone() } else { edge.src.clone() };
            let Some(node) = ectx.store.get_node(&next_id)? else {
                break;
            };
            cursor = next_id;
            path.append(edge, node);
        }
        paths.push(path);
    }
    Ok(paths)
}

/// Walk the predecessor graph from `current` back to `start`, emitting each
/// complete edge chain (end-to-start order).
fn collect_chains(
    predecessors: &HashMap<NodeId, Vec<(Relationship, NodeId)>>,
    start: &NodeId,
    current: &NodeId,
    acc: &mut Vec<Relationship>,
    out: &mut Vec<Vec<Relationship>>,
) {
    if current == start {
        out.push(acc.clone());
        return;
    }
    let Some(preds) = predecessors.get(current) else {
        return;
    };
    for (edge, prev) in preds {
        acc.push(edge.clone());
        collect_chains(predecessors, start, prev, acc, out);
        acc.pop();
    }
}
