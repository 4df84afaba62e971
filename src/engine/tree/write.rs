//! Updating clauses: CREATE, MERGE, SET, REMOVE, DELETE, and schema
//! commands.
//!
//! Mutations reach entities through storage by ID; the snapshots held in
//! binding rows are refreshed after each write so later clauses observe the
//! new state.

use hashbrown::HashSet;

use crate::cypher::ast::{
    CreateClause, DeleteClause, MergeClause, NodePattern, PatternDirection, PatternPart,
    RelPattern, RemoveClause, RemoveItem, SchemaCommand, SetItem,
};
use crate::engine::{QueryStats, next_node_id, next_rel_id};
use crate::model::{
    Node, NodeId, Path, PropertyMap, RelId, Relationship, Value, property_map::validate_property,
};
use crate::storage::{ConstraintInfo, IndexInfo};
use crate::{Error, Result};

use super::eval::eval_expr;
use super::matching::{expand_pattern_part, pattern_variables};
use super::{ExecContext, Row, bind_name};

// ============================================================================
// CREATE
// ============================================================================

pub(crate) fn create_clause(
    ectx: &ExecContext,
    stats: &mut QueryStats,
    clause: &CreateClause,
    rows: Vec<Row>,
    scope: &mut Vec<String>,
) -> Result<Vec<Row>> {
    let mut out = Vec::new();
    for mut row in rows {
        ectx.token.check()?;
        for part in &clause.patterns {
            create_pattern(ectx, stats, part, &mut row)?;
        }
        out.push(row);
    }
    for var in pattern_variables(&clause.patterns) {
        bind_name(scope, &var);
    }
    Ok(out)
}

pub(crate) fn create_pattern(
    ectx: &ExecContext,
    stats: &mut QueryStats,
    part: &PatternPart,
    row: &mut Row,
) -> Result<()> {
    if part.shortest.is_some() {
        return Err(Error::SyntaxError {
            position: 0,
            message: "shortestPath is not allowed in CREATE".into(),
        });
    }

    let start = resolve_or_create_node(ectx, stats, &part.start, row)?;
    let mut path = Path::single(start.clone());
    let mut prev = start;

    for (rp, np) in &part.chain {
        validate_create_rel(rp)?;
        let next = resolve_or_create_node(ectx, stats, np, row)?;

        let (src, dst) = match rp.direction {
            PatternDirection::Outgoing => (prev.id.clone(), next.id.clone()),
            PatternDirection::Incoming => (next.id.clone(), prev.id.clone()),
            PatternDirection::Undirected => unreachable!("rejected above"),
        };

        let mut props = PropertyMap::new();
        for (key, expr) in &rp.properties {
            let value = eval_expr(ectx, row, expr)?;
            validate_property(key, &value)?;
            if !value.is_null() {
                props.insert(key.clone(), value);
            }
        }

        let edge = Relationship {
            id: next_rel_id(),
            rel_type: rp.rel_types[0].clone(),
            src,
            dst,
            properties: props,
        };
        ectx.store.create_edge(edge.clone())?;
        stats.relationships_created += 1;

        if let Some(var) = &rp.variable {
            row.insert(var.clone(), Value::Relationship(Box::new(edge.clone())));
        }
        path.append(edge, next.clone());
        prev = next;
    }

    if let Some(path_var) = &part.variable {
        row.insert(path_var.clone(), Value::Path(Box::new(path)));
    }
    Ok(())
}

fn validate_create_rel(rp: &RelPattern) -> Result<()> {
    if rp.direction == PatternDirection::Undirected {
        return Err(Error::SyntaxError {
            position: 0,
            message: "relationship in CREATE must have a direction".into(),
        });
    }
    // A typeless CREATE silently diverged between backends once; now every
    // backend rejects it.
    if rp.rel_types.is_empty() {
        return Err(Error::SyntaxError {
            position: 0,
            message: "relationship in CREATE must have exactly one type".into(),
        });
    }
    if rp.rel_types.len() > 1 {
        return Err(Error::SyntaxError {
            position: 0,
            message: "relationship in CREATE cannot have alternative types".into(),
        });
    }
    if rp.var_length.is_some() {
        return Err(Error::SyntaxError {
            position: 0,
            message: "variable-length relationships are not allowed in CREATE".into(),
        });
    }
    Ok(())
}

/// Reuse the node a variable is bound to, or create a fresh one.
fn resolve_or_create_node(
    ectx: &ExecContext,
    stats: &mut QueryStats,
    np: &NodePattern,
    row: &mut Row,
) -> Result<Node> {
    if let Some(var) = &np.variable {
        if let Some(bound) = row.get(var) {
            return match bound {
                Value::Node(n) => Ok((**n).clone()),
                other => Err(Error::TypeError {
                    expected: "NODE".into(),
                    got: other.type_name().into(),
                }),
            };
        }
    }

    let mut props = PropertyMap::new();
    for (key, expr) in &np.properties {
        let value = eval_expr(ectx, row, expr)?;
        validate_property(key, &value)?;
        if !value.is_null() {
            props.insert(key.clone(), value);
        }
    }

    let node = Node {
        id: next_node_id(),
        labels: np.labels.iter().cloned().collect(),
        properties: props,
    };
    ectx.store.create_node(node.clone())?;
    stats.nodes_created += 1;
    if let Some(hook) = &ectx.node_hook {
        hook(&node.id);
    }

    if let Some(var) = &np.variable {
        row.insert(var.clone(), Value::Node(Box::new(node.clone())));
    }
    Ok(node)
}

// ============================================================================
// MERGE
// ============================================================================

pub(crate) fn merge_clause(
    ectx: &ExecContext,
    stats: &mut QueryStats,
    merge: &MergeClause,
    rows: Vec<Row>,
    scope: &mut Vec<String>,
) -> Result<Vec<Row>> {
    let mut out = Vec::new();
    for row in rows {
        ectx.token.check()?;
        let matched = expand_pattern_part(ectx, &merge.pattern, vec![row.clone()])?;
        if matched.is_empty() {
            let mut created = row;
            create_pattern(ectx, stats, &merge.pattern, &mut created)?;
            apply_set_items(ectx, stats, &merge.on_create, &mut created)?;
            out.push(created);
        } else {
            for mut matched_row in matched {
                apply_set_items(ectx, stats, &merge.on_match, &mut matched_row)?;
                out.push(matched_row);
            }
        }
    }
    for var in pattern_variables(std::slice::from_ref(&merge.pattern)) {
        bind_name(scope, &var);
    }
    Ok(out)
}

// ============================================================================
// SET / REMOVE
// ============================================================================

pub(crate) fn set_clause(
    ectx: &ExecContext,
    stats: &mut QueryStats,
    items: &[SetItem],
    rows: Vec<Row>,
) -> Result<Vec<Row>> {
    let mut out = Vec::new();
    for mut row in rows {
        ectx.token.check()?;
        apply_set_items(ectx, stats, items, &mut row)?;
        out.push(row);
    }
    Ok(out)
}

pub(crate) fn apply_set_items(
    ectx: &ExecContext,
    stats: &mut QueryStats,
    items: &[SetItem],
    row: &mut Row,
) -> Result<()> {
    for item in items {
        match item {
            SetItem::Property { variable, key, value } => {
                let new_value = eval_expr(ectx, row, value)?;
                validate_property(key, &new_value)?;
                match entity_of(ectx, row, variable)? {
                    Entity::Node(mut node) => {
                        if new_value.is_null() {
                            node.properties.remove(key);
                        } else {
                            node.properties.insert(key.clone(), new_value);
                        }
                        ectx.store.update_node(node.clone())?;
                        stats.properties_set += 1;
                        row.insert(variable.clone(), Value::Node(Box::new(node)));
                    }
                    Entity::Edge(mut edge) => {
                        if new_value.is_null() {
                            edge.properties.remove(key);
                        } else {
                            edge.properties.insert(key.clone(), new_value);
                        }
                        ectx.store.update_edge(edge.clone())?;
                        stats.properties_set += 1;
                        row.insert(variable.clone(), Value::Relationship(Box::new(edge)));
                    }
                    Entity::Skip => {}
                }
            }

            SetItem::AllProperties { variable, value } => {
                let props = map_properties(ectx, row, value)?;
                match entity_of(ectx, row, variable)? {
                    Entity::Node(mut node) => {
                        stats.properties_set += props.len() as u64;
                        node.properties = props;
                        ectx.store.update_node(node.clone())?;
                        row.insert(variable.clone(), Value::Node(Box::new(node)));
                    }
                    Entity::Edge(mut edge) => {
                        stats.properties_set += props.len() as u64;
                        edge.properties = props;
                        ectx.store.update_edge(edge.clone())?;
                        row.insert(variable.clone(), Value::Relationship(Box::new(edge)));
                    }
                    Entity::Skip => {}
                }
            }

            SetItem::MergeProperties { variable, value } => {
                let props = map_properties_keep_null(ectx, row, value)?;
                match entity_of(ectx, row, variable)? {
                    Entity::Node(mut node) => {
                        for (key, val) in props {
                            if val.is_null() {
                                node.properties.remove(&key);
                            } else {
                                node.properties.insert(key, val);
                            }
                            stats.properties_set += 1;
                        }
                        ectx.store.update_node(node.clone())?;
                        row.insert(variable.clone(), Value::Node(Box::new(node)));
                    }
                    Entity::Edge(mut edge) => {
                        for (key, val) in props {
                            if val.is_null() {
                                edge.properties.remove(&key);
                            } else {
                                edge.properties.insert(key, val);
                            }
                            stats.properties_set += 1;
                        }
                        ectx.store.update_edge(edge.clone())?;
                        row.insert(variable.clone(), Value::Relationship(Box::new(edge)));
                    }
                    Entity::Skip => {}
                }
            }

            SetItem::Label { variable, label } => match entity_of(ectx, row, variable)? {
                Entity::Node(mut node) => {
                    if !node.has_label(label) {
                        node.labels.push(label.clone());
                        ectx.store.update_node(node.clone())?;
                        stats.labels_added += 1;
                    }
                    row.insert(variable.clone(), Value::Node(Box::new(node)));
                }
                Entity::Edge(_) => {
                    return Err(Error::TypeError {
                        expected: "NODE for label assignment".into(),
                        got: "RELATIONSHIP".into(),
                    });
                }
                Entity::Skip => {}
            },
        }
    }
    Ok(())
}

pub(crate) fn remove_clause(
    ectx: &ExecContext,
    stats: &mut QueryStats,
    clause: &RemoveClause,
    rows: Vec<Row>,
) -> Result<Vec<Row>> {
    let mut out = Vec::new();
    for mut row in rows {
        ectx.token.check()?;
        for item in &clause.items {
            match item {
                RemoveItem::Property { variable, key } => match entity_of(ectx, &row, variable)? {
                    Entity::Node(mut node) => {
                        if node.properties.remove(key).is_some() {
                            ectx.store.update_node(node.clone())?;
                            stats.properties_set += 1;
                        }
                        row.insert(variable.clone(), Value::Node(Box::new(node)));
                    }
                    Entity::Edge(mut edge) => {
                        if edge.properties.remove(key).is_some() {
                            ectx.store.update_edge(edge.clone())?;
                            stats.properties_set += 1;
                        }
                        row.insert(variable.clone(), Value::Relationship(Box::new(edge)));
                    }
                    Entity::Skip => {}
                },
                RemoveItem::Label { variable, label } => match entity_of(ectx, &row, variable)? {
                    Entity::Node(mut node) => {
                        if node.has_label(label) {
                            node.labels.retain(|l| l != label);
                            ectx.store.update_node(node.clone())?;
                            stats.labels_removed += 1;
                        }
                        row.insert(variable.clone(), Value::Node(Box::new(node)));
                    }
                    Entity::Edge(_) => {
                        return Err(Error::TypeError {
                            expected: "NODE for label removal".into(),
                            got: "RELATIONSHIP".into(),
                        });
                    }
                    Entity::Skip => {}
                },
            }
        }
        out.push(row);
    }
    Ok(out)
}

// ============================================================================
// DELETE
// ============================================================================

pub(crate) fn delete_clause(
    ectx: &ExecContext,
    stats: &mut QueryStats,
    clause: &DeleteClause,
    rows: Vec<Row>,
) -> Result<Vec<Row>> {
    // The same entity may appear in many rows; it is deleted at most once.
    let mut deleted_nodes: HashSet<NodeId> = HashSet::new();
    let mut deleted_edges: HashSet<RelId> = HashSet::new();

    for row in &rows {
        ectx.token.check()?;
        for variable in &clause.variables {
            match row.get(variable) {
                None => {
                    return Err(Error::TypeError {
                        expected: "bound variable".into(),
                        got: variable.clone(),
                    });
                }
                Some(Value::Null) => {}
                Some(Value::Node(n)) => delete_node(
                    ectx,
                    stats,
                    &n.id,
                    clause.detach,
                    &mut deleted_nodes,
                    &mut deleted_edges,
                )?,
                Some(Value::Relationship(r)) => {
                    delete_edge(ectx, stats, &r.id, &mut deleted_edges)?;
                }
                Some(Value::Path(p)) => {
                    for rel in &p.relationships {
                        delete_edge(ectx, stats, &rel.id, &mut deleted_edges)?;
                    }
                    for node in &p.nodes {
                        delete_node(
                            ectx,
                            stats,
                            &node.id,
                            clause.detach,
                            &mut deleted_nodes,
                            &mut deleted_edges,
                        )?;
                    }
                }
                Some(other) => {
                    return Err(Error::TypeError {
                        expected: "NODE, RELATIONSHIP, or PATH".into(),
                        got: other.type_name().into(),
                    });
                }
            }
        }
    }

    Ok(rows)
}

fn delete_node(
    ectx: &ExecContext,
    stats: &mut QueryStats,
    id: &NodeId,
    detach: bool,
    deleted_nodes: &mut HashSet<NodeId>,
    deleted_edges: &mut HashSet<RelId>,
) -> Result<()> {
    if deleted_nodes.contains(id) {
        return Ok(());
    }
    if detach {
        // Incident edges go first so the node delete cannot fail on them.
        let mut incident = ectx.store.outgoing_edges(id)?;
        incident.extend(ectx.store.incoming_edges(id)?);
        for edge in incident {
            delete_edge(ectx, stats, &edge.id, deleted_edges)?;
        }
    }
    if ectx.store.delete_node(id)? {
        stats.nodes_deleted += 1;
    }
    deleted_nodes.insert(id.clone());
    Ok(())
}

fn delete_edge(
    ectx: &ExecContext,
    stats: &mut QueryStats,
    id: &RelId,
    deleted_edges: &mut HashSet<RelId>,
) -> Result<()> {
    if deleted_edges.contains(id) {
        return Ok(());
    }
    if ectx.store.delete_edge(id)? {
        stats.relationships_deleted += 1;
    }
    deleted_edges.insert(id.clone());
    Ok(())
}

// ============================================================================
// Schema commands
// ============================================================================

pub(crate) fn run_schema(
    ectx: &ExecContext,
    stats: &mut QueryStats,
    cmd: &SchemaCommand,
) -> Result<()> {
    match cmd {
        SchemaCommand::CreateIndex { name, label, properties } => {
            let name = name
                .clone()
                .unwrap_or_else(|| format!("index_{}_{}", label, properties.join("_")));
            ectx.store.create_index(IndexInfo {
                name,
                index_type: "RANGE".into(),
                labels_or_types: vec![label.clone()],
                properties: properties.clone(),
                state: "ONLINE".into(),
            })?;
            stats.indexes_created += 1;
        }
        SchemaCommand::DropIndex { name } => {
            if !ectx.store.drop_index(name)? {
                return Err(Error::StorageError(format!("no such index '{name}'")));
            }
            stats.indexes_deleted += 1;
        }
        SchemaCommand::CreateConstraint { name, label, property, constraint_type } => {
            let name = name
                .clone()
                .unwrap_or_else(|| format!("constraint_{label}_{property}"));
            let constraint_type = match constraint_type.as_str() {
                "UNIQUE" => "UNIQUENESS".to_string(),
                "NOT NULL" => "NODE_PROPERTY_EXISTENCE".to_string(),
                other => other.to_string(),
            };
            ectx.store.create_constraint(ConstraintInfo {
                name,
                constraint_type,
                entity_type: "NODE".into(),
                labels_or_types: vec![label.clone()],
                properties: vec![property.clone()],
            })?;
            stats.constraints_created += 1;
        }
        SchemaCommand::DropConstraint { name } => {
            if !ectx.store.drop_constraint(name)? {
                return Err(Error::StorageError(format!("no such constraint '{name}'")));
            }
            stats.constraints_deleted += 1;
        }
    }
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

enum Entity {
    Node(Node),
    Edge(Relationship),
    /// A null or vanished binding: SET/REMOVE against it is a no-op.
    Skip,
}

/// Resolve a variable to the authoritative stored entity.
///
/// Bindings are value snapshots; a concurrent row of the same statement may
/// already have rewritten the entity, so the store copy wins.
fn entity_of(ectx: &ExecContext, row: &Row, variable: &str) -> Result<Entity> {
    match row.get(variable) {
        Some(Value::Node(n)) => Ok(match ectx.store.get_node(&n.id)? {
            Some(node) => Entity::Node(node),
            None => Entity::Skip,
        }),
        Some(Value::Relationship(r)) => Ok(match ectx.store.get_edge(&r.id)? {
            Some(edge) => Entity::Edge(edge),
            None => Entity::Skip,
        }),
        Some(Value::Null) => Ok(Entity::Skip),
        Some(other) => Err(Error::TypeError {
            expected: "NODE or RELATIONSHIP".into(),
            got: other.type_name().into(),
        }),
        None => Err(Error::TypeError {
            expected: "bound variable".into(),
            got: variable.to_owned(),
        }),
    }
}

fn map_properties(ectx: &ExecContext, row: &Row, value: &crate::cypher::ast::Expr) -> Result<PropertyMap> {
    let props = map_properties_keep_null(ectx, row, value)?;
    Ok(props.into_iter().filter(|(_, v)| !v.is_null()).collect())
}

fn map_properties_keep_null(
    ectx: &ExecContext,
    row: &Row,
    value: &crate::cypher::ast::Expr,
) -> Result<PropertyMap> {
    let evaluated = eval_expr(ectx, row, value)?;
    match evaluated {
        Value::Map(m) => {
            for (key, val) in &m {
                validate_property(key, val)?;
            }
            Ok(m)
        }
        Value::Node(n) => Ok(n.properties),
        Value::Relationship(r) => Ok(r.properties),
        other => Err(Error::TypeError {
            expected: "MAP".into(),
            got: other.type_name().into(),
        }),
    }
}
