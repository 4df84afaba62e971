//! Built-in procedures (`CALL db.*`) and SHOW commands.
//!
//! Every procedure returns a fixed column shape; rows are ordered
//! deterministically (sorted) so results are stable across runs.

use std::collections::{BTreeMap, BTreeSet};

use crate::cypher::ast::ShowCommand;
use crate::model::{PropertyMap, Value};
use crate::{Error, Result};

use super::{ExecContext, functions::FUNCTION_NAMES};

/// Registered procedure names, for `SHOW PROCEDURES`.
pub(crate) const PROCEDURE_NAMES: &[&str] = &[
    "db.constraints",
    "db.indexes",
    "db.labels",
    "db.propertyKeys",
    "db.relationshipTypes",
    "db.schema.nodeTypeProperties",
    "db.schema.relTypeProperties",
    "db.schema.visualization",
];

type Table = (Vec<String>, Vec<Vec<Value>>);

pub(crate) fn call_procedure(ectx: &ExecContext, name: &str, _args: &[Value]) -> Result<Table> {
    match name {
        "db.labels" => db_labels(ectx),
        "db.relationshipTypes" => db_relationship_types(ectx),
        "db.propertyKeys" => db_property_keys(ectx),
        "db.indexes" => db_indexes(ectx),
        "db.constraints" => db_constraints(ectx),
        "db.schema.visualization" => db_schema_visualization(ectx),
        "db.schema.nodeTypeProperties" => db_schema_node_type_properties(ectx),
        "db.schema.relTypeProperties" => db_schema_rel_type_properties(ectx),
        other => Err(Error::UnknownProcedure(other.to_owned())),
    }
}

pub(crate) fn show(ectx: &ExecContext, cmd: ShowCommand) -> Result<Table> {
    match cmd {
        ShowCommand::Indexes => db_indexes(ectx),
        ShowCommand::Constraints => db_constraints(ectx),
        ShowCommand::Procedures => Ok((
            vec!["name".into()],
            PROCEDURE_NAMES
                .iter()
                .map(|n| vec![Value::String((*n).to_owned())])
                .collect(),
        )),
        ShowCommand::Functions => Ok((
            vec!["name".into()],
            FUNCTION_NAMES
                .iter()
                .map(|n| vec![Value::String((*n).to_owned())])
                .collect(),
        )),
    }
}

// ============================================================================
// Introspection procedures
// ============================================================================

fn db_labels(ectx: &ExecContext) -> Result<Table> {
    let mut labels = BTreeSet::new();
    for node in ectx.store.all_nodes()? {
        ectx.token.check()?;
        for label in &node.labels {
            labels.insert(label.clone());
        }
    }
    Ok((
        vec!["label".into()],
        labels.into_iter().map(|l| vec![Value::String(l)]).collect(),
    ))
}

fn db_relationship_types(ectx: &ExecContext) -> Result<Table> {
    let mut types = BTreeSet::new();
    for edge in ectx.store.all_edges()? {
        ectx.token.check()?;
        types.insert(edge.rel_type.clone());
    }
    Ok((
        vec!["relationshipType".into()],
        types.into_iter().map(|t| vec![Value::String(t)]).collect(),
    ))
}

fn db_property_keys(ectx: &ExecContext) -> Result<Table> {
    let mut keys = BTreeSet::new();
    for node in ectx.store.all_nodes()? {
        ectx.token.check()?;
        for key in node.properties.keys() {
            keys.insert(key.clone());
        }
    }
    for edge in ectx.store.all_edges()? {
        ectx.token.check()?;
        for key in edge.properties.keys() {
            keys.insert(key.clone());
        }
    }
    Ok((
        vec!["propertyKey".into()],
        keys.into_iter().map(|k| vec![Value::String(k)]).collect(),
    ))
}

fn db_indexes(ectx: &ExecContext) -> Result<Table> {
    let columns = vec![
        "name".into(),
        "type".into(),
        "labelsOrTypes".into(),
        "properties".into(),
        "state".into(),
    ];
    let rows = ectx
        .store
        .indexes()?
        .into_iter()
        .map(|info| {
            vec![
                Value::String(info.name),
                Value::String(info.index_type),
                string_list(info.labels_or_types),
                string_list(info.properties),
                Value::String(info.state),
            ]
        })
        .collect();
    Ok((columns, rows))
}

fn db_constraints(ectx: &ExecContext) -> Result<Table> {
    let columns = vec![
        "name".into(),
        "type".into(),
        "entityType".into(),
        "labelsOrTypes".into(),
        "properties".into(),
    ];
    let rows = ectx
        .store
        .constraints()?
        .into_iter()
        .map(|info| {
            vec![
                Value::String(info.name),
                Value::String(info.constraint_type),
                Value::String(info.entity_type),
                string_list(info.labels_or_types),
                string_list(info.properties),
            ]
        })
        .collect();
    Ok((columns, rows))
}

// ============================================================================
// Schema procedures
// ============================================================================

fn db_schema_visualization(ectx: &ExecContext) -> Result<Table> {
    let mut labels = BTreeSet::new();
    for node in ectx.store.all_nodes()? {
        for label in &node.labels {
            labels.insert(label.clone());
        }
    }
    let mut types = BTreeSet::new();
    for edge in ectx.store.all_edges()? {
        types.insert(edge.rel_type.clone());
    }

    let nodes = Value::List(
        labels
            .into_iter()
            .map(|l| {
                let mut m = PropertyMap::new();
                m.insert("name".into(), Value::String(l));
                Value::Map(m)
            })
            .collect(),
    );
    let relationships = Value::List(
        types
            .into_iter()
            .map(|t| {
                let mut m = PropertyMap::new();
                m.insert("name".into(), Value::String(t));
                Value::Map(m)
            })
            .collect(),
    );

    Ok((
        vec!["nodes".into(), "relationships".into()],
        vec![vec![nodes, relationships]],
    ))
}

fn db_schema_node_type_properties(ectx: &ExecContext) -> Result<Table> {
    let columns = vec![
        "nodeType".into(),
        "nodeLabels".into(),
        "propertyName".into(),
        "propertyTypes".into(),
        "mandatory".into(),
    ];

    // label → property → (type names, nodes having it)
    let mut per_label: BTreeMap<String, BTreeMap<String, (BTreeSet<String>, u64)>> =
        BTreeMap::new();
    let mut label_counts: BTreeMap<String, u64> = BTreeMap::new();

    for node in ectx.store.all_nodes()? {
        ectx.token.check()?;
        for label in &node.labels {
            *label_counts.entry(label.clone()).or_default() += 1;
            let props = per_label.entry(label.clone()).or_default();
            for (key, value) in &node.properties {
                let entry = props.entry(key.clone()).or_default();
                entry.0.insert(value.type_name().to_owned());
                entry.1 += 1;
            }
        }
    }

    let mut rows = Vec::new();
    for (label, props) in per_label {
        let total = label_counts[&label];
        for (prop, (types, count)) in props {
            rows.push(vec![
                Value::String(format!(":`{label}`")),
                string_list(vec![label.clone()]),
                Value::String(prop),
                string_list(types.into_iter().collect()),
                Value::Bool(count == total),
            ]);
        }
    }
    Ok((columns, rows))
}

fn db_schema_rel_type_properties(ectx: &ExecContext) -> Result<Table> {
    let columns = vec![
        "relType".into(),
        "propertyName".into(),
        "propertyTypes".into(),
        "mandatory".into(),
    ];

    let mut per_type: BTreeMap<String, BTreeMap<String, (BTreeSet<String>, u64)>> =
        BTreeMap::new();
    let mut type_counts: BTreeMap<String, u64> = BTreeMap::new();

    for edge in ectx.store.all_edges()? {
        ectx.token.check()?;
        *type_counts.entry(edge.rel_type.clone()).or_default() += 1;
        let props = per_type.entry(edge.rel_type.clone()).or_default();
        for (key, value) in &edge.properties {
            let entry = props.entry(key.clone()).or_default();
            entry.0.insert(value.type_name().to_owned());
            entry.1 += 1;
        }
    }

    let mut rows = Vec::new();
    for (rel_type, props) in per_type {
        let total = type_counts[&rel_type];
        for (prop, (types, count)) in props {
            rows.push(vec![
                Value::String(format!(":`{rel_type}`")),
                Value::String(prop),
                string_list(types.into_iter().collect()),
                Value::Bool(count == total),
            ]);
        }
    }
    Ok((columns, rows))
}

fn string_list(items: Vec<String>) -> Value {
    Value::List(items.into_iter().map(Value::String).collect())
}
