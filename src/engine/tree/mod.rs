//! Tree-walking interpreter.
//!
//! Walks the parsed syntax tree directly against a `GraphStore`. This is the
//! reference backend: every clause, expression, and procedure the engine
//! supports is implemented here.
//!
//! Execution model: a binding set (`Vec<Row>`) flows through the clauses of
//! each query part. MATCH/UNWIND/CALL extend rows, WHERE filters them,
//! updating clauses mutate storage, and WITH/RETURN project them. WITH is
//! the only point where the binding set is rewritten wholesale.

pub(crate) mod aggregate;
pub(crate) mod eval;
pub(crate) mod functions;
pub(crate) mod matching;
pub(crate) mod paths;
pub(crate) mod procedures;
pub(crate) mod write;

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::cypher::{self, ast::*};
use crate::model::{PropertyMap, Value};
use crate::storage::GraphStore;
use crate::{Error, Result};

use super::{
    CancellationToken, NodeCreatedHook, QueryEmbedder, QueryEngine, QueryResult, QueryStats,
};

/// One candidate assignment of values to variables.
pub(crate) type Row = hashbrown::HashMap<String, Value>;

/// Maximum hops for unbounded variable-length traversals.
pub(crate) const VAR_LENGTH_MAX_HOPS: u32 = 15;

/// Per-execute context shared by the evaluator, matcher, and writers.
pub(crate) struct ExecContext<'a> {
    pub store: &'a dyn GraphStore,
    pub params: &'a PropertyMap,
    pub token: &'a CancellationToken,
    pub node_hook: Option<NodeCreatedHook>,
}

// ============================================================================
// TreeEngine
// ============================================================================

/// The tree-walking backend.
pub struct TreeEngine {
    store: Arc<dyn GraphStore>,
    node_hook: RwLock<Option<NodeCreatedHook>>,
    embedder: RwLock<Option<Arc<dyn QueryEmbedder>>>,
}

impl TreeEngine {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            node_hook: RwLock::new(None),
            embedder: RwLock::new(None),
        }
    }

    /// The embedding client installed via `set_query_embedder`, if any.
    pub fn query_embedder(&self) -> Option<Arc<dyn QueryEmbedder>> {
        self.embedder.read().clone()
    }
}

impl QueryEngine for TreeEngine {
    fn execute(
        &self,
        ctx: &CancellationToken,
        source: &str,
        params: PropertyMap,
    ) -> Result<QueryResult> {
        ctx.check()?;
        if source.trim().is_empty() {
            return Err(Error::EmptyQuery);
        }

        let script = cypher::parse(source)?;

        let mut stats = QueryStats::default();
        let mut columns: Vec<String> = Vec::new();
        let mut rows: Vec<Vec<Value>> = Vec::new();

        for query in &script.queries {
            ctx.check()?;
            let ectx = ExecContext {
                store: self.store.as_ref(),
                params: &params,
                token: ctx,
                node_hook: self.node_hook.read().clone(),
            };

            match query {
                Query::Regular(q) => {
                    let (c, r, s) =
                        run_regular_query(&ectx, q).map_err(|e| e.storage_context(source))?;
                    columns = c;
                    rows = r;
                    stats.merge(&s);
                }
                Query::StandaloneCall(call) => {
                    let (c, r) = run_standalone_call(&ectx, call)?;
                    columns = c;
                    rows = r;
                }
                Query::Show(cmd) => {
                    let (c, r) = procedures::show(&ectx, *cmd)?;
                    columns = c;
                    rows = r;
                }
                Query::Schema(cmd) => {
                    let mut s = QueryStats::default();
                    write::run_schema(&ectx, &mut s, cmd)?;
                    stats.merge(&s);
                    columns = Vec::new();
                    rows = Vec::new();
                }
                Query::Transaction(cmd) => {
                    run_transaction(&ectx, *cmd)?;
                    columns = Vec::new();
                    rows = Vec::new();
                }
            }
        }

        Ok(QueryResult { columns, rows, stats })
    }

    fn set_node_created_hook(&self, hook: NodeCreatedHook) {
        *self.node_hook.write() = Some(hook);
    }

    fn set_query_embedder(&self, embedder: Arc<dyn QueryEmbedder>) {
        *self.embedder.write() = Some(embedder);
    }

    fn close(&self) {}
}

// ============================================================================
// Regular query pipeline
// ============================================================================

fn run_regular_query(
    ectx: &ExecContext,
    query: &RegularQuery,
) -> Result<(Vec<String>, Vec<Vec<Value>>, QueryStats)> {
    let mut stats = QueryStats::default();
    let mut rows: Vec<Row> = vec![Row::new()];
    let mut scope: Vec<String> = Vec::new();

    for part in &query.parts {
        rows = run_clauses(ectx, &mut stats, &part.clauses, rows, &mut scope)?;
        let (new_scope, new_rows) = apply_with(ectx, &part.with, rows, &scope)?;
        scope = new_scope;
        rows = new_rows;
    }

    rows = run_clauses(ectx, &mut stats, &query.tail.clauses, rows, &mut scope)?;

    match &query.tail.return_clause {
        Some(ret) => {
            let (columns, projected) = project(
                ectx,
                &ret.items,
                ret.distinct,
                &ret.order_by,
                &ret.skip,
                &ret.limit,
                rows,
                &scope,
            )?;
            let out = projected
                .into_iter()
                .map(|row| {
                    columns
                        .iter()
                        .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
                        .collect()
                })
                .collect();
            Ok((columns, out, stats))
        }
        None => Ok((Vec::new(), Vec::new(), stats)),
    }
}

fn run_clauses(
    ectx: &ExecContext,
    stats: &mut QueryStats,
    clauses: &[Clause],
    mut rows: Vec<Row>,
    scope: &mut Vec<String>,
) -> Result<Vec<Row>> {
    for clause in clauses {
        ectx.token.check()?;
        rows = match clause {
            Clause::Reading(ReadingClause::Match(m)) => {
                matching::match_clause(ectx, m, rows, scope)?
            }
            Clause::Reading(ReadingClause::Unwind(u)) => run_unwind(ectx, u, rows, scope)?,
            Clause::Reading(ReadingClause::Call(c)) => run_query_call(ectx, c, rows, scope)?,
            Clause::Updating(UpdatingClause::Create(c)) => {
                write::create_clause(ectx, stats, c, rows, scope)?
            }
            Clause::Updating(UpdatingClause::Merge(m)) => {
                write::merge_clause(ectx, stats, m, rows, scope)?
            }
            Clause::Updating(UpdatingClause::Delete(d)) => {
                write::delete_clause(ectx, stats, d, rows)?
            }
            Clause::Updating(UpdatingClause::Set(s)) => {
                write::set_clause(ectx, stats, &s.items, rows)?
            }
            Clause::Updating(UpdatingClause::Remove(r)) => {
                write::remove_clause(ectx, stats, r, rows)?
            }
        };
    }
    Ok(rows)
}

// ============================================================================
// UNWIND
// ============================================================================

fn run_unwind(
    ectx: &ExecContext,
    unwind: &UnwindClause,
    rows: Vec<Row>,
    scope: &mut Vec<String>,
) -> Result<Vec<Row>> {
    let mut out = Vec::new();
    for row in &rows {
        ectx.token.check()?;
        let value = eval::eval_expr(ectx, row, &unwind.expr)?;
        let items = match value {
            Value::List(items) => items,
            // null unwinds to no rows; any other value to a singleton list
            Value::Null => Vec::new(),
            other => vec![other],
        };
        for item in items {
            let mut new_row = row.clone();
            new_row.insert(unwind.alias.clone(), item);
            out.push(new_row);
        }
    }
    bind_name(scope, &unwind.alias);
    Ok(out)
}

// ============================================================================
// CALL ... YIELD
// ============================================================================

fn run_query_call(
    ectx: &ExecContext,
    call: &CallClause,
    rows: Vec<Row>,
    scope: &mut Vec<String>,
) -> Result<Vec<Row>> {
    let empty = Row::new();
    let args: Vec<Value> = call
        .args
        .iter()
        .map(|a| eval::eval_expr(ectx, &empty, a))
        .collect::<Result<_>>()?;
    let (columns, proc_rows) = procedures::call_procedure(ectx, &call.name, &args)?;

    let bound: Vec<String> = if call.yields.is_empty() {
        columns.clone()
    } else {
        for y in &call.yields {
            if !columns.contains(y) {
                return Err(Error::TypeError {
                    expected: format!("YIELD column from [{}]", columns.join(", ")),
                    got: y.clone(),
                });
            }
        }
        call.yields.clone()
    };

    let mut out = Vec::new();
    for row in &rows {
        ectx.token.check()?;
        for proc_row in &proc_rows {
            let mut new_row = row.clone();
            for name in &bound {
                let idx = columns.iter().position(|c| c == name).expect("validated above");
                new_row.insert(name.clone(), proc_row[idx].clone());
            }
            out.push(new_row);
        }
    }
    for name in &bound {
        bind_name(scope, name);
    }
    Ok(out)
}

fn run_standalone_call(
    ectx: &ExecContext,
    call: &CallClause,
) -> Result<(Vec<String>, Vec<Vec<Value>>)> {
    let empty = Row::new();
    let args: Vec<Value> = call
        .args
        .iter()
        .map(|a| eval::eval_expr(ectx, &empty, a))
        .collect::<Result<_>>()?;
    let (columns, rows) = procedures::call_procedure(ectx, &call.name, &args)?;

    if call.yields.is_empty() {
        return Ok((columns, rows));
    }

    let mut indices = Vec::new();
    for y in &call.yields {
        let idx = columns.iter().position(|c| c == y).ok_or_else(|| Error::TypeError {
            expected: format!("YIELD column from [{}]", columns.join(", ")),
            got: y.clone(),
        })?;
        indices.push(idx);
    }
    let rows = rows
        .into_iter()
        .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
        .collect();
    Ok((call.yields.clone(), rows))
}

// ============================================================================
// Transactions
// ============================================================================

fn run_transaction(ectx: &ExecContext, cmd: TxCommand) -> Result<()> {
    debug!(?cmd, "transaction command");
    match cmd {
        TxCommand::Begin => ectx.store.begin_transaction(),
        TxCommand::Commit => ectx.store.commit_transaction(),
        TxCommand::Rollback => ectx.store.rollback_transaction(),
    }
}

// ============================================================================
// WITH
// ============================================================================

fn apply_with(
    ectx: &ExecContext,
    with: &WithClause,
    rows: Vec<Row>,
    scope: &[String],
) -> Result<(Vec<String>, Vec<Row>)> {
    let (columns, mut projected) = project(
        ectx,
        &with.items,
        with.distinct,
        &with.order_by,
        &with.skip,
        &with.limit,
        rows,
        scope,
    )?;

    // Keep only the declared columns visible downstream.
    for row in &mut projected {
        row.retain(|k, _| columns.contains(k));
    }

    // WHERE after WITH filters the projected rows (HAVING under aggregation).
    if let Some(pred) = &with.where_clause {
        let mut kept = Vec::new();
        for row in projected {
            ectx.token.check()?;
            if eval::is_true(&eval::eval_expr(ectx, &row, pred)?) {
                kept.push(row);
            }
        }
        projected = kept;
    }

    Ok((columns, projected))
}

// ============================================================================
// Projection (shared by RETURN and WITH)
// ============================================================================

#[allow(clippy::too_many_arguments)]
pub(crate) fn project(
    ectx: &ExecContext,
    items: &[ProjectionItem],
    distinct: bool,
    order_by: &[OrderItem],
    skip: &Option<Expr>,
    limit: &Option<Expr>,
    rows: Vec<Row>,
    scope: &[String],
) -> Result<(Vec<String>, Vec<Row>)> {
    // Expand `*` into the variables currently in scope.
    let mut named: Vec<(String, Expr)> = Vec::new();
    for item in items {
        if matches!(item.expr, Expr::Star) {
            for var in scope {
                named.push((var.clone(), Expr::Variable(var.clone())));
            }
        } else {
            let name = item.alias.clone().unwrap_or_else(|| item.expr.to_string());
            named.push((name, item.expr.clone()));
        }
    }
    let columns: Vec<String> = named.iter().map(|(n, _)| n.clone()).collect();

    let has_aggregate = named.iter().any(|(_, e)| e.contains_aggregate());

    // `projected` rows are keyed by column name; `sort_basis` additionally
    // keeps the pre-projection bindings so ORDER BY can reach them.
    let mut projected: Vec<(Row, Row)> = Vec::new();
    if has_aggregate {
        for row in aggregate::aggregate_project(ectx, &named, &rows)? {
            projected.push((row.clone(), row));
        }
    } else {
        for row in &rows {
            ectx.token.check()?;
            let mut new_row = Row::new();
            for (name, expr) in &named {
                let value = eval::eval_expr(ectx, row, expr)?;
                new_row.insert(name.clone(), value);
            }
            let mut basis = row.clone();
            for (k, v) in &new_row {
                basis.insert(k.clone(), v.clone());
            }
            projected.push((new_row, basis));
        }
    }

    if distinct {
        let mut seen = std::collections::HashSet::new();
        projected.retain(|(row, _)| {
            let key: Vec<String> = columns
                .iter()
                .map(|c| row.get(c).map(Value::canonical_text).unwrap_or_default())
                .collect();
            seen.insert(key)
        });
    }

    if !order_by.is_empty() {
        let mut keyed: Vec<(Vec<Value>, Row)> = Vec::with_capacity(projected.len());
        for (row, basis) in projected {
            ectx.token.check()?;
            let keys = order_by
                .iter()
                .map(|item| eval::eval_expr(ectx, &basis, &item.expr))
                .collect::<Result<Vec<_>>>()?;
            keyed.push((keys, row));
        }
        keyed.sort_by(|(a, _), (b, _)| {
            for (i, item) in order_by.iter().enumerate() {
                let ord = a[i].order_cmp(&b[i]);
                let ord = if item.ascending { ord } else { ord.reverse() };
                if ord != std::cmp::Ordering::Equal {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        });
        projected = keyed.into_iter().map(|(_, row)| (row, Row::new())).collect();
    }

    let mut out: Vec<Row> = projected.into_iter().map(|(row, _)| row).collect();

    if let Some(skip_expr) = skip {
        let n = eval_pagination(ectx, skip_expr, "SKIP")?;
        out = out.into_iter().skip(n).collect();
    }
    if let Some(limit_expr) = limit {
        let n = eval_pagination(ectx, limit_expr, "LIMIT")?;
        out.truncate(n);
    }

    Ok((columns, out))
}

fn eval_pagination(ectx: &ExecContext, expr: &Expr, what: &str) -> Result<usize> {
    let value = eval::eval_expr(ectx, &Row::new(), expr)?;
    match value.as_int() {
        Some(n) if n >= 0 => Ok(n as usize),
        _ => Err(Error::TypeError {
            expected: format!("non-negative integer for {what}"),
            got: value.canonical_text(),
        }),
    }
}

/// Track a variable entering the scope, preserving introduction order.
pub(crate) fn bind_name(scope: &mut Vec<String>, name: &str) {
    if !scope.iter().any(|s| s == name) {
        scope.push(name.to_owned());
    }
}
