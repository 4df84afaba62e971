//! Pattern-directed interpreter.
//!
//! The fast path: no CST is built. The query kind is identified from its
//! leading keyword and the presence of specific tokens (WHERE, RETURN,
//! ORDER BY, SKIP, LIMIT, DELETE, SET), and a small set of regexes extracts
//! the relevant sub-expressions into clause fragments. Those fragments are
//! evaluated through the same matcher, evaluator, and writers as the tree
//! backend, so the two agree wherever this one accepts a query at all.
//!
//! Anything this backend cannot extract fails loudly with
//! `Error::UnsupportedQuery` — never a silent miscomputation.

use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use regex::Regex;

use crate::cypher::ast::{
    CreateClause, DeleteClause, Expr, Literal, NodePattern, OrderItem, PatternDirection,
    PatternPart, ProjectionItem, RelPattern, SetItem, StringOp, VarLength,
};
use crate::model::{PropertyMap, Value};
use crate::storage::GraphStore;
use crate::{Error, Result};

use super::tree::{self, ExecContext, Row, bind_name, matching, write};
use super::{
    CancellationToken, NodeCreatedHook, QueryEmbedder, QueryEngine, QueryResult, QueryStats,
};

// ============================================================================
// PatternEngine
// ============================================================================

/// The regex-directed execution backend.
pub struct PatternEngine {
    store: Arc<dyn GraphStore>,
    node_hook: RwLock<Option<NodeCreatedHook>>,
    embedder: RwLock<Option<Arc<dyn QueryEmbedder>>>,
}

impl PatternEngine {
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

impl QueryEngine for PatternEngine {
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

        let mut stats = QueryStats::default();
        let mut columns = Vec::new();
        let mut rows = Vec::new();

        for statement in split_top_level(source, ';') {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }
            ctx.check()?;
            let ectx = ExecContext {
                store: self.store.as_ref(),
                params: &params,
                token: ctx,
                node_hook: self.node_hook.read().clone(),
            };
            let (c, r, s) = execute_statement(&ectx, statement)?;
            columns = c;
            rows = r;
            stats.merge(&s);
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
// Statement dispatch
// ============================================================================

type Table = (Vec<String>, Vec<Vec<Value>>, QueryStats);

fn execute_statement(ectx: &ExecContext, text: &str) -> Result<Table> {
    let keyword = text
        .split_whitespace()
        .next()
        .map(str::to_ascii_uppercase)
        .unwrap_or_default();

    match keyword.as_str() {
        "CREATE" => run_create(ectx, text),
        "MATCH" => {
            if find_keyword(text, "DELETE").is_some() {
                run_match_delete(ectx, text)
            } else if find_keyword(text, "SET").is_some() {
                run_match_set(ectx, text)
            } else if find_keyword(text, "RETURN").is_some() {
                run_match_return(ectx, text)
            } else {
                Err(Error::UnsupportedQuery(
                    "MATCH must be followed by RETURN, SET, or DELETE".into(),
                ))
            }
        }
        other => Err(Error::UnsupportedQuery(format!(
            "query shape '{other}' is not handled by the pattern backend"
        ))),
    }
}

// ============================================================================
// CREATE
// ============================================================================

fn run_create(ectx: &ExecContext, text: &str) -> Result<Table> {
    if find_keyword(text, "RETURN").is_some() {
        return Err(Error::UnsupportedQuery("RETURN after CREATE".into()));
    }
    let body = text["CREATE".len()..].trim();

    let mut patterns = Vec::new();
    for part in split_top_level(body, ',') {
        patterns.push(parse_pattern_chain(part.trim())?);
    }

    let mut stats = QueryStats::default();
    let mut scope = Vec::new();
    write::create_clause(
        ectx,
        &mut stats,
        &CreateClause { patterns },
        vec![Row::new()],
        &mut scope,
    )?;
    Ok((Vec::new(), Vec::new(), stats))
}

// ============================================================================
// MATCH ... RETURN
// ============================================================================

fn run_match_return(ectx: &ExecContext, text: &str) -> Result<Table> {
    let sections = split_match_sections(text)?;
    let return_text = sections
        .return_text
        .ok_or_else(|| Error::UnsupportedQuery("MATCH without RETURN".into()))?;

    let (rows, scope) = matched_rows(ectx, &sections)?;

    // RETURN [DISTINCT] items
    let (distinct, items_text) = strip_leading_keyword(return_text, "DISTINCT");
    let mut items = Vec::new();
    for item in split_top_level(items_text, ',') {
        items.push(parse_projection_item(item.trim())?);
    }

    let order_by = match sections.order_text {
        Some(order_text) => parse_order_items(order_text)?,
        None => Vec::new(),
    };
    let skip = sections.skip_text.map(parse_value_expr).transpose()?;
    let limit = sections.limit_text.map(parse_value_expr).transpose()?;

    let (columns, projected) =
        tree::project(ectx, &items, distinct, &order_by, &skip, &limit, rows, &scope)?;
    let out = projected
        .into_iter()
        .map(|row| {
            columns
                .iter()
                .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
                .collect()
        })
        .collect();
    Ok((columns, out, QueryStats::default()))
}

// ============================================================================
// MATCH ... SET
// ============================================================================

fn run_match_set(ectx: &ExecContext, text: &str) -> Result<Table> {
    let sections = split_match_sections(text)?;
    let set_text = sections
        .set_text
        .ok_or_else(|| Error::UnsupportedQuery("expected SET clause".into()))?;
    if sections.return_text.is_some() {
        return Err(Error::UnsupportedQuery("RETURN after SET".into()));
    }

    let (rows, _scope) = matched_rows(ectx, &sections)?;

    let mut items = Vec::new();
    for raw in split_top_level(set_text, ',') {
        items.push(parse_set_item(raw.trim())?);
    }

    let mut stats = QueryStats::default();
    write::set_clause(ectx, &mut stats, &items, rows)?;
    Ok((Vec::new(), Vec::new(), stats))
}

fn parse_set_item(text: &str) -> Result<SetItem> {
    static ASSIGN: OnceLock<Regex> = OnceLock::new();
    let assign = ASSIGN.get_or_init(|| {
        Regex::new(r"^(?P<var>[A-Za-z_]\w*)\.(?P<key>[A-Za-z_]\w*)\s*=\s*(?P<rhs>.+)$")
            .expect("static regex")
    });
    if let Some(caps) = assign.captures(text) {
        return Ok(SetItem::Property {
            variable: caps["var"].to_owned(),
            key: caps["key"].to_owned(),
            value: parse_value_expr(&caps["rhs"])?,
        });
    }

    static LABEL: OnceLock<Regex> = OnceLock::new();
    let label = LABEL.get_or_init(|| {
        Regex::new(r"^(?P<var>[A-Za-z_]\w*)\s*:\s*(?P<label>[A-Za-z_]\w*)$").expect("static regex")
    });
    if let Some(caps) = label.captures(text) {
        return Ok(SetItem::Label {
            variable: caps["var"].to_owned(),
            label: caps["label"].to_owned(),
        });
    }

    Err(Error::UnsupportedQuery(format!("SET item '{text}'")))
}

// ============================================================================
// MATCH ... [DETACH] DELETE
// ============================================================================

fn run_match_delete(ectx: &ExecContext, text: &str) -> Result<Table> {
    let sections = split_match_sections(text)?;
    let delete_text = sections
        .delete_text
        .ok_or_else(|| Error::UnsupportedQuery("expected DELETE clause".into()))?;

    let (rows, _scope) = matched_rows(ectx, &sections)?;

    let mut variables = Vec::new();
    for raw in split_top_level(delete_text, ',') {
        let var = raw.trim();
        if !is_identifier(var) {
            return Err(Error::UnsupportedQuery(format!("DELETE target '{var}'")));
        }
        variables.push(var.to_owned());
    }

    let mut stats = QueryStats::default();
    write::delete_clause(
        ectx,
        &mut stats,
        &DeleteClause { detach: sections.detach, variables },
        rows,
    )?;
    Ok((Vec::new(), Vec::new(), stats))
}

// ============================================================================
// Shared MATCH machinery
// ============================================================================

struct MatchSections<'a> {
    pattern_text: &'a str,
    where_text: Option<&'a str>,
    return_text: Option<&'a str>,
    set_text: Option<&'a str>,
    delete_text: Option<&'a str>,
    order_text: Option<&'a str>,
    skip_text: Option<&'a str>,
    limit_text: Option<&'a str>,
    detach: bool,
}

/// Slice a MATCH statement into its clause sections by keyword positions.
fn split_match_sections(text: &str) -> Result<MatchSections<'_>> {
    let where_pos = find_keyword(text, "WHERE");
    let return_pos = find_keyword(text, "RETURN");
    let set_pos = find_keyword(text, "SET");
    let detach_pos = find_keyword(text, "DETACH");
    let delete_pos = find_keyword(text, "DELETE");
    let order_pos = find_keyword(text, "ORDER");
    let skip_pos = find_keyword(text, "SKIP");
    let limit_pos = find_keyword(text, "LIMIT");

    let pattern_end = [where_pos, return_pos, set_pos, detach_pos, delete_pos]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(text.len());
    let pattern_text = text["MATCH".len()..pattern_end].trim();

    let where_text = where_pos.map(|w| {
        let end = [return_pos, set_pos, detach_pos, delete_pos]
            .into_iter()
            .flatten()
            .filter(|&p| p > w)
            .min()
            .unwrap_or(text.len());
        text[w + "WHERE".len()..end].trim()
    });

    let return_text = return_pos.map(|r| {
        let end = [order_pos, skip_pos, limit_pos]
            .into_iter()
            .flatten()
            .filter(|&p| p > r)
            .min()
            .unwrap_or(text.len());
        text[r + "RETURN".len()..end].trim()
    });

    let set_text = set_pos.map(|s| {
        let end = [return_pos, detach_pos, delete_pos]
            .into_iter()
            .flatten()
            .filter(|&p| p > s)
            .min()
            .unwrap_or(text.len());
        text[s + "SET".len()..end].trim()
    });

    let delete_text = delete_pos.map(|d| text[d + "DELETE".len()..].trim());

    let order_text = order_pos
        .map(|o| {
            let by = find_keyword(&text[o..], "BY")
                .ok_or_else(|| Error::UnsupportedQuery("ORDER without BY".into()))?;
            let start = o + by + "BY".len();
            let end = [skip_pos, limit_pos]
                .into_iter()
                .flatten()
                .filter(|&p| p > start)
                .min()
                .unwrap_or(text.len());
            Ok(text[start..end].trim())
        })
        .transpose()?;

    let skip_text = skip_pos.map(|s| {
        let end = limit_pos.filter(|&p| p > s).unwrap_or(text.len());
        text[s + "SKIP".len()..end].trim()
    });
    let limit_text = limit_pos.map(|l| text[l + "LIMIT".len()..].trim());

    Ok(MatchSections {
        pattern_text,
        where_text,
        return_text,
        set_text,
        delete_text,
        order_text,
        skip_text,
        limit_text,
        detach: detach_pos.is_some(),
    })
}

/// Expand the pattern section and apply WHERE; the shared matcher does the
/// actual work so semantics line up with the tree backend.
fn matched_rows(ectx: &ExecContext, sections: &MatchSections) -> Result<(Vec<Row>, Vec<String>)> {
    let mut patterns = Vec::new();
    for part in split_top_level(sections.pattern_text, ',') {
        patterns.push(parse_pattern_chain(part.trim())?);
    }

    let mut rows = matching::expand_patterns(ectx, &patterns, vec![Row::new()])?;
    if let Some(where_text) = sections.where_text {
        let predicate = parse_where(where_text)?;
        rows = matching::filter_rows(ectx, rows, &predicate)?;
    }

    let mut scope = Vec::new();
    for var in matching::pattern_variables(&patterns) {
        bind_name(&mut scope, &var);
    }
    Ok((rows, scope))
}

// ============================================================================
// Pattern extraction
// ============================================================================

fn node_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\(\s*(?P<var>[A-Za-z_]\w*)?\s*(?P<labels>(?::\s*[A-Za-z_]\w*)*)\s*(?P<props>\{[^{}]*\})?\s*\)",
        )
        .expect("static regex")
    })
}

fn rel_inner_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\s*(?P<var>[A-Za-z_]\w*)?\s*(?::\s*(?P<types>[A-Za-z_]\w*(?:\s*\|\s*:?\s*[A-Za-z_]\w*)*))?\s*(?P<span>\*\s*\d*\s*(?:\.\.\s*\d*)?)?\s*(?P<props>\{[^{}]*\})?\s*$",
        )
        .expect("static regex")
    })
}

fn parse_pattern_chain(text: &str) -> Result<PatternPart> {
    let mut rest = text.trim();
    let (start, consumed) = parse_node(rest)?;
    rest = rest[consumed..].trim_start();

    let mut chain = Vec::new();
    while !rest.is_empty() {
        let (rel, consumed) = parse_rel(rest)?;
        rest = rest[consumed..].trim_start();
        let (node, consumed) = parse_node(rest)?;
        rest = rest[consumed..].trim_start();
        chain.push((rel, node));
    }

    Ok(PatternPart { variable: None, shortest: None, start, chain })
}

fn parse_node(text: &str) -> Result<(NodePattern, usize)> {
    let caps = node_regex()
        .captures(text)
        .ok_or_else(|| Error::UnsupportedQuery(format!("node pattern at '{text}'")))?;
    let full = caps.get(0).expect("whole match");

    let variable = caps.name("var").map(|m| m.as_str().to_owned());
    let labels: Vec<String> = caps
        .name("labels")
        .map(|m| {
            m.as_str()
                .split(':')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();
    let properties = match caps.name("props") {
        Some(m) => parse_prop_map(m.as_str())?,
        None => Vec::new(),
    };

    Ok((NodePattern { variable, labels, properties }, full.end()))
}

fn parse_rel(text: &str) -> Result<(RelPattern, usize)> {
    // Bare arrows first: -->, <--
    if text.starts_with("-->") {
        return Ok((empty_rel(PatternDirection::Outgoing), 3));
    }
    if text.starts_with("<--") {
        return Ok((empty_rel(PatternDirection::Incoming), 3));
    }

    let (direction, inner, consumed) = if let Some(after) = text.strip_prefix("<-") {
        let after = after.trim_start();
        let inner_end = after
            .find(']')
            .ok_or_else(|| Error::UnsupportedQuery(format!("relationship pattern at '{text}'")))?;
        if !after.starts_with('[') {
            return Err(Error::UnsupportedQuery(format!("relationship pattern at '{text}'")));
        }
        let inner = &after[1..inner_end];
        let tail = after[inner_end + 1..].trim_start();
        if !tail.starts_with('-') {
            return Err(Error::UnsupportedQuery(format!("relationship pattern at '{text}'")));
        }
        let consumed = text.len() - tail.len() + 1;
        (PatternDirection::Incoming, inner, consumed)
    } else if let Some(after) = text.strip_prefix('-') {
        let after = after.trim_start();
        if !after.starts_with('[') {
            return Err(Error::UnsupportedQuery(format!("relationship pattern at '{text}'")));
        }
        let inner_end = after
            .find(']')
            .ok_or_else(|| Error::UnsupportedQuery(format!("relationship pattern at '{text}'")))?;
        let inner = &after[1..inner_end];
        let tail = after[inner_end + 1..].trim_start();
        if let Some(rest) = tail.strip_prefix("->") {
            let consumed = text.len() - rest.len();
            (PatternDirection::Outgoing, inner, consumed)
        } else if let Some(rest) = tail.strip_prefix('-') {
            let consumed = text.len() - rest.len();
            (PatternDirection::Undirected, inner, consumed)
        } else {
            return Err(Error::UnsupportedQuery(format!("relationship pattern at '{text}'")));
        }
    } else {
        return Err(Error::UnsupportedQuery(format!("relationship pattern at '{text}'")));
    };

    let caps = rel_inner_regex()
        .captures(inner)
        .ok_or_else(|| Error::UnsupportedQuery(format!("relationship pattern '[{inner}]'")))?;

    let variable = caps.name("var").map(|m| m.as_str().to_owned());
    let rel_types: Vec<String> = caps
        .name("types")
        .map(|m| {
            m.as_str()
                .split('|')
                .map(|t| t.trim().trim_start_matches(':').trim().to_owned())
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default();
    let var_length = caps.name("span").map(|m| parse_span(m.as_str())).transpose()?;
    let properties = match caps.name("props") {
        Some(m) => parse_prop_map(m.as_str())?,
        None => Vec::new(),
    };

    Ok((RelPattern { variable, rel_types, direction, properties, var_length }, consumed))
}

fn empty_rel(direction: PatternDirection) -> RelPattern {
    RelPattern {
        variable: None,
        rel_types: Vec::new(),
        direction,
        properties: Vec::new(),
        var_length: None,
    }
}

fn parse_span(text: &str) -> Result<VarLength> {
    let body: String = text
        .trim()
        .trim_start_matches('*')
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if body.is_empty() {
        return Ok(VarLength { min: None, max: None });
    }
    if let Some((min, max)) = body.split_once("..") {
        let parse = |s: &str| -> Result<Option<u32>> {
            if s.is_empty() {
                Ok(None)
            } else {
                s.parse::<u32>()
                    .map(Some)
                    .map_err(|_| Error::UnsupportedQuery(format!("path span '*{body}'")))
            }
        };
        return Ok(VarLength { min: parse(min)?, max: parse(max)? });
    }
    let exact = body
        .parse::<u32>()
        .map_err(|_| Error::UnsupportedQuery(format!("path span '*{body}'")))?;
    Ok(VarLength { min: Some(exact), max: Some(exact) })
}

fn parse_prop_map(text: &str) -> Result<Vec<(String, Expr)>> {
    let body = text.trim().trim_start_matches('{').trim_end_matches('}');
    let mut entries = Vec::new();
    for raw in split_top_level(body, ',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let (key, value) = raw
            .split_once(':')
            .ok_or_else(|| Error::UnsupportedQuery(format!("property entry '{raw}'")))?;
        let key = key.trim().trim_matches('\'').trim_matches('"').to_owned();
        entries.push((key, parse_value_expr(value)?));
    }
    Ok(entries)
}

// ============================================================================
// Expression extraction
// ============================================================================

/// Parse a WHERE section: comparisons joined by top-level ANDs.
fn parse_where(text: &str) -> Result<Expr> {
    let mut conditions = Vec::new();
    for raw in split_keyword(text, "AND") {
        conditions.push(parse_condition(raw.trim())?);
    }
    let mut iter = conditions.into_iter();
    let first = iter
        .next()
        .ok_or_else(|| Error::UnsupportedQuery("empty WHERE clause".into()))?;
    Ok(iter.fold(first, |acc, cond| Expr::BinaryOp {
        left: Box::new(acc),
        op: crate::cypher::ast::BinaryOp::And,
        right: Box::new(cond),
    }))
}

fn parse_condition(text: &str) -> Result<Expr> {
    // IS [NOT] NULL
    if let Some(lhs) = strip_trailing_keyword(text, "IS NOT NULL") {
        return Ok(Expr::IsNull { expr: Box::new(parse_value_expr(lhs)?), negated: true });
    }
    if let Some(lhs) = strip_trailing_keyword(text, "IS NULL") {
        return Ok(Expr::IsNull { expr: Box::new(parse_value_expr(lhs)?), negated: false });
    }

    // String operators
    for (keyword, op) in [
        ("STARTS WITH", StringOp::StartsWith),
        ("ENDS WITH", StringOp::EndsWith),
        ("CONTAINS", StringOp::Contains),
    ] {
        if let Some(pos) = find_keyword(text, keyword.split(' ').next().expect("non-empty")) {
            let rest = &text[pos..];
            if rest.to_ascii_uppercase().starts_with(keyword) {
                let left = parse_value_expr(&text[..pos])?;
                let right = parse_value_expr(&rest[keyword.len()..])?;
                return Ok(Expr::StringOp {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                });
            }
        }
    }

    // IN
    if let Some(pos) = find_keyword(text, "IN") {
        let left = parse_value_expr(&text[..pos])?;
        let right = parse_value_expr(&text[pos + 2..])?;
        return Ok(Expr::In { expr: Box::new(left), list: Box::new(right) });
    }

    // Comparison operators, longest first
    for (token, op) in [
        ("<>", crate::cypher::ast::BinaryOp::Neq),
        ("<=", crate::cypher::ast::BinaryOp::Lte),
        (">=", crate::cypher::ast::BinaryOp::Gte),
        ("=~", crate::cypher::ast::BinaryOp::RegexMatch),
        ("=", crate::cypher::ast::BinaryOp::Eq),
        ("<", crate::cypher::ast::BinaryOp::Lt),
        (">", crate::cypher::ast::BinaryOp::Gt),
    ] {
        if let Some(pos) = find_operator(text, token) {
            let left = parse_value_expr(&text[..pos])?;
            let right = parse_value_expr(&text[pos + token.len()..])?;
            return Ok(Expr::BinaryOp { left: Box::new(left), op, right: Box::new(right) });
        }
    }

    Err(Error::UnsupportedQuery(format!("WHERE condition '{text}'")))
}

fn parse_projection_item(text: &str) -> Result<ProjectionItem> {
    let (expr_text, alias) = match find_keyword(text, "AS") {
        Some(pos) => {
            let alias = text[pos + 2..].trim();
            if !is_identifier(alias) {
                return Err(Error::UnsupportedQuery(format!("alias '{alias}'")));
            }
            (text[..pos].trim(), Some(alias.to_owned()))
        }
        None => (text.trim(), None),
    };

    static AGG: OnceLock<Regex> = OnceLock::new();
    let agg = AGG.get_or_init(|| {
        Regex::new(
            r"(?i)^(?P<fn>count|sum|avg|min|max|collect)\s*\(\s*(?:(?P<distinct>DISTINCT)\s+)?(?P<arg>.+?)\s*\)$",
        )
        .expect("static regex")
    });

    let expr = if let Some(caps) = agg.captures(expr_text) {
        let name = caps["fn"].to_lowercase();
        let distinct = caps.name("distinct").is_some();
        let args = match &caps["arg"] {
            "*" => Vec::new(),
            arg => vec![parse_value_expr(arg)?],
        };
        Expr::FunctionCall { name, args, distinct }
    } else if expr_text == "*" {
        Expr::Star
    } else {
        parse_value_expr(expr_text)?
    };

    Ok(ProjectionItem { expr, alias })
}

fn parse_order_items(text: &str) -> Result<Vec<OrderItem>> {
    let mut items = Vec::new();
    for raw in split_top_level(text, ',') {
        let raw = raw.trim();
        let (expr_text, ascending) = if let Some(body) = strip_trailing_keyword(raw, "DESC") {
            (body, false)
        } else if let Some(body) = strip_trailing_keyword(raw, "ASC") {
            (body, true)
        } else {
            (raw, true)
        };
        items.push(OrderItem { expr: parse_value_expr(expr_text)?, ascending });
    }
    Ok(items)
}

/// A value-position expression: parameter, literal, list, `var.prop`, `var`.
fn parse_value_expr(text: &str) -> Result<Expr> {
    let text = text.trim();

    if let Some(name) = text.strip_prefix('$') {
        if is_identifier(name) {
            return Ok(Expr::Parameter(name.to_owned()));
        }
        return Err(Error::UnsupportedQuery(format!("parameter '{text}'")));
    }

    if (text.starts_with('\'') && text.ends_with('\'') && text.len() >= 2)
        || (text.starts_with('"') && text.ends_with('"') && text.len() >= 2)
    {
        return Ok(Expr::Literal(Literal::String(unescape(&text[1..text.len() - 1]))));
    }

    match text.to_ascii_lowercase().as_str() {
        "true" => return Ok(Expr::Literal(Literal::Bool(true))),
        "false" => return Ok(Expr::Literal(Literal::Bool(false))),
        "null" => return Ok(Expr::Literal(Literal::Null)),
        _ => {}
    }

    if let Ok(i) = text.parse::<i64>() {
        return Ok(Expr::Literal(Literal::Int(i)));
    }
    if text.contains('.') && text.parse::<f64>().is_ok() {
        // `a.b` also contains a dot; only a successful float parse of the
        // whole token lands here before the property-access check below.
        if text.chars().all(|c| c.is_ascii_digit() || c == '.' || c == '-' || c == '+') {
            return Ok(Expr::Literal(Literal::Float(text.parse().expect("checked"))));
        }
    }

    if text.starts_with('[') && text.ends_with(']') {
        let mut items = Vec::new();
        for raw in split_top_level(&text[1..text.len() - 1], ',') {
            let raw = raw.trim();
            if !raw.is_empty() {
                items.push(parse_value_expr(raw)?);
            }
        }
        return Ok(Expr::List(items));
    }

    if let Some((var, key)) = text.split_once('.') {
        if is_identifier(var.trim()) && is_identifier(key.trim()) {
            return Ok(Expr::Property {
                expr: Box::new(Expr::Variable(var.trim().to_owned())),
                key: key.trim().to_owned(),
            });
        }
    }

    if is_identifier(text) {
        return Ok(Expr::Variable(text.to_owned()));
    }

    Err(Error::UnsupportedQuery(format!("expression '{text}'")))
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

// ============================================================================
// Lexical scanning helpers
// ============================================================================

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Split on a separator character, honoring quotes and bracket nesting.
fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => quote = Some(c),
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth -= 1,
                c if c == sep && depth == 0 => {
                    parts.push(&text[start..i]);
                    start = i + sep.len_utf8();
                }
                _ => {}
            },
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Byte position of a whole-word keyword outside quotes and brackets.
fn find_keyword(text: &str, keyword: &str) -> Option<usize> {
    let upper = text.to_ascii_uppercase();
    let bytes = upper.as_bytes();
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                i += 1;
            }
            None => match c {
                b'\'' | b'"' => {
                    quote = Some(c);
                    i += 1;
                }
                b'(' | b'[' | b'{' => {
                    depth += 1;
                    i += 1;
                }
                b')' | b']' | b'}' => {
                    depth -= 1;
                    i += 1;
                }
                _ => {
                    if depth == 0
                        && upper[i..].starts_with(keyword)
                        && boundary_before(bytes, i)
                        && boundary_after(bytes, i + keyword.len())
                    {
                        return Some(i);
                    }
                    i += 1;
                }
            },
        }
    }
    None
}

fn boundary_before(bytes: &[u8], pos: usize) -> bool {
    pos == 0 || !is_word_byte(bytes[pos - 1])
}

fn boundary_after(bytes: &[u8], pos: usize) -> bool {
    pos >= bytes.len() || !is_word_byte(bytes[pos])
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Byte position of an operator token outside quotes and brackets.
fn find_operator(text: &str, token: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                b'\'' | b'"' => quote = Some(c),
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' => depth -= 1,
                _ => {
                    if depth == 0 && text[i..].starts_with(token) {
                        return Some(i);
                    }
                }
            },
        }
        i += 1;
    }
    None
}

/// Split on a whole-word keyword (e.g. AND) outside quotes and brackets.
fn split_keyword<'a>(text: &'a str, keyword: &str) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut rest = text;
    while let Some(pos) = find_keyword(rest, keyword) {
        parts.push(&rest[..pos]);
        rest = &rest[pos + keyword.len()..];
    }
    parts.push(rest);
    parts
}

fn strip_leading_keyword<'a>(text: &'a str, keyword: &str) -> (bool, &'a str) {
    let trimmed = text.trim_start();
    if trimmed.len() >= keyword.len()
        && trimmed[..keyword.len()].eq_ignore_ascii_case(keyword)
        && trimmed[keyword.len()..].starts_with(char::is_whitespace)
    {
        (true, trimmed[keyword.len()..].trim_start())
    } else {
        (false, text)
    }
}

fn strip_trailing_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let trimmed = text.trim_end();
    if trimmed.len() > keyword.len() && trimmed[trimmed.len() - keyword.len()..].eq_ignore_ascii_case(keyword)
    {
        let cut = &trimmed[..trimmed.len() - keyword.len()];
        if cut.ends_with(char::is_whitespace) {
            return Some(cut.trim_end());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_keyword_respects_word_boundaries() {
        assert!(find_keyword("MATCH (resetter) RETURN resetter", "SET").is_none());
        assert_eq!(find_keyword("MATCH (n) SET n.x = 1", "SET"), Some(10));
        assert!(find_keyword("MATCH (n {s: 'SET'}) RETURN n", "SET").is_none());
    }

    #[test]
    fn test_split_top_level_honors_nesting() {
        let parts = split_top_level("(a {x: 1, y: 2}), (b)", ',');
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].trim(), "(a {x: 1, y: 2})");
        assert_eq!(parts[1].trim(), "(b)");
    }

    #[test]
    fn test_parse_pattern_chain() {
        let part = parse_pattern_chain("(a:P {name: 'A'})-[:KNOWS]->(b:P)").unwrap();
        assert_eq!(part.start.variable.as_deref(), Some("a"));
        assert_eq!(part.chain.len(), 1);
        assert_eq!(part.chain[0].0.rel_types, vec!["KNOWS"]);
        assert_eq!(part.chain[0].0.direction, PatternDirection::Outgoing);
        assert_eq!(part.chain[0].1.labels, vec!["P"]);
    }

    #[test]
    fn test_parse_var_length_span() {
        let part = parse_pattern_chain("(a:VLP {id: 1})-[:NEXT*1..3]->(b:VLP)").unwrap();
        let span = part.chain[0].0.var_length.unwrap();
        assert_eq!(span.min, Some(1));
        assert_eq!(span.max, Some(3));
    }

    #[test]
    fn test_parse_incoming_and_undirected() {
        let incoming = parse_pattern_chain("(a)<-[:KNOWS]-(b)").unwrap();
        assert_eq!(incoming.chain[0].0.direction, PatternDirection::Incoming);

        let undirected = parse_pattern_chain("(a)-[:KNOWS]-(b)").unwrap();
        assert_eq!(undirected.chain[0].0.direction, PatternDirection::Undirected);
    }

    #[test]
    fn test_parse_condition_shapes() {
        assert!(matches!(
            parse_condition("n.age > 30").unwrap(),
            Expr::BinaryOp { op: crate::cypher::ast::BinaryOp::Gt, .. }
        ));
        assert!(matches!(
            parse_condition("n.name CONTAINS 'li'").unwrap(),
            Expr::StringOp { op: StringOp::Contains, .. }
        ));
        assert!(matches!(
            parse_condition("n.email IS NOT NULL").unwrap(),
            Expr::IsNull { negated: true, .. }
        ));
        assert!(matches!(
            parse_condition("n.id IN [1, 2]").unwrap(),
            Expr::In { .. }
        ));
    }

    #[test]
    fn test_parse_projection_aggregate() {
        let item = parse_projection_item("sum(n.amount) AS t").unwrap();
        assert_eq!(item.alias.as_deref(), Some("t"));
        assert!(matches!(item.expr, Expr::FunctionCall { ref name, .. } if name == "sum"));

        let star = parse_projection_item("count(*)").unwrap();
        assert!(matches!(star.expr, Expr::FunctionCall { ref args, .. } if args.is_empty()));
    }

    #[test]
    fn test_unsupported_shapes_are_loud() {
        assert!(matches!(
            parse_condition("n.a + 1 > 2"),
            Err(Error::UnsupportedQuery(_))
        ));
        assert!(matches!(
            parse_value_expr("n.a + 1"),
            Err(Error::UnsupportedQuery(_))
        ));
    }
}
