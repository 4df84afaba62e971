//! Cypher recursive descent parser.
//!
//! Parses token streams into CST nodes. Supports:
//! - MATCH / OPTIONAL MATCH with patterns, variable-length spans, shortestPath
//! - WHERE, RETURN, WITH pipelines, ORDER BY, SKIP, LIMIT, UNWIND
//! - CREATE, MERGE (ON CREATE / ON MATCH), DELETE / DETACH DELETE, SET, REMOVE
//! - CALL ... YIELD, SHOW commands, schema commands, BEGIN/COMMIT/ROLLBACK
//! - Full expression parsing with precedence, list comprehensions,
//!   EXISTS { } and COUNT { } subqueries

use super::ast::*;
use super::lexer::{Token, TokenKind};
use crate::{Error, Result};

/// Parser state — wraps a token slice with cursor.
struct Parser<'t> {
    source: &'t str,
    tokens: &'t [Token],
    pos: usize,
}

impl<'t> Parser<'t> {
    fn new(source: &'t str, tokens: &'t [Token]) -> Self {
        Self { source, tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn peek_ahead(&self, n: usize) -> TokenKind {
        self.tokens[(self.pos + n).min(self.tokens.len() - 1)].kind
    }

    fn advance(&mut self) -> &Token {
        let tok = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, kind: TokenKind) -> Result<&Token> {
        let tok = self.peek();
        if tok.kind == kind {
            Ok(self.advance())
        } else {
            Err(self.error(format!("Expected {:?}, got {:?} '{}'", kind, tok.kind, tok.text)))
        }
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&self, message: String) -> Error {
        let offset = self.peek().span.start;
        let (line, column) = line_col(self.source, offset);
        Error::ParseError { line, column, message }
    }

    /// Identifier text, also accepting soft keywords that read as names.
    fn ident_text(&mut self) -> Result<String> {
        let tok = self.peek();
        match tok.kind {
            TokenKind::Identifier => Ok(self.advance().text.clone()),
            // Keywords that double as legal names in identifier position.
            TokenKind::Index | TokenKind::Constraint | TokenKind::End | TokenKind::Contains
            | TokenKind::On | TokenKind::By => Ok(self.advance().text.clone()),
            _ => Err(self.error(format!(
                "Expected identifier, got {:?} '{}'",
                tok.kind, tok.text
            ))),
        }
    }
}

/// Map a byte offset to a 1-based (line, column) pair.
pub(crate) fn line_col(source: &str, offset: usize) -> (u32, u32) {
    let clamped = offset.min(source.len());
    let before = &source[..clamped];
    let line = before.matches('\n').count() as u32 + 1;
    let column = before
        .rfind('\n')
        .map(|nl| clamped - nl)
        .unwrap_or(clamped + 1) as u32;
    (line, column)
}

/// Parse a complete Cypher script from tokens.
pub fn parse_script(source: &str, tokens: &[Token]) -> Result<Script> {
    let mut p = Parser::new(source, tokens);
    let mut queries = Vec::new();

    while p.eat(TokenKind::Semicolon) {}
    if p.at(TokenKind::Eof) {
        return Err(p.error("Expected a query".into()));
    }

    while !p.at(TokenKind::Eof) {
        queries.push(parse_query(&mut p)?);
        let had_separator = p.eat(TokenKind::Semicolon);
        while p.eat(TokenKind::Semicolon) {}
        if !p.at(TokenKind::Eof) && !had_separator {
            return Err(p.error(format!(
                "Unexpected token after query: {:?} '{}'",
                p.peek_kind(),
                p.peek().text
            )));
        }
    }

    Ok(Script { queries })
}

// ============================================================================
// Query dispatch
// ============================================================================

fn parse_query(p: &mut Parser) -> Result<Query> {
    match p.peek_kind() {
        TokenKind::Show => parse_show(p).map(Query::Show),
        TokenKind::Begin => { p.advance(); Ok(Query::Transaction(TxCommand::Begin)) }
        TokenKind::Commit => { p.advance(); Ok(Query::Transaction(TxCommand::Commit)) }
        TokenKind::Rollback => { p.advance(); Ok(Query::Transaction(TxCommand::Rollback)) }
        TokenKind::Drop => parse_schema(p).map(Query::Schema),
        TokenKind::Create
            if matches!(p.peek_ahead(1), TokenKind::Index | TokenKind::Constraint) =>
        {
            parse_schema(p).map(Query::Schema)
        }
        _ => {
            let regular = parse_regular_query(p)?;
            // A lone CALL with no RETURN is a standalone procedure call.
            if regular.parts.is_empty() && regular.tail.return_clause.is_none() {
                if let [Clause::Reading(ReadingClause::Call(_))] = regular.tail.clauses.as_slice() {
                    let Some(Clause::Reading(ReadingClause::Call(call))) =
                        regular.tail.clauses.into_iter().next()
                    else {
                        unreachable!()
                    };
                    return Ok(Query::StandaloneCall(call));
                }
            }
            Ok(Query::Regular(regular))
        }
    }
}

fn parse_regular_query(p: &mut Parser) -> Result<RegularQuery> {
    let mut parts: Vec<QueryPart> = Vec::new();
    let mut clauses: Vec<Clause> = Vec::new();
    let mut seen_updating = false;

    loop {
        match p.peek_kind() {
            TokenKind::Match | TokenKind::Optional => {
                if seen_updating {
                    return Err(p.error(
                        "MATCH cannot follow an updating clause; chain with WITH".into(),
                    ));
                }
                clauses.push(Clause::Reading(ReadingClause::Match(parse_match(p)?)));
            }
            TokenKind::Unwind => {
                if seen_updating {
                    return Err(p.error(
                        "UNWIND cannot follow an updating clause; chain with WITH".into(),
                    ));
                }
                clauses.push(Clause::Reading(ReadingClause::Unwind(parse_unwind(p)?)));
            }
            TokenKind::Call => {
                if seen_updating {
                    return Err(p.error(
                        "CALL cannot follow an updating clause; chain with WITH".into(),
                    ));
                }
                clauses.push(Clause::Reading(ReadingClause::Call(parse_call(p)?)));
            }
            TokenKind::Create => {
                p.advance();
                let patterns = parse_pattern_list(p)?;
                clauses.push(Clause::Updating(UpdatingClause::Create(CreateClause { patterns })));
                seen_updating = true;
            }
            TokenKind::Merge => {
                clauses.push(Clause::Updating(UpdatingClause::Merge(parse_merge(p)?)));
                seen_updating = true;
            }
            TokenKind::Delete | TokenKind::Detach => {
                clauses.push(Clause::Updating(UpdatingClause::Delete(parse_delete(p)?)));
                seen_updating = true;
            }
            TokenKind::Set => {
                p.advance();
                let items = parse_set_items(p)?;
                clauses.push(Clause::Updating(UpdatingClause::Set(SetClause { items })));
                seen_updating = true;
            }
            TokenKind::Remove => {
                p.advance();
                let items = parse_remove_items(p)?;
                clauses.push(Clause::Updating(UpdatingClause::Remove(RemoveClause { items })));
                seen_updating = true;
            }
            TokenKind::With => {
                let with = parse_with_clause(p)?;
                parts.push(QueryPart { clauses: std::mem::take(&mut clauses), with });
                seen_updating = false;
            }
            TokenKind::Return => {
                let return_clause = parse_return_clause(p)?;
                return Ok(RegularQuery {
                    parts,
                    tail: SinglePart { clauses, return_clause: Some(return_clause) },
                });
            }
            TokenKind::Eof | TokenKind::Semicolon => {
                if clauses.is_empty() && parts.is_empty() {
                    return Err(p.error("Expected a query".into()));
                }
                if clauses.is_empty() {
                    return Err(p.error("Query cannot end with WITH".into()));
                }
                return Ok(RegularQuery {
                    parts,
                    tail: SinglePart { clauses, return_clause: None },
                });
            }
            kind => {
                return Err(p.error(format!(
                    "Unexpected token {:?} '{}' at start of clause",
                    kind,
                    p.peek().text
                )));
            }
        }
    }
}

// ============================================================================
// Reading clauses
// ============================================================================

fn parse_match(p: &mut Parser) -> Result<MatchClause> {
    let optional = if p.at(TokenKind::Optional) {
        p.advance();
        p.expect(TokenKind::Match)?;
        true
    } else {
        p.expect(TokenKind::Match)?;
        false
    };

    let patterns = parse_pattern_list(p)?;

    let where_clause = if p.eat(TokenKind::Where) {
        Some(parse_expr(p)?)
    } else {
        None
    };

    Ok(MatchClause { optional, patterns, where_clause })
}

fn parse_unwind(p: &mut Parser) -> Result<UnwindClause> {
    p.expect(TokenKind::Unwind)?;
    let expr = parse_expr(p)?;
    p.expect(TokenKind::As)?;
    let alias = p.ident_text()?;
    Ok(UnwindClause { expr, alias })
}

fn parse_call(p: &mut Parser) -> Result<CallClause> {
    p.expect(TokenKind::Call)?;

    // Procedure name: name or name.name.name
    let mut name = p.ident_text()?;
    while p.eat(TokenKind::Dot) {
        let part = p.ident_text()?;
        name = format!("{name}.{part}");
    }

    // Arguments (parens optional for zero-arg calls)
    let mut args = Vec::new();
    if p.eat(TokenKind::LParen) {
        if !p.at(TokenKind::RParen) {
            args.push(parse_expr(p)?);
            while p.eat(TokenKind::Comma) {
                args.push(parse_expr(p)?);
            }
        }
        p.expect(TokenKind::RParen)?;
    }

    // YIELD
    let mut yields = Vec::new();
    if p.eat(TokenKind::Yield) {
        yields.push(p.ident_text()?);
        while p.eat(TokenKind::Comma) {
            yields.push(p.ident_text()?);
        }
    }

    Ok(CallClause { name, args, yields })
}

// ============================================================================
// Updating clauses
// ============================================================================

fn parse_merge(p: &mut Parser) -> Result<MergeClause> {
    p.expect(TokenKind::Merge)?;
    let pattern = parse_pattern_part(p)?;

    let mut on_create = Vec::new();
    let mut on_match = Vec::new();

    while p.at(TokenKind::On) {
        p.advance();
        if p.eat(TokenKind::Create) {
            p.expect(TokenKind::Set)?;
            on_create.extend(parse_set_items(p)?);
        } else if p.eat(TokenKind::Match) {
            p.expect(TokenKind::Set)?;
            on_match.extend(parse_set_items(p)?);
        } else {
            return Err(p.error(format!(
                "Expected CREATE or MATCH after ON, got '{}'",
                p.peek().text
            )));
        }
    }

    Ok(MergeClause { pattern, on_create, on_match })
}

fn parse_delete(p: &mut Parser) -> Result<DeleteClause> {
    let detach = p.eat(TokenKind::Detach);
    p.expect(TokenKind::Delete)?;

    let mut variables = Vec::new();
    variables.push(p.ident_text()?);
    while p.eat(TokenKind::Comma) {
        variables.push(p.ident_text()?);
    }

    Ok(DeleteClause { detach, variables })
}

fn parse_set_items(p: &mut Parser) -> Result<Vec<SetItem>> {
    let mut items = Vec::new();
    items.push(parse_set_item(p)?);
    while p.eat(TokenKind::Comma) {
        items.push(parse_set_item(p)?);
    }
    Ok(items)
}

fn parse_set_item(p: &mut Parser) -> Result<SetItem> {
    let variable = p.ident_text()?;

    if p.eat(TokenKind::Dot) {
        // SET n.prop = expr
        let key = p.ident_text()?;
        p.expect(TokenKind::Eq)?;
        let value = parse_expr(p)?;
        Ok(SetItem::Property { variable, key, value })
    } else if p.eat(TokenKind::PlusEq) {
        // SET n += {map}
        let value = parse_expr(p)?;
        Ok(SetItem::MergeProperties { variable, value })
    } else if p.eat(TokenKind::Eq) {
        // SET n = {map}
        let value = parse_expr(p)?;
        Ok(SetItem::AllProperties { variable, value })
    } else if p.eat(TokenKind::Colon) {
        // SET n:Label
        let label = p.ident_text()?;
        Ok(SetItem::Label { variable, label })
    } else {
        Err(p.error("Expected '.', '=', '+=', or ':' after SET variable".into()))
    }
}

fn parse_remove_items(p: &mut Parser) -> Result<Vec<RemoveItem>> {
    let mut items = Vec::new();
    items.push(parse_remove_item(p)?);
    while p.eat(TokenKind::Comma) {
        items.push(parse_remove_item(p)?);
    }
    Ok(items)
}

fn parse_remove_item(p: &mut Parser) -> Result<RemoveItem> {
    let variable = p.ident_text()?;

    if p.eat(TokenKind::Dot) {
        let key = p.ident_text()?;
        Ok(RemoveItem::Property { variable, key })
    } else if p.eat(TokenKind::Colon) {
        let label = p.ident_text()?;
        Ok(RemoveItem::Label { variable, label })
    } else {
        Err(p.error("Expected '.' or ':' after REMOVE variable".into()))
    }
}

// ============================================================================
// SHOW and schema commands
// ============================================================================

fn parse_show(p: &mut Parser) -> Result<ShowCommand> {
    p.expect(TokenKind::Show)?;
    let what = p.ident_text()?;
    match what.to_uppercase().as_str() {
        "INDEXES" => Ok(ShowCommand::Indexes),
        "CONSTRAINTS" => Ok(ShowCommand::Constraints),
        "PROCEDURES" => Ok(ShowCommand::Procedures),
        "FUNCTIONS" => Ok(ShowCommand::Functions),
        other => Err(p.error(format!("Unknown SHOW target '{other}'"))),
    }
}

fn parse_schema(p: &mut Parser) -> Result<SchemaCommand> {
    if p.eat(TokenKind::Create) {
        if p.eat(TokenKind::Index) {
            parse_create_index(p)
        } else if p.eat(TokenKind::Constraint) {
            parse_create_constraint(p)
        } else {
            Err(p.error("Expected INDEX or CONSTRAINT after CREATE".into()))
        }
    } else if p.eat(TokenKind::Drop) {
        if p.eat(TokenKind::Index) {
            let name = p.ident_text()?;
            Ok(SchemaCommand::DropIndex { name })
        } else if p.eat(TokenKind::Constraint) {
            let name = p.ident_text()?;
            Ok(SchemaCommand::DropConstraint { name })
        } else {
            Err(p.error("Expected INDEX or CONSTRAINT after DROP".into()))
        }
    } else {
        Err(p.error("Expected CREATE or DROP for schema command".into()))
    }
}

fn parse_create_index(p: &mut Parser) -> Result<SchemaCommand> {
    // CREATE INDEX [name] FOR (n:Label) ON (n.prop [, n.prop])
    // or legacy: CREATE INDEX ON :Label(prop)
    let name = if p.at(TokenKind::Identifier) {
        Some(p.advance().text.clone())
    } else {
        None
    };

    if p.eat(TokenKind::On) {
        // Legacy form
        p.expect(TokenKind::Colon)?;
        let label = p.ident_text()?;
        p.expect(TokenKind::LParen)?;
        let prop = p.ident_text()?;
        p.expect(TokenKind::RParen)?;
        return Ok(SchemaCommand::CreateIndex { name, label, properties: vec![prop] });
    }

    p.expect(TokenKind::For)?;
    p.expect(TokenKind::LParen)?;
    let _alias = p.ident_text()?;
    p.expect(TokenKind::Colon)?;
    let label = p.ident_text()?;
    p.expect(TokenKind::RParen)?;

    p.expect(TokenKind::On)?;
    p.expect(TokenKind::LParen)?;
    let mut properties = Vec::new();
    loop {
        let _alias = p.ident_text()?;
        p.expect(TokenKind::Dot)?;
        properties.push(p.ident_text()?);
        if !p.eat(TokenKind::Comma) {
            break;
        }
    }
    p.expect(TokenKind::RParen)?;

    Ok(SchemaCommand::CreateIndex { name, label, properties })
}

fn parse_create_constraint(p: &mut Parser) -> Result<SchemaCommand> {
    // CREATE CONSTRAINT [name] FOR (n:Label) REQUIRE n.prop IS UNIQUE | IS NOT NULL
    let name = if p.at(TokenKind::Identifier) {
        Some(p.advance().text.clone())
    } else {
        None
    };

    if !(p.eat(TokenKind::For) || p.eat(TokenKind::On)) {
        return Err(p.error("Expected FOR or ON after CONSTRAINT".into()));
    }

    p.expect(TokenKind::LParen)?;
    let _alias = p.ident_text()?;
    p.expect(TokenKind::Colon)?;
    let label = p.ident_text()?;
    p.expect(TokenKind::RParen)?;

    // REQUIRE / ASSERT read as plain identifiers
    let req = p.ident_text()?;
    if !req.eq_ignore_ascii_case("REQUIRE") && !req.eq_ignore_ascii_case("ASSERT") {
        return Err(p.error(format!("Expected REQUIRE or ASSERT, got '{req}'")));
    }
    let _alias = p.ident_text()?;
    p.expect(TokenKind::Dot)?;
    let property = p.ident_text()?;

    p.expect(TokenKind::Is)?;
    let constraint_type = if p.eat(TokenKind::Not) {
        p.expect(TokenKind::Null)?;
        "NOT NULL".to_string()
    } else {
        p.ident_text()?.to_uppercase()
    };

    Ok(SchemaCommand::CreateConstraint { name, label, property, constraint_type })
}

// ============================================================================
// Pattern parsing
// ============================================================================

fn parse_pattern_list(p: &mut Parser) -> Result<Vec<PatternPart>> {
    let mut patterns = Vec::new();
    patterns.push(parse_pattern_part(p)?);
    while p.eat(TokenKind::Comma) {
        patterns.push(parse_pattern_part(p)?);
    }
    Ok(patterns)
}

fn parse_pattern_part(p: &mut Parser) -> Result<PatternPart> {
    // Optional path variable: p = ...
    let variable = if p.at(TokenKind::Identifier) && p.peek_ahead(1) == TokenKind::Eq {
        let name = p.advance().text.clone();
        p.advance(); // =
        Some(name)
    } else {
        None
    };

    // Optional shortestPath(...) / allShortestPaths(...) wrapper
    let shortest = if p.at(TokenKind::Identifier) {
        match p.peek().text.to_lowercase().as_str() {
            "shortestpath" => { p.advance(); Some(ShortestKind::Single) }
            "allshortestpaths" => { p.advance(); Some(ShortestKind::All) }
            _ => None,
        }
    } else {
        None
    };
    if shortest.is_some() {
        p.expect(TokenKind::LParen)?;
    }

    let start = parse_node_pattern(p)?;
    let mut chain = Vec::new();
    while p.at(TokenKind::Dash) || p.at(TokenKind::LeftArrow) {
        let rel = parse_rel_pattern(p)?;
        let node = parse_node_pattern(p)?;
        chain.push((rel, node));
    }

    if shortest.is_some() {
        p.expect(TokenKind::RParen)?;
        if chain.is_empty() {
            return Err(p.error("shortestPath requires a relationship pattern".into()));
        }
    }

    Ok(PatternPart { variable, shortest, start, chain })
}

fn parse_node_pattern(p: &mut Parser) -> Result<NodePattern> {
    p.expect(TokenKind::LParen)?;

    let mut variable = None;
    let mut labels = Vec::new();
    let mut properties = Vec::new();

    if p.at(TokenKind::Identifier) {
        variable = Some(p.advance().text.clone());
    }

    while p.eat(TokenKind::Colon) {
        labels.push(p.ident_text()?);
    }

    if p.at(TokenKind::LBrace) {
        properties = parse_map_entries(p)?;
    }

    p.expect(TokenKind::RParen)?;

    Ok(NodePattern { variable, labels, properties })
}

fn parse_rel_pattern(p: &mut Parser) -> Result<RelPattern> {
    // <-[...]-  or  -[...]->  or  -[...]-
    let left_arrow = p.eat(TokenKind::LeftArrow);
    if !left_arrow {
        p.expect(TokenKind::Dash)?;
    }

    let mut variable = None;
    let mut rel_types = Vec::new();
    let mut properties = Vec::new();
    let mut var_length = None;

    if p.eat(TokenKind::LBracket) {
        if p.at(TokenKind::Identifier) {
            variable = Some(p.advance().text.clone());
        }

        // Types before the span: :TYPE1|TYPE2
        if p.eat(TokenKind::Colon) {
            rel_types.push(p.ident_text()?);
            while p.eat(TokenKind::Pipe) {
                p.eat(TokenKind::Colon);
                rel_types.push(p.ident_text()?);
            }
        }

        // Variable length: *, *n, *n..m, *..m, *n..
        if p.eat(TokenKind::Star) {
            let min = if p.at(TokenKind::Integer) {
                Some(parse_u32(p)?)
            } else {
                None
            };
            if p.eat(TokenKind::DotDot) {
                let max = if p.at(TokenKind::Integer) {
                    Some(parse_u32(p)?)
                } else {
                    None
                };
                var_length = Some(VarLength { min, max });
            } else if let Some(n) = min {
                var_length = Some(VarLength { min: Some(n), max: Some(n) });
            } else {
                var_length = Some(VarLength { min: None, max: None });
            }

            // Types may also trail the span: *1..3:TYPE1|TYPE2
            if rel_types.is_empty() && p.eat(TokenKind::Colon) {
                rel_types.push(p.ident_text()?);
                while p.eat(TokenKind::Pipe) {
                    p.eat(TokenKind::Colon);
                    rel_types.push(p.ident_text()?);
                }
            }
        }

        if p.at(TokenKind::LBrace) {
            properties = parse_map_entries(p)?;
        }

        p.expect(TokenKind::RBracket)?;
    }

    let direction = if left_arrow {
        p.expect(TokenKind::Dash)?;
        PatternDirection::Incoming
    } else if p.eat(TokenKind::Arrow) {
        PatternDirection::Outgoing
    } else if p.eat(TokenKind::Dash) {
        PatternDirection::Undirected
    } else {
        return Err(p.error("Expected '->' or '-' to close relationship pattern".into()));
    };

    Ok(RelPattern { variable, rel_types, direction, properties, var_length })
}

fn parse_u32(p: &mut Parser) -> Result<u32> {
    let tok = p.expect(TokenKind::Integer)?;
    let text = tok.text.clone();
    text.parse::<u32>()
        .map_err(|_| p.error(format!("Invalid integer '{text}'")))
}

// ============================================================================
// RETURN / WITH / ORDER BY
// ============================================================================

fn parse_return_clause(p: &mut Parser) -> Result<ReturnClause> {
    p.expect(TokenKind::Return)?;
    let distinct = p.eat(TokenKind::Distinct);
    let items = parse_projection_items(p)?;
    let (order_by, skip, limit) = parse_projection_tail(p)?;
    Ok(ReturnClause { distinct, items, order_by, skip, limit })
}

fn parse_with_clause(p: &mut Parser) -> Result<WithClause> {
    p.expect(TokenKind::With)?;
    let distinct = p.eat(TokenKind::Distinct);
    let items = parse_projection_items(p)?;

    // Aliasing is required in WITH for anything that isn't a bare variable.
    for item in &items {
        if item.alias.is_none() && !matches!(item.expr, Expr::Variable(_) | Expr::Star) {
            return Err(p.error("Expression in WITH must be aliased (use AS)".into()));
        }
    }

    let (order_by, skip, limit) = parse_projection_tail(p)?;
    let where_clause = if p.eat(TokenKind::Where) {
        Some(parse_expr(p)?)
    } else {
        None
    };

    Ok(WithClause { distinct, items, order_by, skip, limit, where_clause })
}

fn parse_projection_items(p: &mut Parser) -> Result<Vec<ProjectionItem>> {
    let mut items = Vec::new();
    if p.eat(TokenKind::Star) {
        items.push(ProjectionItem { expr: Expr::Star, alias: None });
        while p.eat(TokenKind::Comma) {
            items.push(parse_projection_item(p)?);
        }
        return Ok(items);
    }
    items.push(parse_projection_item(p)?);
    while p.eat(TokenKind::Comma) {
        items.push(parse_projection_item(p)?);
    }
    Ok(items)
}

fn parse_projection_item(p: &mut Parser) -> Result<ProjectionItem> {
    let expr = parse_expr(p)?;
    let alias = if p.eat(TokenKind::As) {
        Some(p.ident_text()?)
    } else {
        None
    };
    Ok(ProjectionItem { expr, alias })
}

type ProjectionTail = (Vec<OrderItem>, Option<Expr>, Option<Expr>);

fn parse_projection_tail(p: &mut Parser) -> Result<ProjectionTail> {
    let order_by = if p.eat(TokenKind::Order) {
        p.expect(TokenKind::By)?;
        let mut items = Vec::new();
        items.push(parse_order_item(p)?);
        while p.eat(TokenKind::Comma) {
            items.push(parse_order_item(p)?);
        }
        items
    } else {
        Vec::new()
    };

    let skip = if p.eat(TokenKind::Skip) {
        Some(parse_expr(p)?)
    } else {
        None
    };

    let limit = if p.eat(TokenKind::Limit) {
        Some(parse_expr(p)?)
    } else {
        None
    };

    Ok((order_by, skip, limit))
}

fn parse_order_item(p: &mut Parser) -> Result<OrderItem> {
    let expr = parse_expr(p)?;
    let ascending = if p.eat(TokenKind::Desc) {
        false
    } else {
        p.eat(TokenKind::Asc);
        true
    };
    Ok(OrderItem { expr, ascending })
}

// ============================================================================
// Expression parsing (precedence climbing)
// ============================================================================

pub(crate) fn parse_expression(source: &str, tokens: &[Token]) -> Result<Expr> {
    let mut p = Parser::new(source, tokens);
    let expr = parse_expr(&mut p)?;
    if !p.at(TokenKind::Eof) {
        return Err(p.error(format!(
            "Unexpected token after expression: {:?}",
            p.peek_kind()
        )));
    }
    Ok(expr)
}

fn parse_expr(p: &mut Parser) -> Result<Expr> {
    parse_or_expr(p)
}

fn parse_or_expr(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_xor_expr(p)?;
    while p.eat(TokenKind::Or) {
        let right = parse_xor_expr(p)?;
        left = Expr::BinaryOp { left: Box::new(left), op: BinaryOp::Or, right: Box::new(right) };
    }
    Ok(left)
}

fn parse_xor_expr(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_and_expr(p)?;
    while p.eat(TokenKind::Xor) {
        let right = parse_and_expr(p)?;
        left = Expr::BinaryOp { left: Box::new(left), op: BinaryOp::Xor, right: Box::new(right) };
    }
    Ok(left)
}

fn parse_and_expr(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_not_expr(p)?;
    while p.eat(TokenKind::And) {
        let right = parse_not_expr(p)?;
        left = Expr::BinaryOp { left: Box::new(left), op: BinaryOp::And, right: Box::new(right) };
    }
    Ok(left)
}

fn parse_not_expr(p: &mut Parser) -> Result<Expr> {
    if p.eat(TokenKind::Not) {
        let expr = parse_not_expr(p)?;
        Ok(Expr::UnaryOp { op: UnaryOp::Not, expr: Box::new(expr) })
    } else {
        parse_comparison(p)
    }
}

fn parse_comparison(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_string_op(p)?;

    // IS NULL / IS NOT NULL
    if p.eat(TokenKind::Is) {
        let negated = p.eat(TokenKind::Not);
        p.expect(TokenKind::Null)?;
        return Ok(Expr::IsNull { expr: Box::new(left), negated });
    }

    // IN
    if p.eat(TokenKind::In) {
        let list = parse_addition(p)?;
        return Ok(Expr::In { expr: Box::new(left), list: Box::new(list) });
    }

    let op = match p.peek_kind() {
        TokenKind::Eq => Some(BinaryOp::Eq),
        TokenKind::Neq => Some(BinaryOp::Neq),
        TokenKind::Lt => Some(BinaryOp::Lt),
        TokenKind::Lte => Some(BinaryOp::Lte),
        TokenKind::Gt => Some(BinaryOp::Gt),
        TokenKind::Gte => Some(BinaryOp::Gte),
        TokenKind::RegexMatch => Some(BinaryOp::RegexMatch),
        _ => None,
    };

    if let Some(op) = op {
        p.advance();
        let right = parse_string_op(p)?;
        left = Expr::BinaryOp { left: Box::new(left), op, right: Box::new(right) };
    }

    Ok(left)
}

fn parse_string_op(p: &mut Parser) -> Result<Expr> {
    let left = parse_addition(p)?;

    if p.eat(TokenKind::Starts) {
        p.expect(TokenKind::With)?;
        let right = parse_addition(p)?;
        return Ok(Expr::StringOp {
            left: Box::new(left),
            op: StringOp::StartsWith,
            right: Box::new(right),
        });
    }
    if p.eat(TokenKind::Ends) {
        p.expect(TokenKind::With)?;
        let right = parse_addition(p)?;
        return Ok(Expr::StringOp {
            left: Box::new(left),
            op: StringOp::EndsWith,
            right: Box::new(right),
        });
    }
    if p.eat(TokenKind::Contains) {
        let right = parse_addition(p)?;
        return Ok(Expr::StringOp {
            left: Box::new(left),
            op: StringOp::Contains,
            right: Box::new(right),
        });
    }

    Ok(left)
}

fn parse_addition(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_multiplication(p)?;
    loop {
        let op = match p.peek_kind() {
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Minus | TokenKind::Dash => BinaryOp::Sub,
            _ => break,
        };
        p.advance();
        let right = parse_multiplication(p)?;
        left = Expr::BinaryOp { left: Box::new(left), op, right: Box::new(right) };
    }
    Ok(left)
}

fn parse_multiplication(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_power(p)?;
    loop {
        let op = match p.peek_kind() {
            TokenKind::Star => BinaryOp::Mul,
            TokenKind::Slash => BinaryOp::Div,
            TokenKind::Percent => BinaryOp::Mod,
            _ => break,
        };
        p.advance();
        let right = parse_power(p)?;
        left = Expr::BinaryOp { left: Box::new(left), op, right: Box::new(right) };
    }
    Ok(left)
}

fn parse_power(p: &mut Parser) -> Result<Expr> {
    let left = parse_unary(p)?;
    if p.eat(TokenKind::Caret) {
        let right = parse_power(p)?; // right-associative
        Ok(Expr::BinaryOp { left: Box::new(left), op: BinaryOp::Pow, right: Box::new(right) })
    } else {
        Ok(left)
    }
}

fn parse_unary(p: &mut Parser) -> Result<Expr> {
    if p.at(TokenKind::Minus) || p.at(TokenKind::Dash) {
        p.advance();
        let expr = parse_postfix(p)?;
        Ok(Expr::UnaryOp { op: UnaryOp::Negate, expr: Box::new(expr) })
    } else {
        parse_postfix(p)
    }
}

fn parse_postfix(p: &mut Parser) -> Result<Expr> {
    let mut expr = parse_primary(p)?;

    // Property access chain: n.name, n.address.city
    while p.at(TokenKind::Dot) {
        p.advance();
        let key = p.ident_text()?;
        expr = Expr::Property { expr: Box::new(expr), key };
    }

    // Label check: n:Person (only on bare variables)
    if p.at(TokenKind::Colon) {
        if let Expr::Variable(_) = &expr {
            p.advance();
            let label = p.ident_text()?;
            expr = Expr::HasLabel { expr: Box::new(expr), label };
        }
    }

    Ok(expr)
}

fn parse_primary(p: &mut Parser) -> Result<Expr> {
    match p.peek_kind() {
        // Literals
        TokenKind::Integer => {
            let tok = p.advance();
            let (text, start) = (tok.text.clone(), tok.span.start);
            let val = text.parse::<i64>().map_err(|_| {
                let (line, column) = line_col(p.source, start);
                Error::ParseError { line, column, message: format!("Invalid integer '{text}'") }
            })?;
            Ok(Expr::Literal(Literal::Int(val)))
        }
        TokenKind::Float => {
            let tok = p.advance();
            let (text, start) = (tok.text.clone(), tok.span.start);
            let val = text.parse::<f64>().map_err(|_| {
                let (line, column) = line_col(p.source, start);
                Error::ParseError { line, column, message: format!("Invalid float '{text}'") }
            })?;
            Ok(Expr::Literal(Literal::Float(val)))
        }
        TokenKind::StringLiteral => {
            let tok = p.advance();
            Ok(Expr::Literal(Literal::String(tok.text.clone())))
        }
        TokenKind::True => { p.advance(); Ok(Expr::Literal(Literal::Bool(true))) }
        TokenKind::False => { p.advance(); Ok(Expr::Literal(Literal::Bool(false))) }
        TokenKind::Null => { p.advance(); Ok(Expr::Literal(Literal::Null)) }

        // Parameter
        TokenKind::Parameter => {
            let tok = p.advance();
            Ok(Expr::Parameter(tok.text.clone()))
        }

        // Star (count(*), RETURN *)
        TokenKind::Star => { p.advance(); Ok(Expr::Star) }

        // Parenthesized expression
        TokenKind::LParen => {
            p.advance();
            let expr = parse_expr(p)?;
            p.expect(TokenKind::RParen)?;
            Ok(expr)
        }

        // List literal or list comprehension
        TokenKind::LBracket => parse_list_or_comprehension(p),

        // Map literal
        TokenKind::LBrace => {
            let entries = parse_map_entries(p)?;
            Ok(Expr::MapLiteral(entries))
        }

        // CASE expression
        TokenKind::Case => {
            p.advance();
            let operand = if !p.at(TokenKind::When) {
                Some(Box::new(parse_expr(p)?))
            } else {
                None
            };
            let mut whens = Vec::new();
            while p.eat(TokenKind::When) {
                let when_expr = parse_expr(p)?;
                p.expect(TokenKind::Then)?;
                let then_expr = parse_expr(p)?;
                whens.push((when_expr, then_expr));
            }
            if whens.is_empty() {
                return Err(p.error("CASE requires at least one WHEN branch".into()));
            }
            let else_expr = if p.eat(TokenKind::Else) {
                Some(Box::new(parse_expr(p)?))
            } else {
                None
            };
            p.expect(TokenKind::End)?;
            Ok(Expr::Case { operand, whens, else_expr })
        }

        // EXISTS { pattern } or exists(expr)
        TokenKind::Exists => {
            p.advance();
            if p.at(TokenKind::LBrace) {
                let sub = parse_subquery_pattern(p)?;
                Ok(Expr::ExistsSubquery(Box::new(sub)))
            } else {
                p.expect(TokenKind::LParen)?;
                let arg = parse_expr(p)?;
                p.expect(TokenKind::RParen)?;
                Ok(Expr::FunctionCall {
                    name: "exists".into(),
                    args: vec![arg],
                    distinct: false,
                })
            }
        }

        // Identifier — variable, function call, or COUNT { } subquery
        TokenKind::Identifier => {
            let tok = p.advance().clone();
            if tok.text.eq_ignore_ascii_case("count") && p.at(TokenKind::LBrace) {
                let sub = parse_subquery_pattern(p)?;
                return Ok(Expr::CountSubquery(Box::new(sub)));
            }
            if p.eat(TokenKind::LParen) {
                let mut args = Vec::new();
                let distinct = p.eat(TokenKind::Distinct);

                if p.at(TokenKind::Star) {
                    // count(*)
                    p.advance();
                } else if !p.at(TokenKind::RParen) {
                    args.push(parse_expr(p)?);
                    while p.eat(TokenKind::Comma) {
                        args.push(parse_expr(p)?);
                    }
                }
                p.expect(TokenKind::RParen)?;
                Ok(Expr::FunctionCall { name: tok.text, args, distinct })
            } else {
                Ok(Expr::Variable(tok.text))
            }
        }

        _ => Err(p.error(format!(
            "Unexpected token in expression: {:?} '{}'",
            p.peek_kind(),
            p.peek().text
        ))),
    }
}

fn parse_list_or_comprehension(p: &mut Parser) -> Result<Expr> {
    p.expect(TokenKind::LBracket)?;

    if p.at(TokenKind::RBracket) {
        p.advance();
        return Ok(Expr::List(Vec::new()));
    }

    // [x IN list ...] is a comprehension; anything else is a plain list.
    if p.at(TokenKind::Identifier) && p.peek_ahead(1) == TokenKind::In {
        let variable = p.advance().text.clone();
        p.expect(TokenKind::In)?;
        let list = parse_expr(p)?;
        let predicate = if p.eat(TokenKind::Where) {
            Some(Box::new(parse_expr(p)?))
        } else {
            None
        };
        let projection = if p.eat(TokenKind::Pipe) {
            Some(Box::new(parse_expr(p)?))
        } else {
            None
        };
        p.expect(TokenKind::RBracket)?;
        return Ok(Expr::ListComprehension {
            variable,
            list: Box::new(list),
            predicate,
            projection,
        });
    }

    let mut items = Vec::new();
    items.push(parse_expr(p)?);
    while p.eat(TokenKind::Comma) {
        items.push(parse_expr(p)?);
    }
    p.expect(TokenKind::RBracket)?;
    Ok(Expr::List(items))
}

fn parse_subquery_pattern(p: &mut Parser) -> Result<SubqueryPattern> {
    p.expect(TokenKind::LBrace)?;
    p.eat(TokenKind::Match); // MATCH keyword is optional inside EXISTS/COUNT
    let patterns = parse_pattern_list(p)?;
    let where_clause = if p.eat(TokenKind::Where) {
        Some(parse_expr(p)?)
    } else {
        None
    };
    p.expect(TokenKind::RBrace)?;
    Ok(SubqueryPattern { patterns, where_clause })
}

fn parse_map_entries(p: &mut Parser) -> Result<Vec<(String, Expr)>> {
    p.expect(TokenKind::LBrace)?;
    let mut entries = Vec::new();
    if !p.at(TokenKind::RBrace) {
        loop {
            let key = if p.at(TokenKind::StringLiteral) {
                p.advance().text.clone()
            } else {
                p.ident_text()?
            };
            p.expect(TokenKind::Colon)?;
            let value = parse_expr(p)?;
            entries.push((key, value));
            if !p.eat(TokenKind::Comma) {
                break;
            }
        }
    }
    p.expect(TokenKind::RBrace)?;
    Ok(entries)
}

// ============================================================================
// Tests
// ============================================================================
