//! Clause-by-clause execution of a parsed query.
//!
//! Each part's reads (MATCH, UNWIND, WHERE) materialize rows before any of
//! its write clauses apply, so a write never mutates state that an earlier
//! clause in the same part is still iterating. Reads go through
//! [`GraphRead`]; writes through [`GraphWrite`], which the embedding layer
//! implements on top of its storage engine.

use crate::ast::*;
use crate::error::{Error, EvalError, EvalErrorKind, Result};
use crate::evaluator::{
    self, Row, Value, ValueKey, evaluate, to_prop_value, total_cmp, truth, value_key,
};
use nendb_api::{Direction, EdgeHandle, EdgeLabel, GraphRead, NodeId, NodeKind, PropValue};
use std::collections::{HashMap, HashSet};

/// Write access to a graph, as driven by CREATE/MERGE/SET/REMOVE/DELETE.
pub trait GraphWrite {
    /// Creates a node; `id: None` asks the store for a fresh id.
    fn create_node(
        &mut self,
        id: Option<NodeId>,
        kind: NodeKind,
        props: Vec<(String, PropValue)>,
    ) -> Result<NodeId>;

    fn create_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        label: EdgeLabel,
        props: Vec<(String, PropValue)>,
    ) -> Result<EdgeHandle>;

    fn set_node_prop(&mut self, id: NodeId, key: &str, value: PropValue) -> Result<()>;

    fn remove_node_prop(&mut self, id: NodeId, key: &str) -> Result<()>;

    /// Returns the number of edges removed alongside the node.
    fn delete_node(&mut self, id: NodeId, detach: bool) -> Result<usize>;

    /// Returns `false` when the handle no longer resolves (already gone).
    fn delete_edge(&mut self, handle: EdgeHandle) -> Result<bool>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Value]> {
        self.rows.iter().map(|r| r.as_slice())
    }

    pub fn into_rows(self) -> std::vec::IntoIter<Vec<Value>> {
        self.rows.into_iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub fn execute<G: GraphRead + GraphWrite>(query: &Query, graph: &mut G) -> Result<ResultSet> {
    let mut rows = vec![Row::new()];
    let mut result = None;

    for part in &query.parts {
        for clause in &part.clauses {
            match clause {
                Clause::With(with) => rows = apply_with(rows, with, graph)?,
                Clause::Match(m) => rows = apply_match(rows, m, graph)?,
                Clause::Unwind(u) => rows = apply_unwind(rows, u, graph)?,
                Clause::Using(_) => {}
                Clause::Create(c) => rows = apply_create(rows, c, graph)?,
                Clause::Merge(m) => rows = apply_merge(rows, m, graph)?,
                Clause::Set(s) => apply_set(&rows, s, graph)?,
                Clause::Remove(r) => apply_remove(&rows, r, graph)?,
                Clause::Delete(d) => apply_delete(&rows, d, graph)?,
                Clause::Return(r) => {
                    result = Some(apply_return(rows, r, graph)?);
                    rows = Vec::new();
                }
            }
        }
    }

    Ok(result.unwrap_or_else(ResultSet::empty))
}

// ---- pattern matching ----------------------------------------------------

fn apply_match<G: GraphRead>(
    rows: Vec<Row>,
    clause: &MatchClause,
    graph: &G,
) -> Result<Vec<Row>> {
    let mut out = Vec::new();
    for row in rows {
        let mut partials = vec![row.clone()];
        for path in &clause.paths {
            let mut next = Vec::new();
            for partial in &partials {
                next.extend(match_path(partial, path, graph)?);
            }
            partials = next;
            if partials.is_empty() {
                break;
            }
        }
        if let Some(pred) = &clause.where_clause {
            partials = filter_rows(partials, pred, graph)?;
        }
        if !partials.is_empty() {
            out.extend(partials);
        } else if clause.optional {
            let mut nulled = row;
            for var in pattern_variables(&clause.paths) {
                if !nulled.is_bound(&var) {
                    nulled.bind(var, Value::Null);
                }
            }
            out.push(nulled);
        }
    }
    Ok(out)
}

fn match_path<G: GraphRead>(base: &Row, path: &PathPattern, graph: &G) -> Result<Vec<Row>> {
    let PathElement::Node(first) = &path.elements[0] else {
        return Err(Error::Unsupported("path must start with a node pattern"));
    };

    let mut states: Vec<(Row, NodeId)> = Vec::new();
    for id in node_candidates(base, first, graph)? {
        if node_matches(id, first, base, graph)? {
            let mut row = base.clone();
            if let Some(var) = &first.variable {
                row.bind(var.clone(), Value::Node(id));
            }
            states.push((row, id));
        }
    }

    let mut idx = 1;
    while idx + 1 < path.elements.len() {
        let PathElement::Rel(rel) = &path.elements[idx] else {
            return Err(Error::Unsupported("malformed path pattern"));
        };
        let PathElement::Node(node) = &path.elements[idx + 1] else {
            return Err(Error::Unsupported("malformed path pattern"));
        };
        if rel.var_length.is_some() {
            return Err(Error::Unsupported("variable-length relationship"));
        }

        let direction = match rel.direction {
            RelDirection::Right => Direction::Outgoing,
            RelDirection::Left => Direction::Incoming,
            RelDirection::Undirected => Direction::Both,
        };
        let label = match &rel.label {
            Some(name) => Some(resolve_edge_label(graph, name)?),
            None => None,
        };

        let mut next_states = Vec::new();
        for (row, current) in &states {
            let edges: Vec<_> = graph.neighbors(*current, direction, label).collect();
            for edge in edges {
                if let Some(var) = &rel.variable
                    && let Some(bound) = row.get(var)
                    && bound != &Value::Edge(edge.handle)
                {
                    continue;
                }
                if let Some(props) = &rel.props
                    && !edge_props_match(edge.handle, props, row, graph)?
                {
                    continue;
                }
                let other = match rel.direction {
                    RelDirection::Right => edge.to,
                    RelDirection::Left => edge.from,
                    RelDirection::Undirected => {
                        if edge.from == *current {
                            edge.to
                        } else {
                            edge.from
                        }
                    }
                };
                if let Some(var) = &node.variable
                    && let Some(bound) = row.get(var)
                    && bound != &Value::Node(other)
                {
                    continue;
                }
                if !node_matches(other, node, row, graph)? {
                    continue;
                }
                let mut new_row = row.clone();
                if let Some(var) = &rel.variable {
                    new_row.bind(var.clone(), Value::Edge(edge.handle));
                }
                if let Some(var) = &node.variable {
                    new_row.bind(var.clone(), Value::Node(other));
                }
                next_states.push((new_row, other));
            }
        }
        states = next_states;
        idx += 2;
    }

    Ok(states.into_iter().map(|(row, _)| row).collect())
}

fn node_candidates<G: GraphRead>(
    base: &Row,
    pattern: &NodePattern,
    graph: &G,
) -> Result<Vec<NodeId>> {
    if let Some(var) = &pattern.variable
        && let Some(bound) = base.get(var)
    {
        return match bound {
            Value::Node(id) => Ok(vec![*id]),
            Value::Null => Ok(Vec::new()),
            other => Err(Error::Eval(EvalError::new(
                EvalErrorKind::TypeMismatch,
                format!("{var} is bound to {other:?}, not a node"),
            ))),
        };
    }
    Ok(graph.nodes().collect())
}

fn node_matches<G: GraphRead>(
    id: NodeId,
    pattern: &NodePattern,
    row: &Row,
    graph: &G,
) -> Result<bool> {
    for label in &pattern.labels {
        let tag = resolve_kind(graph, label)?;
        if graph.node_kind(id) != Some(tag) {
            return Ok(false);
        }
    }
    if let Some(props) = &pattern.props {
        for (key, expr) in &props.entries {
            let expected = evaluate(expr, row, graph as &dyn GraphRead)?;
            let actual = match key.as_str() {
                "id" => Value::Int(id as i64),
                "kind" => graph
                    .node_kind(id)
                    .map(|k| Value::Int(i64::from(k)))
                    .unwrap_or(Value::Null),
                _ => graph.node_prop(id, key).map(Value::from).unwrap_or(Value::Null),
            };
            if evaluator::equality(&actual, &expected) != Some(true) {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

fn edge_props_match<G: GraphRead>(
    handle: EdgeHandle,
    props: &MapLiteral,
    row: &Row,
    graph: &G,
) -> Result<bool> {
    for (key, expr) in &props.entries {
        let expected = evaluate(expr, row, graph as &dyn GraphRead)?;
        let actual = graph
            .edge_prop(handle, key)
            .map(Value::from)
            .unwrap_or(Value::Null);
        if evaluator::equality(&actual, &expected) != Some(true) {
            return Ok(false);
        }
    }
    Ok(true)
}

fn pattern_variables(paths: &[PathPattern]) -> Vec<String> {
    let mut vars = Vec::new();
    for path in paths {
        for element in &path.elements {
            let var = match element {
                PathElement::Node(n) => n.variable.as_ref(),
                PathElement::Rel(r) => r.variable.as_ref(),
            };
            if let Some(var) = var
                && !vars.contains(var)
            {
                vars.push(var.clone());
            }
        }
    }
    vars
}

fn resolve_kind<G: GraphRead>(graph: &G, name: &str) -> Result<NodeKind> {
    if let Ok(tag) = name.parse::<NodeKind>() {
        return Ok(tag);
    }
    graph.resolve_kind(name).ok_or_else(|| {
        Error::Eval(EvalError::new(EvalErrorKind::UnknownLabel, name.to_string()))
    })
}

fn resolve_edge_label<G: GraphRead>(graph: &G, name: &str) -> Result<EdgeLabel> {
    if let Ok(tag) = name.parse::<EdgeLabel>() {
        return Ok(tag);
    }
    graph.resolve_edge_label(name).ok_or_else(|| {
        Error::Eval(EvalError::new(EvalErrorKind::UnknownLabel, name.to_string()))
    })
}

fn filter_rows<G: GraphRead>(rows: Vec<Row>, pred: &Expr, graph: &G) -> Result<Vec<Row>> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let value = evaluate(pred, &row, graph as &dyn GraphRead)?;
        if truth(&value)? == Some(true) {
            out.push(row);
        }
    }
    Ok(out)
}

// ---- row pipeline clauses ------------------------------------------------

fn apply_unwind<G: GraphRead>(
    rows: Vec<Row>,
    clause: &UnwindClause,
    graph: &G,
) -> Result<Vec<Row>> {
    let mut out = Vec::new();
    for row in rows {
        let value = evaluate(&clause.expr, &row, graph as &dyn GraphRead)?;
        match value {
            Value::Null => {}
            Value::List(items) => {
                for item in items {
                    let mut new_row = row.clone();
                    new_row.bind(clause.alias.clone(), item);
                    out.push(new_row);
                }
            }
            other => {
                return Err(Error::Eval(EvalError::new(
                    EvalErrorKind::TypeMismatch,
                    format!("UNWIND expects a list, got {other:?}"),
                )));
            }
        }
    }
    Ok(out)
}

fn apply_with<G: GraphRead>(rows: Vec<Row>, clause: &WithClause, graph: &G) -> Result<Vec<Row>> {
    let (names, projected) = project_rows(rows, &clause.items, graph)?;
    let mut out: Vec<Row> = projected
        .into_iter()
        .map(|(values, _env)| {
            let mut row = Row::new();
            for (name, value) in names.iter().zip(values) {
                row.bind(name.clone(), value);
            }
            row
        })
        .collect();
    if let Some(pred) = &clause.where_clause {
        out = filter_rows(out, pred, graph)?;
    }
    Ok(out)
}

fn apply_return<G: GraphRead>(
    rows: Vec<Row>,
    clause: &ReturnClause,
    graph: &G,
) -> Result<ResultSet> {
    let (columns, mut projected) = project_rows(rows, &clause.items, graph)?;

    if clause.distinct {
        let mut seen = HashSet::new();
        projected.retain(|(values, _)| {
            let key: Vec<ValueKey> = values.iter().map(value_key).collect();
            seen.insert(key)
        });
    }

    if !clause.order_by.is_empty() {
        // A sort expression naming a projected column (by alias or by its
        // printed form) sorts on the projected value; anything else is
        // evaluated against the row environment.
        let column_refs: Vec<Option<usize>> = clause
            .order_by
            .iter()
            .map(|item| {
                let text = expr_text(&item.expr);
                columns.iter().position(|c| *c == text)
            })
            .collect();
        let mut keyed = Vec::with_capacity(projected.len());
        for (values, env) in projected {
            let mut sort_key = Vec::with_capacity(clause.order_by.len());
            for (item, column) in clause.order_by.iter().zip(&column_refs) {
                let key = match column {
                    Some(idx) => values[*idx].clone(),
                    None => evaluate(&item.expr, &env, graph as &dyn GraphRead)?,
                };
                sort_key.push(key);
            }
            keyed.push((sort_key, values, env));
        }
        keyed.sort_by(|(a, _, _), (b, _, _)| {
            for (item, (x, y)) in clause.order_by.iter().zip(a.iter().zip(b)) {
                let mut ord = total_cmp(x, y);
                if item.descending {
                    ord = ord.reverse();
                }
                if ord != std::cmp::Ordering::Equal {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        });
        projected = keyed
            .into_iter()
            .map(|(_, values, env)| (values, env))
            .collect();
    }

    let skip = clause.skip.unwrap_or(0) as usize;
    let mut iter: Box<dyn Iterator<Item = (Vec<Value>, Row)>> =
        Box::new(projected.into_iter().skip(skip));
    if let Some(limit) = clause.limit {
        iter = Box::new(iter.take(limit as usize));
    }

    Ok(ResultSet {
        columns,
        rows: iter.map(|(values, _)| values).collect(),
    })
}

// ---- projection & aggregation --------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AggKind {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

fn aggregate_of(expr: &Expr) -> Option<(AggKind, Option<&Expr>)> {
    let Expr::FnCall(call) = expr else {
        return None;
    };
    let kind = match call.name.to_ascii_lowercase().as_str() {
        "count" => AggKind::Count,
        "sum" => AggKind::Sum,
        "avg" => AggKind::Avg,
        "min" => AggKind::Min,
        "max" => AggKind::Max,
        _ => return None,
    };
    match call.args.as_slice() {
        [] => Some((kind, None)),
        [Expr::Star] => Some((kind, None)),
        [arg] => Some((kind, Some(arg))),
        _ => None,
    }
}

fn contains_aggregate(expr: &Expr) -> bool {
    if aggregate_of(expr).is_some() {
        return true;
    }
    match expr {
        Expr::Unary(u) => contains_aggregate(&u.operand),
        Expr::Binary(b) => contains_aggregate(&b.left) || contains_aggregate(&b.right),
        Expr::FnCall(call) => call.args.iter().any(contains_aggregate),
        Expr::List(items) => items.iter().any(contains_aggregate),
        Expr::Map(map) => map.entries.iter().any(|(_, e)| contains_aggregate(e)),
        _ => false,
    }
}

#[derive(Debug, Default)]
struct Accumulator {
    count: u64,
    sum_int: i64,
    sum_float: f64,
    saw_float: bool,
    best: Option<Value>,
}

impl Accumulator {
    fn feed(&mut self, kind: AggKind, value: Option<Value>) -> Result<()> {
        match kind {
            AggKind::Count => {
                // `None` argument means count(*): every row counts.
                match value {
                    None => self.count += 1,
                    Some(v) if !v.is_null() => self.count += 1,
                    Some(_) => {}
                }
            }
            AggKind::Sum | AggKind::Avg => {
                let Some(v) = value else {
                    return Err(Error::Eval(EvalError::new(
                        EvalErrorKind::TypeMismatch,
                        "sum/avg need an argument",
                    )));
                };
                match v {
                    Value::Null => {}
                    Value::Int(i) => {
                        self.count += 1;
                        self.sum_int += i;
                        self.sum_float += i as f64;
                    }
                    Value::Float(f) => {
                        self.count += 1;
                        self.saw_float = true;
                        self.sum_float += f;
                    }
                    other => {
                        return Err(Error::Eval(EvalError::new(
                            EvalErrorKind::TypeMismatch,
                            format!("cannot aggregate {other:?}"),
                        )));
                    }
                }
            }
            AggKind::Min | AggKind::Max => {
                let Some(v) = value else {
                    return Err(Error::Eval(EvalError::new(
                        EvalErrorKind::TypeMismatch,
                        "min/max need an argument",
                    )));
                };
                if v.is_null() {
                    return Ok(());
                }
                let better = match &self.best {
                    None => true,
                    Some(current) => {
                        let ord = total_cmp(&v, current);
                        (kind == AggKind::Min && ord == std::cmp::Ordering::Less)
                            || (kind == AggKind::Max && ord == std::cmp::Ordering::Greater)
                    }
                };
                if better {
                    self.best = Some(v);
                }
            }
        }
        Ok(())
    }

    fn finish(&self, kind: AggKind) -> Value {
        match kind {
            AggKind::Count => Value::Int(self.count as i64),
            AggKind::Sum => {
                if self.saw_float {
                    Value::Float(self.sum_float)
                } else {
                    Value::Int(self.sum_int)
                }
            }
            AggKind::Avg => {
                if self.count == 0 {
                    Value::Null
                } else {
                    Value::Float(self.sum_float / self.count as f64)
                }
            }
            AggKind::Min | AggKind::Max => self.best.clone().unwrap_or(Value::Null),
        }
    }
}

/// Projects `rows` through `items`. Returns column names plus, per output
/// row, the projected values and an environment row for ORDER BY (original
/// bindings extended with the projected columns; for aggregated output the
/// columns alone).
fn project_rows<G: GraphRead>(
    rows: Vec<Row>,
    items: &[ProjectionItem],
    graph: &G,
) -> Result<(Vec<String>, Vec<(Vec<Value>, Row)>)> {
    let columns: Vec<String> = items.iter().map(item_name).collect();
    let aggregated = items.iter().any(|item| contains_aggregate(&item.expr));

    if !aggregated {
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(evaluate(&item.expr, &row, graph as &dyn GraphRead)?);
            }
            let mut env = row;
            for (name, value) in columns.iter().zip(&values) {
                env.bind(name.clone(), value.clone());
            }
            out.push((values, env));
        }
        return Ok((columns, out));
    }

    // Split items into grouping keys and aggregate accumulators.
    for item in items {
        if contains_aggregate(&item.expr) && aggregate_of(&item.expr).is_none() {
            return Err(Error::Unsupported(
                "aggregate must be a bare count/sum/avg/min/max call",
            ));
        }
    }

    struct Group {
        key_values: Vec<Value>,
        accumulators: Vec<Accumulator>,
    }
    let mut order: Vec<Vec<ValueKey>> = Vec::new();
    let mut groups: HashMap<Vec<ValueKey>, Group> = HashMap::new();
    let has_keys = items.iter().any(|item| aggregate_of(&item.expr).is_none());

    for row in &rows {
        let mut key = Vec::new();
        let mut key_values = Vec::new();
        for item in items {
            if aggregate_of(&item.expr).is_none() {
                let value = evaluate(&item.expr, row, graph as &dyn GraphRead)?;
                key.push(value_key(&value));
                key_values.push(value);
            }
        }
        if !groups.contains_key(&key) {
            order.push(key.clone());
            groups.insert(
                key.clone(),
                Group {
                    key_values,
                    accumulators: items.iter().map(|_| Accumulator::default()).collect(),
                },
            );
        }
        let group = groups.get_mut(&key).expect("group inserted above");
        for (item, acc) in items.iter().zip(&mut group.accumulators) {
            if let Some((kind, arg)) = aggregate_of(&item.expr) {
                let value = match arg {
                    Some(arg) => Some(evaluate(arg, row, graph as &dyn GraphRead)?),
                    None => None,
                };
                acc.feed(kind, value)?;
            }
        }
    }

    // An empty grouping still produces a single output row.
    if rows.is_empty() && !has_keys {
        order.push(Vec::new());
        groups.insert(
            Vec::new(),
            Group {
                key_values: Vec::new(),
                accumulators: items.iter().map(|_| Accumulator::default()).collect(),
            },
        );
    }

    let mut out = Vec::with_capacity(order.len());
    for key in order {
        let group = &groups[&key];
        let mut values = Vec::with_capacity(items.len());
        let mut key_iter = group.key_values.iter();
        for (item, acc) in items.iter().zip(&group.accumulators) {
            match aggregate_of(&item.expr) {
                Some((kind, _)) => values.push(acc.finish(kind)),
                None => values.push(key_iter.next().cloned().unwrap_or(Value::Null)),
            }
        }
        let mut env = Row::new();
        for (name, value) in columns.iter().zip(&values) {
            env.bind(name.clone(), value.clone());
        }
        out.push((values, env));
    }

    Ok((columns, out))
}

fn item_name(item: &ProjectionItem) -> String {
    if let Some(alias) = &item.alias {
        return alias.clone();
    }
    expr_text(&item.expr)
}

fn expr_text(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name) => name.clone(),
        Expr::Property { base, keys } => {
            let mut out = base.clone();
            for key in keys {
                out.push('.');
                out.push_str(key);
            }
            out
        }
        Expr::Literal(Literal::Int(i)) => i.to_string(),
        Expr::Literal(Literal::Float(f)) => f.to_string(),
        Expr::Literal(Literal::Str(s)) => format!("{s:?}"),
        Expr::Literal(Literal::Bool(b)) => b.to_string(),
        Expr::Literal(Literal::Null) => "null".to_string(),
        Expr::Star => "*".to_string(),
        Expr::FnCall(call) => {
            let args: Vec<String> = call.args.iter().map(expr_text).collect();
            format!("{}({})", call.name, args.join(", "))
        }
        _ => "expr".to_string(),
    }
}

// ---- write clauses -------------------------------------------------------

fn apply_create<G: GraphRead + GraphWrite>(
    rows: Vec<Row>,
    clause: &CreateClause,
    graph: &mut G,
) -> Result<Vec<Row>> {
    let mut out = Vec::with_capacity(rows.len());
    for mut row in rows {
        for path in &clause.paths {
            create_path(&mut row, path, graph)?;
        }
        out.push(row);
    }
    Ok(out)
}

fn create_path<G: GraphRead + GraphWrite>(
    row: &mut Row,
    path: &PathPattern,
    graph: &mut G,
) -> Result<()> {
    let PathElement::Node(first) = &path.elements[0] else {
        return Err(Error::Unsupported("path must start with a node pattern"));
    };
    let mut current = create_or_bind_node(row, first, graph)?;

    let mut idx = 1;
    while idx + 1 < path.elements.len() {
        let PathElement::Rel(rel) = &path.elements[idx] else {
            return Err(Error::Unsupported("malformed path pattern"));
        };
        let PathElement::Node(node) = &path.elements[idx + 1] else {
            return Err(Error::Unsupported("malformed path pattern"));
        };
        let other = create_or_bind_node(row, node, graph)?;
        let label = match &rel.label {
            Some(name) => resolve_edge_label(graph, name)?,
            None => return Err(Error::Unsupported("relationship type required on CREATE")),
        };
        let (from, to) = match rel.direction {
            RelDirection::Right => (current, other),
            RelDirection::Left => (other, current),
            RelDirection::Undirected => {
                return Err(Error::Unsupported("undirected relationship in CREATE"));
            }
        };
        let props = match &rel.props {
            Some(map) => eval_prop_map(map, row, graph)?,
            None => Vec::new(),
        };
        let handle = graph.create_edge(from, to, label, props)?;
        if let Some(var) = &rel.variable {
            row.bind(var.clone(), Value::Edge(handle));
        }
        current = other;
        idx += 2;
    }
    Ok(())
}

fn create_or_bind_node<G: GraphRead + GraphWrite>(
    row: &mut Row,
    pattern: &NodePattern,
    graph: &mut G,
) -> Result<NodeId> {
    if let Some(var) = &pattern.variable
        && let Some(bound) = row.get(var)
    {
        return match bound {
            Value::Node(id) => Ok(*id),
            other => Err(Error::Eval(EvalError::new(
                EvalErrorKind::TypeMismatch,
                format!("{var} is bound to {other:?}, not a node"),
            ))),
        };
    }

    let mut kind = kind_from_labels(&pattern.labels, graph)?;
    let mut explicit_id = None;
    let mut props = Vec::new();
    if let Some(map) = &pattern.props {
        for (key, expr) in &map.entries {
            let value = evaluate(expr, row, graph as &dyn GraphRead)?;
            match key.as_str() {
                "id" => match value {
                    Value::Int(i) if i >= 0 => explicit_id = Some(i as NodeId),
                    other => {
                        return Err(Error::Eval(EvalError::new(
                            EvalErrorKind::TypeMismatch,
                            format!("node id must be a non-negative integer, got {other:?}"),
                        )));
                    }
                },
                "kind" => match value {
                    Value::Int(i) if (0..=255).contains(&i) => kind = i as NodeKind,
                    other => {
                        return Err(Error::Eval(EvalError::new(
                            EvalErrorKind::TypeMismatch,
                            format!("kind must be an integer in 0..=255, got {other:?}"),
                        )));
                    }
                },
                _ => props.push((key.clone(), to_prop_value(&value)?)),
            }
        }
    }

    let id = graph.create_node(explicit_id, kind, props)?;
    if let Some(var) = &pattern.variable {
        row.bind(var.clone(), Value::Node(id));
    }
    Ok(id)
}

fn kind_from_labels<G: GraphRead>(labels: &[String], graph: &G) -> Result<NodeKind> {
    let mut kind = None;
    for label in labels {
        let tag = resolve_kind(graph, label)?;
        match kind {
            None => kind = Some(tag),
            Some(existing) if existing == tag => {}
            Some(_) => {
                return Err(Error::Eval(EvalError::new(
                    EvalErrorKind::TypeMismatch,
                    "conflicting labels on one node pattern",
                )));
            }
        }
    }
    Ok(kind.unwrap_or(0))
}

fn eval_prop_map<G: GraphRead>(
    map: &MapLiteral,
    row: &Row,
    graph: &G,
) -> Result<Vec<(String, PropValue)>> {
    let mut out = Vec::with_capacity(map.entries.len());
    for (key, expr) in &map.entries {
        let value = evaluate(expr, row, graph as &dyn GraphRead)?;
        out.push((key.clone(), to_prop_value(&value)?));
    }
    Ok(out)
}

fn apply_merge<G: GraphRead + GraphWrite>(
    rows: Vec<Row>,
    clause: &MergeClause,
    graph: &mut G,
) -> Result<Vec<Row>> {
    let mut out = Vec::with_capacity(rows.len());
    for mut row in rows {
        let mut partials = vec![row.clone()];
        for path in &clause.paths {
            let mut next = Vec::new();
            for partial in &partials {
                next.extend(match_path(partial, path, graph)?);
            }
            partials = next;
            if partials.is_empty() {
                break;
            }
        }
        if let Some(found) = partials.into_iter().next() {
            // Matched: bind from the first (deterministic) match.
            out.push(found);
        } else {
            // No complete match: create the whole pattern.
            for path in &clause.paths {
                create_path(&mut row, path, graph)?;
            }
            out.push(row);
        }
    }
    Ok(out)
}

fn apply_set<G: GraphRead + GraphWrite>(
    rows: &[Row],
    clause: &SetClause,
    graph: &mut G,
) -> Result<()> {
    // Plan over all rows first, then apply.
    let mut plan: Vec<(NodeId, String, Option<PropValue>)> = Vec::new();
    for row in rows {
        for item in &clause.items {
            let target = row.get(&item.target.variable).ok_or_else(|| {
                Error::Eval(EvalError::new(
                    EvalErrorKind::UnknownIdentifier,
                    item.target.variable.clone(),
                ))
            })?;
            match target {
                Value::Null => {}
                Value::Node(id) => {
                    if matches!(item.target.key.as_str(), "id" | "kind") {
                        return Err(Error::Eval(EvalError::new(
                            EvalErrorKind::IntrinsicProperty,
                            item.target.key.clone(),
                        )));
                    }
                    let value = evaluate(&item.value, row, graph as &dyn GraphRead)?;
                    let planned = if value.is_null() {
                        None
                    } else {
                        Some(to_prop_value(&value)?)
                    };
                    plan.push((*id, item.target.key.clone(), planned));
                }
                Value::Edge(_) => {
                    return Err(Error::Unsupported("SET on relationship properties"));
                }
                other => {
                    return Err(Error::Eval(EvalError::new(
                        EvalErrorKind::TypeMismatch,
                        format!("SET target must be a node, got {other:?}"),
                    )));
                }
            }
        }
    }
    for (id, key, value) in plan {
        match value {
            Some(value) => graph.set_node_prop(id, &key, value)?,
            None => graph.remove_node_prop(id, &key)?,
        }
    }
    Ok(())
}

fn apply_remove<G: GraphRead + GraphWrite>(
    rows: &[Row],
    clause: &RemoveClause,
    graph: &mut G,
) -> Result<()> {
    let mut plan: Vec<(NodeId, String)> = Vec::new();
    for row in rows {
        for item in &clause.items {
            let target = row.get(&item.variable).ok_or_else(|| {
                Error::Eval(EvalError::new(
                    EvalErrorKind::UnknownIdentifier,
                    item.variable.clone(),
                ))
            })?;
            match target {
                Value::Null => {}
                Value::Node(id) => {
                    if matches!(item.key.as_str(), "id" | "kind") {
                        return Err(Error::Eval(EvalError::new(
                            EvalErrorKind::IntrinsicProperty,
                            item.key.clone(),
                        )));
                    }
                    plan.push((*id, item.key.clone()));
                }
                Value::Edge(_) => {
                    return Err(Error::Unsupported("REMOVE on relationship properties"));
                }
                other => {
                    return Err(Error::Eval(EvalError::new(
                        EvalErrorKind::TypeMismatch,
                        format!("REMOVE target must be a node, got {other:?}"),
                    )));
                }
            }
        }
    }
    for (id, key) in plan {
        graph.remove_node_prop(id, &key)?;
    }
    Ok(())
}

fn apply_delete<G: GraphRead + GraphWrite>(
    rows: &[Row],
    clause: &DeleteClause,
    graph: &mut G,
) -> Result<()> {
    let mut edges = Vec::new();
    let mut edge_seen = HashSet::new();
    let mut nodes = Vec::new();
    let mut node_seen = HashSet::new();

    for row in rows {
        for target in &clause.targets {
            let value = evaluate(target, row, graph as &dyn GraphRead)?;
            match value {
                Value::Null => {}
                Value::Node(id) => {
                    if node_seen.insert(id) {
                        nodes.push(id);
                    }
                }
                Value::Edge(handle) => {
                    if edge_seen.insert(handle) {
                        edges.push(handle);
                    }
                }
                other => {
                    return Err(Error::Eval(EvalError::new(
                        EvalErrorKind::TypeMismatch,
                        format!("DELETE target must be a node or relationship, got {other:?}"),
                    )));
                }
            }
        }
    }

    // Edges first so plain DELETE of their endpoints can succeed in the
    // same clause; handles made stale by a detach are skipped.
    for handle in edges {
        graph.delete_edge(handle)?;
    }
    for id in nodes {
        graph.delete_node(id, clause.detach)?;
    }
    Ok(())
}
