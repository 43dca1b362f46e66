//! Expression evaluation over bound rows.
//!
//! Comparisons and boolean connectives follow three-valued logic: `null`
//! propagates, except where one operand already decides the result
//! (`null AND false = false`, `null OR true = true`).

use crate::ast::{BinaryOp, Expr, Literal, UnaryOp};
use crate::error::{EvalError, EvalErrorKind, Error, Result};

fn eval_err(kind: EvalErrorKind, detail: impl Into<String>) -> Error {
    Error::Eval(EvalError::new(kind, detail))
}
use nendb_api::{EdgeHandle, GraphRead, NodeId, PropValue};
use ordered_float::OrderedFloat;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Node(NodeId),
    Edge(EdgeHandle),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Node(_) => "node",
            Value::Edge(_) => "edge",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl From<PropValue> for Value {
    fn from(v: PropValue) -> Self {
        match v {
            PropValue::Null => Value::Null,
            PropValue::Bool(b) => Value::Bool(b),
            PropValue::Int(i) => Value::Int(i),
            PropValue::Float(f) => Value::Float(f),
            PropValue::Text(s) => Value::Text(s),
        }
    }
}

/// Converts a value into something the props blob can hold.
pub fn to_prop_value(value: &Value) -> Result<PropValue> {
    match value {
        Value::Null => Ok(PropValue::Null),
        Value::Bool(b) => Ok(PropValue::Bool(*b)),
        Value::Int(i) => Ok(PropValue::Int(*i)),
        Value::Float(f) => Ok(PropValue::Float(*f)),
        Value::Text(s) => Ok(PropValue::Text(s.clone())),
        other => Err(eval_err(
            EvalErrorKind::TypeMismatch,
            format!("{} cannot be stored as a property", other.type_name()),
        )),
    }
}

/// One bound row: variable name → value. Kept as a small vector; queries
/// bind a handful of variables at most.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    entries: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }
}

pub fn evaluate(expr: &Expr, row: &Row, graph: &dyn GraphRead) -> Result<Value> {
    match expr {
        Expr::Literal(lit) => Ok(match lit {
            Literal::Int(i) => Value::Int(*i),
            Literal::Float(f) => Value::Float(*f),
            Literal::Str(s) => Value::Text(s.clone()),
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Null => Value::Null,
        }),
        Expr::Ident(name) => row.get(name).cloned().ok_or_else(|| {
            eval_err(EvalErrorKind::UnknownIdentifier, name.clone())
        }),
        Expr::Property { base, keys } => {
            let mut value = row.get(base).cloned().ok_or_else(|| {
                eval_err(EvalErrorKind::UnknownIdentifier, base.clone())
            })?;
            for key in keys {
                value = project_key(&value, key, graph)?;
            }
            Ok(value)
        }
        Expr::Unary(unary) => {
            let operand = evaluate(&unary.operand, row, graph)?;
            apply_unary(unary.op, operand)
        }
        Expr::Binary(binary) => {
            let left = evaluate(&binary.left, row, graph)?;
            let right = evaluate(&binary.right, row, graph)?;
            apply_binary(binary.op, left, right)
        }
        Expr::FnCall(call) => Err(eval_err(
            EvalErrorKind::UnknownFunction,
            call.name.clone(),
        )),
        Expr::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(evaluate(item, row, graph)?);
            }
            Ok(Value::List(out))
        }
        Expr::Map(map) => {
            let mut out = BTreeMap::new();
            for (key, value_expr) in &map.entries {
                out.insert(key.clone(), evaluate(value_expr, row, graph)?);
            }
            Ok(Value::Map(out))
        }
        Expr::Star => Err(eval_err(
            EvalErrorKind::TypeMismatch,
            "`*` is only valid inside count(*)",
        )),
    }
}

fn project_key(value: &Value, key: &str, graph: &dyn GraphRead) -> Result<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Node(id) => match key {
            "id" => Ok(Value::Int(*id as i64)),
            "kind" => Ok(graph
                .node_kind(*id)
                .map(|k| Value::Int(i64::from(k)))
                .unwrap_or(Value::Null)),
            _ => Ok(graph
                .node_prop(*id, key)
                .map(Value::from)
                .unwrap_or(Value::Null)),
        },
        Value::Edge(handle) => {
            let info = graph.edge_info(*handle);
            match key {
                "from" => Ok(info
                    .map(|i| Value::Int(i.from as i64))
                    .unwrap_or(Value::Null)),
                "to" => Ok(info.map(|i| Value::Int(i.to as i64)).unwrap_or(Value::Null)),
                "label" => Ok(info
                    .map(|i| Value::Int(i64::from(i.label)))
                    .unwrap_or(Value::Null)),
                _ => Ok(graph
                    .edge_prop(*handle, key)
                    .map(Value::from)
                    .unwrap_or(Value::Null)),
            }
        }
        Value::Map(map) => Ok(map.get(key).cloned().unwrap_or(Value::Null)),
        other => Err(eval_err(
            EvalErrorKind::TypeMismatch,
            format!("cannot read property {key:?} of {}", other.type_name()),
        )),
    }
}

fn apply_unary(op: UnaryOp, operand: Value) -> Result<Value> {
    match op {
        UnaryOp::Not => match operand {
            Value::Null => Ok(Value::Null),
            Value::Bool(b) => Ok(Value::Bool(!b)),
            other => Err(eval_err(
                EvalErrorKind::TypeMismatch,
                format!("NOT expects a boolean, got {}", other.type_name()),
            )),
        },
        UnaryOp::Neg => match operand {
            Value::Null => Ok(Value::Null),
            Value::Int(i) => Ok(Value::Int(-i)),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(eval_err(
                EvalErrorKind::TypeMismatch,
                format!("cannot negate {}", other.type_name()),
            )),
        },
        UnaryOp::IsNull => Ok(Value::Bool(operand.is_null())),
        UnaryOp::IsNotNull => Ok(Value::Bool(!operand.is_null())),
    }
}

fn apply_binary(op: BinaryOp, left: Value, right: Value) -> Result<Value> {
    match op {
        BinaryOp::And => Ok(kleene_and(truth(&left)?, truth(&right)?)),
        BinaryOp::Or => Ok(kleene_or(truth(&left)?, truth(&right)?)),
        BinaryOp::Eq => Ok(equality(&left, &right).map(Value::Bool).unwrap_or(Value::Null)),
        BinaryOp::Ne => Ok(equality(&left, &right)
            .map(|eq| Value::Bool(!eq))
            .unwrap_or(Value::Null)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let Some(ordering) = comparison(&left, &right) else {
                return Ok(Value::Null);
            };
            let holds = match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                BinaryOp::Ge => ordering != Ordering::Less,
                _ => unreachable!(),
            };
            Ok(Value::Bool(holds))
        }
        BinaryOp::In => membership(&left, &right),
        BinaryOp::Add => match (&left, &right) {
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
            (Value::Text(a), Value::Text(b)) => Ok(Value::Text(format!("{a}{b}"))),
            _ => numeric_op(&left, &right, "+", |a, b| Ok(a + b)),
        },
        BinaryOp::Sub => match (&left, &right) {
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a - b)),
            _ => numeric_op(&left, &right, "-", |a, b| Ok(a - b)),
        },
        BinaryOp::Mul => match (&left, &right) {
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a * b)),
            _ => numeric_op(&left, &right, "*", |a, b| Ok(a * b)),
        },
        BinaryOp::Div => match (&left, &right) {
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (Value::Int(a), Value::Int(b)) => {
                if *b == 0 {
                    Err(eval_err(EvalErrorKind::DivByZero, "integer division"))
                } else {
                    Ok(Value::Int(a / b))
                }
            }
            _ => numeric_op(&left, &right, "/", |a, b| {
                if b == 0.0 {
                    Err(eval_err(EvalErrorKind::DivByZero, "float division"))
                } else {
                    Ok(a / b)
                }
            }),
        },
        BinaryOp::Mod => match (&left, &right) {
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (Value::Int(a), Value::Int(b)) => {
                if *b == 0 {
                    Err(eval_err(EvalErrorKind::DivByZero, "integer modulo"))
                } else {
                    Ok(Value::Int(a % b))
                }
            }
            _ => numeric_op(&left, &right, "%", |a, b| {
                if b == 0.0 {
                    Err(eval_err(EvalErrorKind::DivByZero, "float modulo"))
                } else {
                    Ok(a % b)
                }
            }),
        },
    }
}

fn numeric_op(
    left: &Value,
    right: &Value,
    symbol: &str,
    f: impl FnOnce(f64, f64) -> Result<f64>,
) -> Result<Value> {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => f(a, b).map(Value::Float),
        _ => Err(eval_err(
            EvalErrorKind::TypeMismatch,
            format!(
                "{} {symbol} {} is not numeric",
                left.type_name(),
                right.type_name()
            ),
        )),
    }
}

/// Three-valued truth of a value for WHERE-style contexts.
pub fn truth(value: &Value) -> Result<Option<bool>> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(*b)),
        other => Err(eval_err(
            EvalErrorKind::TypeMismatch,
            format!("expected a boolean predicate, got {}", other.type_name()),
        )),
    }
}

fn kleene_and(a: Option<bool>, b: Option<bool>) -> Value {
    match (a, b) {
        (Some(false), _) | (_, Some(false)) => Value::Bool(false),
        (Some(true), Some(true)) => Value::Bool(true),
        _ => Value::Null,
    }
}

fn kleene_or(a: Option<bool>, b: Option<bool>) -> Value {
    match (a, b) {
        (Some(true), _) | (_, Some(true)) => Value::Bool(true),
        (Some(false), Some(false)) => Value::Bool(false),
        _ => Value::Null,
    }
}

/// Equality with null propagation: `None` means "unknown".
pub fn equality(left: &Value, right: &Value) -> Option<bool> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::List(a), Value::List(b)) => {
            if a.len() != b.len() {
                return Some(false);
            }
            let mut all_known = true;
            for (x, y) in a.iter().zip(b) {
                match equality(x, y) {
                    Some(false) => return Some(false),
                    Some(true) => {}
                    None => all_known = false,
                }
            }
            all_known.then_some(true)
        }
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => Some(a == b),
            _ => Some(left == right),
        },
    }
}

/// Ordering for comparison operators; `None` when incomparable or null.
fn comparison(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => OrderedFloat(a).partial_cmp(&OrderedFloat(b)),
            _ => None,
        },
    }
}

fn membership(left: &Value, right: &Value) -> Result<Value> {
    let Value::List(items) = right else {
        if right.is_null() {
            return Ok(Value::Null);
        }
        return Err(eval_err(
            EvalErrorKind::TypeMismatch,
            format!("IN expects a list, got {}", right.type_name()),
        ));
    };
    let mut saw_unknown = left.is_null() && !items.is_empty();
    for item in items {
        match equality(left, item) {
            Some(true) => return Ok(Value::Bool(true)),
            Some(false) => {}
            None => saw_unknown = true,
        }
    }
    if saw_unknown {
        Ok(Value::Null)
    } else {
        Ok(Value::Bool(false))
    }
}

/// Total order across all values, used for ORDER BY. Nulls sort first;
/// values of different kinds order by kind rank.
pub fn total_cmp(left: &Value, right: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::Text(_) => 3,
            Value::Node(_) => 4,
            Value::Edge(_) => 5,
            Value::List(_) => 6,
            Value::Map(_) => 7,
        }
    }
    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Text(a), Value::Text(b)) => a.cmp(b),
        (Value::Node(a), Value::Node(b)) => a.cmp(b),
        (Value::Edge(a), Value::Edge(b)) => a.cmp(b),
        (Value::List(a), Value::List(b)) => {
            for (x, y) in a.iter().zip(b) {
                let ord = total_cmp(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            a.len().cmp(&b.len())
        }
        (Value::Map(a), Value::Map(b)) => {
            let mut ai = a.iter();
            let mut bi = b.iter();
            loop {
                match (ai.next(), bi.next()) {
                    (None, None) => return Ordering::Equal,
                    (None, Some(_)) => return Ordering::Less,
                    (Some(_), None) => return Ordering::Greater,
                    (Some((ka, va)), Some((kb, vb))) => {
                        let ord = ka.cmp(kb).then_with(|| total_cmp(va, vb));
                        if ord != Ordering::Equal {
                            return ord;
                        }
                    }
                }
            }
        }
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => OrderedFloat(a).cmp(&OrderedFloat(b)),
            _ => rank(left).cmp(&rank(right)),
        },
    }
}

/// Hashable key over a value, for DISTINCT and grouping.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKey {
    Null,
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    Text(String),
    Node(NodeId),
    Edge(EdgeHandle),
    List(Vec<ValueKey>),
    Map(Vec<(String, ValueKey)>),
}

pub fn value_key(value: &Value) -> ValueKey {
    match value {
        Value::Null => ValueKey::Null,
        Value::Bool(b) => ValueKey::Bool(*b),
        Value::Int(i) => ValueKey::Int(*i),
        Value::Float(f) => ValueKey::Float(OrderedFloat(*f)),
        Value::Text(s) => ValueKey::Text(s.clone()),
        Value::Node(id) => ValueKey::Node(*id),
        Value::Edge(handle) => ValueKey::Edge(*handle),
        Value::List(items) => ValueKey::List(items.iter().map(value_key).collect()),
        Value::Map(map) => {
            ValueKey::Map(map.iter().map(|(k, v)| (k.clone(), value_key(v))).collect())
        }
    }
}
