use nendb_query::ast::*;
use nendb_query::error::ParseErrorKind;
use nendb_query::parser::Parser;

#[test]
fn optional_match_with_return_splits_parts() {
    let query = Parser::parse(
        "OPTIONAL MATCH (n:User) WITH n RETURN n ORDER BY n.kind DESC SKIP 1 LIMIT 2",
    )
    .unwrap();

    assert_eq!(query.parts.len(), 2);

    let first = &query.parts[0];
    assert_eq!(first.clauses.len(), 1);
    let Clause::Match(m) = &first.clauses[0] else {
        panic!("expected MATCH, got {:?}", first.clauses[0]);
    };
    assert!(m.optional);
    assert_eq!(m.paths.len(), 1);
    let PathElement::Node(node) = &m.paths[0].elements[0] else {
        panic!("expected node pattern");
    };
    assert_eq!(node.variable.as_deref(), Some("n"));
    assert_eq!(node.labels, vec!["User".to_string()]);

    let second = &query.parts[1];
    assert_eq!(second.clauses.len(), 2);
    assert!(matches!(second.clauses[0], Clause::With(_)));
    let Clause::Return(ret) = &second.clauses[1] else {
        panic!("expected RETURN");
    };
    assert_eq!(ret.order_by.len(), 1);
    assert!(ret.order_by[0].descending);
    assert_eq!(ret.skip, Some(1));
    assert_eq!(ret.limit, Some(2));
}

#[test]
fn match_with_where_and_relationship() {
    let query = Parser::parse("MATCH (a)-[r:5]->(b) WHERE a.kind = 1 RETURN a.id, b.id").unwrap();
    let Clause::Match(m) = &query.parts[0].clauses[0] else {
        panic!("expected MATCH");
    };
    assert!(m.where_clause.is_some());
    let elements = &m.paths[0].elements;
    assert_eq!(elements.len(), 3);
    let PathElement::Rel(rel) = &elements[1] else {
        panic!("expected relationship");
    };
    assert_eq!(rel.variable.as_deref(), Some("r"));
    assert_eq!(rel.label.as_deref(), Some("5"));
    assert_eq!(rel.direction, RelDirection::Right);
}

#[test]
fn relationship_directions() {
    for (text, expected) in [
        ("MATCH (a)-[:1]->(b) RETURN a", RelDirection::Right),
        ("MATCH (a)<-[:1]-(b) RETURN a", RelDirection::Left),
        ("MATCH (a)-[:1]-(b) RETURN a", RelDirection::Undirected),
    ] {
        let query = Parser::parse(text).unwrap();
        let Clause::Match(m) = &query.parts[0].clauses[0] else {
            panic!("expected MATCH");
        };
        let PathElement::Rel(rel) = &m.paths[0].elements[1] else {
            panic!("expected relationship");
        };
        assert_eq!(rel.direction, expected, "in {text}");
    }
}

#[test]
fn variable_length_is_recognized_and_stored() {
    let query = Parser::parse("MATCH (a)-[r:1*1..3]->(b) RETURN a").unwrap();
    let Clause::Match(m) = &query.parts[0].clauses[0] else {
        panic!("expected MATCH");
    };
    let PathElement::Rel(rel) = &m.paths[0].elements[1] else {
        panic!("expected relationship");
    };
    assert_eq!(
        rel.var_length,
        Some(VarLength {
            min: Some(1),
            max: Some(3)
        })
    );

    let query = Parser::parse("MATCH (a)-[*2]->(b) RETURN a").unwrap();
    let Clause::Match(m) = &query.parts[0].clauses[0] else {
        panic!("expected MATCH");
    };
    let PathElement::Rel(rel) = &m.paths[0].elements[1] else {
        panic!("expected relationship");
    };
    assert_eq!(
        rel.var_length,
        Some(VarLength {
            min: Some(2),
            max: Some(2)
        })
    );
}

#[test]
fn create_with_property_map() {
    let query = Parser::parse("CREATE (n:7 {name: 'ada', age: 36})").unwrap();
    let Clause::Create(c) = &query.parts[0].clauses[0] else {
        panic!("expected CREATE");
    };
    let PathElement::Node(node) = &c.paths[0].elements[0] else {
        panic!("expected node");
    };
    assert_eq!(node.labels, vec!["7".to_string()]);
    let props = node.props.as_ref().unwrap();
    assert_eq!(props.entries.len(), 2);
    assert_eq!(props.entries[0].0, "name");
}

#[test]
fn merge_set_delete_unwind_remove_using() {
    let query = Parser::parse("MERGE (n {id: 1})").unwrap();
    assert!(matches!(query.parts[0].clauses[0], Clause::Merge(_)));

    let query = Parser::parse("MATCH (n) SET n.name = 'x', n.age = 3").unwrap();
    let Clause::Set(s) = &query.parts[0].clauses[1] else {
        panic!("expected SET");
    };
    assert_eq!(s.items.len(), 2);

    let query = Parser::parse("MATCH (n) DETACH DELETE n").unwrap();
    let Clause::Delete(d) = &query.parts[0].clauses[1] else {
        panic!("expected DELETE");
    };
    assert!(d.detach);

    let query = Parser::parse("UNWIND [1, 2, 3] AS x RETURN x").unwrap();
    let Clause::Unwind(u) = &query.parts[0].clauses[0] else {
        panic!("expected UNWIND");
    };
    assert_eq!(u.alias, "x");

    let query = Parser::parse("MATCH (n) REMOVE n.name").unwrap();
    assert!(matches!(query.parts[0].clauses[1], Clause::Remove(_)));

    let query = Parser::parse("MATCH (n) USING BFS RETURN n").unwrap();
    let Clause::Using(u) = &query.parts[0].clauses[1] else {
        panic!("expected USING");
    };
    assert_eq!(u.hint, TraversalHint::Bfs);
}

#[test]
fn expression_precedence() {
    let query = Parser::parse("RETURN 1 + 2 * 3").unwrap();
    let Clause::Return(ret) = &query.parts[0].clauses[0] else {
        panic!("expected RETURN");
    };
    let Expr::Binary(add) = &ret.items[0].expr else {
        panic!("expected binary expression");
    };
    assert_eq!(add.op, BinaryOp::Add);
    let Expr::Binary(mul) = &add.right else {
        panic!("expected nested multiplication");
    };
    assert_eq!(mul.op, BinaryOp::Mul);

    let query = Parser::parse("RETURN NOT a = 1 AND b < 2 OR c").unwrap();
    let Clause::Return(ret) = &query.parts[0].clauses[0] else {
        panic!("expected RETURN");
    };
    let Expr::Binary(or) = &ret.items[0].expr else {
        panic!("expected OR at the top");
    };
    assert_eq!(or.op, BinaryOp::Or);
}

#[test]
fn composed_comparison_operators() {
    for (text, op) in [
        ("RETURN a <= b", BinaryOp::Le),
        ("RETURN a >= b", BinaryOp::Ge),
        ("RETURN a <> b", BinaryOp::Ne),
        ("RETURN a < b", BinaryOp::Lt),
        ("RETURN a IN b", BinaryOp::In),
    ] {
        let query = Parser::parse(text).unwrap();
        let Clause::Return(ret) = &query.parts[0].clauses[0] else {
            panic!("expected RETURN");
        };
        let Expr::Binary(b) = &ret.items[0].expr else {
            panic!("expected binary in {text}");
        };
        assert_eq!(b.op, op, "in {text}");
    }
}

#[test]
fn is_null_predicates() {
    let query = Parser::parse("MATCH (n) WHERE n.name IS NOT NULL RETURN n").unwrap();
    let Clause::Match(m) = &query.parts[0].clauses[0] else {
        panic!("expected MATCH");
    };
    let Expr::Unary(u) = m.where_clause.as_ref().unwrap() else {
        panic!("expected unary IS NOT NULL");
    };
    assert_eq!(u.op, UnaryOp::IsNotNull);
}

#[test]
fn count_star_parses() {
    let query = Parser::parse("MATCH (n) RETURN count(*)").unwrap();
    let Clause::Return(ret) = &query.parts[0].clauses[1] else {
        panic!("expected RETURN");
    };
    let Expr::FnCall(call) = &ret.items[0].expr else {
        panic!("expected function call");
    };
    assert_eq!(call.name, "count");
    assert_eq!(call.args, vec![Expr::Star]);
}

#[test]
fn error_kinds_are_deterministic() {
    for (text, kind) in [
        ("MATCH (n", ParseErrorKind::ExpectedRParen),
        ("MATCH (n:", ParseErrorKind::ExpectedLabel),
        ("MATCH (n) RETURN n SKIP x", ParseErrorKind::ExpectedInteger),
        ("FOO (n)", ParseErrorKind::UnexpectedToken),
        ("MATCH (n) SET n.x 1", ParseErrorKind::ExpectedEq),
        ("MATCH (n {a 1}) RETURN n", ParseErrorKind::ExpectedColon),
        ("UNWIND [1] AS 1", ParseErrorKind::ExpectedIdentifier),
        ("OPTIONAL CREATE (n)", ParseErrorKind::ExpectedKeyword),
        ("MATCH (n) RETURN n LIMIT 1 MATCH (m)", ParseErrorKind::UnexpectedToken),
        ("MATCH (n)-[r:1->(m) RETURN n", ParseErrorKind::ExpectedRBrack),
    ] {
        let err = Parser::parse(text).unwrap_err();
        assert_eq!(err.kind, kind, "for query {text:?} (got {err})");
    }
}

#[test]
fn errors_carry_position() {
    let err = Parser::parse("MATCH (n) RETURN n SKIP x").unwrap_err();
    assert_eq!(err.line, 1);
    assert!(err.column > 1);
    assert_eq!(err.found, "x");
}
