//! Cypher-subset query engine: lexer, recursive-descent parser, and a
//! row-at-a-time executor over the [`nendb_api::GraphRead`] /
//! [`GraphWrite`](executor::GraphWrite) seams.

pub mod ast;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod lexer;
pub mod parser;

pub use error::{Error, EvalError, EvalErrorKind, ParseError, ParseErrorKind, Result};
pub use evaluator::{Row, Value};
pub use executor::{GraphWrite, ResultSet, execute};

/// Parses a Cypher query string into an AST.
pub fn parse(input: &str) -> Result<ast::Query> {
    parser::Parser::parse(input).map_err(Error::Parse)
}
