//! Error and result types for the query crate.

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    UnexpectedToken,
    ExpectedKeyword,
    ExpectedIdentifier,
    ExpectedInteger,
    ExpectedLBrace,
    ExpectedRBrace,
    ExpectedRParen,
    ExpectedRBrack,
    ExpectedColon,
    ExpectedComma,
    ExpectedDot,
    ExpectedEq,
    ExpectedMinus,
    ExpectedPropertyKey,
    ExpectedLabel,
    ExpectedType,
    ExpectedMapKey,
    UnexpectedExpr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub line: u32,
    pub column: u32,
    pub found: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} at {}:{} (found {:?})",
            self.kind, self.line, self.column, self.found
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalErrorKind {
    TypeMismatch,
    DivByZero,
    UnknownIdentifier,
    UnknownFunction,
    UnknownLabel,
    IntrinsicProperty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalError {
    pub kind: EvalErrorKind,
    pub detail: String,
}

impl EvalError {
    pub fn new(kind: EvalErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.detail)
    }
}

#[derive(Debug)]
pub enum Error {
    Parse(ParseError),
    Eval(EvalError),
    Storage(String),
    Unsupported(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Parse(e) => write!(f, "parse error: {e}"),
            Error::Eval(e) => write!(f, "evaluation error: {e}"),
            Error::Storage(msg) => write!(f, "storage error: {msg}"),
            Error::Unsupported(what) => write!(f, "unsupported: {what}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Error::Parse(e)
    }
}

impl From<EvalError> for Error {
    fn from(e: EvalError) -> Self {
        Error::Eval(e)
    }
}
