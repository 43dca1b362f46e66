use crate::ast::*;
use crate::error::{ParseError, ParseErrorKind};
use crate::lexer::{self, Keyword, Token, TokenKind};

pub struct Parser;

impl Parser {
    pub fn parse(input: &str) -> Result<Query, ParseError> {
        let tokens = lexer::tokenize(input);
        let mut parser = TokenParser {
            tokens,
            position: 0,
        };
        parser.parse_query()
    }
}

struct TokenParser<'a> {
    tokens: Vec<Token<'a>>,
    position: usize,
}

impl<'a> TokenParser<'a> {
    // Pratt binding powers, loosest first: OR < AND < NOT < comparisons
    // < additive < multiplicative.
    const BP_OR: u8 = 10;
    const BP_AND: u8 = 20;
    const BP_NOT: u8 = 30;
    const BP_CMP: u8 = 40;
    const BP_ADD: u8 = 50;
    const BP_MUL: u8 = 60;
    const BP_PREFIX: u8 = 70;

    fn parse_query(&mut self) -> Result<Query, ParseError> {
        let mut parts = Vec::new();
        let mut clauses: Vec<Clause> = Vec::new();

        loop {
            if self.check(TokenKind::Eof) {
                break;
            }
            if self.match_kw(Keyword::With) {
                let with = self.parse_with()?;
                parts.push(Part { clauses });
                clauses = vec![Clause::With(with)];
                continue;
            }
            if self.match_kw(Keyword::Return) {
                clauses.push(Clause::Return(self.parse_return()?));
                if !self.check(TokenKind::Eof) {
                    return Err(self.err(ParseErrorKind::UnexpectedToken));
                }
                break;
            }
            clauses.push(self.parse_clause()?);
        }

        parts.push(Part { clauses });
        Ok(Query { parts })
    }

    fn parse_clause(&mut self) -> Result<Clause, ParseError> {
        if self.match_kw(Keyword::Optional) {
            if !self.match_kw(Keyword::Match) {
                return Err(self.err(ParseErrorKind::ExpectedKeyword));
            }
            return Ok(Clause::Match(self.parse_match(true)?));
        }
        if self.match_kw(Keyword::Match) {
            return Ok(Clause::Match(self.parse_match(false)?));
        }
        if self.match_kw(Keyword::Create) {
            return Ok(Clause::Create(CreateClause {
                paths: self.parse_pattern()?,
            }));
        }
        if self.match_kw(Keyword::Merge) {
            return Ok(Clause::Merge(MergeClause {
                paths: self.parse_pattern()?,
            }));
        }
        if self.match_kw(Keyword::Set) {
            return Ok(Clause::Set(self.parse_set()?));
        }
        if self.check_kw(Keyword::Detach) || self.check_kw(Keyword::Delete) {
            return Ok(Clause::Delete(self.parse_delete()?));
        }
        if self.match_kw(Keyword::Unwind) {
            return Ok(Clause::Unwind(self.parse_unwind()?));
        }
        if self.match_kw(Keyword::Remove) {
            return Ok(Clause::Remove(self.parse_remove()?));
        }
        if self.match_kw(Keyword::Using) {
            return Ok(Clause::Using(self.parse_using()?));
        }
        Err(self.err(ParseErrorKind::UnexpectedToken))
    }

    fn parse_match(&mut self, optional: bool) -> Result<MatchClause, ParseError> {
        let paths = self.parse_pattern()?;
        let where_clause = if self.match_kw(Keyword::Where) {
            Some(self.parse_expr(0)?)
        } else {
            None
        };
        Ok(MatchClause {
            optional,
            paths,
            where_clause,
        })
    }

    fn parse_pattern(&mut self) -> Result<Vec<PathPattern>, ParseError> {
        let mut paths = vec![self.parse_path()?];
        while self.match_token(TokenKind::Comma) {
            paths.push(self.parse_path()?);
        }
        Ok(paths)
    }

    fn parse_path(&mut self) -> Result<PathPattern, ParseError> {
        let mut elements = vec![PathElement::Node(self.parse_node_pattern()?)];
        while self.check(TokenKind::Minus) || self.check(TokenKind::Lt) {
            elements.push(PathElement::Rel(self.parse_rel_pattern()?));
            elements.push(PathElement::Node(self.parse_node_pattern()?));
        }
        Ok(PathPattern { elements })
    }

    fn parse_node_pattern(&mut self) -> Result<NodePattern, ParseError> {
        if !self.match_token(TokenKind::LParen) {
            return Err(self.err(ParseErrorKind::UnexpectedToken));
        }
        let variable = if self.check(TokenKind::Ident) {
            Some(self.advance().text.to_string())
        } else {
            None
        };
        let mut labels = Vec::new();
        while self.match_token(TokenKind::Colon) {
            labels.push(self.parse_label()?);
        }
        let props = if self.check(TokenKind::LBrace) {
            Some(self.parse_map_literal()?)
        } else {
            None
        };
        if !self.match_token(TokenKind::RParen) {
            return Err(self.err(ParseErrorKind::ExpectedRParen));
        }
        Ok(NodePattern {
            variable,
            labels,
            props,
        })
    }

    fn parse_label(&mut self) -> Result<String, ParseError> {
        match self.peek().kind {
            TokenKind::Ident | TokenKind::Integer => Ok(self.advance().text.to_string()),
            _ => Err(self.err(ParseErrorKind::ExpectedLabel)),
        }
    }

    fn parse_rel_pattern(&mut self) -> Result<RelPattern, ParseError> {
        let left_start = self.match_token(TokenKind::Lt);
        if !self.match_token(TokenKind::Minus) {
            return Err(self.err(ParseErrorKind::ExpectedMinus));
        }

        let mut variable = None;
        let mut label = None;
        let mut props = None;
        let mut var_length = None;
        if self.match_token(TokenKind::LBracket) {
            if self.check(TokenKind::Ident) {
                variable = Some(self.advance().text.to_string());
            }
            if self.match_token(TokenKind::Colon) {
                label = Some(match self.peek().kind {
                    TokenKind::Ident | TokenKind::Integer => self.advance().text.to_string(),
                    _ => return Err(self.err(ParseErrorKind::ExpectedType)),
                });
            }
            if self.match_token(TokenKind::Star) {
                var_length = Some(self.parse_var_length()?);
            }
            if self.check(TokenKind::LBrace) {
                props = Some(self.parse_map_literal()?);
            }
            if !self.match_token(TokenKind::RBracket) {
                return Err(self.err(ParseErrorKind::ExpectedRBrack));
            }
        }

        if !self.match_token(TokenKind::Minus) {
            return Err(self.err(ParseErrorKind::ExpectedMinus));
        }
        let right_end = self.match_token(TokenKind::Gt);

        let direction = match (left_start, right_end) {
            (true, false) => RelDirection::Left,
            (false, true) => RelDirection::Right,
            _ => RelDirection::Undirected,
        };
        Ok(RelPattern {
            variable,
            label,
            direction,
            props,
            var_length,
        })
    }

    fn parse_var_length(&mut self) -> Result<VarLength, ParseError> {
        let min = if self.check(TokenKind::Integer) {
            Some(self.parse_u32()?)
        } else {
            None
        };
        if self.match_token(TokenKind::Dot) {
            if !self.match_token(TokenKind::Dot) {
                return Err(self.err(ParseErrorKind::ExpectedDot));
            }
            let max = if self.check(TokenKind::Integer) {
                Some(self.parse_u32()?)
            } else {
                None
            };
            return Ok(VarLength { min, max });
        }
        // Bare `*n` means exactly n hops; bare `*` is unbounded.
        Ok(VarLength { min, max: min })
    }

    fn parse_map_literal(&mut self) -> Result<MapLiteral, ParseError> {
        if !self.match_token(TokenKind::LBrace) {
            return Err(self.err(ParseErrorKind::ExpectedLBrace));
        }
        let mut entries = Vec::new();
        while !self.check(TokenKind::RBrace) {
            let key = self.parse_key(ParseErrorKind::ExpectedMapKey)?;
            if !self.match_token(TokenKind::Colon) {
                return Err(self.err(ParseErrorKind::ExpectedColon));
            }
            entries.push((key, self.parse_expr(0)?));
            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }
        if !self.match_token(TokenKind::RBrace) {
            return Err(self.err(ParseErrorKind::ExpectedRBrace));
        }
        Ok(MapLiteral { entries })
    }

    fn parse_set(&mut self) -> Result<SetClause, ParseError> {
        let mut items = Vec::new();
        loop {
            let target = self.parse_prop_selector()?;
            if !self.match_token(TokenKind::Eq) {
                return Err(self.err(ParseErrorKind::ExpectedEq));
            }
            items.push(SetItem {
                target,
                value: self.parse_expr(0)?,
            });
            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }
        Ok(SetClause { items })
    }

    fn parse_delete(&mut self) -> Result<DeleteClause, ParseError> {
        let detach = self.match_kw(Keyword::Detach);
        if !self.match_kw(Keyword::Delete) {
            return Err(self.err(ParseErrorKind::ExpectedKeyword));
        }
        let mut targets = vec![self.parse_expr(0)?];
        while self.match_token(TokenKind::Comma) {
            targets.push(self.parse_expr(0)?);
        }
        Ok(DeleteClause { detach, targets })
    }

    fn parse_unwind(&mut self) -> Result<UnwindClause, ParseError> {
        let expr = self.parse_expr(0)?;
        if !self.match_kw(Keyword::As) {
            return Err(self.err(ParseErrorKind::ExpectedKeyword));
        }
        if !self.check(TokenKind::Ident) {
            return Err(self.err(ParseErrorKind::ExpectedIdentifier));
        }
        let alias = self.advance().text.to_string();
        Ok(UnwindClause { expr, alias })
    }

    fn parse_remove(&mut self) -> Result<RemoveClause, ParseError> {
        let mut items = vec![self.parse_prop_selector()?];
        while self.match_token(TokenKind::Comma) {
            items.push(self.parse_prop_selector()?);
        }
        Ok(RemoveClause { items })
    }

    fn parse_prop_selector(&mut self) -> Result<PropSelector, ParseError> {
        if !self.check(TokenKind::Ident) {
            return Err(self.err(ParseErrorKind::ExpectedIdentifier));
        }
        let variable = self.advance().text.to_string();
        if !self.match_token(TokenKind::Dot) {
            return Err(self.err(ParseErrorKind::ExpectedDot));
        }
        let key = self.parse_key(ParseErrorKind::ExpectedPropertyKey)?;
        Ok(PropSelector { variable, key })
    }

    fn parse_using(&mut self) -> Result<UsingClause, ParseError> {
        if !self.check(TokenKind::Ident) {
            return Err(self.err(ParseErrorKind::ExpectedKeyword));
        }
        let text = self.advance().text;
        let hint = if text.eq_ignore_ascii_case("BFS") {
            TraversalHint::Bfs
        } else if text.eq_ignore_ascii_case("DFS") {
            TraversalHint::Dfs
        } else if text.eq_ignore_ascii_case("DIJKSTRA") {
            TraversalHint::Dijkstra
        } else if text.eq_ignore_ascii_case("PAGERANK") {
            TraversalHint::PageRank
        } else if text.eq_ignore_ascii_case("CENTRALITY") {
            TraversalHint::Centrality
        } else {
            return Err(self.err(ParseErrorKind::ExpectedKeyword));
        };
        Ok(UsingClause { hint })
    }

    fn parse_with(&mut self) -> Result<WithClause, ParseError> {
        let items = self.parse_projection_items()?;
        let where_clause = if self.match_kw(Keyword::Where) {
            Some(self.parse_expr(0)?)
        } else {
            None
        };
        Ok(WithClause {
            items,
            where_clause,
        })
    }

    fn parse_return(&mut self) -> Result<ReturnClause, ParseError> {
        let distinct = self.match_kw(Keyword::Distinct);
        let items = self.parse_projection_items()?;

        let mut order_by = Vec::new();
        if self.match_kw(Keyword::Order) {
            if !self.match_kw(Keyword::By) {
                return Err(self.err(ParseErrorKind::ExpectedKeyword));
            }
            loop {
                let expr = self.parse_expr(0)?;
                let descending = if self.match_kw(Keyword::Desc) {
                    true
                } else {
                    self.match_kw(Keyword::Asc);
                    false
                };
                order_by.push(SortItem { expr, descending });
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }

        let skip = if self.match_kw(Keyword::Skip) {
            Some(self.parse_u64()?)
        } else {
            None
        };
        let limit = if self.match_kw(Keyword::Limit) {
            Some(self.parse_u64()?)
        } else {
            None
        };

        Ok(ReturnClause {
            distinct,
            items,
            order_by,
            skip,
            limit,
        })
    }

    fn parse_projection_items(&mut self) -> Result<Vec<ProjectionItem>, ParseError> {
        let mut items = Vec::new();
        loop {
            let expr = self.parse_expr(0)?;
            let alias = if self.match_kw(Keyword::As) {
                if !self.check(TokenKind::Ident) {
                    return Err(self.err(ParseErrorKind::ExpectedIdentifier));
                }
                Some(self.advance().text.to_string())
            } else {
                None
            };
            items.push(ProjectionItem { expr, alias });
            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }
        Ok(items)
    }

    fn parse_expr(&mut self, min_bp: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_prefix()?;

        // Postfix null predicates bind tighter than any infix operator.
        while self.match_kw(Keyword::Is) {
            let op = if self.match_kw(Keyword::Not) {
                UnaryOp::IsNotNull
            } else {
                UnaryOp::IsNull
            };
            if !self.match_kw(Keyword::Null) {
                return Err(self.err(ParseErrorKind::ExpectedKeyword));
            }
            lhs = Expr::Unary(Box::new(UnaryExpr { op, operand: lhs }));
        }

        loop {
            let Some((op, lbp, extra_tokens)) = self.peek_infix() else {
                break;
            };
            if lbp < min_bp {
                break;
            }
            self.advance();
            for _ in 0..extra_tokens {
                self.advance();
            }
            let rhs = self.parse_expr(lbp + 1)?;
            lhs = Expr::Binary(Box::new(BinaryExpr { left: lhs, op, right: rhs }));
        }

        Ok(lhs)
    }

    /// Returns (operator, left binding power, extra tokens to consume).
    fn peek_infix(&self) -> Option<(BinaryOp, u8, usize)> {
        match self.peek().kind {
            TokenKind::Keyword(Keyword::Or) => Some((BinaryOp::Or, Self::BP_OR, 0)),
            TokenKind::Keyword(Keyword::And) => Some((BinaryOp::And, Self::BP_AND, 0)),
            TokenKind::Keyword(Keyword::In) => Some((BinaryOp::In, Self::BP_CMP, 0)),
            TokenKind::Eq => Some((BinaryOp::Eq, Self::BP_CMP, 0)),
            TokenKind::Lt => match self.peek_next().kind {
                TokenKind::Eq => Some((BinaryOp::Le, Self::BP_CMP, 1)),
                TokenKind::Gt => Some((BinaryOp::Ne, Self::BP_CMP, 1)),
                _ => Some((BinaryOp::Lt, Self::BP_CMP, 0)),
            },
            TokenKind::Gt => match self.peek_next().kind {
                TokenKind::Eq => Some((BinaryOp::Ge, Self::BP_CMP, 1)),
                _ => Some((BinaryOp::Gt, Self::BP_CMP, 0)),
            },
            TokenKind::Plus => Some((BinaryOp::Add, Self::BP_ADD, 0)),
            TokenKind::Minus => Some((BinaryOp::Sub, Self::BP_ADD, 0)),
            TokenKind::Star => Some((BinaryOp::Mul, Self::BP_MUL, 0)),
            TokenKind::Slash => Some((BinaryOp::Div, Self::BP_MUL, 0)),
            TokenKind::Percent => Some((BinaryOp::Mod, Self::BP_MUL, 0)),
            _ => None,
        }
    }

    fn parse_prefix(&mut self) -> Result<Expr, ParseError> {
        if self.match_kw(Keyword::Not) {
            let operand = self.parse_expr(Self::BP_NOT)?;
            return Ok(Expr::Unary(Box::new(UnaryExpr {
                op: UnaryOp::Not,
                operand,
            })));
        }
        if self.match_token(TokenKind::Minus) {
            let operand = self.parse_expr(Self::BP_PREFIX)?;
            return Ok(Expr::Unary(Box::new(UnaryExpr {
                op: UnaryOp::Neg,
                operand,
            })));
        }
        if self.match_token(TokenKind::Plus) {
            return self.parse_expr(Self::BP_PREFIX);
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.peek().kind {
            TokenKind::Integer => {
                let text = self.advance().text;
                let value = text
                    .parse::<i64>()
                    .map_err(|_| self.err(ParseErrorKind::ExpectedInteger))?;
                Ok(Expr::Literal(Literal::Int(value)))
            }
            TokenKind::Float => {
                let text = self.advance().text;
                let value = text
                    .parse::<f64>()
                    .map_err(|_| self.err(ParseErrorKind::UnexpectedExpr))?;
                Ok(Expr::Literal(Literal::Float(value)))
            }
            TokenKind::Str => {
                let text = self.advance().text;
                Ok(Expr::Literal(Literal::Str(lexer::unescape_string(text))))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(Expr::Literal(Literal::Bool(true)))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(Expr::Literal(Literal::Bool(false)))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.advance();
                Ok(Expr::Literal(Literal::Null))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr(0)?;
                if !self.match_token(TokenKind::RParen) {
                    return Err(self.err(ParseErrorKind::ExpectedRParen));
                }
                Ok(expr)
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                while !self.check(TokenKind::RBracket) {
                    items.push(self.parse_expr(0)?);
                    if !self.match_token(TokenKind::Comma) {
                        break;
                    }
                }
                if !self.match_token(TokenKind::RBracket) {
                    return Err(self.err(ParseErrorKind::ExpectedRBrack));
                }
                Ok(Expr::List(items))
            }
            TokenKind::LBrace => Ok(Expr::Map(self.parse_map_literal()?)),
            TokenKind::Ident => {
                let name = self.advance().text.to_string();
                if self.check(TokenKind::LParen) {
                    let args = self.parse_fn_args()?;
                    return Ok(Expr::FnCall(FnCall { name, args }));
                }
                if self.check(TokenKind::Dot) {
                    let mut keys = Vec::new();
                    while self.match_token(TokenKind::Dot) {
                        keys.push(self.parse_key(ParseErrorKind::ExpectedPropertyKey)?);
                    }
                    return Ok(Expr::Property { base: name, keys });
                }
                Ok(Expr::Ident(name))
            }
            _ => Err(self.err(ParseErrorKind::UnexpectedExpr)),
        }
    }

    fn parse_fn_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.advance(); // '('
        if self.match_token(TokenKind::RParen) {
            return Ok(Vec::new());
        }
        // count(*)
        if self.check(TokenKind::Star) && self.peek_next().kind == TokenKind::RParen {
            self.advance();
            self.advance();
            return Ok(vec![Expr::Star]);
        }
        let mut args = vec![self.parse_expr(0)?];
        while self.match_token(TokenKind::Comma) {
            args.push(self.parse_expr(0)?);
        }
        if !self.match_token(TokenKind::RParen) {
            return Err(self.err(ParseErrorKind::ExpectedRParen));
        }
        Ok(args)
    }

    fn parse_key(&mut self, kind: ParseErrorKind) -> Result<String, ParseError> {
        match self.peek().kind {
            TokenKind::Ident | TokenKind::Keyword(_) => Ok(self.advance().text.to_string()),
            TokenKind::Str => {
                let text = self.advance().text;
                Ok(lexer::unescape_string(text))
            }
            _ => Err(self.err(kind)),
        }
    }

    fn parse_u32(&mut self) -> Result<u32, ParseError> {
        if !self.check(TokenKind::Integer) {
            return Err(self.err(ParseErrorKind::ExpectedInteger));
        }
        self.advance()
            .text
            .parse::<u32>()
            .map_err(|_| self.err(ParseErrorKind::ExpectedInteger))
    }

    fn parse_u64(&mut self) -> Result<u64, ParseError> {
        if !self.check(TokenKind::Integer) {
            return Err(self.err(ParseErrorKind::ExpectedInteger));
        }
        self.advance()
            .text
            .parse::<u64>()
            .map_err(|_| self.err(ParseErrorKind::ExpectedInteger))
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn check_kw(&self, kw: Keyword) -> bool {
        self.peek().kind == TokenKind::Keyword(kw)
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_kw(&mut self, kw: Keyword) -> bool {
        if self.check_kw(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn peek(&self) -> &Token<'a> {
        &self.tokens[self.position]
    }

    fn peek_next(&self) -> &Token<'a> {
        &self.tokens[(self.position + 1).min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> &Token<'a> {
        if self.peek().kind != TokenKind::Eof {
            self.position += 1;
        }
        &self.tokens[self.position - 1]
    }

    fn err(&self, kind: ParseErrorKind) -> ParseError {
        let token = self.peek();
        ParseError {
            kind,
            line: token.line,
            column: token.column,
            found: token.text.to_string(),
        }
    }
}
