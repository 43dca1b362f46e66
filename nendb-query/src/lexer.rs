//! Zero-copy tokenizer for the Cypher subset.
//!
//! Lexemes are slices of the input buffer; tokens never outlive it.
//! Keywords are matched case-insensitively. Whitespace and `//` line
//! comments are skipped. An unterminated string or an unrecognized
//! character yields a single `Invalid` token.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Match,
    Optional,
    Return,
    With,
    Where,
    Create,
    Merge,
    Set,
    Delete,
    Detach,
    As,
    Asc,
    Desc,
    Remove,
    Unwind,
    Order,
    By,
    Skip,
    Limit,
    Using,
    And,
    Or,
    Not,
    Distinct,
    In,
    Is,
    Null,
    True,
    False,
}

fn keyword_for(text: &str) -> Option<Keyword> {
    const TABLE: &[(&str, Keyword)] = &[
        ("MATCH", Keyword::Match),
        ("OPTIONAL", Keyword::Optional),
        ("RETURN", Keyword::Return),
        ("WITH", Keyword::With),
        ("WHERE", Keyword::Where),
        ("CREATE", Keyword::Create),
        ("MERGE", Keyword::Merge),
        ("SET", Keyword::Set),
        ("DELETE", Keyword::Delete),
        ("DETACH", Keyword::Detach),
        ("AS", Keyword::As),
        ("ASC", Keyword::Asc),
        ("DESC", Keyword::Desc),
        ("REMOVE", Keyword::Remove),
        ("UNWIND", Keyword::Unwind),
        ("ORDER", Keyword::Order),
        ("BY", Keyword::By),
        ("SKIP", Keyword::Skip),
        ("LIMIT", Keyword::Limit),
        ("USING", Keyword::Using),
        ("AND", Keyword::And),
        ("OR", Keyword::Or),
        ("NOT", Keyword::Not),
        ("DISTINCT", Keyword::Distinct),
        ("IN", Keyword::In),
        ("IS", Keyword::Is),
        ("NULL", Keyword::Null),
        ("TRUE", Keyword::True),
        ("FALSE", Keyword::False),
    ];
    TABLE
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(text))
        .map(|(_, kw)| *kw)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Colon,
    Comma,
    Dot,
    Minus,
    Gt,
    Lt,
    Eq,
    Star,
    Plus,
    Slash,
    Percent,
    Pipe,
    Integer,
    Float,
    Str,
    Ident,
    Keyword(Keyword),
    Eof,
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub line: u32,
    pub column: u32,
}

pub fn tokenize(input: &str) -> Vec<Token<'_>> {
    Lexer::new(input).run()
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn run(mut self) -> Vec<Token<'a>> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia();
            let (line, column) = (self.line, self.column);
            let start = self.pos;
            let Some(c) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    text: "",
                    line,
                    column,
                });
                return tokens;
            };

            let kind = match c {
                '(' => self.single(TokenKind::LParen),
                ')' => self.single(TokenKind::RParen),
                '[' => self.single(TokenKind::LBracket),
                ']' => self.single(TokenKind::RBracket),
                '{' => self.single(TokenKind::LBrace),
                '}' => self.single(TokenKind::RBrace),
                ':' => self.single(TokenKind::Colon),
                ',' => self.single(TokenKind::Comma),
                '.' => self.single(TokenKind::Dot),
                '-' => self.single(TokenKind::Minus),
                '>' => self.single(TokenKind::Gt),
                '<' => self.single(TokenKind::Lt),
                '=' => self.single(TokenKind::Eq),
                '*' => self.single(TokenKind::Star),
                '+' => self.single(TokenKind::Plus),
                '/' => self.single(TokenKind::Slash),
                '%' => self.single(TokenKind::Percent),
                '|' => self.single(TokenKind::Pipe),
                '\'' | '"' => self.string(c),
                '0'..='9' => self.number(),
                c if c == '_' || c.is_alphabetic() => self.ident(),
                _ => {
                    self.advance();
                    TokenKind::Invalid
                }
            };

            let text = &self.src[start..self.pos];
            let kind = match kind {
                TokenKind::Ident => keyword_for(text)
                    .map(TokenKind::Keyword)
                    .unwrap_or(TokenKind::Ident),
                other => other,
            };
            tokens.push(Token {
                kind,
                text,
                line,
                column,
            });
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek_second() == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => return,
            }
        }
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        kind
    }

    fn string(&mut self, quote: char) -> TokenKind {
        self.advance(); // opening quote
        loop {
            match self.peek() {
                None => return TokenKind::Invalid,
                Some('\\') => {
                    self.advance();
                    if self.peek().is_none() {
                        return TokenKind::Invalid;
                    }
                    self.advance();
                }
                Some(c) if c == quote => {
                    self.advance();
                    return TokenKind::Str;
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
    }

    fn number(&mut self) -> TokenKind {
        while matches!(self.peek(), Some('0'..='9')) {
            self.advance();
        }
        // A dot only makes this a float when a digit follows; `1..3` keeps
        // the range dots for the parser.
        if self.peek() == Some('.') && matches!(self.peek_second(), Some('0'..='9')) {
            self.advance();
            while matches!(self.peek(), Some('0'..='9')) {
                self.advance();
            }
            return TokenKind::Float;
        }
        TokenKind::Integer
    }

    fn ident(&mut self) -> TokenKind {
        while let Some(c) = self.peek() {
            if c == '_' || c.is_alphanumeric() {
                self.advance();
            } else {
                break;
            }
        }
        TokenKind::Ident
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.src[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }
}

/// Decodes the payload of a `Str` token: strips the quotes and resolves
/// backslash escapes.
pub fn unescape_string(text: &str) -> String {
    let inner = &text[1..text.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn punctuation_and_eof() {
        assert_eq!(
            kinds("( ) [ ] { } : , . - > < = * + / % |"),
            vec![
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::LBracket,
                TokenKind::RBracket,
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::Colon,
                TokenKind::Comma,
                TokenKind::Dot,
                TokenKind::Minus,
                TokenKind::Gt,
                TokenKind::Lt,
                TokenKind::Eq,
                TokenKind::Star,
                TokenKind::Plus,
                TokenKind::Slash,
                TokenKind::Percent,
                TokenKind::Pipe,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let tokens = tokenize("match MATCH Match oPtIoNaL");
        assert!(
            tokens[..3]
                .iter()
                .all(|t| t.kind == TokenKind::Keyword(Keyword::Match))
        );
        assert_eq!(tokens[3].kind, TokenKind::Keyword(Keyword::Optional));
    }

    #[test]
    fn identifiers_keep_their_lexeme() {
        let tokens = tokenize("matcher _x foo_bar");
        assert_eq!(tokens[0].kind, TokenKind::Ident);
        assert_eq!(tokens[0].text, "matcher");
        assert_eq!(tokens[1].text, "_x");
        assert_eq!(tokens[2].text, "foo_bar");
    }

    #[test]
    fn numbers_integer_and_float() {
        let tokens = tokenize("42 3.25 7");
        assert_eq!(tokens[0].kind, TokenKind::Integer);
        assert_eq!(tokens[1].kind, TokenKind::Float);
        assert_eq!(tokens[1].text, "3.25");
        assert_eq!(tokens[2].kind, TokenKind::Integer);
    }

    #[test]
    fn range_dots_do_not_eat_into_float() {
        let tokens = tokenize("1..3");
        assert_eq!(
            tokens.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![
                TokenKind::Integer,
                TokenKind::Dot,
                TokenKind::Dot,
                TokenKind::Integer,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn strings_single_and_double_quoted() {
        let tokens = tokenize(r#"'abc' "d\'e""#);
        assert_eq!(tokens[0].kind, TokenKind::Str);
        assert_eq!(unescape_string(tokens[0].text), "abc");
        assert_eq!(tokens[1].kind, TokenKind::Str);
        assert_eq!(unescape_string(tokens[1].text), "d'e");
    }

    #[test]
    fn unterminated_string_is_one_invalid_token() {
        let tokens = tokenize("\"abc");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].kind, TokenKind::Invalid);
        assert_eq!(tokens[1].kind, TokenKind::Eof);
    }

    #[test]
    fn line_comments_are_skipped() {
        let tokens = tokenize("MATCH // the pattern\n (n)");
        assert_eq!(tokens[0].kind, TokenKind::Keyword(Keyword::Match));
        assert_eq!(tokens[1].kind, TokenKind::LParen);
        assert_eq!(tokens[1].line, 2);
    }

    #[test]
    fn unknown_character_is_invalid() {
        let tokens = tokenize("@");
        assert_eq!(tokens[0].kind, TokenKind::Invalid);
    }

    #[test]
    fn tracks_line_and_column() {
        let tokens = tokenize("MATCH\n  (n)");
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].column), (2, 3));
    }
}
