//! Recursive-descent lexer and parser for the `expr` grammar (spec §4.4
//! EBNF). Grounded on the teacher's `expression::parser` (same hand-rolled
//! `Lexer`/`Parser`/precedence-climbing structure), replaced end to end: the
//! teacher's JS-flavored grammar (method calls, ternaries, index access,
//! object/array literals) is gone — the spec's grammar is smaller
//! (`pipe`/`binary`/`comparison`/`arith`/`term`/`factor`/`variable`) and adds
//! pipe filters, which the teacher's grammar never had.

use super::ExpressionError;

/// A single step in a variable path: `.field` or `[key]` (spec §4.4 `key =
/// string | integer | ":" ident`).
#[derive(Debug, Clone, PartialEq)]
pub enum PathSegment {
    Field(String),
    Index(Box<Expr>),
}

/// A variable reference: `$root.a.b` or `root.a.b` (spec §4.4 `variable`).
/// A `$`-prefixed root resolves against the execution context (`$input`,
/// `$nodes`, `$variables`, `$execution`); a bare root resolves against
/// `for`-loop bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct VariablePath {
    pub root: String,
    pub dollar: bool,
    pub path: Vec<PathSegment>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// One `| ident(args?)` pipe stage (spec §4.4 `pipe`).
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCall {
    pub name: String,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Variable(VariablePath),
    Call { name: String, args: Vec<Expr> },
    Binary {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    /// `base | filter1 | filter2(args)`; `filters` is never empty —
    /// `pipe` collapses to its `binary` when there are no `|` stages.
    Pipe { base: Box<Expr>, filters: Vec<FilterCall> },
}

/// One piece of a parsed `template` (spec §4.4 grammar's top production).
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateNode {
    Text(String),
    Expr(Expr),
    If { cond: Expr, body: Vec<TemplateNode> },
    For {
        ident: String,
        iterable: Expr,
        body: Vec<TemplateNode>,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Null,
    True,
    False,
    Number(f64),
    String(String),
    Ident(String),
    Dollar,
    Plus,
    Minus,
    Star,
    Slash,
    Pipe,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Dot,
    Comma,
    Colon,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Eof,
}

struct Lexer<'a> {
    input: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
            pos: 0,
        }
    }

    fn next_token(&mut self) -> Result<Token, ExpressionError> {
        self.skip_whitespace();
        let Some(&(pos, ch)) = self.chars.peek() else {
            return Ok(Token::Eof);
        };
        self.pos = pos;

        match ch {
            '+' => self.single(Token::Plus),
            '-' => self.single(Token::Minus),
            '*' => self.single(Token::Star),
            '/' => self.single(Token::Slash),
            '|' => {
                self.chars.next();
                if self.eat('|') {
                    Ok(Token::Or)
                } else {
                    Ok(Token::Pipe)
                }
            }
            '.' => self.single(Token::Dot),
            ',' => self.single(Token::Comma),
            ':' => self.single(Token::Colon),
            '(' => self.single(Token::LParen),
            ')' => self.single(Token::RParen),
            '[' => self.single(Token::LBracket),
            ']' => self.single(Token::RBracket),
            '$' => self.single(Token::Dollar),
            '=' => {
                self.chars.next();
                if self.eat('=') {
                    Ok(Token::Eq)
                } else {
                    Err(ExpressionError::ParseError("expected '=='".into()))
                }
            }
            '!' => {
                self.chars.next();
                if self.eat('=') {
                    Ok(Token::Ne)
                } else {
                    Err(ExpressionError::ParseError("expected '!='".into()))
                }
            }
            '<' => {
                self.chars.next();
                Ok(if self.eat('=') { Token::Le } else { Token::Lt })
            }
            '>' => {
                self.chars.next();
                Ok(if self.eat('=') { Token::Ge } else { Token::Gt })
            }
            '&' => {
                self.chars.next();
                if self.eat('&') {
                    Ok(Token::And)
                } else {
                    Err(ExpressionError::ParseError("expected '&&'".into()))
                }
            }
            '"' | '\'' => self.read_string(),
            '0'..='9' => self.read_number(),
            'a'..='z' | 'A'..='Z' | '_' => self.read_ident(),
            _ => Err(ExpressionError::ParseError(format!("unexpected character: '{ch}'"))),
        }
    }

    fn single(&mut self, tok: Token) -> Result<Token, ExpressionError> {
        self.chars.next();
        Ok(tok)
    }

    fn eat(&mut self, c: char) -> bool {
        if self.chars.peek().map(|&(_, ch)| ch) == Some(c) {
            self.chars.next();
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(&(_, ch)) = self.chars.peek() {
            if ch.is_whitespace() {
                self.chars.next();
            } else {
                break;
            }
        }
    }

    fn read_string(&mut self) -> Result<Token, ExpressionError> {
        let quote = self.chars.next().unwrap().1;
        let mut s = String::new();
        loop {
            match self.chars.next() {
                Some((_, ch)) if ch == quote => break,
                Some((_, '\\')) => match self.chars.next() {
                    Some((_, 'n')) => s.push('\n'),
                    Some((_, 't')) => s.push('\t'),
                    Some((_, c)) => s.push(c),
                    None => return Err(ExpressionError::ParseError("unterminated string".into())),
                },
                Some((_, ch)) => s.push(ch),
                None => return Err(ExpressionError::ParseError("unterminated string".into())),
            }
        }
        Ok(Token::String(s))
    }

    fn read_number(&mut self) -> Result<Token, ExpressionError> {
        let start = self.pos;
        let mut end = start;
        while let Some(&(pos, ch)) = self.chars.peek() {
            if ch.is_ascii_digit() || ch == '.' {
                end = pos + ch.len_utf8();
                self.chars.next();
            } else {
                break;
            }
        }
        let text = &self.input[start..end];
        text.parse()
            .map(Token::Number)
            .map_err(|_| ExpressionError::ParseError(format!("invalid number: {text}")))
    }

    fn read_ident(&mut self) -> Result<Token, ExpressionError> {
        let start = self.pos;
        let mut end = start;
        while let Some(&(pos, ch)) = self.chars.peek() {
            if ch.is_alphanumeric() || ch == '_' {
                end = pos + ch.len_utf8();
                self.chars.next();
            } else {
                break;
            }
        }
        let ident = &self.input[start..end];
        Ok(match ident {
            "null" | "nil" => Token::Null,
            "true" => Token::True,
            "false" => Token::False,
            _ => Token::Ident(ident.to_string()),
        })
    }
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Result<Self, ExpressionError> {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token()?;
        Ok(Self { lexer, current })
    }

    fn advance(&mut self) -> Result<Token, ExpressionError> {
        let next = self.lexer.next_token()?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn expect(&mut self, tok: Token) -> Result<(), ExpressionError> {
        if self.current == tok {
            self.advance()?;
            Ok(())
        } else {
            Err(ExpressionError::ParseError(format!(
                "expected {tok:?}, got {:?}",
                self.current
            )))
        }
    }

    pub fn parse_expr(&mut self) -> Result<Expr, ExpressionError> {
        self.parse_pipe()
    }

    fn parse_pipe(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.parse_binary()?;
        let mut filters = Vec::new();
        while self.current == Token::Pipe {
            self.advance()?;
            let name = match self.advance()? {
                Token::Ident(name) => name,
                other => {
                    return Err(ExpressionError::ParseError(format!(
                        "expected filter name after '|', got {other:?}"
                    )))
                }
            };
            let args = if self.current == Token::LParen {
                self.advance()?;
                let args = self.parse_args()?;
                self.expect(Token::RParen)?;
                args
            } else {
                Vec::new()
            };
            filters.push(FilterCall { name, args });
        }
        if filters.is_empty() {
            Ok(base)
        } else {
            Ok(Expr::Pipe {
                base: Box::new(base),
                filters,
            })
        }
    }

    fn parse_binary(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = match &self.current {
                Token::And => BinaryOperator::And,
                Token::Or => BinaryOperator::Or,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_comparison()?;
            left = Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_arith()?;
        loop {
            let op = match &self.current {
                Token::Eq => BinaryOperator::Eq,
                Token::Ne => BinaryOperator::Ne,
                Token::Ge => BinaryOperator::Ge,
                Token::Le => BinaryOperator::Le,
                Token::Gt => BinaryOperator::Gt,
                Token::Lt => BinaryOperator::Lt,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_arith()?;
            left = Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_arith(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match &self.current {
                Token::Plus => BinaryOperator::Add,
                Token::Minus => BinaryOperator::Sub,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_term()?;
            left = Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match &self.current {
                Token::Star => BinaryOperator::Mul,
                Token::Slash => BinaryOperator::Div,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_factor()?;
            left = Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Expr, ExpressionError> {
        match self.current.clone() {
            Token::Null => {
                self.advance()?;
                Ok(Expr::Literal(Literal::Null))
            }
            Token::True => {
                self.advance()?;
                Ok(Expr::Literal(Literal::Bool(true)))
            }
            Token::False => {
                self.advance()?;
                Ok(Expr::Literal(Literal::Bool(false)))
            }
            Token::Number(n) => {
                self.advance()?;
                Ok(Expr::Literal(Literal::Number(n)))
            }
            Token::String(s) => {
                self.advance()?;
                Ok(Expr::Literal(Literal::String(s)))
            }
            Token::LParen => {
                self.advance()?;
                let expr = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Token::Dollar => self.parse_variable(),
            Token::Ident(name) => {
                self.advance()?;
                if self.current == Token::LParen {
                    self.advance()?;
                    let args = self.parse_args()?;
                    self.expect(Token::RParen)?;
                    Ok(Expr::Call { name, args })
                } else {
                    self.parse_variable_tail(name, false)
                }
            }
            other => Err(ExpressionError::ParseError(format!("unexpected token: {other:?}"))),
        }
    }

    fn parse_variable(&mut self) -> Result<Expr, ExpressionError> {
        self.advance()?; // consume '$'
        let root = match self.advance()? {
            Token::Ident(name) => name,
            other => {
                return Err(ExpressionError::ParseError(format!(
                    "expected identifier after '$', got {other:?}"
                )))
            }
        };
        self.parse_variable_tail(root, true)
    }

    fn parse_variable_tail(&mut self, root: String, dollar: bool) -> Result<Expr, ExpressionError> {
        let mut path = Vec::new();
        loop {
            match self.current {
                Token::Dot => {
                    self.advance()?;
                    match self.advance()? {
                        Token::Ident(field) => path.push(PathSegment::Field(field)),
                        other => {
                            return Err(ExpressionError::ParseError(format!(
                                "expected field after '.', got {other:?}"
                            )))
                        }
                    }
                }
                Token::LBracket => {
                    self.advance()?;
                    let key = self.parse_key()?;
                    self.expect(Token::RBracket)?;
                    path.push(PathSegment::Index(Box::new(key)));
                }
                _ => break,
            }
        }
        Ok(Expr::Variable(VariablePath { root, dollar, path }))
    }

    /// `key = string | integer | ":" ident` (spec §4.4).
    fn parse_key(&mut self) -> Result<Expr, ExpressionError> {
        match self.advance()? {
            Token::String(s) => Ok(Expr::Literal(Literal::String(s))),
            Token::Number(n) => Ok(Expr::Literal(Literal::Number(n))),
            Token::Colon => match self.advance()? {
                Token::Ident(name) => Ok(Expr::Literal(Literal::String(name))),
                other => Err(ExpressionError::ParseError(format!(
                    "expected identifier after ':', got {other:?}"
                ))),
            },
            other => Err(ExpressionError::ParseError(format!("invalid index key: {other:?}"))),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, ExpressionError> {
        let mut args = Vec::new();
        if self.current != Token::RParen {
            args.push(self.parse_expr()?);
            while self.current == Token::Comma {
                self.advance()?;
                args.push(self.parse_expr()?);
            }
        }
        Ok(args)
    }

    fn finish(&mut self) -> Result<(), ExpressionError> {
        if self.current == Token::Eof {
            Ok(())
        } else {
            Err(ExpressionError::ParseError(format!(
                "unexpected trailing token: {:?}",
                self.current
            )))
        }
    }
}

/// Parse a bare `expr` (used for `{{ }}` bodies and `if`/`for` headers).
pub fn parse_expr(input: &str) -> Result<Expr, ExpressionError> {
    let mut parser = Parser::new(input)?;
    let expr = parser.parse_expr()?;
    parser.finish()?;
    Ok(expr)
}

/// Parse a full `template` (spec §4.4 grammar), producing a tree of
/// `TemplateNode`s that can be cached and re-rendered against many contexts
/// without re-parsing.
pub fn parse_template(input: &str) -> Result<Vec<TemplateNode>, ExpressionError> {
    let mut scanner = TemplateScanner { input, pos: 0 };
    scanner.parse_block(&[])
}

struct TemplateScanner<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> TemplateScanner<'a> {
    fn parse_block(&mut self, stop_on: &[&str]) -> Result<Vec<TemplateNode>, ExpressionError> {
        let mut nodes = Vec::new();
        loop {
            let rest = &self.input[self.pos..];
            if rest.is_empty() {
                if !stop_on.is_empty() {
                    return Err(ExpressionError::ParseError(format!(
                        "unclosed block, expected one of {stop_on:?}"
                    )));
                }
                return Ok(nodes);
            }

            let next_expr = rest.find("{{");
            let next_tag = rest.find("{%");
            let next = match (next_expr, next_tag) {
                (Some(e), Some(t)) => Some(e.min(t)),
                (Some(e), None) => Some(e),
                (None, Some(t)) => Some(t),
                (None, None) => None,
            };

            let Some(next) = next else {
                nodes.push(TemplateNode::Text(rest.to_string()));
                self.pos += rest.len();
                continue;
            };

            if next > 0 {
                nodes.push(TemplateNode::Text(rest[..next].to_string()));
                self.pos += next;
            }

            if self.input[self.pos..].starts_with("{{") {
                let expr_src = self.take_until("}}")?;
                let expr = parse_expr(expr_src.trim())?;
                nodes.push(TemplateNode::Expr(expr));
                continue;
            }

            let tag_src = self.take_until("%}")?;
            let tag_src = tag_src.trim();
            if let Some(cond_src) = tag_src.strip_prefix("if").map(str::trim_start) {
                let cond = parse_expr(cond_src)?;
                let body = self.parse_block(&["endif"])?;
                self.expect_close_tag()?;
                nodes.push(TemplateNode::If { cond, body });
            } else if let Some(header) = tag_src.strip_prefix("for").map(str::trim_start) {
                let (ident, iterable_src) = header
                    .split_once(" in ")
                    .ok_or_else(|| ExpressionError::ParseError("expected 'for x in expr'".to_string()))?;
                let ident = ident.trim().to_string();
                let iterable = parse_expr(iterable_src.trim())?;
                let body = self.parse_block(&["endfor"])?;
                self.expect_close_tag()?;
                nodes.push(TemplateNode::For { ident, iterable, body });
            } else if tag_src == "endif" {
                if stop_on.contains(&"endif") {
                    return Ok(nodes);
                }
                return Err(ExpressionError::ParseError("unexpected 'endif'".to_string()));
            } else if tag_src == "endfor" {
                if stop_on.contains(&"endfor") {
                    return Ok(nodes);
                }
                return Err(ExpressionError::ParseError("unexpected 'endfor'".to_string()));
            } else {
                return Err(ExpressionError::ParseError(format!("unknown control tag: '{tag_src}'")));
            }
        }
    }

    /// Consumes the `{% endif %}`/`{% endfor %}` tag that `parse_block` just
    /// recognized but left unconsumed (it peeks the tag name before deciding
    /// whether to return).
    fn expect_close_tag(&mut self) -> Result<(), ExpressionError> {
        let rest = &self.input[self.pos..];
        let close = rest
            .find("%}")
            .ok_or_else(|| ExpressionError::ParseError("expected closing '%}'".to_string()))?;
        self.pos += close + 2;
        Ok(())
    }

    fn take_until(&mut self, close: &str) -> Result<&'a str, ExpressionError> {
        let rest = &self.input[self.pos..];
        debug_assert!(rest.starts_with("{{") || rest.starts_with("{%"));
        let body_start = self.pos + 2;
        let end = self.input[body_start..]
            .find(close)
            .ok_or_else(|| ExpressionError::ParseError(format!("unclosed '{close}'")))?;
        let body = &self.input[body_start..body_start + end];
        self.pos = body_start + end + close.len();
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dollar_variable_path() {
        let expr = parse_expr("$input.main.age").unwrap();
        assert_eq!(
            expr,
            Expr::Variable(VariablePath {
                root: "input".to_string(),
                dollar: true,
                path: vec![PathSegment::Field("main".to_string()), PathSegment::Field("age".to_string())],
            })
        );
    }

    #[test]
    fn parses_pipe_filter_chain() {
        let expr = parse_expr("$input.name | upper_case | truncate(3)").unwrap();
        match expr {
            Expr::Pipe { filters, .. } => {
                assert_eq!(filters.len(), 2);
                assert_eq!(filters[0].name, "upper_case");
                assert_eq!(filters[1].name, "truncate");
            }
            other => panic!("expected Pipe, got {other:?}"),
        }
    }

    #[test]
    fn parses_comparison_and_precedence() {
        let expr = parse_expr("$input.age >= 18 && true").unwrap();
        assert!(matches!(expr, Expr::Binary { op: BinaryOperator::And, .. }));
    }

    #[test]
    fn parses_if_block() {
        let nodes = parse_template("{% if $input.ok %}yes{% endif %}").unwrap();
        assert!(matches!(nodes.as_slice(), [TemplateNode::If { .. }]));
    }

    #[test]
    fn parses_for_block() {
        let nodes = parse_template("{% for item in $input.list %}{{ item }}{% endfor %}").unwrap();
        match &nodes[..] {
            [TemplateNode::For { ident, body, .. }] => {
                assert_eq!(ident, "item");
                assert_eq!(body.len(), 1);
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn mixed_text_and_expression() {
        let nodes = parse_template("Hello {{ $input.name }}!").unwrap();
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0], TemplateNode::Text("Hello ".to_string()));
        assert_eq!(nodes[2], TemplateNode::Text("!".to_string()));
    }
}
