use std::ops::Range;

use thiserror::Error;

use crate::expression::{
    AssignOperator, BinaryOperator, Expr, Literal, LoopClause, Statement, UnaryOperator,
};

/// A syntax error inside a directive argument. The span is a byte range
/// into the argument text.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} (at offset {})", .span.start)]
pub struct ExpressionError {
    pub message: String,
    pub span: Range<usize>,
}

impl ExpressionError {
    fn new(message: impl Into<String>, span: Range<usize>) -> Self {
        ExpressionError {
            message: message.into(),
            span,
        }
    }
}

// ---------------------------------------------------------------------------
// Token types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    // Literals
    Number(f64),
    StringLit(String),
    True,
    False,
    Null,
    Undefined,

    Ident(String),

    // Declaration keywords
    Let,
    Var,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,          // =
    EqEq,        // ==
    EqEqEq,      // ===
    BangEq,      // !=
    BangEqEq,    // !==
    Gt,
    Lt,
    GtEq,
    LtEq,
    AmpAmp,      // &&
    PipePipe,    // ||
    Bang,        // !
    Question,    // ?
    Colon,       // :
    Comma,
    Dot,
    Semicolon,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PercentEq,
    PlusPlus,
    MinusMinus,

    // Grouping
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
}

pub(crate) type Spanned = (Token, Range<usize>);

/// Deepest expression tree the parser builds. Evaluation recurses once per
/// level, so deeper input is rejected here rather than at render time.
pub const MAX_EXPRESSION_DEPTH: usize = 100;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse a single expression; the whole input must be consumed.
pub fn parse_expression(source: &str) -> Result<Expr, ExpressionError> {
    let mut parser = ExprParser::new(tokenize(source)?, source.len());
    if parser.at_end() {
        return Err(parser.error("expected an expression"));
    }
    let expr = parser.parse_expr(0)?;
    parser.expect_end("unexpected tokens after expression")?;
    Ok(expr)
}

/// Parse `;`-separated statements. Empty statements are allowed.
pub fn parse_statements(source: &str) -> Result<Vec<Statement>, ExpressionError> {
    let mut parser = ExprParser::new(tokenize(source)?, source.len());
    let mut statements = Vec::new();
    while !parser.at_end() {
        if parser.eat(&Token::Semicolon) {
            continue;
        }
        statements.push(parser.parse_statement()?);
        if !parser.at_end() && !parser.eat(&Token::Semicolon) {
            return Err(parser.error("expected ';' between statements"));
        }
    }
    Ok(statements)
}

/// Parse the argument of a `for` directive.
pub fn parse_loop_clause(source: &str) -> Result<LoopClause, ExpressionError> {
    let tokens = tokenize(source)?;
    let counted = tokens.iter().any(|(t, _)| *t == Token::Semicolon);
    let mut parser = ExprParser::new(tokens, source.len());
    if parser.at_end() {
        return Err(parser.error("expected a loop clause"));
    }
    let clause = if counted {
        parser.parse_counted_clause()?
    } else {
        parser.parse_iteration_clause()?
    };
    parser.expect_end("unexpected tokens after loop clause")?;
    Ok(clause)
}

// ---------------------------------------------------------------------------
// Tokenizer: argument text → Token stream
// ---------------------------------------------------------------------------

pub(crate) fn tokenize(text: &str) -> Result<Vec<Spanned>, ExpressionError> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }

            // String literal
            '"' | '\'' => {
                let quote = c;
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '\\' => {
                            let Some((_, escaped)) = chars.next() else { break };
                            value.push(match escaped {
                                'n' => '\n',
                                't' => '\t',
                                'r' => '\r',
                                '0' => '\0',
                                other => other,
                            });
                        }
                        c if c == quote => {
                            closed = true;
                            break;
                        }
                        c => value.push(c),
                    }
                }
                let end = chars.peek().map(|&(i, _)| i).unwrap_or(text.len());
                if !closed {
                    return Err(ExpressionError::new("unterminated string literal", start..end));
                }
                tokens.push((Token::StringLit(value), start..end));
            }

            // Numbers
            '0'..='9' => {
                let mut end = start;
                let mut seen_dot = false;
                while let Some(&(i, c)) = chars.peek() {
                    if c.is_ascii_digit() {
                        chars.next();
                        end = i + 1;
                    } else if c == '.' && !seen_dot && text[i + 1..].starts_with(|d: char| d.is_ascii_digit()) {
                        seen_dot = true;
                        chars.next();
                        end = i + 1;
                    } else {
                        break;
                    }
                }
                let n: f64 = text[start..end]
                    .parse()
                    .map_err(|_| ExpressionError::new("invalid number literal", start..end))?;
                tokens.push((Token::Number(n), start..end));
            }

            // Identifiers and keywords
            c if c.is_ascii_alphabetic() || c == '_' || c == '$' => {
                let mut end = start;
                while let Some(&(i, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' || c == '$' {
                        chars.next();
                        end = i + 1;
                    } else {
                        break;
                    }
                }
                let token = match &text[start..end] {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    "undefined" => Token::Undefined,
                    "let" => Token::Let,
                    "var" => Token::Var,
                    ident => Token::Ident(ident.to_string()),
                };
                tokens.push((token, start..end));
            }

            _ => {
                chars.next();
                let rest = &text[start + c.len_utf8()..];
                let (token, extra) = match c {
                    '=' if rest.starts_with("==") => (Token::EqEqEq, 2),
                    '=' if rest.starts_with('=') => (Token::EqEq, 1),
                    '=' => (Token::Eq, 0),
                    '!' if rest.starts_with("==") => (Token::BangEqEq, 2),
                    '!' if rest.starts_with('=') => (Token::BangEq, 1),
                    '!' => (Token::Bang, 0),
                    '>' if rest.starts_with('=') => (Token::GtEq, 1),
                    '>' => (Token::Gt, 0),
                    '<' if rest.starts_with('=') => (Token::LtEq, 1),
                    '<' => (Token::Lt, 0),
                    '&' if rest.starts_with('&') => (Token::AmpAmp, 1),
                    '|' if rest.starts_with('|') => (Token::PipePipe, 1),
                    '+' if rest.starts_with('+') => (Token::PlusPlus, 1),
                    '+' if rest.starts_with('=') => (Token::PlusEq, 1),
                    '+' => (Token::Plus, 0),
                    '-' if rest.starts_with('-') => (Token::MinusMinus, 1),
                    '-' if rest.starts_with('=') => (Token::MinusEq, 1),
                    '-' => (Token::Minus, 0),
                    '*' if rest.starts_with('=') => (Token::StarEq, 1),
                    '*' => (Token::Star, 0),
                    '/' if rest.starts_with('=') => (Token::SlashEq, 1),
                    '/' => (Token::Slash, 0),
                    '%' if rest.starts_with('=') => (Token::PercentEq, 1),
                    '%' => (Token::Percent, 0),
                    '?' => (Token::Question, 0),
                    ':' => (Token::Colon, 0),
                    ',' => (Token::Comma, 0),
                    '.' => (Token::Dot, 0),
                    ';' => (Token::Semicolon, 0),
                    '(' => (Token::LParen, 0),
                    ')' => (Token::RParen, 0),
                    '[' => (Token::LBracket, 0),
                    ']' => (Token::RBracket, 0),
                    '{' => (Token::LBrace, 0),
                    '}' => (Token::RBrace, 0),
                    other => {
                        return Err(ExpressionError::new(
                            format!("unexpected character '{}'", other),
                            start..start + other.len_utf8(),
                        ));
                    }
                };
                // Every extra character of a compound operator is ASCII.
                for _ in 0..extra {
                    chars.next();
                }
                tokens.push((token, start..start + 1 + extra));
            }
        }
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Pratt parser
// ---------------------------------------------------------------------------

struct ExprParser {
    tokens: Vec<Spanned>,
    pos: usize,
    /// Length of the argument text, used for end-of-input spans.
    len: usize,
    /// Nesting of the node being parsed. Counts sub-expressions and every
    /// operator or postfix that wraps a left operand.
    depth: usize,
}

// Binding powers (precedence). Higher = tighter binding.
// Left bp, right bp. For left-assoc: right = left + 1. For right-assoc: right = left.
const BP_CONDITIONAL: u8 = 2; // ? :
const BP_OR: u8 = 4; // ||
const BP_AND: u8 = 6; // &&
const BP_EQUALITY: u8 = 8; // == != === !==
const BP_COMPARISON: u8 = 10; // < > <= >=
const BP_ADDITIVE: u8 = 12; // + -
const BP_MULTIPLICATIVE: u8 = 14; // * / %
const BP_UNARY: u8 = 16; // ! -

impl ExprParser {
    fn new(tokens: Vec<Spanned>, len: usize) -> Self {
        ExprParser {
            tokens,
            pos: 0,
            len,
            depth: 0,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|(t, _)| t)
    }

    fn advance(&mut self) -> Option<Spanned> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn current_span(&self) -> Range<usize> {
        match self.tokens.get(self.pos) {
            Some((_, span)) => span.clone(),
            None => self.len..self.len,
        }
    }

    fn error(&self, msg: impl Into<String>) -> ExpressionError {
        ExpressionError::new(msg, self.current_span())
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<(), ExpressionError> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(self.error(format!("expected {}", what)))
        }
    }

    fn deeper(&mut self) -> Result<(), ExpressionError> {
        self.depth += 1;
        if self.depth > MAX_EXPRESSION_DEPTH {
            return Err(self.error(format!(
                "expression nests deeper than {} levels",
                MAX_EXPRESSION_DEPTH
            )));
        }
        Ok(())
    }

    fn expect_end(&self, msg: &str) -> Result<(), ExpressionError> {
        if self.at_end() { Ok(()) } else { Err(self.error(msg)) }
    }

    fn expect_ident(&mut self) -> Result<String, ExpressionError> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error("expected identifier")),
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_statement(&mut self) -> Result<Statement, ExpressionError> {
        if matches!(self.peek(), Some(Token::Let | Token::Var)) {
            self.advance();
            let name = self.expect_ident()?;
            let value = if self.eat(&Token::Eq) {
                Some(self.parse_expr(0)?)
            } else {
                None
            };
            return Ok(Statement::Declare { name, value });
        }

        if let Some(Token::Ident(name)) = self.peek() {
            let name = name.clone();
            let operator = match self.peek_at(1) {
                Some(Token::Eq) => Some(AssignOperator::Set),
                Some(Token::PlusEq) => Some(AssignOperator::Add),
                Some(Token::MinusEq) => Some(AssignOperator::Subtract),
                Some(Token::StarEq) => Some(AssignOperator::Multiply),
                Some(Token::SlashEq) => Some(AssignOperator::Divide),
                Some(Token::PercentEq) => Some(AssignOperator::Modulo),
                _ => None,
            };
            if let Some(operator) = operator {
                self.pos += 2;
                let value = self.parse_expr(0)?;
                return Ok(Statement::Assign {
                    name,
                    operator,
                    value,
                });
            }
            let delta = match self.peek_at(1) {
                Some(Token::PlusPlus) => Some(1.0),
                Some(Token::MinusMinus) => Some(-1.0),
                _ => None,
            };
            if let Some(delta) = delta {
                self.pos += 2;
                return Ok(Statement::Increment { name, delta });
            }
        }

        Ok(Statement::Expression(self.parse_expr(0)?))
    }

    /// Comma-separated statements, stopping before `stop` or end of input.
    fn parse_statement_list(&mut self, stop: &Token) -> Result<Vec<Statement>, ExpressionError> {
        let mut statements = Vec::new();
        if self.at_end() || self.peek() == Some(stop) {
            return Ok(statements);
        }
        loop {
            statements.push(self.parse_statement()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(statements)
    }

    fn parse_counted_clause(&mut self) -> Result<LoopClause, ExpressionError> {
        let init = self.parse_statement_list(&Token::Semicolon)?;
        self.expect(Token::Semicolon, "';' after loop initializer")?;
        let condition = if self.peek() == Some(&Token::Semicolon) {
            None
        } else {
            Some(self.parse_expr(0)?)
        };
        self.expect(Token::Semicolon, "';' after loop condition")?;
        let update = self.parse_statement_list(&Token::RParen)?;
        Ok(LoopClause::Counted {
            init,
            condition,
            update,
        })
    }

    fn parse_iteration_clause(&mut self) -> Result<LoopClause, ExpressionError> {
        if matches!(self.peek(), Some(Token::Let | Token::Var)) {
            self.advance();
        }
        let binding = self
            .expect_ident()
            .map_err(|_| self.error("expected 'init; condition; update' or 'name in/of expression'"))?;
        let keys = match self.peek() {
            Some(Token::Ident(word)) if word == "in" => true,
            Some(Token::Ident(word)) if word == "of" => false,
            _ => return Err(self.error("expected 'in' or 'of' after loop binding")),
        };
        self.advance();
        if self.at_end() {
            return Err(self.error("expected an expression to iterate"));
        }
        let source = self.parse_expr(0)?;
        Ok(if keys {
            LoopClause::Keys { binding, source }
        } else {
            LoopClause::Values { binding, source }
        })
    }

    // ------------------------------------------------------------------
    // Pratt parser core
    // ------------------------------------------------------------------

    fn parse_expr(&mut self, min_bp: u8) -> Result<Expr, ExpressionError> {
        let depth = self.depth;
        let expr = self.parse_operators(min_bp);
        self.depth = depth;
        expr
    }

    fn parse_operators(&mut self, min_bp: u8) -> Result<Expr, ExpressionError> {
        self.deeper()?;
        let mut left = self.parse_prefix()?;

        loop {
            let Some(token) = self.peek() else { break };
            let Some((l_bp, r_bp)) = infix_bp(token) else { break };

            if l_bp < min_bp {
                break;
            }

            // Special case: conditional operator (?)
            if *token == Token::Question {
                self.advance();
                self.deeper()?;
                let then_branch = self.parse_expr(0)?;
                self.expect(Token::Colon, "':' in conditional expression")?;
                let else_branch = self.parse_expr(r_bp)?;
                left = Expr::Conditional {
                    condition: Box::new(left),
                    then_branch: Box::new(then_branch),
                    else_branch: Box::new(else_branch),
                };
                continue;
            }

            let operator = match token {
                Token::Plus => BinaryOperator::Addition,
                Token::Minus => BinaryOperator::Subtraction,
                Token::Star => BinaryOperator::Multiplication,
                Token::Slash => BinaryOperator::Division,
                Token::Percent => BinaryOperator::Modulo,
                Token::EqEq => BinaryOperator::Equality,
                Token::BangEq => BinaryOperator::Inequality,
                Token::EqEqEq => BinaryOperator::StrictEquality,
                Token::BangEqEq => BinaryOperator::StrictInequality,
                Token::Gt => BinaryOperator::GreaterThan,
                Token::Lt => BinaryOperator::LessThan,
                Token::GtEq => BinaryOperator::GreaterThanOrEqual,
                Token::LtEq => BinaryOperator::LessThanOrEqual,
                Token::AmpAmp => BinaryOperator::LogicalAnd,
                Token::PipePipe => BinaryOperator::LogicalOr,
                _ => return Err(self.error("unexpected infix operator")),
            };
            self.advance();
            self.deeper()?;
            let right = self.parse_expr(r_bp)?;

            left = Expr::Binary {
                operator,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<Expr, ExpressionError> {
        let (token, span) = self
            .advance()
            .ok_or_else(|| self.error("unexpected end of expression"))?;

        let expr = match token {
            // Literals
            Token::Number(n) => Expr::Literal(Literal::Number(n)),
            Token::StringLit(s) => Expr::Literal(Literal::String(s)),
            Token::True => Expr::Literal(Literal::Boolean(true)),
            Token::False => Expr::Literal(Literal::Boolean(false)),
            Token::Null => Expr::Literal(Literal::Null),
            Token::Undefined => Expr::Literal(Literal::Undefined),

            // Variables and built-in calls
            Token::Ident(name) => {
                if self.eat(&Token::LParen) {
                    let arguments = self.parse_list(Token::RParen, "')' after arguments")?;
                    let end = self.tokens[self.pos - 1].1.end;
                    Expr::Call {
                        function: name,
                        arguments,
                        span: span.start..end,
                    }
                } else {
                    Expr::Variable(name, span)
                }
            }

            // Unary operators
            Token::Bang => {
                let operand = self.parse_expr(BP_UNARY)?;
                Expr::Unary {
                    operator: UnaryOperator::LogicalNot,
                    operand: Box::new(operand),
                }
            }
            Token::Minus => {
                let operand = self.parse_expr(BP_UNARY)?;
                Expr::Unary {
                    operator: UnaryOperator::Negation,
                    operand: Box::new(operand),
                }
            }

            // Parenthesized expression
            Token::LParen => {
                let expr = self.parse_expr(0)?;
                self.expect(Token::RParen, "')'")?;
                expr
            }

            Token::LBracket => Expr::Array(self.parse_list(Token::RBracket, "']' after array items")?),

            Token::LBrace => self.parse_object()?,

            other => {
                return Err(ExpressionError::new(
                    format!("unexpected token {}", describe(&other)),
                    span,
                ));
            }
        };

        self.parse_postfix(expr)
    }

    /// Member and index access bind tighter than any prefix or infix operator.
    fn parse_postfix(&mut self, mut expr: Expr) -> Result<Expr, ExpressionError> {
        loop {
            if matches!(self.peek(), Some(Token::Dot | Token::LBracket)) {
                self.deeper()?;
            }
            if self.eat(&Token::Dot) {
                let property = self.expect_ident()?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property,
                };
            } else if self.eat(&Token::LBracket) {
                let index = self.parse_expr(0)?;
                self.expect(Token::RBracket, "']' after index")?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                return Ok(expr);
            }
        }
    }

    /// Comma-separated expressions up to `close`; a trailing comma is allowed.
    fn parse_list(&mut self, close: Token, what: &str) -> Result<Vec<Expr>, ExpressionError> {
        let mut items = Vec::new();
        while !self.eat(&close) {
            if self.at_end() {
                return Err(self.error(format!("expected {}", what)));
            }
            items.push(self.parse_expr(0)?);
            if !self.eat(&Token::Comma) {
                self.expect(close, what)?;
                break;
            }
        }
        Ok(items)
    }

    fn parse_object(&mut self) -> Result<Expr, ExpressionError> {
        let mut entries = Vec::new();
        while !self.eat(&Token::RBrace) {
            let key = match self.advance() {
                Some((Token::Ident(name), _)) => name,
                Some((Token::StringLit(s), _)) => s,
                Some((Token::Number(n), _)) => format_number_key(n),
                _ => {
                    self.pos = self.pos.saturating_sub(1);
                    return Err(self.error("expected property name"));
                }
            };
            self.expect(Token::Colon, "':' after property name")?;
            let value = self.parse_expr(0)?;
            entries.push((key, value));
            if !self.eat(&Token::Comma) {
                self.expect(Token::RBrace, "'}' after object properties")?;
                break;
            }
        }
        Ok(Expr::Object(entries))
    }
}

/// Infix binding powers: returns (left_bp, right_bp) or None if not infix.
fn infix_bp(token: &Token) -> Option<(u8, u8)> {
    match token {
        Token::Question => Some((BP_CONDITIONAL, BP_CONDITIONAL)),
        Token::PipePipe => Some((BP_OR, BP_OR + 1)),
        Token::AmpAmp => Some((BP_AND, BP_AND + 1)),
        Token::EqEq | Token::BangEq | Token::EqEqEq | Token::BangEqEq => {
            Some((BP_EQUALITY, BP_EQUALITY + 1))
        }
        Token::Gt | Token::Lt | Token::GtEq | Token::LtEq => {
            Some((BP_COMPARISON, BP_COMPARISON + 1))
        }
        Token::Plus | Token::Minus => Some((BP_ADDITIVE, BP_ADDITIVE + 1)),
        Token::Star | Token::Slash | Token::Percent => {
            Some((BP_MULTIPLICATIVE, BP_MULTIPLICATIVE + 1))
        }
        _ => None,
    }
}

fn format_number_key(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Ident(name) => format!("'{}'", name),
        Token::Number(n) => format!("number {}", n),
        Token::StringLit(_) => "string".to_string(),
        other => format!("{:?}", other),
    }
}
