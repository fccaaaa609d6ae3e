//! Expression parser, recursive descent.
//!
//! Grammar:
//! ```text
//! expr     := term ('+' term)*
//! term     := STRING | NUMBER | 'true' | 'false' | 'null' | selector | call | '(' expr ')'
//! selector := '$' ('.' KEY | '[' INDEX_OR_KEY ']')*
//! call     := IDENT '(' [expr (',' expr)*] ')'
//! ```

use action_mapper::{EvaluatorError, Path};
use serde_json::{Number, Value};

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// `$` alone (`None`) selects the whole bound value.
    Selector(Option<Path>),
    Call { name: String, args: Vec<Expr> },
    /// Terms joined by `+`.
    Concat(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Str(String),
    Number(Number),
    Ident(String),
    Selector(Option<Path>),
    LParen,
    RParen,
    Comma,
    Plus,
    Eof,
}

/// Parse `input`, rejecting nesting deeper than `max_depth` when set.
pub fn parse(input: &str, max_depth: Option<usize>) -> Result<Expr, EvaluatorError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        max_depth,
    };
    let expr = parser.expr()?;
    match parser.peek() {
        Token::Eof => Ok(expr),
        other => Err(err(format!("unexpected {other:?} after expression"))),
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, EvaluatorError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let punct = match c {
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            ',' => Some(Token::Comma),
            '+' => Some(Token::Plus),
            _ => None,
        };
        if let Some(token) = punct {
            tokens.push(token);
            i += 1;
            continue;
        }

        // String literal, either quote style
        if c == '\'' || c == '"' {
            let start = i;
            i += 1;
            let mut s = String::new();
            let mut closed = false;
            while i < chars.len() {
                match chars[i] {
                    '\\' if i + 1 < chars.len() => {
                        s.push(match chars[i + 1] {
                            'n' => '\n',
                            't' => '\t',
                            other => other,
                        });
                        i += 2;
                    }
                    q if q == c => {
                        closed = true;
                        i += 1;
                        break;
                    }
                    other => {
                        s.push(other);
                        i += 1;
                    }
                }
            }
            if !closed {
                return Err(err(format!("unterminated string literal at position {start}")));
            }
            tokens.push(Token::Str(s));
            continue;
        }

        if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) {
            let start = i;
            i += 1;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            tokens.push(Token::Number(parse_number(&text)?));
            continue;
        }

        if c == '$' {
            let start = i;
            i += 1;
            while i < chars.len() {
                match chars[i] {
                    '.' => {
                        i += 1;
                        while i < chars.len() && is_key_char(chars[i]) {
                            i += 1;
                        }
                    }
                    '[' => {
                        while i < chars.len() && chars[i] != ']' {
                            i += 1;
                        }
                        if i >= chars.len() {
                            return Err(err(format!("unclosed bracket at position {start}")));
                        }
                        i += 1;
                    }
                    _ => break,
                }
            }
            let text: String = chars[start + 1..i].iter().collect();
            let path = if text.is_empty() {
                None
            } else {
                Some(Path::parse(&text).map_err(|e| err(e.to_string()))?)
            };
            tokens.push(Token::Selector(path));
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
            continue;
        }

        return Err(err(format!("unexpected character '{c}' at position {i}")));
    }

    tokens.push(Token::Eof);
    Ok(tokens)
}

fn is_key_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '@' | ':')
}

fn parse_number(text: &str) -> Result<Number, EvaluatorError> {
    if text.contains('.') {
        text.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .ok_or_else(|| err(format!("invalid number: {text}")))
    } else {
        text.parse::<i64>()
            .map(Number::from)
            .map_err(|_| err(format!("invalid number: {text}")))
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    max_depth: Option<usize>,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn next(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), EvaluatorError> {
        let found = self.next();
        if found == expected {
            Ok(())
        } else {
            Err(err(format!("expected {expected:?}, found {found:?}")))
        }
    }

    fn enter(&mut self) -> Result<(), EvaluatorError> {
        self.depth += 1;
        match self.max_depth {
            Some(max) if self.depth > max => {
                Err(err(format!("expression nested deeper than {max}")))
            }
            _ => Ok(()),
        }
    }

    fn expr(&mut self) -> Result<Expr, EvaluatorError> {
        self.enter()?;
        let mut terms = vec![self.term()?];
        while *self.peek() == Token::Plus {
            self.pos += 1;
            terms.push(self.term()?);
        }
        self.depth -= 1;

        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::Concat(terms)
        })
    }

    fn term(&mut self) -> Result<Expr, EvaluatorError> {
        match self.next() {
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Number(n) => Ok(Expr::Literal(Value::Number(n))),
            Token::Selector(path) => Ok(Expr::Selector(path)),
            Token::LParen => {
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(word) => match word.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                _ => self.call(word),
            },
            other => Err(err(format!("unexpected {other:?}"))),
        }
    }

    fn call(&mut self, name: String) -> Result<Expr, EvaluatorError> {
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        if *self.peek() == Token::RParen {
            self.pos += 1;
            return Ok(Expr::Call { name, args });
        }
        loop {
            args.push(self.expr()?);
            match self.next() {
                Token::Comma => continue,
                Token::RParen => break,
                other => return Err(err(format!("expected ',' or ')', found {other:?}"))),
            }
        }
        Ok(Expr::Call { name, args })
    }
}

fn err(msg: impl Into<String>) -> EvaluatorError {
    EvaluatorError::new(msg)
}
