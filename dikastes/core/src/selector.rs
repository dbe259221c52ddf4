//! Label selector expressions.
//!
//! Selectors are boolean predicates over a workload's labels, written in the
//! expression syntax used by network policies:
//!
//! ```text
//! role == 'web' && (tier in {"frontend", "edge"} || !has(canary))
//! ```
//!
//! Supported terms are `all()`, `has(k)`, `k == v`, `k != v`, `k in {..}`,
//! `k not in {..}`, `k contains v`, `k starts with v` and `k ends with v`.
//! Terms combine with `!`, `&&` and `||`; `&&` binds tighter than `||`. An
//! empty expression selects everything.

use crate::labels::Labels;
use std::{collections::BTreeSet, fmt, iter::Peekable, str::CharIndices};

/// A parsed selector expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selector(Expr);

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unexpected end of selector")]
    UnexpectedEnd,

    #[error("unexpected {found} at offset {offset}")]
    UnexpectedToken { found: String, offset: usize },

    #[error("unterminated string starting at offset {offset}")]
    UnterminatedString { offset: usize },

    #[error("invalid character {ch:?} at offset {offset}")]
    InvalidChar { ch: char, offset: usize },

    #[error("selector nests deeper than {} levels at offset {offset}", MAX_DEPTH)]
    TooDeep { offset: usize },
}

/// Bounds the nesting of parentheses and negations.
const MAX_DEPTH: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Expr {
    All,
    Has(String),
    Equal(String, String),
    NotEqual(String, String),
    In(String, BTreeSet<String>),
    NotIn(String, BTreeSet<String>),
    Contains(String, String),
    StartsWith(String, String),
    EndsWith(String, String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    Ident(String),
    Str(String),
    Eq,
    NotEq,
    Not,
    And,
    Or,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
}

struct Lexer<'s> {
    src: &'s str,
    chars: Peekable<CharIndices<'s>>,
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    depth: usize,
}

// === impl Selector ===

impl Selector {
    /// Selects every set of labels.
    pub fn all() -> Self {
        Self(Expr::All)
    }

    pub fn parse(expr: &str) -> Result<Self, ParseError> {
        let tokens = Lexer::new(expr).collect::<Result<Vec<_>, _>>()?;
        if tokens.is_empty() {
            return Ok(Self::all());
        }

        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let expr = parser.or()?;
        if let Some((offset, tok)) = parser.tokens.get(parser.pos) {
            return Err(ParseError::UnexpectedToken {
                found: tok.to_string(),
                offset: *offset,
            });
        }
        Ok(Self(expr))
    }

    pub fn matches(&self, labels: &Labels) -> bool {
        self.0.eval(labels)
    }
}

impl std::str::FromStr for Selector {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// === impl Expr ===

impl Expr {
    fn eval(&self, labels: &Labels) -> bool {
        match self {
            Self::All => true,
            Self::Has(k) => labels.contains_key(k),
            Self::Equal(k, v) => labels.get(k) == Some(v.as_str()),
            Self::NotEqual(k, v) => labels.get(k) != Some(v.as_str()),
            Self::In(k, vs) => labels.get(k).is_some_and(|l| vs.contains(l)),
            Self::NotIn(k, vs) => !labels.get(k).is_some_and(|l| vs.contains(l)),
            Self::Contains(k, v) => labels.get(k).is_some_and(|l| l.contains(v.as_str())),
            Self::StartsWith(k, v) => labels.get(k).is_some_and(|l| l.starts_with(v.as_str())),
            Self::EndsWith(k, v) => labels.get(k).is_some_and(|l| l.ends_with(v.as_str())),
            Self::Not(e) => !e.eval(labels),
            Self::And(a, b) => a.eval(labels) && b.eval(labels),
            Self::Or(a, b) => a.eval(labels) || b.eval(labels),
        }
    }
}

// === impl Lexer ===

impl<'s> Lexer<'s> {
    fn new(src: &'s str) -> Self {
        Self {
            src,
            chars: src.char_indices().peekable(),
        }
    }

    fn is_ident_char(c: char) -> bool {
        c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '/' | '-')
    }

    fn string(&mut self, start: usize, quote: char) -> Result<(usize, Token), ParseError> {
        for (i, c) in self.chars.by_ref() {
            if c == quote {
                let s = &self.src[start + 1..i];
                return Ok((start, Token::Str(s.to_string())));
            }
        }
        Err(ParseError::UnterminatedString { offset: start })
    }

    fn ident(&mut self, start: usize) -> (usize, Token) {
        let mut end = self.src.len();
        while let Some(&(i, c)) = self.chars.peek() {
            if !Self::is_ident_char(c) {
                end = i;
                break;
            }
            self.chars.next();
        }
        (start, Token::Ident(self.src[start..end].to_string()))
    }

    fn pair(
        &mut self,
        start: usize,
        second: char,
        tok: Token,
        single: Option<Token>,
    ) -> Result<(usize, Token), ParseError> {
        if let Some(&(_, c)) = self.chars.peek() {
            if c == second {
                self.chars.next();
                return Ok((start, tok));
            }
        }
        match single {
            Some(tok) => Ok((start, tok)),
            None => Err(ParseError::InvalidChar {
                ch: self.src[start..].chars().next().unwrap_or_default(),
                offset: start,
            }),
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<(usize, Token), ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(&(_, c)) = self.chars.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.chars.next();
        }

        let (i, c) = self.chars.next()?;
        let tok = match c {
            '(' => Ok((i, Token::LParen)),
            ')' => Ok((i, Token::RParen)),
            '{' => Ok((i, Token::LBrace)),
            '}' => Ok((i, Token::RBrace)),
            ',' => Ok((i, Token::Comma)),
            '\'' | '"' => self.string(i, c),
            '=' => self.pair(i, '=', Token::Eq, None),
            '!' => self.pair(i, '=', Token::NotEq, Some(Token::Not)),
            '&' => self.pair(i, '&', Token::And, None),
            '|' => self.pair(i, '|', Token::Or, None),
            c if Self::is_ident_char(c) => Ok(self.ident(i)),
            ch => Err(ParseError::InvalidChar { ch, offset: i }),
        };
        Some(tok)
    }
}

// === impl Parser ===

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn next(&mut self) -> Result<(usize, Token), ParseError> {
        let tok = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(ParseError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(tok)
    }

    fn expect(&mut self, want: Token) -> Result<(), ParseError> {
        let (offset, tok) = self.next()?;
        if tok != want {
            return Err(ParseError::UnexpectedToken {
                found: tok.to_string(),
                offset,
            });
        }
        Ok(())
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<(), ParseError> {
        match self.next()? {
            (_, Token::Ident(id)) if id == kw => Ok(()),
            (offset, tok) => Err(ParseError::UnexpectedToken {
                found: tok.to_string(),
                offset,
            }),
        }
    }

    fn string(&mut self) -> Result<String, ParseError> {
        match self.next()? {
            (_, Token::Str(s)) => Ok(s),
            (offset, tok) => Err(ParseError::UnexpectedToken {
                found: tok.to_string(),
                offset,
            }),
        }
    }

    fn set(&mut self) -> Result<BTreeSet<String>, ParseError> {
        self.expect(Token::LBrace)?;
        let mut values = BTreeSet::new();
        if self.peek() == Some(&Token::RBrace) {
            self.pos += 1;
            return Ok(values);
        }
        loop {
            values.insert(self.string()?);
            match self.next()? {
                (_, Token::Comma) => continue,
                (_, Token::RBrace) => return Ok(values),
                (offset, tok) => {
                    return Err(ParseError::UnexpectedToken {
                        found: tok.to_string(),
                        offset,
                    })
                }
            }
        }
    }

    fn nested<T>(
        &mut self,
        offset: usize,
        parse: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        if self.depth == MAX_DEPTH {
            return Err(ParseError::TooDeep { offset });
        }
        self.depth += 1;
        let res = parse(self);
        self.depth -= 1;
        res
    }

    fn or(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            expr = Expr::Or(Box::new(expr), Box::new(self.and()?));
        }
        Ok(expr)
    }

    fn and(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            expr = Expr::And(Box::new(expr), Box::new(self.unary()?));
        }
        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if let Some((offset, Token::Not)) = self.tokens.get(self.pos) {
            let offset = *offset;
            self.pos += 1;
            let expr = self.nested(offset, Self::unary)?;
            return Ok(Expr::Not(Box::new(expr)));
        }
        self.term()
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        let (offset, tok) = self.next()?;
        let key = match tok {
            Token::LParen => {
                let expr = self.nested(offset, Self::or)?;
                self.expect(Token::RParen)?;
                return Ok(expr);
            }
            Token::Ident(id) if id == "all" && self.peek() == Some(&Token::LParen) => {
                self.expect(Token::LParen)?;
                self.expect(Token::RParen)?;
                return Ok(Expr::All);
            }
            Token::Ident(id) if id == "has" && self.peek() == Some(&Token::LParen) => {
                self.expect(Token::LParen)?;
                let key = match self.next()? {
                    (_, Token::Ident(key)) => key,
                    (offset, tok) => {
                        return Err(ParseError::UnexpectedToken {
                            found: tok.to_string(),
                            offset,
                        })
                    }
                };
                self.expect(Token::RParen)?;
                return Ok(Expr::Has(key));
            }
            Token::Ident(key) => key,
            tok => {
                return Err(ParseError::UnexpectedToken {
                    found: tok.to_string(),
                    offset,
                })
            }
        };

        match self.next()? {
            (_, Token::Eq) => Ok(Expr::Equal(key, self.string()?)),
            (_, Token::NotEq) => Ok(Expr::NotEqual(key, self.string()?)),
            (_, Token::Ident(op)) if op == "in" => Ok(Expr::In(key, self.set()?)),
            (_, Token::Ident(op))
                if op == "not" && matches!(self.peek(), Some(Token::Ident(i)) if i == "in") =>
            {
                self.pos += 1;
                Ok(Expr::NotIn(key, self.set()?))
            }
            (_, Token::Ident(op)) if op == "contains" => Ok(Expr::Contains(key, self.string()?)),
            (_, Token::Ident(op)) if op == "starts" => {
                self.expect_keyword("with")?;
                Ok(Expr::StartsWith(key, self.string()?))
            }
            (_, Token::Ident(op)) if op == "ends" => {
                self.expect_keyword("with")?;
                Ok(Expr::EndsWith(key, self.string()?))
            }
            (offset, tok) => Err(ParseError::UnexpectedToken {
                found: tok.to_string(),
                offset,
            }),
        }
    }
}

// === impl Token ===

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ident(id) => write!(f, "{id:?}"),
            Self::Str(s) => write!(f, "string {s:?}"),
            Self::Eq => "'=='".fmt(f),
            Self::NotEq => "'!='".fmt(f),
            Self::Not => "'!'".fmt(f),
            Self::And => "'&&'".fmt(f),
            Self::Or => "'||'".fmt(f),
            Self::LParen => "'('".fmt(f),
            Self::RParen => "')'".fmt(f),
            Self::LBrace => "'{'".fmt(f),
            Self::RBrace => "'}'".fmt(f),
            Self::Comma => "','".fmt(f),
        }
    }
}
