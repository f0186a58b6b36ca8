use crate::Selector;
use std::{collections::BTreeSet, fmt, iter::Peekable, str::CharIndices};

/// Describes why a selector expression could not be parsed.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid selector at offset {pos}: {kind}")]
pub struct ParseError {
    pos: usize,
    kind: ParseErrorKind,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseErrorKind {
    #[error("unexpected character {0:?}")]
    UnexpectedChar(char),

    #[error("unterminated string")]
    UnterminatedString,

    #[error("unexpected {0}")]
    UnexpectedToken(String),

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("expression nested more than {} levels deep", MAX_DEPTH)]
    TooDeep,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    Ident(String),
    Str(String),
    Eq,
    Ne,
    Not,
    And,
    Or,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
}

/// The most `!` and `(` that may enclose any part of an expression.
const MAX_DEPTH: usize = 64;

struct Parser {
    tokens: Vec<(usize, Token)>,
    next: usize,
    end: usize,
    depth: usize,
}

pub(crate) fn parse(s: &str) -> Result<Selector, ParseError> {
    let tokens = lex(s)?;
    if tokens.is_empty() {
        return Ok(Selector::All);
    }

    let mut parser = Parser {
        tokens,
        next: 0,
        end: s.len(),
        depth: 0,
    };
    let selector = parser.disjunction()?;
    match parser.advance() {
        None => Ok(selector),
        Some((pos, tok)) => Err(ParseError::unexpected(pos, &tok)),
    }
}

// === impl ParseError ===

impl ParseError {
    /// The byte offset into the expression at which parsing failed.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn kind(&self) -> &ParseErrorKind {
        &self.kind
    }

    fn unexpected(pos: usize, tok: &Token) -> Self {
        Self {
            pos,
            kind: ParseErrorKind::UnexpectedToken(tok.to_string()),
        }
    }
}

// === impl Token ===

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ident(id) => write!(f, "identifier `{}`", id),
            Self::Str(s) => write!(f, "string {:?}", s),
            Self::Eq => write!(f, "`==`"),
            Self::Ne => write!(f, "`!=`"),
            Self::Not => write!(f, "`!`"),
            Self::And => write!(f, "`&&`"),
            Self::Or => write!(f, "`||`"),
            Self::LParen => write!(f, "`(`"),
            Self::RParen => write!(f, "`)`"),
            Self::LBrace => write!(f, "`{{`"),
            Self::RBrace => write!(f, "`}}`"),
            Self::Comma => write!(f, "`,`"),
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/')
}

fn lex(s: &str) -> Result<Vec<(usize, Token)>, ParseError> {
    let mut chars = s.char_indices().peekable();
    let mut tokens = Vec::new();
    while let Some((pos, c)) = chars.next() {
        let tok = match c {
            c if c.is_whitespace() => continue,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            ',' => Token::Comma,
            '=' => pair(&mut chars, pos, '=', Token::Eq)?,
            '&' => pair(&mut chars, pos, '&', Token::And)?,
            '|' => pair(&mut chars, pos, '|', Token::Or)?,
            '!' => {
                if chars.next_if(|&(_, c)| c == '=').is_some() {
                    Token::Ne
                } else {
                    Token::Not
                }
            }
            '\'' | '"' => {
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some((_, q)) if q == c => break,
                        Some((_, ch)) => value.push(ch),
                        None => {
                            return Err(ParseError {
                                pos,
                                kind: ParseErrorKind::UnterminatedString,
                            })
                        }
                    }
                }
                Token::Str(value)
            }
            c if is_ident_char(c) => {
                let mut ident = c.to_string();
                while let Some((_, ch)) = chars.next_if(|&(_, ch)| is_ident_char(ch)) {
                    ident.push(ch);
                }
                Token::Ident(ident)
            }
            c => {
                return Err(ParseError {
                    pos,
                    kind: ParseErrorKind::UnexpectedChar(c),
                })
            }
        };
        tokens.push((pos, tok));
    }
    Ok(tokens)
}

/// Completes a two-character operator whose characters are both `second`.
fn pair(
    chars: &mut Peekable<CharIndices<'_>>,
    pos: usize,
    second: char,
    tok: Token,
) -> Result<Token, ParseError> {
    match chars.next() {
        Some((_, c)) if c == second => Ok(tok),
        Some((pos, c)) => Err(ParseError {
            pos,
            kind: ParseErrorKind::UnexpectedChar(c),
        }),
        None => Err(ParseError {
            pos: pos + 1,
            kind: ParseErrorKind::UnexpectedEnd,
        }),
    }
}

// === impl Parser ===

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.next).map(|(_, t)| t)
    }

    fn advance(&mut self) -> Option<(usize, Token)> {
        let tok = self.tokens.get(self.next).cloned();
        if tok.is_some() {
            self.next += 1;
        }
        tok
    }

    fn expect_next(&mut self) -> Result<(usize, Token), ParseError> {
        self.advance().ok_or(ParseError {
            pos: self.end,
            kind: ParseErrorKind::UnexpectedEnd,
        })
    }

    fn expect(&mut self, want: Token) -> Result<(), ParseError> {
        match self.expect_next()? {
            (_, tok) if tok == want => Ok(()),
            (pos, tok) => Err(ParseError::unexpected(pos, &tok)),
        }
    }

    fn descend(&mut self, pos: usize) -> Result<(), ParseError> {
        if self.depth == MAX_DEPTH {
            return Err(ParseError {
                pos,
                kind: ParseErrorKind::TooDeep,
            });
        }
        self.depth += 1;
        Ok(())
    }

    fn disjunction(&mut self) -> Result<Selector, ParseError> {
        let mut lhs = self.conjunction()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            lhs = lhs.or(self.conjunction()?);
        }
        Ok(lhs)
    }

    fn conjunction(&mut self) -> Result<Selector, ParseError> {
        let mut lhs = self.unary()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            lhs = lhs.and(self.unary()?);
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Selector, ParseError> {
        match self.expect_next()? {
            (pos, Token::Not) => {
                self.descend(pos)?;
                let inner = self.unary()?;
                self.depth -= 1;
                Ok(Selector::Not(Box::new(inner)))
            }
            (pos, Token::LParen) => {
                self.descend(pos)?;
                let inner = self.disjunction()?;
                self.expect(Token::RParen)?;
                self.depth -= 1;
                Ok(inner)
            }
            (_, Token::Ident(id)) if id == "all" && self.peek() == Some(&Token::LParen) => {
                self.expect(Token::LParen)?;
                self.expect(Token::RParen)?;
                Ok(Selector::All)
            }
            (_, Token::Ident(id)) if id == "has" && self.peek() == Some(&Token::LParen) => {
                self.expect(Token::LParen)?;
                let key = match self.expect_next()? {
                    (_, Token::Ident(key)) => key,
                    (pos, tok) => return Err(ParseError::unexpected(pos, &tok)),
                };
                self.expect(Token::RParen)?;
                Ok(Selector::Has(key))
            }
            (_, Token::Ident(key)) => self.comparison(key),
            (pos, tok) => Err(ParseError::unexpected(pos, &tok)),
        }
    }

    fn comparison(&mut self, key: String) -> Result<Selector, ParseError> {
        match self.expect_next()? {
            (_, Token::Eq) => Ok(Selector::Equals(key, self.string()?)),
            (_, Token::Ne) => Ok(Selector::NotEquals(key, self.string()?)),
            (_, Token::Ident(op)) if op == "in" => Ok(Selector::In(key, self.set()?)),
            (_, Token::Ident(op)) if op == "not" => {
                self.expect(Token::Ident("in".to_string()))?;
                Ok(Selector::NotIn(key, self.set()?))
            }
            (pos, tok) => Err(ParseError::unexpected(pos, &tok)),
        }
    }

    fn string(&mut self) -> Result<String, ParseError> {
        match self.expect_next()? {
            (_, Token::Str(s)) => Ok(s),
            (pos, tok) => Err(ParseError::unexpected(pos, &tok)),
        }
    }

    fn set(&mut self) -> Result<BTreeSet<String>, ParseError> {
        self.expect(Token::LBrace)?;
        let mut values = BTreeSet::new();
        if self.peek() == Some(&Token::RBrace) {
            self.advance();
            return Ok(values);
        }
        loop {
            values.insert(self.string()?);
            match self.expect_next()? {
                (_, Token::Comma) => continue,
                (_, Token::RBrace) => return Ok(values),
                (pos, tok) => return Err(ParseError::unexpected(pos, &tok)),
            }
        }
    }
}
