//! Boolean expressions over state keys, used to declare node inputs.
//!
//! Grammar (`&` binds tighter than `|`):
//!
//! ```text
//! expr := all ('|' all)*
//! all  := atom ('&' atom)*
//! atom := KEY | '(' expr ')'
//! ```
//!
//! `user_prompt & (relevant_chunks | doc)` reads `user_prompt` plus whichever
//! of `relevant_chunks` / `doc` is available first.

use std::fmt;
use std::str::FromStr;

use scrapegraph_shared::{Result, ScrapeGraphError};

/// A parsed input expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyExpr {
    Key(String),
    All(Vec<KeyExpr>),
    Any(Vec<KeyExpr>),
}

impl KeyExpr {
    /// Parse an expression such as `json | json_dir`.
    pub fn parse(input: &str) -> Result<Self> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(ScrapeGraphError::wiring("empty input expression"));
        }
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            source: input,
        };
        let expr = parser.expr()?;
        if parser.pos != tokens.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(expr)
    }

    /// Single-key expression.
    pub fn key(name: impl Into<String>) -> Self {
        Self::Key(name.into())
    }

    /// Resolve to the concrete keys to read, given a presence test.
    ///
    /// `Any` picks its first satisfiable alternative; `All` needs every
    /// operand. Returns `None` when the expression cannot be satisfied.
    pub fn resolve(&self, has: &dyn Fn(&str) -> bool) -> Option<Vec<String>> {
        match self {
            Self::Key(name) => has(name.as_str()).then(|| vec![name.clone()]),
            Self::All(items) => {
                let mut keys = Vec::new();
                for item in items {
                    keys.extend(item.resolve(has)?);
                }
                Some(keys)
            }
            Self::Any(items) => items.iter().find_map(|item| item.resolve(has)),
        }
    }

    pub fn is_satisfied_by(&self, has: &dyn Fn(&str) -> bool) -> bool {
        self.resolve(has).is_some()
    }

    /// Every key mentioned in the expression, in order of appearance.
    pub fn mentioned_keys(&self) -> Vec<&str> {
        match self {
            Self::Key(name) => vec![name.as_str()],
            Self::All(items) | Self::Any(items) => {
                items.iter().flat_map(KeyExpr::mentioned_keys).collect()
            }
        }
    }
}

impl FromStr for KeyExpr {
    type Err = ScrapeGraphError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for KeyExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(name) => f.write_str(name),
            Self::Any(items) => write_joined(f, items, " | ", false),
            Self::All(items) => write_joined(f, items, " & ", true),
        }
    }
}

fn write_joined(
    f: &mut fmt::Formatter<'_>,
    items: &[KeyExpr],
    sep: &str,
    wrap_any: bool,
) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        match item {
            KeyExpr::Any(_) if wrap_any => write!(f, "({item})")?,
            _ => write!(f, "{item}")?,
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tokenizer / parser
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Key(String),
    And,
    Or,
    Open,
    Close,
}

fn is_key_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.')
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '&' => tokens.push(Token::And),
            '|' => tokens.push(Token::Or),
            '(' => tokens.push(Token::Open),
            ')' => tokens.push(Token::Close),
            c if is_key_char(c) => {
                let mut end = start + c.len_utf8();
                while let Some(&(i, next)) = chars.peek() {
                    if !is_key_char(next) {
                        break;
                    }
                    end = i + next.len_utf8();
                    chars.next();
                }
                tokens.push(Token::Key(input[start..end].to_string()));
            }
            other => {
                return Err(ScrapeGraphError::wiring(format!(
                    "invalid character '{other}' in input expression '{input}'"
                )));
            }
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    source: &'a str,
}

impl Parser<'_> {
    fn expr(&mut self) -> Result<KeyExpr> {
        let mut items = vec![self.all()?];
        while self.eat(&Token::Or) {
            items.push(self.all()?);
        }
        Ok(collapse(items, KeyExpr::Any))
    }

    fn all(&mut self) -> Result<KeyExpr> {
        let mut items = vec![self.atom()?];
        while self.eat(&Token::And) {
            items.push(self.atom()?);
        }
        Ok(collapse(items, KeyExpr::All))
    }

    fn atom(&mut self) -> Result<KeyExpr> {
        match self.tokens.get(self.pos) {
            Some(Token::Key(name)) => {
                self.pos += 1;
                Ok(KeyExpr::Key(name.clone()))
            }
            Some(Token::Open) => {
                self.pos += 1;
                let inner = self.expr()?;
                if !self.eat(&Token::Close) {
                    return Err(self.error("missing closing parenthesis"));
                }
                Ok(inner)
            }
            _ => Err(self.error("expected a key or '('")),
        }
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.tokens.get(self.pos) == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, what: &str) -> ScrapeGraphError {
        ScrapeGraphError::wiring(format!(
            "{what} in input expression '{}' (token {})",
            self.source, self.pos
        ))
    }
}

fn collapse(mut items: Vec<KeyExpr>, wrap: fn(Vec<KeyExpr>) -> KeyExpr) -> KeyExpr {
    if items.len() == 1 {
        items.remove(0)
    } else {
        wrap(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn present<'a>(keys: &'a [&'a str]) -> impl Fn(&str) -> bool + 'a {
        move |k| keys.iter().any(|key| *key == k)
    }

    #[test]
    fn parses_single_key() {
        assert_eq!(KeyExpr::parse("doc").unwrap(), KeyExpr::key("doc"));
        assert_eq!(KeyExpr::parse("  json_dir ").unwrap(), KeyExpr::key("json_dir"));
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let expr = KeyExpr::parse("a | b & c").unwrap();
        assert_eq!(
            expr,
            KeyExpr::Any(vec![
                KeyExpr::key("a"),
                KeyExpr::All(vec![KeyExpr::key("b"), KeyExpr::key("c")]),
            ])
        );
    }

    #[test]
    fn resolves_first_available_alternative() {
        let expr = KeyExpr::parse("user_prompt & (relevant_chunks | parsed_doc | doc)").unwrap();

        let keys = expr.resolve(&present(&["user_prompt", "doc"])).unwrap();
        assert_eq!(keys, ["user_prompt", "doc"]);

        let keys = expr
            .resolve(&present(&["user_prompt", "doc", "relevant_chunks"]))
            .unwrap();
        assert_eq!(keys, ["user_prompt", "relevant_chunks"]);

        assert!(expr.resolve(&present(&["doc"])).is_none());
        assert!(!expr.is_satisfied_by(&present(&["user_prompt"])));
    }

    #[test]
    fn display_roundtrips() {
        for src in ["json | json_dir", "user_prompt & (relevant_chunks | doc)", "a & b"] {
            let expr = KeyExpr::parse(src).unwrap();
            assert_eq!(expr.to_string(), src);
            assert_eq!(KeyExpr::parse(&expr.to_string()).unwrap(), expr);
        }
    }

    #[test]
    fn mentioned_keys_in_order() {
        let expr = KeyExpr::parse("user_prompt & (relevant_chunks | doc)").unwrap();
        assert_eq!(expr.mentioned_keys(), ["user_prompt", "relevant_chunks", "doc"]);
    }

    #[test]
    fn rejects_malformed_expressions() {
        for src in ["", "a &", "(a | b", "a b", "a ; b", "| a"] {
            let err = KeyExpr::parse(src).unwrap_err();
            assert!(
                matches!(err, ScrapeGraphError::Wiring { .. }),
                "{src}: {err}"
            );
        }
    }
}
