//! Boolean label queries in PostgreSQL `ltxtquery` syntax, e.g. `Europe & Russia*@ & !Transportation`.
//!
//! Terms are tested against the set of labels in a path; order is ignored.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::lquery::LabelPattern;
use crate::path::Path;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Ltxtquery {
    Term(LabelPattern),
    Not(Box<Ltxtquery>),
    /// Operands of a `&` chain, at least two.
    And(Vec<Ltxtquery>),
    /// Operands of a `|` chain, at least two.
    Or(Vec<Ltxtquery>),
}

/// Deepest parenthesis nesting the parser accepts.
pub const MAX_NESTING: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Term(&'a str),
    And,
    Or,
    Not,
    Open,
    Close,
}

fn tokenize(text: &str) -> Result<Vec<Token<'_>>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        let token = match b {
            b' ' | b'\t' | b'\n' | b'\r' => {
                i += 1;
                continue;
            }
            b'&' => Token::And,
            b'|' => Token::Or,
            b'!' => Token::Not,
            b'(' => Token::Open,
            b')' => Token::Close,
            _ if b.is_ascii_alphanumeric() || b == b'_' => {
                let start = i;
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || matches!(bytes[i], b'_' | b'@' | b'*' | b'%'))
                {
                    i += 1;
                }
                tokens.push(Token::Term(&text[start..i]));
                continue;
            }
            _ => {
                return Err(Error::InvalidQuerySyntax(format!(
                    "unexpected character {:?} at offset {i}",
                    text[i..].chars().next().unwrap_or('?')
                )))
            }
        };
        tokens.push(token);
        i += 1;
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
    nesting: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<Token<'a>> {
        self.tokens.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<Token<'a>> {
        let token = self.peek();
        self.pos += 1;
        token
    }

    fn or(&mut self) -> Result<Ltxtquery> {
        let mut parts = vec![self.and()?];
        while self.peek() == Some(Token::Or) {
            self.bump();
            parts.push(self.and()?);
        }
        Ok(Ltxtquery::chain(parts, Ltxtquery::Or))
    }

    fn and(&mut self) -> Result<Ltxtquery> {
        let mut parts = vec![self.unary()?];
        while self.peek() == Some(Token::And) {
            self.bump();
            parts.push(self.unary()?);
        }
        Ok(Ltxtquery::chain(parts, Ltxtquery::And))
    }

    fn unary(&mut self) -> Result<Ltxtquery> {
        // `!!a` is `a`; only the parity of a run of negations matters.
        let mut negations = 0usize;
        while self.peek() == Some(Token::Not) {
            self.bump();
            negations += 1;
        }
        let operand = match self.bump() {
            Some(Token::Open) => {
                self.nesting += 1;
                if self.nesting > MAX_NESTING {
                    return Err(Error::InvalidQuerySyntax(format!(
                        "parentheses nested deeper than {MAX_NESTING}"
                    )));
                }
                let inner = self.or()?;
                self.nesting -= 1;
                match self.bump() {
                    Some(Token::Close) => inner,
                    _ => return Err(Error::InvalidQuerySyntax("missing ')'".into())),
                }
            }
            Some(Token::Term(text)) => LabelPattern::parse(text)
                .map(Ltxtquery::Term)
                .map_err(Error::InvalidQuerySyntax)?,
            Some(other) => {
                return Err(Error::InvalidQuerySyntax(format!(
                    "expected a term, found {other:?}"
                )))
            }
            None => return Err(Error::InvalidQuerySyntax("unexpected end of query".into())),
        };
        Ok(if negations % 2 == 1 {
            Ltxtquery::Not(Box::new(operand))
        } else {
            operand
        })
    }
}

impl Ltxtquery {
    pub fn parse(text: &str) -> Result<Self> {
        let tokens = tokenize(text)?;
        if tokens.is_empty() {
            return Err(Error::InvalidQuerySyntax("empty query".into()));
        }
        let mut parser = Parser {
            tokens,
            pos: 0,
            nesting: 0,
        };
        let query = parser.or()?;
        if let Some(extra) = parser.peek() {
            return Err(Error::InvalidQuerySyntax(format!(
                "unexpected {extra:?} after complete expression"
            )));
        }
        Ok(query)
    }

    /// Evaluate against the labels of `path`; a term holds when any label matches it.
    pub fn evaluate(&self, path: &Path) -> bool {
        match self {
            Ltxtquery::Term(term) => path.labels().iter().any(|l| term.matches(l.as_str())),
            Ltxtquery::Not(inner) => !inner.evaluate(path),
            Ltxtquery::And(parts) => parts.iter().all(|q| q.evaluate(path)),
            Ltxtquery::Or(parts) => parts.iter().any(|q| q.evaluate(path)),
        }
    }

    fn chain(mut parts: Vec<Ltxtquery>, op: fn(Vec<Ltxtquery>) -> Ltxtquery) -> Ltxtquery {
        if parts.len() == 1 {
            parts.remove(0)
        } else {
            op(parts)
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Ltxtquery::Or(..) => 1,
            Ltxtquery::And(..) => 2,
            Ltxtquery::Not(_) => 3,
            Ltxtquery::Term(_) => 4,
        }
    }

    fn write_operand(&self, f: &mut fmt::Formatter<'_>, min: u8) -> fmt::Result {
        if self.precedence() < min {
            write!(f, "({self})")
        } else {
            write!(f, "{self}")
        }
    }
}

impl fmt::Display for Ltxtquery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ltxtquery::Term(term) => write!(f, "{term}"),
            Ltxtquery::Not(inner) => {
                f.write_str("!")?;
                inner.write_operand(f, 3)
            }
            Ltxtquery::And(parts) => write_chain(f, parts, " & ", 3),
            Ltxtquery::Or(parts) => write_chain(f, parts, " | ", 2),
        }
    }
}

/// Nested chains of the same operator keep their parentheses so they re-parse identically.
fn write_chain(f: &mut fmt::Formatter<'_>, parts: &[Ltxtquery], op: &str, min: u8) -> fmt::Result {
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            f.write_str(op)?;
        }
        part.write_operand(f, min)?;
    }
    Ok(())
}

impl FromStr for Ltxtquery {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ltxtquery::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(query: &str, path: &str) -> bool {
        Ltxtquery::parse(query)
            .unwrap()
            .evaluate(&Path::parse(path).unwrap())
    }

    #[test]
    fn boolean_operators() {
        let path = "Top.Science.Astronomy";
        assert!(eval("Science & Astronomy", path));
        assert!(!eval("Science & Hobbies", path));
        assert!(eval("Hobbies | Astronomy", path));
        assert!(eval("!Hobbies", path));
        assert!(!eval("!Science", path));
        assert!(eval("Top & !(Hobbies | Collections)", path));
    }

    #[test]
    fn precedence_not_and_or() {
        // parsed as (a & b) | c
        assert!(eval("a & b | c", "c"));
        assert!(!eval("a & (b | c)", "c"));
        // parsed as (!a) & b
        assert!(!eval("!a & b", "a.b"));
        assert!(eval("!(a & b) ", "b"));
    }

    #[test]
    fn modifiers_apply_to_terms() {
        assert!(eval("astro*@", "Top.Science.Astronomy"));
        assert!(eval("Astronomy%", "Top.Hobbies.Amateurs_Astronomy"));
        assert!(!eval("Astronomy", "Top.Hobbies.Amateurs_Astronomy"));
        assert!(eval("Europe & Russia*@ & !Transportation", "Europe.russian_federation.Moscow"));
    }

    #[test]
    fn rejects_malformed_queries() {
        for bad in ["", "   ", "a &", "& a", "(a | b", "a | b)", "a b", "a - b", "!", "()", "@a"] {
            assert!(
                matches!(Ltxtquery::parse(bad), Err(Error::InvalidQuerySyntax(_))),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn display_keeps_meaning() {
        for text in ["a & b | c", "a & (b | c)", "!(a | b) & c", "!!!a", "a | b | c", "a & (b & c)"] {
            let query = Ltxtquery::parse(text).unwrap();
            let rendered = query.to_string();
            assert_eq!(Ltxtquery::parse(&rendered).unwrap(), query, "{text} -> {rendered}");
        }
        assert_eq!(
            Ltxtquery::parse("a&(b|c)").unwrap().to_string(),
            "a & (b | c)"
        );
    }

    #[test]
    fn negation_runs_collapse_by_parity() {
        assert_eq!(Ltxtquery::parse("!!a").unwrap(), Ltxtquery::parse("a").unwrap());

        let odd = format!("{}a", "!".repeat(50_001));
        let query = Ltxtquery::parse(&odd).unwrap();
        assert!(matches!(query, Ltxtquery::Not(_)));
        assert!(query.evaluate(&Path::parse("b").unwrap()));
        assert!(!query.evaluate(&Path::parse("a").unwrap()));

        let even = format!("{}a", "!".repeat(50_000));
        assert_eq!(Ltxtquery::parse(&even).unwrap(), Ltxtquery::parse("a").unwrap());
    }

    #[test]
    fn nesting_is_capped() {
        let ok = format!("{}a{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        assert!(eval(&ok, "a"));

        let deep = format!("{}a{}", "(".repeat(100_000), ")".repeat(100_000));
        assert!(matches!(
            Ltxtquery::parse(&deep),
            Err(Error::InvalidQuerySyntax(_))
        ));
        let unclosed = "(".repeat(100_000);
        assert!(matches!(
            Ltxtquery::parse(&unclosed),
            Err(Error::InvalidQuerySyntax(_))
        ));
    }

    #[test]
    fn long_chains_stay_flat() {
        let terms: Vec<String> = (0..50_000).map(|i| format!("t{i}")).collect();
        let query = Ltxtquery::parse(&terms.join(" | ")).unwrap();
        match &query {
            Ltxtquery::Or(parts) => assert_eq!(parts.len(), 50_000),
            other => panic!("expected a flat chain, got {other:?}"),
        }
        assert!(query.evaluate(&Path::parse("x.t49999").unwrap()));
        assert!(!query.evaluate(&Path::parse("x.y").unwrap()));
        assert_eq!(Ltxtquery::parse(&query.to_string()).unwrap(), query);
    }
}
