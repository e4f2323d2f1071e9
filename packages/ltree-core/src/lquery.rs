//! Structural path patterns in PostgreSQL `lquery` syntax.
//!
//! A pattern is a dot-separated list of segments. Each segment either matches any run of
//! labels (`*`, `*{n,m}`) or one label out of a set of alternatives (`a|b`, `{a,b}`),
//! optionally negated (`!a|b`) and repeated (`a{2}`). Alternatives accept the modifiers
//! `@` (case-insensitive), `*` (prefix match) and `%` (match underscore-separated words).

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::label::{is_label_byte, MAX_LABEL_LEN};
use crate::path::{Path, MAX_DEPTH};

const MAX_REPEAT: u16 = MAX_DEPTH as u16;

/// A single label alternative with its modifiers.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LabelPattern {
    text: String,
    case_insensitive: bool,
    prefix: bool,
    words: bool,
}

impl LabelPattern {
    /// Parse a label token with trailing `@`, `*`, `%` modifiers in any order.
    pub(crate) fn parse(token: &str) -> std::result::Result<Self, String> {
        let body = token.trim_end_matches(&['@', '*', '%'][..]);
        let modifiers = &token[body.len()..];
        if body.is_empty() {
            return Err(format!("missing label in '{token}'"));
        }
        if body.len() > MAX_LABEL_LEN {
            return Err(format!("label longer than {MAX_LABEL_LEN} characters"));
        }
        if let Some(bad) = body.bytes().find(|b| !is_label_byte(*b)) {
            return Err(format!("unexpected character {:?} in '{token}'", bad as char));
        }
        Ok(Self {
            text: body.to_string(),
            case_insensitive: modifiers.contains('@'),
            prefix: modifiers.contains('*'),
            words: modifiers.contains('%'),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn matches(&self, label: &str) -> bool {
        if self.words {
            // Every word of the pattern must match some word of the label.
            self.text
                .split('_')
                .all(|word| label.split('_').any(|candidate| self.compare(word, candidate)))
        } else {
            self.compare(&self.text, label)
        }
    }

    fn compare(&self, pattern: &str, label: &str) -> bool {
        let candidate = if self.prefix {
            match label.get(..pattern.len()) {
                Some(head) => head,
                None => return false,
            }
        } else {
            label
        };
        if self.case_insensitive {
            pattern.eq_ignore_ascii_case(candidate)
        } else {
            pattern == candidate
        }
    }
}

impl fmt::Display for LabelPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)?;
        if self.case_insensitive {
            f.write_str("@")?;
        }
        if self.prefix {
            f.write_str("*")?;
        }
        if self.words {
            f.write_str("%")?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Segment {
    /// `*`: any `min..=max` labels.
    Any { min: u16, max: u16 },
    /// `min..=max` labels, each matching one of `variants` (or none of them when negated).
    Labels {
        negated: bool,
        variants: Vec<LabelPattern>,
        min: u16,
        max: u16,
    },
}

impl Segment {
    fn bounds(&self) -> (usize, usize) {
        match self {
            Segment::Any { min, max } | Segment::Labels { min, max, .. } => {
                (*min as usize, *max as usize)
            }
        }
    }

    fn accepts(&self, label: &str) -> bool {
        match self {
            Segment::Any { .. } => true,
            Segment::Labels {
                negated, variants, ..
            } => variants.iter().any(|v| v.matches(label)) != *negated,
        }
    }
}

/// Compiled `lquery` pattern.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Lquery {
    segments: Vec<Segment>,
}

impl Lquery {
    pub fn parse(text: &str) -> Result<Self> {
        if text.is_empty() {
            return Err(Error::InvalidPatternSyntax("empty pattern".into()));
        }
        let segments = text
            .split('.')
            .map(parse_segment)
            .collect::<std::result::Result<Vec<_>, String>>()
            .map_err(|msg| Error::InvalidPatternSyntax(format!("{msg} in '{text}'")))?;
        if segments.len() > MAX_DEPTH {
            return Err(Error::InvalidPatternSyntax(format!(
                "{} segments exceed {MAX_DEPTH}",
                segments.len()
            )));
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Whether the whole of `path` matches the pattern.
    ///
    /// Walks the segments once, carrying the window of label positions the segments so far
    /// can end at. Work is bounded by `segments * labels` and the stack stays flat.
    pub fn matches(&self, path: &Path) -> bool {
        let labels: Vec<&str> = path.labels().iter().map(|l| l.as_str()).collect();
        let n = labels.len();
        // reach[k]: the segments seen so far can consume exactly `lo + k` labels.
        let mut lo = 0;
        let mut reach = vec![true];
        for segment in &self.segments {
            let (min, max) = segment.bounds();
            let hi = lo + reach.len() - 1;
            let start = lo + min;
            if start > n {
                return false;
            }
            let end = hi.saturating_add(max).min(n);

            let mut seen = Vec::with_capacity(reach.len() + 1);
            seen.push(0usize);
            for (k, &r) in reach.iter().enumerate() {
                seen.push(seen[k] + usize::from(r));
            }

            // run: accepted labels immediately before position j, counted from lo.
            let mut run = 0;
            let mut next = Vec::with_capacity(end + 1 - start);
            for j in lo..=end {
                if j > lo {
                    run = if segment.accepts(labels[j - 1]) { run + 1 } else { 0 };
                }
                if j < start {
                    continue;
                }
                let from = lo.max(j.saturating_sub(max)).max(j - run);
                let to = hi.min(j - min);
                next.push(from <= to && seen[to - lo + 1] > seen[from - lo]);
            }

            let (Some(first), Some(last)) = (
                next.iter().position(|&r| r),
                next.iter().rposition(|&r| r),
            ) else {
                return false;
            };
            lo = start + first;
            reach = next[first..=last].to_vec();
        }
        lo + reach.len() - 1 == n
    }
}

fn parse_segment(text: &str) -> std::result::Result<Segment, String> {
    if text.is_empty() {
        return Err("empty segment".into());
    }
    if let Some(rest) = text.strip_prefix('*') {
        let (min, max) = if rest.is_empty() {
            (0, MAX_REPEAT)
        } else {
            parse_quantifier(rest)?
        };
        return Ok(Segment::Any { min, max });
    }

    let (negated, body) = match text.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (alternatives, quantifier) = if let Some(inner) = body.strip_prefix('{') {
        let close = inner
            .find('}')
            .ok_or_else(|| format!("unclosed '{{' in '{text}'"))?;
        (inner[..close].split(',').collect::<Vec<_>>(), &inner[close + 1..])
    } else {
        let split = body.find('{').unwrap_or(body.len());
        (body[..split].split('|').collect(), &body[split..])
    };
    let variants = alternatives
        .into_iter()
        .map(LabelPattern::parse)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let (min, max) = if quantifier.is_empty() {
        (1, 1)
    } else {
        parse_quantifier(quantifier)?
    };
    Ok(Segment::Labels {
        negated,
        variants,
        min,
        max,
    })
}

/// `{n}`, `{n,}`, `{,m}` or `{n,m}`.
fn parse_quantifier(text: &str) -> std::result::Result<(u16, u16), String> {
    let inner = text
        .strip_prefix('{')
        .and_then(|t| t.strip_suffix('}'))
        .ok_or_else(|| format!("malformed quantifier '{text}'"))?;
    let number = |s: &str| -> std::result::Result<u16, String> {
        s.parse::<u16>()
            .map_err(|_| format!("bad repeat count '{s}'"))
    };
    let (min, max) = match inner.split_once(',') {
        None => {
            let n = number(inner)?;
            (n, n)
        }
        Some((lo, hi)) => {
            let min = if lo.is_empty() { 0 } else { number(lo)? };
            let max = if hi.is_empty() { MAX_REPEAT } else { number(hi)? };
            (min, max)
        }
    };
    if min > max {
        return Err(format!("quantifier '{text}' has min above max"));
    }
    Ok((min, max))
}

fn write_quantifier(f: &mut fmt::Formatter<'_>, min: u16, max: u16) -> fmt::Result {
    if min == max {
        write!(f, "{{{min}}}")
    } else if max == MAX_REPEAT {
        write!(f, "{{{min},}}")
    } else if min == 0 {
        write!(f, "{{,{max}}}")
    } else {
        write!(f, "{{{min},{max}}}")
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Any { min, max } => {
                f.write_str("*")?;
                if (*min, *max) != (0, MAX_REPEAT) {
                    write_quantifier(f, *min, *max)?;
                }
            }
            Segment::Labels {
                negated,
                variants,
                min,
                max,
            } => {
                if *negated {
                    f.write_str("!")?;
                }
                for (i, variant) in variants.iter().enumerate() {
                    if i > 0 {
                        f.write_str("|")?;
                    }
                    write!(f, "{variant}")?;
                }
                if (*min, *max) != (1, 1) {
                    write_quantifier(f, *min, *max)?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Lquery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for Lquery {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Lquery::parse(s)
    }
}
