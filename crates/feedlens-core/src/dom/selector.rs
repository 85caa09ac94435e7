//! Selector subset used against feed markup.
//!
//! Supported grammar: comma-separated alternatives, each a chain of compound
//! selectors joined by whitespace (descendant combinator). A compound is an
//! optional tag name followed by any number of `.class`, `[attr]` and
//! `[attr="value"]` terms.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Attribute condition inside a compound selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrSelector {
    pub name: String,
    pub value: Option<String>,
}

/// One compound selector (`button.cls[data-x]`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compound {
    pub tag: Option<String>,
    pub classes: Vec<String>,
    pub attrs: Vec<AttrSelector>,
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none() && self.classes.is_empty() && self.attrs.is_empty()
    }
}

/// Descendant chain; the last compound is the subject.
pub type Complex = Vec<Compound>;

/// A parsed selector list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    alternatives: Vec<Complex>,
}

impl Selector {
    /// Parse a selector list.
    pub fn parse(source: &str) -> Result<Self> {
        let mut alternatives = Vec::new();
        for part in source.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(Error::Markup(format!("empty selector in '{}'", source)));
            }
            alternatives.push(parse_complex(part)?);
        }
        Ok(Self {
            source: source.to_string(),
            alternatives,
        })
    }

    pub fn alternatives(&self) -> &[Complex] {
        &self.alternatives
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl FromStr for Selector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_complex(input: &str) -> Result<Complex> {
    let mut chain = Vec::new();
    let mut chars = input.chars().peekable();
    let mut current = Compound::default();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
                if !current.is_empty() {
                    chain.push(std::mem::take(&mut current));
                }
            }
            '.' => {
                chars.next();
                let name = take_ident(&mut chars);
                if name.is_empty() {
                    return Err(Error::Markup(format!("missing class name in '{}'", input)));
                }
                current.classes.push(name);
            }
            '[' => {
                chars.next();
                current.attrs.push(parse_attr(&mut chars, input)?);
            }
            c if is_ident_char(c) => {
                if current.tag.is_some() || !current.is_empty() {
                    return Err(Error::Markup(format!("unexpected tag name in '{}'", input)));
                }
                current.tag = Some(take_ident(&mut chars).to_ascii_lowercase());
            }
            other => {
                return Err(Error::Markup(format!(
                    "unsupported character '{}' in selector '{}'",
                    other, input
                )));
            }
        }
    }

    if !current.is_empty() {
        chain.push(current);
    }
    if chain.is_empty() {
        return Err(Error::Markup(format!("empty selector '{}'", input)));
    }
    Ok(chain)
}

fn parse_attr(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    input: &str,
) -> Result<AttrSelector> {
    let name = take_ident(chars);
    if name.is_empty() {
        return Err(Error::Markup(format!("missing attribute name in '{}'", input)));
    }
    match chars.next() {
        Some(']') => Ok(AttrSelector { name, value: None }),
        Some('=') => {
            let value = match chars.peek() {
                Some(&q) if q == '"' || q == '\'' => {
                    chars.next();
                    let mut value = String::new();
                    loop {
                        match chars.next() {
                            Some(c) if c == q => break,
                            Some(c) => value.push(c),
                            None => {
                                return Err(Error::Markup(format!(
                                    "unterminated attribute value in '{}'",
                                    input
                                )));
                            }
                        }
                    }
                    value
                }
                _ => take_ident(chars),
            };
            match chars.next() {
                Some(']') => Ok(AttrSelector {
                    name,
                    value: Some(value),
                }),
                _ => Err(Error::Markup(format!("missing ']' in '{}'", input))),
            }
        }
        _ => Err(Error::Markup(format!("malformed attribute selector in '{}'", input))),
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn take_ident(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut ident = String::new();
    while let Some(&c) = chars.peek() {
        if !is_ident_char(c) {
            break;
        }
        ident.push(c);
        chars.next();
    }
    ident
}
