//! Filter expressions.
//!
//! A filter is a whitespace-separated list of predicates, all of which must
//! match (logical AND):
//!
//! | Token         | Matches against                                   |
//! |---------------|---------------------------------------------------|
//! | `~u <regex>`  | request path including the query string           |
//! | `~hq <regex>` | any request header rendered as `name: value`      |
//! | `~m <method>` | request method, case-insensitive                  |
//!
//! An argument containing whitespace is wrapped in double quotes, as in
//! `~hq "Bearer bob"`. Inside quotes `\"` is a literal quote; every other
//! backslash is passed to the regex unchanged.
//!
//! ```
//! use rule_types::{Filter, RequestView};
//! use std::collections::BTreeMap;
//!
//! let filter: Filter = "~u .*/keys/query.* ~m POST".parse().unwrap();
//! let headers = BTreeMap::new();
//! let req = RequestView::new("POST", "/_matrix/client/v3/keys/query", &headers);
//! assert!(filter.matches(&req));
//! ```

use crate::error::RuleError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The parts of an incoming request a filter can inspect.
#[derive(Debug, Clone, Copy)]
pub struct RequestView<'a> {
    /// HTTP method.
    pub method: &'a str,
    /// Path and query, e.g. `/sync?timeout=0`.
    pub path: &'a str,
    /// Request headers, lower-case names.
    pub headers: &'a BTreeMap<String, String>,
}

impl<'a> RequestView<'a> {
    /// Create a view over a request.
    pub fn new(method: &'a str, path: &'a str, headers: &'a BTreeMap<String, String>) -> Self {
        Self {
            method,
            path,
            headers,
        }
    }
}

/// A single predicate of a filter expression.
#[derive(Debug, Clone)]
pub enum Predicate {
    /// `~u`: regex searched in the path and query.
    Url(Regex),
    /// `~hq`: regex searched in each `name: value` request header line.
    RequestHeader(Regex),
    /// `~m`: exact method match.
    Method(String),
}

impl Predicate {
    fn matches(&self, req: &RequestView<'_>) -> bool {
        match self {
            Predicate::Url(re) => re.is_match(req.path),
            Predicate::RequestHeader(re) => req
                .headers
                .iter()
                .any(|(name, value)| re.is_match(&format!("{}: {}", name, value))),
            Predicate::Method(method) => method.eq_ignore_ascii_case(req.method),
        }
    }
}

/// A parsed filter expression.
///
/// Serializes as its source string, so it round-trips through the rule JSON
/// unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Filter {
    source: String,
    predicates: Vec<Predicate>,
}

impl Filter {
    /// Parse a filter expression.
    pub fn parse(expr: &str) -> Result<Self, RuleError> {
        let mut predicates = Vec::new();
        let tokens = tokenize(expr)?;
        let mut tokens = tokens.iter().map(String::as_str);

        while let Some(token) = tokens.next() {
            let predicate = match token {
                "~u" => Predicate::Url(compile(next_arg(&mut tokens, token)?)?),
                "~hq" => Predicate::RequestHeader(compile(next_arg(&mut tokens, token)?)?),
                "~m" => Predicate::Method(next_arg(&mut tokens, token)?.to_ascii_uppercase()),
                other => return Err(RuleError::UnknownPredicate(other.to_string())),
            };
            predicates.push(predicate);
        }

        if predicates.is_empty() {
            return Err(RuleError::EmptyFilter);
        }

        Ok(Self {
            source: expr.trim().to_string(),
            predicates,
        })
    }

    /// Filter matching any request whose path contains `fragment` literally.
    ///
    /// `Filter::path_contains("/sync")` is `~u .*/sync.*`.
    pub fn path_contains(fragment: &str) -> Result<Self, RuleError> {
        let pattern = format!(".*{}.*", regex::escape(fragment));
        Self::parse(&format!("~u {}", quote(&pattern)))
    }

    /// Returns true if every predicate matches the request.
    pub fn matches(&self, req: &RequestView<'_>) -> bool {
        self.predicates.iter().all(|p| p.matches(req))
    }

    /// The expression as written.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// The parsed predicates.
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }
}

/// Split on whitespace, keeping `"..."` runs together as one token.
fn tokenize(expr: &str) -> Result<Vec<String>, RuleError> {
    let mut tokens = Vec::new();
    let mut chars = expr.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let mut token = String::new();
        if c == '"' {
            chars.next();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '"' => {
                        closed = true;
                        break;
                    }
                    '\\' if chars.peek() == Some(&'"') => {
                        token.push('"');
                        chars.next();
                    }
                    c => token.push(c),
                }
            }
            if !closed {
                return Err(RuleError::UnterminatedQuote(expr.to_string()));
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                token.push(c);
                chars.next();
            }
        }
        tokens.push(token);
    }

    Ok(tokens)
}

/// Quote `arg` if it would not survive [`tokenize`] as a single token.
fn quote(arg: &str) -> String {
    if arg.is_empty() || arg.contains(|c: char| c.is_whitespace() || c == '"') {
        format!("\"{}\"", arg.replace('"', "\\\""))
    } else {
        arg.to_string()
    }
}

fn next_arg<'a>(
    tokens: &mut impl Iterator<Item = &'a str>,
    predicate: &str,
) -> Result<&'a str, RuleError> {
    tokens
        .next()
        .ok_or_else(|| RuleError::MissingArgument(predicate.to_string()))
}

fn compile(pattern: &str) -> Result<Regex, RuleError> {
    Regex::new(pattern).map_err(|source| RuleError::InvalidRegex {
        pattern: pattern.to_string(),
        source,
    })
}

impl PartialEq for Filter {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Filter {}

impl FromStr for Filter {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Filter {
    type Error = RuleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Filter> for String {
    fn from(filter: Filter) -> Self {
        filter.source
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
