//! Error types for rule parsing and validation.

use thiserror::Error;

/// Errors raised while parsing filters or validating rule sets.
#[derive(Debug, Error)]
pub enum RuleError {
    /// Filter expression contained no predicates
    #[error("empty filter expression")]
    EmptyFilter,

    /// Unknown predicate token (e.g. `~x`)
    #[error("unknown filter predicate: {0}")]
    UnknownPredicate(String),

    /// Predicate given without its argument
    #[error("filter predicate {0} requires an argument")]
    MissingArgument(String),

    /// A `"` opened an argument that never closed
    #[error("unterminated quote in filter: {0}")]
    UnterminatedQuote(String),

    /// Predicate regex failed to compile
    #[error("invalid regex {pattern:?}: {source}")]
    InvalidRegex {
        /// The offending pattern.
        pattern: String,
        /// Underlying regex error.
        source: regex::Error,
    },

    /// Status code outside 100..=599
    #[error("invalid status code: {0}")]
    InvalidStatus(u16),

    /// A match budget of zero would never fire
    #[error("match budget must be at least 1")]
    ZeroBudget,

    /// Callback URL is not an http(s) URL
    #[error("invalid callback url: {0}")]
    InvalidCallbackUrl(String),

    /// JSON document failed to decode (includes unknown keys)
    #[error("malformed rule document: {0}")]
    Malformed(String),
}
