//! Sniffer subscription wire types.
//!
//! Sniffers live apart from the rule set: pushing rules never removes them and
//! they never consume a rule's match budget.

use crate::error::RuleError;
use crate::filter::Filter;
use crate::rules::{validate_callback_url, Action, Rule};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Body of `POST /sniffers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SniffRequest {
    /// Which exchanges to observe.
    pub filter: Filter,
    /// Where to deliver them.
    pub callback_url: String,
}

impl SniffRequest {
    /// Validate and convert into a [`Rule`] with [`Action::Sniff`].
    pub fn compile(&self) -> Result<Rule, RuleError> {
        validate_callback_url(&self.callback_url)?;
        Ok(Rule {
            filter: self.filter.clone(),
            action: Action::Sniff {
                url: self.callback_url.clone(),
            },
        })
    }
}

/// Identifier of a registered sniffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SniffId(Uuid);

impl SniffId {
    /// A fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from the textual form used in URLs.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for SniffId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SniffId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Response to `POST /sniffers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SniffCreated {
    /// Id to pass to `DELETE /sniffers/{id}`.
    pub id: SniffId,
}
