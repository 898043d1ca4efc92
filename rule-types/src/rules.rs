//! Rule sets as pushed over the administrative channel, and their compiled form.
//!
//! The wire document has one optional top-level key per action kind:
//!
//! ```json
//! {
//!   "statuscode": {"return_status": 504, "filter": "~u .*/keys/query.*",
//!                  "block_request": true, "count": 3},
//!   "callback":   {"callback_url": "http://host:1234", "filter": "~u .*/keys/query.*"}
//! }
//! ```
//!
//! Absent keys mean that action kind is inactive. Unknown keys are rejected at
//! every level. A push always replaces the whole active set.

use crate::error::RuleError;
use crate::filter::Filter;
use serde::{Deserialize, Serialize};

/// The rule document accepted by `PUT /rules`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSet {
    /// Status override / block rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statuscode: Option<StatusCodeOptions>,
    /// Callback notification rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<CallbackOptions>,
}

/// Parameters of the `statuscode` action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusCodeOptions {
    /// Status code returned to the client.
    pub return_status: u16,
    /// Which requests are intercepted.
    pub filter: Filter,
    /// Short-circuit: never forward the request upstream.
    #[serde(default, skip_serializing_if = "is_false")]
    pub block_request: bool,
    /// Number of matches before the rule disables itself. Absent = unlimited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

/// Parameters of the `callback` action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CallbackOptions {
    /// Where the proxy POSTs each observed exchange.
    pub callback_url: String,
    /// Which requests are reported.
    pub filter: Filter,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl StatusCodeOptions {
    /// Rewrite the status of requests matching `filter` to `status`.
    pub fn new(status: u16, filter: Filter) -> Self {
        Self {
            return_status: status,
            filter,
            block_request: false,
            count: None,
        }
    }

    /// Answer directly instead of forwarding upstream.
    pub fn block(mut self) -> Self {
        self.block_request = true;
        self
    }

    /// Stop intercepting after `n` matches.
    pub fn count(mut self, n: u32) -> Self {
        self.count = Some(n);
        self
    }
}

impl RuleSet {
    /// An empty rule set (clears all rules when pushed).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the status override rule.
    pub fn with_status_code(mut self, options: StatusCodeOptions) -> Self {
        self.statuscode = Some(options);
        self
    }

    /// Set the callback rule.
    pub fn with_callback(mut self, callback_url: impl Into<String>, filter: Filter) -> Self {
        self.callback = Some(CallbackOptions {
            callback_url: callback_url.into(),
            filter,
        });
        self
    }

    /// True if no action kind is active.
    pub fn is_empty(&self) -> bool {
        self.statuscode.is_none() && self.callback.is_none()
    }

    /// Decode a rule document, rejecting unknown keys.
    pub fn from_json(bytes: &[u8]) -> Result<Self, RuleError> {
        serde_json::from_slice(bytes).map_err(|e| RuleError::Malformed(e.to_string()))
    }

    /// Validate and convert into typed rules, action rules first.
    pub fn compile(&self) -> Result<Vec<Rule>, RuleError> {
        let mut rules = Vec::with_capacity(2);

        if let Some(sc) = &self.statuscode {
            if !(100..=599).contains(&sc.return_status) {
                return Err(RuleError::InvalidStatus(sc.return_status));
            }
            if sc.count == Some(0) {
                return Err(RuleError::ZeroBudget);
            }
            let action = if sc.block_request {
                Action::Block {
                    status: sc.return_status,
                    budget: sc.count,
                }
            } else {
                Action::Override {
                    status: sc.return_status,
                    budget: sc.count,
                }
            };
            rules.push(Rule {
                filter: sc.filter.clone(),
                action,
            });
        }

        if let Some(cb) = &self.callback {
            validate_callback_url(&cb.callback_url)?;
            rules.push(Rule {
                filter: cb.filter.clone(),
                action: Action::Callback {
                    url: cb.callback_url.clone(),
                },
            });
        }

        Ok(rules)
    }
}

pub(crate) fn validate_callback_url(url: &str) -> Result<(), RuleError> {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"));
    match rest {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(RuleError::InvalidCallbackUrl(url.to_string())),
    }
}

/// A compiled rule: filter plus one typed action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Which requests the rule applies to.
    pub filter: Filter,
    /// What happens to them.
    pub action: Action,
}

/// What a rule does to matching traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Forward upstream, then replace the response status.
    Override {
        /// Replacement status.
        status: u16,
        /// Remaining-match budget; `None` = unlimited.
        budget: Option<u32>,
    },
    /// Answer with `status` without contacting upstream.
    Block {
        /// Synthetic status.
        status: u16,
        /// Remaining-match budget; `None` = unlimited.
        budget: Option<u32>,
    },
    /// Report the exchange to `url` (lives in the rule set).
    Callback {
        /// Callback target.
        url: String,
    },
    /// Report the exchange to `url` (lives in the sniffer registry).
    Sniff {
        /// Callback target.
        url: String,
    },
}

impl Action {
    /// True for actions that alter the exchange (at most one fires per request).
    pub fn intercepts(&self) -> bool {
        matches!(self, Action::Override { .. } | Action::Block { .. })
    }

    /// The match budget of an intercepting action.
    pub fn budget(&self) -> Option<u32> {
        match self {
            Action::Override { budget, .. } | Action::Block { budget, .. } => *budget,
            _ => None,
        }
    }

    /// Where observations go, for observing actions.
    pub fn notify_url(&self) -> Option<&str> {
        match self {
            Action::Callback { url } | Action::Sniff { url } => Some(url),
            _ => None,
        }
    }
}
