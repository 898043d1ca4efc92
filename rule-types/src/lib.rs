//! # rule-types
//!
//! Wire format types shared by the faultline reverse proxy and the test harness
//! that drives it.
//!
//! - [`RuleSet`] - The JSON document pushed over the administrative channel
//! - [`Rule`], [`Action`] - Compiled, strongly typed form of a rule set
//! - [`Filter`] - Filter expressions (`~u`, `~hq`, `~m`)
//! - [`CallbackEvent`] - One observed request/response exchange
//! - [`SniffRequest`], [`SniffId`] - Read-only sniffer subscriptions
//! - [`RuleError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod event;
mod filter;
mod rules;
mod sniff;

pub use error::RuleError;
pub use event::CallbackEvent;
pub use filter::{Filter, Predicate, RequestView};
pub use rules::{Action, CallbackOptions, Rule, RuleSet, StatusCodeOptions};
pub use sniff::{SniffCreated, SniffId, SniffRequest};
