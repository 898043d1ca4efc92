//! Rule evaluation.
//!
//! The active rule set is an immutable snapshot swapped whole on every push,
//! so a request is always judged against exactly one pushed set. Match budgets
//! are atomic counters inside the snapshot; a budget unit is claimed with a
//! compare-and-decrement, so concurrent requests never exceed it.
//!
//! Sniffers are kept in a separate registry and only ever observe.

use dashmap::DashMap;
use rule_types::{Action, RequestView, Rule, RuleError, RuleSet, SniffId, SniffRequest};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// What the proxy must do to a request beyond forwarding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intercept {
    /// Forward, then replace the response status.
    Override {
        /// Replacement status.
        status: u16,
    },
    /// Answer with `status` without contacting upstream.
    Block {
        /// Synthetic status.
        status: u16,
    },
}

/// Outcome of evaluating one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decision {
    /// The single intercepting action that fired, if any.
    pub intercept: Option<Intercept>,
    /// Callback and sniffer URLs to notify after the exchange.
    pub notify: Vec<String>,
}

struct ActiveRule {
    rule: Rule,
    /// Remaining budget; `None` = unlimited.
    remaining: Option<AtomicU32>,
}

impl ActiveRule {
    fn new(rule: Rule) -> Self {
        let remaining = rule.action.budget().map(AtomicU32::new);
        Self { rule, remaining }
    }

    /// Claim one unit of budget. Exactly one caller wins each unit.
    fn try_claim(&self) -> bool {
        match &self.remaining {
            None => true,
            Some(remaining) => remaining
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
                .is_ok(),
        }
    }

    fn remaining(&self) -> Option<u32> {
        self.remaining.as_ref().map(|r| r.load(Ordering::Acquire))
    }
}

#[derive(Default)]
struct Snapshot {
    source: RuleSet,
    rules: Vec<ActiveRule>,
}

/// Holds the active rule set and the sniffer registry.
#[derive(Default)]
pub struct RuleEngine {
    active: RwLock<Arc<Snapshot>>,
    sniffers: DashMap<SniffId, Rule>,
}

impl std::fmt::Debug for RuleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleEngine")
            .field("sniffers", &self.sniffers.len())
            .finish_non_exhaustive()
    }
}

impl RuleEngine {
    /// Create an engine with no rules and no sniffers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the active rule set. On error the previous set stays active.
    pub async fn replace(&self, set: RuleSet) -> Result<(), RuleError> {
        let rules = set.compile()?.into_iter().map(ActiveRule::new).collect();
        let snapshot = Arc::new(Snapshot { source: set, rules });
        *self.active.write().await = snapshot;
        Ok(())
    }

    /// Remove every rule.
    pub async fn clear(&self) {
        *self.active.write().await = Arc::new(Snapshot::default());
    }

    /// The rule set as last pushed.
    pub async fn current(&self) -> RuleSet {
        self.active.read().await.source.clone()
    }

    /// Remaining budget of each intercepting rule, in evaluation order.
    pub async fn remaining_budgets(&self) -> Vec<Option<u32>> {
        self.active
            .read()
            .await
            .rules
            .iter()
            .filter(|r| r.rule.action.intercepts())
            .map(ActiveRule::remaining)
            .collect()
    }

    /// Register a read-only sniffer.
    pub fn add_sniffer(&self, request: &SniffRequest) -> Result<SniffId, RuleError> {
        let rule = request.compile()?;
        let id = SniffId::new();
        self.sniffers.insert(id, rule);
        Ok(id)
    }

    /// Remove a sniffer. Returns false if it was not registered.
    pub fn remove_sniffer(&self, id: &SniffId) -> bool {
        self.sniffers.remove(id).is_some()
    }

    /// Remove every sniffer.
    pub fn clear_sniffers(&self) {
        self.sniffers.clear();
    }

    /// Number of registered sniffers.
    pub fn sniffer_count(&self) -> usize {
        self.sniffers.len()
    }

    /// Evaluate a request against the active rules and sniffers.
    ///
    /// The first intercepting rule whose filter matches and which still has
    /// budget fires; a matching rule with an exhausted budget is skipped.
    /// Observers are collected independently of interception.
    pub async fn decide(&self, req: &RequestView<'_>) -> Decision {
        let snapshot = self.active.read().await.clone();
        let mut decision = Decision::default();

        for active in &snapshot.rules {
            if !active.rule.filter.matches(req) {
                continue;
            }
            match &active.rule.action {
                Action::Override { status, .. } | Action::Block { status, .. } => {
                    if decision.intercept.is_some() || !active.try_claim() {
                        continue;
                    }
                    decision.intercept = Some(match active.rule.action {
                        Action::Block { .. } => Intercept::Block { status: *status },
                        _ => Intercept::Override { status: *status },
                    });
                }
                other => {
                    if let Some(url) = other.notify_url() {
                        decision.notify.push(url.to_string());
                    }
                }
            }
        }

        for entry in self.sniffers.iter() {
            if entry.value().filter.matches(req) {
                if let Some(url) = entry.value().action.notify_url() {
                    decision.notify.push(url.to_string());
                }
            }
        }

        decision
    }
}
