//! Status conditions and readiness aggregation
//!
//! Leaf conditions are set by the individual sub-reconcilers; the two
//! roll-ups (`WorkloadReady`, `RouterReady`) and the top-level `Ready`
//! condition are folded from them with first-false-wins semantics over a
//! statically declared order.

use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition type for preset composition
pub const PRESETS_COMBINED: &str = "PresetsCombined";
/// Condition type for the main (decode) workload
pub const MAIN_WORKLOAD_READY: &str = "MainWorkloadReady";
/// Condition type for the multi-node worker group
pub const WORKER_WORKLOAD_READY: &str = "WorkerWorkloadReady";
/// Condition type for the prefill workload
pub const PREFILL_WORKLOAD_READY: &str = "PrefillWorkloadReady";
/// Condition type for the prefill worker group
pub const PREFILL_WORKER_WORKLOAD_READY: &str = "PrefillWorkerWorkloadReady";
/// Roll-up condition over the workload leaves
pub const WORKLOAD_READY: &str = "WorkloadReady";
/// Condition type for referenced/default gateways
pub const GATEWAYS_READY: &str = "GatewaysReady";
/// Condition type for managed/referenced HTTP routes
pub const HTTP_ROUTES_READY: &str = "HTTPRoutesReady";
/// Condition type for the paired inference pools
pub const INFERENCE_POOLS_READY: &str = "InferencePoolsReady";
/// Condition type for the endpoint-picker scheduler deployment
pub const SCHEDULER_WORKLOAD_READY: &str = "SchedulerWorkloadReady";
/// Roll-up condition over the router leaves
pub const ROUTER_READY: &str = "RouterReady";
/// Top-level readiness condition
pub const READY: &str = "Ready";

/// Fold order for the workload roll-up
pub const WORKLOAD_FOLD_ORDER: [&str; 4] = [
    MAIN_WORKLOAD_READY,
    WORKER_WORKLOAD_READY,
    PREFILL_WORKLOAD_READY,
    PREFILL_WORKER_WORKLOAD_READY,
];

/// Fold order for the router roll-up
pub const ROUTER_FOLD_ORDER: [&str; 4] = [
    GATEWAYS_READY,
    HTTP_ROUTES_READY,
    INFERENCE_POOLS_READY,
    SCHEDULER_WORKLOAD_READY,
];

/// Condition truth value
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// The condition holds
    True,
    /// The condition does not hold
    False,
    /// The condition has not been evaluated yet
    #[default]
    Unknown,
}

/// One entry in the parent's status condition set
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type token
    #[serde(rename = "type")]
    pub type_: String,

    /// Truth value
    pub status: ConditionStatus,

    /// Short machine-readable reason for the current status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// RFC 3339 timestamp of the last status flip
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

impl Condition {
    /// Create a condition with the given type and status
    pub fn new(type_: impl Into<String>, status: ConditionStatus) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: None,
            message: None,
            last_transition_time: None,
        }
    }

    /// Attach a reason and message, returning self for chaining
    pub fn with_reason(mut self, reason: impl Into<String>, message: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self.message = Some(message.into());
        self
    }

    /// True iff status is True
    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }

    /// True iff status is False
    pub fn is_false(&self) -> bool {
        self.status == ConditionStatus::False
    }
}

/// Fold an ordered list of conditions into a roll-up condition.
///
/// The first False condition wins and donates its reason and message. When
/// nothing is False, any Unknown condition degrades the roll-up to Unknown.
/// Unset conditions are vacuously satisfied; all-True (or empty) folds True.
pub fn fold_conditions(
    conditions: &[Condition],
    order: &[&str],
    rollup_type: &str,
) -> Condition {
    let lookup = |type_: &str| conditions.iter().find(|c| c.type_ == type_);

    for type_ in order {
        if let Some(cond) = lookup(type_) {
            if cond.is_false() {
                return Condition::new(rollup_type, ConditionStatus::False).with_reason(
                    cond.reason.clone().unwrap_or_default(),
                    cond.message.clone().unwrap_or_default(),
                );
            }
        }
    }

    for type_ in order {
        if let Some(cond) = lookup(type_) {
            if cond.status == ConditionStatus::Unknown {
                return Condition::new(rollup_type, ConditionStatus::Unknown).with_reason(
                    cond.reason.clone().unwrap_or_default(),
                    cond.message.clone().unwrap_or_default(),
                );
            }
        }
    }

    Condition::new(rollup_type, ConditionStatus::True)
}

/// Mutable view over a condition list with transition-time bookkeeping
pub trait ConditionSet {
    /// The underlying condition list
    fn conditions_mut(&mut self) -> &mut Vec<Condition>;
    /// Immutable access to the condition list
    fn conditions(&self) -> &[Condition];

    /// Look up a condition by type
    fn get_condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions().iter().find(|c| c.type_ == type_)
    }

    /// Insert or replace a condition, stamping the transition time when the
    /// status actually changes
    fn set_condition(&mut self, mut condition: Condition) {
        let conditions = self.conditions_mut();
        let previous = conditions.iter().position(|c| c.type_ == condition.type_);

        let transitioned = previous
            .map(|i| conditions[i].status != condition.status)
            .unwrap_or(true);
        if transitioned {
            condition.last_transition_time = Some(Utc::now().to_rfc3339());
        } else if let Some(i) = previous {
            condition.last_transition_time = conditions[i].last_transition_time.clone();
        }

        match previous {
            Some(i) => conditions[i] = condition,
            None => conditions.push(condition),
        }
    }

    /// Mark a condition True
    fn mark_true(&mut self, type_: &str) {
        self.set_condition(Condition::new(type_, ConditionStatus::True));
    }

    /// Mark a condition False with a reason and message
    fn mark_false(&mut self, type_: &str, reason: &str, message: &str) {
        self.set_condition(
            Condition::new(type_, ConditionStatus::False).with_reason(reason, message),
        );
    }

    /// Mark a condition Unknown with a reason and message
    fn mark_unknown(&mut self, type_: &str, reason: &str, message: &str) {
        self.set_condition(
            Condition::new(type_, ConditionStatus::Unknown).with_reason(reason, message),
        );
    }
}
