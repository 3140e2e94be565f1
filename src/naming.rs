//! Deterministic child naming and identity labels
//!
//! Every resource owned by an LLMInferenceService derives its name from the
//! parent name plus a fixed suffix, and carries a standard label set that
//! child watches filter on.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::crd::LLMInferenceService;
use kube::ResourceExt;

/// Maximum length for Kubernetes resource names and label values
const MAX_KUBERNETES_NAME_LENGTH: usize = 63;

/// Number of hex characters from the hash appended when truncating
const HASH_LENGTH: usize = 8;

/// Space reserved for suffixes Kubernetes controllers append on their own
/// (ReplicaSet pod-template hash, StatefulSet ordinal, ...), so that names
/// of grandchildren stay within the 63-character limit.
const KUBERNETES_GENERATED_SUFFIX_LENGTH: usize = 12;

/// Value of the `app.kubernetes.io/part-of` label on every owned child
pub const PART_OF_LABEL_VALUE: &str = "llminferenceservice";

/// Create a child resource name by appending a suffix to the parent name.
///
/// Enforces `len(result) + 12 <= 63`. When the proposed name is too long the
/// parent portion is truncated and the first 8 hex characters of
/// SHA-256(parent) are inserted before the suffix, so that distinct parents
/// keep distinct children while the mapping stays deterministic.
pub fn child_name(parent: &str, suffix: &str) -> String {
    let proposed = format!("{parent}{suffix}");

    let max_allowed = MAX_KUBERNETES_NAME_LENGTH - KUBERNETES_GENERATED_SUFFIX_LENGTH;
    if proposed.len() <= max_allowed {
        return proposed;
    }

    let max_parent = max_allowed.saturating_sub(HASH_LENGTH + suffix.len());
    let truncated = &parent[..max_parent.min(parent.len())];

    let digest = Sha256::digest(parent.as_bytes());
    let hash = hex::encode(digest);

    format!("{truncated}{}{suffix}", &hash[..HASH_LENGTH])
}

/// Subsystem a child belongs to, recorded in `app.kubernetes.io/component`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Component {
    /// Inference workload (deployments, leader/worker groups, TLS secret)
    Workload,
    /// Router surface (HTTP routes)
    Router,
    /// Endpoint-picker scheduler and its satellites
    RouterScheduler,
}

impl Component {
    fn label_value(self) -> &'static str {
        match self {
            Component::Workload => "llminferenceservice-workload",
            Component::Router => "llminferenceservice-router",
            Component::RouterScheduler => "llminferenceservice-router-scheduler",
        }
    }
}

/// Standard identity labels for a child of the given parent
pub fn standard_labels(
    llm_svc: &LLMInferenceService,
    component: Component,
) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "app.kubernetes.io/part-of".to_string(),
            PART_OF_LABEL_VALUE.to_string(),
        ),
        ("app.kubernetes.io/name".to_string(), llm_svc.name_any()),
        (
            "app.kubernetes.io/component".to_string(),
            component.label_value().to_string(),
        ),
    ])
}

/// Labels selecting the scheduler deployment's pods
pub fn scheduler_labels(llm_svc: &LLMInferenceService) -> BTreeMap<String, String> {
    standard_labels(llm_svc, Component::RouterScheduler)
}

/// Labels selecting the inference workload pods
pub fn workload_labels(llm_svc: &LLMInferenceService) -> BTreeMap<String, String> {
    standard_labels(llm_svc, Component::Workload)
}

/// Labels on the managed HTTP route
pub fn router_labels(llm_svc: &LLMInferenceService) -> BTreeMap<String, String> {
    standard_labels(llm_svc, Component::Router)
}
