//! Gateway API inference extension resource types (foreign)
//!
//! The canonical InferencePool is the typed v1 resource in the
//! `inference.networking.k8s.io` group. Its v1alpha2 sibling (and the
//! v1alpha2 InferenceModel) in the legacy `inference.networking.x-k8s.io`
//! group are only ever handled dynamically, so environments that removed the
//! alpha CRDs keep working.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition as MetaCondition;
use kube::api::ApiResource;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// API group of the v1 inference extension
pub const INFERENCE_GROUP_V1: &str = "inference.networking.k8s.io";

/// API group of the legacy v1alpha2 inference extension
pub const INFERENCE_GROUP_ALPHA2: &str = "inference.networking.x-k8s.io";

/// Well-known endpoint-picker gRPC port, defaulted when the ref has none
pub const DEFAULT_ENDPOINT_PICKER_PORT: i32 = 9002;

/// Dynamic descriptor for v1alpha2 InferencePool
pub fn alpha2_pool_resource() -> ApiResource {
    ApiResource {
        group: INFERENCE_GROUP_ALPHA2.to_string(),
        version: "v1alpha2".to_string(),
        api_version: format!("{INFERENCE_GROUP_ALPHA2}/v1alpha2"),
        kind: "InferencePool".to_string(),
        plural: "inferencepools".to_string(),
    }
}

/// Dynamic descriptor for v1alpha2 InferenceModel
pub fn alpha2_model_resource() -> ApiResource {
    ApiResource {
        group: INFERENCE_GROUP_ALPHA2.to_string(),
        version: "v1alpha2".to_string(),
        api_version: format!("{INFERENCE_GROUP_ALPHA2}/v1alpha2"),
        kind: "InferenceModel".to_string(),
        plural: "inferencemodels".to_string(),
    }
}

/// v1 InferencePool specification
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "inference.networking.k8s.io",
    version = "v1",
    kind = "InferencePool",
    namespaced,
    status = "InferencePoolStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct InferencePoolSpec {
    /// Pods serving the model
    #[serde(default)]
    pub selector: PoolSelector,

    /// Inference server ports on the selected pods
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_ports: Vec<PoolPort>,

    /// Endpoint picker that routes across the selected pods
    #[serde(default)]
    pub endpoint_picker_ref: EndpointPickerRef,
}

/// Label selector over the pool's pods
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PoolSelector {
    /// Exact label matches
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
}

/// A single port number
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PoolPort {
    /// Port number
    pub number: i32,
}

/// Reference to the endpoint-picker extension
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EndpointPickerRef {
    /// API group of the picker; empty means core
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    /// Kind of the picker, defaulting to Service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Name of the picker
    pub name: String,

    /// Port the picker listens on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<PoolPort>,

    /// Behavior when the picker is unreachable, defaulting to FailClose
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_mode: Option<String>,
}

/// v1 InferencePool status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InferencePoolStatus {
    /// Per-parent acceptance state written by gateway controllers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<PoolParentStatus>,
}

/// Status reported for one parent of the pool
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PoolParentStatus {
    /// The parent this entry refers to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_ref: Option<PoolParentRef>,

    /// Conditions (`Accepted`, `ResolvedRefs`, ...)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<MetaCondition>,
}

/// Reference from the pool status to a parent resource
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PoolParentRef {
    /// Parent API group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    /// Parent kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Parent name
    #[serde(default)]
    pub name: String,

    /// Parent namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}
