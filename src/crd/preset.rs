//! LLMInferenceServiceConfig Custom Resource Definition
//!
//! A named base-configuration (preset) document. Its spec has the same shape
//! as the parent spec; the preset composer merges an ordered chain of these
//! documents below the user's declaration. Configs in the system namespace
//! are usable by every LLMInferenceService in the cluster.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::service::LLMInferenceServiceSpec;

/// Specification of a base-configuration document
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "serving.kserve.io",
    version = "v1alpha1",
    kind = "LLMInferenceServiceConfig",
    plural = "llminferenceserviceconfigs",
    shortname = "llmisvccfg",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct LLMInferenceServiceConfigSpec {
    /// The preset document, same shape as the parent spec
    #[serde(flatten)]
    pub spec: LLMInferenceServiceSpec,
}
