//! Custom resource definitions and foreign resource types
//!
//! - [`service`] / [`types`] - the LLMInferenceService CRD and its blocks
//! - [`preset`] - the LLMInferenceServiceConfig (base-configuration) CRD
//! - [`conditions`] - status conditions and readiness folding
//! - [`gwapi`] - Gateway API types (foreign, typed client only)
//! - [`gie`] - inference-extension types (foreign; v1 typed, v1alpha2 dynamic)
//! - [`lws`] - LeaderWorkerSet types (foreign, typed client only)

pub mod conditions;
pub mod gie;
pub mod gwapi;
pub mod lws;
pub mod preset;
pub mod service;
pub mod types;

pub use conditions::{Condition, ConditionSet, ConditionStatus};
pub use preset::{LLMInferenceServiceConfig, LLMInferenceServiceConfigSpec};
pub use service::{LLMInferenceService, LLMInferenceServiceSpec, LLMInferenceServiceStatus};
