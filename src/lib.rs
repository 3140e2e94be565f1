//! llmisvc - Kubernetes operator for LLMInferenceService resources
//!
//! From a single declarative LLMInferenceService (a model URI, a workload
//! shape, an optional prefill twin and an optional router), the operator
//! derives and continuously converges a runnable LLM serving topology: a
//! single-node deployment or a multi-node leader/worker group, an
//! endpoint-picker scheduler with its RBAC, paired v1/v1alpha2 inference
//! pools, a managed HTTP route on a gateway, a self-signed TLS secret and
//! network-isolation policies.
//!
//! # Modules
//!
//! - [`crd`] - Custom Resource Definitions and foreign resource types
//! - [`controller`] - Reconciliation control plane (one pass per change)
//! - [`presets`] - Base-configuration (preset) composition
//! - [`validation`] - Spec admission validation
//! - [`webhook`] - Validating admission webhook
//! - [`naming`] - Deterministic child naming and identity labels
//! - [`semantic`] - Derivative semantic equality for update decisions
//! - [`config`] - Process-wide operator configuration
//! - [`retry`] - Conflict-retry helpers
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod naming;
pub mod presets;
pub mod retry;
pub mod semantic;
pub mod validation;
pub mod webhook;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
