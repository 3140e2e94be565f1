//! Error types for the LLMInferenceService operator

use thiserror::Error;

/// Main error type for operator operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Validation error for LLMInferenceService specs
    #[error("validation error: {0}")]
    Validation(String),

    /// Preset composition error (base configuration could not be combined)
    #[error("failed to combine base configurations: {0}")]
    CombineBase(String),

    /// A referenced object (gateway, route, preset) does not exist
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        /// Resource kind
        kind: String,
        /// Resource name
        name: String,
        /// Resource namespace
        namespace: String,
    },

    /// URL discovery produced no externally addressable URL
    #[error("no external address found for gateway listeners")]
    ExternalAddressNotFound,

    /// A child object exists but is not controlled by the parent
    #[error("{kind} {namespace}/{name} is not controlled by LLMInferenceService {parent}")]
    NotOwned {
        /// Resource kind
        kind: String,
        /// Resource name
        name: String,
        /// Resource namespace
        namespace: String,
        /// Parent namespace/name
        parent: String,
    },

    /// TLS certificate material generation failed
    #[error("certificate generation failed: {0}")]
    CertificateGeneration(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a preset composition error with the given message
    pub fn combine_base(msg: impl Into<String>) -> Self {
        Self::CombineBase(msg.into())
    }

    /// Create a not-found error for a referenced object
    pub fn not_found(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Returns true if this error represents a missing external address.
    ///
    /// Callers use this to keep the parent in a pending state instead of
    /// failing the whole reconciliation.
    pub fn is_external_address_not_found(&self) -> bool {
        matches!(self, Self::ExternalAddressNotFound)
    }

    /// Returns true if the underlying Kubernetes API error is a 404
    pub fn is_api_not_found(&self) -> bool {
        matches!(self, Self::Kube(kube::Error::Api(ae)) if ae.code == 404)
    }

    /// Returns true if the underlying Kubernetes API error is a 409 conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Kube(kube::Error::Api(ae)) if ae.code == 409)
    }

    /// Short reason token surfaced in status conditions
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Kube(kube::Error::Api(ae)) if ae.code == 404 => "NotFound",
            Self::Kube(kube::Error::Api(ae)) if ae.code == 409 => "Conflict",
            Self::Kube(_) => "APIError",
            Self::Validation(_) => "Invalid",
            Self::CombineBase(_) => "CombineBaseError",
            Self::NotFound { .. } => "NotFound",
            Self::ExternalAddressNotFound => "ExternalAddressNotFound",
            Self::NotOwned { .. } => "NotOwned",
            Self::CertificateGeneration(_) => "CertificateError",
            Self::Serialization(_) => "SerializationError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Story: the admission webhook rejects misconfigured specs with a clear
    /// message, and callers can match on the Validation variant.
    #[test]
    fn story_validation_rejects_with_readable_message() {
        let err = Error::validation("spec.router.route.http: unsupported configuration");
        assert!(err.to_string().contains("validation error"));
        assert!(err.to_string().contains("unsupported configuration"));
        assert_eq!(err.reason(), "Invalid");

        match Error::validation("any message") {
            Error::Validation(msg) => assert_eq!(msg, "any message"),
            _ => panic!("expected Validation variant"),
        }
    }

    /// Story: a missing user-supplied gateway surfaces the kind and key so
    /// the status message points at the exact object.
    #[test]
    fn story_not_found_names_the_missing_object() {
        let err = Error::not_found("Gateway", "istio-system", "ingress");
        assert_eq!(err.to_string(), "Gateway istio-system/ingress not found");
        assert_eq!(err.reason(), "NotFound");
    }

    /// Story: URL discovery failures are a typed, testable error so the
    /// reconciler can keep Ready pending instead of retrying hot.
    #[test]
    fn story_external_address_not_found_is_testable() {
        let err = Error::ExternalAddressNotFound;
        assert!(err.is_external_address_not_found());
        assert!(!Error::validation("x").is_external_address_not_found());
    }

    /// Story: ownership violations refuse mutation and explain which parent
    /// was expected to control the child.
    #[test]
    fn story_ownership_violation_is_descriptive() {
        let err = Error::NotOwned {
            kind: "InferencePool".into(),
            name: "other-pool".into(),
            namespace: "default".into(),
            parent: "default/my-llm".into(),
        };
        assert!(err.to_string().contains("not controlled by"));
        assert!(err.to_string().contains("default/my-llm"));
    }

    /// Story: conflict classification drives the retry loops around status
    /// and route updates.
    #[test]
    fn story_conflicts_are_classified_for_retry() {
        let conflict = Error::Kube(kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".into(),
            message: "conflict".into(),
            reason: "Conflict".into(),
            code: 409,
        }));
        assert!(conflict.is_conflict());
        assert!(!conflict.is_api_not_found());
        assert_eq!(conflict.reason(), "Conflict");

        let not_found = Error::Kube(kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".into(),
            message: "not found".into(),
            reason: "NotFound".into(),
            code: 404,
        }));
        assert!(not_found.is_api_not_found());
        assert_eq!(not_found.reason(), "NotFound");
    }
}
