//! Process-wide operator configuration
//!
//! All knobs that vary per cluster (system namespace, ingress gateway,
//! platform namespaces for network policies, the global auth switch) are
//! collected into one struct that is built once at startup and injected into
//! the controller context. Nothing in here is a singleton, so tests can vary
//! the configuration per scenario.

use kube::ResourceExt;

use crate::crd::LLMInferenceService;

/// Annotation on the parent that opts a single service out of auth
pub const ENABLE_AUTH_ANNOTATION: &str = "security.opendatahub.io/enable-auth";

/// Operator-wide configuration resolved from the environment at startup
#[derive(Clone, Debug)]
pub struct OperatorConfig {
    /// Namespace the operator (and its shared presets) live in
    pub system_namespace: String,
    /// Name of the default ingress gateway used by managed routes
    pub ingress_gateway_name: String,
    /// Namespace of the default ingress gateway
    pub ingress_gateway_namespace: String,
    /// When true, no auth-delegator bindings are created for any service
    pub auth_disabled: bool,
    /// Platform namespace labels used by the network-policy reconciler
    pub platform: PlatformNamespaces,
}

/// Platform-dependent namespaces referenced by network policies
#[derive(Clone, Debug)]
pub struct PlatformNamespaces {
    /// Cluster monitoring namespace (metrics scraping ingress)
    pub monitoring: String,
    /// User-workload monitoring namespace (metrics scraping ingress)
    pub user_workload_monitoring: String,
    /// Namespace hosting the kube-apiserver endpoints (scheduler egress)
    pub kube_api_server: String,
    /// DNS namespace (scheduler egress)
    pub dns: String,
}

impl Default for PlatformNamespaces {
    fn default() -> Self {
        Self {
            monitoring: "openshift-monitoring".to_string(),
            user_workload_monitoring: "openshift-user-workload-monitoring".to_string(),
            kube_api_server: "openshift-kube-apiserver".to_string(),
            dns: "openshift-dns".to_string(),
        }
    }
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            system_namespace: "kserve".to_string(),
            ingress_gateway_name: "kserve-ingress-gateway".to_string(),
            ingress_gateway_namespace: "kserve".to_string(),
            auth_disabled: false,
            platform: PlatformNamespaces::default(),
        }
    }
}

impl OperatorConfig {
    /// Build the configuration from the process environment.
    ///
    /// `INGRESS_GATEWAY_NAME` accepts either a plain name or the combined
    /// `namespace/name` form; the latter also fixes the gateway namespace.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let system_namespace =
            env_or("POD_NAMESPACE", &defaults.system_namespace);

        let mut ingress_gateway_namespace = env_or(
            "INGRESS_GATEWAY_NAMESPACE",
            &defaults.ingress_gateway_namespace,
        );
        let mut ingress_gateway_name =
            env_or("INGRESS_GATEWAY_NAME", &defaults.ingress_gateway_name);
        if let Some((ns, name)) = ingress_gateway_name
            .split_once('/')
            .map(|(ns, name)| (ns.to_string(), name.to_string()))
        {
            ingress_gateway_namespace = ns;
            ingress_gateway_name = name;
        }

        Self {
            system_namespace,
            ingress_gateway_name,
            ingress_gateway_namespace,
            auth_disabled: bool_env_or("authDisabled", false),
            platform: PlatformNamespaces {
                monitoring: env_or("OCP_MONITORING_NAMESPACE", &defaults.platform.monitoring),
                user_workload_monitoring: env_or(
                    "OCP_USER_WORKLOAD_MONITORING_NAMESPACE",
                    &defaults.platform.user_workload_monitoring,
                ),
                kube_api_server: env_or(
                    "OCP_KUBE_API_SERVER_NAMESPACE",
                    &defaults.platform.kube_api_server,
                ),
                dns: env_or("OCP_DNS_NAMESPACE", &defaults.platform.dns),
            },
        }
    }

    /// Effective auth decision for one service:
    /// `!auth_disabled && annotation != "false"`.
    pub fn is_auth_enabled_for(&self, llm_svc: &LLMInferenceService) -> bool {
        if self.auth_disabled {
            return false;
        }
        llm_svc
            .annotations()
            .get(ENABLE_AUTH_ANNOTATION)
            .map(|v| v != "false")
            .unwrap_or(true)
    }
}

fn env_or(key: &str, fallback: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

/// Parse a boolean environment variable case-insensitively.
///
/// Only `true`/`1` and `false`/`0` are recognized; empty, unset or any other
/// value yields the fallback.
pub fn bool_env_or(key: &str, fallback: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => parse_bool_or(&v, fallback),
        Err(_) => fallback,
    }
}

fn parse_bool_or(value: &str, fallback: bool) -> bool {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" => true,
        "false" | "0" => false,
        _ => fallback,
    }
}
