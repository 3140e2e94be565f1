//! Network-isolation policies for scheduler and workload pods
//!
//! Two policies per parent while the scheduler block is present, keyed to
//! platform-dependent namespace labels: the scheduler policy restricts both
//! ingress (gateway + monitoring) and egress (workload namespace, API
//! server, DNS); the workload policy restricts ingress only, since runtimes
//! download models from arbitrary locations.

use std::collections::BTreeMap;

use k8s_openapi::api::networking::v1::{
    NetworkPolicy, NetworkPolicyEgressRule, NetworkPolicyIngressRule, NetworkPolicyPeer,
    NetworkPolicySpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::api::Api;
use kube::{Client, Resource, ResourceExt};

use super::child::{delete_child, metadata_derivative_eq, reconcile_child};
use crate::config::OperatorConfig;
use crate::crd::LLMInferenceService;
use crate::error::Error;
use crate::naming::{child_name, scheduler_labels, workload_labels};

/// Namespaces are selected by their well-known name label
const NAMESPACE_NAME_LABEL: &str = "kubernetes.io/metadata.name";

/// Reconcile (or remove) both network policies for one parent
pub async fn reconcile_network_policies(
    client: &Client,
    config: &OperatorConfig,
    llm_svc: &LLMInferenceService,
) -> Result<(), Error> {
    let namespace = llm_svc.namespace().unwrap_or_default();
    let api: Api<NetworkPolicy> = Api::namespaced(client.clone(), &namespace);

    let scheduler_present = llm_svc
        .spec
        .router
        .as_ref()
        .and_then(|r| r.scheduler.as_ref())
        .is_some();

    let scheduler_policy = expected_scheduler_policy(llm_svc, config);
    let workload_policy = expected_workload_policy(llm_svc, config);

    if !scheduler_present {
        delete_child(&api, &scheduler_policy.name_any()).await?;
        return delete_child(&api, &workload_policy.name_any()).await;
    }

    // Policy specs are deterministic functions of the platform labels, so
    // spec comparison is exact rather than derivative.
    reconcile_child(&api, llm_svc, scheduler_policy, |e, c| {
        e.spec == c.spec && metadata_derivative_eq(e, c)
    })
    .await?;
    reconcile_child(&api, llm_svc, workload_policy, |e, c| {
        e.spec == c.spec && metadata_derivative_eq(e, c)
    })
    .await
}

fn namespace_peer(namespace: &str) -> NetworkPolicyPeer {
    NetworkPolicyPeer {
        namespace_selector: Some(LabelSelector {
            match_labels: Some(BTreeMap::from([(
                NAMESPACE_NAME_LABEL.to_string(),
                namespace.to_string(),
            )])),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Ingress+egress policy around the endpoint-picker scheduler pods
pub fn expected_scheduler_policy(
    llm_svc: &LLMInferenceService,
    config: &OperatorConfig,
) -> NetworkPolicy {
    let labels = scheduler_labels(llm_svc);
    let namespace = llm_svc.namespace().unwrap_or_default();

    NetworkPolicy {
        metadata: ObjectMeta {
            name: Some(child_name(&llm_svc.name_any(), "-kserve-router-scheduler")),
            namespace: Some(namespace.clone()),
            labels: Some(labels.clone()),
            owner_references: llm_svc.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        spec: Some(NetworkPolicySpec {
            policy_types: Some(vec!["Ingress".to_string(), "Egress".to_string()]),
            pod_selector: LabelSelector {
                match_labels: Some(labels),
                ..Default::default()
            },
            ingress: Some(vec![NetworkPolicyIngressRule {
                from: Some(vec![
                    // gateway traffic
                    namespace_peer(&config.ingress_gateway_namespace),
                    // metrics scraping
                    namespace_peer(&config.platform.monitoring),
                    namespace_peer(&config.platform.user_workload_monitoring),
                ]),
                ..Default::default()
            }]),
            egress: Some(vec![NetworkPolicyEgressRule {
                to: Some(vec![
                    // scraping inference-server metrics in the same namespace
                    namespace_peer(&namespace),
                    // pod watches
                    namespace_peer(&config.platform.kube_api_server),
                    namespace_peer(&config.platform.dns),
                ]),
                ..Default::default()
            }]),
        }),
    }
}

/// Ingress-only policy around the inference workload pods
pub fn expected_workload_policy(
    llm_svc: &LLMInferenceService,
    config: &OperatorConfig,
) -> NetworkPolicy {
    let namespace = llm_svc.namespace().unwrap_or_default();

    NetworkPolicy {
        metadata: ObjectMeta {
            name: Some(child_name(&llm_svc.name_any(), "-kserve-workload")),
            namespace: Some(namespace.clone()),
            labels: Some(workload_labels(llm_svc)),
            owner_references: llm_svc.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        spec: Some(NetworkPolicySpec {
            // models download from arbitrary locations, so egress stays open
            policy_types: Some(vec!["Ingress".to_string()]),
            pod_selector: LabelSelector {
                match_labels: Some(workload_labels(llm_svc)),
                ..Default::default()
            },
            ingress: Some(vec![NetworkPolicyIngressRule {
                from: Some(vec![
                    namespace_peer(&config.ingress_gateway_namespace),
                    namespace_peer(&config.platform.monitoring),
                    namespace_peer(&config.platform.user_workload_monitoring),
                    // scheduler and inference traffic within the namespace
                    namespace_peer(&namespace),
                ]),
                ..Default::default()
            }]),
            egress: None,
        }),
    }
}
