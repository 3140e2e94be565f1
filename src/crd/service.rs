//! LLMInferenceService Custom Resource Definition
//!
//! The parent resource of the whole control loop. A single declaration (model
//! URI, workload shape, optional prefill twin, optional router) is converged
//! into deployments or leader/worker groups, an endpoint-picker scheduler,
//! paired inference pools, an HTTP route, a TLS secret and network policies.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::conditions::{
    fold_conditions, Condition, ConditionSet, PRESETS_COMBINED, READY, ROUTER_FOLD_ORDER,
    ROUTER_READY, WORKLOAD_FOLD_ORDER, WORKLOAD_READY,
};
use super::types::{Addressable, BaseRef, ModelSpec, RouterSpec, WorkloadSpec};
use crate::naming::child_name;

/// Specification of an LLMInferenceService
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "serving.kserve.io",
    version = "v1alpha1",
    kind = "LLMInferenceService",
    plural = "llminferenceservices",
    shortname = "llmisvc",
    namespaced,
    status = "LLMInferenceServiceStatus",
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"URL","type":"string","jsonPath":".status.url"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct LLMInferenceServiceSpec {
    /// The model to serve
    #[serde(default)]
    pub model: ModelSpec,

    /// Decode (main) workload shape
    #[serde(flatten)]
    pub workload: WorkloadSpec,

    /// Prefill twin of the workload shape
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefill: Option<WorkloadSpec>,

    /// Router block (gateway, route, scheduler)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router: Option<RouterSpec>,

    /// Ordered base-configuration references merged below this spec
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub base_refs: Vec<BaseRef>,
}

/// Observed state of an LLMInferenceService
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LLMInferenceServiceStatus {
    /// Hierarchical condition set (leaves, roll-ups, Ready)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Primary externally addressable URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// All discovered addresses, external first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<Addressable>,
}

impl ConditionSet for LLMInferenceServiceStatus {
    fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        &mut self.conditions
    }
    fn conditions(&self) -> &[Condition] {
        &self.conditions
    }
}

impl LLMInferenceService {
    /// Mutable status, created on first use
    pub fn status_mut(&mut self) -> &mut LLMInferenceServiceStatus {
        self.status.get_or_insert_with(Default::default)
    }

    /// Name of the managed inference pool, honoring an external pool ref
    pub fn inference_pool_name(&self) -> String {
        if let Some(pool) = self
            .spec
            .router
            .as_ref()
            .and_then(|r| r.scheduler.as_ref())
            .and_then(|s| s.pool.as_ref())
        {
            if pool.has_ref() {
                return pool.ref_.as_ref().map(|r| r.name.clone()).unwrap_or_default();
            }
        }
        self.default_inference_pool_name()
    }

    /// Default name of the managed inference pool.
    ///
    /// Must match the default used by the well-known presets.
    pub fn default_inference_pool_name(&self) -> String {
        child_name(&self.name_unchecked(), "-inference-pool")
    }

    /// Name of the endpoint-picker service, honoring a pool spec override
    pub fn epp_service_name(&self) -> String {
        if let Some(pool) = self
            .spec
            .router
            .as_ref()
            .and_then(|r| r.scheduler.as_ref())
            .and_then(|s| s.pool.as_ref())
        {
            if let Some(spec) = &pool.spec {
                if !spec.endpoint_picker_ref.name.is_empty() {
                    return spec.endpoint_picker_ref.name.clone();
                }
            }
        }
        child_name(&self.name_unchecked(), "-epp-service")
    }

    /// True when the router block configures a controller-managed route
    pub fn has_managed_route(&self) -> bool {
        self.spec
            .router
            .as_ref()
            .and_then(|r| r.route.as_ref())
            .and_then(|r| r.http.as_ref())
            .map(|http| http.has_spec() && !http.has_refs())
            .unwrap_or(false)
    }

    /// True when the scheduler subsystem should exist: the scheduler block
    /// has a template and the pool is not a pure external reference
    pub fn has_managed_scheduler(&self) -> bool {
        let Some(scheduler) = self.spec.router.as_ref().and_then(|r| r.scheduler.as_ref())
        else {
            return false;
        };
        if scheduler.template.is_none() {
            return false;
        }
        !scheduler.pool.as_ref().is_some_and(|p| p.has_ref())
    }

    fn name_unchecked(&self) -> String {
        self.metadata.name.clone().unwrap_or_default()
    }

    /// Fold the workload leaves into `WorkloadReady`
    pub fn determine_workload_readiness(&mut self) {
        let folded = fold_conditions(
            &self.status_mut().conditions,
            &WORKLOAD_FOLD_ORDER,
            WORKLOAD_READY,
        );
        self.status_mut().set_condition(folded);
    }

    /// Fold the router leaves into `RouterReady`
    pub fn determine_router_readiness(&mut self) {
        let folded = fold_conditions(
            &self.status_mut().conditions,
            &ROUTER_FOLD_ORDER,
            ROUTER_READY,
        );
        self.status_mut().set_condition(folded);
    }

    /// Compute the top-level `Ready` condition as the conjunction of
    /// `PresetsCombined`, `WorkloadReady` and `RouterReady`
    pub fn determine_readiness(&mut self) {
        self.determine_workload_readiness();
        self.determine_router_readiness();

        let order = [PRESETS_COMBINED, WORKLOAD_READY, ROUTER_READY];
        let folded = fold_conditions(&self.status_mut().conditions, &order, READY);
        self.status_mut().set_condition(folded);
    }

    /// Mark preset composition successful
    pub fn mark_presets_combined_ready(&mut self) {
        self.status_mut().mark_true(PRESETS_COMBINED);
    }

    /// Mark preset composition failed
    pub fn mark_presets_combined_not_ready(&mut self, reason: &str, message: &str) {
        self.status_mut().mark_false(PRESETS_COMBINED, reason, message);
    }
}

#[cfg(test)]
mod tests {
    use super::super::conditions::{
        GATEWAYS_READY, HTTP_ROUTES_READY, INFERENCE_POOLS_READY, MAIN_WORKLOAD_READY,
        PREFILL_WORKER_WORKLOAD_READY, PREFILL_WORKLOAD_READY, SCHEDULER_WORKLOAD_READY,
        WORKER_WORKLOAD_READY,
    };
    use super::super::test_support::service;
    use super::*;

    #[test]
    fn workload_readiness_defaults_to_true_when_leaves_unset() {
        let mut svc = service("svc", "ns");
        svc.determine_workload_readiness();
        let cond = svc.status_mut().get_condition(WORKLOAD_READY).cloned().unwrap();
        assert!(cond.is_true());
    }

    #[test]
    fn workload_readiness_first_false_wins_in_declared_order() {
        let mut svc = service("svc", "ns");
        svc.status_mut().mark_true(MAIN_WORKLOAD_READY);
        svc.status_mut()
            .mark_false(WORKER_WORKLOAD_READY, "WorkerDown", "workers offline");
        svc.status_mut()
            .mark_false(PREFILL_WORKLOAD_READY, "PrefillDown", "prefill offline");
        svc.status_mut().mark_true(PREFILL_WORKER_WORKLOAD_READY);

        svc.determine_workload_readiness();

        let cond = svc.status_mut().get_condition(WORKLOAD_READY).cloned().unwrap();
        assert!(cond.is_false());
        assert_eq!(cond.reason.as_deref(), Some("WorkerDown"));
        assert_eq!(cond.message.as_deref(), Some("workers offline"));
    }

    #[test]
    fn ready_is_the_conjunction_of_presets_workload_and_router() {
        let mut svc = service("svc", "ns");
        svc.mark_presets_combined_ready();
        svc.status_mut().mark_true(MAIN_WORKLOAD_READY);
        svc.status_mut().mark_true(GATEWAYS_READY);
        svc.status_mut().mark_true(HTTP_ROUTES_READY);
        svc.status_mut().mark_true(INFERENCE_POOLS_READY);
        svc.status_mut().mark_true(SCHEDULER_WORKLOAD_READY);

        svc.determine_readiness();
        assert!(svc.status_mut().get_condition(READY).unwrap().is_true());

        svc.mark_presets_combined_not_ready("CombineBaseError", "preset missing");
        svc.determine_readiness();
        let ready = svc.status_mut().get_condition(READY).cloned().unwrap();
        assert!(ready.is_false());
        assert_eq!(ready.reason.as_deref(), Some("CombineBaseError"));
    }

    #[test]
    fn router_readiness_propagates_pool_failure_over_scheduler_failure() {
        let mut svc = service("svc", "ns");
        svc.status_mut().mark_true(GATEWAYS_READY);
        svc.status_mut().mark_true(HTTP_ROUTES_READY);
        svc.status_mut()
            .mark_false(INFERENCE_POOLS_READY, "PoolsDown", "inference pools offline");
        svc.status_mut()
            .mark_false(SCHEDULER_WORKLOAD_READY, "SchedDown", "scheduler offline");

        svc.determine_router_readiness();

        let cond = svc.status_mut().get_condition(ROUTER_READY).cloned().unwrap();
        assert!(cond.is_false());
        assert_eq!(cond.reason.as_deref(), Some("PoolsDown"));
        assert_eq!(cond.message.as_deref(), Some("inference pools offline"));
    }

    #[test]
    fn default_child_names_are_deterministic() {
        let svc = service("my-llm", "ns");
        assert_eq!(svc.default_inference_pool_name(), "my-llm-inference-pool");
        assert_eq!(svc.epp_service_name(), "my-llm-epp-service");
        assert_eq!(svc.inference_pool_name(), "my-llm-inference-pool");
    }

    #[test]
    fn pool_ref_overrides_the_default_pool_name() {
        use super::super::types::{
            RouterSpec, SchedulerPoolSpec, SchedulerSpec, UntypedObjectReference,
        };

        let mut svc = service("my-llm", "ns");
        svc.spec.router = Some(RouterSpec {
            scheduler: Some(SchedulerSpec {
                template: None,
                pool: Some(SchedulerPoolSpec {
                    ref_: Some(UntypedObjectReference {
                        name: "byo-pool".into(),
                        namespace: None,
                    }),
                    spec: None,
                }),
            }),
            ..Default::default()
        });

        assert_eq!(svc.inference_pool_name(), "byo-pool");
        assert!(!svc.has_managed_scheduler());
    }
}
