//! Reconciliation control plane for LLMInferenceService
//!
//! One pass per observed change: compose presets, validate, then converge
//! workload, router, scheduler, inference pools, migration, TLS secret and
//! network policies, fold readiness, and write status back with conflict
//! retry. Passes are idempotent and keep no state beyond the cluster.

pub mod child;
pub mod discovery;
pub mod migration;
pub mod network_policy;
pub mod pool;
pub mod router;
pub mod scheduler;
pub mod tls;
pub mod workload;

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Secret, Service, ServiceAccount};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use kube::api::{Api, ListParams, PostParams};
use kube::runtime::controller::{Action, Controller};
use kube::runtime::reflector::{ObjectRef, Store};
use kube::runtime::{reflector, watcher, WatchStreamExt};
use kube::{Client, Resource, ResourceExt};
use tracing::{error, info, warn};

use crate::config::OperatorConfig;
use crate::crd::conditions::READY;
use crate::crd::gie::InferencePool;
use crate::crd::gwapi::HTTPRoute;
use crate::crd::lws::LeaderWorkerSet;
use crate::crd::{ConditionSet, LLMInferenceService, LLMInferenceServiceConfig};
use crate::error::Error;
use crate::naming::PART_OF_LABEL_VALUE;
use crate::presets::{self, WELL_KNOWN_DEFAULT_CONFIGS};
use crate::retry::{retry_on_conflict, RetryConfig};
use crate::validation;

/// Shared state injected into every reconciliation
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Process-wide operator configuration
    pub config: OperatorConfig,
}

impl Context {
    /// Create a context from a client and configuration
    pub fn new(client: Client, config: OperatorConfig) -> Self {
        Self { client, config }
    }
}

/// Reconcile one LLMInferenceService
pub async fn reconcile(
    llm_svc: Arc<LLMInferenceService>,
    ctx: Arc<Context>,
) -> Result<Action, Error> {
    let name = llm_svc.name_any();
    let namespace = llm_svc.namespace().unwrap_or_default();
    info!(service = %name, namespace = %namespace, "starting reconciliation");

    if llm_svc.meta().deletion_timestamp.is_some() {
        // Namespaced children cascade through owner references; the
        // cluster-scoped auth binding does not and is removed here.
        scheduler::cleanup_scheduler(&ctx.client, &ctx.config, &llm_svc).await?;
        info!(service = %name, "marked for deletion, skipping reconciliation");
        return Ok(Action::await_change());
    }

    let mut resource = (*llm_svc).clone();
    let result = reconcile_resource(&mut resource, &ctx).await;

    match &result {
        Err(err @ Error::Validation(_)) => {
            resource
                .status_mut()
                .mark_false(READY, "Invalid", &err.to_string());
        }
        _ => resource.determine_readiness(),
    }

    if let Err(err) = &result {
        error!(service = %name, error = %err, "reconciliation failed");
    }

    // Status is written even when the pass failed, so the error surfaces.
    update_status(&ctx.client, &resource).await?;

    result.map(|()| Action::requeue(Duration::from_secs(300)))
}

async fn reconcile_resource(
    resource: &mut LLMInferenceService,
    ctx: &Context,
) -> Result<(), Error> {
    validation::validate(resource)?;

    match presets::combine_base_refs(&ctx.client, resource, &ctx.config).await {
        Ok(effective) => {
            resource.mark_presets_combined_ready();
            resource.spec = effective;
        }
        Err(err) => {
            resource.mark_presets_combined_not_ready("CombineBaseError", &err.to_string());
            return Err(err);
        }
    }

    // The effective spec passes the same admission rules as the user spec.
    validation::validate(resource)?;

    workload::reconcile_workload(&ctx.client, resource).await?;
    router::reconcile_router(&ctx.client, &ctx.config, resource).await?;
    scheduler::reconcile_scheduler(&ctx.client, &ctx.config, resource).await?;

    if let Some(readiness) = pool::reconcile_inference_pools(&ctx.client, resource).await? {
        migration::reconcile_pool_migration(&ctx.client, resource, readiness).await?;
    }

    tls::reconcile_self_signed_certs_secret(&ctx.client, resource).await?;
    network_policy::reconcile_network_policies(&ctx.client, &ctx.config, resource).await?;

    Ok(())
}

/// Write back the status subresource with fetch-latest conflict retry.
///
/// The write is skipped entirely when the latest object already carries an
/// identical status, so idempotent passes produce no API writes.
pub async fn update_status(
    client: &Client,
    desired: &LLMInferenceService,
) -> Result<(), Error> {
    let namespace = desired.namespace().unwrap_or_default();
    let name = desired.name_any();
    let api: Api<LLMInferenceService> = Api::namespaced(client.clone(), &namespace);

    retry_on_conflict(&RetryConfig::default(), "status-update", || {
        let api = api.clone();
        let name = name.clone();
        let desired_status = desired.status.clone();
        async move {
            let Some(mut latest) = api.get_opt(&name).await.map_err(Error::Kube)? else {
                return Ok(());
            };
            if latest.status == desired_status {
                return Ok(());
            }
            latest.status = desired_status;
            let payload =
                serde_json::to_vec(&latest).map_err(|e| Error::serialization(e.to_string()))?;
            api.replace_status(&name, &PostParams::default(), payload)
                .await
                .map_err(Error::Kube)?;
            Ok(())
        }
    })
    .await
}

/// Requeue strategy after a failed reconciliation
pub fn error_policy(
    llm_svc: Arc<LLMInferenceService>,
    error: &Error,
    _ctx: Arc<Context>,
) -> Action {
    error!(
        service = %llm_svc.name_any(),
        error = %error,
        "reconciliation error, requeueing"
    );
    Action::requeue(Duration::from_secs(30))
}

/// Reconcile requests triggered by a base-configuration change.
///
/// A change to a well-known default (or to any config in the system
/// namespace) fans out to every instance; otherwise only instances in the
/// config's namespace whose `baseRefs` name it are enqueued.
pub fn config_change_requests(
    parents: &[Arc<LLMInferenceService>],
    changed: &LLMInferenceServiceConfig,
    system_namespace: &str,
) -> Vec<ObjectRef<LLMInferenceService>> {
    let changed_name = changed.name_any();
    let changed_namespace = changed.namespace().unwrap_or_default();
    let is_default = WELL_KNOWN_DEFAULT_CONFIGS.contains(&changed_name.as_str());
    let is_shared = changed_namespace == system_namespace;

    parents
        .iter()
        .filter(|parent| {
            if is_default {
                return true;
            }
            if !is_shared && parent.namespace().unwrap_or_default() != changed_namespace {
                return false;
            }
            parent
                .spec
                .base_refs
                .iter()
                .any(|r| r.name == changed_name)
        })
        .map(|parent| ObjectRef::from_obj(parent.as_ref()))
        .collect()
}

async fn crd_available<K>(client: &Client) -> bool
where
    K: Resource + Clone + serde::de::DeserializeOwned + std::fmt::Debug,
    K::DynamicType: Default,
{
    let api: Api<K> = Api::all(client.clone());
    match api.list(&ListParams::default().limit(1)).await {
        Ok(_) => true,
        Err(e) => {
            warn!(
                kind = %K::kind(&K::DynamicType::default()),
                error = %e,
                "CRD not available, skipping watch"
            );
            false
        }
    }
}

/// Run the controller until shutdown
pub async fn run(client: Client, config: OperatorConfig) -> Result<(), Error> {
    let services: Api<LLMInferenceService> = Api::all(client.clone());
    let configs: Api<LLMInferenceServiceConfig> = Api::all(client.clone());

    // Children are watched through the standard identity label.
    let child_wc = watcher::Config::default().labels(&format!(
        "app.kubernetes.io/part-of={PART_OF_LABEL_VALUE}"
    ));

    // A reflected view of all parents backs the preset fan-out mapper.
    let (parent_store, writer) = reflector::store::<LLMInferenceService>();
    let parent_reflector = reflector(writer, watcher(services.clone(), watcher::Config::default()));
    tokio::spawn(async move {
        parent_reflector
            .applied_objects()
            .for_each(|_| async {})
            .await;
    });

    let system_namespace = config.system_namespace.clone();
    let fanout_store: Store<LLMInferenceService> = parent_store;

    let mut controller = Controller::new(services, watcher::Config::default())
        .watches(configs, watcher::Config::default(), move |cfg| {
            config_change_requests(&fanout_store.state(), &cfg, &system_namespace)
        })
        .owns(Api::<Deployment>::all(client.clone()), child_wc.clone())
        .owns(Api::<Service>::all(client.clone()), child_wc.clone())
        .owns(Api::<Secret>::all(client.clone()), child_wc.clone())
        .owns(Api::<ServiceAccount>::all(client.clone()), child_wc.clone())
        .owns(Api::<Role>::all(client.clone()), child_wc.clone())
        .owns(Api::<RoleBinding>::all(client.clone()), child_wc.clone())
        .owns(Api::<NetworkPolicy>::all(client.clone()), child_wc.clone());

    if crd_available::<HTTPRoute>(&client).await {
        controller = controller.owns(Api::<HTTPRoute>::all(client.clone()), child_wc.clone());
    }
    if crd_available::<InferencePool>(&client).await {
        controller = controller.owns(Api::<InferencePool>::all(client.clone()), child_wc.clone());
    }
    if crd_available::<LeaderWorkerSet>(&client).await {
        controller =
            controller.owns(Api::<LeaderWorkerSet>::all(client.clone()), child_wc.clone());
    }

    let ctx = Arc::new(Context::new(client, config));

    controller
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((object, _)) => info!(object = %object, "reconciled"),
                Err(e) => warn!(error = %e, "reconcile failed"),
            }
        })
        .await;

    info!("controller terminated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    use super::*;
    use crate::crd::test_support::service;
    use crate::crd::types::BaseRef;
    use crate::crd::LLMInferenceServiceConfigSpec;

    fn preset(name: &str, namespace: &str) -> LLMInferenceServiceConfig {
        LLMInferenceServiceConfig {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec: LLMInferenceServiceConfigSpec::default(),
        }
    }

    fn parent_with_ref(name: &str, namespace: &str, base_ref: &str) -> Arc<LLMInferenceService> {
        let mut svc = service(name, namespace);
        svc.spec.base_refs = vec![BaseRef {
            name: base_ref.to_string(),
        }];
        Arc::new(svc)
    }

    #[test]
    fn direct_references_fan_out_within_the_namespace() {
        let parents = vec![
            parent_with_ref("a", "team-a", "shared-preset"),
            parent_with_ref("b", "team-b", "shared-preset"),
            parent_with_ref("c", "team-a", "other-preset"),
        ];

        let requests =
            config_change_requests(&parents, &preset("shared-preset", "team-a"), "kserve");
        let names: Vec<_> = requests.iter().map(|r| r.name.clone()).collect();
        assert_eq!(names, vec!["a"], "only the same-namespace referrer");
    }

    #[test]
    fn system_namespace_configs_reach_every_namespace() {
        let parents = vec![
            parent_with_ref("a", "team-a", "shared-preset"),
            parent_with_ref("b", "team-b", "shared-preset"),
        ];

        let requests =
            config_change_requests(&parents, &preset("shared-preset", "kserve"), "kserve");
        assert_eq!(requests.len(), 2);
    }

    #[test]
    fn well_known_default_changes_enqueue_everything() {
        let parents = vec![
            parent_with_ref("a", "team-a", "unrelated"),
            Arc::new(service("plain", "team-b")),
        ];

        let requests = config_change_requests(
            &parents,
            &preset(WELL_KNOWN_DEFAULT_CONFIGS[0], "kserve"),
            "kserve",
        );
        assert_eq!(requests.len(), 2, "defaults affect every instance");
    }

    #[test]
    fn unrelated_config_changes_enqueue_nothing() {
        let parents = vec![parent_with_ref("a", "team-a", "preset-a")];
        let requests = config_change_requests(&parents, &preset("preset-b", "team-a"), "kserve");
        assert!(requests.is_empty());
    }
}
