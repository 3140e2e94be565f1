//! Paired inference-pool reconciliation
//!
//! The canonical pool is the typed v1 record; a v1alpha2 mirror is projected
//! from it and maintained dynamically so gateway controllers that only
//! resolve the legacy API keep working during migration. The mirror protocol
//! is create-if-absent, refuse-if-not-owned, update-only-on-difference, with
//! a missing CRD tolerated as not-found.

use kube::api::{Api, DeleteParams, DynamicObject, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::child::{delete_child, is_controlled_by, metadata_derivative_eq, reconcile_child};
use crate::crd::conditions::{ConditionSet, INFERENCE_POOLS_READY};
use crate::crd::gie::{
    alpha2_pool_resource, InferencePool, InferencePoolSpec, PoolPort,
    DEFAULT_ENDPOINT_PICKER_PORT, INFERENCE_GROUP_ALPHA2,
};
use crate::crd::LLMInferenceService;
use crate::error::Error;
use crate::naming::scheduler_labels;
use crate::semantic::{derivative_eq, is_derivative, maps_derivative_eq};

/// Readiness of the paired pools, fed into the migration state machine
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolReadiness {
    /// The v1 record reports Accepted and ResolvedRefs
    pub v1_ready: bool,
    /// The v1alpha2 mirror reports Accepted and ResolvedRefs
    pub alpha2_ready: bool,
}

/// Reconcile both pool variants. Returns their readiness, or None when the
/// pool subsystem is absent (scheduler disabled or BYO pool).
pub async fn reconcile_inference_pools(
    client: &Client,
    llm_svc: &mut LLMInferenceService,
) -> Result<Option<PoolReadiness>, Error> {
    let namespace = llm_svc.namespace().unwrap_or_default();
    let v1_api: Api<InferencePool> = Api::namespaced(client.clone(), &namespace);
    let alpha2_api: Api<DynamicObject> =
        Api::namespaced_with(client.clone(), &namespace, &alpha2_pool_resource());

    let expected = expected_inference_pool(llm_svc);
    let name = expected.name_any();

    let scheduler_present = llm_svc
        .spec
        .router
        .as_ref()
        .and_then(|r| r.scheduler.as_ref())
        .is_some();
    let byo_pool = llm_svc
        .spec
        .router
        .as_ref()
        .and_then(|r| r.scheduler.as_ref())
        .and_then(|s| s.pool.as_ref())
        .is_some_and(|p| p.has_ref());

    if !scheduler_present || byo_pool {
        delete_child(&v1_api, &name).await?;
        delete_alpha2_if_exists(&alpha2_api, &name).await?;
        return Ok(None);
    }

    if let Err(err) = reconcile_child(&v1_api, llm_svc, expected.clone(), |e, c| {
        derivative_eq(&e.spec, &c.spec) && metadata_derivative_eq(e, c)
    })
    .await
    {
        llm_svc
            .status_mut()
            .mark_false(INFERENCE_POOLS_READY, err.reason(), &err.to_string());
        return Err(err);
    }

    let mirror = v1_pool_to_alpha2(&expected)?;
    if let Err(err) = reconcile_alpha2_object(&alpha2_api, llm_svc, mirror, "InferencePool").await
    {
        llm_svc
            .status_mut()
            .mark_false(INFERENCE_POOLS_READY, err.reason(), &err.to_string());
        return Err(err);
    }

    let v1_ready = match v1_api.get_opt(&name).await.map_err(Error::Kube)? {
        Some(current) => v1_pool_ready(&current),
        None => false,
    };
    let alpha2_ready = match alpha2_api.get_opt(&name).await {
        Ok(Some(current)) => alpha2_pool_ready(&current),
        _ => false,
    };

    if v1_ready || alpha2_ready {
        llm_svc.status_mut().mark_true(INFERENCE_POOLS_READY);
    } else {
        llm_svc.status_mut().mark_false(
            INFERENCE_POOLS_READY,
            "NotReady",
            "no inference pool variant reports Accepted and ResolvedRefs",
        );
    }

    Ok(Some(PoolReadiness {
        v1_ready,
        alpha2_ready,
    }))
}

/// Expected v1 pool, projecting the CRD-side pool spec and filling the
/// well-known defaults (kind Service, FailClose, endpoint-picker port)
pub fn expected_inference_pool(llm_svc: &LLMInferenceService) -> InferencePool {
    let mut spec: InferencePoolSpec = llm_svc
        .spec
        .router
        .as_ref()
        .and_then(|r| r.scheduler.as_ref())
        .and_then(|s| s.pool.as_ref())
        .and_then(|p| p.spec.clone())
        .unwrap_or_default();

    let picker = &mut spec.endpoint_picker_ref;
    if picker.name.is_empty() {
        picker.name = llm_svc.epp_service_name();
    }
    if picker.kind.is_none() {
        picker.kind = Some("Service".to_string());
    }
    if picker.failure_mode.is_none() {
        picker.failure_mode = Some("FailClose".to_string());
    }
    if picker.port.is_none() {
        picker.port = Some(PoolPort {
            number: DEFAULT_ENDPOINT_PICKER_PORT,
        });
    }

    InferencePool {
        metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
            name: Some(llm_svc.default_inference_pool_name()),
            namespace: llm_svc.namespace(),
            labels: Some(scheduler_labels(llm_svc)),
            owner_references: llm_svc.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        spec,
        status: None,
    }
}

/// Project the typed v1 pool into its v1alpha2 unstructured mirror
pub fn v1_pool_to_alpha2(pool: &InferencePool) -> Result<DynamicObject, Error> {
    let Some(target_port) = pool.spec.target_ports.first() else {
        return Err(Error::serialization(
            "spec.targetPorts[0] required to mirror the pool to v1alpha2",
        ));
    };

    let picker = &pool.spec.endpoint_picker_ref;
    let mut extension_ref = serde_json::Map::new();
    extension_ref.insert("name".to_string(), json!(picker.name));
    if let Some(group) = picker.group.as_ref().filter(|g| !g.is_empty()) {
        extension_ref.insert("group".to_string(), json!(group));
    }
    if let Some(kind) = picker.kind.as_ref().filter(|k| !k.is_empty()) {
        extension_ref.insert("kind".to_string(), json!(kind));
    }
    if let Some(port) = picker.port.as_ref().filter(|p| p.number > 0) {
        extension_ref.insert("portNumber".to_string(), json!(port.number));
    }
    if let Some(mode) = picker.failure_mode.as_ref().filter(|m| !m.is_empty()) {
        extension_ref.insert("failureMode".to_string(), json!(mode));
    }

    let object = json!({
        "apiVersion": format!("{INFERENCE_GROUP_ALPHA2}/v1alpha2"),
        "kind": "InferencePool",
        "metadata": {
            "name": pool.metadata.name,
            "namespace": pool.metadata.namespace,
            "labels": pool.metadata.labels,
            "annotations": pool.metadata.annotations,
            "ownerReferences": pool.metadata.owner_references,
        },
        "spec": {
            "selector": pool.spec.selector.match_labels,
            "targetPortNumber": target_port.number,
            "extensionRef": Value::Object(extension_ref),
        },
    });

    serde_json::from_value(object).map_err(|e| Error::serialization(e.to_string()))
}

/// Any parent reporting both Accepted=True and ResolvedRefs=True makes the
/// v1 pool ready
pub fn v1_pool_ready(pool: &InferencePool) -> bool {
    let Some(status) = &pool.status else {
        return false;
    };
    status.parents.iter().any(|parent| {
        let mut accepted = false;
        let mut resolved = false;
        for cond in &parent.conditions {
            if cond.type_ == "Accepted" && cond.status == "True" {
                accepted = true;
            }
            if cond.type_ == "ResolvedRefs" && cond.status == "True" {
                resolved = true;
            }
        }
        accepted && resolved
    })
}

/// Same readiness predicate evaluated on the dynamic v1alpha2 mirror, whose
/// status nests parents under the singular `parent` key
pub fn alpha2_pool_ready(pool: &DynamicObject) -> bool {
    let parents = pool.data["status"]["parent"].as_array();
    let Some(parents) = parents else {
        return false;
    };
    parents.iter().any(|parent| {
        let conds = parent["conditions"].as_array();
        let Some(conds) = conds else {
            return false;
        };
        let holds = |type_: &str| {
            conds
                .iter()
                .any(|c| c["type"] == type_ && c["status"] == "True")
        };
        holds("Accepted") && holds("ResolvedRefs")
    })
}

/// Create/update protocol for dynamically handled v1alpha2 objects
pub async fn reconcile_alpha2_object(
    api: &Api<DynamicObject>,
    llm_svc: &LLMInferenceService,
    mut expected: DynamicObject,
    kind: &str,
) -> Result<(), Error> {
    let name = expected.name_any();
    let namespace = expected.namespace().unwrap_or_default();

    let current = match api.get_opt(&name).await {
        Ok(current) => current,
        // A 404 on the collection means the alpha CRD is not installed;
        // the mirror is simply skipped then.
        Err(kube::Error::Api(ae)) if ae.code == 404 => None,
        Err(e) => return Err(Error::Kube(e)),
    };

    match current {
        None => match api.create(&PostParams::default(), &expected).await {
            Ok(_) => {
                info!(kind = %kind, name = %name, namespace = %namespace, "created v1alpha2 object");
                Ok(())
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                debug!(kind = %kind, name = %name, "v1alpha2 CRD not installed, skipping mirror");
                Ok(())
            }
            Err(e) => Err(Error::Kube(e)),
        },
        Some(current) => {
            if !is_controlled_by(&current, llm_svc) {
                return Err(Error::NotOwned {
                    kind: kind.to_string(),
                    name,
                    namespace,
                    parent: format!(
                        "{}/{}",
                        llm_svc.namespace().unwrap_or_default(),
                        llm_svc.name_any()
                    ),
                });
            }

            expected.metadata.resource_version = current.resource_version();
            if alpha2_semantic_eq(&expected, &current) {
                return Ok(());
            }

            api.replace(&name, &PostParams::default(), &expected)
                .await
                .map_err(Error::Kube)?;
            info!(kind = %kind, name = %name, namespace = %namespace, "updated v1alpha2 object");
            Ok(())
        }
    }
}

/// Best-effort deletion of a dynamically handled object; a missing object or
/// missing CRD both count as success
pub async fn delete_alpha2_if_exists(
    api: &Api<DynamicObject>,
    name: &str,
) -> Result<(), Error> {
    match api.get_opt(name).await {
        Ok(Some(_)) => match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => {
                info!(name = %name, "deleted v1alpha2 object");
                Ok(())
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(Error::Kube(e)),
        },
        Ok(None) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
        Err(e) => Err(Error::Kube(e)),
    }
}

/// Semantic comparison over spec, labels and annotations of dynamic objects
pub fn alpha2_semantic_eq(expected: &DynamicObject, current: &DynamicObject) -> bool {
    is_derivative(&expected.data["spec"], &current.data["spec"])
        && maps_derivative_eq(
            expected.metadata.labels.as_ref(),
            current.metadata.labels.as_ref(),
        )
        && maps_derivative_eq(
            expected.metadata.annotations.as_ref(),
            current.metadata.annotations.as_ref(),
        )
}
