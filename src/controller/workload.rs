//! Workload reconciliation
//!
//! From the effective spec, materialize either a stateless Deployment
//! (single-node path) or a LeaderWorkerSet (multi-node path, selected by the
//! presence of a worker template), plus the optional prefill twin. Model
//! storage sidecars are injected from the model URI scheme.

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, EmptyDirVolumeSource, EnvVar, PersistentVolumeClaimVolumeSource, PodSpec,
    PodTemplateSpec, ServiceAccount, Volume, VolumeMount,
};
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::api::Api;
use kube::{Client, Resource, ResourceExt};
use tracing::info;

use super::child::{delete_child, metadata_derivative_eq, reconcile_child};
use crate::crd::conditions::{
    ConditionSet, MAIN_WORKLOAD_READY, PREFILL_WORKER_WORKLOAD_READY, PREFILL_WORKLOAD_READY,
    WORKER_WORKLOAD_READY,
};
use crate::crd::gie::{INFERENCE_GROUP_ALPHA2, INFERENCE_GROUP_V1};
use crate::crd::lws::{LeaderWorkerSet, LeaderWorkerSetSpec, LeaderWorkerTemplate};
use crate::crd::types::{ParallelismSpec, WorkloadSpec};
use crate::crd::LLMInferenceService;
use crate::error::Error;
use crate::naming::{child_name, workload_labels};
use crate::semantic::derivative_eq;

/// Well-known local path models are mounted at
pub const MODEL_MOUNT_PATH: &str = "/mnt/models";

/// Mount point shared between the modelcar sidecar and the main container
pub const MODELCAR_MOUNT_PATH: &str = "/mnt";

/// Name of the main container in workload pod templates
pub const MAIN_CONTAINER_NAME: &str = "main";

/// Name of the routing sidecar that triggers workload RBAC
pub const ROUTING_SIDECAR_CONTAINER_NAME: &str = "llm-d-routing-sidecar";

/// Label key carrying the decode/prefill role of a pod
pub const ROLE_LABEL_KEY: &str = "llm-d.ai/role";

/// Which twin of the workload shape is being materialized
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkloadVariant {
    /// The decode (main) block
    Decode,
    /// The prefill twin
    Prefill,
}

impl WorkloadVariant {
    fn role(self) -> &'static str {
        match self {
            WorkloadVariant::Decode => "decode",
            WorkloadVariant::Prefill => "prefill",
        }
    }

    fn deployment_suffix(self) -> &'static str {
        match self {
            WorkloadVariant::Decode => "-kserve",
            WorkloadVariant::Prefill => "-kserve-prefill",
        }
    }

    fn group_suffix(self) -> &'static str {
        match self {
            WorkloadVariant::Decode => "-kserve-mn",
            WorkloadVariant::Prefill => "-kserve-mn-prefill",
        }
    }

    fn conditions(self) -> (&'static str, &'static str) {
        match self {
            WorkloadVariant::Decode => (MAIN_WORKLOAD_READY, WORKER_WORKLOAD_READY),
            WorkloadVariant::Prefill => (PREFILL_WORKLOAD_READY, PREFILL_WORKER_WORKLOAD_READY),
        }
    }
}

/// Reconcile the main workload and its optional prefill twin
pub async fn reconcile_workload(
    client: &Client,
    llm_svc: &mut LLMInferenceService,
) -> Result<(), Error> {
    let workload = llm_svc.spec.workload.clone();
    let prefill = llm_svc.spec.prefill.clone();

    // Sidecar RBAC is shared between the decode and prefill groups, so it
    // exists while any multi-node template carries the routing sidecar.
    let rbac_needed = (workload.worker.is_some() && has_routing_sidecar(&workload))
        || prefill
            .as_ref()
            .is_some_and(|p| p.worker.is_some() && has_routing_sidecar(p));
    if rbac_needed {
        reconcile_workload_rbac(client, llm_svc).await?;
    } else {
        delete_workload_rbac(client, llm_svc).await?;
    }

    reconcile_variant(client, llm_svc, &workload, WorkloadVariant::Decode).await?;

    match prefill {
        Some(prefill) => {
            reconcile_variant(client, llm_svc, &prefill, WorkloadVariant::Prefill).await?;
        }
        None => {
            cleanup_variant(client, llm_svc, WorkloadVariant::Prefill).await?;
        }
    }

    Ok(())
}

async fn reconcile_variant(
    client: &Client,
    llm_svc: &mut LLMInferenceService,
    workload: &WorkloadSpec,
    variant: WorkloadVariant,
) -> Result<(), Error> {
    let namespace = llm_svc.namespace().unwrap_or_default();
    let (main_condition, worker_condition) = variant.conditions();

    if workload.worker.is_some() {
        // Multi-node path: the deployment of the other path must go away.
        let deployments: Api<Deployment> = Api::namespaced(client.clone(), &namespace);
        delete_child(
            &deployments,
            &child_name(&llm_svc.name_any(), variant.deployment_suffix()),
        )
        .await?;

        let group = expected_leader_worker_set(llm_svc, workload, variant);
        let api: Api<LeaderWorkerSet> = Api::namespaced(client.clone(), &namespace);
        let name = group.name_any();
        if let Err(err) = reconcile_child(&api, llm_svc, group, |e, c| {
            derivative_eq(&e.spec, &c.spec) && metadata_derivative_eq(e, c)
        })
        .await
        {
            llm_svc
                .status_mut()
                .mark_false(main_condition, err.reason(), &err.to_string());
            return Err(err);
        }

        match api.get_opt(&name).await.map_err(Error::Kube)? {
            Some(current) => match leader_worker_set_ready(&current) {
                Ok(()) => {
                    llm_svc.status_mut().mark_true(main_condition);
                    llm_svc.status_mut().mark_true(worker_condition);
                }
                Err((reason, message)) => {
                    llm_svc.status_mut().mark_false(main_condition, &reason, &message);
                    llm_svc
                        .status_mut()
                        .mark_false(worker_condition, &reason, &message);
                }
            },
            None => {
                llm_svc.status_mut().mark_unknown(
                    main_condition,
                    "Pending",
                    "leader/worker group not observed yet",
                );
            }
        }
    } else {
        // Single-node path: the multi-node group of this variant must go away.
        cleanup_multi_node(client, llm_svc, variant).await?;

        let deployment = expected_deployment(llm_svc, workload, variant);
        let api: Api<Deployment> = Api::namespaced(client.clone(), &namespace);
        let name = deployment.name_any();
        if let Err(err) = reconcile_child(&api, llm_svc, deployment, |e, c| {
            derivative_eq(&e.spec, &c.spec) && metadata_derivative_eq(e, c)
        })
        .await
        {
            llm_svc
                .status_mut()
                .mark_false(main_condition, err.reason(), &err.to_string());
            return Err(err);
        }

        match api.get_opt(&name).await.map_err(Error::Kube)? {
            Some(current) => match deployment_ready(&current) {
                Ok(()) => llm_svc.status_mut().mark_true(main_condition),
                Err((reason, message)) => {
                    llm_svc.status_mut().mark_false(main_condition, &reason, &message);
                }
            },
            None => {
                llm_svc.status_mut().mark_unknown(
                    main_condition,
                    "Pending",
                    "deployment not observed yet",
                );
            }
        }
    }

    Ok(())
}

async fn cleanup_variant(
    client: &Client,
    llm_svc: &LLMInferenceService,
    variant: WorkloadVariant,
) -> Result<(), Error> {
    let namespace = llm_svc.namespace().unwrap_or_default();
    let deployments: Api<Deployment> = Api::namespaced(client.clone(), &namespace);
    delete_child(
        &deployments,
        &child_name(&llm_svc.name_any(), variant.deployment_suffix()),
    )
    .await?;
    cleanup_multi_node(client, llm_svc, variant).await
}

async fn cleanup_multi_node(
    client: &Client,
    llm_svc: &LLMInferenceService,
    variant: WorkloadVariant,
) -> Result<(), Error> {
    let namespace = llm_svc.namespace().unwrap_or_default();
    let groups: Api<LeaderWorkerSet> = Api::namespaced(client.clone(), &namespace);
    delete_child(
        &groups,
        &child_name(&llm_svc.name_any(), variant.group_suffix()),
    )
    .await
}

/// Expected single-node deployment for one workload variant
pub fn expected_deployment(
    llm_svc: &LLMInferenceService,
    workload: &WorkloadSpec,
    variant: WorkloadVariant,
) -> Deployment {
    let mut labels = workload_labels(llm_svc);
    labels.insert(ROLE_LABEL_KEY.to_string(), variant.role().to_string());

    let mut pod = workload.template.clone().unwrap_or_default();
    inject_model_storage(&mut pod, &llm_svc.spec.model.uri);

    Deployment {
        metadata: ObjectMeta {
            name: Some(child_name(&llm_svc.name_any(), variant.deployment_suffix())),
            namespace: llm_svc.namespace(),
            labels: Some(labels.clone()),
            owner_references: llm_svc.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(workload.replicas.unwrap_or(1)),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(pod),
            },
            ..Default::default()
        }),
        status: None,
    }
}

/// Expected leader/worker group for one workload variant
pub fn expected_leader_worker_set(
    llm_svc: &LLMInferenceService,
    workload: &WorkloadSpec,
    variant: WorkloadVariant,
) -> LeaderWorkerSet {
    let base_labels = workload_labels(llm_svc);
    let mut role_labels = base_labels.clone();
    role_labels.insert(ROLE_LABEL_KEY.to_string(), variant.role().to_string());

    let needs_rbac = has_routing_sidecar(workload);
    let service_account = needs_rbac.then(|| child_name(&llm_svc.name_any(), "-kserve-mn"));

    let leader_template = workload.template.as_ref().map(|template| {
        let mut pod = template.clone();
        inject_model_storage(&mut pod, &llm_svc.spec.model.uri);
        if let Some(sa) = &service_account {
            pod.service_account_name = Some(sa.clone());
        }
        PodTemplateSpec {
            metadata: Some(ObjectMeta {
                labels: Some(role_labels.clone()),
                ..Default::default()
            }),
            spec: Some(pod),
        }
    });

    // Without a dedicated leader the workers double as the pool targets and
    // carry the role label themselves.
    let worker_labels = if leader_template.is_some() {
        base_labels
    } else {
        role_labels
    };

    let mut worker_pod = workload.worker.clone().unwrap_or_default();
    if let Some(sa) = &service_account {
        worker_pod.service_account_name = Some(sa.clone());
    }
    let worker_template = PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(worker_labels),
            ..Default::default()
        }),
        spec: Some(worker_pod),
    };

    LeaderWorkerSet {
        metadata: ObjectMeta {
            name: Some(child_name(&llm_svc.name_any(), variant.group_suffix())),
            namespace: llm_svc.namespace(),
            labels: Some(workload_labels(llm_svc)),
            owner_references: llm_svc.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        spec: LeaderWorkerSetSpec {
            replicas: Some(workload.replicas.unwrap_or(1)),
            leader_worker_template: LeaderWorkerTemplate {
                size: workload.parallelism.as_ref().and_then(ParallelismSpec::size),
                leader_template,
                worker_template,
            },
        },
        status: None,
    }
}

/// True when either template of the workload carries the routing sidecar
pub fn has_routing_sidecar(workload: &WorkloadSpec) -> bool {
    let has_sidecar = |pod: &PodSpec| {
        pod.containers
            .iter()
            .chain(pod.init_containers.as_deref().unwrap_or_default())
            .any(|c| c.name == ROUTING_SIDECAR_CONTAINER_NAME)
    };
    workload.template.as_ref().is_some_and(&has_sidecar)
        || workload.worker.as_ref().is_some_and(&has_sidecar)
}

async fn reconcile_workload_rbac(
    client: &Client,
    llm_svc: &LLMInferenceService,
) -> Result<(), Error> {
    let namespace = llm_svc.namespace().unwrap_or_default();
    let name = llm_svc.name_any();
    let labels = workload_labels(llm_svc);
    let owner = llm_svc.controller_owner_ref(&()).map(|r| vec![r]);

    let sa = ServiceAccount {
        metadata: ObjectMeta {
            name: Some(child_name(&name, "-kserve-mn")),
            namespace: Some(namespace.clone()),
            labels: Some(labels.clone()),
            owner_references: owner.clone(),
            ..Default::default()
        },
        ..Default::default()
    };
    let sa_api: Api<ServiceAccount> = Api::namespaced(client.clone(), &namespace);
    reconcile_child(&sa_api, llm_svc, sa, metadata_derivative_eq).await?;

    let role = Role {
        metadata: ObjectMeta {
            name: Some(child_name(&name, "-kserve-mn-role")),
            namespace: Some(namespace.clone()),
            labels: Some(labels.clone()),
            owner_references: owner.clone(),
            ..Default::default()
        },
        rules: Some(routing_sidecar_rules()),
    };
    let role_api: Api<Role> = Api::namespaced(client.clone(), &namespace);
    reconcile_child(&role_api, llm_svc, role, |e, c| {
        derivative_eq(&e.rules, &c.rules) && metadata_derivative_eq(e, c)
    })
    .await?;

    let binding = RoleBinding {
        metadata: ObjectMeta {
            name: Some(child_name(&name, "-kserve-mn-rb")),
            namespace: Some(namespace.clone()),
            labels: Some(labels),
            owner_references: owner,
            ..Default::default()
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: child_name(&name, "-kserve-mn"),
            namespace: Some(namespace.clone()),
            ..Default::default()
        }]),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "Role".to_string(),
            name: child_name(&name, "-kserve-mn-role"),
        },
    };
    let binding_api: Api<RoleBinding> = Api::namespaced(client.clone(), &namespace);
    reconcile_child(&binding_api, llm_svc, binding, |e, c| {
        derivative_eq(&e.subjects, &c.subjects)
            && derivative_eq(&e.role_ref, &c.role_ref)
            && metadata_derivative_eq(e, c)
    })
    .await?;

    info!(service = %name, "routing sidecar RBAC reconciled");
    Ok(())
}

async fn delete_workload_rbac(
    client: &Client,
    llm_svc: &LLMInferenceService,
) -> Result<(), Error> {
    let namespace = llm_svc.namespace().unwrap_or_default();
    let name = llm_svc.name_any();

    let binding_api: Api<RoleBinding> = Api::namespaced(client.clone(), &namespace);
    delete_child(&binding_api, &child_name(&name, "-kserve-mn-rb")).await?;
    let role_api: Api<Role> = Api::namespaced(client.clone(), &namespace);
    delete_child(&role_api, &child_name(&name, "-kserve-mn-role")).await?;
    let sa_api: Api<ServiceAccount> = Api::namespaced(client.clone(), &namespace);
    delete_child(&sa_api, &child_name(&name, "-kserve-mn")).await
}

fn routing_sidecar_rules() -> Vec<PolicyRule> {
    let read = |groups: &[&str], resources: &[&str]| PolicyRule {
        api_groups: Some(groups.iter().map(|s| s.to_string()).collect()),
        resources: Some(resources.iter().map(|s| s.to_string()).collect()),
        verbs: vec!["get".to_string(), "list".to_string(), "watch".to_string()],
        ..Default::default()
    };
    vec![
        read(&[""], &["pods"]),
        read(&[INFERENCE_GROUP_ALPHA2], &["inferencepools", "inferencemodels"]),
        read(&[INFERENCE_GROUP_V1], &["inferencepools", "inferencemodels"]),
        read(&["discovery.k8s.io"], &["endpointslices"]),
    ]
}

/// Model storage backing derived from the model URI scheme
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelStorage {
    /// `pvc://claim/sub/path`: mount the claim read-only
    Pvc {
        /// Claim name
        claim: String,
        /// Path inside the claim
        sub_path: String,
    },
    /// `oci://image[:tag]`: modelcar sidecar with pre-fetch
    Oci {
        /// Full image reference
        image: String,
    },
    /// Any other scheme: the runtime resolves the model itself
    Opaque,
}

/// Parse the storage backing out of a model URI
pub fn parse_model_storage(uri: &str) -> ModelStorage {
    if let Some(rest) = uri.strip_prefix("pvc://") {
        let (claim, sub_path) = match rest.split_once('/') {
            Some((claim, sub)) => (claim.to_string(), sub.to_string()),
            None => (rest.to_string(), String::new()),
        };
        return ModelStorage::Pvc { claim, sub_path };
    }
    if let Some(image) = uri.strip_prefix("oci://") {
        return ModelStorage::Oci {
            image: image.to_string(),
        };
    }
    ModelStorage::Opaque
}

/// Inject storage volumes and sidecars for the model URI into a pod spec
pub fn inject_model_storage(pod: &mut PodSpec, uri: &str) {
    match parse_model_storage(uri) {
        ModelStorage::Pvc { claim, sub_path } => {
            pod.volumes.get_or_insert_with(Vec::new).push(Volume {
                name: "model-storage".to_string(),
                persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                    claim_name: claim,
                    read_only: Some(true),
                }),
                ..Default::default()
            });
            if let Some(main) = main_container_mut(pod) {
                main.volume_mounts.get_or_insert_with(Vec::new).push(VolumeMount {
                    name: "model-storage".to_string(),
                    mount_path: MODEL_MOUNT_PATH.to_string(),
                    sub_path: (!sub_path.is_empty()).then_some(sub_path),
                    read_only: Some(true),
                    ..Default::default()
                });
                main.args
                    .get_or_insert_with(Vec::new)
                    .push(MODEL_MOUNT_PATH.to_string());
            }
        }
        ModelStorage::Oci { image } => {
            pod.share_process_namespace = Some(true);
            pod.volumes.get_or_insert_with(Vec::new).push(Volume {
                name: "modelcar".to_string(),
                empty_dir: Some(EmptyDirVolumeSource::default()),
                ..Default::default()
            });
            pod.init_containers.get_or_insert_with(Vec::new).push(Container {
                name: "oci-prefetch".to_string(),
                image: Some(image.clone()),
                command: Some(vec!["/bin/sh".to_string(), "-c".to_string(), "true".to_string()]),
                ..Default::default()
            });
            pod.containers.push(Container {
                name: "modelcar".to_string(),
                image: Some(image),
                volume_mounts: Some(vec![VolumeMount {
                    name: "modelcar".to_string(),
                    mount_path: MODELCAR_MOUNT_PATH.to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            });
            if let Some(main) = main_container_mut(pod) {
                main.volume_mounts.get_or_insert_with(Vec::new).push(VolumeMount {
                    name: "modelcar".to_string(),
                    mount_path: MODELCAR_MOUNT_PATH.to_string(),
                    ..Default::default()
                });
                main.env.get_or_insert_with(Vec::new).push(EnvVar {
                    name: "MODEL_INIT_MODE".to_string(),
                    value: Some("async".to_string()),
                    ..Default::default()
                });
            }
        }
        ModelStorage::Opaque => {}
    }
}

fn main_container_mut(pod: &mut PodSpec) -> Option<&mut Container> {
    if let Some(i) = pod
        .containers
        .iter()
        .position(|c| c.name == MAIN_CONTAINER_NAME)
    {
        return pod.containers.get_mut(i);
    }
    pod.containers
        .iter_mut()
        .find(|c| c.name != "modelcar")
}

/// Readiness of a deployment as (ready | (reason, message))
pub fn deployment_ready(deployment: &Deployment) -> Result<(), (String, String)> {
    let conditions = deployment
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref());
    let available = conditions
        .and_then(|conds| conds.iter().find(|c| c.type_ == "Available"));

    match available {
        Some(cond) if cond.status == "True" => Ok(()),
        Some(cond) => Err((
            cond.reason.clone().unwrap_or_else(|| "NotAvailable".to_string()),
            cond.message
                .clone()
                .unwrap_or_else(|| "deployment is not available".to_string()),
        )),
        None => Err((
            "Pending".to_string(),
            "deployment has not reported availability yet".to_string(),
        )),
    }
}

/// Readiness of a leader/worker group as (ready | (reason, message))
pub fn leader_worker_set_ready(group: &LeaderWorkerSet) -> Result<(), (String, String)> {
    let available = group
        .status
        .as_ref()
        .and_then(|s| s.conditions.iter().find(|c| c.type_ == "Available"));

    match available {
        Some(cond) if cond.status == "True" => Ok(()),
        Some(cond) => Err((cond.reason.clone(), cond.message.clone())),
        None => Err((
            "Pending".to_string(),
            "leader/worker group has not reported availability yet".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::test_support::service;

    fn pod_with_main() -> PodSpec {
        PodSpec {
            containers: vec![Container {
                name: MAIN_CONTAINER_NAME.to_string(),
                image: Some("vllm/vllm-openai:latest".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn pvc_uri_mounts_the_claim_read_only_with_sub_path() {
        let mut pod = pod_with_main();
        inject_model_storage(&mut pod, "pvc://bucket/sub/path");

        let volume = &pod.volumes.as_ref().unwrap()[0];
        let pvc = volume.persistent_volume_claim.as_ref().unwrap();
        assert_eq!(pvc.claim_name, "bucket");
        assert_eq!(pvc.read_only, Some(true));

        let main = &pod.containers[0];
        let mount = &main.volume_mounts.as_ref().unwrap()[0];
        assert_eq!(mount.mount_path, MODEL_MOUNT_PATH);
        assert_eq!(mount.sub_path.as_deref(), Some("sub/path"));
        assert_eq!(mount.read_only, Some(true));

        // the mount path is handed to the runtime as an argument
        assert_eq!(
            main.args.as_ref().unwrap().last().map(String::as_str),
            Some(MODEL_MOUNT_PATH)
        );
    }

    #[test]
    fn pvc_uri_with_single_segment_sub_path() {
        let mut pod = pod_with_main();
        inject_model_storage(&mut pod, "pvc://bucket/sub");
        let mount = &pod.containers[0].volume_mounts.as_ref().unwrap()[0];
        assert_eq!(mount.sub_path.as_deref(), Some("sub"));
    }

    #[test]
    fn oci_uri_adds_modelcar_sidecar_and_prefetch() {
        let mut pod = pod_with_main();
        inject_model_storage(&mut pod, "oci://img:tag");

        assert_eq!(pod.share_process_namespace, Some(true));

        let init = &pod.init_containers.as_ref().unwrap()[0];
        assert_eq!(init.name, "oci-prefetch");
        assert_eq!(init.image.as_deref(), Some("img:tag"));

        let modelcar = pod.containers.iter().find(|c| c.name == "modelcar").unwrap();
        assert_eq!(
            modelcar.volume_mounts.as_ref().unwrap()[0].mount_path,
            MODELCAR_MOUNT_PATH
        );

        let main = pod
            .containers
            .iter()
            .find(|c| c.name == MAIN_CONTAINER_NAME)
            .unwrap();
        assert!(main
            .env
            .as_ref()
            .unwrap()
            .iter()
            .any(|e| e.name == "MODEL_INIT_MODE" && e.value.as_deref() == Some("async")));
        assert_eq!(
            main.volume_mounts.as_ref().unwrap()[0].mount_path,
            MODELCAR_MOUNT_PATH
        );
    }

    #[test]
    fn opaque_uris_leave_the_pod_untouched() {
        let mut pod = pod_with_main();
        let before = pod.clone();
        inject_model_storage(&mut pod, "hf://facebook/opt-125m");
        assert_eq!(pod, before);
    }

    #[test]
    fn single_node_deployment_shape() {
        let mut svc = service("my-llm", "ns");
        svc.spec.workload.template = Some(pod_with_main());

        let workload = svc.spec.workload.clone();
        let deployment = expected_deployment(&svc, &workload, WorkloadVariant::Decode);

        assert_eq!(deployment.name_any(), "my-llm-kserve");
        let spec = deployment.spec.as_ref().unwrap();
        assert_eq!(spec.replicas, Some(1));

        let labels = deployment.metadata.labels.as_ref().unwrap();
        assert_eq!(labels.get(ROLE_LABEL_KEY).map(String::as_str), Some("decode"));

        let owners = deployment.metadata.owner_references.as_ref().unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].controller, Some(true));
        assert_eq!(owners[0].kind, "LLMInferenceService");
    }

    #[test]
    fn multi_node_group_size_comes_from_parallelism() {
        // data=10, dataLocal=2 -> groups of 5
        let mut svc = service("my-llm", "ns");
        svc.spec.workload = WorkloadSpec {
            replicas: Some(1),
            parallelism: Some(ParallelismSpec {
                data: Some(10),
                data_local: Some(2),
                tensor: Some(4),
                ..Default::default()
            }),
            template: Some(pod_with_main()),
            worker: Some(pod_with_main()),
        };

        let workload = svc.spec.workload.clone();
        let group = expected_leader_worker_set(&svc, &workload, WorkloadVariant::Decode);

        assert_eq!(group.name_any(), "my-llm-kserve-mn");
        assert_eq!(group.spec.replicas, Some(1));
        assert_eq!(group.spec.leader_worker_template.size, Some(5));

        let leader = group.spec.leader_worker_template.leader_template.as_ref().unwrap();
        let leader_labels = leader.metadata.as_ref().unwrap().labels.as_ref().unwrap();
        assert_eq!(leader_labels.get(ROLE_LABEL_KEY).map(String::as_str), Some("decode"));

        // with a leader present, the workers carry only the base labels
        let worker_labels = group
            .spec
            .leader_worker_template
            .worker_template
            .metadata
            .as_ref()
            .unwrap()
            .labels
            .as_ref()
            .unwrap();
        assert!(!worker_labels.contains_key(ROLE_LABEL_KEY));
    }

    #[test]
    fn prefill_group_carries_the_prefill_role() {
        // prefill: data=3, dataLocal=1 -> groups of 3
        let mut svc = service("my-llm", "ns");
        let prefill = WorkloadSpec {
            replicas: Some(1),
            parallelism: Some(ParallelismSpec {
                data: Some(3),
                data_local: Some(1),
                tensor: Some(4),
                ..Default::default()
            }),
            template: Some(pod_with_main()),
            worker: Some(pod_with_main()),
        };
        svc.spec.prefill = Some(prefill.clone());

        let group = expected_leader_worker_set(&svc, &prefill, WorkloadVariant::Prefill);
        assert_eq!(group.name_any(), "my-llm-kserve-mn-prefill");
        assert_eq!(group.spec.leader_worker_template.size, Some(3));

        let leader = group.spec.leader_worker_template.leader_template.as_ref().unwrap();
        let labels = leader.metadata.as_ref().unwrap().labels.as_ref().unwrap();
        assert_eq!(labels.get(ROLE_LABEL_KEY).map(String::as_str), Some("prefill"));
    }

    #[test]
    fn workers_only_group_labels_workers_with_the_role() {
        let mut svc = service("my-llm", "ns");
        svc.spec.workload = WorkloadSpec {
            parallelism: Some(ParallelismSpec {
                data: Some(4),
                data_local: Some(2),
                ..Default::default()
            }),
            template: None,
            worker: Some(pod_with_main()),
            ..Default::default()
        };

        let workload = svc.spec.workload.clone();
        let group = expected_leader_worker_set(&svc, &workload, WorkloadVariant::Decode);

        assert!(group.spec.leader_worker_template.leader_template.is_none());
        let worker_labels = group
            .spec
            .leader_worker_template
            .worker_template
            .metadata
            .as_ref()
            .unwrap()
            .labels
            .as_ref()
            .unwrap();
        assert_eq!(worker_labels.get(ROLE_LABEL_KEY).map(String::as_str), Some("decode"));
    }

    #[test]
    fn routing_sidecar_forces_a_service_account_on_both_templates() {
        let sidecar_pod = PodSpec {
            containers: vec![
                Container {
                    name: MAIN_CONTAINER_NAME.to_string(),
                    ..Default::default()
                },
                Container {
                    name: ROUTING_SIDECAR_CONTAINER_NAME.to_string(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let mut svc = service("my-llm", "ns");
        svc.spec.workload = WorkloadSpec {
            template: Some(sidecar_pod.clone()),
            worker: Some(pod_with_main()),
            ..Default::default()
        };

        let workload = svc.spec.workload.clone();
        assert!(has_routing_sidecar(&workload));

        let group = expected_leader_worker_set(&svc, &workload, WorkloadVariant::Decode);
        let leader = group.spec.leader_worker_template.leader_template.unwrap();
        assert_eq!(
            leader.spec.unwrap().service_account_name.as_deref(),
            Some("my-llm-kserve-mn")
        );
        assert_eq!(
            group
                .spec
                .leader_worker_template
                .worker_template
                .spec
                .unwrap()
                .service_account_name
                .as_deref(),
            Some("my-llm-kserve-mn")
        );
    }

    #[test]
    fn deployment_readiness_follows_the_available_condition() {
        use k8s_openapi::api::apps::v1::{DeploymentCondition, DeploymentStatus};

        let mut deployment = Deployment::default();
        assert!(deployment_ready(&deployment).is_err());

        deployment.status = Some(DeploymentStatus {
            conditions: Some(vec![DeploymentCondition {
                type_: "Available".into(),
                status: "False".into(),
                reason: Some("MinimumReplicasUnavailable".into()),
                message: Some("0/1 replicas available".into()),
                ..Default::default()
            }]),
            ..Default::default()
        });
        let (reason, _) = deployment_ready(&deployment).unwrap_err();
        assert_eq!(reason, "MinimumReplicasUnavailable");

        deployment.status.as_mut().unwrap().conditions.as_mut().unwrap()[0].status =
            "True".into();
        assert!(deployment_ready(&deployment).is_ok());
    }
}
