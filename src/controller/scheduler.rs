//! Endpoint-picker scheduler reconciliation
//!
//! The scheduler subsystem exists iff the router block carries a scheduler
//! template and the pool is not a pure external reference. It comprises a
//! service account, an optional auth-delegator cluster binding, a role and
//! role binding, the v1alpha2 InferenceModel, the scheduler deployment (with
//! an injected plugin-graph configuration) and its service.

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{PodSpec, PodTemplateSpec, Service, ServiceAccount, ServicePort, ServiceSpec};
use k8s_openapi::api::rbac::v1::{ClusterRoleBinding, PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{Api, DynamicObject};
use kube::{Client, Resource, ResourceExt};
use serde_json::json;
use tracing::{info, warn};

use super::child::{delete_child, metadata_derivative_eq, reconcile_child};
use super::pool::{delete_alpha2_if_exists, reconcile_alpha2_object};
use super::workload::{deployment_ready, MAIN_CONTAINER_NAME};
use crate::config::OperatorConfig;
use crate::crd::conditions::{ConditionSet, SCHEDULER_WORKLOAD_READY};
use crate::crd::gie::{alpha2_model_resource, INFERENCE_GROUP_ALPHA2, INFERENCE_GROUP_V1};
use crate::crd::types::Criticality;
use crate::crd::LLMInferenceService;
use crate::error::Error;
use crate::naming::{child_name, scheduler_labels};
use crate::semantic::derivative_eq;

/// Container port names surfaced on the scheduler service
const DESIRED_PORT_NAMES: [&str; 3] = ["grpc", "grpc-health", "metrics"];

/// Reconcile the whole scheduler subsystem for one parent
pub async fn reconcile_scheduler(
    client: &Client,
    config: &OperatorConfig,
    llm_svc: &mut LLMInferenceService,
) -> Result<(), Error> {
    info!(service = %llm_svc.name_any(), "reconciling scheduler");

    reconcile_service_account(client, config, llm_svc).await?;
    reconcile_inference_model(client, llm_svc).await?;
    reconcile_deployment(client, llm_svc).await?;
    reconcile_service(client, llm_svc).await?;
    Ok(())
}

async fn reconcile_service_account(
    client: &Client,
    config: &OperatorConfig,
    llm_svc: &LLMInferenceService,
) -> Result<(), Error> {
    let namespace = llm_svc.namespace().unwrap_or_default();
    let sa = expected_service_account(llm_svc);
    let sa_api: Api<ServiceAccount> = Api::namespaced(client.clone(), &namespace);

    if !llm_svc.has_managed_scheduler() {
        reconcile_auth_delegator_binding(client, config, llm_svc, &sa, false).await?;
        delete_child(&sa_api, &sa.name_any()).await?;
        return delete_rbac(client, llm_svc).await;
    }

    reconcile_child(&sa_api, llm_svc, sa.clone(), |e, c| {
        derivative_eq(&e.secrets, &c.secrets)
            && derivative_eq(&e.image_pull_secrets, &c.image_pull_secrets)
            && metadata_derivative_eq(e, c)
    })
    .await?;

    let auth_enabled = config.is_auth_enabled_for(llm_svc);
    reconcile_auth_delegator_binding(client, config, llm_svc, &sa, auth_enabled).await?;

    reconcile_role(client, llm_svc).await?;
    reconcile_role_binding(client, llm_svc, &sa).await
}

async fn reconcile_auth_delegator_binding(
    client: &Client,
    _config: &OperatorConfig,
    llm_svc: &LLMInferenceService,
    sa: &ServiceAccount,
    wanted: bool,
) -> Result<(), Error> {
    let binding = expected_auth_delegator_binding(llm_svc, sa);
    let api: Api<ClusterRoleBinding> = Api::all(client.clone());

    if !wanted {
        return delete_child(&api, &binding.name_any()).await;
    }

    // Cluster-scoped objects are not garbage-collected through namespaced
    // owner references, so this binding is also cleaned up explicitly on
    // parent deletion.
    reconcile_child(&api, llm_svc, binding, |e, c| {
        derivative_eq(&e.subjects, &c.subjects)
            && derivative_eq(&e.role_ref, &c.role_ref)
            && metadata_derivative_eq(e, c)
    })
    .await
}

async fn reconcile_role(client: &Client, llm_svc: &LLMInferenceService) -> Result<(), Error> {
    let namespace = llm_svc.namespace().unwrap_or_default();
    let role = expected_role(llm_svc);
    let api: Api<Role> = Api::namespaced(client.clone(), &namespace);
    reconcile_child(&api, llm_svc, role, |e, c| {
        derivative_eq(&e.rules, &c.rules) && metadata_derivative_eq(e, c)
    })
    .await
}

async fn reconcile_role_binding(
    client: &Client,
    llm_svc: &LLMInferenceService,
    sa: &ServiceAccount,
) -> Result<(), Error> {
    let namespace = llm_svc.namespace().unwrap_or_default();
    let binding = expected_role_binding(llm_svc, sa);
    let api: Api<RoleBinding> = Api::namespaced(client.clone(), &namespace);
    reconcile_child(&api, llm_svc, binding, |e, c| {
        derivative_eq(&e.subjects, &c.subjects)
            && derivative_eq(&e.role_ref, &c.role_ref)
            && metadata_derivative_eq(e, c)
    })
    .await
}

async fn delete_rbac(client: &Client, llm_svc: &LLMInferenceService) -> Result<(), Error> {
    let namespace = llm_svc.namespace().unwrap_or_default();
    let name = llm_svc.name_any();

    let rb_api: Api<RoleBinding> = Api::namespaced(client.clone(), &namespace);
    delete_child(&rb_api, &child_name(&name, "-epp-rb")).await?;
    let role_api: Api<Role> = Api::namespaced(client.clone(), &namespace);
    delete_child(&role_api, &child_name(&name, "-epp-role")).await
}

async fn reconcile_inference_model(
    client: &Client,
    llm_svc: &LLMInferenceService,
) -> Result<(), Error> {
    let namespace = llm_svc.namespace().unwrap_or_default();
    let api: Api<DynamicObject> =
        Api::namespaced_with(client.clone(), &namespace, &alpha2_model_resource());

    let scheduler_present = llm_svc
        .spec
        .router
        .as_ref()
        .and_then(|r| r.scheduler.as_ref())
        .is_some();
    if !scheduler_present {
        return delete_alpha2_if_exists(&api, &child_name(&llm_svc.name_any(), "-inference-model"))
            .await;
    }

    let expected = expected_alpha2_inference_model(llm_svc)?;
    reconcile_alpha2_object(&api, llm_svc, expected, "InferenceModel").await
}

async fn reconcile_deployment(
    client: &Client,
    llm_svc: &mut LLMInferenceService,
) -> Result<(), Error> {
    let namespace = llm_svc.namespace().unwrap_or_default();
    let deployment = expected_deployment(llm_svc);
    let api: Api<Deployment> = Api::namespaced(client.clone(), &namespace);

    if !llm_svc.has_managed_scheduler() {
        return delete_child(&api, &deployment.name_any()).await;
    }

    let name = deployment.name_any();
    if let Err(err) = reconcile_child(&api, llm_svc, deployment, |e, c| {
        derivative_eq(&e.spec, &c.spec) && metadata_derivative_eq(e, c)
    })
    .await
    {
        llm_svc
            .status_mut()
            .mark_false(SCHEDULER_WORKLOAD_READY, err.reason(), &err.to_string());
        return Err(err);
    }

    match api.get_opt(&name).await.map_err(Error::Kube)? {
        Some(current) => match deployment_ready(&current) {
            Ok(()) => llm_svc.status_mut().mark_true(SCHEDULER_WORKLOAD_READY),
            Err((reason, message)) => {
                llm_svc
                    .status_mut()
                    .mark_false(SCHEDULER_WORKLOAD_READY, &reason, &message);
            }
        },
        None => llm_svc.status_mut().mark_unknown(
            SCHEDULER_WORKLOAD_READY,
            "Pending",
            "scheduler deployment not observed yet",
        ),
    }
    Ok(())
}

async fn reconcile_service(
    client: &Client,
    llm_svc: &LLMInferenceService,
) -> Result<(), Error> {
    let namespace = llm_svc.namespace().unwrap_or_default();
    let service = expected_service(llm_svc);
    let api: Api<Service> = Api::namespaced(client.clone(), &namespace);

    if !llm_svc.has_managed_scheduler() {
        return delete_child(&api, &service.name_any()).await;
    }

    reconcile_child(&api, llm_svc, service, |e, c| {
        derivative_eq(&e.spec, &c.spec) && metadata_derivative_eq(e, c)
    })
    .await
}

/// Delete every scheduler child; used on parent finalization and when the
/// scheduler block disappears
pub async fn cleanup_scheduler(
    client: &Client,
    config: &OperatorConfig,
    llm_svc: &LLMInferenceService,
) -> Result<(), Error> {
    let namespace = llm_svc.namespace().unwrap_or_default();
    let sa = expected_service_account(llm_svc);

    reconcile_auth_delegator_binding(client, config, llm_svc, &sa, false).await?;

    let deployments: Api<Deployment> = Api::namespaced(client.clone(), &namespace);
    delete_child(
        &deployments,
        &child_name(&llm_svc.name_any(), "-kserve-router-scheduler"),
    )
    .await?;
    let services: Api<Service> = Api::namespaced(client.clone(), &namespace);
    delete_child(&services, &llm_svc.epp_service_name()).await?;

    let sa_api: Api<ServiceAccount> = Api::namespaced(client.clone(), &namespace);
    delete_child(&sa_api, &sa.name_any()).await?;
    delete_rbac(client, llm_svc).await?;

    let model_api: Api<DynamicObject> =
        Api::namespaced_with(client.clone(), &namespace, &alpha2_model_resource());
    delete_alpha2_if_exists(&model_api, &child_name(&llm_svc.name_any(), "-inference-model"))
        .await
}

/// Expected scheduler service account.
///
/// The name defaults to `<parent>-epp-sa`; a `serviceAccountName` on the
/// scheduler template overrides it so users can bring their own identity.
pub fn expected_service_account(llm_svc: &LLMInferenceService) -> ServiceAccount {
    let mut name = child_name(&llm_svc.name_any(), "-epp-sa");
    if let Some(template_sa) = llm_svc
        .spec
        .router
        .as_ref()
        .and_then(|r| r.scheduler.as_ref())
        .and_then(|s| s.template.as_ref())
        .and_then(|t| t.service_account_name.as_ref())
    {
        if !template_sa.is_empty() {
            name = template_sa.clone();
        }
    }

    ServiceAccount {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: llm_svc.namespace(),
            labels: Some(scheduler_labels(llm_svc)),
            owner_references: llm_svc.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Expected auth-delegator cluster binding; lets the scheduler perform token
/// reviews on behalf of its service account
pub fn expected_auth_delegator_binding(
    llm_svc: &LLMInferenceService,
    sa: &ServiceAccount,
) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: ObjectMeta {
            name: Some(child_name(
                &llm_svc.namespace().unwrap_or_default(),
                &format!("-{}-epp-auth-rb", llm_svc.name_any()),
            )),
            labels: Some(scheduler_labels(llm_svc)),
            ..Default::default()
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: sa.name_any(),
            namespace: sa.namespace(),
            ..Default::default()
        }]),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: "system:auth-delegator".to_string(),
        },
    }
}

/// Expected scheduler role
pub fn expected_role(llm_svc: &LLMInferenceService) -> Role {
    let read = |groups: &[&str], resources: &[&str]| PolicyRule {
        api_groups: Some(groups.iter().map(|s| s.to_string()).collect()),
        resources: Some(resources.iter().map(|s| s.to_string()).collect()),
        verbs: vec!["get".to_string(), "list".to_string(), "watch".to_string()],
        ..Default::default()
    };

    Role {
        metadata: ObjectMeta {
            name: Some(child_name(&llm_svc.name_any(), "-epp-role")),
            namespace: llm_svc.namespace(),
            labels: Some(scheduler_labels(llm_svc)),
            owner_references: llm_svc.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        rules: Some(vec![
            read(&[""], &["pods"]),
            read(
                &[INFERENCE_GROUP_ALPHA2],
                &["inferencepools", "inferencemodels", "inferenceobjectives"],
            ),
            read(&[INFERENCE_GROUP_V1], &["inferencepools", "inferencemodels"]),
            read(&["discovery.k8s.io"], &["endpointslices"]),
        ]),
    }
}

/// Expected scheduler role binding
pub fn expected_role_binding(llm_svc: &LLMInferenceService, sa: &ServiceAccount) -> RoleBinding {
    RoleBinding {
        metadata: ObjectMeta {
            name: Some(child_name(&llm_svc.name_any(), "-epp-rb")),
            namespace: llm_svc.namespace(),
            labels: Some(scheduler_labels(llm_svc)),
            owner_references: llm_svc.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: sa.name_any(),
            namespace: sa.namespace(),
            ..Default::default()
        }]),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "Role".to_string(),
            name: child_name(&llm_svc.name_any(), "-epp-role"),
        },
    }
}

/// Expected scheduler deployment, with the plugin-graph configuration
/// injected into the main container unless the template already carries one
pub fn expected_deployment(llm_svc: &LLMInferenceService) -> Deployment {
    let labels = scheduler_labels(llm_svc);

    let mut pod: PodSpec = llm_svc
        .spec
        .router
        .as_ref()
        .and_then(|r| r.scheduler.as_ref())
        .and_then(|s| s.template.clone())
        .unwrap_or_default();

    for container in pod.containers.iter_mut() {
        if container.name != MAIN_CONTAINER_NAME {
            continue;
        }
        let args = container.args.get_or_insert_with(Vec::new);
        let has_config = args.iter().any(|a| {
            matches!(
                a.as_str(),
                "--config-text" | "-config-text" | "--config-file" | "-config-file"
            )
        });
        if !has_config {
            args.push("--config-text".to_string());
            args.push(scheduler_config_text(llm_svc).to_string());
        }
        break;
    }

    Deployment {
        metadata: ObjectMeta {
            name: Some(child_name(&llm_svc.name_any(), "-kserve-router-scheduler")),
            namespace: llm_svc.namespace(),
            labels: Some(labels.clone()),
            owner_references: llm_svc.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
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

/// Plugin-graph configuration handed to the endpoint picker.
///
/// Two embedded documents: a prefill/decode profile when the spec has a
/// prefill twin, a single default profile otherwise. Opaque strings to this
/// controller.
pub fn scheduler_config_text(llm_svc: &LLMInferenceService) -> &'static str {
    if llm_svc.spec.prefill.is_some() {
        // Always do P/D by default (threshold 0)
        r#"
apiVersion: inference.networking.x-k8s.io/v1alpha1
kind: EndpointPickerConfig
plugins:
  - type: prefill-header-handler
  - type: prefill-filter
  - type: decode-filter
  - type: max-score-picker
  - type: prefix-cache-scorer
  - type: queue-scorer
  - type: pd-profile-handler
    parameters:
      threshold: 0
schedulingProfiles:
  - name: prefill
    plugins:
      - pluginRef: prefill-filter
      - pluginRef: queue-scorer
        weight: 1.0
      - pluginRef: max-score-picker
  - name: decode
    plugins:
      - pluginRef: decode-filter
      - pluginRef: queue-scorer
        weight: 1.0
      - pluginRef: max-score-picker
"#
    } else {
        r#"
apiVersion: inference.networking.x-k8s.io/v1alpha1
kind: EndpointPickerConfig
plugins:
- type: single-profile-handler
- type: prefix-cache-scorer
- type: load-aware-scorer
- type: max-score-picker
schedulingProfiles:
- name: default
  plugins:
  - pluginRef: prefix-cache-scorer
    weight: 2.0
  - pluginRef: load-aware-scorer
    weight: 1.0
  - pluginRef: max-score-picker
"#
    }
}

/// Expected scheduler service: named container ports surfaced as service
/// ports with string target ports, sorted by name for deterministic output
pub fn expected_service(llm_svc: &LLMInferenceService) -> Service {
    let labels = scheduler_labels(llm_svc);

    let mut ports: Vec<ServicePort> = Vec::new();
    if let Some(template) = llm_svc
        .spec
        .router
        .as_ref()
        .and_then(|r| r.scheduler.as_ref())
        .and_then(|s| s.template.as_ref())
    {
        for container in &template.containers {
            for port in container.ports.as_deref().unwrap_or_default() {
                let Some(name) = port.name.as_deref() else {
                    continue;
                };
                if DESIRED_PORT_NAMES.contains(&name) {
                    ports.push(ServicePort {
                        name: Some(name.to_string()),
                        port: port.container_port,
                        target_port: Some(IntOrString::String(name.to_string())),
                        protocol: port.protocol.clone(),
                        ..Default::default()
                    });
                }
            }
        }
    }

    ports.sort_by(|a, b| a.name.cmp(&b.name));

    if ports.len() != DESIRED_PORT_NAMES.len() {
        let found: Vec<_> = ports.iter().filter_map(|p| p.name.clone()).collect();
        warn!(
            service = %llm_svc.name_any(),
            desired = ?DESIRED_PORT_NAMES,
            found = ?found,
            "some scheduler ports are not present on the template"
        );
    }

    Service {
        metadata: ObjectMeta {
            name: Some(llm_svc.epp_service_name()),
            namespace: llm_svc.namespace(),
            labels: Some(labels.clone()),
            owner_references: llm_svc.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(labels),
            ports: (!ports.is_empty()).then_some(ports),
            ..Default::default()
        }),
        status: None,
    }
}

/// Expected v1alpha2 InferenceModel for the scheduler to route with
pub fn expected_alpha2_inference_model(
    llm_svc: &LLMInferenceService,
) -> Result<DynamicObject, Error> {
    let name = child_name(&llm_svc.name_any(), "-inference-model");
    let model_name = llm_svc
        .spec
        .model
        .name
        .clone()
        .unwrap_or_else(|| llm_svc.name_any());
    let criticality = llm_svc
        .spec
        .model
        .criticality
        .unwrap_or(Criticality::Critical)
        .to_string();

    let object = json!({
        "apiVersion": format!("{INFERENCE_GROUP_ALPHA2}/v1alpha2"),
        "kind": "InferenceModel",
        "metadata": {
            "name": name,
            "namespace": llm_svc.namespace(),
            "labels": scheduler_labels(llm_svc),
            "ownerReferences": llm_svc.controller_owner_ref(&()).map(|r| vec![r]),
        },
        "spec": {
            "modelName": model_name,
            "poolRef": {
                "group": INFERENCE_GROUP_V1,
                "kind": "InferencePool",
                "name": llm_svc.inference_pool_name(),
            },
            "criticality": criticality,
        },
    });

    serde_json::from_value(object).map_err(|e| Error::serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::{Container, ContainerPort};

    use super::*;
    use crate::crd::test_support::service;
    use crate::crd::types::{RouterSpec, SchedulerSpec, WorkloadSpec};

    fn scheduler_template() -> PodSpec {
        PodSpec {
            containers: vec![Container {
                name: MAIN_CONTAINER_NAME.to_string(),
                image: Some("epp:latest".to_string()),
                ports: Some(vec![
                    ContainerPort {
                        name: Some("metrics".into()),
                        container_port: 9090,
                        protocol: Some("TCP".into()),
                        ..Default::default()
                    },
                    ContainerPort {
                        name: Some("grpc".into()),
                        container_port: 9002,
                        protocol: Some("TCP".into()),
                        ..Default::default()
                    },
                    ContainerPort {
                        name: Some("grpc-health".into()),
                        container_port: 9003,
                        protocol: Some("TCP".into()),
                        ..Default::default()
                    },
                ]),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn with_scheduler(template: PodSpec) -> crate::crd::LLMInferenceService {
        let mut svc = service("my-llm", "ns");
        svc.spec.router = Some(RouterSpec {
            scheduler: Some(SchedulerSpec {
                template: Some(template),
                pool: None,
            }),
            ..Default::default()
        });
        svc
    }

    #[test]
    fn service_surfaces_named_ports_sorted_with_string_targets() {
        let svc = with_scheduler(scheduler_template());
        let expected = expected_service(&svc);

        let ports = expected.spec.as_ref().unwrap().ports.as_ref().unwrap();
        let names: Vec<_> = ports.iter().filter_map(|p| p.name.as_deref()).collect();
        assert_eq!(names, vec!["grpc", "grpc-health", "metrics"]);
        assert_eq!(
            ports[0].target_port,
            Some(IntOrString::String("grpc".to_string()))
        );
        assert_eq!(ports[2].port, 9090);
        assert_eq!(expected.name_any(), "my-llm-epp-service");
    }

    #[test]
    fn config_text_is_injected_unless_already_configured() {
        let svc = with_scheduler(scheduler_template());
        let deployment = expected_deployment(&svc);
        let args = deployment.spec.as_ref().unwrap().template.spec.as_ref().unwrap().containers
            [0]
        .args
        .as_ref()
        .unwrap();
        assert_eq!(args[args.len() - 2], "--config-text");
        assert!(args.last().unwrap().contains("single-profile-handler"));

        // an explicit --config-file suppresses injection
        let mut template = scheduler_template();
        template.containers[0].args =
            Some(vec!["--config-file".into(), "/etc/epp/config.yaml".into()]);
        let svc = with_scheduler(template);
        let deployment = expected_deployment(&svc);
        let args = deployment.spec.as_ref().unwrap().template.spec.as_ref().unwrap().containers
            [0]
        .args
        .as_ref()
        .unwrap();
        assert_eq!(args, &["--config-file", "/etc/epp/config.yaml"]);
    }

    #[test]
    fn prefill_twin_selects_the_pd_profile() {
        let mut svc = with_scheduler(scheduler_template());
        assert!(scheduler_config_text(&svc).contains("single-profile-handler"));

        svc.spec.prefill = Some(WorkloadSpec::default());
        let text = scheduler_config_text(&svc);
        assert!(text.contains("pd-profile-handler"));
        assert!(text.contains("name: prefill"));
        assert!(text.contains("name: decode"));
    }

    #[test]
    fn service_account_name_can_be_overridden_by_the_template() {
        let svc = with_scheduler(scheduler_template());
        assert_eq!(expected_service_account(&svc).name_any(), "my-llm-epp-sa");

        let mut template = scheduler_template();
        template.service_account_name = Some("custom-epp".to_string());
        let svc = with_scheduler(template);
        assert_eq!(expected_service_account(&svc).name_any(), "custom-epp");
    }

    #[test]
    fn auth_delegator_binding_targets_the_cluster_role() {
        let svc = with_scheduler(scheduler_template());
        let sa = expected_service_account(&svc);
        let binding = expected_auth_delegator_binding(&svc, &sa);

        assert_eq!(binding.name_any(), "ns-my-llm-epp-auth-rb");
        assert_eq!(binding.role_ref.name, "system:auth-delegator");
        assert_eq!(binding.role_ref.kind, "ClusterRole");
        let subject = &binding.subjects.as_ref().unwrap()[0];
        assert_eq!(subject.name, "my-llm-epp-sa");
        assert_eq!(subject.namespace.as_deref(), Some("ns"));
    }

    #[test]
    fn role_reads_pods_pools_models_and_endpointslices() {
        let svc = with_scheduler(scheduler_template());
        let role = expected_role(&svc);
        let rules = role.rules.as_ref().unwrap();
        assert_eq!(rules.len(), 4);
        assert!(rules.iter().any(|r| r
            .api_groups
            .as_ref()
            .unwrap()
            .contains(&INFERENCE_GROUP_ALPHA2.to_string())
            && r.resources.as_ref().unwrap().contains(&"inferenceobjectives".to_string())));
    }

    #[test]
    fn inference_model_defaults_name_and_criticality() {
        let svc = with_scheduler(scheduler_template());
        let model = expected_alpha2_inference_model(&svc).unwrap();

        assert_eq!(model.metadata.name.as_deref(), Some("my-llm-inference-model"));
        let spec = &model.data["spec"];
        assert_eq!(spec["modelName"], "my-llm");
        assert_eq!(spec["criticality"], "Critical");
        assert_eq!(spec["poolRef"]["name"], "my-llm-inference-pool");
        assert_eq!(spec["poolRef"]["group"], INFERENCE_GROUP_V1);
    }

    #[test]
    fn inference_model_honors_explicit_model_name_and_criticality() {
        let mut svc = with_scheduler(scheduler_template());
        svc.spec.model.name = Some("opt-125m".to_string());
        svc.spec.model.criticality = Some(Criticality::Sheddable);

        let model = expected_alpha2_inference_model(&svc).unwrap();
        assert_eq!(model.data["spec"]["modelName"], "opt-125m");
        assert_eq!(model.data["spec"]["criticality"], "Sheddable");
    }
}
