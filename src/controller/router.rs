//! Router reconciliation: managed HTTP route, gateway resolution, and
//! externally visible addresses
//!
//! A managed route exists iff the router block embeds a route spec without
//! user refs. User-provided routes and gateways are referenced, checked for
//! existence and acceptance, but never mutated. Discovered URLs land in the
//! parent status (external first, the first one as the primary URL).

use kube::api::{Api, PostParams};
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, info};

use super::child::is_controlled_by;
use super::discovery::{classify_urls, discover_urls};
use super::migration::MIGRATION_ANNOTATION;
use crate::config::OperatorConfig;
use crate::crd::conditions::{ConditionSet, GATEWAYS_READY, HTTP_ROUTES_READY};
use crate::crd::gwapi::{Gateway, HTTPRoute, HTTPRouteSpec, ParentReference};
use crate::crd::types::Addressable;
use crate::crd::LLMInferenceService;
use crate::error::Error;
use crate::naming::{child_name, router_labels};
use crate::semantic::derivative_eq;

/// Reconcile the router surface for one parent
pub async fn reconcile_router(
    client: &Client,
    config: &OperatorConfig,
    llm_svc: &mut LLMInferenceService,
) -> Result<(), Error> {
    let namespace = llm_svc.namespace().unwrap_or_default();
    let route_api: Api<HTTPRoute> = Api::namespaced(client.clone(), &namespace);
    let managed_name = child_name(&llm_svc.name_any(), "-kserve-route");

    let Some(router) = llm_svc.spec.router.clone() else {
        // Router removed: only the managed route (if any) is ours to delete.
        return delete_managed_route(&route_api, &managed_name).await;
    };

    reconcile_gateways(client, config, llm_svc).await?;

    let http = router.route.as_ref().and_then(|r| r.http.as_ref());

    let observed_routes: Vec<HTTPRoute> = if llm_svc.has_managed_route() {
        let expected = expected_managed_route(llm_svc, config);
        reconcile_managed_route(&route_api, llm_svc, expected).await?;
        match route_api.get_opt(&managed_name).await.map_err(Error::Kube)? {
            Some(route) => vec![route],
            None => vec![],
        }
    } else {
        // No managed spec: a previously managed route must go away.
        delete_managed_route(&route_api, &managed_name).await?;

        let mut routes = Vec::new();
        for reference in http.map(|h| h.refs.clone()).unwrap_or_default() {
            let ref_namespace = reference.namespace.clone().unwrap_or_else(|| namespace.clone());
            let api: Api<HTTPRoute> = Api::namespaced(client.clone(), &ref_namespace);
            match api.get_opt(&reference.name).await.map_err(Error::Kube)? {
                Some(route) => routes.push(route),
                None => {
                    let err =
                        Error::not_found("HTTPRoute", ref_namespace.as_str(), reference.name.as_str());
                    llm_svc
                        .status_mut()
                        .mark_false(HTTP_ROUTES_READY, "NotFound", &err.to_string());
                    return Err(err);
                }
            }
        }
        routes
    };

    propagate_route_readiness(llm_svc, &observed_routes);
    populate_addresses(client, llm_svc, &observed_routes).await
}

async fn reconcile_gateways(
    client: &Client,
    config: &OperatorConfig,
    llm_svc: &mut LLMInferenceService,
) -> Result<(), Error> {
    let refs = gateway_refs(llm_svc, config);
    if refs.is_empty() {
        return Ok(());
    }

    for (namespace, name) in &refs {
        let api: Api<Gateway> = Api::namespaced(client.clone(), namespace);
        if api.get_opt(name).await.map_err(Error::Kube)?.is_none() {
            let err = Error::not_found("Gateway", namespace.as_str(), name.as_str());
            llm_svc
                .status_mut()
                .mark_false(GATEWAYS_READY, "NotFound", &err.to_string());
            return Err(err);
        }
    }

    llm_svc.status_mut().mark_true(GATEWAYS_READY);
    Ok(())
}

/// Gateways the router depends on: explicit refs, or the default ingress
/// gateway when the gateway block is the managed marker or a managed route
/// needs attachment
pub fn gateway_refs(
    llm_svc: &LLMInferenceService,
    config: &OperatorConfig,
) -> Vec<(String, String)> {
    let namespace = llm_svc.namespace().unwrap_or_default();
    let Some(router) = &llm_svc.spec.router else {
        return Vec::new();
    };

    if let Some(gateway) = &router.gateway {
        if gateway.has_refs() {
            return gateway
                .refs
                .iter()
                .map(|r| {
                    (
                        r.namespace.clone().unwrap_or_else(|| namespace.clone()),
                        r.name.clone(),
                    )
                })
                .collect();
        }
        // Managed marker: the default ingress gateway carries the traffic.
        return vec![(
            config.ingress_gateway_namespace.clone(),
            config.ingress_gateway_name.clone(),
        )];
    }

    if llm_svc.has_managed_route() {
        return vec![(
            config.ingress_gateway_namespace.clone(),
            config.ingress_gateway_name.clone(),
        )];
    }

    Vec::new()
}

/// Expected managed route: embedded spec plus derived parent refs
pub fn expected_managed_route(llm_svc: &LLMInferenceService, config: &OperatorConfig) -> HTTPRoute {
    let mut spec: HTTPRouteSpec = llm_svc
        .spec
        .router
        .as_ref()
        .and_then(|r| r.route.as_ref())
        .and_then(|r| r.http.as_ref())
        .and_then(|h| h.spec.clone())
        .unwrap_or_default();

    let derived: Vec<ParentReference> = gateway_refs(llm_svc, config)
        .into_iter()
        .map(|(namespace, name)| ParentReference::gateway(name, namespace))
        .collect();
    // Gateway refs (or the default gateway) win over parent refs embedded in
    // the route spec; embedded refs only survive when nothing else is given.
    if !derived.is_empty() {
        spec.parent_refs = derived;
    }

    let mut route = HTTPRoute::new(&child_name(&llm_svc.name_any(), "-kserve-route"), spec);
    route.metadata.namespace = llm_svc.namespace();
    route.metadata.labels = Some(router_labels(llm_svc));
    route.metadata.owner_references = llm_svc.controller_owner_ref(&()).map(|r| vec![r]);
    route
}

async fn reconcile_managed_route(
    api: &Api<HTTPRoute>,
    llm_svc: &mut LLMInferenceService,
    mut expected: HTTPRoute,
) -> Result<(), Error> {
    let name = expected.name_any();

    let outcome = match api.get_opt(&name).await.map_err(Error::Kube)? {
        None => api
            .create(&PostParams::default(), &expected)
            .await
            .map(|_| true)
            .map_err(Error::Kube),
        Some(current) => {
            if !is_controlled_by(&current, llm_svc) {
                Err(Error::NotOwned {
                    kind: "HTTPRoute".to_string(),
                    name: name.clone(),
                    namespace: expected.namespace().unwrap_or_default(),
                    parent: format!(
                        "{}/{}",
                        llm_svc.namespace().unwrap_or_default(),
                        llm_svc.name_any()
                    ),
                })
            } else {
                preserve_migration_state(&mut expected, &current);
                expected.metadata.resource_version = current.resource_version();

                if derivative_eq(&expected.spec, &current.spec)
                    && derivative_eq(&expected.metadata.labels, &current.metadata.labels)
                {
                    debug!(route = %name, "managed route up to date");
                    Ok(false)
                } else {
                    api.replace(&name, &PostParams::default(), &expected)
                        .await
                        .map(|_| true)
                        .map_err(Error::Kube)
                }
            }
        }
    };

    match outcome {
        Ok(written) => {
            if written {
                info!(route = %name, "managed route reconciled");
            }
            Ok(())
        }
        Err(err) => {
            llm_svc
                .status_mut()
                .mark_false(HTTP_ROUTES_READY, err.reason(), &err.to_string());
            Err(err)
        }
    }
}

/// Carry migration state owned by the state machine over from the live
/// route, so a spec sync never resets backend weights or drops the
/// write-once migration annotation
fn preserve_migration_state(expected: &mut HTTPRoute, current: &HTTPRoute) {
    if let Some(value) = current.annotations().get(MIGRATION_ANNOTATION) {
        expected
            .metadata
            .annotations
            .get_or_insert_with(Default::default)
            .insert(MIGRATION_ANNOTATION.to_string(), value.clone());
    }

    for (rule_index, rule) in expected.spec.rules.iter_mut().enumerate() {
        let Some(current_rule) = current.spec.rules.get(rule_index) else {
            continue;
        };
        for backend in rule.backend_refs.iter_mut() {
            if backend.weight.is_some() {
                continue;
            }
            if let Some(live) = current_rule.backend_refs.iter().find(|b| {
                b.group == backend.group && b.kind == backend.kind && b.name == backend.name
            }) {
                backend.weight = live.weight;
            }
        }
    }
}

fn propagate_route_readiness(llm_svc: &mut LLMInferenceService, routes: &[HTTPRoute]) {
    if routes.is_empty() {
        return;
    }

    let accepted = |route: &HTTPRoute| {
        route.status.as_ref().is_some_and(|status| {
            status.parents.iter().any(|parent| {
                parent
                    .conditions
                    .iter()
                    .any(|c| c.type_ == "Accepted" && c.status == "True")
            })
        })
    };

    if routes.iter().all(accepted) {
        llm_svc.status_mut().mark_true(HTTP_ROUTES_READY);
    } else {
        llm_svc.status_mut().mark_false(
            HTTP_ROUTES_READY,
            "NotReady",
            "HTTP route has not been accepted by a gateway yet",
        );
    }
}

async fn populate_addresses(
    client: &Client,
    llm_svc: &mut LLMInferenceService,
    routes: &[HTTPRoute],
) -> Result<(), Error> {
    let mut urls = Vec::new();
    for route in routes {
        match discover_urls(client, route).await {
            Ok(mut discovered) => urls.append(&mut discovered),
            Err(err) if err.is_external_address_not_found() => {
                debug!(route = %route.name_any(), "no addresses discovered yet");
            }
            Err(err) => return Err(err),
        }
    }
    urls.sort();
    urls.dedup();

    let (external, internal) = classify_urls(&urls);
    if external.is_empty() {
        // Typed condition: Ready stays pending until an address appears.
        debug!(service = %llm_svc.name_any(), "no external address discovered yet");
        return Ok(());
    }

    let status = llm_svc.status_mut();
    status.url = external.first().cloned();
    status.addresses = external
        .iter()
        .chain(internal.iter())
        .map(|url| Addressable { url: url.clone() })
        .collect();
    Ok(())
}

async fn delete_managed_route(api: &Api<HTTPRoute>, name: &str) -> Result<(), Error> {
    super::child::delete_child(api, name).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::gwapi::{HTTPBackendRef, HTTPRouteRule};
    use crate::crd::test_support::service;
    use crate::crd::types::{
        GatewayRoutesSpec, GatewaySpec as RouterGatewaySpec, HTTPRouteSpec as RouterHTTPRouteSpec,
        RouterSpec, UntypedObjectReference,
    };
    use crate::crd::gie::INFERENCE_GROUP_V1;

    fn managed_route_svc() -> crate::crd::LLMInferenceService {
        let mut svc = service("my-llm", "ns");
        svc.spec.router = Some(RouterSpec {
            gateway: Some(RouterGatewaySpec { refs: vec![] }),
            route: Some(GatewayRoutesSpec {
                http: Some(RouterHTTPRouteSpec {
                    refs: vec![],
                    spec: Some(HTTPRouteSpec {
                        rules: vec![HTTPRouteRule {
                            backend_refs: vec![HTTPBackendRef {
                                group: Some(INFERENCE_GROUP_V1.to_string()),
                                kind: Some("InferencePool".to_string()),
                                name: "my-llm-inference-pool".to_string(),
                                ..Default::default()
                            }],
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                }),
            }),
            scheduler: None,
        });
        svc
    }

    #[test]
    fn managed_route_attaches_to_the_default_gateway() {
        let svc = managed_route_svc();
        let config = OperatorConfig::default();

        let route = expected_managed_route(&svc, &config);
        assert_eq!(route.name_any(), "my-llm-kserve-route");

        let parents = &route.spec.parent_refs;
        assert_eq!(parents.len(), 1);
        assert_eq!(parents[0].name, "kserve-ingress-gateway");
        assert_eq!(parents[0].namespace.as_deref(), Some("kserve"));

        let labels = route.metadata.labels.as_ref().unwrap();
        assert_eq!(
            labels.get("app.kubernetes.io/component").map(String::as_str),
            Some("llminferenceservice-router")
        );
        assert_eq!(
            route.metadata.owner_references.as_ref().map(|o| o.len()),
            Some(1)
        );
    }

    #[test]
    fn user_gateway_refs_override_the_default() {
        let mut svc = managed_route_svc();
        svc.spec.router.as_mut().unwrap().gateway = Some(RouterGatewaySpec {
            refs: vec![UntypedObjectReference {
                name: "edge".into(),
                namespace: Some("istio-system".into()),
            }],
        });

        let route = expected_managed_route(&svc, &OperatorConfig::default());
        assert_eq!(route.spec.parent_refs[0].name, "edge");
        assert_eq!(
            route.spec.parent_refs[0].namespace.as_deref(),
            Some("istio-system")
        );
    }

    #[test]
    fn gateway_refs_default_namespace_to_the_parent() {
        let mut svc = managed_route_svc();
        svc.spec.router.as_mut().unwrap().gateway = Some(RouterGatewaySpec {
            refs: vec![UntypedObjectReference {
                name: "local-gw".into(),
                namespace: None,
            }],
        });

        let refs = gateway_refs(&svc, &OperatorConfig::default());
        assert_eq!(refs, vec![("ns".to_string(), "local-gw".to_string())]);
    }

    #[test]
    fn spec_sync_preserves_weights_and_migration_annotation() {
        let svc = managed_route_svc();
        let config = OperatorConfig::default();
        let mut expected = expected_managed_route(&svc, &config);

        let mut current = expected.clone();
        current.spec.rules[0].backend_refs[0].weight = Some(100);
        current
            .metadata
            .annotations
            .get_or_insert_with(Default::default)
            .insert(MIGRATION_ANNOTATION.to_string(), "v1".to_string());

        preserve_migration_state(&mut expected, &current);

        assert_eq!(expected.spec.rules[0].backend_refs[0].weight, Some(100));
        assert_eq!(
            expected.annotations().get(MIGRATION_ANNOTATION).map(String::as_str),
            Some("v1")
        );
    }

    #[test]
    fn route_readiness_requires_acceptance_on_every_route() {
        use crate::crd::gwapi::{HTTPRouteStatus, RouteParentStatus};
        use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition as MetaCondition, Time};

        let mut svc = managed_route_svc();
        let mut route = expected_managed_route(&svc, &OperatorConfig::default());

        propagate_route_readiness(&mut svc, std::slice::from_ref(&route));
        let cond = svc.status_mut().get_condition(HTTP_ROUTES_READY).cloned().unwrap();
        assert!(cond.is_false());

        route.status = Some(HTTPRouteStatus {
            parents: vec![RouteParentStatus {
                parent_ref: None,
                controller_name: None,
                conditions: vec![MetaCondition {
                    type_: "Accepted".into(),
                    status: "True".into(),
                    reason: "Accepted".into(),
                    message: String::new(),
                    last_transition_time: Time(chrono::Utc::now()),
                    observed_generation: None,
                }],
            }],
        });
        propagate_route_readiness(&mut svc, &[route]);
        assert!(svc
            .status_mut()
            .get_condition(HTTP_ROUTES_READY)
            .unwrap()
            .is_true());
    }
}
