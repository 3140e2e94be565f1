//! One-way v1alpha2 to v1 inference-pool migration
//!
//! Both pool API versions coexist while clusters migrate. This state machine
//! decides which version carries live traffic by setting backend weights on
//! the managed HTTP route. Once v1 is ready and resolvable by the gateway
//! controller the route is marked with a write-once annotation and traffic
//! never falls back to v1alpha2, even through transient v1 failures.

use kube::api::{Api, PostParams};
use kube::{Client, ResourceExt};
use tracing::{debug, info};

use super::pool::PoolReadiness;
use crate::crd::gie::{INFERENCE_GROUP_ALPHA2, INFERENCE_GROUP_V1};
use crate::crd::gwapi::HTTPRoute;
use crate::crd::LLMInferenceService;
use crate::error::Error;
use crate::naming::child_name;
use crate::retry::{retry_on_conflict, RetryConfig};

/// Write-once annotation marking permanent migration to the v1 pool.
///
/// Stored on the managed HTTPRoute rather than the parent so a user rollback
/// of the parent spec cannot silently undo the decision.
pub const MIGRATION_ANNOTATION: &str = "serving.kserve.io/inference-pool-migrated";

/// The only value the controller ever writes for the annotation
pub const MIGRATION_ANNOTATION_VALUE: &str = "v1";

/// Traffic split between the two pool versions, each in [0, 100]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MigrationWeights {
    /// Weight on the v1 backend
    pub v1_weight: i32,
    /// Weight on the v1alpha2 backend
    pub alpha2_weight: i32,
}

/// Decide traffic weights from the route state and pool readiness.
///
/// Returns `(weights, needs_annotation)`:
/// - annotation already present: v1 full traffic, sticky, no annotation write;
/// - v1 ready and resolvable by the gateway: migrate permanently (weights to
///   v1, annotation requested);
/// - only v1alpha2 ready: full traffic on v1alpha2, no annotation;
/// - neither ready: `None`, leaving existing weights untouched.
pub fn determine_migration_weights(
    route: &HTTPRoute,
    readiness: PoolReadiness,
) -> (Option<MigrationWeights>, bool) {
    if route.annotations().get(MIGRATION_ANNOTATION).map(String::as_str)
        == Some(MIGRATION_ANNOTATION_VALUE)
    {
        debug!("migration already complete, v1 stays active without fallback");
        return (
            Some(MigrationWeights {
                v1_weight: 100,
                alpha2_weight: 0,
            }),
            false,
        );
    }

    let v1_resolvable = is_v1_backend_resolvable(route);

    if readiness.v1_ready && v1_resolvable {
        info!("migrating route to the v1 inference pool permanently");
        return (
            Some(MigrationWeights {
                v1_weight: 100,
                alpha2_weight: 0,
            }),
            true,
        );
    }

    if readiness.alpha2_ready {
        if readiness.v1_ready {
            info!("v1 pool ready but not resolvable by the gateway controller, staying on v1alpha2");
        }
        return (
            Some(MigrationWeights {
                v1_weight: 0,
                alpha2_weight: 100,
            }),
            false,
        );
    }

    debug!("neither pool ready, keeping existing weights");
    (None, false)
}

/// Whether the gateway controller resolves the v1 backend on this route.
///
/// The pool itself being Accepted does not imply the gateway controller
/// understands the v1 API; `ResolvedRefs=False` with reason `InvalidKind`
/// says it does not. A missing or unclear condition is treated as not
/// resolvable so migration never happens before the route was evaluated.
pub fn is_v1_backend_resolvable(route: &HTTPRoute) -> bool {
    let Some(status) = &route.status else {
        return false;
    };
    for parent in &status.parents {
        for cond in &parent.conditions {
            if cond.type_ == "ResolvedRefs" {
                if cond.status == "False" && cond.reason == "InvalidKind" {
                    return false;
                }
                if cond.status == "True" {
                    return true;
                }
            }
        }
    }
    false
}

/// Set backend weights for both pool versions across all rules.
///
/// Returns true when any weight actually changed.
pub fn apply_weights_to_route(route: &mut HTTPRoute, weights: MigrationWeights) -> bool {
    let mut modified = false;

    for rule in route.spec.rules.iter_mut() {
        for backend in rule.backend_refs.iter_mut() {
            if backend.kind.as_deref() != Some("InferencePool") {
                continue;
            }
            let wanted = match backend.group.as_deref() {
                Some(INFERENCE_GROUP_V1) => weights.v1_weight,
                Some(INFERENCE_GROUP_ALPHA2) => weights.alpha2_weight,
                _ => continue,
            };
            if backend.weight != Some(wanted) {
                backend.weight = Some(wanted);
                modified = true;
            }
        }
    }

    modified
}

/// Run the migration machine against the managed route of one parent.
///
/// The weight flip and the annotation are applied in a single route update
/// inside a conflict-retry loop; the decision is recomputed against the
/// freshly fetched route on every attempt, so an annotation written by a
/// concurrent pass keeps forcing the migrated state.
pub async fn reconcile_pool_migration(
    client: &Client,
    llm_svc: &LLMInferenceService,
    readiness: PoolReadiness,
) -> Result<(), Error> {
    // Only controller-managed routes are ever mutated.
    if !llm_svc.has_managed_route() {
        return Ok(());
    }

    let namespace = llm_svc.namespace().unwrap_or_default();
    let route_name = child_name(&llm_svc.name_any(), "-kserve-route");
    let api: Api<HTTPRoute> = Api::namespaced(client.clone(), &namespace);

    let Some(route) = api.get_opt(&route_name).await.map_err(Error::Kube)? else {
        // The route is created later in the pass; next pass migrates it.
        return Ok(());
    };
    let (weights, _) = determine_migration_weights(&route, readiness);
    if weights.is_none() {
        return Ok(());
    }

    retry_on_conflict(&RetryConfig::default(), "route-migration", || {
        let api = api.clone();
        let route_name = route_name.clone();
        async move {
            let Some(mut latest) = api.get_opt(&route_name).await.map_err(Error::Kube)? else {
                return Ok(());
            };

            let (weights, needs_annotation) =
                determine_migration_weights(&latest, readiness);
            let Some(weights) = weights else {
                return Ok(());
            };

            let mut modified = apply_weights_to_route(&mut latest, weights);
            if needs_annotation {
                latest
                    .metadata
                    .annotations
                    .get_or_insert_with(Default::default)
                    .insert(
                        MIGRATION_ANNOTATION.to_string(),
                        MIGRATION_ANNOTATION_VALUE.to_string(),
                    );
                modified = true;
                info!(route = %route_name, "marking inference-pool migration in route annotation");
            }

            if modified {
                info!(
                    route = %route_name,
                    v1_weight = weights.v1_weight,
                    alpha2_weight = weights.alpha2_weight,
                    "updating route backend weights"
                );
                api.replace(&route_name, &PostParams::default(), &latest)
                    .await
                    .map_err(Error::Kube)?;
            }
            Ok(())
        }
    })
    .await
}
