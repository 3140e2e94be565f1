//! Generic create/update/delete protocol for owned children
//!
//! Every sub-reconciler follows the same protocol: build the desired object,
//! fetch the live one, refuse to touch anything not controlled by the
//! parent, and write only when the desired object is not already a semantic
//! derivative of the live one.

use std::fmt::Debug;

use kube::api::{Api, DeleteParams, PostParams};
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::crd::LLMInferenceService;
use crate::error::Error;
use crate::semantic::maps_derivative_eq;

/// True when `child` has a controller owner reference pointing at `parent`
pub fn is_controlled_by<K: Resource>(child: &K, parent: &LLMInferenceService) -> bool {
    let Some(parent_uid) = parent.uid() else {
        return false;
    };
    child
        .meta()
        .owner_references
        .as_deref()
        .unwrap_or_default()
        .iter()
        .any(|r| r.controller == Some(true) && r.uid == parent_uid)
}

/// Create or update an owned child.
///
/// Ownership is enforced before any mutation: a live object with the same
/// name that is not controlled by `parent` is a reconcile error, never an
/// overwrite. Updates carry over the live resource version and are skipped
/// when `semantic_eq(desired, current)` holds.
pub async fn reconcile_child<K>(
    api: &Api<K>,
    parent: &LLMInferenceService,
    mut desired: K,
    semantic_eq: impl Fn(&K, &K) -> bool,
) -> Result<(), Error>
where
    K: Resource + Clone + DeserializeOwned + Serialize + Debug,
    K::DynamicType: Default,
{
    let kind = K::kind(&K::DynamicType::default()).into_owned();
    let name = desired.name_any();
    let namespace = desired.namespace().unwrap_or_default();

    match api.get_opt(&name).await.map_err(Error::Kube)? {
        None => {
            api.create(&PostParams::default(), &desired)
                .await
                .map_err(Error::Kube)?;
            info!(kind = %kind, name = %name, namespace = %namespace, "created child");
            Ok(())
        }
        Some(current) => {
            if !is_controlled_by(&current, parent) {
                return Err(Error::NotOwned {
                    kind,
                    name,
                    namespace,
                    parent: format!(
                        "{}/{}",
                        parent.namespace().unwrap_or_default(),
                        parent.name_any()
                    ),
                });
            }

            desired.meta_mut().resource_version = current.resource_version();
            if semantic_eq(&desired, &current) {
                debug!(kind = %kind, name = %name, "child up to date");
                return Ok(());
            }

            api.replace(&name, &PostParams::default(), &desired)
                .await
                .map_err(Error::Kube)?;
            info!(kind = %kind, name = %name, namespace = %namespace, "updated child");
            Ok(())
        }
    }
}

/// Delete a child by name; not-found is success
pub async fn delete_child<K>(api: &Api<K>, name: &str) -> Result<(), Error>
where
    K: Resource + Clone + DeserializeOwned + Debug,
    K::DynamicType: Default,
{
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => {
            info!(kind = %K::kind(&K::DynamicType::default()), name = %name, "deleted child");
            Ok(())
        }
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
        Err(e) => Err(Error::Kube(e)),
    }
}

/// Derivative comparison of labels and annotations
pub fn metadata_derivative_eq<K: Resource>(expected: &K, current: &K) -> bool {
    maps_derivative_eq(
        expected.meta().labels.as_ref(),
        current.meta().labels.as_ref(),
    ) && maps_derivative_eq(
        expected.meta().annotations.as_ref(),
        current.meta().annotations.as_ref(),
    )
}
