//! Spec admission validation
//!
//! Cross-field constraints checked at admission (create/update) and
//! re-checked at reconcile entry, plus the parallelism-size immutability
//! rule that only applies on update. All failures are `Error::Validation`
//! with field paths in the message.

use crate::crd::types::ParallelismSpec;
use crate::crd::LLMInferenceService;
use crate::error::Error;

/// Validate a spec against every cross-field and range constraint
pub fn validate(llm_svc: &LLMInferenceService) -> Result<(), Error> {
    let mut errors: Vec<String> = Vec::new();

    validate_router(llm_svc, &mut errors);
    validate_workload(llm_svc, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::validation(errors.join("; ")))
    }
}

/// Validate an update against the previously admitted object.
///
/// Runs the full create-time validation and additionally rejects any change
/// to the derived parallelism size of the decode or prefill block.
pub fn validate_update(
    old: &LLMInferenceService,
    new: &LLMInferenceService,
) -> Result<(), Error> {
    validate(new)?;

    let old_size = old.spec.workload.parallelism.as_ref().and_then(ParallelismSpec::size);
    let new_size = new.spec.workload.parallelism.as_ref().and_then(ParallelismSpec::size);
    if old_size != new_size {
        return Err(Error::validation(format!(
            "spec.parallelism: size is immutable: was {old_size:?}, now {new_size:?}"
        )));
    }

    let old_prefill = old
        .spec
        .prefill
        .as_ref()
        .and_then(|p| p.parallelism.as_ref())
        .and_then(ParallelismSpec::size);
    let new_prefill = new
        .spec
        .prefill
        .as_ref()
        .and_then(|p| p.parallelism.as_ref())
        .and_then(ParallelismSpec::size);
    if old_prefill != new_prefill {
        return Err(Error::validation(format!(
            "spec.prefill.parallelism: size is immutable: was {old_prefill:?}, now {new_prefill:?}"
        )));
    }

    Ok(())
}

fn validate_router(llm_svc: &LLMInferenceService, errors: &mut Vec<String>) {
    let Some(router) = &llm_svc.spec.router else {
        return;
    };
    let Some(route) = &router.route else {
        return;
    };

    let gateway_has_refs = router.gateway.as_ref().is_some_and(|g| g.has_refs());
    let gateway_is_managed = router.gateway.as_ref().is_some_and(|g| !g.has_refs());

    // Managed route marker ("route: {}") with user gateways
    if route.is_empty_marker() && gateway_has_refs {
        errors.push(
            "spec.router.gateway.refs: unsupported configuration: custom gateways cannot be \
             used with a managed route ('spec.router.route: {}')"
                .to_string(),
        );
        return;
    }

    let Some(http) = &route.http else {
        return;
    };

    if http.has_refs() && http.has_spec() {
        errors.push(
            "spec.router.route.http: unsupported configuration: custom HTTPRoutes \
             ('spec.router.route.http.refs') and a managed route spec \
             ('spec.router.route.http.spec') cannot be used together"
                .to_string(),
        );
    }

    if http.has_refs() && gateway_is_managed {
        errors.push(
            "spec.router.route.http.refs: unsupported configuration: custom routes cannot be \
             used with a managed gateway ('spec.router.gateway: {}')"
                .to_string(),
        );
    }

    if http.has_spec() && gateway_has_refs {
        errors.push(
            "spec.router.route.http.spec: unsupported configuration: a managed route cannot be \
             used with 'spec.router.gateway.refs'"
                .to_string(),
        );
    }
}

fn validate_workload(llm_svc: &LLMInferenceService, errors: &mut Vec<String>) {
    if llm_svc.spec.workload.replicas.is_some_and(|r| r < 0) {
        errors.push("spec.replicas: must be >= 0".to_string());
    }
    if let Some(parallelism) = &llm_svc.spec.workload.parallelism {
        validate_parallelism("spec.parallelism", parallelism, errors);
    }

    if let Some(prefill) = &llm_svc.spec.prefill {
        if prefill.replicas.is_some_and(|r| r < 0) {
            errors.push("spec.prefill.replicas: must be >= 0".to_string());
        }
        if let Some(parallelism) = &prefill.parallelism {
            validate_parallelism("spec.prefill.parallelism", parallelism, errors);
        }
    }
}

fn validate_parallelism(path: &str, p: &ParallelismSpec, errors: &mut Vec<String>) {
    if p.is_pipeline_parallel() && p.is_data_parallel() {
        errors.push(format!(
            "{path}: pipeline and data parallelism are mutually exclusive"
        ));
    }

    if p.data.is_some() != p.data_local.is_some() {
        errors.push(format!("{path}: data and dataLocal must be set together"));
    }

    for (field, value) in [
        ("tensor", p.tensor),
        ("pipeline", p.pipeline),
        ("data", p.data),
        ("dataLocal", p.data_local),
    ] {
        if value.is_some_and(|v| v < 1) {
            errors.push(format!("{path}.{field}: must be >= 1"));
        }
    }

    if p.data_rpc_port.is_some_and(|port| !(1..=65535).contains(&port)) {
        errors.push(format!("{path}.dataRPCPort: must be in [1, 65535]"));
    }
}
