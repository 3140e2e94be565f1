//! Preset composition (base-configuration merging)
//!
//! An LLMInferenceService can name an ordered list of base-configuration
//! documents (`baseRefs`). The composer resolves each document (parent
//! namespace first, then the system namespace), substitutes well-known
//! placeholders textually, merges the chain left-to-right with override-wins
//! semantics, and finally overlays the user's own spec. The result is the
//! effective spec the rest of the pass reconciles against.

use kube::{Api, Client, ResourceExt};
use serde_json::Value;
use tracing::debug;

use crate::config::OperatorConfig;
use crate::crd::{LLMInferenceService, LLMInferenceServiceConfig, LLMInferenceServiceSpec};
use crate::error::Error;

/// Default configuration names injected at the end of every baseRef chain
pub const WELL_KNOWN_DEFAULT_CONFIGS: [&str; 2] =
    ["kserve-config-llm-template", "kserve-config-llm-router"];

/// Resolve and combine the base-configuration chain for one service.
///
/// Returns the effective spec. Any fetch, substitution or parse failure is a
/// `CombineBase` error; the caller marks `PresetsCombined=False` and aborts
/// the pass.
pub async fn combine_base_refs(
    client: &Client,
    llm_svc: &LLMInferenceService,
    config: &OperatorConfig,
) -> Result<LLMInferenceServiceSpec, Error> {
    let namespace = llm_svc.namespace().unwrap_or_default();

    let mut names: Vec<String> = llm_svc
        .spec
        .base_refs
        .iter()
        .map(|r| r.name.clone())
        .collect();
    names.extend(WELL_KNOWN_DEFAULT_CONFIGS.iter().map(|s| s.to_string()));

    let vars = SubstitutionVars {
        name: llm_svc.name_any(),
        namespace: namespace.clone(),
        ingress_gateway_name: config.ingress_gateway_name.clone(),
        ingress_gateway_namespace: config.ingress_gateway_namespace.clone(),
    };

    let mut layers = Vec::with_capacity(names.len());
    for name in &names {
        let preset = fetch_preset(client, &namespace, &config.system_namespace, name).await?;
        let raw = serde_json::to_string(&preset.spec)
            .map_err(|e| Error::combine_base(format!("failed to serialize preset {name}: {e}")))?;
        let substituted = substitute_placeholders(&raw, &vars)
            .map_err(|e| Error::combine_base(format!("preset {name}: {e}")))?;
        let value: Value = serde_json::from_str(&substituted)
            .map_err(|e| Error::combine_base(format!("preset {name} is malformed: {e}")))?;
        layers.push(value);
    }

    let user = serde_json::to_value(&llm_svc.spec)
        .map_err(|e| Error::combine_base(format!("failed to serialize user spec: {e}")))?;

    let effective = combine_layers(layers, user);
    debug!(service = %llm_svc.name_any(), presets = ?names, "combined base configurations");

    serde_json::from_value(effective)
        .map_err(|e| Error::combine_base(format!("combined spec is invalid: {e}")))
}

async fn fetch_preset(
    client: &Client,
    namespace: &str,
    system_namespace: &str,
    name: &str,
) -> Result<LLMInferenceServiceConfig, Error> {
    let local: Api<LLMInferenceServiceConfig> = Api::namespaced(client.clone(), namespace);
    match local.get_opt(name).await.map_err(Error::Kube)? {
        Some(cfg) => Ok(cfg),
        None => {
            let system: Api<LLMInferenceServiceConfig> =
                Api::namespaced(client.clone(), system_namespace);
            system
                .get_opt(name)
                .await
                .map_err(Error::Kube)?
                .ok_or_else(|| {
                    Error::combine_base(format!(
                        "LLMInferenceServiceConfig {name:?} not found in {namespace} or {system_namespace}"
                    ))
                })
        }
    }
}

/// Variables available to preset placeholders
#[derive(Clone, Debug)]
pub struct SubstitutionVars {
    /// Parent name
    pub name: String,
    /// Parent namespace
    pub namespace: String,
    /// Process-wide ingress gateway name
    pub ingress_gateway_name: String,
    /// Process-wide ingress gateway namespace
    pub ingress_gateway_namespace: String,
}

/// Textually substitute `{{ .Field }}` placeholders in a preset document.
///
/// Substitution happens before parsing; an unresolved placeholder is an
/// error rather than silently passing through to the workload.
pub fn substitute_placeholders(text: &str, vars: &SubstitutionVars) -> Result<String, String> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            return Err("unterminated placeholder".to_string());
        };
        let token = after[..end].trim();
        let replacement = match token {
            ".Name" => &vars.name,
            ".Namespace" => &vars.namespace,
            ".IngressGatewayName" => &vars.ingress_gateway_name,
            ".IngressGatewayNamespace" => &vars.ingress_gateway_namespace,
            other => return Err(format!("unresolved placeholder {{{{ {other} }}}}")),
        };
        out.push_str(replacement);
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Merge preset layers left-to-right, then overlay the user spec on top
pub fn combine_layers(layers: Vec<Value>, user: Value) -> Value {
    let mut effective = Value::Object(Default::default());
    for layer in layers {
        merge_value(&mut effective, &layer);
    }
    merge_value(&mut effective, &user);
    effective
}

/// Override-wins merge at the leaf level.
///
/// Later non-empty values overwrite earlier ones; null/empty values leave
/// the earlier value in place; objects merge recursively; arrays replace
/// whole.
pub fn merge_value(base: &mut Value, overlay: &Value) {
    if is_empty_for_merge(overlay) {
        return;
    }

    match overlay {
        Value::Object(overlay_map) => {
            if !base.is_object() {
                *base = Value::Object(Default::default());
            }
            let base_map = base.as_object_mut().expect("just ensured object");
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(slot) => merge_value(slot, value),
                    None => {
                        if !is_empty_for_merge(value) {
                            base_map.insert(key.clone(), value.clone());
                        }
                    }
                }
            }
        }
        other => *base = other.clone(),
    }
}

fn is_empty_for_merge(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}
