//! Supporting types for the LLMInferenceService CRD

use k8s_openapi::api::core::v1::PodSpec;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{gie, gwapi};

/// Reference to the model being served
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelSpec {
    /// Model URI (`hf://`, `pvc://`, `oci://`, ...)
    pub uri: String,

    /// Display name reported to the endpoint picker; defaults to the
    /// resource name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Scheduling criticality of this model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criticality: Option<Criticality>,
}

/// How important it is to serve this model
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum Criticality {
    /// Must not be shed
    Critical,
    /// Normal priority
    Standard,
    /// May be shed under pressure
    Sheddable,
}

impl std::fmt::Display for Criticality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Critical => write!(f, "Critical"),
            Self::Standard => write!(f, "Standard"),
            Self::Sheddable => write!(f, "Sheddable"),
        }
    }
}

/// Workload shape shared by the decode (main) block and the prefill twin
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadSpec {
    /// Replica count; defaults to 1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Parallelism layout driving single- vs multi-node materialization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallelism: Option<ParallelismSpec>,

    /// Main (decode/leader) pod template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<PodSpec>,

    /// Worker pod template; presence selects the multi-node path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<PodSpec>,
}

/// Tensor/pipeline/data parallelism layout
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParallelismSpec {
    /// Tensor-parallel degree
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tensor: Option<i32>,

    /// Pipeline-parallel degree; mutually exclusive with data parallelism
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<i32>,

    /// Data-parallel degree; must be set together with `dataLocal`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<i32>,

    /// Data-parallel ranks per node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_local: Option<i32>,

    /// Port for data-parallel RPC traffic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_rpc_port: Option<i32>,

    /// Whether expert parallelism is enabled
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub expert: bool,
}

impl ParallelismSpec {
    /// True when data parallelism is requested
    pub fn is_data_parallel(&self) -> bool {
        self.data.unwrap_or(0) > 0 || self.data_local.unwrap_or(0) > 0
    }

    /// True when pipeline parallelism is requested
    pub fn is_pipeline_parallel(&self) -> bool {
        self.pipeline.unwrap_or(0) > 0
    }

    /// True when tensor parallelism is requested
    pub fn is_tensor_parallel(&self) -> bool {
        self.tensor.unwrap_or(0) > 0
    }

    /// Derived group size: `max(1, data / dataLocal)` for data parallelism,
    /// `pipeline` for pipeline parallelism, undefined otherwise.
    ///
    /// The size is immutable across updates; the validator enforces this.
    pub fn size(&self) -> Option<i32> {
        if self.is_data_parallel() {
            let data = self.data.unwrap_or(1).max(1);
            let local = self.data_local.unwrap_or(1).max(1);
            return Some((data / local).max(1));
        }
        if self.is_pipeline_parallel() {
            return self.pipeline;
        }
        None
    }
}

/// Router block: gateway attachment, route shape, and scheduler
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouterSpec {
    /// Gateway references; the empty object selects the managed default
    /// gateway
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewaySpec>,

    /// Route references or an embedded managed-route spec
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<GatewayRoutesSpec>,

    /// Endpoint-picker scheduler block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<SchedulerSpec>,
}

/// Gateway references on the router block
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySpec {
    /// User-supplied gateways; empty means "managed by the controller"
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub refs: Vec<UntypedObjectReference>,
}

impl GatewaySpec {
    /// True when the user supplied explicit gateway references
    pub fn has_refs(&self) -> bool {
        !self.refs.is_empty()
    }
}

/// Reference to an object by name and optional namespace
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UntypedObjectReference {
    /// Object name
    pub name: String,

    /// Object namespace; defaults to the parent's
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Route block on the router
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRoutesSpec {
    /// HTTP route references or an embedded spec
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HTTPRouteSpec>,
}

impl GatewayRoutesSpec {
    /// True when the block carries neither refs nor a spec (the managed
    /// marker `route: {}`)
    pub fn is_empty_marker(&self) -> bool {
        match &self.http {
            None => true,
            Some(http) => !http.has_refs() && !http.has_spec(),
        }
    }
}

/// HTTP route references or an embedded managed-route spec
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HTTPRouteSpec {
    /// User-supplied routes; never mutated by the controller
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub refs: Vec<UntypedObjectReference>,

    /// Spec of the controller-managed route
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<gwapi::HTTPRouteSpec>,
}

impl HTTPRouteSpec {
    /// True when user routes are referenced
    pub fn has_refs(&self) -> bool {
        !self.refs.is_empty()
    }

    /// True when a managed-route spec is embedded
    pub fn has_spec(&self) -> bool {
        self.spec.is_some()
    }
}

/// Endpoint-picker scheduler block
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerSpec {
    /// Scheduler pod template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<PodSpec>,

    /// Inference pool reference or inline spec
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<SchedulerPoolSpec>,
}

/// Inference pool reference or inline spec on the scheduler block
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerPoolSpec {
    /// Reference to an externally managed pool
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub ref_: Option<UntypedObjectReference>,

    /// Inline pool spec for the managed pool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<gie::InferencePoolSpec>,
}

impl SchedulerPoolSpec {
    /// True when the pool is a pure external reference
    pub fn has_ref(&self) -> bool {
        self.ref_.as_ref().is_some_and(|r| !r.name.is_empty())
    }
}

/// A name reference to a base-configuration document
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BaseRef {
    /// Name of the LLMInferenceServiceConfig to merge
    pub name: String,
}

/// One externally addressable URL in the status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Addressable {
    /// The address URL
    pub url: String,
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    // data-parallel: size = max(1, data / dataLocal)
    #[case(Some(1), Some(8), None, Some(1))]
    #[case(Some(8), Some(1), None, Some(8))]
    #[case(Some(10), Some(2), None, Some(5))]
    #[case(Some(3), Some(2), None, Some(1))]
    // pipeline-parallel: size = pipeline
    #[case(None, None, Some(4), Some(4))]
    // neither: undefined
    #[case(None, None, None, None)]
    fn size_derivation(
        #[case] data: Option<i32>,
        #[case] data_local: Option<i32>,
        #[case] pipeline: Option<i32>,
        #[case] want: Option<i32>,
    ) {
        let p = ParallelismSpec {
            data,
            data_local,
            pipeline,
            ..Default::default()
        };
        assert_eq!(p.size(), want);
    }

    #[test]
    fn tensor_alone_has_no_size() {
        let p = ParallelismSpec {
            tensor: Some(8),
            ..Default::default()
        };
        assert!(p.is_tensor_parallel());
        assert!(!p.is_data_parallel());
        assert!(!p.is_pipeline_parallel());
        assert_eq!(p.size(), None);
    }

    #[test]
    fn data_local_alone_counts_as_data_parallel() {
        let p = ParallelismSpec {
            data_local: Some(2),
            ..Default::default()
        };
        assert!(p.is_data_parallel());
        assert_eq!(p.size(), Some(1));
    }

    #[test]
    fn empty_route_block_is_the_managed_marker() {
        assert!(GatewayRoutesSpec::default().is_empty_marker());
        assert!(GatewayRoutesSpec {
            http: Some(HTTPRouteSpec::default()),
        }
        .is_empty_marker());

        let with_refs = GatewayRoutesSpec {
            http: Some(HTTPRouteSpec {
                refs: vec![UntypedObjectReference {
                    name: "user-route".into(),
                    namespace: None,
                }],
                spec: None,
            }),
        };
        assert!(!with_refs.is_empty_marker());
    }

    #[test]
    fn pool_ref_requires_a_name() {
        assert!(!SchedulerPoolSpec::default().has_ref());
        assert!(!SchedulerPoolSpec {
            ref_: Some(UntypedObjectReference::default()),
            spec: None,
        }
        .has_ref());
        assert!(SchedulerPoolSpec {
            ref_: Some(UntypedObjectReference {
                name: "byo-pool".into(),
                namespace: None,
            }),
            spec: None,
        }
        .has_ref());
    }
}
