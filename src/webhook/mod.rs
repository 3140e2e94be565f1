//! Validating admission webhook for LLMInferenceService
//!
//! Enforces the cross-field constraints at create/update time and the
//! parallelism-size immutability rule against the previously admitted
//! object. Rejections carry the validator's message so `kubectl` surfaces
//! the exact conflicting fields.

use axum::routing::post;
use axum::{Json, Router};
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use kube::core::DynamicObject;
use kube::ResourceExt;
use tracing::{info, warn};

use crate::crd::LLMInferenceService;
use crate::validation::{validate, validate_update};

/// Path the validating webhook configuration points at
pub const VALIDATE_PATH: &str = "/validate-serving-kserve-io-v1alpha1-llminferenceservice";

/// Build the webhook router
pub fn webhook_router() -> Router {
    Router::new().route(VALIDATE_PATH, post(validate_handler))
}

/// Admission handler for create and update of LLMInferenceService
pub async fn validate_handler(
    Json(review): Json<AdmissionReview<LLMInferenceService>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let request: AdmissionRequest<LLMInferenceService> = match review.try_into() {
        Ok(request) => request,
        Err(err) => {
            warn!(error = %err, "malformed admission review");
            return Json(AdmissionResponse::invalid(err.to_string()).into_review());
        }
    };

    let response = AdmissionResponse::from(&request);
    let response = match admit(&request) {
        Ok(()) => response,
        Err(message) => {
            info!(
                name = request.name,
                namespace = request.namespace.as_deref().unwrap_or_default(),
                message = %message,
                "rejecting LLMInferenceService"
            );
            response.deny(message)
        }
    };

    Json(response.into_review())
}

fn admit(request: &AdmissionRequest<LLMInferenceService>) -> Result<(), String> {
    let Some(object) = &request.object else {
        // Deletions carry no object and need no validation.
        return Ok(());
    };

    info!(
        name = %object.name_any(),
        operation = ?request.operation,
        "validating LLMInferenceService"
    );

    match request.operation {
        Operation::Create => validate(object).map_err(|e| e.to_string()),
        Operation::Update => match &request.old_object {
            Some(old) => validate_update(old, object).map_err(|e| e.to_string()),
            None => validate(object).map_err(|e| e.to_string()),
        },
        _ => Ok(()),
    }
}
