//! Self-signed TLS secret reconciliation
//!
//! Workload-to-workload traffic is served with a self-signed certificate
//! stored in `<parent>-kserve-self-signed-certs`. Key material is a 4096-bit
//! RSA key (PKCS#8, PEM) with a 10-year leaf certificate. Rotation is
//! time-triggered: the renewal deadline (NotAfter minus a 30-day buffer) is
//! recorded in an annotation, and the semantic-equality check only compares
//! secret data once that deadline has passed.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::Api;
use kube::{Client, Resource, ResourceExt};
use rcgen::{CertificateParams, DistinguishedName, DnType, DnValue, KeyPair, KeyUsagePurpose};
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use tracing::info;

use super::child::reconcile_child;
use crate::crd::LLMInferenceService;
use crate::error::Error;
use crate::naming::{child_name, workload_labels};
use crate::semantic::{derivative_eq, maps_derivative_eq};

/// Certificate lifetime
const CERTIFICATE_DURATION_DAYS: i64 = 365 * 10;

/// Renewal buffer before expiry
const RENEW_BUFFER_DAYS: i64 = 30;

/// Annotation recording the renewal deadline (RFC 3339)
pub const EXPIRATION_ANNOTATION: &str = "certificates.kserve.io/expiration";

/// Reconcile the self-signed certificate secret for one parent
pub async fn reconcile_self_signed_certs_secret(
    client: &Client,
    llm_svc: &LLMInferenceService,
) -> Result<(), Error> {
    info!(service = %llm_svc.name_any(), "reconciling self-signed certificates secret");

    let expected = expected_self_signed_certs_secret(llm_svc)?;
    let namespace = llm_svc.namespace().unwrap_or_default();
    let api: Api<Secret> = Api::namespaced(client.clone(), &namespace);

    reconcile_child(&api, llm_svc, expected, certificate_secret_semantic_eq).await
}

/// Build the expected secret, generating fresh key material
pub fn expected_self_signed_certs_secret(
    llm_svc: &LLMInferenceService,
) -> Result<Secret, Error> {
    let (key_pem, cert_pem) = create_self_signed_certificate(RSA_KEY_BITS)?;
    Ok(expected_secret_with_material(llm_svc, key_pem, cert_pem))
}

fn expected_secret_with_material(
    llm_svc: &LLMInferenceService,
    key_pem: String,
    cert_pem: String,
) -> Secret {
    let renew_at = Utc::now()
        + ChronoDuration::days(CERTIFICATE_DURATION_DAYS)
        - ChronoDuration::days(RENEW_BUFFER_DAYS);

    Secret {
        metadata: ObjectMeta {
            name: Some(child_name(&llm_svc.name_any(), "-kserve-self-signed-certs")),
            namespace: llm_svc.namespace(),
            labels: Some(workload_labels(llm_svc)),
            annotations: Some(BTreeMap::from([(
                EXPIRATION_ANNOTATION.to_string(),
                renew_at.to_rfc3339(),
            )])),
            owner_references: llm_svc.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        type_: Some("kubernetes.io/tls".to_string()),
        data: Some(BTreeMap::from([
            ("tls.crt".to_string(), ByteString(cert_pem.into_bytes())),
            ("tls.key".to_string(), ByteString(key_pem.into_bytes())),
        ])),
        ..Default::default()
    }
}

/// Key size for generated serving certificates
const RSA_KEY_BITS: usize = 4096;

/// Generate an RSA key and a matching 10-year self-signed leaf certificate,
/// both PEM-encoded. The key is PKCS#8.
fn create_self_signed_certificate(bits: usize) -> Result<(String, String), Error> {
    let mut rng = rand::thread_rng();
    let private_key = RsaPrivateKey::new(&mut rng, bits)
        .map_err(|e| Error::CertificateGeneration(format!("failed to generate RSA key: {e}")))?;
    let key_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| Error::CertificateGeneration(format!("failed to encode key: {e}")))?
        .to_string();

    let key_pair = KeyPair::from_pem(&key_pem)
        .map_err(|e| Error::CertificateGeneration(format!("failed to load key pair: {e}")))?;

    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(
        DnType::OrganizationName,
        DnValue::Utf8String("Kserve Self Signed".to_string()),
    );
    params.distinguished_name = dn;
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![rcgen::ExtendedKeyUsagePurpose::ServerAuth];

    let now = time::OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + time::Duration::days(CERTIFICATE_DURATION_DAYS);

    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| Error::CertificateGeneration(format!("failed to self-sign: {e}")))?;

    Ok((key_pem, cert.pem()))
}

/// Semantic comparison for certificate secrets.
///
/// While the stored renewal deadline lies in the future only metadata is
/// compared, leaving the key material untouched. Once the deadline passes
/// the data is compared too, which forces a rewrite with fresh material.
pub fn certificate_secret_semantic_eq(expected: &Secret, current: &Secret) -> bool {
    let expired = current
        .annotations()
        .get(EXPIRATION_ANNOTATION)
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|deadline| Utc::now() > deadline.with_timezone(&Utc))
        .unwrap_or(false);

    let metadata_eq = maps_derivative_eq(
        expected.metadata.labels.as_ref(),
        current.metadata.labels.as_ref(),
    ) && derivative_eq(&expected.type_, &current.type_);

    if expired {
        return metadata_eq
            && derivative_eq(&expected.data, &current.data)
            && derivative_eq(&expected.immutable, &current.immutable);
    }

    metadata_eq
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::test_support::service;

    fn secret_with_deadline(deadline: DateTime<Utc>) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some("svc-kserve-self-signed-certs".into()),
                annotations: Some(BTreeMap::from([(
                    EXPIRATION_ANNOTATION.to_string(),
                    deadline.to_rfc3339(),
                )])),
                ..Default::default()
            },
            type_: Some("kubernetes.io/tls".to_string()),
            data: Some(BTreeMap::from([(
                "tls.crt".to_string(),
                ByteString(b"old".to_vec()),
            )])),
            ..Default::default()
        }
    }

    #[test]
    fn expected_secret_has_tls_shape_and_renewal_annotation() {
        let svc = service("svc", "ns");
        let secret = expected_secret_with_material(&svc, "KEY".into(), "CERT".into());

        assert_eq!(secret.name_any(), "svc-kserve-self-signed-certs");
        assert_eq!(secret.type_.as_deref(), Some("kubernetes.io/tls"));
        assert!(secret.data.as_ref().unwrap().contains_key("tls.crt"));
        assert!(secret.data.as_ref().unwrap().contains_key("tls.key"));
        assert_eq!(
            secret.metadata.owner_references.as_ref().map(|o| o.len()),
            Some(1)
        );

        let deadline = secret.annotations().get(EXPIRATION_ANNOTATION).unwrap();
        let parsed = DateTime::parse_from_rfc3339(deadline).unwrap();
        let days_out = (parsed.with_timezone(&Utc) - Utc::now()).num_days();
        // ten years minus the 30-day buffer, allow a little slack
        assert!((3610..=3620).contains(&days_out), "deadline {days_out} days out");
    }

    #[test]
    fn generated_material_is_pem_wrapped_pkcs8() {
        // a small key keeps the test fast; production uses RSA_KEY_BITS
        let (key_pem, cert_pem) = create_self_signed_certificate(2048).unwrap();
        assert!(cert_pem.contains("BEGIN CERTIFICATE"));
        assert!(key_pem.contains("BEGIN PRIVATE KEY"), "key must be PKCS#8");
    }

    #[test]
    fn fresh_secret_is_not_rewritten_before_the_deadline() {
        let expected = Secret {
            metadata: ObjectMeta {
                annotations: Some(BTreeMap::from([(
                    EXPIRATION_ANNOTATION.to_string(),
                    (Utc::now() + ChronoDuration::days(3620)).to_rfc3339(),
                )])),
                ..Default::default()
            },
            type_: Some("kubernetes.io/tls".to_string()),
            data: Some(BTreeMap::from([(
                "tls.crt".to_string(),
                ByteString(b"new".to_vec()),
            )])),
            ..Default::default()
        };
        let current = secret_with_deadline(Utc::now() + ChronoDuration::days(200));

        // data differs but the deadline is in the future: no rewrite
        assert!(certificate_secret_semantic_eq(&expected, &current));
    }

    #[test]
    fn expired_secret_compares_data_and_forces_renewal() {
        let expected = Secret {
            type_: Some("kubernetes.io/tls".to_string()),
            data: Some(BTreeMap::from([(
                "tls.crt".to_string(),
                ByteString(b"new".to_vec()),
            )])),
            ..Default::default()
        };
        let current = secret_with_deadline(Utc::now() - ChronoDuration::days(1));

        assert!(
            !certificate_secret_semantic_eq(&expected, &current),
            "expired secret with different data must be rewritten"
        );
    }
}
