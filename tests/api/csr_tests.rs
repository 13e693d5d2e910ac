use crate::common::constants::*;
use crate::common::helper::{certificate_facts, make_csr};
use crate::common::test_client::EasyCaClient;
use anyhow::Result;
use rocket::http::{ContentType, Status};
use serde_json::json;
use easyca::data::api::{AnnotatedCertificate, RequestSummary};
use easyca::data::enums::{CertificateKind, RequestStatus};
use easyca::data::objects::{Certificate, SigningRequest};

#[tokio::test]
async fn test_sign_before_initialization() -> Result<()> {
    let client = EasyCaClient::new().await;
    let (_, csr) = make_csr(TEST_CSR_CN)?;

    let response = client
        .post("/v1/csr")
        .header(ContentType::JSON)
        .body(json!({ "csr": csr }).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Conflict);
    drop(response);

    let requests: Vec<RequestSummary> = client.get_json("/v1/csr").await?;
    assert!(requests.is_empty());
    let certs: Vec<Certificate> = client.get_json("/v1/signed").await?;
    assert!(certs.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_sign_csr() -> Result<()> {
    let client = EasyCaClient::new_initialized().await;
    let (key, csr) = make_csr(TEST_CSR_CN)?;

    let signed = client.sign_csr(&csr).await?;
    let cert = &signed.certificate;
    assert_eq!(cert.serial, 1);
    assert_eq!(cert.kind, CertificateKind::Issued);
    assert_eq!(cert.subject_dn.common_name, TEST_CSR_CN);
    assert_eq!(cert.issuer_dn.common_name, TEST_CA_CN);
    assert!(cert.not_before < cert.not_after);
    assert!(signed.url.ends_with("/v1/signed/1"));

    let facts = certificate_facts(&cert.pem_certificate)?;
    assert_eq!(facts.serial, 1);
    assert!(!facts.is_ca);
    assert_eq!(facts.public_key_der, key.public_key_to_der()?);
    assert!(facts.issuer.contains(TEST_CA_CN));

    let ca_pem = client.ca_info().await?.certificate.unwrap();
    assert_eq!(facts.issuer, certificate_facts(&ca_pem)?.subject);

    let request_id = cert.source_request_id.clone().unwrap();
    let request: SigningRequest = client.get_json(&format!("/v1/csr/{request_id}")).await?;
    assert_eq!(request.status, RequestStatus::Signed);
    assert_eq!(request.pem_csr, csr.trim());

    Ok(())
}

#[tokio::test]
async fn test_sign_same_csr_twice() -> Result<()> {
    let client = EasyCaClient::new_initialized().await;
    let (_, csr) = make_csr(TEST_CSR_CN)?;

    let first = client.sign_csr(&csr).await?;
    let second = client.sign_csr(&csr).await?;
    assert_eq!(first.certificate.serial, 1);
    assert_eq!(second.certificate.serial, 2);
    assert_ne!(first.certificate.source_request_id, second.certificate.source_request_id);

    let requests: Vec<RequestSummary> = client.get_json("/v1/csr").await?;
    assert_eq!(requests.len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_sign_garbage_csr() -> Result<()> {
    let client = EasyCaClient::new_initialized().await;

    for csr in [GARBAGE_CSR, "", "hello"] {
        let response = client
            .post("/v1/csr")
            .header(ContentType::JSON)
            .body(json!({ "csr": csr }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);
    }

    let requests: Vec<RequestSummary> = client.get_json("/v1/csr").await?;
    assert!(requests.is_empty());
    let certs: Vec<Certificate> = client.get_json("/v1/signed").await?;
    assert!(certs.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_list_requests_in_submission_order() -> Result<()> {
    let client = EasyCaClient::new_initialized().await;

    let mut ids = Vec::new();
    for cn in ["one.acme.test", "two.acme.test", "three.acme.test"] {
        let (_, csr) = make_csr(cn)?;
        let signed = client.sign_csr(&csr).await?;
        ids.push(signed.certificate.source_request_id.unwrap());
    }

    let requests: Vec<RequestSummary> = client.get_json("/v1/csr").await?;
    let listed: Vec<String> = requests.iter().map(|r| r.id.clone()).collect();
    assert_eq!(listed, ids);
    for request in &requests {
        assert!(request.url.ends_with(&format!("/v1/csr/{}", request.id)));
    }

    Ok(())
}

#[tokio::test]
async fn test_get_unknown_request() -> Result<()> {
    let client = EasyCaClient::new_initialized().await;

    assert_eq!(client.status_of_get("/v1/csr/0123456789abcdef").await, Status::NotFound);

    Ok(())
}

#[tokio::test]
async fn test_submit_then_sign() -> Result<()> {
    let client = EasyCaClient::new_initialized().await;
    let (_, csr) = make_csr(TEST_CSR_CN)?;

    let request: SigningRequest = serde_json::from_value(client.post_csr("/v1/csr/submit", &csr).await?)?;
    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(request.distinguished_name.common_name, TEST_CSR_CN);

    let certs: Vec<Certificate> = client.get_json("/v1/signed").await?;
    assert!(certs.is_empty());

    let sign_path = format!("/v1/csr/{}/sign", request.id);
    let first: AnnotatedCertificate = serde_json::from_value(client.post_csr(&sign_path, "").await?)?;
    let second: AnnotatedCertificate = serde_json::from_value(client.post_csr(&sign_path, "").await?)?;
    assert_eq!(first.certificate, second.certificate);
    assert_eq!(first.certificate.source_request_id.as_deref(), Some(request.id.as_str()));

    let stored: SigningRequest = client.get_json(&format!("/v1/csr/{}", request.id)).await?;
    assert_eq!(stored.status, RequestStatus::Signed);
    assert!(stored.last_modified >= request.last_modified);

    Ok(())
}
