use crate::common::constants::*;
use crate::common::helper::certificate_facts;
use crate::common::test_client::EasyCaClient;
use anyhow::Result;
use openssl::pkey::PKey;
use rocket::http::{ContentType, Status};
use serde_json::{json, Value};
use easyca::data::api::AnnotatedCertificate;
use easyca::data::enums::CertificateKind;
use easyca::data::objects::SelfSignedCertificate;

async fn create_self_signed(client: &EasyCaClient, body: Value) -> Result<SelfSignedCertificate> {
    let response = client
        .post("/v1/self-signed")
        .header(ContentType::JSON)
        .body(body.to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    Ok(response.into_json().await.unwrap())
}

#[tokio::test]
async fn test_self_signed_without_ca() -> Result<()> {
    let client = EasyCaClient::new().await;

    let created = create_self_signed(&client, json!({})).await?;
    let cert = &created.certificate;
    assert_eq!(cert.kind, CertificateKind::SelfSigned);
    assert_eq!(cert.subject_dn.common_name, SELF_SIGNED_DEFAULT_CN);
    assert_eq!(cert.subject_dn, cert.issuer_dn);
    assert!(cert.serial >= 1 << 62);
    assert!(cert.source_request_id.is_none());

    let facts = certificate_facts(&cert.pem_certificate)?;
    assert_eq!(facts.subject, facts.issuer);
    assert_eq!(facts.serial, cert.serial as u64);

    let key = PKey::private_key_from_pem(created.private_key.as_bytes())?;
    assert_eq!(facts.public_key_der, key.public_key_to_der()?);

    assert!(!client.ca_info().await?.initialized);

    Ok(())
}

#[tokio::test]
async fn test_self_signed_with_dn() -> Result<()> {
    let client = EasyCaClient::new_initialized().await;

    let created = create_self_signed(&client, json!({
        "dn": { "cn": "dev.acme.test", "o": "Acme Dev", "email": "dev@acme.test" }
    })).await?;
    let subject = &created.certificate.subject_dn;
    assert_eq!(subject.common_name, "dev.acme.test");
    assert_eq!(subject.organization.as_deref(), Some("Acme Dev"));
    assert_eq!(subject.email.as_deref(), Some("dev@acme.test"));
    assert_eq!(created.certificate.issuer_dn, *subject);

    let ca_pem = client.ca_info().await?.certificate.unwrap();
    let facts = certificate_facts(&created.certificate.pem_certificate)?;
    assert_ne!(facts.issuer, certificate_facts(&ca_pem)?.subject);

    Ok(())
}

#[tokio::test]
async fn test_self_signed_invalid_dn() -> Result<()> {
    let client = EasyCaClient::new().await;

    let response = client
        .post("/v1/self-signed")
        .header(ContentType::JSON)
        .body(json!({ "dn": { "cn": "dev.acme.test", "email": "nobody" } }).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);

    Ok(())
}

#[tokio::test]
async fn test_self_signed_listing_and_serials() -> Result<()> {
    let client = EasyCaClient::new_initialized().await;

    let created = create_self_signed(&client, json!({})).await?;

    let (_, csr) = crate::common::helper::make_csr(TEST_CSR_CN)?;
    let issued = client.sign_csr(&csr).await?;
    assert_eq!(issued.certificate.serial, 1);

    let self_signed: Vec<AnnotatedCertificate> = client.get_json("/v1/self-signed").await?;
    assert_eq!(self_signed.len(), 1);
    assert_eq!(self_signed[0].certificate, created.certificate);

    let all: Vec<AnnotatedCertificate> = client.get_json("/v1/signed").await?;
    assert_eq!(all.len(), 2);

    let response = client.get("/v1/self-signed").dispatch().await;
    let body = response.into_string().await.unwrap();
    assert!(!body.contains("PRIVATE KEY"));

    Ok(())
}

#[tokio::test]
async fn test_self_signed_without_body() -> Result<()> {
    let client = EasyCaClient::new().await;

    let response = client.post("/v1/self-signed").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let created: SelfSignedCertificate = response.into_json().await.unwrap();
    assert_eq!(created.certificate.subject_dn.common_name, SELF_SIGNED_DEFAULT_CN);

    let response = client
        .post("/v1/self-signed")
        .header(ContentType::JSON)
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let created: SelfSignedCertificate = response.into_json().await.unwrap();
    assert_eq!(created.certificate.subject_dn.common_name, SELF_SIGNED_DEFAULT_CN);

    Ok(())
}

#[tokio::test]
async fn test_self_signed_rejects_malformed_body() -> Result<()> {
    let client = EasyCaClient::new().await;

    for body in [r#"{"dn": {"cn": "dev.acme.test", "serialNumber": "1"}}"#, "{not json"] {
        let response = client
            .post("/v1/self-signed")
            .header(ContentType::JSON)
            .body(body)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);
    }

    let listed: Vec<AnnotatedCertificate> = client.get_json("/v1/self-signed").await?;
    assert!(listed.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_self_signed_found_by_hex_serial() -> Result<()> {
    let client = EasyCaClient::new().await;

    let created = create_self_signed(&client, json!({ "dn": { "cn": "dev.acme.test" } })).await?;
    let serial = created.certificate.serial;

    let found: AnnotatedCertificate = client.get_json(&format!("/v1/signed/{serial:x}")).await?;
    assert_eq!(found.certificate.serial, serial);
    assert_eq!(found.certificate.kind, CertificateKind::SelfSigned);
    assert_eq!(found.certificate.issuer_dn, found.certificate.subject_dn);
    assert_eq!(found.certificate, created.certificate);
    assert!(found.url.ends_with(&format!("/v1/signed/{serial:x}")));

    Ok(())
}
