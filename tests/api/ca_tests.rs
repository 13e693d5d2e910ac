use crate::common::constants::*;
use crate::common::helper::certificate_facts;
use crate::common::test_client::EasyCaClient;
use anyhow::Result;
use rocket::http::{ContentType, Status, StatusClass};
use serde_json::json;
use easyca::data::objects::DistinguishedName;

#[tokio::test]
async fn test_version() -> Result<()> {
    let client = EasyCaClient::new().await;

    let response = client.get("/v1/version").dispatch().await;

    assert_eq!(response.status(), Status::Ok);
    assert_eq!(response.content_type(), Some(ContentType::Plain));
    assert_eq!(response.into_string().await, Some("v0.1.0".into()));

    Ok(())
}

#[tokio::test]
async fn test_info_before_initialization() -> Result<()> {
    let client = EasyCaClient::new().await;

    let info = client.ca_info().await?;
    assert!(!info.initialized);
    assert!(info.distinguished_name.is_none());
    assert!(info.certificate.is_none());

    Ok(())
}

#[tokio::test]
async fn test_initialize() -> Result<()> {
    let client = EasyCaClient::new_initialized().await;

    let info = client.ca_info().await?;
    assert!(info.initialized);
    assert_eq!(info.key_algorithm.as_deref(), Some("ecdsa-p256"));

    let dn = info.distinguished_name.unwrap();
    assert_eq!(dn.common_name, TEST_CA_CN);
    assert_eq!(dn.organization.as_deref(), Some(TEST_CA_ORG));
    assert_eq!(dn.country.as_deref(), Some(TEST_CA_COUNTRY));

    let facts = certificate_facts(&info.certificate.unwrap())?;
    assert!(facts.is_ca);
    assert_eq!(facts.subject, facts.issuer);
    assert!(facts.subject.contains(TEST_CA_CN));
    assert!(info.created_on.unwrap() < info.valid_until.unwrap());

    Ok(())
}

#[tokio::test]
async fn test_initialize_twice_keeps_first_ca() -> Result<()> {
    let client = EasyCaClient::new_initialized().await;
    let before = client.ca_info().await?;

    let response = client.initialize(json!({ "cn": "Another Root" })).await?;
    assert!(!response.success);
    assert_eq!(response.message, "CA is already initialized");

    let after = client.ca_info().await?;
    assert_eq!(before, after);

    Ok(())
}

#[tokio::test]
async fn test_initialize_with_invalid_dn() -> Result<()> {
    let client = EasyCaClient::new().await;

    let response = client.initialize(json!({ "o": TEST_CA_ORG })).await?;
    assert!(!response.success);
    assert!(response.message.starts_with("Invalid distinguished name"));

    let response = client.initialize(json!({ "cn": TEST_CA_CN, "c": "Germany" })).await?;
    assert!(!response.success);

    assert!(!client.ca_info().await?.initialized);

    Ok(())
}

#[tokio::test]
async fn test_initialize_rejects_unknown_fields() -> Result<()> {
    let client = EasyCaClient::new().await;

    let response = client
        .post("/v1/ca")
        .header(ContentType::JSON)
        .body(json!({ "cn": TEST_CA_CN, "serialNumber": "1" }).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status().class(), StatusClass::ClientError);
    drop(response);

    assert!(!client.ca_info().await?.initialized);

    Ok(())
}

#[tokio::test]
async fn test_initialize_trims_fields() -> Result<()> {
    let client = EasyCaClient::new().await;

    let response = client.initialize(json!({ "cn": "  Trimmed Root ", "ou": "" })).await?;
    assert!(response.success);

    let dn = client.ca_info().await?.distinguished_name.unwrap();
    assert_eq!(dn, DistinguishedName::new("Trimmed Root"));

    Ok(())
}

#[tokio::test]
async fn test_download_ca() -> Result<()> {
    let client = EasyCaClient::new().await;
    assert_eq!(client.status_of_get("/v1/ca/certificate").await, Status::Conflict);

    let response = client.initialize(json!({ "cn": TEST_CA_CN })).await?;
    assert!(response.success);

    let response = client.get("/v1/ca/certificate").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let pem = response.into_string().await.unwrap();
    assert_eq!(Some(pem), client.ca_info().await?.certificate);

    Ok(())
}
