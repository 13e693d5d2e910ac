use crate::common::constants::*;
use anyhow::{anyhow, Result};
use rocket::http::{ContentType, Status};
use rocket::local::asynchronous::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::ops::{Deref, DerefMut};
use easyca::create_test_rocket;
use easyca::data::api::{AnnotatedCertificate, InitializeResponse};
use easyca::data::objects::CaInfo;

pub(crate) struct EasyCaClient(Client);

impl Deref for EasyCaClient {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for EasyCaClient {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl EasyCaClient {
    pub(crate) async fn new() -> Self {
        let rocket_build = create_test_rocket().await.unwrap();
        let rocket = rocket_build.ignite().await.unwrap();
        EasyCaClient(Client::tracked(rocket)
            .await
            .unwrap()
        )
    }

    pub(crate) async fn new_initialized() -> Self {
        let client = Self::new().await;

        let response = client.initialize(json!({
            "c": TEST_CA_COUNTRY,
            "o": TEST_CA_ORG,
            "cn": TEST_CA_CN
        })).await.unwrap();
        assert!(response.success, "{}", response.message);

        client
    }

    pub(crate) async fn initialize(&self, dn: Value) -> Result<InitializeResponse> {
        let request = self
            .post("/v1/ca")
            .header(ContentType::JSON)
            .body(dn.to_string());
        let response = request.dispatch().await;
        if response.status() != Status::Ok {
            return Err(anyhow!("initialize failed with {}", response.status()));
        }
        Ok(response.into_json().await.ok_or(anyhow!("invalid body"))?)
    }

    pub(crate) async fn ca_info(&self) -> Result<CaInfo> {
        self.get_json("/v1/ca").await
    }

    pub(crate) async fn sign_csr(&self, csr: &str) -> Result<AnnotatedCertificate> {
        let response = self.post_csr("/v1/csr", csr).await?;
        Ok(serde_json::from_value(response)?)
    }

    /// Post `{csr}` to `path` and return the JSON answer, failing on any status but 200
    pub(crate) async fn post_csr(&self, path: &str, csr: &str) -> Result<Value> {
        let request = self
            .post(path.to_string())
            .header(ContentType::JSON)
            .body(json!({ "csr": csr }).to_string());
        let response = request.dispatch().await;
        if response.status() != Status::Ok {
            return Err(anyhow!("POST {path} failed with {}", response.status()));
        }
        Ok(response.into_json().await.ok_or(anyhow!("invalid body"))?)
    }

    pub(crate) async fn get_json<T: DeserializeOwned + Send + 'static>(&self, path: &str) -> Result<T> {
        let response = self.get(path.to_string()).dispatch().await;
        if response.status() != Status::Ok {
            return Err(anyhow!("GET {path} failed with {}", response.status()));
        }
        Ok(response.into_json().await.ok_or(anyhow!("invalid body"))?)
    }

    pub(crate) async fn status_of_get(&self, path: &str) -> Status {
        self.get(path.to_string()).dispatch().await.status()
    }
}
