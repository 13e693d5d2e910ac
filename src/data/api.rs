use rocket_okapi::JsonSchema;
use serde::{Deserialize, Serialize};
use crate::data::error::CaError;
use crate::data::objects::{Certificate, DistinguishedName, SigningRequest};

/// Answer of `POST /ca`. Recoverable failures are reported here instead of as an error status.
#[derive(Serialize, Deserialize, JsonSchema, Debug)]
pub struct InitializeResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Serialize, Deserialize, JsonSchema, Debug)]
pub struct CsrRequest {
    pub csr: String,
}

#[derive(Serialize, Deserialize, JsonSchema, Debug, Default)]
pub struct SelfSignedRequest {
    #[serde(default)]
    pub dn: Option<DistinguishedName>,
}

#[derive(Serialize, Deserialize, JsonSchema, Debug)]
pub struct Endpoints {
    pub ca: String,
    pub csr: String,
    pub signed: String,
    pub self_signed: String,
}

#[derive(Serialize, Deserialize, JsonSchema, Debug)]
pub struct ApiIndex {
    pub endpoints: Endpoints,
}

/// Listing entry for a signing request
#[derive(Serialize, Deserialize, JsonSchema, Debug)]
pub struct RequestSummary {
    pub id: String,
    pub last_modified: i64,
    pub url: String,
}

impl RequestSummary {
    pub fn new(request: &SigningRequest, base: &str) -> Self {
        Self {
            id: request.id.clone(),
            last_modified: request.last_modified,
            url: format!("{base}csr/{}", request.id),
        }
    }
}

/// A certificate with its hypermedia link
#[derive(Serialize, Deserialize, JsonSchema, Debug)]
pub struct AnnotatedCertificate {
    #[serde(flatten)]
    pub certificate: Certificate,
    pub url: String,
}

impl AnnotatedCertificate {
    pub fn new(certificate: Certificate, base: &str) -> Self {
        let url = format!("{base}signed/{}", certificate.serial_hex());
        Self { certificate, url }
    }
}

impl InitializeResponse {
    pub fn initialized() -> Self {
        InitializeResponse {
            success: true,
            message: "CA initialized".to_string(),
        }
    }

    pub fn failed(error: &CaError) -> Self {
        InitializeResponse {
            success: false,
            message: error.to_string(),
        }
    }
}
