use std::fmt::Display;
use rocket::http::Status;
use rocket::Request;
use rocket::response::Responder;
use rocket::response::status::Custom;
use rocket_okapi::{okapi, JsonSchema, OpenApiError};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::Responses;
use rocket_okapi::response::OpenApiResponderInner;
use serde::Serialize;

/// Failure conditions of the CA core.
/// The first five are expected, caller-triggerable outcomes; storage and crypto failures are not.
#[derive(Debug)]
pub enum CaError {
    AlreadyInitialized,
    NotInitialized,
    InvalidDn(String),
    InvalidCsr(String),
    NotFound(String),
    StorageFailure(String),
    CryptoFailure(String),
}

impl CaError {
    pub fn storage(error: impl Display) -> Self {
        CaError::StorageFailure(error.to_string())
    }

    pub fn crypto(error: impl Display) -> Self {
        CaError::CryptoFailure(error.to_string())
    }

    /// Validation and state errors that callers get back as structured failures.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, CaError::StorageFailure(_) | CaError::CryptoFailure(_))
    }
}

impl Display for CaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaError::AlreadyInitialized => write!(f, "CA is already initialized"),
            CaError::NotInitialized => write!(f, "CA has not been initialized yet"),
            CaError::InvalidDn(e) => write!(f, "Invalid distinguished name: {e}"),
            CaError::InvalidCsr(e) => write!(f, "Invalid certificate signing request: {e}"),
            CaError::NotFound(e) => write!(f, "{e} not found"),
            CaError::StorageFailure(e) => write!(f, "Storage failure: {e}"),
            CaError::CryptoFailure(e) => write!(f, "Crypto failure: {e}"),
        }
    }
}

impl std::error::Error for CaError {}

impl From<rusqlite::Error> for CaError {
    fn from(error: rusqlite::Error) -> Self {
        CaError::StorageFailure(error.to_string())
    }
}

impl From<openssl::error::ErrorStack> for CaError {
    fn from(error: openssl::error::ErrorStack) -> Self {
        CaError::CryptoFailure(error.to_string())
    }
}

#[derive(Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug)]
pub enum ApiError {
    Ca(CaError),
    BadRequest(String),
}

impl ApiError {
    fn status(&self) -> Status {
        match self {
            ApiError::Ca(CaError::AlreadyInitialized | CaError::NotInitialized) => Status::Conflict,
            ApiError::Ca(CaError::InvalidDn(_) | CaError::InvalidCsr(_)) => Status::BadRequest,
            ApiError::Ca(CaError::NotFound(_)) => Status::NotFound,
            ApiError::Ca(CaError::StorageFailure(_) | CaError::CryptoFailure(_)) => Status::InternalServerError,
            ApiError::BadRequest(_) => Status::BadRequest,
        }
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, req: &'r Request<'_>) -> rocket::response::Result<'static> {
        let status = self.status();
        let message = match self {
            ApiError::Ca(e) => e.to_string(),
            ApiError::BadRequest(e) => e,
        };

        let body = rocket::serde::json::Json(ErrorResponse {
            error: message,
        });

        Custom(status, body).respond_to(req)
    }
}

impl OpenApiResponderInner for ApiError {
    fn responses(r#gen: &mut OpenApiGenerator) -> Result<Responses, OpenApiError> {
        use rocket_okapi::okapi::openapi3::{Responses, Response as OpenApiResponse, RefOr};

        let schema = r#gen.json_schema::<ErrorResponse>();
        let json_response = OpenApiResponse {
            description: "API error".to_owned(),
            content: {
                let mut map = okapi::Map::new();
                map.insert(
                    "application/json".to_owned(),
                    okapi::openapi3::MediaType {
                        schema: Some(schema),
                        ..Default::default()
                    },
                );
                map
            },
            ..Default::default()
        };

        let mut responses = Responses::default();
        for code in &[400, 404, 409, 500] {
            responses.responses.insert(
                code.to_string(),
                RefOr::Object(json_response.clone()),
            );
        }

        Ok(responses)
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Ca(e) => write!(f, "{e}"),
            ApiError::BadRequest(e) => write!(f, "{e}"),
        }
    }
}

impl From<CaError> for ApiError {
    fn from(error: CaError) -> Self {
        ApiError::Ca(error)
    }
}
