use rocket_okapi::openapi;
use rocket::{get, post, State};
use rocket::request::{FromRequest, Outcome, Request};
use rocket::serde::json::{self, Json};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use tracing::{debug, info, warn};
use crate::constants::{API_PORT, BASE_URL, EASYCA_VERSION, SELF_SIGNED_DEFAULT_CN};
use crate::data::api::{AnnotatedCertificate, ApiIndex, CsrRequest, Endpoints, InitializeResponse, RequestSummary, SelfSignedRequest};
use crate::data::error::{ApiError, CaError};
use crate::data::objects::{AppState, CaInfo, DistinguishedName, SelfSignedCertificate, SigningRequest};

/// Absolute URL prefix of the API, derived from the Host header
pub(crate) struct BaseUrl(String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for BaseUrl {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let host = match request.host() {
            Some(host) => host.to_string(),
            None => format!("localhost:{API_PORT}"),
        };
        Outcome::Success(BaseUrl(format!("http://{host}/{BASE_URL}")))
    }
}

impl<'r> OpenApiFromRequest<'r> for BaseUrl {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}

#[openapi(tag = "Server")]
#[get("/")]
/// List the top-level endpoints.
pub(crate) fn index(base: BaseUrl) -> Json<ApiIndex> {
    let base = base.0;
    Json(ApiIndex {
        endpoints: Endpoints {
            ca: format!("{base}ca"),
            csr: format!("{base}csr"),
            signed: format!("{base}signed"),
            self_signed: format!("{base}self-signed"),
        }
    })
}

#[openapi(tag = "Server")]
#[get("/version")]
/// Get the current version of the server.
pub(crate) fn version() -> &'static str {
    EASYCA_VERSION
}

#[openapi(tag = "CA")]
#[get("/ca")]
/// Get the CA state. Reports `initialized: false` until the CA is set up.
pub(crate) async fn get_ca(
    state: &State<AppState>
) -> Result<Json<CaInfo>, ApiError> {
    Ok(Json(state.service.get_info().await?))
}

#[openapi(tag = "CA")]
#[post("/ca", format = "json", data = "<dn>")]
/// Initialize the CA with the given distinguished name. Only possible once.
pub(crate) async fn initialize_ca(
    state: &State<AppState>,
    dn: Json<DistinguishedName>
) -> Result<Json<InitializeResponse>, ApiError> {
    match state.service.initialize(dn.into_inner()).await {
        Ok(info) => {
            info!("CA {} was successfully initialized.", info.distinguished_name.map(|dn| dn.to_string()).unwrap_or_default());
            Ok(Json(InitializeResponse::initialized()))
        }
        Err(e) if e.is_recoverable() => {
            warn!("CA initialization rejected: {e}");
            Ok(Json(InitializeResponse::failed(&e)))
        }
        Err(e) => Err(e.into()),
    }
}

#[openapi(tag = "CA")]
#[get("/ca/certificate")]
/// Download the CA root certificate in PEM format.
pub(crate) async fn download_ca(
    state: &State<AppState>
) -> Result<String, ApiError> {
    Ok(state.service.root_certificate().await?)
}

#[openapi(tag = "Signing Requests")]
#[get("/csr")]
/// List all signing requests.
pub(crate) async fn list_requests(
    state: &State<AppState>,
    base: BaseUrl
) -> Result<Json<Vec<RequestSummary>>, ApiError> {
    let requests = state.service.list_requests().await?;
    Ok(Json(requests.iter().map(|r| RequestSummary::new(r, &base.0)).collect()))
}

#[openapi(tag = "Signing Requests")]
#[post("/csr", format = "json", data = "<payload>")]
/// Sign a PEM encoded certificate signing request.
pub(crate) async fn sign_request(
    state: &State<AppState>,
    base: BaseUrl,
    payload: Json<CsrRequest>
) -> Result<Json<AnnotatedCertificate>, ApiError> {
    let cert = state.service.sign_request(&payload.csr).await?;
    Ok(Json(AnnotatedCertificate::new(cert, &base.0)))
}

#[openapi(tag = "Signing Requests")]
#[post("/csr/submit", format = "json", data = "<payload>")]
/// Store a signing request without signing it.
pub(crate) async fn submit_request(
    state: &State<AppState>,
    payload: Json<CsrRequest>
) -> Result<Json<SigningRequest>, ApiError> {
    Ok(Json(state.service.submit_request(&payload.csr).await?))
}

#[openapi(tag = "Signing Requests")]
#[get("/csr/<id>")]
/// Get a signing request.
pub(crate) async fn get_request(
    state: &State<AppState>,
    id: &str
) -> Result<Json<SigningRequest>, ApiError> {
    Ok(Json(state.service.get_request(id).await?))
}

#[openapi(tag = "Signing Requests")]
#[post("/csr/<id>/sign")]
/// Sign a stored request. Signing an already signed request returns its certificate.
pub(crate) async fn sign_stored_request(
    state: &State<AppState>,
    base: BaseUrl,
    id: &str
) -> Result<Json<AnnotatedCertificate>, ApiError> {
    let cert = state.service.sign_stored_request(id).await?;
    Ok(Json(AnnotatedCertificate::new(cert, &base.0)))
}

#[openapi(tag = "Certificates")]
#[get("/signed")]
/// List all certificates.
pub(crate) async fn list_signed(
    state: &State<AppState>,
    base: BaseUrl
) -> Result<Json<Vec<AnnotatedCertificate>>, ApiError> {
    let certs = state.service.list_certificates().await?;
    Ok(Json(certs.into_iter().map(|c| AnnotatedCertificate::new(c, &base.0)).collect()))
}

#[openapi(tag = "Certificates")]
#[get("/signed/<serial>")]
/// Get a certificate by its hexadecimal serial number.
pub(crate) async fn get_signed(
    state: &State<AppState>,
    base: BaseUrl,
    serial: &str
) -> Result<Json<AnnotatedCertificate>, ApiError> {
    if serial.is_empty() || !serial.chars().all(|c| c.is_ascii_hexdigit()) {
        debug!(serial, "Serial is not a hexadecimal number");
        return Err(ApiError::BadRequest(format!("Invalid serial number {serial}")));
    }
    // Serials beyond 63 bits are never handed out
    let serial = i64::from_str_radix(serial, 16)
        .map_err(|_| CaError::NotFound(format!("Certificate {serial}")))?;
    let cert = state.service.get_certificate(serial).await?;
    Ok(Json(AnnotatedCertificate::new(cert, &base.0)))
}

#[openapi(tag = "Certificates")]
#[get("/self-signed")]
/// List self-signed certificates.
pub(crate) async fn list_self_signed(
    state: &State<AppState>,
    base: BaseUrl
) -> Result<Json<Vec<AnnotatedCertificate>>, ApiError> {
    let certs = state.service.list_self_signed().await?;
    Ok(Json(certs.into_iter().map(|c| AnnotatedCertificate::new(c, &base.0)).collect()))
}

#[openapi(tag = "Certificates")]
#[post("/self-signed", data = "<payload>")]
/// Create a self-signed certificate with a fresh key pair. The body is optional.
/// The private key is part of this response only and is never stored.
pub(crate) async fn create_self_signed(
    state: &State<AppState>,
    payload: Result<Json<SelfSignedRequest>, json::Error<'_>>
) -> Result<Json<SelfSignedCertificate>, ApiError> {
    let request = match payload {
        Ok(request) => request.into_inner(),
        Err(json::Error::Parse(body, _)) if body.trim().is_empty() => SelfSignedRequest::default(),
        Err(e) => return Err(ApiError::BadRequest(e.to_string())),
    };
    let dn = request.dn
        .unwrap_or_else(|| DistinguishedName::new(SELF_SIGNED_DEFAULT_CN));
    Ok(Json(state.service.create_self_signed(dn).await?))
}
