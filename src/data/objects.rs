use std::fmt::{Debug, Display};
use std::sync::Arc;
use rocket_okapi::JsonSchema;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use crate::data::enums::{CertificateKind, RequestStatus};
use crate::data::error::CaError;
use crate::service::CaService;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) service: Arc<CaService>,
}

/// Subject or issuer identity.
/// Only the fields below are recognized; unknown keys are rejected when deserializing.
#[derive(Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Debug)]
#[serde(deny_unknown_fields)]
pub struct DistinguishedName {
    #[serde(rename = "c", default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(rename = "st", default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(rename = "l", default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
    #[serde(rename = "o", default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(rename = "ou", default, skip_serializing_if = "Option::is_none")]
    pub organizational_unit: Option<String>,
    #[serde(rename = "cn", default)]
    pub common_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl DistinguishedName {
    pub fn new(common_name: &str) -> Self {
        Self {
            common_name: common_name.to_string(),
            ..Default::default()
        }
    }

    /// Trims every field, drops empty optional fields and checks the remaining values.
    pub fn normalize(self) -> Result<Self, CaError> {
        fn clean(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        let dn = Self {
            country: clean(self.country),
            state: clean(self.state),
            locality: clean(self.locality),
            organization: clean(self.organization),
            organizational_unit: clean(self.organizational_unit),
            common_name: self.common_name.trim().to_string(),
            email: clean(self.email),
        };

        if dn.common_name.is_empty() {
            return Err(CaError::InvalidDn("common name (cn) is required".to_string()));
        }
        if let Some(country) = &dn.country {
            if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(CaError::InvalidDn(format!("country (c) must be a two-letter code, got '{country}'")));
            }
        }
        if let Some(email) = &dn.email {
            if !email.contains('@') {
                return Err(CaError::InvalidDn(format!("email '{email}' is not an address")));
            }
        }
        for (field, value) in dn.entries() {
            if value.len() > 64 && field != "emailAddress" {
                return Err(CaError::InvalidDn(format!("{field} exceeds 64 characters")));
            }
        }

        Ok(dn)
    }

    /// X.509 attribute short names and values, in certificate order.
    pub fn entries(&self) -> Vec<(&'static str, &str)> {
        let mut entries = Vec::with_capacity(7);
        if let Some(v) = &self.country { entries.push(("C", v.as_str())); }
        if let Some(v) = &self.state { entries.push(("ST", v.as_str())); }
        if let Some(v) = &self.locality { entries.push(("L", v.as_str())); }
        if let Some(v) = &self.organization { entries.push(("O", v.as_str())); }
        if let Some(v) = &self.organizational_unit { entries.push(("OU", v.as_str())); }
        if !self.common_name.is_empty() { entries.push(("CN", self.common_name.as_str())); }
        if let Some(v) = &self.email { entries.push(("emailAddress", v.as_str())); }
        entries
    }
}

impl Display for DistinguishedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.entries()
            .into_iter()
            .map(|(field, value)| format!("{field}={value}"))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

impl FromSql for DistinguishedName {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Text(s) => serde_json::from_slice(s).map_err(|e| FromSqlError::Other(Box::new(e))),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

impl ToSql for DistinguishedName {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let json = serde_json::to_string(self)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        Ok(ToSqlOutput::from(json))
    }
}

/// The singleton CA identity. Times are UNIX milliseconds, `cert` and `key` are DER.
#[derive(Clone)]
pub struct CertificateAuthority {
    pub distinguished_name: DistinguishedName,
    pub key_algorithm: String,
    pub created_on: i64,
    pub valid_until: i64,
    pub cert: Vec<u8>,
    pub key: Vec<u8>,
}

impl Debug for CertificateAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateAuthority")
            .field("distinguished_name", &self.distinguished_name)
            .field("key_algorithm", &self.key_algorithm)
            .field("created_on", &self.created_on)
            .field("valid_until", &self.valid_until)
            .field("cert", &format_args!("<{} bytes>", self.cert.len()))
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Public view of the CA. Everything is empty until the CA is initialized.
#[derive(Clone, Serialize, Deserialize, JsonSchema, Debug, Default, PartialEq, Eq)]
pub struct CaInfo {
    pub initialized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distinguished_name: Option<DistinguishedName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_algorithm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_on: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<i64>,
}

#[derive(Clone, Serialize, Deserialize, JsonSchema, Debug, PartialEq, Eq)]
pub struct SigningRequest {
    pub id: String,
    pub pem_csr: String,
    pub distinguished_name: DistinguishedName,
    pub created_at: i64,
    pub last_modified: i64,
    pub status: RequestStatus,
}

#[derive(Clone, Serialize, Deserialize, JsonSchema, Debug, PartialEq, Eq)]
pub struct Certificate {
    pub serial: i64,
    pub kind: CertificateKind,
    pub pem_certificate: String,
    pub subject_dn: DistinguishedName,
    pub issuer_dn: DistinguishedName,
    pub not_before: i64,
    pub not_after: i64,
    pub source_request_id: Option<String>,
    pub created_on: i64,
}

impl Certificate {
    /// Serial as used in URLs
    pub fn serial_hex(&self) -> String {
        format!("{:x}", self.serial)
    }
}

/// A self-signed certificate together with its freshly generated key.
/// The key is handed out once and never stored.
#[derive(Clone, Serialize, Deserialize, JsonSchema, Debug)]
pub struct SelfSignedCertificate {
    pub certificate: Certificate,
    pub private_key: String,
}
