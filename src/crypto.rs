use openssl::pkey::PKey;
use openssl::x509::X509;
use tracing::debug;
use crate::cert::{build_name, generate_private_key, parse_csr, read_name, CertificateBuilder, Validity};
use crate::data::enums::KeyAlgorithm;
use crate::data::error::CaError;
use crate::data::objects::{CertificateAuthority, DistinguishedName};

/// A CSR that parsed and whose self-signature verified
#[derive(Debug, Clone)]
pub struct ParsedCsr {
    pub pem: String,
    pub subject: DistinguishedName,
}

/// Output of a signing operation
#[derive(Debug, Clone)]
pub struct SignedCertificate {
    pub pem: String,
    pub der: Vec<u8>,
    pub subject: DistinguishedName,
    pub issuer: DistinguishedName,
    pub validity: Validity,
}

/// A certificate along with the key generated for it
#[derive(Clone)]
pub struct KeyedCertificate {
    pub certificate: SignedCertificate,
    pub private_key_der: Vec<u8>,
    pub private_key_pem: String,
}

/// Cryptographic boundary of the CA.
/// Implementations must be pure: no storage access, no shared state between calls.
pub trait CryptoEngine: Send + Sync {
    fn key_algorithm(&self) -> KeyAlgorithm;

    /// Key pair and self-signed root for `dn`
    fn create_root(&self, dn: &DistinguishedName, serial: i64, validity_days: u32) -> Result<KeyedCertificate, CaError>;

    fn parse_csr(&self, pem: &str) -> Result<ParsedCsr, CaError>;

    /// Certificate for the CSR's key and subject, signed with the CA key
    fn sign_csr(&self, csr: &ParsedCsr, ca: &CertificateAuthority, serial: i64, validity_days: u32) -> Result<SignedCertificate, CaError>;

    /// Independent key pair and self-signed end-entity certificate
    fn create_self_signed(&self, dn: &DistinguishedName, serial: i64, validity_days: u32) -> Result<KeyedCertificate, CaError>;
}

/// `CryptoEngine` backed by OpenSSL
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenSslEngine {
    key_algorithm: KeyAlgorithm,
}

impl OpenSslEngine {
    pub fn new(key_algorithm: KeyAlgorithm) -> Self {
        Self { key_algorithm }
    }

    fn create_keyed(&self, dn: &DistinguishedName, serial: i64, validity_days: u32, ca: bool) -> Result<KeyedCertificate, CaError> {
        build_name(dn).map_err(|e| CaError::InvalidDn(e.to_string()))?;

        let key = generate_private_key(self.key_algorithm)?;
        let builder = CertificateBuilder::new()
            .and_then(|b| b.set_serial(serial))
            .and_then(|b| b.set_valid_days(validity_days))
            .and_then(|b| b.set_subject(dn))
            .map_err(CaError::crypto)?;
        let validity = builder.validity().ok_or(CaError::crypto("validity not set"))?;
        let cert = if ca {
            builder.build_ca(&key)
        } else {
            builder.build_self_signed(&key)
        }.map_err(CaError::crypto)?;

        Ok(KeyedCertificate {
            certificate: signed_certificate(&cert, validity)?,
            private_key_der: key.private_key_to_der()?,
            private_key_pem: String::from_utf8(key.private_key_to_pem_pkcs8()?).map_err(CaError::crypto)?,
        })
    }
}

impl CryptoEngine for OpenSslEngine {
    fn key_algorithm(&self) -> KeyAlgorithm {
        self.key_algorithm
    }

    fn create_root(&self, dn: &DistinguishedName, serial: i64, validity_days: u32) -> Result<KeyedCertificate, CaError> {
        debug!("Creating {} root for {}", self.key_algorithm.as_str(), dn);
        self.create_keyed(dn, serial, validity_days, true)
    }

    fn parse_csr(&self, pem: &str) -> Result<ParsedCsr, CaError> {
        let csr = parse_csr(pem).map_err(|e| CaError::InvalidCsr(e.to_string()))?;
        Ok(ParsedCsr {
            pem: pem.trim().to_string(),
            subject: read_name(csr.subject_name()),
        })
    }

    fn sign_csr(&self, csr: &ParsedCsr, ca: &CertificateAuthority, serial: i64, validity_days: u32) -> Result<SignedCertificate, CaError> {
        let request = parse_csr(&csr.pem).map_err(|e| CaError::InvalidCsr(e.to_string()))?;
        let ca_cert = X509::from_der(&ca.cert)?;
        let ca_key = PKey::private_key_from_der(&ca.key)?;

        let builder = CertificateBuilder::new()
            .and_then(|b| b.set_serial(serial))
            .and_then(|b| b.set_valid_days(validity_days))
            .and_then(|b| b.set_csr(&request))
            .map_err(CaError::crypto)?;
        let validity = builder.validity().ok_or(CaError::crypto("validity not set"))?;
        let cert = builder.build_issued(&ca_cert, &ca_key).map_err(CaError::crypto)?;

        signed_certificate(&cert, validity)
    }

    fn create_self_signed(&self, dn: &DistinguishedName, serial: i64, validity_days: u32) -> Result<KeyedCertificate, CaError> {
        debug!("Creating self-signed certificate for {}", dn);
        self.create_keyed(dn, serial, validity_days, false)
    }
}

fn signed_certificate(cert: &X509, validity: Validity) -> Result<SignedCertificate, CaError> {
    Ok(SignedCertificate {
        pem: String::from_utf8(cert.to_pem()?).map_err(CaError::crypto)?,
        der: cert.to_der()?,
        subject: read_name(cert.subject_name()),
        issuer: read_name(cert.issuer_name()),
        validity,
    })
}
