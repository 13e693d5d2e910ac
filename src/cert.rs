use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use anyhow::anyhow;
use anyhow::Result;
use openssl::asn1::{Asn1Integer, Asn1Time};
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::x509::{X509Name, X509NameBuilder, X509NameRef, X509Req, X509};
use openssl::x509::extension::{AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectKeyIdentifier};
use openssl::x509::X509Builder;
use tracing::trace;
use crate::data::enums::KeyAlgorithm;
use crate::data::objects::{CertificateAuthority, DistinguishedName};

const X509_VERSION_3: i32 = 2;
const SECONDS_PER_DAY: i64 = 86400;

/// Validity window in UNIX milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validity {
    pub not_before: i64,
    pub not_after: i64,
}

/// Assembles one X.509 certificate.
/// Usage: set serial, validity and subject (directly or from a CSR), then call one of the `build_*` methods.
pub struct CertificateBuilder {
    x509: X509Builder,
    not_before: i64,
    not_after: Option<i64>,
    serial: Option<i64>,
    subject: Option<X509Name>,
    has_csr: bool,
}

impl CertificateBuilder {
    pub fn new() -> Result<Self> {
        let not_before = unix_now()?;

        let mut x509 = X509Builder::new()?;
        x509.set_version(X509_VERSION_3)?;
        let asn1_not_before = Asn1Time::from_unix(not_before as _)?;
        x509.set_not_before(&asn1_not_before)?;

        Ok(Self {
            x509,
            not_before,
            not_after: None,
            serial: None,
            subject: None,
            has_csr: false,
        })
    }

    pub fn set_serial(mut self, serial: i64) -> Result<Self> {
        if serial <= 0 {
            return Err(anyhow!("X509: serial must be positive"));
        }
        let asn1_serial = serial_to_asn1(serial)?;
        self.x509.set_serial_number(&asn1_serial)?;
        self.serial = Some(serial);
        Ok(self)
    }

    pub fn set_valid_days(mut self, days: u32) -> Result<Self> {
        let not_after = self.not_before + i64::from(days) * SECONDS_PER_DAY;
        let asn1_not_after = Asn1Time::from_unix(not_after as _)?;
        self.x509.set_not_after(&asn1_not_after)?;
        self.not_after = Some(not_after);
        Ok(self)
    }

    pub fn set_subject(mut self, dn: &DistinguishedName) -> Result<Self> {
        let name = build_name(dn)?;
        self.x509.set_subject_name(&name)?;
        self.subject = Some(name);
        Ok(self)
    }

    /// Take subject and public key from a CSR
    pub fn set_csr(mut self, csr: &X509Req) -> Result<Self> {
        let public_key = csr.public_key()?;
        self.x509.set_pubkey(&public_key)?;
        self.x509.set_subject_name(csr.subject_name())?;
        self.has_csr = true;
        Ok(self)
    }

    pub fn validity(&self) -> Option<Validity> {
        self.not_after.map(|not_after| Validity {
            not_before: self.not_before * 1000,
            not_after: not_after * 1000,
        })
    }

    /// Self-signed root able to sign further certificates
    pub fn build_ca(mut self, key: &PKey<Private>) -> Result<X509> {
        let subject = self.check_self_signed()?;
        self.x509.set_pubkey(key)?;
        self.x509.set_issuer_name(&subject)?;

        let basic_constraints = BasicConstraints::new().critical().ca().build()?;
        self.x509.append_extension(basic_constraints)?;

        let key_usage = KeyUsage::new()
            .critical()
            .key_cert_sign()
            .crl_sign()
            .build()?;
        self.x509.append_extension(key_usage)?;

        self.append_key_identifiers(None)?;

        self.x509.sign(key, MessageDigest::sha256())?;
        Ok(self.x509.build())
    }

    /// Self-signed end-entity certificate for development use
    pub fn build_self_signed(mut self, key: &PKey<Private>) -> Result<X509> {
        let subject = self.check_self_signed()?;
        self.x509.set_pubkey(key)?;
        self.x509.set_issuer_name(&subject)?;

        self.append_end_entity_extensions()?;
        let ext_key_usage = ExtendedKeyUsage::new()
            .server_auth()
            .client_auth()
            .build()?;
        self.x509.append_extension(ext_key_usage)?;

        self.append_key_identifiers(None)?;

        self.x509.sign(key, MessageDigest::sha256())?;
        Ok(self.x509.build())
    }

    /// Certificate for the CSR set earlier, issued and signed by the CA
    pub fn build_issued(mut self, ca_cert: &X509, ca_key: &PKey<Private>) -> Result<X509> {
        if !self.has_csr {
            return Err(anyhow!("X509: CSR not set"));
        }
        self.serial.ok_or(anyhow!("X509: serial not set"))?;
        self.not_after.ok_or(anyhow!("X509: validity not set"))?;

        self.x509.set_issuer_name(ca_cert.subject_name())?;
        self.append_end_entity_extensions()?;
        self.append_key_identifiers(Some(ca_cert))?;

        self.x509.sign(ca_key, MessageDigest::sha256())?;
        Ok(self.x509.build())
    }

    fn check_self_signed(&mut self) -> Result<X509Name> {
        self.serial.ok_or(anyhow!("X509: serial not set"))?;
        self.not_after.ok_or(anyhow!("X509: validity not set"))?;
        self.subject.take().ok_or(anyhow!("X509: subject not set"))
    }

    fn append_end_entity_extensions(&mut self) -> Result<()> {
        let basic_constraints = BasicConstraints::new().critical().build()?;
        self.x509.append_extension(basic_constraints)?;

        let key_usage = KeyUsage::new()
            .critical()
            .digital_signature()
            .key_encipherment()
            .build()?;
        self.x509.append_extension(key_usage)?;
        Ok(())
    }

    fn append_key_identifiers(&mut self, issuer: Option<&X509>) -> Result<()> {
        let issuer = issuer.map(|cert| &**cert);
        let subject_key_identifier = SubjectKeyIdentifier::new()
            .build(&self.x509.x509v3_context(issuer, None))?;
        self.x509.append_extension(subject_key_identifier)?;
        let authority_key_identifier = AuthorityKeyIdentifier::new()
            .keyid(true)
            .build(&self.x509.x509v3_context(issuer, None))?;
        self.x509.append_extension(authority_key_identifier)?;
        Ok(())
    }
}

/// Generates a new private key.
pub(crate) fn generate_private_key(algorithm: KeyAlgorithm) -> Result<PKey<Private>, ErrorStack> {
    trace!("Generating {} key", algorithm.as_str());
    match algorithm {
        KeyAlgorithm::Rsa2048 => PKey::from_rsa(Rsa::generate(2048)?),
        KeyAlgorithm::Rsa4096 => PKey::from_rsa(Rsa::generate(4096)?),
        KeyAlgorithm::EcdsaP256 => ec_key(Nid::X9_62_PRIME256V1),
        KeyAlgorithm::EcdsaP384 => ec_key(Nid::SECP384R1),
    }
}

fn ec_key(curve: Nid) -> Result<PKey<Private>, ErrorStack> {
    let group = EcGroup::from_curve_name(curve)?;
    let ec_key = EcKey::generate(&group)?;
    PKey::from_ec_key(ec_key)
}

pub(crate) fn build_name(dn: &DistinguishedName) -> Result<X509Name, ErrorStack> {
    let mut name_builder = X509NameBuilder::new()?;
    for (field, value) in dn.entries() {
        name_builder.append_entry_by_text(field, value)?;
    }
    Ok(name_builder.build())
}

/// Reads the recognized attributes of an X.509 name; anything else is ignored.
pub(crate) fn read_name(name: &X509NameRef) -> DistinguishedName {
    let text = |nid: Nid| {
        name.entries_by_nid(nid)
            .next()
            .and_then(|entry| String::from_utf8(entry.data().as_slice().to_vec()).ok())
    };

    DistinguishedName {
        country: text(Nid::COUNTRYNAME),
        state: text(Nid::STATEORPROVINCENAME),
        locality: text(Nid::LOCALITYNAME),
        organization: text(Nid::ORGANIZATIONNAME),
        organizational_unit: text(Nid::ORGANIZATIONALUNITNAME),
        common_name: text(Nid::COMMONNAME).unwrap_or_default(),
        email: text(Nid::PKCS9_EMAILADDRESS),
    }
}

/// Parses a PEM CSR and checks its self-signature.
pub(crate) fn parse_csr(pem: &str) -> Result<X509Req> {
    let csr = X509Req::from_pem(pem.trim().as_bytes())
        .map_err(|_| anyhow!("not a PEM encoded certificate request"))?;
    let public_key = csr.public_key()
        .map_err(|_| anyhow!("request carries no usable public key"))?;
    if !csr.verify(&public_key).unwrap_or(false) {
        return Err(anyhow!("request signature does not match its public key"));
    }
    Ok(csr)
}

fn serial_to_asn1(serial: i64) -> Result<Asn1Integer, ErrorStack> {
    let big_serial = BigNum::from_slice(&serial.to_be_bytes())?;
    big_serial.to_asn1_integer()
}

fn unix_now() -> Result<i64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as i64)
}

/// Convert a CA certificate to PEM format.
pub(crate) fn get_pem(ca: &CertificateAuthority) -> Result<Vec<u8>, ErrorStack> {
    let cert = X509::from_der(&ca.cert)?;
    cert.to_pem()
}

/// Saves the CA certificate to a file for filesystem access.
pub(crate) fn save_ca(ca: &CertificateAuthority, path: &Path) -> Result<()> {
    let pem = get_pem(ca)?;
    fs::write(path, pem)?;
    Ok(())
}
