use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use crate::cert::{get_pem, save_ca};
use crate::constants::ROOT_SERIAL;
use crate::crypto::{CryptoEngine, OpenSslEngine, ParsedCsr};
use crate::data::enums::{CertificateKind, RequestStatus};
use crate::data::error::CaError;
use crate::data::objects::{CaInfo, Certificate, CertificateAuthority, DistinguishedName, SelfSignedCertificate, SigningRequest};
use crate::db::CaDB;
use crate::helper::{new_request_id, now_ms, random_serial};
use crate::settings::Settings;

/// The CA state machine.
/// Built once at startup and shared by every caller.
pub struct CaService {
    db: CaDB,
    engine: Arc<dyn CryptoEngine>,
    validity_days: u32,
    ca_validity_days: u32,
    ca_cert_path: Option<PathBuf>,
    init_lock: Mutex<()>,
    issue_lock: Mutex<()>,
}

impl CaService {
    pub fn new(db: CaDB, engine: Arc<dyn CryptoEngine>, settings: &Settings) -> Self {
        Self {
            db,
            engine,
            validity_days: settings.validity_days,
            ca_validity_days: settings.ca_validity_days,
            ca_cert_path: None,
            init_lock: Mutex::new(()),
            issue_lock: Mutex::new(()),
        }
    }

    /// Open the store under `settings.ca_path` with the OpenSSL engine.
    /// The root certificate is exported next to the database after initialization.
    pub fn open(settings: &Settings) -> Result<Self, CaError> {
        std::fs::create_dir_all(&settings.ca_path).map_err(CaError::storage)?;
        let db = CaDB::new(Some(&settings.db_path())).map_err(CaError::storage)?;
        let engine = Arc::new(OpenSslEngine::new(settings.key_algorithm));

        let mut service = Self::new(db, engine, settings);
        service.ca_cert_path = Some(settings.ca_cert_path());
        Ok(service)
    }

    /// Service on a private in-memory store
    pub fn in_memory(settings: &Settings) -> Result<Self, CaError> {
        let db = CaDB::new(None).map_err(CaError::storage)?;
        Ok(Self::new(db, Arc::new(OpenSslEngine::new(settings.key_algorithm)), settings))
    }

    /// Runs a CPU-bound engine call off the async workers
    async fn run_crypto<T, F>(&self, operation: F) -> Result<T, CaError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn CryptoEngine) -> Result<T, CaError> + Send + 'static,
    {
        let engine = self.engine.clone();
        tokio::task::spawn_blocking(move || operation(engine.as_ref()))
            .await
            .map_err(CaError::crypto)?
    }

    async fn current_ca(&self) -> Result<Option<CertificateAuthority>, CaError> {
        self.db.get_ca().await.map_err(CaError::storage)
    }

    /// Create the CA key and root certificate. Only the first call has an effect.
    pub async fn initialize(&self, dn: DistinguishedName) -> Result<CaInfo, CaError> {
        let dn = dn.normalize()?;
        let _guard = self.init_lock.lock().await;

        if self.current_ca().await?.is_some() {
            warn!("Refusing to initialize CA twice");
            return Err(CaError::AlreadyInitialized);
        }

        info!("Initializing CA {}", dn);
        let validity_days = self.ca_validity_days;
        let root_dn = dn.clone();
        let root = self.run_crypto(move |engine| engine.create_root(&root_dn, ROOT_SERIAL, validity_days)).await?;

        let ca = CertificateAuthority {
            distinguished_name: dn,
            key_algorithm: self.engine.key_algorithm().as_str().to_string(),
            created_on: root.certificate.validity.not_before,
            valid_until: root.certificate.validity.not_after,
            cert: root.certificate.der,
            key: root.private_key_der,
        };
        if !self.db.insert_ca(ca.clone()).await.map_err(CaError::storage)? {
            warn!("Another instance initialized the CA first");
            return Err(CaError::AlreadyInitialized);
        }

        if let Some(path) = &self.ca_cert_path {
            match save_ca(&ca, path) {
                Ok(()) => debug!("Root certificate exported to {}", path.display()),
                Err(e) => warn!("Failed exporting root certificate to {}: {e}", path.display()),
            }
        }

        ca_info(&ca)
    }

    /// Public state of the CA. Never fails on an uninitialized CA.
    pub async fn get_info(&self) -> Result<CaInfo, CaError> {
        match self.current_ca().await? {
            Some(ca) => ca_info(&ca),
            None => Ok(CaInfo::default()),
        }
    }

    /// Root certificate in PEM format
    pub async fn root_certificate(&self) -> Result<String, CaError> {
        let ca = self.current_ca().await?.ok_or(CaError::NotInitialized)?;
        pem_string(&ca)
    }

    /// Sign a PEM CSR right away.
    /// Every call issues a new certificate under a new serial, even for a CSR signed before.
    pub async fn sign_request(&self, pem_csr: &str) -> Result<Certificate, CaError> {
        let ca = self.current_ca().await?.ok_or(CaError::NotInitialized)?;
        let csr = self.engine.parse_csr(pem_csr)?;

        let now = now_ms();
        let request = SigningRequest {
            id: new_request_id(),
            pem_csr: csr.pem.clone(),
            distinguished_name: csr.subject.clone(),
            created_at: now,
            last_modified: now,
            status: RequestStatus::Signed,
        };
        self.issue(ca, csr, request).await
    }

    /// Store a CSR as a pending request without signing it
    pub async fn submit_request(&self, pem_csr: &str) -> Result<SigningRequest, CaError> {
        let csr = self.engine.parse_csr(pem_csr)?;

        let now = now_ms();
        let request = SigningRequest {
            id: new_request_id(),
            pem_csr: csr.pem,
            distinguished_name: csr.subject,
            created_at: now,
            last_modified: now,
            status: RequestStatus::Pending,
        };
        debug!("Storing pending request {} for {}", request.id, request.distinguished_name);
        self.db.insert_request(request).await.map_err(CaError::storage)
    }

    /// Sign a stored request. A request that is already signed yields its existing certificate.
    pub async fn sign_stored_request(&self, id: &str) -> Result<Certificate, CaError> {
        let ca = self.current_ca().await?.ok_or(CaError::NotInitialized)?;
        let _guard = self.issue_lock.lock().await;

        let request = self.get_request(id).await?;
        if request.status == RequestStatus::Signed {
            debug!("Request {id} already signed");
            return self.db.get_certificate_for_request(id.to_string()).await
                .map_err(CaError::storage)?
                .ok_or_else(|| CaError::storage(format!("signed request {id} has no certificate")));
        }

        let csr = self.engine.parse_csr(&request.pem_csr)?;
        let request = SigningRequest {
            last_modified: now_ms(),
            status: RequestStatus::Signed,
            ..request
        };
        self.issue(ca, csr, request).await
    }

    async fn issue(&self, ca: CertificateAuthority, csr: ParsedCsr, request: SigningRequest) -> Result<Certificate, CaError> {
        let serial = self.db.allocate_serial().await.map_err(CaError::storage)?;
        let validity_days = self.validity_days;
        let signed = self.run_crypto(move |engine| engine.sign_csr(&csr, &ca, serial, validity_days)).await?;

        let cert = Certificate {
            serial,
            kind: CertificateKind::Issued,
            pem_certificate: signed.pem,
            subject_dn: signed.subject,
            issuer_dn: signed.issuer,
            not_before: signed.validity.not_before,
            not_after: signed.validity.not_after,
            source_request_id: Some(request.id.clone()),
            created_on: now_ms(),
        };
        info!("Issued certificate {:x} for {}", serial, cert.subject_dn);
        self.db.insert_issued(cert, request).await.map_err(CaError::storage)
    }

    /// All signing requests in submission order
    pub async fn list_requests(&self) -> Result<Vec<SigningRequest>, CaError> {
        self.db.get_all_requests().await.map_err(CaError::storage)
    }

    pub async fn get_request(&self, id: &str) -> Result<SigningRequest, CaError> {
        self.db.get_request(id.to_string()).await
            .map_err(CaError::storage)?
            .ok_or_else(|| CaError::NotFound(format!("Signing request {id}")))
    }

    /// All certificates ordered by serial
    pub async fn list_certificates(&self) -> Result<Vec<Certificate>, CaError> {
        self.db.get_all_certificates(None).await.map_err(CaError::storage)
    }

    pub async fn list_self_signed(&self) -> Result<Vec<Certificate>, CaError> {
        self.db.get_all_certificates(Some(CertificateKind::SelfSigned)).await.map_err(CaError::storage)
    }

    pub async fn get_certificate(&self, serial: i64) -> Result<Certificate, CaError> {
        self.db.get_certificate(serial).await
            .map_err(CaError::storage)?
            .ok_or_else(|| CaError::NotFound(format!("Certificate {serial:x}")))
    }

    /// Mint a key pair and a certificate signed by that same key.
    /// Neither the CA key nor the serial counter is involved, so this works on an uninitialized CA.
    pub async fn create_self_signed(&self, dn: DistinguishedName) -> Result<SelfSignedCertificate, CaError> {
        let dn = dn.normalize()?;

        let serial = loop {
            let candidate = random_serial();
            if self.db.get_certificate(candidate).await.map_err(CaError::storage)?.is_none() {
                break candidate;
            }
        };

        let validity_days = self.validity_days;
        let keyed = self.run_crypto(move |engine| engine.create_self_signed(&dn, serial, validity_days)).await?;

        let cert = Certificate {
            serial,
            kind: CertificateKind::SelfSigned,
            pem_certificate: keyed.certificate.pem,
            subject_dn: keyed.certificate.subject,
            issuer_dn: keyed.certificate.issuer,
            not_before: keyed.certificate.validity.not_before,
            not_after: keyed.certificate.validity.not_after,
            source_request_id: None,
            created_on: now_ms(),
        };
        let certificate = self.db.insert_certificate(cert).await.map_err(CaError::storage)?;
        info!("Created self-signed certificate {:x} for {}", serial, certificate.subject_dn);

        Ok(SelfSignedCertificate {
            certificate,
            private_key: keyed.private_key_pem,
        })
    }
}

fn pem_string(ca: &CertificateAuthority) -> Result<String, CaError> {
    String::from_utf8(get_pem(ca)?).map_err(CaError::crypto)
}

fn ca_info(ca: &CertificateAuthority) -> Result<CaInfo, CaError> {
    Ok(CaInfo {
        initialized: true,
        distinguished_name: Some(ca.distinguished_name.clone()),
        certificate: Some(pem_string(ca)?),
        key_algorithm: Some(ca.key_algorithm.clone()),
        created_on: Some(ca.created_on),
        valid_until: Some(ca.valid_until),
    })
}
