use crate::data::enums::{CertificateKind, RequestStatus};
use crate::data::objects::{Certificate, CertificateAuthority, SigningRequest};
use anyhow::anyhow;
use anyhow::Result;
use include_dir::{include_dir, Dir};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rusqlite_migration::Migrations;
use std::path::Path;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use tracing::{debug, trace};

static MIGRATIONS_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/migrations");

const CERTIFICATE_COLUMNS: &str = "serial, kind, pem_certificate, subject_dn, issuer_dn, not_before, not_after, source_request_id, created_on";
const REQUEST_COLUMNS: &str = "id, pem_csr, distinguished_name, created_at, last_modified, status";

macro_rules! db_do {
    ($pool:expr, $operation:expr) => {
        {
            let pool = $pool.clone();
            tokio::task::spawn_blocking(move || {
                let conn = pool.get().map_err(|e| {
                    anyhow!("DB pool error: {}", e)
                })?;
                $operation(&conn)
            }).await?
        }
    };
}

/// Durable store of the CA identity, signing requests and certificates.
#[derive(Debug, Clone)]
pub struct CaDB {
    pool: Pool<SqliteConnectionManager>,
}

impl CaDB {
    /// Open the database at `path`, or a private in-memory database when `path` is None
    pub fn new(path: Option<&Path>) -> Result<Self> {
        let manager = match path {
            Some(path) => {
                debug!("Opening database at {}", path.display());
                SqliteConnectionManager::file(path)
            },
            None => {
                debug!("Opening in-memory database");
                SqliteConnectionManager::memory()
            }
        }.with_init(|connection| {
            connection.pragma_update(None, "foreign_keys", "ON")?;
            connection.busy_timeout(std::time::Duration::from_secs(5))?;
            Ok(())
        });

        // A single connection: an in-memory database only lives as long as its connection
        let pool = Pool::builder()
            .max_size(1)
            .max_lifetime(None)
            .idle_timeout(None)
            .build(manager)?;
        let mut connection = pool.get()?;

        Self::migrate_database(&mut connection)?;

        Ok(Self { pool })
    }

    fn migrate_database(conn: &mut Connection) -> Result<()> {
        let migrations = Migrations::from_directory(&MIGRATIONS_DIR)?;
        migrations.to_latest(conn)?;
        debug!("Database migrated to latest version");

        Ok(())
    }

    /// Store the CA identity.
    /// Returns false and leaves the stored row untouched if a CA already exists.
    pub(crate) async fn insert_ca(&self, ca: CertificateAuthority) -> Result<bool> {
        db_do!(self.pool, |conn: &Connection| {
            let inserted = conn.execute(
                "INSERT INTO certificate_authority (id, distinguished_name, key_algorithm, created_on, valid_until, certificate, key) VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO NOTHING",
                params![ca.distinguished_name, ca.key_algorithm, ca.created_on, ca.valid_until, ca.cert, ca.key],
            )?;
            Ok(inserted == 1)
        })
    }

    /// Retrieve the CA identity, None before initialization
    pub(crate) async fn get_ca(&self) -> Result<Option<CertificateAuthority>> {
        db_do!(self.pool, |conn: &Connection| {
            Ok(conn.query_row(
                "SELECT distinguished_name, key_algorithm, created_on, valid_until, certificate, key FROM certificate_authority WHERE id = 1",
                [],
                |row| Ok(CertificateAuthority {
                    distinguished_name: row.get(0)?,
                    key_algorithm: row.get(1)?,
                    created_on: row.get(2)?,
                    valid_until: row.get(3)?,
                    cert: row.get(4)?,
                    key: row.get(5)?,
                })
            ).optional()?)
        })
    }

    /// Hand out the next serial. Every call returns a value larger than all previous ones.
    pub(crate) async fn allocate_serial(&self) -> Result<i64> {
        db_do!(self.pool, |conn: &Connection| {
            let serial: i64 = conn.query_row(
                "UPDATE serial_counter SET next_serial = next_serial + 1 WHERE id = 1 RETURNING next_serial - 1",
                [],
                |row| row.get(0)
            )?;
            trace!("Allocated serial {serial}");
            Ok(serial)
        })
    }

    /// Insert a new signing request
    pub(crate) async fn insert_request(&self, request: SigningRequest) -> Result<SigningRequest> {
        db_do!(self.pool, |conn: &Connection| {
            conn.execute(
                "INSERT INTO signing_requests (id, pem_csr, distinguished_name, created_at, last_modified, status) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![request.id, request.pem_csr, request.distinguished_name, request.created_at, request.last_modified, request.status as u8],
            )?;
            Ok(request)
        })
    }

    pub(crate) async fn get_request(&self, id: String) -> Result<Option<SigningRequest>> {
        db_do!(self.pool, |conn: &Connection| {
            Ok(conn.query_row(
                &format!("SELECT {REQUEST_COLUMNS} FROM signing_requests WHERE id = ?1"),
                params![id],
                row_to_request
            ).optional()?)
        })
    }

    /// All signing requests in submission order
    pub(crate) async fn get_all_requests(&self) -> Result<Vec<SigningRequest>> {
        db_do!(self.pool, |conn: &Connection| {
            let mut stmt = conn.prepare(&format!("SELECT {REQUEST_COLUMNS} FROM signing_requests ORDER BY created_at, rowid"))?;
            let requests = stmt.query_map([], row_to_request)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(requests)
        })
    }

    /// Atomically record an issued certificate together with its request in state Signed.
    /// The request is created if it does not exist yet; a request that is already signed aborts the write.
    pub(crate) async fn insert_issued(&self, cert: Certificate, request: SigningRequest) -> Result<Certificate> {
        db_do!(self.pool, |conn: &Connection| {
            let tx = conn.unchecked_transaction()?;

            let changed = tx.execute(
                "INSERT INTO signing_requests (id, pem_csr, distinguished_name, created_at, last_modified, status) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET status = excluded.status, last_modified = excluded.last_modified
                 WHERE signing_requests.status = ?7",
                params![request.id, request.pem_csr, request.distinguished_name, request.created_at, request.last_modified, RequestStatus::Signed as u8, RequestStatus::Pending as u8],
            )?;
            if changed == 0 {
                return Err(anyhow!("Signing request {} is not pending", request.id));
            }

            insert_certificate_row(&tx, &cert)?;
            tx.commit()?;
            Ok(cert)
        })
    }

    /// Insert a certificate that has no signing request
    pub(crate) async fn insert_certificate(&self, cert: Certificate) -> Result<Certificate> {
        db_do!(self.pool, |conn: &Connection| {
            insert_certificate_row(conn, &cert)?;
            Ok(cert)
        })
    }

    pub(crate) async fn get_certificate(&self, serial: i64) -> Result<Option<Certificate>> {
        db_do!(self.pool, |conn: &Connection| {
            Ok(conn.query_row(
                &format!("SELECT {CERTIFICATE_COLUMNS} FROM certificates WHERE serial = ?1"),
                params![serial],
                row_to_certificate
            ).optional()?)
        })
    }

    /// The certificate issued for a signing request, if any
    pub(crate) async fn get_certificate_for_request(&self, request_id: String) -> Result<Option<Certificate>> {
        db_do!(self.pool, |conn: &Connection| {
            Ok(conn.query_row(
                &format!("SELECT {CERTIFICATE_COLUMNS} FROM certificates WHERE source_request_id = ?1"),
                params![request_id],
                row_to_certificate
            ).optional()?)
        })
    }

    /// Retrieve all certificates ordered by serial
    /// If kind is Some, only certificates of that kind are returned
    pub(crate) async fn get_all_certificates(&self, kind: Option<CertificateKind>) -> Result<Vec<Certificate>> {
        db_do!(self.pool, |conn: &Connection| {
            let certificates = match kind {
                Some(kind) => {
                    let mut stmt = conn.prepare(&format!("SELECT {CERTIFICATE_COLUMNS} FROM certificates WHERE kind = ?1 ORDER BY serial"))?;
                    let rows = stmt.query_map(params![kind as u8], row_to_certificate)?;
                    rows.collect::<rusqlite::Result<Vec<_>>>()?
                },
                None => {
                    let mut stmt = conn.prepare(&format!("SELECT {CERTIFICATE_COLUMNS} FROM certificates ORDER BY serial"))?;
                    let rows = stmt.query_map([], row_to_certificate)?;
                    rows.collect::<rusqlite::Result<Vec<_>>>()?
                }
            };
            Ok(certificates)
        })
    }
}

fn insert_certificate_row(conn: &Connection, cert: &Certificate) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO certificates (serial, kind, pem_certificate, subject_dn, issuer_dn, not_before, not_after, source_request_id, created_on) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![cert.serial, cert.kind as u8, cert.pem_certificate, cert.subject_dn, cert.issuer_dn, cert.not_before, cert.not_after, cert.source_request_id, cert.created_on],
    )?;
    Ok(())
}

fn row_to_request(row: &Row) -> rusqlite::Result<SigningRequest> {
    Ok(SigningRequest {
        id: row.get(0)?,
        pem_csr: row.get(1)?,
        distinguished_name: row.get(2)?,
        created_at: row.get(3)?,
        last_modified: row.get(4)?,
        status: row.get(5)?,
    })
}

fn row_to_certificate(row: &Row) -> rusqlite::Result<Certificate> {
    Ok(Certificate {
        serial: row.get(0)?,
        kind: row.get(1)?,
        pem_certificate: row.get(2)?,
        subject_dn: row.get(3)?,
        issuer_dn: row.get(4)?,
        not_before: row.get(5)?,
        not_after: row.get(6)?,
        source_request_id: row.get(7)?,
        created_on: row.get(8)?,
    })
}
