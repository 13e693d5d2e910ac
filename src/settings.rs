use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;
use crate::constants::{CA_FILE_NAME, DB_FILE_NAME, DEFAULT_CA_PATH, DEFAULT_CA_VALIDITY_DAYS, DEFAULT_VALIDITY_DAYS, SETTINGS_FILE_PATH};
use crate::data::enums::KeyAlgorithm;
use crate::helper::get_env;

/// Runtime configuration.
/// Values come from the JSON settings file, environment variables take precedence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub ca_path: PathBuf,
    pub validity_days: u32,
    pub ca_validity_days: u32,
    pub key_algorithm: KeyAlgorithm,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ca_path: PathBuf::from(DEFAULT_CA_PATH),
            validity_days: DEFAULT_VALIDITY_DAYS,
            ca_validity_days: DEFAULT_CA_VALIDITY_DAYS,
            key_algorithm: KeyAlgorithm::default(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, `EASYCA_SETTINGS` or `settings.json`, in that order.
    /// A missing file yields the defaults.
    pub fn load_from_file(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => get_env("EASYCA_SETTINGS")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(SETTINGS_FILE_PATH)),
        };

        let mut settings = if path.exists() {
            debug!("Reading settings from {}", path.display());
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed reading {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed parsing {}", path.display()))?
        } else {
            debug!("No settings file at {}, using defaults", path.display());
            Settings::default()
        };

        settings.apply_env()?;
        settings.validate()?;
        Ok(settings)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(ca_path) = get_env("EASYCA_CA_PATH") {
            self.ca_path = PathBuf::from(ca_path);
        }
        if let Some(days) = get_env("EASYCA_VALIDITY_DAYS") {
            self.validity_days = days.parse().context("EASYCA_VALIDITY_DAYS is not a number")?;
        }
        if let Some(days) = get_env("EASYCA_CA_VALIDITY_DAYS") {
            self.ca_validity_days = days.parse().context("EASYCA_CA_VALIDITY_DAYS is not a number")?;
        }
        if let Some(alg) = get_env("EASYCA_KEY_ALGORITHM") {
            self.key_algorithm = KeyAlgorithm::from_name(&alg)
                .ok_or_else(|| anyhow!("Unsupported key algorithm {alg}"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.validity_days == 0 || self.ca_validity_days == 0 {
            return Err(anyhow!("Validity periods must be at least one day"));
        }
        Ok(())
    }

    pub fn db_path(&self) -> PathBuf {
        self.ca_path.join(DB_FILE_NAME)
    }

    pub fn ca_cert_path(&self) -> PathBuf {
        self.ca_path.join(CA_FILE_NAME)
    }
}
