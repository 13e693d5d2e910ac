pub(crate) const SETTINGS_FILE_PATH: &str = "settings.json";
pub(crate) const DB_FILE_NAME: &str = "ca.db3";
pub(crate) const CA_FILE_NAME: &str = "ca.cert";
pub(crate) const DEFAULT_CA_PATH: &str = "ca";
pub(crate) const API_PORT: u16 = 3737;
pub(crate) const BASE_URL: &str = "v1/";
pub(crate) const DEFAULT_VALIDITY_DAYS: u32 = 365;
pub(crate) const DEFAULT_CA_VALIDITY_DAYS: u32 = 3650;
pub(crate) const ROOT_SERIAL: i64 = 1 << 62;
pub const SELF_SIGNED_DEFAULT_CN: &str = "Dev Certificate by EasyCA (self-signed)";
pub const EASYCA_VERSION: &str = "v0.1.0";
