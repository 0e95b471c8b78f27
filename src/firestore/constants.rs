pub(crate) const DEFAULT_DATABASE_ID: &str = "(default)";

pub(crate) const FIRESTORE_API_HOST: &str = "https://firestore.googleapis.com";
pub(crate) const FIRESTORE_API_VERSION: &str = "v1";

/// Alias under which the count aggregate is requested and read back.
pub(crate) const COUNT_ALIAS: &str = "count";

pub(crate) const DEFAULT_TRANSACTION_ATTEMPTS: usize = 5;

pub(crate) const MAX_BATCH_WRITES: usize = 500;

pub(crate) const AUTO_ID_LENGTH: usize = 20;

pub(crate) const PROJECT_ID_ENV: &str = "FIRESTORE_PROJECT_ID";
pub(crate) const GCP_PROJECT_ID_ENV: &str = "GCP_PROJECT_ID";
pub(crate) const DATABASE_ID_ENV: &str = "FIRESTORE_DATABASE_ID";
pub(crate) const EMULATOR_HOST_ENV: &str = "FIRESTORE_EMULATOR_HOST";
