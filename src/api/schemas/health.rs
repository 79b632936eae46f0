use serde::Serialize;

const OK: &str = "ok";
const ERROR: &str = "error";

/// Readiness report served by `/readyz`.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
    pub storage: &'static str,
}

impl HealthResponse {
    #[must_use]
    pub const fn new(database_ok: bool, storage_ok: bool) -> Self {
        Self {
            status: if database_ok && storage_ok { OK } else { ERROR },
            database: if database_ok { OK } else { ERROR },
            storage: if storage_ok { OK } else { ERROR },
        }
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status == OK
    }
}
