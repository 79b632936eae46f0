use crate::api::MgmtState;
use crate::api::schemas::health::HealthResponse;
use axum::{Json, extract::State, http::StatusCode};

pub async fn livez() -> StatusCode {
    StatusCode::OK
}

/// 200 when both the database and object storage answer in time, 503 otherwise.
pub async fn readyz(State(state): State<MgmtState>) -> (StatusCode, Json<HealthResponse>) {
    let health = &state.health_service;
    let (database, storage) = tokio::join!(health.check_db(), health.check_storage());

    let report = HealthResponse::new(is_up("database", database), is_up("storage", storage));
    let status = if report.is_ready() { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(report))
}

fn is_up(component: &'static str, check: Result<(), String>) -> bool {
    match check {
        Ok(()) => true,
        Err(reason) => {
            tracing::warn!(component, %reason, "Dependency not ready");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_failed_dependency_makes_report_not_ready() {
        assert!(HealthResponse::new(true, true).is_ready());

        let report = HealthResponse::new(is_up("database", Ok(())), is_up("storage", Err("timed out".to_string())));
        assert!(!report.is_ready());
        assert_eq!(report, HealthResponse { status: "error", database: "ok", storage: "error" });
    }
}
