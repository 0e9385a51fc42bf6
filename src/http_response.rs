use crate::services::controller::{Accepted, ControllerError};
use actix_web::{HttpResponse, http::StatusCode};
use log::{error, warn};

/// Trait for converting service results into HTTP responses
pub trait ServiceResultResponse {
    fn into_response(self) -> HttpResponse;
}

impl ServiceResultResponse for Accepted {
    fn into_response(self) -> HttpResponse {
        HttpResponse::Ok().json(self)
    }
}

impl ServiceResultResponse for crate::api::WifiStatus {
    fn into_response(self) -> HttpResponse {
        HttpResponse::Ok().json(self)
    }
}

/// Map a controller error to the status code the portal expects
pub fn status_code(error: &ControllerError) -> StatusCode {
    match error {
        ControllerError::InvalidCredentials(_) => StatusCode::BAD_REQUEST,
        ControllerError::TransitionInProgress => StatusCode::CONFLICT,
        ControllerError::PersistenceFailed(_)
        | ControllerError::ProcessFailed(_)
        | ControllerError::ProbeFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Handle Result and convert data to Response
///
/// # Arguments
/// * `result` - The Result to handle
/// * `operation` - Context message describing the operation
///
/// # Returns
/// * `HttpResponse` - The ServiceResultResponse or the error with its status code
pub fn handle_service_result<T>(result: Result<T, ControllerError>, operation: &str) -> HttpResponse
where
    T: ServiceResultResponse,
{
    match result {
        Ok(data) => data.into_response(),
        Err(e) => error_response(e, operation),
    }
}

/// Log `e` and answer with its status code and message
pub fn error_response(e: ControllerError, operation: &str) -> HttpResponse {
    log_error(&e, operation);
    HttpResponse::build(status_code(&e)).body(e.to_string())
}

/// Log caller-correctable errors as warnings, everything else as errors
pub fn log_error(e: &ControllerError, operation: &str) {
    if status_code(e).is_client_error() {
        warn!("{operation} rejected: {e}");
    } else {
        error!("{operation} failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::executor::ExecError;

    #[test]
    fn errors_map_to_portal_status_codes() {
        assert_eq!(
            status_code(&ControllerError::InvalidCredentials("ssid".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_code(&ControllerError::TransitionInProgress),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_code(&ControllerError::ProbeFailed(ExecError::TimedOut {
                command: "iwgetid wlan0".to_string(),
                after: std::time::Duration::from_secs(15),
            })),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn handle_service_result_puts_error_in_body() {
        let response = handle_service_result::<Accepted>(
            Err(ControllerError::TransitionInProgress),
            "connect",
        );

        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
