use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(anyhow::Error),

    #[error("Conflict: {0}")]
    Conflict(anyhow::Error),

    #[error("Precondition failed: {0}")]
    QuotaExceeded(anyhow::Error),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Cache error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub reason: String,
    pub message: String,
}

impl AppError {
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::ValidationError(_) => 422,
            AppError::BadRequest(_) => 400,
            AppError::NotFound(_) => 404,
            AppError::Unauthorized(_) => 401,
            AppError::Conflict(_) => 409,
            AppError::QuotaExceeded(_) => 412,
            AppError::InternalError(_) | AppError::ConfigError(_) => 500,
            AppError::ServiceUnavailable(_) | AppError::RedisError(_) => 503,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self.status_code() {
            400 => "Bad Request",
            401 => "Unauthorized",
            404 => "Not Found",
            409 => "Conflict",
            412 => "Precondition Failed",
            422 => "Unprocessable Entity",
            503 => "Service Unavailable",
            _ => "Internal Server Error",
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        let message = match self {
            AppError::ValidationError(err) => err.to_string(),
            AppError::BadRequest(err) => err.to_string(),
            AppError::NotFound(err) => err.to_string(),
            AppError::Unauthorized(err) => err.to_string(),
            AppError::Conflict(err) => err.to_string(),
            AppError::QuotaExceeded(err) => err.to_string(),
            AppError::InternalError(err) => format!("{:#}", err),
            AppError::ServiceUnavailable(msg) => msg.clone(),
            AppError::RedisError(err) => err.to_string(),
            AppError::ConfigError(err) => err.to_string(),
        };
        ErrorResponse {
            code: self.status_code(),
            reason: self.reason().to_string(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::NotFound(anyhow::anyhow!("x")).status_code(), 404);
        assert_eq!(AppError::Conflict(anyhow::anyhow!("x")).status_code(), 409);
        assert_eq!(
            AppError::QuotaExceeded(anyhow::anyhow!("x")).status_code(),
            412
        );
        assert_eq!(
            AppError::ServiceUnavailable("down".to_string()).status_code(),
            503
        );
    }

    #[test]
    fn test_to_response_carries_reason_and_message() {
        let err = AppError::Conflict(anyhow::anyhow!("This group already exists"));
        let response = err.to_response();
        assert_eq!(response.code, 409);
        assert_eq!(response.reason, "Conflict");
        assert_eq!(response.message, "This group already exists");
    }
}
