use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use settlement_engine::traits::SettlementError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("{0}")]
    BackendError(#[from] SettlementError),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Authentication error. {0}")]
    AuthenticationError(String),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::AuthenticationError(_) => StatusCode::UNAUTHORIZED,
            Self::InitializeError(_) | Self::ConfigurationError(_) | Self::IOError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
            Self::BackendError(e) => match e {
                SettlementError::ValidationError(_) => StatusCode::BAD_REQUEST,
                SettlementError::AccountNotFound(_) |
                SettlementError::BindingNotFound(_) |
                SettlementError::EventNotFound(_) => StatusCode::NOT_FOUND,
                SettlementError::AccountNotActive(_) => StatusCode::FORBIDDEN,
                SettlementError::DuplicateEvent |
                SettlementError::WithdrawalInProgress |
                SettlementError::RetryCooldown(_) |
                SettlementError::VersionConflict |
                SettlementError::InvalidStatusChange { .. } => StatusCode::CONFLICT,
                SettlementError::InsufficientBalance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                SettlementError::OrphanedMutation(_) | SettlementError::DatabaseError(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                },
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}
