use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use payment_engine::{
    reconciliation::ReconciliationError,
    traits::PaymentGatewayError,
    verifier::VerifyError,
    ReceiptError,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error(transparent)]
    PaymentError(#[from] ReconciliationError),
    #[error(transparent)]
    ReceiptError(#[from] ReceiptError),
}

impl From<PaymentGatewayError> for ServerError {
    fn from(e: PaymentGatewayError) -> Self {
        match e {
            PaymentGatewayError::OrderNotFound(id) => Self::NoRecordFound(format!("Order {id}")),
            PaymentGatewayError::DatabaseError(msg) => Self::BackendError(msg),
            e => Self::PaymentError(ReconciliationError::Settlement(e)),
        }
    }
}

impl ServerError {
    /// The machine-readable error code carried in JSON error bodies. Clients branch on
    /// these, so they are part of the API.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PaymentError(e) => reconciliation_code(e),
            Self::ReceiptError(ReceiptError::OrderNotFound(_)) => "OrderNotFound",
            Self::ReceiptError(ReceiptError::OrderNotPaid(_)) => "OrderNotPaid",
            Self::ReceiptError(ReceiptError::MintUnconfirmed(_)) => "MintUnconfirmed",
            Self::ReceiptError(ReceiptError::MintFailed(_)) => "MintFailed",
            Self::ReceiptError(ReceiptError::Ledger(_)) => "LedgerUnavailable",
            Self::ReceiptError(ReceiptError::Database(_)) => "BackendError",
            Self::NoRecordFound(_) => "OrderNotFound",
            Self::InvalidRequestBody(_) => "InvalidRequest",
            Self::InitializeError(_) | Self::BackendError(_) | Self::IOError(_) => "BackendError",
        }
    }
}

fn reconciliation_code(e: &ReconciliationError) -> &'static str {
    match e {
        ReconciliationError::Verification(VerifyError::NotFound(_)) => "NotFound",
        ReconciliationError::Verification(VerifyError::Reverted(_)) => "Reverted",
        ReconciliationError::Verification(VerifyError::InsufficientConfirmations { .. }) => {
            "InsufficientConfirmations"
        },
        ReconciliationError::Verification(VerifyError::EventMissing(_)) => "EventMissing",
        ReconciliationError::Verification(VerifyError::OrderMismatch { .. }) => "OrderMismatch",
        ReconciliationError::Verification(VerifyError::Ledger(_)) => "LedgerUnavailable",
        ReconciliationError::Settlement(PaymentGatewayError::DuplicateTransaction(_)) => "DuplicateTransaction",
        ReconciliationError::Settlement(PaymentGatewayError::InsufficientAmount { .. }) => "InsufficientAmount",
        ReconciliationError::Settlement(PaymentGatewayError::OrderNotFound(_)) => "OrderNotFound",
        ReconciliationError::Settlement(PaymentGatewayError::NoExchangeRate(_)) => "NoExchangeRate",
        ReconciliationError::Settlement(_) => "BackendError",
        ReconciliationError::RetriesExhausted { .. } => "RetriesExhausted",
        ReconciliationError::Cancelled => "BackendError",
    }
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::PaymentError(e) => reconciliation_status(e),
            Self::ReceiptError(e) => match e {
                ReceiptError::OrderNotFound(_) => StatusCode::NOT_FOUND,
                ReceiptError::OrderNotPaid(_) => StatusCode::CONFLICT,
                ReceiptError::MintUnconfirmed(_) => StatusCode::GATEWAY_TIMEOUT,
                ReceiptError::MintFailed(_) => StatusCode::BAD_GATEWAY,
                ReceiptError::Ledger(_) => StatusCode::SERVICE_UNAVAILABLE,
                ReceiptError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::InitializeError(_) | Self::BackendError(_) | Self::IOError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "code": self.code(), "error": self.to_string() }).to_string())
    }
}

fn reconciliation_status(e: &ReconciliationError) -> StatusCode {
    match e {
        ReconciliationError::Verification(VerifyError::NotFound(_)) => StatusCode::NOT_FOUND,
        ReconciliationError::Verification(VerifyError::InsufficientConfirmations { .. }) => StatusCode::CONFLICT,
        ReconciliationError::Verification(VerifyError::Ledger(_)) => StatusCode::SERVICE_UNAVAILABLE,
        ReconciliationError::Verification(_) => StatusCode::BAD_REQUEST,
        ReconciliationError::Settlement(PaymentGatewayError::OrderNotFound(_)) => StatusCode::NOT_FOUND,
        ReconciliationError::Settlement(PaymentGatewayError::DatabaseError(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        },
        ReconciliationError::Settlement(_) => StatusCode::BAD_REQUEST,
        ReconciliationError::RetriesExhausted { .. } => StatusCode::GATEWAY_TIMEOUT,
        ReconciliationError::Cancelled => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod test {
    use payment_engine::db_types::TxHash;

    use super::*;

    #[test]
    fn codes_match_the_documented_taxonomy() {
        let err = ServerError::PaymentError(ReconciliationError::Verification(VerifyError::NotFound(
            TxHash::from("0xabc"),
        )));
        assert_eq!(err.code(), "NotFound");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err = ServerError::PaymentError(ReconciliationError::RetriesExhausted {
            tx_hash: TxHash::from("0xabc"),
            attempts: 5,
            last_error: "not found".to_string(),
        });
        assert_eq!(err.code(), "RetriesExhausted");
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn error_bodies_carry_code_and_message() {
        let err = ServerError::NoRecordFound("Order #42".to_string());
        let response = err.error_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
