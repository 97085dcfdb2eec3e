use crate::domain::card::CardId;
use crate::domain::order::PaymentMethod;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("no cards available for payment method {0}")]
    ResourceUnavailable(PaymentMethod),
    #[error("unexpected bank response: {0}")]
    ExternalProtocol(String),
    #[error("network error: {0}")]
    TransientNetwork(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("card #{0} is already locked")]
    ConcurrencyConflict(CardId),
    #[error("{0} not found")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// Text safe to hand back to an API caller.
    pub fn user_message(&self) -> String {
        match self {
            Self::ResourceUnavailable(_) => {
                "There are no available cards. Try again later.".to_string()
            }
            Self::Validation(reason) => reason.clone(),
            Self::NotFound(what) => format!("{what} not found"),
            _ => "Internal error. Try again later.".to_string(),
        }
    }

    /// Transport-class failures that are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientNetwork(_))
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::ExternalProtocol(err.to_string())
        } else {
            Self::TransientNetwork(err.to_string())
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::ExternalProtocol(err.to_string())
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for GatewayError {
    fn from(err: rocksdb::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_unavailable_is_user_friendly() {
        let err = GatewayError::ResourceUnavailable(PaymentMethod::BankTransfer);
        assert_eq!(
            err.user_message(),
            "There are no available cards. Try again later."
        );
        assert!(!err.is_transient());
    }

    #[test]
    fn test_internal_errors_are_not_leaked() {
        let err = GatewayError::Storage("disk on fire".to_string());
        assert!(!err.user_message().contains("disk"));
        assert!(GatewayError::TransientNetwork("reset".into()).is_transient());
    }
}
