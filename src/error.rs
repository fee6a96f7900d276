use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettlementError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Escrow already released or refunded")]
    AlreadyReleased,
    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        requested: Decimal,
        available: Decimal,
    },
    #[error("Amount is below the minimum of {minimum}")]
    BelowMinimum { minimum: Decimal },
    #[error("Webhook signature invalid: {0}")]
    SignatureInvalid(String),
    #[error("Concurrent modification of {0}")]
    StaleWrite(String),
    #[error("Payment provider error: {0}")]
    ProviderError(String),
    #[error("Payment provider timed out")]
    ProviderTimeout,
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDBError(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl SettlementError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// True for failures of the storage or the provider rather than of the request.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::ProviderError(_)
                | Self::ProviderTimeout
                | Self::SerializationError(_)
                | Self::CsvError(_)
                | Self::IoError(_)
                | Self::InternalError(_)
        ) || self.is_storage_backend()
    }

    #[cfg(feature = "storage-rocksdb")]
    fn is_storage_backend(&self) -> bool {
        matches!(self, Self::RocksDBError(_))
    }

    #[cfg(not(feature = "storage-rocksdb"))]
    fn is_storage_backend(&self) -> bool {
        false
    }
}

pub type Result<T> = std::result::Result<T, SettlementError>;
