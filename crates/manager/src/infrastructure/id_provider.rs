use core::error::Error;

use error_stack::Report;
use uuid::Uuid;

#[derive(Debug, derive_more::Display)]
pub enum IdError {
    #[display("identifier source exhausted: {message}")]
    Exhausted { message: String },
}

impl Error for IdError {}

/// Source of globally unique computation identifiers
pub trait IdProvider: Send + Sync {
    fn id(&self) -> Result<String, Report<IdError>>;
}

/// Random (v4) UUIDs drawn from the operating system's entropy source
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidProvider;

impl IdProvider for UuidProvider {
    fn id(&self) -> Result<String, Report<IdError>> {
        Ok(Uuid::new_v4().to_string())
    }
}
