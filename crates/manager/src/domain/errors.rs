use core::error::Error;

/// Errors surfaced across the manager's service boundary.
///
/// Lower level failures (template reads, hypervisor commands, identifier
/// generation) are kept underneath these contexts in the `error_stack::Report`
/// chain for logging; callers only ever match on the variant.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum ManagerError {
    #[display("malformed entity specification")]
    MalformedEntity,
    #[display("entity not found")]
    NotFound,
    #[display("missing or invalid credentials provided")]
    Unauthorized,
    #[display("failed to assign an identifier to the computation")]
    IdentityAssignmentFailed,
    #[display("operation did not finish before its deadline")]
    DeadlineExceeded,
}

impl Error for ManagerError {}
