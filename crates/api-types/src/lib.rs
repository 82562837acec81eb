//! Shared API type definitions
//!
//! This crate contains the request and response types exchanged with the
//! computation manager over HTTP, together with the computation status that
//! both sides need to agree on.

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// Lifecycle state of a computation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ComputationStatus {
    /// Identifier assigned, nothing started yet
    #[default]
    Created,
    /// Pool, volume and domain are being brought up
    Provisioning,
    /// The domain is running the algorithm
    Running,
    /// The domain shut down on its own
    Completed,
    /// Provisioning failed or the domain crashed
    Failed,
    /// The TTL elapsed before the computation finished
    TimedOut,
}

impl ComputationStatus {
    /// Whether no further transition can leave this state
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::TimedOut)
    }
}

impl std::fmt::Display for ComputationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Provisioning => "provisioning",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
        };
        f.write_str(s)
    }
}

/// Request to provision a pool, a volume and a domain
///
/// Every field is a template source; an empty or missing value selects the
/// default template location.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CreateDomainRequest {
    #[serde(default)]
    pub pool: String,
    #[serde(default)]
    pub volume: String,
    #[serde(default)]
    pub domain: String,
}

/// Response for a successful domain creation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateDomainResponse {
    /// Name of the started domain
    pub name: String,
}

/// Request to run a computation
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub owner: String,
    /// Dataset artifact references, in order
    #[serde(default)]
    pub datasets: Vec<String>,
    /// Algorithm artifact references, in order
    #[serde(default)]
    pub algorithms: Vec<String>,
    #[serde(default)]
    pub dataset_providers: Vec<String>,
    #[serde(default)]
    pub algorithm_providers: Vec<String>,
    #[serde(default)]
    pub result_consumers: Vec<String>,
    /// Time-to-live in seconds
    pub ttl: u64,
}

/// Response for a submitted computation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunResponse {
    /// Identifier assigned to the computation
    pub id: String,
}

/// Computation record as seen by API clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub owner: String,
    pub datasets: Vec<String>,
    pub algorithms: Vec<String>,
    pub dataset_providers: Vec<String>,
    pub algorithm_providers: Vec<String>,
    pub result_consumers: Vec<String>,
    /// Time-to-live in seconds
    pub ttl: u64,
    pub status: ComputationStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Domain running the computation, once provisioned
    pub domain: Option<String>,
}

/// Error body returned for every failed request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: String,
}
