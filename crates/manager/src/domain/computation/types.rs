//! Computation record and its state machine

use std::time::Duration;

use api_types::ComputationInfo;
use api_types::ComputationStatus;
use api_types::RunRequest;
use chrono::DateTime;
use chrono::Utc;
use error_stack::Report;
use thiserror::Error;

use crate::domain::errors::ManagerError;

/// Rejected status change
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: ComputationStatus,
        to: ComputationStatus,
    },
}

/// Longest lifetime a computation may ask for
pub const MAX_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// What a caller asks to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputationSpec {
    pub name: String,
    pub description: String,
    pub owner: String,
    pub datasets: Vec<String>,
    pub algorithms: Vec<String>,
    pub dataset_providers: Vec<String>,
    pub algorithm_providers: Vec<String>,
    pub result_consumers: Vec<String>,
    pub ttl: Duration,
}

impl ComputationSpec {
    /// Checks the spec is runnable.
    ///
    /// # Errors
    ///
    /// - [`ManagerError::MalformedEntity`] if datasets, algorithms or result
    ///   consumers are missing, any list holds a blank entry, or the TTL is zero
    ///   or above [`MAX_TTL`]
    pub fn validate(&self) -> Result<(), Report<ManagerError>> {
        let required = [
            ("datasets", &self.datasets),
            ("algorithms", &self.algorithms),
            ("result_consumers", &self.result_consumers),
        ];
        for (field, entries) in required {
            if entries.is_empty() {
                return Err(Report::new(ManagerError::MalformedEntity)
                    .attach_printable(format!("{field} must not be empty")));
            }
        }

        let lists = [
            ("datasets", &self.datasets),
            ("algorithms", &self.algorithms),
            ("dataset_providers", &self.dataset_providers),
            ("algorithm_providers", &self.algorithm_providers),
            ("result_consumers", &self.result_consumers),
        ];
        for (field, entries) in lists {
            if let Some(index) = entries.iter().position(|e| e.trim().is_empty()) {
                return Err(Report::new(ManagerError::MalformedEntity)
                    .attach_printable(format!("{field}[{index}] is blank")));
            }
        }

        if self.ttl.is_zero() {
            return Err(Report::new(ManagerError::MalformedEntity)
                .attach_printable("ttl must be greater than zero"));
        }
        if self.ttl > MAX_TTL {
            return Err(Report::new(ManagerError::MalformedEntity).attach_printable(format!(
                "ttl of {}s exceeds the maximum of {}s",
                self.ttl.as_secs(),
                MAX_TTL.as_secs()
            )));
        }

        Ok(())
    }
}

impl From<RunRequest> for ComputationSpec {
    fn from(req: RunRequest) -> Self {
        Self {
            name: req.name,
            description: req.description,
            owner: req.owner,
            datasets: req.datasets,
            algorithms: req.algorithms,
            dataset_providers: req.dataset_providers,
            algorithm_providers: req.algorithm_providers,
            result_consumers: req.result_consumers,
            ttl: Duration::from_secs(req.ttl),
        }
    }
}

/// A tracked computation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Computation {
    id: String,
    pub spec: ComputationSpec,
    pub status: ComputationStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Domain running the computation, once provisioned
    pub domain: Option<String>,
}

impl Computation {
    pub fn new(id: String, spec: ComputationSpec) -> Self {
        Self {
            id,
            spec,
            status: ComputationStatus::Created,
            start_time: None,
            end_time: None,
            domain: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Moves the computation to `next`, stamping `start_time` on entering
    /// `Provisioning` and `end_time` on entering a terminal state.
    pub fn transition(
        &mut self,
        next: ComputationStatus,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if !can_transition(self.status, next) {
            return Err(TransitionError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        if next == ComputationStatus::Provisioning {
            self.start_time = Some(now);
        }
        if next.is_terminal() {
            // a clock step backwards must not put the end before the start
            let end = match self.start_time {
                Some(start) if start > now => start,
                _ => now,
            };
            self.end_time = Some(end);
        }
        self.status = next;
        Ok(())
    }
}

fn can_transition(from: ComputationStatus, to: ComputationStatus) -> bool {
    use ComputationStatus::*;

    matches!(
        (from, to),
        (Created, Provisioning)
            | (Provisioning, Running | Failed | TimedOut)
            | (Running, Completed | Failed | TimedOut)
    )
}

impl From<&Computation> for ComputationInfo {
    fn from(c: &Computation) -> Self {
        Self {
            id: c.id.clone(),
            name: c.spec.name.clone(),
            description: c.spec.description.clone(),
            owner: c.spec.owner.clone(),
            datasets: c.spec.datasets.clone(),
            algorithms: c.spec.algorithms.clone(),
            dataset_providers: c.spec.dataset_providers.clone(),
            algorithm_providers: c.spec.algorithm_providers.clone(),
            result_consumers: c.spec.result_consumers.clone(),
            ttl: c.spec.ttl.as_secs(),
            status: c.status,
            start_time: c.start_time,
            end_time: c.end_time,
            domain: c.domain.clone(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::TimeDelta;
    use similar_asserts::assert_eq;

    use super::*;

    pub(crate) fn spec() -> ComputationSpec {
        ComputationSpec {
            name: "census".to_string(),
            description: "average income per district".to_string(),
            owner: "alice".to_string(),
            datasets: vec!["d1".to_string(), "d2".to_string()],
            algorithms: vec!["a1".to_string()],
            dataset_providers: vec!["bob".to_string()],
            algorithm_providers: vec!["carol".to_string()],
            result_consumers: vec!["dave".to_string()],
            ttl: Duration::from_secs(60),
        }
    }

    #[test]
    fn valid_spec_passes() {
        assert!(spec().validate().is_ok());
    }

    #[test]
    fn invalid_specs_are_malformed() {
        let cases: Vec<(&str, ComputationSpec)> = vec![
            ("no datasets", ComputationSpec { datasets: vec![], ..spec() }),
            ("no algorithms", ComputationSpec { algorithms: vec![], ..spec() }),
            (
                "no result consumers",
                ComputationSpec { result_consumers: vec![], ..spec() },
            ),
            (
                "blank dataset",
                ComputationSpec { datasets: vec!["d1".to_string(), "  ".to_string()], ..spec() },
            ),
            (
                "blank provider",
                ComputationSpec { dataset_providers: vec![String::new()], ..spec() },
            ),
            ("zero ttl", ComputationSpec { ttl: Duration::ZERO, ..spec() }),
            (
                "ttl above maximum",
                ComputationSpec { ttl: MAX_TTL + Duration::from_secs(1), ..spec() },
            ),
            (
                "largest representable ttl",
                ComputationSpec { ttl: Duration::from_secs(u64::MAX), ..spec() },
            ),
        ];

        for (case, spec) in cases {
            let err = spec.validate().expect_err(case);
            assert_eq!(err.current_context(), &ManagerError::MalformedEntity, "{case}");
        }
    }

    #[test]
    fn maximum_ttl_is_accepted() {
        assert!(ComputationSpec { ttl: MAX_TTL, ..spec() }.validate().is_ok());
    }

    #[test]
    fn provider_lists_may_be_empty() {
        let spec = ComputationSpec {
            dataset_providers: vec![],
            algorithm_providers: vec![],
            ..spec()
        };
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn new_computation_is_created_without_timestamps() {
        let c = Computation::new("id-1".to_string(), spec());

        assert_eq!(c.id(), "id-1");
        assert_eq!(c.status, ComputationStatus::Created);
        assert_eq!(c.start_time, None);
        assert_eq!(c.end_time, None);
        assert_eq!(c.domain, None);
    }

    #[test]
    fn full_lifecycle_sets_both_timestamps() {
        let mut c = Computation::new("id-1".to_string(), spec());
        let t0 = Utc::now();
        let t1 = t0 + TimeDelta::seconds(5);

        c.transition(ComputationStatus::Provisioning, t0).expect("provisioning");
        assert_eq!(c.start_time, Some(t0));
        assert_eq!(c.end_time, None);

        c.transition(ComputationStatus::Running, t0).expect("running");
        c.transition(ComputationStatus::Completed, t1).expect("completed");
        assert_eq!(c.end_time, Some(t1));
    }

    #[test]
    fn transitions_only_move_forward() {
        use ComputationStatus::*;

        let now = Utc::now();
        let mut c = Computation::new("id-1".to_string(), spec());

        assert_eq!(
            c.transition(Running, now),
            Err(TransitionError::InvalidTransition { from: Created, to: Running })
        );
        c.transition(Provisioning, now).expect("provisioning");
        assert!(c.transition(Completed, now).is_err());
        assert!(c.transition(Created, now).is_err());
        c.transition(TimedOut, now).expect("timed out");

        for next in [Created, Provisioning, Running, Completed, Failed, TimedOut] {
            assert!(c.transition(next, now).is_err(), "terminal state left for {next}");
        }
        assert_eq!(c.status, TimedOut);
    }

    #[test]
    fn end_time_never_precedes_start_time() {
        let mut c = Computation::new("id-1".to_string(), spec());
        let start = Utc::now();

        c.transition(ComputationStatus::Provisioning, start).expect("provisioning");
        c.transition(ComputationStatus::Failed, start - TimeDelta::seconds(1))
            .expect("failed");

        assert_eq!(c.end_time, Some(start));
    }

    #[test]
    fn run_request_ttl_is_in_seconds() {
        let req = RunRequest {
            datasets: vec!["d1".to_string()],
            ttl: 90,
            ..Default::default()
        };
        let spec = ComputationSpec::from(req);
        assert_eq!(spec.ttl, Duration::from_secs(90));
    }

    #[test]
    fn info_mirrors_the_record() {
        let mut c = Computation::new("id-1".to_string(), spec());
        c.domain = Some("cocos-vm".to_string());

        let info = ComputationInfo::from(&c);

        assert_eq!(info.id, "id-1");
        assert_eq!(info.ttl, 60);
        assert_eq!(info.datasets, vec!["d1".to_string(), "d2".to_string()]);
        assert_eq!(info.status, ComputationStatus::Created);
        assert_eq!(info.domain.as_deref(), Some("cocos-vm"));
    }
}
