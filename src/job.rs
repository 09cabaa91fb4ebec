//! Packing job records and their status machine.
//!
//! `pending -> running -> {completed, failed}`; a pending job may also fail
//! directly when its request cannot be resolved. Terminal fields are written
//! once.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::api::PackResponse;
use crate::config::AlgorithmConfig;
use crate::error::{JobError, PackingError};
use crate::model::Vehicle;

pub type JobId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    fn can_become(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }
}

/// One packing request and its outcome.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PackingJob {
    pub id: JobId,
    /// Absent when the request carried no vehicle.
    pub vehicle: Option<Vehicle>,
    pub status: JobStatus,
    pub config: AlgorithmConfig,
    pub response: Option<PackResponse>,
    pub error: Option<String>,
    pub error_code: Option<String>,
    /// SHA-256 of the normalized request.
    pub fingerprint: String,
    /// The response came from the result cache.
    pub from_cache: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PackingJob {
    pub fn new(id: JobId, vehicle: Option<Vehicle>, config: AlgorithmConfig, fingerprint: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            vehicle,
            status: JobStatus::Pending,
            config,
            response: None,
            error: None,
            error_code: None,
            fingerprint,
            from_cache: false,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    fn transition(&mut self, next: JobStatus) -> Result<DateTime<Utc>, JobError> {
        if !self.status.can_become(next) {
            return Err(JobError::InvalidTransition {
                id: self.id,
                from: self.status.as_str(),
                to: next.as_str(),
            });
        }
        let now = Utc::now();
        self.status = next;
        self.updated_at = now;
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        Ok(now)
    }

    pub fn start(&mut self) -> Result<(), JobError> {
        self.transition(JobStatus::Running).map(|_| ())
    }

    /// Stores the response of a finished run.
    pub fn complete(&mut self, response: PackResponse, from_cache: bool) -> Result<(), JobError> {
        self.transition(JobStatus::Completed)?;
        self.response = Some(response);
        self.from_cache = from_cache;
        Ok(())
    }

    /// Records a run-scoped failure; a failed job has no placements.
    pub fn fail(&mut self, err: &PackingError) -> Result<(), JobError> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(err.to_string());
        self.error_code = Some(err.code().to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> PackingJob {
        PackingJob::new(7, Some(Vehicle::euroliner()), AlgorithmConfig::default(), "abc".into())
    }

    #[test]
    fn happy_path_sets_terminal_fields() {
        let mut job = job();
        assert_eq!(job.status, JobStatus::Pending);
        job.start().unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.completed_at.is_none());

        job.fail(&PackingError::Cancelled).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_code.as_deref(), Some("cancelled"));
        assert!(job.completed_at.is_some());
        assert!(job.response.is_none());
    }

    #[test]
    fn terminal_jobs_do_not_move() {
        let mut job = job();
        job.fail(&PackingError::EmptyRequest).unwrap();
        let first_completion = job.completed_at;

        let err = job.start().unwrap_err();
        assert_eq!(
            err,
            JobError::InvalidTransition {
                id: 7,
                from: "failed",
                to: "running"
            }
        );
        assert!(job.fail(&PackingError::Cancelled).is_err());
        assert_eq!(job.completed_at, first_completion);
        assert_eq!(job.error_code.as_deref(), Some("empty_request"));
    }

    #[test]
    fn pending_jobs_cannot_complete() {
        let mut job = job();
        assert!(job.transition(JobStatus::Completed).is_err());
        assert_eq!(job.status, JobStatus::Pending);
    }
}
