//! Job record and lifecycle state.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{ModelError, ModelResult};
use crate::input::JobInput;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identity of a worker loop instance holding a lease.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct WorkerId(pub String);

impl WorkerId {
    /// Generate a worker ID with the given prefix, e.g. `worker-3f2a...`.
    pub fn generate(prefix: &str) -> Self {
        Self(format!("{}-{}", prefix, Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for WorkerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Job lifecycle status.
///
/// Transitions only move forward: `pending -> processing -> completed | failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Parse the stored string form.
    pub fn parse(s: &str) -> ModelResult<Self> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(ModelError::UnknownStatus(other.to_string())),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether moving from `self` to `next` is a legal forward transition.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Time-bounded ownership of a `processing` job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Lease {
    /// Worker instance that holds the claim
    pub owner: WorkerId,
    /// When the lease lapses unless renewed
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// One render request and its lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Current status
    pub status: JobStatus,

    /// Immutable request payload
    pub input: JobInput,

    /// Produced media reference (completed jobs only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_ref: Option<String>,

    /// Failure message (failed jobs only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Claim holder (processing jobs only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease: Option<Lease>,

    /// Number of claims and reclaims so far
    #[serde(default)]
    pub attempts: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(input: JobInput) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            status: JobStatus::Pending,
            input,
            output_ref: None,
            error: None,
            lease: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the job is processing under a lease that has lapsed.
    pub fn is_lease_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Processing
            && self.lease.as_ref().map(|l| l.is_expired(now)).unwrap_or(true)
    }

    /// Whether `owner` currently holds this job's lease.
    pub fn is_owned_by(&self, owner: &WorkerId) -> bool {
        self.lease.as_ref().map(|l| &l.owner == owner).unwrap_or(false)
    }

    /// Check the status/field invariants of a decoded job row.
    pub fn check_consistency(&self) -> ModelResult<()> {
        let inconsistent = |reason: &str| {
            Err(ModelError::Inconsistent {
                job_id: self.id.to_string(),
                reason: reason.to_string(),
            })
        };

        match self.status {
            JobStatus::Completed => {
                if self.output_ref.is_none() {
                    return inconsistent("completed job without output reference");
                }
                if self.error.is_some() {
                    return inconsistent("completed job carries an error");
                }
            }
            JobStatus::Failed => {
                if self.error.is_none() {
                    return inconsistent("failed job without error message");
                }
                if self.output_ref.is_some() {
                    return inconsistent("failed job carries an output reference");
                }
            }
            JobStatus::Pending | JobStatus::Processing => {
                if self.output_ref.is_some() || self.error.is_some() {
                    return inconsistent("non-terminal job carries a terminal field");
                }
            }
        }

        match (self.status, &self.lease) {
            (JobStatus::Processing, None) => inconsistent("processing job without lease"),
            (JobStatus::Processing, Some(_)) | (_, None) => Ok(()),
            (_, Some(_)) => inconsistent("lease held outside processing"),
        }
    }
}
