//! Per-request conversion job record and status transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Which converter a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionKind {
    Svg,
    Markdown,
}

impl fmt::Display for ConversionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionKind::Svg => write!(f, "svg"),
            ConversionKind::Markdown => write!(f, "markdown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Complete,
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Complete => write!(f, "complete"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One conversion request from receipt to response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionJob {
    pub job_id: String,
    pub kind: ConversionKind,
    pub file_name: Option<String>,
    pub input_bytes: usize,
    pub status: JobStatus,
    pub output_bytes: Option<usize>,
    pub pages: Option<usize>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl ConversionJob {
    pub fn new(kind: ConversionKind, file_name: Option<String>, input_bytes: usize) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4().to_string(),
            kind,
            file_name,
            input_bytes,
            status: JobStatus::Pending,
            output_bytes: None,
            pages: None,
            created_at: now,
            updated_at: now,
            error: None,
        }
    }

    pub fn start_processing(&mut self) {
        self.status = JobStatus::Processing;
        self.updated_at = Utc::now();
    }

    pub fn mark_complete(&mut self, output_bytes: usize, pages: Option<usize>) {
        self.status = JobStatus::Complete;
        self.updated_at = Utc::now();
        self.output_bytes = Some(output_bytes);
        self.pages = pages;
        self.error = None;
    }

    pub fn mark_failed(&mut self, error: String) {
        self.status = JobStatus::Failed;
        self.updated_at = Utc::now();
        self.error = Some(error);
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status, JobStatus::Complete | JobStatus::Failed)
    }

    pub fn processing_duration_ms(&self) -> Option<i64> {
        if self.is_finished() {
            Some(
                self.updated_at
                    .signed_duration_since(self.created_at)
                    .num_milliseconds(),
            )
        } else {
            None
        }
    }
}
