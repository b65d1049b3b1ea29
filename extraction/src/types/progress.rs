//! Job progress types for the progress bus (C10).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Overall status of a research job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

/// Status of a single phase within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Running,
    Completed,
    Failed,
}

/// Most-recent-N cap on a job's processing log, matching the original
/// implementation's 50-entry cap.
pub const MAX_LOG_ENTRIES: usize = 50;

/// Default maximum age of a `running` job before it is swept to `failed`.
pub const DEFAULT_STALE_JOB_MINUTES: i64 = 15;

/// Default cap on total retained jobs (running + completed + failed).
pub const DEFAULT_MAX_JOBS: usize = 50;

/// One phase's recorded lifecycle within a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseProgress {
    pub name: String,
    pub status: PhaseStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Duration in seconds, computed once the phase leaves `running`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    #[serde(default)]
    pub details: std::collections::HashMap<String, String>,
}

impl PhaseProgress {
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: PhaseStatus::Running,
            started_at: Utc::now(),
            ended_at: None,
            duration_secs: None,
            details: std::collections::HashMap::new(),
        }
    }
}

/// Per-research-invocation log owned by the progress bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProgress {
    pub job_id: String,
    pub company_name: String,
    pub status: JobStatus,
    pub phases: Vec<PhaseProgress>,
    /// Append-only, most-recent-`MAX_LOG_ENTRIES` timestamped messages.
    pub log: Vec<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_summary: Option<String>,
}

impl JobProgress {
    pub fn new(job_id: impl Into<String>, company_name: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            company_name: company_name.into(),
            status: JobStatus::Running,
            phases: Vec::new(),
            log: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
            error: None,
            result_summary: None,
        }
    }

    /// Push a log line, capping the log at `MAX_LOG_ENTRIES` most-recent
    /// entries and deduplicating an immediate repeat of the last message.
    pub fn push_log(&mut self, message: impl Into<String>) {
        let message = message.into();
        let timestamped = format!("{} - {}", Utc::now().format("%I:%M:%S %p"), message);

        if self.log.last().is_some_and(|last| last.ends_with(&message)) {
            return;
        }

        self.log.push(timestamped);
        if self.log.len() > MAX_LOG_ENTRIES {
            let excess = self.log.len() - MAX_LOG_ENTRIES;
            self.log.drain(0..excess);
        }
    }

    /// Mark a job `running` longer than `max_age` as failed due to timeout.
    pub fn sweep_if_stale(&mut self, max_age: chrono::Duration) -> bool {
        if self.status != JobStatus::Running {
            return false;
        }
        if Utc::now() - self.started_at <= max_age {
            return false;
        }
        self.status = JobStatus::Failed;
        self.error = Some(format!(
            "Job timed out after {} minutes",
            max_age.num_minutes()
        ));
        self.ended_at = Some(Utc::now());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_cap() {
        let mut job = JobProgress::new("job_1", "Acme");
        for i in 0..(MAX_LOG_ENTRIES + 10) {
            job.push_log(format!("event {i}"));
        }
        assert_eq!(job.log.len(), MAX_LOG_ENTRIES);
        assert!(job.log.last().unwrap().contains(&format!("event {}", MAX_LOG_ENTRIES + 9)));
    }

    #[test]
    fn test_log_dedups_consecutive() {
        let mut job = JobProgress::new("job_1", "Acme");
        job.push_log("fetching page");
        job.push_log("fetching page");
        assert_eq!(job.log.len(), 1);
    }

    #[test]
    fn test_sweep_stale() {
        let mut job = JobProgress::new("job_1", "Acme");
        job.started_at = Utc::now() - chrono::Duration::minutes(20);
        let swept = job.sweep_if_stale(chrono::Duration::minutes(DEFAULT_STALE_JOB_MINUTES));
        assert!(swept);
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[test]
    fn test_sweep_not_yet_stale() {
        let mut job = JobProgress::new("job_1", "Acme");
        let swept = job.sweep_if_stale(chrono::Duration::minutes(DEFAULT_STALE_JOB_MINUTES));
        assert!(!swept);
        assert_eq!(job.status, JobStatus::Running);
    }
}
