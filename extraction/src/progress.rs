//! Progress Bus (C10) - a thread-safe, multi-job progress log with file
//! persistence, matching §4.10's event model: a job moves through named
//! phases, each phase accumulates timestamped log lines, and the whole
//! thing survives a process restart by being flushed to disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{ExtractionError, Result};
use crate::types::progress::{
    JobProgress, JobStatus, PhaseProgress, PhaseStatus, DEFAULT_MAX_JOBS, DEFAULT_STALE_JOB_MINUTES,
};

/// Mutex-guarded in-process store of every job's [`JobProgress`], with
/// optional file persistence so a restarted process can recover job history.
pub struct ProgressBus {
    jobs: Mutex<HashMap<String, JobProgress>>,
    persist_path: Option<PathBuf>,
    max_jobs: usize,
    stale_after: chrono::Duration,
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            persist_path: None,
            max_jobs: DEFAULT_MAX_JOBS,
            stale_after: chrono::Duration::minutes(DEFAULT_STALE_JOB_MINUTES),
        }
    }
}

impl ProgressBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist to `path` after every mutation, loading any existing history
    /// from it first.
    pub fn with_persist_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut bus = Self {
            persist_path: Some(path.clone()),
            ..Self::default()
        };
        bus.load_from_disk(&path)?;
        Ok(bus)
    }

    pub fn with_max_jobs(mut self, max_jobs: usize) -> Self {
        self.max_jobs = max_jobs;
        self
    }

    pub fn with_stale_after(mut self, duration: chrono::Duration) -> Self {
        self.stale_after = duration;
        self
    }

    fn load_from_disk(&mut self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ExtractionError::Storage(Box::new(e)))?;
        if contents.trim().is_empty() {
            return Ok(());
        }
        let jobs: HashMap<String, JobProgress> =
            serde_json::from_str(&contents).map_err(ExtractionError::JsonParse)?;
        *self.jobs.lock().unwrap() = jobs;
        Ok(())
    }

    /// Write every job to `persist_path` via a write-to-temp-then-rename, so
    /// a crash mid-write never corrupts the file readers recover from.
    fn flush(&self, jobs: &HashMap<String, JobProgress>) -> Result<()> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        let serialized = serde_json::to_string_pretty(jobs).map_err(ExtractionError::JsonParse)?;
        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, serialized).map_err(|e| ExtractionError::Storage(Box::new(e)))?;
        std::fs::rename(&tmp_path, path).map_err(|e| ExtractionError::Storage(Box::new(e)))?;
        Ok(())
    }

    /// Begin tracking a new job, evicting the oldest completed/failed job if
    /// `max_jobs` would otherwise be exceeded.
    pub fn start_job(&self, job_id: impl Into<String>, company_name: impl Into<String>) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job_id = job_id.into();
        jobs.insert(job_id.clone(), JobProgress::new(job_id, company_name));
        evict_if_over_capacity(&mut jobs, self.max_jobs);
        self.flush(&jobs)
    }

    /// Open a new phase for `job_id`, leaving any prior open phase as-is
    /// (the coordinator is responsible for closing phases in order).
    pub fn start_phase(&self, job_id: &str, phase_name: impl Into<String>) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let phase_name = phase_name.into();
        let job = get_job_mut(&mut jobs, job_id)?;
        job.push_log(format!("starting {phase_name}"));
        job.phases.push(PhaseProgress::start(phase_name));
        self.flush(&jobs)
    }

    /// Close the most recently opened phase matching `phase_name` as
    /// `status`, computing its duration.
    pub fn end_phase(&self, job_id: &str, phase_name: &str, status: PhaseStatus) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = get_job_mut(&mut jobs, job_id)?;
        if let Some(phase) = job.phases.iter_mut().rev().find(|p| p.name == phase_name) {
            let now = chrono::Utc::now();
            phase.status = status;
            phase.duration_secs = Some((now - phase.started_at).num_milliseconds() as f64 / 1000.0);
            phase.ended_at = Some(now);
        }
        let verb = if status == PhaseStatus::Completed { "completed" } else { "failed" };
        job.push_log(format!("{phase_name} {verb}"));
        self.flush(&jobs)
    }

    /// Attach a key/value detail to the most recently opened phase matching
    /// `phase_name` (e.g. `pages_found`, `urls_selected`).
    pub fn set_phase_detail(
        &self,
        job_id: &str,
        phase_name: &str,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = get_job_mut(&mut jobs, job_id)?;
        if let Some(phase) = job.phases.iter_mut().rev().find(|p| p.name == phase_name) {
            phase.details.insert(key.into(), value.into());
        }
        self.flush(&jobs)
    }

    /// Append a free-form log line to the job's history.
    pub fn log(&self, job_id: &str, message: impl Into<String>) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = get_job_mut(&mut jobs, job_id)?;
        job.push_log(message);
        self.flush(&jobs)
    }

    /// Record that a page was scraped, for progress narration.
    pub fn record_page_scrape(&self, job_id: &str, url: &str, success: bool) -> Result<()> {
        let message = if success {
            format!("scraped {url}")
        } else {
            format!("failed to scrape {url}")
        };
        self.log(job_id, message)
    }

    /// Record that an LLM call completed, for progress narration.
    pub fn record_llm_call(&self, job_id: &str, purpose: &str, success: bool) -> Result<()> {
        let message = if success {
            format!("{purpose}: LLM call succeeded")
        } else {
            format!("{purpose}: LLM call failed, falling back")
        };
        self.log(job_id, message)
    }

    /// Mark a job done: `Completed` with a summary, or `Failed` with an
    /// error, matching §4.11's terminal states.
    pub fn complete_job(&self, job_id: &str, outcome: JobOutcome) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = get_job_mut(&mut jobs, job_id)?;
        job.ended_at = Some(chrono::Utc::now());
        match outcome {
            JobOutcome::Completed(summary) => {
                job.status = JobStatus::Completed;
                job.result_summary = Some(summary);
                job.push_log("research complete");
            }
            JobOutcome::Failed(error) => {
                job.status = JobStatus::Failed;
                job.error = Some(error.clone());
                job.push_log(format!("research failed: {error}"));
            }
        }
        self.flush(&jobs)
    }

    pub fn get(&self, job_id: &str) -> Option<JobProgress> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.get_mut(job_id) {
            if job.sweep_if_stale(self.stale_after) {
                let _ = self.flush(&jobs);
            }
        }
        jobs.get(job_id).cloned()
    }

    /// All jobs with `Running` status, most-recently-started first.
    ///
    /// Sweeps stale jobs before reading, so a job whose phase stalled out
    /// never shows as `running` forever.
    pub fn get_current(&self) -> Vec<JobProgress> {
        self.sweep_on_read();
        let jobs = self.jobs.lock().unwrap();
        let mut running: Vec<JobProgress> = jobs
            .values()
            .filter(|j| j.status == JobStatus::Running)
            .cloned()
            .collect();
        running.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        running
    }

    /// Every tracked job, most-recently-started first.
    pub fn get_all(&self) -> Vec<JobProgress> {
        self.sweep_on_read();
        let jobs = self.jobs.lock().unwrap();
        let mut all: Vec<JobProgress> = jobs.values().cloned().collect();
        all.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        all
    }

    /// Sweep every `Running` job older than `stale_after` to `Failed`.
    /// Returns the job ids that were swept.
    pub fn sweep_stale(&self) -> Result<Vec<String>> {
        let mut jobs = self.jobs.lock().unwrap();
        let stale_after = self.stale_after;
        let swept: Vec<String> = jobs
            .iter_mut()
            .filter(|(_, job)| job.sweep_if_stale(stale_after))
            .map(|(id, _)| id.clone())
            .collect();
        if !swept.is_empty() {
            self.flush(&jobs)?;
        }
        Ok(swept)
    }

    /// Best-effort sweep used by read paths; swallows persistence errors
    /// since a failed flush shouldn't block a read of in-memory state.
    fn sweep_on_read(&self) {
        let _ = self.sweep_stale();
    }
}

/// Terminal outcome passed to [`ProgressBus::complete_job`].
pub enum JobOutcome {
    Completed(String),
    Failed(String),
}

fn get_job_mut<'a>(jobs: &'a mut HashMap<String, JobProgress>, job_id: &str) -> Result<&'a mut JobProgress> {
    jobs.get_mut(job_id)
        .ok_or_else(|| ExtractionError::InvalidQuery { reason: format!("unknown job: {job_id}") })
}

/// Evict the oldest non-`Running` jobs until `jobs.len() <= max_jobs`.
/// Never evicts a `Running` job, even past the cap.
fn evict_if_over_capacity(jobs: &mut HashMap<String, JobProgress>, max_jobs: usize) {
    if jobs.len() <= max_jobs {
        return;
    }
    let mut evictable: Vec<(String, chrono::DateTime<chrono::Utc>)> = jobs
        .iter()
        .filter(|(_, job)| job.status != JobStatus::Running)
        .map(|(id, job)| (id.clone(), job.started_at))
        .collect();
    evictable.sort_by_key(|(_, started_at)| *started_at);

    let excess = jobs.len() - max_jobs;
    for (id, _) in evictable.into_iter().take(excess) {
        jobs.remove(&id);
    }
}
