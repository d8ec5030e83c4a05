//! Job execution entity for scraping runs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Errors kept per execution; older entries are dropped past this bound
const MAX_ERRORS: usize = 100;

/// Job status enum
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

/// One recorded per-PDF failure
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobError {
    #[serde(default)]
    pub url: Option<String>,
    pub message: String,
    pub retry_count: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_critical: bool,
}

/// Summary written when a run completes
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResultSummary {
    pub total: u32,
    pub processed: u32,
    pub failed: u32,
    pub success_rate: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobExecution {
    pub id: String,
    /// Source tag plus trigger kind, e.g. "cnpq_scraping_manual"
    pub job_name: String,
    pub status: JobStatus,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    /// 0..=100, monotonically non-decreasing within a run
    pub progress: f64,
    pub total: u32,
    pub processed: u32,
    pub failed_count: u32,
    #[serde(default)]
    pub errors: Vec<JobError>,
    #[serde(default)]
    pub result_summary: Option<ResultSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobExecution {
    /// Create a fresh pending execution
    pub fn create(job_name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            job_name: job_name.to_string(),
            status: JobStatus::Pending,
            started_at: None,
            finished_at: None,
            progress: 0.0,
            total: 0,
            processed: 0,
            failed_count: 0,
            errors: Vec::new(),
            result_summary: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark the job as started
    pub fn start(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
        self.progress = 0.0;
        self.updated_at = Utc::now();
    }

    /// Update counters; progress never decreases within a run even when the
    /// total grows as detail pages are discovered
    pub fn update_progress(&mut self, processed: u32, total: u32) {
        self.processed = processed;
        self.total = total;
        let pct = if total > 0 {
            processed as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        self.progress = self.progress.max(pct);
        self.updated_at = Utc::now();
    }

    /// Record a per-PDF failure and keep going
    pub fn add_error(&mut self, url: &str, message: &str, retry_count: u32) {
        self.errors.push(JobError {
            url: Some(url.to_string()),
            message: message.to_string(),
            retry_count,
            timestamp: Utc::now(),
            is_critical: false,
        });
        if self.errors.len() > MAX_ERRORS {
            self.errors.remove(0);
        }
        self.failed_count += 1;
        self.updated_at = Utc::now();
    }

    /// Mark the job as completed
    pub fn complete(&mut self) {
        self.status = JobStatus::Completed;
        self.finished_at = Some(Utc::now());
        self.progress = 100.0;
        self.result_summary = Some(ResultSummary {
            total: self.total,
            processed: self.processed,
            failed: self.failed_count,
            success_rate: if self.total > 0 {
                self.processed as f64 / self.total as f64 * 100.0
            } else {
                0.0
            },
        });
        self.updated_at = Utc::now();
    }

    /// Mark the job as failed with a critical error
    pub fn fail(&mut self, message: &str) {
        self.status = JobStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.errors.push(JobError {
            url: None,
            message: message.to_string(),
            retry_count: 0,
            timestamp: Utc::now(),
            is_critical: true,
        });
        self.updated_at = Utc::now();
    }

    /// Mark the job as cancelled
    pub fn cancel(&mut self) {
        self.status = JobStatus::Cancelled;
        self.finished_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    pub fn is_running(&self) -> bool {
        self.status == JobStatus::Running
    }

    /// Check if the job is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let mut job = JobExecution::create("cnpq_scraping_manual");
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.started_at.is_none());

        job.start();
        assert!(job.is_running());
        assert!(job.started_at.is_some());

        job.update_progress(1, 2);
        assert_eq!(job.progress, 50.0);

        job.complete();
        assert!(job.is_terminal());
        assert_eq!(job.progress, 100.0);
        assert!(job.finished_at.is_some());
        let summary = job.result_summary.unwrap();
        assert_eq!(summary.processed, 1);
    }

    #[test]
    fn test_progress_is_monotonic_with_growing_total() {
        let mut job = JobExecution::create("confap_scraping_manual");
        job.start();

        // 2 of 4 PDFs known so far
        job.update_progress(2, 4);
        assert_eq!(job.progress, 50.0);

        // A detail page revealed 4 more PDFs; the raw ratio drops but the
        // reported progress must not
        job.update_progress(2, 8);
        assert_eq!(job.progress, 50.0);

        job.update_progress(6, 8);
        assert_eq!(job.progress, 75.0);
    }

    #[test]
    fn test_error_accounting_invariant() {
        let mut job = JobExecution::create("fapesq_scraping_manual");
        job.start();
        job.update_progress(0, 3);

        job.add_error("https://fapesq.rpp.br/edital-1.pdf", "Malformed PDF", 0);
        job.update_progress(2, 3);

        assert_eq!(job.failed_count, 1);
        assert!(job.processed + job.failed_count <= job.total);
        assert_eq!(job.errors.len(), 1);
        assert!(!job.errors[0].is_critical);
    }

    #[test]
    fn test_fail_appends_critical_error() {
        let mut job = JobExecution::create("finep_scraping_scheduled");
        job.start();
        job.fail("listing page unreachable");

        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.finished_at.is_some());
        assert!(job.errors.last().unwrap().is_critical);
    }

    #[test]
    fn test_cancel_is_terminal_not_failed() {
        let mut job = JobExecution::create("capes_scraping_manual");
        job.start();
        job.cancel();

        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.is_terminal());
        assert!(job.finished_at.is_some());
        assert_eq!(job.failed_count, 0);
    }

    #[test]
    fn test_errors_are_bounded() {
        let mut job = JobExecution::create("cnpq_scraping_manual");
        for i in 0..150 {
            job.add_error(&format!("https://example.org/{i}.pdf"), "timeout", 3);
        }
        assert_eq!(job.errors.len(), MAX_ERRORS);
        assert_eq!(job.failed_count, 150);
    }
}
