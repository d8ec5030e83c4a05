//! Job orchestrator
//!
//! Creates execution records, runs one scraping job per trigger as a
//! background task, tracks progress, and supports cooperative cancellation
//! checked between PDFs. At most one job runs per source at a time; each
//! running job's document is mutated only by the task driving it.

pub mod scheduler;

use crate::fetcher::HttpFetcher;
use crate::processor::{EditalProcessor, ProcessOutcome};
use crate::sources::{adapter_for, SourceAdapter, SourceTag};
use fomentos_common::db::models::{JobExecution, JobStatus};
use fomentos_common::db::Repository;
use fomentos_common::errors::{AppError, Result};
use fomentos_common::metrics::JobTimer;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};

/// How a run was started; part of the job name
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    Manual,
    Scheduled,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Manual => f.write_str("manual"),
            Trigger::Scheduled => f.write_str("scheduled"),
        }
    }
}

/// In-memory view of what is currently running
#[derive(Default)]
struct RunningState {
    /// job id → cancellation flag
    cancel_flags: HashMap<String, Arc<AtomicBool>>,
    /// sources with a live run; guards the at-most-one-per-source rule
    busy_sources: HashSet<SourceTag>,
}

pub struct JobOrchestrator {
    repo: Repository,
    fetcher: Arc<HttpFetcher>,
    processor: Arc<EditalProcessor>,
    running: Mutex<RunningState>,
    pdf_processing_delay: Duration,
}

impl JobOrchestrator {
    pub fn new(
        repo: Repository,
        fetcher: Arc<HttpFetcher>,
        processor: Arc<EditalProcessor>,
        pdf_processing_delay: Duration,
    ) -> Self {
        Self {
            repo,
            fetcher,
            processor,
            running: Mutex::new(RunningState::default()),
            pdf_processing_delay,
        }
    }

    /// Start a manual run for a source. Fails while the source already has
    /// a live run.
    pub async fn execute_now(
        self: Arc<Self>,
        source: SourceTag,
        filter_by_date: bool,
    ) -> Result<String> {
        self.launch(source, filter_by_date, Trigger::Manual).await
    }

    /// Cron entry point: a busy source is skipped, not an error
    pub async fn execute_scheduled(self: Arc<Self>, source: SourceTag, filter_by_date: bool) {
        match self.launch(source, filter_by_date, Trigger::Scheduled).await {
            Ok(job_id) => info!(%source, %job_id, "Scheduled job launched"),
            Err(AppError::JobAlreadyRunning { .. }) => {
                warn!(%source, "Scheduled trigger skipped: source already running")
            }
            Err(e) => error!(%source, error = %e, "Scheduled trigger failed"),
        }
    }

    async fn launch(
        self: Arc<Self>,
        source: SourceTag,
        filter_by_date: bool,
        trigger: Trigger,
    ) -> Result<String> {
        // Reserve the source before any await so two simultaneous starts
        // cannot both pass the check
        {
            let mut state = self.running.lock().expect("running state poisoned");
            if !state.busy_sources.insert(source) {
                return Err(AppError::JobAlreadyRunning {
                    source_name: source.as_str().to_string(),
                });
            }
        }

        let job = JobExecution::create(&format!("{}_scraping_{}", source, trigger));
        let job_id = job.id.clone();

        if let Err(e) = self.repo.create_job(&job).await {
            let mut state = self.running.lock().expect("running state poisoned");
            state.busy_sources.remove(&source);
            return Err(e);
        }

        let cancel_flag = Arc::new(AtomicBool::new(false));
        {
            let mut state = self.running.lock().expect("running state poisoned");
            state.cancel_flags.insert(job_id.clone(), cancel_flag.clone());
        }

        let orchestrator = Arc::clone(&self);
        let spawned_id = job_id.clone();
        tokio::spawn(async move {
            orchestrator
                .run_job(spawned_id, source, filter_by_date, cancel_flag)
                .await;
        });

        info!(%source, %job_id, %trigger, filter_by_date, "Job launched");
        Ok(job_id)
    }

    /// Cooperative cancel: flips the flag; the run loop notices between
    /// PDFs and persists the terminal status itself.
    pub fn cancel(&self, job_id: &str) -> bool {
        let state = self.running.lock().expect("running state poisoned");
        match state.cancel_flags.get(job_id) {
            Some(flag) => {
                flag.store(true, Ordering::SeqCst);
                info!(job_id, "Cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Whether a job id is currently tracked as running
    pub fn is_running(&self, job_id: &str) -> bool {
        let state = self.running.lock().expect("running state poisoned");
        state.cancel_flags.contains_key(job_id)
    }

    async fn run_job(
        self: Arc<Self>,
        job_id: String,
        source: SourceTag,
        filter_by_date: bool,
        cancel_flag: Arc<AtomicBool>,
    ) {
        let timer = JobTimer::start(source.as_str());

        let status = match self
            .run_job_inner(&job_id, source, filter_by_date, &cancel_flag)
            .await
        {
            Ok(status) => status,
            Err(e) => {
                // Only failures escaping the per-PDF handling land here
                error!(%job_id, %source, error = %e, "Critical job failure");
                if let Ok(Some(mut job)) = self.repo.find_job_by_id(&job_id).await {
                    job.fail(&e.to_string());
                    if let Err(persist_err) = self.repo.update_job(&job).await {
                        error!(%job_id, error = %persist_err, "Failed to persist job failure");
                    }
                }
                JobStatus::Failed
            }
        };

        timer.finish(status.as_str());

        let mut state = self.running.lock().expect("running state poisoned");
        state.cancel_flags.remove(&job_id);
        state.busy_sources.remove(&source);
    }

    async fn run_job_inner(
        &self,
        job_id: &str,
        source: SourceTag,
        filter_by_date: bool,
        cancel_flag: &AtomicBool,
    ) -> Result<JobStatus> {
        let Some(mut job) = self.repo.find_job_by_id(job_id).await? else {
            warn!(job_id, "Job record vanished before start");
            return Ok(JobStatus::Failed);
        };

        job.start();
        self.repo.update_job(&job).await?;

        let adapter = adapter_for(source);
        info!(%source, filter_by_date, "Listing calls");

        // A listing failure fails the whole job; no PDFs are processed
        let calls = adapter.list_calls(&self.fetcher, filter_by_date).await?;

        let mut total: u32 = if adapter.flat_listing() {
            calls.iter().map(|c| c.pdf_urls.len() as u32).sum()
        } else {
            0
        };
        let mut processed: u32 = 0;

        job.update_progress(processed, total);
        self.repo.update_job(&job).await?;

        let mut cancelled = false;

        'calls: for call in &calls {
            if cancel_flag.load(Ordering::SeqCst) {
                cancelled = true;
                break 'calls;
            }

            let pdf_urls = if adapter.flat_listing() {
                call.pdf_urls.clone()
            } else {
                // Detail-page expansion; the total grows as calls resolve.
                // A call that fails or yields nothing still occupies one
                // unit of work, keeping processed + failed_count <= total
                match adapter.list_pdfs(&self.fetcher, call).await {
                    Ok(urls) if urls.is_empty() => {
                        warn!(call_url = %call.url, "No PDFs found for call");
                        total += 1;
                        job.add_error(&call.url, "no download links found", 0);
                        job.update_progress(processed, total);
                        self.repo.update_job(&job).await?;
                        continue;
                    }
                    Ok(urls) => {
                        total += urls.len() as u32;
                        job.update_progress(processed, total);
                        self.repo.update_job(&job).await?;
                        urls
                    }
                    Err(e) => {
                        warn!(call_url = %call.url, error = %e, "Detail page failed");
                        total += 1;
                        job.add_error(&call.url, &e.to_string(), 0);
                        job.update_progress(processed, total);
                        self.repo.update_job(&job).await?;
                        continue;
                    }
                }
            };

            let metadata = adapter.metadata(call);

            for pdf_url in pdf_urls {
                // Cancellation is checked between PDFs, never mid-chunk
                if cancel_flag.load(Ordering::SeqCst) {
                    cancelled = true;
                    break 'calls;
                }

                info!(%source, %pdf_url, "Processing PDF");

                match self.processor.process_pdf(&pdf_url, &metadata, source).await {
                    Ok(ProcessOutcome::Processed { edital_uuid }) => {
                        processed += 1;
                        info!(%pdf_url, %edital_uuid, "PDF ingested");
                    }
                    Ok(ProcessOutcome::SkippedDuplicate { edital_uuid }) => {
                        processed += 1;
                        info!(%pdf_url, %edital_uuid, "PDF already ingested, skipped");
                    }
                    Err(e) => {
                        warn!(%pdf_url, error = %e, "PDF failed");
                        job.add_error(&pdf_url, &e.to_string(), 0);
                    }
                }

                job.update_progress(processed, total);
                self.repo.update_job(&job).await?;

                // Bounds the outbound request rate for this source
                tokio::time::sleep(self.pdf_processing_delay).await;
            }
        }

        let status = if cancelled {
            info!(job_id, %source, "Job cancelled by user");
            job.cancel();
            JobStatus::Cancelled
        } else {
            job.complete();
            info!(
                job_id,
                %source,
                processed = job.processed,
                total = job.total,
                failed = job.failed_count,
                "Job completed"
            );
            JobStatus::Completed
        };

        self.repo.update_job(&job).await?;
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_display() {
        assert_eq!(Trigger::Manual.to_string(), "manual");
        assert_eq!(Trigger::Scheduled.to_string(), "scheduled");
    }

    #[test]
    fn test_job_name_shape() {
        let name = format!("{}_scraping_{}", SourceTag::Cnpq, Trigger::Manual);
        assert_eq!(name, "cnpq_scraping_manual");
    }
}
