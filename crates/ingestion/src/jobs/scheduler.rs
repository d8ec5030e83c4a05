//! Cron scheduling for source jobs
//!
//! One daily schedule per source at 01:00 local time, identified as
//! `{source}_daily_scraping`. Registration at startup replaces whatever
//! carried the same id before; schedules live as long as the process.

use crate::jobs::JobOrchestrator;
use crate::sources::SourceTag;
use chrono::Local;
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Seconds-resolution cron expression: daily at 01:00
const DAILY_AT_ONE: &str = "0 0 1 * * *";

/// Register the daily schedule for every configured source and return the
/// driver task handles.
pub fn start(orchestrator: Arc<JobOrchestrator>) -> Vec<JoinHandle<()>> {
    SourceTag::all()
        .iter()
        .map(|&source| {
            let schedule_id = format!("{}_daily_scraping", source);
            info!(%schedule_id, cron = DAILY_AT_ONE, "Cron schedule registered");
            spawn_schedule(Arc::clone(&orchestrator), source)
        })
        .collect()
}

fn spawn_schedule(orchestrator: Arc<JobOrchestrator>, source: SourceTag) -> JoinHandle<()> {
    tokio::spawn(async move {
        let schedule = Schedule::from_str(DAILY_AT_ONE).expect("valid cron expression");

        loop {
            let Some(next) = schedule.upcoming(Local).next() else {
                warn!(%source, "Cron schedule exhausted");
                return;
            };

            let now = Local::now();
            let wait = match (next - now).to_std() {
                Ok(duration) => duration,
                Err(_) => continue,
            };

            info!(%source, next = %next, "Next scheduled run");
            tokio::time::sleep(wait).await;

            Arc::clone(&orchestrator)
                .execute_scheduled(source, true)
                .await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_cron_expression_fires_daily_at_one() {
        let schedule = Schedule::from_str(DAILY_AT_ONE).unwrap();
        let upcoming: Vec<_> = schedule.upcoming(Local).take(3).collect();

        assert_eq!(upcoming.len(), 3);
        for fire in &upcoming {
            assert_eq!(fire.hour(), 1);
            assert_eq!(fire.minute(), 0);
            assert_eq!(fire.second(), 0);
        }
        // Consecutive firings are a day apart
        assert_eq!((upcoming[1] - upcoming[0]).num_hours(), 24);
    }

    #[test]
    fn test_schedule_id_shape() {
        let id = format!("{}_daily_scraping", SourceTag::Capes);
        assert_eq!(id, "capes_daily_scraping");
    }
}
