use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::ingest::{Ingestor, PassOutcome};

/// Run an ingestion pass now and then every `interval` on a background task.
pub fn spawn_scheduler(ingestor: Arc<Ingestor>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // The first tick completes immediately.
            ticker.tick().await;
            info!("Starting scheduled ingestion pass");
            match ingestor.run_pass().await {
                Ok(PassOutcome::Completed(report)) => {
                    info!("Scheduled pass added {} new articles", report.inserted);
                }
                Ok(PassOutcome::AlreadyRunning) => {
                    info!("Previous pass still running, skipping this tick");
                }
                Err(e) => error!("Scheduled ingestion pass failed: {:#}", e),
            }
        }
    })
}

pub fn interval_from_minutes(minutes: u64) -> Duration {
    Duration::from_secs(minutes.max(1) * 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::Database;

    #[test]
    fn test_interval_from_minutes() {
        assert_eq!(interval_from_minutes(10), Duration::from_secs(600));
        assert_eq!(interval_from_minutes(0), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_first_pass_runs_immediately() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        db.initialize().await.unwrap();
        let ingestor = Arc::new(Ingestor::from_config(Arc::new(db), &Config::default()).unwrap());

        let handle = spawn_scheduler(ingestor.clone(), interval_from_minutes(10));

        let mut report = None;
        for _ in 0..50 {
            report = ingestor.last_report().await;
            if report.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        handle.abort();

        let report = report.expect("scheduler should run a pass at startup");
        assert_eq!(report.sources, 0);
        assert_eq!(report.inserted, 0);
    }
}
