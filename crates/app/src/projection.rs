use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use metrics::counter;
use thiserror::Error;
use tokio::{
    sync::{Mutex, Notify},
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use customer_crud_core::{
    projector::{CustomerProjector, ProjectionChange},
    AggregateRoot, Customer, CustomerDomainEvent,
};
use customer_crud_storage::{
    CustomerReadRepository, Database, EventLogError, EventLogRepository,
    ProjectionCheckpointRepository, ReadModelError,
};

/// Checkpoint name of the customer read model.
pub const PROJECTION_NAME: &str = "customer_read_models";
const BATCH_LIMIT: i64 = 256;

/// Wakes the projection worker ahead of its next tick.
#[derive(Clone, Default)]
pub struct ProjectionTrigger(Arc<Notify>);

impl ProjectionTrigger {
    pub fn notify(&self) {
        self.0.notify_one();
    }

    async fn notified(&self) {
        self.0.notified().await;
    }
}

/// Background worker that feeds the read store from the write-side event log.
#[derive(Clone)]
pub struct ProjectionWorker {
    events: EventLogRepository,
    read_db: Database,
    trigger: ProjectionTrigger,
    run_lock: Arc<Mutex<()>>,
    clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
    interval: Duration,
}

/// What a single `run_once` call applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectionRun {
    pub events: usize,
    pub upserted: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub last_sequence: i64,
}

impl ProjectionWorker {
    pub fn new(write_db: &Database, read_db: Database, interval: Duration) -> Self {
        Self {
            events: write_db.event_log(),
            read_db,
            trigger: ProjectionTrigger::default(),
            run_lock: Arc::new(Mutex::new(())),
            clock: Arc::new(Utc::now),
            interval,
        }
    }

    pub fn trigger(&self) -> ProjectionTrigger {
        self.trigger.clone()
    }

    /// Runs the worker loop in the background.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run_loop().await;
        })
    }

    async fn run_loop(self) {
        info!(
            stage = "projection",
            interval_ms = self.interval.as_millis() as u64,
            "projection worker started"
        );
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.trigger.notified() => {}
            }
            if let Err(err) = self.run_once().await {
                error!(stage = "projection", error = %err, "projection run failed");
            }
        }
    }

    /// Applies every event recorded after the stored checkpoint.
    ///
    /// Each batch and its checkpoint are written in one read-store transaction,
    /// so an event is applied at most once even across restarts.
    pub async fn run_once(&self) -> Result<ProjectionRun, ProjectionError> {
        let _guard = self.run_lock.lock().await;
        let checkpoints = self.read_db.projection_checkpoints();
        let reads = self.read_db.customer_reads();
        let mut run = ProjectionRun {
            last_sequence: checkpoints.load(PROJECTION_NAME).await?,
            ..ProjectionRun::default()
        };

        loop {
            let batch = self.events.fetch_after(run.last_sequence, BATCH_LIMIT).await?;
            let Some(last) = batch.last() else {
                break;
            };
            let last_sequence = last.sequence;

            // Writing the checkpoint first takes the store's write lock before any read,
            // so a concurrent commit can never invalidate this transaction's snapshot.
            let mut tx = reads.begin().await?;
            ProjectionCheckpointRepository::store(
                &mut *tx,
                PROJECTION_NAME,
                last_sequence,
                (self.clock)(),
            )
            .await?;
            for stored in &batch {
                if stored.aggregate_type != Customer::AGGREGATE_TYPE {
                    warn!(
                        stage = "projection",
                        sequence = stored.sequence,
                        aggregate_type = %stored.aggregate_type,
                        "skipping event of unknown aggregate"
                    );
                    run.skipped += 1;
                    continue;
                }

                let event: CustomerDomainEvent = stored.decode()?;
                let current = CustomerReadRepository::fetch_in(&mut *tx, &event.customer_id()).await?;
                match CustomerProjector::apply(current.as_ref(), &event) {
                    ProjectionChange::Upsert(model) => {
                        CustomerReadRepository::upsert(&mut *tx, &model).await?;
                        run.upserted += 1;
                    }
                    ProjectionChange::Delete(id) => {
                        CustomerReadRepository::delete(&mut *tx, &id).await?;
                        run.deleted += 1;
                    }
                    ProjectionChange::Skip => run.skipped += 1,
                }
            }
            tx.commit().await?;

            counter!("projection_events_applied_total").increment(batch.len() as u64);
            run.events += batch.len();
            run.last_sequence = last_sequence;

            if (batch.len() as i64) < BATCH_LIMIT {
                break;
            }
        }

        if run.events > 0 {
            debug!(
                stage = "projection",
                events = run.events,
                upserted = run.upserted,
                deleted = run.deleted,
                skipped = run.skipped,
                checkpoint = run.last_sequence,
                "read model caught up"
            );
        }
        Ok(run)
    }
}

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to read the event log: {0}")]
    EventLog(#[from] EventLogError),
    #[error("failed to update the read model: {0}")]
    ReadModel(#[from] ReadModelError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use customer_crud_storage::WriteRepository;

    use crate::test_support::{customer, setup_db};

    #[tokio::test]
    async fn run_once_projects_and_advances_checkpoint() {
        let db = setup_db().await;
        let mut repo = db.customer_writes();
        let mut jane = customer("Jane", "Doe", "jane@example.com", "NL91ABNA0417164300");
        let id = *jane.id();
        repo.add(jane.clone());
        repo.commit().await.expect("commit");

        let worker = ProjectionWorker::new(&db, db.clone(), Duration::from_secs(60));
        let run = worker.run_once().await.expect("run");
        assert_eq!(run.events, 1);
        assert_eq!(run.upserted, 1);

        let row = db
            .customer_reads()
            .find_by_id(&id)
            .await
            .expect("find")
            .expect("projected");
        assert_eq!(row.email, "jane@example.com");
        assert_eq!(
            db.projection_checkpoints().load(PROJECTION_NAME).await.expect("load"),
            run.last_sequence
        );

        jane.take_events();
        jane.change_phone_number("+31687654321", Utc::now()).expect("phone");
        repo.update(jane);
        repo.commit().await.expect("commit");

        let run = worker.run_once().await.expect("run");
        assert_eq!(run.events, 1);
        let row = db
            .customer_reads()
            .find_by_id(&id)
            .await
            .expect("find")
            .expect("projected");
        assert_eq!(row.phone_number, "+31687654321");
    }

    #[tokio::test]
    async fn second_run_applies_nothing() {
        let db = setup_db().await;
        let mut repo = db.customer_writes();
        repo.add(customer("Jane", "Doe", "jane@example.com", "NL91ABNA0417164300"));
        repo.commit().await.expect("commit");

        let worker = ProjectionWorker::new(&db, db.clone(), Duration::from_secs(60));
        assert_eq!(worker.run_once().await.expect("first").events, 1);
        let again = worker.run_once().await.expect("second");
        assert_eq!(again.events, 0);
        assert_eq!(db.customer_reads().list(None).await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn delete_event_removes_read_row() {
        let db = setup_db().await;
        let mut repo = db.customer_writes();
        let mut jane = customer("Jane", "Doe", "jane@example.com", "NL91ABNA0417164300");
        let id = *jane.id();
        repo.add(jane.clone());
        repo.commit().await.expect("commit");

        jane.take_events();
        jane.delete(Utc::now()).expect("delete");
        repo.remove(jane);
        repo.commit().await.expect("commit");

        let worker = ProjectionWorker::new(&db, db.clone(), Duration::from_secs(60));
        let run = worker.run_once().await.expect("run");
        assert_eq!(run.events, 2);
        assert_eq!(run.deleted, 1);
        assert!(db.customer_reads().find_by_id(&id).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn projects_into_separate_read_store() {
        let write_db = setup_db().await;
        let read_db = setup_db().await;
        let mut repo = write_db.customer_writes();
        repo.add(customer("Jane", "Doe", "jane@example.com", "NL91ABNA0417164300"));
        repo.commit().await.expect("commit");

        let worker = ProjectionWorker::new(&write_db, read_db.clone(), Duration::from_secs(60));
        worker.run_once().await.expect("run");

        assert_eq!(read_db.customer_reads().list(None).await.expect("list").len(), 1);
        assert!(write_db.customer_reads().list(None).await.expect("list").is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn runs_succeed_while_commands_commit_on_a_file_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("customers.db").display());
        let db = Database::connect(&url).await.expect("connect");
        db.run_migrations().await.expect("migrations");

        const COMMITS: usize = 100;
        let writer_db = db.clone();
        let writer = tokio::spawn(async move {
            for i in 0..COMMITS {
                let mut repo = writer_db.customer_writes();
                repo.add(customer(
                    "Jane",
                    &format!("Doe {i}"),
                    &format!("jane{i}@example.com"),
                    &format!("NL91ABNA{i:010}"),
                ));
                repo.commit().await.expect("commit");
            }
        });

        let worker = ProjectionWorker::new(&db, db.clone(), Duration::from_secs(60));
        while !writer.is_finished() {
            worker.run_once().await.expect("run during writes");
            tokio::task::yield_now().await;
        }
        writer.await.expect("writer task");
        worker.run_once().await.expect("catch-up run");

        let rows = db.customer_reads().list(None).await.expect("list");
        assert_eq!(rows.len(), COMMITS);
        assert_eq!(
            db.projection_checkpoints().load(PROJECTION_NAME).await.expect("load"),
            db.event_log().latest_sequence().await.expect("latest")
        );
    }

    #[tokio::test]
    async fn spawned_worker_reacts_to_trigger() {
        let db = setup_db().await;
        let worker = ProjectionWorker::new(&db, db.clone(), Duration::from_secs(3600));
        let trigger = worker.trigger();
        let handle = worker.spawn();
        // let the immediate first tick finish on the empty log
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut repo = db.customer_writes();
        repo.add(customer("Jane", "Doe", "jane@example.com", "NL91ABNA0417164300"));
        repo.commit().await.expect("commit");
        trigger.notify();

        let reads = db.customer_reads();
        let mut projected = false;
        for _ in 0..50 {
            if matches!(reads.list(None).await, Ok(rows) if !rows.is_empty()) {
                projected = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        handle.abort();
        assert!(projected, "worker should project after being triggered");
    }
}
