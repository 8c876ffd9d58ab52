//! Session lifecycle and the merged consumer loop.
//!
//! The reconciler is explicitly constructed and torn down with its owning
//! session; there are no ambient singletons. Each change source is a
//! bounded channel; a single consumer task drains the merged stream, so
//! reconciliation stays single-threaded and deterministic even on a
//! multi-threaded runtime. Stats recompute synchronously on the consumer
//! task after every successful apply; readers only ever see immutable
//! snapshots.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{StreamExt, StreamMap};
use tracing::info;
use uuid::Uuid;

use crate::config::CoreConfig;
use crate::error::{CoreError, Result};
use crate::events::{ChangeEventRouter, ChangeNotification, SourceKind};
use crate::records::Entity;
use crate::recurrence::{RecurrenceScheduler, SchedulerNotice, TaskPersistence};
use crate::stats::{compute_stats, Stats, StatsFilter};
use crate::store::{MaterializedViewStore, Snapshot};

// =============================================================================
// Session ID
// =============================================================================

/// Unique identifier for a reconciler session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Source Handles
// =============================================================================

/// Sender side of one change source subscription. Handles are cheap to
/// clone and die with the session.
#[derive(Debug, Clone)]
pub struct SourceHandle {
    kind: SourceKind,
    tx: mpsc::Sender<ChangeNotification>,
}

impl SourceHandle {
    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Feed one notification into the session. Applies backpressure when
    /// the channel is full; fails once the session is torn down.
    pub async fn send(&self, notification: ChangeNotification) -> Result<()> {
        if notification.source != self.kind {
            return Err(CoreError::malformed_event(format!(
                "{} notification sent through {} handle",
                notification.source, self.kind
            )));
        }
        self.tx
            .send(notification)
            .await
            .map_err(|_| CoreError::channel_closed(self.kind))
    }
}

// =============================================================================
// Session
// =============================================================================

/// An explicitly constructed reconciler bound to one session lifecycle.
pub struct ReconcilerSession {
    session_id: SessionId,
    store: Arc<MaterializedViewStore>,
    latest_stats: Arc<RwLock<Arc<Stats>>>,
    senders: HashMap<SourceKind, mpsc::Sender<ChangeNotification>>,
    shutdown: watch::Sender<bool>,
    consumer: Option<JoinHandle<()>>,
    notices: Option<mpsc::UnboundedReceiver<SchedulerNotice>>,
}

impl ReconcilerSession {
    /// Construct the store, subscribe the four change sources, and start
    /// the consumer loop.
    pub fn init(
        session_id: SessionId,
        config: &CoreConfig,
        persistence: Arc<dyn TaskPersistence>,
    ) -> Self {
        let store = Arc::new(MaterializedViewStore::new(config.reconciler.clone()));
        let (scheduler, notices) = RecurrenceScheduler::new(persistence);
        let scheduler = Arc::new(scheduler);
        let latest_stats = Arc::new(RwLock::new(Arc::new(Stats::default())));

        let capacity = config.channels.capacity.max(1);
        let mut senders = HashMap::new();
        let mut merged: StreamMap<SourceKind, ReceiverStream<ChangeNotification>> =
            StreamMap::new();
        for kind in [
            SourceKind::Person,
            SourceKind::ShirtOrder,
            SourceKind::AttendanceRecord,
            SourceKind::Task,
        ] {
            let (tx, rx) = mpsc::channel(capacity);
            senders.insert(kind, tx);
            merged.insert(kind, ReceiverStream::new(rx));
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let consumer = tokio::spawn({
            let store = store.clone();
            let latest_stats = latest_stats.clone();
            let scheduler = scheduler.clone();
            async move {
                let router = ChangeEventRouter::new();
                info!(session = %session_id, "reconciler session started");

                loop {
                    tokio::select! {
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                break;
                            }
                        }
                        next = merged.next() => {
                            match next {
                                Some((_, notification)) => {
                                    Self::process(&router, &store, &latest_stats, &scheduler, notification);
                                }
                                // All source channels closed.
                                None => break,
                            }
                        }
                    }
                }

                info!(session = %session_id, "reconciler session stopped");
            }
        });

        Self {
            session_id,
            store,
            latest_stats,
            senders,
            shutdown: shutdown_tx,
            consumer: Some(consumer),
            notices: Some(notices),
        }
    }

    /// Process one notification end to end on the consumer task.
    ///
    /// Errors are isolated per event: route and apply failures are logged
    /// and dropped, and the loop moves on.
    fn process(
        router: &ChangeEventRouter,
        store: &MaterializedViewStore,
        latest_stats: &RwLock<Arc<Stats>>,
        scheduler: &RecurrenceScheduler,
        notification: ChangeNotification,
    ) {
        let patch = match router.route(&notification) {
            Ok(patch) => patch,
            Err(err) => {
                err.log();
                return;
            }
        };

        let report = match store.apply(patch) {
            Ok(report) => report,
            Err(err) => {
                err.log();
                return;
            }
        };

        let snapshot = store.snapshot();
        let stats = compute_stats(&snapshot, &StatsFilter::default(), local_today());
        *latest_stats.write() = Arc::new(stats);

        if let Some(completed) = report.completed_task {
            scheduler.on_task_completed(&completed);
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Obtain the sender handle for one change source.
    pub fn source(&self, kind: SourceKind) -> Result<SourceHandle> {
        self.senders
            .get(&kind)
            .map(|tx| SourceHandle {
                kind,
                tx: tx.clone(),
            })
            .ok_or_else(CoreError::session_terminated)
    }

    /// Take the scheduler notice receiver. Yields `None` after the first
    /// call; there is exactly one consumer of notices.
    pub fn scheduler_notices(&mut self) -> Option<mpsc::UnboundedReceiver<SchedulerNotice>> {
        self.notices.take()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Query surface
    // ─────────────────────────────────────────────────────────────────────────

    /// Immutable snapshot of the full entity set and task ledger.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.store.snapshot()
    }

    /// Derived counters for the given filter, recomputed on demand
    /// against the current snapshot.
    pub fn stats(&self, filter: &StatsFilter) -> Stats {
        compute_stats(&self.store.snapshot(), filter, local_today())
    }

    /// The unfiltered counters recomputed after the most recent apply.
    pub fn latest_stats(&self) -> Arc<Stats> {
        self.latest_stats.read().clone()
    }

    /// A finite, restartable, per-call view of matching entities.
    pub fn filtered_view<F>(&self, predicate: F) -> Vec<Entity>
    where
        F: Fn(&Entity) -> bool,
    {
        self.store.filtered_view(predicate)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Teardown
    // ─────────────────────────────────────────────────────────────────────────

    /// Release all four subscriptions and stop the consumer loop. After
    /// teardown no handler remains registered and the store can no longer
    /// be mutated; outstanding handles fail on send.
    pub async fn teardown(mut self) {
        let _ = self.shutdown.send(true);
        self.senders.clear();
        if let Some(handle) = self.consumer.take() {
            let _ = handle.await;
        }
        info!(session = %self.session_id, "reconciler session torn down");
    }
}

impl Drop for ReconcilerSession {
    fn drop(&mut self) {
        // Best-effort stop if the session is dropped without teardown.
        let _ = self.shutdown.send(true);
    }
}

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::events::{PersonRow, RowData, ShirtOrderRow, TaskRow};
    use crate::records::{PersonId, TaskId, TaskStatus};
    use crate::store::TaskPatch;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use parking_lot::Mutex;
    use std::time::Duration;

    struct MemoryPersistence {
        created: Mutex<Vec<crate::records::TaskRecord>>,
    }

    impl MemoryPersistence {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                created: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TaskPersistence for MemoryPersistence {
        async fn create(
            &self,
            task: crate::records::TaskRecord,
        ) -> Result<crate::records::TaskRecord> {
            self.created.lock().push(task.clone());
            Ok(task)
        }

        async fn update(
            &self,
            _task_id: TaskId,
            _fields: TaskPatch,
        ) -> Result<crate::records::TaskRecord> {
            Err(CoreError::storage_update_failed("not used in tests"))
        }
    }

    fn session() -> (ReconcilerSession, Arc<MemoryPersistence>) {
        let persistence = MemoryPersistence::new();
        let session = ReconcilerSession::init(
            SessionId::new(),
            &CoreConfig::default(),
            persistence.clone(),
        );
        (session, persistence)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    fn person_insert(id: PersonId, name: &str) -> ChangeNotification {
        ChangeNotification::insert(RowData::Person(PersonRow {
            id: Some(id),
            name: Some(name.into()),
            age: Some(30),
            ..Default::default()
        }))
    }

    #[tokio::test]
    async fn test_events_flow_through_to_the_snapshot() {
        let (session, _persistence) = session();
        let person_id = PersonId::new();

        let people = session.source(SourceKind::Person).unwrap();
        let shirts = session.source(SourceKind::ShirtOrder).unwrap();

        people.send(person_insert(person_id, "Ada")).await.unwrap();
        shirts
            .send(ChangeNotification::update(
                None,
                RowData::ShirtOrder(ShirtOrderRow {
                    person_id: Some(person_id),
                    size: Some("M".into()),
                    paid: Some(true),
                    ..Default::default()
                }),
            ))
            .await
            .unwrap();

        wait_until(|| {
            session
                .snapshot()
                .entity(&person_id)
                .map(|e| e.shirt.size == "M")
                .unwrap_or(false)
        })
        .await;

        let stats = session.latest_stats();
        assert_eq!(stats.capacity.total, 1);
        assert_eq!(stats.collections.paid, 1);

        session.teardown().await;
    }

    #[tokio::test]
    async fn test_malformed_event_does_not_halt_the_loop() {
        let (session, _persistence) = session();
        let people = session.source(SourceKind::Person).unwrap();

        // No derivable id: dropped at the router.
        people
            .send(ChangeNotification::insert(RowData::Person(PersonRow {
                name: Some("ghost".into()),
                ..Default::default()
            })))
            .await
            .unwrap();

        let person_id = PersonId::new();
        people.send(person_insert(person_id, "Ada")).await.unwrap();

        wait_until(|| session.snapshot().entity(&person_id).is_some()).await;
        assert_eq!(session.snapshot().entities.len(), 1);

        session.teardown().await;
    }

    #[tokio::test]
    async fn test_completion_round_trips_through_the_scheduler() {
        let (mut session, persistence) = session();
        let mut notices = session.scheduler_notices().unwrap();

        let person_id = PersonId::new();
        let task_id = TaskId::new();
        let people = session.source(SourceKind::Person).unwrap();
        let tasks = session.source(SourceKind::Task).unwrap();

        people.send(person_insert(person_id, "Ada")).await.unwrap();
        tasks
            .send(ChangeNotification::insert(RowData::Task(TaskRow {
                id: Some(task_id),
                person_id: Some(person_id),
                text: Some("wipe tables".into()),
                due_date: Some(Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()),
                status: Some(TaskStatus::Incomplete),
                recurrence: Some(crate::records::RecurrenceRule::Daily),
                ..Default::default()
            })))
            .await
            .unwrap();
        tasks
            .send(ChangeNotification::update(
                None,
                RowData::Task(TaskRow {
                    id: Some(task_id),
                    person_id: Some(person_id),
                    status: Some(TaskStatus::Complete),
                    ..Default::default()
                }),
            ))
            .await
            .unwrap();

        let notice = notices.recv().await.unwrap();
        let SchedulerNotice::Spawned {
            completed,
            successor,
        } = notice
        else {
            panic!("expected a spawned notice, got {notice:?}");
        };
        assert_eq!(completed, task_id);

        let created = persistence.created.lock();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].id, successor);
        assert_eq!(
            created[0].due_date,
            Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap()
        );

        // The completed instance is untouched in the ledger.
        drop(created);
        let snapshot = session.snapshot();
        assert_eq!(
            snapshot.task(&task_id).unwrap().status,
            TaskStatus::Complete
        );

        session.teardown().await;
    }

    #[tokio::test]
    async fn test_teardown_stops_consumption() {
        let (session, _persistence) = session();
        let people = session.source(SourceKind::Person).unwrap();

        session.teardown().await;

        let err = people
            .send(person_insert(PersonId::new(), "late"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ChannelClosed);
    }

    #[test]
    fn test_handle_rejects_mismatched_source() {
        tokio_test::block_on(async {
            let (session, _persistence) = session();
            let people = session.source(SourceKind::Person).unwrap();

            let err = people
                .send(ChangeNotification::insert(RowData::ShirtOrder(
                    ShirtOrderRow {
                        person_id: Some(PersonId::new()),
                        ..Default::default()
                    },
                )))
                .await
                .unwrap_err();
            assert_eq!(err.code(), ErrorCode::MalformedEvent);

            session.teardown().await;
        });
    }
}
