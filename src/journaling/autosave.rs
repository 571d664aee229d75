use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use time::OffsetDateTime;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;

use super::draft::{DraftBuffer, DraftSnapshot};
use super::recovery::{RecoveryJournal, RecoverySnapshot};
use crate::config::AppConfig;
use crate::gateway::{
    with_deadline, GatewayResult, MutationError, Operation, SharedGateway,
    DEFAULT_REQUEST_TIMEOUT,
};
use crate::model::{Record, RecordId};

const EVENT_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum SavePhase {
    Clean,
    PendingDebounce,
    Saving,
    DirtyAfterFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Nothing changed since the last confirmed save.
    Clean,
    /// Blank drafts are never sent to the gateway.
    BlankBody,
    /// The session has ended.
    Closed,
    /// A newer edit restarted the debounce window.
    Superseded,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Saved {
        at: OffsetDateTime,
        /// Edits landed while the request was in flight.
        still_dirty: bool,
    },
    /// A save was already running; it retries once it completes.
    Queued,
    Skipped(SkipReason),
}

#[derive(Debug, Clone)]
pub struct AutoSaveStatus {
    pub record_id: RecordId,
    pub phase: SavePhase,
    pub dirty: bool,
    pub saving: bool,
    pub last_saved: Option<OffsetDateTime>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AutoSaveEvent {
    Saved { id: RecordId, at: OffsetDateTime },
    Failed { id: RecordId, message: String },
}

/// How a writing session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndSession {
    /// Save whatever is unsaved, then close.
    Flush,
    /// Drop unsaved changes, including any crash-recovery snapshot.
    Discard,
    /// Close without saving; unsaved changes stay in the recovery journal.
    Detach,
}

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub debounce: Duration,
    /// Timer-driven saves; manual saves work either way.
    pub enabled: bool,
    pub request_timeout: Duration,
    pub journal: Option<RecoveryJournal>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(30),
            enabled: true,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            journal: None,
        }
    }
}

impl SchedulerOptions {
    pub fn from_config(config: &AppConfig, journal: Option<RecoveryJournal>) -> Self {
        Self {
            debounce: config.auto_save.debounce(),
            enabled: config.auto_save.enabled,
            request_timeout: config.gateway.request_timeout(),
            journal,
        }
    }
}

/// Debounced, single-flight persistence for one draft.
///
/// Cloning yields another handle onto the same session. The debounce timer is
/// a Tokio task holding only a weak reference, so dropping every handle ends
/// the session without a final save.
pub struct AutoSaveScheduler<R: Record> {
    shared: Arc<Shared<R>>,
}

impl<R: Record> Clone for AutoSaveScheduler<R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

struct Shared<R: Record> {
    gateway: SharedGateway<R>,
    options: SchedulerOptions,
    events: broadcast::Sender<AutoSaveEvent>,
    /// Woken whenever a save request completes, successfully or not.
    settled: Notify,
    session: Mutex<Session<R>>,
}

struct Session<R: Record> {
    buffer: DraftBuffer<R>,
    phase: SavePhase,
    persisted: bool,
    timer: Option<JoinHandle<()>>,
    timer_epoch: u64,
    retry_queued: bool,
    last_error: Option<String>,
    closed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Debounce(u64),
    Manual,
    Forced,
}

struct SaveJob<R> {
    snapshot: DraftSnapshot<R>,
    create: bool,
}

enum Begin<R> {
    Run(SaveJob<R>),
    Queued,
    Skip(SkipReason),
}

impl<R: Record> AutoSaveScheduler<R> {
    /// Session over a record the gateway already holds.
    pub fn edit(gateway: SharedGateway<R>, record: R, options: SchedulerOptions) -> Self {
        Self::open(gateway, DraftBuffer::load(record), true, options)
    }

    /// Session over a new record; its first save creates it.
    pub fn compose(gateway: SharedGateway<R>, template: R, options: SchedulerOptions) -> Self {
        Self::open(gateway, DraftBuffer::load(template), false, options)
    }

    /// Session seeded from a crash-recovery snapshot. The restored content
    /// starts dirty with the debounce window armed, so this must run inside a
    /// Tokio runtime.
    pub fn resume(
        gateway: SharedGateway<R>,
        snapshot: RecoverySnapshot<R>,
        options: SchedulerOptions,
    ) -> Self {
        let mut buffer = DraftBuffer::load(snapshot.record);
        buffer.mark_recovered();
        let scheduler = Self::open(gateway, buffer, snapshot.persisted, options);
        {
            let mut session = scheduler.shared.session.lock();
            if !session.buffer.is_blank() {
                session.phase = SavePhase::PendingDebounce;
                scheduler.arm(&mut session);
            }
        }
        scheduler
    }

    fn open(
        gateway: SharedGateway<R>,
        buffer: DraftBuffer<R>,
        persisted: bool,
        options: SchedulerOptions,
    ) -> Self {
        tracing::debug!(id = %buffer.id(), persisted, "opening draft session");
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                gateway,
                options,
                events,
                settled: Notify::new(),
                session: Mutex::new(Session {
                    buffer,
                    phase: SavePhase::Clean,
                    persisted,
                    timer: None,
                    timer_epoch: 0,
                    retry_queued: false,
                    last_error: None,
                    closed: false,
                }),
            }),
        }
    }

    /// Applies an edit and restarts the debounce window.
    ///
    /// While a save is in flight the edit is buffered; the in-flight save
    /// re-arms the timer when it completes.
    pub fn update(&self, patch: &R::Patch) {
        let mut session = self.shared.session.lock();
        if session.closed {
            tracing::debug!(id = %session.buffer.id(), "ignoring edit on a closed session");
            return;
        }
        session.buffer.update(patch);
        session.last_error = None;

        if session.phase != SavePhase::Saving {
            if session.buffer.is_blank() {
                // Nothing will be sent, so no debounce is pending.
                self.disarm(&mut session);
                if session.phase != SavePhase::DirtyAfterFailure {
                    session.phase = SavePhase::Clean;
                }
            } else {
                session.phase = SavePhase::PendingDebounce;
                self.arm(&mut session);
            }
        }

        if let Some(journal) = &self.shared.options.journal {
            if let Err(err) = journal.write(session.buffer.content(), session.persisted) {
                tracing::warn!(?err, id = %session.buffer.id(), "failed to write draft snapshot");
            }
        }
    }

    /// Saves now when dirty, cancelling the pending debounce.
    pub async fn save_now(&self) -> Result<SaveOutcome, MutationError> {
        self.flush(Trigger::Manual).await
    }

    /// Saves now even when clean. Blank drafts are still skipped.
    pub async fn force_save(&self) -> Result<SaveOutcome, MutationError> {
        self.flush(Trigger::Forced).await
    }

    /// Ends the session. On a failed flush the session stays open so the
    /// caller can retry or pick another mode.
    ///
    /// `Flush` waits out any save already in flight and keeps saving until the
    /// buffer is clean, so it never returns [`SaveOutcome::Queued`].
    pub async fn end(&self, mode: EndSession) -> Result<Option<SaveOutcome>, MutationError> {
        let outcome = match mode {
            EndSession::Flush => Some(self.drain().await?),
            EndSession::Discard | EndSession::Detach => None,
        };

        let mut session = self.shared.session.lock();
        session.closed = true;
        self.disarm(&mut session);
        if mode == EndSession::Discard {
            self.forget_snapshot(&session);
        }
        tracing::debug!(id = %session.buffer.id(), ?mode, "draft session ended");
        Ok(outcome)
    }

    pub fn status(&self) -> AutoSaveStatus {
        let session = self.shared.session.lock();
        AutoSaveStatus {
            record_id: session.buffer.id().clone(),
            phase: session.phase,
            dirty: session.buffer.is_dirty(),
            saving: session.phase == SavePhase::Saving,
            last_saved: session.buffer.last_saved(),
            last_error: session.last_error.clone(),
        }
    }

    pub fn content(&self) -> R {
        self.shared.session.lock().buffer.content().clone()
    }

    pub fn record_id(&self) -> RecordId {
        self.shared.session.lock().buffer.id().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AutoSaveEvent> {
        self.shared.events.subscribe()
    }

    /// Saves until nothing is left unsaved.
    async fn drain(&self) -> Result<SaveOutcome, MutationError> {
        let mut waited = false;
        loop {
            // Registered before the save attempt so a completion racing the
            // `Queued` answer still wakes us.
            let settled = self.shared.settled.notified();
            match self.save_now().await? {
                SaveOutcome::Queued => {
                    tracing::debug!(id = %self.record_id(), "waiting for in-flight save");
                    waited = true;
                    settled.await;
                }
                SaveOutcome::Saved {
                    still_dirty: true, ..
                } => {}
                SaveOutcome::Skipped(SkipReason::Clean) if waited => {
                    // The in-flight save and its queued retry wrote everything.
                    let last_saved = self.shared.session.lock().buffer.last_saved();
                    return Ok(match last_saved {
                        Some(at) => SaveOutcome::Saved {
                            at,
                            still_dirty: false,
                        },
                        None => SaveOutcome::Skipped(SkipReason::Clean),
                    });
                }
                outcome => return Ok(outcome),
            }
        }
    }

    async fn flush(&self, trigger: Trigger) -> Result<SaveOutcome, MutationError> {
        let mut trigger = trigger;
        loop {
            let job = {
                let mut session = self.shared.session.lock();
                match self.begin(&mut session, trigger) {
                    Begin::Run(job) => job,
                    Begin::Queued => return Ok(SaveOutcome::Queued),
                    Begin::Skip(reason) => return Ok(SaveOutcome::Skipped(reason)),
                }
            };

            let result = self.persist(&job).await;

            let (outcome, retry) = {
                let mut session = self.shared.session.lock();
                self.finish(&mut session, &job, result)?
            };
            if !retry {
                return Ok(outcome);
            }
            tracing::debug!(id = %job.snapshot.record.id(), "running queued save");
            trigger = Trigger::Manual;
        }
    }

    fn begin(&self, session: &mut Session<R>, trigger: Trigger) -> Begin<R> {
        match trigger {
            Trigger::Debounce(epoch) => {
                if session.closed {
                    return Begin::Skip(SkipReason::Closed);
                }
                if epoch != session.timer_epoch {
                    return Begin::Skip(SkipReason::Superseded);
                }
                // The timer task is the caller; detach rather than abort it.
                session.timer = None;
            }
            Trigger::Manual | Trigger::Forced => self.disarm(session),
        }

        if session.phase == SavePhase::Saving {
            session.retry_queued = true;
            return Begin::Queued;
        }
        if !session.buffer.is_dirty() && trigger != Trigger::Forced {
            return Begin::Skip(SkipReason::Clean);
        }
        if session.buffer.is_blank() {
            return Begin::Skip(SkipReason::BlankBody);
        }

        session.phase = SavePhase::Saving;
        Begin::Run(SaveJob {
            snapshot: session.buffer.snapshot(),
            create: !session.persisted,
        })
    }

    async fn persist(&self, job: &SaveJob<R>) -> GatewayResult<()> {
        let gateway = &self.shared.gateway;
        let timeout = self.shared.options.request_timeout;
        let record = job.snapshot.record.clone();
        if job.create {
            with_deadline(timeout, gateway.create_record(record))
                .await
                .map(|_| ())
        } else {
            let id = record.id().clone();
            with_deadline(timeout, gateway.update_record(&id, record))
                .await
                .map(|_| ())
        }
    }

    fn finish(
        &self,
        session: &mut Session<R>,
        job: &SaveJob<R>,
        result: GatewayResult<()>,
    ) -> Result<(SaveOutcome, bool), MutationError> {
        let id = job.snapshot.record.id().clone();
        match result {
            Ok(()) => {
                let at = OffsetDateTime::now_utc();
                let clean = session.buffer.mark_saved(job.snapshot.generation, at);
                session.persisted = true;
                session.last_error = None;

                let retry = !clean && std::mem::take(&mut session.retry_queued);
                if clean {
                    session.phase = SavePhase::Clean;
                    session.retry_queued = false;
                    self.forget_snapshot(session);
                } else {
                    session.phase = SavePhase::PendingDebounce;
                    if !retry && !session.buffer.is_blank() {
                        self.arm(session);
                    }
                }

                tracing::debug!(%id, create = job.create, still_dirty = !clean, "draft saved");
                let _ = self.shared.events.send(AutoSaveEvent::Saved { id, at });
                self.shared.settled.notify_waiters();
                Ok((
                    SaveOutcome::Saved {
                        at,
                        still_dirty: !clean,
                    },
                    retry,
                ))
            }
            Err(err) => {
                let error = MutationError::new(Operation::Save, R::NOUN, R::NOUN_PLURAL, err);
                session.phase = SavePhase::DirtyAfterFailure;
                session.last_error = Some(error.message.clone());
                session.retry_queued = false;
                if session.buffer.generation() != job.snapshot.generation
                    && !session.buffer.is_blank()
                {
                    self.arm(session);
                }

                tracing::error!(%id, error = %error.source, "failed to save draft");
                let _ = self.shared.events.send(AutoSaveEvent::Failed {
                    id,
                    message: error.message.clone(),
                });
                self.shared.settled.notify_waiters();
                Err(error)
            }
        }
    }

    fn arm(&self, session: &mut Session<R>) {
        self.disarm(session);
        if !self.shared.options.enabled || session.closed {
            return;
        }
        let epoch = session.timer_epoch;
        let debounce = self.shared.options.debounce;
        let weak: Weak<Shared<R>> = Arc::downgrade(&self.shared);
        tracing::debug!(id = %session.buffer.id(), ?debounce, "autosave timer armed");
        session.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let scheduler = AutoSaveScheduler { shared };
            match scheduler.flush(Trigger::Debounce(epoch)).await {
                Ok(outcome) => tracing::debug!(?outcome, "autosave timer fired"),
                Err(err) => tracing::debug!(error = %err, "debounced save failed"),
            }
        }));
    }

    /// Cancels the pending timer and invalidates any timer already waiting on the lock.
    fn disarm(&self, session: &mut Session<R>) {
        if let Some(timer) = session.timer.take() {
            timer.abort();
        }
        session.timer_epoch += 1;
    }

    fn forget_snapshot(&self, session: &Session<R>) {
        if let Some(journal) = &self.shared.options.journal {
            if let Err(err) = journal.remove::<R>(session.buffer.id()) {
                tracing::warn!(?err, id = %session.buffer.id(), "failed to remove draft snapshot");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use tempfile::TempDir;
    use tokio::time::sleep;

    use super::*;
    use crate::gateway::{CallKind, GatewayError, MemoryGateway};
    use crate::model::{EntryPatch, JournalEntry, Mood};

    const DEBOUNCE: Duration = Duration::from_secs(30);

    fn options() -> SchedulerOptions {
        SchedulerOptions {
            debounce: DEBOUNCE,
            ..SchedulerOptions::default()
        }
    }

    fn compose(gateway: &Arc<MemoryGateway<JournalEntry>>) -> AutoSaveScheduler<JournalEntry> {
        AutoSaveScheduler::compose(
            gateway.clone(),
            JournalEntry::blank(Mood::Healing),
            options(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_coalesces_updates_into_one_create() {
        let gateway = Arc::new(MemoryGateway::new());
        let scheduler = compose(&gateway);

        scheduler.update(&EntryPatch::body("Hello"));
        sleep(Duration::from_secs(10)).await;
        scheduler.update(&EntryPatch::body("Hello wor"));
        sleep(Duration::from_secs(10)).await;
        scheduler.update(&EntryPatch::body("Hello world"));
        assert_eq!(scheduler.status().phase, SavePhase::PendingDebounce);
        assert!(gateway.calls().is_empty());

        sleep(DEBOUNCE + Duration::from_secs(1)).await;
        gateway.wait_for_calls(1).await;
        sleep(DEBOUNCE * 2).await;

        let calls = gateway.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].kind, CallKind::Create);
        let payload = calls[0].payload.as_ref().expect("payload");
        assert_eq!(payload.body, "Hello world");
        assert_eq!(payload.word_count, 2);

        let status = scheduler.status();
        assert_eq!(status.phase, SavePhase::Clean);
        assert!(!status.dirty);
        assert!(status.last_saved.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn edits_during_save_keep_draft_dirty_and_follow_up_with_update() {
        let gateway = Arc::new(MemoryGateway::new().with_latency(Duration::from_secs(5)));
        let scheduler = compose(&gateway);
        scheduler.update(&EntryPatch::body("first draft"));

        let in_flight = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.save_now().await }
        });
        gateway.wait_for_calls(1).await;
        assert!(scheduler.status().saving);

        scheduler.update(&EntryPatch::body("first draft, revised"));
        let outcome = in_flight.await.expect("join").expect("save");
        assert_matches!(outcome, SaveOutcome::Saved { still_dirty: true, .. });

        let status = scheduler.status();
        assert!(status.dirty);
        assert_eq!(status.phase, SavePhase::PendingDebounce);
        let first = gateway.calls()[0].payload.clone().expect("payload");
        assert_eq!(first.body, "first draft");

        sleep(DEBOUNCE + Duration::from_secs(1)).await;
        gateway.wait_for_calls(2).await;
        sleep(Duration::from_secs(6)).await;

        let calls = gateway.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].kind, CallKind::Update);
        assert_eq!(
            calls[1].payload.as_ref().map(|entry| entry.body.as_str()),
            Some("first draft, revised")
        );
        assert!(!scheduler.status().dirty);
    }

    #[tokio::test(start_paused = true)]
    async fn save_request_while_saving_is_queued_and_retried() {
        let gateway = Arc::new(MemoryGateway::new().with_latency(Duration::from_secs(5)));
        let scheduler = compose(&gateway);
        scheduler.update(&EntryPatch::body("one"));

        let in_flight = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.save_now().await }
        });
        gateway.wait_for_calls(1).await;
        scheduler.update(&EntryPatch::body("one two"));

        assert_eq!(scheduler.save_now().await, Ok(SaveOutcome::Queued));
        let outcome = in_flight.await.expect("join").expect("save");
        assert_matches!(outcome, SaveOutcome::Saved { still_dirty: false, .. });

        let calls = gateway.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].kind, CallKind::Create);
        assert_eq!(calls[1].kind, CallKind::Update);
        assert_eq!(scheduler.status().phase, SavePhase::Clean);
    }

    #[tokio::test(start_paused = true)]
    async fn blank_body_never_reaches_gateway() {
        let gateway = Arc::new(MemoryGateway::new());
        let scheduler = compose(&gateway);
        scheduler.update(&EntryPatch::body("   \n\t"));

        assert_eq!(
            scheduler.save_now().await,
            Ok(SaveOutcome::Skipped(SkipReason::BlankBody))
        );
        assert_eq!(
            scheduler.force_save().await,
            Ok(SaveOutcome::Skipped(SkipReason::BlankBody))
        );
        sleep(DEBOUNCE * 2).await;
        assert!(gateway.calls().is_empty());
        assert_eq!(scheduler.status().phase, SavePhase::Clean);
    }

    #[tokio::test(start_paused = true)]
    async fn clean_draft_skips_manual_save_unless_forced() {
        let existing = JournalEntry::with_body(Mood::Joyful, "already stored");
        let gateway = Arc::new(MemoryGateway::with_records(vec![existing.clone()]));
        let scheduler = AutoSaveScheduler::edit(gateway.clone(), existing, options());

        assert_eq!(
            scheduler.save_now().await,
            Ok(SaveOutcome::Skipped(SkipReason::Clean))
        );
        assert!(gateway.calls().is_empty());

        let forced = scheduler.force_save().await.expect("forced save");
        assert_matches!(forced, SaveOutcome::Saved { still_dirty: false, .. });
        assert_eq!(gateway.calls_of(CallKind::Update).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_save_surfaces_error_and_allows_retry() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.fail_next(CallKind::Create, GatewayError::Backend("offline".into()));
        let scheduler = compose(&gateway);
        let mut events = scheduler.subscribe();
        scheduler.update(&EntryPatch::body("fragile words"));

        let err = scheduler.save_now().await.expect_err("scripted failure");
        assert_eq!(err.message, "Failed to save entry.");
        let status = scheduler.status();
        assert_eq!(status.phase, SavePhase::DirtyAfterFailure);
        assert!(status.dirty);
        assert_eq!(status.last_error.as_deref(), Some("Failed to save entry."));
        assert_matches!(events.recv().await, Ok(AutoSaveEvent::Failed { .. }));

        let outcome = scheduler.save_now().await.expect("retry");
        assert_matches!(outcome, SaveOutcome::Saved { .. });
        assert_eq!(gateway.calls_of(CallKind::Create).len(), 2);
        assert_eq!(gateway.records().len(), 1);
        assert!(scheduler.status().last_error.is_none());
        assert_matches!(events.recv().await, Ok(AutoSaveEvent::Saved { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_gateway_times_out() {
        let gateway = Arc::new(MemoryGateway::new().with_latency(Duration::from_secs(60)));
        let scheduler = AutoSaveScheduler::compose(
            gateway.clone(),
            JournalEntry::blank(Mood::Healing),
            SchedulerOptions {
                request_timeout: Duration::from_secs(30),
                ..options()
            },
        );
        scheduler.update(&EntryPatch::body("waiting"));

        let err = scheduler.save_now().await.expect_err("timeout");
        assert!(err.is_timeout());
        assert_eq!(scheduler.status().phase, SavePhase::DirtyAfterFailure);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_autosave_only_saves_on_request() {
        let gateway = Arc::new(MemoryGateway::new());
        let scheduler = AutoSaveScheduler::compose(
            gateway.clone(),
            JournalEntry::blank(Mood::Healing),
            SchedulerOptions {
                enabled: false,
                ..options()
            },
        );
        scheduler.update(&EntryPatch::body("manual only"));
        sleep(DEBOUNCE * 3).await;
        assert!(gateway.calls().is_empty());

        scheduler.save_now().await.expect("manual save");
        assert_eq!(gateway.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn end_session_modes() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let journal = RecoveryJournal::open(temp.path().to_path_buf(), None)?;
        let gateway = Arc::new(MemoryGateway::new());
        let with_journal = || SchedulerOptions {
            journal: Some(journal.clone()),
            ..options()
        };

        let detached = AutoSaveScheduler::compose(
            gateway.clone(),
            JournalEntry::blank(Mood::Healing),
            with_journal(),
        );
        detached.update(&EntryPatch::body("keep me for later"));
        assert_eq!(detached.end(EndSession::Detach).await?, None);
        sleep(DEBOUNCE * 2).await;
        assert!(gateway.calls().is_empty());
        assert_eq!(journal.list::<JournalEntry>()?.len(), 1);

        let discarded = AutoSaveScheduler::compose(
            gateway.clone(),
            JournalEntry::blank(Mood::Healing),
            with_journal(),
        );
        discarded.update(&EntryPatch::body("never mind"));
        discarded.end(EndSession::Discard).await?;
        assert!(journal.read::<JournalEntry>(&discarded.record_id())?.is_none());

        let flushed = AutoSaveScheduler::compose(
            gateway.clone(),
            JournalEntry::blank(Mood::Healing),
            with_journal(),
        );
        flushed.update(&EntryPatch::body("final words"));
        let outcome = flushed.end(EndSession::Flush).await?;
        assert_matches!(outcome, Some(SaveOutcome::Saved { still_dirty: false, .. }));
        assert!(journal.read::<JournalEntry>(&flushed.record_id())?.is_none());
        assert_eq!(gateway.calls_of(CallKind::Create).len(), 1);

        flushed.update(&EntryPatch::body("after close"));
        assert_eq!(flushed.content().body, "final words");
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn flush_waits_for_timer_save_in_flight() -> anyhow::Result<()> {
        let gateway = Arc::new(MemoryGateway::new().with_latency(Duration::from_secs(5)));
        let scheduler = compose(&gateway);
        scheduler.update(&EntryPatch::body("first"));
        sleep(DEBOUNCE + Duration::from_secs(1)).await;
        gateway.wait_for_calls(1).await;
        assert!(scheduler.status().saving);

        scheduler.update(&EntryPatch::body("first and final"));
        let outcome = scheduler.end(EndSession::Flush).await?;
        assert_matches!(outcome, Some(SaveOutcome::Saved { still_dirty: false, .. }));

        let calls = gateway.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].kind, CallKind::Create);
        assert_eq!(calls[1].kind, CallKind::Update);
        assert_eq!(
            calls[1].payload.as_ref().map(|entry| entry.body.as_str()),
            Some("first and final")
        );
        assert_eq!(gateway.records()[0].body, "first and final");
        let status = scheduler.status();
        assert!(!status.dirty);
        assert_eq!(status.phase, SavePhase::Clean);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn manual_save_during_timer_save_is_written_by_the_retry() {
        let gateway = Arc::new(MemoryGateway::new().with_latency(Duration::from_secs(5)));
        let scheduler = compose(&gateway);
        scheduler.update(&EntryPatch::body("one"));
        sleep(DEBOUNCE + Duration::from_secs(1)).await;
        gateway.wait_for_calls(1).await;

        scheduler.update(&EntryPatch::body("one two"));
        assert_eq!(scheduler.save_now().await, Ok(SaveOutcome::Queued));

        gateway.wait_for_calls(2).await;
        sleep(Duration::from_secs(6)).await;
        let calls = gateway.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[1].payload.as_ref().map(|entry| entry.body.as_str()),
            Some("one two")
        );
        assert_eq!(scheduler.status().phase, SavePhase::Clean);

        sleep(DEBOUNCE * 2).await;
        assert_eq!(gateway.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_saves_again_when_timer_save_fails() -> anyhow::Result<()> {
        let gateway = Arc::new(MemoryGateway::new().with_latency(Duration::from_secs(5)));
        gateway.fail_next(CallKind::Create, GatewayError::Backend("offline".into()));
        let scheduler = compose(&gateway);
        scheduler.update(&EntryPatch::body("draft"));
        sleep(DEBOUNCE + Duration::from_secs(1)).await;
        gateway.wait_for_calls(1).await;

        scheduler.update(&EntryPatch::body("draft, finished"));
        let outcome = scheduler.end(EndSession::Flush).await?;
        assert_matches!(outcome, Some(SaveOutcome::Saved { still_dirty: false, .. }));
        assert_eq!(gateway.calls_of(CallKind::Create).len(), 2);
        assert_eq!(gateway.records().len(), 1);
        assert_eq!(gateway.records()[0].body, "draft, finished");
        assert!(!scheduler.status().dirty);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn blanking_the_body_leaves_no_pending_debounce() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.fail_next(CallKind::Create, GatewayError::Backend("offline".into()));
        let scheduler = compose(&gateway);
        scheduler.update(&EntryPatch::body("short lived"));
        scheduler.save_now().await.expect_err("scripted failure");

        scheduler.update(&EntryPatch::body("  "));
        assert_eq!(scheduler.status().phase, SavePhase::DirtyAfterFailure);

        let other = compose(&gateway);
        other.update(&EntryPatch::body("typed"));
        assert_eq!(other.status().phase, SavePhase::PendingDebounce);
        other.update(&EntryPatch::body(""));
        assert_eq!(other.status().phase, SavePhase::Clean);

        sleep(DEBOUNCE * 2).await;
        assert_eq!(gateway.calls().len(), 1);
        assert_eq!(scheduler.status().phase, SavePhase::DirtyAfterFailure);
    }

    #[tokio::test(start_paused = true)]
    async fn resumed_snapshot_saves_after_debounce() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let journal = RecoveryJournal::open(temp.path().to_path_buf(), None)?;
        let draft = JournalEntry::with_body(Mood::Empowered, "recovered after crash");
        journal.write(&draft, false)?;
        let snapshot = journal
            .read::<JournalEntry>(&draft.id)?
            .expect("snapshot present");

        let gateway = Arc::new(MemoryGateway::new());
        let scheduler = AutoSaveScheduler::resume(
            gateway.clone(),
            snapshot,
            SchedulerOptions {
                journal: Some(journal.clone()),
                ..options()
            },
        );
        assert!(scheduler.status().dirty);

        sleep(DEBOUNCE + Duration::from_secs(1)).await;
        gateway.wait_for_calls(1).await;
        sleep(Duration::from_millis(10)).await;
        assert_eq!(gateway.records()[0].body, "recovered after crash");
        assert!(journal.read::<JournalEntry>(&draft.id)?.is_none());
        Ok(())
    }
}
