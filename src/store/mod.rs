//! Client-side collections with optimistic mutations.
//!
//! Every mutation touches local state first (except deletes, which wait for
//! the gateway), then either reconciles with the canonical record or reverts.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use time::OffsetDateTime;

use crate::gateway::{
    with_deadline, GatewayError, GatewayResult, MutationError, Operation, RequestSlot,
    SharedGateway, ALREADY_EXISTS,
};
use crate::model::{word_count, DerivedMetrics, Record, RecordId};
use crate::search::FilterParams;

mod letters;
mod optimistic;

use optimistic::{position, reconcile, OptimisticUpdate, Revert};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum LoadStatus {
    #[default]
    Idle,
    Loading,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionState<R> {
    pub records: Vec<R>,
    pub status: LoadStatus,
    pub error: Option<String>,
}

impl<R> Default for CollectionState<R> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            status: LoadStatus::Idle,
            error: None,
        }
    }
}

pub struct CollectionStore<R: Record> {
    inner: Arc<StoreInner<R>>,
}

impl<R: Record> Clone for CollectionStore<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct StoreInner<R: Record> {
    gateway: SharedGateway<R>,
    state: Mutex<CollectionState<R>>,
    fetches: RequestSlot,
    timeout: Duration,
}

impl<R: Record> CollectionStore<R> {
    pub fn new(gateway: SharedGateway<R>, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                gateway,
                state: Mutex::new(CollectionState::default()),
                fetches: RequestSlot::new(),
                timeout,
            }),
        }
    }

    pub fn snapshot(&self) -> CollectionState<R> {
        self.inner.state.lock().clone()
    }

    pub fn records(&self) -> Vec<R> {
        self.inner.state.lock().records.clone()
    }

    pub fn status(&self) -> LoadStatus {
        self.inner.state.lock().status
    }

    pub fn error(&self) -> Option<String> {
        self.inner.state.lock().error.clone()
    }

    pub fn get(&self, id: &RecordId) -> Option<R> {
        let state = self.inner.state.lock();
        position(&state.records, id).map(|index| state.records[index].clone())
    }

    pub fn dismiss_error(&self) {
        self.inner.state.lock().error = None;
    }

    /// Replaces the collection with a fresh fetch. Starting a refetch aborts
    /// the previous one; an aborted refetch leaves state untouched.
    pub async fn refetch(&self, filter: &FilterParams) -> Result<usize, MutationError> {
        {
            let mut state = self.inner.state.lock();
            state.status = LoadStatus::Loading;
            state.error = None;
        }

        let gateway = Arc::clone(&self.inner.gateway);
        let result = self
            .inner
            .fetches
            .run(self.inner.timeout, gateway.fetch_collection(filter))
            .await;

        match result {
            Err(GatewayError::Aborted) => {
                tracing::debug!(collection = R::NOUN_PLURAL, "refetch superseded");
                Err(self.failure(Operation::Fetch, GatewayError::Aborted))
            }
            Ok(records) => {
                let count = records.len();
                let mut state = self.inner.state.lock();
                state.records = records;
                state.status = LoadStatus::Succeeded;
                tracing::debug!(collection = R::NOUN_PLURAL, count, "collection loaded");
                Ok(count)
            }
            Err(err) => {
                let error = self.failure(Operation::Fetch, err);
                let mut state = self.inner.state.lock();
                state.status = LoadStatus::Failed;
                state.error = Some(error.message.clone());
                tracing::warn!(collection = R::NOUN_PLURAL, error = %error.source, "refetch failed");
                Err(error)
            }
        }
    }

    /// Prepends `record` right away and replaces it with the gateway's copy.
    pub async fn create(&self, record: R) -> Result<R, MutationError> {
        self.optimistic(
            Operation::Create,
            |records| {
                if position(records, record.id()).is_some() {
                    return Err(GatewayError::rejected(ALREADY_EXISTS));
                }
                records.insert(0, record.clone());
                Ok(OptimisticUpdate {
                    pending: record.clone(),
                    revert: Revert::Remove(record.id().clone()),
                })
            },
            |gateway, pending| async move { gateway.create_record(pending).await.map(Some) },
        )
        .await
    }

    pub async fn update_fields(&self, id: &RecordId, patch: &R::Patch) -> Result<R, MutationError> {
        self.optimistic(
            Operation::Update,
            |records| {
                let index = position(records, id).ok_or_else(|| GatewayError::not_found(id))?;
                let original = records[index].clone();
                let slot = &mut records[index];
                slot.apply_patch(patch);
                let metrics = DerivedMetrics {
                    word_count: word_count(slot.body()),
                    writing_seconds: slot.writing_seconds(),
                };
                slot.stamp(metrics, OffsetDateTime::now_utc());
                let pending = slot.clone();
                Ok(OptimisticUpdate {
                    pending: pending.clone(),
                    revert: Revert::Restore { original, pending },
                })
            },
            persist_update(id),
        )
        .await
    }

    pub async fn toggle_favorite(&self, id: &RecordId) -> Result<R, MutationError> {
        self.optimistic(
            Operation::ToggleFavorite,
            |records| {
                let index = position(records, id).ok_or_else(|| GatewayError::not_found(id))?;
                let slot = &mut records[index];
                let favorite = slot.is_favorite();
                slot.set_favorite(!favorite);
                Ok(OptimisticUpdate {
                    pending: slot.clone(),
                    revert: Revert::Favorite {
                        id: id.clone(),
                        favorite,
                    },
                })
            },
            persist_update(id),
        )
        .await
    }

    /// Removes the record once the gateway confirms the delete.
    pub async fn remove(&self, id: &RecordId) -> Result<(), MutationError> {
        if self.get(id).is_none() {
            return Err(self.record_failure(Operation::Delete, GatewayError::not_found(id)));
        }
        let gateway = Arc::clone(&self.inner.gateway);
        let result = with_deadline(self.inner.timeout, gateway.delete_record(id)).await;
        match result {
            Ok(()) => {
                self.inner
                    .state
                    .lock()
                    .records
                    .retain(|record| record.id() != id);
                tracing::info!(%id, "{} deleted", R::NOUN);
                Ok(())
            }
            Err(err) => {
                let error = self.record_failure(Operation::Delete, err);
                tracing::warn!(%id, error = %error.source, "delete failed");
                Err(error)
            }
        }
    }

    async fn optimistic<A, C, Fut>(
        &self,
        operation: Operation,
        apply: A,
        call: C,
    ) -> Result<R, MutationError>
    where
        A: FnOnce(&mut Vec<R>) -> GatewayResult<OptimisticUpdate<R>>,
        C: FnOnce(SharedGateway<R>, R) -> Fut,
        Fut: Future<Output = GatewayResult<Option<R>>>,
    {
        let applied = {
            let mut state = self.inner.state.lock();
            apply(&mut state.records)
        };
        let update = match applied {
            Ok(update) => update,
            Err(err) => return Err(self.record_failure(operation, err)),
        };

        let request = call(Arc::clone(&self.inner.gateway), update.pending.clone());
        let result = with_deadline(self.inner.timeout, request).await;

        let mut state = self.inner.state.lock();
        match result {
            Ok(confirmed) => {
                let canonical = confirmed.unwrap_or(update.pending);
                reconcile(&mut state.records, canonical.clone());
                Ok(canonical)
            }
            Err(err) => {
                update.revert.undo(&mut state.records);
                let error = self.failure(operation, err);
                state.error = Some(error.message.clone());
                tracing::warn!(
                    %operation,
                    error = %error.source,
                    "reverted optimistic {} change",
                    R::NOUN
                );
                Err(error)
            }
        }
    }

    fn failure(&self, operation: Operation, err: GatewayError) -> MutationError {
        MutationError::new(operation, R::NOUN, R::NOUN_PLURAL, err)
    }

    /// Builds the error and records its message on the collection.
    fn record_failure(&self, operation: Operation, err: GatewayError) -> MutationError {
        let error = self.failure(operation, err);
        self.inner.state.lock().error = Some(error.message.clone());
        error
    }
}

type UpdateFuture<R> = Pin<Box<dyn Future<Output = GatewayResult<Option<R>>> + Send>>;

fn persist_update<R: Record>(id: &RecordId) -> impl FnOnce(SharedGateway<R>, R) -> UpdateFuture<R> {
    let id = id.clone();
    move |gateway: SharedGateway<R>, pending: R| -> UpdateFuture<R> {
        Box::pin(async move { gateway.update_record(&id, pending).await })
    }
}
