//! In-process gateway backed by a `Vec`, with scripted failures and a call log.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use super::{Gateway, GatewayError, GatewayResult, ALREADY_EXISTS};
use crate::model::{Record, RecordId};
use crate::search::FilterParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Fetch,
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayCall<R> {
    pub kind: CallKind,
    pub id: Option<RecordId>,
    pub payload: Option<R>,
}

#[derive(Debug)]
struct MemoryState<R> {
    records: Vec<R>,
    calls: Vec<GatewayCall<R>>,
    failures: VecDeque<(CallKind, GatewayError)>,
}

#[derive(Debug)]
pub struct MemoryGateway<R> {
    state: Mutex<MemoryState<R>>,
    latency: Duration,
    echo_updates: bool,
    observed: watch::Sender<usize>,
}

impl<R: Record> Default for MemoryGateway<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> MemoryGateway<R> {
    pub fn new() -> Self {
        Self::with_records(Vec::new())
    }

    pub fn with_records(records: Vec<R>) -> Self {
        let (observed, _) = watch::channel(0);
        Self {
            state: Mutex::new(MemoryState {
                records,
                calls: Vec::new(),
                failures: VecDeque::new(),
            }),
            latency: Duration::ZERO,
            echo_updates: true,
            observed,
        }
    }

    /// Every call sleeps this long before touching the records.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Updates resolve without echoing the stored record back.
    pub fn without_update_echo(mut self) -> Self {
        self.echo_updates = false;
        self
    }

    /// The next call of `kind` fails with `error`.
    pub fn fail_next(&self, kind: CallKind, error: GatewayError) {
        self.state.lock().failures.push_back((kind, error));
    }

    pub fn calls(&self) -> Vec<GatewayCall<R>> {
        self.state.lock().calls.clone()
    }

    pub fn calls_of(&self, kind: CallKind) -> Vec<GatewayCall<R>> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.kind == kind)
            .cloned()
            .collect()
    }

    pub fn records(&self) -> Vec<R> {
        self.state.lock().records.clone()
    }

    /// Resolves once at least `count` calls have been received.
    pub async fn wait_for_calls(&self, count: usize) {
        let mut observed = self.observed.subscribe();
        let _ = observed.wait_for(|seen| *seen >= count).await;
    }

    fn receive(&self, kind: CallKind, id: Option<&RecordId>, payload: Option<&R>) {
        let seen = {
            let mut state = self.state.lock();
            state.calls.push(GatewayCall {
                kind,
                id: id.cloned(),
                payload: payload.cloned(),
            });
            state.calls.len()
        };
        self.observed.send_replace(seen);
    }

    async fn settle(&self, kind: CallKind) -> GatewayResult<()> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let mut state = self.state.lock();
        let position = state.failures.iter().position(|(k, _)| *k == kind);
        match position.and_then(|index| state.failures.remove(index)) {
            Some((_, error)) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl<R: Record> Gateway<R> for MemoryGateway<R> {
    async fn fetch_collection(&self, filter: &FilterParams) -> GatewayResult<Vec<R>> {
        self.receive(CallKind::Fetch, None, None);
        self.settle(CallKind::Fetch).await?;
        let state = self.state.lock();
        let mut records: Vec<R> = state
            .records
            .iter()
            .filter(|record| record.matches(filter))
            .cloned()
            .collect();
        if let Some(limit) = filter.limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    async fn create_record(&self, payload: R) -> GatewayResult<R> {
        self.receive(CallKind::Create, Some(payload.id()), Some(&payload));
        self.settle(CallKind::Create).await?;
        let mut state = self.state.lock();
        if state.records.iter().any(|record| record.id() == payload.id()) {
            return Err(GatewayError::rejected(ALREADY_EXISTS));
        }
        state.records.insert(0, payload.clone());
        Ok(payload)
    }

    async fn update_record(&self, id: &RecordId, payload: R) -> GatewayResult<Option<R>> {
        self.receive(CallKind::Update, Some(id), Some(&payload));
        self.settle(CallKind::Update).await?;
        let mut state = self.state.lock();
        let Some(slot) = state.records.iter_mut().find(|record| record.id() == id) else {
            return Err(GatewayError::missing(id));
        };
        *slot = payload;
        Ok(self.echo_updates.then(|| slot.clone()))
    }

    async fn delete_record(&self, id: &RecordId) -> GatewayResult<()> {
        self.receive(CallKind::Delete, Some(id), None);
        self.settle(CallKind::Delete).await?;
        let mut state = self.state.lock();
        let before = state.records.len();
        state.records.retain(|record| record.id() != id);
        if state.records.len() == before {
            return Err(GatewayError::missing(id));
        }
        Ok(())
    }
}
