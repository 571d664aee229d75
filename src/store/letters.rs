use std::sync::Arc;

use time::OffsetDateTime;

use super::optimistic::{position, reconcile};
use super::CollectionStore;
use crate::gateway::{with_deadline, GatewayError, MutationError, Operation};
use crate::model::{Letter, RecordId};

impl CollectionStore<Letter> {
    /// Scheduled letters whose target date has arrived.
    pub fn ready_letters(&self, now: OffsetDateTime) -> Vec<Letter> {
        self.inner
            .state
            .lock()
            .records
            .iter()
            .filter(|letter| letter.is_ready(now))
            .cloned()
            .collect()
    }

    pub fn has_ready_letters(&self, now: OffsetDateTime) -> bool {
        self.inner
            .state
            .lock()
            .records
            .iter()
            .any(|letter| letter.is_ready(now))
    }

    /// Opens a ready letter. Applied only after the gateway confirms.
    pub async fn mark_opened(
        &self,
        id: &RecordId,
        now: OffsetDateTime,
    ) -> Result<Letter, MutationError> {
        let pending = {
            let state = self.inner.state.lock();
            match position(&state.records, id).map(|index| &state.records[index]) {
                None => Err(GatewayError::not_found(id)),
                Some(letter) if letter.is_opened() => return Ok(letter.clone()),
                Some(letter) if !letter.is_ready(now) => Err(GatewayError::invalid(format!(
                    "This letter stays sealed until {}.",
                    letter.target_date.date()
                ))),
                Some(letter) => {
                    let mut opened = letter.clone();
                    opened.open(now);
                    Ok(opened)
                }
            }
        };
        let pending = match pending {
            Ok(letter) => letter,
            Err(err) => return Err(self.record_failure(Operation::Open, err)),
        };

        let gateway = Arc::clone(&self.inner.gateway);
        let result = with_deadline(
            self.inner.timeout,
            gateway.update_record(id, pending.clone()),
        )
        .await;

        match result {
            Ok(confirmed) => {
                let canonical = confirmed.unwrap_or(pending);
                reconcile(&mut self.inner.state.lock().records, canonical.clone());
                tracing::info!(%id, "letter opened");
                Ok(canonical)
            }
            Err(err) => {
                let error = self.record_failure(Operation::Open, err);
                tracing::warn!(%id, error = %error.source, "failed to open letter");
                Err(error)
            }
        }
    }
}
