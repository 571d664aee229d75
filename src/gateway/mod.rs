//! Persistence gateway contract shared by drafts and collection stores.
//!
//! A gateway is the only path to durable state. Implementations may be remote
//! or local; callers never assume anything beyond the four operations below and
//! the error taxonomy in [`GatewayError`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::model::{Record, RecordId};
use crate::search::FilterParams;

mod deadline;
mod error;
pub mod memory;

pub use deadline::{with_deadline, RequestSlot};
pub use error::{
    GatewayError, GatewayResult, MutationError, Operation, ALREADY_EXISTS, NOT_FOUND,
};
pub use memory::{CallKind, GatewayCall, MemoryGateway};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait Gateway<R: Record>: Send + Sync {
    async fn fetch_collection(&self, filter: &FilterParams) -> GatewayResult<Vec<R>>;

    async fn create_record(&self, payload: R) -> GatewayResult<R>;

    /// Returns the canonical record when the backend echoes one.
    async fn update_record(&self, id: &RecordId, payload: R) -> GatewayResult<Option<R>>;

    async fn delete_record(&self, id: &RecordId) -> GatewayResult<()>;
}

pub type SharedGateway<R> = Arc<dyn Gateway<R>>;
