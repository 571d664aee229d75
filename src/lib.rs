pub mod cli;
pub mod config;
pub mod gateway;
pub mod journaling;
pub mod model;
pub mod search;
pub mod stats;
pub mod storage;
pub mod store;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
pub use gateway::{Gateway, GatewayError, MemoryGateway, MutationError, SharedGateway};
pub use journaling::{AutoSaveScheduler, EndSession, RecoveryJournal, SchedulerOptions};
pub use model::{JournalEntry, Letter, Mood, Record, RecordId};
pub use storage::SqliteGateway;
pub use store::CollectionStore;
