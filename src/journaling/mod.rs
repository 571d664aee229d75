//! Draft editing sessions: buffered edits, debounced persistence and crash recovery.

pub mod autosave;
pub mod draft;
pub mod recovery;

pub use autosave::{
    AutoSaveEvent, AutoSaveScheduler, AutoSaveStatus, EndSession, SaveOutcome, SavePhase,
    SchedulerOptions, SkipReason,
};
pub use draft::{DraftBuffer, DraftSnapshot};
pub use recovery::{RecoveryJournal, RecoverySnapshot};
