//! Practice engine
//!
//! This module provides:
//! - Per-(user, card) spaced repetition scheduling
//! - Daily quota-aware queue construction
//! - The session state machine (reveal, answer, advance, navigate)
//! - The concurrency-safe session store with resumable sessions

pub mod algorithm;
pub mod error;
pub mod machine;
pub mod models;
pub mod queue;
pub mod store;

pub use error::{PracticeError, Result};
pub use machine::SessionEvent;
pub use models::*;
pub use queue::{build_queue, QueueEntry, QueuePlan};
pub use store::{CardSource, ChangeNotifier, PracticeStorage, SessionStore, SettingsSource};
