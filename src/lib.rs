//! Mneme: a spaced repetition practice engine
//!
//! The engine owns the per-card scheduler, the quota-aware queue builder,
//! the session state machine, and the session store that makes sessions
//! resumable across reconnects. Decks, cards, user settings, and the push
//! transport are external collaborators behind the traits in
//! [`practice::store`]; an in-memory transactional backend lives in
//! [`storage`] for tests and single-process embedding.

pub mod notify;
pub mod practice;
pub mod storage;

pub use notify::{NotifierRegistry, NullNotifier, Subscription};
pub use practice::{
    Card, CardKind, CardSchedule, DailyCounters, MachineState, Outcome, PracticeError, Session,
    SessionEvent, SessionItem, SessionStore, SessionView, StartOutcome, StudyConfig,
};
pub use storage::MemoryStorage;
